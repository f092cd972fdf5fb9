//! Desired-target projection.
//!
//! Turns association, dissociation and task lifecycle events into
//! [`TargetChange`]s. Every projection is best effort: collaborator failures
//! are logged and the event contributes nothing, so one bad event never ends
//! a stage.

use std::net::IpAddr;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::{JobOperationsError, StoreError};
use crate::jobs::JobOperations;
use crate::model::{JobLoadBalancer, LoadBalancerTarget, Task, TargetChange, TaskState};
use crate::store::TargetStore;

/// Computes which targets should be registered or deregistered.
#[derive(Clone)]
pub struct TargetCalculator {
    store: Arc<dyn TargetStore>,
    jobs: Arc<dyn JobOperations>,
}

impl TargetCalculator {
    pub fn new(store: Arc<dyn TargetStore>, jobs: Arc<dyn JobOperations>) -> Self {
        Self { store, jobs }
    }

    /// Targets to register for a newly added association.
    ///
    /// One `Registered` change per started task of the job that carries a
    /// container IP. Emits nothing if the association or the job is gone.
    pub async fn targets_to_register(&self, association: &JobLoadBalancer) -> Vec<TargetChange> {
        match self.try_targets_to_register(association).await {
            Ok(changes) => changes,
            Err(e) => {
                warn!(
                    association = %association,
                    error = %e,
                    "Failed to compute targets to register"
                );
                Vec::new()
            }
        }
    }

    /// Targets to deregister for a removed association.
    ///
    /// Every target recorded for the association is re-emitted as
    /// `Deregistered`, whether or not its task is still alive.
    pub async fn targets_to_deregister(&self, association: &JobLoadBalancer) -> Vec<TargetChange> {
        match self.store.list_targets(association).await {
            Ok(targets) => {
                debug!(
                    association = %association,
                    count = targets.len(),
                    "Projected targets to deregister"
                );
                targets
                    .into_iter()
                    .map(|(target, _)| TargetChange::deregister(target))
                    .collect()
            }
            Err(e) => {
                warn!(
                    association = %association,
                    error = %e,
                    "Failed to list recorded targets"
                );
                Vec::new()
            }
        }
    }

    /// Targets affected by a task lifecycle change.
    ///
    /// - `Started` with an IP: register in every load balancer of the job.
    /// - `KillInitiated` / `Finished`: deregister every recorded target of
    ///   the task.
    /// - anything else: no change.
    pub async fn targets_for_task(&self, task: &Task) -> Vec<TargetChange> {
        let result = match task.state {
            TaskState::Started => self.try_targets_for_started_task(task).await,
            state if state.is_terminating() => self.try_targets_for_stopped_task(task).await,
            _ => Ok(Vec::new()),
        };

        result.unwrap_or_else(|e| {
            warn!(
                task_id = %task.id,
                job_id = %task.job_id,
                error = %e,
                "Failed to compute targets for task update"
            );
            Vec::new()
        })
    }

    async fn try_targets_to_register(
        &self,
        association: &JobLoadBalancer,
    ) -> Result<Vec<TargetChange>, ProjectionError> {
        let associated = self.store.list_associations(&association.job_id).await?;
        if !associated.contains(&association.load_balancer_id) {
            debug!(association = %association, "Association removed before projection");
            return Ok(Vec::new());
        }

        if self.jobs.get_job(&association.job_id).await?.is_none() {
            debug!(association = %association, "Job no longer exists");
            return Ok(Vec::new());
        }

        let tasks = match self.jobs.list_tasks(&association.job_id).await {
            Ok(tasks) => tasks,
            Err(JobOperationsError::JobNotFound(_)) => {
                debug!(association = %association, "Job removed while listing tasks");
                return Ok(Vec::new());
            }
            Err(e) => return Err(e.into()),
        };

        let changes: Vec<_> = tasks
            .iter()
            .filter(|task| task.state == TaskState::Started)
            .filter_map(running_ip)
            .map(|(task, ip)| {
                TargetChange::register(LoadBalancerTarget::new(association.clone(), task.id, ip))
            })
            .collect();

        debug!(
            association = %association,
            task_count = tasks.len(),
            count = changes.len(),
            "Projected targets to register"
        );
        Ok(changes)
    }

    async fn try_targets_for_started_task(
        &self,
        task: &Task,
    ) -> Result<Vec<TargetChange>, ProjectionError> {
        let Some((_, ip)) = running_ip(task) else {
            return Ok(Vec::new());
        };

        let load_balancers = self.store.list_associations(&task.job_id).await?;
        Ok(load_balancers
            .into_iter()
            .map(|load_balancer_id| {
                let association = JobLoadBalancer::new(task.job_id, load_balancer_id);
                TargetChange::register(LoadBalancerTarget::new(association, task.id, ip))
            })
            .collect())
    }

    async fn try_targets_for_stopped_task(
        &self,
        task: &Task,
    ) -> Result<Vec<TargetChange>, ProjectionError> {
        let load_balancers = self.store.list_associations(&task.job_id).await?;

        let mut changes = Vec::new();
        for load_balancer_id in load_balancers {
            let association = JobLoadBalancer::new(task.job_id, load_balancer_id);
            let recorded = self.store.list_targets(&association).await?;
            changes.extend(
                recorded
                    .into_iter()
                    .filter(|(target, _)| target.task_id == task.id)
                    .map(|(target, _)| TargetChange::deregister(target)),
            );
        }
        Ok(changes)
    }
}

/// Container IP of a running task, or `None` (with a warning) if it has none.
fn running_ip(task: &Task) -> Option<(&Task, IpAddr)> {
    let Some(raw) = task.container_ip() else {
        warn!(
            task_id = %task.id,
            job_id = %task.job_id,
            "Started task has no container IP"
        );
        return None;
    };

    match raw.parse() {
        Ok(ip) => Some((task, ip)),
        Err(_) => {
            warn!(
                task_id = %task.id,
                job_id = %task.job_id,
                container_ip = raw,
                "Started task has an unparseable container IP"
            );
            None
        }
    }
}

#[derive(Debug, thiserror::Error)]
enum ProjectionError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Jobs(#[from] JobOperationsError),
}
