//! Reconciliation engine.
//!
//! Owns the background pipeline that converges load balancer membership:
//!
//! ```text
//! add/remove/task_updated
//!     -> intake channels (one per event kind)
//!     -> projection stage   (TargetCalculator)
//!     -> window stage       (time/size bounded, last-write-wins dedup)
//!     -> apply stage        (BatchApplier, bounded concurrency)
//! ```
//!
//! Intake never blocks: channels are unbounded and a slow apply stage makes
//! formed batches queue up instead of pushing back on callers. The pipeline
//! is rebuilt from fresh channels on every `start`.

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use corral_id::{JobId, LoadBalancerId};
use corral_reconcile::{next_window, WindowConfig};
use serde::Serialize;
use tokio::sync::{mpsc, watch, RwLock, Semaphore};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, instrument, warn};

use crate::applier::BatchApplier;
use crate::batch::{Batch, BatchOutcome};
use crate::calculator::TargetCalculator;
use crate::cloud::LoadBalancerClient;
use crate::error::{ReconcileError, StoreError};
use crate::jobs::JobOperations;
use crate::model::{JobLoadBalancer, LoadBalancerTarget, Task, TargetChange, TargetState};
use crate::store::TargetStore;

/// Engine tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    /// Batch window bounds.
    pub window: WindowConfig,

    /// Maximum number of batches applied at once.
    ///
    /// With 1, batches are applied strictly in the order they were formed.
    pub apply_concurrency: usize,
}

impl EngineConfig {
    pub fn new(window: WindowConfig) -> Self {
        Self {
            window,
            apply_concurrency: 1,
        }
    }

    /// Set the apply concurrency. Values below 1 are raised to 1.
    pub fn with_apply_concurrency(mut self, apply_concurrency: usize) -> Self {
        self.apply_concurrency = apply_concurrency.max(1);
        self
    }
}

/// Running counters for applied batches.
#[derive(Debug, Default)]
pub struct ReconcileStats {
    batches_completed: AtomicU64,
    batches_failed: AtomicU64,
    targets_registered: AtomicU64,
    targets_deregistered: AtomicU64,
}

impl ReconcileStats {
    fn record_applied(&self, outcome: BatchOutcome) {
        self.targets_registered
            .fetch_add(outcome.registered as u64, Ordering::Relaxed);
        self.targets_deregistered
            .fetch_add(outcome.deregistered as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            batches_completed: self.batches_completed.load(Ordering::Relaxed),
            batches_failed: self.batches_failed.load(Ordering::Relaxed),
            targets_registered: self.targets_registered.load(Ordering::Relaxed),
            targets_deregistered: self.targets_deregistered.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`ReconcileStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub batches_completed: u64,
    pub batches_failed: u64,
    pub targets_registered: u64,
    pub targets_deregistered: u64,
}

/// Handles to one running pipeline.
struct Pipeline {
    associations: mpsc::UnboundedSender<JobLoadBalancer>,
    dissociations: mpsc::UnboundedSender<JobLoadBalancer>,
    task_updates: mpsc::UnboundedSender<Task>,
    shutdown: watch::Sender<bool>,
    stages: Vec<JoinHandle<()>>,
}

/// Receiving ends of the intake channels, owned by the projection stage.
struct Intake {
    associations: mpsc::UnboundedReceiver<JobLoadBalancer>,
    dissociations: mpsc::UnboundedReceiver<JobLoadBalancer>,
    task_updates: mpsc::UnboundedReceiver<Task>,
}

/// Load balancer membership service.
///
/// The synchronous operations return once the store has been updated;
/// convergence of the cloud load balancer happens asynchronously.
pub struct LoadBalancerService {
    store: Arc<dyn TargetStore>,
    calculator: TargetCalculator,
    applier: BatchApplier,
    config: EngineConfig,
    stats: Arc<ReconcileStats>,
    pipeline: RwLock<Option<Pipeline>>,
}

impl LoadBalancerService {
    pub fn new(
        store: Arc<dyn TargetStore>,
        jobs: Arc<dyn JobOperations>,
        client: Arc<dyn LoadBalancerClient>,
        config: EngineConfig,
    ) -> Self {
        Self {
            calculator: TargetCalculator::new(store.clone(), jobs),
            applier: BatchApplier::new(client, store.clone()),
            store,
            config,
            stats: Arc::new(ReconcileStats::default()),
            pipeline: RwLock::new(None),
        }
    }

    /// Start the background pipeline with fresh intake channels.
    pub async fn start(&self) -> Result<(), ReconcileError> {
        let mut pipeline = self.pipeline.write().await;
        if pipeline.is_some() {
            return Err(ReconcileError::AlreadyRunning);
        }

        let (associations_tx, associations_rx) = mpsc::unbounded_channel();
        let (dissociations_tx, dissociations_rx) = mpsc::unbounded_channel();
        let (task_updates_tx, task_updates_rx) = mpsc::unbounded_channel();
        let (targets_tx, targets_rx) = mpsc::unbounded_channel();
        let (batches_tx, batches_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let intake = Intake {
            associations: associations_rx,
            dissociations: dissociations_rx,
            task_updates: task_updates_rx,
        };

        let stages = vec![
            tokio::spawn(run_projection(
                self.calculator.clone(),
                intake,
                targets_tx,
                shutdown_rx.clone(),
            )),
            tokio::spawn(run_windowing(
                self.config.window,
                targets_rx,
                batches_tx,
                shutdown_rx,
            )),
            tokio::spawn(run_apply(
                self.applier.clone(),
                self.stats.clone(),
                self.config.apply_concurrency,
                batches_rx,
            )),
        ];

        *pipeline = Some(Pipeline {
            associations: associations_tx,
            dissociations: dissociations_tx,
            task_updates: task_updates_tx,
            shutdown: shutdown_tx,
            stages,
        });

        info!(
            batch_timeout_ms = self.config.window.timeout().as_millis() as u64,
            batch_max_size = self.config.window.max_size(),
            apply_concurrency = self.config.apply_concurrency,
            "Started reconciliation pipeline"
        );
        Ok(())
    }

    /// Stop the background pipeline.
    ///
    /// Intake is closed first, then the stages are signalled. The window
    /// being collected is dropped; batches already formed, including one in
    /// flight, are applied to completion. Calling `stop` on a stopped engine
    /// is a no-op.
    pub async fn stop(&self) {
        let Some(pipeline) = self.pipeline.write().await.take() else {
            debug!("Reconciliation pipeline not running");
            return;
        };

        let Pipeline {
            associations,
            dissociations,
            task_updates,
            shutdown,
            stages,
        } = pipeline;
        drop((associations, dissociations, task_updates));

        let _ = shutdown.send(true);
        for stage in stages {
            if let Err(e) = stage.await {
                error!(error = %e, "Pipeline stage terminated abnormally");
            }
        }

        info!("Stopped reconciliation pipeline");
    }

    /// True while the pipeline is running.
    pub async fn is_running(&self) -> bool {
        self.pipeline.read().await.is_some()
    }

    /// Associate a load balancer with a job.
    ///
    /// Fails only if the store write fails, in which case nothing is
    /// published.
    pub async fn add_load_balancer(
        &self,
        job_id: JobId,
        load_balancer_id: LoadBalancerId,
    ) -> Result<(), StoreError> {
        let association = JobLoadBalancer::new(job_id, load_balancer_id);
        self.store.add_association(&association).await?;
        info!(association = %association, "Added load balancer");

        self.publish(|p| &p.associations, association).await;
        Ok(())
    }

    /// Dissociate a load balancer from a job.
    pub async fn remove_load_balancer(
        &self,
        job_id: JobId,
        load_balancer_id: LoadBalancerId,
    ) -> Result<(), StoreError> {
        let association = JobLoadBalancer::new(job_id, load_balancer_id);
        self.store.remove_association(&association).await?;
        info!(association = %association, "Removed load balancer");

        self.publish(|p| &p.dissociations, association).await;
        Ok(())
    }

    /// Load balancers currently associated with a job.
    pub async fn get_load_balancers(
        &self,
        job_id: &JobId,
    ) -> Result<Vec<LoadBalancerId>, StoreError> {
        self.store.list_associations(job_id).await
    }

    /// Recorded targets of one association and their last confirmed state.
    pub async fn list_targets(
        &self,
        job_id: JobId,
        load_balancer_id: LoadBalancerId,
    ) -> Result<Vec<(LoadBalancerTarget, TargetState)>, StoreError> {
        let association = JobLoadBalancer::new(job_id, load_balancer_id);
        self.store.list_targets(&association).await
    }

    /// Feed a task lifecycle change into the pipeline.
    pub async fn task_updated(&self, task: Task) {
        self.publish(|p| &p.task_updates, task).await;
    }

    /// Counters for batches applied since the service was created.
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Send an event to a running pipeline.
    ///
    /// The read lock keeps `stop` from closing intake mid-send.
    async fn publish<T: fmt::Debug>(
        &self,
        channel: impl FnOnce(&Pipeline) -> &mpsc::UnboundedSender<T>,
        event: T,
    ) {
        let pipeline = self.pipeline.read().await;
        let Some(running) = pipeline.as_ref() else {
            warn!(event = ?event, "Reconciliation pipeline not running, event not published");
            return;
        };

        if let Err(mpsc::error::SendError(event)) = channel(running).send(event) {
            warn!(event = ?event, "Projection stage is gone, event dropped");
        }
    }
}

/// Resolves once the shutdown flag is raised or its sender is gone.
async fn shutdown_signalled(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}

/// Run one projection in its own task so a panic only loses that event.
async fn project<F>(targets: &mpsc::UnboundedSender<TargetChange>, kind: &'static str, fut: F) -> bool
where
    F: Future<Output = Vec<TargetChange>> + Send + 'static,
{
    let changes = match tokio::spawn(fut).await {
        Ok(changes) => changes,
        Err(e) => {
            error!(kind, error = %e, "Projection panicked, event skipped");
            return true;
        }
    };

    for change in changes {
        debug!(lb_target = %change.target, state = %change.state, "Buffered target");
        if targets.send(change).is_err() {
            return false;
        }
    }
    true
}

#[instrument(skip_all)]
async fn run_projection(
    calculator: TargetCalculator,
    mut intake: Intake,
    targets: mpsc::UnboundedSender<TargetChange>,
    mut shutdown: watch::Receiver<bool>,
) {
    debug!("Projection stage started");

    loop {
        let calculator = calculator.clone();
        let forwarded = tokio::select! {
            biased;
            _ = shutdown_signalled(&mut shutdown) => break,
            Some(association) = intake.associations.recv() => {
                project(&targets, "association", async move {
                    calculator.targets_to_register(&association).await
                })
                .await
            }
            Some(association) = intake.dissociations.recv() => {
                project(&targets, "dissociation", async move {
                    calculator.targets_to_deregister(&association).await
                })
                .await
            }
            Some(task) = intake.task_updates.recv() => {
                project(&targets, "task_update", async move {
                    calculator.targets_for_task(&task).await
                })
                .await
            }
            else => break,
        };

        if !forwarded {
            break;
        }
    }

    debug!("Projection stage stopped");
}

#[instrument(skip_all)]
async fn run_windowing(
    window: WindowConfig,
    mut targets: mpsc::UnboundedReceiver<TargetChange>,
    batches: mpsc::UnboundedSender<Batch>,
    mut shutdown: watch::Receiver<bool>,
) {
    debug!("Window stage started");

    loop {
        let collected = tokio::select! {
            biased;
            _ = shutdown_signalled(&mut shutdown) => {
                let pending = targets.len();
                if pending > 0 {
                    warn!(pending, "Dropping unbatched targets on shutdown");
                }
                break;
            }
            collected = next_window(&mut targets, &window) => collected,
        };

        let Some(collected) = collected else {
            break;
        };
        if collected.is_empty() {
            continue;
        }

        let received = collected.len();
        let batch = Batch::from_window(collected);
        debug!(received, batch_size = batch.len(), "Formed batch");

        if batches.send(batch).is_err() {
            break;
        }
    }

    debug!("Window stage stopped");
}

#[instrument(skip_all)]
async fn run_apply(
    applier: BatchApplier,
    stats: Arc<ReconcileStats>,
    concurrency: usize,
    mut batches: mpsc::UnboundedReceiver<Batch>,
) {
    debug!(concurrency, "Apply stage started");

    let permits = Arc::new(Semaphore::new(concurrency));
    let mut in_flight = JoinSet::new();

    while let Some(batch) = batches.recv().await {
        let Ok(permit) = permits.clone().acquire_owned().await else {
            break;
        };

        while let Some(joined) = in_flight.try_join_next() {
            log_join(joined);
        }

        let applier = applier.clone();
        let stats = stats.clone();
        in_flight.spawn(async move {
            let _permit = permit;
            apply_batch(&applier, &stats, batch).await;
        });
    }

    while let Some(joined) = in_flight.join_next().await {
        log_join(joined);
    }

    debug!("Apply stage stopped");
}

fn log_join(joined: Result<(), tokio::task::JoinError>) {
    if let Err(e) = joined {
        error!(error = %e, "Batch apply panicked, batch dropped");
    }
}

async fn apply_batch(applier: &BatchApplier, stats: &ReconcileStats, batch: Batch) {
    match applier.apply(&batch).await {
        Ok(outcome) => {
            stats.batches_completed.fetch_add(1, Ordering::Relaxed);
            stats.record_applied(outcome);
            info!(
                registered = outcome.registered,
                deregistered = outcome.deregistered,
                "Applied batch"
            );
        }
        Err(e) => {
            stats.batches_failed.fetch_add(1, Ordering::Relaxed);
            stats.record_applied(e.applied);
            error!(
                error = %e,
                batch_size = batch.len(),
                registered = e.applied.registered,
                deregistered = e.applied.deregistered,
                batch = ?batch.changes(),
                "Batch failed, dropping"
            );
        }
    }
}
