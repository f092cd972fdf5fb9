//! Applies batches to the load balancer API and records the result.
//!
//! Both partitions of a batch are attempted independently. Within a
//! partition, targets are sent with one client call per load balancer and a
//! group's state is persisted only after its own call succeeded. A failing
//! load balancer never rolls back or blocks the other groups, and the store
//! never misses a change the cloud API already accepted.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use corral_id::LoadBalancerId;
use tracing::debug;

use crate::batch::{Batch, BatchOutcome};
use crate::cloud::LoadBalancerClient;
use crate::error::{ApplyError, BatchError};
use crate::model::{LoadBalancerTarget, TargetState};
use crate::store::TargetStore;

/// Applies one deduplicated batch at a time.
#[derive(Clone)]
pub struct BatchApplier {
    client: Arc<dyn LoadBalancerClient>,
    store: Arc<dyn TargetStore>,
}

/// Result of one partition: targets confirmed and persisted, plus every
/// failed group.
#[derive(Debug, Default)]
struct PartitionResult {
    applied: usize,
    errors: Vec<ApplyError>,
}

impl BatchApplier {
    pub fn new(client: Arc<dyn LoadBalancerClient>, store: Arc<dyn TargetStore>) -> Self {
        Self { client, store }
    }

    /// Apply a batch.
    ///
    /// Returns only after both partitions finished. On failure every error
    /// hit by either side is reported together, along with the targets that
    /// were applied anyway.
    pub async fn apply(&self, batch: &Batch) -> Result<BatchOutcome, BatchError> {
        let (register, deregister) = batch.partition();

        let (registered, deregistered) = tokio::join!(
            self.apply_partition(TargetState::Registered, register),
            self.apply_partition(TargetState::Deregistered, deregister),
        );

        let applied = BatchOutcome {
            registered: registered.applied,
            deregistered: deregistered.applied,
        };
        let mut errors = registered.errors;
        errors.extend(deregistered.errors);

        if errors.is_empty() {
            Ok(applied)
        } else {
            Err(BatchError { errors, applied })
        }
    }

    async fn apply_partition(
        &self,
        state: TargetState,
        targets: Vec<LoadBalancerTarget>,
    ) -> PartitionResult {
        let mut by_lb: BTreeMap<LoadBalancerId, Vec<LoadBalancerTarget>> = BTreeMap::new();
        for target in targets {
            by_lb
                .entry(target.load_balancer_id().clone())
                .or_default()
                .push(target);
        }

        let mut result = PartitionResult::default();
        for (load_balancer_id, group) in by_lb {
            match self.apply_group(state, &load_balancer_id, group).await {
                Ok(count) => result.applied += count,
                Err(e) => result.errors.push(e),
            }
        }
        result
    }

    async fn apply_group(
        &self,
        state: TargetState,
        load_balancer_id: &LoadBalancerId,
        targets: Vec<LoadBalancerTarget>,
    ) -> Result<usize, ApplyError> {
        let count = targets.len();
        match state {
            TargetState::Registered => {
                self.client
                    .register_all(&targets)
                    .await
                    .map_err(|source| ApplyError::Register {
                        load_balancer_id: load_balancer_id.clone(),
                        count,
                        source,
                    })?
            }
            TargetState::Deregistered => {
                self.client
                    .deregister_all(&targets)
                    .await
                    .map_err(|source| ApplyError::Deregister {
                        load_balancer_id: load_balancer_id.clone(),
                        count,
                        source,
                    })?
            }
        }

        let update: HashMap<_, _> = targets.into_iter().map(|target| (target, state)).collect();
        self.store
            .write_targets(&update)
            .await
            .map_err(|source| ApplyError::Persist {
                load_balancer_id: load_balancer_id.clone(),
                state,
                count,
                source,
            })?;

        debug!(load_balancer_id = %load_balancer_id, state = %state, count, "Applied target group");
        Ok(count)
    }
}
