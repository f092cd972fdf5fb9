//! In-memory target store.
//!
//! Reference implementation of [`TargetStore`]: associations are indexed by
//! job and targets by association, so both listings are proportional to the
//! result size. Nothing survives a restart.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use async_trait::async_trait;
use corral_id::{JobId, LoadBalancerId};
use tokio::sync::RwLock;
use tracing::debug;

use super::TargetStore;
use crate::error::StoreError;
use crate::model::{JobLoadBalancer, LoadBalancerTarget, TargetState};

/// In-memory store, safe to share across tasks.
#[derive(Default)]
pub struct InMemoryTargetStore {
    associations: RwLock<HashMap<JobId, BTreeSet<LoadBalancerId>>>,
    targets: RwLock<HashMap<JobLoadBalancer, BTreeMap<LoadBalancerTarget, TargetState>>>,
}

impl InMemoryTargetStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TargetStore for InMemoryTargetStore {
    async fn list_associations(&self, job_id: &JobId) -> Result<Vec<LoadBalancerId>, StoreError> {
        let associations = self.associations.read().await;
        Ok(associations
            .get(job_id)
            .map(|lbs| lbs.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn add_association(&self, association: &JobLoadBalancer) -> Result<(), StoreError> {
        let mut associations = self.associations.write().await;
        let added = associations
            .entry(association.job_id)
            .or_default()
            .insert(association.load_balancer_id.clone());
        debug!(association = %association, added, "Stored association");
        Ok(())
    }

    async fn remove_association(&self, association: &JobLoadBalancer) -> Result<(), StoreError> {
        let mut associations = self.associations.write().await;
        let Some(lbs) = associations.get_mut(&association.job_id) else {
            return Ok(());
        };

        let removed = lbs.remove(&association.load_balancer_id);
        if lbs.is_empty() {
            associations.remove(&association.job_id);
        }
        debug!(association = %association, removed, "Removed association");
        Ok(())
    }

    async fn list_targets(
        &self,
        association: &JobLoadBalancer,
    ) -> Result<Vec<(LoadBalancerTarget, TargetState)>, StoreError> {
        let targets = self.targets.read().await;
        Ok(targets
            .get(association)
            .map(|by_target| {
                by_target
                    .iter()
                    .map(|(target, state)| (target.clone(), *state))
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn write_targets(
        &self,
        update: &HashMap<LoadBalancerTarget, TargetState>,
    ) -> Result<(), StoreError> {
        if update.is_empty() {
            return Ok(());
        }

        let mut targets = self.targets.write().await;
        for (target, state) in update {
            targets
                .entry(target.association.clone())
                .or_default()
                .insert(target.clone(), *state);
        }
        Ok(())
    }

    async fn remove_targets(&self, remove: &HashSet<LoadBalancerTarget>) -> Result<(), StoreError> {
        if remove.is_empty() {
            return Ok(());
        }

        let mut targets = self.targets.write().await;
        for target in remove {
            if let Some(by_target) = targets.get_mut(&target.association) {
                by_target.remove(target);
                if by_target.is_empty() {
                    targets.remove(&target.association);
                }
            }
        }
        Ok(())
    }
}
