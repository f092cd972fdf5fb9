//! Durable association and target state.
//!
//! The store is the only shared mutable resource in the reconciler. It is a
//! last-write-wins map, not a log: at most one state is recorded per target.
//! Implementations provide their own concurrency safety; callers never hold
//! locks across calls and never expect retries inside the store.

mod memory;

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use corral_id::{JobId, LoadBalancerId};

pub use memory::InMemoryTargetStore;

use crate::error::StoreError;
use crate::model::{JobLoadBalancer, LoadBalancerTarget, TargetState};

/// Store for job/load balancer associations and their targets.
#[async_trait]
pub trait TargetStore: Send + Sync {
    /// All load balancers associated with a job. Unknown jobs yield an empty list.
    async fn list_associations(&self, job_id: &JobId) -> Result<Vec<LoadBalancerId>, StoreError>;

    /// Record an association. Adding an existing association is a no-op.
    async fn add_association(&self, association: &JobLoadBalancer) -> Result<(), StoreError>;

    /// Drop an association. Removing a missing association is a no-op.
    ///
    /// Targets recorded for the association are kept so they can be
    /// deregistered afterwards.
    async fn remove_association(&self, association: &JobLoadBalancer) -> Result<(), StoreError>;

    /// Every target ever recorded for the association, whatever its state.
    async fn list_targets(
        &self,
        association: &JobLoadBalancer,
    ) -> Result<Vec<(LoadBalancerTarget, TargetState)>, StoreError>;

    /// Bulk last-write-wins upsert. An empty map is a no-op.
    async fn write_targets(
        &self,
        targets: &HashMap<LoadBalancerTarget, TargetState>,
    ) -> Result<(), StoreError>;

    /// Bulk delete. An empty set is a no-op.
    async fn remove_targets(&self, targets: &HashSet<LoadBalancerTarget>) -> Result<(), StoreError>;
}
