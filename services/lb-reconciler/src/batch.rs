//! Deduplicated batches of target changes.

use corral_reconcile::distinct_keep_last;

use crate::model::{LoadBalancerTarget, TargetChange, TargetState};

/// One window of target changes, deduplicated by target identity.
///
/// At most one change per target: the last one observed in the window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    changes: Vec<TargetChange>,
}

impl Batch {
    /// Build a batch from a raw window, keeping the last change per target.
    pub fn from_window(window: Vec<TargetChange>) -> Self {
        let changes = distinct_keep_last(window, |change| change.target.clone());
        Self { changes }
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn changes(&self) -> &[TargetChange] {
        &self.changes
    }

    /// Split into `(to_register, to_deregister)`.
    pub fn partition(&self) -> (Vec<LoadBalancerTarget>, Vec<LoadBalancerTarget>) {
        let mut register = Vec::new();
        let mut deregister = Vec::new();
        for change in &self.changes {
            match change.state {
                TargetState::Registered => register.push(change.target.clone()),
                TargetState::Deregistered => deregister.push(change.target.clone()),
            }
        }
        (register, deregister)
    }
}

/// Targets confirmed by the load balancer API and persisted for one batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    pub registered: usize,
    pub deregistered: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::JobLoadBalancer;
    use corral_id::{JobId, LoadBalancerId, TaskId};

    fn target(ip: &str) -> LoadBalancerTarget {
        let association = JobLoadBalancer::new(JobId::new(), LoadBalancerId::parse("lb-1").unwrap());
        LoadBalancerTarget::new(association, TaskId::new(), ip.parse().unwrap())
    }

    #[test]
    fn test_register_then_deregister_keeps_deregister() {
        let t = target("10.0.0.1");
        let batch = Batch::from_window(vec![
            TargetChange::register(t.clone()),
            TargetChange::deregister(t.clone()),
        ]);

        assert_eq!(batch.changes(), &[TargetChange::deregister(t.clone())]);
        assert_eq!(batch.partition(), (vec![], vec![t]));
    }

    #[test]
    fn test_partition_never_mixes_states() {
        let a = target("10.0.0.1");
        let b = target("10.0.0.2");
        let c = target("10.0.0.3");
        let batch = Batch::from_window(vec![
            TargetChange::register(a.clone()),
            TargetChange::deregister(b.clone()),
            TargetChange::register(c.clone()),
        ]);

        assert_eq!(batch.len(), 3);
        let (register, deregister) = batch.partition();
        assert_eq!(register, vec![a, c]);
        assert_eq!(deregister, vec![b]);
    }

    #[test]
    fn test_same_task_different_ip_are_distinct_targets() {
        let a = target("10.0.0.1");
        let mut b = a.clone();
        b.ip_address = "10.0.0.2".parse().unwrap();

        let batch = Batch::from_window(vec![
            TargetChange::register(a),
            TargetChange::deregister(b),
        ]);
        assert_eq!(batch.len(), 2);
    }
}
