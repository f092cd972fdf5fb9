//! Domain model for load balancer membership.
//!
//! - A [`JobLoadBalancer`] is a declared association: "tasks of this job
//!   should be targets of this load balancer". Its existence in the store is
//!   the associated state.
//! - A [`LoadBalancerTarget`] is one task's membership in one load balancer,
//!   keyed by (association, task, ip). Its state lives next to it in the
//!   store, never inside the key.

use std::collections::HashMap;
use std::fmt;
use std::net::IpAddr;

use corral_id::{JobId, LoadBalancerId, TaskId};
use serde::{Deserialize, Serialize};

/// Task attribute holding the container IP assigned by the network driver.
pub const TASK_ATTRIBUTES_CONTAINER_IP: &str = "task.containerIp";

/// Association between a job and a load balancer.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct JobLoadBalancer {
    pub job_id: JobId,
    pub load_balancer_id: LoadBalancerId,
}

impl JobLoadBalancer {
    pub fn new(job_id: JobId, load_balancer_id: LoadBalancerId) -> Self {
        Self {
            job_id,
            load_balancer_id,
        }
    }
}

impl fmt::Display for JobLoadBalancer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.job_id, self.load_balancer_id)
    }
}

/// Desired or last confirmed membership state of a target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetState {
    Registered,
    Deregistered,
}

impl TargetState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Registered => "registered",
            Self::Deregistered => "deregistered",
        }
    }
}

impl fmt::Display for TargetState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of one task's membership in one load balancer.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LoadBalancerTarget {
    pub association: JobLoadBalancer,
    pub task_id: TaskId,
    pub ip_address: IpAddr,
}

impl LoadBalancerTarget {
    pub fn new(association: JobLoadBalancer, task_id: TaskId, ip_address: IpAddr) -> Self {
        Self {
            association,
            task_id,
            ip_address,
        }
    }

    pub fn load_balancer_id(&self) -> &LoadBalancerId {
        &self.association.load_balancer_id
    }
}

impl fmt::Display for LoadBalancerTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} -> {}@{}",
            self.association.load_balancer_id, self.task_id, self.ip_address
        )
    }
}

/// A target paired with the state it should converge to.
///
/// This is the unit flowing through the batching pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetChange {
    pub target: LoadBalancerTarget,
    pub state: TargetState,
}

impl TargetChange {
    pub fn register(target: LoadBalancerTarget) -> Self {
        Self {
            target,
            state: TargetState::Registered,
        }
    }

    pub fn deregister(target: LoadBalancerTarget) -> Self {
        Self {
            target,
            state: TargetState::Deregistered,
        }
    }
}

/// Task lifecycle states reported by the orchestration engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Accepted,
    Launched,
    StartInitiated,
    Started,
    KillInitiated,
    Finished,
}

impl TaskState {
    /// True once the task is on its way out and must leave load balancers.
    pub fn is_terminating(&self) -> bool {
        matches!(self, Self::KillInitiated | Self::Finished)
    }
}

/// A job as seen by the reconciler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
}

/// A task as seen by the reconciler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub job_id: JobId,
    pub state: TaskState,
    #[serde(default)]
    pub attributes: HashMap<String, String>,
}

impl Task {
    /// Raw container IP attribute, if the task has been assigned one.
    pub fn container_ip(&self) -> Option<&str> {
        self.attributes
            .get(TASK_ATTRIBUTES_CONTAINER_IP)
            .map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_state_serde_snake_case() {
        let json = serde_json::to_string(&TargetState::Deregistered).unwrap();
        assert_eq!(json, "\"deregistered\"");
    }

    #[test]
    fn test_task_decodes_without_attributes() {
        let job_id = JobId::new();
        let task_id = TaskId::new();
        let json = serde_json::json!({
            "id": task_id,
            "job_id": job_id,
            "state": "kill_initiated",
        });

        let task: Task = serde_json::from_value(json).unwrap();
        assert_eq!(task.state, TaskState::KillInitiated);
        assert!(task.state.is_terminating());
        assert_eq!(task.container_ip(), None);
    }

    #[test]
    fn test_target_identity_ignores_state() {
        let association = JobLoadBalancer::new(JobId::new(), LoadBalancerId::parse("lb-1").unwrap());
        let target = LoadBalancerTarget::new(association, TaskId::new(), "10.0.0.1".parse().unwrap());

        let a = TargetChange::register(target.clone());
        let b = TargetChange::deregister(target);
        assert_eq!(a.target, b.target);
        assert_ne!(a, b);
    }
}
