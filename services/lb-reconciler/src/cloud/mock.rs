//! Recording load balancer client for tests and dry runs.

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use corral_id::LoadBalancerId;
use tokio::sync::Mutex;
use tracing::info;

use super::LoadBalancerClient;
use crate::error::ClientError;
use crate::model::{LoadBalancerTarget, TargetState};

/// One recorded client call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientCall {
    pub state: TargetState,
    pub targets: Vec<LoadBalancerTarget>,
}

/// Client that records every call instead of touching a real API.
#[derive(Default)]
pub struct MockLoadBalancerClient {
    calls: Mutex<Vec<ClientCall>>,
    fail_register: bool,
    fail_deregister: bool,
    fail_load_balancers: HashSet<LoadBalancerId>,
    delay: Option<Duration>,
}

impl MockLoadBalancerClient {
    /// Create a mock client that accepts every call.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a mock client whose register calls fail.
    pub fn failing_register() -> Self {
        Self {
            fail_register: true,
            ..Self::default()
        }
    }

    /// Create a mock client whose deregister calls fail.
    pub fn failing_deregister() -> Self {
        Self {
            fail_deregister: true,
            ..Self::default()
        }
    }

    /// Create a mock client whose calls fail whenever they touch
    /// `load_balancer_id`, on either side.
    pub fn failing_for(load_balancer_id: LoadBalancerId) -> Self {
        Self {
            fail_load_balancers: HashSet::from([load_balancer_id]),
            ..Self::default()
        }
    }

    /// Hold every non-empty call for `delay` before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Every non-empty call made so far, in call order.
    pub async fn calls(&self) -> Vec<ClientCall> {
        self.calls.lock().await.clone()
    }

    /// Targets passed to register calls, flattened.
    pub async fn registered(&self) -> Vec<LoadBalancerTarget> {
        self.flatten(TargetState::Registered).await
    }

    /// Targets passed to deregister calls, flattened.
    pub async fn deregistered(&self) -> Vec<LoadBalancerTarget> {
        self.flatten(TargetState::Deregistered).await
    }

    async fn flatten(&self, state: TargetState) -> Vec<LoadBalancerTarget> {
        self.calls
            .lock()
            .await
            .iter()
            .filter(|call| call.state == state)
            .flat_map(|call| call.targets.iter().cloned())
            .collect()
    }

    async fn record(
        &self,
        state: TargetState,
        targets: &[LoadBalancerTarget],
        fail: bool,
    ) -> Result<(), ClientError> {
        if targets.is_empty() {
            return Ok(());
        }

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        self.calls.lock().await.push(ClientCall {
            state,
            targets: targets.to_vec(),
        });

        if fail {
            return Err(ClientError::Rejected(format!(
                "mock client configured to fail {state} calls"
            )));
        }
        if let Some(target) = targets
            .iter()
            .find(|t| self.fail_load_balancers.contains(t.load_balancer_id()))
        {
            return Err(ClientError::Rejected(format!(
                "mock client configured to fail {}",
                target.load_balancer_id()
            )));
        }

        for target in targets {
            info!(lb_target = %target, state = %state, "[MOCK] Applied target");
        }
        Ok(())
    }
}

#[async_trait]
impl LoadBalancerClient for MockLoadBalancerClient {
    async fn register_all(&self, targets: &[LoadBalancerTarget]) -> Result<(), ClientError> {
        self.record(TargetState::Registered, targets, self.fail_register)
            .await
    }

    async fn deregister_all(&self, targets: &[LoadBalancerTarget]) -> Result<(), ClientError> {
        self.record(TargetState::Deregistered, targets, self.fail_deregister)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::JobLoadBalancer;
    use corral_id::{JobId, LoadBalancerId, TaskId};

    fn target() -> LoadBalancerTarget {
        let association = JobLoadBalancer::new(JobId::new(), LoadBalancerId::parse("lb-1").unwrap());
        LoadBalancerTarget::new(association, TaskId::new(), "10.0.0.1".parse().unwrap())
    }

    #[tokio::test]
    async fn test_empty_calls_are_not_recorded() {
        let client = MockLoadBalancerClient::failing_register();
        client.register_all(&[]).await.unwrap();
        assert!(client.calls().await.is_empty());
    }

    #[tokio::test]
    async fn test_failing_side_still_records_attempt() {
        let client = MockLoadBalancerClient::failing_register();
        let t = target();

        assert!(client.register_all(&[t.clone()]).await.is_err());
        client.deregister_all(&[t.clone()]).await.unwrap();

        assert_eq!(client.registered().await, vec![t.clone()]);
        assert_eq!(client.deregistered().await, vec![t]);
    }

    #[tokio::test]
    async fn test_failing_for_only_rejects_that_load_balancer() {
        let t = target();
        let client = MockLoadBalancerClient::failing_for(t.load_balancer_id().clone());
        let other = MockLoadBalancerClient::failing_for(LoadBalancerId::parse("lb-2").unwrap());

        assert!(client.register_all(&[t.clone()]).await.is_err());
        assert!(client.deregister_all(&[t.clone()]).await.is_err());
        other.register_all(&[t]).await.unwrap();
    }
}
