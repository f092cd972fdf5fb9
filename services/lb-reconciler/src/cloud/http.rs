//! HTTP load balancer client.
//!
//! Targets are grouped per load balancer and posted as
//! `{"targets": [{"task_id": .., "ip_address": ..}]}` to
//! `{base}/v1/load-balancers/{lb}/targets/{register|deregister}`.

use std::collections::BTreeMap;
use std::net::IpAddr;
use std::time::Duration;

use async_trait::async_trait;
use corral_id::{LoadBalancerId, TaskId};
use reqwest::Url;
use serde::Serialize;
use tracing::{debug, error};

use super::LoadBalancerClient;
use crate::error::ClientError;
use crate::model::LoadBalancerTarget;

#[derive(Debug, Serialize)]
struct TargetBody {
    task_id: TaskId,
    ip_address: IpAddr,
}

#[derive(Debug, Serialize)]
struct TargetsRequest {
    targets: Vec<TargetBody>,
}

#[derive(Debug, Clone, Copy)]
enum Action {
    Register,
    Deregister,
}

impl Action {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Register => "register",
            Self::Deregister => "deregister",
        }
    }
}

/// Load balancer client speaking the cloud provider's HTTP API.
pub struct HttpLoadBalancerClient {
    client: reqwest::Client,
    base_url: Url,
}

impl HttpLoadBalancerClient {
    /// Create a client for the API at `base_url`.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ClientError> {
        let base_url =
            Url::parse(base_url).map_err(|e| ClientError::InvalidUrl(format!("{base_url}: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(ClientError::InvalidUrl(base_url.to_string()));
        }

        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self { client, base_url })
    }

    fn endpoint(&self, load_balancer_id: &LoadBalancerId, action: Action) -> Result<Url, ClientError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ClientError::InvalidUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .extend([
                "v1",
                "load-balancers",
                load_balancer_id.as_str(),
                "targets",
                action.as_str(),
            ]);
        Ok(url)
    }

    async fn post_all(&self, targets: &[LoadBalancerTarget], action: Action) -> Result<(), ClientError> {
        let mut by_lb: BTreeMap<&LoadBalancerId, Vec<TargetBody>> = BTreeMap::new();
        for target in targets {
            by_lb
                .entry(target.load_balancer_id())
                .or_default()
                .push(TargetBody {
                    task_id: target.task_id,
                    ip_address: target.ip_address,
                });
        }

        // Every group is attempted; a rejection from one load balancer does
        // not stop the others.
        let mut first_error = None;
        for (load_balancer_id, targets) in by_lb {
            if let Err(e) = self.post_group(load_balancer_id, targets, action).await {
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    async fn post_group(
        &self,
        load_balancer_id: &LoadBalancerId,
        targets: Vec<TargetBody>,
        action: Action,
    ) -> Result<(), ClientError> {
        let url = self.endpoint(load_balancer_id, action)?;
        debug!(
            load_balancer_id = %load_balancer_id,
            action = action.as_str(),
            count = targets.len(),
            "Posting targets"
        );

        let response = self
            .client
            .post(url)
            .json(&TargetsRequest { targets })
            .send()
            .await
            .map_err(|e| {
                error!(
                    load_balancer_id = %load_balancer_id,
                    action = action.as_str(),
                    error = %e,
                    "Load balancer API request failed"
                );
                ClientError::from(e)
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!(
                load_balancer_id = %load_balancer_id,
                action = action.as_str(),
                status = %status,
                body = %body,
                "Load balancer API rejected targets"
            );
            return Err(ClientError::Status {
                load_balancer_id: load_balancer_id.clone(),
                status: status.as_u16(),
                body,
            });
        }

        Ok(())
    }
}

#[async_trait]
impl LoadBalancerClient for HttpLoadBalancerClient {
    async fn register_all(&self, targets: &[LoadBalancerTarget]) -> Result<(), ClientError> {
        self.post_all(targets, Action::Register).await
    }

    async fn deregister_all(&self, targets: &[LoadBalancerTarget]) -> Result<(), ClientError> {
        self.post_all(targets, Action::Deregister).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_escapes_load_balancer_id() {
        let client =
            HttpLoadBalancerClient::new("http://lb.internal/api/", Duration::from_secs(1)).unwrap();
        let lb = LoadBalancerId::parse("arn:aws:elb/app/web#1").unwrap();

        let url = client.endpoint(&lb, Action::Deregister).unwrap();
        assert_eq!(
            url.as_str(),
            "http://lb.internal/api/v1/load-balancers/arn:aws:elb%2Fapp%2Fweb%231/targets/deregister"
        );
    }

    #[test]
    fn test_rejects_non_base_url() {
        assert!(matches!(
            HttpLoadBalancerClient::new("mailto:ops@example.com", Duration::from_secs(1)),
            Err(ClientError::InvalidUrl(_))
        ));
        assert!(matches!(
            HttpLoadBalancerClient::new("not a url", Duration::from_secs(1)),
            Err(ClientError::InvalidUrl(_))
        ));
    }
}
