//! Cloud load balancer client boundary.

mod http;
mod mock;

use async_trait::async_trait;

pub use http::HttpLoadBalancerClient;
pub use mock::{ClientCall, MockLoadBalancerClient};

use crate::error::ClientError;
use crate::model::LoadBalancerTarget;

/// Bulk registration calls against a cloud load balancing API.
///
/// Targets may span several load balancers. Every load balancer is
/// attempted, but an error only reports the first rejection, so callers that
/// need to know which targets were applied pass one load balancer per call.
/// Empty slices are no-ops. The client holds no per-call state and may be
/// called concurrently.
#[async_trait]
pub trait LoadBalancerClient: Send + Sync {
    async fn register_all(&self, targets: &[LoadBalancerTarget]) -> Result<(), ClientError>;

    async fn deregister_all(&self, targets: &[LoadBalancerTarget]) -> Result<(), ClientError>;
}
