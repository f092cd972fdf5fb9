//! Application state shared across request handlers.

use std::sync::Arc;

use crate::engine::LoadBalancerService;

/// Shared application state.
///
/// This is passed to all request handlers via Axum's state extractor.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    service: Arc<LoadBalancerService>,
}

impl AppState {
    pub fn new(service: Arc<LoadBalancerService>) -> Self {
        Self {
            inner: Arc::new(AppStateInner { service }),
        }
    }

    /// The reconciliation engine.
    pub fn service(&self) -> &LoadBalancerService {
        &self.inner.service
    }
}
