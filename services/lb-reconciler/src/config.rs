//! Reconciler configuration.
//!
//! Env-driven. The batch window bounds have no defaults and must be set.

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{Context, Result};
use corral_reconcile::WindowConfig;

use crate::engine::EngineConfig;

/// Load balancer reconciler configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP listen address.
    pub listen_addr: SocketAddr,

    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Control plane base URL for job and task lookups.
    pub control_plane_url: String,

    /// Cloud load balancer API base URL. `None` runs the dry-run client.
    pub lb_api_url: Option<String>,

    /// Maximum time a batch window stays open.
    pub batch_timeout: Duration,

    /// Maximum number of targets in one batch window.
    pub batch_max_size: usize,

    /// Maximum number of batches applied at once.
    pub apply_concurrency: usize,

    /// Timeout for outbound HTTP calls.
    pub http_timeout: Duration,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let listen_addr = lookup("CORRAL_LISTEN_ADDR")
            .unwrap_or_else(|| "127.0.0.1:8090".to_string())
            .parse()
            .context("CORRAL_LISTEN_ADDR must be a socket address (host:port).")?;

        let log_level = lookup("CORRAL_LOG_LEVEL").unwrap_or_else(|| "info".to_string());

        let control_plane_url = lookup("CORRAL_CONTROL_PLANE_URL")
            .unwrap_or_else(|| "http://localhost:8080".to_string());

        let lb_api_url = lookup("CORRAL_LB_API_URL").filter(|v| !v.trim().is_empty());

        let batch_timeout_ms: u64 = lookup("CORRAL_BATCH_TIMEOUT_MS")
            .context("Missing batch timeout. Set CORRAL_BATCH_TIMEOUT_MS.")?
            .parse()
            .context("CORRAL_BATCH_TIMEOUT_MS must be an integer (milliseconds).")?;

        let batch_max_size: usize = lookup("CORRAL_BATCH_MAX_SIZE")
            .context("Missing batch size. Set CORRAL_BATCH_MAX_SIZE.")?
            .parse()
            .context("CORRAL_BATCH_MAX_SIZE must be an integer.")?;

        let apply_concurrency: usize = lookup("CORRAL_APPLY_CONCURRENCY")
            .map(|v| v.parse())
            .transpose()
            .context("CORRAL_APPLY_CONCURRENCY must be an integer.")?
            .unwrap_or(1)
            .max(1);

        let http_timeout_secs: u64 = lookup("CORRAL_HTTP_TIMEOUT_SECS")
            .map(|v| v.parse())
            .transpose()
            .context("CORRAL_HTTP_TIMEOUT_SECS must be an integer (seconds).")?
            .unwrap_or(30);

        let config = Self {
            listen_addr,
            log_level,
            control_plane_url,
            lb_api_url,
            batch_timeout: Duration::from_millis(batch_timeout_ms),
            batch_max_size,
            apply_concurrency,
            http_timeout: Duration::from_secs(http_timeout_secs.max(1)),
        };

        // Surface invalid window bounds at startup rather than at engine start.
        config.engine()?;
        Ok(config)
    }

    /// Engine settings derived from this configuration.
    pub fn engine(&self) -> Result<EngineConfig> {
        let window = WindowConfig::new(self.batch_timeout, self.batch_max_size)
            .context("Invalid batch window configuration.")?;
        Ok(EngineConfig::new(window).with_apply_concurrency(self.apply_concurrency))
    }
}
