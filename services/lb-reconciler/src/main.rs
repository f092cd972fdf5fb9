//! Corral load balancer reconciler.
//!
//! Serves the association API and runs the reconciliation pipeline that
//! registers running task IPs with their jobs' load balancers.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use corral_lb_reconciler::api;
use corral_lb_reconciler::cloud::{HttpLoadBalancerClient, LoadBalancerClient, MockLoadBalancerClient};
use corral_lb_reconciler::config::Config;
use corral_lb_reconciler::jobs::ControlPlaneJobOperations;
use corral_lb_reconciler::state::AppState;
use corral_lb_reconciler::store::InMemoryTargetStore;
use corral_lb_reconciler::LoadBalancerService;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| config.log_level.clone().into()))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!(
        listen_addr = %config.listen_addr,
        control_plane_url = %config.control_plane_url,
        lb_api_url = config.lb_api_url.as_deref().unwrap_or("<dry-run>"),
        batch_timeout_ms = config.batch_timeout.as_millis() as u64,
        batch_max_size = config.batch_max_size,
        "Configuration loaded"
    );

    let store = Arc::new(InMemoryTargetStore::new());
    let jobs = Arc::new(
        ControlPlaneJobOperations::new(&config.control_plane_url, config.http_timeout)
            .context("Failed to build control plane client")?,
    );
    let client: Arc<dyn LoadBalancerClient> = match &config.lb_api_url {
        Some(url) => Arc::new(
            HttpLoadBalancerClient::new(url, config.http_timeout)
                .context("Failed to build load balancer client")?,
        ),
        None => {
            warn!("CORRAL_LB_API_URL not set, load balancer calls are only logged");
            Arc::new(MockLoadBalancerClient::new())
        }
    };

    let service = Arc::new(LoadBalancerService::new(store, jobs, client, config.engine()?));
    service.start().await?;

    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

    let app = api::create_router(AppState::new(Arc::clone(&service)));
    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    info!(addr = %config.listen_addr, "Listening for connections");

    let mut server_handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.wait_for(|stop| *stop).await;
                info!("HTTP server shutting down");
            })
            .await
    });

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
        }
        result = &mut server_handle => {
            match result {
                Ok(Ok(())) => info!("Server exited normally"),
                Ok(Err(e)) => error!(error = %e, "Server error"),
                Err(e) => error!(error = %e, "Server task panicked"),
            }
        }
    }

    let _ = shutdown_tx.send(true);

    let shutdown_timeout = Duration::from_secs(10);
    if !server_handle.is_finished() {
        if let Err(e) = tokio::time::timeout(shutdown_timeout, &mut server_handle).await {
            warn!(error = %e, "HTTP server did not shut down in time");
        }
    }

    info!("Stopping reconciliation pipeline...");
    if let Err(e) = tokio::time::timeout(shutdown_timeout, service.stop()).await {
        warn!(error = %e, "Reconciliation pipeline did not stop in time");
    }

    info!(stats = ?service.stats(), "Load balancer reconciler shutdown complete");
    Ok(())
}
