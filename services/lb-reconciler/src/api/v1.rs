//! API v1 routes.
//!
//! Association management for jobs:
//! - `GET    /v1/jobs/{job_id}/load-balancers`
//! - `PUT    /v1/jobs/{job_id}/load-balancers/{load_balancer_id}`
//! - `DELETE /v1/jobs/{job_id}/load-balancers/{load_balancer_id}`
//! - `GET    /v1/jobs/{job_id}/load-balancers/{load_balancer_id}/targets`
//! - `GET    /v1/stats`
//!
//! Task lifecycle feed from the orchestrator:
//! - `POST   /v1/tasks/events`

use std::net::IpAddr;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use corral_id::{JobId, LoadBalancerId, TaskId};
use serde::{Deserialize, Serialize};

use crate::api::error::ApiError;
use crate::engine::StatsSnapshot;
use crate::model::{TargetState, Task};
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/jobs/{job_id}/load-balancers", get(list_load_balancers))
        .route(
            "/jobs/{job_id}/load-balancers/{load_balancer_id}",
            axum::routing::put(add_load_balancer).delete(remove_load_balancer),
        )
        .route(
            "/jobs/{job_id}/load-balancers/{load_balancer_id}/targets",
            get(list_targets),
        )
        .route("/tasks/events", post(task_event))
        .route("/stats", get(stats))
}

// =============================================================================
// Response Types
// =============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct LoadBalancersResponse {
    pub job_id: JobId,
    pub load_balancers: Vec<LoadBalancerId>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TargetResponse {
    pub task_id: TaskId,
    pub ip_address: IpAddr,
    pub state: TargetState,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TargetsResponse {
    pub job_id: JobId,
    pub load_balancer_id: LoadBalancerId,
    pub items: Vec<TargetResponse>,
}

// =============================================================================
// Handlers
// =============================================================================

fn parse_job_id(raw: &str) -> Result<JobId, ApiError> {
    raw.parse()
        .map_err(|_| ApiError::bad_request("invalid_job_id", "Invalid job ID format"))
}

fn parse_load_balancer_id(raw: &str) -> Result<LoadBalancerId, ApiError> {
    raw.parse().map_err(|e| {
        ApiError::bad_request(
            "invalid_load_balancer_id",
            format!("Invalid load balancer ID: {e}"),
        )
    })
}

async fn list_load_balancers(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Response, ApiError> {
    let job_id = parse_job_id(&job_id)?;
    let load_balancers = state.service().get_load_balancers(&job_id).await?;

    Ok(Json(LoadBalancersResponse {
        job_id,
        load_balancers,
    })
    .into_response())
}

async fn add_load_balancer(
    State(state): State<AppState>,
    Path((job_id, load_balancer_id)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    let job_id = parse_job_id(&job_id)?;
    let load_balancer_id = parse_load_balancer_id(&load_balancer_id)?;

    state
        .service()
        .add_load_balancer(job_id, load_balancer_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn remove_load_balancer(
    State(state): State<AppState>,
    Path((job_id, load_balancer_id)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    let job_id = parse_job_id(&job_id)?;
    let load_balancer_id = parse_load_balancer_id(&load_balancer_id)?;

    state
        .service()
        .remove_load_balancer(job_id, load_balancer_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_targets(
    State(state): State<AppState>,
    Path((job_id, load_balancer_id)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    let job_id = parse_job_id(&job_id)?;
    let load_balancer_id = parse_load_balancer_id(&load_balancer_id)?;

    let targets = state
        .service()
        .list_targets(job_id, load_balancer_id.clone())
        .await?;

    let items = targets
        .into_iter()
        .map(|(target, state)| TargetResponse {
            task_id: target.task_id,
            ip_address: target.ip_address,
            state,
        })
        .collect();

    Ok(Json(TargetsResponse {
        job_id,
        load_balancer_id,
        items,
    })
    .into_response())
}

/// Accept a task lifecycle change for asynchronous reconciliation.
///
/// Refused with a retryable 503 while the pipeline is stopped, since the
/// event would otherwise be dropped.
async fn task_event(
    State(state): State<AppState>,
    Json(task): Json<Task>,
) -> Result<StatusCode, ApiError> {
    let service = state.service();
    if !service.is_running().await {
        return Err(ApiError::service_unavailable(
            "pipeline_not_running",
            "Reconciliation pipeline is not running",
        ));
    }

    service.task_updated(task).await;
    Ok(StatusCode::ACCEPTED)
}

async fn stats(State(state): State<AppState>) -> Json<StatsSnapshot> {
    Json(state.service().stats())
}
