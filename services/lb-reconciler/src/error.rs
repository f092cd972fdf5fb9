//! Error types for the load balancer reconciler.
//!
//! Each collaborator boundary has its own error so failures can be isolated
//! at the stage that hit them.

use corral_id::{JobId, LoadBalancerId};
use thiserror::Error;

use crate::batch::BatchOutcome;
use crate::model::TargetState;

/// Target store failures.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backend could not serve the request.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Job/task lookup failures.
#[derive(Debug, Error)]
pub enum JobOperationsError {
    /// The job does not exist (or no longer exists).
    #[error("job not found: {0}")]
    JobNotFound(JobId),

    /// Transport-level failure talking to the control plane.
    #[error("control plane request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The control plane answered with a non-success status.
    #[error("control plane returned {status}: {body}")]
    Status { status: u16, body: String },
}

/// Cloud load balancer client failures.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Transport-level failure talking to the load balancer API.
    #[error("load balancer API request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The load balancer API answered with a non-success status.
    #[error("load balancer API returned {status} for {load_balancer_id}: {body}")]
    Status {
        load_balancer_id: LoadBalancerId,
        status: u16,
        body: String,
    },

    /// The configured base URL cannot carry path segments.
    #[error("invalid load balancer API URL: {0}")]
    InvalidUrl(String),

    /// The call was refused without reaching the network.
    #[error("rejected: {0}")]
    Rejected(String),
}

/// One failure inside a batch application.
///
/// Every variant names the load balancer whose group of targets failed;
/// groups for other load balancers are applied independently.
#[derive(Debug, Error)]
pub enum ApplyError {
    #[error("register call failed for {count} target(s) on {load_balancer_id}: {source}")]
    Register {
        load_balancer_id: LoadBalancerId,
        count: usize,
        #[source]
        source: ClientError,
    },

    #[error("deregister call failed for {count} target(s) on {load_balancer_id}: {source}")]
    Deregister {
        load_balancer_id: LoadBalancerId,
        count: usize,
        #[source]
        source: ClientError,
    },

    #[error("failed to persist {count} {state} target(s) on {load_balancer_id}: {source}")]
    Persist {
        load_balancer_id: LoadBalancerId,
        state: TargetState,
        count: usize,
        #[source]
        source: StoreError,
    },
}

/// Every failure hit while applying one batch.
///
/// Produced only after both partitions have completed, so a failure on one
/// side never hides the other side's result. `applied` counts the targets
/// that were confirmed and persisted despite the failures.
#[derive(Debug, Error)]
#[error("batch failed with {} error(s): {}", .errors.len(), join_errors(.errors))]
pub struct BatchError {
    pub errors: Vec<ApplyError>,
    pub applied: BatchOutcome,
}

fn join_errors(errors: &[ApplyError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Engine lifecycle failures.
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("reconciliation pipeline is already running")]
    AlreadyRunning,
}
