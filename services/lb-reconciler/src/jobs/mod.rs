//! Job and task lookups.
//!
//! The orchestration engine owns job and task lifecycle; the reconciler only
//! reads from it while projecting associations into targets.

mod http;
mod memory;

use async_trait::async_trait;
use corral_id::JobId;

pub use http::ControlPlaneJobOperations;
pub use memory::InMemoryJobOperations;

use crate::error::JobOperationsError;
use crate::model::{Job, Task};

/// Read access to jobs and their tasks.
///
/// Implementations must be cheap enough to call once per association event.
#[async_trait]
pub trait JobOperations: Send + Sync {
    /// Look up a job. `Ok(None)` means the job does not exist.
    async fn get_job(&self, job_id: &JobId) -> Result<Option<Job>, JobOperationsError>;

    /// Current tasks of a job.
    ///
    /// Returns [`JobOperationsError::JobNotFound`] for unknown jobs.
    async fn list_tasks(&self, job_id: &JobId) -> Result<Vec<Task>, JobOperationsError>;
}
