//! In-memory job/task index.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use corral_id::{JobId, TaskId};
use tokio::sync::RwLock;

use super::JobOperations;
use crate::error::JobOperationsError;
use crate::model::{Job, Task};

#[derive(Debug)]
struct JobEntry {
    job: Job,
    tasks: BTreeMap<TaskId, Task>,
}

/// Job operations backed by a local index.
///
/// Used by tests and by local deployments where tasks are fed in directly.
#[derive(Debug, Default)]
pub struct InMemoryJobOperations {
    jobs: RwLock<HashMap<JobId, JobEntry>>,
}

impl InMemoryJobOperations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a job with no tasks. Existing tasks are kept.
    pub async fn insert_job(&self, job: Job) {
        let mut jobs = self.jobs.write().await;
        jobs.entry(job.id)
            .and_modify(|entry| entry.job = job.clone())
            .or_insert_with(|| JobEntry {
                job,
                tasks: BTreeMap::new(),
            });
    }

    /// Insert or replace a task. The owning job is created if missing.
    pub async fn upsert_task(&self, task: Task) {
        let mut jobs = self.jobs.write().await;
        let entry = jobs.entry(task.job_id).or_insert_with(|| JobEntry {
            job: Job { id: task.job_id },
            tasks: BTreeMap::new(),
        });
        entry.tasks.insert(task.id, task);
    }

    /// Drop a job and all of its tasks.
    pub async fn remove_job(&self, job_id: &JobId) -> bool {
        self.jobs.write().await.remove(job_id).is_some()
    }
}

#[async_trait]
impl JobOperations for InMemoryJobOperations {
    async fn get_job(&self, job_id: &JobId) -> Result<Option<Job>, JobOperationsError> {
        let jobs = self.jobs.read().await;
        Ok(jobs.get(job_id).map(|entry| entry.job.clone()))
    }

    async fn list_tasks(&self, job_id: &JobId) -> Result<Vec<Task>, JobOperationsError> {
        let jobs = self.jobs.read().await;
        jobs.get(job_id)
            .map(|entry| entry.tasks.values().cloned().collect())
            .ok_or(JobOperationsError::JobNotFound(*job_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TaskState;

    fn task(job_id: JobId, state: TaskState) -> Task {
        Task {
            id: TaskId::new(),
            job_id,
            state,
            attributes: HashMap::new(),
        }
    }

    #[tokio::test]
    async fn test_unknown_job() {
        let jobs = InMemoryJobOperations::new();
        let job_id = JobId::new();

        assert_eq!(jobs.get_job(&job_id).await.unwrap(), None);
        assert!(matches!(
            jobs.list_tasks(&job_id).await,
            Err(JobOperationsError::JobNotFound(id)) if id == job_id
        ));
    }

    #[tokio::test]
    async fn test_upsert_task_replaces_previous_state() {
        let jobs = InMemoryJobOperations::new();
        let job_id = JobId::new();
        let mut t = task(job_id, TaskState::Launched);

        jobs.upsert_task(t.clone()).await;
        t.state = TaskState::Started;
        jobs.upsert_task(t.clone()).await;

        assert_eq!(jobs.get_job(&job_id).await.unwrap(), Some(Job { id: job_id }));
        assert_eq!(jobs.list_tasks(&job_id).await.unwrap(), vec![t]);
    }

    #[tokio::test]
    async fn test_insert_job_keeps_tasks() {
        let jobs = InMemoryJobOperations::new();
        let job_id = JobId::new();
        jobs.upsert_task(task(job_id, TaskState::Started)).await;
        jobs.insert_job(Job { id: job_id }).await;

        assert_eq!(jobs.list_tasks(&job_id).await.unwrap().len(), 1);
        assert!(jobs.remove_job(&job_id).await);
        assert!(!jobs.remove_job(&job_id).await);
    }
}
