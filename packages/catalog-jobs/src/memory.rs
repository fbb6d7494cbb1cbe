//! In-process job queue for tests and single-node deployments.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use uuid::Uuid;

use crate::job::{retry_backoff, Job, JobStatus};
use crate::queue::{EnqueueResult, JobError, JobQueue};

#[derive(Default)]
struct State {
    jobs: HashMap<Uuid, Job>,
    pending: VecDeque<Uuid>,
}

/// In-memory [`JobQueue`]. Jobs are lost on process exit.
///
/// Failed jobs are re-queued with a capped exponential delay; a worker
/// polling on an interval picks them up once due.
#[derive(Default)]
pub struct MemoryJobQueue {
    state: Mutex<State>,
}

impl MemoryJobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of jobs in any state, for test assertions.
    pub fn job_count(&self) -> usize {
        self.state.lock().unwrap().jobs.len()
    }

    /// Clear retry delays so deferred jobs can be claimed now. Test helper.
    pub fn make_jobs_due(&self) {
        for job in self.state.lock().unwrap().jobs.values_mut() {
            job.run_at = None;
        }
    }

    /// Snapshot of all jobs of a given type, for test assertions.
    pub fn jobs_of_type(&self, job_type: &str) -> Vec<Job> {
        self.state
            .lock()
            .unwrap()
            .jobs
            .values()
            .filter(|j| j.job_type == job_type)
            .cloned()
            .collect()
    }

    fn find_active_by_key(state: &State, key: &str) -> Option<Uuid> {
        state
            .jobs
            .values()
            .find(|j| j.status.is_active() && j.idempotency_key.as_deref() == Some(key))
            .map(|j| j.id)
    }
}

#[async_trait]
impl JobQueue for MemoryJobQueue {
    async fn enqueue_raw(
        &self,
        job_type: &str,
        args: Value,
        idempotency_key: Option<String>,
        max_retries: i32,
    ) -> Result<EnqueueResult, JobError> {
        let mut state = self.state.lock().unwrap();
        if let Some(key) = &idempotency_key {
            if let Some(existing) = Self::find_active_by_key(&state, key) {
                return Ok(EnqueueResult::Duplicate(existing));
            }
        }
        let job = Job::new(job_type, args, idempotency_key, max_retries);
        let id = job.id;
        state.pending.push_back(id);
        state.jobs.insert(id, job);
        Ok(EnqueueResult::Created(id))
    }

    async fn status(&self, job_id: Uuid) -> Result<Option<Job>, JobError> {
        Ok(self.state.lock().unwrap().jobs.get(&job_id).cloned())
    }

    async fn claim(&self, limit: usize) -> Result<Vec<Job>, JobError> {
        let mut state = self.state.lock().unwrap();
        let now = Utc::now();
        let mut claimed = Vec::new();
        let mut deferred = VecDeque::new();
        while claimed.len() < limit {
            let Some(id) = state.pending.pop_front() else {
                break;
            };
            let Some(job) = state.jobs.get_mut(&id) else {
                continue;
            };
            if !job.is_due(now) {
                deferred.push_back(id);
                continue;
            }
            job.status = JobStatus::Started;
            job.updated_at = now;
            claimed.push(job.clone());
        }
        state.pending.append(&mut deferred);
        Ok(claimed)
    }

    async fn mark_succeeded(&self, job_id: Uuid, return_value: Value) -> Result<(), JobError> {
        let mut state = self.state.lock().unwrap();
        let job = state.jobs.get_mut(&job_id).ok_or(JobError::NotFound(job_id))?;
        job.status = JobStatus::Succeeded;
        job.return_value = Some(return_value);
        job.updated_at = Utc::now();
        Ok(())
    }

    async fn mark_failed(&self, job_id: Uuid, error: &str) -> Result<(), JobError> {
        let mut state = self.state.lock().unwrap();
        let job = state.jobs.get_mut(&job_id).ok_or(JobError::NotFound(job_id))?;
        job.error_message = Some(error.to_string());
        job.updated_at = Utc::now();
        if job.retry_count < job.max_retries {
            job.retry_count += 1;
            job.status = JobStatus::Queued;
            job.run_at = Some(Utc::now() + retry_backoff(job.retry_count));
            state.pending.push_back(job_id);
        } else {
            job.status = JobStatus::DeadLetter;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::{Command, JobQueueExt};
    use serde::Serialize;

    #[derive(Serialize)]
    struct Ping {
        target: String,
    }

    impl Command for Ping {
        fn command_type(&self) -> &'static str {
            "ping"
        }

        fn idempotency_key(&self) -> Option<String> {
            Some(format!("ping_{}", self.target))
        }
    }

    #[tokio::test]
    async fn idempotent_enqueue_coalesces_active_jobs() {
        let queue = MemoryJobQueue::new();
        let first = queue.enqueue(&Ping { target: "a".into() }).await.unwrap();
        let second = queue.enqueue(&Ping { target: "a".into() }).await.unwrap();
        assert!(first.is_created());
        assert!(!second.is_created());
        assert_eq!(first.job_id(), second.job_id());
        assert_eq!(queue.job_count(), 1);

        // A different key is not coalesced.
        let other = queue.enqueue(&Ping { target: "b".into() }).await.unwrap();
        assert!(other.is_created());
    }

    #[tokio::test]
    async fn finished_jobs_do_not_block_re_enqueue() {
        let queue = MemoryJobQueue::new();
        let first = queue.enqueue(&Ping { target: "a".into() }).await.unwrap();
        let claimed = queue.claim(10).await.unwrap();
        assert_eq!(claimed.len(), 1);
        queue
            .mark_succeeded(first.job_id(), Value::String("ok".into()))
            .await
            .unwrap();

        let second = queue.enqueue(&Ping { target: "a".into() }).await.unwrap();
        assert!(second.is_created());
        assert_ne!(first.job_id(), second.job_id());
    }

    #[tokio::test]
    async fn failed_job_retries_then_dead_letters() {
        let queue = MemoryJobQueue::new();
        let result = queue
            .enqueue_raw("ping", Value::Null, None, 1)
            .await
            .unwrap();
        let id = result.job_id();

        queue.claim(1).await.unwrap();
        queue.mark_failed(id, "boom").await.unwrap();
        let job = queue.status(id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Queued);
        assert_eq!(job.retry_count, 1);
        assert!(job.run_at.is_some());

        // The retry is delayed, not immediately claimable.
        assert!(queue.claim(1).await.unwrap().is_empty());
        queue.make_jobs_due();

        queue.claim(1).await.unwrap();
        queue.mark_failed(id, "boom again").await.unwrap();
        let job = queue.status(id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::DeadLetter);
        assert_eq!(job.error_message.as_deref(), Some("boom again"));
    }
}
