use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use crate::job::Job;

/// Errors from queue operations.
#[derive(Debug, Error)]
pub enum JobError {
    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("job not found: {0}")]
    NotFound(Uuid),

    #[error("queue backend error: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// Result of an enqueue that accounts for idempotency.
#[derive(Debug, Clone)]
pub enum EnqueueResult {
    /// A new job was created.
    Created(Uuid),
    /// A queued/started job with the same idempotency key already exists.
    Duplicate(Uuid),
}

impl EnqueueResult {
    pub fn job_id(&self) -> Uuid {
        match self {
            EnqueueResult::Created(id) | EnqueueResult::Duplicate(id) => *id,
        }
    }

    pub fn is_created(&self) -> bool {
        matches!(self, EnqueueResult::Created(_))
    }
}

/// A typed job payload.
///
/// Commands are serialized to JSON and routed to the handler registered for
/// their `command_type`. An idempotency key suppresses re-enqueueing while a
/// job with the same key is still queued or started.
pub trait Command: Serialize {
    fn command_type(&self) -> &'static str;

    fn idempotency_key(&self) -> Option<String> {
        None
    }

    fn max_retries(&self) -> i32 {
        3
    }
}

/// Queue operations used by producers and the [`Worker`](crate::Worker).
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Enqueue a pre-serialized payload.
    ///
    /// Returns [`EnqueueResult::Duplicate`] when a queued/started job with
    /// the same idempotency key exists.
    async fn enqueue_raw(
        &self,
        job_type: &str,
        args: Value,
        idempotency_key: Option<String>,
        max_retries: i32,
    ) -> Result<EnqueueResult, JobError>;

    /// Current snapshot of a job, if known.
    async fn status(&self, job_id: Uuid) -> Result<Option<Job>, JobError>;

    /// Claim up to `limit` due jobs, transitioning them to started.
    async fn claim(&self, limit: usize) -> Result<Vec<Job>, JobError>;

    async fn mark_succeeded(&self, job_id: Uuid, return_value: Value) -> Result<(), JobError>;

    /// Record a failed attempt. Re-queues the job while retries remain,
    /// otherwise dead-letters it.
    async fn mark_failed(&self, job_id: Uuid, error: &str) -> Result<(), JobError>;
}

/// Typed enqueue on top of [`JobQueue::enqueue_raw`].
#[async_trait]
pub trait JobQueueExt: JobQueue {
    async fn enqueue<C>(&self, command: &C) -> Result<EnqueueResult, JobError>
    where
        C: Command + Sync,
    {
        let args = serde_json::to_value(command)?;
        self.enqueue_raw(
            command.command_type(),
            args,
            command.idempotency_key(),
            command.max_retries(),
        )
        .await
    }
}

#[async_trait]
impl<T: JobQueue + ?Sized> JobQueueExt for T {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enqueue_result_helpers() {
        let created = EnqueueResult::Created(Uuid::new_v4());
        assert!(created.is_created());

        let duplicate = EnqueueResult::Duplicate(Uuid::new_v4());
        assert!(!duplicate.is_created());
        assert_eq!(duplicate.job_id(), duplicate.job_id());
    }
}
