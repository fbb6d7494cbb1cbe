use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Lifecycle state of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Started,
    Succeeded,
    Failed,
    DeadLetter,
}

impl JobStatus {
    /// Queued or started jobs count against idempotency keys.
    pub fn is_active(self) -> bool {
        matches!(self, JobStatus::Queued | JobStatus::Started)
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Succeeded | JobStatus::Failed | JobStatus::DeadLetter
        )
    }
}

/// A serialized command plus its execution metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    /// Command type name, used to route the job to a handler.
    pub job_type: String,
    pub args: Value,
    /// At most one queued/started job exists per key.
    pub idempotency_key: Option<String>,
    pub status: JobStatus,
    pub retry_count: i32,
    pub max_retries: i32,
    /// Earliest time the job may be claimed; `None` means immediately.
    pub run_at: Option<DateTime<Utc>>,
    /// Value returned by the handler on success.
    pub return_value: Option<Value>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    pub fn new(
        job_type: &str,
        args: Value,
        idempotency_key: Option<String>,
        max_retries: i32,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            job_type: job_type.to_string(),
            args,
            idempotency_key,
            status: JobStatus::Queued,
            retry_count: 0,
            max_retries,
            run_at: None,
            return_value: None,
            error_message: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.run_at.map(|t| t <= now).unwrap_or(true)
    }
}

/// Delay before the nth retry attempt: doubles per attempt from 30s,
/// capped at one hour.
pub fn retry_backoff(retry_count: i32) -> chrono::Duration {
    let exp = (retry_count - 1).clamp(0, 10) as u32;
    chrono::Duration::seconds((30i64 << exp).min(3600))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn active_statuses() {
        assert!(JobStatus::Queued.is_active());
        assert!(JobStatus::Started.is_active());
        assert!(!JobStatus::Succeeded.is_active());
        assert!(JobStatus::DeadLetter.is_terminal());
    }

    #[test]
    fn job_without_run_at_is_due() {
        let job = Job::new("noop", Value::Null, None, 3);
        assert!(job.is_due(Utc::now()));
    }

    #[test]
    fn retry_backoff_doubles_then_caps() {
        assert_eq!(retry_backoff(1), chrono::Duration::seconds(30));
        assert_eq!(retry_backoff(2), chrono::Duration::seconds(60));
        assert_eq!(retry_backoff(3), chrono::Duration::seconds(120));
        assert_eq!(retry_backoff(12), chrono::Duration::seconds(3600));
    }
}
