//! Job dispatch loop.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::queue::{JobError, JobQueue};

/// Handles one job type. Handlers must be idempotent: a job may run more
/// than once if a previous attempt failed after partial progress.
#[async_trait]
pub trait JobHandler: Send + Sync {
    fn job_type(&self) -> &'static str;

    async fn run(&self, args: Value) -> Result<Value, Box<dyn std::error::Error + Send + Sync>>;
}

/// Claims jobs from a queue and dispatches them to registered handlers.
pub struct Worker {
    queue: Arc<dyn JobQueue>,
    handlers: HashMap<&'static str, Arc<dyn JobHandler>>,
    batch_size: usize,
}

impl Worker {
    pub fn new(queue: Arc<dyn JobQueue>) -> Self {
        Self {
            queue,
            handlers: HashMap::new(),
            batch_size: 10,
        }
    }

    pub fn register(&mut self, handler: Arc<dyn JobHandler>) -> &mut Self {
        self.handlers.insert(handler.job_type(), handler);
        self
    }

    /// Claim and run one batch of due jobs. Returns how many jobs ran.
    pub async fn tick(&self) -> Result<usize, JobError> {
        let jobs = self.queue.claim(self.batch_size).await?;
        let count = jobs.len();
        for job in jobs {
            let Some(handler) = self.handlers.get(job.job_type.as_str()) else {
                tracing::error!(job_id = %job.id, job_type = %job.job_type, "no handler registered");
                self.queue
                    .mark_failed(job.id, &format!("no handler for job type {}", job.job_type))
                    .await?;
                continue;
            };
            match handler.run(job.args.clone()).await {
                Ok(value) => {
                    tracing::info!(job_id = %job.id, job_type = %job.job_type, "job succeeded");
                    self.queue.mark_succeeded(job.id, value).await?;
                }
                Err(err) => {
                    tracing::warn!(
                        job_id = %job.id,
                        job_type = %job.job_type,
                        retry_count = job.retry_count,
                        error = %err,
                        "job failed"
                    );
                    self.queue.mark_failed(job.id, &err.to_string()).await?;
                }
            }
        }
        Ok(count)
    }

    /// Run ticks until the queue has no due jobs. Useful in tests to flush
    /// work enqueued by a handler mid-run.
    pub async fn drain(&self) -> Result<(), JobError> {
        // Bounded in case a handler keeps enqueueing due work every tick.
        for _ in 0..100 {
            if self.tick().await? == 0 {
                return Ok(());
            }
        }
        Ok(())
    }

    /// Poll the queue on an interval, running batches as they become due.
    pub async fn run(&self, poll_interval: Duration) -> Result<(), JobError> {
        loop {
            if self.tick().await? == 0 {
                tokio::time::sleep(poll_interval).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::JobStatus;
    use crate::memory::MemoryJobQueue;
    use crate::queue::JobQueueExt;
    use crate::queue::{Command, EnqueueResult};
    use serde::Serialize;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Serialize)]
    struct Echo {
        text: String,
    }

    impl Command for Echo {
        fn command_type(&self) -> &'static str {
            "echo"
        }
    }

    struct EchoHandler {
        runs: AtomicUsize,
    }

    #[async_trait]
    impl JobHandler for EchoHandler {
        fn job_type(&self) -> &'static str {
            "echo"
        }

        async fn run(
            &self,
            args: Value,
        ) -> Result<Value, Box<dyn std::error::Error + Send + Sync>> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            Ok(args)
        }
    }

    #[tokio::test]
    async fn dispatches_to_registered_handler() {
        let queue = Arc::new(MemoryJobQueue::new());
        let handler = Arc::new(EchoHandler {
            runs: AtomicUsize::new(0),
        });
        let mut worker = Worker::new(queue.clone());
        worker.register(handler.clone());

        let result = queue.enqueue(&Echo { text: "hi".into() }).await.unwrap();
        worker.drain().await.unwrap();

        assert_eq!(handler.runs.load(Ordering::SeqCst), 1);
        let job = queue.status(result.job_id()).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Succeeded);
        assert_eq!(job.return_value.unwrap()["text"], "hi");
    }

    #[tokio::test]
    async fn unknown_job_type_is_failed() {
        let queue = Arc::new(MemoryJobQueue::new());
        let worker = Worker::new(queue.clone());

        let result = queue
            .enqueue_raw("mystery", Value::Null, None, 0)
            .await
            .unwrap();
        let EnqueueResult::Created(id) = result else {
            panic!("expected created");
        };
        worker.drain().await.unwrap();

        let job = queue.status(id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::DeadLetter);
    }
}
