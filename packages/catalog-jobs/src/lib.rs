//! Background job queue for catalog resolution work.
//!
//! Long-running scrape and crawl operations are offloaded to a queue with
//! at-least-once delivery: a job may run more than once on retry, so every
//! handler must be idempotent. The crate provides:
//!
//! - [`JobQueue`] — the queue trait (enqueue, status, claim, mark),
//! - [`Command`] — typed job payloads with optional idempotency keys,
//! - [`MemoryJobQueue`] — in-process queue for tests and single-node use,
//! - [`Worker`] — claims jobs and dispatches them to registered handlers.

pub mod job;
pub mod memory;
pub mod queue;
pub mod worker;

pub use job::{retry_backoff, Job, JobStatus};
pub use memory::MemoryJobQueue;
pub use queue::{Command, EnqueueResult, JobError, JobQueue, JobQueueExt};
pub use worker::{JobHandler, Worker};
