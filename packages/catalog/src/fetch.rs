//! User-initiated fetches: admission control, idempotent enqueue, and the
//! fetch job itself.

use std::sync::Arc;

use async_trait::async_trait;
use catalog_jobs::{Command, EnqueueResult, JobHandler, JobQueue, JobQueueExt, JobStatus};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::cache::TtlCache;
use crate::config::CatalogConfig;
use crate::error::{CatalogError, DownloadError};
use crate::resolver::{ResolveOptions, Resolver};

/// Sentinel return value for a fetch that completed without producing an
/// item. Pollers must treat it as final, distinct from "still running".
pub const FETCH_FAILED: &str = "-";

/// Deterministic job identity for a fetch, so concurrent requests for the
/// same URL coalesce in the queue.
pub fn fetch_job_key(url: &str) -> String {
    format!("fetch_{}", hex::encode(Sha256::digest(url.as_bytes())))
}

/// Best-effort rate gates against fetch storms. Two independent TTL locks,
/// per actor and per URL; a fetch is admitted only when both are free, and
/// admission takes both. Test-and-set, not transactional: a lost race costs
/// one extra fetch at worst.
pub struct FetchGate {
    locks: TtlCache<()>,
    config: CatalogConfig,
}

impl FetchGate {
    pub fn new(config: CatalogConfig) -> Self {
        Self {
            locks: TtlCache::new(),
            config,
        }
    }

    /// `actor` is the authenticated user id; unauthenticated requests share
    /// one anonymous slot with a longer TTL.
    pub fn admit(&self, actor: Option<&str>, url: &str) -> bool {
        let actor_key = format!("fetch_rate_{}", actor.unwrap_or("anonymous"));
        if !self
            .locks
            .test_and_set(actor_key, (), self.config.actor_lock_ttl(actor.is_some()))
        {
            return false;
        }
        let url_key = format!("fetch_lock_{}", fetch_job_key(url));
        self.locks.test_and_set(url_key, (), self.config.url_lock_ttl())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchCommand {
    pub url: String,
    pub is_refetch: bool,
}

impl Command for FetchCommand {
    fn command_type(&self) -> &'static str {
        "fetch_url"
    }

    fn idempotency_key(&self) -> Option<String> {
        Some(fetch_job_key(&self.url))
    }

    fn max_retries(&self) -> i32 {
        1
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    Enqueued(Uuid),
    /// A job for this URL is already queued or started.
    Duplicate(Uuid),
    /// Rejected by the admission gates.
    Throttled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchPoll {
    /// Canonical URL of the resolved item.
    Done(String),
    Pending,
    Failed,
}

/// Front door for user-initiated fetches.
pub struct FetchController {
    queue: Arc<dyn JobQueue>,
    gate: FetchGate,
}

impl FetchController {
    pub fn new(queue: Arc<dyn JobQueue>, config: CatalogConfig) -> Self {
        Self {
            gate: FetchGate::new(config),
            queue,
        }
    }

    pub async fn enqueue_fetch(
        &self,
        actor: Option<&str>,
        url: &str,
        is_refetch: bool,
    ) -> Result<FetchOutcome, CatalogError> {
        if url::Url::parse(url).is_err() {
            return Err(CatalogError::InvalidUrl(url.to_string()));
        }
        if !self.gate.admit(actor, url) {
            tracing::info!(url = %url, "fetch throttled");
            return Ok(FetchOutcome::Throttled);
        }
        let result = self
            .queue
            .enqueue(&FetchCommand {
                url: url.to_string(),
                is_refetch,
            })
            .await?;
        Ok(match result {
            EnqueueResult::Created(id) => FetchOutcome::Enqueued(id),
            EnqueueResult::Duplicate(id) => FetchOutcome::Duplicate(id),
        })
    }

    pub async fn poll_fetch(&self, job_id: Uuid) -> Result<FetchPoll, CatalogError> {
        let Some(job) = self.queue.status(job_id).await? else {
            return Ok(FetchPoll::Failed);
        };
        Ok(match job.status {
            JobStatus::Queued | JobStatus::Started => FetchPoll::Pending,
            JobStatus::Succeeded => match job.return_value {
                Some(Value::String(url)) if url != FETCH_FAILED => FetchPoll::Done(url),
                _ => FetchPoll::Failed,
            },
            JobStatus::Failed | JobStatus::DeadLetter => FetchPoll::Failed,
        })
    }
}

/// Fallback lookup for URLs no registered adapter claims, e.g. searching an
/// aggregator for the page. Default implementation finds nothing.
#[async_trait]
pub trait RemoteSearch: Send + Sync {
    /// An alternative URL for the same resource, if one can be found.
    async fn search_by_url(&self, url: &str) -> Result<Option<String>, DownloadError>;
}

pub struct NoRemoteSearch;

#[async_trait]
impl RemoteSearch for NoRemoteSearch {
    async fn search_by_url(&self, _url: &str) -> Result<Option<String>, DownloadError> {
        Ok(None)
    }
}

pub struct FetchTask {
    resolver: Arc<Resolver>,
    remote_search: Arc<dyn RemoteSearch>,
}

impl FetchTask {
    pub fn new(resolver: Arc<Resolver>, remote_search: Arc<dyn RemoteSearch>) -> Self {
        Self {
            resolver,
            remote_search,
        }
    }

    async fn fetch(&self, command: &FetchCommand) -> Result<Option<String>, CatalogError> {
        let registry = self.resolver.registry();
        let mut site = registry.site_by_url(&command.url, true).await;
        if site.is_none() {
            match self.remote_search.search_by_url(&command.url).await {
                Ok(Some(alternative)) => {
                    site = registry.site_by_url(&alternative, true).await;
                }
                Ok(None) => {}
                Err(err) => {
                    tracing::warn!(url = %command.url, error = %err, "remote search failed");
                }
            }
        }
        let Some(site) = site else {
            tracing::warn!(url = %command.url, "no adapter claims url");
            return Ok(None);
        };

        let options = if command.is_refetch {
            ResolveOptions::refetch()
        } else {
            ResolveOptions::default()
        };
        let resource = match self.resolver.get_resource_ready(&site, options, None).await {
            Ok(resource) => resource,
            Err(CatalogError::Download(err)) if err.is_censored() => {
                tracing::info!(url = %command.url, "fetch withheld by source");
                return Ok(None);
            }
            Err(err) => return Err(err),
        };
        let Some(resource) = resource else {
            return Ok(None);
        };
        let item = self.resolver.get_item(&resource).await?;
        Ok(item.map(|item| item.url()))
    }
}

#[async_trait]
impl JobHandler for FetchTask {
    fn job_type(&self) -> &'static str {
        "fetch_url"
    }

    async fn run(&self, args: Value) -> Result<Value, Box<dyn std::error::Error + Send + Sync>> {
        let command: FetchCommand = serde_json::from_value(args)?;
        let outcome = self.fetch(&command).await?;
        Ok(Value::String(
            outcome.unwrap_or_else(|| FETCH_FAILED.to_string()),
        ))
    }
}
