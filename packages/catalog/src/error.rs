//! Error types for catalog resolution.

use thiserror::Error;
use uuid::Uuid;

use crate::types::IdType;

/// Classifies a failed network fetch during scraping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadErrorKind {
    Network,
    Timeout,
    NotFound,
    /// The source deliberately withholds this page. Expected and benign;
    /// never logged at error level.
    Censorship,
    InvalidContent,
}

#[derive(Debug, Error)]
#[error("download failed ({kind:?}) for {url}: {message}")]
pub struct DownloadError {
    pub kind: DownloadErrorKind,
    pub url: String,
    pub message: String,
}

impl DownloadError {
    pub fn new(kind: DownloadErrorKind, url: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            url: url.into(),
            message: message.into(),
        }
    }

    pub fn is_censored(&self) -> bool {
        self.kind == DownloadErrorKind::Censorship
    }
}

#[derive(Debug, Error)]
pub enum CatalogError {
    /// An id type was registered twice. Programming error at startup.
    #[error("site adapter already registered for id type {0:?}")]
    DuplicateRegistration(IdType),

    #[error(transparent)]
    Download(#[from] DownloadError),

    /// An item's public representation is invalid after a merge. Fatal to
    /// the save; an invalid item must never be persisted silently.
    #[error("schema validation failed for item {item}: {reason}")]
    SchemaValidation { item: Uuid, reason: String },

    /// A merge chain exceeded the depth bound. Data-integrity error.
    #[error("merge chain starting at item {item} did not terminate within {depth} hops")]
    MergeCycle { item: Uuid, depth: usize },

    #[error("merge rejected: {0}")]
    MergeRejected(String),

    #[error("invalid url: {0}")]
    InvalidUrl(String),

    #[error("storage error: {0}")]
    Storage(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error(transparent)]
    Queue(#[from] catalog_jobs::JobError),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl CatalogError {
    pub fn storage(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        CatalogError::Storage(Box::new(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn censorship_is_distinguished() {
        let err = DownloadError::new(DownloadErrorKind::Censorship, "https://x.test/1", "blocked");
        assert!(err.is_censored());
        let err = DownloadError::new(DownloadErrorKind::Timeout, "https://x.test/1", "slow");
        assert!(!err.is_censored());
    }
}
