//! Redirect canonicalization.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::{DownloadError, DownloadErrorKind};

/// Resolves where a URL redirects to. Behind a trait so tests never touch
/// the network.
#[async_trait]
pub trait RedirectResolver: Send + Sync {
    /// Final URL after following redirects, or `None` when the URL does not
    /// redirect.
    async fn resolve(&self, url: &str, timeout: Duration)
        -> Result<Option<String>, DownloadError>;
}

/// HEAD-request resolver. The client follows redirects itself; we only
/// compare the final URL with the requested one.
pub struct HttpRedirectResolver {
    client: reqwest::Client,
}

impl Default for HttpRedirectResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpRedirectResolver {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl RedirectResolver for HttpRedirectResolver {
    async fn resolve(
        &self,
        url: &str,
        timeout: Duration,
    ) -> Result<Option<String>, DownloadError> {
        let response = self
            .client
            .head(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| {
                let kind = if e.is_timeout() {
                    DownloadErrorKind::Timeout
                } else {
                    DownloadErrorKind::Network
                };
                DownloadError::new(kind, url, e.to_string())
            })?;
        let final_url = response.url().as_str();
        if final_url != url {
            Ok(Some(final_url.to_string()))
        } else {
            Ok(None)
        }
    }
}
