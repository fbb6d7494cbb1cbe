//! Background crawl of a resource's related and prematched links.

use std::sync::Arc;

use async_trait::async_trait;
use catalog_jobs::{Command, JobHandler};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::error::CatalogError;
use crate::resolver::{ResolveOptions, Resolver};
use crate::types::{ExternalResource, ItemType, LinkDescriptor};

/// Crawl one resource's link frontier. Keyed by resource identity, so
/// re-enqueueing the same resource coalesces in the queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlCommand {
    pub resource_id: Uuid,
}

impl Command for CrawlCommand {
    fn command_type(&self) -> &'static str {
        "crawl_resource"
    }

    fn idempotency_key(&self) -> Option<String> {
        Some(format!("crawl_{}", self.resource_id))
    }
}

pub struct CrawlTask {
    resolver: Arc<Resolver>,
}

impl CrawlTask {
    pub fn new(resolver: Arc<Resolver>) -> Self {
        Self { resolver }
    }
}

#[async_trait]
impl JobHandler for CrawlTask {
    fn job_type(&self) -> &'static str {
        "crawl_resource"
    }

    async fn run(&self, args: Value) -> Result<Value, Box<dyn std::error::Error + Send + Sync>> {
        let command: CrawlCommand = serde_json::from_value(args)?;
        let crawled = self
            .resolver
            .crawl_related_resources(command.resource_id)
            .await?;
        Ok(json!({ "crawled": crawled }))
    }
}

/// Periodic re-scrape of podcast feeds for new episodes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshPodcastsCommand;

impl Command for RefreshPodcastsCommand {
    fn command_type(&self) -> &'static str {
        "refresh_podcasts"
    }

    fn idempotency_key(&self) -> Option<String> {
        Some("refresh_podcasts".to_string())
    }
}

pub struct RefreshPodcastsTask {
    resolver: Arc<Resolver>,
}

impl RefreshPodcastsTask {
    pub fn new(resolver: Arc<Resolver>) -> Self {
        Self { resolver }
    }
}

#[async_trait]
impl JobHandler for RefreshPodcastsTask {
    fn job_type(&self) -> &'static str {
        "refresh_podcasts"
    }

    async fn run(&self, args: Value) -> Result<Value, Box<dyn std::error::Error + Send + Sync>> {
        let _: RefreshPodcastsCommand = serde_json::from_value(args)?;
        let updated = self.resolver.refresh_podcasts().await?;
        Ok(json!({ "updated": updated }))
    }
}

impl Resolver {
    /// Walk a resource's related then prematched links, resolving each into
    /// its own resource/item pair. Prematched links assert identity, so
    /// their scraped data is folded into the originating item; related
    /// links only extend the crawl frontier.
    ///
    /// Every link is processed independently; one link's failure is logged
    /// and does not abort the rest. The task as a whole always completes.
    pub async fn crawl_related_resources(&self, resource_id: Uuid) -> Result<usize, CatalogError> {
        let Some(resource) = self.store.resource_by_uuid(resource_id).await? else {
            tracing::warn!(resource_id = %resource_id, "resource gone before crawl, nothing to do");
            return Ok(0);
        };
        let links: Vec<(LinkDescriptor, bool)> = resource
            .related_resources
            .iter()
            .map(|l| (l.clone(), false))
            .chain(
                resource
                    .prematched_resources
                    .iter()
                    .map(|l| (l.clone(), true)),
            )
            .collect();

        let mut crawled = 0;
        for (link, prematched) in links {
            match self.crawl_link(&resource, &link, prematched).await {
                Ok(true) => crawled += 1,
                Ok(false) => {}
                Err(err) => {
                    tracing::error!(
                        resource = %resource.describe(),
                        link = %link.describe(),
                        error = %err,
                        "crawl link failed"
                    );
                }
            }
        }
        tracing::info!(
            resource = %resource.describe(),
            crawled,
            "crawl finished"
        );
        Ok(crawled)
    }

    async fn crawl_link(
        &self,
        origin: &ExternalResource,
        link: &LinkDescriptor,
        prematched: bool,
    ) -> Result<bool, CatalogError> {
        let site = match link.id_pair() {
            Some((t, v)) => self.registry.site_by_id(t, v),
            None => match &link.url {
                Some(url) => self.registry.site_by_url(url, true).await,
                None => None,
            },
        };
        let Some(site) = site else {
            tracing::error!(link = %link.describe(), "no adapter for crawl link, skipping");
            return Ok(false);
        };

        let Some(child) = self
            .get_resource_ready(&site, ResolveOptions::default(), link.content.clone())
            .await?
        else {
            return Ok(false);
        };

        if prematched {
            if let Some(item_id) = origin.item {
                if let Some(item) = self.store.item(item_id).await? {
                    let mut item = self.final_item(item).await?;
                    item.merge_from_resource(&child, false);
                    item.normalize();
                    item.validate()?;
                    self.store.save_item(&item).await?;
                }
            }
        }
        Ok(true)
    }

    /// Re-run the secondary scrape pass over every podcast's resources.
    /// Per-item failures are logged and skipped.
    pub async fn refresh_podcasts(&self) -> Result<usize, CatalogError> {
        let items = self.store.items_by_type(ItemType::Podcast).await?;
        let mut updated = 0;
        for item in items {
            match self.refresh_item_additional_data(&item).await {
                Ok(true) => updated += 1,
                Ok(false) => {}
                Err(err) => {
                    tracing::error!(item = %item.describe(), error = %err, "podcast refresh failed");
                }
            }
        }
        Ok(updated)
    }

    async fn refresh_item_additional_data(
        &self,
        item: &crate::types::Item,
    ) -> Result<bool, CatalogError> {
        let mut item = item.clone();
        let mut changed = false;
        for resource in self.store.resources_for_item(item.uuid).await? {
            let Some(site) = self.registry.site_by_id(resource.id_type, &resource.id_value)
            else {
                continue;
            };
            match site.adapter.scrape_additional_data(&resource, &mut item).await {
                Ok(true) => changed = true,
                Ok(false) => {}
                Err(err) if err.is_censored() => {
                    tracing::info!(resource = %resource.describe(), "refresh withheld by source");
                }
                Err(err) => return Err(err.into()),
            }
        }
        if changed {
            item.normalize();
            item.validate()?;
            self.store.save_item(&item).await?;
        }
        Ok(changed)
    }
}
