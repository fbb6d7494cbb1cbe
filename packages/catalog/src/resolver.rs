//! Resolution engine: drives a resource from unscraped to ready, attaches
//! a canonical item, and schedules follow-up crawling.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use catalog_jobs::{JobQueue, JobQueueExt};
use uuid::Uuid;

use crate::config::CatalogConfig;
use crate::crawl::CrawlCommand;
use crate::error::CatalogError;
use crate::sites::{BoundSite, SiteRegistry};
use crate::store::CatalogStore;
use crate::types::{ExternalResource, Item, ItemType, ResourceContent};

/// Behavior switches for one resolution pass.
///
/// The flags cascade: linking needs an item to link to, and creating an
/// item is pointless without saving it, so `auto_link` forces `auto_create`
/// which forces `auto_save`.
#[derive(Debug, Clone, Copy)]
pub struct ResolveOptions {
    pub auto_save: bool,
    pub auto_create: bool,
    pub auto_link: bool,
    /// Re-scrape even when the resource is already ready.
    pub ignore_existing_content: bool,
}

impl Default for ResolveOptions {
    fn default() -> Self {
        Self {
            auto_save: true,
            auto_create: true,
            auto_link: true,
            ignore_existing_content: false,
        }
    }
}

impl ResolveOptions {
    /// Scrape only; no item matching, no persistence.
    pub fn scrape_only() -> Self {
        Self {
            auto_save: false,
            auto_create: false,
            auto_link: false,
            ignore_existing_content: false,
        }
    }

    pub fn refetch() -> Self {
        Self {
            ignore_existing_content: true,
            ..Self::default()
        }
    }
}

pub struct Resolver {
    pub(crate) store: Arc<dyn CatalogStore>,
    pub(crate) registry: Arc<SiteRegistry>,
    pub(crate) queue: Arc<dyn JobQueue>,
    pub(crate) config: CatalogConfig,
}

impl Resolver {
    pub fn new(
        store: Arc<dyn CatalogStore>,
        registry: Arc<SiteRegistry>,
        queue: Arc<dyn JobQueue>,
        config: CatalogConfig,
    ) -> Self {
        Self {
            store,
            registry,
            queue,
            config,
        }
    }

    pub fn registry(&self) -> &SiteRegistry {
        &self.registry
    }

    /// Existing resource for this site binding, or a fresh unscraped one.
    pub async fn get_resource(&self, site: &BoundSite) -> Result<ExternalResource, CatalogError> {
        if let Some(resource) = self
            .store
            .resource_by_id(site.id_type(), &site.id_value)
            .await?
        {
            return Ok(resource);
        }
        if let Some(resource) = self.store.resource_by_url(&site.url).await? {
            return Ok(resource);
        }
        Ok(ExternalResource::new(
            site.id_type(),
            &site.id_value,
            &site.url,
        ))
    }

    /// Drive a resource to readiness: scrape if needed, match or create an
    /// item, persist both, resolve required links, and enqueue a crawl for
    /// related/prematched links.
    ///
    /// Returns `None` when the scrape produced no usable metadata; that is
    /// terminal for this pass and retried only via an explicit refetch.
    /// Callers must check readiness before trusting the attached item.
    ///
    /// Boxed because required-resource handling recurses (season needs its
    /// show, which may need further resources).
    pub fn get_resource_ready<'a>(
        &'a self,
        site: &'a BoundSite,
        options: ResolveOptions,
        preloaded: Option<ResourceContent>,
    ) -> Pin<Box<dyn Future<Output = Result<Option<ExternalResource>, CatalogError>> + Send + 'a>>
    {
        Box::pin(async move {
            let mut options = options;
            if options.auto_link {
                options.auto_create = true;
            }
            if options.auto_create {
                options.auto_save = true;
            }

            let mut resource = self.get_resource(site).await?;
            if !resource.ready() || options.ignore_existing_content {
                let content = match preloaded {
                    Some(content) => content,
                    None => site.adapter.scrape(&site.url, &site.id_value).await?,
                };
                resource.update_content(content);
            }
            if !resource.ready() {
                tracing::error!(
                    resource = %resource.describe(),
                    url = %site.url,
                    "scrape produced no usable metadata"
                );
                return Ok(None);
            }

            // Re-run matching even when the resource already owns an item: a
            // re-scrape can surface an ideal id that points at a better one.
            if options.auto_create {
                self.match_or_create_item(&mut resource, site.adapter.default_item_type())
                    .await?;
            }

            if options.auto_save {
                self.store.save_resource(&resource).await?;
                if let Some(item_id) = resource.item {
                    if let Some(mut item) = self.store.item(item_id).await? {
                        item.merge_from_resource(&resource, options.ignore_existing_content);
                        item.normalize();
                        item.validate()?;
                        self.store.save_item(&item).await?;
                        self.run_additional_scrape(site, &resource, &mut item).await?;
                    }
                }
            }

            if options.auto_link {
                self.link_required_resources(&resource, options).await?;
                if !resource.related_resources.is_empty()
                    || !resource.prematched_resources.is_empty()
                {
                    self.queue
                        .enqueue(&CrawlCommand {
                            resource_id: resource.uuid,
                        })
                        .await?;
                }
                if let Some(item_id) = resource.item {
                    self.update_item_links(&resource, item_id).await?;
                }
            }

            Ok(Some(resource))
        })
    }

    /// Secondary scrape pass; failures never block readiness.
    async fn run_additional_scrape(
        &self,
        site: &BoundSite,
        resource: &ExternalResource,
        item: &mut Item,
    ) -> Result<(), CatalogError> {
        match site.adapter.scrape_additional_data(resource, item).await {
            Ok(true) => {
                item.normalize();
                item.validate()?;
                self.store.save_item(item).await?;
            }
            Ok(false) => {}
            Err(err) if err.is_censored() => {
                tracing::info!(resource = %resource.describe(), "additional scrape withheld by source");
            }
            Err(err) => {
                tracing::error!(
                    resource = %resource.describe(),
                    error = %err,
                    "additional scrape failed"
                );
            }
        }
        Ok(())
    }

    /// Resolve each required link. A link no adapter claims is logged and
    /// skipped; a failing one propagates to the caller.
    async fn link_required_resources(
        &self,
        resource: &ExternalResource,
        options: ResolveOptions,
    ) -> Result<(), CatalogError> {
        for link in &resource.required_resources {
            let child_site = match &link.url {
                Some(url) => self.registry.site_by_url(url, true).await,
                None => link
                    .id_pair()
                    .and_then(|(t, v)| self.registry.site_by_id(t, v)),
            };
            let Some(child_site) = child_site else {
                tracing::error!(
                    resource = %resource.describe(),
                    link = %link.describe(),
                    "no adapter for required resource, skipping"
                );
                continue;
            };
            let child_options = ResolveOptions {
                auto_link: false,
                ignore_existing_content: false,
                ..options
            };
            self.get_resource_ready(&child_site, child_options, link.content.clone())
                .await?;
        }
        Ok(())
    }

    /// The live item this resource belongs to, with the merge chain
    /// dereferenced.
    pub async fn get_item(&self, resource: &ExternalResource) -> Result<Option<Item>, CatalogError> {
        let Some(item_id) = resource.item else {
            return Ok(None);
        };
        let Some(item) = self.store.item(item_id).await? else {
            return Ok(None);
        };
        Ok(Some(self.final_item(item).await?))
    }

    /// Wire season-to-show, episode-to-parent and edition-to-work links
    /// from this resource's required resources.
    async fn update_item_links(
        &self,
        resource: &ExternalResource,
        item_id: Uuid,
    ) -> Result<(), CatalogError> {
        let Some(mut item) = self.store.item(item_id).await? else {
            return Ok(());
        };
        let mut changed = false;
        for link in &resource.required_resources {
            let child = match link.id_pair() {
                Some((t, v)) => self.store.resource_by_id(t, v).await?,
                None => match &link.url {
                    Some(url) => self.store.resource_by_url(url).await?,
                    None => None,
                },
            };
            let Some(child) = child else { continue };
            let Some(child_item) = self.get_item(&child).await? else {
                continue;
            };
            match (item.item_type, child_item.item_type) {
                (ItemType::TvSeason, ItemType::TvShow)
                | (ItemType::TvEpisode, ItemType::TvSeason)
                | (ItemType::PodcastEpisode, ItemType::Podcast) => {
                    if item.parent_item != Some(child_item.uuid) {
                        item.parent_item = Some(child_item.uuid);
                        changed = true;
                    }
                }
                (ItemType::Edition, ItemType::Work) => {
                    if item.work_item != Some(child_item.uuid) {
                        item.work_item = Some(child_item.uuid);
                        changed = true;
                    }
                }
                _ => {}
            }
        }
        if changed {
            self.store.save_item(&item).await?;
        }
        Ok(())
    }
}
