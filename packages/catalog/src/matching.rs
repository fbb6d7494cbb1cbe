//! Resource-to-item matching and item merging.

use uuid::Uuid;

use crate::error::CatalogError;
use crate::resolver::Resolver;
use crate::types::{ExternalResource, IdType, Item, ItemType, IDEAL_ID_TYPES};

impl Resolver {
    /// Find an existing item this resource belongs to.
    ///
    /// Prematched descriptors are curator-asserted identity and win
    /// outright. Otherwise lookup-id candidates are tried in the subtype's
    /// priority order against items' primary ids, falling back to the
    /// resource's own id pair. Matches are dereferenced through the merge
    /// chain, and a match found via an ideal-type candidate promotes the
    /// item's primary id when the current one is non-ideal. Promotion is
    /// one-way: an ideal primary id is never demoted.
    pub async fn match_existing_item(
        &self,
        resource: &ExternalResource,
        item_type: ItemType,
    ) -> Result<Option<Item>, CatalogError> {
        for link in &resource.prematched_resources {
            let other = match &link.url {
                Some(url) => self.store.resource_by_url(url).await?,
                None => None,
            };
            let other = match other {
                Some(other) => Some(other),
                None => match link.id_pair() {
                    Some((t, v)) => self.store.resource_by_id(t, v).await?,
                    None => None,
                },
            };
            if let Some(other) = other {
                if let Some(item) = self.get_item(&other).await? {
                    tracing::debug!(
                        resource = %resource.describe(),
                        link = %link.describe(),
                        item = %item.describe(),
                        "prematched link resolved item"
                    );
                    return Ok(Some(item));
                }
            }
        }

        for (id_type, id_value) in resource.lookup_id_candidates(item_type) {
            let found = match self.store.item_by_primary_id(id_type, &id_value).await? {
                Some(item) => Some(item),
                None => {
                    self.store
                        .item_by_primary_id(resource.id_type, &resource.id_value)
                        .await?
                }
            };
            let Some(found) = found else { continue };
            let mut item = self.final_item(found).await?;
            if item.item_type != item_type {
                continue;
            }
            let current_is_ideal = item
                .primary_lookup_id
                .as_ref()
                .is_some_and(|(t, _)| t.is_ideal());
            if id_type.is_ideal() && !current_is_ideal {
                item.primary_lookup_id = Some((id_type, id_value.clone()));
                self.store.save_item(&item).await?;
                tracing::info!(
                    item = %item.describe(),
                    id_type = %id_type,
                    "promoted primary lookup id"
                );
            }
            return Ok(Some(item));
        }
        Ok(None)
    }

    /// Attach the resource to a matching item, or create one.
    ///
    /// A fresh match beats the resource's prior item; the prior item beats
    /// creating a new one. When the attachment changes, `unmatch`/`match`
    /// audit actions are recorded on the old and new items. An
    /// undeterminable subtype returns `None` with no side effects.
    pub async fn match_or_create_item(
        &self,
        resource: &mut ExternalResource,
        default_type: Option<ItemType>,
    ) -> Result<Option<Item>, CatalogError> {
        let Some(item_type) = resource.preferred_item_type().or(default_type) else {
            tracing::debug!(resource = %resource.describe(), "no item subtype, leaving unresolved");
            return Ok(None);
        };
        let previous = resource.item;
        let matched = self.match_existing_item(resource, item_type).await?;
        let item = match matched {
            Some(item) => item,
            None => {
                let prior = match previous {
                    Some(prev) => self.store.item(prev).await?,
                    None => None,
                };
                match prior {
                    Some(prior) => self.final_item(prior).await?,
                    None => self.create_item(resource, item_type).await?,
                }
            }
        };

        if previous != Some(item.uuid) {
            if let Some(prev) = previous {
                self.store
                    .log_action(prev, "unmatch", &resource.describe())
                    .await?;
            }
            self.store
                .log_action(item.uuid, "match", &resource.describe())
                .await?;
            resource.item = Some(item.uuid);
            self.store.save_resource(resource).await?;
        }
        Ok(Some(item))
    }

    async fn create_item(
        &self,
        resource: &ExternalResource,
        item_type: ItemType,
    ) -> Result<Item, CatalogError> {
        let mut item = Item::new(item_type);
        item.primary_lookup_id = Some(resource.best_lookup_id());
        item.merge_from_resource(resource, false);
        item.normalize();
        self.store.save_item(&item).await?;
        tracing::info!(
            item = %item.describe(),
            resource = %resource.describe(),
            "created item"
        );
        Ok(item)
    }

    /// Follow the merge chain to the live item, bounded by the configured
    /// depth. Exceeding the bound is a data-integrity error, not a loop.
    pub async fn final_item(&self, item: Item) -> Result<Item, CatalogError> {
        let start = item.uuid;
        let mut current = item;
        for _ in 0..=self.config.max_merge_depth {
            let Some(next_id) = current.merged_to_item else {
                return Ok(current);
            };
            let Some(next) = self.store.item(next_id).await? else {
                return Ok(current);
            };
            current = next;
        }
        Err(CatalogError::MergeCycle {
            item: start,
            depth: self.config.max_merge_depth,
        })
    }

    /// Unify `source` into `target`: set the forwarding pointer, repoint
    /// resources, and refresh the target's primary id.
    pub async fn merge_items(&self, source_id: Uuid, target_id: Uuid) -> Result<(), CatalogError> {
        if source_id == target_id {
            return Err(CatalogError::MergeRejected(
                "cannot merge an item into itself".to_string(),
            ));
        }
        let Some(mut source) = self.store.item(source_id).await? else {
            return Err(CatalogError::MergeRejected(format!(
                "source item {source_id} not found"
            )));
        };
        let Some(target) = self.store.item(target_id).await? else {
            return Err(CatalogError::MergeRejected(format!(
                "target item {target_id} not found"
            )));
        };
        if target.merged_to_item.is_some() {
            return Err(CatalogError::MergeRejected(
                "target is itself merged into another item".to_string(),
            ));
        }
        if target.is_deleted {
            return Err(CatalogError::MergeRejected("target is deleted".to_string()));
        }
        if source.item_type != target.item_type {
            return Err(CatalogError::MergeRejected(format!(
                "cannot merge {} into {}",
                source.item_type, target.item_type
            )));
        }

        source.merged_to_item = Some(target_id);
        self.store.save_item(&source).await?;
        for mut resource in self.store.resources_for_item(source_id).await? {
            resource.item = Some(target_id);
            self.store.save_resource(&resource).await?;
        }
        self.store
            .log_action(source_id, "merge", &target.describe())
            .await?;
        self.refresh_primary_id(target_id).await?;
        Ok(())
    }

    /// Recompute an item's primary id from all its resources' lookup ids,
    /// preferring ideal schemes in their canonical order.
    pub async fn refresh_primary_id(&self, item_id: Uuid) -> Result<(), CatalogError> {
        let Some(mut item) = self.store.item(item_id).await? else {
            return Ok(());
        };
        let resources = self.store.resources_for_item(item_id).await?;
        let mut best: Option<(IdType, String)> = None;
        'search: for id_type in IDEAL_ID_TYPES {
            for resource in &resources {
                if let Some(value) = resource.all_lookup_ids().get(id_type) {
                    best = Some((*id_type, value.clone()));
                    break 'search;
                }
            }
        }
        if let Some(best) = best {
            if item.primary_lookup_id.as_ref() != Some(&best) {
                item.primary_lookup_id = Some(best);
                self.store.save_item(&item).await?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::CatalogStore;
    use crate::testing::TestHarness;
    use crate::types::LocalizedText;

    fn edition_resource(id_value: &str, isbn: Option<&str>) -> ExternalResource {
        let mut resource = ExternalResource::new(
            IdType::Goodreads,
            id_value,
            format!("https://goodreads.test/book/show/{id_value}"),
        );
        if let Some(isbn) = isbn {
            resource
                .other_lookup_ids
                .insert(IdType::Isbn, isbn.to_string());
        }
        resource
            .metadata
            .insert("title".into(), "A Book".into());
        resource.scraped_at = Some(chrono::Utc::now());
        resource
    }

    fn titled_item(item_type: ItemType, primary: (IdType, &str)) -> Item {
        let mut item = Item::new(item_type);
        item.localized_title.push(LocalizedText::new("en", "A Book"));
        item.primary_lookup_id = Some((primary.0, primary.1.to_string()));
        item
    }

    #[tokio::test]
    async fn matches_item_by_primary_lookup_id() {
        let h = TestHarness::new();
        let item = titled_item(ItemType::Edition, (IdType::Isbn, "9780451524935"));
        h.store.save_item(&item).await.unwrap();

        let resource = edition_resource("1", Some("9780451524935"));
        let matched = h
            .resolver
            .match_existing_item(&resource, ItemType::Edition)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(matched.uuid, item.uuid);
    }

    #[tokio::test]
    async fn ideal_candidate_promotes_non_ideal_primary_id() {
        let h = TestHarness::new();
        // Existing item keyed by the site-local id only.
        let item = titled_item(ItemType::Edition, (IdType::Goodreads, "1"));
        h.store.save_item(&item).await.unwrap();

        let resource = edition_resource("1", Some("9780451524935"));
        let matched = h
            .resolver
            .match_existing_item(&resource, ItemType::Edition)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(matched.uuid, item.uuid);
        assert_eq!(
            matched.primary_lookup_id,
            Some((IdType::Isbn, "9780451524935".to_string()))
        );
        // Persisted, not just returned.
        let stored = h.store.item(item.uuid).await.unwrap().unwrap();
        assert_eq!(
            stored.primary_lookup_id,
            Some((IdType::Isbn, "9780451524935".to_string()))
        );
    }

    #[tokio::test]
    async fn ideal_primary_id_is_never_demoted() {
        let h = TestHarness::new();
        let item = titled_item(ItemType::Edition, (IdType::Isbn, "9780451524935"));
        h.store.save_item(&item).await.unwrap();

        let resource = edition_resource("2", Some("9780451524935"));
        let matched = h
            .resolver
            .match_existing_item(&resource, ItemType::Edition)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(matched.uuid, item.uuid);
        assert_eq!(
            matched.primary_lookup_id,
            Some((IdType::Isbn, "9780451524935".to_string()))
        );
    }

    #[tokio::test]
    async fn prematched_link_short_circuits_and_records_match_action() {
        let h = TestHarness::new();
        // Resource B already owns item I1.
        let item = titled_item(ItemType::Edition, (IdType::Goodreads, "7"));
        h.store.save_item(&item).await.unwrap();
        let mut owned = edition_resource("7", None);
        owned.item = Some(item.uuid);
        h.store.save_resource(&owned).await.unwrap();

        // Resource A (a work page) prematched to B.
        let mut work = ExternalResource::new(
            IdType::GoodreadsWork,
            "700",
            "https://goodreads.test/work/show/700",
        );
        work.metadata.insert("title".into(), "A Book".into());
        work.scraped_at = Some(chrono::Utc::now());
        work.prematched_resources
            .push(crate::types::LinkDescriptor::from_url(&owned.url));

        let resolved = h
            .resolver
            .match_or_create_item(&mut work, Some(ItemType::Work))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(resolved.uuid, item.uuid);
        assert_eq!(h.store.item_count(), 1);

        let actions = h.store.actions_for(item.uuid);
        assert!(actions
            .iter()
            .any(|a| a.action == "match" && a.note == "goodreads_work:700"));
    }

    #[tokio::test]
    async fn unmatch_is_recorded_when_attachment_changes() {
        let h = TestHarness::new();
        let old_item = titled_item(ItemType::Edition, (IdType::Goodreads, "1"));
        h.store.save_item(&old_item).await.unwrap();
        let new_item = titled_item(ItemType::Edition, (IdType::Isbn, "9780451524935"));
        h.store.save_item(&new_item).await.unwrap();

        let mut resource = edition_resource("9", Some("9780451524935"));
        resource.item = Some(old_item.uuid);
        h.store.save_resource(&resource).await.unwrap();

        let resolved = h
            .resolver
            .match_or_create_item(&mut resource, Some(ItemType::Edition))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(resolved.uuid, new_item.uuid);
        assert!(h
            .store
            .actions_for(old_item.uuid)
            .iter()
            .any(|a| a.action == "unmatch"));
        assert!(h
            .store
            .actions_for(new_item.uuid)
            .iter()
            .any(|a| a.action == "match"));
    }

    #[tokio::test]
    async fn unknown_subtype_returns_none_without_side_effects() {
        let h = TestHarness::new();
        let mut resource = edition_resource("3", None);
        let resolved = h
            .resolver
            .match_or_create_item(&mut resource, None)
            .await
            .unwrap();
        assert!(resolved.is_none());
        assert_eq!(h.store.item_count(), 0);
        assert_eq!(h.store.resource_count(), 0);
    }

    #[tokio::test]
    async fn merge_chain_is_dereferenced_and_bounded() {
        let h = TestHarness::new();
        let mut a = titled_item(ItemType::Edition, (IdType::Goodreads, "a"));
        let b = titled_item(ItemType::Edition, (IdType::Goodreads, "b"));
        a.merged_to_item = Some(b.uuid);
        h.store.save_item(&a).await.unwrap();
        h.store.save_item(&b).await.unwrap();

        let live = h.resolver.final_item(a.clone()).await.unwrap();
        assert_eq!(live.uuid, b.uuid);

        // A two-item cycle must be detected, not followed forever.
        let mut c = titled_item(ItemType::Edition, (IdType::Goodreads, "c"));
        let mut d = titled_item(ItemType::Edition, (IdType::Goodreads, "d"));
        c.merged_to_item = Some(d.uuid);
        d.merged_to_item = Some(c.uuid);
        h.store.save_item(&c).await.unwrap();
        h.store.save_item(&d).await.unwrap();
        let err = h.resolver.final_item(c).await.unwrap_err();
        assert!(matches!(err, CatalogError::MergeCycle { .. }));
    }

    #[tokio::test]
    async fn merge_guards_reject_bad_targets() {
        let h = TestHarness::new();
        let a = titled_item(ItemType::Edition, (IdType::Goodreads, "a"));
        let b = titled_item(ItemType::Movie, (IdType::Imdb, "tt1"));
        let mut deleted = titled_item(ItemType::Edition, (IdType::Goodreads, "x"));
        deleted.is_deleted = true;
        h.store.save_item(&a).await.unwrap();
        h.store.save_item(&b).await.unwrap();
        h.store.save_item(&deleted).await.unwrap();

        assert!(h.resolver.merge_items(a.uuid, a.uuid).await.is_err());
        assert!(h.resolver.merge_items(a.uuid, b.uuid).await.is_err());
        assert!(h.resolver.merge_items(a.uuid, deleted.uuid).await.is_err());
    }

    #[tokio::test]
    async fn merge_repoints_resources_and_refreshes_primary_id() {
        let h = TestHarness::new();
        let a = titled_item(ItemType::Edition, (IdType::Goodreads, "a"));
        let b = titled_item(ItemType::Edition, (IdType::Goodreads, "b"));
        h.store.save_item(&a).await.unwrap();
        h.store.save_item(&b).await.unwrap();

        let mut resource = edition_resource("a", Some("9780441013593"));
        resource.item = Some(a.uuid);
        h.store.save_resource(&resource).await.unwrap();

        h.resolver.merge_items(a.uuid, b.uuid).await.unwrap();

        let merged = h.store.item(a.uuid).await.unwrap().unwrap();
        assert_eq!(merged.merged_to_item, Some(b.uuid));
        let repointed = h.store.resource_by_uuid(resource.uuid).await.unwrap().unwrap();
        assert_eq!(repointed.item, Some(b.uuid));
        // The target inherits the ideal id from the repointed resource.
        let target = h.store.item(b.uuid).await.unwrap().unwrap();
        assert_eq!(
            target.primary_lookup_id,
            Some((IdType::Isbn, "9780441013593".to_string()))
        );
    }
}
