//! In-memory store for tests and single-process use.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use super::{CatalogStore, ItemAction};
use crate::error::CatalogError;
use crate::types::{ExternalResource, IdType, Item, ItemType};

#[derive(Default)]
struct Inner {
    resources: HashMap<Uuid, ExternalResource>,
    items: HashMap<Uuid, Item>,
    actions: Vec<ItemAction>,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Audit entries recorded for an item, oldest first. Test helper.
    pub fn actions_for(&self, item: Uuid) -> Vec<ItemAction> {
        self.inner
            .read()
            .unwrap()
            .actions
            .iter()
            .filter(|a| a.item == item)
            .cloned()
            .collect()
    }

    pub fn item_count(&self) -> usize {
        self.inner.read().unwrap().items.len()
    }

    pub fn resource_count(&self) -> usize {
        self.inner.read().unwrap().resources.len()
    }
}

#[async_trait]
impl CatalogStore for MemoryStore {
    async fn resource_by_url(&self, url: &str) -> Result<Option<ExternalResource>, CatalogError> {
        let inner = self.inner.read().unwrap();
        Ok(inner.resources.values().find(|r| r.url == url).cloned())
    }

    async fn resource_by_id(
        &self,
        id_type: IdType,
        id_value: &str,
    ) -> Result<Option<ExternalResource>, CatalogError> {
        let inner = self.inner.read().unwrap();
        Ok(inner
            .resources
            .values()
            .find(|r| r.id_type == id_type && r.id_value == id_value)
            .cloned())
    }

    async fn resource_by_uuid(&self, uuid: Uuid) -> Result<Option<ExternalResource>, CatalogError> {
        Ok(self.inner.read().unwrap().resources.get(&uuid).cloned())
    }

    async fn save_resource(&self, resource: &ExternalResource) -> Result<(), CatalogError> {
        let mut inner = self.inner.write().unwrap();
        inner.resources.insert(resource.uuid, resource.clone());
        Ok(())
    }

    async fn item(&self, uuid: Uuid) -> Result<Option<Item>, CatalogError> {
        Ok(self.inner.read().unwrap().items.get(&uuid).cloned())
    }

    async fn item_by_primary_id(
        &self,
        id_type: IdType,
        id_value: &str,
    ) -> Result<Option<Item>, CatalogError> {
        let inner = self.inner.read().unwrap();
        Ok(inner
            .items
            .values()
            .find(|i| {
                !i.is_deleted
                    && i.primary_lookup_id
                        .as_ref()
                        .is_some_and(|(t, v)| *t == id_type && v == id_value)
            })
            .cloned())
    }

    async fn items_by_type(&self, item_type: ItemType) -> Result<Vec<Item>, CatalogError> {
        let inner = self.inner.read().unwrap();
        Ok(inner
            .items
            .values()
            .filter(|i| i.item_type == item_type && !i.is_deleted)
            .cloned()
            .collect())
    }

    async fn save_item(&self, item: &Item) -> Result<(), CatalogError> {
        let mut inner = self.inner.write().unwrap();
        inner.items.insert(item.uuid, item.clone());
        Ok(())
    }

    async fn resources_for_item(&self, item: Uuid) -> Result<Vec<ExternalResource>, CatalogError> {
        let inner = self.inner.read().unwrap();
        Ok(inner
            .resources
            .values()
            .filter(|r| r.item == Some(item))
            .cloned()
            .collect())
    }

    async fn log_action(&self, item: Uuid, action: &str, note: &str) -> Result<(), CatalogError> {
        let mut inner = self.inner.write().unwrap();
        inner.actions.push(ItemAction {
            item,
            action: action.to_string(),
            note: note.to_string(),
            created_at: Utc::now(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ItemType;

    #[tokio::test]
    async fn resource_lookup_by_url_and_id() {
        let store = MemoryStore::new();
        let resource = ExternalResource::new(IdType::Imdb, "tt0903747", "https://imdb.test/title/tt0903747");
        store.save_resource(&resource).await.unwrap();

        let by_url = store
            .resource_by_url("https://imdb.test/title/tt0903747")
            .await
            .unwrap();
        assert_eq!(by_url.map(|r| r.uuid), Some(resource.uuid));

        let by_id = store.resource_by_id(IdType::Imdb, "tt0903747").await.unwrap();
        assert_eq!(by_id.map(|r| r.uuid), Some(resource.uuid));

        assert!(store
            .resource_by_id(IdType::Imdb, "tt0000000")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn deleted_items_are_invisible_to_primary_id_lookup() {
        let store = MemoryStore::new();
        let mut item = Item::new(ItemType::Edition);
        item.primary_lookup_id = Some((IdType::Isbn, "9780441013593".to_string()));
        store.save_item(&item).await.unwrap();
        assert!(store
            .item_by_primary_id(IdType::Isbn, "9780441013593")
            .await
            .unwrap()
            .is_some());

        item.is_deleted = true;
        store.save_item(&item).await.unwrap();
        assert!(store
            .item_by_primary_id(IdType::Isbn, "9780441013593")
            .await
            .unwrap()
            .is_none());
    }
}
