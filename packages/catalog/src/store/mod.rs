//! Repository trait for items and external resources.
//!
//! The resolution core never talks to a database directly; everything goes
//! through [`CatalogStore`] so tests run against [`MemoryStore`] and
//! deployments can enable the `postgres` backend.

pub mod memory;
#[cfg(feature = "postgres")]
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::CatalogError;
use crate::types::{ExternalResource, IdType, Item, ItemType};

/// One audit log entry attached to an item.
#[derive(Debug, Clone)]
pub struct ItemAction {
    pub item: Uuid,
    pub action: String,
    pub note: String,
    pub created_at: DateTime<Utc>,
}

#[async_trait]
pub trait CatalogStore: Send + Sync {
    async fn resource_by_url(&self, url: &str) -> Result<Option<ExternalResource>, CatalogError>;

    async fn resource_by_id(
        &self,
        id_type: IdType,
        id_value: &str,
    ) -> Result<Option<ExternalResource>, CatalogError>;

    async fn resource_by_uuid(&self, uuid: Uuid) -> Result<Option<ExternalResource>, CatalogError>;

    /// Upsert by uuid.
    async fn save_resource(&self, resource: &ExternalResource) -> Result<(), CatalogError>;

    async fn item(&self, uuid: Uuid) -> Result<Option<Item>, CatalogError>;

    /// First non-deleted item keyed by this primary lookup id.
    async fn item_by_primary_id(
        &self,
        id_type: IdType,
        id_value: &str,
    ) -> Result<Option<Item>, CatalogError>;

    async fn items_by_type(&self, item_type: ItemType) -> Result<Vec<Item>, CatalogError>;

    /// Upsert by uuid.
    async fn save_item(&self, item: &Item) -> Result<(), CatalogError>;

    async fn resources_for_item(&self, item: Uuid) -> Result<Vec<ExternalResource>, CatalogError>;

    async fn log_action(&self, item: Uuid, action: &str, note: &str) -> Result<(), CatalogError>;
}
