//! Postgres-backed store. Enabled with the `postgres` feature.
//!
//! Expected schema:
//!
//! ```sql
//! CREATE TABLE external_resource (
//!     uuid UUID PRIMARY KEY,
//!     id_type TEXT NOT NULL,
//!     id_value TEXT NOT NULL,
//!     url TEXT NOT NULL,
//!     item UUID,
//!     metadata JSONB NOT NULL DEFAULT '{}',
//!     other_lookup_ids JSONB NOT NULL DEFAULT '{}',
//!     cover_image JSONB,
//!     scraped_at TIMESTAMPTZ,
//!     required_resources JSONB NOT NULL DEFAULT '[]',
//!     related_resources JSONB NOT NULL DEFAULT '[]',
//!     prematched_resources JSONB NOT NULL DEFAULT '[]',
//!     created_at TIMESTAMPTZ NOT NULL,
//!     UNIQUE (id_type, id_value),
//!     UNIQUE (url)
//! );
//!
//! CREATE TABLE item (
//!     uuid UUID PRIMARY KEY,
//!     item_type TEXT NOT NULL,
//!     localized_title JSONB NOT NULL DEFAULT '[]',
//!     localized_description JSONB NOT NULL DEFAULT '[]',
//!     language JSONB NOT NULL DEFAULT '[]',
//!     metadata JSONB NOT NULL DEFAULT '{}',
//!     primary_lookup_id_type TEXT,
//!     primary_lookup_id_value TEXT,
//!     cover_url TEXT,
//!     merged_to_item UUID,
//!     parent_item UUID,
//!     work_item UUID,
//!     is_deleted BOOLEAN NOT NULL DEFAULT FALSE,
//!     created_at TIMESTAMPTZ NOT NULL
//! );
//! CREATE INDEX item_primary_lookup_idx
//!     ON item (primary_lookup_id_type, primary_lookup_id_value);
//!
//! CREATE TABLE item_action (
//!     id BIGSERIAL PRIMARY KEY,
//!     item UUID NOT NULL,
//!     action TEXT NOT NULL,
//!     note TEXT NOT NULL,
//!     created_at TIMESTAMPTZ NOT NULL
//! );
//! ```

use async_trait::async_trait;
use chrono::Utc;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use super::CatalogStore;
use crate::error::CatalogError;
use crate::types::{ExternalResource, IdType, Item, ItemType};

pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn decode_error(msg: String) -> CatalogError {
    CatalogError::Storage(msg.into())
}

fn resource_from_row(row: &PgRow) -> Result<ExternalResource, CatalogError> {
    let id_type: String = row.get("id_type");
    let id_type = IdType::parse(&id_type)
        .ok_or_else(|| decode_error(format!("unknown id type {id_type}")))?;
    Ok(ExternalResource {
        uuid: row.get("uuid"),
        id_type,
        id_value: row.get("id_value"),
        url: row.get("url"),
        item: row.get("item"),
        metadata: serde_json::from_value(row.get("metadata")).unwrap_or_default(),
        other_lookup_ids: serde_json::from_value(row.get("other_lookup_ids")).unwrap_or_default(),
        cover_image: row
            .get::<Option<serde_json::Value>, _>("cover_image")
            .and_then(|v| serde_json::from_value(v).ok()),
        scraped_at: row.get("scraped_at"),
        required_resources: serde_json::from_value(row.get("required_resources"))
            .unwrap_or_default(),
        related_resources: serde_json::from_value(row.get("related_resources")).unwrap_or_default(),
        prematched_resources: serde_json::from_value(row.get("prematched_resources"))
            .unwrap_or_default(),
        created_at: row.get("created_at"),
    })
}

fn item_from_row(row: &PgRow) -> Result<Item, CatalogError> {
    let item_type: String = row.get("item_type");
    let item_type = ItemType::parse(&item_type)
        .ok_or_else(|| decode_error(format!("unknown item type {item_type}")))?;
    let primary_lookup_id = match (
        row.get::<Option<String>, _>("primary_lookup_id_type"),
        row.get::<Option<String>, _>("primary_lookup_id_value"),
    ) {
        (Some(t), Some(v)) => Some((
            IdType::parse(&t).ok_or_else(|| decode_error(format!("unknown id type {t}")))?,
            v,
        )),
        _ => None,
    };
    Ok(Item {
        uuid: row.get("uuid"),
        item_type,
        localized_title: serde_json::from_value(row.get("localized_title")).unwrap_or_default(),
        localized_description: serde_json::from_value(row.get("localized_description"))
            .unwrap_or_default(),
        language: serde_json::from_value(row.get("language")).unwrap_or_default(),
        metadata: serde_json::from_value(row.get("metadata")).unwrap_or_default(),
        primary_lookup_id,
        cover_url: row.get("cover_url"),
        merged_to_item: row.get("merged_to_item"),
        parent_item: row.get("parent_item"),
        work_item: row.get("work_item"),
        is_deleted: row.get("is_deleted"),
        created_at: row.get("created_at"),
    })
}

const RESOURCE_COLUMNS: &str = "uuid, id_type, id_value, url, item, metadata, other_lookup_ids, \
     cover_image, scraped_at, required_resources, related_resources, prematched_resources, created_at";

const ITEM_COLUMNS: &str = "uuid, item_type, localized_title, localized_description, language, \
     metadata, primary_lookup_id_type, primary_lookup_id_value, cover_url, merged_to_item, \
     parent_item, work_item, is_deleted, created_at";

#[async_trait]
impl CatalogStore for PostgresStore {
    async fn resource_by_url(&self, url: &str) -> Result<Option<ExternalResource>, CatalogError> {
        let row = sqlx::query(&format!(
            "SELECT {RESOURCE_COLUMNS} FROM external_resource WHERE url = $1"
        ))
        .bind(url)
        .fetch_optional(&self.pool)
        .await
        .map_err(CatalogError::storage)?;
        row.as_ref().map(resource_from_row).transpose()
    }

    async fn resource_by_id(
        &self,
        id_type: IdType,
        id_value: &str,
    ) -> Result<Option<ExternalResource>, CatalogError> {
        let row = sqlx::query(&format!(
            "SELECT {RESOURCE_COLUMNS} FROM external_resource WHERE id_type = $1 AND id_value = $2"
        ))
        .bind(id_type.as_str())
        .bind(id_value)
        .fetch_optional(&self.pool)
        .await
        .map_err(CatalogError::storage)?;
        row.as_ref().map(resource_from_row).transpose()
    }

    async fn resource_by_uuid(&self, uuid: Uuid) -> Result<Option<ExternalResource>, CatalogError> {
        let row = sqlx::query(&format!(
            "SELECT {RESOURCE_COLUMNS} FROM external_resource WHERE uuid = $1"
        ))
        .bind(uuid)
        .fetch_optional(&self.pool)
        .await
        .map_err(CatalogError::storage)?;
        row.as_ref().map(resource_from_row).transpose()
    }

    async fn save_resource(&self, resource: &ExternalResource) -> Result<(), CatalogError> {
        sqlx::query(
            r#"
            INSERT INTO external_resource (
                uuid, id_type, id_value, url, item, metadata, other_lookup_ids,
                cover_image, scraped_at, required_resources, related_resources,
                prematched_resources, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            ON CONFLICT (uuid) DO UPDATE SET
                item = EXCLUDED.item,
                metadata = EXCLUDED.metadata,
                other_lookup_ids = EXCLUDED.other_lookup_ids,
                cover_image = EXCLUDED.cover_image,
                scraped_at = EXCLUDED.scraped_at,
                required_resources = EXCLUDED.required_resources,
                related_resources = EXCLUDED.related_resources,
                prematched_resources = EXCLUDED.prematched_resources
            "#,
        )
        .bind(resource.uuid)
        .bind(resource.id_type.as_str())
        .bind(&resource.id_value)
        .bind(&resource.url)
        .bind(resource.item)
        .bind(serde_json::to_value(&resource.metadata)?)
        .bind(serde_json::to_value(&resource.other_lookup_ids)?)
        .bind(serde_json::to_value(&resource.cover_image)?)
        .bind(resource.scraped_at)
        .bind(serde_json::to_value(&resource.required_resources)?)
        .bind(serde_json::to_value(&resource.related_resources)?)
        .bind(serde_json::to_value(&resource.prematched_resources)?)
        .bind(resource.created_at)
        .execute(&self.pool)
        .await
        .map_err(CatalogError::storage)?;
        Ok(())
    }

    async fn item(&self, uuid: Uuid) -> Result<Option<Item>, CatalogError> {
        let row = sqlx::query(&format!("SELECT {ITEM_COLUMNS} FROM item WHERE uuid = $1"))
            .bind(uuid)
            .fetch_optional(&self.pool)
            .await
            .map_err(CatalogError::storage)?;
        row.as_ref().map(item_from_row).transpose()
    }

    async fn item_by_primary_id(
        &self,
        id_type: IdType,
        id_value: &str,
    ) -> Result<Option<Item>, CatalogError> {
        let row = sqlx::query(&format!(
            "SELECT {ITEM_COLUMNS} FROM item \
             WHERE primary_lookup_id_type = $1 AND primary_lookup_id_value = $2 \
               AND NOT is_deleted \
             ORDER BY created_at LIMIT 1"
        ))
        .bind(id_type.as_str())
        .bind(id_value)
        .fetch_optional(&self.pool)
        .await
        .map_err(CatalogError::storage)?;
        row.as_ref().map(item_from_row).transpose()
    }

    async fn items_by_type(&self, item_type: ItemType) -> Result<Vec<Item>, CatalogError> {
        let rows = sqlx::query(&format!(
            "SELECT {ITEM_COLUMNS} FROM item WHERE item_type = $1 AND NOT is_deleted"
        ))
        .bind(item_type.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(CatalogError::storage)?;
        rows.iter().map(item_from_row).collect()
    }

    async fn save_item(&self, item: &Item) -> Result<(), CatalogError> {
        let (primary_type, primary_value) = match &item.primary_lookup_id {
            Some((t, v)) => (Some(t.as_str()), Some(v.as_str())),
            None => (None, None),
        };
        sqlx::query(
            r#"
            INSERT INTO item (
                uuid, item_type, localized_title, localized_description, language,
                metadata, primary_lookup_id_type, primary_lookup_id_value, cover_url,
                merged_to_item, parent_item, work_item, is_deleted, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            ON CONFLICT (uuid) DO UPDATE SET
                localized_title = EXCLUDED.localized_title,
                localized_description = EXCLUDED.localized_description,
                language = EXCLUDED.language,
                metadata = EXCLUDED.metadata,
                primary_lookup_id_type = EXCLUDED.primary_lookup_id_type,
                primary_lookup_id_value = EXCLUDED.primary_lookup_id_value,
                cover_url = EXCLUDED.cover_url,
                merged_to_item = EXCLUDED.merged_to_item,
                parent_item = EXCLUDED.parent_item,
                work_item = EXCLUDED.work_item,
                is_deleted = EXCLUDED.is_deleted
            "#,
        )
        .bind(item.uuid)
        .bind(item.item_type.as_str())
        .bind(serde_json::to_value(&item.localized_title)?)
        .bind(serde_json::to_value(&item.localized_description)?)
        .bind(serde_json::to_value(&item.language)?)
        .bind(serde_json::to_value(&item.metadata)?)
        .bind(primary_type)
        .bind(primary_value)
        .bind(&item.cover_url)
        .bind(item.merged_to_item)
        .bind(item.parent_item)
        .bind(item.work_item)
        .bind(item.is_deleted)
        .bind(item.created_at)
        .execute(&self.pool)
        .await
        .map_err(CatalogError::storage)?;
        Ok(())
    }

    async fn resources_for_item(&self, item: Uuid) -> Result<Vec<ExternalResource>, CatalogError> {
        let rows = sqlx::query(&format!(
            "SELECT {RESOURCE_COLUMNS} FROM external_resource WHERE item = $1"
        ))
        .bind(item)
        .fetch_all(&self.pool)
        .await
        .map_err(CatalogError::storage)?;
        rows.iter().map(resource_from_row).collect()
    }

    async fn log_action(&self, item: Uuid, action: &str, note: &str) -> Result<(), CatalogError> {
        sqlx::query(
            "INSERT INTO item_action (item, action, note, created_at) VALUES ($1, $2, $3, $4)",
        )
        .bind(item)
        .bind(action)
        .bind(note)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(CatalogError::storage)?;
        Ok(())
    }
}
