//! Persistent record of one scraped external page.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use super::content::{CoverImage, LinkDescriptor, ResourceContent};
use super::ids::{IdType, IDEAL_ID_TYPES};
use super::item::ItemType;

/// One external page, identified by `(id_type, id_value)` or by `url`,
/// optionally linked to one canonical item. Created on first lookup,
/// mutated by every re-scrape and item (re)assignment, never deleted by
/// the resolution core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExternalResource {
    pub uuid: Uuid,
    pub id_type: IdType,
    pub id_value: String,
    pub url: String,
    /// Ownership link to exactly one item, nullable until matched.
    pub item: Option<Uuid>,
    pub metadata: Map<String, Value>,
    /// Identifiers found on the page beyond the site's own.
    pub other_lookup_ids: IndexMap<IdType, String>,
    pub cover_image: Option<CoverImage>,
    pub scraped_at: Option<DateTime<Utc>>,
    pub required_resources: Vec<LinkDescriptor>,
    pub related_resources: Vec<LinkDescriptor>,
    pub prematched_resources: Vec<LinkDescriptor>,
    pub created_at: DateTime<Utc>,
}

impl ExternalResource {
    pub fn new(id_type: IdType, id_value: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            id_type,
            id_value: id_value.into(),
            url: url.into(),
            item: None,
            metadata: Map::new(),
            other_lookup_ids: IndexMap::new(),
            cover_image: None,
            scraped_at: None,
            required_resources: Vec::new(),
            related_resources: Vec::new(),
            prematched_resources: Vec::new(),
            created_at: Utc::now(),
        }
    }

    /// True once a successful scrape has populated metadata.
    pub fn ready(&self) -> bool {
        self.scraped_at.is_some() && !self.metadata.is_empty()
    }

    /// Replace this resource's scraped state with fresh content.
    pub fn update_content(&mut self, content: ResourceContent) {
        self.metadata = content.metadata;
        self.other_lookup_ids = content
            .lookup_ids
            .into_iter()
            .filter(|(t, v)| !(*t == self.id_type && *v == self.id_value))
            .collect();
        if content.cover_image.is_some() {
            self.cover_image = content.cover_image;
        }
        self.required_resources = content.required_resources;
        self.related_resources = content.related_resources;
        self.prematched_resources = content.prematched_resources;
        self.scraped_at = Some(Utc::now());
    }

    /// Own id pair first, then everything found on the page.
    pub fn all_lookup_ids(&self) -> IndexMap<IdType, String> {
        let mut ids = IndexMap::new();
        ids.insert(self.id_type, self.id_value.clone());
        for (t, v) in &self.other_lookup_ids {
            ids.entry(*t).or_insert_with(|| v.clone());
        }
        ids
    }

    /// Lookup-id candidates in the subtype's priority order.
    pub fn lookup_id_candidates(&self, item_type: ItemType) -> Vec<(IdType, String)> {
        let ids = self.all_lookup_ids();
        let mut candidates: Vec<(IdType, String)> = item_type
            .lookup_id_priority()
            .iter()
            .filter_map(|t| ids.get(t).map(|v| (*t, v.clone())))
            .collect();
        if !candidates.iter().any(|(t, _)| *t == self.id_type) {
            candidates.push((self.id_type, self.id_value.clone()));
        }
        candidates
    }

    /// First ideal-type id present, else the resource's own id.
    pub fn best_lookup_id(&self) -> (IdType, String) {
        let ids = self.all_lookup_ids();
        for t in IDEAL_ID_TYPES {
            if let Some(v) = ids.get(t) {
                return (*t, v.clone());
            }
        }
        (self.id_type, self.id_value.clone())
    }

    /// Subtype hinted by the scrape, e.g. a book site marking a page as a
    /// work rather than an edition.
    pub fn preferred_item_type(&self) -> Option<ItemType> {
        self.metadata
            .get("preferred_type")
            .and_then(|v| v.as_str())
            .and_then(ItemType::parse)
    }

    pub fn item_type_or(&self, default: ItemType) -> ItemType {
        self.preferred_item_type().unwrap_or(default)
    }

    pub fn describe(&self) -> String {
        format!("{}:{}", self.id_type, self.id_value)
    }
}
