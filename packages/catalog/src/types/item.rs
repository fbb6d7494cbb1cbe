//! Canonical catalog entities.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use super::ids::IdType;
use super::lang::{normalize_languages, LocalizedText};
use super::resource::ExternalResource;
use crate::error::CatalogError;

/// Broad catalog section an item belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemCategory {
    Book,
    Movie,
    Tv,
    Music,
    Game,
    Podcast,
}

impl ItemCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            ItemCategory::Book => "book",
            ItemCategory::Movie => "movie",
            ItemCategory::Tv => "tv",
            ItemCategory::Music => "music",
            ItemCategory::Game => "game",
            ItemCategory::Podcast => "podcast",
        }
    }
}

/// Concrete item subtype. Determines which matching rules apply and which
/// lookup-id schemes are tried first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemType {
    Edition,
    Work,
    Movie,
    TvShow,
    TvSeason,
    TvEpisode,
    Album,
    Podcast,
    PodcastEpisode,
    Game,
}

impl ItemType {
    pub const ALL: &'static [ItemType] = &[
        ItemType::Edition,
        ItemType::Work,
        ItemType::Movie,
        ItemType::TvShow,
        ItemType::TvSeason,
        ItemType::TvEpisode,
        ItemType::Album,
        ItemType::Podcast,
        ItemType::PodcastEpisode,
        ItemType::Game,
    ];

    pub fn category(self) -> ItemCategory {
        match self {
            ItemType::Edition | ItemType::Work => ItemCategory::Book,
            ItemType::Movie => ItemCategory::Movie,
            ItemType::TvShow | ItemType::TvSeason | ItemType::TvEpisode => ItemCategory::Tv,
            ItemType::Album => ItemCategory::Music,
            ItemType::Podcast | ItemType::PodcastEpisode => ItemCategory::Podcast,
            ItemType::Game => ItemCategory::Game,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ItemType::Edition => "edition",
            ItemType::Work => "work",
            ItemType::Movie => "movie",
            ItemType::TvShow => "tv_show",
            ItemType::TvSeason => "tv_season",
            ItemType::TvEpisode => "tv_episode",
            ItemType::Album => "album",
            ItemType::Podcast => "podcast",
            ItemType::PodcastEpisode => "podcast_episode",
            ItemType::Game => "game",
        }
    }

    pub fn parse(name: &str) -> Option<ItemType> {
        Self::ALL.iter().copied().find(|t| t.as_str() == name)
    }

    pub fn url_path(self) -> &'static str {
        match self {
            ItemType::Edition | ItemType::Work => "book",
            ItemType::Movie => "movie",
            ItemType::TvShow => "tv",
            ItemType::TvSeason => "tv/season",
            ItemType::TvEpisode => "tv/episode",
            ItemType::Album => "album",
            ItemType::Podcast => "podcast",
            ItemType::PodcastEpisode => "podcast/episode",
            ItemType::Game => "game",
        }
    }

    /// Lookup-id candidate order when matching a resource of this subtype.
    /// Authoritative schemes come before site-local ones.
    pub fn lookup_id_priority(self) -> &'static [IdType] {
        match self {
            ItemType::Edition => &[
                IdType::Isbn,
                IdType::Asin,
                IdType::Cubn,
                IdType::Gtin,
                IdType::Goodreads,
                IdType::GoogleBooks,
                IdType::DoubanBook,
            ],
            ItemType::Work => &[IdType::GoodreadsWork, IdType::DoubanBookWork],
            ItemType::Movie => &[IdType::Imdb, IdType::TmdbMovie, IdType::DoubanMovie],
            ItemType::TvShow => &[IdType::Imdb, IdType::TmdbTv],
            ItemType::TvSeason => &[IdType::Imdb, IdType::TmdbSeason],
            ItemType::TvEpisode => &[IdType::Imdb],
            ItemType::Album => &[
                IdType::Gtin,
                IdType::Isrc,
                IdType::Musicbrainz,
                IdType::SpotifyAlbum,
                IdType::DoubanMusic,
                IdType::Bandcamp,
            ],
            ItemType::Podcast => &[IdType::Rss, IdType::ApplePodcast],
            ItemType::PodcastEpisode => &[],
            ItemType::Game => &[IdType::Steam, IdType::Igdb, IdType::Bangumi],
        }
    }
}

impl std::fmt::Display for ItemType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Metadata keys whose list values are unioned rather than replaced when
/// merging scrape output into an item.
pub const METADATA_MERGE_LIST_KEYS: &[&str] = &[
    "genre",
    "author",
    "translator",
    "director",
    "playwright",
    "actor",
    "artist",
    "host",
];

/// Canonical catalog entity. One or more external resources point at it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Item {
    pub uuid: Uuid,
    pub item_type: ItemType,
    pub localized_title: Vec<LocalizedText>,
    pub localized_description: Vec<LocalizedText>,
    pub language: Vec<String>,
    pub metadata: Map<String, Value>,
    pub primary_lookup_id: Option<(IdType, String)>,
    pub cover_url: Option<String>,
    /// Forwarding pointer when this item was unified into another. The
    /// chain is acyclic and bounded; lookups must dereference through it.
    pub merged_to_item: Option<Uuid>,
    /// Season to show, episode to its season or podcast.
    pub parent_item: Option<Uuid>,
    /// Edition to work grouping.
    pub work_item: Option<Uuid>,
    pub is_deleted: bool,
    pub created_at: DateTime<Utc>,
}

impl Item {
    pub fn new(item_type: ItemType) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            item_type,
            localized_title: Vec::new(),
            localized_description: Vec::new(),
            language: Vec::new(),
            metadata: Map::new(),
            primary_lookup_id: None,
            cover_url: None,
            merged_to_item: None,
            parent_item: None,
            work_item: None,
            is_deleted: false,
            created_at: Utc::now(),
        }
    }

    pub fn category(&self) -> ItemCategory {
        self.item_type.category()
    }

    /// Site-relative canonical URL.
    pub fn url(&self) -> String {
        format!("/{}/{}", self.item_type.url_path(), self.uuid)
    }

    pub fn display_title(&self) -> &str {
        self.localized_title
            .first()
            .map(|t| t.text.as_str())
            .unwrap_or("")
    }

    pub fn describe(&self) -> String {
        format!("{} {}", self.item_type, self.uuid)
    }

    /// Fold a resource's scraped metadata into this item.
    ///
    /// Localized titles and descriptions are unioned, language lists are
    /// appended, list-valued keys in [`METADATA_MERGE_LIST_KEYS`] are
    /// unioned, and every other key is copied when absent. With `override_existing`
    /// a re-scrape replaces scalar values instead of keeping the old ones.
    pub fn merge_from_resource(&mut self, resource: &ExternalResource, override_existing: bool) {
        for (key, value) in &resource.metadata {
            match key.as_str() {
                "localized_title" => {
                    merge_localized(&mut self.localized_title, value);
                }
                "localized_description" => {
                    merge_localized(&mut self.localized_description, value);
                }
                "title" => {
                    // Plain title from an adapter without language info.
                    if let Some(text) = value.as_str() {
                        let entry = LocalizedText::new("", text);
                        if !text.is_empty() && !self.localized_title.contains(&entry) {
                            self.localized_title.push(entry);
                        }
                    }
                }
                "language" => {
                    if let Some(list) = value.as_array() {
                        for lang in list.iter().filter_map(|v| v.as_str()) {
                            self.language.push(lang.to_string());
                        }
                    }
                }
                "cover_image_url" => {
                    if self.cover_url.is_none() || override_existing {
                        self.cover_url = value.as_str().map(|s| s.to_string());
                    }
                }
                key if METADATA_MERGE_LIST_KEYS.contains(&key) => {
                    merge_list_value(&mut self.metadata, key, value);
                }
                key => {
                    if override_existing || !self.metadata.contains_key(key) {
                        self.metadata.insert(key.to_string(), value.clone());
                    }
                }
            }
        }
    }

    /// Clean up after merges: normalized language tags, deduped title and
    /// description lists.
    pub fn normalize(&mut self) {
        self.language = normalize_languages(&self.language);
        dedupe_localized(&mut self.localized_title);
        dedupe_localized(&mut self.localized_description);
    }

    /// Validate the public representation. Failure is fatal to the
    /// enclosing save.
    pub fn validate(&self) -> Result<(), CatalogError> {
        if self.localized_title.is_empty() {
            return Err(CatalogError::SchemaValidation {
                item: self.uuid,
                reason: "missing title".to_string(),
            });
        }
        if self.localized_title.iter().any(|t| t.text.trim().is_empty()) {
            return Err(CatalogError::SchemaValidation {
                item: self.uuid,
                reason: "empty title entry".to_string(),
            });
        }
        Ok(())
    }
}

fn merge_localized(target: &mut Vec<LocalizedText>, value: &Value) {
    let Ok(entries) = serde_json::from_value::<Vec<LocalizedText>>(value.clone()) else {
        return;
    };
    for entry in entries {
        if !entry.text.is_empty() && !target.contains(&entry) {
            target.push(entry);
        }
    }
}

fn merge_list_value(metadata: &mut Map<String, Value>, key: &str, value: &Value) {
    let incoming: Vec<Value> = match value {
        Value::Array(list) => list.clone(),
        other => vec![other.clone()],
    };
    let existing = metadata
        .entry(key.to_string())
        .or_insert_with(|| Value::Array(Vec::new()));
    if let Value::Array(list) = existing {
        for v in incoming {
            if !list.contains(&v) {
                list.push(v);
            }
        }
    }
}

fn dedupe_localized(entries: &mut Vec<LocalizedText>) {
    let mut seen: Vec<LocalizedText> = Vec::new();
    entries.retain(|e| {
        if seen.contains(e) {
            false
        } else {
            seen.push(e.clone());
            true
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn resource_with_metadata(pairs: &[(&str, Value)]) -> ExternalResource {
        let mut resource = ExternalResource::new(
            IdType::Goodreads,
            "1",
            "https://goodreads.test/book/show/1",
        );
        for (k, v) in pairs {
            resource.metadata.insert(k.to_string(), v.clone());
        }
        resource
    }

    #[test]
    fn merge_copies_absent_keys_and_unions_lists() {
        let mut item = Item::new(ItemType::Edition);
        item.metadata.insert("pub_year".into(), json!(1979));
        let resource = resource_with_metadata(&[
            ("pub_year", json!(1980)),
            ("pages", json!(224)),
            ("author", json!(["Douglas Adams"])),
        ]);

        item.merge_from_resource(&resource, false);
        assert_eq!(item.metadata["pub_year"], json!(1979));
        assert_eq!(item.metadata["pages"], json!(224));
        assert_eq!(item.metadata["author"], json!(["Douglas Adams"]));

        // Re-merge does not duplicate list entries.
        item.merge_from_resource(&resource, false);
        assert_eq!(item.metadata["author"], json!(["Douglas Adams"]));

        item.merge_from_resource(&resource, true);
        assert_eq!(item.metadata["pub_year"], json!(1980));
    }

    #[test]
    fn merge_collects_localized_titles() {
        let mut item = Item::new(ItemType::Edition);
        let resource = resource_with_metadata(&[(
            "localized_title",
            json!([{"lang": "en", "text": "Mockingbird"}]),
        )]);
        item.merge_from_resource(&resource, false);
        item.merge_from_resource(&resource, false);
        assert_eq!(item.localized_title.len(), 1);
        assert_eq!(item.display_title(), "Mockingbird");
    }

    #[test]
    fn validate_rejects_missing_or_blank_title() {
        let mut item = Item::new(ItemType::Movie);
        assert!(matches!(
            item.validate(),
            Err(CatalogError::SchemaValidation { .. })
        ));
        item.localized_title.push(LocalizedText::new("en", "  "));
        assert!(item.validate().is_err());
        item.localized_title[0].text = "Stalker".to_string();
        assert!(item.validate().is_ok());
    }

    #[test]
    fn normalize_cleans_language_list() {
        let mut item = Item::new(ItemType::Edition);
        item.language = vec!["English".into(), "en".into(), "Japanese".into()];
        item.normalize();
        assert_eq!(item.language, vec!["en".to_string(), "ja".to_string()]);
    }

    #[test]
    fn season_category_is_tv() {
        assert_eq!(ItemType::TvSeason.category(), ItemCategory::Tv);
        assert_eq!(ItemType::Edition.category(), ItemCategory::Book);
    }
}
