//! Normalized scrape output.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::ids::IdType;

/// Raw cover image bytes plus a format tag such as `"jpeg"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoverImage {
    pub bytes: Vec<u8>,
    pub format: String,
}

/// Reference to another external resource discovered during a scrape.
///
/// At least one of `url` or the `(id_type, id_value)` pair is set. `content`
/// optionally carries inline preloaded scrape output so the target can be
/// resolved without a network fetch.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LinkDescriptor {
    pub url: Option<String>,
    pub id_type: Option<IdType>,
    pub id_value: Option<String>,
    pub content: Option<ResourceContent>,
}

impl LinkDescriptor {
    pub fn from_url(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            ..Self::default()
        }
    }

    pub fn from_id(id_type: IdType, id_value: impl Into<String>) -> Self {
        Self {
            id_type: Some(id_type),
            id_value: Some(id_value.into()),
            ..Self::default()
        }
    }

    pub fn with_content(mut self, content: ResourceContent) -> Self {
        self.content = Some(content);
        self
    }

    pub fn id_pair(&self) -> Option<(IdType, &str)> {
        match (self.id_type, self.id_value.as_deref()) {
            (Some(t), Some(v)) => Some((t, v)),
            _ => None,
        }
    }

    /// Human-readable form for audit log entries.
    pub fn describe(&self) -> String {
        if let Some((t, v)) = self.id_pair() {
            format!("{t}:{v}")
        } else if let Some(url) = &self.url {
            url.clone()
        } else {
            "<empty link>".to_string()
        }
    }
}

/// Site-agnostic scrape result: metadata plus external lookup identifiers
/// and the link sets discovered on the page. Immutable once constructed;
/// consumed exactly once per resolution cycle.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResourceContent {
    /// Identifier-type to identifier-value, insertion-ordered.
    pub lookup_ids: IndexMap<IdType, String>,
    /// Adapter-specific field map (title, authors, pub date, ...).
    pub metadata: Map<String, Value>,
    pub cover_image: Option<CoverImage>,
    /// Must resolve before the owner is considered complete, e.g. a TV
    /// season needs its show.
    pub required_resources: Vec<LinkDescriptor>,
    /// Crawl frontier; discovered but unverified.
    pub related_resources: Vec<LinkDescriptor>,
    /// Curator-asserted identity links; strongest dedup signal.
    pub prematched_resources: Vec<LinkDescriptor>,
}

impl ResourceContent {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_metadata(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    pub fn with_lookup_id(mut self, id_type: IdType, id_value: impl Into<String>) -> Self {
        self.lookup_ids.insert(id_type, id_value.into());
        self
    }

    pub fn with_required(mut self, link: LinkDescriptor) -> Self {
        self.required_resources.push(link);
        self
    }

    pub fn with_related(mut self, link: LinkDescriptor) -> Self {
        self.related_resources.push(link);
        self
    }

    pub fn with_prematched(mut self, link: LinkDescriptor) -> Self {
        self.prematched_resources.push(link);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn describe_prefers_id_pair_over_url() {
        let link = LinkDescriptor {
            url: Some("https://example.test/b/1".to_string()),
            id_type: Some(IdType::Isbn),
            id_value: Some("9780000000001".to_string()),
            content: None,
        };
        assert_eq!(link.describe(), "isbn:9780000000001");
        assert_eq!(
            LinkDescriptor::from_url("https://example.test/b/1").describe(),
            "https://example.test/b/1"
        );
    }
}
