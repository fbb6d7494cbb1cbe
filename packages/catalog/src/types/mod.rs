//! Data model: identifier schemes, scrape content, resources and items.

pub mod content;
pub mod ids;
pub mod item;
pub mod lang;
pub mod resource;

pub use content::{CoverImage, LinkDescriptor, ResourceContent};
pub use ids::{IdType, IDEAL_ID_TYPES};
pub use item::{Item, ItemCategory, ItemType, METADATA_MERGE_LIST_KEYS};
pub use lang::{normalize_languages, LocalizedText};
pub use resource::ExternalResource;
