//! Host library data models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of a library item as reported by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ItemKind {
    Episode,
    Movie,
    MusicAlbum,
    Series,
    Season,
    Folder,
    CollectionFolder,
    Audio,
    #[serde(other)]
    Other,
}

impl ItemKind {
    /// Type tag exposed to feed consumers.
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemKind::Episode => "Episode",
            ItemKind::Movie => "Movie",
            ItemKind::MusicAlbum => "MusicAlbum",
            ItemKind::Series => "Series",
            ItemKind::Season => "Season",
            ItemKind::Folder => "Folder",
            ItemKind::CollectionFolder => "CollectionFolder",
            ItemKind::Audio => "Audio",
            ItemKind::Other => "Other",
        }
    }
}

/// A library folder, either an ancestor of an item or a root collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LibraryFolder {
    pub id: String,
    pub name: String,
}

/// An item of the host library.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LibraryItem {
    pub id: String,
    pub name: String,
    pub kind: ItemKind,
    #[serde(default)]
    pub is_folder: bool,
    /// Placeholder for content that is known but not present (e.g. a missing episode).
    #[serde(default)]
    pub is_virtual: bool,
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub series_name: Option<String>,
    #[serde(default)]
    pub series_id: Option<String>,
    pub date_created: DateTime<Utc>,
    #[serde(default)]
    pub run_time_ticks: Option<i64>,
    #[serde(default)]
    pub production_year: Option<i32>,
    #[serde(default)]
    pub overview: Option<String>,
    #[serde(default)]
    pub backdrop_image_tags: Vec<String>,
    #[serde(default)]
    pub primary_image_tag: Option<String>,
    #[serde(default)]
    pub index_number: Option<i32>,
    #[serde(default)]
    pub parent_index_number: Option<i32>,
}

/// Authenticated caller, as resolved by the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: String,
    pub is_admin: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_kinds_deserialize_as_other() {
        let kind: ItemKind = serde_json::from_str("\"Playlist\"").unwrap();
        assert_eq!(kind, ItemKind::Other);

        let kind: ItemKind = serde_json::from_str("\"Episode\"").unwrap();
        assert_eq!(kind, ItemKind::Episode);
    }

    #[test]
    fn item_optional_fields_default() {
        let item: LibraryItem = serde_json::from_value(serde_json::json!({
            "id": "movie-1",
            "name": "A Movie",
            "kind": "Movie",
            "date_created": "2024-03-01T10:00:00Z",
        }))
        .unwrap();

        assert!(!item.is_folder);
        assert!(!item.is_virtual);
        assert!(item.backdrop_image_tags.is_empty());
        assert!(item.series_id.is_none());
    }
}
