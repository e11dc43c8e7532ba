//! Eligibility and category resolution for library items.

use super::models::{CategoryMapping, Classification};
use crate::library::{ItemKind, LibraryFolder, LibraryHost, LibraryItem};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

pub const SERIES_CATEGORY: &str = "Series";
pub const MOVIES_CATEGORY: &str = "Movies";
pub const MUSIC_CATEGORY: &str = "Music";

/// Which libraries feed the what's-new list and how they are labelled.
#[derive(Debug, Clone, Default)]
pub struct ClassifierSettings {
    /// Library ids selected in the configuration.
    pub enabled_libraries: Vec<String>,
    /// Free-form entries matched against library ids or names.
    pub manual_libraries: Vec<String>,
    pub category_mappings: Vec<CategoryMapping>,
}

/// Canonical comparison form of a library id.
///
/// UUIDs compare in their simple form so hyphenated and unhyphenated
/// spellings match; anything else compares lowercase.
pub fn normalize_library_id(id: &str) -> String {
    let trimmed = id.trim();
    match Uuid::parse_str(trimmed) {
        Ok(uuid) => uuid.simple().to_string(),
        Err(_) => trimmed.to_lowercase(),
    }
}

fn default_category(kind: ItemKind) -> Option<&'static str> {
    match kind {
        ItemKind::Episode => Some(SERIES_CATEGORY),
        ItemKind::Movie => Some(MOVIES_CATEGORY),
        ItemKind::MusicAlbum => Some(MUSIC_CATEGORY),
        _ => None,
    }
}

pub struct Classifier {
    library: Arc<dyn LibraryHost>,
    enabled_ids: Vec<String>,
    manual_entries: Vec<String>,
    mappings: Vec<(String, String)>,
}

impl Classifier {
    pub fn new(library: Arc<dyn LibraryHost>, settings: &ClassifierSettings) -> Self {
        Self {
            library,
            enabled_ids: settings
                .enabled_libraries
                .iter()
                .map(|id| normalize_library_id(id))
                .collect(),
            manual_entries: settings
                .manual_libraries
                .iter()
                .map(|e| e.trim().to_lowercase())
                .filter(|e| !e.is_empty())
                .collect(),
            mappings: settings
                .category_mappings
                .iter()
                .map(|m| (normalize_library_id(&m.library_id), m.category.clone()))
                .collect(),
        }
    }

    /// Returns `None` when the item must not appear in the feed.
    pub fn classify(&self, item: &LibraryItem) -> Option<Classification> {
        if item.is_folder || item.is_virtual {
            return None;
        }
        let base_category = default_category(item.kind)?;

        let mut chain = self.library.ancestors(&item.id);
        let root = self.library.root_collection(&item.id);
        if let Some(root) = &root {
            if !chain.iter().any(|f| f.id == root.id) {
                chain.push(root.clone());
            }
        }

        let matched_library_id = if self.enabled_ids.is_empty() && self.manual_entries.is_empty()
        {
            root?.id
        } else {
            match chain.iter().find(|folder| self.matches(folder)) {
                Some(folder) => folder.id.clone(),
                None => {
                    debug!("Item {} is outside the selected libraries", item.id);
                    return None;
                }
            }
        };

        let category = self
            .mapped_category(&matched_library_id)
            .unwrap_or(base_category)
            .to_string();

        Some(Classification {
            category,
            matched_library_id,
        })
    }

    fn matches(&self, folder: &LibraryFolder) -> bool {
        let id = normalize_library_id(&folder.id);
        let raw_id = folder.id.trim().to_lowercase();
        let name = folder.name.trim().to_lowercase();

        self.enabled_ids.iter().any(|e| *e == id)
            || self
                .manual_entries
                .iter()
                .any(|e| normalize_library_id(e) == id || *e == raw_id || *e == name)
    }

    fn mapped_category(&self, library_id: &str) -> Option<&str> {
        let library_id = normalize_library_id(library_id);
        self.mappings
            .iter()
            .find(|(id, _)| *id == library_id)
            .map(|(_, category)| category.as_str())
    }
}
