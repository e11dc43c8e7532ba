use crate::whatsnew::CategoryMapping;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct FileConfig {
    // Core settings (can override CLI)
    pub data_dir: Option<String>,
    pub library_fixture: Option<String>,
    pub port: Option<u16>,
    pub metrics_port: Option<u16>,
    pub logging_level: Option<String>,

    pub whatsnew: Option<WhatsNewConfig>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct WhatsNewConfig {
    pub limit_per_category: Option<usize>,
    /// Library ids whose content feeds the list.
    pub enabled_libraries: Option<Vec<String>>,
    /// Extra libraries matched by id or by name.
    pub manual_libraries: Option<Vec<String>>,
    pub category_mappings: Option<Vec<CategoryMapping>>,
    pub retention_days: Option<u64>,
    pub expiry_interval_minutes: Option<u64>,
    pub expiry_first_run_delay_minutes: Option<u64>,
    pub refresh_cooldown_secs: Option<u64>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse config file: {:?}", path))
    }
}
