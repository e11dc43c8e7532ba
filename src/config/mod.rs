mod file_config;

pub use file_config::{FileConfig, WhatsNewConfig};

use crate::server::RequestsLoggingLevel;
use crate::whatsnew::{
    effective_limit, CategoryMapping, ClassifierSettings, DEFAULT_LIMIT_PER_CATEGORY,
};
use anyhow::{bail, Result};
use clap::ValueEnum;
use std::path::PathBuf;
use std::time::Duration;

/// CLI arguments that can be used for config resolution.
/// This struct mirrors the CLI arguments that can be overridden by TOML config.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub data_dir: Option<PathBuf>,
    pub library_fixture: Option<PathBuf>,
    pub port: u16,
    pub metrics_port: u16,
    pub logging_level: RequestsLoggingLevel,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub data_dir: PathBuf,
    pub library_fixture: Option<PathBuf>,
    pub port: u16,
    pub metrics_port: u16,
    pub logging_level: RequestsLoggingLevel,

    pub whatsnew: WhatsNewSettings,
}

impl AppConfig {
    /// Resolve configuration from CLI arguments and optional TOML file config.
    /// TOML values override CLI values where present.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        let data_dir = file
            .data_dir
            .map(PathBuf::from)
            .or_else(|| cli.data_dir.clone())
            .ok_or_else(|| {
                anyhow::anyhow!("data_dir must be specified via --data-dir or in config file")
            })?;

        if !data_dir.exists() {
            bail!("Data directory does not exist: {:?}", data_dir);
        }
        if !data_dir.is_dir() {
            bail!("data_dir is not a directory: {:?}", data_dir);
        }

        let library_fixture = file
            .library_fixture
            .map(PathBuf::from)
            .or_else(|| cli.library_fixture.clone());
        if let Some(path) = &library_fixture {
            if !path.is_file() {
                bail!("Library fixture not found: {:?}", path);
            }
        }

        let port = file.port.unwrap_or(cli.port);
        let metrics_port = file.metrics_port.unwrap_or(cli.metrics_port);

        let logging_level = file
            .logging_level
            .and_then(|s| parse_logging_level(&s))
            .unwrap_or_else(|| cli.logging_level.clone());

        let whatsnew = WhatsNewSettings::from_file(file.whatsnew.unwrap_or_default());

        Ok(Self {
            data_dir,
            library_fixture,
            port,
            metrics_port,
            logging_level,
            whatsnew,
        })
    }

    pub fn notifications_path(&self) -> PathBuf {
        self.data_dir.join("notifications.json")
    }

    pub fn last_seen_path(&self) -> PathBuf {
        self.data_dir.join("last_seen.json")
    }
}

#[derive(Debug, Clone)]
pub struct WhatsNewSettings {
    pub limit_per_category: usize,
    pub enabled_libraries: Vec<String>,
    pub manual_libraries: Vec<String>,
    pub category_mappings: Vec<CategoryMapping>,
    pub retention_days: u64,
    pub expiry_interval_minutes: u64,
    pub expiry_first_run_delay_minutes: u64,
    pub refresh_cooldown_secs: u64,
}

impl Default for WhatsNewSettings {
    fn default() -> Self {
        Self {
            limit_per_category: DEFAULT_LIMIT_PER_CATEGORY,
            enabled_libraries: Vec::new(),
            manual_libraries: Vec::new(),
            category_mappings: Vec::new(),
            retention_days: 30,
            expiry_interval_minutes: 60,
            expiry_first_run_delay_minutes: 5,
            refresh_cooldown_secs: 60,
        }
    }
}

impl WhatsNewSettings {
    fn from_file(file: WhatsNewConfig) -> Self {
        let defaults = Self::default();
        Self {
            limit_per_category: effective_limit(
                file.limit_per_category
                    .unwrap_or(defaults.limit_per_category),
            ),
            enabled_libraries: file.enabled_libraries.unwrap_or_default(),
            manual_libraries: file.manual_libraries.unwrap_or_default(),
            category_mappings: file.category_mappings.unwrap_or_default(),
            retention_days: file.retention_days.unwrap_or(defaults.retention_days),
            expiry_interval_minutes: file
                .expiry_interval_minutes
                .unwrap_or(defaults.expiry_interval_minutes)
                .max(1),
            expiry_first_run_delay_minutes: file
                .expiry_first_run_delay_minutes
                .unwrap_or(defaults.expiry_first_run_delay_minutes),
            refresh_cooldown_secs: file
                .refresh_cooldown_secs
                .unwrap_or(defaults.refresh_cooldown_secs),
        }
    }

    pub fn classifier_settings(&self) -> ClassifierSettings {
        ClassifierSettings {
            enabled_libraries: self.enabled_libraries.clone(),
            manual_libraries: self.manual_libraries.clone(),
            category_mappings: self.category_mappings.clone(),
        }
    }

    pub fn retention(&self) -> chrono::Duration {
        chrono::Duration::days(self.retention_days as i64)
    }

    pub fn expiry_interval(&self) -> Duration {
        Duration::from_secs(self.expiry_interval_minutes * 60)
    }

    pub fn expiry_first_run_delay(&self) -> Duration {
        Duration::from_secs(self.expiry_first_run_delay_minutes * 60)
    }

    pub fn refresh_cooldown(&self) -> Duration {
        Duration::from_secs(self.refresh_cooldown_secs)
    }
}

/// Parses a logging level string into RequestsLoggingLevel.
/// Uses clap's ValueEnum trait for parsing.
fn parse_logging_level(s: &str) -> Option<RequestsLoggingLevel> {
    RequestsLoggingLevel::from_str(s, true).ok()
}
