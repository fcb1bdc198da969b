// ⚙️ Settings - config.toml + environment overrides
//
// Every field has a default, so an absent or partial file is fine.
// Environment variables win over the file.

use crate::normalize::Locale;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const ENV_DATABASE: &str = "NCM_CATALOG_DB";
pub const ENV_SERVER_ADDR: &str = "NCM_CATALOG_ADDR";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// SQLite file holding records and the audit trail
    pub database_path: PathBuf,

    pub server_addr: String,

    /// Name offered for spreadsheet downloads
    pub export_file_name: String,

    /// Worksheet name used on export
    pub sheet_name: String,

    pub locale: Locale,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            database_path: PathBuf::from("ncm_catalog.db"),
            server_addr: "127.0.0.1:3000".to_string(),
            export_file_name: "NCM_export.xlsx".to_string(),
            sheet_name: "NCM".to_string(),
            locale: Locale::default(),
        }
    }
}

impl Settings {
    /// `<config dir>/ncm-catalog/config.toml`
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("ncm-catalog")
            .join("config.toml")
    }

    /// Load settings, then apply environment overrides
    ///
    /// An explicit path must exist; the default path is optional.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut settings = match path {
            Some(path) => Self::from_file(path)?,
            None => {
                let path = Self::default_config_path();
                if path.exists() {
                    Self::from_file(&path)?
                } else {
                    log::debug!("no config at {}, using defaults", path.display());
                    Self::default()
                }
            }
        };

        settings.apply_env(|key| std::env::var(key).ok());
        Ok(settings)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let settings = Self::from_toml(&text)
            .with_context(|| format!("Invalid config file: {}", path.display()))?;
        log::info!("loaded settings from {}", path.display());
        Ok(settings)
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Override from `NCM_CATALOG_DB` / `NCM_CATALOG_ADDR` (empty values ignored)
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(db) = lookup(ENV_DATABASE).filter(|v| !v.trim().is_empty()) {
            self.database_path = PathBuf::from(db);
        }
        if let Some(addr) = lookup(ENV_SERVER_ADDR).filter(|v| !v.trim().is_empty()) {
            self.server_addr = addr;
        }
    }
}
