use std::path::{Path, PathBuf};

use chrono::Datelike;
use serde::{Deserialize, Serialize};

use crate::error::{ImportError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_database")]
    pub database: String,
    /// Year line items are matched against; the current year when unset.
    #[serde(default)]
    pub year: Option<i32>,
}

fn default_database() -> String {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("Documents")
        .join("compras")
        .join("compras.db")
        .to_string_lossy()
        .to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database: default_database(),
            year: None,
        }
    }
}

fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("compras")
}

pub fn settings_path() -> PathBuf {
    config_dir().join("settings.json")
}

/// Loads settings from `path`, falling back to defaults when the file is absent.
pub fn load_settings_from(path: &Path) -> Result<Settings> {
    if !path.exists() {
        return Ok(Settings::default());
    }
    let content = std::fs::read_to_string(path)?;
    serde_json::from_str(&content)
        .map_err(|e| ImportError::Settings(format!("{}: {e}", path.display())))
}

pub fn load_settings() -> Result<Settings> {
    load_settings_from(&settings_path())
}

pub fn shellexpand_path(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix('~') {
        if let Some(home) = dirs::home_dir() {
            return PathBuf::from(format!("{}{rest}", home.to_string_lossy()));
        }
    }
    PathBuf::from(path)
}

impl Settings {
    /// Database path: the command-line/env value if given, else the configured one.
    pub fn resolve_database(&self, cli: Option<&Path>) -> PathBuf {
        match cli {
            Some(path) => path.to_path_buf(),
            None => shellexpand_path(&self.database),
        }
    }

    pub fn resolve_year(&self, cli: Option<i32>) -> i32 {
        cli.or(self.year)
            .unwrap_or_else(|| chrono::Local::now().year())
    }
}
