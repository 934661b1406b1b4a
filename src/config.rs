use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::remote::DEFAULT_API_BASE;

pub const API_BASE_ENV: &str = "KVX_API_BASE";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExplorerConfig {
    #[serde(default = "default_api_base")]
    pub api_base_url: String,

    /// Where the folder catalog is persisted. Without one, folders are
    /// only remembered for the lifetime of the process.
    #[serde(default)]
    pub catalog_path: Option<PathBuf>,
}

fn default_api_base() -> String {
    DEFAULT_API_BASE.to_string()
}

impl Default for ExplorerConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base(),
            catalog_path: default_catalog_path(),
        }
    }
}

impl ExplorerConfig {
    /// Reads `path` if given, then applies environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let cfg = match path {
            Some(path) => Self::read(path)?,
            None => Self::default(),
        };
        Ok(cfg.with_api_base_override(std::env::var(API_BASE_ENV).ok()))
    }

    pub fn read(path: &Path) -> Result<Self> {
        let bytes = fs::read(path).with_context(|| format!("read {}", path.display()))?;
        serde_json::from_slice(&bytes).with_context(|| format!("parse {}", path.display()))
    }

    pub fn with_api_base_override(mut self, base: Option<String>) -> Self {
        if let Some(base) = base.filter(|b| !b.trim().is_empty()) {
            self.api_base_url = base.trim().trim_end_matches('/').to_string();
        }
        self
    }
}

/// `$XDG_CONFIG_HOME/kvx/folders.json`, else `~/.config/kvx/folders.json`.
fn default_catalog_path() -> Option<PathBuf> {
    let base = std::env::var_os("XDG_CONFIG_HOME")
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))?;
    Some(base.join("kvx").join("folders.json"))
}
