use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::model::LocalFolder;

/// Folders remembered between runs.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FolderCatalog {
    pub version: u32,

    #[serde(default)]
    pub folders: Vec<LocalFolder>,
}

impl FolderCatalog {
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self {
                version: 1,
                folders: Vec::new(),
            });
        }
        let bytes = fs::read(path).with_context(|| format!("read {}", path.display()))?;
        let catalog: FolderCatalog = serde_json::from_slice(&bytes)
            .with_context(|| format!("parse {}", path.display()))?;
        if catalog.version != 1 {
            anyhow::bail!("unsupported folder catalog version {}", catalog.version);
        }
        Ok(catalog)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(self).context("serialize folder catalog")?;
        write_atomic(path, &bytes).with_context(|| format!("write {}", path.display()))
    }
}

/// Stable id for a canonical project path.
pub fn folder_id_for(root: &Path) -> String {
    let hash = blake3::hash(root.to_string_lossy().as_bytes());
    hash.to_hex().as_str()[..16].to_string()
}

pub(super) fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).context("create parent directories")?;
    }
    let tmp = path.with_extension(format!("tmp.{}", std::process::id()));
    fs::write(&tmp, bytes).with_context(|| format!("write temp file {}", tmp.display()))?;
    fs::rename(&tmp, path)
        .with_context(|| format!("rename {} -> {}", tmp.display(), path.display()))?;
    Ok(())
}
