use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

const KV_DIR: [&str; 4] = [".wrangler", "state", "v3", "kv"];
const INTERNAL_PREFIX: &str = "miniflare-";
const DB_DIR: &str = "miniflare-KVNamespaceObject";

/// Paths of a project's Miniflare KV state.
#[derive(Clone, Debug)]
pub struct KvLayout {
    kv_dir: PathBuf,
}

impl KvLayout {
    pub fn kv_dir_for(root: &Path) -> PathBuf {
        KV_DIR.iter().fold(root.to_path_buf(), |p, part| p.join(part))
    }

    pub fn discover(root: &Path) -> Result<Self> {
        let kv_dir = Self::kv_dir_for(root);
        if !kv_dir.is_dir() {
            anyhow::bail!("No Wrangler KV storage found at {}", root.display());
        }
        Ok(Self { kv_dir })
    }

    pub fn kv_dir(&self) -> &Path {
        &self.kv_dir
    }

    /// Namespace ids, sorted. Miniflare's own directories are skipped.
    pub fn namespace_ids(&self) -> Result<Vec<String>> {
        let mut ids = Vec::new();
        let rd = fs::read_dir(&self.kv_dir)
            .with_context(|| format!("read KV directory {}", self.kv_dir.display()))?;
        for entry in rd {
            let entry = entry.context("read KV directory entry")?;
            let name = entry.file_name().to_string_lossy().to_string();
            if name.starts_with(INTERNAL_PREFIX) {
                continue;
            }
            if entry.file_type().map(|t| t.is_dir()).unwrap_or(false) {
                ids.push(name);
            }
        }
        ids.sort();
        Ok(ids)
    }

    /// SQLite databases holding entry rows, sorted.
    pub fn databases(&self) -> Result<Vec<PathBuf>> {
        let dir = self.kv_dir.join(DB_DIR);
        if !dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut out = Vec::new();
        for entry in fs::read_dir(&dir).with_context(|| format!("read {}", dir.display()))? {
            let path = entry.context("read database directory entry")?.path();
            if path.extension().is_some_and(|ext| ext == "sqlite") {
                out.push(path);
            }
        }
        out.sort();
        Ok(out)
    }

    pub fn blob_path(&self, namespace_id: &str, blob_id: &str) -> PathBuf {
        self.kv_dir.join(namespace_id).join("blobs").join(blob_id)
    }
}

/// True for a single path component that cannot escape its directory.
pub(super) fn is_plain_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains('/')
        && !name.contains('\\')
        && !name.contains('\0')
}
