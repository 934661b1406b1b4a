//! Local adapter over Wrangler projects and their Miniflare KV state.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::info;

use crate::model::{Entry, LoadedFolder, LocalFolder, Namespace, Provenance, Value};
use crate::source::LocalSource;

mod catalog;
mod layout;
mod read;
mod write;

pub use self::catalog::{FolderCatalog, folder_id_for};
pub use self::layout::KvLayout;

/// Tracks project folders and reads/writes their KV state on disk.
pub struct LocalStore {
    catalog_path: Option<PathBuf>,
    folders: Mutex<Vec<LocalFolder>>,
}

impl LocalStore {
    /// Store that forgets its folders when dropped.
    pub fn in_memory() -> Self {
        Self {
            catalog_path: None,
            folders: Mutex::new(Vec::new()),
        }
    }

    /// Store backed by a folder catalog file; a missing file starts empty.
    pub fn open(catalog_path: &Path) -> Result<Self> {
        let catalog = FolderCatalog::load(catalog_path)?;
        Ok(Self {
            catalog_path: Some(catalog_path.to_path_buf()),
            folders: Mutex::new(catalog.folders),
        })
    }

    fn persist(&self, folders: &[LocalFolder]) -> Result<()> {
        let Some(path) = &self.catalog_path else {
            return Ok(());
        };
        FolderCatalog {
            version: 1,
            folders: folders.to_vec(),
        }
        .save(path)
    }

    async fn folder(&self, folder_id: &str) -> Result<LocalFolder> {
        self.folders
            .lock()
            .await
            .iter()
            .find(|f| f.id == folder_id)
            .cloned()
            .ok_or_else(|| anyhow!("unknown folder {}", folder_id))
    }

    async fn layout(&self, folder_id: &str) -> Result<KvLayout> {
        let folder = self.folder(folder_id).await?;
        KvLayout::discover(&folder.path)
    }
}

async fn blocking<T, F>(label: &'static str, f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .with_context(|| format!("{} task", label))?
}

#[async_trait]
impl LocalSource for LocalStore {
    async fn list_folders(&self) -> Result<Vec<LocalFolder>> {
        Ok(self.folders.lock().await.clone())
    }

    async fn add_folder(&self, path: &Path) -> Result<LoadedFolder> {
        let root = path
            .canonicalize()
            .with_context(|| format!("resolve folder {}", path.display()))?;
        let layout = KvLayout::discover(&root)?;

        let folder = LocalFolder {
            id: folder_id_for(&root),
            name: root
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| root.display().to_string()),
            path: root,
        };

        let folder_id = folder.id.clone();
        let namespaces =
            blocking("read namespaces", move || read::read_namespaces(&layout, &folder_id))
                .await?;

        let mut folders = self.folders.lock().await;
        match folders.iter_mut().find(|f| f.id == folder.id) {
            Some(existing) => *existing = folder.clone(),
            None => folders.push(folder.clone()),
        }
        self.persist(&folders).context("save folder catalog")?;

        info!(folder = %folder.id, path = %folder.path.display(), "added folder");
        Ok(LoadedFolder { folder, namespaces })
    }

    async fn remove_folder(&self, folder_id: &str) -> Result<()> {
        let mut folders = self.folders.lock().await;
        let before = folders.len();
        folders.retain(|f| f.id != folder_id);
        if folders.len() == before {
            anyhow::bail!("unknown folder {}", folder_id);
        }
        self.persist(&folders).context("save folder catalog")
    }

    async fn load_namespaces(&self, folder_id: &str) -> Result<Vec<Namespace>> {
        let layout = self.layout(folder_id).await?;
        let folder_id = folder_id.to_string();
        blocking("read namespaces", move || read::read_namespaces(&layout, &folder_id)).await
    }

    async fn delete_keys(
        &self,
        folder_id: &str,
        namespace_id: &str,
        keys: &[String],
    ) -> Result<()> {
        let layout = self.layout(folder_id).await?;
        let namespace_id = namespace_id.to_string();
        let keys = keys.to_vec();
        blocking("delete keys", move || {
            write::delete_keys(&layout, &namespace_id, &keys)
        })
        .await
    }

    async fn update_value(
        &self,
        folder_id: &str,
        namespace_id: &str,
        key: &str,
        value: &Value,
    ) -> Result<()> {
        let layout = self.layout(folder_id).await?;
        let namespace_id = namespace_id.to_string();
        let key = key.to_string();
        let value = value.clone();
        blocking("update value", move || {
            write::update_value(&layout, &namespace_id, &key, &value)
        })
        .await
    }
}

/// Builds a local namespace from a directory name, as Wrangler names them.
fn namespace(folder_id: &str, id: String, entries: Vec<Entry>) -> Namespace {
    Namespace {
        name: id.to_uppercase(),
        count: Some(entries.len()),
        provenance: Provenance::local(folder_id),
        id,
        entries,
    }
}
