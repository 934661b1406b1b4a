//! Adapter contracts the session drives. Every call resolves or fails once;
//! there are no retries at this layer.

use std::path::{Path, PathBuf};

use anyhow::Result;
use async_trait::async_trait;

use crate::model::{Entry, LoadedFolder, LocalFolder, Namespace, Value};

/// Asks the user for a project folder. `None` means the choice was cancelled.
#[async_trait]
pub trait FolderPicker: Send + Sync {
    async fn choose_folder(&self) -> Result<Option<PathBuf>>;
}

/// Picker that hands back a path fixed up front (CLI arguments, tests).
#[derive(Clone, Debug, Default)]
pub struct PresetFolder(pub Option<PathBuf>);

impl PresetFolder {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self(Some(path.into()))
    }
}

#[async_trait]
impl FolderPicker for PresetFolder {
    async fn choose_folder(&self) -> Result<Option<PathBuf>> {
        Ok(self.0.clone())
    }
}

/// Filesystem-backed projects. Listings carry entries inline with values.
#[async_trait]
pub trait LocalSource: Send + Sync {
    async fn list_folders(&self) -> Result<Vec<LocalFolder>>;

    async fn add_folder(&self, path: &Path) -> Result<LoadedFolder>;

    async fn remove_folder(&self, folder_id: &str) -> Result<()>;

    async fn load_namespaces(&self, folder_id: &str) -> Result<Vec<Namespace>>;

    async fn delete_keys(&self, folder_id: &str, namespace_id: &str, keys: &[String])
    -> Result<()>;

    async fn update_value(
        &self,
        folder_id: &str,
        namespace_id: &str,
        key: &str,
        value: &Value,
    ) -> Result<()>;
}

/// Network-backed account. Namespace listings carry counts only and key
/// listings carry no values.
#[async_trait]
pub trait RemoteSource: Send + Sync {
    /// Validates and retains the credential inside the adapter.
    async fn connect(&self, account_id: &str, api_token: &str) -> Result<()>;

    async fn disconnect(&self) -> Result<()>;

    async fn list_namespaces(&self) -> Result<Vec<Namespace>>;

    async fn list_keys(&self, account_id: &str, namespace_id: &str) -> Result<Vec<Entry>>;

    async fn get_value(&self, account_id: &str, namespace_id: &str, key: &str) -> Result<Value>;

    async fn update_value(
        &self,
        account_id: &str,
        namespace_id: &str,
        key: &str,
        value: &Value,
    ) -> Result<()>;

    async fn delete_keys(&self, account_id: &str, namespace_id: &str, keys: &[String])
    -> Result<()>;
}
