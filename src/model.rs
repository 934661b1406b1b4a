use std::path::PathBuf;

use serde::{Deserialize, Serialize};

mod listing;
pub use self::listing::{EntrySort, SortDirection, SortField, format_expiration};

/// Structured value stored under a key. Opaque to the session apart from
/// pretty-printing for edits.
pub type Value = serde_json::Value;

/// Bytes written to a source for a value. Always JSON, strings included,
/// so a value reads back with the same type it was saved with.
pub fn encode_value(value: &Value) -> serde_json::Result<Vec<u8>> {
    serde_json::to_vec(value)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Local,
    Remote,
}

/// Which source a namespace was loaded from.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Provenance {
    Local {
        folder_id: String,
    },
    Remote {
        // Absent when the adapter could not attribute the namespace to an
        // account; callers fall back to the active connection.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        account_id: Option<String>,
    },
}

impl Provenance {
    pub fn local(folder_id: impl Into<String>) -> Self {
        Provenance::Local {
            folder_id: folder_id.into(),
        }
    }

    pub fn remote(account_id: impl Into<String>) -> Self {
        Provenance::Remote {
            account_id: Some(account_id.into()),
        }
    }

    pub fn kind(&self) -> SourceKind {
        match self {
            Provenance::Local { .. } => SourceKind::Local,
            Provenance::Remote { .. } => SourceKind::Remote,
        }
    }

    pub fn folder_id(&self) -> Option<&str> {
        match self {
            Provenance::Local { folder_id } => Some(folder_id),
            Provenance::Remote { .. } => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    pub key: String,

    /// Present for local entries; remote listings never carry values.
    #[serde(default)]
    pub value: Option<Value>,

    /// Unix seconds after which the entry is no longer valid.
    #[serde(default)]
    pub expiration: Option<i64>,

    #[serde(default)]
    pub metadata: Option<String>,
}

impl Entry {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: None,
            expiration: None,
            metadata: None,
        }
    }

    pub fn with_value(mut self, value: Value) -> Self {
        self.value = Some(value);
        self
    }

    pub fn with_expiration(mut self, expiration: i64) -> Self {
        self.expiration = Some(expiration);
        self
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Namespace {
    pub id: String,
    pub name: String,

    /// Total reported by the source; may exceed `entries.len()`.
    #[serde(default)]
    pub count: Option<usize>,

    pub provenance: Provenance,

    #[serde(default)]
    pub entries: Vec<Entry>,
}

impl Namespace {
    pub fn kind(&self) -> SourceKind {
        self.provenance.kind()
    }

    pub fn display_count(&self) -> usize {
        self.count.unwrap_or(self.entries.len())
    }

    pub fn entry(&self, key: &str) -> Option<&Entry> {
        self.entries.iter().find(|e| e.key == key)
    }
}

/// A Wrangler project folder tracked by the local adapter.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalFolder {
    pub id: String,
    pub path: PathBuf,
    pub name: String,
}

/// Result of registering a folder with the local adapter.
#[derive(Clone, Debug)]
pub struct LoadedFolder {
    pub folder: LocalFolder,
    pub namespaces: Vec<Namespace>,
}
