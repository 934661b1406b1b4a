//! Session controller: the state machine between user intents and the
//! source adapters.
//!
//! State lives behind an async mutex that is never held across an adapter
//! call, so operations issued back to back may overlap. Every response that
//! would replace session data carries a [`Ticket`]; it is applied only while
//! the ticket is still the latest issued for its slot and, where it targets a
//! namespace, while that namespace is still active.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::{SessionError, SessionResult};
use crate::model::{Entry, LocalFolder, Namespace, Provenance, Value};
use crate::registry::{MergeScope, NamespaceRegistry};
use crate::selection::{EditState, KeyToggle, Preview, Selection};
use crate::source::{FolderPicker, LocalSource, RemoteSource};

mod edits;
mod navigation;
mod sources;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SourceRequest {
    /// Ask the folder picker for a project and load it.
    Local,
    /// Connect an account and load its namespaces.
    Remote { account_id: String, api_token: String },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SourceOutcome {
    Cancelled,
    Loaded { namespaces: usize },
}

/// Point-in-time copy of everything a view needs to render.
#[derive(Clone, Debug, Serialize)]
pub struct SessionSnapshot {
    pub namespaces: Vec<Namespace>,
    pub folders: Vec<LocalFolder>,
    pub remote_account: Option<String>,
    pub active_namespace: Option<String>,
    pub entries: Vec<Entry>,
    pub checked: BTreeSet<String>,
    pub preview: Option<Preview>,
    pub edit: Option<EditState>,
    pub loading: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
enum Slot {
    Entries,
    Preview,
    Edit,
    Folder(String),
    RemoteNamespaces,
}

#[derive(Clone, Debug, PartialEq, Eq)]
struct Ticket {
    slot: Slot,
    generation: u64,
    namespace_id: Option<String>,
}

/// Where adapter calls for a namespace go.
enum Target {
    Local { folder_id: String },
    Remote { account_id: String },
}

#[derive(Default)]
struct SessionState {
    registry: NamespaceRegistry,
    folders: Vec<LocalFolder>,
    remote_account: Option<String>,
    active: Option<String>,
    entries: Vec<Entry>,
    selection: Selection,
    generation: u64,
    issued: HashMap<Slot, u64>,
}

impl SessionState {
    fn issue(&mut self, slot: Slot, namespace_id: Option<String>) -> Ticket {
        self.generation += 1;
        self.issued.insert(slot.clone(), self.generation);
        Ticket {
            slot,
            generation: self.generation,
            namespace_id,
        }
    }

    fn is_current(&self, ticket: &Ticket) -> bool {
        if self.issued.get(&ticket.slot) != Some(&ticket.generation) {
            return false;
        }
        match &ticket.namespace_id {
            Some(id) => self.active.as_deref() == Some(id.as_str()),
            None => true,
        }
    }

    fn forget_namespace_requests(&mut self) {
        self.issued.remove(&Slot::Entries);
        self.issued.remove(&Slot::Preview);
        self.issued.remove(&Slot::Edit);
    }

    /// Switches the active namespace, dropping all per-namespace state.
    fn activate(&mut self, namespace_id: String) {
        self.active = Some(namespace_id);
        self.entries.clear();
        self.selection.reset();
        self.forget_namespace_requests();
    }

    fn clear_active(&mut self) {
        self.active = None;
        self.entries.clear();
        self.selection.reset();
        self.forget_namespace_requests();
    }

    fn active_namespace(&self) -> SessionResult<&Namespace> {
        let id = self.active.as_deref().ok_or(SessionError::NoActiveNamespace)?;
        self.registry
            .get(id)
            .ok_or_else(|| SessionError::NamespaceNotFound(id.to_string()))
    }

    fn target(&self, ns: &Namespace) -> SessionResult<Target> {
        match &ns.provenance {
            Provenance::Local { folder_id } => Ok(Target::Local {
                folder_id: folder_id.clone(),
            }),
            Provenance::Remote {
                account_id: Some(account_id),
            } => Ok(Target::Remote {
                account_id: account_id.clone(),
            }),
            Provenance::Remote { account_id: None } => self
                .remote_account
                .clone()
                .map(|account_id| Target::Remote { account_id })
                .ok_or(SessionError::NoRemoteConnection),
        }
    }

    fn knows_folder(&self, folder_id: &str) -> bool {
        self.folders.iter().any(|f| f.id == folder_id)
    }

    fn upsert_folder(&mut self, folder: LocalFolder) {
        match self.folders.iter_mut().find(|f| f.id == folder.id) {
            Some(existing) => *existing = folder,
            None => self.folders.push(folder),
        }
    }

    /// Re-derives session data after the registry changed underneath the
    /// active namespace.
    fn sync_active(&mut self) {
        let Some(active) = self.active.clone() else {
            return;
        };
        let Some(ns) = self.registry.get(&active) else {
            debug!(namespace = %active, "active namespace left the registry");
            self.clear_active();
            return;
        };
        if let Provenance::Local { .. } = ns.provenance {
            self.entries = ns.entries.clone();
            self.sync_selection();
        }
    }

    fn sync_selection(&mut self) {
        let entries = &self.entries;
        self.selection
            .checked
            .retain(|key| entries.iter().any(|e| &e.key == key));

        let refreshed = self.selection.preview.as_ref().map(|preview| {
            entries
                .iter()
                .find(|e| e.key == preview.key)
                .map(|e| e.value.clone())
        });
        match refreshed {
            None => {}
            Some(None) => self.selection.preview = None,
            Some(Some(value)) => {
                if let (Some(value), Some(preview)) = (value, self.selection.preview.as_mut()) {
                    preview.value = value;
                }
            }
        }
    }

    fn snapshot(&self, loading: bool) -> SessionSnapshot {
        SessionSnapshot {
            namespaces: self.registry.to_vec(),
            folders: self.folders.clone(),
            remote_account: self.remote_account.clone(),
            active_namespace: self.active.clone(),
            entries: self.entries.clone(),
            checked: self.selection.checked.clone(),
            preview: self.selection.preview.clone(),
            edit: self.selection.edit.clone(),
            loading,
        }
    }
}

struct LoadingGuard<'a>(&'a AtomicUsize);

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

pub struct SessionController {
    local: Arc<dyn LocalSource>,
    remote: Arc<dyn RemoteSource>,
    picker: Arc<dyn FolderPicker>,
    state: Mutex<SessionState>,
    in_flight: AtomicUsize,
}

impl SessionController {
    /// Starts with an empty registry and no active source.
    pub fn new(
        local: Arc<dyn LocalSource>,
        remote: Arc<dyn RemoteSource>,
        picker: Arc<dyn FolderPicker>,
    ) -> Self {
        Self {
            local,
            remote,
            picker,
            state: Mutex::new(SessionState::default()),
            in_flight: AtomicUsize::new(0),
        }
    }

    /// True while any adapter call issued by this session is outstanding.
    pub fn is_loading(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst) > 0
    }

    fn begin_loading(&self) -> LoadingGuard<'_> {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        LoadingGuard(&self.in_flight)
    }

    pub async fn snapshot(&self) -> SessionSnapshot {
        let loading = self.is_loading();
        self.state.lock().await.snapshot(loading)
    }

    pub async fn active_namespace(&self) -> Option<String> {
        self.state.lock().await.active.clone()
    }

    pub async fn entries(&self) -> Vec<Entry> {
        self.state.lock().await.entries.clone()
    }

    pub async fn namespaces(&self) -> Vec<Namespace> {
        self.state.lock().await.registry.to_vec()
    }

    pub async fn toggle_key(&self, toggle: KeyToggle) {
        let mut st = self.state.lock().await;
        let SessionState {
            selection, entries, ..
        } = &mut *st;
        selection.toggle(toggle, entries);
    }
}
