//! Unified namespace list across every active source.
//!
//! Every mutation is scoped by provenance: a merge or removal only ever
//! touches the partition its [`MergeScope`] covers, and the untouched
//! remainder is carried over as-is.

use std::collections::HashSet;

use thiserror::Error;

use crate::model::{Namespace, Provenance};

/// Provenance predicate selecting the partition an operation replaces.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MergeScope {
    /// Namespaces loaded from one local folder.
    Folder(String),
    /// Every remote namespace (at most one connection is active).
    Remote,
}

impl MergeScope {
    pub fn covers(&self, provenance: &Provenance) -> bool {
        match (self, provenance) {
            (MergeScope::Folder(id), Provenance::Local { folder_id }) => id == folder_id,
            (MergeScope::Folder(_), Provenance::Remote { .. }) => false,
            (MergeScope::Remote, Provenance::Remote { .. }) => true,
            (MergeScope::Remote, Provenance::Local { .. }) => false,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("namespace {id} is already loaded from another source ({existing:?})")]
    Conflict { id: String, existing: Provenance },

    #[error("namespace {0} appears more than once in the same listing")]
    DuplicateInListing(String),

    #[error("namespace {id} does not belong to {scope:?}")]
    ForeignProvenance { id: String, scope: MergeScope },
}

#[derive(Clone, Debug, Default)]
pub struct NamespaceRegistry {
    namespaces: Vec<Namespace>,
}

impl NamespaceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the partition covered by `scope` with `incoming`.
    ///
    /// The registry is left untouched when any incoming namespace is
    /// attributed elsewhere or shares an id with a namespace outside the
    /// scope.
    pub fn merge(
        &mut self,
        scope: &MergeScope,
        incoming: Vec<Namespace>,
    ) -> Result<(), RegistryError> {
        let mut seen = HashSet::new();
        for ns in &incoming {
            if !scope.covers(&ns.provenance) {
                return Err(RegistryError::ForeignProvenance {
                    id: ns.id.clone(),
                    scope: scope.clone(),
                });
            }
            if !seen.insert(ns.id.as_str()) {
                return Err(RegistryError::DuplicateInListing(ns.id.clone()));
            }
            if let Some(existing) = self
                .namespaces
                .iter()
                .find(|other| other.id == ns.id && !scope.covers(&other.provenance))
            {
                return Err(RegistryError::Conflict {
                    id: ns.id.clone(),
                    existing: existing.provenance.clone(),
                });
            }
        }

        self.namespaces.retain(|ns| !scope.covers(&ns.provenance));
        self.namespaces.extend(incoming);
        Ok(())
    }

    /// Drops the partition covered by `scope`, returning what was removed.
    pub fn remove(&mut self, scope: &MergeScope) -> Vec<Namespace> {
        let (removed, kept) = std::mem::take(&mut self.namespaces)
            .into_iter()
            .partition(|ns| scope.covers(&ns.provenance));
        self.namespaces = kept;
        removed
    }

    pub fn get(&self, id: &str) -> Option<&Namespace> {
        self.namespaces.iter().find(|ns| ns.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Namespace> {
        self.namespaces.iter()
    }

    pub fn len(&self) -> usize {
        self.namespaces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.namespaces.is_empty()
    }

    pub fn to_vec(&self) -> Vec<Namespace> {
        self.namespaces.clone()
    }
}
