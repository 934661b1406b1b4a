use thiserror::Error;

use crate::registry::RegistryError;

/// Failures surfaced by [`crate::SessionController`] operations.
///
/// Each variant renders as a single human-readable message. A failed
/// operation never leaves a partial merge behind.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("namespace not found: {0}")]
    NamespaceNotFound(String),

    #[error("no namespace selected")]
    NoActiveNamespace,

    #[error("key not found: {0}")]
    KeyNotFound(String),

    #[error("no edit in progress")]
    NoEditInProgress,

    #[error("invalid JSON value: {0}")]
    InvalidEdit(String),

    #[error("no remote connection")]
    NoRemoteConnection,

    #[error("already connected to account {0} (disconnect first)")]
    RemoteAlreadyConnected(String),

    #[error("unknown folder: {0}")]
    UnknownFolder(String),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("{0:#}")]
    Adapter(#[from] anyhow::Error),
}

pub type SessionResult<T> = std::result::Result<T, SessionError>;
