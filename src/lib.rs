//! Session manager for browsing and editing key-value namespaces drawn from
//! local Wrangler projects and a remote Cloudflare account.

pub mod config;
pub mod error;
pub mod local;
pub mod logging;
pub mod model;
pub mod registry;
pub mod remote;
pub mod selection;
pub mod session;
pub mod source;

pub use error::SessionError;
pub use session::{SessionController, SessionSnapshot, SourceOutcome, SourceRequest};
