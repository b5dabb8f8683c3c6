//! # sorng-onedrive-connector – Resilient Microsoft OneDrive / Graph Client
//!
//! Action-oriented OneDrive connector for SortOfRemote NG, built against the
//! **Microsoft Graph API v1.0** and the Microsoft identity platform v2.0.
//!
//! ## Capabilities
//!
//! - **OAuth2 Authentication** – authorization-code grant driven through an
//!   interactive callback surface, plus silent refresh on token expiry. Every
//!   new token is persisted and verified by read-back.
//! - **Response Classification** – one rule set turns any Graph or identity
//!   response into a JSON value or a typed error.
//! - **Tree Listing** – depth-first, paginated walk of a folder and all of
//!   its descendants.
//! - **Uploads** – resumable upload sessions in 60 MiB chunks.
//! - **Downloads** – fetch through the pre-authenticated URL into a local
//!   content-addressed object vault.
//! - **Drives & Folders** – enumerate drives, create and delete items.

pub mod types;
pub mod error;
pub mod config;
pub mod transport;
pub mod classifier;
pub mod api_client;
pub mod state_store;
pub mod auth;
pub mod authorized;
pub mod endpoints;
pub mod tree_walker;
pub mod uploads;
pub mod vault;
pub mod files;
pub mod drives;
pub mod callback;
pub mod actions;
pub mod service;

#[cfg(test)]
pub(crate) mod testing;

// Re-exports
pub use actions::{Action, ActionOutcome};
pub use config::ConnectorConfig;
pub use error::{OneDriveError, OneDriveErrorKind, OneDriveResult};
pub use service::OneDriveConnector;
pub use state_store::{FileStateStore, MemoryStateStore, StateStore};
pub use transport::{HttpTransport, ReqwestTransport, ScriptedTransport};
pub use types::*;
pub use vault::{LocalVault, ObjectVault};
