//! Syncvault Library
//!
//! Versioned file backups around remote platform sync operations.
//!
//! Every file touched by a `pull` or `push` is copied into a local vault
//! before and after the external sync CLI runs, as a timestamp-named content
//! copy plus a JSON sidecar. The vault index is rebuilt from the sidecars on
//! every query; diff and restore operate on indexed versions.

pub mod config;
pub mod diff;
pub mod remote;
pub mod restore;
pub mod store;
pub mod utils;

// Re-export commonly used types
pub use config::Config;
pub use utils::errors::VaultError;
pub type Result<T> = std::result::Result<T, VaultError>;
