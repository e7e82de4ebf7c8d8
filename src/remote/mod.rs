//! Remote platform boundary.
//!
//! Everything remote happens through an external sync CLI: this module
//! spawns it, scrapes its free-text output, and orchestrates the
//! backup-around-sync flow.

pub mod account;
pub mod cli;
pub mod sync;

pub use account::{Account, AccountStatus};
pub use cli::{CliOutput, PlatformCli};
pub use sync::{SyncDirection, SyncEngine, SyncReport};
