//! Custom error types for syncvault.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum VaultError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Timed out while {0}")]
    Timeout(String),

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("No backup version found: {0}")]
    VersionNotFound(String),

    #[error("Corrupt backup: {0}")]
    Corrupt(String),

    #[error("Failed to launch remote CLI: {0}")]
    CliLaunch(String),

    #[error("Remote CLI exited with status {status}: {stderr}")]
    CliFailed { status: i32, stderr: String },

    #[error("Unparseable remote CLI output: {0}")]
    CliParse(String),

    #[error("Account not found: {0}")]
    AccountNotFound(String),

    #[error("Operation cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, VaultError>;
