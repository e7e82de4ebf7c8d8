//! Restoring backup versions to their original paths.

use crate::store::{BackupContext, BackupEntry, BackupSource, BackupStore};
use crate::utils::errors::{Result, VaultError};
use crate::utils::fsio;
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use tracing::info;

#[derive(Debug, Clone)]
pub struct RestoreOptions {
    /// Check stored bytes against the sidecar hash before writing anything
    pub verify_hash: bool,
    /// Back up the current file (source `pre-restore`) before overwriting
    pub safety_backup: bool,
}

impl Default for RestoreOptions {
    fn default() -> Self {
        Self {
            verify_hash: true,
            safety_backup: true,
        }
    }
}

#[derive(Debug)]
pub struct RestoreOutcome {
    pub path: PathBuf,
    pub restored_from: DateTime<Utc>,
    pub safety_backup: Option<BackupEntry>,
    pub bytes_written: u64,
}

/// Write the stored bytes of `entry` back to its original path.
///
/// Corrupt stored content aborts before the original is touched.
pub async fn restore(
    store: &BackupStore,
    entry: &BackupEntry,
    opts: &RestoreOptions,
) -> Result<RestoreOutcome> {
    let path = entry.record.original_path.clone();
    let data = store.read_content(entry).await?;

    if opts.verify_hash {
        let actual = fsio::sha256_hex(&data);
        if actual != entry.record.sha256 || data.len() as u64 != entry.record.size {
            return Err(VaultError::Corrupt(format!(
                "{} of {}: stored copy does not match its sidecar",
                entry.stem(),
                path.display()
            )));
        }
    }

    let safety_backup = if opts.safety_backup && path.exists() {
        let ctx = BackupContext::for_source(BackupSource::PreRestore);
        Some(store.backup_file(&path, &ctx).await?)
    } else {
        None
    };

    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let deadline = store.io_deadline();
    fsio::write_atomic(&path, &data, &deadline).await?;

    info!(
        "Restored {} from {} ({})",
        path.display(),
        entry.stem(),
        fsio::format_bytes(data.len() as u64)
    );

    Ok(RestoreOutcome {
        path,
        restored_from: entry.record.timestamp,
        safety_backup,
        bytes_written: data.len() as u64,
    })
}
