//! The backup vault.
//!
//! Layout: each original file maps to one vault directory mirroring its
//! absolute path under `<root>/files/`. A backup is a pair of files in that
//! directory sharing a timestamp stem: the content copy (`.bak`, or
//! `.bak.zst` when compressed) and the JSON sidecar (`.json`). The content
//! copy is always written before its sidecar, so a readable sidecar implies
//! its copy was fully written.

pub mod index;
pub mod record;
pub mod retention;
pub mod verify;

pub use index::{BackupEntry, VaultIndex};
pub use record::{BackupRecord, BackupSource, Compression, RemoteAccount};

use crate::config::Config;
use crate::utils::errors::{Result, VaultError};
use crate::utils::fsio::{self, Deadline};
use record::{timestamp_stem, SIDECAR_VERSION};
use std::path::{Component, Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tracing::{debug, info};

/// Context recorded into every sidecar written during one operation.
#[derive(Debug, Clone)]
pub struct BackupContext {
    pub source: BackupSource,
    pub auth_id: Option<String>,
    pub account: Option<RemoteAccount>,
}

impl BackupContext {
    pub fn manual() -> Self {
        Self::for_source(BackupSource::Manual)
    }

    pub fn for_source(source: BackupSource) -> Self {
        Self {
            source,
            auth_id: None,
            account: None,
        }
    }
}

/// Vault handle: root directory plus write policy.
pub struct BackupStore {
    root: PathBuf,
    host: String,
    io_timeout: Duration,
    compress: bool,
    compression_min_bytes: u64,
}

impl BackupStore {
    /// Open (creating if needed) the vault described by `config`.
    pub fn from_config(config: &Config) -> Result<Self> {
        let compress = match config.backup.compression.as_str() {
            "zstd" => true,
            "none" => false,
            other => {
                return Err(VaultError::Config(format!(
                    "unknown compression '{}' (expected zstd or none)",
                    other
                )))
            }
        };

        let root = config.vault.root.clone();
        std::fs::create_dir_all(&root)?;

        Ok(Self {
            root,
            host: config.host(),
            io_timeout: Duration::from_secs(config.vault.io_timeout_secs),
            compress,
            compression_min_bytes: config.backup.compression_min_bytes,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Fresh deadline covering one operation's file I/O.
    pub fn io_deadline(&self) -> Deadline {
        Deadline::new(self.io_timeout)
    }

    /// Vault directory for an original file: its absolute path mirrored
    /// under `<root>/files/`, prefix and root components skipped.
    pub fn dir_for(&self, original: &Path) -> PathBuf {
        let mut dir = self.root.join("files");
        for component in original.components() {
            match component {
                Component::Normal(part) => dir.push(part),
                Component::Prefix(_) | Component::RootDir => {}
                Component::CurDir | Component::ParentDir => {}
            }
        }
        dir
    }

    /// Back up one file: write the content copy, then the sidecar.
    pub async fn backup_file(&self, path: &Path, ctx: &BackupContext) -> Result<BackupEntry> {
        let original = path
            .canonicalize()
            .map_err(|_| VaultError::FileNotFound(path.display().to_string()))?;
        if !original.is_file() {
            return Err(VaultError::FileNotFound(format!(
                "{} is not a regular file",
                original.display()
            )));
        }

        let deadline = self.io_deadline();
        let data = fsio::read_file(&original, &deadline).await?;
        let size = data.len() as u64;
        let sha256 = fsio::sha256_hex(&data);

        let dir = self.dir_for(&original);
        tokio::fs::create_dir_all(&dir).await?;

        let timestamp = chrono::Utc::now();
        let stem = self.unique_stem(&dir, &timestamp);

        // Empty copies gain nothing from compression
        let compression = if self.compress && size >= self.compression_min_bytes && size > 0 {
            Compression::Zstd
        } else {
            Compression::None
        };

        let content_file = match compression {
            Compression::None => format!("{}.bak", stem),
            Compression::Zstd => format!("{}.bak.zst", stem),
        };
        let content_path = dir.join(&content_file);

        match compression {
            Compression::None => {
                fsio::write_atomic(&content_path, &data, &deadline).await?;
            }
            Compression::Zstd => {
                let compressed = compress_zstd(&data).await?;
                debug!(
                    "Compressed {}: {} -> {} bytes",
                    original.display(),
                    size,
                    compressed.len()
                );
                fsio::write_atomic(&content_path, &compressed, &deadline).await?;
            }
        }

        let record = BackupRecord {
            version: SIDECAR_VERSION,
            original_path: original.clone(),
            timestamp,
            source: ctx.source,
            auth_id: ctx.auth_id.clone(),
            account: ctx.account.clone(),
            host: self.host.clone(),
            size,
            sha256,
            compression,
            content_file,
        };

        let sidecar_path = dir.join(format!("{}.json", stem));
        let sidecar_json = serde_json::to_vec_pretty(&record)?;
        fsio::write_atomic(&sidecar_path, &sidecar_json, &deadline).await?;

        info!(
            "Backed up {} ({}, {}) as {}",
            original.display(),
            record.source,
            fsio::format_bytes(size),
            stem
        );

        Ok(BackupEntry {
            record,
            sidecar_path,
            content_path,
        })
    }

    /// Stored bytes of a version, decompressed if needed.
    pub async fn read_content(&self, entry: &BackupEntry) -> Result<Vec<u8>> {
        let deadline = self.io_deadline();
        let raw = fsio::read_file(&entry.content_path, &deadline).await?;
        match entry.record.compression {
            Compression::None => Ok(raw),
            Compression::Zstd => decompress_zstd(&raw).await,
        }
    }

    /// Remove one version. Sidecar first, so a half-removed version never
    /// looks like a valid backup to a later scan.
    pub async fn remove_version(&self, entry: &BackupEntry) -> Result<()> {
        tokio::fs::remove_file(&entry.sidecar_path).await?;
        tokio::fs::remove_file(&entry.content_path).await?;
        debug!(
            "Removed version {} of {}",
            timestamp_stem(&entry.record.timestamp),
            entry.record.original_path.display()
        );
        Ok(())
    }

    /// Timestamp stem, disambiguated when a backup of the same file landed
    /// in the same millisecond.
    fn unique_stem(&self, dir: &Path, timestamp: &chrono::DateTime<chrono::Utc>) -> String {
        let base = timestamp_stem(timestamp);
        if !dir.join(format!("{}.json", base)).exists() {
            return base;
        }
        let mut n = 1;
        loop {
            let candidate = format!("{}-{}", base, n);
            if !dir.join(format!("{}.json", candidate)).exists() {
                return candidate;
            }
            n += 1;
        }
    }
}

async fn compress_zstd(data: &[u8]) -> Result<Vec<u8>> {
    use async_compression::tokio::bufread::ZstdEncoder;
    let mut encoder = ZstdEncoder::new(data);
    let mut out = Vec::new();
    encoder.read_to_end(&mut out).await?;
    Ok(out)
}

async fn decompress_zstd(data: &[u8]) -> Result<Vec<u8>> {
    use async_compression::tokio::bufread::ZstdDecoder;
    let mut decoder = ZstdDecoder::new(data);
    let mut out = Vec::new();
    decoder.read_to_end(&mut out).await?;
    Ok(out)
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// Store writing into a temp dir, raw copies only.
    pub fn store_at(root: &Path) -> BackupStore {
        BackupStore {
            root: root.to_path_buf(),
            host: "test-host".to_string(),
            io_timeout: Duration::from_secs(10),
            compress: false,
            compression_min_bytes: 4096,
        }
    }

    /// Store that compresses everything above `min` bytes.
    pub fn compressing_store_at(root: &Path, min: u64) -> BackupStore {
        BackupStore {
            root: root.to_path_buf(),
            host: "test-host".to_string(),
            io_timeout: Duration::from_secs(10),
            compress: true,
            compression_min_bytes: min,
        }
    }
}
