//! Deadline-bounded file I/O.
//!
//! Every backup, restore, and vault maintenance operation gets a fixed
//! wall-clock budget; individual reads, writes, and copies race against the
//! remaining budget and fail with [`VaultError::Timeout`] when it runs out.

use crate::utils::errors::{Result, VaultError};
use sha2::{Digest, Sha256};
use std::future::Future;
use std::path::Path;
use std::time::{Duration, Instant};

/// A fixed wall-clock deadline shared by all file operations of one
/// logical operation.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    expires: Instant,
}

impl Deadline {
    /// Create a deadline `budget` from now.
    pub fn new(budget: Duration) -> Self {
        Self {
            expires: Instant::now() + budget,
        }
    }

    /// Time left before expiry (zero once expired).
    pub fn remaining(&self) -> Duration {
        self.expires.saturating_duration_since(Instant::now())
    }

    /// Run a fallible I/O future against the remaining budget.
    ///
    /// `what` names the operation for the timeout error, e.g.
    /// `"reading /etc/hosts"`.
    pub async fn bound<F, T>(&self, what: &str, fut: F) -> Result<T>
    where
        F: Future<Output = std::io::Result<T>>,
    {
        match tokio::time::timeout(self.remaining(), fut).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(VaultError::Timeout(what.to_string())),
        }
    }
}

/// Read an entire file within the deadline.
pub async fn read_file(path: &Path, deadline: &Deadline) -> Result<Vec<u8>> {
    deadline
        .bound(&format!("reading {}", path.display()), tokio::fs::read(path))
        .await
}

/// Write a file atomically: write to a sibling temp file, then rename it
/// into place. Falls back to copy+remove when rename fails across
/// filesystems.
pub async fn write_atomic(path: &Path, data: &[u8], deadline: &Deadline) -> Result<()> {
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| VaultError::Io(std::io::Error::other("path has no file name")))?;
    let tmp = path.with_file_name(format!(".{}.tmp", file_name));

    deadline
        .bound(
            &format!("writing {}", tmp.display()),
            tokio::fs::write(&tmp, data),
        )
        .await?;

    if let Err(e) = tokio::fs::rename(&tmp, path).await {
        // rename may fail across filesystems, try copy+remove
        if let Err(e2) = tokio::fs::copy(&tmp, path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(VaultError::Io(std::io::Error::other(format!(
                "failed to install {}: {} (rename: {})",
                path.display(),
                e2,
                e
            ))));
        }
        let _ = tokio::fs::remove_file(&tmp).await;
    }

    Ok(())
}

/// Hex-encoded SHA-256 of a byte slice.
pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    let digest = hasher.finalize();
    let mut out = String::with_capacity(64);
    for byte in digest {
        out.push_str(&format!("{:02x}", byte));
    }
    out
}

/// Resolve a user-supplied path to the absolute form used as an index key.
///
/// Canonicalizes when the file exists; otherwise joins onto the current
/// directory so lookups for already-deleted files still work.
pub fn absolutize(path: &Path) -> std::path::PathBuf {
    match path.canonicalize() {
        Ok(p) => p,
        Err(_) => {
            if path.is_absolute() {
                path.to_path_buf()
            } else {
                std::env::current_dir()
                    .map(|cwd| cwd.join(path))
                    .unwrap_or_else(|_| path.to_path_buf())
            }
        }
    }
}

/// Format bytes as human-readable string
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    format!("{:.2} {}", size, UNITS[unit_index])
}
