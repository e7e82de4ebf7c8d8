//! Vault index, rebuilt by directory scan.
//!
//! There is no persistent index: every query walks the vault, parses each
//! JSON sidecar, and groups versions by original path. O(total backup
//! files) per scan; callers on hot paths wrap [`VaultIndex::scan`] in
//! `spawn_blocking`.

use crate::store::record::{timestamp_stem, BackupRecord};
use crate::utils::errors::Result;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::warn;
use walkdir::WalkDir;

/// One indexed backup version.
#[derive(Debug, Clone)]
pub struct BackupEntry {
    pub record: BackupRecord,
    pub sidecar_path: PathBuf,
    pub content_path: PathBuf,
}

impl BackupEntry {
    /// Timestamp stem identifying this version in CLI output.
    pub fn stem(&self) -> String {
        self.sidecar_path
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(|n| n.strip_suffix(".json"))
            .map(str::to_string)
            .unwrap_or_else(|| timestamp_stem(&self.record.timestamp))
    }
}

/// All versions in the vault, keyed by original path, newest first.
#[derive(Debug, Default)]
pub struct VaultIndex {
    files: BTreeMap<PathBuf, Vec<BackupEntry>>,
}

impl VaultIndex {
    /// Walk the vault and rebuild the index from sidecars.
    ///
    /// Malformed sidecars and sidecars whose content copy is missing are
    /// logged and skipped; `verify` reports them properly.
    pub fn scan(root: &Path) -> Result<Self> {
        let mut files: BTreeMap<PathBuf, Vec<BackupEntry>> = BTreeMap::new();

        if !root.exists() {
            return Ok(Self { files });
        }

        for entry in WalkDir::new(root) {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    warn!("Skipping unreadable vault entry: {}", e);
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }

            let text = match std::fs::read_to_string(path) {
                Ok(t) => t,
                Err(e) => {
                    warn!("Skipping unreadable sidecar {}: {}", path.display(), e);
                    continue;
                }
            };
            let record: BackupRecord = match serde_json::from_str(&text) {
                Ok(r) => r,
                Err(e) => {
                    warn!("Skipping malformed sidecar {}: {}", path.display(), e);
                    continue;
                }
            };

            let content_path = path
                .parent()
                .unwrap_or_else(|| Path::new(""))
                .join(&record.content_file);
            if !content_path.exists() {
                warn!(
                    "Sidecar {} references missing copy {}",
                    path.display(),
                    record.content_file
                );
                continue;
            }

            files
                .entry(record.original_path.clone())
                .or_default()
                .push(BackupEntry {
                    record,
                    sidecar_path: path.to_path_buf(),
                    content_path,
                });
        }

        for versions in files.values_mut() {
            // Stem breaks ties between backups landing in the same millisecond
            versions.sort_by(|a, b| {
                b.record
                    .timestamp
                    .cmp(&a.record.timestamp)
                    .then_with(|| b.stem().cmp(&a.stem()))
            });
        }

        Ok(Self { files })
    }

    /// Original paths with at least one version, in path order.
    pub fn files(&self) -> impl Iterator<Item = &Path> {
        self.files.keys().map(PathBuf::as_path)
    }

    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    pub fn version_count(&self) -> usize {
        self.files.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Versions of one file, newest first.
    pub fn versions(&self, original: &Path) -> Option<&[BackupEntry]> {
        self.files.get(original).map(Vec::as_slice)
    }

    pub fn latest(&self, original: &Path) -> Option<&BackupEntry> {
        self.versions(original).and_then(|v| v.first())
    }

    /// Find a version by timestamp-stem prefix (as printed by `history`).
    pub fn find(&self, original: &Path, stem_prefix: &str) -> Option<&BackupEntry> {
        self.versions(original)?
            .iter()
            .find(|e| e.stem().starts_with(stem_prefix))
    }

    /// All entries across all files (scan order).
    pub fn entries(&self) -> impl Iterator<Item = &BackupEntry> {
        self.files.values().flatten()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::test_support::store_at;
    use crate::store::BackupContext;
    use tempfile::TempDir;

    #[test]
    fn test_scan_missing_root() {
        let index = VaultIndex::scan(Path::new("/nonexistent/vault")).unwrap();
        assert!(index.is_empty());
    }

    #[tokio::test]
    async fn test_scan_groups_and_sorts() {
        let vault = TempDir::new().unwrap();
        let work = TempDir::new().unwrap();
        let store = store_at(vault.path());

        let file = work.path().join("a.txt");
        tokio::fs::write(&file, b"v1").await.unwrap();
        let first = store.backup_file(&file, &BackupContext::manual()).await.unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        tokio::fs::write(&file, b"v2").await.unwrap();
        let second = store.backup_file(&file, &BackupContext::manual()).await.unwrap();

        let other = work.path().join("b.txt");
        tokio::fs::write(&other, b"other").await.unwrap();
        store.backup_file(&other, &BackupContext::manual()).await.unwrap();

        let index = VaultIndex::scan(vault.path()).unwrap();
        assert_eq!(index.file_count(), 2);
        assert_eq!(index.version_count(), 3);

        let original = first.record.original_path.clone();
        let versions = index.versions(&original).unwrap();
        assert_eq!(versions.len(), 2);
        // Newest first
        assert_eq!(versions[0].record.sha256, second.record.sha256);
        assert_eq!(versions[1].record.sha256, first.record.sha256);
        assert_eq!(
            index.latest(&original).unwrap().record.sha256,
            second.record.sha256
        );
    }

    #[tokio::test]
    async fn test_scan_skips_malformed_sidecar() {
        let vault = TempDir::new().unwrap();
        let work = TempDir::new().unwrap();
        let store = store_at(vault.path());

        let file = work.path().join("a.txt");
        tokio::fs::write(&file, b"data").await.unwrap();
        store.backup_file(&file, &BackupContext::manual()).await.unwrap();

        std::fs::write(
            vault.path().join("files").join("broken.json"),
            b"not valid json",
        )
        .unwrap();

        let index = VaultIndex::scan(vault.path()).unwrap();
        assert_eq!(index.version_count(), 1);
    }

    #[tokio::test]
    async fn test_scan_skips_sidecar_without_copy() {
        let vault = TempDir::new().unwrap();
        let work = TempDir::new().unwrap();
        let store = store_at(vault.path());

        let file = work.path().join("a.txt");
        tokio::fs::write(&file, b"data").await.unwrap();
        let entry = store.backup_file(&file, &BackupContext::manual()).await.unwrap();

        std::fs::remove_file(&entry.content_path).unwrap();

        let index = VaultIndex::scan(vault.path()).unwrap();
        assert!(index.is_empty());
    }

    #[tokio::test]
    async fn test_find_by_stem_prefix() {
        let vault = TempDir::new().unwrap();
        let work = TempDir::new().unwrap();
        let store = store_at(vault.path());

        let file = work.path().join("a.txt");
        tokio::fs::write(&file, b"data").await.unwrap();
        let entry = store.backup_file(&file, &BackupContext::manual()).await.unwrap();

        let index = VaultIndex::scan(vault.path()).unwrap();
        let original = entry.record.original_path.clone();

        let stem = entry.stem();
        assert!(index.find(&original, &stem).is_some());
        // Date prefix alone is enough when unambiguous
        assert!(index.find(&original, &stem[..8]).is_some());
        assert!(index.find(&original, "19990101").is_none());
    }
}
