//! Vault integrity checking.
//!
//! Re-hashes every stored copy against its sidecar and flags the three ways
//! a vault decays: copies whose bytes no longer match, sidecars whose copy
//! vanished, and copies no sidecar references.

use crate::store::record::BackupRecord;
use crate::store::BackupStore;
use crate::utils::errors::Result;
use crate::utils::fsio;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::info;
use walkdir::WalkDir;

#[derive(Debug, Default)]
pub struct VerifyReport {
    pub checked: usize,
    pub ok: usize,
    /// Stored bytes do not hash to the sidecar's sha256
    pub mismatched: Vec<PathBuf>,
    /// Sidecars whose content copy is missing
    pub missing_content: Vec<PathBuf>,
    /// Content copies no sidecar references
    pub orphaned_content: Vec<PathBuf>,
    /// Sidecars that could not be read or parsed
    pub unreadable: Vec<PathBuf>,
}

impl VerifyReport {
    pub fn is_clean(&self) -> bool {
        self.mismatched.is_empty()
            && self.missing_content.is_empty()
            && self.orphaned_content.is_empty()
            && self.unreadable.is_empty()
    }
}

/// Walk the whole vault and check every version.
pub async fn verify(store: &BackupStore) -> Result<VerifyReport> {
    let mut report = VerifyReport::default();
    let mut referenced: HashSet<PathBuf> = HashSet::new();
    let mut copies: Vec<PathBuf> = Vec::new();

    for entry in WalkDir::new(store.root()) {
        let entry = match entry {
            Ok(e) => e,
            Err(_) => continue,
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path().to_path_buf();

        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => {
                let record: BackupRecord = match std::fs::read_to_string(&path)
                    .ok()
                    .and_then(|s| serde_json::from_str(&s).ok())
                {
                    Some(r) => r,
                    None => {
                        report.unreadable.push(path);
                        continue;
                    }
                };

                let content_path = path
                    .parent()
                    .unwrap_or_else(|| Path::new(""))
                    .join(&record.content_file);
                referenced.insert(content_path.clone());

                if !content_path.exists() {
                    report.missing_content.push(path);
                    continue;
                }

                report.checked += 1;
                match check_copy(store, &record, &path, &content_path).await {
                    Ok(true) => report.ok += 1,
                    Ok(false) => report.mismatched.push(content_path),
                    Err(_) => report.unreadable.push(content_path),
                }
            }
            Some("bak") | Some("zst") => copies.push(path),
            _ => {}
        }
    }

    for copy in copies {
        if !referenced.contains(&copy) {
            report.orphaned_content.push(copy);
        }
    }

    info!(
        "Verify: {}/{} ok, {} mismatched, {} missing, {} orphaned, {} unreadable",
        report.ok,
        report.checked,
        report.mismatched.len(),
        report.missing_content.len(),
        report.orphaned_content.len(),
        report.unreadable.len()
    );
    Ok(report)
}

async fn check_copy(
    store: &BackupStore,
    record: &BackupRecord,
    sidecar_path: &Path,
    content_path: &Path,
) -> Result<bool> {
    let entry = crate::store::BackupEntry {
        record: record.clone(),
        sidecar_path: sidecar_path.to_path_buf(),
        content_path: content_path.to_path_buf(),
    };
    let data = store.read_content(&entry).await?;
    Ok(data.len() as u64 == record.size && fsio::sha256_hex(&data) == record.sha256)
}
