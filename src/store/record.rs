//! Sidecar record types.
//!
//! Every content copy in the vault is described by a JSON sidecar sharing
//! its timestamp stem. The sidecar duplicates everything needed to list,
//! diff, and restore the version without touching the copy itself.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Current sidecar schema version.
pub const SIDECAR_VERSION: u32 = 1;

/// Why a backup was taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackupSource {
    PrePull,
    PostPull,
    PrePush,
    PostPush,
    PreRestore,
    Manual,
}

impl fmt::Display for BackupSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BackupSource::PrePull => "pre-pull",
            BackupSource::PostPull => "post-pull",
            BackupSource::PrePush => "pre-push",
            BackupSource::PostPush => "post-push",
            BackupSource::PreRestore => "pre-restore",
            BackupSource::Manual => "manual",
        };
        f.write_str(s)
    }
}

/// How the content copy is stored on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Compression {
    None,
    Zstd,
}

/// Remote account descriptor scraped from the sync CLI, as recorded in
/// sidecars.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteAccount {
    pub alias: String,
    pub username: String,
    pub account_id: String,
    pub status: String,
}

/// Backup sidecar, serialized as `<timestamp>.json` next to the copy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupRecord {
    pub version: u32,
    pub original_path: PathBuf,
    pub timestamp: DateTime<Utc>,
    pub source: BackupSource,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account: Option<RemoteAccount>,
    pub host: String,
    pub size: u64,
    pub sha256: String,
    pub compression: Compression,
    /// File name of the content copy, relative to the sidecar's directory
    pub content_file: String,
}

/// File-name stem for a backup taken at `ts`, e.g. `20250806T142301.512Z`.
pub fn timestamp_stem(ts: &DateTime<Utc>) -> String {
    ts.format("%Y%m%dT%H%M%S%.3fZ").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_timestamp_stem_format() {
        let ts = Utc
            .with_ymd_and_hms(2025, 8, 6, 14, 23, 1)
            .unwrap()
            .checked_add_signed(chrono::Duration::milliseconds(512))
            .unwrap();
        assert_eq!(timestamp_stem(&ts), "20250806T142301.512Z");
    }

    #[test]
    fn test_source_display_matches_serde() {
        for source in [
            BackupSource::PrePull,
            BackupSource::PostPush,
            BackupSource::PreRestore,
            BackupSource::Manual,
        ] {
            let json = serde_json::to_string(&source).unwrap();
            assert_eq!(json, format!("\"{}\"", source));
        }
    }
}
