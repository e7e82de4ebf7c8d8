//! Version pruning.

use crate::config::Config;
use crate::store::{BackupStore, VaultIndex};
use crate::utils::errors::Result;
use chrono::{Duration, Utc};
use tracing::{info, warn};

/// Which versions to drop. Both rules may apply at once; a file's newest
/// version is never removed by the age rule alone.
#[derive(Debug, Clone, Copy, Default)]
pub struct RetentionPolicy {
    pub keep_last: Option<usize>,
    pub max_age_days: Option<u32>,
}

impl RetentionPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            keep_last: config.retention.keep_last,
            max_age_days: config.retention.max_age_days,
        }
    }

    pub fn is_noop(&self) -> bool {
        self.keep_last.is_none() && self.max_age_days.is_none()
    }
}

/// Outcome of a prune pass.
#[derive(Debug, Default)]
pub struct PruneReport {
    pub examined: usize,
    pub removed: usize,
    pub kept: usize,
    pub bytes_freed: u64,
}

/// Apply `policy` to every file in the index. With `dry_run` nothing is
/// deleted; the report shows what would go.
pub async fn prune(
    store: &BackupStore,
    index: &VaultIndex,
    policy: &RetentionPolicy,
    dry_run: bool,
) -> Result<PruneReport> {
    let mut report = PruneReport::default();
    let cutoff = policy
        .max_age_days
        .map(|days| Utc::now() - Duration::days(i64::from(days)));

    for original in index.files().map(|p| p.to_path_buf()).collect::<Vec<_>>() {
        let versions = match index.versions(&original) {
            Some(v) => v,
            None => continue,
        };

        for (position, entry) in versions.iter().enumerate() {
            report.examined += 1;

            let over_count = policy
                .keep_last
                .map(|keep| position >= keep)
                .unwrap_or(false);
            let over_age = cutoff
                .map(|cut| position > 0 && entry.record.timestamp < cut)
                .unwrap_or(false);

            if !(over_count || over_age) {
                report.kept += 1;
                continue;
            }

            if dry_run {
                report.removed += 1;
                report.bytes_freed += entry.record.size;
                continue;
            }

            match store.remove_version(entry).await {
                Ok(()) => {
                    report.removed += 1;
                    report.bytes_freed += entry.record.size;
                }
                Err(e) => {
                    warn!(
                        "Failed to prune {} of {}: {}",
                        entry.stem(),
                        original.display(),
                        e
                    );
                    report.kept += 1;
                }
            }
        }
    }

    info!(
        "Prune{}: {} removed, {} kept, {} freed",
        if dry_run { " (dry run)" } else { "" },
        report.removed,
        report.kept,
        crate::utils::fsio::format_bytes(report.bytes_freed)
    );
    Ok(report)
}
