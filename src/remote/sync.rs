//! Backup-around-sync orchestration.
//!
//! Every sync runs the same frame: back up the targets, hand off to the
//! external CLI, back up the results. A failed pull additionally restores
//! the pre-operation backups, so the working tree never keeps whatever a
//! half-finished CLI run left behind.

use crate::remote::account::{self, Account};
use crate::remote::cli::PlatformCli;
use crate::restore::{self, RestoreOptions};
use crate::store::{BackupContext, BackupEntry, BackupSource, BackupStore, RemoteAccount};
use crate::utils::errors::{Result, VaultError};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncDirection {
    Pull,
    Push,
}

impl fmt::Display for SyncDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncDirection::Pull => f.write_str("pull"),
            SyncDirection::Push => f.write_str("push"),
        }
    }
}

/// What one sync did.
#[derive(Debug)]
pub struct SyncReport {
    pub job_id: Uuid,
    pub direction: SyncDirection,
    pub account: Account,
    pub pre_backups: usize,
    pub post_backups: usize,
    pub skipped_missing: usize,
    pub cli_duration: Duration,
}

/// Ties the vault and the external CLI together.
pub struct SyncEngine {
    store: BackupStore,
    cli: PlatformCli,
    cancel: CancellationToken,
}

impl SyncEngine {
    pub fn new(store: BackupStore, cli: PlatformCli) -> Self {
        Self {
            store,
            cli,
            cancel: CancellationToken::new(),
        }
    }

    /// Token to wire into ctrl-c handling; cancelling it aborts the CLI
    /// child and stops between-file work.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn store(&self) -> &BackupStore {
        &self.store
    }

    /// Pull remote state into the given files.
    ///
    /// On CLI failure every pre-pull backup is restored before the error
    /// is returned.
    pub async fn pull(&self, paths: &[PathBuf], account_name: Option<&str>) -> Result<SyncReport> {
        let job_id = Uuid::new_v4();
        let (account, auth_id) = self.resolve_account(account_name).await?;
        info!(
            "Sync pull {} starting: {} files, account {}",
            job_id,
            paths.len(),
            account.alias
        );

        let ctx = self.context(BackupSource::PrePull, &account, &auth_id);
        let (pre, skipped) = self.backup_all(paths, &ctx).await?;

        let cli_result = self
            .cli
            .pull(paths, Some(account.alias.as_str()), &self.cancel)
            .await;

        let output = match cli_result {
            Ok(output) => output,
            Err(e) => {
                warn!("Pull failed ({}), rolling back {} pre-pull backups", e, pre.len());
                let restored = self.rollback(&pre).await;
                info!("Rolled back {}/{} files", restored, pre.len());
                return Err(e);
            }
        };

        let ctx = self.context(BackupSource::PostPull, &account, &auth_id);
        let (post, _) = self.backup_all(paths, &ctx).await?;

        let report = SyncReport {
            job_id,
            direction: SyncDirection::Pull,
            account,
            pre_backups: pre.len(),
            post_backups: post.len(),
            skipped_missing: skipped,
            cli_duration: output.duration,
        };
        info!(
            "Sync pull {} done: {} pre, {} post, CLI took {:.1}s",
            job_id,
            report.pre_backups,
            report.post_backups,
            report.cli_duration.as_secs_f64()
        );
        Ok(report)
    }

    /// Push the given files to the remote.
    ///
    /// A failed push leaves local files untouched, so nothing is rolled
    /// back; the pre-push backups stay in the vault.
    pub async fn push(&self, paths: &[PathBuf], account_name: Option<&str>) -> Result<SyncReport> {
        let job_id = Uuid::new_v4();
        let (account, auth_id) = self.resolve_account(account_name).await?;
        info!(
            "Sync push {} starting: {} files, account {}",
            job_id,
            paths.len(),
            account.alias
        );

        let ctx = self.context(BackupSource::PrePush, &account, &auth_id);
        let (pre, skipped) = self.backup_all(paths, &ctx).await?;

        let output = self
            .cli
            .push(paths, Some(account.alias.as_str()), &self.cancel)
            .await?;

        let ctx = self.context(BackupSource::PostPush, &account, &auth_id);
        let (post, _) = self.backup_all(paths, &ctx).await?;

        let report = SyncReport {
            job_id,
            direction: SyncDirection::Push,
            account,
            pre_backups: pre.len(),
            post_backups: post.len(),
            skipped_missing: skipped,
            cli_duration: output.duration,
        };
        info!(
            "Sync push {} done: {} pre, {} post, CLI took {:.1}s",
            job_id,
            report.pre_backups,
            report.post_backups,
            report.cli_duration.as_secs_f64()
        );
        Ok(report)
    }

    /// List accounts the CLI knows about.
    pub async fn accounts(&self) -> Result<Vec<Account>> {
        let stdout = self.cli.account_list(&self.cancel).await?;
        Ok(account::parse_account_list(&stdout))
    }

    /// Resolve the account for a sync and scrape its authentication id.
    async fn resolve_account(&self, name: Option<&str>) -> Result<(Account, Option<String>)> {
        let accounts = self.accounts().await?;
        let account = account::resolve(&accounts, name)?.clone();

        let auth_id = match self.cli.account_display(&account.alias, &self.cancel).await {
            Ok(stdout) => {
                let id = account::parse_auth_id(&stdout);
                if id.is_none() {
                    warn!("No auth id in account display output for {}", account.alias);
                }
                id
            }
            Err(e) => {
                warn!("account display failed for {}: {}", account.alias, e);
                None
            }
        };

        Ok((account, auth_id))
    }

    fn context(
        &self,
        source: BackupSource,
        account: &Account,
        auth_id: &Option<String>,
    ) -> BackupContext {
        BackupContext {
            source,
            auth_id: auth_id.clone(),
            account: Some(RemoteAccount::from(account)),
        }
    }

    /// Back up every existing target; missing files are counted, not
    /// errors (a first pull legitimately targets files not yet local).
    async fn backup_all(
        &self,
        paths: &[PathBuf],
        ctx: &BackupContext,
    ) -> Result<(Vec<BackupEntry>, usize)> {
        let mut entries = Vec::with_capacity(paths.len());
        let mut skipped = 0usize;

        for path in paths {
            if self.cancel.is_cancelled() {
                return Err(VaultError::Cancelled);
            }
            if !path.exists() {
                debug!("Skipping missing file {}", path.display());
                skipped += 1;
                continue;
            }
            entries.push(self.store.backup_file(path, ctx).await?);
        }

        Ok((entries, skipped))
    }

    /// Restore pre-operation backups after a failed pull. Best effort:
    /// one unrestorable file must not stop the others.
    async fn rollback(&self, entries: &[BackupEntry]) -> usize {
        let opts = RestoreOptions {
            verify_hash: true,
            safety_backup: false,
        };
        let mut restored = 0usize;
        for entry in entries {
            match restore::restore(&self.store, entry, &opts).await {
                Ok(_) => restored += 1,
                Err(e) => warn!(
                    "Failed to roll back {}: {}",
                    entry.record.original_path.display(),
                    e
                ),
            }
        }
        restored
    }
}

#[cfg(test)]
#[cfg(unix)]
mod tests {
    use super::*;
    use crate::store::test_support::store_at;
    use crate::store::VaultIndex;
    use std::os::unix::fs::PermissionsExt;
    use std::path::Path;
    use tempfile::TempDir;

    const FAKE_ACCOUNTS: &str = "account)\n\
        case \"$2\" in\n\
        list) printf 'ALIAS  USERNAME  ACCOUNT-ID  STATUS\\n* dev dev@example.com 0123456789ABCDEF Connected\\n' ;;\n\
        display) printf 'Auth Id: AUTH-42\\n' ;;\n\
        esac ;;\n";

    /// Write a fake sync CLI script handling `account` plus the given
    /// handler for the sync verbs.
    fn fake_cli(dir: &Path, sync_handler: &str) -> PathBuf {
        let script = format!(
            "#!/bin/sh\ncase \"$1\" in\n{}pull|push)\n{}\n;;\nesac\n",
            FAKE_ACCOUNTS, sync_handler
        );
        let path = dir.join("fake-cli");
        std::fs::write(&path, script).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn engine(vault: &TempDir, bin: PathBuf) -> SyncEngine {
        SyncEngine::new(
            store_at(vault.path()),
            PlatformCli::new(bin, Duration::from_secs(10)),
        )
    }

    #[tokio::test]
    async fn test_pull_backs_up_before_and_after() {
        let vault = TempDir::new().unwrap();
        let work = TempDir::new().unwrap();

        // CLI rewrites the synced file, like a real pull would
        let bin = fake_cli(work.path(), "shift 3\nfor f in \"$@\"; do echo 'from remote' > \"$f\"; done\nexit 0");

        let file = work.path().join("a.txt");
        tokio::fs::write(&file, b"local edits").await.unwrap();

        let engine = engine(&vault, bin);
        let report = engine.pull(&[file.clone()], None).await.unwrap();

        assert_eq!(report.direction, SyncDirection::Pull);
        assert_eq!(report.account.alias, "dev");
        assert_eq!(report.pre_backups, 1);
        assert_eq!(report.post_backups, 1);
        assert_eq!(report.skipped_missing, 0);

        // Working file now holds remote content
        let content = tokio::fs::read_to_string(&file).await.unwrap();
        assert_eq!(content.trim(), "from remote");

        // Vault holds the pre state and the post state, with account data
        let index = VaultIndex::scan(vault.path()).unwrap();
        let original = file.canonicalize().unwrap();
        let versions = index.versions(&original).unwrap();
        assert_eq!(versions.len(), 2);
        assert_eq!(versions[0].record.source, BackupSource::PostPull);
        assert_eq!(versions[1].record.source, BackupSource::PrePull);
        assert_eq!(versions[0].record.auth_id.as_deref(), Some("AUTH-42"));
        assert_eq!(
            versions[0].record.account.as_ref().unwrap().username,
            "dev@example.com"
        );
    }

    #[tokio::test]
    async fn test_failed_pull_rolls_back() {
        let vault = TempDir::new().unwrap();
        let work = TempDir::new().unwrap();

        // CLI corrupts the file, then fails
        let bin = fake_cli(
            work.path(),
            "shift 3\nfor f in \"$@\"; do echo 'half-written garbage' > \"$f\"; done\necho 'remote unreachable' >&2\nexit 1",
        );

        let file = work.path().join("a.txt");
        tokio::fs::write(&file, b"precious local state").await.unwrap();

        let engine = engine(&vault, bin);
        let result = engine.pull(&[file.clone()], None).await;
        assert!(matches!(result, Err(VaultError::CliFailed { .. })));

        // The pre-pull backup was restored over the garbage
        let content = tokio::fs::read(&file).await.unwrap();
        assert_eq!(content, b"precious local state");
    }

    #[tokio::test]
    async fn test_push_failure_keeps_local_files() {
        let vault = TempDir::new().unwrap();
        let work = TempDir::new().unwrap();

        let bin = fake_cli(work.path(), "echo 'rejected' >&2\nexit 1");

        let file = work.path().join("a.txt");
        tokio::fs::write(&file, b"to deploy").await.unwrap();

        let engine = engine(&vault, bin);
        let result = engine.push(&[file.clone()], None).await;
        assert!(matches!(result, Err(VaultError::CliFailed { .. })));

        // Local file untouched, pre-push backup kept
        assert_eq!(tokio::fs::read(&file).await.unwrap(), b"to deploy");
        let index = VaultIndex::scan(vault.path()).unwrap();
        assert_eq!(index.version_count(), 1);
        assert_eq!(
            index.entries().next().unwrap().record.source,
            BackupSource::PrePush
        );
    }

    #[tokio::test]
    async fn test_pull_skips_missing_targets() {
        let vault = TempDir::new().unwrap();
        let work = TempDir::new().unwrap();

        let bin = fake_cli(work.path(), "exit 0");

        let missing = work.path().join("not-yet-local.txt");
        let engine = engine(&vault, bin);
        let report = engine.pull(&[missing], None).await.unwrap();
        assert_eq!(report.pre_backups, 0);
        assert_eq!(report.skipped_missing, 1);
    }

    #[tokio::test]
    async fn test_unknown_account_fails() {
        let vault = TempDir::new().unwrap();
        let work = TempDir::new().unwrap();

        let bin = fake_cli(work.path(), "exit 0");
        let engine = engine(&vault, bin);
        let result = engine.pull(&[], Some("nonexistent")).await;
        assert!(matches!(result, Err(VaultError::AccountNotFound(_))));
    }
}
