//! Syncvault - Main entry point
//!
//! Versioned file backups around remote platform sync operations.

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use syncvault::config::Config;
use syncvault::diff::{self, FileStatus};
use syncvault::remote::{PlatformCli, SyncEngine};
use syncvault::restore::{self, RestoreOptions};
use syncvault::store::retention::{self, RetentionPolicy};
use syncvault::store::{verify, BackupContext, BackupEntry, BackupStore, VaultIndex};
use syncvault::utils::{self, fsio};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Vault directory (overrides config)
    #[arg(long)]
    vault: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Back up files into the vault
    Backup {
        /// Files to back up
        paths: Vec<PathBuf>,
    },
    /// List files with backups
    List,
    /// Show all versions of one file
    History {
        path: PathBuf,
    },
    /// Diff a version against the current file, or against another version
    Diff {
        path: PathBuf,
        /// Version to diff (timestamp prefix as shown by history; default latest)
        #[arg(short, long)]
        version: Option<String>,
        /// Diff two stored versions instead of version vs current
        #[arg(long)]
        against: Option<String>,
    },
    /// Restore a version to its original path
    Restore {
        path: PathBuf,
        /// Version to restore (timestamp prefix; default latest)
        #[arg(short, long)]
        version: Option<String>,
        /// Skip the stored-content hash check
        #[arg(long)]
        no_verify: bool,
        /// Skip the pre-restore safety backup
        #[arg(long)]
        no_safety_backup: bool,
    },
    /// Pull remote state into files (backing up before and after)
    Pull {
        paths: Vec<PathBuf>,
        /// Account alias or username (default: the CLI's default account)
        #[arg(short, long)]
        account: Option<String>,
    },
    /// Push files to the remote (backing up before and after)
    Push {
        paths: Vec<PathBuf>,
        #[arg(short, long)]
        account: Option<String>,
    },
    /// List remote accounts known to the sync CLI
    Accounts,
    /// Delete old versions per the retention policy
    Prune {
        /// Versions to keep per file (overrides config)
        #[arg(long)]
        keep_last: Option<usize>,
        /// Drop versions older than this many days (overrides config)
        #[arg(long)]
        max_age_days: Option<u32>,
        /// Report what would be removed without deleting
        #[arg(long)]
        dry_run: bool,
    },
    /// Check vault integrity
    Verify,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Load configuration
    let mut config = if let Some(config_path) = &args.config {
        Config::from_file(config_path)?
    } else {
        Config::default()
    };
    if let Some(vault) = args.vault {
        config.vault.root = vault;
    }

    // Initialize logging
    let log_level = args.log_level.as_deref().unwrap_or(&config.log.level);
    utils::logger::init(log_level)?;

    tracing::debug!(
        "syncvault v{} (vault: {})",
        env!("CARGO_PKG_VERSION"),
        config.vault.root.display()
    );

    let store = BackupStore::from_config(&config)?;

    match args.command {
        Command::Backup { paths } => cmd_backup(&store, &paths).await,
        Command::List => cmd_list(&store).await,
        Command::History { path } => cmd_history(&store, &path).await,
        Command::Diff {
            path,
            version,
            against,
        } => cmd_diff(&store, &path, version.as_deref(), against.as_deref()).await,
        Command::Restore {
            path,
            version,
            no_verify,
            no_safety_backup,
        } => {
            let opts = RestoreOptions {
                verify_hash: !no_verify,
                safety_backup: !no_safety_backup,
            };
            cmd_restore(&store, &path, version.as_deref(), &opts).await
        }
        Command::Pull { paths, account } => {
            cmd_sync(&config, store, paths, account.as_deref(), true).await
        }
        Command::Push { paths, account } => {
            cmd_sync(&config, store, paths, account.as_deref(), false).await
        }
        Command::Accounts => cmd_accounts(&config, store).await,
        Command::Prune {
            keep_last,
            max_age_days,
            dry_run,
        } => {
            let mut policy = RetentionPolicy::from_config(&config);
            if keep_last.is_some() {
                policy.keep_last = keep_last;
            }
            if max_age_days.is_some() {
                policy.max_age_days = max_age_days;
            }
            cmd_prune(&store, &policy, dry_run).await
        }
        Command::Verify => cmd_verify(&store).await,
    }
}

async fn load_index(store: &BackupStore) -> Result<VaultIndex> {
    let root = store.root().to_path_buf();
    let index = tokio::task::spawn_blocking(move || VaultIndex::scan(&root)).await??;
    Ok(index)
}

/// Resolve a path and version argument to one indexed entry.
fn pick_version<'a>(
    index: &'a VaultIndex,
    original: &Path,
    version: Option<&str>,
) -> Result<&'a BackupEntry> {
    let entry = match version {
        Some(prefix) => index.find(original, prefix),
        None => index.latest(original),
    };
    entry.ok_or_else(|| {
        anyhow!(
            "no backup version {} for {}",
            version.unwrap_or("(latest)"),
            original.display()
        )
    })
}

async fn cmd_backup(store: &BackupStore, paths: &[PathBuf]) -> Result<()> {
    if paths.is_empty() {
        return Err(anyhow!("no files given"));
    }
    for path in paths {
        let entry = store.backup_file(path, &BackupContext::manual()).await?;
        println!(
            "{}  {}  {}",
            entry.stem(),
            fsio::format_bytes(entry.record.size),
            entry.record.original_path.display()
        );
    }
    Ok(())
}

async fn cmd_list(store: &BackupStore) -> Result<()> {
    let index = load_index(store).await?;
    if index.is_empty() {
        println!("Vault is empty.");
        return Ok(());
    }
    for path in index.files() {
        let versions = index.versions(path).unwrap_or_default();
        let latest = &versions[0];
        println!(
            "{}  ({} versions, latest {} {})",
            path.display(),
            versions.len(),
            latest.stem(),
            latest.record.source
        );
    }
    println!(
        "{} files, {} versions total",
        index.file_count(),
        index.version_count()
    );
    Ok(())
}

async fn cmd_history(store: &BackupStore, path: &Path) -> Result<()> {
    let original = fsio::absolutize(path);
    let index = load_index(store).await?;
    let versions = index
        .versions(&original)
        .ok_or_else(|| anyhow!("no backups for {}", original.display()))?;

    for entry in versions {
        let account = entry
            .record
            .account
            .as_ref()
            .map(|a| format!("  account {}", a.alias))
            .unwrap_or_default();
        println!(
            "{}  {:11}  {}{}",
            entry.stem(),
            entry.record.source.to_string(),
            fsio::format_bytes(entry.record.size),
            account
        );
    }
    Ok(())
}

async fn cmd_diff(
    store: &BackupStore,
    path: &Path,
    version: Option<&str>,
    against: Option<&str>,
) -> Result<()> {
    let original = fsio::absolutize(path);
    let index = load_index(store).await?;

    let report = match against {
        Some(newer) => {
            let old_entry = pick_version(&index, &original, version)?;
            let new_entry = pick_version(&index, &original, Some(newer))?;
            diff::diff_versions(store, old_entry, new_entry).await?
        }
        None => {
            let entry = pick_version(&index, &original, version)?;
            diff::diff_against_current(store, entry).await?
        }
    };

    match report.status {
        FileStatus::Unchanged => println!("unchanged: {}", report.path.display()),
        FileStatus::Missing => println!(
            "missing: {} ({} stored, current file is gone)",
            report.path.display(),
            fsio::format_bytes(report.old_size)
        ),
        FileStatus::Modified => match &report.unified {
            Some(unified) => print!("{}", unified),
            None => println!(
                "binary files differ: {} ({} -> {})",
                report.path.display(),
                fsio::format_bytes(report.old_size),
                fsio::format_bytes(report.new_size.unwrap_or(0))
            ),
        },
    }
    Ok(())
}

async fn cmd_restore(
    store: &BackupStore,
    path: &Path,
    version: Option<&str>,
    opts: &RestoreOptions,
) -> Result<()> {
    let original = fsio::absolutize(path);
    let index = load_index(store).await?;
    let entry = pick_version(&index, &original, version)?;

    let outcome = restore::restore(store, entry, opts).await?;
    println!(
        "Restored {} from {} ({})",
        outcome.path.display(),
        entry.stem(),
        fsio::format_bytes(outcome.bytes_written)
    );
    if let Some(safety) = outcome.safety_backup {
        println!("Previous state kept as {}", safety.stem());
    }
    Ok(())
}

async fn cmd_sync(
    config: &Config,
    store: BackupStore,
    paths: Vec<PathBuf>,
    account: Option<&str>,
    is_pull: bool,
) -> Result<()> {
    if paths.is_empty() {
        return Err(anyhow!("no files given"));
    }

    let cli = PlatformCli::from_config(config);
    let engine = SyncEngine::new(store, cli);

    // Ctrl-c aborts the CLI child and stops between-file work
    let cancel = engine.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, cancelling sync");
            cancel.cancel();
        }
    });

    let report = if is_pull {
        engine.pull(&paths, account).await?
    } else {
        engine.push(&paths, account).await?
    };

    println!(
        "{} complete (job {}): account {}, {} pre-backups, {} post-backups{}, CLI took {:.1}s",
        report.direction,
        report.job_id,
        report.account.alias,
        report.pre_backups,
        report.post_backups,
        if report.skipped_missing > 0 {
            format!(", {} missing skipped", report.skipped_missing)
        } else {
            String::new()
        },
        report.cli_duration.as_secs_f64()
    );
    Ok(())
}

async fn cmd_accounts(config: &Config, store: BackupStore) -> Result<()> {
    let cli = PlatformCli::from_config(config);
    let cancel = tokio_util::sync::CancellationToken::new();
    match cli.version(&cancel).await {
        Ok(version) => println!("sync CLI: {}", version),
        Err(e) => tracing::warn!("Could not read sync CLI version: {}", e),
    }

    let engine = SyncEngine::new(store, cli);
    let accounts = engine.accounts().await?;

    if accounts.is_empty() {
        println!("No authenticated accounts.");
        return Ok(());
    }
    for account in accounts {
        println!(
            "{}{}  {}  {}  {}",
            if account.is_default { "* " } else { "  " },
            account.alias,
            account.username,
            account.account_id,
            account.status.as_str()
        );
    }
    Ok(())
}

async fn cmd_prune(store: &BackupStore, policy: &RetentionPolicy, dry_run: bool) -> Result<()> {
    if policy.is_noop() {
        return Err(anyhow!(
            "no retention policy: set keep_last or max_age_days in config or flags"
        ));
    }
    let index = load_index(store).await?;
    let report = retention::prune(store, &index, policy, dry_run).await?;
    println!(
        "{}: {} of {} versions removed, {} freed",
        if dry_run { "Would prune" } else { "Pruned" },
        report.removed,
        report.examined,
        fsio::format_bytes(report.bytes_freed)
    );
    Ok(())
}

async fn cmd_verify(store: &BackupStore) -> Result<()> {
    let report = verify::verify(store).await?;
    println!("{}/{} versions ok", report.ok, report.checked);

    for path in &report.mismatched {
        println!("mismatched: {}", path.display());
    }
    for path in &report.missing_content {
        println!("missing copy for: {}", path.display());
    }
    for path in &report.orphaned_content {
        println!("orphaned copy: {}", path.display());
    }
    for path in &report.unreadable {
        println!("unreadable: {}", path.display());
    }

    if report.is_clean() {
        println!("Vault is clean.");
        Ok(())
    } else {
        Err(anyhow!("vault integrity check failed"))
    }
}
