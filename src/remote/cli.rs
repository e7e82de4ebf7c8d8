//! External sync CLI invocation.
//!
//! The CLI is a black box: spawn it, capture stdout/stderr, race completion
//! against a wall-clock timeout and the caller's cancellation token. The
//! child is killed on drop, so neither timeout nor cancellation leaks a
//! process.

use crate::config::Config;
use crate::utils::errors::{Result, VaultError};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Captured result of one CLI invocation.
#[derive(Debug)]
pub struct CliOutput {
    pub status: i32,
    pub stdout: String,
    pub stderr: String,
    pub duration: Duration,
}

impl CliOutput {
    pub fn success(&self) -> bool {
        self.status == 0
    }
}

/// Handle on the external sync CLI executable.
pub struct PlatformCli {
    bin: PathBuf,
    timeout: Duration,
}

impl PlatformCli {
    pub fn new(bin: PathBuf, timeout: Duration) -> Self {
        Self { bin, timeout }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.cli.bin.clone(),
            Duration::from_secs(config.cli.timeout_secs),
        )
    }

    /// Run the CLI with `args`, capturing output.
    pub async fn run(&self, args: &[&str], cancel: &CancellationToken) -> Result<CliOutput> {
        debug!("Running {} {}", self.bin.display(), args.join(" "));
        let started = Instant::now();

        let child = Command::new(&self.bin)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| VaultError::CliLaunch(format!("{}: {}", self.bin.display(), e)))?;

        let output = tokio::select! {
            result = tokio::time::timeout(self.timeout, child.wait_with_output()) => {
                match result {
                    Ok(Ok(output)) => output,
                    Ok(Err(e)) => {
                        return Err(VaultError::CliLaunch(format!(
                            "{}: {}",
                            self.bin.display(),
                            e
                        )))
                    }
                    Err(_) => {
                        return Err(VaultError::Timeout(format!(
                            "waiting for {} (budget {}s)",
                            self.bin.display(),
                            self.timeout.as_secs()
                        )))
                    }
                }
            }
            _ = cancel.cancelled() => return Err(VaultError::Cancelled),
        };

        Ok(CliOutput {
            status: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            duration: started.elapsed(),
        })
    }

    /// Like [`run`](Self::run), but a non-zero exit becomes an error
    /// carrying the captured stderr.
    pub async fn run_checked(&self, args: &[&str], cancel: &CancellationToken) -> Result<CliOutput> {
        let output = self.run(args, cancel).await?;
        if output.success() {
            Ok(output)
        } else {
            Err(VaultError::CliFailed {
                status: output.status,
                stderr: output.stderr.trim().to_string(),
            })
        }
    }

    pub async fn pull(
        &self,
        paths: &[PathBuf],
        account: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<CliOutput> {
        self.sync_verb("pull", paths, account, cancel).await
    }

    pub async fn push(
        &self,
        paths: &[PathBuf],
        account: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<CliOutput> {
        self.sync_verb("push", paths, account, cancel).await
    }

    async fn sync_verb(
        &self,
        verb: &str,
        paths: &[PathBuf],
        account: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<CliOutput> {
        let mut args: Vec<&str> = vec![verb];
        if let Some(alias) = account {
            args.push("--account");
            args.push(alias);
        }
        let rendered: Vec<String> = paths.iter().map(|p| p.display().to_string()).collect();
        args.extend(rendered.iter().map(String::as_str));
        self.run_checked(&args, cancel).await
    }

    /// Raw stdout of `account list`.
    pub async fn account_list(&self, cancel: &CancellationToken) -> Result<String> {
        let output = self.run_checked(&["account", "list"], cancel).await?;
        Ok(output.stdout)
    }

    /// Raw stdout of `account display` for one account.
    pub async fn account_display(
        &self,
        alias: &str,
        cancel: &CancellationToken,
    ) -> Result<String> {
        let output = self
            .run_checked(&["account", "display", "--account", alias], cancel)
            .await?;
        Ok(output.stdout)
    }

    /// First line of `--version`.
    pub async fn version(&self, cancel: &CancellationToken) -> Result<String> {
        let output = self.run_checked(&["--version"], cancel).await?;
        output
            .stdout
            .lines()
            .next()
            .map(str::to_string)
            .ok_or_else(|| VaultError::CliParse("empty --version output".to_string()))
    }

    pub fn bin(&self) -> &Path {
        &self.bin
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token() -> CancellationToken {
        CancellationToken::new()
    }

    #[tokio::test]
    async fn test_missing_binary() {
        let cli = PlatformCli::new(
            PathBuf::from("/nonexistent/platform-cli"),
            Duration::from_secs(5),
        );
        let result = cli.run(&["--version"], &token()).await;
        assert!(matches!(result, Err(VaultError::CliLaunch(_))));
    }

    #[tokio::test]
    #[cfg(unix)]
    async fn test_captures_stdout() {
        let cli = PlatformCli::new(PathBuf::from("echo"), Duration::from_secs(5));
        let output = cli.run(&["hello", "world"], &token()).await.unwrap();
        assert!(output.success());
        assert_eq!(output.stdout.trim(), "hello world");
    }

    #[tokio::test]
    #[cfg(unix)]
    async fn test_nonzero_exit_is_cli_failed() {
        let cli = PlatformCli::new(PathBuf::from("sh"), Duration::from_secs(5));
        let result = cli
            .run_checked(&["-c", "echo oops >&2; exit 3"], &token())
            .await;
        match result {
            Err(VaultError::CliFailed { status, stderr }) => {
                assert_eq!(status, 3);
                assert_eq!(stderr, "oops");
            }
            other => panic!("expected CliFailed, got {:?}", other.map(|o| o.status)),
        }
    }

    #[tokio::test]
    #[cfg(unix)]
    async fn test_timeout() {
        let cli = PlatformCli::new(PathBuf::from("sleep"), Duration::from_millis(50));
        let result = cli.run(&["5"], &token()).await;
        assert!(matches!(result, Err(VaultError::Timeout(_))));
    }

    #[tokio::test]
    #[cfg(unix)]
    async fn test_cancellation() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let cli = PlatformCli::new(PathBuf::from("sleep"), Duration::from_secs(5));
        let result = cli.run(&["5"], &cancel).await;
        assert!(matches!(result, Err(VaultError::Cancelled)));
    }
}
