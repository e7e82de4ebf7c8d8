//! Configuration management for syncvault.
//!
//! Loads configuration from a TOML file; every optional field has a serde
//! default so a partial file is enough.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "VaultConfig::default")]
    pub vault: VaultConfig,
    #[serde(default = "CliConfig::default")]
    pub cli: CliConfig,
    #[serde(default = "BackupConfig::default")]
    pub backup: BackupConfig,
    #[serde(default = "RetentionConfig::default")]
    pub retention: RetentionConfig,
    #[serde(default = "LogConfig::default")]
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VaultConfig {
    /// Directory holding content copies and sidecars
    #[serde(default = "default_vault_root")]
    pub root: PathBuf,

    /// Wall-clock budget for the file I/O of one operation
    #[serde(default = "default_io_timeout_secs")]
    pub io_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CliConfig {
    /// External sync CLI executable (name on PATH or absolute path)
    #[serde(default = "default_cli_bin")]
    pub bin: PathBuf,

    /// Wall-clock budget for one CLI invocation
    #[serde(default = "default_cli_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupConfig {
    /// Compression for stored copies (zstd, none)
    #[serde(default = "default_compression")]
    pub compression: String,

    /// Copies smaller than this are always stored raw
    #[serde(default = "default_compression_min_bytes")]
    pub compression_min_bytes: u64,

    /// Host name recorded in sidecars (defaults to the machine hostname)
    #[serde(default)]
    pub host: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetentionConfig {
    /// Versions to keep per file (None = unlimited)
    #[serde(default = "default_keep_last")]
    pub keep_last: Option<usize>,

    /// Drop versions older than this many days (None = no age limit)
    #[serde(default)]
    pub max_age_days: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

// Default values
fn default_vault_root() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("syncvault")
}

fn default_io_timeout_secs() -> u64 {
    30
}

fn default_cli_bin() -> PathBuf {
    PathBuf::from("platform-cli")
}

fn default_cli_timeout_secs() -> u64 {
    300
}

fn default_compression() -> String {
    "zstd".to_string()
}

fn default_compression_min_bytes() -> u64 {
    4096
}

fn default_keep_last() -> Option<usize> {
    Some(20)
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: &PathBuf) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Create a default configuration
    pub fn default() -> Self {
        Config {
            vault: VaultConfig::default(),
            cli: CliConfig::default(),
            backup: BackupConfig::default(),
            retention: RetentionConfig::default(),
            log: LogConfig::default(),
        }
    }

    /// Host name to record in sidecars.
    pub fn host(&self) -> String {
        self.backup.host.clone().unwrap_or_else(|| {
            hostname::get()
                .ok()
                .and_then(|h| h.into_string().ok())
                .unwrap_or_else(|| "unknown-host".to_string())
        })
    }
}

impl VaultConfig {
    fn default() -> Self {
        Self {
            root: default_vault_root(),
            io_timeout_secs: default_io_timeout_secs(),
        }
    }
}

impl CliConfig {
    fn default() -> Self {
        Self {
            bin: default_cli_bin(),
            timeout_secs: default_cli_timeout_secs(),
        }
    }
}

impl BackupConfig {
    fn default() -> Self {
        Self {
            compression: default_compression(),
            compression_min_bytes: default_compression_min_bytes(),
            host: None,
        }
    }
}

impl RetentionConfig {
    fn default() -> Self {
        Self {
            keep_last: default_keep_last(),
            max_age_days: None,
        }
    }
}

impl LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.cli.bin, PathBuf::from("platform-cli"));
        assert_eq!(config.vault.io_timeout_secs, 30);
        assert_eq!(config.retention.keep_last, Some(20));
        assert_eq!(config.log.level, "info");
    }

    #[test]
    fn test_partial_file() {
        let toml = r#"
            [cli]
            bin = "/opt/platform/bin/pcli"
            timeout_secs = 60

            [retention]
            keep_last = 5
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.cli.bin, PathBuf::from("/opt/platform/bin/pcli"));
        assert_eq!(config.cli.timeout_secs, 60);
        assert_eq!(config.retention.keep_last, Some(5));
        // Untouched sections fall back to defaults
        assert_eq!(config.backup.compression, "zstd");
        assert_eq!(config.vault.io_timeout_secs, 30);
    }

    #[test]
    fn test_host_override() {
        let mut config = Config::default();
        config.backup.host = Some("build-box".to_string());
        assert_eq!(config.host(), "build-box");
    }
}
