//! Scraping account metadata from the sync CLI's text output.
//!
//! The CLI prints human-oriented tables and key/value blocks; there is no
//! machine-readable mode. `account list` rows look like
//!
//! ```text
//! ALIAS      USERNAME             ACCOUNT ID          STATUS
//! * prod     dev@example.com      0123456789ABCDEF    Connected
//!   staging  qa@example.com       FEDCBA9876543210    Expired
//! ```
//!
//! and `account display` is free text containing an `Auth Id: …` line.

use crate::store::RemoteAccount;
use crate::utils::errors::{Result, VaultError};
use regex::Regex;
use std::sync::OnceLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountStatus {
    Connected,
    Expired,
    Unknown,
}

impl AccountStatus {
    fn parse(s: &str) -> Self {
        match s {
            "Connected" => AccountStatus::Connected,
            "Expired" => AccountStatus::Expired,
            _ => AccountStatus::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AccountStatus::Connected => "Connected",
            AccountStatus::Expired => "Expired",
            AccountStatus::Unknown => "Unknown",
        }
    }
}

/// One authenticated account as reported by `account list`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub alias: String,
    pub username: String,
    pub account_id: String,
    pub status: AccountStatus,
    pub is_default: bool,
}

impl From<&Account> for RemoteAccount {
    fn from(account: &Account) -> Self {
        RemoteAccount {
            alias: account.alias.clone(),
            username: account.username.clone(),
            account_id: account.account_id.clone(),
            status: account.status.as_str().to_string(),
        }
    }
}

fn account_line_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?m)^\s*(?P<default>\*)?\s*(?P<alias>[A-Za-z0-9][\w.-]*)\s+(?P<username>[^\s@]+@\S+)\s+(?P<id>[0-9A-Za-z]{12,20})\s+(?P<status>\S+)\s*$",
        )
        .expect("account line regex")
    })
}

fn auth_id_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?mi)^\s*auth(?:entication)?\s+id\s*[:=]\s*(?P<id>[A-Za-z0-9._-]+)\s*$")
            .expect("auth id regex")
    })
}

/// Scrape every account row out of `account list` stdout. Header and
/// decoration lines simply fail the row pattern.
pub fn parse_account_list(stdout: &str) -> Vec<Account> {
    account_line_re()
        .captures_iter(stdout)
        .map(|caps| Account {
            alias: caps["alias"].to_string(),
            username: caps["username"].to_string(),
            account_id: caps["id"].to_string(),
            status: AccountStatus::parse(&caps["status"]),
            is_default: caps.name("default").is_some(),
        })
        .collect()
}

/// Scrape the authentication id out of `account display` stdout.
pub fn parse_auth_id(stdout: &str) -> Option<String> {
    auth_id_re()
        .captures(stdout)
        .map(|caps| caps["id"].to_string())
}

/// Pick the account to sync with: by alias or username when named,
/// otherwise the CLI's default (`*`-marked) account.
pub fn resolve<'a>(accounts: &'a [Account], name: Option<&str>) -> Result<&'a Account> {
    match name {
        Some(name) => accounts
            .iter()
            .find(|a| a.alias == name || a.username == name)
            .ok_or_else(|| VaultError::AccountNotFound(name.to_string())),
        None => accounts
            .iter()
            .find(|a| a.is_default)
            .or_else(|| accounts.first())
            .ok_or_else(|| {
                VaultError::AccountNotFound("no authenticated accounts".to_string())
            }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LIST_OUTPUT: &str = "\
ALIAS      USERNAME             ACCOUNT ID          STATUS
* prod     dev@example.com      0123456789ABCDEF    Connected
  staging  qa@example.com       FEDCBA9876543210    Expired
";

    #[test]
    fn test_parse_account_list() {
        let accounts = parse_account_list(LIST_OUTPUT);
        assert_eq!(accounts.len(), 2);

        assert_eq!(accounts[0].alias, "prod");
        assert_eq!(accounts[0].username, "dev@example.com");
        assert_eq!(accounts[0].account_id, "0123456789ABCDEF");
        assert_eq!(accounts[0].status, AccountStatus::Connected);
        assert!(accounts[0].is_default);

        assert_eq!(accounts[1].alias, "staging");
        assert_eq!(accounts[1].status, AccountStatus::Expired);
        assert!(!accounts[1].is_default);
    }

    #[test]
    fn test_parse_skips_noise() {
        let noisy = format!(
            "Connecting to platform...\n{}\n2 accounts found.\n",
            LIST_OUTPUT
        );
        let accounts = parse_account_list(&noisy);
        assert_eq!(accounts.len(), 2);
    }

    #[test]
    fn test_parse_empty_output() {
        assert!(parse_account_list("No authenticated accounts.\n").is_empty());
    }

    #[test]
    fn test_parse_auth_id() {
        let display = "\
Account Details
  Alias:    prod
  Auth Id:  AUTH-8839.2
  Region:   eu-west
";
        assert_eq!(parse_auth_id(display), Some("AUTH-8839.2".to_string()));
        assert_eq!(parse_auth_id("nothing relevant"), None);
    }

    #[test]
    fn test_resolve_by_alias_and_username() {
        let accounts = parse_account_list(LIST_OUTPUT);
        assert_eq!(resolve(&accounts, Some("staging")).unwrap().alias, "staging");
        assert_eq!(
            resolve(&accounts, Some("dev@example.com")).unwrap().alias,
            "prod"
        );
        assert!(matches!(
            resolve(&accounts, Some("missing")),
            Err(VaultError::AccountNotFound(_))
        ));
    }

    #[test]
    fn test_resolve_default() {
        let accounts = parse_account_list(LIST_OUTPUT);
        assert_eq!(resolve(&accounts, None).unwrap().alias, "prod");

        assert!(matches!(
            resolve(&[], None),
            Err(VaultError::AccountNotFound(_))
        ));
    }

    #[test]
    fn test_remote_account_conversion() {
        let accounts = parse_account_list(LIST_OUTPUT);
        let remote = RemoteAccount::from(&accounts[0]);
        assert_eq!(remote.alias, "prod");
        assert_eq!(remote.status, "Connected");
    }
}
