use clap::Parser;
use serde::Deserialize;

use crate::cli::Command;
use crate::error::LedgerError;
use crate::session::{Identity, Session};

/// Environment variable that overrides `remote.token`.
pub const TOKEN_ENV: &str = "POCKETLEDGER_REMOTE_TOKEN";

#[derive(Parser, Debug)]
#[command(name = "pocketledger", about = "PocketLedger - personal income and expense ledger", version)]
pub struct CliArgs {
    /// Path to config file
    #[arg(short, long, default_value = "pocketledger.toml")]
    pub config: String,

    /// Log level (overrides config file)
    #[arg(short, long)]
    pub log_level: Option<String>,

    /// Remote identity to sync under (overrides config file)
    #[arg(short, long)]
    pub identity: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default = "default_logging")]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub remote: RemoteConfig,

    #[serde(default)]
    pub session: SessionConfig,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    Sqlite,
    Memory,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    #[serde(default = "default_backend")]
    pub backend: StorageKind,

    #[serde(default = "default_db_path")]
    pub path: String,

    /// Categories created on first start of an empty ledger.
    #[serde(default = "default_categories")]
    pub default_categories: Vec<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub json: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RemoteConfig {
    /// When false, mutations are never pushed and pulls are refused.
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// `owner/name` of the repository holding the per-identity documents.
    #[serde(default)]
    pub repository: String,

    #[serde(default = "default_branch")]
    pub branch: String,

    #[serde(default = "default_directory")]
    pub directory: String,

    #[serde(default)]
    pub token: Option<String>,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct SessionConfig {
    #[serde(default)]
    pub identity: Option<String>,
}

fn default_backend() -> StorageKind {
    StorageKind::Sqlite
}

fn default_db_path() -> String {
    "pocketledger.db".to_string()
}

fn default_categories() -> Vec<String> {
    ["Alimentação", "Transporte", "Moradia", "Lazer", "Outros"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_logging() -> LoggingConfig {
    LoggingConfig {
        level: default_log_level(),
        json: false,
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_api_url() -> String {
    "https://api.github.com".to_string()
}

fn default_branch() -> String {
    "main".to_string()
}

fn default_directory() -> String {
    "dados".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig {
            backend: default_backend(),
            path: default_db_path(),
            default_categories: default_categories(),
        }
    }
}

impl Default for RemoteConfig {
    fn default() -> Self {
        RemoteConfig {
            enabled: false,
            api_url: default_api_url(),
            repository: String::new(),
            branch: default_branch(),
            directory: default_directory(),
            token: None,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            storage: StorageConfig::default(),
            logging: default_logging(),
            remote: RemoteConfig::default(),
            session: SessionConfig::default(),
        }
    }
}

impl Config {
    pub fn load(cli: &CliArgs) -> Self {
        let mut config = match std::fs::read_to_string(&cli.config) {
            Ok(contents) => Self::from_toml_str(&contents).unwrap_or_else(|e| {
                eprintln!("Warning: Failed to parse config file: {}", e);
                Config::default()
            }),
            Err(_) => Config::default(),
        };

        // CLI and environment overrides
        if let Some(ref level) = cli.log_level {
            config.logging.level = level.clone();
        }
        if let Some(ref identity) = cli.identity {
            config.session.identity = Some(identity.clone());
        }
        if let Ok(token) = std::env::var(TOKEN_ENV) {
            if !token.trim().is_empty() {
                config.remote.token = Some(token);
            }
        }

        config
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(contents)
    }

    pub fn session(&self) -> Result<Session, LedgerError> {
        match &self.session.identity {
            Some(id) => Ok(Session::logged_in(Identity::new(id.as_str())?)),
            None => Ok(Session::anonymous()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = Config::from_toml_str("").unwrap();
        assert_eq!(config.storage.backend, StorageKind::Sqlite);
        assert_eq!(config.storage.path, "pocketledger.db");
        assert_eq!(config.storage.default_categories.len(), 5);
        assert_eq!(config.logging.level, "info");
        assert!(!config.remote.enabled);
        assert_eq!(config.remote.directory, "dados");
        assert!(config.session().unwrap().identity().is_none());
    }

    #[test]
    fn test_full_config() {
        let config = Config::from_toml_str(
            r#"
            [storage]
            backend = "memory"
            default_categories = []

            [logging]
            level = "debug"
            json = true

            [remote]
            enabled = true
            repository = "someone/ledger-data"
            token = "secret"

            [session]
            identity = "12345"
            "#,
        )
        .unwrap();

        assert_eq!(config.storage.backend, StorageKind::Memory);
        assert!(config.storage.default_categories.is_empty());
        assert!(config.logging.json);
        assert_eq!(config.remote.repository, "someone/ledger-data");
        assert_eq!(config.remote.branch, "main");
        assert_eq!(config.remote.token.as_deref(), Some("secret"));
        assert_eq!(
            config.session().unwrap().identity().map(|i| i.to_string()),
            Some("12345".to_string())
        );
    }

    #[test]
    fn test_unsafe_identity_is_rejected() {
        let config = Config::from_toml_str("[session]\nidentity = \"../x\"").unwrap();
        assert!(matches!(config.session(), Err(LedgerError::Validation(_))));
    }
}
