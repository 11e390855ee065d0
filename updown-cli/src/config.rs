//! `updown.toml` and the precedence between it, flags and the environment.

use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use updown::{PairingPolicy, DEFAULT_HISTORY_TABLE};

pub const DEFAULT_CONFIG_FILE: &str = "updown.toml";
pub const DEFAULT_MIGRATIONS_DIR: &str = "migrations";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Pairing {
    FailFast,
    CollectAll,
}

impl From<Pairing> for PairingPolicy {
    fn from(value: Pairing) -> Self {
        match value {
            Pairing::FailFast => PairingPolicy::FailFast,
            Pairing::CollectAll => PairingPolicy::CollectAll,
        }
    }
}

#[derive(Debug, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    /// Directory holding the `.up.sql` / `.down.sql` scripts
    #[serde(default)]
    pub migrations_dir: Option<PathBuf>,
    /// Environment variable for database URL (default: "DATABASE_URL")
    #[serde(default = "default_database_url_env")]
    pub database_url_env: String,
    /// Name of the bookkeeping table
    #[serde(default)]
    pub history_table: Option<String>,
    #[serde(default)]
    pub pairing: Option<Pairing>,
}

fn default_database_url_env() -> String {
    "DATABASE_URL".to_string()
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            migrations_dir: None,
            database_url_env: default_database_url_env(),
            history_table: None,
            pairing: None,
        }
    }
}

impl FileConfig {
    pub fn parse(text: &str) -> Result<Self, String> {
        toml::from_str(text).map_err(|e| format!("Invalid updown config: {}", e))
    }

    /// Load the config file. An explicitly requested file must exist; the default
    /// `updown.toml` is optional.
    pub fn load(explicit: Option<&Path>) -> Result<Self, String> {
        let path = explicit.unwrap_or(Path::new(DEFAULT_CONFIG_FILE));
        if explicit.is_none() && !path.exists() {
            return Ok(Self::default());
        }
        let text = fs::read_to_string(path)
            .map_err(|e| format!("Could not read config file {}: {}", path.display(), e))?;
        Self::parse(&text)
    }
}

/// Values given on the command line (or through their clap env fallbacks).
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Overrides {
    pub database_url: Option<String>,
    pub migrations_dir: Option<PathBuf>,
    pub history_table: Option<String>,
    pub collect_all: bool,
}

/// The effective configuration for one invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub migrations_dir: PathBuf,
    pub database_url: Option<String>,
    pub database_url_env: String,
    pub history_table: String,
    pub pairing: PairingPolicy,
}

impl Settings {
    /// Flags win over the file, the file wins over defaults. `env` looks up environment variables.
    pub fn resolve(
        overrides: Overrides,
        file: FileConfig,
        env: impl Fn(&str) -> Option<String>,
    ) -> Self {
        let database_url = overrides
            .database_url
            .or_else(|| env(&file.database_url_env))
            .filter(|url| !url.trim().is_empty());
        let pairing = if overrides.collect_all {
            PairingPolicy::CollectAll
        } else {
            file.pairing.map(PairingPolicy::from).unwrap_or_default()
        };
        Self {
            migrations_dir: overrides
                .migrations_dir
                .or(file.migrations_dir)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_MIGRATIONS_DIR)),
            database_url,
            database_url_env: file.database_url_env,
            history_table: overrides
                .history_table
                .or(file.history_table)
                .unwrap_or_else(|| DEFAULT_HISTORY_TABLE.to_string()),
            pairing,
        }
    }

    pub fn require_database_url(&self) -> Result<&str, String> {
        self.database_url.as_deref().ok_or_else(|| {
            format!(
                "No database URL given. Pass --database-url or set {}",
                self.database_url_env
            )
        })
    }
}
