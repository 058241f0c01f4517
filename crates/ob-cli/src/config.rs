//! Configuration loading and management.

use std::fmt;
use std::path::{Path, PathBuf};

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use ob_core::TrackerConfig;
use serde::{Deserialize, Serialize};

const DEFAULT_WORKERS: usize = 4;

/// Application configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct Config {
    /// Path to the database file.
    pub database_path: PathBuf,
    /// Number of dispatcher partitions used by `ingest`.
    pub workers: usize,
    /// Session tracker behaviour.
    #[serde(default)]
    pub tracker: TrackerConfig,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("database_path", &self.database_path)
            .field("workers", &self.workers)
            .field("tracker", &self.tracker)
            .finish()
    }
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs_data_path().unwrap_or_else(|| PathBuf::from("."));
        Self {
            database_path: data_dir.join("oblivionis.db"),
            workers: DEFAULT_WORKERS,
            tracker: TrackerConfig::default(),
        }
    }
}

impl Config {
    /// Loads configuration, optionally from a specific file.
    #[expect(
        clippy::result_large_err,
        reason = "figment::Error is large but only returned at startup"
    )]
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, figment::Error> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        // Load from default config location
        if let Some(config_dir) = dirs_config_path() {
            figment = figment.merge(Toml::file(config_dir.join("config.toml")));
        }

        // Load from specified config file
        if let Some(path) = config_path {
            figment = figment.merge(Toml::file(path));
        }

        // Load from environment variables (OB_*, nested keys split on `__`)
        figment = figment.merge(Env::prefixed("OB_").split("__"));

        figment.extract()
    }

    /// Partition count, never less than one.
    pub fn workers(&self) -> usize {
        self.workers.max(1)
    }
}

/// Returns the platform-specific config directory for oblivionis.
fn dirs_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("oblivionis"))
}

/// Returns the platform-specific data directory for oblivionis.
///
/// On Linux: `~/.local/share/oblivionis`
pub fn dirs_data_path() -> Option<PathBuf> {
    dirs::data_dir().map(|p| p.join("oblivionis"))
}
