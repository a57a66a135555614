//! Configuration management for flightledger.
//!
//! This module provides configuration loading and validation using figment,
//! supporting TOML config files, environment variables, and defaults.

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::classify::{Classifier, Squawk};
use crate::error::{Error, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "config.toml";

/// Default data directory name.
const DATA_DIR_NAME: &str = "flightledger";

/// Default ledger file name.
const LEDGER_FILE_NAME: &str = "secure_ledger.jsonl";

/// Default wait for another writer's ledger lock, in milliseconds.
const DEFAULT_LOCK_TIMEOUT_MS: u64 = 2000;

/// Default archive directory name.
const ARCHIVE_DIR_NAME: &str = "flight_logs";

/// Application configuration.
///
/// Configuration is loaded from (in order of precedence, highest first):
/// 1. Environment variables (prefixed with `FLIGHTLEDGER_`, sections split
///    on `__`, e.g. `FLIGHTLEDGER_LEDGER__PATH`)
/// 2. TOML config file at `~/.config/flightledger/config.toml`
/// 3. Default values
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Ledger configuration.
    pub ledger: LedgerConfig,
    /// Archive configuration.
    pub archive: ArchiveConfig,
    /// Classifier configuration.
    pub classifier: ClassifierConfig,
}

/// Ledger-related configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Path to the ledger file.
    /// Defaults to `~/.local/share/flightledger/secure_ledger.jsonl`
    pub path: Option<PathBuf>,

    /// How long an append waits for another process holding the ledger.
    pub lock_timeout_ms: u64,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            path: None,
            lock_timeout_ms: DEFAULT_LOCK_TIMEOUT_MS,
        }
    }
}

/// Archive-related configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchiveConfig {
    /// Root of the live cache and the category directories.
    /// Defaults to `~/.local/share/flightledger/flight_logs`
    pub root: Option<PathBuf>,
}

/// Classifier-related configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Squawk codes treated as routine when deciding whether a lost flight
    /// crashed.
    pub nominal_squawks: Vec<String>,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            nominal_squawks: vec![Squawk::VFR.to_string()],
        }
    }
}

impl Config {
    /// Load configuration from all sources.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or parsing fails.
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load configuration with an optional custom config path.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading, parsing or validation
    /// fails.
    pub fn load_from(config_path: Option<PathBuf>) -> Result<Self> {
        let config_file = config_path.unwrap_or_else(Self::default_config_path);

        let figment = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&config_file))
            .merge(Env::prefixed("FLIGHTLEDGER_").split("__"));

        let config: Config = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Get the default configuration file path.
    #[must_use]
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join(DATA_DIR_NAME)
            .join(CONFIG_FILE_NAME)
    }

    /// Get the default data directory path.
    #[must_use]
    pub fn default_data_dir() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from(".local/share"))
            .join(DATA_DIR_NAME)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid.
    pub fn validate(&self) -> Result<()> {
        for code in &self.classifier.nominal_squawks {
            let squawk = Squawk::parse(code).map_err(|_| Error::ConfigValidation {
                message: format!("nominal_squawks: {code:?} is not a four-digit octal code"),
            })?;
            if squawk.emergency_category().is_some() {
                return Err(Error::ConfigValidation {
                    message: format!("nominal_squawks: {code} is an emergency code"),
                });
            }
        }

        if self.ledger.path.as_ref().is_some_and(|p| p.as_os_str().is_empty()) {
            return Err(Error::ConfigValidation {
                message: "ledger.path must not be empty".to_string(),
            });
        }

        if self.archive.root.as_ref().is_some_and(|p| p.as_os_str().is_empty()) {
            return Err(Error::ConfigValidation {
                message: "archive.root must not be empty".to_string(),
            });
        }

        Ok(())
    }

    /// Get the ledger path, resolving defaults if not set.
    #[must_use]
    pub fn ledger_path(&self) -> PathBuf {
        self.ledger
            .path
            .clone()
            .unwrap_or_else(|| Self::default_data_dir().join(LEDGER_FILE_NAME))
    }

    /// How long ledger appends wait for another writer.
    #[must_use]
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.ledger.lock_timeout_ms)
    }

    /// Get the archive root, resolving defaults if not set.
    #[must_use]
    pub fn archive_root(&self) -> PathBuf {
        self.archive
            .root
            .clone()
            .unwrap_or_else(|| Self::default_data_dir().join(ARCHIVE_DIR_NAME))
    }

    /// Build the classifier described by this configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidSquawk`] if a nominal code does not parse.
    pub fn classifier(&self) -> Result<Classifier> {
        let nominal = self
            .classifier
            .nominal_squawks
            .iter()
            .map(String::as_str)
            .map(Squawk::parse)
            .collect::<Result<Vec<_>>>()?;
        Ok(Classifier::new(nominal))
    }
}
