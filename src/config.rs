//! Application configuration.
//!
//! Settings come from an optional TOML file layered under environment variables
//! of the form `LINKJOIN__<SECTION>__<KEY>`, e.g. `LINKJOIN__PROVIDER__API_ID=12345`.
//!
//! ```toml
//! [provider]
//! api_id = 12345
//! api_hash = "0123456789abcdef"
//! session = "1BQANOTEuMTA4..."
//!
//! [join]
//! confirmation_text = "A"
//!
//! [storage]
//! dir = "/var/lib/linkjoin"
//! ```

use std::path::{Path, PathBuf};

use ::config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::coordinator::DEFAULT_CONFIRMATION_TEXT;
use crate::provider::ProviderCredentials;

/// Prefix for environment variable overrides.
pub const ENV_PREFIX: &str = "LINKJOIN";

const REDACTED: &str = "<redacted>";

/// Errors that can occur while loading configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The configuration file was not found.
    #[error("configuration file not found: {0}")]
    FileNotFound(String),

    /// The configuration could not be parsed.
    #[error("failed to parse configuration: {0}")]
    ParseError(#[from] ::config::ConfigError),

    /// The configuration file path is invalid.
    #[error("invalid configuration path: {0}")]
    InvalidPath(String),

    /// A value is present but unusable.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Join workflow settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinSettings {
    /// Message posted once membership is verified
    #[serde(default = "default_confirmation_text")]
    pub confirmation_text: String,
}

impl Default for JoinSettings {
    fn default() -> Self {
        Self {
            confirmation_text: default_confirmation_text(),
        }
    }
}

fn default_confirmation_text() -> String {
    DEFAULT_CONFIRMATION_TEXT.to_string()
}

/// Where the join log is kept.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageSettings {
    /// Base directory; the log goes in `<dir>/.linkjoin/join_log.json`
    #[serde(default = "default_storage_dir")]
    pub dir: PathBuf,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            dir: default_storage_dir(),
        }
    }
}

fn default_storage_dir() -> PathBuf {
    PathBuf::from(".")
}

/// Root configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub provider: ProviderCredentials,
    #[serde(default)]
    pub join: JoinSettings,
    #[serde(default)]
    pub storage: StorageSettings,
}

impl AppConfig {
    /// Load configuration from an optional file plus environment overrides.
    ///
    /// With no file, defaults apply wherever the environment is silent.
    ///
    /// # Errors
    ///
    /// Returns an error if the given file does not exist or cannot be parsed, or
    /// if the resulting configuration fails [`AppConfig::validate`].
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();

        if let Some(path) = path {
            let path_str = path
                .to_str()
                .ok_or_else(|| ConfigError::InvalidPath(format!("{:?}", path)))?;
            if !path.exists() {
                return Err(ConfigError::FileNotFound(path_str.to_string()));
            }
            builder = builder.add_source(File::with_name(path_str));
        }

        let config = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let app_config: AppConfig = config.try_deserialize()?;
        app_config.validate()?;

        tracing::debug!(config = ?app_config, "Configuration loaded");
        Ok(app_config)
    }

    /// Check values that parse but cannot be used.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.join.confirmation_text.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "join.confirmation_text must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Copy with provider secrets masked, for display.
    pub fn redacted(&self) -> Self {
        let mask = |secret: &str| {
            if secret.is_empty() {
                String::new()
            } else {
                REDACTED.to_string()
            }
        };
        let mut copy = self.clone();
        copy.provider.api_hash = mask(&self.provider.api_hash);
        copy.provider.session = mask(&self.provider.session);
        copy
    }
}
