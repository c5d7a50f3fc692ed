//! File configuration for run defaults.
//!
//! Values are read from a TOML file and sit between CLI flags (which win) and
//! built-in defaults. Every key is optional:
//!
//! ```toml
//! download_concurrency = 4
//! merge_concurrency = 2
//! output_dir = "./download"
//! temp_dir = "./download/temp"
//! max_retries = 3
//! connect_timeout_secs = 30
//! read_timeout_secs = 300
//! ffmpeg = "/usr/bin/ffmpeg"
//! referer = "https://www.example.com/"
//! user_agent = "Mozilla/5.0 ..."
//! ```

use std::env;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Largest accepted concurrency bound for either stage.
pub const MAX_CONCURRENCY: usize = 64;

/// Largest accepted attempt count per asset.
pub const MAX_RETRIES: u32 = 10;

const TIMEOUT_RANGE_SECS: std::ops::RangeInclusive<u64> = 1..=3600;

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file exists but cannot be read.
    #[error("failed to read config file {path}: {source}")]
    Read {
        /// Config file path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid TOML or has unknown keys.
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        /// Config file path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: toml::de::Error,
    },

    /// A value is out of range.
    #[error("invalid config value for `{field}`: {value}. Expected {expected}")]
    Invalid {
        /// Key name.
        field: &'static str,
        /// Offending value.
        value: String,
        /// Accepted values.
        expected: String,
    },
}

/// TOML-backed defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    /// Download concurrency bound.
    pub download_concurrency: Option<usize>,
    /// Merge concurrency bound.
    pub merge_concurrency: Option<usize>,
    /// Output directory.
    pub output_dir: Option<PathBuf>,
    /// Temp directory.
    pub temp_dir: Option<PathBuf>,
    /// Attempts per asset, including the first.
    pub max_retries: Option<u32>,
    /// HTTP connect timeout.
    pub connect_timeout_secs: Option<u64>,
    /// HTTP read timeout.
    pub read_timeout_secs: Option<u64>,
    /// Merge tool executable.
    pub ffmpeg: Option<PathBuf>,
    /// Referer header for fetches.
    pub referer: Option<String>,
    /// User-Agent override for fetches.
    pub user_agent: Option<String>,
}

impl FileConfig {
    /// Parses TOML text. `path` is only used in error messages.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] or [`ConfigError::Invalid`].
    pub fn from_toml(raw: &str, path: &Path) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Loads and validates a config file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read, parsed or validated.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml(&raw, path)?;
        debug!(path = %path.display(), "loaded config file");
        Ok(config)
    }

    /// Loads the file at the default location, if there is one.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if a file exists but is unusable.
    pub fn load_default() -> Result<Option<Self>, ConfigError> {
        match resolve_default_config_path() {
            Some(path) if path.exists() => Self::load(&path).map(Some),
            _ => Ok(None),
        }
    }

    /// Checks value ranges.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for the first out-of-range value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_concurrency("download_concurrency", self.download_concurrency)?;
        validate_concurrency("merge_concurrency", self.merge_concurrency)?;

        if let Some(retries) = self.max_retries
            && !(1..=MAX_RETRIES).contains(&retries)
        {
            return Err(ConfigError::Invalid {
                field: "max_retries",
                value: retries.to_string(),
                expected: format!("range 1..={MAX_RETRIES}"),
            });
        }

        validate_timeout("connect_timeout_secs", self.connect_timeout_secs)?;
        validate_timeout("read_timeout_secs", self.read_timeout_secs)?;
        Ok(())
    }
}

fn validate_concurrency(field: &'static str, value: Option<usize>) -> Result<(), ConfigError> {
    let Some(value) = value else {
        return Ok(());
    };
    if !(1..=MAX_CONCURRENCY).contains(&value) {
        return Err(ConfigError::Invalid {
            field,
            value: value.to_string(),
            expected: format!("range 1..={MAX_CONCURRENCY}"),
        });
    }
    Ok(())
}

fn validate_timeout(field: &'static str, value: Option<u64>) -> Result<(), ConfigError> {
    let Some(value) = value else {
        return Ok(());
    };
    if !TIMEOUT_RANGE_SECS.contains(&value) {
        return Err(ConfigError::Invalid {
            field,
            value: value.to_string(),
            expected: format!(
                "range {}..={}",
                TIMEOUT_RANGE_SECS.start(),
                TIMEOUT_RANGE_SECS.end()
            ),
        });
    }
    Ok(())
}

/// Resolves the default config path.
///
/// Priority:
/// 1. `$XDG_CONFIG_HOME/mediabatch/config.toml`
/// 2. `$HOME/.config/mediabatch/config.toml`
#[must_use]
pub fn resolve_default_config_path() -> Option<PathBuf> {
    if let Some(xdg_config_home) = env_var_non_empty_os("XDG_CONFIG_HOME") {
        return Some(
            PathBuf::from(xdg_config_home)
                .join("mediabatch")
                .join("config.toml"),
        );
    }

    let home = env_var_non_empty_os("HOME")?;
    Some(
        PathBuf::from(home)
            .join(".config")
            .join("mediabatch")
            .join("config.toml"),
    )
}

fn env_var_non_empty_os(name: &str) -> Option<OsString> {
    let value = env::var_os(name)?;
    if value.is_empty() { None } else { Some(value) }
}
