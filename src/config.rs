//! Planner configuration: tiling knobs and environment overrides.

use std::env;
use std::path::PathBuf;

use thiserror::Error;

/// Base device workspace reserved on top of the per-strategy scratch (16 MiB).
pub const DEFAULT_WORKSPACE_SIZE: u64 = 16 * 1024 * 1024;

pub const ENV_DETERMINISTIC: &str = "NORM_TILING_DETERMINISTIC";
pub const ENV_CORE_NUM: &str = "NORM_TILING_CORE_NUM";
pub const ENV_UB_SIZE: &str = "NORM_TILING_UB_SIZE";
pub const ENV_BLOCK_SIZE: &str = "NORM_TILING_BLOCK_SIZE";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed platform description: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid value {value:?} for {var}")]
    InvalidOverride { var: &'static str, value: String },
}

/// Knobs that are not derived from shapes or the device snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TilingConfig {
    /// Request the deterministic kernel variant (encoded in the tiling key).
    pub deterministic: bool,
    /// Fixed workspace reservation added to every strategy's scratch.
    pub workspace_reserve: u64,
}

impl Default for TilingConfig {
    fn default() -> Self {
        TilingConfig {
            deterministic: false,
            workspace_reserve: DEFAULT_WORKSPACE_SIZE,
        }
    }
}

impl TilingConfig {
    /// Defaults with `NORM_TILING_DETERMINISTIC` applied when set.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| env::var(var).ok())
    }

    /// Defaults with overrides taken from `lookup` (variable name -> value).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = TilingConfig::default();
        if let Some(value) = lookup(ENV_DETERMINISTIC) {
            config.deterministic = parse_flag(ENV_DETERMINISTIC, &value)?;
        }
        Ok(config)
    }

    pub fn deterministic(mut self, deterministic: bool) -> Self {
        self.deterministic = deterministic;
        self
    }
}

pub(crate) fn parse_flag(var: &'static str, value: &str) -> Result<bool, ConfigError> {
    let value = value.trim();
    if value == "1" || value.eq_ignore_ascii_case("true") {
        Ok(true)
    } else if value == "0" || value.eq_ignore_ascii_case("false") {
        Ok(false)
    } else {
        Err(ConfigError::InvalidOverride {
            var,
            value: value.to_string(),
        })
    }
}

pub(crate) fn parse_u64(var: &'static str, value: &str) -> Result<u64, ConfigError> {
    value
        .trim()
        .parse::<u64>()
        .map_err(|_| ConfigError::InvalidOverride {
            var,
            value: value.to_string(),
        })
}
