//! Static device snapshot consumed by the tiling planner.
//!
//! The planner never queries live device state; callers hand it a
//! `PlatformInfo` built from a preset, a JSON description, or the default
//! snapshot with environment overrides applied.

use std::env;
use std::fmt;
use std::fs;
use std::path::Path;

use crate::config::{parse_flag, parse_u64, ConfigError, ENV_BLOCK_SIZE, ENV_CORE_NUM, ENV_UB_SIZE};
use crate::tiling::error::{TilingError, TilingResult};

const ENV_REG_BASE: &str = "NORM_TILING_REG_BASE";

/// Per-device resource limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct PlatformInfo {
    /// Number of vector cores that can run a tiling block in parallel.
    pub core_num: u32,
    /// Unified buffer (on-chip scratch) per core, in bytes.
    pub ub_size: u64,
    /// Alignment granularity of UB transfers, in bytes.
    pub block_size: u64,
    /// Vector register width measured in fp32 lanes.
    pub vl_fp32: u64,
    /// Register-based architecture variant (grouped-reduce kernels exist only here).
    #[serde(default)]
    pub is_reg_base: bool,
}

impl Default for PlatformInfo {
    fn default() -> Self {
        PlatformInfo {
            core_num: 64,
            ub_size: 248 * 1024,
            block_size: 32,
            vl_fp32: 64,
            is_reg_base: true,
        }
    }
}

impl PlatformInfo {
    pub fn new(core_num: u32, ub_size: u64, block_size: u64, vl_fp32: u64) -> Self {
        PlatformInfo {
            core_num,
            ub_size,
            block_size,
            vl_fp32,
            is_reg_base: true,
        }
    }

    pub fn reg_base(mut self, is_reg_base: bool) -> Self {
        self.is_reg_base = is_reg_base;
        self
    }

    /// Parse a JSON platform description.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load a JSON platform description from disk.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&content)
    }

    /// Apply `NORM_TILING_*` overrides from the process environment.
    pub fn with_env_overrides(self) -> Result<Self, ConfigError> {
        self.with_overrides(|var| env::var(var).ok())
    }

    /// Apply overrides taken from `lookup` (variable name -> value).
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup(ENV_CORE_NUM) {
            let cores = parse_u64(ENV_CORE_NUM, &value)?;
            self.core_num = u32::try_from(cores).map_err(|_| ConfigError::InvalidOverride {
                var: ENV_CORE_NUM,
                value,
            })?;
            log::info!("platform override: core_num={}", self.core_num);
        }
        if let Some(value) = lookup(ENV_UB_SIZE) {
            self.ub_size = parse_u64(ENV_UB_SIZE, &value)?;
            log::info!("platform override: ub_size={}", self.ub_size);
        }
        if let Some(value) = lookup(ENV_BLOCK_SIZE) {
            self.block_size = parse_u64(ENV_BLOCK_SIZE, &value)?;
            log::info!("platform override: block_size={}", self.block_size);
        }
        if let Some(value) = lookup(ENV_REG_BASE) {
            self.is_reg_base = parse_flag(ENV_REG_BASE, &value)?;
            log::info!("platform override: is_reg_base={}", self.is_reg_base);
        }
        Ok(self)
    }

    /// Reject snapshots no tiling can be computed against.
    pub fn validate(&self) -> TilingResult<()> {
        if self.core_num == 0 {
            return Err(TilingError::InvalidPlatform("core_num is 0".into()));
        }
        if self.ub_size == 0 {
            return Err(TilingError::InvalidPlatform("ub_size is 0".into()));
        }
        if self.block_size == 0 || self.block_size % 4 != 0 {
            return Err(TilingError::InvalidPlatform(format!(
                "block_size {} is not a positive multiple of 4 bytes",
                self.block_size
            )));
        }
        if self.vl_fp32 == 0 {
            return Err(TilingError::InvalidPlatform("vl_fp32 is 0".into()));
        }
        Ok(())
    }

    /// fp32 elements per alignment block.
    #[inline]
    pub fn block_elems_fp32(&self) -> u64 {
        self.block_size / 4
    }
}

impl fmt::Display for PlatformInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} cores | UB {}K | block {}B | VL {} fp32{}",
            self.core_num,
            self.ub_size / 1024,
            self.block_size,
            self.vl_fp32,
            if self.is_reg_base { " | regbase" } else { "" },
        )
    }
}
