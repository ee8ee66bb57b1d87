//! norm-tiling: host-side tiling planner for LayerNorm backward kernels.
//!
//! Given tensor descriptors for `dy`, `x`, `mean`, `variance`, `gamma` and
//! the requested gradients, the planner fuses the problem into `(row, col)`,
//! picks a kernel template by capability and priority, and emits the
//! fixed-layout tiling record, tiling key, block dim and workspace size the
//! kernel launcher needs.
//!
//! # Quick Start
//!
//! ```
//! use norm_tiling::{tile_layer_norm_grad, DType, LayerNormGradDesc, PlatformInfo, TilingConfig};
//!
//! let desc = LayerNormGradDesc::from_shape(&[8192, 64], 1, DType::BF16, DType::F32);
//! let out = tile_layer_norm_grad(&desc, &PlatformInfo::default(), &TilingConfig::default()).unwrap();
//! assert_eq!(out.tiling_key, 605);
//! ```

pub mod config;
pub mod dispatch;
pub mod tiling;
pub mod types;

pub use config::{ConfigError, TilingConfig, DEFAULT_WORKSPACE_SIZE};
pub use dispatch::PlatformInfo;
pub use tiling::{
    tile_layer_norm_grad, tile_with_registry, DtypeKey, ProblemParams, ScheduleMode, StrategyKind,
    TemplateRegistry, TilingData, TilingError, TilingOutput, TilingResult,
};
pub use types::{DType, LayerNormGradDesc, OutputMask, TensorDesc};
