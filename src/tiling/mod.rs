//! Host-side tiling planner for LayerNorm backward (dx, dgamma, dbeta).
//!
//! ```text
//! LayerNormGradDesc ─ resolve ─ ProblemParams ─ registry ─ TilingData ─ emit ─ TilingOutput
//!                        │                        │
//!                   PlatformInfo        gates in priority order
//! ```
//!
//! Planning is pure: no device state is queried and nothing survives a call.

pub mod binary_tree;
pub mod emit;
pub mod error;
pub mod params;
pub mod registry;
pub mod strategy;
pub mod workspace;

pub use binary_tree::BinaryTreeSizing;
pub use emit::{tiling_key, ScheduleMode, TilingOutput};
pub use error::{Rejection, Resource, TilingError, TilingResult};
pub use params::{DtypeKey, ProblemParams};
pub use registry::{TemplateEntry, TemplateRegistry};
pub use strategy::{FoldTiling, StrategyKind, TilingData};

use crate::config::TilingConfig;
use crate::dispatch::PlatformInfo;
use crate::types::LayerNormGradDesc;

/// Plan one LayerNorm backward invocation with the default template set.
pub fn tile_layer_norm_grad(
    desc: &LayerNormGradDesc,
    platform: &PlatformInfo,
    config: &TilingConfig,
) -> TilingResult<TilingOutput> {
    tile_with_registry(&TemplateRegistry::layer_norm_grad(), desc, platform, config)
}

/// Plan one invocation against an explicit template registry.
pub fn tile_with_registry(
    registry: &TemplateRegistry,
    desc: &LayerNormGradDesc,
    platform: &PlatformInfo,
    config: &TilingConfig,
) -> TilingResult<TilingOutput> {
    let params = ProblemParams::resolve(desc, platform, config)?;
    let data = registry.select_and_tile(&params)?;
    let kind = data.kind();

    let output = TilingOutput {
        kind,
        tiling_key: tiling_key(kind, params.deterministic, params.dtype_key),
        block_dim: data.block_dim(),
        schedule_mode: ScheduleMode::Batch,
        workspace_size: workspace::workspace_size(&params, &data, config.workspace_reserve),
        data,
    };
    log::debug!("layer_norm_grad: {output}");
    Ok(output)
}
