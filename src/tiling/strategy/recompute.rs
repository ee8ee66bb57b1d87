//! Row-resident fallback ("recompute").
//!
//! Every core owns a contiguous run of rows and keeps whole aligned rows in
//! UB, recomputing the normalized input instead of caching it. Per-core
//! dgamma/dbeta partials are folded across cores in a second stage.

use crate::tiling::binary_tree::{ceil_div, find_nearest_power2};
use crate::tiling::error::{Resource, TilingError, TilingResult};
use crate::tiling::params::ProblemParams;
use crate::tiling::strategy::{flag, FoldTiling, StrategyKind};

/// Column-sized fp32 buffers alive for the whole kernel: gamma, dgamma, dbeta.
const COL_BUFFERS: u64 = 3;
/// Column-sized fp32 buffers per resident row: dy, x, dx, temp.
const ROW_BUFFERS: u64 = 4;
/// Stage-2 tile height, in partial rows.
const STAGE2_MFACTOR: u64 = 64;

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct RecomputeTilingData {
    pub row: i64,
    pub col: i64,
    pub col_align: i64,
    pub block_dim: i64,
    pub row_per_core: i64,
    pub row_tail_core: i64,
    pub ub_row_factor: i64,
    pub m_loop_main: i64,
    pub m_tail_main: i64,
    pub m_loop_tail: i64,
    pub m_tail_tail: i64,
    /// First fold point of the vector-lane reduction over one row.
    pub vl_fold_point: i64,
    pub stage2: FoldTiling,
    pub epsilon: f32,
    pub pdx_is_require: i32,
    pub pdgamma_is_require: i32,
    pub pdbeta_is_require: i32,
}

// Byte counts saturate: a saturated count never fits in UB.
fn fixed_bytes(p: &ProblemParams) -> u64 {
    p.col_align.saturating_mul(4 * COL_BUFFERS)
}

/// UB bytes per resident row, including the block-aligned mean/rstd slots.
fn row_bytes(p: &ProblemParams) -> u64 {
    p.col_align
        .saturating_mul(4 * ROW_BUFFERS)
        .saturating_add(p.block_size.saturating_mul(2))
}

fn one_row_bytes(p: &ProblemParams) -> u64 {
    fixed_bytes(p).saturating_add(row_bytes(p))
}

pub fn is_capable(p: &ProblemParams) -> bool {
    one_row_bytes(p) <= p.ub_size_platform
}

pub fn reject_reason(p: &ProblemParams) -> String {
    format!(
        "one aligned row needs {} UB bytes, platform has {}",
        one_row_bytes(p),
        p.ub_size_platform
    )
}

pub fn do_tiling(p: &ProblemParams) -> TilingResult<RecomputeTilingData> {
    let kind = StrategyKind::Recompute;
    let row = p.row_size;
    let cores = u64::from(p.core_num);

    let row_per_core = ceil_div(row, cores);
    let block_dim = ceil_div(row, row_per_core);
    let row_tail_core = row - (block_dim - 1) * row_per_core;

    let fixed = fixed_bytes(p);
    let per_row = row_bytes(p);
    let ub_row_factor = if fixed >= p.ub_size_platform {
        0
    } else {
        ((p.ub_size_platform - fixed) / per_row).min(row_per_core)
    };
    if ub_row_factor == 0 {
        log::warn!(
            "{kind}: row={row} col={} needs {} UB bytes for one row, platform has {}",
            p.col_size,
            one_row_bytes(p),
            p.ub_size_platform
        );
        return Err(TilingError::BudgetExceeded {
            kind,
            resource: Resource::UnifiedBuffer,
            needed: one_row_bytes(p),
            available: p.ub_size_platform,
        });
    }

    let m_loop_main = row_per_core / ub_row_factor;
    let m_tail_main = row_per_core - m_loop_main * ub_row_factor;
    let m_loop_tail = row_tail_core / ub_row_factor;
    let m_tail_tail = row_tail_core - m_loop_tail * ub_row_factor;

    let vl_fold_point = find_nearest_power2(ceil_div(p.col_align, p.vl_fp32));
    let stage2 = FoldTiling::new(block_dim, STAGE2_MFACTOR);

    Ok(RecomputeTilingData {
        row: row as i64,
        col: p.col_size as i64,
        col_align: p.col_align as i64,
        block_dim: block_dim as i64,
        row_per_core: row_per_core as i64,
        row_tail_core: row_tail_core as i64,
        ub_row_factor: ub_row_factor as i64,
        m_loop_main: m_loop_main as i64,
        m_tail_main: m_tail_main as i64,
        m_loop_tail: m_loop_tail as i64,
        m_tail_tail: m_tail_tail as i64,
        vl_fold_point: vl_fold_point as i64,
        stage2,
        epsilon: p.epsilon,
        pdx_is_require: flag(p.outputs.dx),
        pdgamma_is_require: flag(p.outputs.dgamma),
        pdbeta_is_require: flag(p.outputs.dbeta),
    })
}
