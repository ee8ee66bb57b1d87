//! Grouped reduce over a tall, narrow problem ("big M").
//!
//! Rows are spread over at most 64 cores. Each core folds its own row tiles
//! into one partial dgamma/dbeta row (stage 1, written to workspace), then
//! core 0 folds the per-core partials with the same schedule (stage 2).
//!
//! ```text
//!   row ─┬─ core 0: m_per_block+1 rows ─┐
//!        ├─ core 1: ...                 ├─ workspace[usable][col] ─ core 0 ─ dgamma/dbeta
//!        └─ core u-1: m_per_block rows ─┘
//! ```

use crate::tiling::binary_tree::ceil_div;
use crate::tiling::error::{Resource, TilingError, TilingResult};
use crate::tiling::params::ProblemParams;
use crate::tiling::strategy::{block_aligned_fp32, flag, FoldTiling, StrategyKind};

pub const MIN_ROW: u64 = 4096;
pub const MAX_COL: u64 = 528;
/// Rows per inner tile.
pub const MFACTOR: u64 = 64;
/// Columns per inner tile.
pub const NFACTOR: u64 = 64;
/// Upper bound on participating cores; stage 2 folds at most one row tile.
pub const MAX_CORE_NUM: u64 = 64;

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct GroupedReduceBigMTilingData {
    pub row: i64,
    pub col: i64,
    pub gamma_beta_usable_blocks: i64,
    pub gamma_beta_m_per_block: i64,
    pub gamma_beta_m_reminder: i64,
    pub gamma_beta_mfactor_block_aligned: i64,
    pub gamma_beta_nfactor_block_aligned: i64,
    pub gamma_beta_nloop: i64,
    pub gamma_beta_ntail: i64,
    /// Cores `[0, m_reminder)`, one extra row each.
    pub main_block: FoldTiling,
    /// Cores `[m_reminder, usable_blocks)`.
    pub tail_block: FoldTiling,
    /// Cross-core fold of the `usable_blocks` partial rows on core 0.
    pub stage2: FoldTiling,
    pub epsilon: f32,
    pub pdx_is_require: i32,
    pub pdgamma_is_require: i32,
    pub pdbeta_is_require: i32,
}

pub fn is_capable(p: &ProblemParams) -> bool {
    p.is_reg_base && p.row_size > MIN_ROW && p.col_size < MAX_COL
}

pub fn reject_reason(p: &ProblemParams) -> String {
    if !p.is_reg_base {
        "platform is not regbase".to_string()
    } else {
        format!(
            "needs row > {MIN_ROW} and col < {MAX_COL}, got row={} col={}",
            p.row_size, p.col_size
        )
    }
}

/// UB bytes one core needs: dy/x queues (3 deep each), mean/rstd, sum queue,
/// temp, and the two cache buffers.
pub fn ub_size_need(mfactor: u64, nfactor: u64, cache_buffer_count: u64) -> u64 {
    (mfactor * nfactor * 6 + mfactor * 2 + nfactor * 3 + nfactor * cache_buffer_count * 2) * 4
}

pub fn do_tiling(p: &ProblemParams) -> TilingResult<GroupedReduceBigMTilingData> {
    let kind = StrategyKind::GroupedReduceBigM;
    if !is_capable(p) {
        return Err(TilingError::NotCapable {
            kind,
            reason: reject_reason(p),
        });
    }
    let row = p.row_size;
    let col = p.col_size;
    let cores = u64::from(p.core_num).min(MAX_CORE_NUM);

    let mfactor = block_aligned_fp32(MFACTOR, p.block_size);
    let nfactor = block_aligned_fp32(NFACTOR, p.block_size);

    let usable_blocks = ceil_div(row, mfactor).min(cores);
    let m_per_block = row / usable_blocks;
    let m_reminder = row - usable_blocks * m_per_block;

    let nloop = col / nfactor;
    let ntail = col - nloop * nfactor;

    let main_block = FoldTiling::new(m_per_block + 1, mfactor);
    let tail_block = FoldTiling::new(m_per_block, mfactor);
    let cache_main = main_block.cache_buffer_count as u64;

    let ub_need = ub_size_need(mfactor, nfactor, cache_main);
    if ub_need > p.ub_size_platform {
        log::warn!(
            "{kind}: row={row} col={col} needs {ub_need} UB bytes (mfactor={mfactor} nfactor={nfactor} \
             cache={cache_main}), platform has {}",
            p.ub_size_platform
        );
        return Err(TilingError::BudgetExceeded {
            kind,
            resource: Resource::UnifiedBuffer,
            needed: ub_need,
            available: p.ub_size_platform,
        });
    }

    let stage2 = FoldTiling::new(usable_blocks, mfactor);
    if cache_main < stage2.basic_block_loop as u64 {
        log::warn!(
            "{kind}: row={row} col={col} stage-2 fold over {usable_blocks} blocks needs {} slots, \
             main block reserves {cache_main}",
            stage2.basic_block_loop
        );
        return Err(TilingError::BudgetExceeded {
            kind,
            resource: Resource::CacheSlots,
            needed: stage2.basic_block_loop as u64,
            available: cache_main,
        });
    }

    Ok(GroupedReduceBigMTilingData {
        row: row as i64,
        col: col as i64,
        gamma_beta_usable_blocks: usable_blocks as i64,
        gamma_beta_m_per_block: m_per_block as i64,
        gamma_beta_m_reminder: m_reminder as i64,
        gamma_beta_mfactor_block_aligned: mfactor as i64,
        gamma_beta_nfactor_block_aligned: nfactor as i64,
        gamma_beta_nloop: nloop as i64,
        gamma_beta_ntail: ntail as i64,
        main_block,
        tail_block,
        stage2,
        epsilon: p.epsilon,
        pdx_is_require: flag(p.outputs.dx),
        pdgamma_is_require: flag(p.outputs.dgamma),
        pdbeta_is_require: flag(p.outputs.dbeta),
    })
}
