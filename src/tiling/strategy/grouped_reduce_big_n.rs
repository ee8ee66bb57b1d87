//! Grouped reduce over a short, wide problem ("big N").
//!
//! dgamma/dbeta: columns are sliced across cores and each core folds every
//! row of its slice, so no cross-core stage is needed.
//! dx: the per-row sums over columns are split across cores; partial sums go
//! to workspace and every core re-reads the combined sum before writing dx.

use crate::tiling::binary_tree::{ceil_align, ceil_div};
use crate::tiling::error::{Resource, TilingError, TilingResult};
use crate::tiling::params::ProblemParams;
use crate::tiling::strategy::{block_aligned_fp32, flag, FoldTiling, StrategyKind};

pub const MIN_COL: u64 = 528;
pub const MAX_ROW: u64 = 4096;
pub const GAMMA_BETA_MFACTOR: u64 = 64;
pub const GAMMA_BETA_NFACTOR: u64 = 64;
pub const BACKWARD_MFACTOR: u64 = 32;
pub const BACKWARD_NFACTOR: u64 = 64;

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct GroupedReduceBigNTilingData {
    pub row: i64,
    pub col: i64,
    pub gamma_beta_block_dim: i64,
    pub gamma_beta_main_block_factor: i64,
    pub gamma_beta_mfactor: i64,
    pub gamma_beta_nfactor: i64,
    pub gamma_beta_nloop_main_block: i64,
    pub gamma_beta_ntail_main_block: i64,
    pub gamma_beta_nloop_tail_block: i64,
    pub gamma_beta_ntail_tail_block: i64,
    /// Row fold shared by every gamma/beta core.
    pub gamma_beta_m: FoldTiling,
    pub backward_block_dim: i64,
    pub backward_n_per_block: i64,
    pub backward_n_rem: i64,
    pub backward_mfactor: i64,
    pub backward_mfactor_block_aligned: i64,
    pub backward_nfactor_block_aligned: i64,
    pub backward_m_total_loop: i64,
    pub backward_mtail: i64,
    /// Column fold of cores `[0, n_rem)`.
    pub backward_main: FoldTiling,
    /// Column fold of cores `[n_rem, backward_block_dim)`.
    pub backward_tail: FoldTiling,
    pub epsilon: f32,
    pub pdx_is_require: i32,
    pub pdgamma_is_require: i32,
    pub pdbeta_is_require: i32,
}

pub fn is_capable(p: &ProblemParams) -> bool {
    p.is_reg_base && p.col_size >= MIN_COL && p.row_size <= MAX_ROW
}

pub fn reject_reason(p: &ProblemParams) -> String {
    if !p.is_reg_base {
        "platform is not regbase".to_string()
    } else {
        format!(
            "needs col >= {MIN_COL} and row <= {MAX_ROW}, got row={} col={}",
            p.row_size, p.col_size
        )
    }
}

/// UB bytes of the dgamma/dbeta kernel; same buffer set as big M.
pub fn gamma_beta_ub_need(mfactor: u64, nfactor: u64, cache_buffer_count: u64) -> u64 {
    super::grouped_reduce_big_m::ub_size_need(mfactor, nfactor, cache_buffer_count)
}

/// UB bytes of the dx kernel: dy/x/dx queues, reduce temp, four param
/// queues, temp, two output queues, gamma queue and the cache buffers.
pub fn backward_ub_need(mfactor: u64, nfactor: u64, cache_buffer_count: u64) -> u64 {
    (mfactor * nfactor * 9 + mfactor * 9 + nfactor * 2 + mfactor * cache_buffer_count * 2) * 4
}

fn check_ub(kind: StrategyKind, p: &ProblemParams, what: &str, need: u64) -> TilingResult<()> {
    if need > p.ub_size_platform {
        log::warn!(
            "{kind}: row={} col={} {what} needs {need} UB bytes, platform has {}",
            p.row_size,
            p.col_size,
            p.ub_size_platform
        );
        return Err(TilingError::BudgetExceeded {
            kind,
            resource: Resource::UnifiedBuffer,
            needed: need,
            available: p.ub_size_platform,
        });
    }
    Ok(())
}

pub fn do_tiling(p: &ProblemParams) -> TilingResult<GroupedReduceBigNTilingData> {
    let kind = StrategyKind::GroupedReduceBigN;
    if !is_capable(p) {
        return Err(TilingError::NotCapable {
            kind,
            reason: reject_reason(p),
        });
    }
    let row = p.row_size;
    let col = p.col_size;
    let cores = u64::from(p.core_num);

    // dgamma/dbeta: column slices
    let gb_mfactor = block_aligned_fp32(GAMMA_BETA_MFACTOR, p.block_size);
    let gb_nfactor = block_aligned_fp32(GAMMA_BETA_NFACTOR, p.block_size);
    let main_block_factor = ceil_align(ceil_div(col, cores), p.block_size / 4);
    let gb_block_dim = ceil_div(col, main_block_factor);
    let tail_block_n = col - (gb_block_dim - 1) * main_block_factor;
    let nloop_main = ceil_div(main_block_factor, gb_nfactor);
    let ntail_main = main_block_factor - (nloop_main - 1) * gb_nfactor;
    let nloop_tail = ceil_div(tail_block_n, gb_nfactor);
    let ntail_tail = tail_block_n - (nloop_tail - 1) * gb_nfactor;

    let gamma_beta_m = FoldTiling::new(row, gb_mfactor);
    check_ub(
        kind,
        p,
        "gamma/beta",
        gamma_beta_ub_need(gb_mfactor, gb_nfactor, gamma_beta_m.cache_buffer_count as u64),
    )?;

    // dx: per-row column sums split across cores
    let bw_mfactor_aligned = block_aligned_fp32(BACKWARD_MFACTOR, p.block_size);
    let bw_nfactor = block_aligned_fp32(BACKWARD_NFACTOR, p.block_size);
    let bw_block_dim = cores.min(ceil_div(col, bw_nfactor));
    let n_per_block = col / bw_block_dim;
    let n_rem = col - n_per_block * bw_block_dim;
    let backward_main = FoldTiling::new(n_per_block + 1, bw_nfactor);
    let backward_tail = FoldTiling::new(n_per_block, bw_nfactor);
    let m_total_loop = ceil_div(row, BACKWARD_MFACTOR);
    let mtail = row - (m_total_loop - 1) * BACKWARD_MFACTOR;

    check_ub(
        kind,
        p,
        "backward",
        backward_ub_need(
            bw_mfactor_aligned,
            bw_nfactor,
            backward_main.cache_buffer_count as u64,
        ),
    )?;

    Ok(GroupedReduceBigNTilingData {
        row: row as i64,
        col: col as i64,
        gamma_beta_block_dim: gb_block_dim as i64,
        gamma_beta_main_block_factor: main_block_factor as i64,
        gamma_beta_mfactor: gb_mfactor as i64,
        gamma_beta_nfactor: gb_nfactor as i64,
        gamma_beta_nloop_main_block: nloop_main as i64,
        gamma_beta_ntail_main_block: ntail_main as i64,
        gamma_beta_nloop_tail_block: nloop_tail as i64,
        gamma_beta_ntail_tail_block: ntail_tail as i64,
        gamma_beta_m,
        backward_block_dim: bw_block_dim as i64,
        backward_n_per_block: n_per_block as i64,
        backward_n_rem: n_rem as i64,
        backward_mfactor: BACKWARD_MFACTOR as i64,
        backward_mfactor_block_aligned: bw_mfactor_aligned as i64,
        backward_nfactor_block_aligned: bw_nfactor as i64,
        backward_m_total_loop: m_total_loop as i64,
        backward_mtail: mtail as i64,
        backward_main,
        backward_tail,
        epsilon: p.epsilon,
        pdx_is_require: flag(p.outputs.dx),
        pdgamma_is_require: flag(p.outputs.dgamma),
        pdbeta_is_require: flag(p.outputs.dbeta),
    })
}
