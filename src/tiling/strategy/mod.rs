//! Tiling strategies for LayerNorm backward.
//!
//! Each strategy is a capability gate plus a tiling computation producing
//! its own fixed-layout record. The set is closed: [`StrategyKind`] names the
//! variants and [`TilingData`] carries the matching record.

pub mod grouped_reduce_big_m;
pub mod grouped_reduce_big_n;
pub mod recompute;

use std::fmt;

use crate::tiling::binary_tree::{ceil_div, BinaryTreeSizing};

pub use grouped_reduce_big_m::GroupedReduceBigMTilingData;
pub use grouped_reduce_big_n::GroupedReduceBigNTilingData;
pub use recompute::RecomputeTilingData;

/// Tiling template implemented by the kernel side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StrategyKind {
    Recompute,
    GroupedReduceBigM,
    GroupedReduceBigN,
}

impl StrategyKind {
    /// Template id encoded in the hundreds digit of the tiling key.
    pub const fn template_id(self) -> u64 {
        match self {
            StrategyKind::Recompute => 5,
            StrategyKind::GroupedReduceBigM => 6,
            StrategyKind::GroupedReduceBigN => 7,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            StrategyKind::Recompute => "Recompute",
            StrategyKind::GroupedReduceBigM => "GroupedReduceBigM",
            StrategyKind::GroupedReduceBigN => "GroupedReduceBigN",
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Per-core loop and fold schedule along the reduced axis.
///
/// `to_process` elements are walked in tiles of a fixed factor; the last tile
/// may be partial (`tail`). The tiles are then reduced with the pairwise-fold
/// schedule from [`BinaryTreeSizing`].
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct FoldTiling {
    pub to_process: i64,
    pub loop_count: i64,
    pub total_loop: i64,
    pub tail: i64,
    pub basic_block_loop: i64,
    pub main_fold_count: i64,
    /// Reserved scratch slots (at least one).
    pub cache_buffer_count: i64,
    pub result_cache_id: i64,
}

impl FoldTiling {
    pub fn new(to_process: u64, factor: u64) -> Self {
        let loop_count = to_process / factor;
        let total_loop = ceil_div(to_process, factor);
        let tail = to_process - loop_count * factor;
        let sizing = BinaryTreeSizing::new(loop_count, total_loop);
        FoldTiling {
            to_process: to_process as i64,
            loop_count: loop_count as i64,
            total_loop: total_loop as i64,
            tail: tail as i64,
            basic_block_loop: sizing.basic_block_loop as i64,
            main_fold_count: sizing.main_fold_count as i64,
            cache_buffer_count: sizing.reserved_cache_buffers() as i64,
            result_cache_id: sizing.result_cache_id as i64,
        }
    }
}

/// Record handed to the kernel side, one layout per strategy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TilingData {
    Recompute(RecomputeTilingData),
    GroupedReduceBigM(GroupedReduceBigMTilingData),
    GroupedReduceBigN(GroupedReduceBigNTilingData),
}

impl TilingData {
    pub fn kind(&self) -> StrategyKind {
        match self {
            TilingData::Recompute(_) => StrategyKind::Recompute,
            TilingData::GroupedReduceBigM(_) => StrategyKind::GroupedReduceBigM,
            TilingData::GroupedReduceBigN(_) => StrategyKind::GroupedReduceBigN,
        }
    }

    /// Packed bytes of the record in field order.
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            TilingData::Recompute(d) => bytemuck::bytes_of(d),
            TilingData::GroupedReduceBigM(d) => bytemuck::bytes_of(d),
            TilingData::GroupedReduceBigN(d) => bytemuck::bytes_of(d),
        }
    }

    /// Number of cores the kernel launches.
    pub fn block_dim(&self) -> u32 {
        let dim = match self {
            TilingData::Recompute(d) => d.block_dim,
            TilingData::GroupedReduceBigM(d) => d.gamma_beta_usable_blocks,
            TilingData::GroupedReduceBigN(d) => d.gamma_beta_block_dim.max(d.backward_block_dim),
        };
        dim as u32
    }
}

#[inline]
pub(crate) fn flag(b: bool) -> i32 {
    i32::from(b)
}

/// Factor rounded up to whole UB blocks, in fp32 elements.
#[inline]
pub(crate) fn block_aligned_fp32(factor: u64, block_size: u64) -> u64 {
    crate::tiling::binary_tree::ceil_align(factor * 4, block_size) / 4
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_template_ids() {
        assert_eq!(StrategyKind::Recompute.template_id(), 5);
        assert_eq!(StrategyKind::GroupedReduceBigM.template_id(), 6);
        assert_eq!(StrategyKind::GroupedReduceBigN.template_id(), 7);
    }

    #[test]
    fn test_fold_tiling_exact_tiles() {
        let f = FoldTiling::new(262_400, 64);
        assert_eq!(f.loop_count, 4100);
        assert_eq!(f.total_loop, 4100);
        assert_eq!(f.tail, 0);
        assert_eq!(f.basic_block_loop, 4096);
        assert_eq!(f.main_fold_count, 4);
        assert_eq!(f.cache_buffer_count, 13);
        assert_eq!(f.result_cache_id, 12);
    }

    #[test]
    fn test_fold_tiling_short_axis() {
        let f = FoldTiling::new(40, 64);
        assert_eq!(f.loop_count, 0);
        assert_eq!(f.total_loop, 1);
        assert_eq!(f.tail, 40);
        assert_eq!(f.basic_block_loop, 0);
        assert_eq!(f.main_fold_count, 0);
        assert_eq!(f.cache_buffer_count, 1);
    }

    #[test]
    fn test_block_aligned_fp32() {
        assert_eq!(block_aligned_fp32(64, 32), 64);
        assert_eq!(block_aligned_fp32(60, 32), 64);
        assert_eq!(block_aligned_fp32(60, 512), 128);
    }
}
