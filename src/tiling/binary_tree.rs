//! Sizing of the two-phase pairwise-fold reduction schedule.
//!
//! A reduction over `total` tiles first folds the tiles beyond the nearest
//! power of two onto the leading ones, then reduces the remaining
//! power-of-two "basic block" as a balanced binary tree. Partial sums of the
//! tree live in scratch slots addressed by [`get_cache_id`]; a tree over
//! `2^k` blocks needs `k + 1` slots.

/// Largest power of two strictly below `value`, special-cased for tiny counts.
///
/// Returns 0 for `value <= 1`, 1 for `value <= 2`, 2 for `value <= 4`.
#[inline]
pub fn find_nearest_power2(value: u64) -> u64 {
    match value {
        0 | 1 => 0,
        2 => 1,
        3 | 4 => 2,
        _ => {
            let pow = 63 - (value - 1).leading_zeros();
            1u64 << pow
        }
    }
}

/// Scratch slot holding the partial result after folding block `idx`.
#[inline]
pub fn get_cache_id(idx: u64) -> u64 {
    u64::from((idx ^ (idx + 1)).count_ones()) - 1
}

/// Number of significant bits in `value` (0 for 0).
#[inline]
pub fn bit_length(value: u64) -> u64 {
    u64::from(64 - value.leading_zeros())
}

#[inline]
pub fn ceil_div(a: u64, b: u64) -> u64 {
    if b == 0 {
        0
    } else {
        a.div_ceil(b)
    }
}

/// Rounds up to a multiple of `align`, saturating at `u64::MAX`.
#[inline]
pub fn ceil_align(a: u64, align: u64) -> u64 {
    ceil_div(a, align).saturating_mul(align)
}

/// Fold schedule of one reduction loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BinaryTreeSizing {
    /// Blocks reduced by the balanced tree.
    pub basic_block_loop: u64,
    /// Full-width blocks folded onto the basic block before the tree runs.
    /// A partial tail tile, if any, is folded at this index.
    pub main_fold_count: u64,
    /// Scratch slots the tree touches (bit length of `basic_block_loop`).
    pub cache_buffer_count: u64,
    /// Slot holding the final result.
    pub result_cache_id: u64,
}

impl BinaryTreeSizing {
    /// Size the schedule for `total_loops` tiles of which `full_loops` are full width.
    ///
    /// Without a tail tile (`full_loops == total_loops`) the fold count is
    /// `total_loops - basic_block_loop`.
    pub fn new(full_loops: u64, total_loops: u64) -> Self {
        debug_assert!(full_loops <= total_loops);
        let basic_block_loop = find_nearest_power2(total_loops);
        let (cache_buffer_count, result_cache_id) = if basic_block_loop == 0 {
            (0, 0)
        } else {
            (bit_length(basic_block_loop), get_cache_id(basic_block_loop - 1))
        };
        BinaryTreeSizing {
            basic_block_loop,
            main_fold_count: full_loops.saturating_sub(basic_block_loop),
            cache_buffer_count,
            result_cache_id,
        }
    }

    /// Slots to reserve in UB; one slot stays reserved when no fold is needed.
    #[inline]
    pub fn reserved_cache_buffers(&self) -> u64 {
        self.cache_buffer_count.max(1)
    }
}
