//! Property-based tests for the LayerNorm backward tiling planner.
//!
//! Uses proptest to verify invariants that must hold for all inputs:
//! - find_nearest_power2 bounds
//! - Fold schedule slot accounting
//! - Row / column distribution is exact and balanced
//! - Planning determinism

use proptest::prelude::*;

use norm_tiling::tiling::binary_tree::{bit_length, find_nearest_power2, BinaryTreeSizing};
use norm_tiling::tiling::strategy::{grouped_reduce_big_m, grouped_reduce_big_n, recompute};
use norm_tiling::{
    tile_layer_norm_grad, DType, LayerNormGradDesc, PlatformInfo, ProblemParams, TilingConfig,
};

fn resolve(shape: &[i64], dtype: DType, platform: &PlatformInfo) -> ProblemParams {
    let desc = LayerNormGradDesc::from_shape(shape, 1, dtype, dtype);
    ProblemParams::resolve(&desc, platform, &TilingConfig::default()).unwrap()
}

fn arb_dtype() -> impl Strategy<Value = DType> {
    prop_oneof![Just(DType::F32), Just(DType::F16), Just(DType::BF16)]
}

// ═══════════════════════════════════════════════════════════════════════
// 1. find_nearest_power2: largest power of two strictly below n
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn nearest_power2_small_values() {
    let table = [(0, 0), (1, 0), (2, 1), (3, 2), (4, 2), (5, 4), (8, 4), (9, 8), (17, 16)];
    for (n, expected) in table {
        assert_eq!(find_nearest_power2(n), expected, "n = {n}");
    }
}

proptest! {
    #[test]
    fn prop_nearest_power2_bounds(n in 5u64..(1u64 << 62)) {
        let p = find_nearest_power2(n);
        prop_assert!(p.is_power_of_two());
        prop_assert!(p < n);
        prop_assert!(2 * p >= n, "n = {}, p = {}", n, p);
    }
}

// ═══════════════════════════════════════════════════════════════════════
// 2. Fold schedule: slots match bit length, result slot is reserved
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn cache_slots_match_bit_length() {
    for l in [0u64, 1, 2, 3, 4, 5, 7, 8, 16, 17, 63, 64, 65] {
        let s = BinaryTreeSizing::new(l, l);
        assert_eq!(s.cache_buffer_count, bit_length(find_nearest_power2(l)), "L = {l}");
    }
}

proptest! {
    #[test]
    fn prop_fold_schedule_accounts_for_every_tile(full in 0u64..1_000_000, has_tail in any::<bool>()) {
        let total = full + u64::from(has_tail);
        let s = BinaryTreeSizing::new(full, total);
        prop_assert!(s.basic_block_loop <= total);
        prop_assert!(s.result_cache_id < s.reserved_cache_buffers());
        if total > 1 {
            // basic block plus folded full tiles plus the tail cover every tile
            prop_assert_eq!(
                s.basic_block_loop + s.main_fold_count + u64::from(has_tail),
                total
            );
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════
// 3. Row distribution across cores (big M)
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn big_m_row_distribution_table() {
    let pairs: [(i64, u32); 22] = [
        (4097, 1),
        (4097, 64),
        (4160, 64),
        (5000, 8),
        (8192, 64),
        (8193, 64),
        (10_000, 64),
        (10_000, 48),
        (12_345, 30),
        (65_536, 64),
        (65_537, 64),
        (100_000, 7),
        (100_003, 64),
        (262_144, 128),
        (500_000, 40),
        (1_000_000, 64),
        (1_048_577, 24),
        (3_000_001, 64),
        (4_194_304, 64),
        (7_777_777, 33),
        (16_793_600, 64),
        (16_793_601, 64),
    ];
    for (row, cores) in pairs {
        let platform = PlatformInfo::new(cores, 248 * 1024, 32, 64);
        let p = resolve(&[row, 64], DType::F32, &platform);
        let td = grouped_reduce_big_m::do_tiling(&p).unwrap();

        let usable = td.gamma_beta_usable_blocks;
        let per = td.gamma_beta_m_per_block;
        let rem = td.gamma_beta_m_reminder;
        assert!(usable <= i64::from(cores.min(64)), "row {row} cores {cores}");
        assert!(rem < usable);
        assert_eq!(rem * (per + 1) + (usable - rem) * per, row, "row {row} cores {cores}");
    }
}

proptest! {
    #[test]
    fn prop_big_m_rows_exact_and_balanced(row in 4097i64..4_000_000, cores in 1u32..=128) {
        let platform = PlatformInfo::new(cores, 248 * 1024, 32, 64);
        let p = resolve(&[row, 256], DType::F32, &platform);
        let td = grouped_reduce_big_m::do_tiling(&p).unwrap();

        let usable = td.gamma_beta_usable_blocks;
        prop_assert!(usable >= 1 && usable <= 64);
        prop_assert_eq!(td.main_block.to_process, td.tail_block.to_process + 1);
        prop_assert_eq!(
            td.gamma_beta_m_reminder * td.main_block.to_process
                + (usable - td.gamma_beta_m_reminder) * td.tail_block.to_process,
            row
        );
        prop_assert!(td.main_block.cache_buffer_count >= td.stage2.basic_block_loop);
    }

    #[test]
    fn prop_recompute_rows_cover_problem(row in 1i64..200_000, col in 1i64..2048, cores in 1u32..=96) {
        let platform = PlatformInfo::new(cores, 248 * 1024, 32, 64).reg_base(false);
        let p = resolve(&[row, col], DType::F32, &platform);
        let td = recompute::do_tiling(&p).unwrap();

        prop_assert!(td.block_dim >= 1 && td.block_dim <= i64::from(cores));
        prop_assert!(td.row_tail_core >= 1 && td.row_tail_core <= td.row_per_core);
        prop_assert_eq!((td.block_dim - 1) * td.row_per_core + td.row_tail_core, row);
        prop_assert!(td.ub_row_factor >= 1 && td.ub_row_factor <= td.row_per_core);
        prop_assert_eq!(td.m_loop_main * td.ub_row_factor + td.m_tail_main, td.row_per_core);
    }

    #[test]
    fn prop_big_n_columns_cover_problem(row in 1i64..=4096, col in 528i64..200_000, cores in 1u32..=64) {
        let platform = PlatformInfo::new(cores, 248 * 1024, 32, 64);
        let p = resolve(&[row, col], DType::BF16, &platform);
        let td = grouped_reduce_big_n::do_tiling(&p).unwrap();

        let tail_n = col - (td.gamma_beta_block_dim - 1) * td.gamma_beta_main_block_factor;
        prop_assert!(tail_n >= 1 && tail_n <= td.gamma_beta_main_block_factor);
        prop_assert!(td.gamma_beta_block_dim <= i64::from(cores));

        prop_assert!(td.backward_block_dim >= 1 && td.backward_block_dim <= i64::from(cores));
        prop_assert_eq!(
            td.backward_n_rem * td.backward_main.to_process
                + (td.backward_block_dim - td.backward_n_rem) * td.backward_tail.to_process,
            col
        );
        prop_assert_eq!(
            (td.backward_m_total_loop - 1) * td.backward_mfactor + td.backward_mtail,
            row
        );
    }
}

// ═══════════════════════════════════════════════════════════════════════
// 4. Determinism: identical inputs give byte-identical records
// ═══════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn prop_planning_is_deterministic(
        row in 1i64..100_000,
        col in 1i64..8192,
        dtype in arb_dtype(),
        deterministic in any::<bool>(),
    ) {
        let desc = LayerNormGradDesc::from_shape(&[row, col], 1, dtype, DType::F32);
        let platform = PlatformInfo::default();
        let config = TilingConfig::default().deterministic(deterministic);

        let a = tile_layer_norm_grad(&desc, &platform, &config);
        let b = tile_layer_norm_grad(&desc, &platform, &config);
        match (a, b) {
            (Ok(a), Ok(b)) => {
                prop_assert_eq!(a.tiling_data(), b.tiling_data());
                prop_assert_eq!(a.tiling_key, b.tiling_key);
                prop_assert_eq!(a.workspace_size, b.workspace_size);
                prop_assert_eq!(a.tiling_key % 100 / 10, u64::from(deterministic));
            }
            (Err(a), Err(b)) => prop_assert_eq!(a.to_string(), b.to_string()),
            (a, b) => prop_assert!(false, "diverging results: {:?} vs {:?}", a, b),
        }
    }
}
