//! Device workspace needed by each template.

use crate::tiling::params::ProblemParams;
use crate::tiling::strategy::TilingData;

/// Workspace bytes for `data`, including the fixed `reserve`; saturates at
/// `u64::MAX`.
///
/// Row-partitioned templates stage one fp32 dgamma and one dbeta partial row
/// per core. BigN instead stages the two partial column sums of the dx
/// reduction per row and core, plus the combined sum.
pub fn workspace_size(params: &ProblemParams, data: &TilingData, reserve: u64) -> u64 {
    const FP32: u64 = 4;
    let scratch = match data {
        TilingData::Recompute(_) | TilingData::GroupedReduceBigM(_) => u64::from(params.core_num)
            .saturating_mul(params.col_size)
            .saturating_mul(2 * FP32),
        TilingData::GroupedReduceBigN(d) => {
            let row = params.row_size;
            (d.backward_block_dim as u64)
                .saturating_mul(2)
                .saturating_mul(row)
                .saturating_add(row)
                .saturating_mul(FP32)
        }
    };
    scratch.saturating_add(reserve)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{TilingConfig, DEFAULT_WORKSPACE_SIZE};
    use crate::dispatch::PlatformInfo;
    use crate::tiling::registry::TemplateRegistry;
    use crate::tiling::strategy::recompute;
    use crate::types::{DType, LayerNormGradDesc};

    fn plan(shape: &[i64], platform: PlatformInfo) -> (ProblemParams, TilingData) {
        let desc = LayerNormGradDesc::from_shape(shape, 1, DType::F32, DType::F32);
        let p = ProblemParams::resolve(&desc, &platform, &TilingConfig::default()).unwrap();
        let data = TemplateRegistry::default().select_and_tile(&p).unwrap();
        (p, data)
    }

    #[test]
    fn test_row_partitioned_workspace() {
        let platform = PlatformInfo::new(32, 248 * 1024, 32, 64);
        let desc = LayerNormGradDesc::from_shape(&[64, 1024], 1, DType::F32, DType::F32);
        let p = ProblemParams::resolve(&desc, &platform, &TilingConfig::default()).unwrap();
        let expected = 32 * 1024 * 2 * 4 + DEFAULT_WORKSPACE_SIZE;

        let data = TilingData::Recompute(recompute::do_tiling(&p).unwrap());
        assert_eq!(workspace_size(&p, &data, DEFAULT_WORKSPACE_SIZE), expected);
        let data = TilingData::GroupedReduceBigM(bytemuck::Zeroable::zeroed());
        assert_eq!(workspace_size(&p, &data, DEFAULT_WORKSPACE_SIZE), expected);
    }

    #[test]
    fn test_workspace_saturates() {
        let desc = LayerNormGradDesc::from_shape(&[1, 1 << 61], 1, DType::F32, DType::F32);
        let p = ProblemParams::resolve(&desc, &PlatformInfo::default(), &TilingConfig::default()).unwrap();
        let data = TilingData::GroupedReduceBigM(bytemuck::Zeroable::zeroed());
        assert_eq!(workspace_size(&p, &data, DEFAULT_WORKSPACE_SIZE), u64::MAX);
    }

    #[test]
    fn test_big_n_workspace() {
        let (p, data) = plan(&[100, 5000], PlatformInfo::default());
        // backward block dim 64
        assert_eq!(workspace_size(&p, &data, 0), (2 * 64 * 100 + 100) * 4);
    }
}
