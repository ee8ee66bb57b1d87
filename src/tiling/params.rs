//! Shape/dtype resolution: from tensor descriptors to the `(row, col)` problem.

use crate::config::TilingConfig;
use crate::dispatch::PlatformInfo;
use crate::tiling::binary_tree::ceil_align;
use crate::tiling::error::{TilingError, TilingResult};
use crate::types::{DType, LayerNormGradDesc, OutputMask, TensorDesc};

/// Highest tensor rank accepted for `dy`.
pub const MAX_DIM_NUM: usize = 8;

const EPSILON_FP32: f32 = 1e-12;
const EPSILON_HALF: f32 = 1e-5;

/// `col_align` granularity in elements.
const COL_ALIGN_FP32: u64 = 8;
const COL_ALIGN_HALF: u64 = 16;

/// Legal (input dtype, gamma dtype) combinations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DtypeKey {
    Fp32Fp32 = 1,
    Fp16Fp16 = 2,
    Bf16Bf16 = 3,
    Fp16Fp32 = 4,
    Bf16Fp32 = 5,
}

impl DtypeKey {
    pub fn from_dtypes(input: DType, gamma: DType) -> TilingResult<Self> {
        match (input, gamma) {
            (DType::F32, DType::F32) => Ok(DtypeKey::Fp32Fp32),
            (DType::F16, DType::F16) => Ok(DtypeKey::Fp16Fp16),
            (DType::BF16, DType::BF16) => Ok(DtypeKey::Bf16Bf16),
            (DType::F16, DType::F32) => Ok(DtypeKey::Fp16Fp32),
            (DType::BF16, DType::F32) => Ok(DtypeKey::Bf16Fp32),
            (input, gamma) => Err(TilingError::DtypeInvalid(format!(
                "unsupported input/gamma combination {input}/{gamma}"
            ))),
        }
    }

    #[inline]
    pub fn value(self) -> u64 {
        self as u64
    }
}

/// Everything a strategy needs to plan one invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct ProblemParams {
    /// Product of the leading (non-normalized) axes.
    pub row_size: u64,
    /// Product of the trailing axes covered by gamma.
    pub col_size: u64,
    /// `col_size` aligned to one block of the input dtype.
    pub col_align: u64,
    pub core_num: u32,
    pub ub_size_platform: u64,
    pub block_size: u64,
    pub vl_fp32: u64,
    pub is_reg_base: bool,
    pub dy_dtype: DType,
    pub x_dtype: DType,
    pub stat_dtype: DType,
    pub gamma_dtype: DType,
    pub dtype_key: DtypeKey,
    pub epsilon: f32,
    pub outputs: OutputMask,
    pub deterministic: bool,
}

impl ProblemParams {
    /// Validate the descriptor set and fuse it into a `(row, col)` problem.
    pub fn resolve(
        desc: &LayerNormGradDesc,
        platform: &PlatformInfo,
        config: &TilingConfig,
    ) -> TilingResult<Self> {
        platform.validate()?;
        check_shapes(desc)?;
        let dtype_key = check_dtypes(desc)?;

        let gamma_rank = desc.gamma.rank();
        let split = desc.dy.rank() - gamma_rank;
        let row_size = checked_product(&desc.dy.shape[..split])?;
        let col_size = checked_product(&desc.dy.shape[split..])?;
        // Tiling records carry sizes as i64.
        match row_size.checked_mul(col_size) {
            Some(elems) if elems <= i64::MAX as u64 => {}
            _ => {
                return Err(TilingError::ShapeMismatch(format!(
                    "{:?} has more than {} elements",
                    desc.dy.shape,
                    i64::MAX
                )))
            }
        }

        let (col_align, epsilon) = if desc.dy.dtype.is_half() {
            (ceil_align(col_size, COL_ALIGN_HALF), EPSILON_HALF)
        } else {
            (ceil_align(col_size, COL_ALIGN_FP32), EPSILON_FP32)
        };

        log::debug!(
            "layer_norm_grad: dy={:?} -> row={} col={} col_align={} dtype_key={:?}",
            desc.dy.shape,
            row_size,
            col_size,
            col_align,
            dtype_key
        );

        Ok(ProblemParams {
            row_size,
            col_size,
            col_align,
            core_num: platform.core_num,
            ub_size_platform: platform.ub_size,
            block_size: platform.block_size,
            vl_fp32: platform.vl_fp32,
            is_reg_base: platform.is_reg_base,
            dy_dtype: desc.dy.dtype,
            x_dtype: desc.x.dtype,
            stat_dtype: desc.mean.dtype,
            gamma_dtype: desc.gamma.dtype,
            dtype_key,
            epsilon,
            outputs: desc.outputs,
            deterministic: config.deterministic,
        })
    }
}

fn checked_product(dims: &[i64]) -> TilingResult<u64> {
    dims.iter().try_fold(1u64, |acc, &d| {
        acc.checked_mul(d as u64)
            .ok_or_else(|| TilingError::ShapeMismatch(format!("{dims:?} overflows u64")))
    })
}

fn same_shape(a: &TensorDesc, b: &TensorDesc, a_name: &str, b_name: &str) -> TilingResult<()> {
    if a.shape != b.shape {
        return Err(TilingError::ShapeMismatch(format!(
            "{a_name} {:?} != {b_name} {:?}",
            a.shape, b.shape
        )));
    }
    Ok(())
}

fn check_shapes(desc: &LayerNormGradDesc) -> TilingResult<()> {
    same_shape(&desc.dy, &desc.x, "dy", "x")?;
    same_shape(&desc.dy, &desc.dx, "dy", "dx")?;
    same_shape(&desc.variance, &desc.mean, "variance", "mean")?;
    same_shape(&desc.gamma, &desc.dgamma, "gamma", "dgamma")?;
    same_shape(&desc.gamma, &desc.dbeta, "gamma", "dbeta")?;

    let dy_rank = desc.dy.rank();
    let gamma_rank = desc.gamma.rank();
    if dy_rank > MAX_DIM_NUM {
        return Err(TilingError::ShapeMismatch(format!(
            "dy rank {dy_rank} exceeds {MAX_DIM_NUM}"
        )));
    }
    if gamma_rank == 0 || dy_rank < gamma_rank {
        return Err(TilingError::ShapeMismatch(format!(
            "gamma rank {gamma_rank} must be in 1..={dy_rank}"
        )));
    }
    if let Some((axis, &dim)) = desc.dy.shape.iter().enumerate().find(|&(_, &d)| d <= 0) {
        return Err(TilingError::ShapeMismatch(format!(
            "dy axis {axis} has size {dim}, expected > 0"
        )));
    }

    let split = dy_rank - gamma_rank;
    let trailing = &desc.dy.shape[split..];
    if trailing != desc.gamma.shape.as_slice() {
        return Err(TilingError::ShapeMismatch(format!(
            "trailing axes of dy {trailing:?} != gamma {:?}",
            desc.gamma.shape
        )));
    }
    Ok(())
}

fn check_dtypes(desc: &LayerNormGradDesc) -> TilingResult<DtypeKey> {
    let dy = desc.dy.dtype;
    if desc.x.dtype != dy {
        return Err(TilingError::DtypeInvalid(format!("x {} != dy {dy}", desc.x.dtype)));
    }
    for (name, t) in [("variance", &desc.variance), ("mean", &desc.mean)] {
        if t.dtype != DType::F32 {
            return Err(TilingError::DtypeInvalid(format!(
                "{name} must be float32, got {}",
                t.dtype
            )));
        }
    }

    let gamma = desc.gamma.dtype;
    if gamma != dy && gamma != DType::F32 {
        return Err(TilingError::DtypeInvalid(format!(
            "gamma {gamma} must match dy {dy} or be float32"
        )));
    }

    let outputs = desc.outputs;
    if outputs.dx && desc.dx.dtype != dy {
        return Err(TilingError::DtypeInvalid(format!("dx {} != dy {dy}", desc.dx.dtype)));
    }
    for (required, name, t) in [
        (outputs.dgamma, "dgamma", &desc.dgamma),
        (outputs.dbeta, "dbeta", &desc.dbeta),
    ] {
        if required && t.dtype != gamma && t.dtype != DType::F32 {
            return Err(TilingError::DtypeInvalid(format!(
                "{name} {} must match gamma {gamma} or be float32",
                t.dtype
            )));
        }
    }
    if outputs.dgamma && outputs.dbeta && desc.dgamma.dtype != desc.dbeta.dtype {
        return Err(TilingError::DtypeInvalid(format!(
            "dgamma {} != dbeta {}",
            desc.dgamma.dtype, desc.dbeta.dtype
        )));
    }

    DtypeKey::from_dtypes(dy, gamma)
}
