//! Tensor descriptors consumed by the tiling planner.

use std::fmt;

/// Element type of a tensor taking part in LayerNorm backward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum DType {
    F32,
    F16,
    BF16,
}

impl DType {
    /// Size in bytes per element.
    pub const fn size_bytes(self) -> usize {
        match self {
            Self::F32 => std::mem::size_of::<f32>(),
            Self::F16 => std::mem::size_of::<half::f16>(),
            Self::BF16 => std::mem::size_of::<half::bf16>(),
        }
    }

    /// True for the 16-bit floating point formats.
    pub const fn is_half(self) -> bool {
        matches!(self, Self::F16 | Self::BF16)
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::F32 => "float32",
            Self::F16 => "float16",
            Self::BF16 => "bfloat16",
        };
        f.write_str(name)
    }
}

/// Shape + dtype of one operator input or output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TensorDesc {
    pub shape: Vec<i64>,
    pub dtype: DType,
}

impl TensorDesc {
    pub fn new(shape: impl Into<Vec<i64>>, dtype: DType) -> Self {
        TensorDesc {
            shape: shape.into(),
            dtype,
        }
    }

    pub fn rank(&self) -> usize {
        self.shape.len()
    }
}

/// Which gradients the graph actually consumes.
///
/// Any combination may be off; each flag independently removes that output's
/// compute path from the generated kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OutputMask {
    pub dx: bool,
    pub dgamma: bool,
    pub dbeta: bool,
}

impl OutputMask {
    pub const ALL: OutputMask = OutputMask {
        dx: true,
        dgamma: true,
        dbeta: true,
    };
}

impl Default for OutputMask {
    fn default() -> Self {
        Self::ALL
    }
}

/// Full descriptor set of a LayerNorm backward invocation.
///
/// Inputs: `dy` (gradOutput), `x` (forward input), `variance`, `mean`, `gamma`.
/// Outputs: `dx`, `dgamma`, `dbeta`.
#[derive(Debug, Clone, PartialEq)]
pub struct LayerNormGradDesc {
    pub dy: TensorDesc,
    pub x: TensorDesc,
    pub variance: TensorDesc,
    pub mean: TensorDesc,
    pub gamma: TensorDesc,
    pub dx: TensorDesc,
    pub dgamma: TensorDesc,
    pub dbeta: TensorDesc,
    pub outputs: OutputMask,
}

impl LayerNormGradDesc {
    /// Build a consistent descriptor set from the input shape and the number
    /// of trailing (normalized) axes.
    ///
    /// Statistics are shaped like `x` with the normalized axes set to 1; the
    /// gradients take the dtype of `gamma`.
    pub fn from_shape(shape: &[i64], normalized_axes: usize, dtype: DType, gamma_dtype: DType) -> Self {
        let split = shape.len().saturating_sub(normalized_axes);
        let gamma_shape = shape[split..].to_vec();
        let mut stat_shape = shape[..split].to_vec();
        stat_shape.extend(std::iter::repeat(1).take(shape.len() - split));

        LayerNormGradDesc {
            dy: TensorDesc::new(shape, dtype),
            x: TensorDesc::new(shape, dtype),
            variance: TensorDesc::new(stat_shape.clone(), DType::F32),
            mean: TensorDesc::new(stat_shape, DType::F32),
            gamma: TensorDesc::new(gamma_shape.clone(), gamma_dtype),
            dx: TensorDesc::new(shape, dtype),
            dgamma: TensorDesc::new(gamma_shape.clone(), gamma_dtype),
            dbeta: TensorDesc::new(gamma_shape, gamma_dtype),
            outputs: OutputMask::ALL,
        }
    }

    pub fn with_outputs(mut self, outputs: OutputMask) -> Self {
        self.outputs = outputs;
        self
    }
}
