//! Final tiling result handed to the kernel launcher.

use std::fmt;

use crate::tiling::error::{TilingError, TilingResult};
use crate::tiling::params::DtypeKey;
use crate::tiling::strategy::{StrategyKind, TilingData};

/// How the launcher schedules the blocks of one invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScheduleMode {
    /// All blocks are launched together and may synchronize with each other.
    Batch,
}

impl ScheduleMode {
    /// Numeric mode understood by the launcher.
    pub const fn value(self) -> u32 {
        match self {
            ScheduleMode::Batch => 1,
        }
    }
}

/// `template_id * 100 + deterministic * 10 + dtype_key`.
pub fn tiling_key(kind: StrategyKind, deterministic: bool, dtype_key: DtypeKey) -> u64 {
    kind.template_id() * 100 + u64::from(deterministic) * 10 + dtype_key.value()
}

#[derive(Debug, Clone, PartialEq)]
pub struct TilingOutput {
    pub kind: StrategyKind,
    pub tiling_key: u64,
    pub block_dim: u32,
    pub schedule_mode: ScheduleMode,
    pub workspace_size: u64,
    pub data: TilingData,
}

impl TilingOutput {
    /// Serialized record, field order.
    pub fn tiling_data(&self) -> &[u8] {
        self.data.as_bytes()
    }

    /// Copy the serialized record into `buf`, returning the bytes written.
    pub fn write_tiling_data(&self, buf: &mut [u8]) -> TilingResult<usize> {
        let bytes = self.data.as_bytes();
        if bytes.len() > buf.len() {
            return Err(TilingError::BufferTooSmall {
                needed: bytes.len(),
                capacity: buf.len(),
            });
        }
        buf[..bytes.len()].copy_from_slice(bytes);
        Ok(bytes.len())
    }
}

impl fmt::Display for TilingOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} key={} block_dim={} workspace={}B data={}B",
            self.kind,
            self.tiling_key,
            self.block_dim,
            self.workspace_size,
            self.data.as_bytes().len()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tiling_key_layout() {
        assert_eq!(tiling_key(StrategyKind::GroupedReduceBigM, false, DtypeKey::Fp32Fp32), 601);
        assert_eq!(tiling_key(StrategyKind::GroupedReduceBigM, true, DtypeKey::Bf16Fp32), 615);
        assert_eq!(tiling_key(StrategyKind::GroupedReduceBigN, false, DtypeKey::Fp16Fp16), 702);
        assert_eq!(tiling_key(StrategyKind::Recompute, true, DtypeKey::Bf16Bf16), 513);
    }

    #[test]
    fn test_write_tiling_data_bounds() {
        let data = TilingData::GroupedReduceBigM(bytemuck::Zeroable::zeroed());
        let out = TilingOutput {
            kind: data.kind(),
            tiling_key: 601,
            block_dim: 1,
            schedule_mode: ScheduleMode::Batch,
            workspace_size: 0,
            data,
        };
        let len = out.tiling_data().len();

        let mut exact = vec![0xffu8; len];
        assert_eq!(out.write_tiling_data(&mut exact).unwrap(), len);
        assert!(exact.iter().all(|&b| b == 0));

        let mut short = vec![0u8; len - 1];
        let err = out.write_tiling_data(&mut short).unwrap_err();
        assert!(err.is_fatal());
        assert!(matches!(
            err,
            TilingError::BufferTooSmall { needed, capacity } if needed == len && capacity == len - 1
        ));
    }
}
