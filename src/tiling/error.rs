//! Tiling failures and how callers should treat them.

use std::fmt;

use thiserror::Error;

use crate::tiling::strategy::StrategyKind;

/// On-chip resource whose budget a strategy checks before committing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resource {
    /// Per-core unified buffer, in bytes.
    UnifiedBuffer,
    /// Scratch slots shared by the intra-core and cross-core folds.
    CacheSlots,
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resource::UnifiedBuffer => f.write_str("UB bytes"),
            Resource::CacheSlots => f.write_str("cache slots"),
        }
    }
}

/// Why one registered strategy was skipped for a problem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    pub kind: StrategyKind,
    pub reason: String,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.reason)
    }
}

struct RejectionList<'a>(&'a [Rejection]);

impl fmt::Display for RejectionList<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, r) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{r}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum TilingError {
    #[error("shape mismatch: {0}")]
    ShapeMismatch(String),
    #[error("invalid dtype: {0}")]
    DtypeInvalid(String),
    #[error("{kind} not capable: {reason}")]
    NotCapable { kind: StrategyKind, reason: String },
    #[error("{kind} exceeds {resource} budget: need {needed}, available {available}")]
    BudgetExceeded {
        kind: StrategyKind,
        resource: Resource,
        needed: u64,
        available: u64,
    },
    #[error("{kind} passed its capability gate but tiling failed: {source}")]
    StrategyFailed {
        kind: StrategyKind,
        #[source]
        source: Box<TilingError>,
    },
    #[error("no tiling strategy accepts row={row} col={col} [{}]", RejectionList(.rejections))]
    NoCapableStrategy {
        row: u64,
        col: u64,
        rejections: Vec<Rejection>,
    },
    #[error("invalid platform info: {0}")]
    InvalidPlatform(String),
    #[error("tiling data needs {needed} bytes but the buffer holds {capacity}")]
    BufferTooSmall { needed: usize, capacity: usize },
}

pub type TilingResult<T> = Result<T, TilingError>;

impl TilingError {
    /// Expected outcome meaning "this strategy does not fit this problem".
    pub fn is_not_capable(&self) -> bool {
        match self {
            TilingError::NotCapable { .. } | TilingError::BudgetExceeded { .. } => true,
            TilingError::StrategyFailed { source, .. } => source.is_not_capable(),
            _ => false,
        }
    }

    /// Calling-contract violation; the current operation must abort.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            TilingError::InvalidPlatform(_) | TilingError::BufferTooSmall { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        let budget = TilingError::BudgetExceeded {
            kind: StrategyKind::GroupedReduceBigM,
            resource: Resource::UnifiedBuffer,
            needed: 10,
            available: 9,
        };
        assert!(budget.is_not_capable());
        assert!(!budget.is_fatal());

        let wrapped = TilingError::StrategyFailed {
            kind: StrategyKind::GroupedReduceBigM,
            source: Box::new(budget),
        };
        assert!(wrapped.is_not_capable());

        let fatal = TilingError::BufferTooSmall { needed: 8, capacity: 4 };
        assert!(fatal.is_fatal());
        assert!(!fatal.is_not_capable());
        assert!(!TilingError::ShapeMismatch("x".into()).is_not_capable());
    }

    #[test]
    fn test_no_capable_strategy_lists_every_rejection() {
        let err = TilingError::NoCapableStrategy {
            row: 7,
            col: 9,
            rejections: vec![
                Rejection {
                    kind: StrategyKind::GroupedReduceBigM,
                    reason: "row 7 <= 4096".into(),
                },
                Rejection {
                    kind: StrategyKind::Recompute,
                    reason: "row does not fit UB".into(),
                },
            ],
        };
        let msg = err.to_string();
        assert!(msg.contains("row=7 col=9"));
        assert!(msg.contains("GroupedReduceBigM: row 7 <= 4096"));
        assert!(msg.contains("; Recompute: row does not fit UB"));
    }
}
