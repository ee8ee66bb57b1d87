//! Ordered table of tiling templates and the selection loop over it.

use std::fmt;

use crate::tiling::error::{Rejection, TilingError, TilingResult};
use crate::tiling::params::ProblemParams;
use crate::tiling::strategy::{
    grouped_reduce_big_m, grouped_reduce_big_n, recompute, StrategyKind, TilingData,
};

pub type GateFn = fn(&ProblemParams) -> bool;
pub type ReasonFn = fn(&ProblemParams) -> String;
pub type TilingFn = fn(&ProblemParams) -> TilingResult<TilingData>;

/// One registered template.
#[derive(Clone, Copy)]
pub struct TemplateEntry {
    pub kind: StrategyKind,
    /// Higher runs first.
    pub priority: u32,
    pub is_capable: GateFn,
    pub reject_reason: ReasonFn,
    pub tiling: TilingFn,
}

impl fmt::Debug for TemplateEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TemplateEntry")
            .field("kind", &self.kind)
            .field("priority", &self.priority)
            .finish_non_exhaustive()
    }
}

fn tile_big_m(p: &ProblemParams) -> TilingResult<TilingData> {
    grouped_reduce_big_m::do_tiling(p).map(TilingData::GroupedReduceBigM)
}

fn tile_big_n(p: &ProblemParams) -> TilingResult<TilingData> {
    grouped_reduce_big_n::do_tiling(p).map(TilingData::GroupedReduceBigN)
}

fn tile_recompute(p: &ProblemParams) -> TilingResult<TilingData> {
    recompute::do_tiling(p).map(TilingData::Recompute)
}

/// Templates sorted by descending priority; built once, read-only afterwards.
#[derive(Debug, Clone)]
pub struct TemplateRegistry {
    entries: Vec<TemplateEntry>,
}

impl TemplateRegistry {
    /// Registry over `entries`. Ties keep registration order.
    pub fn new(mut entries: Vec<TemplateEntry>) -> Self {
        entries.sort_by(|a, b| b.priority.cmp(&a.priority));
        TemplateRegistry { entries }
    }

    /// The LayerNorm backward templates.
    pub fn layer_norm_grad() -> Self {
        Self::new(vec![
            TemplateEntry {
                kind: StrategyKind::GroupedReduceBigM,
                priority: 3000,
                is_capable: grouped_reduce_big_m::is_capable,
                reject_reason: grouped_reduce_big_m::reject_reason,
                tiling: tile_big_m,
            },
            TemplateEntry {
                kind: StrategyKind::GroupedReduceBigN,
                priority: 2000,
                is_capable: grouped_reduce_big_n::is_capable,
                reject_reason: grouped_reduce_big_n::reject_reason,
                tiling: tile_big_n,
            },
            TemplateEntry {
                kind: StrategyKind::Recompute,
                priority: 1000,
                is_capable: recompute::is_capable,
                reject_reason: recompute::reject_reason,
                tiling: tile_recompute,
            },
        ])
    }

    pub fn entries(&self) -> &[TemplateEntry] {
        &self.entries
    }

    /// First template whose gate accepts `params`, or every rejection.
    pub fn select(&self, params: &ProblemParams) -> Result<&TemplateEntry, Vec<Rejection>> {
        let mut rejections = Vec::with_capacity(self.entries.len());
        for entry in &self.entries {
            if (entry.is_capable)(params) {
                return Ok(entry);
            }
            rejections.push(Rejection {
                kind: entry.kind,
                reason: (entry.reject_reason)(params),
            });
        }
        Err(rejections)
    }

    /// Select a template and run its tiling.
    ///
    /// Once a gate accepts, that template's result is final: a tiling failure
    /// is reported as `StrategyFailed` and lower-priority templates are not
    /// tried.
    pub fn select_and_tile(&self, params: &ProblemParams) -> TilingResult<TilingData> {
        let entry = match self.select(params) {
            Ok(entry) => entry,
            Err(rejections) => {
                let err = TilingError::NoCapableStrategy {
                    row: params.row_size,
                    col: params.col_size,
                    rejections,
                };
                log::warn!("layer_norm_grad: {err}");
                return Err(err);
            }
        };

        log::debug!(
            "layer_norm_grad: row={} col={} -> {} (priority {})",
            params.row_size,
            params.col_size,
            entry.kind,
            entry.priority
        );
        (entry.tiling)(params).map_err(|source| TilingError::StrategyFailed {
            kind: entry.kind,
            source: Box::new(source),
        })
    }
}

impl Default for TemplateRegistry {
    fn default() -> Self {
        Self::layer_norm_grad()
    }
}
