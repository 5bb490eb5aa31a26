//! Timestamp-partitioned indices for range-filtered k-NN.
//!
//! # The Problem
//!
//! "k nearest neighbors of `q` with timestamp in `[t0, t1]`" is a filtered
//! search. Post-filtering a plain graph search fails for narrow ranges (few
//! results survive the filter) and brute force is wasteful for wide ones.
//!
//! # Architecture
//!
//! ```text
//!                      root [0, n)          graph + exhaustive
//!                     /           \
//!          [0, n/2)                  [n/2, n)   split_timestamp = ts[n/2]
//!          /      \                  /      \
//!        ...      ...              ...      ...   (until size < 2 * min_size)
//! ```
//!
//! Points are sorted by timestamp once; every node covers a contiguous range of
//! that order and owns a Vamana graph plus an exhaustive index over it. The
//! planner decomposes a query range over the tree and, per query, picks:
//!
//! | Range width `t1 - t0` | Strategy | Recall |
//! |------------------------|----------|--------|
//! | `< exhaustive_fallback_cutoff` | exhaustive scan | exact |
//! | otherwise | graph over-retrieval + filter | approximate |
//!
//! Width is used as the selectivity estimate, which assumes timestamps are
//! roughly uniform on `[0, 1]`.

mod planner;
mod tree;

pub use planner::{
    choose_strategy, over_retrieval_params, widened_limit, PlannedNode, QueryPlan,
    RangeSearchOutcome, Strategy,
};
pub use tree::{PartitionNode, PartitionTree};

use crate::error::{Result, RetrieveError};
use crate::vamana::{BuildParams, QueryParams};
use serde::{Deserialize, Serialize};

/// Default selectivity below which range queries scan exhaustively.
pub const DEFAULT_EXHAUSTIVE_FALLBACK_CUTOFF: f32 = 0.25;

/// Default minimum leaf size; nodes with at least twice this many points split.
pub const DEFAULT_MIN_SIZE: usize = 10_000;

/// Build and query configuration for a [`PartitionTree`].
///
/// The tree keeps the configuration it was built with and uses it for every
/// query; the `*_with` query methods take an override.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TemporalConfig {
    /// Graph construction parameters for every node.
    pub build: BuildParams,
    /// Default query parameters.
    pub query: QueryParams,
    /// Range widths below this use the exhaustive index.
    pub exhaustive_fallback_cutoff: f32,
    /// Minimum leaf size.
    pub min_size: usize,
}

impl Default for TemporalConfig {
    fn default() -> Self {
        Self {
            build: BuildParams::default(),
            query: QueryParams::default(),
            exhaustive_fallback_cutoff: DEFAULT_EXHAUSTIVE_FALLBACK_CUTOFF,
            min_size: DEFAULT_MIN_SIZE,
        }
    }
}

impl TemporalConfig {
    /// Smaller graphs and beams; for tests and quick experiments.
    pub fn fast() -> Self {
        Self {
            build: BuildParams::fast(),
            query: QueryParams {
                beam_size: 100,
                ..QueryParams::default()
            },
            ..Default::default()
        }
    }

    pub fn with_min_size(mut self, min_size: usize) -> Self {
        self.min_size = min_size;
        self
    }

    pub fn with_cutoff(mut self, cutoff: f32) -> Self {
        self.exhaustive_fallback_cutoff = cutoff;
        self
    }

    /// Parse from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| RetrieveError::InvalidParameter(format!("config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.build.validate()?;
        self.query.validate()?;
        if !(0.0..=1.0).contains(&self.exhaustive_fallback_cutoff) {
            return Err(RetrieveError::InvalidParameter(format!(
                "exhaustive_fallback_cutoff must be in [0, 1], got {}",
                self.exhaustive_fallback_cutoff
            )));
        }
        if self.min_size == 0 {
            return Err(RetrieveError::InvalidParameter(
                "min_size must be at least 1".into(),
            ));
        }
        Ok(())
    }
}
