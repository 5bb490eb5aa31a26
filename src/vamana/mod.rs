//! Vamana graph engine with streaming deletes.
//!
//! Vamana (from DiskANN) builds a degree-bounded navigable graph using:
//! - Greedy (beam) search for candidate neighbors
//! - Robust (alpha) pruning for diversity
//! - Back edges, re-pruned when a node overflows its degree bound
//!
//! Every graph here is built over a [`Subset`](crate::points::Subset) and
//! addresses nodes by **local position** inside that subset. Callers map local
//! positions to global identities through the subset.
//!
//! # Key Parameters
//!
//! - `max_degree` (R): Maximum neighbors per node
//! - `build_beam_width` (L): Search width during construction
//! - `alpha`: Pruning factor (1.0 = plain RNG rule, >1.0 keeps long edges)
//!
//! # Deletes (FreshDiskANN)
//!
//! Deletion is split into a cheap marking step and an expensive repair step:
//!
//! ```text
//! lazy_delete ──► start_delete_epoch ──► consolidate ──► end_delete_epoch
//!   (tombstone)       (freeze set)        (rewire)         (free slots)
//! ```
//!
//! Tombstoned nodes stay traversable until the epoch closes, so searches that
//! started earlier keep walking a valid graph. After `end_delete_epoch` no
//! adjacency list refers to a freed slot and the slot can be inserted again.
//!
//! # References
//!
//! - Subramanya et al. (2019): "DiskANN: Fast Accurate Billion-point Nearest
//!   Neighbor Search on a Single Node"
//! - Singh et al. (2021): "FreshDiskANN: A Fast and Accurate Graph-Based ANN
//!   Index for Streaming Similarity Search"

mod index;
mod prune;
mod search;
mod stats;
mod tombstones;

pub use index::{ConsolidateStats, DeleteEpoch, VamanaIndex};
pub use prune::robust_prune;
pub use search::{beam_search, QueryParams, SearchOutcome};
pub use stats::{BuildStats, GraphStats};
pub use tombstones::{SlotState, TombstoneStats};

use crate::error::{Result, RetrieveError};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

/// Adjacency list of one graph node.
pub type Adjacency = SmallVec<[u32; 32]>;

/// Configuration for Vamana graph construction.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildParams {
    /// Maximum degree (R) - neighbors per node
    pub max_degree: usize,
    /// Build beam width (L) - search width during construction
    pub build_beam_width: usize,
    /// Alpha pruning factor
    pub alpha: f32,
    /// Number of construction passes. The first pass prunes with alpha = 1.0,
    /// the last with `alpha`.
    pub num_passes: usize,
    /// Largest insertion batch as a fraction of the graph size.
    pub max_batch_fraction: f32,
    /// Seed for the insertion order.
    pub seed: u64,
}

impl Default for BuildParams {
    fn default() -> Self {
        Self {
            max_degree: 64,
            build_beam_width: 500,
            alpha: 1.175,
            num_passes: 2,
            max_batch_fraction: 0.02,
            seed: 42,
        }
    }
}

impl BuildParams {
    /// `{R, L, alpha}` with the remaining fields at their defaults.
    pub fn new(max_degree: usize, build_beam_width: usize, alpha: f32) -> Self {
        Self {
            max_degree,
            build_beam_width,
            alpha,
            ..Default::default()
        }
    }

    /// Fast config (lower quality, faster build)
    pub fn fast() -> Self {
        Self {
            max_degree: 32,
            build_beam_width: 64,
            alpha: 1.175,
            num_passes: 1,
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_degree == 0 {
            return Err(RetrieveError::InvalidParameter(
                "max_degree must be at least 1".into(),
            ));
        }
        if self.build_beam_width == 0 {
            return Err(RetrieveError::InvalidParameter(
                "build_beam_width must be at least 1".into(),
            ));
        }
        if !(self.alpha >= 1.0) {
            return Err(RetrieveError::InvalidParameter(format!(
                "alpha must be >= 1.0, got {}",
                self.alpha
            )));
        }
        if self.num_passes == 0 {
            return Err(RetrieveError::InvalidParameter(
                "num_passes must be at least 1".into(),
            ));
        }
        if !(self.max_batch_fraction > 0.0 && self.max_batch_fraction <= 1.0) {
            return Err(RetrieveError::InvalidParameter(format!(
                "max_batch_fraction must be in (0, 1], got {}",
                self.max_batch_fraction
            )));
        }
        Ok(())
    }
}
