//! vicinity-temporal: range-filtered approximate nearest neighbor search.
//!
//! Answers "k nearest neighbors of `q` whose timestamp lies in `[t0, t1]`"
//! over a point set partitioned by time:
//!
//! - `temporal/`: the partition tree and the range planner
//! - `vamana/`: the per-node graph index (build, search, delete epochs)
//! - `exhaustive`: exact flat scan, used for narrow ranges
//! - `maintenance/`: batched delete / consolidate / re-insert cycles
//! - `points`: the shared, timestamp-sorted arena every index views
//!
//! # Critical Nuances
//!
//! ## Filtering Kills Graph Recall
//!
//! A graph search explores the neighborhood of the query regardless of
//! timestamps. When only 5% of points are in range, most of the frontier is
//! discarded by the filter. The planner therefore scans exhaustively below
//! `exhaustive_fallback_cutoff` and, above it, widens the frontier to the
//! whole beam and scales the expansion budget by `1 / width`.
//!
//! ## Width Is Not Selectivity
//!
//! `t1 - t0` estimates the fraction of points in range only when timestamps
//! are uniform on `[0, 1]`. Skewed timestamps make the strategy choice
//! suboptimal but never incorrect.
//!
//! ## Deleted Points Still Route
//!
//! Between `lazy_delete` and the end of the epoch, tombstoned nodes are still
//! traversed by searches (they keep the graph connected) but never returned.
//!
//! # Example
//!
//! ```rust,ignore
//! use vicinity_temporal::{Dataset, DistanceMetric, PartitionTree, TemporalConfig, TimeRange};
//!
//! let data = Dataset::sorted(vectors, 128, timestamps, DistanceMetric::L2)?;
//! let tree = PartitionTree::fit(data, TemporalConfig::default())?;
//! let hits = tree.range_knn(&query, TimeRange::new(0.2, 0.4)?, 10)?;
//! ```

pub mod ann;
pub mod distance;
pub mod error;
pub mod exhaustive;
pub mod maintenance;
pub mod points;
pub mod temporal;
pub mod vamana;

// Re-exports
pub use ann::traits::RangeIndex;
pub use distance::DistanceMetric;
pub use error::{Result, RetrieveError};
pub use exhaustive::ExhaustiveIndex;
pub use maintenance::{CycleStats, MaintenanceOrchestrator, MaintenanceState};
pub use points::{Dataset, Subset, TimeRange};
pub use temporal::{PartitionNode, PartitionTree, QueryPlan, Strategy, TemporalConfig};
pub use vamana::{BuildParams, QueryParams, VamanaIndex};
