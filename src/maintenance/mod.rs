//! Epoch-bracketed maintenance of a partition tree.
//!
//! # The Problem
//!
//! Identities are deleted and re-inserted while the tree keeps serving
//! queries. A graph cannot simply drop a node: other nodes' edges point at
//! it. Deletion is therefore staged, and the stages must happen in order on
//! every graph of the tree that contains the identity.
//!
//! # Cycle
//!
//! ```text
//!            lazy_delete(B)              start_delete_epoch()
//!   Steady ───────────────► Deleting ───────────────────► EpochOpen
//!     ▲                        │ lazy_delete(B')             │ consolidate()
//!     │                        └──────┐                      ▼
//!     │     end_delete_epoch()        ▼                EpochOpen (consolidated)
//!     └──────────────────────────────────────────────────────┘
//!   insert(B) only in Steady
//! ```
//!
//! | Step | Per graph | Allowed in |
//! |------|-----------|------------|
//! | `lazy_delete` | slot `Active -> Tombstoned` | Steady, Deleting |
//! | `start_delete_epoch` | open one generation | Steady, Deleting |
//! | `consolidate` | rewire edges around tombstones | EpochOpen |
//! | `end_delete_epoch` | slot `Tombstoned -> Free` | EpochOpen, consolidated |
//! | `insert` | slot `Free -> Active` | Steady |
//!
//! Queries may run from other threads at any point; tombstoned points are
//! never returned.
//!
//! # References
//!
//! - Singh et al. (2021): "FreshDiskANN: A Fast and Accurate Graph-Based ANN
//!   Index for Streaming Similarity Search"

mod coordinator;
mod ops;

pub use coordinator::MaintenanceOrchestrator;
pub use ops::CycleStats;

use std::fmt;

/// Where the orchestrator is in the delete / re-insert cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MaintenanceState {
    /// No deletes pending. Inserts allowed.
    #[default]
    Steady,
    /// Tombstones placed, no epoch open yet.
    Deleting,
    /// One delete epoch open on every graph.
    EpochOpen { consolidated: bool },
}

impl fmt::Display for MaintenanceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Steady => write!(f, "steady"),
            Self::Deleting => write!(f, "deleting"),
            Self::EpochOpen {
                consolidated: false,
            } => write!(f, "in an open epoch"),
            Self::EpochOpen { consolidated: true } => {
                write!(f, "in a consolidated epoch")
            }
        }
    }
}
