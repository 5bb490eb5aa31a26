//! Index-agnostic query surface.
//!
//! [`RangeIndex`] is implemented by the flat [`ExhaustiveIndex`](crate::exhaustive::ExhaustiveIndex)
//! and by the [`PartitionTree`](crate::temporal::PartitionTree), so evaluation code
//! can compare the approximate tree against exact ground truth through one trait.
//!
//! ```rust,ignore
//! use vicinity_temporal::ann::RangeIndex;
//!
//! fn recall(truth: &dyn RangeIndex, approx: &dyn RangeIndex, q: &[f32], r: TimeRange) -> f32 { .. }
//! ```

pub mod traits;

pub use traits::{IndexStats, RangeIndex};
