//! Common surface of the range-queryable indices.

use crate::error::Result;
use crate::exhaustive::ExhaustiveIndex;
use crate::points::TimeRange;
use crate::temporal::PartitionTree;

/// An index answering plain and timestamp-filtered k-NN queries.
///
/// Results are global identities with distances, ascending by
/// (distance, identity).
pub trait RangeIndex {
    /// k nearest neighbors, ignoring timestamps.
    fn knn(&self, query: &[f32], k: usize) -> Result<Vec<(u32, f32)>>;

    /// k nearest neighbors with timestamp in `range`.
    fn range_knn(&self, query: &[f32], range: TimeRange, k: usize) -> Result<Vec<(u32, f32)>>;

    /// Get index statistics.
    fn stats(&self) -> IndexStats;

    fn dimension(&self) -> usize;

    fn num_vectors(&self) -> usize;
}

/// Statistics about a range index.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexStats {
    pub num_vectors: usize,
    pub dimension: usize,
    /// Indices (graphs or flat scans) the structure holds.
    pub num_partitions: usize,
    pub algorithm: &'static str,
}

impl RangeIndex for ExhaustiveIndex {
    fn knn(&self, query: &[f32], k: usize) -> Result<Vec<(u32, f32)>> {
        self.points().dataset().check_query(query)?;
        Ok(ExhaustiveIndex::knn(self, query, k))
    }

    fn range_knn(&self, query: &[f32], range: TimeRange, k: usize) -> Result<Vec<(u32, f32)>> {
        self.points().dataset().check_query(query)?;
        Ok(ExhaustiveIndex::range_knn(self, query, range, k))
    }

    fn stats(&self) -> IndexStats {
        IndexStats {
            num_vectors: self.len(),
            dimension: self.dimension(),
            num_partitions: 1,
            algorithm: "Exhaustive",
        }
    }

    fn dimension(&self) -> usize {
        self.points().dataset().dimension()
    }

    fn num_vectors(&self) -> usize {
        self.len()
    }
}

impl RangeIndex for PartitionTree {
    fn knn(&self, query: &[f32], k: usize) -> Result<Vec<(u32, f32)>> {
        PartitionTree::knn(self, query, k)
    }

    fn range_knn(&self, query: &[f32], range: TimeRange, k: usize) -> Result<Vec<(u32, f32)>> {
        PartitionTree::range_knn(self, query, range, k)
    }

    fn stats(&self) -> IndexStats {
        IndexStats {
            num_vectors: self.len(),
            dimension: self.dimension(),
            num_partitions: self.nodes().len(),
            algorithm: "TemporalVamana",
        }
    }

    fn dimension(&self) -> usize {
        PartitionTree::dimension(self)
    }

    fn num_vectors(&self) -> usize {
        self.len()
    }
}
