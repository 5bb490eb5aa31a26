//! Brute-force index over a timestamp-ordered subset.
//!
//! Exact: every point of the subset is scored. Used as the fallback for narrow
//! time ranges, where scanning is cheap and recall must be perfect, and as the
//! ground truth in tests.

use crate::distance::DistanceMetric;
use crate::error::Result;
use crate::points::{Dataset, Subset, TimeRange};
use rayon::prelude::*;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::Arc;

/// Subsets smaller than this are scanned on the calling thread.
const PARALLEL_SCAN_MIN: usize = 4096;

/// Exhaustive (flat) index.
#[derive(Debug, Clone)]
pub struct ExhaustiveIndex {
    points: Subset,
}

impl ExhaustiveIndex {
    /// Index a freshly owned point set.
    ///
    /// `identities`/`timestamps` must be sorted ascending by timestamp.
    pub fn fit(
        vectors: Vec<f32>,
        dimension: usize,
        timestamps: Vec<f32>,
        identities: Vec<u32>,
        metric: DistanceMetric,
    ) -> Result<Self> {
        let data = Dataset::new(vectors, dimension, timestamps, identities, metric)?;
        Ok(Self::copyless_fit(Subset::full(Arc::new(data))))
    }

    /// Index a view over an existing arena. No point data is copied.
    pub fn copyless_fit(points: Subset) -> Self {
        Self { points }
    }

    pub fn points(&self) -> &Subset {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Global identity of a local position.
    #[inline]
    pub fn real_index(&self, local: u32) -> u32 {
        self.points.real_index(local)
    }

    /// Exact k nearest neighbors over the whole subset.
    pub fn knn(&self, query: &[f32], k: usize) -> Vec<(u32, f32)> {
        self.scan(query, k, |_| true)
    }

    /// Exact k nearest neighbors whose timestamp lies in `range`.
    pub fn range_knn(&self, query: &[f32], range: TimeRange, k: usize) -> Vec<(u32, f32)> {
        self.range_knn_where(query, range, k, |_| true)
    }

    /// [`range_knn`](Self::range_knn) restricted to local positions accepted by `keep`.
    pub fn range_knn_where<F>(
        &self,
        query: &[f32],
        range: TimeRange,
        k: usize,
        keep: F,
    ) -> Vec<(u32, f32)>
    where
        F: Fn(u32) -> bool + Sync,
    {
        self.scan(query, k, |local| {
            range.contains(self.points.timestamp(local)) && keep(local)
        })
    }

    /// Score every accepted position; results are global identities sorted by
    /// (distance, identity).
    fn scan<F>(&self, query: &[f32], k: usize, accept: F) -> Vec<(u32, f32)>
    where
        F: Fn(u32) -> bool + Sync,
    {
        if k == 0 {
            return Vec::new();
        }
        let n = self.points.len() as u32;
        let score = |mut top: TopK, local: u32| {
            if accept(local) {
                top.push(self.real_index(local), self.points.distance(query, local));
            }
            top
        };

        let top = if self.points.len() < PARALLEL_SCAN_MIN {
            (0..n).fold(TopK::new(k), score)
        } else {
            (0..n)
                .into_par_iter()
                .fold(|| TopK::new(k), score)
                .reduce(|| TopK::new(k), TopK::merge)
        };
        top.into_sorted_vec()
    }
}

/// Entry ordered by (distance, id); the heap keeps the worst on top.
#[derive(Clone, Copy)]
struct Scored {
    id: u32,
    distance: f32,
}

impl PartialEq for Scored {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Scored {}

impl PartialOrd for Scored {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Scored {
    fn cmp(&self, other: &Self) -> Ordering {
        self.distance
            .total_cmp(&other.distance)
            .then(self.id.cmp(&other.id))
    }
}

/// Bounded max-heap keeping the k best entries.
pub(crate) struct TopK {
    k: usize,
    heap: BinaryHeap<Scored>,
}

impl TopK {
    pub(crate) fn new(k: usize) -> Self {
        Self {
            k,
            heap: BinaryHeap::with_capacity(k + 1),
        }
    }

    pub(crate) fn push(&mut self, id: u32, distance: f32) {
        let cand = Scored { id, distance };
        if self.heap.len() < self.k {
            self.heap.push(cand);
        } else if let Some(worst) = self.heap.peek() {
            if cand < *worst {
                self.heap.pop();
                self.heap.push(cand);
            }
        }
    }

    pub(crate) fn merge(mut self, other: TopK) -> TopK {
        for s in other.heap {
            self.push(s.id, s.distance);
        }
        self
    }

    pub(crate) fn into_sorted_vec(self) -> Vec<(u32, f32)> {
        self.heap
            .into_sorted_vec()
            .into_iter()
            .map(|s| (s.id, s.distance))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Points on a line; identity i at position i, timestamp i / n.
    fn line_index(n: usize) -> ExhaustiveIndex {
        let vectors: Vec<f32> = (0..n).map(|i| i as f32).collect();
        let timestamps: Vec<f32> = (0..n).map(|i| i as f32 / n as f32).collect();
        let ids: Vec<u32> = (0..n as u32).collect();
        ExhaustiveIndex::fit(vectors, 1, timestamps, ids, DistanceMetric::L2).unwrap()
    }

    #[test]
    fn test_knn_exact() {
        let index = line_index(100);
        let res = index.knn(&[42.2], 3);
        let ids: Vec<u32> = res.iter().map(|r| r.0).collect();
        assert_eq!(ids, vec![42, 43, 41]);
    }

    #[test]
    fn test_range_knn_filters_by_timestamp() {
        let index = line_index(100);
        let range = TimeRange::new(0.5, 0.6).unwrap();
        let res = index.range_knn(&[0.0], range, 5);
        let ids: Vec<u32> = res.iter().map(|r| r.0).collect();
        assert_eq!(ids, vec![50, 51, 52, 53, 54]);
    }

    #[test]
    fn test_range_knn_returns_fewer_when_range_is_sparse() {
        let index = line_index(100);
        let range = TimeRange::new(0.095, 0.115).unwrap();
        let res = index.range_knn(&[0.0], range, 10);
        let ids: Vec<u32> = res.iter().map(|r| r.0).collect();
        assert_eq!(ids, vec![10, 11]);
    }

    #[test]
    fn test_copyless_fit_maps_local_to_global() {
        let full = line_index(100);
        let upper = ExhaustiveIndex::copyless_fit(full.points().slice(50..100));
        assert_eq!(upper.len(), 50);
        assert_eq!(upper.real_index(0), 50);
        let res = upper.knn(&[0.0], 1);
        assert_eq!(res[0].0, 50);
    }

    #[test]
    fn test_keep_predicate() {
        let index = line_index(20);
        let range = TimeRange::new(0.0, 1.0).unwrap();
        let res = index.range_knn_where(&[0.0], range, 3, |local| local % 2 == 1);
        let ids: Vec<u32> = res.iter().map(|r| r.0).collect();
        assert_eq!(ids, vec![1, 3, 5]);
    }

    #[test]
    fn test_parallel_scan_matches_sequential_order() {
        let index = line_index(10_000);
        let res = index.knn(&[5000.4], 4);
        let ids: Vec<u32> = res.iter().map(|r| r.0).collect();
        assert_eq!(ids, vec![5000, 5001, 4999, 5002]);
    }

    #[test]
    fn test_zero_k() {
        assert!(line_index(10).knn(&[1.0], 0).is_empty());
    }
}
