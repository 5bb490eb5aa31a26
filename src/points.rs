//! Shared point storage.
//!
//! A [`Dataset`] is created once per partition tree and shared behind an `Arc`.
//! Every node of the tree sees it through a [`Subset`]: the arena plus a range of
//! positions in timestamp-sorted order. Splitting a subset never copies vectors.
//!
//! Identities are `u32` indices into the vector buffer. The sorted order is a
//! permutation of (a subset of) those identities; it must already be sorted by
//! timestamp when handed in. That is not checked.

use crate::distance::DistanceMetric;
use crate::error::{Result, RetrieveError};
use serde::Serialize;
use std::ops::Range;
use std::sync::Arc;

const ABSENT: u32 = u32::MAX;

/// Owned point arena plus the timestamp order over it.
#[derive(Debug)]
pub struct Dataset {
    dimension: usize,
    metric: DistanceMetric,
    /// Row-major vectors, indexed by identity.
    vectors: Vec<f32>,
    /// Identities in ascending timestamp order.
    order: Vec<u32>,
    /// Timestamps parallel to `order`.
    timestamps: Vec<f32>,
    /// identity -> position in `order`.
    rank: Vec<u32>,
}

impl Dataset {
    /// Create a dataset.
    ///
    /// `vectors` holds `vectors.len() / dimension` points, indexed by identity.
    /// `timestamps[i]` is the timestamp of `identities[i]`; both must be sorted
    /// ascending by timestamp (caller contract).
    pub fn new(
        vectors: Vec<f32>,
        dimension: usize,
        timestamps: Vec<f32>,
        identities: Vec<u32>,
        metric: DistanceMetric,
    ) -> Result<Self> {
        if dimension == 0 {
            return Err(RetrieveError::InvalidParameter(
                "dimension must be greater than 0".into(),
            ));
        }
        if vectors.len() % dimension != 0 {
            return Err(RetrieveError::InvalidParameter(format!(
                "vector buffer of length {} is not a multiple of dimension {}",
                vectors.len(),
                dimension
            )));
        }
        if timestamps.len() != identities.len() {
            return Err(RetrieveError::InvalidParameter(format!(
                "{} timestamps for {} identities",
                timestamps.len(),
                identities.len()
            )));
        }
        if identities.is_empty() {
            return Err(RetrieveError::EmptyIndex);
        }

        let num_points = vectors.len() / dimension;
        let mut rank = vec![ABSENT; num_points];
        for (pos, &id) in identities.iter().enumerate() {
            let slot = rank.get_mut(id as usize).ok_or(RetrieveError::UnknownIdentity(id))?;
            if *slot != ABSENT {
                return Err(RetrieveError::InvalidParameter(format!(
                    "identity {id} appears more than once"
                )));
            }
            *slot = pos as u32;
        }

        Ok(Self {
            dimension,
            metric,
            vectors,
            order: identities,
            timestamps,
            rank,
        })
    }

    /// Dataset whose identities are `0..n`, already in timestamp order.
    pub fn sorted(
        vectors: Vec<f32>,
        dimension: usize,
        timestamps: Vec<f32>,
        metric: DistanceMetric,
    ) -> Result<Self> {
        let identities = (0..timestamps.len() as u32).collect();
        Self::new(vectors, dimension, timestamps, identities, metric)
    }

    /// Number of indexed (ordered) points.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn metric(&self) -> DistanceMetric {
        self.metric
    }

    /// Vector of a global identity.
    #[inline]
    pub fn vector(&self, id: u32) -> &[f32] {
        let start = id as usize * self.dimension;
        &self.vectors[start..start + self.dimension]
    }

    /// Position of an identity in timestamp order.
    pub fn rank_of(&self, id: u32) -> Option<usize> {
        match self.rank.get(id as usize) {
            Some(&r) if r != ABSENT => Some(r as usize),
            _ => None,
        }
    }

    /// Sorted timestamps.
    pub fn timestamps(&self) -> &[f32] {
        &self.timestamps
    }

    /// Identities in timestamp order.
    pub fn order(&self) -> &[u32] {
        &self.order
    }

    /// Check that a query has the indexed dimension.
    pub fn check_query(&self, query: &[f32]) -> Result<()> {
        if query.is_empty() {
            return Err(RetrieveError::EmptyQuery);
        }
        if query.len() != self.dimension {
            return Err(RetrieveError::DimensionMismatch {
                query_dim: query.len(),
                doc_dim: self.dimension,
            });
        }
        Ok(())
    }
}

/// Closed timestamp interval `[start, end]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TimeRange {
    pub start: f32,
    pub end: f32,
}

impl TimeRange {
    /// Create a range, rejecting NaN endpoints and `start > end`.
    pub fn new(start: f32, end: f32) -> Result<Self> {
        if start.is_nan() || end.is_nan() || start > end {
            return Err(RetrieveError::InvalidParameter(format!(
                "invalid time range [{start}, {end}]"
            )));
        }
        Ok(Self { start, end })
    }

    /// `end - start`. Under uniform timestamp density on `[0, 1]` this is the
    /// expected fraction of points inside the range.
    #[inline]
    pub fn width(&self) -> f32 {
        self.end - self.start
    }

    #[inline]
    pub fn contains(&self, t: f32) -> bool {
        t >= self.start && t <= self.end
    }
}

/// A contiguous, timestamp-ordered view over a [`Dataset`].
///
/// Positions inside a subset are "local": `0..len()`.
#[derive(Debug, Clone)]
pub struct Subset {
    data: Arc<Dataset>,
    span: Range<usize>,
}

impl Subset {
    /// View over the whole dataset.
    pub fn full(data: Arc<Dataset>) -> Self {
        let span = 0..data.len();
        Self { data, span }
    }

    /// View over a local range of this subset. Shares the arena.
    pub fn slice(&self, local: Range<usize>) -> Self {
        debug_assert!(local.end <= self.len());
        Self {
            data: Arc::clone(&self.data),
            span: self.span.start + local.start..self.span.start + local.end,
        }
    }

    pub fn len(&self) -> usize {
        self.span.len()
    }

    pub fn is_empty(&self) -> bool {
        self.span.is_empty()
    }

    /// Positions of this subset in the dataset's sorted order.
    pub fn span(&self) -> Range<usize> {
        self.span.clone()
    }

    pub fn dataset(&self) -> &Arc<Dataset> {
        &self.data
    }

    /// Global identity of a local position.
    #[inline]
    pub fn real_index(&self, local: u32) -> u32 {
        self.data.order[self.span.start + local as usize]
    }

    /// Local position of a global identity, if this subset contains it.
    pub fn local_of(&self, id: u32) -> Option<u32> {
        let r = self.data.rank_of(id)?;
        self.span
            .contains(&r)
            .then(|| (r - self.span.start) as u32)
    }

    #[inline]
    pub fn timestamp(&self, local: u32) -> f32 {
        self.data.timestamps[self.span.start + local as usize]
    }

    /// Timestamps of this subset, ascending.
    pub fn timestamps(&self) -> &[f32] {
        &self.data.timestamps[self.span.clone()]
    }

    /// First and last timestamp.
    pub fn time_bounds(&self) -> Option<(f32, f32)> {
        let ts = self.timestamps();
        Some((*ts.first()?, *ts.last()?))
    }

    #[inline]
    pub fn vector(&self, local: u32) -> &[f32] {
        self.data.vector(self.real_index(local))
    }

    /// Distance from a query to a local position.
    #[inline]
    pub fn distance(&self, query: &[f32], local: u32) -> f32 {
        self.data.metric.distance(query, self.vector(local))
    }

    /// Distance between two local positions.
    #[inline]
    pub fn distance_between(&self, a: u32, b: u32) -> f32 {
        self.data.metric.distance(self.vector(a), self.vector(b))
    }
}
