//! Distance metrics for dense vectors.
//!
//! Every index in this crate ranks by a single [`DistanceMetric`] chosen when the
//! dataset is created. Smaller is always closer.
//!
//! ## Important nuance
//!
//! [`DistanceMetric::L2`] is the **squared** Euclidean distance. It orders points
//! exactly like the true Euclidean distance, which is all graph search and alpha
//! pruning need, and skips the square root. Alpha pruning against squared
//! distances behaves like pruning with `alpha^2` on unsquared ones; the default
//! `alpha = 1.175` is tuned for the squared form.

use serde::{Deserialize, Serialize};

const NORM_EPSILON: f32 = 1e-9;

/// Distance metric for dense vectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceMetric {
    /// Squared Euclidean distance.
    #[default]
    L2,
    /// Cosine distance $1 - \cos(a,b)$.
    Cosine,
    /// Inner product distance $-\langle a,b\rangle$ (for maximum inner product search).
    InnerProduct,
}

impl DistanceMetric {
    /// Compute distance between two vectors.
    ///
    /// If dimensions mismatch, this returns `f32::INFINITY` (so it is never selected as a
    /// nearest neighbor).
    #[inline]
    #[must_use]
    pub fn distance(self, a: &[f32], b: &[f32]) -> f32 {
        if a.len() != b.len() {
            return f32::INFINITY;
        }
        match self {
            DistanceMetric::L2 => l2_distance_squared(a, b),
            DistanceMetric::Cosine => cosine_distance(a, b),
            DistanceMetric::InnerProduct => -dot(a, b),
        }
    }
}

/// Dot product of two vectors.
#[inline]
#[must_use]
pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// L2 norm of a vector.
#[inline]
#[must_use]
pub fn norm(v: &[f32]) -> f32 {
    dot(v, v).sqrt()
}

/// L2 distance squared.
#[inline]
#[must_use]
pub fn l2_distance_squared(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum()
}

/// Cosine distance $1 - \cos(a,b)$.
///
/// Computes norms, so inputs do not need to be normalized. A zero vector is at
/// distance 1 from everything.
#[inline]
#[must_use]
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    let na = norm(a);
    let nb = norm(b);
    if na <= NORM_EPSILON || nb <= NORM_EPSILON {
        return 1.0;
    }
    1.0 - (dot(a, b) / (na * nb)).clamp(-1.0, 1.0)
}
