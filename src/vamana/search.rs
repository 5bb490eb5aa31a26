//! Beam search over a Vamana graph.

use super::Adjacency;
use crate::error::{Result, RetrieveError};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Query-time parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryParams {
    /// Number of results wanted. Also the rank used by `cut`.
    pub k: usize,
    /// Frontier capacity.
    pub beam_size: usize,
    /// Once the frontier holds `k` entries, a neighbor is only admitted if it is
    /// closer than `cut` times the current k-th distance.
    pub cut: f32,
    /// Maximum number of nodes expanded per query.
    pub limit: usize,
    /// Maximum number of neighbors scanned per expanded node.
    pub degree_limit: usize,
}

impl Default for QueryParams {
    fn default() -> Self {
        Self {
            k: 100,
            beam_size: 500,
            cut: 1.35,
            limit: 10_000_000,
            degree_limit: 100,
        }
    }
}

impl QueryParams {
    pub fn new(k: usize, beam_size: usize, cut: f32, limit: usize, degree_limit: usize) -> Self {
        Self {
            k,
            beam_size,
            cut,
            limit,
            degree_limit,
        }
    }

    /// Same parameters with a different `k`.
    pub fn with_k(&self, k: usize) -> Self {
        Self { k, ..self.clone() }
    }

    pub fn validate(&self) -> Result<()> {
        if self.beam_size == 0 {
            return Err(RetrieveError::InvalidParameter(
                "beam_size must be at least 1".into(),
            ));
        }
        if !(self.cut > 0.0) {
            return Err(RetrieveError::InvalidParameter(format!(
                "cut must be positive, got {}",
                self.cut
            )));
        }
        if self.limit == 0 || self.degree_limit == 0 {
            return Err(RetrieveError::InvalidParameter(
                "limit and degree_limit must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Result of one beam search.
#[derive(Debug, Clone, Default)]
pub struct SearchOutcome {
    /// Best candidates found, ascending by distance. At most `beam_size` long.
    pub frontier: Vec<(u32, f32)>,
    /// Every expanded node, in expansion order.
    pub visited: Vec<(u32, f32)>,
    /// Distance computations performed.
    pub distance_comparisons: usize,
}

/// Distance bound implied by `cut` relative to the k-th best distance.
///
/// Distances may be negative (inner product), so the slack is applied to the
/// magnitude.
#[inline]
fn cut_bound(kth: f32, cut: f32) -> f32 {
    kth + (cut - 1.0) * kth.abs()
}

/// Beam search from one or more start nodes.
///
/// * `neighbors` - adjacency of a node; `None` if the slot is not part of the graph
/// * `distance` - distance from the query to a node; `None` if the slot is not
///   part of the graph (it is then skipped entirely)
///
/// The search never mutates shared state: it copies each adjacency list it
/// expands and keeps a private frontier and visited set.
pub fn beam_search<N, D>(
    starts: &[u32],
    params: &QueryParams,
    neighbors: N,
    distance: D,
) -> SearchOutcome
where
    N: Fn(u32) -> Option<Adjacency>,
    D: Fn(u32) -> Option<f32>,
{
    let beam = params.beam_size.max(1);
    let k = params.k.clamp(1, beam);

    let mut seen: HashSet<u32> = HashSet::with_capacity(beam * 4);
    // (id, distance, expanded), sorted by distance then id
    let mut frontier: Vec<(u32, f32, bool)> = Vec::with_capacity(beam + 1);
    let mut outcome = SearchOutcome::default();

    for &s in starts {
        if !seen.insert(s) {
            continue;
        }
        if let Some(d) = distance(s) {
            outcome.distance_comparisons += 1;
            insert_sorted(&mut frontier, (s, d, false), beam);
        }
    }

    while outcome.visited.len() < params.limit {
        let Some(pos) = frontier.iter().position(|c| !c.2) else {
            break;
        };
        frontier[pos].2 = true;
        let (current, current_dist, _) = frontier[pos];
        outcome.visited.push((current, current_dist));

        let Some(adjacency) = neighbors(current) else {
            continue;
        };

        for &nb in adjacency.iter().take(params.degree_limit) {
            if !seen.insert(nb) {
                continue;
            }
            let Some(d) = distance(nb) else {
                continue;
            };
            outcome.distance_comparisons += 1;

            let mut bound = f32::INFINITY;
            if frontier.len() >= beam {
                bound = frontier[beam - 1].1;
            }
            if frontier.len() >= k {
                bound = bound.min(cut_bound(frontier[k - 1].1, params.cut));
            }
            if d >= bound {
                continue;
            }
            insert_sorted(&mut frontier, (nb, d, false), beam);
        }
    }

    outcome.frontier = frontier.into_iter().map(|(id, d, _)| (id, d)).collect();
    outcome
}

fn insert_sorted(frontier: &mut Vec<(u32, f32, bool)>, cand: (u32, f32, bool), cap: usize) {
    let pos = frontier.partition_point(|c| c.1.total_cmp(&cand.1).then(c.0.cmp(&cand.0)).is_lt());
    if pos >= cap {
        return;
    }
    frontier.insert(pos, cand);
    frontier.truncate(cap);
}
