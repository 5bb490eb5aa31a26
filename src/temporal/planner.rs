//! Range query planning and execution.
//!
//! A query range is decomposed into disjoint *answering* nodes: a node
//! answers if it is a leaf or if the range covers all of its timestamps;
//! otherwise the query descends into the child (or both children) the range
//! overlaps, routed by the split timestamp. Each answering node runs the
//! same strategy, chosen once from the range width, and the per-node results
//! are merged by (distance, identity).

use super::tree::{PartitionNode, PartitionTree};
use super::TemporalConfig;
use crate::error::Result;
use crate::points::TimeRange;
use crate::vamana::QueryParams;
use rayon::prelude::*;
use serde::Serialize;
use std::ops::Range;
use tracing::{debug, warn};

/// How a range query is answered at each consulted node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Scan every in-range point. Exact.
    Exhaustive,
    /// Beam search with a widened frontier, then filter by timestamp.
    Graph,
}

/// Exhaustive below `cutoff`, graph otherwise.
pub fn choose_strategy(range: TimeRange, cutoff: f32) -> Strategy {
    if range.width() < cutoff {
        Strategy::Exhaustive
    } else {
        Strategy::Graph
    }
}

/// Expansion budget for a range of the given width.
///
/// The budget grows as the range narrows, since fewer expanded nodes survive
/// the timestamp filter. Widths are selectivities, so anything above 1 counts
/// as 1 and the budget never drops below `limit`. Saturates at `usize::MAX`;
/// a zero-width range gets an unbounded budget.
pub fn widened_limit(limit: usize, width: f32) -> usize {
    if width.is_nan() || width <= 0.0 {
        return usize::MAX;
    }
    let widened = (limit as f64 / width.min(1.0) as f64).floor();
    if widened >= usize::MAX as f64 {
        usize::MAX
    } else {
        widened as usize
    }
}

/// Query parameters for the graph path: the frontier is as wide as the beam
/// and the expansion budget is [`widened_limit`].
pub fn over_retrieval_params(params: &QueryParams, width: f32) -> QueryParams {
    QueryParams {
        k: params.beam_size,
        limit: widened_limit(params.limit, width),
        ..params.clone()
    }
}

/// One node consulted by a range query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedNode {
    /// Positions covered in timestamp order.
    pub span: Range<usize>,
    pub depth: usize,
    pub is_leaf: bool,
}

/// Which nodes answer a range query, and how.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryPlan {
    pub range: TimeRange,
    pub strategy: Strategy,
    /// Disjoint answering nodes, in timestamp order.
    pub nodes: Vec<PlannedNode>,
}

/// Result of [`PartitionTree::range_search`].
#[derive(Debug, Clone)]
pub struct RangeSearchOutcome {
    /// Global identities and distances, ascending by (distance, identity).
    pub neighbors: Vec<(u32, f32)>,
    pub plan: QueryPlan,
    /// Distance computations across all answering nodes.
    pub distance_comparisons: usize,
    /// The graph path found fewer than `k` in-range points.
    pub under_retrieved: bool,
}

impl PartitionNode {
    fn answering_nodes<'a>(&'a self, range: TimeRange, out: &mut Vec<&'a PartitionNode>) {
        if self.is_leaf() || self.covered_by(range) {
            out.push(self);
            return;
        }
        let (Some(left), Some(right), Some(split)) =
            (self.left(), self.right(), self.split_timestamp())
        else {
            out.push(self);
            return;
        };
        if range.end < split {
            left.answering_nodes(range, out);
        } else if range.start > split {
            right.answering_nodes(range, out);
        } else {
            left.answering_nodes(range, out);
            right.answering_nodes(range, out);
        }
    }

    /// Range query answered by this node alone, without descending.
    ///
    /// The strategy is chosen from the range width exactly as for the tree.
    pub fn range_knn(
        &self,
        query: &[f32],
        range: TimeRange,
        k: usize,
        config: &TemporalConfig,
    ) -> Vec<(u32, f32)> {
        if k == 0 {
            return Vec::new();
        }
        let strategy = choose_strategy(range, config.exhaustive_fallback_cutoff);
        let params = over_retrieval_params(&config.query, range.width());
        self.search_range(query, range, k, strategy, &params).0
    }

    /// Top-k in-range points of this node only. Returns the neighbors and the
    /// number of distance computations.
    fn search_range(
        &self,
        query: &[f32],
        range: TimeRange,
        k: usize,
        strategy: Strategy,
        params: &QueryParams,
    ) -> (Vec<(u32, f32)>, usize) {
        match strategy {
            Strategy::Exhaustive => {
                let graph = self.graph();
                let found = self
                    .exhaustive()
                    .range_knn_where(query, range, k, |local| graph.is_live(local));
                (found, self.len())
            }
            Strategy::Graph => {
                let outcome = self.graph().search(query, params);
                let points = self.points();
                let found = outcome
                    .frontier
                    .into_iter()
                    .filter(|&(local, _)| range.contains(points.timestamp(local)))
                    .take(k)
                    .map(|(local, d)| (points.real_index(local), d))
                    .collect();
                (found, outcome.distance_comparisons)
            }
        }
    }
}

impl PartitionTree {
    /// Decide which nodes answer `range` and with which strategy.
    pub fn plan_range(&self, range: TimeRange) -> QueryPlan {
        self.plan_range_with(range, self.config())
    }

    /// [`plan_range`](Self::plan_range) with an explicit configuration.
    pub fn plan_range_with(&self, range: TimeRange, config: &TemporalConfig) -> QueryPlan {
        let nodes = self.answering_nodes(range);
        QueryPlan {
            range,
            strategy: choose_strategy(range, config.exhaustive_fallback_cutoff),
            nodes: nodes
                .iter()
                .map(|n| PlannedNode {
                    span: n.span(),
                    depth: n.depth(),
                    is_leaf: n.is_leaf(),
                })
                .collect(),
        }
    }

    fn answering_nodes(&self, range: TimeRange) -> Vec<&PartitionNode> {
        let mut nodes = Vec::new();
        self.root().answering_nodes(range, &mut nodes);
        nodes
    }

    /// k nearest neighbors of `query` with timestamp in `range`.
    ///
    /// Exact when the range is narrower than the configured cutoff. Returns
    /// fewer than `k` results when the range holds fewer live points, or when
    /// graph over-retrieval runs short.
    pub fn range_knn(&self, query: &[f32], range: TimeRange, k: usize) -> Result<Vec<(u32, f32)>> {
        Ok(self.range_search(query, range, k, self.config())?.neighbors)
    }

    /// [`range_knn`](Self::range_knn) with an explicit configuration.
    pub fn range_knn_with(
        &self,
        query: &[f32],
        range: TimeRange,
        k: usize,
        config: &TemporalConfig,
    ) -> Result<Vec<(u32, f32)>> {
        Ok(self.range_search(query, range, k, config)?.neighbors)
    }

    /// Range query returning the plan and search counters alongside the neighbors.
    pub fn range_search(
        &self,
        query: &[f32],
        range: TimeRange,
        k: usize,
        config: &TemporalConfig,
    ) -> Result<RangeSearchOutcome> {
        self.dataset().check_query(query)?;
        config.validate()?;

        let plan = self.plan_range_with(range, config);
        if k == 0 {
            return Ok(RangeSearchOutcome {
                neighbors: Vec::new(),
                plan,
                distance_comparisons: 0,
                under_retrieved: false,
            });
        }

        let params = over_retrieval_params(&config.query, range.width());
        let per_node: Vec<(Vec<(u32, f32)>, usize)> = self
            .answering_nodes(range)
            .par_iter()
            .map(|node| node.search_range(query, range, k, plan.strategy, &params))
            .collect();

        let distance_comparisons = per_node.iter().map(|(_, c)| c).sum();
        let mut neighbors: Vec<(u32, f32)> = per_node.into_iter().flat_map(|(n, _)| n).collect();
        neighbors.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));
        neighbors.truncate(k);

        let under_retrieved = plan.strategy == Strategy::Graph && neighbors.len() < k;
        if under_retrieved {
            warn!(
                k,
                found = neighbors.len(),
                start = range.start,
                end = range.end,
                beam_size = params.beam_size,
                "graph over-retrieval returned fewer than k in-range points"
            );
        }
        debug!(
            strategy = ?plan.strategy,
            nodes = plan.nodes.len(),
            distance_comparisons,
            "range query"
        );

        Ok(RangeSearchOutcome {
            neighbors,
            plan,
            distance_comparisons,
            under_retrieved,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distance::DistanceMetric;
    use crate::vamana::BuildParams;

    fn line_tree(n: usize, min_size: usize) -> PartitionTree {
        let vectors: Vec<f32> = (0..n).map(|i| i as f32).collect();
        let timestamps: Vec<f32> = (0..n).map(|i| i as f32 / n as f32).collect();
        let config = TemporalConfig {
            build: BuildParams::new(8, 16, 1.175),
            ..TemporalConfig::default()
        }
        .with_min_size(min_size);
        PartitionTree::fit_sorted(vectors, 1, timestamps, DistanceMetric::L2, config).unwrap()
    }

    fn range(a: f32, b: f32) -> TimeRange {
        TimeRange::new(a, b).unwrap()
    }

    #[test]
    fn test_strategy_cutoff() {
        assert_eq!(choose_strategy(range(0.0, 0.1), 0.25), Strategy::Exhaustive);
        assert_eq!(choose_strategy(range(0.0, 0.25), 0.25), Strategy::Graph);
        assert_eq!(choose_strategy(range(0.3, 0.3), 0.25), Strategy::Exhaustive);
        assert_eq!(choose_strategy(range(0.0, 0.1), 0.0), Strategy::Graph);
    }

    #[test]
    fn test_widened_limit() {
        assert_eq!(widened_limit(100, 1.0), 100);
        assert_eq!(widened_limit(100, 0.5), 200);
        assert_eq!(widened_limit(100, 0.3), 333);
        assert_eq!(widened_limit(100, 0.0), usize::MAX);
        assert_eq!(widened_limit(usize::MAX, 0.25), usize::MAX);
    }

    #[test]
    fn test_widened_limit_clamps_wide_ranges() {
        assert_eq!(widened_limit(100, 2.0), 100);
        assert_eq!(widened_limit(100, 2e7), 100);
        assert_eq!(widened_limit(100, f32::INFINITY), 100);
        assert_eq!(widened_limit(usize::MAX, f32::INFINITY), usize::MAX);
    }

    #[test]
    fn test_unbounded_range_searches_whole_graph() {
        let tree = line_tree(500, 1000);
        let exact = tree.range_search(&[100.0], range(0.0, 1.0), 10, tree.config()).unwrap();
        for r in [range(f32::NEG_INFINITY, f32::INFINITY), range(0.0, 2e7)] {
            let out = tree.range_search(&[100.0], r, 10, tree.config()).unwrap();
            assert_eq!(out.plan.strategy, Strategy::Graph);
            assert!(!out.under_retrieved);
            assert_eq!(out.neighbors.len(), 10);
            assert_eq!(out.neighbors[0], (100, 0.0));
            assert_eq!(out.neighbors, exact.neighbors);
        }
    }

    #[test]
    fn test_graph_path_reports_under_retrieval() {
        let tree = line_tree(100, 10);
        // Wide enough for the graph path, but only five points in range.
        let r = range(0.95, 1.5);
        let out = tree.range_search(&[0.0], r, 10, tree.config()).unwrap();
        assert_eq!(out.plan.strategy, Strategy::Graph);
        assert!(out.under_retrieved);
        assert!(!out.neighbors.is_empty());
        assert!(out.neighbors.len() <= 5);
        for &(id, _) in &out.neighbors {
            assert!(r.contains(tree.dataset().timestamps()[id as usize]));
        }
    }

    #[test]
    fn test_exhaustive_path_never_reports_under_retrieval() {
        let tree = line_tree(100, 10);
        let out = tree.range_search(&[0.0], range(0.95, 1.0), 10, tree.config()).unwrap();
        assert_eq!(out.plan.strategy, Strategy::Exhaustive);
        assert_eq!(out.neighbors.len(), 5);
        assert!(!out.under_retrieved);
    }

    #[test]
    fn test_over_retrieval_params() {
        let base = QueryParams::default();
        let p = over_retrieval_params(&base, 0.5);
        assert_eq!(p.k, base.beam_size);
        assert_eq!(p.limit, base.limit * 2);
        assert_eq!(p.cut, base.cut);
        assert_eq!(p.degree_limit, base.degree_limit);
    }

    #[test]
    fn test_full_range_is_answered_by_root() {
        let tree = line_tree(200, 10);
        let plan = tree.plan_range(range(0.0, 1.0));
        assert_eq!(plan.strategy, Strategy::Graph);
        assert_eq!(plan.nodes.len(), 1);
        assert_eq!(plan.nodes[0].span, 0..200);
        assert_eq!(plan.nodes[0].depth, 0);
    }

    #[test]
    fn test_plan_nodes_are_disjoint_and_ordered() {
        let tree = line_tree(400, 10);
        let plan = tree.plan_range(range(0.13, 0.71));
        assert!(plan.nodes.len() > 1);
        for pair in plan.nodes.windows(2) {
            assert!(pair[0].span.end <= pair[1].span.start);
        }
        let covered: usize = plan.nodes.iter().map(|n| n.span.len()).sum();
        // Every in-range position is inside some answering node.
        let in_range = (0..400).filter(|&i| range(0.13, 0.71).contains(i as f32 / 400.0));
        for pos in in_range {
            assert!(plan.nodes.iter().any(|n| n.span.contains(&pos)));
        }
        assert!(covered < 400);
    }

    #[test]
    fn test_narrow_range_is_exact() {
        let tree = line_tree(300, 10);
        let r = range(0.5, 0.6);
        let res = tree.range_knn(&[0.0], r, 5).unwrap();
        let ids: Vec<u32> = res.iter().map(|r| r.0).collect();
        assert_eq!(ids, vec![150, 151, 152, 153, 154]);
    }

    #[test]
    fn test_graph_path_stays_in_range() {
        let tree = line_tree(300, 10);
        let r = range(0.2, 0.8);
        let out = tree.range_search(&[10.0], r, 10, tree.config()).unwrap();
        assert_eq!(out.plan.strategy, Strategy::Graph);
        assert!(!out.neighbors.is_empty());
        for &(id, _) in &out.neighbors {
            assert!(r.contains(tree.dataset().timestamps()[id as usize]));
        }
        assert_eq!(out.neighbors[0].0, 60);
    }

    #[test]
    fn test_range_without_points() {
        let tree = line_tree(100, 10);
        let res = tree.range_knn(&[0.0], range(0.101, 0.109), 3).unwrap();
        assert!(res.is_empty());
    }

    #[test]
    fn test_zero_k_returns_plan_only() {
        let tree = line_tree(100, 10);
        let out = tree.range_search(&[0.0], range(0.0, 0.1), 0, tree.config()).unwrap();
        assert!(out.neighbors.is_empty());
        assert_eq!(out.distance_comparisons, 0);
        assert!(!out.plan.nodes.is_empty());
    }

    #[test]
    fn test_node_answers_alone() {
        let tree = line_tree(200, 10);
        let left = tree.root().left().unwrap();
        let r = range(0.0, 1.0);
        // The left child only holds the lower half.
        let res = left.range_knn(&[150.0], r, 1, tree.config());
        assert_eq!(res[0].0, 99);
        let exact = left.range_knn(&[150.0], range(0.0, 0.2), 2, tree.config());
        assert_eq!(exact, vec![(40, 110.0 * 110.0), (39, 111.0 * 111.0)]);
    }

    #[test]
    fn test_config_override() {
        let tree = line_tree(200, 10);
        let all_exhaustive = tree.config().clone().with_cutoff(1.0);
        let plan = tree.plan_range_with(range(0.0, 0.9), &all_exhaustive);
        assert_eq!(plan.strategy, Strategy::Exhaustive);
    }
}
