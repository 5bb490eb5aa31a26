//! Property-based tests for the partition tree and range planner.
//!
//! These tests verify invariants that should hold regardless of input:
//! - Tree shape follows the split rule at every node
//! - Narrow ranges return exactly the brute-force answer
//! - Every result lies inside the query range, whatever the strategy
//! - Answering nodes are disjoint and cover every in-range position

use proptest::prelude::*;
use vicinity_temporal::temporal::Strategy as Plan;
use vicinity_temporal::{BuildParams, Dataset, DistanceMetric, PartitionTree, TemporalConfig, TimeRange};

const DIM: usize = 3;

fn light_config(min_size: usize) -> TemporalConfig {
    TemporalConfig {
        build: BuildParams {
            num_passes: 1,
            ..BuildParams::new(8, 16, 1.175)
        },
        ..TemporalConfig::fast()
    }
    .with_min_size(min_size)
}

/// Sorted timestamps on [0, 1] and `DIM`-dimensional vectors.
fn arb_points(max_n: usize) -> impl Strategy<Value = (Vec<f32>, Vec<f32>)> {
    (1..max_n).prop_flat_map(|n| {
        (
            prop::collection::vec(-10.0f32..10.0, n * DIM),
            prop::collection::vec(0.0f32..=1.0, n).prop_map(|mut ts| {
                ts.sort_by(|a, b| a.total_cmp(b));
                ts
            }),
        )
    })
}

fn arb_range() -> impl Strategy<Value = TimeRange> {
    (0.0f32..=1.0, 0.0f32..=1.0)
        .prop_map(|(a, b)| TimeRange::new(a.min(b), a.max(b)).unwrap())
}

fn build(vectors: Vec<f32>, timestamps: Vec<f32>, min_size: usize) -> PartitionTree {
    let data = Dataset::sorted(vectors, DIM, timestamps, DistanceMetric::L2).unwrap();
    PartitionTree::fit(data, light_config(min_size)).unwrap()
}

/// Exact answer, computed without the library's indices.
fn brute_force(
    vectors: &[f32],
    timestamps: &[f32],
    query: &[f32],
    range: TimeRange,
    k: usize,
) -> Vec<u32> {
    let mut scored: Vec<(u32, f32)> = timestamps
        .iter()
        .enumerate()
        .filter(|(_, t)| range.contains(**t))
        .map(|(i, _)| {
            let v = &vectors[i * DIM..(i + 1) * DIM];
            (i as u32, DistanceMetric::L2.distance(query, v))
        })
        .collect();
    scored.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));
    scored.into_iter().take(k).map(|(id, _)| id).collect()
}

mod tree_shape_props {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn split_rule_holds_at_every_node(
            (vectors, timestamps) in arb_points(200),
            min_size in 1usize..40,
        ) {
            let n = timestamps.len();
            let tree = build(vectors, timestamps, min_size);
            prop_assert_eq!(tree.len(), n);

            for node in tree.nodes() {
                if node.is_leaf() {
                    prop_assert!(node.len() < 2 * min_size);
                    prop_assert!(node.split_timestamp().is_none());
                    continue;
                }
                prop_assert!(node.len() >= 2 * min_size);
                let left = node.left().unwrap();
                let right = node.right().unwrap();
                prop_assert_eq!(left.len() + right.len(), node.len());
                prop_assert_eq!(left.len(), node.len() / 2);
                prop_assert_eq!(left.span().start, node.span().start);
                prop_assert_eq!(right.span().end, node.span().end);
                let mid = (node.len() / 2) as u32;
                prop_assert_eq!(node.split_timestamp(), Some(node.points().timestamp(mid)));
            }
        }

        #[test]
        fn every_node_graph_covers_its_points(
            (vectors, timestamps) in arb_points(120),
            min_size in 1usize..20,
        ) {
            let tree = build(vectors, timestamps, min_size);
            for node in tree.nodes() {
                let stats = node.graph().stats();
                prop_assert_eq!(stats.size, node.len());
                prop_assert_eq!(stats.active, node.len());
                prop_assert!(stats.max_degree <= 8);
            }
        }
    }
}

mod range_props {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(48))]

        #[test]
        fn narrow_ranges_match_brute_force(
            (vectors, timestamps) in arb_points(250),
            start in 0.0f32..0.9,
            width in 0.0f32..0.24,
            query in prop::collection::vec(-10.0f32..10.0, DIM),
            k in 1usize..12,
            min_size in 1usize..50,
        ) {
            let range = TimeRange::new(start, start + width).unwrap();
            let tree = build(vectors.clone(), timestamps.clone(), min_size);

            let plan = tree.plan_range(range);
            prop_assert_eq!(plan.strategy, Plan::Exhaustive);

            let got: Vec<u32> = tree
                .range_knn(&query, range, k)
                .unwrap()
                .into_iter()
                .map(|r| r.0)
                .collect();
            prop_assert_eq!(got, brute_force(&vectors, &timestamps, &query, range, k));
        }

        #[test]
        fn results_stay_in_range(
            (vectors, timestamps) in arb_points(250),
            range in arb_range(),
            query in prop::collection::vec(-10.0f32..10.0, DIM),
            k in 1usize..20,
            min_size in 1usize..50,
        ) {
            let tree = build(vectors, timestamps.clone(), min_size);
            let res = tree.range_knn(&query, range, k).unwrap();
            prop_assert!(res.len() <= k);
            for pair in res.windows(2) {
                prop_assert!(pair[0].1 <= pair[1].1);
            }
            for (id, _) in res {
                let t = timestamps[id as usize];
                prop_assert!(range.contains(t), "timestamp {} outside {:?}", t, range);
            }
        }

        #[test]
        fn plan_nodes_partition_the_range(
            (vectors, timestamps) in arb_points(250),
            range in arb_range(),
            min_size in 1usize..30,
        ) {
            let tree = build(vectors, timestamps.clone(), min_size);
            let plan = tree.plan_range(range);
            prop_assert!(!plan.nodes.is_empty());
            for pair in plan.nodes.windows(2) {
                prop_assert!(pair[0].span.end <= pair[1].span.start);
            }
            for (pos, &t) in timestamps.iter().enumerate() {
                if range.contains(t) {
                    prop_assert!(plan.nodes.iter().any(|n| n.span.contains(&pos)));
                }
            }
        }
    }
}
