//! End-to-end range queries over a 20,000-point tree.
//!
//! Mirrors the reference configuration (`min_size = 10_000`) with a lighter
//! graph so the build stays quick in debug test runs.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashSet;
use vicinity_temporal::temporal::{RangeSearchOutcome, Strategy};
use vicinity_temporal::{
    BuildParams, Dataset, DistanceMetric, ExhaustiveIndex, PartitionTree, QueryParams,
    RangeIndex, TemporalConfig, TimeRange,
};

const N: usize = 20_000;
const DIM: usize = 4;

fn uniform_vectors(n: usize, dim: usize, seed: u64) -> Vec<f32> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n * dim).map(|_| rng.random::<f32>()).collect()
}

/// Identity i has timestamp i / n.
fn uniform_timestamps(n: usize) -> Vec<f32> {
    (0..n).map(|i| i as f32 / n as f32).collect()
}

fn config() -> TemporalConfig {
    TemporalConfig {
        build: BuildParams {
            num_passes: 1,
            ..BuildParams::new(16, 32, 1.175)
        },
        query: QueryParams {
            beam_size: 100,
            ..QueryParams::default()
        },
        ..TemporalConfig::default()
    }
}

fn build() -> (PartitionTree, Vec<f32>) {
    let vectors = uniform_vectors(N, DIM, 7);
    let data = Dataset::sorted(vectors.clone(), DIM, uniform_timestamps(N), DistanceMetric::L2)
        .expect("dataset");
    (PartitionTree::fit(data, config()).expect("build"), vectors)
}

fn vector(vectors: &[f32], id: usize) -> &[f32] {
    &vectors[id * DIM..(id + 1) * DIM]
}

fn ids(res: &[(u32, f32)]) -> Vec<u32> {
    res.iter().map(|r| r.0).collect()
}

// =============================================================================
// Tree shape and planning
// =============================================================================

#[test]
fn twenty_thousand_points_split_once() {
    let (tree, _) = build();
    let root = tree.root();
    assert_eq!(root.len(), N);
    assert_eq!(root.split_timestamp(), Some(0.5));

    let left = root.left().unwrap();
    let right = root.right().unwrap();
    assert_eq!(left.len(), 10_000);
    assert_eq!(right.len(), 10_000);
    assert!(left.is_leaf() && right.is_leaf());
    assert_eq!(tree.nodes().len(), 3);

    let narrow = tree.plan_range(TimeRange::new(0.0, 0.1).unwrap());
    assert_eq!(narrow.strategy, Strategy::Exhaustive);
    assert_eq!(narrow.nodes.len(), 1);
    assert_eq!(narrow.nodes[0].span, 0..10_000);

    let wide = tree.plan_range(TimeRange::new(0.0, 0.6).unwrap());
    assert_eq!(wide.strategy, Strategy::Graph);
    assert_eq!(wide.nodes.len(), 2);
    assert!(wide.nodes.iter().all(|n| n.is_leaf && n.depth == 1));

    let full = tree.plan_range(TimeRange::new(0.0, 1.0).unwrap());
    assert_eq!(full.nodes.len(), 1);
    assert_eq!(full.nodes[0].depth, 0);
}

// =============================================================================
// Exact path
// =============================================================================

#[test]
fn narrow_range_matches_flat_scan() {
    let (tree, vectors) = build();
    let flat = ExhaustiveIndex::fit(
        vectors.clone(),
        DIM,
        uniform_timestamps(N),
        (0..N as u32).collect(),
        DistanceMetric::L2,
    )
    .unwrap();

    let mut rng = StdRng::seed_from_u64(11);
    for _ in 0..10 {
        let start: f32 = rng.random_range(0.0..0.8);
        let range = TimeRange::new(start, start + 0.1).unwrap();
        let query: Vec<f32> = (0..DIM).map(|_| rng.random::<f32>()).collect();

        let got = RangeIndex::range_knn(&tree, &query, range, 10).unwrap();
        let expected = RangeIndex::range_knn(&flat, &query, range, 10).unwrap();
        assert_eq!(ids(&got), ids(&expected));
    }
}

// =============================================================================
// Graph path
// =============================================================================

#[test]
fn wide_range_results_are_in_range_and_accurate() {
    let (tree, vectors) = build();
    let flat = ExhaustiveIndex::fit(
        vectors,
        DIM,
        uniform_timestamps(N),
        (0..N as u32).collect(),
        DistanceMetric::L2,
    )
    .unwrap();

    let range = TimeRange::new(0.2, 0.8).unwrap();
    let mut rng = StdRng::seed_from_u64(13);
    let (mut hits, mut total) = (0usize, 0usize);

    for _ in 0..20 {
        let query: Vec<f32> = (0..DIM).map(|_| rng.random::<f32>()).collect();
        let out: RangeSearchOutcome = tree.range_search(&query, range, 10, tree.config()).unwrap();
        assert_eq!(out.plan.strategy, Strategy::Graph);
        assert!(out.distance_comparisons > 0);
        assert_eq!(out.neighbors.len(), 10);
        for &(id, _) in &out.neighbors {
            assert!(range.contains(tree.dataset().timestamps()[id as usize]));
        }

        let truth: HashSet<u32> = ids(&flat.range_knn(&query, range, 10)).into_iter().collect();
        hits += out.neighbors.iter().filter(|r| truth.contains(&r.0)).count();
        total += 10;
    }

    let recall = hits as f32 / total as f32;
    assert!(recall >= 0.8, "recall@10 too low: {recall}");
}

#[test]
fn self_queries_find_themselves() {
    let (tree, vectors) = build();
    let found = (0..N)
        .step_by(997)
        .filter(|&id| {
            let res = tree.knn(vector(&vectors, id), 1).unwrap();
            res.first().map(|r| r.0) == Some(id as u32)
        })
        .count();
    let sampled = (0..N).step_by(997).count();
    assert!(found * 10 >= sampled * 9, "{found}/{sampled} self queries hit");
}
