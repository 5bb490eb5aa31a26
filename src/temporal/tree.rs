//! Partition tree construction and traversal.

use super::TemporalConfig;
use crate::distance::DistanceMetric;
use crate::error::{Result, RetrieveError};
use crate::exhaustive::ExhaustiveIndex;
use crate::points::{Dataset, Subset, TimeRange};
use crate::vamana::{BuildStats, QueryParams, VamanaIndex};
use std::ops::Range;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// One node of the partition tree.
///
/// Owns an exhaustive index and a Vamana graph over the same contiguous,
/// timestamp-ordered subset. Internal nodes also own two children: `left`
/// covers the first `len() / 2` positions, `right` the rest.
#[derive(Debug)]
pub struct PartitionNode {
    exhaustive: ExhaustiveIndex,
    graph: VamanaIndex,
    left: Option<Box<PartitionNode>>,
    right: Option<Box<PartitionNode>>,
    /// Timestamp at local position `len() / 2`. Routes queries; it is not a
    /// strict boundary (equal timestamps may sit on both sides).
    split_timestamp: Option<f32>,
    depth: usize,
}

impl PartitionNode {
    fn fit(points: Subset, config: &TemporalConfig, depth: usize) -> Result<Self> {
        let n = points.len();
        let exhaustive = ExhaustiveIndex::copyless_fit(points.clone());
        let build_graph = || {
            let stats = BuildStats::new(n);
            VamanaIndex::build(points.clone(), config.build.clone(), &stats)
        };

        if n < config.min_size.saturating_mul(2) {
            debug!(depth, size = n, "building leaf");
            return Ok(Self {
                exhaustive,
                graph: build_graph()?,
                left: None,
                right: None,
                split_timestamp: None,
                depth,
            });
        }

        let mid = n / 2;
        let split_timestamp = points.timestamp(mid as u32);
        debug!(depth, size = n, split_timestamp, "splitting node");

        let (graph, (left, right)) = rayon::join(build_graph, || {
            rayon::join(
                || Self::fit(points.slice(0..mid), config, depth + 1),
                || Self::fit(points.slice(mid..n), config, depth + 1),
            )
        });

        Ok(Self {
            exhaustive,
            graph: graph?,
            left: Some(Box::new(left?)),
            right: Some(Box::new(right?)),
            split_timestamp: Some(split_timestamp),
            depth,
        })
    }

    pub fn len(&self) -> usize {
        self.exhaustive.len()
    }

    pub fn is_empty(&self) -> bool {
        self.exhaustive.is_empty()
    }

    pub fn is_leaf(&self) -> bool {
        self.left.is_none() && self.right.is_none()
    }

    pub fn left(&self) -> Option<&PartitionNode> {
        self.left.as_deref()
    }

    pub fn right(&self) -> Option<&PartitionNode> {
        self.right.as_deref()
    }

    pub fn split_timestamp(&self) -> Option<f32> {
        self.split_timestamp
    }

    /// Distance from the root.
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Positions covered in the dataset's timestamp order.
    pub fn span(&self) -> Range<usize> {
        self.exhaustive.points().span()
    }

    pub fn points(&self) -> &Subset {
        self.exhaustive.points()
    }

    pub fn graph(&self) -> &VamanaIndex {
        &self.graph
    }

    pub fn exhaustive(&self) -> &ExhaustiveIndex {
        &self.exhaustive
    }

    /// Approximate k-NN over this node's graph, ignoring timestamps.
    pub fn knn(&self, query: &[f32], k: usize, params: &QueryParams) -> Vec<(u32, f32)> {
        self.graph.knn(query, k, params)
    }

    /// Every timestamp of this node lies inside `range`.
    pub(crate) fn covered_by(&self, range: TimeRange) -> bool {
        self.points()
            .time_bounds()
            .is_some_and(|(first, last)| range.start <= first && range.end >= last)
    }

    /// This node and its descendants, pre-order.
    pub fn descendants(&self) -> Vec<&PartitionNode> {
        let mut out = Vec::new();
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            out.push(node);
            if let Some(r) = node.right() {
                stack.push(r);
            }
            if let Some(l) = node.left() {
                stack.push(l);
            }
        }
        out
    }

    /// Nodes whose span contains sorted position `rank`, root first.
    fn path_to(&self, rank: usize) -> Vec<&PartitionNode> {
        let mut path = Vec::new();
        let mut node = Some(self);
        while let Some(n) = node {
            if !n.span().contains(&rank) {
                break;
            }
            path.push(n);
            node = [n.left(), n.right()]
                .into_iter()
                .flatten()
                .find(|c| c.span().contains(&rank));
        }
        path
    }
}

/// Binary tree of timestamp-partitioned indices over one shared dataset.
///
/// Topology is fixed at build time. Only the graphs inside the nodes change
/// afterwards, through [`MaintenanceOrchestrator`](crate::maintenance::MaintenanceOrchestrator).
#[derive(Debug)]
pub struct PartitionTree {
    root: PartitionNode,
    dataset: Arc<Dataset>,
    config: TemporalConfig,
}

impl PartitionTree {
    /// Build the tree over every ordered point of `dataset`.
    ///
    /// The dataset's identities must be sorted ascending by timestamp. This is
    /// not checked: unsorted input builds a tree that routes queries
    /// incorrectly but never panics.
    pub fn fit(dataset: Dataset, config: TemporalConfig) -> Result<Self> {
        config.validate()?;
        if dataset.is_empty() {
            return Err(RetrieveError::EmptyIndex);
        }

        let started = Instant::now();
        let dataset = Arc::new(dataset);
        let root = PartitionNode::fit(Subset::full(Arc::clone(&dataset)), &config, 0)?;
        let tree = Self {
            root,
            dataset,
            config,
        };

        info!(
            points = tree.len(),
            nodes = tree.nodes().len(),
            depth = tree.depth(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "built partition tree"
        );
        Ok(tree)
    }

    /// Build from vectors whose identities `0..n` are already in timestamp order.
    pub fn fit_sorted(
        vectors: Vec<f32>,
        dimension: usize,
        timestamps: Vec<f32>,
        metric: DistanceMetric,
        config: TemporalConfig,
    ) -> Result<Self> {
        let dataset = Dataset::sorted(vectors, dimension, timestamps, metric)?;
        Self::fit(dataset, config)
    }

    pub fn root(&self) -> &PartitionNode {
        &self.root
    }

    pub fn dataset(&self) -> &Arc<Dataset> {
        &self.dataset
    }

    pub fn config(&self) -> &TemporalConfig {
        &self.config
    }

    pub fn len(&self) -> usize {
        self.root.len()
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_empty()
    }

    pub fn dimension(&self) -> usize {
        self.dataset.dimension()
    }

    /// All nodes, pre-order.
    pub fn nodes(&self) -> Vec<&PartitionNode> {
        self.root.descendants()
    }

    pub fn leaves(&self) -> Vec<&PartitionNode> {
        self.nodes().into_iter().filter(|n| n.is_leaf()).collect()
    }

    /// Depth of the deepest node.
    pub fn depth(&self) -> usize {
        self.nodes().iter().map(|n| n.depth()).max().unwrap_or(0)
    }

    /// Every node holding `id`, root first, with the identity's local position.
    pub fn locate(&self, id: u32) -> Result<Vec<(&PartitionNode, u32)>> {
        let rank = self
            .dataset
            .rank_of(id)
            .ok_or(RetrieveError::UnknownIdentity(id))?;
        Ok(self
            .root
            .path_to(rank)
            .into_iter()
            .map(|node| (node, (rank - node.span().start) as u32))
            .collect())
    }

    /// Approximate k-NN over the root graph, ignoring timestamps.
    pub fn knn(&self, query: &[f32], k: usize) -> Result<Vec<(u32, f32)>> {
        self.knn_with(query, k, &self.config.query)
    }

    /// [`knn`](Self::knn) with explicit query parameters.
    pub fn knn_with(&self, query: &[f32], k: usize, params: &QueryParams) -> Result<Vec<(u32, f32)>> {
        self.dataset.check_query(query)?;
        params.validate()?;
        if k == 0 {
            return Ok(Vec::new());
        }
        Ok(self.root.knn(query, k, params))
    }
}
