//! Orchestrator driving delete / consolidate / re-insert across every graph.

use super::ops::{add_consolidation, CycleStats};
use super::MaintenanceState;
use crate::error::{Result, RetrieveError};
use crate::temporal::PartitionTree;
use crate::vamana::{BuildStats, ConsolidateStats, DeleteEpoch, TombstoneStats};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// Runs the maintenance cycle over a shared [`PartitionTree`].
///
/// The orchestrator is the only writer. Readers clone the `Arc` from
/// [`tree`](Self::tree) and query concurrently; the state machine keeps
/// consolidation and epoch close from overlapping inserts.
///
/// # Example
///
/// ```rust,ignore
/// let tree = Arc::new(PartitionTree::fit(dataset, TemporalConfig::default())?);
/// let mut maint = MaintenanceOrchestrator::new(Arc::clone(&tree));
///
/// let batch: Vec<u32> = (0..1000).collect();
/// maint.lazy_delete(&batch)?;
/// maint.start_delete_epoch()?;
/// maint.consolidate()?;
/// maint.end_delete_epoch()?;
/// maint.insert(&batch)?;
/// ```
#[derive(Debug)]
pub struct MaintenanceOrchestrator {
    tree: Arc<PartitionTree>,
    state: MaintenanceState,
    /// Open epoch per graph, in pre-order node order.
    epochs: Vec<DeleteEpoch>,
}

impl MaintenanceOrchestrator {
    pub fn new(tree: Arc<PartitionTree>) -> Self {
        Self {
            tree,
            state: MaintenanceState::Steady,
            epochs: Vec::new(),
        }
    }

    pub fn tree(&self) -> &Arc<PartitionTree> {
        &self.tree
    }

    pub fn state(&self) -> MaintenanceState {
        self.state
    }

    /// Tombstones in the root graph (every identity lives there).
    pub fn tombstone_stats(&self) -> TombstoneStats {
        self.tree.root().graph().tombstone_stats()
    }

    fn guard(&self, operation: &'static str, allowed: bool) -> Result<()> {
        if allowed {
            Ok(())
        } else {
            Err(RetrieveError::InvalidState {
                operation,
                state: self.state.to_string(),
            })
        }
    }

    /// Local slots of `ids` for each node, in pre-order node order.
    fn resolve(&self, ids: &[u32]) -> Result<Vec<Vec<u32>>> {
        let dataset = self.tree.dataset();
        if let Some(&unknown) = ids.iter().find(|&&id| dataset.rank_of(id).is_none()) {
            return Err(RetrieveError::UnknownIdentity(unknown));
        }
        Ok(self
            .tree
            .nodes()
            .iter()
            .map(|node| {
                ids.iter()
                    .filter_map(|&id| node.points().local_of(id))
                    .collect()
            })
            .collect())
    }

    /// Tombstone `ids` in every graph containing them.
    ///
    /// Returns the number of identities newly deleted. Already-deleted and
    /// free identities are ignored.
    pub fn lazy_delete(&mut self, ids: &[u32]) -> Result<usize> {
        self.guard(
            "lazy delete",
            matches!(self.state, MaintenanceState::Steady | MaintenanceState::Deleting),
        )?;
        let slots = self.resolve(ids)?;

        let mut deleted = 0;
        for (i, (node, locals)) in self.tree.nodes().into_iter().zip(&slots).enumerate() {
            let n = node.graph().lazy_delete(locals)?;
            if i == 0 {
                deleted = n;
            }
        }
        self.state = MaintenanceState::Deleting;
        debug!(requested = ids.len(), deleted, "lazy delete");
        Ok(deleted)
    }

    /// Open a delete epoch on every graph.
    pub fn start_delete_epoch(&mut self) -> Result<()> {
        self.guard(
            "start a delete epoch",
            matches!(self.state, MaintenanceState::Steady | MaintenanceState::Deleting),
        )?;
        let nodes = self.tree.nodes();
        let mut epochs = Vec::with_capacity(nodes.len());
        for node in &nodes {
            match node.graph().start_delete_epoch() {
                Ok(epoch) => epochs.push(epoch),
                Err(err) => {
                    // Leave no graph holding an epoch this orchestrator cannot close.
                    for (opened, epoch) in nodes.iter().zip(epochs) {
                        opened.graph().abandon_delete_epoch(epoch)?;
                    }
                    return Err(err);
                }
            }
        }
        self.epochs = epochs;
        self.state = MaintenanceState::EpochOpen {
            consolidated: false,
        };
        Ok(())
    }

    /// Rewire every graph around its tombstones.
    pub fn consolidate(&mut self) -> Result<ConsolidateStats> {
        self.guard(
            "consolidate",
            matches!(self.state, MaintenanceState::EpochOpen { .. }),
        )?;
        let mut total = ConsolidateStats::default();
        for node in self.tree.nodes() {
            add_consolidation(&mut total, &node.graph().consolidate()?);
        }
        self.state = MaintenanceState::EpochOpen { consolidated: true };
        Ok(total)
    }

    /// Close the epoch on every graph and free the tombstoned slots.
    ///
    /// Returns the number of identities freed.
    pub fn end_delete_epoch(&mut self) -> Result<usize> {
        self.guard(
            "end a delete epoch",
            self.state == MaintenanceState::EpochOpen { consolidated: true },
        )?;
        let mut freed = 0;
        for (i, (node, &epoch)) in self.tree.nodes().into_iter().zip(&self.epochs).enumerate() {
            let n = node.graph().end_delete_epoch(epoch)?;
            if i == 0 {
                freed = n;
            }
        }
        self.epochs.clear();
        self.state = MaintenanceState::Steady;
        Ok(freed)
    }

    /// Re-insert `ids` into every graph containing them.
    ///
    /// Identities still present in the graphs are skipped. Returns the number
    /// of identities inserted.
    pub fn insert(&mut self, ids: &[u32]) -> Result<usize> {
        self.guard("insert", self.state == MaintenanceState::Steady)?;
        let slots = self.resolve(ids)?;

        let mut inserted = 0;
        for (i, (node, locals)) in self.tree.nodes().into_iter().zip(&slots).enumerate() {
            let stats = BuildStats::new(node.len());
            let n = node.graph().insert(locals, &stats)?;
            if i == 0 {
                inserted = n;
            }
        }
        debug!(requested = ids.len(), inserted, "insert");
        Ok(inserted)
    }

    /// Delete, consolidate, free and re-insert one batch.
    pub fn run_cycle(&mut self, ids: &[u32]) -> Result<CycleStats> {
        let started = Instant::now();
        let deleted = self.lazy_delete(ids)?;
        self.start_delete_epoch()?;
        let consolidation = self.consolidate()?;
        let freed = self.end_delete_epoch()?;
        let reinserted = self.insert(ids)?;

        let stats = CycleStats {
            cycles: 1,
            deleted,
            freed,
            reinserted,
            consolidation,
            duration_us: started.elapsed().as_micros() as u64,
        };
        info!(
            batch = ids.len(),
            deleted,
            freed,
            reinserted,
            rewired = stats.consolidation.rewired,
            under_degree = stats.consolidation.under_degree,
            duration_us = stats.duration_us,
            "maintenance cycle"
        );
        Ok(stats)
    }

    /// Split `ids` into `parts` near-equal batches and run a cycle for each.
    pub fn run_rolling_cycles(&mut self, ids: &[u32], parts: usize) -> Result<CycleStats> {
        if parts == 0 {
            return Err(RetrieveError::InvalidParameter(
                "parts must be at least 1".into(),
            ));
        }
        let mut total = CycleStats::default();
        if ids.is_empty() {
            return Ok(total);
        }
        let batch = ids.len().div_ceil(parts);
        for chunk in ids.chunks(batch) {
            total.merge(&self.run_cycle(chunk)?);
        }
        info!(
            parts,
            cycles = total.cycles,
            reinserted = total.reinserted,
            duration_us = total.duration_us,
            "rolling maintenance finished"
        );
        Ok(total)
    }
}
