//! The Vamana graph index.

use super::prune::robust_prune;
use super::search::{beam_search, QueryParams, SearchOutcome};
use super::stats::{BuildStats, GraphStats};
use super::tombstones::{SlotState, SlotTable, TombstoneStats};
use super::{Adjacency, BuildParams};
use crate::error::{Result, RetrieveError};
use crate::points::Subset;
use parking_lot::{Mutex, RwLock};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rayon::prelude::*;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use tracing::debug;

const NO_START: u32 = u32::MAX;

/// Generation token for one delete epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeleteEpoch(u64);

impl DeleteEpoch {
    pub fn generation(&self) -> u64 {
        self.0
    }
}

#[derive(Debug, Default)]
struct EpochState {
    open: Option<DeleteEpoch>,
    consolidated: bool,
}

/// Result of one consolidation.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ConsolidateStats {
    /// Tombstones removed from adjacency lists.
    pub tombstones: usize,
    /// Active nodes whose adjacency was rewritten.
    pub rewired: usize,
    /// Rewired nodes that ended with fewer edges than before.
    pub under_degree: usize,
}

/// Degree-bounded navigable graph over the local positions of a [`Subset`].
///
/// All operations take `&self`: adjacency lists sit behind per-slot locks and
/// slot states are atomics, so searches and inserts run concurrently.
/// Consolidation must not overlap inserts; that ordering is enforced by the
/// delete epoch (inserts are rejected while an epoch is open).
pub struct VamanaIndex {
    points: Subset,
    params: BuildParams,
    adjacency: Vec<RwLock<Adjacency>>,
    slots: SlotTable,
    start: AtomicU32,
    epoch: Mutex<EpochState>,
    next_epoch: AtomicU64,
}

impl std::fmt::Debug for VamanaIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VamanaIndex")
            .field("len", &self.len())
            .field("active", &self.slots.active_count())
            .field("tombstoned", &self.slots.tombstone_count())
            .field("start", &self.start_point())
            .finish()
    }
}

impl VamanaIndex {
    /// Empty graph over `points`: every slot starts free.
    pub fn new(points: Subset, params: BuildParams) -> Result<Self> {
        params.validate()?;
        let n = points.len();
        Ok(Self {
            adjacency: (0..n).map(|_| RwLock::new(Adjacency::new())).collect(),
            slots: SlotTable::new(n),
            points,
            params,
            start: AtomicU32::new(NO_START),
            epoch: Mutex::new(EpochState::default()),
            next_epoch: AtomicU64::new(0),
        })
    }

    /// Create and build a graph over every point of `points`.
    pub fn build(points: Subset, params: BuildParams, stats: &BuildStats) -> Result<Self> {
        let mut index = Self::new(points, params)?;
        index.build_index(stats)?;
        Ok(index)
    }

    /// Insert every slot, starting from the medoid.
    ///
    /// Only valid on a graph with no present nodes and no open epoch.
    pub fn build_index(&mut self, stats: &BuildStats) -> Result<()> {
        if self.epoch.lock().open.is_some() {
            return Err(RetrieveError::InvalidState {
                operation: "build",
                state: "inside a delete epoch".into(),
            });
        }
        if self.slots.active_count() + self.slots.tombstone_count() > 0 {
            return Err(RetrieveError::InvalidState {
                operation: "build",
                state: "already built".into(),
            });
        }
        let n = self.len();
        if n == 0 {
            return Err(RetrieveError::EmptyIndex);
        }

        let medoid = self.find_medoid();
        self.slots.activate(medoid);
        self.start.store(medoid, Ordering::Release);

        let mut order: Vec<u32> = (0..n as u32).filter(|&s| s != medoid).collect();
        order.shuffle(&mut StdRng::seed_from_u64(self.params.seed));

        for pass in 0..self.params.num_passes {
            let alpha = if pass + 1 == self.params.num_passes {
                self.params.alpha
            } else {
                1.0
            };
            self.batch_insert(&order, alpha, stats);
        }

        debug!(
            size = n,
            passes = self.params.num_passes,
            avg_visited = stats.visited_stats()[0],
            "built vamana graph"
        );
        Ok(())
    }

    /// Number of slots (points in the subset).
    pub fn len(&self) -> usize {
        self.adjacency.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adjacency.is_empty()
    }

    pub fn points(&self) -> &Subset {
        &self.points
    }

    pub fn params(&self) -> &BuildParams {
        &self.params
    }

    /// Entry point of searches.
    pub fn start_point(&self) -> Option<u32> {
        match self.start.load(Ordering::Acquire) {
            NO_START => None,
            s => Some(s),
        }
    }

    pub fn slot_state(&self, slot: u32) -> SlotState {
        self.slots.get(slot)
    }

    /// Slot may appear in results.
    #[inline]
    pub fn is_live(&self, slot: u32) -> bool {
        self.slots.is_active(slot)
    }

    /// Copy of a node's adjacency list.
    pub fn neighbors(&self, slot: u32) -> Adjacency {
        self.adjacency
            .get(slot as usize)
            .map(|a| a.read().clone())
            .unwrap_or_default()
    }

    /// The open delete epoch, if any.
    pub fn current_epoch(&self) -> Option<DeleteEpoch> {
        self.epoch.lock().open
    }

    pub fn tombstone_stats(&self) -> TombstoneStats {
        self.slots.stats()
    }

    pub fn stats(&self) -> GraphStats {
        let (total, max) = (0..self.len() as u32)
            .into_par_iter()
            .filter(|&s| self.slots.is_active(s))
            .map(|s| {
                let d = self.adjacency[s as usize].read().len();
                (d, d)
            })
            .reduce(|| (0, 0), |a, b| (a.0 + b.0, a.1.max(b.1)));
        let active = self.slots.active_count();
        GraphStats {
            size: self.len(),
            active,
            tombstoned: self.slots.tombstone_count(),
            avg_degree: if active > 0 {
                total as f64 / active as f64
            } else {
                0.0
            },
            max_degree: max,
        }
    }

    /// Beam search from the entry point.
    ///
    /// Tombstoned nodes are traversed but removed from the returned frontier.
    pub fn search(&self, query: &[f32], params: &QueryParams) -> SearchOutcome {
        let Some(start) = self.start_point() else {
            return SearchOutcome::default();
        };
        let mut outcome = beam_search(
            &[start],
            params,
            |n| self.present_neighbors(n),
            |n| {
                self.slots
                    .is_present(n)
                    .then(|| self.points.distance(query, n))
            },
        );
        outcome.frontier.retain(|&(n, _)| self.slots.is_active(n));
        outcome
    }

    /// k nearest live neighbors, as global identities.
    pub fn knn(&self, query: &[f32], k: usize, params: &QueryParams) -> Vec<(u32, f32)> {
        self.search(query, params)
            .frontier
            .into_iter()
            .take(k)
            .map(|(n, d)| (self.points.real_index(n), d))
            .collect()
    }

    /// Insert free slots into the graph. Active slots are skipped.
    ///
    /// Returns the number of slots inserted.
    pub fn insert(&self, slots: &[u32], stats: &BuildStats) -> Result<usize> {
        if self.epoch.lock().open.is_some() {
            return Err(RetrieveError::InvalidState {
                operation: "insert",
                state: "inside a delete epoch".into(),
            });
        }
        if let Some(&bad) = slots.iter().find(|&&s| s as usize >= self.len()) {
            return Err(RetrieveError::InvalidParameter(format!(
                "slot {bad} out of range for graph of {} nodes",
                self.len()
            )));
        }

        let mut seen = HashSet::with_capacity(slots.len());
        let fresh: Vec<u32> = slots
            .iter()
            .copied()
            .filter(|&s| seen.insert(s) && self.slots.get(s) == SlotState::Free)
            .collect();
        if fresh.len() < slots.len() {
            debug!(
                skipped = slots.len() - fresh.len(),
                "insert skipped slots already in the graph"
            );
        }

        self.batch_insert(&fresh, self.params.alpha, stats);
        Ok(fresh.len())
    }

    /// Mark slots as deleted. Returns how many were newly tombstoned.
    ///
    /// Free and already-deleted slots are ignored. Rejected while an epoch is
    /// open, so the set being consolidated cannot grow.
    pub fn lazy_delete(&self, slots: &[u32]) -> Result<usize> {
        if self.epoch.lock().open.is_some() {
            return Err(RetrieveError::InvalidState {
                operation: "lazy delete",
                state: "inside a delete epoch".into(),
            });
        }
        Ok(slots.iter().filter(|&&s| self.slots.tombstone(s)).count())
    }

    /// Open a delete epoch.
    pub fn start_delete_epoch(&self) -> Result<DeleteEpoch> {
        let mut state = self.epoch.lock();
        if let Some(open) = state.open {
            return Err(RetrieveError::InvalidState {
                operation: "start a delete epoch",
                state: format!("inside delete epoch {}", open.0),
            });
        }
        let epoch = DeleteEpoch(self.next_epoch.fetch_add(1, Ordering::Relaxed) + 1);
        state.open = Some(epoch);
        state.consolidated = false;
        Ok(epoch)
    }

    /// Remove tombstones from every active node's adjacency.
    ///
    /// An edge into a tombstone is replaced by that tombstone's own active
    /// neighbors; the merged pool is re-pruned to `max_degree`. Tombstones keep
    /// their own lists until the epoch ends.
    pub fn consolidate(&self) -> Result<ConsolidateStats> {
        if self.epoch.lock().open.is_none() {
            return Err(RetrieveError::InvalidState {
                operation: "consolidate",
                state: "outside a delete epoch".into(),
            });
        }

        let tombstones = self.slots.tombstone_count();
        let max_degree = self.params.max_degree;
        let alpha = self.params.alpha;

        let rewired: Vec<(u32, Adjacency, usize)> = (0..self.len() as u32)
            .into_par_iter()
            .filter(|&p| self.slots.is_active(p))
            .filter_map(|p| {
                let old = self.adjacency[p as usize].read().clone();
                if old.iter().all(|&x| self.slots.is_active(x)) {
                    return None;
                }

                let mut seen: HashSet<u32> = HashSet::with_capacity(old.len() * 2);
                let mut pool: Vec<(u32, f32)> = Vec::with_capacity(old.len() * 2);
                let mut offer = |y: u32| {
                    if y != p && self.slots.is_active(y) && seen.insert(y) {
                        pool.push((y, self.points.distance_between(p, y)));
                    }
                };
                for &x in old.iter() {
                    match self.slots.get(x) {
                        SlotState::Active => offer(x),
                        SlotState::Tombstoned => {
                            for &y in self.adjacency[x as usize].read().iter() {
                                offer(y);
                            }
                        }
                        SlotState::Free => {}
                    }
                }

                let new = if pool.len() > max_degree {
                    robust_prune(p, &mut pool, alpha, max_degree, |a, b| {
                        self.points.distance_between(a, b)
                    })
                } else {
                    pool.iter().map(|&(y, _)| y).collect()
                };
                Some((p, new, old.len()))
            })
            .collect();

        let under_degree = rewired.iter().filter(|(_, new, old)| new.len() < *old).count();
        let rewired_count = rewired.len();
        for (p, new, _) in rewired {
            *self.adjacency[p as usize].write() = new;
        }

        self.relocate_start();
        self.epoch.lock().consolidated = true;

        let stats = ConsolidateStats {
            tombstones,
            rewired: rewired_count,
            under_degree,
        };
        debug!(?stats, "consolidated graph");
        Ok(stats)
    }

    /// Close the epoch and free every tombstoned slot.
    ///
    /// Returns the number of freed slots. Requires a consolidation inside this
    /// epoch, otherwise active nodes could still point at freed slots.
    pub fn end_delete_epoch(&self, epoch: DeleteEpoch) -> Result<usize> {
        let mut state = self.epoch.lock();
        if state.open != Some(epoch) {
            return Err(RetrieveError::InvalidState {
                operation: "end a delete epoch",
                state: format!("not inside delete epoch {}", epoch.0),
            });
        }
        if !state.consolidated {
            return Err(RetrieveError::InvalidState {
                operation: "end a delete epoch",
                state: "not yet consolidated".into(),
            });
        }

        let dead: Vec<u32> = self.slots.tombstones().collect();
        for &t in &dead {
            self.adjacency[t as usize].write().clear();
            self.slots.release(t);
        }
        if let Some(s) = self.start_point() {
            if !self.slots.is_present(s) {
                self.start.store(NO_START, Ordering::Release);
            }
        }

        state.open = None;
        state.consolidated = false;
        Ok(dead.len())
    }

    /// Close `epoch` without freeing anything. Tombstones stay tombstoned and
    /// hidden; a later epoch frees them.
    pub fn abandon_delete_epoch(&self, epoch: DeleteEpoch) -> Result<()> {
        let mut state = self.epoch.lock();
        if state.open != Some(epoch) {
            return Err(RetrieveError::InvalidState {
                operation: "abandon a delete epoch",
                state: format!("not inside delete epoch {}", epoch.0),
            });
        }
        state.open = None;
        state.consolidated = false;
        Ok(())
    }

    fn present_neighbors(&self, slot: u32) -> Option<Adjacency> {
        if !self.slots.is_present(slot) {
            return None;
        }
        self.adjacency.get(slot as usize).map(|a| a.read().clone())
    }

    /// Insert slots in batches of doubling size, each batch in parallel.
    fn batch_insert(&self, slots: &[u32], alpha: f32, stats: &BuildStats) {
        let max_batch = ((self.len() as f32 * self.params.max_batch_fraction) as usize).max(1);
        let mut done = 0;
        let mut batch = 1;
        while done < slots.len() {
            let end = (done + batch).min(slots.len());
            slots[done..end]
                .par_iter()
                .for_each(|&s| self.insert_one(s, alpha, stats));
            done = end;
            batch = (batch * 2).min(max_batch);
        }
    }

    /// Search for candidates, prune, set out-edges, add back edges.
    ///
    /// Also used to refine slots that are already active.
    fn insert_one(&self, slot: u32, alpha: f32, stats: &BuildStats) {
        if self
            .start
            .compare_exchange(NO_START, slot, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            self.slots.activate(slot);
            return;
        }

        let query = self.points.vector(slot);
        let l = self.params.build_beam_width;
        let params = QueryParams::new(l, l, 1.0, usize::MAX, usize::MAX);
        let outcome = self.search_candidates(query, &params);
        stats.record(slot, outcome.visited.len(), outcome.distance_comparisons);

        let mut candidates = outcome.visited;
        for &n in self.adjacency[slot as usize].read().iter() {
            if self.slots.is_present(n) {
                candidates.push((n, self.points.distance_between(slot, n)));
            }
        }
        let out = robust_prune(slot, &mut candidates, alpha, self.params.max_degree, |a, b| {
            self.points.distance_between(a, b)
        });

        *self.adjacency[slot as usize].write() = out.clone();
        self.slots.activate(slot);

        for &j in out.iter() {
            self.add_back_edge(j, slot, alpha);
        }
    }

    /// Search that keeps tombstones in the frontier (they are valid waypoints).
    fn search_candidates(&self, query: &[f32], params: &QueryParams) -> SearchOutcome {
        let Some(start) = self.start_point() else {
            return SearchOutcome::default();
        };
        beam_search(
            &[start],
            params,
            |n| self.present_neighbors(n),
            |n| {
                self.slots
                    .is_present(n)
                    .then(|| self.points.distance(query, n))
            },
        )
    }

    fn add_back_edge(&self, from: u32, to: u32, alpha: f32) {
        let max_degree = self.params.max_degree;
        let mut adj = self.adjacency[from as usize].write();
        if adj.contains(&to) {
            return;
        }
        if adj.len() < max_degree {
            adj.push(to);
            return;
        }
        let mut pool: Vec<(u32, f32)> = adj
            .iter()
            .chain(std::iter::once(&to))
            .map(|&n| (n, self.points.distance_between(from, n)))
            .collect();
        *adj = robust_prune(from, &mut pool, alpha, max_degree, |a, b| {
            self.points.distance_between(a, b)
        });
    }

    /// Slot closest to the centroid.
    fn find_medoid(&self) -> u32 {
        let n = self.len();
        let dim = self.points.dataset().dimension();
        let sum = (0..n as u32)
            .into_par_iter()
            .fold(
                || vec![0.0f64; dim],
                |mut acc, s| {
                    for (a, &x) in acc.iter_mut().zip(self.points.vector(s)) {
                        *a += x as f64;
                    }
                    acc
                },
            )
            .reduce(
                || vec![0.0f64; dim],
                |mut a, b| {
                    for (x, y) in a.iter_mut().zip(b) {
                        *x += y;
                    }
                    a
                },
            );
        let centroid: Vec<f32> = sum.iter().map(|&x| (x / n as f64) as f32).collect();

        (0..n as u32)
            .into_par_iter()
            .map(|s| (self.points.distance(&centroid, s), s))
            .min_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)))
            .map_or(0, |(_, s)| s)
    }

    /// Move the entry point off a tombstone.
    fn relocate_start(&self) {
        let Some(start) = self.start_point() else {
            return;
        };
        if self.slots.is_active(start) {
            return;
        }

        // Breadth-first through the old entry's neighborhood first.
        let mut queue = std::collections::VecDeque::from([start]);
        let mut seen = HashSet::from([start]);
        while let Some(n) = queue.pop_front() {
            if seen.len() > 4 * self.params.max_degree * self.params.max_degree {
                break;
            }
            for &m in self.adjacency[n as usize].read().iter() {
                if self.slots.is_active(m) {
                    self.start.store(m, Ordering::Release);
                    return;
                }
                if self.slots.is_present(m) && seen.insert(m) {
                    queue.push_back(m);
                }
            }
        }

        let fallback = (0..self.len() as u32)
            .into_par_iter()
            .find_first(|&s| self.slots.is_active(s));
        // Keep the tombstoned start if nothing is alive; it is cleared at epoch end.
        if let Some(s) = fallback {
            self.start.store(s, Ordering::Release);
        }
    }
}
