//! Per-slot liveness for streaming deletes.
//!
//! Every local position of a graph is a slot in one of three states:
//!
//! ```text
//!            insert              lazy_delete            end_delete_epoch
//!   Free ────────────► Active ────────────► Tombstoned ────────────────► Free
//! ```
//!
//! Tombstoned slots are excluded from results but keep their adjacency so that
//! in-flight searches can still route through them. States are atomics so that
//! searches read them without taking any lock.

use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};

/// Liveness of a graph slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SlotState {
    /// Not part of the graph.
    Free = 0,
    /// Searchable and returned in results.
    Active = 1,
    /// Soft-deleted: traversable, never returned.
    Tombstoned = 2,
}

impl SlotState {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => SlotState::Active,
            2 => SlotState::Tombstoned,
            _ => SlotState::Free,
        }
    }
}

/// Slot states for one graph.
#[derive(Debug)]
pub(crate) struct SlotTable {
    states: Vec<AtomicU8>,
    active: AtomicUsize,
    tombstoned: AtomicUsize,
}

impl SlotTable {
    /// All slots start `Free`.
    pub(crate) fn new(len: usize) -> Self {
        Self {
            states: (0..len).map(|_| AtomicU8::new(SlotState::Free as u8)).collect(),
            active: AtomicUsize::new(0),
            tombstoned: AtomicUsize::new(0),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.states.len()
    }

    #[inline]
    pub(crate) fn get(&self, slot: u32) -> SlotState {
        self.states
            .get(slot as usize)
            .map_or(SlotState::Free, |s| SlotState::from_u8(s.load(Ordering::Acquire)))
    }

    #[inline]
    pub(crate) fn is_active(&self, slot: u32) -> bool {
        self.get(slot) == SlotState::Active
    }

    /// Part of the graph (active or tombstoned).
    #[inline]
    pub(crate) fn is_present(&self, slot: u32) -> bool {
        self.get(slot) != SlotState::Free
    }

    fn transition(&self, slot: u32, from: SlotState, to: SlotState) -> bool {
        let Some(state) = self.states.get(slot as usize) else {
            return false;
        };
        state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Free -> Active. Returns false if the slot was not free.
    pub(crate) fn activate(&self, slot: u32) -> bool {
        let ok = self.transition(slot, SlotState::Free, SlotState::Active);
        if ok {
            self.active.fetch_add(1, Ordering::Relaxed);
        }
        ok
    }

    /// Active -> Tombstoned. Returns true if the slot was newly deleted.
    pub(crate) fn tombstone(&self, slot: u32) -> bool {
        let ok = self.transition(slot, SlotState::Active, SlotState::Tombstoned);
        if ok {
            self.active.fetch_sub(1, Ordering::Relaxed);
            self.tombstoned.fetch_add(1, Ordering::Relaxed);
        }
        ok
    }

    /// Tombstoned -> Free.
    pub(crate) fn release(&self, slot: u32) -> bool {
        let ok = self.transition(slot, SlotState::Tombstoned, SlotState::Free);
        if ok {
            self.tombstoned.fetch_sub(1, Ordering::Relaxed);
        }
        ok
    }

    /// All tombstoned slots.
    pub(crate) fn tombstones(&self) -> impl Iterator<Item = u32> + '_ {
        (0..self.states.len() as u32).filter(|&s| self.get(s) == SlotState::Tombstoned)
    }

    pub(crate) fn active_count(&self) -> usize {
        self.active.load(Ordering::Relaxed)
    }

    pub(crate) fn tombstone_count(&self) -> usize {
        self.tombstoned.load(Ordering::Relaxed)
    }

    pub(crate) fn stats(&self) -> TombstoneStats {
        let count = self.tombstone_count();
        let present = count + self.active_count();
        TombstoneStats {
            count,
            present,
            ratio: if present > 0 {
                count as f32 / present as f32
            } else {
                0.0
            },
        }
    }
}

/// Statistics about tombstone state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TombstoneStats {
    /// Number of tombstoned nodes
    pub count: usize,
    /// Active plus tombstoned nodes
    pub present: usize,
    /// Ratio of tombstones to present nodes
    pub ratio: f32,
}
