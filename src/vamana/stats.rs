//! Build and graph statistics.

use std::sync::atomic::{AtomicU32, Ordering};

/// Per-slot search effort recorded while inserting.
///
/// Each insert records how many nodes its candidate search expanded and how many
/// distances it computed. Slots that were never inserted report zero.
#[derive(Debug)]
pub struct BuildStats {
    visited: Vec<AtomicU32>,
    distances: Vec<AtomicU32>,
}

impl BuildStats {
    pub fn new(len: usize) -> Self {
        Self {
            visited: (0..len).map(|_| AtomicU32::new(0)).collect(),
            distances: (0..len).map(|_| AtomicU32::new(0)).collect(),
        }
    }

    pub(crate) fn record(&self, slot: u32, visited: usize, distances: usize) {
        if let Some(v) = self.visited.get(slot as usize) {
            v.store(visited.min(u32::MAX as usize) as u32, Ordering::Relaxed);
        }
        if let Some(d) = self.distances.get(slot as usize) {
            d.store(distances.min(u32::MAX as usize) as u32, Ordering::Relaxed);
        }
    }

    /// (average, 99th percentile) of visited counts.
    pub fn visited_stats(&self) -> [f64; 2] {
        summarize(&self.visited)
    }

    /// (average, 99th percentile) of distance comparisons.
    pub fn distance_stats(&self) -> [f64; 2] {
        summarize(&self.distances)
    }
}

fn summarize(values: &[AtomicU32]) -> [f64; 2] {
    if values.is_empty() {
        return [0.0, 0.0];
    }
    let mut v: Vec<u32> = values.iter().map(|x| x.load(Ordering::Relaxed)).collect();
    v.sort_unstable();
    let avg = v.iter().map(|&x| x as f64).sum::<f64>() / v.len() as f64;
    let tail_idx = ((v.len() as f64 * 0.99) as usize).min(v.len() - 1);
    [avg, v[tail_idx] as f64]
}

/// Shape of a graph.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GraphStats {
    /// Slots (local positions) in the graph.
    pub size: usize,
    /// Active nodes.
    pub active: usize,
    /// Tombstoned nodes.
    pub tombstoned: usize,
    /// Mean out-degree over active nodes.
    pub avg_degree: f64,
    /// Largest out-degree.
    pub max_degree: usize,
}
