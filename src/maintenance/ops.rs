//! Counters reported by maintenance cycles.

use crate::vamana::ConsolidateStats;

/// Statistics from one or more maintenance cycles.
///
/// Counts are per identity (taken at the root graph, which holds every
/// identity), except `consolidation`, which sums over every graph.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CycleStats {
    pub cycles: usize,
    pub deleted: usize,
    pub freed: usize,
    pub reinserted: usize,
    pub consolidation: ConsolidateStats,
    /// Wall time (microseconds).
    pub duration_us: u64,
}

impl CycleStats {
    pub fn merge(&mut self, other: &CycleStats) {
        self.cycles += other.cycles;
        self.deleted += other.deleted;
        self.freed += other.freed;
        self.reinserted += other.reinserted;
        add_consolidation(&mut self.consolidation, &other.consolidation);
        self.duration_us += other.duration_us;
    }
}

pub(crate) fn add_consolidation(into: &mut ConsolidateStats, other: &ConsolidateStats) {
    into.tombstones += other.tombstones;
    into.rewired += other.rewired;
    into.under_degree += other.under_degree;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_accumulates() {
        let one = CycleStats {
            cycles: 1,
            deleted: 10,
            freed: 10,
            reinserted: 10,
            consolidation: ConsolidateStats {
                tombstones: 30,
                rewired: 7,
                under_degree: 1,
            },
            duration_us: 5,
        };
        let mut total = CycleStats::default();
        total.merge(&one);
        total.merge(&one);
        assert_eq!(total.cycles, 2);
        assert_eq!(total.reinserted, 20);
        assert_eq!(total.consolidation.rewired, 14);
        assert_eq!(total.duration_us, 10);
    }
}
