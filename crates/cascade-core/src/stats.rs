//! Simulation statistics collection

use glam::IVec2;
use serde::{Deserialize, Serialize};

/// Trait for collecting simulation statistics
///
/// Called once per tick with the tick's totals, and once per section state
/// change.
pub trait SimStats {
    /// Record that a tick completed, including ticks with nothing to simulate
    fn record_tick(&mut self);

    /// Record the number of non-zero liquid transfers in a tick
    fn record_flows(&mut self, count: usize);

    /// Record the number of powder cells that moved in a tick
    fn record_grains_moved(&mut self, count: usize);

    /// Record that a section went quiet and was frozen
    fn record_section_frozen(&mut self, coord: IVec2);

    /// Record that a frozen section was woken
    fn record_section_woken(&mut self, coord: IVec2);
}

/// A no-op implementation for when stats collection is not needed
#[derive(Default)]
pub struct NoopStats;

impl SimStats for NoopStats {
    fn record_tick(&mut self) {}
    fn record_flows(&mut self, _count: usize) {}
    fn record_grains_moved(&mut self, _count: usize) {}
    fn record_section_frozen(&mut self, _coord: IVec2) {}
    fn record_section_woken(&mut self, _coord: IVec2) {}
}

/// Running totals over many ticks
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickCounters {
    pub ticks: u64,
    pub flows: u64,
    pub grains_moved: u64,
    pub sections_frozen: u64,
    pub sections_woken: u64,
}

impl SimStats for TickCounters {
    fn record_tick(&mut self) {
        self.ticks += 1;
    }

    fn record_flows(&mut self, count: usize) {
        self.flows += count as u64;
    }

    fn record_grains_moved(&mut self, count: usize) {
        self.grains_moved += count as u64;
    }

    fn record_section_frozen(&mut self, _coord: IVec2) {
        self.sections_frozen += 1;
    }

    fn record_section_woken(&mut self, _coord: IVec2) {
        self.sections_woken += 1;
    }
}

/// Outcome of one tick
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickReport {
    /// Tick number, starting at 1
    pub tick: u64,
    /// Non-zero liquid transfers
    pub flows: usize,
    /// Powder cells that moved
    pub grains_moved: usize,
    /// Cells whose material or mass changed
    pub changed_cells: usize,
    /// Sections simulated this tick
    pub simulated_sections: usize,
    /// Sections with a pending dirty rect after the tick
    pub dirty_sections: usize,
    /// Sections frozen after the tick
    pub frozen_sections: usize,
    /// Sections that froze during this tick
    pub newly_frozen: usize,
    /// Frozen sections woken during this tick
    pub woken: usize,
    /// Liquid mass in the world after the tick
    pub total_mass: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_noop_stats_all_methods() {
        let mut stats = NoopStats;
        for _ in 0..100 {
            stats.record_tick();
            stats.record_flows(3);
            stats.record_grains_moved(2);
            stats.record_section_frozen(IVec2::ZERO);
            stats.record_section_woken(IVec2::ONE);
        }
    }

    #[test]
    fn test_counters_accumulate() {
        let mut counters = TickCounters::default();
        counters.record_tick();
        counters.record_flows(10);
        counters.record_grains_moved(4);
        counters.record_tick();
        counters.record_flows(5);
        counters.record_grains_moved(0);
        counters.record_section_frozen(IVec2::new(1, 2));
        counters.record_section_woken(IVec2::new(1, 2));
        counters.record_section_woken(IVec2::new(2, 2));

        assert_eq!(counters.ticks, 2);
        assert_eq!(counters.flows, 15);
        assert_eq!(counters.grains_moved, 4);
        assert_eq!(counters.sections_frozen, 1);
        assert_eq!(counters.sections_woken, 2);
    }

    #[test]
    fn test_flows_do_not_count_ticks() {
        let mut counters = TickCounters::default();
        counters.record_flows(3);
        counters.record_flows(0);
        assert_eq!(counters.ticks, 0);
        assert_eq!(counters.flows, 3);

        counters.record_tick();
        assert_eq!(counters.ticks, 1);
    }
}
