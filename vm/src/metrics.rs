//! Per-side counters and the snapshots derived from them.

use std::fmt::{Display, Formatter};

use crate::page_replacer::Outcome;
use crate::page_table::PageTable;

/// Monotonic counters of one side.
#[derive(Clone, Default, Debug, PartialEq, Eq)]
pub struct Metrics {
    pub hits: u64,
    pub misses: u64,
    /// Simulated seconds spent servicing misses.
    pub thrash_secs: u64,
    /// Simulated seconds elapsed on this side.
    pub clock_secs: u64,
    /// Running total of internal fragmentation across live allocations.
    pub fragmentation_bytes: u64,
    pub procs_running: usize,
    pub procs_done: usize,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// A hit costs one second, a miss the disk service cost.
    pub fn record_access(&mut self, outcome: &Outcome, disk_cost_secs: u64) {
        if outcome.is_hit() {
            self.hits += 1;
            self.clock_secs += 1;
        } else {
            self.misses += 1;
            self.thrash_secs += disk_cost_secs;
            self.clock_secs += disk_cost_secs;
        }
    }

    pub fn thrash_pct(&self) -> u64 {
        percent(self.thrash_secs, self.clock_secs.max(1))
    }
}

fn percent(part: u64, whole: u64) -> u64 {
    if whole == 0 {
        return 0;
    }
    (100.0 * part as f64 / whole as f64).round() as u64
}

/// State summary of one side after one operation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Snapshot {
    pub time: u64,
    /// `<TAG>:<operation>`.
    pub label: String,
    pub tag: String,
    pub ram_kb: u64,
    pub vram_kb: u64,
    pub occupied_frames: usize,
    pub free_frames: usize,
    pub pages_loaded: usize,
    pub pages_unloaded: usize,
    pub fragmentation_kb: u64,
    pub hits: u64,
    pub misses: u64,
    pub thrash_secs: u64,
    pub thrash_pct: u64,
    pub ram_pct: u64,
    pub vram_pct: u64,
    pub procs_running: usize,
    pub procs_done: usize,
}

impl Snapshot {
    pub fn capture(tag: &str, label: String, table: &PageTable, metrics: &Metrics, page_size_kb: u64) -> Self {
        let total_frames = table.frames().len();
        let occupied_frames = table.occupied_frames();
        let pages_loaded = table.resident_pages();
        let pages_unloaded = table.non_resident_pages();
        let total_pages = pages_loaded + pages_unloaded;

        Snapshot {
            time: metrics.clock_secs,
            label,
            tag: tag.to_string(),
            ram_kb: occupied_frames as u64 * page_size_kb,
            vram_kb: pages_unloaded as u64 * page_size_kb,
            occupied_frames,
            free_frames: total_frames - occupied_frames,
            pages_loaded,
            pages_unloaded,
            fragmentation_kb: (metrics.fragmentation_bytes as f64 / 1024.0).round() as u64,
            hits: metrics.hits,
            misses: metrics.misses,
            thrash_secs: metrics.thrash_secs,
            thrash_pct: metrics.thrash_pct(),
            ram_pct: percent(occupied_frames as u64, total_frames as u64),
            vram_pct: percent(pages_unloaded as u64, total_pages as u64),
            procs_running: metrics.procs_running,
            procs_done: metrics.procs_done,
        }
    }
}

impl Display for Snapshot {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{:>6}s] {:<24} ram={}KB ({}%) vram={}KB ({}%) hits={} misses={} thrash={}s ({}%) frag={}KB procs={}/{}",
            self.time,
            self.label,
            self.ram_kb,
            self.ram_pct,
            self.vram_kb,
            self.vram_pct,
            self.hits,
            self.misses,
            self.thrash_secs,
            self.thrash_pct,
            self.fragmentation_kb,
            self.procs_running,
            self.procs_done,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thrash_share_of_clock() {
        let mut metrics = Metrics::new();
        metrics.record_access(&Outcome::MissLoad { frame: 0 }, 5);
        metrics.record_access(&Outcome::Hit { frame: 0 }, 5);
        metrics.record_access(&Outcome::Hit { frame: 0 }, 5);

        assert_eq!((metrics.hits, metrics.misses), (2, 1));
        assert_eq!(metrics.clock_secs, 7);
        assert_eq!(metrics.thrash_secs, 5);
        assert_eq!(metrics.thrash_pct(), 71);
    }

    #[test]
    fn idle_side_reports_zero_thrash() {
        assert_eq!(Metrics::new().thrash_pct(), 0);
    }

    #[test]
    fn snapshot_of_partially_resident_table() {
        let mut table = PageTable::new(2);
        table.allocate(1, 3 * 4096 - 100, 4096, 0).unwrap();
        let metrics = Metrics {
            fragmentation_bytes: 100,
            procs_running: 1,
            ..Metrics::new()
        };

        let snapshot = Snapshot::capture("FIFO", "FIFO:new(1, 12188)".to_string(), &table, &metrics, 4);
        assert_eq!(snapshot.ram_kb, 8);
        assert_eq!(snapshot.vram_kb, 4);
        assert_eq!(snapshot.ram_pct, 100);
        assert_eq!(snapshot.vram_pct, 33);
        assert_eq!(snapshot.free_frames, 0);
        assert_eq!(snapshot.fragmentation_kb, 0);
        assert_eq!(snapshot.procs_running, 1);
    }
}
