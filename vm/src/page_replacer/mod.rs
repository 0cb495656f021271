//! Page replacement policies.
//!
//! Every policy answers the same question: given a page that is about to be
//! referenced, where does it end up and who (if anyone) gets evicted for it.
//! The shared part of that decision lives in [`Policy::ensure`]: a resident
//! page is a hit, otherwise the lowest free frame is used, and only when the
//! frame table is full is the concrete [`PageReplacer`] asked for a victim.

mod fifo;
mod mru;
mod optimal;
mod random;
mod second_chance;

use std::sync::Arc;

use log::trace;

pub use fifo::FIFOPageReplacer;
pub use mru::MRUPageReplacer;
pub use optimal::OptimalPageReplacer;
pub use random::RandomPageReplacer;
pub use second_chance::SecondChancePageReplacer;

use crate::config::PolicyKind;
use crate::error::{Error, Result};
use crate::lookahead::Lookahead;
use crate::page_table::{PageId, PageMark, PageTable};
use crate::rng::Seed;

/// Things that happen to pages, reported to the active replacer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageEvent {
    /// An access is about to be resolved for the page.
    Referenced(PageId),
    /// The page was already resident.
    Touched(PageId),
    /// The page was placed into a frame.
    Loaded(PageId),
    /// The page lost its frame to make room for another one.
    Evicted(PageId),
    /// The page was destroyed together with its allocation.
    Released(PageId),
}

pub trait PageReplacer {
    fn page_event(&mut self, _event: PageEvent) {}

    /// Chooses the frame to vacate. Only called when every frame is occupied.
    fn pick_replacement_frame(&mut self, table: &PageTable) -> Option<usize>;

    fn mark(&self, _page: PageId) -> Option<PageMark> {
        None
    }
}

/// How a single page reference was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Hit { frame: usize },
    MissLoad { frame: usize },
    MissReplace { frame: usize, evicted: PageId },
}

impl Outcome {
    pub fn is_hit(&self) -> bool {
        matches!(self, Outcome::Hit { .. })
    }

    pub fn frame(&self) -> usize {
        match *self {
            Outcome::Hit { frame } | Outcome::MissLoad { frame } | Outcome::MissReplace { frame, .. } => frame,
        }
    }

    pub fn evicted(&self) -> Option<PageId> {
        match *self {
            Outcome::MissReplace { evicted, .. } => Some(evicted),
            _ => None,
        }
    }
}

/// A replacement policy together with its private state.
#[derive(Debug, Clone)]
pub enum Policy {
    Fifo(FIFOPageReplacer),
    Mru(MRUPageReplacer),
    SecondChance(SecondChancePageReplacer),
    Random(RandomPageReplacer),
    Optimal(OptimalPageReplacer),
}

impl Policy {
    pub fn new(kind: PolicyKind, seed: Option<&Seed>) -> Self {
        match kind {
            PolicyKind::Fifo => Policy::Fifo(FIFOPageReplacer::new()),
            PolicyKind::Mru => Policy::Mru(MRUPageReplacer::new()),
            PolicyKind::SecondChance => Policy::SecondChance(SecondChancePageReplacer::new()),
            PolicyKind::Random => Policy::Random(RandomPageReplacer::new(seed.map_or(0, Seed::to_u32))),
        }
    }

    pub fn optimal(lookahead: Arc<Lookahead>) -> Self {
        Policy::Optimal(OptimalPageReplacer::new(lookahead))
    }

    pub fn tag(&self) -> &'static str {
        match self {
            Policy::Fifo(_) => "FIFO",
            Policy::Mru(_) => "MRU",
            Policy::SecondChance(_) => "SC",
            Policy::Random(_) => "RND",
            Policy::Optimal(_) => "OPT",
        }
    }

    fn replacer(&mut self) -> &mut dyn PageReplacer {
        match self {
            Policy::Fifo(r) => r,
            Policy::Mru(r) => r,
            Policy::SecondChance(r) => r,
            Policy::Random(r) => r,
            Policy::Optimal(r) => r,
        }
    }

    pub fn page_event(&mut self, event: PageEvent) {
        self.replacer().page_event(event)
    }

    /// Makes `page` resident, evicting a victim when no frame is free.
    pub fn ensure(&mut self, table: &mut PageTable, page: PageId, now: u64) -> Result<Outcome> {
        let current = table
            .page(page)
            .ok_or_else(|| Error::Policy(format!("page {} does not exist", page)))?;
        let resident_in = current.frame();

        let replacer = self.replacer();
        replacer.page_event(PageEvent::Referenced(page));

        let outcome = if let Some(frame) = resident_in {
            replacer.page_event(PageEvent::Touched(page));
            Outcome::Hit { frame }
        } else if let Some(frame) = table.free_frame() {
            table.bind(page, frame, now);
            replacer.page_event(PageEvent::Loaded(page));
            Outcome::MissLoad { frame }
        } else {
            let frame = replacer
                .pick_replacement_frame(table)
                .ok_or_else(|| Error::Policy(format!("no victim among {} frames", table.frames().len())))?;
            let evicted = table.frames()[frame]
                .ok_or_else(|| Error::Policy(format!("victim frame {} is empty", frame)))?;

            table.unbind(evicted);
            replacer.page_event(PageEvent::Evicted(evicted));
            table.bind(page, frame, now);
            replacer.page_event(PageEvent::Loaded(page));
            Outcome::MissReplace { frame, evicted }
        };

        trace!("{}: page {} -> {:?}", self.tag(), page, outcome);
        self.refresh_marks(table);

        Ok(outcome)
    }

    /// Copies the policy's per-page markers onto the resident pages.
    pub fn refresh_marks(&mut self, table: &mut PageTable) {
        let resident: Vec<PageId> = table.frames().iter().flatten().copied().collect();
        let replacer = self.replacer();

        for id in resident {
            let mark = replacer.mark(id);
            if let Some(page) = table.page_mut(id) {
                page.mark = mark;
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub const PAGE: u64 = 4096;

    /// A table with `frames` empty frames and `pages` single-page allocations
    /// parked on disk, ids 1..=pages.
    pub fn cold_table(frames: usize, pages: usize) -> PageTable {
        let mut table = PageTable::new(frames);
        for _ in 0..pages {
            table.allocate(1, PAGE, PAGE, 0).unwrap();
        }
        for id in 1..=pages {
            table.unbind(id);
        }
        table
    }

    /// Runs `refs` through `policy`, returning every outcome.
    pub fn run(policy: &mut Policy, table: &mut PageTable, refs: &[PageId]) -> Vec<Outcome> {
        refs.iter()
            .map(|&id| {
                let outcome = policy.ensure(table, id, 0).unwrap();
                assert!(table.is_consistent());
                outcome
            })
            .collect()
    }

    #[test]
    fn free_frames_are_used_before_eviction() {
        let mut table = cold_table(3, 4);
        table.allocate(1, PAGE, PAGE, 0).unwrap();
        let mut policy = Policy::new(PolicyKind::Fifo, None);

        let outcomes = run(&mut policy, &mut table, &[2, 1]);
        assert_eq!(outcomes, vec![Outcome::MissLoad { frame: 1 }, Outcome::MissLoad { frame: 2 }]);
    }

    #[test]
    fn missing_page_is_a_policy_error() {
        let mut table = cold_table(1, 1);
        let mut policy = Policy::new(PolicyKind::Mru, None);
        assert!(matches!(policy.ensure(&mut table, 99, 0), Err(Error::Policy(_))));
    }
}
