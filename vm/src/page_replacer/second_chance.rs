use std::collections::HashMap;

use crate::page_table::{PageId, PageMark, PageTable};

use super::{PageEvent, PageReplacer};

/// Clock / second chance. Pages start with their reference bit set; the hand
/// clears bits as it sweeps and evicts the first page found with a clear bit.
#[derive(Debug, Clone, Default)]
pub struct SecondChancePageReplacer {
    hand: usize,
    referenced: HashMap<PageId, bool>,
}

impl SecondChancePageReplacer {
    pub fn new() -> Self {
        SecondChancePageReplacer {
            hand: 0,
            referenced: HashMap::new(),
        }
    }
}

impl PageReplacer for SecondChancePageReplacer {
    fn page_event(&mut self, event: PageEvent) {
        match event {
            PageEvent::Touched(page) | PageEvent::Loaded(page) => {
                self.referenced.insert(page, true);
            }
            PageEvent::Evicted(page) | PageEvent::Released(page) => {
                self.referenced.remove(&page);
            }
            PageEvent::Referenced(_) => {}
        }
    }

    fn pick_replacement_frame(&mut self, table: &PageTable) -> Option<usize> {
        let frames = table.frames();
        if frames.is_empty() {
            return None;
        }

        // Two sweeps clear every bit, so the scan always terminates.
        for _ in 0..=2 * frames.len() {
            let current = self.hand % frames.len();
            self.hand = (current + 1) % frames.len();

            let Some(page) = frames[current] else { continue };
            let bit = self.referenced.entry(page).or_insert(false);
            if *bit {
                *bit = false;
            } else {
                return Some(current);
            }
        }
        None
    }

    fn mark(&self, page: PageId) -> Option<PageMark> {
        Some(PageMark::Reference(self.referenced.get(&page).copied().unwrap_or(false)))
    }
}

#[cfg(test)]
mod tests {
    use crate::config::PolicyKind;
    use crate::page_replacer::tests::{cold_table, run};
    use crate::page_replacer::{Outcome, Policy};
    use crate::page_table::PageMark;

    #[test]
    fn sweeps_referenced_pages_once() {
        let mut table = cold_table(3, 5);
        let mut policy = Policy::new(PolicyKind::SecondChance, None);

        let outcomes = run(&mut policy, &mut table, &[1, 2, 3, 1, 4, 5]);
        assert_eq!(outcomes[3], Outcome::Hit { frame: 0 });
        // Every bit was set, so the hand comes back around to frame 0.
        assert_eq!(outcomes[4], Outcome::MissReplace { frame: 0, evicted: 1 });
        assert_eq!(outcomes[5], Outcome::MissReplace { frame: 1, evicted: 2 });

        assert_eq!(table.page(4).unwrap().mark, Some(PageMark::Reference(true)));
        assert_eq!(table.page(3).unwrap().mark, Some(PageMark::Reference(false)));
    }

    #[test]
    fn recently_hit_page_survives() {
        let mut table = cold_table(3, 5);
        let mut policy = Policy::new(PolicyKind::SecondChance, None);

        // After 4 replaces 1 the bits of 2 and 3 are clear; hitting 2 sets
        // its bit again so 5 passes over it and takes 3's frame.
        let outcomes = run(&mut policy, &mut table, &[1, 2, 3, 4, 2, 5]);
        assert_eq!(outcomes[3], Outcome::MissReplace { frame: 0, evicted: 1 });
        assert_eq!(outcomes[4], Outcome::Hit { frame: 1 });
        assert_eq!(outcomes[5], Outcome::MissReplace { frame: 2, evicted: 3 });
    }
}
