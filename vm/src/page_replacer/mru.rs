use std::collections::VecDeque;

use crate::page_table::{PageId, PageMark, PageTable};

use super::{PageEvent, PageReplacer};

/// Most-recently-used: the page touched last is the one thrown out.
#[derive(Debug, Clone, Default)]
pub struct MRUPageReplacer {
    /// Most recent first.
    order: VecDeque<PageId>,
}

impl MRUPageReplacer {
    pub fn new() -> Self {
        MRUPageReplacer { order: VecDeque::new() }
    }

    fn forget(&mut self, page: PageId) {
        self.order.retain(|&id| id != page);
    }
}

impl PageReplacer for MRUPageReplacer {
    fn page_event(&mut self, event: PageEvent) {
        match event {
            PageEvent::Touched(page) | PageEvent::Loaded(page) => {
                self.forget(page);
                self.order.push_front(page);
            }
            PageEvent::Evicted(page) | PageEvent::Released(page) => self.forget(page),
            PageEvent::Referenced(_) => {}
        }
    }

    fn pick_replacement_frame(&mut self, table: &PageTable) -> Option<usize> {
        // Entries whose page already left memory are skipped, never chosen.
        while let Some(&front) = self.order.front() {
            match table.page(front).and_then(|p| p.frame()) {
                Some(frame) => return Some(frame),
                None => {
                    self.order.pop_front();
                }
            }
        }
        None
    }

    fn mark(&self, page: PageId) -> Option<PageMark> {
        (self.order.front() == Some(&page)).then_some(PageMark::MostRecent)
    }
}

#[cfg(test)]
mod tests {
    use crate::config::PolicyKind;
    use crate::page_replacer::tests::{cold_table, run};
    use crate::page_replacer::{Outcome, Policy};
    use crate::page_table::PageMark;

    #[test]
    fn evicts_most_recent_page() {
        let mut table = cold_table(2, 3);
        let mut policy = Policy::new(PolicyKind::Mru, None);

        let outcomes = run(&mut policy, &mut table, &[1, 2, 3]);
        assert_eq!(
            outcomes,
            vec![
                Outcome::MissLoad { frame: 0 },
                Outcome::MissLoad { frame: 1 },
                Outcome::MissReplace { frame: 1, evicted: 2 },
            ]
        );
    }

    #[test]
    fn hit_promotes_to_front() {
        let mut table = cold_table(2, 3);
        let mut policy = Policy::new(PolicyKind::Mru, None);

        let outcomes = run(&mut policy, &mut table, &[1, 2, 1, 3]);
        assert_eq!(outcomes[3], Outcome::MissReplace { frame: 0, evicted: 1 });
        assert_eq!(table.page(3).unwrap().mark, Some(PageMark::MostRecent));
        assert_eq!(table.page(2).unwrap().mark, None);
    }
}
