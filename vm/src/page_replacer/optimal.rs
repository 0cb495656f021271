use std::collections::HashMap;
use std::sync::Arc;

use log::debug;

use crate::lookahead::Lookahead;
use crate::page_table::{PageId, PageTable};

use super::{PageEvent, PageReplacer};

/// Belady's clairvoyant policy: evicts the resident page whose next reference
/// lies farthest in the future. Pages never referenced again are infinitely
/// far. Ties go to the lowest frame index.
#[derive(Debug, Clone)]
pub struct OptimalPageReplacer {
    lookahead: Arc<Lookahead>,
    /// Working copies of the per-page stacks, popped as references happen.
    future: HashMap<PageId, Vec<usize>>,
    /// Position of the next reference in the global reference stream.
    position: usize,
}

impl OptimalPageReplacer {
    pub fn new(lookahead: Arc<Lookahead>) -> Self {
        let future = lookahead.stacks().clone();

        OptimalPageReplacer {
            lookahead,
            future,
            position: 0,
        }
    }

    /// Next reference of `page` at or after the current position.
    fn next_use(&mut self, page: PageId) -> Option<usize> {
        let now = self.position;
        let stack = self.future.get_mut(&page)?;
        while stack.last().is_some_and(|&next| next < now) {
            stack.pop();
        }
        stack.last().copied()
    }
}

impl PageReplacer for OptimalPageReplacer {
    fn page_event(&mut self, event: PageEvent) {
        if let PageEvent::Referenced(page) = event {
            let now = self.position;
            if !self.lookahead.is_empty() && self.lookahead.page_at(now) != Some(page) {
                debug!("opt: reference {} to page {} was not in the lookahead stream", now, page);
            }
            if let Some(stack) = self.future.get_mut(&page) {
                while stack.last().is_some_and(|&next| next <= now) {
                    stack.pop();
                }
            }
            self.position += 1;
        }
    }

    fn pick_replacement_frame(&mut self, table: &PageTable) -> Option<usize> {
        let mut victim: Option<(usize, usize)> = None;

        for (frame, slot) in table.frames().iter().enumerate() {
            let Some(page) = *slot else { continue };
            let distance = self.next_use(page).unwrap_or(usize::MAX);

            if victim.map_or(true, |(_, farthest)| distance > farthest) {
                victim = Some((frame, distance));
            }
            if distance == usize::MAX {
                break;
            }
        }

        victim.map(|(frame, _)| frame)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::config::PolicyKind;
    use crate::lookahead::Lookahead;
    use crate::page_replacer::tests::{cold_table, run};
    use crate::page_replacer::{Outcome, Policy};
    use crate::page_table::PageId;

    fn misses(outcomes: &[Outcome]) -> usize {
        outcomes.iter().filter(|o| !o.is_hit()).count()
    }

    #[test]
    fn classic_reference_string() {
        let refs: Vec<PageId> = vec![1, 2, 3, 4, 1, 2, 5, 1, 2, 3, 4, 5];
        let mut table = cold_table(3, 5);
        let mut policy = Policy::optimal(Arc::new(Lookahead::from_refs(refs.clone())));

        let outcomes = run(&mut policy, &mut table, &refs);
        assert_eq!(misses(&outcomes), 7);
        // 3 is needed last among {1, 2, 3}.
        assert_eq!(outcomes[3], Outcome::MissReplace { frame: 2, evicted: 3 });
        // 1 and 2 are both dead by now, the lower frame goes first.
        assert_eq!(outcomes[9], Outcome::MissReplace { frame: 0, evicted: 1 });
    }

    #[test]
    fn never_worse_than_fifo() {
        let refs: Vec<PageId> = vec![8, 1, 2, 3, 1, 4, 1, 5, 3, 4, 1, 4, 3, 2, 3, 1, 2, 8, 1, 2];

        let mut table = cold_table(3, 8);
        let mut opt = Policy::optimal(Arc::new(Lookahead::from_refs(refs.clone())));
        let opt_misses = misses(&run(&mut opt, &mut table, &refs));

        let mut table = cold_table(3, 8);
        let mut fifo = Policy::new(PolicyKind::Fifo, None);
        let fifo_misses = misses(&run(&mut fifo, &mut table, &refs));

        assert_eq!(opt_misses, 9);
        assert_eq!(fifo_misses, 15);
    }
}
