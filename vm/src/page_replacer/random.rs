use crate::page_table::PageTable;
use crate::rng::Xorshift32;

use super::PageReplacer;

/// Evicts a uniformly chosen occupied frame.
#[derive(Debug, Clone)]
pub struct RandomPageReplacer {
    rng: Xorshift32,
}

impl RandomPageReplacer {
    /// A zero seed selects the default seed.
    pub fn new(seed: u32) -> Self {
        RandomPageReplacer { rng: Xorshift32::new(seed) }
    }
}

impl PageReplacer for RandomPageReplacer {
    fn pick_replacement_frame(&mut self, table: &PageTable) -> Option<usize> {
        let occupied: Vec<usize> = table
            .frames()
            .iter()
            .enumerate()
            .filter_map(|(idx, slot)| slot.map(|_| idx))
            .collect();
        if occupied.is_empty() {
            return None;
        }

        let pick = (self.rng.next_f64() * occupied.len() as f64).floor() as usize;
        Some(occupied[pick.min(occupied.len() - 1)])
    }
}

#[cfg(test)]
mod tests {
    use crate::config::PolicyKind;
    use crate::page_replacer::tests::{cold_table, run};
    use crate::page_replacer::{Outcome, Policy};
    use crate::page_table::PageId;
    use crate::rng::Seed;

    fn evictions(seed: u64) -> Vec<Option<PageId>> {
        let mut table = cold_table(4, 12);
        let seed = Seed::Numeric(seed);
        let mut policy = Policy::new(PolicyKind::Random, Some(&seed));
        let refs: Vec<PageId> = (1..=12).chain(1..=12).chain((1..=12).rev()).collect();

        run(&mut policy, &mut table, &refs).iter().map(Outcome::evicted).collect()
    }

    #[test]
    fn same_seed_same_victims() {
        let first = evictions(0xC0FFEE);
        let second = evictions(0xC0FFEE);
        assert_eq!(first, second);
        assert!(first.iter().filter(|e| e.is_some()).count() > 0);
    }

    #[test]
    fn victims_are_always_resident_pages() {
        let mut table = cold_table(3, 6);
        let seed = Seed::Numeric(7);
        let mut policy = Policy::new(PolicyKind::Random, Some(&seed));

        for id in [1, 2, 3, 4, 5, 6, 1, 2] {
            let before = table.frames().to_vec();
            let outcome = policy.ensure(&mut table, id, 0).unwrap();
            if let Outcome::MissReplace { frame, evicted } = outcome {
                assert_eq!(before[frame], Some(evicted));
            }
        }
    }
}
