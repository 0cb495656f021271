use crate::page_table::PageTable;

use super::PageReplacer;

/// Evicts frames in circular order. The hand only moves when it actually
/// replaces something, so frames filled from the free list don't shift it.
#[derive(Debug, Clone, Default)]
pub struct FIFOPageReplacer {
    next: usize,
}

impl FIFOPageReplacer {
    pub fn new() -> Self {
        FIFOPageReplacer { next: 0 }
    }
}

impl PageReplacer for FIFOPageReplacer {
    fn pick_replacement_frame(&mut self, table: &PageTable) -> Option<usize> {
        let frames = table.frames().len();
        if frames == 0 {
            return None;
        }

        let victim = self.next % frames;
        self.next = (victim + 1) % frames;

        Some(victim)
    }
}
