//! Future-reference index consumed by the optimal policy.
//!
//! The index is built by replaying the whole trace against a frameless page
//! table: page ids are handed out exactly as the simulation will hand them
//! out, so every `use` can be expanded into the page ids it touches. Each
//! touched page gets the next global position in the reference stream.

use std::collections::HashMap;

use log::debug;

use crate::page_table::{PageId, PageTable};
use crate::trace::{parse_trace, Operation};

#[derive(Debug, Clone, Default)]
pub struct Lookahead {
    /// Page referenced at each global position.
    refs: Vec<PageId>,
    /// Per page, its reference positions from last to first, so the top of
    /// the stack is the soonest one.
    stacks: HashMap<PageId, Vec<usize>>,
}

impl Lookahead {
    pub fn build(ops: &[Operation], page_size_kb: u64) -> Self {
        let page_bytes = page_size_kb * 1024;
        let mut table = PageTable::new(0);
        let mut refs = Vec::new();

        for op in ops {
            match *op {
                Operation::New { pid, size } => {
                    table.allocate(pid, size, page_bytes, 0);
                }
                Operation::Use { allocation } => {
                    if let Some(allocation) = table.allocation(allocation) {
                        refs.extend_from_slice(&allocation.pages);
                    }
                }
                Operation::Delete { allocation } => {
                    table.release(allocation);
                }
                Operation::Kill { pid } => {
                    table.terminate(pid);
                }
            }
        }

        debug!("lookahead: {} operations expand to {} page references", ops.len(), refs.len());
        Self::from_refs(refs)
    }

    pub fn from_trace(text: &str, page_size_kb: u64) -> Self {
        Self::build(&parse_trace(text), page_size_kb)
    }

    /// Indexes an already expanded reference stream.
    pub fn from_refs(refs: Vec<PageId>) -> Self {
        let mut stacks: HashMap<PageId, Vec<usize>> = HashMap::new();
        for (position, &page) in refs.iter().enumerate().rev() {
            stacks.entry(page).or_default().push(position);
        }

        Lookahead { refs, stacks }
    }

    pub fn refs(&self) -> &[PageId] {
        &self.refs
    }

    pub fn page_at(&self, position: usize) -> Option<PageId> {
        self.refs.get(position).copied()
    }

    pub fn stacks(&self) -> &HashMap<PageId, Vec<usize>> {
        &self.stacks
    }

    /// Soonest reference of `page`, if any.
    pub fn next_use(&self, page: PageId) -> Option<usize> {
        self.stacks.get(&page).and_then(|s| s.last().copied())
    }

    pub fn len(&self) -> usize {
        self.refs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.refs.is_empty()
    }
}
