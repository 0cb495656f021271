use std::collections::{BTreeMap, BTreeSet};

use log::warn;

pub type Pid = u32;
pub type AllocationId = usize;
pub type PageId = usize;

/// Largest number of pages a single allocation may span.
pub const MAX_ALLOCATION_PAGES: u64 = 1 << 20;

/// Where a page currently lives. A page is always exactly one of the two.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Residency {
    Resident { frame: usize },
    OnDisk { locator: String },
}

/// Per-page marker a replacement policy exposes for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageMark {
    /// The most recently used page (MRU).
    MostRecent,
    /// Second chance reference bit.
    Reference(bool),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    pub id: PageId,
    pub allocation: AllocationId,
    pub pid: Pid,
    pub residency: Residency,
    /// Side clock (seconds) when the page first became resident.
    pub loaded_at: Option<u64>,
    pub mark: Option<PageMark>,
}

impl Page {
    pub fn is_resident(&self) -> bool {
        matches!(self.residency, Residency::Resident { .. })
    }

    pub fn frame(&self) -> Option<usize> {
        match self.residency {
            Residency::Resident { frame } => Some(frame),
            Residency::OnDisk { .. } => None,
        }
    }

    pub fn disk_locator(&self) -> Option<&str> {
        match &self.residency {
            Residency::Resident { .. } => None,
            Residency::OnDisk { locator } => Some(locator),
        }
    }
}

/// Page count and rounding loss of a request, if it fits in one allocation.
fn page_span(size_bytes: u64, page_bytes: u64) -> Option<(u64, u64)> {
    let page_count = size_bytes.checked_div(page_bytes)? + u64::from(size_bytes % page_bytes != 0);
    if page_count > MAX_ALLOCATION_PAGES {
        return None;
    }
    let fragmentation_bytes = page_count.checked_mul(page_bytes)?.checked_sub(size_bytes)?;
    Some((page_count, fragmentation_bytes))
}

fn disk_locator(page: PageId) -> String {
    format!("D{}", page)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Allocation {
    pub id: AllocationId,
    pub pid: Pid,
    pub size_bytes: u64,
    /// Pages in creation order.
    pub pages: Vec<PageId>,
    /// Bytes lost to rounding the request up to whole pages.
    pub fragmentation_bytes: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Process {
    pub pid: Pid,
    pub alive: bool,
}

/// The memory state of one simulation side: the frame table plus the arena
/// of pages, allocations and processes that reference it by id.
#[derive(Debug, Clone)]
pub struct PageTable {
    frames: Vec<Option<PageId>>,
    pages: BTreeMap<PageId, Page>,
    allocations: BTreeMap<AllocationId, Allocation>,
    processes: BTreeMap<Pid, Process>,
    next_page: PageId,
    next_allocation: AllocationId,
}

impl PageTable {
    pub fn new(frame_count: usize) -> Self {
        PageTable {
            frames: vec![None; frame_count],
            pages: BTreeMap::new(),
            allocations: BTreeMap::new(),
            processes: BTreeMap::new(),
            next_page: 1,
            next_allocation: 1,
        }
    }

    pub fn frames(&self) -> &[Option<PageId>] {
        &self.frames
    }

    pub fn page(&self, id: PageId) -> Option<&Page> {
        self.pages.get(&id)
    }

    pub(crate) fn page_mut(&mut self, id: PageId) -> Option<&mut Page> {
        self.pages.get_mut(&id)
    }

    pub fn pages(&self) -> impl Iterator<Item = &Page> {
        self.pages.values()
    }

    pub fn allocation(&self, id: AllocationId) -> Option<&Allocation> {
        self.allocations.get(&id)
    }

    pub fn allocations(&self) -> impl Iterator<Item = &Allocation> {
        self.allocations.values()
    }

    pub fn process(&self, pid: Pid) -> Option<&Process> {
        self.processes.get(&pid)
    }

    pub fn processes(&self) -> impl Iterator<Item = &Process> {
        self.processes.values()
    }

    /// Lowest-index empty frame.
    pub fn free_frame(&self) -> Option<usize> {
        self.frames.iter().position(|f| f.is_none())
    }

    pub fn occupied_frames(&self) -> usize {
        self.frames.iter().filter(|f| f.is_some()).count()
    }

    pub fn resident_pages(&self) -> usize {
        self.pages.values().filter(|p| p.is_resident()).count()
    }

    pub fn non_resident_pages(&self) -> usize {
        self.pages.len() - self.resident_pages()
    }

    /// Creates `ceil(size_bytes / page_bytes)` pages for `pid`, each placed in
    /// the lowest free frame or parked on disk. Returns `None` when `pid` has
    /// already been terminated or the request spans more than
    /// [`MAX_ALLOCATION_PAGES`] pages; neither consumes an id.
    pub fn allocate(&mut self, pid: Pid, size_bytes: u64, page_bytes: u64, now: u64) -> Option<AllocationId> {
        let Some((page_count, fragmentation_bytes)) = page_span(size_bytes, page_bytes) else {
            warn!("page_table: allocation of {} bytes for process {} is too large, ignoring", size_bytes, pid);
            return None;
        };

        let process = self.processes.entry(pid).or_insert(Process { pid, alive: true });
        if !process.alive {
            warn!("page_table: process {} is terminated, ignoring allocation", pid);
            return None;
        }

        let id = self.next_allocation;
        self.next_allocation += 1;

        let mut pages = Vec::new();
        for _ in 0..page_count {
            let page_id = self.next_page;
            self.next_page += 1;

            self.pages.insert(
                page_id,
                Page {
                    id: page_id,
                    allocation: id,
                    pid,
                    residency: Residency::OnDisk { locator: disk_locator(page_id) },
                    loaded_at: None,
                    mark: None,
                },
            );
            if let Some(frame) = self.free_frame() {
                self.bind(page_id, frame, now);
            }
            pages.push(page_id);
        }

        self.allocations.insert(id, Allocation { id, pid, size_bytes, pages, fragmentation_bytes });

        Some(id)
    }

    /// Places `page` into `frame`, which must be empty.
    pub(crate) fn bind(&mut self, page: PageId, frame: usize, now: u64) {
        debug_assert!(self.frames[frame].is_none(), "frame {} already occupied", frame);

        if let Some(p) = self.pages.get_mut(&page) {
            self.frames[frame] = Some(page);
            p.residency = Residency::Resident { frame };
            p.loaded_at.get_or_insert(now);
        }
    }

    /// Moves `page` out of its frame onto disk. Returns the frame it vacated.
    pub(crate) fn unbind(&mut self, page: PageId) -> Option<usize> {
        let p = self.pages.get_mut(&page)?;
        let frame = p.frame()?;

        self.frames[frame] = None;
        p.residency = Residency::OnDisk { locator: disk_locator(page) };
        p.mark = None;

        Some(frame)
    }

    /// Evicts and destroys every page of the allocation, then the allocation
    /// itself.
    pub fn release(&mut self, id: AllocationId) -> Option<Allocation> {
        let allocation = self.allocations.remove(&id)?;

        for &page in &allocation.pages {
            self.unbind(page);
            self.pages.remove(&page);
        }

        Some(allocation)
    }

    /// Releases every allocation owned by `pid` and marks it dead. Returns
    /// `None` for unknown or already terminated processes.
    pub fn terminate(&mut self, pid: Pid) -> Option<Vec<Allocation>> {
        match self.processes.get_mut(&pid) {
            Some(process) if process.alive => process.alive = false,
            _ => return None,
        }

        let owned: Vec<AllocationId> = self
            .allocations
            .values()
            .filter(|a| a.pid == pid)
            .map(|a| a.id)
            .collect();

        Some(owned.into_iter().filter_map(|id| self.release(id)).collect())
    }

    /// `(running, done)`: running processes own at least one live page, done
    /// is every process ever observed that is not running.
    pub fn process_counts(&self) -> (usize, usize) {
        let running: BTreeSet<Pid> = self
            .allocations
            .values()
            .filter(|a| a.pages.iter().any(|id| self.pages.contains_key(id)))
            .map(|a| a.pid)
            .collect();

        (running.len(), self.processes.len() - running.len())
    }

    /// Checks that frames and page residency agree with each other.
    pub fn is_consistent(&self) -> bool {
        let frames_agree = self.frames.iter().enumerate().all(|(idx, slot)| match slot {
            Some(id) => self.pages.get(id).and_then(|p| p.frame()) == Some(idx),
            None => true,
        });
        let pages_agree = self.pages.values().all(|p| match p.frame() {
            Some(frame) => self.frames.get(frame).copied().flatten() == Some(p.id),
            None => p.disk_locator().is_some(),
        });

        frames_agree && pages_agree && self.resident_pages() == self.occupied_frames()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: u64 = 4096;

    #[test]
    fn allocation_rounds_up_to_pages() {
        let mut table = PageTable::new(8);
        let id = table.allocate(1, 5000, PAGE, 0).unwrap();

        let allocation = table.allocation(id).unwrap();
        assert_eq!(allocation.pages, vec![1, 2]);
        assert_eq!(allocation.fragmentation_bytes, 2 * PAGE - 5000);
        assert_eq!(table.page(1).unwrap().frame(), Some(0));
        assert_eq!(table.page(2).unwrap().frame(), Some(1));
        assert!(table.is_consistent());
    }

    #[test]
    fn oversized_allocation_is_ignored() {
        let mut table = PageTable::new(4);
        assert_eq!(table.allocate(1, u64::MAX, PAGE, 0), None);
        assert_eq!(table.allocate(1, (MAX_ALLOCATION_PAGES + 1) * PAGE, PAGE, 0), None);
        assert_eq!(table.allocate(1, u64::MAX - 10, 1, 0), None);
        assert_eq!(table.processes().count(), 0);

        // Nothing was consumed by the rejected requests.
        let id = table.allocate(1, PAGE + 1, PAGE, 0).unwrap();
        assert_eq!(id, 1);
        assert_eq!(table.allocation(id).unwrap().pages, vec![1, 2]);
        assert!(table.is_consistent());

        assert_eq!(page_span(MAX_ALLOCATION_PAGES * PAGE, PAGE), Some((MAX_ALLOCATION_PAGES, 0)));
        assert_eq!(page_span(0, PAGE), Some((0, 0)));
    }

    #[test]
    fn overflow_pages_park_on_disk() {
        let mut table = PageTable::new(2);
        table.allocate(1, 3 * PAGE, PAGE, 0).unwrap();

        let third = table.page(3).unwrap();
        assert!(!third.is_resident());
        assert_eq!(third.disk_locator(), Some("D3"));
        assert_eq!(table.non_resident_pages(), 1);
        assert!(table.is_consistent());
    }

    #[test]
    fn release_frees_frames_for_reuse() {
        let mut table = PageTable::new(2);
        let a = table.allocate(1, PAGE, PAGE, 0).unwrap();
        table.allocate(1, PAGE, PAGE, 0).unwrap();

        table.release(a).unwrap();
        assert_eq!(table.free_frame(), Some(0));

        let c = table.allocate(2, PAGE, PAGE, 0).unwrap();
        let page = table.allocation(c).unwrap().pages[0];
        assert_eq!(page, 3);
        assert_eq!(table.page(page).unwrap().frame(), Some(0));
        assert!(table.release(a).is_none());
    }

    #[test]
    fn terminate_drops_everything_owned() {
        let mut table = PageTable::new(4);
        table.allocate(1, PAGE, PAGE, 0).unwrap();
        table.allocate(2, PAGE, PAGE, 0).unwrap();
        table.allocate(1, 2 * PAGE, PAGE, 0).unwrap();

        let released = table.terminate(1).unwrap();
        assert_eq!(released.len(), 2);
        assert_eq!(table.occupied_frames(), 1);
        assert_eq!(table.process_counts(), (1, 1));
        assert!(!table.process(1).unwrap().alive);
        assert_eq!(table.processes().filter(|p| p.alive).count(), 1);

        assert!(table.terminate(1).is_none());
        assert!(table.terminate(9).is_none());
        assert!(table.allocate(1, PAGE, PAGE, 0).is_none());
    }

    #[test]
    fn load_time_is_set_once() {
        let mut table = PageTable::new(1);
        table.allocate(1, PAGE, PAGE, 7).unwrap();

        table.unbind(1);
        table.bind(1, 0, 42);
        assert_eq!(table.page(1).unwrap().loaded_at, Some(7));
    }
}
