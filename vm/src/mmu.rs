//! The dual memory manager.
//!
//! Two [`MmuSide`]s see the exact same operations in the same order. The
//! baseline side is always driven by the optimal policy, the other one by the
//! configured policy. The sides share nothing but the configuration.

use std::sync::Arc;

use log::{debug, error, warn};

use crate::config::{MmuConfig, PolicyKind};
use crate::error::{Error, Result};
use crate::lookahead::Lookahead;
use crate::metrics::{Metrics, Snapshot};
use crate::page_replacer::{Outcome, PageEvent, Policy};
use crate::page_table::{Allocation, AllocationId, PageId, PageTable, Pid};
use crate::rng::Seed;
use crate::trace::Operation;

pub const OPT_TAG: &str = "OPT";

pub type CallbackResult = std::result::Result<(), Box<dyn std::error::Error>>;

/// Receives every snapshot along with a read-only view of the side that
/// produced it. Errors are logged and otherwise ignored.
pub type SnapshotCallback = Box<dyn FnMut(&Snapshot, &MmuSide) -> CallbackResult>;

/// How a side builds its policy once the first access reaches it.
#[derive(Debug, Clone)]
enum PolicySource {
    Optimal(Arc<Lookahead>),
    Kind(PolicyKind, Option<Seed>),
}

impl PolicySource {
    fn build(&self) -> Policy {
        match self {
            PolicySource::Optimal(lookahead) => Policy::optimal(lookahead.clone()),
            PolicySource::Kind(kind, seed) => Policy::new(*kind, seed.as_ref()),
        }
    }
}

/// Returns the side's policy, creating it on first use. A fresh policy is
/// primed with whatever is already resident, in load order.
fn instantiate<'a>(
    slot: &'a mut Option<Policy>,
    source: &PolicySource,
    table: &mut PageTable,
    tag: &str,
) -> &'a mut Policy {
    slot.get_or_insert_with(|| {
        debug!("mmu[{}]: instantiating replacement policy", tag);

        let mut policy = source.build();
        let mut resident: Vec<PageId> = table.frames().iter().flatten().copied().collect();
        resident.sort_unstable();
        for page in resident {
            policy.page_event(PageEvent::Loaded(page));
        }
        policy.refresh_marks(table);
        policy
    })
}

/// One simulated memory subsystem.
pub struct MmuSide {
    tag: String,
    table: PageTable,
    source: PolicySource,
    policy: Option<Policy>,
    metrics: Metrics,
    log: Vec<Snapshot>,
    page_size_kb: u64,
    disk_cost_secs: u64,
}

impl MmuSide {
    fn new(tag: &str, source: PolicySource, config: &MmuConfig) -> Self {
        MmuSide {
            tag: tag.to_string(),
            table: PageTable::new(config.total_frames),
            source,
            policy: None,
            metrics: Metrics::new(),
            log: Vec::new(),
            page_size_kb: config.page_size_kb,
            disk_cost_secs: config.disk_cost_secs,
        }
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn table(&self) -> &PageTable {
        &self.table
    }

    pub fn frames(&self) -> &[Option<PageId>] {
        self.table.frames()
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Every snapshot this side has emitted, oldest first.
    pub fn log(&self) -> &[Snapshot] {
        &self.log
    }

    pub fn last_snapshot(&self) -> Option<&Snapshot> {
        self.log.last()
    }

    fn set_source(&mut self, tag: &str, source: PolicySource) {
        self.tag = tag.to_string();
        self.source = source;
        self.policy = None;
    }

    fn allocate(&mut self, pid: Pid, size: u64) {
        let page_bytes = self.page_size_kb * 1024;
        let Some(id) = self.table.allocate(pid, size, page_bytes, self.metrics.clock_secs) else {
            return;
        };
        let Some(allocation) = self.table.allocation(id) else { return };

        self.metrics.fragmentation_bytes += allocation.fragmentation_bytes;
        let placed: Vec<PageId> = allocation
            .pages
            .iter()
            .copied()
            .filter(|&p| self.table.page(p).is_some_and(|page| page.is_resident()))
            .collect();
        debug!(
            "mmu[{}]: allocation {} for process {}: {} pages, {} resident",
            self.tag,
            id,
            pid,
            allocation.pages.len(),
            placed.len()
        );

        if let Some(policy) = self.policy.as_mut() {
            for page in placed {
                policy.page_event(PageEvent::Loaded(page));
            }
            policy.refresh_marks(&mut self.table);
        }
    }

    fn access(&mut self, id: AllocationId) -> Result<()> {
        let Some(allocation) = self.table.allocation(id) else {
            warn!("mmu[{}]: use of unknown allocation {}", self.tag, id);
            return Ok(());
        };
        let pages = allocation.pages.clone();

        for page in pages {
            let outcome = self.reference(page)?;
            let frame = outcome.frame();
            match outcome.evicted() {
                None if outcome.is_hit() => debug!("mmu[{}]: page {} hit on frame {}", self.tag, page, frame),
                None => debug!("mmu[{}]: page fault, page {} loaded into frame {}", self.tag, page, frame),
                Some(evicted) => debug!(
                    "mmu[{}]: page fault, page {} replaces page {} in frame {}",
                    self.tag, page, evicted, frame
                ),
            }
        }
        Ok(())
    }

    /// Resolves a single page reference and charges it to the side's clock.
    pub(crate) fn reference(&mut self, page: PageId) -> Result<Outcome> {
        let now = self.metrics.clock_secs;
        let policy = instantiate(&mut self.policy, &self.source, &mut self.table, &self.tag);

        let outcome = policy.ensure(&mut self.table, page, now)?;
        self.metrics.record_access(&outcome, self.disk_cost_secs);

        Ok(outcome)
    }

    fn forget(&mut self, released: &[Allocation]) {
        for allocation in released {
            self.metrics.fragmentation_bytes -= allocation.fragmentation_bytes;
            if let Some(policy) = self.policy.as_mut() {
                for &page in &allocation.pages {
                    policy.page_event(PageEvent::Released(page));
                }
            }
        }
        if let Some(policy) = self.policy.as_mut() {
            policy.refresh_marks(&mut self.table);
        }
    }

    fn free(&mut self, id: AllocationId) {
        match self.table.release(id) {
            Some(allocation) => self.forget(&[allocation]),
            None => warn!("mmu[{}]: delete of unknown allocation {}", self.tag, id),
        }
    }

    fn terminate(&mut self, pid: Pid) {
        match self.table.terminate(pid) {
            Some(released) => {
                debug!("mmu[{}]: process {} terminated, {} allocations released", self.tag, pid, released.len());
                self.forget(&released);
            }
            None => warn!("mmu[{}]: kill of unknown or dead process {}", self.tag, pid),
        }
    }

    fn apply(&mut self, op: &Operation) -> Result<Snapshot> {
        match *op {
            Operation::New { pid, size } => self.allocate(pid, size),
            Operation::Use { allocation } => self.access(allocation)?,
            Operation::Delete { allocation } => self.free(allocation),
            Operation::Kill { pid } => self.terminate(pid),
        }

        let (running, done) = self.table.process_counts();
        self.metrics.procs_running = running;
        self.metrics.procs_done = done;

        let label = format!("{}:{}", self.tag, op);
        let snapshot = Snapshot::capture(&self.tag, label, &self.table, &self.metrics, self.page_size_kb);
        self.log.push(snapshot.clone());

        Ok(snapshot)
    }
}

/// Runs the optimal baseline and the selected policy side by side.
pub struct DualMmu {
    config: MmuConfig,
    opt: MmuSide,
    other: MmuSide,
    on_snapshot: Option<SnapshotCallback>,
}

impl DualMmu {
    pub fn new(config: MmuConfig) -> Result<Self> {
        config.validate()?;

        let opt = MmuSide::new(OPT_TAG, PolicySource::Optimal(Arc::default()), &config);
        let other_source = PolicySource::Kind(config.policy, config.random_seed.clone());
        let other = MmuSide::new(&config.policy.to_string(), other_source, &config);

        Ok(DualMmu {
            config,
            opt,
            other,
            on_snapshot: None,
        })
    }

    pub fn with_snapshot_callback(mut self, callback: SnapshotCallback) -> Self {
        self.on_snapshot = Some(callback);
        self
    }

    pub fn config(&self) -> &MmuConfig {
        &self.config
    }

    /// Installs the future-reference index. Once an access has reached the
    /// optimal side its policy is bound to the index it started with, and a
    /// later index is refused.
    pub fn attach_lookahead(&mut self, lookahead: Lookahead) -> Result<()> {
        if self.opt.policy.is_some() {
            return Err(Error::Policy(format!(
                "lookahead of {} references attached after the first access",
                lookahead.len()
            )));
        }
        self.opt.set_source(OPT_TAG, PolicySource::Optimal(Arc::new(lookahead)));
        Ok(())
    }

    /// Selects the comparison policy. It takes effect on the next access.
    pub fn set_policy(&mut self, kind: PolicyKind) {
        self.config.policy = kind;
        let source = PolicySource::Kind(kind, self.config.random_seed.clone());
        self.other.set_source(&kind.to_string(), source);
    }

    pub fn optimal(&self) -> &MmuSide {
        &self.opt
    }

    pub fn other(&self) -> &MmuSide {
        &self.other
    }

    /// Applies `op` to both sides, emitting one snapshot per side.
    pub fn apply(&mut self, op: &Operation) -> Result<()> {
        debug!("mmu: {}", op);

        let snapshot = self.opt.apply(op)?;
        Self::emit(&mut self.on_snapshot, &snapshot, &self.opt);

        let snapshot = self.other.apply(op)?;
        Self::emit(&mut self.on_snapshot, &snapshot, &self.other);

        Ok(())
    }

    /// Attaches a lookahead built from `ops` and applies all of them.
    pub fn run(&mut self, ops: &[Operation]) -> Result<()> {
        self.attach_lookahead(Lookahead::build(ops, self.config.page_size_kb))?;
        for op in ops {
            self.apply(op)?;
        }
        Ok(())
    }

    fn emit(callback: &mut Option<SnapshotCallback>, snapshot: &Snapshot, side: &MmuSide) {
        if let Some(callback) = callback {
            if let Err(err) = callback(snapshot, side) {
                error!("mmu[{}]: snapshot callback failed: {}", side.tag, err);
            }
        }
    }
}
