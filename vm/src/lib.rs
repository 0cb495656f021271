//! Dual-track page replacement simulator.
//!
//! A trace of `new` / `use` / `delete` / `kill` operations is replayed against
//! two independent memory subsystems: one driven by the clairvoyant optimal
//! policy and one by FIFO, MRU, second chance or random replacement. After
//! every operation each side reports a [`metrics::Snapshot`].

pub mod config;
pub mod error;
pub mod lookahead;
pub mod metrics;
pub mod mmu;
pub mod page_replacer;
pub mod page_table;
pub mod rng;
pub mod trace;
pub mod workload;

pub use config::{MmuConfig, PolicyKind};
pub use lookahead::Lookahead;
pub use mmu::{DualMmu, MmuSide};
pub use trace::{parse_trace, Operation};
pub use workload::{generate, WorkloadConfig};
