//! Deterministic synthetic trace generator.
//!
//! Processes allocate, use and free memory at random until they are killed.
//! Kills are spaced out with a growing hazard so that on average one happens
//! every `N / P` operations, and a kill is forced whenever the remaining room
//! in the trace is exactly what is needed to kill everybody still alive.

use std::collections::BTreeSet;

use log::debug;
use serde::Deserialize;

use crate::config_err;
use crate::error::Result;
use crate::page_table::{AllocationId, Pid};
use crate::rng::{Mulberry32, Seed};
use crate::trace::{render_trace, Operation};

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct WorkloadConfig {
    /// Number of processes, P.
    pub processes: usize,
    /// Target number of operations, N.
    pub operations: usize,
    pub seed: Seed,
    pub size_min: u64,
    pub size_max: u64,
    /// Allowed relative deviation from the target length.
    pub tolerance: f64,
    /// Whether the trace may grow past `operations` (within tolerance).
    pub allow_overshoot: bool,
}

impl Default for WorkloadConfig {
    fn default() -> Self {
        WorkloadConfig {
            processes: 10,
            operations: 500,
            seed: Seed::default(),
            size_min: 32,
            size_max: 16384,
            tolerance: 0.0,
            allow_overshoot: true,
        }
    }
}

impl WorkloadConfig {
    pub fn validate(&self) -> Result<()> {
        if self.processes == 0 {
            return Err(config_err!("process count must be > 0"));
        }
        if self.operations == 0 {
            return Err(config_err!("operation count must be > 0"));
        }
        if !self.allow_overshoot && self.operations < self.processes {
            return Err(config_err!(
                "operation count ({}) must be >= process count ({}) without overshoot",
                self.operations,
                self.processes
            ));
        }
        if self.size_min > self.size_max {
            return Err(config_err!("size bounds are inverted: {} > {}", self.size_min, self.size_max));
        }
        if !self.tolerance.is_finite() || self.tolerance < 0.0 {
            return Err(config_err!("tolerance must be a non-negative number"));
        }
        Ok(())
    }

    /// Shortest acceptable trace length.
    pub fn min_len(&self) -> usize {
        let floor = (self.operations as f64 * (1.0 - self.tolerance)).floor().max(0.0) as usize;
        self.processes.max(floor)
    }

    /// Longest acceptable trace length.
    pub fn max_len(&self) -> usize {
        if self.allow_overshoot {
            (self.operations as f64 * (1.0 + self.tolerance)).floor() as usize
        } else {
            self.operations
        }
    }
}

/// `(a + b + 1) / 2` without overflowing.
fn midpoint_up(a: u64, b: u64) -> u64 {
    ((u128::from(a) + u128::from(b) + 1) / 2) as u64
}

struct Process {
    pid: Pid,
    alive: bool,
    allocations: BTreeSet<AllocationId>,
}

#[derive(Clone, Copy)]
enum Step {
    New,
    Use,
    Delete,
}

const WITHOUT_ALLOCATIONS: [Step; 4] = [Step::New, Step::New, Step::New, Step::New];
const WITH_ALLOCATIONS: [Step; 8] = [
    Step::New,
    Step::New,
    Step::New,
    Step::New,
    Step::Use,
    Step::Use,
    Step::Use,
    Step::Delete,
];

struct Generator<'a> {
    config: &'a WorkloadConfig,
    rng: Mulberry32,
    procs: Vec<Process>,
    next_allocation: AllocationId,
    ops: Vec<Operation>,
}

impl<'a> Generator<'a> {
    fn alive(&self) -> usize {
        self.procs.iter().filter(|p| p.alive).count()
    }

    fn pick_alive(&mut self) -> Option<usize> {
        let living: Vec<usize> = (0..self.procs.len()).filter(|&i| self.procs[i].alive).collect();
        if living.is_empty() {
            return None;
        }
        Some(living[self.rng.index(living.len())])
    }

    /// Average of two uniform draws, pulling sizes toward the middle.
    fn random_size(&mut self) -> u64 {
        let a = self.rng.int(self.config.size_min, self.config.size_max);
        let b = self.rng.int(self.config.size_min, self.config.size_max);
        midpoint_up(a, b)
    }

    fn kill(&mut self, idx: usize) {
        let process = &mut self.procs[idx];
        process.alive = false;
        process.allocations.clear();
        self.ops.push(Operation::Kill { pid: process.pid });
    }

    fn allocate(&mut self, idx: usize) {
        let size = self.random_size();
        let allocation = self.next_allocation;
        self.next_allocation += 1;

        let process = &mut self.procs[idx];
        process.allocations.insert(allocation);
        self.ops.push(Operation::New { pid: process.pid, size });
    }

    fn pick_allocation(&mut self, idx: usize) -> AllocationId {
        let owned: Vec<AllocationId> = self.procs[idx].allocations.iter().copied().collect();
        owned[self.rng.index(owned.len())]
    }

    fn run(mut self) -> Vec<Operation> {
        let min_len = self.config.min_len();
        let max_len = self.config.max_len();
        let spacing = (self.config.operations / self.config.processes).max(1);
        let hazard_step = 1.0 / spacing as f64;

        let mut since_last_kill = 0;
        let mut hazard = 0.0;

        while self.ops.len() < max_len && self.alive() > 0 {
            let alive = self.alive();
            // One slot per living process stays reserved for its kill.
            let must_kill = max_len <= self.ops.len() + alive;

            let try_kill = must_kill || {
                if since_last_kill >= spacing {
                    hazard += hazard_step;
                    self.rng.next_f64() < f64::min(1.0, hazard)
                } else {
                    false
                }
            };

            if try_kill {
                if let Some(victim) = self.pick_alive() {
                    let protected = alive == 1 && self.ops.len() < min_len && !must_kill;
                    if !protected {
                        self.kill(victim);
                        since_last_kill = 0;
                        hazard = 0.0;
                        continue;
                    }
                }
            }

            let Some(idx) = self.pick_alive() else { break };
            let menu: &[Step] = if self.procs[idx].allocations.is_empty() {
                &WITHOUT_ALLOCATIONS
            } else {
                &WITH_ALLOCATIONS
            };

            match *self.rng.pick(menu) {
                Step::New => self.allocate(idx),
                Step::Use => {
                    let allocation = self.pick_allocation(idx);
                    self.ops.push(Operation::Use { allocation });
                }
                Step::Delete => {
                    let allocation = self.pick_allocation(idx);
                    self.procs[idx].allocations.remove(&allocation);
                    self.ops.push(Operation::Delete { allocation });
                }
            }
            since_last_kill += 1;
        }

        for idx in 0..self.procs.len() {
            if self.procs[idx].alive && self.ops.len() < max_len {
                self.kill(idx);
            }
        }

        self.ops
    }
}

/// Generates a trace as operations.
pub fn generate_operations(config: &WorkloadConfig) -> Result<Vec<Operation>> {
    config.validate()?;

    let generator = Generator {
        config,
        rng: Mulberry32::new(config.seed.to_u32()),
        procs: (1..=config.processes)
            .map(|pid| Process {
                pid: pid as Pid,
                alive: true,
                allocations: BTreeSet::new(),
            })
            .collect(),
        next_allocation: 1,
        ops: Vec::new(),
    };
    let ops = generator.run();

    debug!(
        "workload: {} operations for {} processes (seed {})",
        ops.len(),
        config.processes,
        config.seed
    );
    Ok(ops)
}

/// Generates a trace as newline-terminated text.
pub fn generate(config: &WorkloadConfig) -> Result<String> {
    Ok(render_trace(&generate_operations(config)?))
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::error::Error;
    use crate::trace::parse_trace;

    fn config(processes: usize, operations: usize, seed: u64) -> WorkloadConfig {
        WorkloadConfig {
            processes,
            operations,
            seed: Seed::Numeric(seed),
            ..WorkloadConfig::default()
        }
    }

    fn kills(ops: &[Operation]) -> BTreeMap<Pid, usize> {
        let mut kills = BTreeMap::new();
        for op in ops {
            if let Operation::Kill { pid } = op {
                *kills.entry(*pid).or_default() += 1;
            }
        }
        kills
    }

    #[test]
    fn every_process_killed_exactly_once() -> Result<()> {
        let cfg = config(3, 12, 42);
        let ops = generate_operations(&cfg)?;

        assert!(ops.len() <= 12);
        assert_eq!(kills(&ops), BTreeMap::from([(1, 1), (2, 1), (3, 1)]));
        Ok(())
    }

    #[test]
    fn length_stays_within_tolerance() -> Result<()> {
        for seed in 0..20 {
            let cfg = WorkloadConfig {
                tolerance: 0.1,
                ..config(5, 200, seed)
            };
            let ops = generate_operations(&cfg)?;
            assert!(ops.len() >= cfg.min_len(), "seed {}: {} ops", seed, ops.len());
            assert!(ops.len() <= cfg.max_len(), "seed {}: {} ops", seed, ops.len());
            assert_eq!(kills(&ops).len(), 5);
        }
        Ok(())
    }

    #[test]
    fn references_only_live_allocations() -> Result<()> {
        let ops = generate_operations(&config(4, 300, 99))?;
        let mut next = 1;
        let mut live: BTreeMap<AllocationId, Pid> = BTreeMap::new();
        let mut dead = BTreeSet::new();

        for op in &ops {
            match *op {
                Operation::New { pid, size } => {
                    assert!(!dead.contains(&pid));
                    assert!((32..=16384).contains(&size));
                    live.insert(next, pid);
                    next += 1;
                }
                Operation::Use { allocation } => assert!(live.contains_key(&allocation)),
                Operation::Delete { allocation } => assert!(live.remove(&allocation).is_some()),
                Operation::Kill { pid } => {
                    live.retain(|_, owner| *owner != pid);
                    dead.insert(pid);
                }
            }
        }
        Ok(())
    }

    #[test]
    fn same_seed_same_trace() -> Result<()> {
        let a = generate(&config(6, 100, 7))?;
        let b = generate(&config(6, 100, 7))?;
        let c = generate(&config(6, 100, 8))?;

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.ends_with('\n'));
        assert_eq!(parse_trace(&a).len(), a.lines().count());
        Ok(())
    }

    #[test]
    fn textual_seed_is_hashed() -> Result<()> {
        let by_text = WorkloadConfig {
            seed: Seed::from("lab-seed"),
            ..config(3, 30, 0)
        };
        assert_eq!(generate(&by_text)?, generate(&by_text.clone())?);
        Ok(())
    }

    #[test]
    fn rejects_bad_shapes() {
        assert!(matches!(generate(&config(0, 10, 1)), Err(Error::Config(_))));
        assert!(matches!(generate(&config(3, 0, 1)), Err(Error::Config(_))));
        let no_overshoot = WorkloadConfig {
            allow_overshoot: false,
            ..config(5, 3, 1)
        };
        assert!(matches!(generate(&no_overshoot), Err(Error::Config(_))));
    }

    #[test]
    fn extreme_size_bounds_stay_in_range() -> Result<()> {
        let cfg = WorkloadConfig {
            size_min: 0,
            size_max: u64::MAX,
            ..config(3, 60, 5)
        };
        assert_eq!(kills(&generate_operations(&cfg)?).len(), 3);

        let pinned = WorkloadConfig {
            size_min: u64::MAX,
            ..cfg
        };
        for op in generate_operations(&pinned)? {
            if let Operation::New { size, .. } = op {
                assert_eq!(size, u64::MAX);
            }
        }
        assert_eq!(midpoint_up(u64::MAX, u64::MAX), u64::MAX);
        assert_eq!(midpoint_up(2, 3), 3);
        Ok(())
    }

    #[test]
    fn overshoot_allowed_with_more_processes_than_slots() -> Result<()> {
        let ops = generate_operations(&config(5, 3, 1))?;
        assert!(ops.len() <= 3);
        Ok(())
    }
}
