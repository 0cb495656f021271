use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::Deserialize;

use crate::config_err;
use crate::error::{Error, Result};
use crate::rng::Seed;

/// The replacement discipline driving the comparison side. The optimal
/// policy is not selectable here, it always drives the baseline side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(try_from = "String")]
pub enum PolicyKind {
    #[default]
    Fifo,
    Mru,
    SecondChance,
    Random,
}

impl FromStr for PolicyKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "FIFO" => Ok(PolicyKind::Fifo),
            "MRU" => Ok(PolicyKind::Mru),
            "SC" | "SECOND_CHANCE" => Ok(PolicyKind::SecondChance),
            "RND" | "RAND" | "RANDOM" => Ok(PolicyKind::Random),
            other => Err(config_err!("unknown replacement policy {:?}", other)),
        }
    }
}

impl TryFrom<String> for PolicyKind {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl Display for PolicyKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let tag = match self {
            PolicyKind::Fifo => "FIFO",
            PolicyKind::Mru => "MRU",
            PolicyKind::SecondChance => "SC",
            PolicyKind::Random => "RND",
        };
        write!(f, "{}", tag)
    }
}

/// Engine configuration shared by both sides of a dual run.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct MmuConfig {
    pub page_size_kb: u64,
    pub total_frames: usize,
    pub policy: PolicyKind,
    /// Seed of the random policy. `None` selects the built-in default.
    pub random_seed: Option<Seed>,
    /// Simulated seconds charged for every miss.
    pub disk_cost_secs: u64,
}

impl Default for MmuConfig {
    fn default() -> Self {
        MmuConfig {
            page_size_kb: 4,
            total_frames: 100,
            policy: PolicyKind::Fifo,
            random_seed: None,
            disk_cost_secs: 5,
        }
    }
}

impl MmuConfig {
    /// Layers the defaults, an optional configuration file and `VMSIM_*`
    /// environment variables.
    pub fn load(file: &str) -> Result<MmuConfig> {
        Self::load_with_env(file, "VMSIM")
    }

    fn load_with_env(file: &str, env_prefix: &str) -> Result<MmuConfig> {
        let mut cfg = config::Config::builder()
            .set_default("page_size_kb", 4)?
            .set_default("total_frames", 100)?
            .set_default("policy", "FIFO")?
            .set_default("disk_cost_secs", 5)?;
        if !file.is_empty() {
            cfg = cfg.add_source(config::File::with_name(file))
        }
        cfg = cfg.add_source(config::Environment::with_prefix(env_prefix));
        let cfg: MmuConfig = cfg.build()?.try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.page_size_kb == 0 {
            return Err(config_err!("page size must be positive"));
        }
        if self.page_size_kb.checked_mul(1024).is_none() {
            return Err(config_err!("page size of {}KB is too large", self.page_size_kb));
        }
        if self.total_frames == 0 {
            return Err(config_err!("total frames must be positive"));
        }
        Ok(())
    }

    pub fn page_size_bytes(&self) -> u64 {
        self.page_size_kb * 1024
    }
}
