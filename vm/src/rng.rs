//! Deterministic pseudo-random sources.
//!
//! Two generators live here: a 32-bit xorshift used by the random replacement
//! policy, and a counter-based mulberry32 used by the workload generator. Both
//! produce floats in `[0, 1)` so replays with the same seed are bit-for-bit
//! identical.

use std::fmt::{Display, Formatter};

use serde::Deserialize;

/// Seed used when the random policy is configured without one (or with zero).
pub const DEFAULT_XORSHIFT_SEED: u32 = 0xC0FFEE;

/// A numeric or textual seed.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum Seed {
    Numeric(u64),
    Text(String),
}

impl Seed {
    /// Reduces the seed to 32 bits. Numbers are masked; text that spells a
    /// decimal integer is treated as that number, anything else is digested
    /// through [`cyrb128`].
    pub fn to_u32(&self) -> u32 {
        match self {
            Seed::Numeric(n) => (*n & 0xFFFF_FFFF) as u32,
            Seed::Text(s) => match s.trim().parse::<u64>() {
                Ok(n) => (n & 0xFFFF_FFFF) as u32,
                Err(_) => cyrb128(s)[0],
            },
        }
    }
}

impl Default for Seed {
    fn default() -> Self {
        Seed::Numeric(12345)
    }
}

impl From<u64> for Seed {
    fn from(n: u64) -> Self {
        Seed::Numeric(n)
    }
}

impl From<&str> for Seed {
    fn from(s: &str) -> Self {
        Seed::Text(s.to_string())
    }
}

impl Display for Seed {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Seed::Numeric(n) => write!(f, "{}", n),
            Seed::Text(s) => write!(f, "{}", s),
        }
    }
}

/// 128-bit, four-lane multiplicative mixing hash over the UTF-16 code units
/// of `s`. Lane 0 is the combined digest.
pub fn cyrb128(s: &str) -> [u32; 4] {
    let mut h1: u32 = 1779033703;
    let mut h2: u32 = 3144134277;
    let mut h3: u32 = 1013904242;
    let mut h4: u32 = 2773480762;

    for k in s.encode_utf16() {
        let k = k as u32;
        h1 = h2 ^ (h1 ^ k).wrapping_mul(597399067);
        h2 = h3 ^ (h2 ^ k).wrapping_mul(2869860233);
        h3 = h4 ^ (h3 ^ k).wrapping_mul(951274213);
        h4 = h1 ^ (h4 ^ k).wrapping_mul(2716044179);
    }

    h1 = h3 ^ (h1 >> 18);
    h2 = h4 ^ (h2 >> 22);
    h3 = h1 ^ (h3 >> 17);
    h4 = h2 ^ (h4 >> 19);

    [h1 ^ h2 ^ h3 ^ h4, h1, h2, h3]
}

/// xorshift32 with the middle shift performed on the signed reinterpretation
/// of the state, which keeps eviction sequences compatible with traces
/// recorded by earlier tooling.
#[derive(Debug, Clone)]
pub struct Xorshift32 {
    state: u32,
}

impl Xorshift32 {
    pub fn new(seed: u32) -> Self {
        let state = if seed == 0 { DEFAULT_XORSHIFT_SEED } else { seed };

        Xorshift32 { state }
    }

    pub fn next_u32(&mut self) -> u32 {
        let mut s = self.state;
        s ^= s << 13;
        s ^= ((s as i32) >> 17) as u32;
        s ^= s << 5;
        self.state = s;
        s
    }

    pub fn next_f64(&mut self) -> f64 {
        self.next_u32() as f64 / 4294967296.0
    }
}

/// Counter-based mulberry32 generator.
#[derive(Debug, Clone)]
pub struct Mulberry32 {
    state: u32,
}

impl Mulberry32 {
    pub fn new(seed: u32) -> Self {
        Mulberry32 { state: seed }
    }

    pub fn next_f64(&mut self) -> f64 {
        self.state = self.state.wrapping_add(0x6D2B79F5);
        let mut t = self.state;
        t = (t ^ (t >> 15)).wrapping_mul(t | 1);
        t ^= t.wrapping_add((t ^ (t >> 7)).wrapping_mul(t | 61));
        (t ^ (t >> 14)) as f64 / 4294967296.0
    }

    /// Uniform integer in `[min, max]`.
    pub fn int(&mut self, min: u64, max: u64) -> u64 {
        let span = (max - min) as f64 + 1.0;
        let offset = (self.next_f64() * span).floor() as u64;
        min + offset.min(max - min)
    }

    /// Uniform index into a collection of `len` items. `len` must be non-zero.
    pub fn index(&mut self, len: usize) -> usize {
        self.int(0, len as u64 - 1) as usize
    }

    pub fn pick<'a, T>(&mut self, items: &'a [T]) -> &'a T {
        &items[self.index(items.len())]
    }
}
