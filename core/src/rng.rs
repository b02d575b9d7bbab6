//! Deterministic random number generation.
//!
//! RULE: Nothing in the simulation may call any platform RNG.
//! All randomness flows through SimRng instances derived from the
//! single master seed of the run.
//!
//! Each consumer gets its own stream, seeded deterministically from
//! (master_seed XOR slot_index). This means:
//!   - Adding a new consumer never changes existing streams.
//!   - Each stream is fully reproducible in isolation.

use rand::{RngCore, SeedableRng};
use rand_pcg::Pcg64Mcg;
use serde::{Deserialize, Serialize};

/// A probability distribution over durations / quantities.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Distribution {
    Constant { value: f64 },
    Normal { mean: f64, std_dev: f64 },
    Exponential { mean: f64 },
    Uniform { low: f64, high: f64 },
}

impl Distribution {
    pub fn mean(&self) -> f64 {
        match *self {
            Self::Constant { value }       => value,
            Self::Normal { mean, .. }      => mean,
            Self::Exponential { mean }     => mean,
            Self::Uniform { low, high }    => (low + high) / 2.0,
        }
    }

    /// Parameters that can never produce a usable draw.
    pub fn problem(&self) -> Option<String> {
        let finite = |v: f64| v.is_finite();
        match *self {
            Self::Constant { value } if !finite(value) => Some(format!("constant {value} is not finite")),
            Self::Normal { mean, std_dev } if !finite(mean) || !finite(std_dev) || std_dev < 0.0 => {
                Some(format!("normal({mean}, {std_dev}) is invalid"))
            }
            Self::Exponential { mean } if !finite(mean) || mean <= 0.0 => {
                Some(format!("exponential mean {mean} must be positive"))
            }
            Self::Uniform { low, high } if !finite(low) || !finite(high) || low > high => {
                Some(format!("uniform [{low}, {high}] is invalid"))
            }
            _ => None,
        }
    }
}

/// Source of random variates for the domain actors.
pub trait RandomSource {
    /// Uniform float in [0.0, 1.0).
    fn next_f64(&mut self) -> f64;

    fn sample(&mut self, distribution: &Distribution) -> f64 {
        match *distribution {
            Distribution::Constant { value } => value,
            Distribution::Normal { mean, std_dev } => {
                // Box–Muller; u1 is kept away from zero for ln().
                let u1 = self.next_f64().max(1e-12);
                let u2 = self.next_f64();
                let z = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
                mean + std_dev * z
            }
            Distribution::Exponential { mean } => {
                let u = self.next_f64();
                -mean * (1.0 - u).ln()
            }
            Distribution::Uniform { low, high } => low + (high - low) * self.next_f64(),
        }
    }

    /// Bernoulli trial: returns true with probability p.
    fn chance(&mut self, p: f64) -> bool {
        self.next_f64() < p
    }
}

/// A named, deterministic RNG stream.
pub struct SimRng {
    pub name: &'static str,
    inner: Pcg64Mcg,
}

impl SimRng {
    /// The slot index must never change once assigned.
    pub fn new(master_seed: u64, slot_index: u64) -> Self {
        let derived_seed = master_seed ^ (slot_index.wrapping_mul(0x9e37_79b9_7f4a_7c15));
        Self {
            name: "unnamed",
            inner: Pcg64Mcg::seed_from_u64(derived_seed),
        }
    }

    pub fn with_name(mut self, name: &'static str) -> Self {
        self.name = name;
        self
    }

    pub fn next_u64(&mut self) -> u64 {
        self.inner.next_u64()
    }
}

impl RandomSource for SimRng {
    fn next_f64(&mut self) -> f64 {
        let bits = self.inner.next_u64();
        (bits >> 11) as f64 * (1.0 / (1u64 << 53) as f64)
    }
}

impl std::fmt::Debug for SimRng {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimRng").field("name", &self.name).finish_non_exhaustive()
    }
}

/// All RNG streams for a single run, indexed by stable slot.
#[derive(Debug, Clone, Copy)]
pub struct RngBank {
    master_seed: u64,
}

impl RngBank {
    pub fn new(master_seed: u64) -> Self {
        Self { master_seed }
    }

    pub fn master_seed(&self) -> u64 {
        self.master_seed
    }

    pub fn stream(&self, slot: StreamSlot) -> SimRng {
        SimRng::new(self.master_seed, slot as u64).with_name(slot.name())
    }
}

/// Stable stream slot assignments.
/// NEVER reorder or remove entries. Only append.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u64)]
pub enum StreamSlot {
    Arrivals = 0,
    ModeSelection = 1,
    Analysis = 2,
    ReRun = 3,
}

impl StreamSlot {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Arrivals      => "arrivals",
            Self::ModeSelection => "mode_selection",
            Self::Analysis      => "analysis",
            Self::ReRun         => "rerun",
        }
    }
}
