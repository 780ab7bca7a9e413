//! Initial-tier placement policies.
//!
//! The placement decision is an injectable seam so tests can pin a
//! deterministic policy; randomness, where wanted, is always seeded.

use evault_error::{Result, VaultError};
use evault_types::{ObjectId, Tier};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Chooses the tier for a key's first cache write.
///
/// Consulted exactly once per key, when its metadata row is created;
/// migration afterwards is driven by access pattern, not by this policy.
pub trait PlacementPolicy: Send {
    fn initial_tier(&mut self, object: ObjectId) -> Tier;
}

/// Deterministic default: every new entry starts Hot.
///
/// Fresh ingests are the most likely keys to be read back immediately, and
/// the maintenance pass will cool anything that is not.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysHot;

impl PlacementPolicy for AlwaysHot {
    fn initial_tier(&mut self, _object: ObjectId) -> Tier {
        Tier::Hot
    }
}

/// Weighted-random placement over the three tiers, seeded for replay.
#[derive(Debug)]
pub struct WeightedPlacement {
    weights: [u32; 3],
    total: u32,
    rng: StdRng,
}

impl WeightedPlacement {
    /// Weights are in probe order (hot, warm, cold) and must not all be
    /// zero.
    pub fn new(weights: [u32; 3], seed: u64) -> Result<Self> {
        let total: u32 = weights.iter().sum();
        if total == 0 {
            return Err(VaultError::invalid_config(
                "placement weights",
                "all zero",
            ));
        }
        Ok(Self {
            weights,
            total,
            rng: StdRng::seed_from_u64(seed),
        })
    }
}

impl PlacementPolicy for WeightedPlacement {
    fn initial_tier(&mut self, _object: ObjectId) -> Tier {
        let mut roll = self.rng.gen_range(0..self.total);
        for (tier, &weight) in Tier::PROBE_ORDER.iter().zip(&self.weights) {
            if roll < weight {
                return *tier;
            }
            roll -= weight;
        }
        Tier::Cold
    }
}
