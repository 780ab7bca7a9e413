//! The tiered cache manager: placement on first write, promotion on hits,
//! demotion in a background maintenance pass.
//!
//! Concurrency model: all read-modify-write for one key (metadata row plus
//! backing-store writes) is serialized through a per-key lock; distinct keys
//! proceed fully in parallel. The store's get-or-create upsert is atomic on
//! its own, the per-key lock is what makes the surrounding
//! read-evaluate-migrate sequence safe.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use evault_error::{Result, VaultError};
use evault_store::RecordStore;
use evault_types::{Clock, ObjectId, Payload, SystemClock, Tier, Timestamp};
use parking_lot::Mutex;
use tracing::{debug, info};

use crate::policy::{AlwaysHot, PlacementPolicy};
use crate::storage::{MemoryTierStorage, TierStorage};

/// Tunable cache behavior. All durations are wall-clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheConfig {
    /// Value TTL per tier.
    pub hot_ttl: Duration,
    pub warm_ttl: Duration,
    pub cold_ttl: Duration,
    /// Warm entries promote to Hot once `access_count` exceeds this.
    pub promote_threshold: u64,
    /// Cold entries promote to Warm once `access_count` exceeds this.
    pub promote_threshold_cold: u64,
    /// Hot entries demote after this much inactivity (W1).
    pub demote_hot_after: Duration,
    /// Warm entries demote after this much inactivity (W2).
    pub demote_warm_after: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            hot_ttl: Duration::from_secs(300),
            warm_ttl: Duration::from_secs(1800),
            cold_ttl: Duration::from_secs(3600),
            promote_threshold: 3,
            promote_threshold_cold: 1,
            demote_hot_after: Duration::from_secs(600),
            demote_warm_after: Duration::from_secs(3600),
        }
    }
}

impl CacheConfig {
    fn validate(self) -> Result<Self> {
        if self.hot_ttl.is_zero() || self.warm_ttl.is_zero() || self.cold_ttl.is_zero() {
            return Err(VaultError::invalid_config("tier ttl", "zero duration"));
        }
        if self.demote_hot_after.is_zero() || self.demote_warm_after.is_zero() {
            return Err(VaultError::invalid_config("demotion window", "zero duration"));
        }
        if self.demote_hot_after > self.demote_warm_after {
            return Err(VaultError::invalid_config(
                "demotion windows",
                "W1 exceeds W2",
            ));
        }
        Ok(self)
    }

    const fn ttl(&self, tier: Tier) -> Duration {
        match tier {
            Tier::Hot => self.hot_ttl,
            Tier::Warm => self.warm_ttl,
            Tier::Cold => self.cold_ttl,
        }
    }
}

/// Counts of demotions performed by one maintenance pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MaintenanceReport {
    pub hot_to_warm: usize,
    pub hot_to_cold: usize,
    pub warm_to_cold: usize,
}

impl MaintenanceReport {
    #[must_use]
    pub const fn total(self) -> usize {
        self.hot_to_warm + self.hot_to_cold + self.warm_to_cold
    }
}

/// Hierarchical three-tier cache manager.
pub struct TieredCache {
    store: Arc<dyn RecordStore>,
    storage: Arc<dyn TierStorage>,
    policy: Mutex<Box<dyn PlacementPolicy>>,
    clock: Arc<dyn Clock>,
    config: CacheConfig,
    key_locks: Mutex<HashMap<ObjectId, Arc<Mutex<()>>>>,
}

impl std::fmt::Debug for TieredCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TieredCache")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl TieredCache {
    /// Create a cache manager; fails fast on an invalid configuration.
    pub fn new(
        store: Arc<dyn RecordStore>,
        storage: Arc<dyn TierStorage>,
        policy: Box<dyn PlacementPolicy>,
        clock: Arc<dyn Clock>,
        config: CacheConfig,
    ) -> Result<Self> {
        Ok(Self {
            store,
            storage,
            policy: Mutex::new(policy),
            clock,
            config: config.validate()?,
            key_locks: Mutex::new(HashMap::new()),
        })
    }

    /// Default wiring: in-memory tier storage, always-Hot placement,
    /// system clock, default tunables.
    pub fn with_defaults(store: Arc<dyn RecordStore>) -> Result<Self> {
        Self::new(
            store,
            Arc::new(MemoryTierStorage::new()),
            Box::new(AlwaysHot),
            Arc::new(SystemClock),
            CacheConfig::default(),
        )
    }

    #[inline]
    #[must_use]
    pub const fn config(&self) -> &CacheConfig {
        &self.config
    }

    fn key_lock(&self, key: ObjectId) -> Arc<Mutex<()>> {
        Arc::clone(self.key_locks.lock().entry(key).or_default())
    }

    /// Tier an entry should occupy after a hit, given its access count.
    const fn promotion_target(&self, tier: Tier, access_count: u64) -> Tier {
        match tier {
            Tier::Hot => Tier::Hot,
            Tier::Warm => {
                if access_count > self.config.promote_threshold {
                    Tier::Hot
                } else {
                    Tier::Warm
                }
            }
            Tier::Cold => {
                if access_count > self.config.promote_threshold_cold {
                    Tier::Warm
                } else {
                    Tier::Cold
                }
            }
        }
    }

    /// Write `value` into `tier` and drop any copy the other tiers hold, so
    /// a key is never live in two tiers at once.
    fn place(&self, key: ObjectId, tier: Tier, value: Payload, now: Timestamp) {
        let expires_at = now.saturating_add(self.config.ttl(tier));
        self.storage.set(tier, key, value, expires_at);
        for other in Tier::PROBE_ORDER {
            if other != tier {
                self.storage.remove(other, key);
            }
        }
    }

    /// Cache `value` under `key`.
    ///
    /// The placement policy is consulted only when the key has no metadata
    /// yet; an existing entry keeps its current tier. Returns the tier the
    /// value landed in.
    pub fn put(&self, key: ObjectId, value: Payload) -> Result<Tier> {
        let lock = self.key_lock(key);
        let _guard = lock.lock();
        let now = self.clock.now();

        let placement = match self.store.cache_entry(key)? {
            Some(entry) => entry.tier,
            None => self.policy.lock().initial_tier(key),
        };
        let entry = self.store.cache_entry_get_or_create(key, placement, now)?;
        self.place(key, entry.tier, value, now);
        debug!(%key, tier = %entry.tier, "value cached");
        Ok(entry.tier)
    }

    /// Look up `key`, probing Hot, then Warm, then Cold.
    ///
    /// A hit bumps the entry's counters, applies the promotion rule, and
    /// re-writes the value into the resulting tier before returning it. A
    /// miss across all tiers is a normal absent result and fabricates no
    /// metadata.
    pub fn get(&self, key: ObjectId) -> Result<Option<Payload>> {
        let lock = self.key_lock(key);
        let _guard = lock.lock();
        let now = self.clock.now();

        let Some((found_tier, value)) = Tier::PROBE_ORDER
            .iter()
            .find_map(|&tier| self.storage.get(tier, key, now).map(|value| (tier, value)))
        else {
            debug!(%key, "cache miss");
            return Ok(None);
        };

        let mut entry = self.store.cache_entry_get_or_create(key, found_tier, now)?;
        // The live value's location is authoritative for the hit path.
        entry.tier = found_tier;
        entry.record_hit(now);

        let target = self.promotion_target(found_tier, entry.access_count);
        if target != found_tier {
            info!(
                %key,
                from = %found_tier,
                to = %target,
                access_count = entry.access_count,
                "cache entry promoted"
            );
        }
        self.place(key, target, value.clone(), now);
        entry.tier = target;
        self.store.update_cache_entry(entry)?;
        Ok(Some(value))
    }

    /// Background demotion pass over all cache entries.
    ///
    /// Hot entries idle past W1 cool to Warm (straight to Cold when already
    /// idle past W2); Warm entries idle past W2 cool to Cold. The backing
    /// value moves with the entry when still live. Re-running with no
    /// intervening access changes nothing.
    pub fn run_maintenance(&self) -> Result<MaintenanceReport> {
        let mut report = MaintenanceReport::default();

        for snapshot in self.store.cache_entries()? {
            let key = snapshot.object;
            let lock = self.key_lock(key);
            let _guard = lock.lock();
            let now = self.clock.now();

            // Re-read under the key lock; the snapshot may be stale.
            let Some(mut entry) = self.store.cache_entry(key)? else {
                continue;
            };
            let idle = now.saturating_since(entry.last_access);
            let target = match entry.tier {
                Tier::Hot if idle > self.config.demote_warm_after => Tier::Cold,
                Tier::Hot if idle > self.config.demote_hot_after => Tier::Warm,
                Tier::Warm if idle > self.config.demote_warm_after => Tier::Cold,
                _ => continue,
            };

            if let Some(value) = self.storage.get(entry.tier, key, now) {
                self.place(key, target, value, now);
            } else {
                self.storage.remove(entry.tier, key);
            }

            match (entry.tier, target) {
                (Tier::Hot, Tier::Warm) => report.hot_to_warm += 1,
                (Tier::Hot, Tier::Cold) => report.hot_to_cold += 1,
                (Tier::Warm, Tier::Cold) => report.warm_to_cold += 1,
                _ => {}
            }
            info!(
                %key,
                from = %entry.tier,
                to = %target,
                idle_ms = u64::try_from(idle.as_millis()).unwrap_or(u64::MAX),
                "cache entry demoted"
            );
            entry.tier = target;
            self.store.update_cache_entry(entry)?;
        }

        Ok(report)
    }
}
