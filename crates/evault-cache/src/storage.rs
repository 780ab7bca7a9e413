//! Backing storage for the three retention tiers.
//!
//! Each tier behaves like an independent TTL'd key-value namespace. The
//! trait is deliberately clock-free: callers pass the deadline on write and
//! "now" on read, so storage itself never consults time.

use std::collections::HashMap;

use evault_types::{ObjectId, Payload, Tier, Timestamp};
use parking_lot::RwLock;

/// TTL'd per-tier value storage.
pub trait TierStorage: Send + Sync {
    /// Write `value` into `tier`, live until `expires_at`.
    fn set(&self, tier: Tier, key: ObjectId, value: Payload, expires_at: Timestamp);

    /// Read a live value from `tier`. Entries at or past their deadline
    /// read as absent.
    fn get(&self, tier: Tier, key: ObjectId, now: Timestamp) -> Option<Payload>;

    /// Drop the value for `key` from `tier`, if present.
    fn remove(&self, tier: Tier, key: ObjectId);
}

#[derive(Debug, Clone)]
struct Slot {
    value: Payload,
    expires_at: Timestamp,
}

/// In-memory [`TierStorage`], one map per tier.
#[derive(Debug, Default)]
pub struct MemoryTierStorage {
    tiers: [RwLock<HashMap<ObjectId, Slot>>; 3],
}

impl MemoryTierStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    const fn table(&self, tier: Tier) -> &RwLock<HashMap<ObjectId, Slot>> {
        match tier {
            Tier::Hot => &self.tiers[0],
            Tier::Warm => &self.tiers[1],
            Tier::Cold => &self.tiers[2],
        }
    }
}

impl TierStorage for MemoryTierStorage {
    fn set(&self, tier: Tier, key: ObjectId, value: Payload, expires_at: Timestamp) {
        self.table(tier)
            .write()
            .insert(key, Slot { value, expires_at });
    }

    fn get(&self, tier: Tier, key: ObjectId, now: Timestamp) -> Option<Payload> {
        let table = self.table(tier);
        let slot = table.read().get(&key).cloned()?;
        if now >= slot.expires_at {
            // Lazy expiry: reap on the read that discovers it.
            table.write().remove(&key);
            return None;
        }
        Some(slot.value)
    }

    fn remove(&self, tier: Tier, key: ObjectId) {
        self.table(tier).write().remove(&key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn oid(n: u64) -> ObjectId {
        ObjectId::new(n).expect("non-zero object id")
    }

    fn ts(millis: u64) -> Timestamp {
        Timestamp::from_millis(millis)
    }

    #[test]
    fn tiers_are_independent_namespaces() {
        let storage = MemoryTierStorage::new();
        storage.set(Tier::Hot, oid(1), Payload::from(&b"hot"[..]), ts(100));
        storage.set(Tier::Cold, oid(1), Payload::from(&b"cold"[..]), ts(100));

        assert_eq!(
            storage.get(Tier::Hot, oid(1), ts(10)),
            Some(Payload::from(&b"hot"[..]))
        );
        assert_eq!(
            storage.get(Tier::Cold, oid(1), ts(10)),
            Some(Payload::from(&b"cold"[..]))
        );
        assert_eq!(storage.get(Tier::Warm, oid(1), ts(10)), None);
    }

    #[test]
    fn expired_entries_read_as_absent() {
        let storage = MemoryTierStorage::new();
        storage.set(Tier::Warm, oid(2), Payload::from(&b"v"[..]), ts(50));

        assert!(storage.get(Tier::Warm, oid(2), ts(49)).is_some());
        assert!(storage.get(Tier::Warm, oid(2), ts(50)).is_none());
        // And the reaped slot stays gone even for an earlier "now".
        assert!(storage.get(Tier::Warm, oid(2), ts(10)).is_none());
    }

    #[test]
    fn remove_drops_only_the_named_tier() {
        let storage = MemoryTierStorage::new();
        storage.set(Tier::Hot, oid(3), Payload::from(&b"a"[..]), ts(100));
        storage.set(Tier::Warm, oid(3), Payload::from(&b"b"[..]), ts(100));

        storage.remove(Tier::Hot, oid(3));
        assert!(storage.get(Tier::Hot, oid(3), ts(1)).is_none());
        assert!(storage.get(Tier::Warm, oid(3), ts(1)).is_some());
    }
}
