//! Data-model records shared between the store and the three subsystems.
//!
//! Mutability is deliberately narrow:
//! - [`RawObject::processed`] flips exactly once, nothing else changes
//! - [`CacheEntry`] is the only freely-mutated row (tier / counters)
//! - [`Fragment`], [`GlobalModel`], and [`LocalUpdate`] are immutable once
//!   written

use crate::payload::Payload;
use crate::{DeviceId, FragmentIndex, ModelVersion, ObjectId, Tier, Timestamp};

/// One simulated edge device.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Device {
    pub id: DeviceId,
    pub name: String,
    /// Sensor kind, e.g. "temperature" or "multi".
    pub kind: String,
    pub location: String,
    /// Refreshed whenever the device ingests a record or trains.
    pub last_active: Timestamp,
}

/// One ingested sensor record.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct RawObject {
    pub id: ObjectId,
    pub device: DeviceId,
    pub payload: Payload,
    /// Flips to true exactly once, after the record has been cached,
    /// encoded, and trained on.
    pub processed: bool,
    pub created_at: Timestamp,
}

/// Cache metadata for one raw object (1:1).
///
/// Created lazily on the first cache write and retained until the owning
/// object is gone. At most one tier holds a live copy of the value at any
/// time; this row records which.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct CacheEntry {
    pub object: ObjectId,
    pub tier: Tier,
    pub access_count: u64,
    pub last_access: Timestamp,
}

impl CacheEntry {
    /// Fresh metadata for a first cache write.
    #[must_use]
    pub const fn new(object: ObjectId, tier: Tier, now: Timestamp) -> Self {
        Self {
            object,
            tier,
            access_count: 0,
            last_access: now,
        }
    }

    /// Record one hit at `now`.
    pub fn record_hit(&mut self, now: Timestamp) {
        self.access_count = self.access_count.saturating_add(1);
        self.last_access = now;
    }
}

/// Label of the simulated storage location a fragment was placed on.
///
/// Purely cosmetic: no replication or locality guarantee is implied.
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
#[repr(transparent)]
pub struct StorageNode(pub String);

impl StorageNode {
    #[must_use]
    pub fn new(label: impl Into<String>) -> Self {
        Self(label.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for StorageNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One erasure-coded shard of a raw object. Immutable once written.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Fragment {
    pub object: ObjectId,
    /// 1-based shard index; indices 1..=k are data, k+1..=k+m are parity.
    pub index: FragmentIndex,
    pub bytes: Vec<u8>,
    pub parity: bool,
    pub node: StorageNode,
}

/// One version of the shared global model. Immutable once created.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct GlobalModel {
    pub version: ModelVersion,
    /// Serialized parameter blob; opaque outside the aggregation engine.
    pub params: Vec<u8>,
    /// Mean accuracy reported by the aggregation that produced this version,
    /// absent for the bootstrap version.
    pub accuracy: Option<f64>,
    pub created_at: Timestamp,
}

/// One device's parameter contribution against a specific model version.
///
/// Never mutated; logically consumed by the next aggregation of
/// `basis_version`.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct LocalUpdate {
    pub device: DeviceId,
    /// The global-model version this update was computed against.
    pub basis_version: ModelVersion,
    /// Serialized parameter delta; opaque outside the aggregation engine.
    pub params: Vec<u8>,
    /// Training accuracy on the device's local sample.
    pub accuracy: f64,
    pub created_at: Timestamp,
}
