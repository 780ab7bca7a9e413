//! Core identifier newtypes and shared value types for EdgeVault.
//!
//! Identifiers are 1-based and refuse zero at construction, so a raw `0`
//! coming out of a collaborator can never masquerade as a valid reference.

pub mod clock;
pub mod model;
pub mod payload;

use std::fmt;
use std::num::{NonZeroU8, NonZeroU32, NonZeroU64};
use std::time::Duration;

pub use clock::{Clock, ManualClock, SystemClock};
pub use model::{CacheEntry, Device, Fragment, GlobalModel, LocalUpdate, RawObject, StorageNode};
pub use payload::Payload;

/// Identity of one ingested raw object.
///
/// Object ids are 1-based (id 0 does not exist).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
#[repr(transparent)]
pub struct ObjectId(NonZeroU64);

impl ObjectId {
    /// Create a new object id from a raw u64.
    ///
    /// Returns `None` if `n` is 0.
    #[inline]
    pub const fn new(n: u64) -> Option<Self> {
        match NonZeroU64::new(n) {
            Some(v) => Some(Self(v)),
            None => None,
        }
    }

    /// Get the raw u64 value.
    #[inline]
    pub const fn get(self) -> u64 {
        self.0.get()
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity of one simulated edge device.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
#[repr(transparent)]
pub struct DeviceId(NonZeroU64);

impl DeviceId {
    /// Create a new device id from a raw u64.
    ///
    /// Returns `None` if `n` is 0.
    #[inline]
    pub const fn new(n: u64) -> Option<Self> {
        match NonZeroU64::new(n) {
            Some(v) => Some(Self(v)),
            None => None,
        }
    }

    /// Get the raw u64 value.
    #[inline]
    pub const fn get(self) -> u64 {
        self.0.get()
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Version of the shared global model.
///
/// Versions are strictly positive and form an append-only chain: aggregation
/// only ever creates `previous.next()`, never rewrites an existing version.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
#[repr(transparent)]
pub struct ModelVersion(NonZeroU32);

impl ModelVersion {
    /// The initial bootstrap version.
    pub const ONE: Self = Self(match NonZeroU32::new(1) {
        Some(v) => v,
        None => unreachable!(),
    });

    /// Create a new model version from a raw u32.
    ///
    /// Returns `None` if `n` is 0.
    #[inline]
    pub const fn new(n: u32) -> Option<Self> {
        match NonZeroU32::new(n) {
            Some(v) => Some(Self(v)),
            None => None,
        }
    }

    /// Get the raw u32 value.
    #[inline]
    pub const fn get(self) -> u32 {
        self.0.get()
    }

    /// The successor version.
    ///
    /// Saturates at `u32::MAX`; a chain that long is outside the testbed's
    /// operating envelope.
    #[inline]
    #[must_use]
    pub const fn next(self) -> Self {
        match NonZeroU32::new(self.0.get().saturating_add(1)) {
            Some(v) => Self(v),
            None => unreachable!(),
        }
    }
}

impl fmt::Display for ModelVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// 1-based index of one erasure-coded fragment.
///
/// The index doubles as the Vandermonde evaluation point for the fragment's
/// row, which is why index 0 must not exist.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
#[repr(transparent)]
pub struct FragmentIndex(NonZeroU8);

impl FragmentIndex {
    /// Create a new fragment index from a raw u8.
    ///
    /// Returns `None` if `n` is 0.
    #[inline]
    pub const fn new(n: u8) -> Option<Self> {
        match NonZeroU8::new(n) {
            Some(v) => Some(Self(v)),
            None => None,
        }
    }

    /// Get the raw u8 value.
    #[inline]
    pub const fn get(self) -> u8 {
        self.0.get()
    }
}

impl fmt::Display for FragmentIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "F{}", self.0)
    }
}

/// Milliseconds since the Unix epoch.
///
/// The testbed never needs sub-millisecond resolution, and a plain u64 keeps
/// timestamps `Copy`, totally ordered, and trivially serializable.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Default,
    serde::Serialize,
    serde::Deserialize,
)]
#[repr(transparent)]
pub struct Timestamp(u64);

impl Timestamp {
    /// Construct from raw milliseconds since the epoch.
    #[inline]
    #[must_use]
    pub const fn from_millis(millis: u64) -> Self {
        Self(millis)
    }

    /// Raw milliseconds since the epoch.
    #[inline]
    #[must_use]
    pub const fn as_millis(self) -> u64 {
        self.0
    }

    /// Elapsed time from `earlier` to `self`, saturating to zero when the
    /// clock appears to have gone backwards.
    #[inline]
    #[must_use]
    pub const fn saturating_since(self, earlier: Self) -> Duration {
        Duration::from_millis(self.0.saturating_sub(earlier.0))
    }

    /// This timestamp advanced by `duration` (saturating).
    #[inline]
    #[must_use]
    pub fn saturating_add(self, duration: Duration) -> Self {
        let millis = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
        Self(self.0.saturating_add(millis))
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ms", self.0)
    }
}

/// Retention tier in the hierarchical cache.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
pub enum Tier {
    /// Frequently accessed; shortest retention.
    Hot,
    /// Less frequently accessed.
    Warm,
    /// Rarely accessed; longest retention.
    Cold,
}

impl Tier {
    /// Fixed probe order for cache reads: Hot, then Warm, then Cold.
    pub const PROBE_ORDER: [Self; 3] = [Self::Hot, Self::Warm, Self::Cold];

    /// Short lowercase label for logs.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Hot => "hot",
            Self::Warm => "warm",
            Self::Cold => "cold",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_id_rejects_zero() {
        assert!(ObjectId::new(0).is_none());
        let id = ObjectId::new(7).expect("non-zero id constructs");
        assert_eq!(id.get(), 7);
        assert_eq!(id.to_string(), "7");
    }

    #[test]
    fn model_version_chain_is_monotonic() {
        let v1 = ModelVersion::ONE;
        assert_eq!(v1.get(), 1);
        let v2 = v1.next();
        assert_eq!(v2.get(), 2);
        assert!(v2 > v1);
        assert_eq!(v2.to_string(), "v2");
    }

    #[test]
    fn fragment_index_rejects_zero() {
        assert!(FragmentIndex::new(0).is_none());
        let idx = FragmentIndex::new(5).expect("non-zero index constructs");
        assert_eq!(idx.to_string(), "F5");
    }

    #[test]
    fn timestamp_elapsed_saturates() {
        let early = Timestamp::from_millis(1_000);
        let late = Timestamp::from_millis(4_500);
        assert_eq!(late.saturating_since(early), Duration::from_millis(3_500));
        assert_eq!(early.saturating_since(late), Duration::ZERO);
        assert_eq!(
            early.saturating_add(Duration::from_secs(2)),
            Timestamp::from_millis(3_000)
        );
    }

    #[test]
    fn tier_probe_order_is_hot_first() {
        assert_eq!(Tier::PROBE_ORDER, [Tier::Hot, Tier::Warm, Tier::Cold]);
        assert_eq!(Tier::Warm.to_string(), "warm");
    }
}
