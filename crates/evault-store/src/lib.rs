//! Record-store contract for EdgeVault, plus the bundled in-memory
//! reference implementation.
//!
//! The three subsystems never talk to a database directly; they go through
//! [`RecordStore`], which carries exactly the CRUD surface they require:
//! - create/read/flip for raw objects
//! - get-or-create and update for cache metadata
//! - append/fetch-by-owner for fragments
//! - append-only, conflict-checked versions for global models
//! - append/fetch-by-version for local updates
//!
//! Two store behaviors are load-bearing for correctness and deserve
//! emphasis:
//! - [`RecordStore::insert_global_model`] is **check-and-create**: it fails
//!   with [`VaultError::VersionConflict`] when the version already exists.
//!   This is the version-scoped exclusion the aggregation engine's
//!   optimistic concurrency is built on.
//! - [`RecordStore::latest_global_model`] is always a max-version scan,
//!   never a cached pointer, so concurrent writers cannot observe a stale
//!   "latest".

mod memory;

pub use memory::MemoryStore;

use evault_error::Result;
use evault_types::{
    CacheEntry, Device, DeviceId, Fragment, GlobalModel, LocalUpdate, ModelVersion, ObjectId,
    Payload, RawObject, Tier, Timestamp,
};

/// The persistence contract the core subsystems require.
///
/// Implementations must be safe to share across threads; all interior
/// mutability lives behind the implementation's own synchronization.
pub trait RecordStore: Send + Sync {
    // --- raw objects ---

    /// Create a raw object, allocating its identity.
    fn create_raw_object(
        &self,
        device: DeviceId,
        payload: Payload,
        now: Timestamp,
    ) -> Result<RawObject>;

    /// Fetch one raw object.
    fn raw_object(&self, id: ObjectId) -> Result<Option<RawObject>>;

    /// All raw objects, in id order.
    fn raw_objects(&self) -> Result<Vec<RawObject>>;

    /// Flip the `processed` flag.
    ///
    /// Returns `true` if the flag flipped on this call, `false` if the
    /// object was already processed (the flip happens exactly once).
    fn mark_processed(&self, id: ObjectId) -> Result<bool>;

    // --- devices ---

    /// Insert or replace a device row.
    fn upsert_device(&self, device: Device) -> Result<()>;

    /// Fetch one device.
    fn device(&self, id: DeviceId) -> Result<Option<Device>>;

    /// All registered devices, in id order.
    fn devices(&self) -> Result<Vec<Device>>;

    /// Refresh a device's `last_active`. Unknown devices are ignored.
    fn touch_device(&self, id: DeviceId, now: Timestamp) -> Result<()>;

    // --- cache metadata ---

    /// Fetch cache metadata for one object.
    fn cache_entry(&self, object: ObjectId) -> Result<Option<CacheEntry>>;

    /// Fetch-or-create cache metadata, atomically.
    ///
    /// `initial_tier` is only consulted when the row does not exist yet; an
    /// existing row is returned untouched.
    fn cache_entry_get_or_create(
        &self,
        object: ObjectId,
        initial_tier: Tier,
        now: Timestamp,
    ) -> Result<CacheEntry>;

    /// Replace the cache metadata row for `entry.object`.
    fn update_cache_entry(&self, entry: CacheEntry) -> Result<()>;

    /// All cache metadata rows, in object-id order (maintenance pass input).
    fn cache_entries(&self) -> Result<Vec<CacheEntry>>;

    // --- fragments ---

    /// Persist one fragment. Writing the same (object, index) twice
    /// replaces the earlier row, keeping the k+m-fragments invariant under
    /// re-encoding.
    fn insert_fragment(&self, fragment: Fragment) -> Result<()>;

    /// All fragments of one object, in index order.
    fn fragments_for(&self, object: ObjectId) -> Result<Vec<Fragment>>;

    // --- global models ---

    /// Append a new model version (check-and-create).
    ///
    /// Fails with [`VaultError::VersionConflict`] when the version already
    /// exists; the chain is append-only and never rewritten.
    ///
    /// [`VaultError::VersionConflict`]: evault_error::VaultError::VersionConflict
    fn insert_global_model(&self, model: GlobalModel) -> Result<()>;

    /// Fetch one model version.
    fn global_model(&self, version: ModelVersion) -> Result<Option<GlobalModel>>;

    /// The row with the maximum version, if any.
    fn latest_global_model(&self) -> Result<Option<GlobalModel>>;

    // --- local updates ---

    /// Record one local update.
    fn insert_local_update(&self, update: LocalUpdate) -> Result<()>;

    /// All local updates tagged with `version`, in insertion order.
    fn local_updates_for(&self, version: ModelVersion) -> Result<Vec<LocalUpdate>>;
}
