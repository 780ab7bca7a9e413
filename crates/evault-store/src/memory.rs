//! In-memory reference implementation of [`RecordStore`].
//!
//! All tables are `BTreeMap`s behind one `RwLock`, giving deterministic
//! iteration order and a single serialization point for the check-and-create
//! version append.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use evault_error::{Result, VaultError};
use evault_types::{
    CacheEntry, Device, DeviceId, Fragment, GlobalModel, LocalUpdate, ModelVersion, ObjectId,
    Payload, RawObject, Tier, Timestamp,
};
use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::RecordStore;

#[derive(Debug, Default)]
struct Tables {
    objects: BTreeMap<ObjectId, RawObject>,
    devices: BTreeMap<DeviceId, Device>,
    cache: BTreeMap<ObjectId, CacheEntry>,
    fragments: BTreeMap<ObjectId, BTreeMap<u8, Fragment>>,
    models: BTreeMap<ModelVersion, GlobalModel>,
    updates: BTreeMap<ModelVersion, Vec<LocalUpdate>>,
}

/// In-memory [`RecordStore`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
    next_object_id: AtomicU64,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn allocate_object_id(&self) -> ObjectId {
        let raw = self.next_object_id.fetch_add(1, Ordering::Relaxed) + 1;
        ObjectId::new(raw).unwrap_or_else(|| unreachable!("allocator starts at 1"))
    }
}

impl RecordStore for MemoryStore {
    fn create_raw_object(
        &self,
        device: DeviceId,
        payload: Payload,
        now: Timestamp,
    ) -> Result<RawObject> {
        let object = RawObject {
            id: self.allocate_object_id(),
            device,
            payload,
            processed: false,
            created_at: now,
        };
        self.tables.write().objects.insert(object.id, object.clone());
        Ok(object)
    }

    fn raw_object(&self, id: ObjectId) -> Result<Option<RawObject>> {
        Ok(self.tables.read().objects.get(&id).cloned())
    }

    fn raw_objects(&self) -> Result<Vec<RawObject>> {
        Ok(self.tables.read().objects.values().cloned().collect())
    }

    fn mark_processed(&self, id: ObjectId) -> Result<bool> {
        let mut tables = self.tables.write();
        let object = tables
            .objects
            .get_mut(&id)
            .ok_or_else(|| VaultError::not_found("raw object", id))?;
        if object.processed {
            return Ok(false);
        }
        object.processed = true;
        Ok(true)
    }

    fn upsert_device(&self, device: Device) -> Result<()> {
        self.tables.write().devices.insert(device.id, device);
        Ok(())
    }

    fn device(&self, id: DeviceId) -> Result<Option<Device>> {
        Ok(self.tables.read().devices.get(&id).cloned())
    }

    fn devices(&self) -> Result<Vec<Device>> {
        Ok(self.tables.read().devices.values().cloned().collect())
    }

    fn touch_device(&self, id: DeviceId, now: Timestamp) -> Result<()> {
        if let Some(device) = self.tables.write().devices.get_mut(&id) {
            device.last_active = now;
        }
        Ok(())
    }

    fn cache_entry(&self, object: ObjectId) -> Result<Option<CacheEntry>> {
        Ok(self.tables.read().cache.get(&object).copied())
    }

    fn cache_entry_get_or_create(
        &self,
        object: ObjectId,
        initial_tier: Tier,
        now: Timestamp,
    ) -> Result<CacheEntry> {
        let mut tables = self.tables.write();
        let entry = tables
            .cache
            .entry(object)
            .or_insert_with(|| CacheEntry::new(object, initial_tier, now));
        Ok(*entry)
    }

    fn update_cache_entry(&self, entry: CacheEntry) -> Result<()> {
        self.tables.write().cache.insert(entry.object, entry);
        Ok(())
    }

    fn cache_entries(&self) -> Result<Vec<CacheEntry>> {
        Ok(self.tables.read().cache.values().copied().collect())
    }

    fn insert_fragment(&self, fragment: Fragment) -> Result<()> {
        self.tables
            .write()
            .fragments
            .entry(fragment.object)
            .or_default()
            .insert(fragment.index.get(), fragment);
        Ok(())
    }

    fn fragments_for(&self, object: ObjectId) -> Result<Vec<Fragment>> {
        Ok(self
            .tables
            .read()
            .fragments
            .get(&object)
            .map(|by_index| by_index.values().cloned().collect())
            .unwrap_or_default())
    }

    fn insert_global_model(&self, model: GlobalModel) -> Result<()> {
        let mut tables = self.tables.write();
        if tables.models.contains_key(&model.version) {
            warn!(version = %model.version, "model version append lost the race");
            return Err(VaultError::VersionConflict {
                attempted: model.version,
            });
        }
        debug!(version = %model.version, "model version appended");
        tables.models.insert(model.version, model);
        Ok(())
    }

    fn global_model(&self, version: ModelVersion) -> Result<Option<GlobalModel>> {
        Ok(self.tables.read().models.get(&version).cloned())
    }

    fn latest_global_model(&self) -> Result<Option<GlobalModel>> {
        Ok(self
            .tables
            .read()
            .models
            .last_key_value()
            .map(|(_, model)| model.clone()))
    }

    fn insert_local_update(&self, update: LocalUpdate) -> Result<()> {
        self.tables
            .write()
            .updates
            .entry(update.basis_version)
            .or_default()
            .push(update);
        Ok(())
    }

    fn local_updates_for(&self, version: ModelVersion) -> Result<Vec<LocalUpdate>> {
        Ok(self
            .tables
            .read()
            .updates
            .get(&version)
            .cloned()
            .unwrap_or_default())
    }
}
