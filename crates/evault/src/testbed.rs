//! The assembled testbed: one shared record store driving the tiered cache,
//! the fragment store, and the aggregation engine.
//!
//! Ingestion fans out to the three subsystems as independent operations over
//! the same record — caching, encoding, and training share no intermediate
//! results — and flips the record's `processed` flag once all three are
//! done.

use std::sync::Arc;

use evault_cache::{CacheConfig, MemoryTierStorage, PlacementPolicy, TieredCache};
use evault_ec::{CodecConfig, ErasureCodec, FragmentStore};
use evault_error::{Result, VaultError};
use evault_fl::{AggregateOutcome, AggregationEngine, EngineConfig, ModelParams};
use evault_store::{MemoryStore, RecordStore};
use evault_types::{
    Clock, Device, DeviceId, ModelVersion, ObjectId, Payload, RawObject, SystemClock, Tier,
};
use tracing::info;

/// Dashboard-style counters over the whole testbed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TestbedStats {
    pub devices: usize,
    pub raw_objects: usize,
    pub processed_objects: usize,
    pub cached_hot: usize,
    pub cached_warm: usize,
    pub cached_cold: usize,
    pub data_fragments: usize,
    pub parity_fragments: usize,
    /// (data + parity) / data; zero when nothing is encoded yet.
    pub redundancy: f64,
    pub latest_model_version: Option<ModelVersion>,
    pub pending_updates: usize,
}

/// The assembled edge/cloud testbed.
pub struct Testbed {
    store: Arc<dyn RecordStore>,
    cache: TieredCache,
    fragments: FragmentStore,
    engine: AggregationEngine,
    clock: Arc<dyn Clock>,
}

impl Testbed {
    /// Fully in-memory testbed with default tunables everywhere.
    pub fn in_memory() -> Result<Self> {
        Self::assemble(
            Arc::new(MemoryStore::new()),
            Arc::new(SystemClock),
            CacheConfig::default(),
            CodecConfig::default(),
            EngineConfig::default(),
            Box::new(evault_cache::AlwaysHot),
        )
    }

    /// Assemble a testbed from explicit parts; the store and clock are
    /// shared by every subsystem.
    pub fn assemble(
        store: Arc<dyn RecordStore>,
        clock: Arc<dyn Clock>,
        cache_config: CacheConfig,
        codec_config: CodecConfig,
        engine_config: EngineConfig,
        placement: Box<dyn PlacementPolicy>,
    ) -> Result<Self> {
        let cache = TieredCache::new(
            Arc::clone(&store),
            Arc::new(MemoryTierStorage::new()),
            placement,
            Arc::clone(&clock),
            cache_config,
        )?;
        let fragments = FragmentStore::new(Arc::clone(&store), ErasureCodec::new(codec_config)?)?;
        let engine = AggregationEngine::with_config(
            Arc::clone(&store),
            Arc::clone(&clock),
            engine_config,
        )?;
        Ok(Self {
            store,
            cache,
            fragments,
            engine,
            clock,
        })
    }

    #[inline]
    #[must_use]
    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    #[inline]
    #[must_use]
    pub const fn cache(&self) -> &TieredCache {
        &self.cache
    }

    #[inline]
    #[must_use]
    pub const fn fragments(&self) -> &FragmentStore {
        &self.fragments
    }

    #[inline]
    #[must_use]
    pub const fn engine(&self) -> &AggregationEngine {
        &self.engine
    }

    /// Register the three canonical simulated devices (ids 1..=3).
    pub fn seed_devices(&self) -> Result<Vec<Device>> {
        let now = self.clock.now();
        let seeds = [
            (1, "Temperature Sensor 1", "temperature", "Room 101"),
            (2, "Humidity Sensor 1", "humidity", "Room 102"),
            (3, "Multi Sensor 1", "multi", "Hallway"),
        ];
        let mut devices = Vec::with_capacity(seeds.len());
        for (raw_id, name, kind, location) in seeds {
            let device = Device {
                id: DeviceId::new(raw_id)
                    .unwrap_or_else(|| unreachable!("seed ids are non-zero")),
                name: name.to_owned(),
                kind: kind.to_owned(),
                location: location.to_owned(),
                last_active: now,
            };
            self.store.upsert_device(device.clone())?;
            devices.push(device);
        }
        Ok(devices)
    }

    /// Ingest one record for `device` and run it through all three
    /// subsystems, then mark it processed.
    pub fn ingest(&self, device: DeviceId, payload: Payload) -> Result<RawObject> {
        if self.store.device(device)?.is_none() {
            return Err(VaultError::not_found("device", device));
        }
        let now = self.clock.now();
        let object = self.store.create_raw_object(device, payload.clone(), now)?;
        self.store.touch_device(device, now)?;

        let bytes = payload.to_bytes();

        // Three independent operations over the same record.
        self.cache.put(object.id, payload)?;
        self.fragments.store_object(object.id, &bytes)?;
        let (features, label) = derive_training_row(&bytes);
        self.engine
            .train_local_model(device, &[features], &[label])?;

        self.store.mark_processed(object.id)?;
        info!(object = %object.id, %device, "record ingested and processed");
        self.store
            .raw_object(object.id)?
            .ok_or_else(|| VaultError::not_found("raw object", object.id))
    }

    /// Cache a value under an object id.
    pub fn cache_put(&self, object: ObjectId, value: Payload) -> Result<Tier> {
        self.cache.put(object, value)
    }

    /// Fetch a cached value; `None` is a normal miss.
    pub fn cache_get(&self, object: ObjectId) -> Result<Option<Payload>> {
        self.cache.get(object)
    }

    /// Erasure-encode raw bytes without persisting anything.
    #[must_use]
    pub fn encode(&self, payload: &[u8]) -> Vec<evault_ec::EncodedFragment> {
        self.fragments.codec().encode(payload)
    }

    /// Reconstruct raw bytes from a fragment collection.
    pub fn decode(&self, fragments: &[evault_ec::EncodedFragment]) -> Result<Vec<u8>> {
        self.fragments.codec().decode(fragments)
    }

    /// Reconstruct an object's payload bytes from its stored fragments.
    pub fn recover(&self, object: ObjectId) -> Result<Vec<u8>> {
        self.fragments.recover(object)
    }

    /// Train one local update for `device` on an explicit sample.
    pub fn train_local_model(
        &self,
        device: DeviceId,
        features: &[Vec<f64>],
        labels: &[f64],
    ) -> Result<evault_types::LocalUpdate> {
        self.engine.train_local_model(device, features, labels)
    }

    /// Fold pending local updates into the next global model version.
    pub fn aggregate_updates(&self) -> Result<AggregateOutcome> {
        self.engine.aggregate_updates()
    }

    /// Run one cache-demotion maintenance pass.
    pub fn run_maintenance(&self) -> Result<evault_cache::MaintenanceReport> {
        self.cache.run_maintenance()
    }

    /// Current dashboard counters.
    pub fn stats(&self) -> Result<TestbedStats> {
        let devices = self.store.devices()?.len();
        let objects = self.store.raw_objects()?;
        let processed_objects = objects.iter().filter(|object| object.processed).count();

        let mut cached_hot = 0;
        let mut cached_warm = 0;
        let mut cached_cold = 0;
        for entry in self.store.cache_entries()? {
            match entry.tier {
                Tier::Hot => cached_hot += 1,
                Tier::Warm => cached_warm += 1,
                Tier::Cold => cached_cold += 1,
            }
        }

        let mut data_fragments = 0;
        let mut parity_fragments = 0;
        for object in &objects {
            for fragment in self.store.fragments_for(object.id)? {
                if fragment.parity {
                    parity_fragments += 1;
                } else {
                    data_fragments += 1;
                }
            }
        }
        let redundancy = if data_fragments == 0 {
            0.0
        } else {
            (data_fragments + parity_fragments) as f64 / data_fragments as f64
        };

        let latest = self.store.latest_global_model()?;
        let pending_updates = match &latest {
            Some(model) => self.store.local_updates_for(model.version)?.len(),
            None => 0,
        };

        Ok(TestbedStats {
            devices,
            raw_objects: objects.len(),
            processed_objects,
            cached_hot,
            cached_warm,
            cached_cold,
            data_fragments,
            parity_fragments,
            redundancy,
            latest_model_version: latest.map(|model| model.version),
            pending_updates,
        })
    }

    /// Decode the latest global model's parameter blob.
    pub fn latest_model_params(&self) -> Result<Option<(ModelVersion, ModelParams)>> {
        match self.store.latest_global_model()? {
            Some(model) => Ok(Some((
                model.version,
                ModelParams::from_blob(&model.params)?,
            ))),
            None => Ok(None),
        }
    }
}

/// Derive a deterministic five-feature training row from payload bytes.
///
/// Feature j is the mean of bytes at positions ≡ j (mod 5), scaled to
/// [0, 1]; the label is the parity of the byte sum. This replaces the
/// original's random per-record sample with something replayable.
#[must_use]
pub fn derive_training_row(bytes: &[u8]) -> (Vec<f64>, f64) {
    let mut sums = [0.0_f64; 5];
    let mut counts = [0_usize; 5];
    let mut total: u64 = 0;
    for (position, &byte) in bytes.iter().enumerate() {
        sums[position % 5] += f64::from(byte);
        counts[position % 5] += 1;
        total += u64::from(byte);
    }
    let features = sums
        .iter()
        .zip(&counts)
        .map(|(&sum, &count)| {
            if count == 0 {
                0.0
            } else {
                sum / (count as f64 * 255.0)
            }
        })
        .collect();
    (features, (total % 2) as f64)
}
