//! Public API facade for EdgeVault.
//!
//! Re-exports the pieces an embedding application needs, plus [`Testbed`],
//! the assembled simulation of the full ingest → cache / encode / train
//! fan-out.

mod testbed;

pub use evault_cache::{
    AlwaysHot, CacheConfig, Clock, MaintenanceReport, ManualClock, MemoryTierStorage,
    PlacementPolicy, SystemClock, TierStorage, TieredCache, WeightedPlacement,
};
pub use evault_ec::{
    Arithmetic, CodecConfig, EncodedFragment, ErasureCodec, FragmentStore, DEFAULT_NODES,
};
pub use evault_error::{Result, VaultError};
pub use evault_fl::{AggregateOutcome, AggregationEngine, EngineConfig, ModelParams};
pub use evault_store::{MemoryStore, RecordStore};
pub use evault_types::{
    CacheEntry, Device, DeviceId, Fragment, FragmentIndex, GlobalModel, LocalUpdate, ModelVersion,
    ObjectId, Payload, RawObject, StorageNode, Tier, Timestamp,
};
pub use testbed::{derive_training_row, Testbed, TestbedStats};
