//! The federated aggregation engine.
//!
//! State machine over `GlobalModel` versions: transitions only append, never
//! rewrite. "Latest" is always the store's max-version query. Aggregation
//! commits version N+1 through the store's check-and-create append, so two
//! racers observing "latest = N" cannot both publish N+1 — the loser sees
//! `VersionConflict` and re-reads.

use std::sync::Arc;

use evault_error::{Result, VaultError};
use evault_store::RecordStore;
use evault_types::{
    Clock, DeviceId, GlobalModel, LocalUpdate, ModelVersion, SystemClock,
};
use tracing::{debug, info, warn};

use crate::params::{self, ModelParams};

/// Engine tunables.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngineConfig {
    /// How far a local fit pulls away from the global coefficients:
    /// 0.0 keeps the global model, 1.0 discards it.
    pub blend: f64,
    /// Aggregation retries after losing a version race.
    pub max_retries: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            blend: 0.5,
            max_retries: 4,
        }
    }
}

impl EngineConfig {
    fn validate(self) -> Result<Self> {
        if !(0.0..=1.0).contains(&self.blend) {
            return Err(VaultError::invalid_config("blend factor", self.blend));
        }
        Ok(self)
    }
}

/// Result of one aggregation pass.
#[derive(Debug, Clone, PartialEq)]
pub enum AggregateOutcome {
    /// No pending updates for the latest version; nothing changed.
    Unchanged(GlobalModel),
    /// A new version was appended from `folded` local updates.
    Aggregated {
        model: GlobalModel,
        mean_accuracy: f64,
        folded: usize,
    },
}

impl AggregateOutcome {
    /// The model the caller should consider current after this pass.
    #[must_use]
    pub const fn model(&self) -> &GlobalModel {
        match self {
            Self::Unchanged(model) | Self::Aggregated { model, .. } => model,
        }
    }
}

/// Federated model-aggregation engine.
pub struct AggregationEngine {
    store: Arc<dyn RecordStore>,
    clock: Arc<dyn Clock>,
    config: EngineConfig,
}

impl std::fmt::Debug for AggregationEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AggregationEngine")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl AggregationEngine {
    /// Create an engine with default tunables and the system clock.
    pub fn new(store: Arc<dyn RecordStore>) -> Result<Self> {
        Self::with_config(store, Arc::new(SystemClock), EngineConfig::default())
    }

    /// Create an engine with explicit clock and tunables.
    pub fn with_config(
        store: Arc<dyn RecordStore>,
        clock: Arc<dyn Clock>,
        config: EngineConfig,
    ) -> Result<Self> {
        Ok(Self {
            store,
            clock,
            config: config.validate()?,
        })
    }

    /// Ensure a global model exists, synthesizing version 1 on first use.
    ///
    /// The bootstrap model is the deterministic seed fit over a fixed
    /// synthetic sample. A concurrent bootstrap losing the version-1 race
    /// adopts the winner instead of failing.
    pub fn bootstrap(&self) -> Result<GlobalModel> {
        if let Some(existing) = self.store.latest_global_model()? {
            return Ok(existing);
        }

        let (features, labels) = params::seed_sample();
        let seed = params::fit(&features, &labels)?;
        let model = GlobalModel {
            version: ModelVersion::ONE,
            params: seed.to_blob()?,
            accuracy: None,
            created_at: self.clock.now(),
        };
        match self.store.insert_global_model(model.clone()) {
            Ok(()) => {
                info!(version = %model.version, "global model bootstrapped");
                Ok(model)
            }
            Err(VaultError::VersionConflict { .. }) => self
                .store
                .latest_global_model()?
                .ok_or_else(|| VaultError::not_found("global model", "latest")),
            Err(error) => Err(error),
        }
    }

    /// Train a local update for `device` against the current global model.
    ///
    /// Reads the latest model (bootstrapping on demand), computes the
    /// deterministic local fit, blends it with the global coefficients, and
    /// records a `LocalUpdate` tagged with the version it was computed
    /// against. Never mutates `GlobalModel`.
    pub fn train_local_model(
        &self,
        device: DeviceId,
        features: &[Vec<f64>],
        labels: &[f64],
    ) -> Result<LocalUpdate> {
        params::validate_sample(features, labels)?;

        let latest = self.bootstrap()?;
        let global = ModelParams::from_blob(&latest.params)?;
        let local = params::fit(features, labels)?;
        if global.dimension() != local.dimension() {
            return Err(VaultError::DimensionMismatch {
                expected: global.dimension(),
                actual: local.dimension(),
            });
        }

        let blend = self.config.blend;
        let coefficients = global
            .coefficients
            .iter()
            .zip(&local.coefficients)
            .map(|(global_c, local_c)| global_c + blend * (local_c - global_c))
            .collect();
        let intercept = global.intercept + blend * (local.intercept - global.intercept);
        let blended = ModelParams {
            coefficients,
            intercept,
        };
        let accuracy = params::sample_accuracy(&blended, features, labels);

        let now = self.clock.now();
        let update = LocalUpdate {
            device,
            basis_version: latest.version,
            params: blended.to_blob()?,
            accuracy,
            created_at: now,
        };
        self.store.insert_local_update(update.clone())?;
        self.store.touch_device(device, now)?;
        debug!(
            %device,
            basis = %latest.version,
            accuracy,
            samples = features.len(),
            "local update recorded"
        );
        Ok(update)
    }

    /// Fold all pending updates for the latest version into version+1.
    ///
    /// With no pending updates this is an idempotent no-op returning the
    /// unchanged latest model. Updates tagged with versions older than the
    /// current latest are never folded into a later aggregation.
    pub fn aggregate_updates(&self) -> Result<AggregateOutcome> {
        let mut attempt = 0;
        loop {
            let latest = self.bootstrap()?;
            let updates = self.store.local_updates_for(latest.version)?;
            if updates.is_empty() {
                debug!(version = %latest.version, "no pending updates; aggregation is a no-op");
                return Ok(AggregateOutcome::Unchanged(latest));
            }

            let (mean, mean_accuracy) = mean_of_updates(&updates)?;
            let model = GlobalModel {
                version: latest.version.next(),
                params: mean.to_blob()?,
                accuracy: Some(mean_accuracy),
                created_at: self.clock.now(),
            };

            match self.store.insert_global_model(model.clone()) {
                Ok(()) => {
                    info!(
                        version = %model.version,
                        folded = updates.len(),
                        mean_accuracy,
                        "aggregated global model appended"
                    );
                    return Ok(AggregateOutcome::Aggregated {
                        model,
                        mean_accuracy,
                        folded: updates.len(),
                    });
                }
                Err(error @ VaultError::VersionConflict { .. }) => {
                    if attempt >= self.config.max_retries {
                        return Err(error);
                    }
                    attempt += 1;
                    warn!(
                        version = %latest.version,
                        attempt,
                        "aggregation lost the version race; re-reading latest"
                    );
                }
                Err(error) => return Err(error),
            }
        }
    }
}

/// Elementwise mean of every update's parameters, plus mean accuracy.
fn mean_of_updates(updates: &[LocalUpdate]) -> Result<(ModelParams, f64)> {
    let first = ModelParams::from_blob(&updates[0].params)?;
    let dimension = first.dimension();
    let mut coefficients = vec![0.0_f64; dimension];
    let mut intercept = 0.0_f64;
    let mut accuracy = 0.0_f64;

    for update in updates {
        let decoded = ModelParams::from_blob(&update.params)?;
        if decoded.dimension() != dimension {
            return Err(VaultError::DimensionMismatch {
                expected: dimension,
                actual: decoded.dimension(),
            });
        }
        for (sum, value) in coefficients.iter_mut().zip(&decoded.coefficients) {
            *sum += value;
        }
        intercept += decoded.intercept;
        accuracy += update.accuracy;
    }

    let count = updates.len() as f64;
    for sum in &mut coefficients {
        *sum /= count;
    }
    Ok((
        ModelParams {
            coefficients,
            intercept: intercept / count,
        },
        accuracy / count,
    ))
}

#[cfg(test)]
mod tests {
    use evault_store::MemoryStore;
    use evault_types::{ManualClock, Timestamp};

    use super::*;

    fn dev(n: u64) -> DeviceId {
        DeviceId::new(n).expect("non-zero device id")
    }

    fn engine_over(store: &Arc<MemoryStore>) -> AggregationEngine {
        AggregationEngine::with_config(
            Arc::clone(store) as Arc<dyn RecordStore>,
            Arc::new(ManualClock::new(Timestamp::from_millis(1_000))),
            EngineConfig::default(),
        )
        .expect("default config is valid")
    }

    fn push_update(store: &MemoryStore, version: ModelVersion, coefficients: Vec<f64>, intercept: f64, accuracy: f64) {
        let params = ModelParams {
            coefficients,
            intercept,
        };
        store
            .insert_local_update(LocalUpdate {
                device: dev(1),
                basis_version: version,
                params: params.to_blob().expect("serialize succeeds"),
                accuracy,
                created_at: Timestamp::from_millis(0),
            })
            .expect("insert succeeds");
    }

    fn seed_version_one(store: &MemoryStore, dimension: usize) {
        let params = ModelParams {
            coefficients: vec![0.0; dimension],
            intercept: 0.0,
        };
        store
            .insert_global_model(GlobalModel {
                version: ModelVersion::ONE,
                params: params.to_blob().expect("serialize succeeds"),
                accuracy: None,
                created_at: Timestamp::from_millis(0),
            })
            .expect("append succeeds");
    }

    #[test]
    fn invalid_blend_fails_at_construction() {
        let store: Arc<dyn RecordStore> = Arc::new(MemoryStore::new());
        let err = AggregationEngine::with_config(
            store,
            Arc::new(SystemClock),
            EngineConfig {
                blend: 1.5,
                ..EngineConfig::default()
            },
        )
        .expect_err("blend above 1 is invalid");
        assert!(matches!(err, VaultError::InvalidConfiguration { .. }));
    }

    #[test]
    fn bootstrap_creates_version_one_once() {
        let store = Arc::new(MemoryStore::new());
        let engine = engine_over(&store);

        let first = engine.bootstrap().expect("bootstrap succeeds");
        assert_eq!(first.version, ModelVersion::ONE);
        assert!(first.accuracy.is_none());

        let second = engine.bootstrap().expect("bootstrap is stable");
        assert_eq!(second, first);

        // The blob is a valid parameter vector over the seed dimension.
        let params = ModelParams::from_blob(&first.params).expect("blob decodes");
        assert_eq!(params.dimension(), 5);
    }

    #[test]
    fn train_records_an_update_without_touching_the_model() {
        let store = Arc::new(MemoryStore::new());
        let engine = engine_over(&store);
        let features = vec![
            vec![0.1, 0.9, 0.3, 0.5, 0.7],
            vec![0.8, 0.2, 0.6, 0.4, 0.1],
        ];
        let labels = vec![1.0, 0.0];

        let update = engine
            .train_local_model(dev(3), &features, &labels)
            .expect("training succeeds");
        assert_eq!(update.basis_version, ModelVersion::ONE);
        assert!((0.0..=1.0).contains(&update.accuracy));

        // Deterministic: same inputs, same recorded parameters.
        let again = engine
            .train_local_model(dev(3), &features, &labels)
            .expect("training succeeds");
        assert_eq!(again.params, update.params);

        // The global model is untouched by training.
        let latest = store
            .latest_global_model()
            .expect("fetch succeeds")
            .expect("bootstrapped");
        assert_eq!(latest.version, ModelVersion::ONE);
        assert_eq!(
            store
                .local_updates_for(ModelVersion::ONE)
                .expect("fetch succeeds")
                .len(),
            2
        );
    }

    #[test]
    fn train_rejects_dimension_drift() {
        let store = Arc::new(MemoryStore::new());
        let engine = engine_over(&store);
        // Seed model has dimension 5; a 2-feature sample must be rejected.
        let err = engine
            .train_local_model(dev(1), &[vec![1.0, 2.0]], &[1.0])
            .expect_err("dimension drift");
        assert!(matches!(
            err,
            VaultError::DimensionMismatch {
                expected: 5,
                actual: 2
            }
        ));
    }

    #[test]
    fn aggregation_means_two_devices_elementwise() {
        // The contract scenario: [1,2] and [3,4] against version 1 yield
        // version 2 with coefficients [2,3].
        let store = Arc::new(MemoryStore::new());
        seed_version_one(&store, 2);
        push_update(&store, ModelVersion::ONE, vec![1.0, 2.0], 10.0, 0.8);
        push_update(&store, ModelVersion::ONE, vec![3.0, 4.0], 20.0, 0.9);

        let engine = engine_over(&store);
        let outcome = engine.aggregate_updates().expect("aggregation succeeds");
        let AggregateOutcome::Aggregated {
            model,
            mean_accuracy,
            folded,
        } = outcome
        else {
            panic!("expected an aggregated outcome");
        };

        assert_eq!(model.version.get(), 2);
        assert_eq!(folded, 2);
        assert!((mean_accuracy - 0.85).abs() < 1e-12);
        assert_eq!(model.accuracy, Some(mean_accuracy));

        let params = ModelParams::from_blob(&model.params).expect("blob decodes");
        assert_eq!(params.coefficients, vec![2.0, 3.0]);
        assert_eq!(params.intercept, 15.0);
    }

    #[test]
    fn aggregation_with_no_updates_is_idempotent() {
        let store = Arc::new(MemoryStore::new());
        let engine = engine_over(&store);

        let first = engine.aggregate_updates().expect("aggregation succeeds");
        let second = engine.aggregate_updates().expect("aggregation succeeds");
        let (AggregateOutcome::Unchanged(a), AggregateOutcome::Unchanged(b)) = (first, second)
        else {
            panic!("expected unchanged outcomes");
        };
        assert_eq!(a.version, b.version);
        assert_eq!(a.params, b.params);
    }

    #[test]
    fn stale_updates_are_never_folded_again() {
        let store = Arc::new(MemoryStore::new());
        seed_version_one(&store, 2);
        push_update(&store, ModelVersion::ONE, vec![1.0, 2.0], 0.0, 0.5);

        let engine = engine_over(&store);
        let outcome = engine.aggregate_updates().expect("aggregation succeeds");
        assert_eq!(outcome.model().version.get(), 2);

        // The version-1 update still exists but targets an old version, so
        // the next pass has nothing to fold.
        assert_eq!(
            store
                .local_updates_for(ModelVersion::ONE)
                .expect("fetch succeeds")
                .len(),
            1
        );
        let outcome = engine.aggregate_updates().expect("aggregation succeeds");
        assert!(matches!(outcome, AggregateOutcome::Unchanged(model) if model.version.get() == 2));
    }

    #[test]
    fn aggregation_rejects_mismatched_update_dimensions() {
        let store = Arc::new(MemoryStore::new());
        seed_version_one(&store, 2);
        push_update(&store, ModelVersion::ONE, vec![1.0, 2.0], 0.0, 0.5);
        push_update(&store, ModelVersion::ONE, vec![1.0, 2.0, 3.0], 0.0, 0.5);

        let engine = engine_over(&store);
        let err = engine
            .aggregate_updates()
            .expect_err("ragged updates must not average");
        assert!(matches!(
            err,
            VaultError::DimensionMismatch {
                expected: 2,
                actual: 3
            }
        ));
    }

    #[test]
    fn concurrent_aggregation_appends_exactly_one_version() {
        let store = Arc::new(MemoryStore::new());
        seed_version_one(&store, 2);
        push_update(&store, ModelVersion::ONE, vec![1.0, 2.0], 0.0, 0.5);
        push_update(&store, ModelVersion::ONE, vec![3.0, 4.0], 0.0, 0.7);

        std::thread::scope(|scope| {
            for _ in 0..4 {
                let store = Arc::clone(&store);
                scope.spawn(move || {
                    let engine = engine_over(&store);
                    // Every racer must land on version 2: one by appending
                    // it, the rest by observing it after their retry.
                    let outcome = engine.aggregate_updates().expect("aggregation settles");
                    assert_eq!(outcome.model().version.get(), 2);
                });
            }
        });

        let latest = store
            .latest_global_model()
            .expect("fetch succeeds")
            .expect("a model exists");
        assert_eq!(latest.version.get(), 2);
        assert!(store
            .global_model(ModelVersion::new(3).expect("non-zero"))
            .expect("fetch succeeds")
            .is_none());
    }
}
