//! Model parameters and the deterministic stand-in "fit".
//!
//! Local training here is a placeholder that produces parameter vectors,
//! not a learning algorithm: coefficients are label/feature correlations
//! and the intercept is the mean centered label. What matters for the
//! testbed is that the fit is a pure function of its inputs and that the
//! serialized blob round-trips exactly across versions.

use evault_error::{Result, VaultError};

/// Parameter vector plus intercept for one model.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ModelParams {
    pub coefficients: Vec<f64>,
    pub intercept: f64,
}

impl ModelParams {
    /// Number of features this parameter vector covers.
    #[inline]
    #[must_use]
    pub fn dimension(&self) -> usize {
        self.coefficients.len()
    }

    /// Serialize to the opaque blob stored on `GlobalModel`/`LocalUpdate`.
    ///
    /// JSON keeps every `f64` bit-exact through the shortest round-tripping
    /// representation, so `from_blob(to_blob(p)) == p` holds across
    /// versions.
    pub fn to_blob(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Deserialize from the opaque blob.
    pub fn from_blob(blob: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(blob)?)
    }

    /// Raw decision value for one feature row.
    #[must_use]
    pub fn decision(&self, features: &[f64]) -> f64 {
        self.intercept
            + self
                .coefficients
                .iter()
                .zip(features)
                .map(|(coefficient, feature)| coefficient * feature)
                .sum::<f64>()
    }
}

/// Validate a training sample's shape.
///
/// Requires at least one row, equal-length rows, and one label per row.
pub fn validate_sample(features: &[Vec<f64>], labels: &[f64]) -> Result<usize> {
    let Some(first) = features.first() else {
        return Err(VaultError::invalid_config("training sample", "empty"));
    };
    let dimension = first.len();
    if dimension == 0 {
        return Err(VaultError::invalid_config("feature dimension", 0));
    }
    for row in features {
        if row.len() != dimension {
            return Err(VaultError::DimensionMismatch {
                expected: dimension,
                actual: row.len(),
            });
        }
    }
    if labels.len() != features.len() {
        return Err(VaultError::DimensionMismatch {
            expected: features.len(),
            actual: labels.len(),
        });
    }
    Ok(dimension)
}

/// Deterministic stand-in fit over a binary-labeled sample.
///
/// Labels are centered to ±1; coefficient j is the mean of
/// `centered_label * feature_j`, the intercept is the mean centered label.
pub fn fit(features: &[Vec<f64>], labels: &[f64]) -> Result<ModelParams> {
    let dimension = validate_sample(features, labels)?;
    let samples = features.len() as f64;

    let mut coefficients = vec![0.0_f64; dimension];
    let mut intercept = 0.0_f64;
    for (row, &label) in features.iter().zip(labels) {
        let centered = 2.0 * label - 1.0;
        intercept += centered;
        for (coefficient, &feature) in coefficients.iter_mut().zip(row) {
            *coefficient += centered * feature;
        }
    }
    for coefficient in &mut coefficients {
        *coefficient /= samples;
    }
    intercept /= samples;

    Ok(ModelParams {
        coefficients,
        intercept,
    })
}

/// Fraction of the sample whose decision sign agrees with its label.
#[must_use]
pub fn sample_accuracy(params: &ModelParams, features: &[Vec<f64>], labels: &[f64]) -> f64 {
    if features.is_empty() {
        return 0.0;
    }
    let correct = features
        .iter()
        .zip(labels)
        .filter(|(row, &label)| {
            let predicted = if params.decision(row) > 0.0 { 1.0 } else { 0.0 };
            (predicted - label).abs() < f64::EPSILON
        })
        .count();
    correct as f64 / features.len() as f64
}

/// Fixed synthetic sample used to establish the bootstrap model.
///
/// Eight rows, five features, alternating labels; constants chosen so the
/// seed fit has non-trivial coefficients of both signs.
#[must_use]
pub fn seed_sample() -> (Vec<Vec<f64>>, Vec<f64>) {
    let features = vec![
        vec![0.62, 0.11, 0.45, 0.80, 0.27],
        vec![0.13, 0.58, 0.91, 0.24, 0.66],
        vec![0.74, 0.35, 0.08, 0.52, 0.19],
        vec![0.29, 0.81, 0.47, 0.10, 0.93],
        vec![0.55, 0.22, 0.68, 0.71, 0.04],
        vec![0.08, 0.64, 0.33, 0.46, 0.85],
        vec![0.91, 0.17, 0.59, 0.38, 0.12],
        vec![0.36, 0.72, 0.15, 0.63, 0.49],
    ];
    let labels = vec![1.0, 0.0, 1.0, 0.0, 1.0, 0.0, 1.0, 0.0];
    (features, labels)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blob_round_trips_exactly() {
        let params = ModelParams {
            coefficients: vec![0.1, -2.5, 1.0 / 3.0, 1e-300, f64::MAX],
            intercept: -0.125,
        };
        let blob = params.to_blob().expect("serialize succeeds");
        let restored = ModelParams::from_blob(&blob).expect("deserialize succeeds");
        assert_eq!(restored, params);

        // And re-encoding the restored value is byte-identical.
        assert_eq!(restored.to_blob().expect("serialize succeeds"), blob);
    }

    #[test]
    fn corrupt_blob_is_a_serialization_error() {
        let err = ModelParams::from_blob(b"not json").expect_err("garbage must not parse");
        assert!(matches!(err, VaultError::Serialization(_)));
    }

    #[test]
    fn fit_is_deterministic() {
        let (features, labels) = seed_sample();
        let first = fit(&features, &labels).expect("fit succeeds");
        let second = fit(&features, &labels).expect("fit succeeds");
        assert_eq!(first, second);
        assert_eq!(first.dimension(), 5);
    }

    #[test]
    fn fit_matches_hand_computation() {
        // Two rows, one feature: centered labels +1 and -1.
        let features = vec![vec![2.0], vec![4.0]];
        let labels = vec![1.0, 0.0];
        let params = fit(&features, &labels).expect("fit succeeds");
        // coefficient = (2.0 - 4.0) / 2 = -1.0; intercept = 0.0
        assert_eq!(params.coefficients, vec![-1.0]);
        assert_eq!(params.intercept, 0.0);
    }

    #[test]
    fn validate_rejects_bad_shapes() {
        let err = validate_sample(&[], &[]).expect_err("empty sample");
        assert!(matches!(err, VaultError::InvalidConfiguration { .. }));

        let ragged = vec![vec![1.0, 2.0], vec![3.0]];
        let err = validate_sample(&ragged, &[1.0, 0.0]).expect_err("ragged rows");
        assert!(matches!(
            err,
            VaultError::DimensionMismatch {
                expected: 2,
                actual: 1
            }
        ));

        let square = vec![vec![1.0], vec![2.0]];
        let err = validate_sample(&square, &[1.0]).expect_err("label count mismatch");
        assert!(matches!(err, VaultError::DimensionMismatch { .. }));
    }

    #[test]
    fn accuracy_is_a_fraction_of_the_sample() {
        let params = ModelParams {
            coefficients: vec![1.0],
            intercept: 0.0,
        };
        // decision(1.0) = 1.0 > 0 -> label 1 (correct);
        // decision(-1.0) = -1.0 -> label 0 (correct);
        // decision(2.0) = 2.0 -> label 1 (wrong, labelled 0).
        let features = vec![vec![1.0], vec![-1.0], vec![2.0]];
        let labels = vec![1.0, 0.0, 0.0];
        let accuracy = sample_accuracy(&params, &features, &labels);
        assert!((accuracy - 2.0 / 3.0).abs() < 1e-12);
    }
}
