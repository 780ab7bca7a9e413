//! Primary error type for EdgeVault operations.
//!
//! Expected, common outcomes — a cache miss, an aggregation pass with no
//! pending updates — are *not* errors and never appear here; they are
//! explicit result values at their call sites. `VaultError` covers the
//! structured failures a caller or monitoring layer must be able to tell
//! apart: unrecoverable decode failures, configuration mistakes, and
//! transient version races.

use evault_types::ModelVersion;
use thiserror::Error;

/// Primary error type for EdgeVault operations.
#[derive(Error, Debug)]
pub enum VaultError {
    /// A referenced entity does not exist.
    ///
    /// Only used where the entity is *required* to exist (e.g. recovering
    /// fragments for an object that was never encoded). Normal lookup
    /// misses are `Option::None`, not this.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// Decode was given fewer fragments than the reconstruction threshold.
    #[error("insufficient fragments: need {needed}, have {available}")]
    InsufficientFragments { needed: usize, available: usize },

    /// The supplied fragment set cannot be decoded.
    #[error("fragment set cannot be decoded: {detail}")]
    DecodeError { detail: String },

    /// Invalid construction-time configuration. Fatal; never retried.
    #[error("invalid configuration: {what} = {value}")]
    InvalidConfiguration { what: &'static str, value: String },

    /// Another writer appended this model version first.
    ///
    /// Transient: re-read the latest version and retry.
    #[error("model version {attempted} already exists")]
    VersionConflict { attempted: ModelVersion },

    /// Parameter vectors disagree on dimension.
    #[error("parameter dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Parameter-blob (de)serialization failure.
    #[error("parameter serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl VaultError {
    /// Create a not-found error.
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Create a decode error.
    pub fn decode(detail: impl Into<String>) -> Self {
        Self::DecodeError {
            detail: detail.into(),
        }
    }

    /// Create an invalid-configuration error.
    pub fn invalid_config(what: &'static str, value: impl ToString) -> Self {
        Self::InvalidConfiguration {
            what,
            value: value.to_string(),
        }
    }

    /// Whether this error may succeed on retry.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::VersionConflict { .. })
    }
}

/// Result type alias using `VaultError`.
pub type Result<T> = std::result::Result<T, VaultError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_not_found() {
        let err = VaultError::not_found("raw object", 42);
        assert_eq!(err.to_string(), "raw object not found: 42");
    }

    #[test]
    fn display_insufficient_fragments() {
        let err = VaultError::InsufficientFragments {
            needed: 4,
            available: 2,
        };
        assert_eq!(err.to_string(), "insufficient fragments: need 4, have 2");
    }

    #[test]
    fn display_decode_error() {
        let err = VaultError::decode("sub-matrix is singular");
        assert_eq!(
            err.to_string(),
            "fragment set cannot be decoded: sub-matrix is singular"
        );
    }

    #[test]
    fn display_invalid_configuration() {
        let err = VaultError::invalid_config("data shards (k)", 0);
        assert_eq!(err.to_string(), "invalid configuration: data shards (k) = 0");
    }

    #[test]
    fn display_version_conflict() {
        let err = VaultError::VersionConflict {
            attempted: ModelVersion::new(3).expect("non-zero version"),
        };
        assert_eq!(err.to_string(), "model version v3 already exists");
    }

    #[test]
    fn only_version_conflict_is_transient() {
        assert!(
            VaultError::VersionConflict {
                attempted: ModelVersion::ONE
            }
            .is_transient()
        );
        assert!(!VaultError::decode("x").is_transient());
        assert!(!VaultError::not_found("device", 1).is_transient());
        assert!(
            !VaultError::InsufficientFragments {
                needed: 4,
                available: 0
            }
            .is_transient()
        );
        assert!(!VaultError::invalid_config("k", 0).is_transient());
    }
}
