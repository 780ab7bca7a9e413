//! Opaque record payloads.
//!
//! A payload is either a structured sensor document or a raw byte blob. The
//! rest of the system treats it as opaque; the only structural requirement is
//! a canonical byte form for erasure coding.

use std::fmt;

/// The value carried by one ingested record.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum Payload {
    /// Structured sensor reading (arbitrary JSON document).
    Document(serde_json::Value),
    /// Raw byte blob.
    Blob(Vec<u8>),
}

impl Payload {
    /// Canonical byte form fed to the erasure codec.
    ///
    /// Documents serialize to compact JSON; blobs pass through unchanged.
    /// Serialization of an in-memory `Value` cannot fail, so this is total.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            Self::Document(value) => {
                serde_json::to_vec(value).unwrap_or_else(|_| value.to_string().into_bytes())
            }
            Self::Blob(bytes) => bytes.clone(),
        }
    }

    /// Byte length of the canonical form.
    #[must_use]
    pub fn byte_len(&self) -> usize {
        match self {
            Self::Document(_) => self.to_bytes().len(),
            Self::Blob(bytes) => bytes.len(),
        }
    }
}

impl From<serde_json::Value> for Payload {
    fn from(value: serde_json::Value) -> Self {
        Self::Document(value)
    }
}

impl From<Vec<u8>> for Payload {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Blob(bytes)
    }
}

impl From<&[u8]> for Payload {
    fn from(bytes: &[u8]) -> Self {
        Self::Blob(bytes.to_vec())
    }
}

impl fmt::Display for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Document(value) => write!(f, "document({value})"),
            Self::Blob(bytes) => write!(f, "blob({} bytes)", bytes.len()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn document_round_trips_through_bytes() {
        let payload = Payload::Document(json!({"type": "temperature", "value": 21.5}));
        let bytes = payload.to_bytes();
        let reparsed: serde_json::Value =
            serde_json::from_slice(&bytes).expect("canonical form is valid JSON");
        assert_eq!(reparsed, json!({"type": "temperature", "value": 21.5}));
    }

    #[test]
    fn blob_bytes_pass_through() {
        let payload = Payload::from(&b"hello world"[..]);
        assert_eq!(payload.to_bytes(), b"hello world");
        assert_eq!(payload.byte_len(), 11);
    }
}
