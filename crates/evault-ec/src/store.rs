//! Persistence wrapper around the codec: encode an object's payload, label
//! each fragment with a storage node, and write the set through the record
//! store; later, read whatever fragments survive and reconstruct.

use std::sync::Arc;

use evault_error::{Result, VaultError};
use evault_store::RecordStore;
use evault_types::{Fragment, ObjectId, StorageNode};
use tracing::{debug, info, warn};

use crate::codec::{EncodedFragment, ErasureCodec};

/// Default simulated placement targets, matching the three-node testbed.
pub const DEFAULT_NODES: [&str; 3] = ["edge_node_0", "edge_node_1", "edge_node_2"];

/// Erasure-coded fragment store.
///
/// Placement is round-robin over a small fixed set of named locations and
/// is purely a label: nothing here replicates or enforces locality.
pub struct FragmentStore {
    store: Arc<dyn RecordStore>,
    codec: ErasureCodec,
    nodes: Vec<StorageNode>,
}

impl std::fmt::Debug for FragmentStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FragmentStore")
            .field("codec", &self.codec)
            .field("nodes", &self.nodes)
            .finish_non_exhaustive()
    }
}

impl FragmentStore {
    /// Create a fragment store over `store` with the default node labels.
    pub fn new(store: Arc<dyn RecordStore>, codec: ErasureCodec) -> Result<Self> {
        Self::with_nodes(
            store,
            codec,
            DEFAULT_NODES.iter().copied().map(StorageNode::new).collect(),
        )
    }

    /// Create a fragment store with explicit node labels.
    pub fn with_nodes(
        store: Arc<dyn RecordStore>,
        codec: ErasureCodec,
        nodes: Vec<StorageNode>,
    ) -> Result<Self> {
        if nodes.is_empty() {
            return Err(VaultError::invalid_config("storage nodes", "empty set"));
        }
        Ok(Self {
            store,
            codec,
            nodes,
        })
    }

    #[inline]
    #[must_use]
    pub const fn codec(&self) -> &ErasureCodec {
        &self.codec
    }

    /// Encode `payload` and persist all k+m fragments for `object`.
    ///
    /// Returns the number of fragments written. Re-encoding the same object
    /// replaces its fragment set.
    pub fn store_object(&self, object: ObjectId, payload: &[u8]) -> Result<usize> {
        let fragments = self.codec.encode(payload);
        let written = fragments.len();
        for (position, encoded) in fragments.into_iter().enumerate() {
            let node = self.nodes[position % self.nodes.len()].clone();
            self.store.insert_fragment(Fragment {
                object,
                index: encoded.index,
                bytes: encoded.bytes,
                parity: encoded.parity,
                node,
            })?;
        }
        debug!(%object, fragments = written, "object encoded and persisted");
        Ok(written)
    }

    /// Reconstruct the payload of `object` from its surviving fragments.
    ///
    /// An object with no fragments at all is `NotFound`; a fragment set
    /// below the reconstruction threshold or with an uninvertible geometry
    /// propagates the codec's structured failure, so a monitoring layer can
    /// tell "fully recovered" from "failed to recover".
    pub fn recover(&self, object: ObjectId) -> Result<Vec<u8>> {
        let stored = self.store.fragments_for(object)?;
        if stored.is_empty() {
            return Err(VaultError::not_found("fragments for object", object));
        }

        let encoded: Vec<EncodedFragment> = stored
            .into_iter()
            .map(|fragment| EncodedFragment {
                index: fragment.index,
                bytes: fragment.bytes,
                parity: fragment.parity,
            })
            .collect();

        match self.codec.decode(&encoded) {
            Ok(payload) => {
                info!(%object, bytes = payload.len(), "object recovered");
                Ok(payload)
            }
            Err(error) => {
                warn!(%object, %error, "object recovery failed");
                Err(error)
            }
        }
    }
}
