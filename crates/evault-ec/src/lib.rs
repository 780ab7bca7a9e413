//! Erasure-coded fragment store for EdgeVault.
//!
//! An object's payload is split into `k` data shards and expanded with `m`
//! parity shards through a Vandermonde coefficient matrix; any `k` surviving
//! shards reconstruct the payload. Arithmetic defaults to true GF(2^8)
//! (guaranteed recovery from every k-subset); the legacy modulo-256 integer
//! variant remains available and fails closed on uninvertible subsets.

pub mod codec;
pub mod gf256;
mod store;

pub use codec::{Arithmetic, CodecConfig, EncodedFragment, ErasureCodec};
pub use store::{DEFAULT_NODES, FragmentStore};
