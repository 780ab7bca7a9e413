//! Vandermonde erasure codec: k data shards + m parity shards, any k of
//! which reconstruct the payload.
//!
//! Row i of the (k+m)×k coefficient matrix is `[i^0, i^1, .., i^(k-1)]`
//! (1-indexed), so fragment indices double as evaluation points and the
//! first k rows are *not* the identity — every fragment, data or parity,
//! goes through the same matrix product.
//!
//! Encode and decode are pure functions of their inputs; the codec holds no
//! mutable state and is freely shared across threads.

use evault_error::{Result, VaultError};
use evault_types::FragmentIndex;
use tracing::debug;

use crate::gf256;

/// Byte arithmetic used by the codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Arithmetic {
    /// True GF(2^8) field arithmetic. Every k-subset of fragments decodes.
    #[default]
    Gf256,
    /// Integer arithmetic modulo 256, kept for compatibility with the
    /// legacy encoder. Z/256 is not a field; a sub-matrix whose
    /// determinant is even has no inverse, and decode reports
    /// `DecodeError` for such subsets instead of recovering.
    LegacyMod256,
}

impl Arithmetic {
    #[inline]
    fn add(self, a: u8, b: u8) -> u8 {
        match self {
            Self::Gf256 => gf256::add(a, b),
            Self::LegacyMod256 => a.wrapping_add(b),
        }
    }

    #[inline]
    fn sub(self, a: u8, b: u8) -> u8 {
        match self {
            Self::Gf256 => gf256::add(a, b),
            Self::LegacyMod256 => a.wrapping_sub(b),
        }
    }

    #[inline]
    fn mul(self, a: u8, b: u8) -> u8 {
        match self {
            Self::Gf256 => gf256::mul(a, b),
            Self::LegacyMod256 => a.wrapping_mul(b),
        }
    }

    /// Multiplicative inverse, when one exists.
    ///
    /// Modulo 256 only odd values are units, which is exactly why the
    /// legacy variant cannot decode every subset.
    fn inv(self, a: u8) -> Option<u8> {
        match self {
            Self::Gf256 => gf256::inv(a),
            Self::LegacyMod256 => {
                if a % 2 == 0 {
                    return None;
                }
                (0..=255_u8).find(|&candidate| a.wrapping_mul(candidate) == 1)
            }
        }
    }

    /// `base^exponent` under this arithmetic.
    fn pow(self, base: u8, exponent: usize) -> u8 {
        let mut acc = 1_u8;
        for _ in 0..exponent {
            acc = self.mul(acc, base);
        }
        acc
    }

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Gf256 => "gf256",
            Self::LegacyMod256 => "mod256",
        }
    }
}

/// Codec parameters, fixed per store instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodecConfig {
    /// Number of data shards (k).
    pub data_shards: usize,
    /// Number of parity shards (m).
    pub parity_shards: usize,
    /// Byte arithmetic for the matrix operations.
    pub arithmetic: Arithmetic,
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            data_shards: 4,
            parity_shards: 2,
            arithmetic: Arithmetic::Gf256,
        }
    }
}

/// One encoded shard, prior to placement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedFragment {
    /// 1-based shard index; doubles as the Vandermonde evaluation point.
    pub index: FragmentIndex,
    pub bytes: Vec<u8>,
    /// True iff `index > k`.
    pub parity: bool,
}

/// Vandermonde erasure codec.
#[derive(Debug, Clone, Copy)]
pub struct ErasureCodec {
    config: CodecConfig,
}

impl ErasureCodec {
    /// Construct a codec, validating the shard geometry.
    ///
    /// Fails with `InvalidConfiguration` when `k < 1` or when `k + m`
    /// exceeds 255 (fragment indices must be distinct non-zero bytes).
    pub fn new(config: CodecConfig) -> Result<Self> {
        if config.data_shards < 1 {
            return Err(VaultError::invalid_config(
                "data shards (k)",
                config.data_shards,
            ));
        }
        if config.data_shards + config.parity_shards > 255 {
            return Err(VaultError::invalid_config(
                "total shards (k + m)",
                config.data_shards + config.parity_shards,
            ));
        }
        Ok(Self { config })
    }

    /// Codec with the default geometry (k=4, m=2, GF(256)).
    #[must_use]
    pub fn default_geometry() -> Self {
        Self {
            config: CodecConfig::default(),
        }
    }

    #[inline]
    #[must_use]
    pub const fn config(&self) -> CodecConfig {
        self.config
    }

    #[inline]
    #[must_use]
    pub const fn data_shards(&self) -> usize {
        self.config.data_shards
    }

    #[inline]
    #[must_use]
    pub const fn total_shards(&self) -> usize {
        self.config.data_shards + self.config.parity_shards
    }

    /// Coefficient row for evaluation point `point`: `[p^0, .., p^(k-1)]`.
    fn vandermonde_row(&self, point: u8) -> Vec<u8> {
        (0..self.config.data_shards)
            .map(|column| self.config.arithmetic.pow(point, column))
            .collect()
    }

    /// Encode `payload` into k+m fragments.
    ///
    /// The payload is right-padded with zeros to a multiple of k and split
    /// into k equal chunks; each output byte position is an independent
    /// matrix-vector product. An empty payload yields k+m empty fragments.
    #[must_use]
    pub fn encode(&self, payload: &[u8]) -> Vec<EncodedFragment> {
        let k = self.config.data_shards;
        let chunk_len = payload.len().div_ceil(k);

        let mut chunks = vec![vec![0_u8; chunk_len]; k];
        for (position, &byte) in payload.iter().enumerate() {
            chunks[position / chunk_len.max(1)][position % chunk_len.max(1)] = byte;
        }

        let mut fragments = Vec::with_capacity(self.total_shards());
        for row in 1..=self.total_shards() {
            let point = u8::try_from(row).unwrap_or_else(|_| unreachable!("k + m <= 255"));
            let coefficients = self.vandermonde_row(point);
            let mut bytes = vec![0_u8; chunk_len];
            for (chunk, &coefficient) in chunks.iter().zip(&coefficients) {
                for (out, &input) in bytes.iter_mut().zip(chunk) {
                    *out = self
                        .config
                        .arithmetic
                        .add(*out, self.config.arithmetic.mul(coefficient, input));
                }
            }
            let index =
                FragmentIndex::new(point).unwrap_or_else(|| unreachable!("rows are 1-based"));
            fragments.push(EncodedFragment {
                index,
                bytes,
                parity: row > k,
            });
        }
        debug!(
            k,
            m = self.config.parity_shards,
            arithmetic = self.config.arithmetic.label(),
            payload_len = payload.len(),
            chunk_len,
            "payload encoded"
        );
        fragments
    }

    /// Reconstruct the payload from any k supplied fragments.
    ///
    /// Fragments are deduplicated by index and the k lowest indices are
    /// used. Fails with `InsufficientFragments` below k, and with
    /// `DecodeError` when lengths disagree, an index is out of range, or
    /// the selected sub-matrix is not invertible under the configured
    /// arithmetic.
    pub fn decode(&self, fragments: &[EncodedFragment]) -> Result<Vec<u8>> {
        let k = self.config.data_shards;

        let mut selected: Vec<&EncodedFragment> = fragments.iter().collect();
        selected.sort_by_key(|fragment| fragment.index);
        selected.dedup_by_key(|fragment| fragment.index);
        if selected.len() < k {
            return Err(VaultError::InsufficientFragments {
                needed: k,
                available: selected.len(),
            });
        }
        selected.truncate(k);

        let chunk_len = selected[0].bytes.len();
        for fragment in &selected {
            if fragment.bytes.len() != chunk_len {
                return Err(VaultError::decode(format!(
                    "fragment {} length {} disagrees with {}",
                    fragment.index,
                    fragment.bytes.len(),
                    chunk_len
                )));
            }
            if usize::from(fragment.index.get()) > self.total_shards() {
                return Err(VaultError::decode(format!(
                    "fragment index {} exceeds k + m = {}",
                    fragment.index,
                    self.total_shards()
                )));
            }
        }

        let matrix: Vec<Vec<u8>> = selected
            .iter()
            .map(|fragment| self.vandermonde_row(fragment.index.get()))
            .collect();
        let inverse = invert(&matrix, self.config.arithmetic)?;

        let mut payload = Vec::with_capacity(k * chunk_len);
        for chunk_row in 0..k {
            for position in 0..chunk_len {
                let mut byte = 0_u8;
                for (column, fragment) in selected.iter().enumerate() {
                    byte = self.config.arithmetic.add(
                        byte,
                        self.config
                            .arithmetic
                            .mul(inverse[chunk_row][column], fragment.bytes[position]),
                    );
                }
                payload.push(byte);
            }
        }

        while payload.last() == Some(&0) {
            payload.pop();
        }
        Ok(payload)
    }
}

/// Invert a square matrix by Gauss-Jordan elimination under `arithmetic`.
///
/// Pivots must be units; when no remaining row offers one the matrix has no
/// inverse and the caller gets `DecodeError`.
fn invert(matrix: &[Vec<u8>], arithmetic: Arithmetic) -> Result<Vec<Vec<u8>>> {
    let n = matrix.len();
    let mut work = matrix.to_vec();
    let mut inverse: Vec<Vec<u8>> = (0..n)
        .map(|row| {
            let mut identity = vec![0_u8; n];
            identity[row] = 1;
            identity
        })
        .collect();

    for column in 0..n {
        let pivot_row = (column..n)
            .find(|&row| arithmetic.inv(work[row][column]).is_some())
            .ok_or_else(|| {
                VaultError::decode(format!(
                    "sub-matrix has no invertible pivot in column {column} ({} arithmetic)",
                    arithmetic.label()
                ))
            })?;
        work.swap(column, pivot_row);
        inverse.swap(column, pivot_row);

        let pivot_inverse = arithmetic
            .inv(work[column][column])
            .unwrap_or_else(|| unreachable!("pivot row was chosen for invertibility"));
        for position in 0..n {
            work[column][position] = arithmetic.mul(work[column][position], pivot_inverse);
            inverse[column][position] = arithmetic.mul(inverse[column][position], pivot_inverse);
        }

        for row in 0..n {
            if row == column || work[row][column] == 0 {
                continue;
            }
            let factor = work[row][column];
            for position in 0..n {
                let scaled = arithmetic.mul(factor, work[column][position]);
                work[row][position] = arithmetic.sub(work[row][position], scaled);
                let scaled = arithmetic.mul(factor, inverse[column][position]);
                inverse[row][position] = arithmetic.sub(inverse[row][position], scaled);
            }
        }
    }

    Ok(inverse)
}
