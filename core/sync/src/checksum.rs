//! Content digests for chunk payloads.
//!
//! Digests are BLAKE2b-256 over the canonical compact JSON encoding of a
//! payload, rendered as lowercase hex.

use blake2::digest::consts::U32;
use blake2::{Blake2b, Digest};
use serde::Serialize;

use chunksync_common::{Error, Result};

/// Digest and byte length of one payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayloadDigest {
    pub checksum: String,
    pub size: u64,
}

/// Compute the digest of raw bytes.
pub fn compute(bytes: &[u8]) -> String {
    let mut hasher = Blake2b::<U32>::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Canonical byte encoding of a payload.
///
/// Goes through `serde_json::Value` so object keys are emitted in a stable
/// order regardless of the payload's Rust type.
pub fn canonical_bytes<T: Serialize + ?Sized>(payload: &T) -> Result<Vec<u8>> {
    let value = serde_json::to_value(payload)?;
    Ok(serde_json::to_vec(&value)?)
}

/// Digest a payload.
pub fn of_payload<T: Serialize + ?Sized>(payload: &T) -> Result<PayloadDigest> {
    let bytes = canonical_bytes(payload)?;
    Ok(PayloadDigest {
        checksum: compute(&bytes),
        size: bytes.len() as u64,
    })
}

/// Check a payload against its declared checksum.
///
/// # Errors
/// - `Error::Corrupted` when the recomputed digest differs
pub fn verify<T: Serialize + ?Sized>(id: &str, declared: &str, payload: &T) -> Result<()> {
    let actual = of_payload(payload)?.checksum;
    if actual != declared {
        return Err(Error::Corrupted(format!(
            "Checksum mismatch for chunk '{}': declared {}, computed {}",
            id, declared, actual
        )));
    }
    Ok(())
}
