//! Deterministic randomness derived from a transaction identifier.
//!
//! Every node re-executing the same transaction must make the same draws, so
//! the "random" value is the first 32 bits of `SHA-256(transaction_id + seed)`.

use sha2::{Digest, Sha256};

use crate::error::{MatchError, MatchResult};

/// Seed used when drawing a driver inside a load tier.
pub const DRIVER_SEED: &str = "driver";
/// Seed used when drawing a rider among those with the fewest offers.
pub const RIDER_SEED: &str = "rider";

/// The first 8 hex digits of `SHA-256(transaction_id + seed)` as an unsigned integer.
pub fn derive_value(transaction_id: &str, seed: &str) -> u32 {
    let mut hasher = Sha256::new();
    hasher.update(transaction_id.as_bytes());
    hasher.update(seed.as_bytes());
    let digest = hasher.finalize();
    u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]])
}

/// Index in `[0, modulus)`. Fails on an empty range.
pub fn derive_index(transaction_id: &str, seed: &str, modulus: usize) -> MatchResult<usize> {
    if modulus == 0 {
        return Err(MatchError::EmptyCandidateSet);
    }
    Ok(derive_value(transaction_id, seed) as usize % modulus)
}
