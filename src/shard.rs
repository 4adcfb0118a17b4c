//! The shard resolver: a deterministic, non-cryptographic hash of a stream
//! id to an account index, for callers doing horizontal partitioning
//! across multiple backend accounts. Never used internally by this crate
//! -- purely a convenience left to callers.

use std::hash::Hasher;

/// FNV-1a, chosen for the same reason `eventually`'s own internal hashing
/// helpers favor a small, dependency-free, stable-across-versions
/// algorithm over `std`'s randomized `SipHash`: determinism across
/// processes and releases matters more than DoS resistance here, since the
/// input is a stream id the caller already trusts.
struct Fnv1a(u64);

impl Fnv1a {
    const OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;

    fn new() -> Self {
        Self(Self::OFFSET_BASIS)
    }
}

impl Hasher for Fnv1a {
    fn finish(&self) -> u64 {
        self.0
    }

    fn write(&mut self, bytes: &[u8]) {
        for byte in bytes {
            self.0 ^= u64::from(*byte);
            self.0 = self.0.wrapping_mul(Self::PRIME);
        }
    }
}

/// Resolves `stream_id` to a stable, non-negative account index in
/// `[0, account_count)`.
///
/// # Panics
///
/// Panics if `account_count == 0`: there is no valid index to return.
#[must_use]
pub fn resolve(stream_id: &str, account_count: usize) -> usize {
    assert!(account_count > 0, "account_count must be greater than zero");

    let mut hasher = Fnv1a::new();
    hasher.write(stream_id.as_bytes());
    (hasher.finish() % account_count as u64) as usize
}
