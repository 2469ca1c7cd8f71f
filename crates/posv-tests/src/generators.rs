//! Test data generators.
//!
//! Deterministic keys, addresses and header fixtures, plus helpers to tamper
//! with sealed headers and re-seal them so a single field change can be
//! tested in isolation.

use posv_consensus::{address_of, sign_digest};
use posv_primitives::extra::EXTRA_SEAL;
use posv_primitives::{Address, Header};
use secp256k1::SecretKey;

/// Deterministic secret key from a non-zero seed byte.
pub fn test_key(seed: u8) -> SecretKey {
    assert_ne!(seed, 0, "seed byte must be non-zero");
    SecretKey::from_slice(&[seed; 32]).expect("valid secret key")
}

/// Address controlled by [`test_key`] for the same seed.
pub fn test_address(seed: u8) -> Address {
    address_of(&test_key(seed))
}

/// Deterministic keys for an `n`-node network, unsorted.
pub fn test_keys(n: usize) -> Vec<SecretKey> {
    (1..=n as u8).map(test_key).collect()
}

/// Replace the creator seal of a header, signing with `secret`. Used after
/// tampering with a field so the header fails on that field, not on a stale
/// signature.
pub fn reseal(mut header: Header, secret: &SecretKey) -> Header {
    let digest = header.seal_hash().expect("sealable header");
    let sig = sign_digest(secret, digest);
    let mut raw = header.extra.to_vec();
    let tail = raw.len() - EXTRA_SEAL;
    raw[tail..].copy_from_slice(&sig);
    header.extra = raw.into();
    header
}

/// Attach an M2 signature from `secret` to a sealed header.
pub fn co_sign(mut header: Header, secret: &SecretKey) -> Header {
    header.validator = sign_digest(secret, header.hash()).to_vec().into();
    header
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keys_are_deterministic_and_distinct() {
        assert_eq!(test_address(1), test_address(1));
        assert_ne!(test_address(1), test_address(2));
        assert_eq!(test_keys(4).len(), 4);
    }
}
