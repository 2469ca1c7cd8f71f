//! Signer recovery from header seals.
//!
//! Two independent memoization caches keyed by header hash: one for the
//! creator seal (trailing 65 bytes of extra-data), one for the validator
//! (M2) signature. Recovery is the single most expensive step of header
//! verification, and sync revisits headers.

use crate::error::{PosvError, PosvResult};
use lru::LruCache;
use parking_lot::RwLock;
use posv_primitives::{extra, Address, Header, B256};
use secp256k1::ecdsa::{RecoverableSignature, RecoveryId};
use secp256k1::{All, Message, Secp256k1};
use sha3::{Digest, Keccak256};
use std::num::NonZeroUsize;

/// Capacity of each recovered-signer cache.
const SIGNER_CACHE_SIZE: usize = 4096;

/// Recovered-signer caches plus the shared secp256k1 context.
pub struct SignatureCache {
    secp: Secp256k1<All>,
    creators: RwLock<LruCache<B256, Address>>,
    validators: RwLock<LruCache<B256, Address>>,
}

impl Default for SignatureCache {
    fn default() -> Self {
        Self::new()
    }
}

impl SignatureCache {
    /// Create empty caches.
    pub fn new() -> Self {
        let cap = NonZeroUsize::new(SIGNER_CACHE_SIZE).expect("non-zero cache size");
        Self {
            secp: Secp256k1::new(),
            creators: RwLock::new(LruCache::new(cap)),
            validators: RwLock::new(LruCache::new(cap)),
        }
    }

    /// Recover the block creator from the seal in the header's extra-data.
    pub fn recover_creator(&self, header: &Header) -> PosvResult<Address> {
        let hash = header.hash();
        if let Some(&addr) = self.creators.write().get(&hash) {
            return Ok(addr);
        }

        let sig = extra::seal_bytes(&header.extra)?;
        let creator = self.recover(header.seal_hash()?, sig)?;

        self.creators.write().put(hash, creator);
        Ok(creator)
    }

    /// Recover the M2 validator from the header's `validator` signature.
    pub fn recover_validator(&self, header: &Header) -> PosvResult<Address> {
        let hash = header.hash();
        if let Some(&addr) = self.validators.write().get(&hash) {
            return Ok(addr);
        }
        if header.validator.len() != extra::EXTRA_SEAL {
            return Err(PosvError::MissingValidatorSignature(header.number));
        }

        // The validator co-signs the sealed header hash.
        let validator = self.recover(hash, &header.validator)?;

        self.validators.write().put(hash, validator);
        Ok(validator)
    }

    fn recover(&self, digest: B256, sig: &[u8]) -> PosvResult<Address> {
        let rec_id = RecoveryId::from_i32(sig[64] as i32)?;
        let signature = RecoverableSignature::from_compact(&sig[..64], rec_id)?;
        let message = Message::from_digest(digest.0);
        let public = self.secp.recover_ecdsa(&message, &signature)?;

        // Ethereum-style address: last 20 bytes of the Keccak-256 of the
        // uncompressed public key without its 0x04 tag.
        let digest = Keccak256::digest(&public.serialize_uncompressed()[1..]);
        Ok(Address::from_slice(&digest[12..]))
    }
}

/// Produce a 65-byte recoverable signature over a digest. Used by the sealer
/// and by test fixtures; verification goes through [`SignatureCache`].
pub fn sign_digest(secret: &secp256k1::SecretKey, digest: B256) -> [u8; 65] {
    let secp = Secp256k1::new();
    let message = Message::from_digest(digest.0);
    let (rec_id, data) = secp
        .sign_ecdsa_recoverable(&message, secret)
        .serialize_compact();

    let mut sig = [0u8; 65];
    sig[..64].copy_from_slice(&data);
    sig[64] = rec_id.to_i32() as u8;
    sig
}

/// The address controlled by a secret key.
pub fn address_of(secret: &secp256k1::SecretKey) -> Address {
    let secp = Secp256k1::new();
    let public = secret.public_key(&secp);
    let digest = Keccak256::digest(&public.serialize_uncompressed()[1..]);
    Address::from_slice(&digest[12..])
}
