//! Consensus block header.
//!
//! Only the fields the PoSV engine reads or writes are modeled here; body
//! contents (transactions, receipts, state) live with the execution layer and
//! are referenced by hash.

use crate::extra::EXTRA_SEAL;
use alloy_primitives::{Address, Bytes, B256, B64};
use alloy_rlp::Encodable;
use serde::{Deserialize, Serialize};
use sha3::{Digest, Keccak256};
use thiserror::Error;

/// Nonce marker for an "authorize" signer vote.
pub const NONCE_AUTH: B64 = B64::new([0xff; 8]);

/// Nonce marker for a "drop" signer vote. Mandatory on checkpoint blocks.
pub const NONCE_DROP: B64 = B64::new([0x00; 8]);

/// Keccak-256 of an RLP-encoded empty list: the uncle hash of a block with no
/// uncles. PoSV forbids uncles, so every valid header carries this value.
pub const EMPTY_UNCLE_HASH: B256 = B256::new([
    0x1d, 0xcc, 0x4d, 0xe8, 0xde, 0xc7, 0x5d, 0x7a, 0xab, 0x85, 0xb5, 0x67, 0xb6, 0xcc, 0xd4, 0x1a,
    0xd3, 0x12, 0x45, 0x1b, 0x94, 0x8a, 0x74, 0x13, 0xf0, 0xa1, 0x42, 0xfd, 0x40, 0xd4, 0x93, 0x47,
]);

/// Header-level errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HeaderError {
    /// Extra-data is shorter than the 65-byte seal suffix.
    #[error("extra-data is missing the 65-byte seal suffix")]
    MissingSeal,
}

/// A block header carrying the PoSV consensus fields.
///
/// `validator` holds the 65-byte signature of the assigned co-signer (M2),
/// `validators` the packed per-epoch randomization seeds, and `penalties` the
/// packed addresses excluded starting at this checkpoint. The latter two are
/// empty outside checkpoint blocks.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    /// Hash of the parent header.
    pub parent_hash: B256,
    /// Uncle list hash; must equal [`EMPTY_UNCLE_HASH`].
    pub uncle_hash: B256,
    /// Beneficiary, doubling as the vote subject on non-checkpoint blocks.
    pub coinbase: Address,
    /// Block height.
    pub number: u64,
    /// Unix timestamp in seconds.
    pub time: u64,
    /// Claimed difficulty; in `[1, N]` for N authorized masternodes.
    pub difficulty: u64,
    /// Vote marker: [`NONCE_AUTH`] or [`NONCE_DROP`].
    pub nonce: B64,
    /// Must be zero; PoSV carries no PoW mix.
    pub mix_digest: B256,
    /// Vanity prefix, optional checkpoint masternode list, 65-byte seal.
    pub extra: Bytes,
    /// 65-byte signature of the assigned M2 validator, empty before one full
    /// epoch has elapsed.
    pub validator: Bytes,
    /// Packed 4-byte decimal-ASCII randomization seeds, one per masternode
    /// position. Checkpoint blocks only; opaque to the engine except for the
    /// M1/M2 mapping.
    pub validators: Bytes,
    /// Packed 20-byte addresses penalized starting at this checkpoint.
    pub penalties: Bytes,
}

impl Header {
    /// Hash identifying this header on the wire and in storage.
    ///
    /// The `validator` signature is excluded: the M2 co-signer signs the hash
    /// after the creator has sealed, so the hash cannot depend on it.
    pub fn hash(&self) -> B256 {
        let mut out = Vec::with_capacity(512);
        self.encode_fields(&self.extra, &mut out);
        keccak(&out)
    }

    /// Hash the creator signs: identical to [`Header::hash`] except the
    /// trailing 65 seal bytes are stripped from the extra-data first.
    pub fn seal_hash(&self) -> Result<B256, HeaderError> {
        if self.extra.len() < EXTRA_SEAL {
            return Err(HeaderError::MissingSeal);
        }
        let unsealed = &self.extra[..self.extra.len() - EXTRA_SEAL];
        let mut out = Vec::with_capacity(512);
        self.encode_fields(unsealed, &mut out);
        Ok(keccak(&out))
    }

    /// Whether this header sits on an epoch checkpoint.
    pub fn is_checkpoint(&self, epoch: u64) -> bool {
        epoch != 0 && self.number % epoch == 0
    }

    /// RLP-encode the consensus fields as a single list, with the caller
    /// choosing which view of the extra-data to include.
    fn encode_fields(&self, extra: &[u8], out: &mut Vec<u8>) {
        let mut payload = Vec::with_capacity(256);
        self.parent_hash.encode(&mut payload);
        self.uncle_hash.encode(&mut payload);
        self.coinbase.encode(&mut payload);
        self.number.encode(&mut payload);
        self.time.encode(&mut payload);
        self.difficulty.encode(&mut payload);
        self.nonce.encode(&mut payload);
        self.mix_digest.encode(&mut payload);
        extra.encode(&mut payload);
        self.validators.encode(&mut payload);
        self.penalties.encode(&mut payload);

        alloy_rlp::Header {
            list: true,
            payload_length: payload.len(),
        }
        .encode(out);
        out.extend_from_slice(&payload);
    }
}

/// A block as the sealer sees it: the header plus the transaction hashes the
/// execution layer assembled. Body contents stay external to consensus.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Block {
    /// Consensus header.
    pub header: Header,
    /// Hashes of the included transactions.
    pub transactions: Vec<B256>,
}

impl Block {
    /// Create a block from a header and its transaction hashes.
    pub fn new(header: Header, transactions: Vec<B256>) -> Self {
        Self {
            header,
            transactions,
        }
    }

    /// Block hash, defined as the header hash.
    pub fn hash(&self) -> B256 {
        self.header.hash()
    }
}

fn keccak(data: &[u8]) -> B256 {
    B256::from_slice(&Keccak256::digest(data))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extra::{encode_extra, EXTRA_VANITY};

    fn sealed_header() -> Header {
        Header {
            number: 7,
            time: 1_700_000_000,
            difficulty: 3,
            extra: encode_extra(b"test", &[]).into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_hash_ignores_validator_signature() {
        let mut header = sealed_header();
        let before = header.hash();
        header.validator = vec![0x42; 65].into();
        assert_eq!(header.hash(), before);
    }

    #[test]
    fn test_seal_hash_differs_from_hash() {
        let header = sealed_header();
        // The seal hash drops the 65-byte suffix, so it must not collide with
        // the full hash.
        assert_ne!(header.seal_hash().unwrap(), header.hash());
    }

    #[test]
    fn test_seal_hash_stable_under_seal_bytes() {
        let mut header = sealed_header();
        let before = header.seal_hash().unwrap();

        let mut extra = header.extra.to_vec();
        let tail = extra.len() - EXTRA_SEAL;
        extra[tail..].fill(0xaa);
        header.extra = extra.into();

        assert_eq!(header.seal_hash().unwrap(), before);
        assert_ne!(header.hash(), sealed_header().hash());
    }

    #[test]
    fn test_seal_hash_requires_seal() {
        let header = Header {
            extra: vec![0u8; EXTRA_VANITY].into(),
            ..Default::default()
        };
        assert_eq!(header.seal_hash(), Err(HeaderError::MissingSeal));
    }

    #[test]
    fn test_checkpoint_predicate() {
        let mut header = Header::default();
        header.number = 900;
        assert!(header.is_checkpoint(900));
        header.number = 901;
        assert!(!header.is_checkpoint(900));
        assert!(!header.is_checkpoint(0));
    }
}
