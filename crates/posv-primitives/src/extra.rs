//! Extra-data byte layout.
//!
//! `extra = vanity(32) ++ [checkpoint only: N x 20-byte addresses] ++ seal(65)`
//!
//! The codec is bit-exact across implementations: the checkpoint list is the
//! authoritative masternode set for the epoch and the trailing 65 bytes are
//! the creator's signature over [`crate::Header::seal_hash`].

use alloy_primitives::Address;
use thiserror::Error;

/// Fixed number of extra-data prefix bytes reserved for signer vanity.
pub const EXTRA_VANITY: usize = 32;

/// Fixed number of extra-data suffix bytes reserved for the creator seal.
pub const EXTRA_SEAL: usize = 65;

/// Length of a packed address.
pub const ADDRESS_LENGTH: usize = 20;

/// Extra-data codec errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExtraError {
    /// 32-byte vanity prefix missing.
    #[error("extra-data 32 byte vanity prefix missing")]
    MissingVanity,
    /// 65-byte seal suffix missing.
    #[error("extra-data 65 byte signature suffix missing")]
    MissingSignature,
    /// Checkpoint list not a whole number of addresses.
    #[error("invalid masternode list in checkpoint extra-data: {0} bytes")]
    InvalidMasternodeList(usize),
    /// Non-checkpoint header carries a masternode list.
    #[error("non-checkpoint extra-data carries {0} unexpected bytes")]
    UnexpectedSignerData(usize),
    /// Packed address list not a whole number of addresses.
    #[error("packed address list of {0} bytes is not a multiple of 20")]
    InvalidAddressList(usize),
}

/// Validate the shape of an extra-data field without decoding it.
pub fn check_shape(extra: &[u8], checkpoint: bool) -> Result<(), ExtraError> {
    if extra.len() < EXTRA_VANITY {
        return Err(ExtraError::MissingVanity);
    }
    if extra.len() < EXTRA_VANITY + EXTRA_SEAL {
        return Err(ExtraError::MissingSignature);
    }
    let middle = extra.len() - EXTRA_VANITY - EXTRA_SEAL;
    if checkpoint && middle % ADDRESS_LENGTH != 0 {
        return Err(ExtraError::InvalidMasternodeList(middle));
    }
    if !checkpoint && middle != 0 {
        return Err(ExtraError::UnexpectedSignerData(middle));
    }
    Ok(())
}

/// Decode the ordered masternode list from a checkpoint extra-data field.
pub fn decode_masternodes(extra: &[u8]) -> Result<Vec<Address>, ExtraError> {
    check_shape(extra, true)?;
    let packed = &extra[EXTRA_VANITY..extra.len() - EXTRA_SEAL];
    unpack_addresses(packed)
}

/// Build an extra-data field: vanity truncated or zero-padded to 32 bytes,
/// the ordered masternode list (empty outside checkpoints), and a zeroed seal
/// for the creator to fill in.
pub fn encode_extra(vanity: &[u8], masternodes: &[Address]) -> Vec<u8> {
    let mut out = Vec::with_capacity(EXTRA_VANITY + masternodes.len() * ADDRESS_LENGTH + EXTRA_SEAL);
    let take = vanity.len().min(EXTRA_VANITY);
    out.extend_from_slice(&vanity[..take]);
    out.resize(EXTRA_VANITY, 0);
    for addr in masternodes {
        out.extend_from_slice(addr.as_slice());
    }
    out.resize(out.len() + EXTRA_SEAL, 0);
    out
}

/// The 65-byte seal suffix of an extra-data field.
pub fn seal_bytes(extra: &[u8]) -> Result<&[u8], ExtraError> {
    if extra.len() < EXTRA_VANITY + EXTRA_SEAL {
        return Err(ExtraError::MissingSignature);
    }
    Ok(&extra[extra.len() - EXTRA_SEAL..])
}

/// Decode a packed 20-byte address list (the `penalties` field layout).
pub fn unpack_addresses(packed: &[u8]) -> Result<Vec<Address>, ExtraError> {
    if packed.len() % ADDRESS_LENGTH != 0 {
        return Err(ExtraError::InvalidAddressList(packed.len()));
    }
    Ok(packed
        .chunks_exact(ADDRESS_LENGTH)
        .map(Address::from_slice)
        .collect())
}

/// Pack an address list into the 20-byte-per-entry wire layout.
pub fn pack_addresses(addresses: &[Address]) -> Vec<u8> {
    let mut out = Vec::with_capacity(addresses.len() * ADDRESS_LENGTH);
    for addr in addresses {
        out.extend_from_slice(addr.as_slice());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addrs(n: u8) -> Vec<Address> {
        (1..=n).map(Address::repeat_byte).collect()
    }

    #[test]
    fn test_checkpoint_roundtrip() {
        let list = addrs(5);
        let extra = encode_extra(b"posv", &list);
        assert_eq!(decode_masternodes(&extra).unwrap(), list);
    }

    #[test]
    fn test_empty_checkpoint_list() {
        let extra = encode_extra(&[], &[]);
        assert_eq!(extra.len(), EXTRA_VANITY + EXTRA_SEAL);
        assert!(decode_masternodes(&extra).unwrap().is_empty());
    }

    #[test]
    fn test_vanity_truncated_and_padded() {
        let long = vec![0xffu8; 64];
        let extra = encode_extra(&long, &[]);
        assert_eq!(&extra[..EXTRA_VANITY], &long[..EXTRA_VANITY]);

        let extra = encode_extra(b"ab", &[]);
        assert_eq!(&extra[..2], b"ab");
        assert!(extra[2..EXTRA_VANITY].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_shape_rejects_short_extra() {
        assert_eq!(check_shape(&[0; 16], false), Err(ExtraError::MissingVanity));
        assert_eq!(
            check_shape(&[0; EXTRA_VANITY + 10], false),
            Err(ExtraError::MissingSignature)
        );
    }

    #[test]
    fn test_shape_rejects_ragged_checkpoint_list() {
        let mut extra = encode_extra(&[], &addrs(2));
        extra.insert(EXTRA_VANITY, 0xcc);
        assert_eq!(
            check_shape(&extra, true),
            Err(ExtraError::InvalidMasternodeList(41))
        );
    }

    #[test]
    fn test_shape_rejects_signers_outside_checkpoint() {
        let extra = encode_extra(&[], &addrs(1));
        assert_eq!(
            check_shape(&extra, false),
            Err(ExtraError::UnexpectedSignerData(20))
        );
    }

    #[test]
    fn test_pack_unpack_addresses() {
        let list = addrs(3);
        let packed = pack_addresses(&list);
        assert_eq!(packed.len(), 60);
        assert_eq!(unpack_addresses(&packed).unwrap(), list);
        assert!(unpack_addresses(&packed[..30]).is_err());
    }
}
