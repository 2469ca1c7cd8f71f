//! Double validation: assigning an M2 verifier to each M1 producer.
//!
//! Each checkpoint header carries one 4-byte randomization seed per
//! masternode position (the `validators` field). For an epoch with N
//! masternodes, producer at position `i` is verified by the masternode at
//! position `(seed[i] mod N + moveM2) mod N`, where `moveM2` rotates the
//! whole assignment as the epoch progresses once the randomize fork is
//! active.

use crate::error::{PosvError, PosvResult};
use posv_primitives::{Address, ChainConfig};
use std::collections::HashMap;

/// Width of one randomization seed in the checkpoint `validators` field.
pub const VALIDATOR_SEED_BYTES: usize = 4;

/// Decode the packed per-position seeds: consecutive 4-byte chunks, each a
/// NUL-padded decimal ASCII integer.
pub fn decode_validator_seeds(raw: &[u8]) -> PosvResult<Vec<u64>> {
    if raw.len() % VALIDATOR_SEED_BYTES != 0 {
        return Err(PosvError::InvalidCheckpointValidators(format!(
            "length {} not a multiple of {VALIDATOR_SEED_BYTES}",
            raw.len()
        )));
    }
    let mut seeds = Vec::with_capacity(raw.len() / VALIDATOR_SEED_BYTES);
    for chunk in raw.chunks_exact(VALIDATOR_SEED_BYTES) {
        let end = chunk.iter().position(|b| *b == 0).unwrap_or(chunk.len());
        let text = std::str::from_utf8(&chunk[..end])
            .map_err(|_| PosvError::InvalidCheckpointValidators("non-ASCII seed".into()))?;
        let value = text
            .parse::<u64>()
            .map_err(|_| PosvError::InvalidCheckpointValidators(format!("bad seed {text:?}")))?;
        seeds.push(value);
    }
    Ok(seeds)
}

/// Encode per-position seeds into the packed `validators` layout.
pub fn encode_validator_seeds(seeds: &[u64]) -> Vec<u8> {
    let mut out = Vec::with_capacity(seeds.len() * VALIDATOR_SEED_BYTES);
    for seed in seeds {
        let text = seed.to_string();
        debug_assert!(text.len() <= VALIDATOR_SEED_BYTES);
        let mut chunk = [0u8; VALIDATOR_SEED_BYTES];
        chunk[..text.len()].copy_from_slice(text.as_bytes());
        out.extend_from_slice(&chunk);
    }
    out
}

/// The per-epoch rotation offset applied on top of the seeds. Zero before
/// the randomize fork; afterwards it advances once every N blocks within the
/// epoch, so the assignment shifts N times per epoch.
pub fn move_m2(config: &ChainConfig, current_number: u64, n: usize) -> u64 {
    if n == 0 || !config.is_randomize_active(current_number) {
        return 0;
    }
    ((current_number % config.epoch) / n as u64) % n as u64
}

/// Map each masternode to its assigned M2 verifier for blocks at
/// `current_number`'s point in the epoch.
///
/// `masternodes` is the epoch's ordered list; `seeds` are the checkpoint's
/// decoded randomization seeds and must cover every position.
pub fn assign_m2(
    masternodes: &[Address],
    seeds: &[u64],
    config: &ChainConfig,
    current_number: u64,
) -> PosvResult<HashMap<Address, Address>> {
    let n = masternodes.len();
    if n == 0 {
        return Ok(HashMap::new());
    }
    if seeds.len() < n {
        return Err(PosvError::InvalidCheckpointValidators(format!(
            "{} seeds for {n} masternodes",
            seeds.len()
        )));
    }

    let shift = move_m2(config, current_number, n);
    let mut map = HashMap::with_capacity(n);
    for (i, m1) in masternodes.iter().enumerate() {
        let m2_index = ((seeds[i] % n as u64) + shift) % n as u64;
        map.insert(*m1, masternodes[m2_index as usize]);
    }
    Ok(map)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(byte: u8) -> Address {
        Address::repeat_byte(byte)
    }

    fn config(randomize_block: u64) -> ChainConfig {
        ChainConfig {
            epoch: 900,
            randomize_block,
            ..Default::default()
        }
    }

    #[test]
    fn test_seed_codec_roundtrip() {
        let seeds = vec![0, 7, 42, 999, 1];
        let packed = encode_validator_seeds(&seeds);
        assert_eq!(packed.len(), seeds.len() * VALIDATOR_SEED_BYTES);
        assert_eq!(decode_validator_seeds(&packed).unwrap(), seeds);
    }

    #[test]
    fn test_decode_rejects_ragged_length() {
        assert!(matches!(
            decode_validator_seeds(&[b'1', 0, 0]),
            Err(PosvError::InvalidCheckpointValidators(_))
        ));
    }

    #[test]
    fn test_decode_rejects_non_decimal() {
        assert!(matches!(
            decode_validator_seeds(&[b'x', b'y', 0, 0]),
            Err(PosvError::InvalidCheckpointValidators(_))
        ));
    }

    #[test]
    fn test_move_m2_zero_before_fork() {
        let cfg = config(1000);
        assert_eq!(move_m2(&cfg, 999, 3), 0);
        assert_ne!(move_m2(&cfg, 1000 + 903, 3), 0);
    }

    #[test]
    fn test_move_m2_advances_within_epoch() {
        let cfg = config(0);
        // N = 3, epoch 900: offset steps every 3 blocks, wraps mod 3.
        assert_eq!(move_m2(&cfg, 900, 3), 0);
        assert_eq!(move_m2(&cfg, 903, 3), 1);
        assert_eq!(move_m2(&cfg, 906, 3), 2);
        assert_eq!(move_m2(&cfg, 909, 3), 0);
    }

    #[test]
    fn test_assign_m2_uses_seed_mod_n() {
        let cfg = config(u64::MAX); // fork never active, shift 0
        let nodes = vec![addr(1), addr(2), addr(3)];
        let map = assign_m2(&nodes, &[1, 1, 5], &cfg, 10).unwrap();
        assert_eq!(map[&addr(1)], addr(2)); // 1 % 3 = 1
        assert_eq!(map[&addr(2)], addr(2)); // 1 % 3 = 1
        assert_eq!(map[&addr(3)], addr(3)); // 5 % 3 = 2
    }

    #[test]
    fn test_assign_m2_applies_shift() {
        let cfg = config(0);
        let nodes = vec![addr(1), addr(2), addr(3)];
        // Block 903 in epoch 900: shift = 1.
        let map = assign_m2(&nodes, &[0, 0, 0], &cfg, 903).unwrap();
        for m1 in &nodes {
            assert_eq!(map[m1], addr(2));
        }
    }

    #[test]
    fn test_assign_m2_requires_full_seed_coverage() {
        let cfg = config(u64::MAX);
        let nodes = vec![addr(1), addr(2), addr(3)];
        assert!(matches!(
            assign_m2(&nodes, &[0, 1], &cfg, 10),
            Err(PosvError::InvalidCheckpointValidators(_))
        ));
    }
}
