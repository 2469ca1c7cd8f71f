//! Penalty computation for checkpoint blocks.
//!
//! Masternodes that failed to produce during an epoch are penalized: named
//! in the checkpoint header's `penalties` field and excluded from the next
//! epochs' signer set until they have sat out the comeback window. The
//! per-epoch detection itself is hook territory (it needs the execution
//! layer); this module selects the strategy, widens the exclusion over the
//! comeback window, and filters candidate lists.

use crate::chain::ChainReader;
use crate::error::{PosvError, PosvResult};
use crate::hooks::EngineHooks;
use posv_primitives::{extra, Address, Header};
use tracing::debug;

/// Penalties to embed in a checkpoint header at `checkpoint_number`,
/// computed with the strategy active at that height.
pub fn current_penalties(
    chain: &dyn ChainReader,
    hooks: &dyn EngineHooks,
    header: &Header,
    candidates: &[Address],
) -> PosvResult<Vec<Address>> {
    let config = chain.config();
    let number = header.number;
    if number % config.epoch != 0 || number == 0 {
        return Ok(Vec::new());
    }

    let penalties = if config.is_tip_signing_active(number) {
        hooks.penalty_tip_signing(chain, header, candidates)?
    } else {
        hooks.penalty(chain, number - config.epoch)?
    };
    if !penalties.is_empty() {
        debug!(number, count = penalties.len(), "masternodes penalized");
    }
    Ok(penalties)
}

/// Every address barred from the signer set at checkpoint
/// `checkpoint_number`: the fresh penalties plus those recorded in the
/// previous `limit_penalty_epoch` checkpoints, which are still serving out
/// the comeback window. Order preserved, first occurrence wins.
pub fn barred_addresses(
    chain: &dyn ChainReader,
    checkpoint_number: u64,
    fresh: &[Address],
) -> PosvResult<Vec<Address>> {
    let config = chain.config();
    let mut barred: Vec<Address> = Vec::new();
    let mut push = |addr: Address| {
        if !barred.contains(&addr) {
            barred.push(addr);
        }
    };
    fresh.iter().copied().for_each(&mut push);

    for back in 1..=config.limit_penalty_epoch {
        let Some(prior) = checkpoint_number.checked_sub(back * config.epoch) else {
            break;
        };
        if prior == 0 {
            break;
        }
        let header = chain
            .header_by_number(prior)
            .ok_or(PosvError::UnknownBlock { number: prior })?;
        for addr in extra::unpack_addresses(&header.penalties)? {
            push(addr);
        }
    }
    Ok(barred)
}

/// Filter `candidates` down to those not barred, preserving order.
pub fn remove_barred(candidates: &[Address], barred: &[Address]) -> Vec<Address> {
    candidates
        .iter()
        .copied()
        .filter(|c| !barred.contains(c))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(byte: u8) -> Address {
        Address::repeat_byte(byte)
    }

    #[test]
    fn test_remove_barred_preserves_order() {
        let candidates = vec![addr(1), addr(2), addr(3), addr(4)];
        let barred = vec![addr(3), addr(1)];
        assert_eq!(
            remove_barred(&candidates, &barred),
            vec![addr(2), addr(4)]
        );
    }

    #[test]
    fn test_remove_barred_empty_list_is_identity() {
        let candidates = vec![addr(1), addr(2)];
        assert_eq!(remove_barred(&candidates, &[]), candidates);
    }
}
