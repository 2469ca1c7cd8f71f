//! External capability hooks.
//!
//! The engine depends on chain state it does not own: the masternode
//! registry contract, the block-signer registration transactions, and the
//! reward arithmetic. Those live behind this trait and are injected at
//! engine construction, so the engine can never run with hooks missing.
//!
//! Every hook must be a deterministic function of public chain state:
//! two honest nodes calling the same hook at the same block must get the
//! same answer, or consensus diverges.

use crate::chain::ChainReader;
use crate::error::PosvResult;
use posv_primitives::{Address, Header, B256, U256};
use std::collections::BTreeMap;

/// Per-address reward attribution produced by the reward hook.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RewardReport {
    /// Amount credited per address.
    pub rewards: BTreeMap<Address, U256>,
}

/// Capabilities the node wiring layer provides to the consensus engine.
pub trait EngineHooks: Send + Sync {
    /// Distribute block rewards for a reward-checkpoint block. Called exactly
    /// once per such block; must mutate balances only through the execution
    /// layer's own accessors.
    fn reward(&self, chain: &dyn ChainReader, header: &Header) -> PosvResult<RewardReport>;

    /// Legacy penalty strategy: masternodes of the previous epoch that never
    /// registered a signed block in that epoch.
    fn penalty(&self, chain: &dyn ChainReader, epoch_boundary: u64) -> PosvResult<Vec<Address>>;

    /// Signing-tally penalty strategy: replay the previous epoch, count
    /// blocks produced per candidate, penalize under-producers and absentees
    /// without a qualifying comeback transaction.
    fn penalty_tip_signing(
        &self,
        chain: &dyn ChainReader,
        header: &Header,
        candidates: &[Address],
    ) -> PosvResult<Vec<Address>>;

    /// Produce the packed per-epoch randomization seeds (`validators` field)
    /// for a checkpoint header being sealed.
    fn validator_bytes(&self, header: &Header, signers: &[Address]) -> PosvResult<Vec<u8>>;

    /// Independent cross-check of a checkpoint header's `validators` field at
    /// verification time.
    fn verify_masternodes(&self, header: &Header, signers: &[Address]) -> PosvResult<()>;

    /// Fallback signer-set source: the registry contract state as of a block.
    /// Consulted when the snapshot-derived set disagrees with a checkpoint
    /// header.
    fn signers_from_contract(&self, block_hash: &B256) -> PosvResult<Vec<Address>>;
}
