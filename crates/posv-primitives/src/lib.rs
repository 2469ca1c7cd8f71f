//! # posv-primitives
//!
//! Consensus data model for the Proof-of-Stake-Voting (PoSV) engine.
//!
//! This crate provides:
//! - The consensus [`Header`] with PoSV-specific fields (second signature,
//!   per-epoch randomization seeds, penalty list)
//! - The extra-data byte layout (vanity / checkpoint masternode list / seal)
//! - [`ChainConfig`] describing epoch geometry and fork activation heights
//!
//! Byte layouts here are consensus-critical: two nodes disagreeing on a
//! single byte of the checkpoint extra-data will fork the chain.

mod config;
mod header;

pub mod extra;

pub use config::ChainConfig;
pub use header::{Block, Header, HeaderError, EMPTY_UNCLE_HASH, NONCE_AUTH, NONCE_DROP};

use serde::{Deserialize, Serialize};

// Re-export the Ethereum-style primitive types used throughout the workspace.
pub use alloy_primitives::{Address, Bytes, B256, B64, U256};

/// A masternode candidate as read from the external registry: an on-chain
/// identity ranked by stake. Immutable once read for a given snapshot
/// computation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Masternode {
    /// On-chain address of the candidate.
    pub address: Address,
    /// Voting weight backing the candidate.
    pub stake: U256,
}

impl Masternode {
    /// Create a new masternode entry.
    pub fn new(address: Address, stake: U256) -> Self {
        Self { address, stake }
    }
}

/// Order candidates by descending stake, ties broken by address, which is the
/// ranking the registry applies before a list is committed to a checkpoint.
pub fn rank_by_stake(mut candidates: Vec<Masternode>) -> Vec<Masternode> {
    candidates.sort_by(|a, b| b.stake.cmp(&a.stake).then(a.address.cmp(&b.address)));
    candidates
}
