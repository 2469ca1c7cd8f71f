//! Chain configuration.

use alloy_primitives::Address;
use serde::{Deserialize, Serialize};

/// PoSV chain parameters and fork activation heights.
///
/// Loaded from the node configuration file; every field has a default so a
/// minimal development chain needs no explicit consensus section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainConfig {
    /// Number of blocks between masternode-set checkpoints.
    #[serde(default = "default_epoch")]
    pub epoch: u64,
    /// Offset before a checkpoint at which snapshots are persisted to and
    /// queried from disk.
    #[serde(default = "default_gap")]
    pub gap: u64,
    /// Minimum seconds between consecutive blocks.
    #[serde(default = "default_period")]
    pub period: u64,
    /// Cadence (in blocks) of reward distribution; the reward hook fires once
    /// per reward-checkpoint block.
    #[serde(default = "default_epoch")]
    pub reward_checkpoint: u64,
    /// Number of epochs a penalized masternode stays excluded from the
    /// signer-set computation.
    #[serde(default = "default_limit_penalty_epoch")]
    pub limit_penalty_epoch: u64,
    /// Height from which the per-block M2 offset (`move_m2`) applies; zero
    /// activates it at genesis.
    #[serde(default)]
    pub randomize_block: u64,
    /// Height from which the signing-tally penalty strategy replaces the
    /// legacy registration-scan strategy.
    #[serde(default)]
    pub tip_signing_block: u64,
    /// Historical compatibility shim: a single block number at which the
    /// checkpoint signer-list comparison is skipped. Zero disables it.
    #[serde(default)]
    pub ignore_signer_check_block: u64,
    /// Wallet receiving the foundation share of block rewards.
    #[serde(default)]
    pub foundation_wallet: Address,
}

fn default_epoch() -> u64 {
    900
}

fn default_gap() -> u64 {
    450
}

fn default_period() -> u64 {
    2
}

fn default_limit_penalty_epoch() -> u64 {
    4
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            epoch: default_epoch(),
            gap: default_gap(),
            period: default_period(),
            reward_checkpoint: default_epoch(),
            limit_penalty_epoch: default_limit_penalty_epoch(),
            randomize_block: 0,
            tip_signing_block: 0,
            ignore_signer_check_block: 0,
            foundation_wallet: Address::ZERO,
        }
    }
}

impl ChainConfig {
    /// Whether `number` is an epoch checkpoint.
    pub fn is_checkpoint(&self, number: u64) -> bool {
        self.epoch != 0 && number % self.epoch == 0
    }

    /// Whether the snapshot at `number` sits on a gap-before-epoch offset and
    /// is therefore persisted to disk.
    pub fn is_gap_offset(&self, number: u64) -> bool {
        self.epoch != 0 && (number + self.gap) % self.epoch == 0
    }

    /// The checkpoint governing the rotation for a block whose parent is at
    /// `parent_number`: the masternode list committed at the start of the
    /// parent's epoch stays authoritative through the following checkpoint
    /// block itself.
    pub fn rotation_checkpoint(&self, parent_number: u64) -> u64 {
        parent_number - parent_number % self.epoch
    }

    /// Whether the M2 sliding offset is active at `number`.
    pub fn is_randomize_active(&self, number: u64) -> bool {
        number >= self.randomize_block
    }

    /// Whether the signing-tally penalty strategy is active at `number`.
    pub fn is_tip_signing_active(&self, number: u64) -> bool {
        number >= self.tip_signing_block
    }

    /// Whether rewards are distributed at `number`.
    pub fn is_reward_checkpoint(&self, number: u64) -> bool {
        self.reward_checkpoint != 0 && number % self.reward_checkpoint == 0
    }
}
