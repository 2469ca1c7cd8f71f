//! Error types for consensus validation.
//!
//! Every variant is terminal for the header or block in question; nothing in
//! this crate retries. Hook failures at checkpoints are escalated by callers
//! to node-level faults, since inventing a fallback penalty or reward outcome
//! would diverge consensus.

use posv_primitives::{Address, HeaderError, B256};
use thiserror::Error;

/// Consensus validation errors.
#[derive(Error, Debug)]
pub enum PosvError {
    // ---- Structural ----
    /// Extra-data or other byte-layout violation.
    #[error("Malformed header field: {0}")]
    Structural(#[from] posv_primitives::extra::ExtraError),

    /// Header extra-data too short to hash without its seal.
    #[error("Malformed header: {0}")]
    Header(#[from] HeaderError),

    /// Vote nonce is neither the authorize nor the drop marker.
    #[error("Invalid vote nonce")]
    InvalidVote,

    /// Checkpoint block carries a non-drop nonce.
    #[error("Invalid checkpoint vote nonce")]
    InvalidCheckpointVote,

    /// Checkpoint block carries a non-zero beneficiary.
    #[error("Invalid checkpoint beneficiary")]
    InvalidCheckpointBeneficiary,

    /// Non-zero mix digest.
    #[error("Non-zero mix digest")]
    InvalidMixDigest,

    /// Non-empty uncle list.
    #[error("Non-empty uncle hash")]
    InvalidUncleHash,

    /// Header past one epoch lacks the required validator signature.
    #[error("Missing validator signature at block {0}")]
    MissingValidatorSignature(u64),

    // ---- Authorization ----
    /// Recovered creator is not in the authorized signer set.
    #[error("Unauthorized creator {creator} at block {number}")]
    Unauthorized { number: u64, creator: Address },

    /// Creator signed within the anti-consecutive window.
    #[error("Creator {creator} signed recently at block {number}")]
    RecentlySigned { number: u64, creator: Address },

    /// Checkpoint masternode list disagrees with the computed signer set,
    /// after the contract-fallback retry.
    #[error("Invalid checkpoint signer list at block {0}")]
    InvalidCheckpointSigners(u64),

    /// Checkpoint penalty list disagrees with the computed penalties.
    #[error("Invalid checkpoint penalty list at block {0}")]
    InvalidCheckpointPenalties(u64),

    /// The recovered validator is not the M2 assigned to the recovered
    /// creator.
    #[error("Wrong creator-validator pair at block {number}: validator {got}, expected {expected}")]
    InvalidCreatorValidatorPair {
        number: u64,
        got: Address,
        expected: Address,
    },

    /// Checkpoint `validators` randomization field cannot be decoded or does
    /// not cover the masternode list.
    #[error("Invalid checkpoint validators field: {0}")]
    InvalidCheckpointValidators(String),

    // ---- Chain linkage ----
    /// Parent linkage broken while walking back for a snapshot.
    #[error("Unknown ancestor of block {number} ({hash})")]
    UnknownAncestor { number: u64, hash: B256 },

    /// Referenced block not found.
    #[error("Unknown block {number}")]
    UnknownBlock { number: u64 },

    /// Timestamp below parent time plus the chain period.
    #[error("Timestamp {time} violates period at block {number}")]
    InvalidTimestamp { number: u64, time: u64 },

    /// Header dated beyond local wall-clock time.
    #[error("Block {number} is in the future")]
    FutureBlock { number: u64 },

    // ---- Difficulty ----
    /// Claimed difficulty does not match the rotation calculation.
    #[error("Invalid difficulty at block {number}: got {got}, expected {expected}")]
    InvalidDifficulty {
        number: u64,
        got: u64,
        expected: u64,
    },

    // ---- Hooks / external ----
    /// A required hook failed; fatal at checkpoints.
    #[error("Consensus hook '{hook}' failed: {reason}")]
    HookFailed { hook: &'static str, reason: String },

    /// Signature recovery failed.
    #[error("Signature recovery failed: {0}")]
    Signature(#[from] secp256k1::Error),

    // ---- Sealing ----
    /// Zero-period chain refuses to seal an empty non-checkpoint block.
    #[error("Waiting for transactions")]
    WaitingForTransactions,

    /// Local signer is not authorized to seal.
    #[error("Signer not authorized to seal")]
    NotAuthorizedToSeal,

    /// Sealing attempted before a signer was installed.
    #[error("No signing key installed")]
    NoSigner,

    /// Genesis is never sealed.
    #[error("Refusing to seal the genesis block")]
    SealGenesis,

    // ---- Storage ----
    /// Snapshot persistence failure.
    #[error("Storage error: {0}")]
    Storage(#[from] posv_storage::StorageError),

    /// Persisted snapshot failed to decode.
    #[error("Snapshot decode error: {0}")]
    SnapshotDecode(#[from] serde_json::Error),
}

/// Result type for consensus operations.
pub type PosvResult<T> = Result<T, PosvError>;
