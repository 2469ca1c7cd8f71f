//! # posv-consensus
//!
//! Proof-of-Stake-Voting (PoSV) consensus engine.
//!
//! The engine validates and produces headers for a chain governed by an
//! epoch-based masternode rotation:
//!
//! - **Snapshots** ([`Snapshot`]) capture the authorized signer set, the
//!   anti-consecutive window and pending governance votes at each block.
//! - **Rotation** ([`rotation`]) fixes who is in turn and what difficulty a
//!   producer may claim, so chain weight rewards on-schedule production.
//! - **Double validation** ([`m1m2`]) assigns a second masternode (M2) to
//!   co-sign every block its producer (M1) seals.
//! - **Penalties** ([`penalty`]) exclude under-producing masternodes from
//!   upcoming epochs, with a comeback window.
//!
//! [`Posv`] ties these together behind the verification, sealing and
//! snapshot operations the node calls.

mod chain;
mod engine;
mod error;
mod hooks;
mod recover;
mod snapshot;

pub mod m1m2;
pub mod penalty;
pub mod rotation;

pub use chain::ChainReader;
pub use engine::{BatchVerification, Posv};
pub use error::{PosvError, PosvResult};
pub use hooks::{EngineHooks, RewardReport};
pub use recover::{address_of, sign_digest, SignatureCache};
pub use snapshot::{Snapshot, Tally, Vote};
