//! # posv-tests
//!
//! Integration tests for the PoSV consensus engine.
//!
//! This crate provides end-to-end testing across the workspace:
//! - A [`harness`] that runs a deterministic in-process masternode network
//! - [`generators`] for keys, headers and tampered fixtures
//! - Verification, sealing, snapshot, penalty and storage test suites

pub mod generators;
pub mod harness;



#[cfg(test)]
mod sealing_tests;

#[cfg(test)]
mod penalty_tests;

#[cfg(test)]
mod storage_tests;

#[cfg(test)]
mod property_tests;

pub use generators::*;
pub use harness::*;
