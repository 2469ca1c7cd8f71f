//! Authorization snapshots.
//!
//! A snapshot is the full authorization state at one block: the ordered
//! signer set, the anti-consecutive window of recent creators, and the
//! in-flight governance votes. Snapshots are immutable values; advancing the
//! chain produces a new snapshot via [`Snapshot::apply`], never an in-place
//! mutation. That keeps reorg handling trivial: every block hash maps to
//! exactly one snapshot, computed once and cached.

use crate::error::{PosvError, PosvResult};
use posv_primitives::{extra, Address, ChainConfig, Header, B256, NONCE_AUTH, NONCE_DROP};
use posv_storage::{ColumnFamily, Storage};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// Storage key prefix for persisted snapshots.
const SNAPSHOT_PREFIX: &[u8] = b"posv-";

/// A pending authorization vote cast by a signer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vote {
    /// Signer that cast the vote.
    pub signer: Address,
    /// Block number the vote was cast at.
    pub block: u64,
    /// Account the vote is about.
    pub address: Address,
    /// `true` to authorize, `false` to drop.
    pub authorize: bool,
}

/// Running vote count for one proposal, kept so votes from dropped signers
/// can be uncast without replaying the whole list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tally {
    /// Direction of the proposal.
    pub authorize: bool,
    /// Votes collected so far.
    pub votes: usize,
}

/// Authorization state at a single block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Block number the snapshot is valid for.
    pub number: u64,
    /// Hash of the block the snapshot is valid for.
    pub hash: B256,
    /// Authorized signers at this block.
    pub signers: BTreeSet<Address>,
    /// Recent creators, keyed by the block they created. Bounded to half the
    /// signer count; membership here blocks a signer from creating again.
    pub recents: BTreeMap<u64, Address>,
    /// Pending votes, in casting order.
    #[serde(default)]
    pub votes: Vec<Vote>,
    /// Vote counts per proposed address.
    #[serde(default)]
    pub tally: BTreeMap<Address, Tally>,
}

impl Snapshot {
    /// Fresh snapshot with the given signer set and no history. Used for the
    /// genesis block and for every checkpoint reconstructed from a header's
    /// embedded masternode list.
    pub fn new(number: u64, hash: B256, signers: impl IntoIterator<Item = Address>) -> Self {
        Self {
            number,
            hash,
            signers: signers.into_iter().collect(),
            recents: BTreeMap::new(),
            votes: Vec::new(),
            tally: BTreeMap::new(),
        }
    }

    /// Signers in their canonical iteration order.
    pub fn signer_list(&self) -> Vec<Address> {
        self.signers.iter().copied().collect()
    }

    /// Number of recent-creator entries retained, `⌊N/2⌋`.
    pub fn recents_window(&self) -> u64 {
        (self.signers.len() / 2) as u64
    }

    /// Whether `signer` created a block inside the anti-consecutive window
    /// ending at `number - 1`.
    pub fn signed_recently(&self, signer: Address) -> bool {
        self.recents.values().any(|s| *s == signer)
    }

    /// Whether a vote about `address` would change state.
    pub(crate) fn valid_vote(&self, address: Address, authorize: bool) -> bool {
        let is_signer = self.signers.contains(&address);
        (is_signer && !authorize) || (!is_signer && authorize)
    }

    fn cast(&mut self, signer: Address, block: u64, address: Address, authorize: bool) -> bool {
        if !self.valid_vote(address, authorize) {
            return false;
        }
        self.votes.push(Vote {
            signer,
            block,
            address,
            authorize,
        });
        let tally = self.tally.entry(address).or_insert(Tally {
            authorize,
            votes: 0,
        });
        tally.votes += 1;
        true
    }

    fn uncast(&mut self, address: Address, authorize: bool) {
        if let Some(tally) = self.tally.get_mut(&address) {
            if tally.authorize == authorize {
                tally.votes -= 1;
                if tally.votes == 0 {
                    self.tally.remove(&address);
                }
            }
        }
    }

    /// Advance the snapshot over a run of consecutive headers, producing the
    /// snapshot valid for the last of them.
    ///
    /// `headers` must be ascending and parent-linked; the first must build on
    /// `self`. `recover` maps a header to its already-verified creator.
    pub fn apply(
        &self,
        headers: &[Header],
        recover: &dyn Fn(&Header) -> PosvResult<Address>,
        config: &ChainConfig,
    ) -> PosvResult<Snapshot> {
        if headers.is_empty() {
            return Ok(self.clone());
        }
        for pair in headers.windows(2) {
            if pair[1].number != pair[0].number + 1 {
                return Err(PosvError::UnknownAncestor {
                    number: pair[1].number,
                    hash: pair[1].parent_hash,
                });
            }
        }
        if headers[0].number != self.number + 1 {
            return Err(PosvError::UnknownAncestor {
                number: headers[0].number,
                hash: headers[0].parent_hash,
            });
        }

        let mut snap = self.clone();
        for header in headers {
            let number = header.number;

            if config.is_checkpoint(number) {
                // Checkpoints re-seed authorization from the embedded
                // masternode list and reset all rolling state.
                let masternodes = extra::decode_masternodes(&header.extra)?;
                snap.signers = masternodes.into_iter().collect();
                snap.recents.clear();
                snap.votes.clear();
                snap.tally.clear();
            } else {
                let creator = recover(header)?;
                if !snap.signers.contains(&creator) {
                    return Err(PosvError::Unauthorized { number, creator });
                }
                if snap.signed_recently(creator) {
                    return Err(PosvError::RecentlySigned { number, creator });
                }
                let keep = snap.recents_window();
                snap.recents.retain(|n, _| *n + keep > number);
                if keep > 0 {
                    snap.recents.insert(number, creator);
                }

                // Header beneficiary doubles as a governance ballot.
                let beneficiary = header.coinbase;
                if beneficiary != Address::ZERO {
                    snap.uncast_existing(creator, beneficiary);
                    let authorize = match header.nonce {
                        n if n == NONCE_AUTH => true,
                        n if n == NONCE_DROP => false,
                        _ => return Err(PosvError::InvalidVote),
                    };
                    if snap.cast(creator, number, beneficiary, authorize) {
                        debug!(number, signer = %creator, %beneficiary, authorize, "vote cast");
                    }
                    snap.settle(beneficiary, number);
                }
            }

            snap.number = number;
            snap.hash = header.hash();
        }

        Ok(snap)
    }

    /// Drop any earlier vote by `signer` about `address`.
    fn uncast_existing(&mut self, signer: Address, address: Address) {
        if let Some(pos) = self
            .votes
            .iter()
            .position(|v| v.signer == signer && v.address == address)
        {
            let vote = self.votes.remove(pos);
            self.uncast(vote.address, vote.authorize);
        }
    }

    /// Apply a proposal that has reached a strict majority.
    fn settle(&mut self, address: Address, number: u64) {
        let Some(tally) = self.tally.get(&address).copied() else {
            return;
        };
        if tally.votes <= self.signers.len() / 2 {
            return;
        }

        if tally.authorize {
            self.signers.insert(address);
        } else {
            self.signers.remove(&address);
            // A dropped signer's own pending votes no longer count.
            let mut i = 0;
            while i < self.votes.len() {
                if self.votes[i].signer == address {
                    let vote = self.votes.remove(i);
                    self.uncast(vote.address, vote.authorize);
                } else {
                    i += 1;
                }
            }
            // The window shrinks with the signer set.
            let keep = self.recents_window();
            self.recents.retain(|n, _| *n + keep > number);
        }
        debug!(number, %address, authorize = tally.authorize, "vote settled");

        // Either way the proposal is finished.
        self.votes.retain(|v| v.address != address);
        self.tally.remove(&address);
    }

    /// Persist the snapshot under its block hash.
    pub fn store<S: Storage>(&self, db: &S) -> PosvResult<()> {
        let value = serde_json::to_vec(self)?;
        db.put(ColumnFamily::Snapshots, &storage_key(&self.hash), &value)?;
        debug!(number = self.number, hash = %self.hash, "snapshot stored");
        Ok(())
    }

    /// Load a snapshot previously stored under `hash`.
    pub fn load<S: Storage>(db: &S, hash: &B256) -> PosvResult<Option<Snapshot>> {
        let Some(raw) = db.get(ColumnFamily::Snapshots, &storage_key(hash))? else {
            return Ok(None);
        };
        Ok(Some(serde_json::from_slice(&raw)?))
    }
}

fn storage_key(hash: &B256) -> Vec<u8> {
    let mut key = Vec::with_capacity(SNAPSHOT_PREFIX.len() + 32);
    key.extend_from_slice(SNAPSHOT_PREFIX);
    key.extend_from_slice(hash.as_slice());
    key
}
