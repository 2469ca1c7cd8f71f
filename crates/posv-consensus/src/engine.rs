//! The PoSV engine.
//!
//! One [`Posv`] instance per node, shared across verification, sealing and
//! the sync pipeline. All interior state is either immutable configuration
//! or lock-guarded caches; chain access goes through [`ChainReader`] and
//! execution-layer capabilities through [`EngineHooks`].

use crate::chain::ChainReader;
use crate::error::{PosvError, PosvResult};
use crate::hooks::{EngineHooks, RewardReport};
use crate::recover::{self, SignatureCache};
use crate::snapshot::Snapshot;
use crate::{m1m2, penalty, rotation};
use lru::LruCache;
use parking_lot::RwLock;
use posv_primitives::{
    extra, Address, Block, Bytes, ChainConfig, Header, B256, EMPTY_UNCLE_HASH, NONCE_AUTH,
    NONCE_DROP,
};
use posv_storage::Storage;
use rand::Rng;
use secp256k1::SecretKey;
use std::collections::{BTreeSet, HashMap};
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info, instrument, warn};

/// Snapshots kept in memory.
const INMEMORY_SNAPSHOTS: usize = 128;

/// Hashes of headers that already passed verification.
const INMEMORY_VERIFIED: usize = 4096;

/// Installed sealing identity.
#[derive(Clone, Copy)]
struct SealingKey {
    secret: SecretKey,
    address: Address,
}

/// A batch verification in flight. Results arrive in header order, one
/// verdict per input header; a failed header is excluded from the in-batch
/// parent set, so its descendants fail on linkage. Aborting stops further
/// emission.
pub struct BatchVerification {
    abort: Arc<AtomicBool>,
    results: mpsc::Receiver<(u64, PosvResult<()>)>,
}

impl BatchVerification {
    /// Ask the verifying thread to stop after the header it is on.
    pub fn abort(&self) {
        self.abort.store(true, Ordering::Relaxed);
    }

    /// Next `(block number, outcome)` pair, `None` once the batch is done.
    pub fn recv(&self) -> Option<(u64, PosvResult<()>)> {
        self.results.recv().ok()
    }
}

/// Proof-of-Stake-Voting consensus engine.
pub struct Posv<S> {
    config: ChainConfig,
    db: S,
    hooks: Arc<dyn EngineHooks>,
    signatures: SignatureCache,
    snapshots: RwLock<LruCache<B256, Arc<Snapshot>>>,
    verified: RwLock<LruCache<B256, ()>>,
    signer: RwLock<Option<SealingKey>>,
    proposals: RwLock<HashMap<Address, bool>>,
}

impl<S: Storage> Posv<S> {
    /// Create an engine over a snapshot store and the node's hooks.
    pub fn new(config: ChainConfig, db: S, hooks: Arc<dyn EngineHooks>) -> Self {
        let snapshots = NonZeroUsize::new(INMEMORY_SNAPSHOTS).expect("non-zero cache size");
        let verified = NonZeroUsize::new(INMEMORY_VERIFIED).expect("non-zero cache size");
        Self {
            config,
            db,
            hooks,
            signatures: SignatureCache::new(),
            snapshots: RwLock::new(LruCache::new(snapshots)),
            verified: RwLock::new(LruCache::new(verified)),
            signer: RwLock::new(None),
            proposals: RwLock::new(HashMap::new()),
        }
    }

    /// Chain parameters the engine was built with.
    pub fn config(&self) -> &ChainConfig {
        &self.config
    }

    /// Install the local sealing key.
    pub fn authorize(&self, secret: SecretKey) {
        let address = recover::address_of(&secret);
        info!(%address, "sealing key installed");
        *self.signer.write() = Some(SealingKey { secret, address });
    }

    /// Address of the installed sealing key, if any.
    pub fn signer_address(&self) -> Option<Address> {
        self.signer.read().map(|k| k.address)
    }

    /// Queue a governance ballot to be injected into future headers.
    pub fn propose(&self, address: Address, authorize: bool) {
        debug!(%address, authorize, "proposal queued");
        self.proposals.write().insert(address, authorize);
    }

    /// Drop a queued ballot.
    pub fn discard(&self, address: Address) {
        self.proposals.write().remove(&address);
    }

    /// Recover the creator of a sealed header.
    pub fn recover_creator(&self, header: &Header) -> PosvResult<Address> {
        self.signatures.recover_creator(header)
    }

    /// Recover the M2 validator that co-signed a header.
    pub fn recover_validator(&self, header: &Header) -> PosvResult<Address> {
        self.signatures.recover_validator(header)
    }

    /// The authorization snapshot valid for block `number`/`hash`.
    ///
    /// Walks back through memory, then the disk store at gap offsets, down to
    /// the genesis list if it must, then replays the walked headers forward.
    /// `parents` is an optional in-flight chain suffix consulted before the
    /// canonical reader, so batches can verify headers not yet written.
    #[instrument(skip(self, chain, parents))]
    pub fn snapshot(
        &self,
        chain: &dyn ChainReader,
        mut number: u64,
        mut hash: B256,
        parents: &[Header],
    ) -> PosvResult<Arc<Snapshot>> {
        let mut parents = parents;
        let mut pending: Vec<Header> = Vec::new();

        let base = loop {
            if let Some(snap) = self.snapshots.write().get(&hash) {
                break Arc::clone(snap);
            }
            if self.config.is_gap_offset(number) {
                if let Some(snap) = Snapshot::load(&self.db, &hash)? {
                    debug!(number, "snapshot loaded from disk");
                    break Arc::new(snap);
                }
            }
            if number == 0 {
                let genesis = chain
                    .header_by_number(0)
                    .ok_or(PosvError::UnknownBlock { number: 0 })?;
                let signers = extra::decode_masternodes(&genesis.extra)?;
                let snap = Snapshot::new(0, genesis.hash(), signers);
                snap.store(&self.db)?;
                info!(signers = snap.signers.len(), "genesis snapshot created");
                break Arc::new(snap);
            }

            let header = match parents.split_last() {
                Some((last, rest)) if last.hash() == hash && last.number == number => {
                    parents = rest;
                    last.clone()
                }
                _ => chain
                    .header(&hash, number)
                    .ok_or(PosvError::UnknownAncestor { number, hash })?,
            };
            hash = header.parent_hash;
            number -= 1;
            pending.push(header);
        };

        if pending.is_empty() {
            self.snapshots.write().put(base.hash, Arc::clone(&base));
            return Ok(base);
        }

        pending.reverse();
        let replayed = pending.len();
        let recover = |h: &Header| self.signatures.recover_creator(h);
        let snap = Arc::new(base.apply(&pending, &recover, &self.config)?);

        self.snapshots.write().put(snap.hash, Arc::clone(&snap));
        if self.config.is_gap_offset(snap.number) {
            snap.store(&self.db)?;
        }
        debug!(number = snap.number, replayed, "snapshot computed");
        Ok(snap)
    }

    /// Verify a single header against the canonical chain.
    pub fn verify_header(
        &self,
        chain: &dyn ChainReader,
        header: &Header,
        full: bool,
    ) -> PosvResult<()> {
        self.verify_header_with_parents(chain, header, &[], full)
    }

    fn verify_header_with_parents(
        &self,
        chain: &dyn ChainReader,
        header: &Header,
        parents: &[Header],
        full: bool,
    ) -> PosvResult<()> {
        // Accept immediately if this exact header already passed.
        let hash = header.hash();
        if self.verified.write().get(&hash).is_some() {
            return Ok(());
        }

        self.verify_structural(header, full)?;
        if header.number == 0 {
            self.verified.write().put(hash, ());
            return Ok(());
        }

        let parent = self.find_parent(chain, header, parents)?;
        if header.time < parent.time + self.config.period {
            return Err(PosvError::InvalidTimestamp {
                number: header.number,
                time: header.time,
            });
        }

        self.verify_seal_with_parents(chain, header, &parent, parents, full)?;
        self.verified.write().put(hash, ());
        Ok(())
    }

    /// Shape and constant-field checks that need no chain context.
    fn verify_structural(&self, header: &Header, full: bool) -> PosvResult<()> {
        let number = header.number;
        let checkpoint = self.config.is_checkpoint(number);

        if full && header.time > unix_now() {
            return Err(PosvError::FutureBlock { number });
        }
        if header.nonce != NONCE_AUTH && header.nonce != NONCE_DROP {
            return Err(PosvError::InvalidVote);
        }
        if checkpoint {
            if header.nonce != NONCE_DROP {
                return Err(PosvError::InvalidCheckpointVote);
            }
            if header.coinbase != Address::ZERO {
                return Err(PosvError::InvalidCheckpointBeneficiary);
            }
        }
        extra::check_shape(&header.extra, checkpoint)?;
        if header.mix_digest != B256::ZERO {
            return Err(PosvError::InvalidMixDigest);
        }
        if header.uncle_hash != EMPTY_UNCLE_HASH {
            return Err(PosvError::InvalidUncleHash);
        }
        Ok(())
    }

    /// Authorization, rotation and double-validation checks.
    pub fn verify_seal(
        &self,
        chain: &dyn ChainReader,
        header: &Header,
        full: bool,
    ) -> PosvResult<()> {
        // Genesis carries no seal to verify and has no parent to resolve.
        if header.number == 0 {
            return Err(PosvError::UnknownBlock { number: 0 });
        }
        let parent = self.find_parent(chain, header, &[])?;
        self.verify_seal_with_parents(chain, header, &parent, &[], full)
    }

    fn verify_seal_with_parents(
        &self,
        chain: &dyn ChainReader,
        header: &Header,
        parent: &Header,
        parents: &[Header],
        full: bool,
    ) -> PosvResult<()> {
        let number = header.number;
        if number == 0 {
            return Err(PosvError::UnknownBlock { number });
        }

        let snap = self.snapshot(chain, number - 1, header.parent_hash, parents)?;
        let creator = self.signatures.recover_creator(header)?;

        // The snapshot signers are authoritative; a creator absent from a
        // stale snapshot gets one chance against the live contract list.
        let masternodes = if snap.signers.contains(&creator) {
            snap.signer_list()
        } else {
            let contract = self.hooks.signers_from_contract(&header.parent_hash)?;
            if !contract.contains(&creator) {
                return Err(PosvError::Unauthorized { number, creator });
            }
            warn!(number, %creator, "creator missing from snapshot, contract list accepted");
            contract
        };
        let checkpoint = self.config.is_checkpoint(number);
        if !checkpoint && snap.signed_recently(creator) {
            return Err(PosvError::RecentlySigned { number, creator });
        }
        let prev_creator = if parent.number == 0 {
            None
        } else {
            Some(self.signatures.recover_creator(parent)?)
        };
        let turn = rotation::your_turn(&masternodes, prev_creator, creator);
        let expected = rotation::calc_difficulty(turn.len, turn.prev_index, turn.cur_index);
        if header.difficulty != expected {
            return Err(PosvError::InvalidDifficulty {
                number,
                got: header.difficulty,
                expected,
            });
        }

        if checkpoint {
            self.verify_checkpoint_lists(chain, header, &snap)?;
        }
        if full && number > self.config.epoch {
            self.verify_double_validation(chain, header, parents, creator)?;
        }
        Ok(())
    }

    /// Recompute the masternode and penalty lists a checkpoint must carry.
    ///
    /// The snapshot-derived signer set (minus penalized addresses) is
    /// authoritative; when it disagrees with the embedded list, the registry
    /// contract is consulted once before the checkpoint is rejected.
    fn verify_checkpoint_lists(
        &self,
        chain: &dyn ChainReader,
        header: &Header,
        snap: &Snapshot,
    ) -> PosvResult<()> {
        let number = header.number;
        let embedded = extra::decode_masternodes(&header.extra)?;
        let embedded_set: BTreeSet<Address> = embedded.iter().copied().collect();

        let candidates = snap.signer_list();
        let fresh = penalty::current_penalties(chain, self.hooks.as_ref(), header, &candidates)?;
        let barred = penalty::barred_addresses(chain, number, &fresh)?;
        let expected: BTreeSet<Address> = penalty::remove_barred(&candidates, &barred)
            .into_iter()
            .collect();

        // One-off compatibility shim for a historical checkpoint accepted
        // with a mismatched signer list. Penalty and validator checks below
        // still apply.
        let shim = self.config.ignore_signer_check_block;
        if shim != 0 && number == shim {
            warn!(number, "checkpoint signer comparison skipped by configuration");
        } else if embedded_set != expected {
            let contract = self.hooks.signers_from_contract(&header.parent_hash)?;
            let retry: BTreeSet<Address> = penalty::remove_barred(&contract, &barred)
                .into_iter()
                .collect();
            if embedded_set != retry {
                warn!(
                    number,
                    embedded = embedded.len(),
                    expected = expected.len(),
                    "checkpoint signer list mismatch"
                );
                return Err(PosvError::InvalidCheckpointSigners(number));
            }
            debug!(number, "checkpoint signer list accepted via contract fallback");
        }
        if header.penalties.as_ref() != extra::pack_addresses(&fresh) {
            return Err(PosvError::InvalidCheckpointPenalties(number));
        }
        self.hooks.verify_masternodes(header, &embedded)?;
        Ok(())
    }

    /// Check that the header's second signature came from the M2 assigned to
    /// its creator for this point of the epoch.
    fn verify_double_validation(
        &self,
        chain: &dyn ChainReader,
        header: &Header,
        parents: &[Header],
        creator: Address,
    ) -> PosvResult<()> {
        let number = header.number;
        let validator = self.signatures.recover_validator(header)?;

        let cp_number = self.config.rotation_checkpoint(number - 1);
        let cp = parents
            .iter()
            .rev()
            .find(|h| h.number == cp_number)
            .cloned()
            .or_else(|| chain.header_by_number(cp_number))
            .ok_or(PosvError::UnknownBlock { number: cp_number })?;

        let masternodes = extra::decode_masternodes(&cp.extra)?;
        let seeds = m1m2::decode_validator_seeds(&cp.validators)?;
        let assignment = m1m2::assign_m2(&masternodes, &seeds, &self.config, number)?;

        let expected = assignment
            .get(&creator)
            .copied()
            .ok_or(PosvError::Unauthorized { number, creator })?;
        if validator != expected {
            return Err(PosvError::InvalidCreatorValidatorPair {
                number,
                got: validator,
                expected,
            });
        }
        Ok(())
    }

    /// Verify a parent-linked run of headers on a worker thread, with one
    /// full-verification flag per header (missing flags default to full).
    pub fn verify_headers(
        self: &Arc<Self>,
        chain: Arc<dyn ChainReader>,
        headers: Vec<Header>,
        full: Vec<bool>,
    ) -> BatchVerification
    where
        S: 'static,
    {
        let abort = Arc::new(AtomicBool::new(false));
        let (tx, rx) = mpsc::sync_channel(headers.len().max(1));

        let engine = Arc::clone(self);
        let flag = Arc::clone(&abort);
        thread::spawn(move || {
            let mut verified: Vec<Header> = Vec::new();
            for (i, header) in headers.into_iter().enumerate() {
                if flag.load(Ordering::Relaxed) {
                    debug!(number = header.number, "batch verification aborted");
                    break;
                }
                let deep = full.get(i).copied().unwrap_or(true);
                let result =
                    engine.verify_header_with_parents(chain.as_ref(), &header, &verified, deep);
                let ok = result.is_ok();
                if tx.send((header.number, result)).is_err() {
                    break;
                }
                if ok {
                    verified.push(header);
                }
            }
        });

        BatchVerification { abort, results: rx }
    }

    /// Fill in the consensus fields of a header about to be sealed.
    #[instrument(skip_all, fields(number = header.number))]
    pub fn prepare(&self, chain: &dyn ChainReader, header: &mut Header) -> PosvResult<()> {
        let number = header.number;
        if number == 0 {
            return Err(PosvError::SealGenesis);
        }
        let signer = self
            .signer
            .read()
            .map(|k| k.address)
            .ok_or(PosvError::NoSigner)?;
        let parent = self.find_parent(chain, header, &[])?;
        let snap = self.snapshot(chain, number - 1, header.parent_hash, &[])?;
        let checkpoint = self.config.is_checkpoint(number);

        header.coinbase = Address::ZERO;
        header.nonce = NONCE_DROP;
        if !checkpoint {
            let proposals = self.proposals.read();
            let open: Vec<(Address, bool)> = proposals
                .iter()
                .filter(|(address, authorize)| snap.valid_vote(**address, **authorize))
                .map(|(address, authorize)| (*address, *authorize))
                .collect();
            if !open.is_empty() {
                let (address, authorize) = open[rand::thread_rng().gen_range(0..open.len())];
                header.coinbase = address;
                header.nonce = if authorize { NONCE_AUTH } else { NONCE_DROP };
            }
        }

        let masternodes = snap.signer_list();
        let prev_creator = if parent.number == 0 {
            None
        } else {
            Some(self.signatures.recover_creator(&parent)?)
        };
        let turn = rotation::your_turn(&masternodes, prev_creator, signer);
        if turn.cur_index < 0 {
            return Err(PosvError::NotAuthorizedToSeal);
        }
        header.difficulty = rotation::calc_difficulty(turn.len, turn.prev_index, turn.cur_index);

        let vanity: Vec<u8> = header.extra.iter().copied().take(extra::EXTRA_VANITY).collect();
        if checkpoint {
            let candidates = self.hooks.signers_from_contract(&header.parent_hash)?;
            let fresh =
                penalty::current_penalties(chain, self.hooks.as_ref(), header, &candidates)?;
            let barred = penalty::barred_addresses(chain, number, &fresh)?;
            let next_set = penalty::remove_barred(&candidates, &barred);

            header.penalties = extra::pack_addresses(&fresh).into();
            header.extra = extra::encode_extra(&vanity, &next_set).into();
            header.validators = self.hooks.validator_bytes(header, &next_set)?.into();
        } else {
            header.penalties = Bytes::new();
            header.validators = Bytes::new();
            header.extra = extra::encode_extra(&vanity, &[]).into();
        }

        header.mix_digest = B256::ZERO;
        header.uncle_hash = EMPTY_UNCLE_HASH;
        header.time = (parent.time + self.config.period).max(unix_now());
        Ok(())
    }

    /// Seal a prepared block with the installed key.
    ///
    /// Returns `Ok(None)` when the attempt was abandoned through `stop`: a
    /// signer inside its anti-consecutive window does not produce and does
    /// not self-delay; it parks on the stop signal until the caller gives up
    /// on this height.
    pub fn seal(
        &self,
        chain: &dyn ChainReader,
        block: &Block,
        stop: &mpsc::Receiver<()>,
    ) -> PosvResult<Option<Header>> {
        let mut header = block.header.clone();
        let number = header.number;
        if number == 0 {
            return Err(PosvError::SealGenesis);
        }
        if self.config.period == 0 && block.transactions.is_empty() {
            return Err(PosvError::WaitingForTransactions);
        }
        let key = self.signer.read().ok_or(PosvError::NoSigner)?;

        let snap = self.snapshot(chain, number - 1, header.parent_hash, &[])?;
        if !snap.signers.contains(&key.address) {
            return Err(PosvError::NotAuthorizedToSeal);
        }
        if snap.signers.len() > 1
            && !self.config.is_checkpoint(number)
            && snap.signed_recently(key.address)
        {
            debug!(number, creator = %key.address, "inside anti-consecutive window, parking");
            let _ = stop.recv();
            return Ok(None);
        }

        let sig = recover::sign_digest(&key.secret, header.seal_hash()?);
        let mut raw = header.extra.to_vec();
        let tail = raw.len() - extra::EXTRA_SEAL;
        raw[tail..].copy_from_slice(&sig);
        header.extra = raw.into();

        // If this node happens to be the assigned M2 for its own block, the
        // second signature can be attached right away.
        if let Some(expected) = self.assigned_m2(chain, &header, key.address) {
            if expected == key.address {
                header.validator = recover::sign_digest(&key.secret, header.hash())
                    .to_vec()
                    .into();
            }
        }

        info!(number, creator = %key.address, difficulty = header.difficulty, "block sealed");
        Ok(Some(header))
    }

    /// The M2 assigned to `creator` at this header's height, if the governing
    /// checkpoint is available and decodes.
    fn assigned_m2(
        &self,
        chain: &dyn ChainReader,
        header: &Header,
        creator: Address,
    ) -> Option<Address> {
        let number = header.number;
        if number <= self.config.epoch {
            return None;
        }
        let cp = chain.header_by_number(self.config.rotation_checkpoint(number - 1))?;
        let masternodes = extra::decode_masternodes(&cp.extra).ok()?;
        let seeds = m1m2::decode_validator_seeds(&cp.validators).ok()?;
        let assignment = m1m2::assign_m2(&masternodes, &seeds, &self.config, number).ok()?;
        assignment.get(&creator).copied()
    }

    /// Co-sign a sealed header as its assigned M2 validator. The caller wires
    /// the returned signature into the header's `validator` field.
    pub fn sign_as_validator(&self, header: &Header) -> PosvResult<[u8; 65]> {
        let key = self.signer.read().ok_or(PosvError::NoSigner)?;
        Ok(recover::sign_digest(&key.secret, header.hash()))
    }

    /// Difficulty the installed signer would claim for a child of `parent`.
    pub fn calc_difficulty(&self, chain: &dyn ChainReader, parent: &Header) -> PosvResult<u64> {
        let signer = self
            .signer
            .read()
            .map(|k| k.address)
            .ok_or(PosvError::NoSigner)?;
        let snap = self.snapshot(chain, parent.number, parent.hash(), &[])?;
        let masternodes = snap.signer_list();
        let prev_creator = if parent.number == 0 {
            None
        } else {
            Some(self.signatures.recover_creator(parent)?)
        };
        let turn = rotation::your_turn(&masternodes, prev_creator, signer);
        if turn.cur_index < 0 {
            return Err(PosvError::NotAuthorizedToSeal);
        }
        Ok(rotation::calc_difficulty(
            turn.len,
            turn.prev_index,
            turn.cur_index,
        ))
    }

    /// Run end-of-block accounting: the reward hook fires on reward
    /// checkpoints, everything else is a no-op.
    pub fn finalize(&self, chain: &dyn ChainReader, header: &Header) -> PosvResult<RewardReport> {
        if header.number > 0 && self.config.is_reward_checkpoint(header.number) {
            let report = self.hooks.reward(chain, header)?;
            info!(
                number = header.number,
                recipients = report.rewards.len(),
                "block rewards distributed"
            );
            return Ok(report);
        }
        Ok(RewardReport::default())
    }

    fn find_parent(
        &self,
        chain: &dyn ChainReader,
        header: &Header,
        parents: &[Header],
    ) -> PosvResult<Header> {
        let number = header.number;
        if let Some(last) = parents.last() {
            if last.hash() == header.parent_hash && last.number + 1 == number {
                return Ok(last.clone());
            }
        }
        chain
            .header(&header.parent_hash, number - 1)
            .filter(|p| p.hash() == header.parent_hash)
            .ok_or(PosvError::UnknownAncestor {
                number,
                hash: header.parent_hash,
            })
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
