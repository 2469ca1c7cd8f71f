//! Test harness.
//!
//! Runs a deterministic in-process masternode network: a [`TestChain`]
//! backing store for headers, [`TestHooks`] standing in for the registry
//! contract and reward/penalty machinery, and a [`TestNet`] that drives the
//! real engine through prepare, seal and double-validation to grow a chain
//! every verifier must accept.

use crate::generators::test_keys;
use parking_lot::RwLock;
use posv_consensus::{
    address_of, m1m2, sign_digest, ChainReader, EngineHooks, Posv, PosvError, PosvResult,
    RewardReport,
};
use posv_primitives::{extra, Address, Block, ChainConfig, Header, B256, U256};
use posv_storage::{Database, MemoryStorage};
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;

/// Genesis timestamp used by every test network; far enough in the past that
/// long test chains at 2-second spacing never look like future blocks.
pub const GENESIS_TIME: u64 = 1_700_000_000;

/// Vanity prefix fixed fixtures carry.
pub const TEST_VANITY: &[u8] = b"posv-testnet";

/// Engine type every test drives.
pub type TestEngine = Posv<Arc<MemoryStorage>>;

/// Chain geometry small enough to cross several epochs per test.
pub fn test_config() -> ChainConfig {
    ChainConfig {
        epoch: 9,
        gap: 3,
        period: 2,
        reward_checkpoint: 9,
        limit_penalty_epoch: 2,
        ..Default::default()
    }
}

/// Test database wrapper that cleans up on drop.
pub struct TestDatabase {
    db: Database,
    _temp_dir: TempDir,
}

impl TestDatabase {
    /// Create a new on-disk database in a temporary directory.
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let db = Database::open(temp_dir.path()).expect("Failed to open database");
        Self {
            db,
            _temp_dir: temp_dir,
        }
    }

    /// Path of the underlying database directory.
    pub fn path(&self) -> PathBuf {
        self._temp_dir.path().to_path_buf()
    }

    /// Reference to the database.
    pub fn db(&self) -> &Database {
        &self.db
    }
}

impl Default for TestDatabase {
    fn default() -> Self {
        Self::new()
    }
}

impl std::ops::Deref for TestDatabase {
    type Target = Database;

    fn deref(&self) -> &Self::Target {
        &self.db
    }
}

/// In-memory header chain implementing [`ChainReader`].
pub struct TestChain {
    config: ChainConfig,
    headers: RwLock<HashMap<B256, Header>>,
    canonical: RwLock<BTreeMap<u64, B256>>,
}

impl TestChain {
    /// Chain seeded with a genesis header.
    pub fn new(config: ChainConfig, genesis: Header) -> Self {
        let chain = Self {
            config,
            headers: RwLock::new(HashMap::new()),
            canonical: RwLock::new(BTreeMap::new()),
        };
        chain.insert(genesis);
        chain
    }

    /// Insert a header as the new canonical tip for its number.
    pub fn insert(&self, header: Header) {
        let hash = header.hash();
        self.canonical.write().insert(header.number, hash);
        self.headers.write().insert(hash, header);
    }

    /// Current canonical head. Panics on an empty chain.
    pub fn head(&self) -> Header {
        self.current_header().expect("chain has a genesis")
    }
}

impl ChainReader for TestChain {
    fn config(&self) -> &ChainConfig {
        &self.config
    }

    fn header(&self, hash: &B256, number: u64) -> Option<Header> {
        self.headers
            .read()
            .get(hash)
            .filter(|h| h.number == number)
            .cloned()
    }

    fn header_by_number(&self, number: u64) -> Option<Header> {
        let hash = *self.canonical.read().get(&number)?;
        self.headers.read().get(&hash).cloned()
    }

    fn current_header(&self) -> Option<Header> {
        let canonical = self.canonical.read();
        let (_, hash) = canonical.iter().next_back()?;
        self.headers.read().get(hash).cloned()
    }
}

/// Scriptable stand-in for the registry contract and reward machinery.
///
/// Seeds are `position + 1`, so with a zero M2 shift a creator is never its
/// own validator.
pub struct TestHooks {
    candidates: RwLock<Vec<Address>>,
    penalties: RwLock<Vec<Address>>,
}

impl TestHooks {
    /// Hooks reporting the given contract candidate list and no penalties.
    pub fn new(candidates: Vec<Address>) -> Self {
        Self {
            candidates: RwLock::new(candidates),
            penalties: RwLock::new(Vec::new()),
        }
    }

    /// Replace the contract candidate list.
    pub fn set_candidates(&self, candidates: Vec<Address>) {
        *self.candidates.write() = candidates;
    }

    /// Script the penalties the next epoch scan reports.
    pub fn set_penalties(&self, penalties: Vec<Address>) {
        *self.penalties.write() = penalties;
    }

    fn seeds_for(signers: &[Address]) -> Vec<u64> {
        (0..signers.len() as u64).map(|i| i + 1).collect()
    }
}

impl EngineHooks for TestHooks {
    fn reward(&self, _chain: &dyn ChainReader, _header: &Header) -> PosvResult<RewardReport> {
        let mut rewards = BTreeMap::new();
        for candidate in self.candidates.read().iter() {
            rewards.insert(*candidate, U256::from(1u64));
        }
        Ok(RewardReport { rewards })
    }

    fn penalty(&self, _chain: &dyn ChainReader, _epoch_boundary: u64) -> PosvResult<Vec<Address>> {
        Ok(self.penalties.read().clone())
    }

    fn penalty_tip_signing(
        &self,
        _chain: &dyn ChainReader,
        _header: &Header,
        _candidates: &[Address],
    ) -> PosvResult<Vec<Address>> {
        Ok(self.penalties.read().clone())
    }

    fn validator_bytes(&self, _header: &Header, signers: &[Address]) -> PosvResult<Vec<u8>> {
        Ok(m1m2::encode_validator_seeds(&Self::seeds_for(signers)))
    }

    fn verify_masternodes(&self, header: &Header, signers: &[Address]) -> PosvResult<()> {
        let seeds = m1m2::decode_validator_seeds(&header.validators)?;
        if seeds.len() < signers.len() {
            return Err(PosvError::HookFailed {
                hook: "verify_masternodes",
                reason: format!("{} seeds for {} signers", seeds.len(), signers.len()),
            });
        }
        Ok(())
    }

    fn signers_from_contract(&self, _block_hash: &B256) -> PosvResult<Vec<Address>> {
        Ok(self.candidates.read().clone())
    }
}

/// A deterministic single-process masternode network.
pub struct TestNet {
    /// Chain geometry shared by chain, hooks and engine.
    pub config: ChainConfig,
    /// Secret keys by address, in rotation order.
    pub keys: BTreeMap<Address, secp256k1::SecretKey>,
    /// Canonical header store.
    pub chain: Arc<TestChain>,
    /// Scriptable contract stand-in.
    pub hooks: Arc<TestHooks>,
    /// Snapshot store shared with the engine for inspection.
    pub db: Arc<MemoryStorage>,
    /// The engine under test.
    pub engine: Arc<TestEngine>,
}

impl TestNet {
    /// Network of `n` masternodes with the default test geometry.
    pub fn new(n: usize) -> Self {
        Self::with_config(n, test_config())
    }

    /// Network of `n` masternodes with explicit chain parameters.
    pub fn with_config(n: usize, config: ChainConfig) -> Self {
        let keys: BTreeMap<Address, secp256k1::SecretKey> = test_keys(n)
            .into_iter()
            .map(|k| (address_of(&k), k))
            .collect();
        let signers: Vec<Address> = keys.keys().copied().collect();

        let genesis = Header {
            number: 0,
            time: GENESIS_TIME,
            extra: extra::encode_extra(TEST_VANITY, &signers).into(),
            validators: m1m2::encode_validator_seeds(&TestHooks::seeds_for(&signers)).into(),
            ..Default::default()
        };

        let chain = Arc::new(TestChain::new(config.clone(), genesis));
        let hooks = Arc::new(TestHooks::new(signers));
        let db = Arc::new(MemoryStorage::new());
        let engine = Arc::new(Posv::new(
            config.clone(),
            Arc::clone(&db),
            Arc::clone(&hooks) as Arc<dyn EngineHooks>,
        ));

        Self {
            config,
            keys,
            chain,
            hooks,
            db,
            engine,
        }
    }

    /// Masternode addresses in rotation order.
    pub fn signers(&self) -> Vec<Address> {
        self.keys.keys().copied().collect()
    }

    /// Secret key of a masternode.
    pub fn secret(&self, address: Address) -> secp256k1::SecretKey {
        self.keys[&address]
    }

    /// The in-turn producer for the child of `parent`.
    pub fn in_turn_signer(&self, parent: &Header) -> Address {
        let snap = self
            .engine
            .snapshot(self.chain.as_ref(), parent.number, parent.hash(), &[])
            .expect("snapshot");
        let masternodes = snap.signer_list();
        let next = if parent.number == 0 {
            0
        } else {
            let prev = self.engine.recover_creator(parent).expect("parent creator");
            masternodes
                .iter()
                .position(|a| *a == prev)
                .map_or(0, |p| (p + 1) % masternodes.len())
        };
        masternodes[next]
    }

    /// Build a fully sealed child of the current head, created by `signer`,
    /// with the M2 signature attached where required. Does not insert it.
    pub fn build_block(&self, signer: Address) -> Header {
        let parent = self.chain.head();
        self.engine.authorize(self.secret(signer));

        let mut header = Header {
            number: parent.number + 1,
            parent_hash: parent.hash(),
            extra: extra::encode_extra(TEST_VANITY, &[]).into(),
            ..Default::default()
        };
        self.engine
            .prepare(self.chain.as_ref(), &mut header)
            .expect("prepare");
        // Deterministic spacing instead of the wall clock.
        header.time = parent.time + self.config.period;

        let block = Block {
            header,
            transactions: vec![B256::ZERO],
        };
        let (_stop_tx, stop_rx) = std::sync::mpsc::channel::<()>();
        let sealed = self
            .engine
            .seal(self.chain.as_ref(), &block, &stop_rx)
            .expect("seal")
            .expect("sealed header");
        self.attach_validator(sealed)
    }

    /// Sign a sealed header with its assigned M2 validator, once the chain is
    /// past the first epoch.
    pub fn attach_validator(&self, mut header: Header) -> Header {
        if header.number <= self.config.epoch {
            return header;
        }
        let m2 = self.assigned_validator(&header);
        header.validator = sign_digest(&self.secret(m2), header.hash()).to_vec().into();
        header
    }

    /// The M2 assigned to the creator of `header`.
    pub fn assigned_validator(&self, header: &Header) -> Address {
        let cp_number = self.config.rotation_checkpoint(header.number - 1);
        let cp = self
            .chain
            .header_by_number(cp_number)
            .expect("governing checkpoint");
        let masternodes = extra::decode_masternodes(&cp.extra).expect("checkpoint masternodes");
        let seeds = m1m2::decode_validator_seeds(&cp.validators).expect("checkpoint seeds");
        let assignment =
            m1m2::assign_m2(&masternodes, &seeds, &self.config, header.number).expect("assignment");
        let creator = self.engine.recover_creator(header).expect("creator");
        assignment[&creator]
    }

    /// Grow the canonical chain by `count` in-turn blocks.
    pub fn extend(&self, count: usize) {
        for _ in 0..count {
            let parent = self.chain.head();
            let signer = self.in_turn_signer(&parent);
            let header = self.build_block(signer);
            self.chain.insert(header);
        }
    }

    /// Canonical header at `number`. Panics if missing.
    pub fn header(&self, number: u64) -> Header {
        self.chain
            .header_by_number(number)
            .expect("canonical header")
    }
}
