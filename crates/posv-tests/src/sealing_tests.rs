//! Block production suite: prepare, seal, governance ballots and rewards.

use crate::harness::{test_config, TestNet, TEST_VANITY};
use posv_consensus::PosvError;
use posv_primitives::{extra, Address, Block, B256, B64, NONCE_AUTH, NONCE_DROP};

#[test]
fn test_prepare_fills_consensus_fields() {
    let net = TestNet::new(3);
    let parent = net.chain.head();
    let signer = net.in_turn_signer(&parent);
    let header = net.build_block(signer);

    assert_eq!(header.number, 1);
    assert_eq!(header.difficulty, 3);
    assert_eq!(header.nonce, NONCE_DROP);
    assert_eq!(header.coinbase, Address::ZERO);
    assert_eq!(header.mix_digest, B256::ZERO);
    assert_eq!(
        header.extra.len(),
        extra::EXTRA_VANITY + extra::EXTRA_SEAL
    );
    assert!(header.time >= parent.time + net.config.period);
}

#[test]
fn test_sealed_creator_is_recoverable() {
    let net = TestNet::new(3);
    let signer = net.in_turn_signer(&net.chain.head());
    let header = net.build_block(signer);
    assert_eq!(net.engine.recover_creator(&header).unwrap(), signer);
}

#[test]
fn test_prepare_injects_queued_ballot() {
    let net = TestNet::new(3);
    let candidate = Address::repeat_byte(0x42);
    net.engine.propose(candidate, true);

    let signer = net.in_turn_signer(&net.chain.head());
    let header = net.build_block(signer);
    assert_eq!(header.coinbase, candidate);
    assert_eq!(header.nonce, NONCE_AUTH);

    // Discarded ballots stop appearing.
    net.chain.insert(header);
    net.engine.discard(candidate);
    let next = net.build_block(net.in_turn_signer(&net.chain.head()));
    assert_eq!(next.coinbase, Address::ZERO);
}

#[test]
fn test_ballot_majority_authorizes_signer() {
    let net = TestNet::new(3);
    let candidate = Address::repeat_byte(0x42);
    net.engine.propose(candidate, true);

    // Two of three creators vote; a strict majority settles the proposal.
    net.extend(2);
    let head = net.chain.head();
    let snap = net
        .engine
        .snapshot(net.chain.as_ref(), head.number, head.hash(), &[])
        .unwrap();
    assert!(snap.signers.contains(&candidate));
    assert_eq!(snap.signers.len(), 4);
}

#[test]
fn test_checkpoint_embeds_masternode_list_and_seeds() {
    let net = TestNet::new(3);
    net.extend(8);
    let checkpoint = net.build_block(net.in_turn_signer(&net.chain.head()));

    assert_eq!(checkpoint.number, 9);
    assert_eq!(checkpoint.nonce, NONCE_DROP);
    assert_eq!(checkpoint.coinbase, Address::ZERO);
    assert_eq!(
        extra::decode_masternodes(&checkpoint.extra).unwrap(),
        net.signers()
    );
    assert!(checkpoint.penalties.is_empty());
    assert_eq!(checkpoint.validators.len(), 4 * net.signers().len());

    net.engine
        .verify_header(net.chain.as_ref(), &checkpoint, true)
        .unwrap();
}

#[test]
fn test_seal_requires_authorized_key() {
    let net = TestNet::new(3);
    net.engine.authorize(crate::generators::test_key(9));

    let mut header = posv_primitives::Header {
        number: 1,
        parent_hash: net.chain.head().hash(),
        extra: extra::encode_extra(TEST_VANITY, &[]).into(),
        ..Default::default()
    };
    // An outsider cannot even prepare: it holds no rotation position.
    assert!(matches!(
        net.engine.prepare(net.chain.as_ref(), &mut header),
        Err(PosvError::NotAuthorizedToSeal)
    ));
}

#[test]
fn test_seal_parks_on_consecutive_production() {
    let net = TestNet::new(4);
    net.extend(1);
    let repeat = net.engine.recover_creator(&net.header(1)).unwrap();

    net.engine.authorize(net.secret(repeat));
    let mut header = posv_primitives::Header {
        number: 2,
        parent_hash: net.chain.head().hash(),
        extra: extra::encode_extra(TEST_VANITY, &[]).into(),
        ..Default::default()
    };
    net.engine.prepare(net.chain.as_ref(), &mut header).unwrap();
    let block = Block {
        header,
        transactions: vec![B256::ZERO],
    };
    // A recently-signed producer parks until the stop signal fires; with the
    // sender already dropped it returns immediately without a header.
    let (stop_tx, stop_rx) = std::sync::mpsc::channel::<()>();
    drop(stop_tx);
    assert!(matches!(
        net.engine.seal(net.chain.as_ref(), &block, &stop_rx),
        Ok(None)
    ));
}

#[test]
fn test_zero_period_chain_waits_for_transactions() {
    let mut config = test_config();
    config.period = 0;
    let net = TestNet::with_config(3, config);

    let block = Block {
        header: posv_primitives::Header {
            number: 1,
            ..Default::default()
        },
        transactions: Vec::new(),
    };
    let (_stop_tx, stop_rx) = std::sync::mpsc::channel::<()>();
    assert!(matches!(
        net.engine.seal(net.chain.as_ref(), &block, &stop_rx),
        Err(PosvError::WaitingForTransactions)
    ));
}

#[test]
fn test_nonce_markers_have_expected_encoding() {
    assert_eq!(NONCE_AUTH, B64::new([0xff; 8]));
    assert_eq!(NONCE_DROP, B64::new([0x00; 8]));
}

#[test]
fn test_reward_hook_fires_on_reward_checkpoint() {
    let net = TestNet::new(3);
    net.extend(9);

    let report = net
        .engine
        .finalize(net.chain.as_ref(), &net.header(9))
        .unwrap();
    assert_eq!(report.rewards.len(), 3);

    let none = net
        .engine
        .finalize(net.chain.as_ref(), &net.header(5))
        .unwrap();
    assert!(none.rewards.is_empty());
}
