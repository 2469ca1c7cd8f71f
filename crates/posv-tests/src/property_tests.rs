//! Property-style suites over randomized producer schedules.

use crate::harness::TestNet;
use posv_consensus::m1m2;
use posv_primitives::Address;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

#[test]
fn test_in_turn_chain_claims_maximum_weight() {
    let net = TestNet::new(4);
    net.extend(12);
    for number in 1..=12 {
        assert_eq!(net.header(number).difficulty, 4);
    }
}

#[test]
fn test_random_schedule_respects_recents_bound() {
    let net = TestNet::new(5);
    let mut rng = StdRng::seed_from_u64(7);

    for _ in 0..30 {
        let head = net.chain.head();
        let snap = net
            .engine
            .snapshot(net.chain.as_ref(), head.number, head.hash(), &[])
            .unwrap();

        // Any non-recent signer may produce; checkpoints free everyone.
        let eligible: Vec<Address> = if net.config.is_checkpoint(head.number + 1) {
            snap.signer_list()
        } else {
            snap.signer_list()
                .into_iter()
                .filter(|s| !snap.signed_recently(*s))
                .collect()
        };
        assert!(!eligible.is_empty());

        let producer = eligible[rng.gen_range(0..eligible.len())];
        let header = net.build_block(producer);
        assert!((1..=snap.signers.len() as u64).contains(&header.difficulty));
        net.engine
            .verify_header(net.chain.as_ref(), &header, true)
            .unwrap_or_else(|e| panic!("block {} rejected: {e}", header.number));
        net.chain.insert(header);
    }

    let head = net.chain.head();
    let snap = net
        .engine
        .snapshot(net.chain.as_ref(), head.number, head.hash(), &[])
        .unwrap();
    assert!(snap.recents.len() <= snap.signers.len() / 2);
}

#[test]
fn test_random_seed_codec_roundtrip() {
    let mut rng = StdRng::seed_from_u64(11);
    for _ in 0..50 {
        let seeds: Vec<u64> = (0..rng.gen_range(1..20))
            .map(|_| rng.gen_range(0..10_000))
            .collect();
        let packed = m1m2::encode_validator_seeds(&seeds);
        assert_eq!(m1m2::decode_validator_seeds(&packed).unwrap(), seeds);
    }
}

#[test]
fn test_every_creator_has_an_assigned_validator() {
    let net = TestNet::new(4);
    net.extend(15);
    for number in 10..=15 {
        let header = net.header(number);
        let creator = net.engine.recover_creator(&header).unwrap();
        let validator = net.engine.recover_validator(&header).unwrap();
        assert_eq!(validator, net.assigned_validator(&header));
        assert!(net.signers().contains(&creator));
        assert!(net.signers().contains(&validator));
    }
}
