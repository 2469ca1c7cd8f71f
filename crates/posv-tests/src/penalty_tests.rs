//! Penalty suite: epoch exclusion and the comeback window.

use crate::harness::TestNet;
use posv_primitives::extra;

#[test]
fn test_penalized_masternode_recorded_and_excluded() {
    let net = TestNet::new(3);
    let victim = net.signers()[2];

    net.hooks.set_penalties(vec![victim]);
    net.extend(9);

    let checkpoint = net.header(9);
    assert_eq!(
        extra::unpack_addresses(&checkpoint.penalties).unwrap(),
        vec![victim]
    );
    let committed = extra::decode_masternodes(&checkpoint.extra).unwrap();
    assert!(!committed.contains(&victim));
    assert_eq!(committed.len(), 2);

    // The next epoch runs on the reduced set.
    let snap = net
        .engine
        .snapshot(net.chain.as_ref(), 9, checkpoint.hash(), &[])
        .unwrap();
    assert!(!snap.signers.contains(&victim));
}

#[test]
fn test_comeback_window_spans_limit_penalty_epochs() {
    // limit_penalty_epoch = 2: a penalty recorded at checkpoint 9 keeps the
    // masternode out of checkpoints 18 and 27, and it returns at 36.
    let net = TestNet::new(3);
    let victim = net.signers()[2];

    net.hooks.set_penalties(vec![victim]);
    net.extend(9);
    net.hooks.set_penalties(Vec::new());

    net.extend(9);
    let cp18 = extra::decode_masternodes(&net.header(18).extra).unwrap();
    assert!(!cp18.contains(&victim));
    assert!(net.header(18).penalties.is_empty());

    net.extend(9);
    let cp27 = extra::decode_masternodes(&net.header(27).extra).unwrap();
    assert!(!cp27.contains(&victim));

    net.extend(9);
    let cp36 = extra::decode_masternodes(&net.header(36).extra).unwrap();
    assert!(cp36.contains(&victim));
    assert_eq!(cp36, net.signers());
}

#[test]
fn test_penalized_chain_still_verifies() {
    let net = TestNet::new(4);
    let victim = net.signers()[3];

    // Keep the scripted scan result in place so verification recomputes the
    // same penalty list the checkpoint was built with.
    net.hooks.set_penalties(vec![victim]);
    net.extend(14);

    for number in 1..=14 {
        let header = net.header(number);
        net.engine
            .verify_header(net.chain.as_ref(), &header, true)
            .unwrap_or_else(|e| panic!("block {number} rejected: {e}"));
    }
}
