use super::tools;
use crate::error::ChainError;
use crate::validation::{
    SKIP_BLOCK_SIZE_CHECK, SKIP_NOTHING, SKIP_PRODUCER_SCHEDULE_CHECK, SKIP_PRODUCER_SIGNATURE,
};
use crypto::hash::Hash;
use models::BlockchainConfiguration;

#[test]
fn test_bad_producer_signature_rejected() {
    let keys = tools::generate_keys(21);
    let mut chain = tools::new_chain(&keys, 21);
    let producer = chain.controller.get_scheduled_producer(1).unwrap();
    let when = chain.controller.get_slot_time(1).unwrap();
    let wrong_key = crypto::generate_random_private_key();
    let block = tools::sign_block(
        chain.controller.head_block_id(),
        when,
        &producer,
        Vec::new(),
        &wrong_key,
    );
    let id = block.id().unwrap();

    match chain.controller.push_block(block.clone(), SKIP_NOTHING) {
        Err(ChainError::BadSignature(_)) => {}
        other => panic!("expected BadSignature, got {:?}", other),
    }
    assert_eq!(chain.controller.head_block_num(), 0);
    assert!(!chain.controller.is_known_block(&id).unwrap());

    // the same block passes when signature verification is waived
    assert!(chain
        .controller
        .push_block(block, SKIP_PRODUCER_SIGNATURE)
        .unwrap());
    assert_eq!(chain.controller.head_block_num(), 1);
}

#[test]
fn test_wrong_producer_rejected() {
    let keys = tools::generate_keys(21);
    let mut chain = tools::new_chain(&keys, 21);
    let scheduled = chain.controller.get_scheduled_producer(1).unwrap();
    let intruder = (0..21)
        .map(tools::producer_name)
        .find(|name| *name != scheduled)
        .unwrap();
    let when = chain.controller.get_slot_time(1).unwrap();
    let block = tools::sign_block(
        chain.controller.head_block_id(),
        when,
        &intruder,
        Vec::new(),
        &chain.keys[&intruder],
    );

    match chain.controller.push_block(block.clone(), SKIP_NOTHING) {
        Err(ChainError::WrongProducer { expected, got }) => {
            assert_eq!(expected, scheduled);
            assert_eq!(got, intruder);
        }
        other => panic!("expected WrongProducer, got {:?}", other),
    }

    // an unscheduled producer is fine when the schedule check is skipped
    assert!(chain
        .controller
        .push_block(block, SKIP_PRODUCER_SCHEDULE_CHECK)
        .unwrap());
}

#[test]
fn test_bad_timestamps_rejected() {
    let keys = tools::generate_keys(21);
    let mut chain = tools::new_chain(&keys, 21);
    let producer = chain.controller.get_scheduled_producer(1).unwrap();
    let key = chain.keys[&producer];

    // unaligned timestamp
    let unaligned = tools::sign_block(
        chain.controller.head_block_id(),
        chain
            .controller
            .head_block_time()
            .checked_add(4.into())
            .unwrap(),
        &producer,
        Vec::new(),
        &key,
    );
    assert!(matches!(
        chain.controller.push_block(unaligned, SKIP_NOTHING),
        Err(ChainError::BadTimestamp(_))
    ));

    // not after the head block
    let stale = tools::sign_block(
        chain.controller.head_block_id(),
        chain.controller.head_block_time(),
        &producer,
        Vec::new(),
        &key,
    );
    assert!(matches!(
        chain.controller.push_block(stale, SKIP_NOTHING),
        Err(ChainError::BadTimestamp(_))
    ));
}

#[test]
fn test_merkle_mismatch_rejected() {
    let keys = tools::generate_keys(21);
    let mut chain = tools::new_chain(&keys, 21);
    let trx = tools::ping_transaction(&chain, 0, 1);
    let producer = chain.controller.get_scheduled_producer(1).unwrap();
    let key = chain.keys[&producer];

    let mut block = tools::sign_block(
        chain.controller.head_block_id(),
        chain.controller.get_slot_time(1).unwrap(),
        &producer,
        vec![trx],
        &key,
    );
    block.header.transaction_mroot = Hash::zero();
    let engine = crypto::signature::SignatureEngine::new();
    block.header.producer_signature = engine
        .sign(&block.header.digest().unwrap(), &key)
        .unwrap();

    assert!(matches!(
        chain.controller.push_block(block, SKIP_NOTHING),
        Err(ChainError::MerkleMismatch(_))
    ));
    assert_eq!(chain.controller.head_block_num(), 0);
}

#[test]
fn test_block_size_limit() {
    let keys = tools::generate_keys(21);
    let configuration = BlockchainConfiguration {
        max_block_size: 200,
        target_block_size: 150,
        ..Default::default()
    };
    let mut chain = tools::new_chain_with_config(&keys, 21, configuration);

    let trx = tools::ping_transaction(&chain, 0, 1);
    let producer = chain.controller.get_scheduled_producer(1).unwrap();
    let key = chain.keys[&producer];
    let block = tools::sign_block(
        chain.controller.head_block_id(),
        chain.controller.get_slot_time(1).unwrap(),
        &producer,
        vec![trx],
        &key,
    );

    assert!(matches!(
        chain.controller.push_block(block.clone(), SKIP_NOTHING),
        Err(ChainError::InvalidBlockHeader(_))
    ));
    // locally-generated oversize blocks may bypass the limit
    assert!(chain
        .controller
        .push_block(block, SKIP_BLOCK_SIZE_CHECK)
        .unwrap());
    assert_eq!(chain.controller.head_block_num(), 1);
}

#[test]
fn test_producer_changes_only_at_round_boundary() {
    let keys = tools::generate_keys(21);
    let mut chain = tools::new_chain(&keys, 21);
    let producer = chain.controller.get_scheduled_producer(1).unwrap();
    let key = chain.keys[&producer];

    let mut block = tools::sign_block(
        chain.controller.head_block_id(),
        chain.controller.get_slot_time(1).unwrap(),
        &producer,
        Vec::new(),
        &key,
    );
    block.header.producer_changes = vec![tools::producer_name(0)];
    let engine = crypto::signature::SignatureEngine::new();
    block.header.producer_signature = engine
        .sign(&block.header.digest().unwrap(), &key)
        .unwrap();

    assert!(matches!(
        chain.controller.push_block(block, SKIP_NOTHING),
        Err(ChainError::InvalidBlockHeader(_))
    ));
}
