use super::tools;
use crate::error::ChainError;
use crate::validation::SKIP_NOTHING;
use models::{SerializeCompact, SerializeVarInt, TypeSchema};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

#[test]
fn test_pending_transaction_flow() {
    let keys = tools::generate_keys(21);
    let mut chain = tools::new_chain(&keys, 21);
    let counter = Arc::new(AtomicU32::new(0));
    let observed = counter.clone();
    chain
        .controller
        .subscribe_pending_transaction(move |_| {
            observed.fetch_add(1, Ordering::SeqCst);
        });

    let trx = tools::ping_transaction(&chain, 0, 1);
    let id = trx.id().unwrap();
    chain.controller.push_transaction(trx, SKIP_NOTHING).unwrap();
    assert_eq!(counter.load(Ordering::SeqCst), 1);
    assert_eq!(chain.controller.pending_transactions().len(), 1);
    assert!(chain.controller.is_known_transaction(&id));

    let block = tools::produce_block(&mut chain, 1);
    assert_eq!(block.transactions.len(), 1);
    assert_eq!(block.transactions[0].id().unwrap(), id);
    // included transactions leave the pending queue
    assert!(chain.controller.pending_transactions().is_empty());
    assert!(chain.controller.get_recent_transaction(&id).is_some());
}

#[test]
fn test_duplicate_transaction_rejected() {
    let keys = tools::generate_keys(21);
    let mut chain = tools::new_chain(&keys, 21);
    let trx = tools::ping_transaction(&chain, 0, 7);

    chain
        .controller
        .push_transaction(trx.clone(), SKIP_NOTHING)
        .unwrap();
    tools::produce_block(&mut chain, 1);

    // the same transaction shows up again after the block committed it
    match chain.controller.push_transaction(trx, SKIP_NOTHING) {
        Err(ChainError::DuplicateTransaction(_)) => {}
        other => panic!("expected DuplicateTransaction, got {:?}", other.err()),
    }
}

#[test]
fn test_duplicate_within_pending_state() {
    let keys = tools::generate_keys(21);
    let mut chain = tools::new_chain(&keys, 21);
    let trx = tools::ping_transaction(&chain, 0, 9);
    chain
        .controller
        .push_transaction(trx.clone(), SKIP_NOTHING)
        .unwrap();
    assert!(matches!(
        chain.controller.push_transaction(trx, SKIP_NOTHING),
        Err(ChainError::DuplicateTransaction(_))
    ));
}

#[test]
fn test_expiration_window() {
    let keys = tools::generate_keys(21);
    let mut chain = tools::new_chain(&keys, 21);

    // already expired
    let mut expired = tools::ping_transaction(&chain, 0, 1);
    expired.expiration = chain
        .controller
        .head_block_time()
        .checked_sub(1.into())
        .unwrap();
    expired.signatures.clear();
    tools::sign_transaction(&mut expired, &chain.keys[&tools::producer_name(0)]);
    assert!(matches!(
        chain.controller.push_transaction(expired, SKIP_NOTHING),
        Err(ChainError::ExpiredTransaction(_))
    ));

    // expires beyond the maximum lifetime
    let mut too_far = tools::ping_transaction(&chain, 0, 2);
    too_far.expiration = chain
        .controller
        .head_block_time()
        .checked_add(3_601.into())
        .unwrap();
    too_far.signatures.clear();
    tools::sign_transaction(&mut too_far, &chain.keys[&tools::producer_name(0)]);
    assert!(matches!(
        chain.controller.push_transaction(too_far, SKIP_NOTHING),
        Err(ChainError::ExpiredTransaction(_))
    ));
}

#[test]
fn test_tapos_mismatch() {
    let keys = tools::generate_keys(21);
    let mut chain = tools::new_chain(&keys, 21);

    let mut wrong_prefix = tools::ping_transaction(&chain, 0, 1);
    wrong_prefix.ref_block_prefix ^= 1;
    wrong_prefix.signatures.clear();
    tools::sign_transaction(&mut wrong_prefix, &chain.keys[&tools::producer_name(0)]);
    assert!(matches!(
        chain.controller.push_transaction(wrong_prefix, SKIP_NOTHING),
        Err(ChainError::TaposMismatch(_))
    ));

    let mut unknown_summary = tools::ping_transaction(&chain, 0, 2);
    unknown_summary.ref_block_num = 777;
    unknown_summary.signatures.clear();
    tools::sign_transaction(&mut unknown_summary, &chain.keys[&tools::producer_name(0)]);
    assert!(matches!(
        chain.controller.push_transaction(unknown_summary, SKIP_NOTHING),
        Err(ChainError::TaposMismatch(_))
    ));
}

#[test]
fn test_unknown_referenced_account() {
    let keys = tools::generate_keys(21);
    let mut chain = tools::new_chain(&keys, 21);
    let mut message = tools::system_message(0, "ping", 1u64.to_varint_bytes());
    message.sender = "ghost".into();
    let trx = tools::custom_transaction(&chain, 0, vec![message]);
    assert!(matches!(
        chain.controller.push_transaction(trx, SKIP_NOTHING),
        Err(ChainError::UnknownAccount(_))
    ));
}

#[test]
fn test_message_type_checks() {
    let keys = tools::generate_keys(21);
    let mut chain = tools::new_chain(&keys, 21);

    // unregistered type
    let trx = tools::custom_transaction(
        &chain,
        0,
        vec![tools::system_message(0, "nope", Vec::new())],
    );
    assert!(matches!(
        chain.controller.push_transaction(trx, SKIP_NOTHING),
        Err(ChainError::UnknownMessageType(..))
    ));

    // truncated payload for a registered type
    let trx = tools::custom_transaction(
        &chain,
        0,
        vec![tools::system_message(0, "ping", Vec::new())],
    );
    assert!(matches!(
        chain.controller.push_transaction(trx, SKIP_NOTHING),
        Err(ChainError::UnknownMessageType(..))
    ));

    // trailing bytes after the declared fields
    let mut payload = 5u64.to_varint_bytes();
    payload.push(0xff);
    let trx =
        tools::custom_transaction(&chain, 0, vec![tools::system_message(0, "ping", payload)]);
    assert!(matches!(
        chain.controller.push_transaction(trx, SKIP_NOTHING),
        Err(ChainError::UnknownMessageType(..))
    ));
}

#[test]
fn test_authority_requires_signature() {
    let keys = tools::generate_keys(21);
    let mut chain = tools::new_chain(&keys, 21);
    let mut trx = tools::ping_transaction(&chain, 0, 1);
    trx.signatures.clear();
    assert!(matches!(
        chain.controller.push_transaction(trx, SKIP_NOTHING),
        Err(ChainError::AuthorityInsufficient(_))
    ));
}

#[test]
fn test_missing_handler_rejected() {
    let keys = tools::generate_keys(21);
    let mut chain = tools::new_chain(&keys, 21);
    chain
        .controller
        .register_type("system".into(), TypeSchema::new("noop".into(), Vec::new()));
    let trx = tools::custom_transaction(
        &chain,
        0,
        vec![tools::system_message(0, "noop", Vec::new())],
    );
    assert!(matches!(
        chain.controller.push_transaction(trx, SKIP_NOTHING),
        Err(ChainError::HandlerMissing { .. })
    ));
}

#[test]
fn test_wildcard_handler_catches_unbound_contract() {
    let keys = tools::generate_keys(21);
    let mut chain = tools::new_chain(&keys, 21);
    chain
        .controller
        .register_type("system".into(), TypeSchema::new("wild".into(), Vec::new()));
    chain.controller.set_apply_handler(
        models::AccountName::wildcard(),
        "system".into(),
        "wild".into(),
        Box::new(|_| Ok(())),
    );

    let mut message = tools::system_message(0, "wild", Vec::new());
    message.recipient = tools::producer_name(1);
    let trx = tools::custom_transaction(&chain, 0, vec![message]);
    chain.controller.push_transaction(trx, SKIP_NOTHING).unwrap();
}

#[test]
fn test_transaction_atomicity_on_failing_message() {
    let keys = tools::generate_keys(21);
    let mut chain = tools::new_chain(&keys, 21);

    let mark = tools::system_message(
        0,
        "mark",
        models::AccountName::from("tempacct").to_bytes_compact().unwrap(),
    );
    let fail = tools::system_message(0, "fail", Vec::new());
    let trx = tools::custom_transaction(&chain, 0, vec![mark, fail]);
    assert!(matches!(
        chain.controller.push_transaction(trx, SKIP_NOTHING),
        Err(ChainError::HandlerAssert(_))
    ));

    // the first message's effect was rolled back with the transaction
    let probe = tools::custom_transaction(
        &chain,
        0,
        vec![{
            let mut message = tools::system_message(0, "ping", 1u64.to_varint_bytes());
            message.sender = "tempacct".into();
            message
        }],
    );
    assert!(matches!(
        chain.controller.push_transaction(probe, SKIP_NOTHING),
        Err(ChainError::UnknownAccount(_))
    ));

    // and a mark on its own does create the account
    let mark = tools::system_message(
        0,
        "mark",
        models::AccountName::from("keptacct").to_bytes_compact().unwrap(),
    );
    let trx = tools::custom_transaction(&chain, 0, vec![mark]);
    chain.controller.push_transaction(trx, SKIP_NOTHING).unwrap();
    let probe = tools::custom_transaction(
        &chain,
        0,
        vec![{
            let mut message = tools::system_message(0, "ping", 2u64.to_varint_bytes());
            message.sender = "keptacct".into();
            message
        }],
    );
    chain.controller.push_transaction(probe, SKIP_NOTHING).unwrap();
}
