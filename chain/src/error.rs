use models::{AccountName, BlockId, ModelsError, TransactionId, TypeName};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ChainError {
    #[error("invalid block header: {0}")]
    InvalidBlockHeader(String),
    #[error("unknown parent block {0}")]
    UnknownParent(BlockId),
    #[error("bad signature: {0}")]
    BadSignature(String),
    #[error("block signed by {got} but slot belongs to {expected}")]
    WrongProducer {
        expected: AccountName,
        got: AccountName,
    },
    #[error("bad block timestamp {0}")]
    BadTimestamp(time::UTime),
    #[error("transaction merkle root mismatch in block {0}")]
    MerkleMismatch(BlockId),
    #[error("block {got} violates checkpoint at {block_num} (expected {expected})")]
    CheckpointMismatch {
        block_num: u32,
        expected: BlockId,
        got: BlockId,
    },
    #[error("duplicate transaction {0}")]
    DuplicateTransaction(TransactionId),
    #[error("transaction {0} expired or expires too far in the future")]
    ExpiredTransaction(TransactionId),
    #[error("transaction {0} references an unknown or mismatched block")]
    TaposMismatch(TransactionId),
    #[error("unknown account {0}")]
    UnknownAccount(AccountName),
    #[error("unknown or malformed message type {0}: {1}")]
    UnknownMessageType(TypeName, String),
    #[error("authority of {0} not satisfied")]
    AuthorityInsufficient(AccountName),
    #[error("no handler registered for ({contract}, {scope}, {action})")]
    HandlerMissing {
        contract: AccountName,
        scope: AccountName,
        action: TypeName,
    },
    #[error("handler assertion failed: {0}")]
    HandlerAssert(String),
    #[error("reorganization failed: {0}")]
    ReorgFailure(String),
    #[error("operation would cross the irreversibility boundary: {0}")]
    IrreversibleViolation(String),
    #[error("container inconsistency: {0}")]
    ContainerInconsistency(String),
    #[error("model error: {0}")]
    ModelsError(#[from] ModelsError),
    #[error("crypto error: {0}")]
    CryptoError(#[from] crypto::CryptoError),
    #[error("time error: {0}")]
    TimeError(#[from] time::TimeError),
    #[error("state database error: {0}")]
    StateDbError(#[from] statedb::StateDbError),
    #[error("storage error: {0}")]
    StorageError(#[from] storage::StorageError),
}
