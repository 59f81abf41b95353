mod authority;
mod block;
mod config;
mod error;
mod name;
mod objects;
mod serialization;
mod transaction;

pub use authority::{AccountWeight, Authority, KeyWeight, PermissionLevel, MAX_AUTHORITY_ENTRIES};
pub use block::{
    transaction_merkle_root, BlockHeader, BlockId, SignedBlock, BLOCK_ID_SIZE_BYTES,
    MAX_TRANSACTIONS_PER_BLOCK,
};
pub use config::BlockchainConfiguration;
pub use error::ModelsError;
pub use name::{AccountName, FieldName, Name, PermissionName, TypeName, MAX_NAME_LENGTH};
pub use objects::{
    AccountObject, DynamicGlobalPropertyObject, FieldKind, GlobalPropertyObject, ProducerObject,
    TypeSchema, BLOCK_SUMMARY_RING_SIZE, PARTICIPATION_WINDOW,
};
pub use serialization::{
    array_from_slice, u32_from_slice_le, u8_from_slice, DeserializeCompact, DeserializeVarInt,
    SerializeCompact, SerializeVarInt,
};
pub use transaction::{
    Message, SignedTransaction, TransactionId, MAX_MESSAGES_PER_TRANSACTION,
    MAX_SIGNATURES_PER_TRANSACTION, TRANSACTION_ID_SIZE_BYTES,
};
