use crate::error::ModelsError;
use crate::name::AccountName;
use crate::serialization::{
    array_from_slice, DeserializeCompact, DeserializeVarInt, SerializeCompact, SerializeVarInt,
};
use crate::transaction::{SignedTransaction, TransactionId};
use crypto::hash::{Hash, HASH_SIZE_BYTES};
use crypto::signature::{Signature, SIGNATURE_SIZE_BYTES};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use time::UTime;

pub const BLOCK_ID_SIZE_BYTES: usize = HASH_SIZE_BYTES;
pub const MAX_TRANSACTIONS_PER_BLOCK: u32 = 1 << 16;
pub const MAX_PRODUCER_CHANGES: u32 = 1024;
/// Byte offset of the TAPoS prefix inside a block id.
const REF_PREFIX_OFFSET: usize = 8;

/// 32-byte block identifier: the digest of the signed header, with the first
/// four bytes overwritten by the big-endian block number.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct BlockId([u8; BLOCK_ID_SIZE_BYTES]);

impl std::fmt::Display for BlockId {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", bs58::encode(self.0).with_check().into_string())
    }
}

impl FromStr for BlockId {
    type Err = ModelsError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let decoded = bs58::decode(s)
            .with_check(None)
            .into_vec()
            .map_err(|_| ModelsError::HashError)?;
        Ok(BlockId(array_from_slice::<BLOCK_ID_SIZE_BYTES>(&decoded)?))
    }
}

impl Default for BlockId {
    fn default() -> Self {
        BlockId::zero()
    }
}

impl BlockId {
    pub fn new(digest: Hash, block_num: u32) -> Self {
        let mut bytes = digest.to_bytes();
        bytes[..4].clone_from_slice(&block_num.to_be_bytes());
        BlockId(bytes)
    }

    /// Id of the empty chain (block number 0).
    pub fn zero() -> Self {
        BlockId([0u8; BLOCK_ID_SIZE_BYTES])
    }

    /// Block number embedded in the first four bytes.
    pub fn block_num(&self) -> u32 {
        u32::from_be_bytes([self.0[0], self.0[1], self.0[2], self.0[3]])
    }

    /// TAPoS prefix: little-endian u32 at a fixed offset past the number.
    pub fn ref_prefix(&self) -> u32 {
        u32::from_le_bytes([
            self.0[REF_PREFIX_OFFSET],
            self.0[REF_PREFIX_OFFSET + 1],
            self.0[REF_PREFIX_OFFSET + 2],
            self.0[REF_PREFIX_OFFSET + 3],
        ])
    }

    pub fn to_bytes(&self) -> [u8; BLOCK_ID_SIZE_BYTES] {
        self.0
    }

    pub fn from_bytes(data: &[u8; BLOCK_ID_SIZE_BYTES]) -> BlockId {
        BlockId(*data)
    }
}

/// Signed block header. The producer signature covers every other field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    pub parent_id: BlockId,
    pub timestamp: UTime,
    pub producer: AccountName,
    /// Merkle root over the ids of the block's transactions.
    pub transaction_mroot: Hash,
    /// New active round announced at a round boundary; empty otherwise.
    pub producer_changes: Vec<AccountName>,
    pub producer_signature: Signature,
}

impl BlockHeader {
    /// Bytes covered by the producer signature (everything but the
    /// signature itself).
    pub fn unsigned_bytes(&self) -> Result<Vec<u8>, ModelsError> {
        let mut res: Vec<u8> = Vec::new();
        res.extend(&self.parent_id.to_bytes());
        res.extend(self.timestamp.to_seconds().to_varint_bytes());
        res.extend(self.producer.to_bytes_compact()?);
        res.extend(&self.transaction_mroot.to_bytes());
        res.extend((self.producer_changes.len() as u32).to_varint_bytes());
        for name in self.producer_changes.iter() {
            res.extend(name.to_bytes_compact()?);
        }
        Ok(res)
    }

    /// Digest the producer signs.
    pub fn digest(&self) -> Result<Hash, ModelsError> {
        Ok(Hash::hash(&self.unsigned_bytes()?))
    }
}

impl SerializeCompact for BlockHeader {
    fn to_bytes_compact(&self) -> Result<Vec<u8>, ModelsError> {
        let mut res = self.unsigned_bytes()?;
        res.extend(&self.producer_signature.to_bytes());
        Ok(res)
    }
}

impl DeserializeCompact for BlockHeader {
    fn from_bytes_compact(buffer: &[u8]) -> Result<(Self, usize), ModelsError> {
        let mut cursor = 0usize;
        let parent_id = BlockId::from_bytes(&array_from_slice::<BLOCK_ID_SIZE_BYTES>(buffer)?);
        cursor += BLOCK_ID_SIZE_BYTES;
        let (timestamp, delta) = u64::from_varint_bytes(&buffer[cursor..])?;
        cursor += delta;
        let (producer, delta) = AccountName::from_bytes_compact(&buffer[cursor..])?;
        cursor += delta;
        let transaction_mroot =
            Hash::from_bytes(&array_from_slice::<HASH_SIZE_BYTES>(&buffer[cursor..])?);
        cursor += HASH_SIZE_BYTES;
        let (change_count, delta) =
            u32::from_varint_bytes_bounded(&buffer[cursor..], MAX_PRODUCER_CHANGES)?;
        cursor += delta;
        let mut producer_changes = Vec::with_capacity(change_count as usize);
        for _ in 0..change_count {
            let (name, delta) = AccountName::from_bytes_compact(&buffer[cursor..])?;
            cursor += delta;
            producer_changes.push(name);
        }
        let signature_bytes = array_from_slice::<SIGNATURE_SIZE_BYTES>(&buffer[cursor..])?;
        let producer_signature = Signature::from_bytes(&signature_bytes)?;
        cursor += SIGNATURE_SIZE_BYTES;

        Ok((
            BlockHeader {
                parent_id,
                timestamp: timestamp.into(),
                producer,
                transaction_mroot,
                producer_changes,
                producer_signature,
            },
            cursor,
        ))
    }
}

/// A full block: signed header plus the ordered transactions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedBlock {
    pub header: BlockHeader,
    pub transactions: Vec<SignedTransaction>,
}

impl SignedBlock {
    pub fn block_num(&self) -> u32 {
        self.header.parent_id.block_num() + 1
    }

    /// Content id: digest of the signed header with the block number
    /// embedded in the first four bytes.
    pub fn id(&self) -> Result<BlockId, ModelsError> {
        let digest = Hash::hash(&self.header.to_bytes_compact()?);
        Ok(BlockId::new(digest, self.block_num()))
    }

    pub fn transaction_ids(&self) -> Result<Vec<TransactionId>, ModelsError> {
        self.transactions.iter().map(|trx| trx.id()).collect()
    }
}

impl SerializeCompact for SignedBlock {
    fn to_bytes_compact(&self) -> Result<Vec<u8>, ModelsError> {
        let mut res = self.header.to_bytes_compact()?;
        res.extend((self.transactions.len() as u32).to_varint_bytes());
        for trx in self.transactions.iter() {
            res.extend(trx.to_bytes_compact()?);
        }
        Ok(res)
    }
}

impl DeserializeCompact for SignedBlock {
    fn from_bytes_compact(buffer: &[u8]) -> Result<(Self, usize), ModelsError> {
        let mut cursor = 0usize;
        let (header, delta) = BlockHeader::from_bytes_compact(buffer)?;
        cursor += delta;
        let (trx_count, delta) =
            u32::from_varint_bytes_bounded(&buffer[cursor..], MAX_TRANSACTIONS_PER_BLOCK)?;
        cursor += delta;
        let mut transactions = Vec::with_capacity(trx_count as usize);
        for _ in 0..trx_count {
            let (trx, delta) = SignedTransaction::from_bytes_compact(&buffer[cursor..])?;
            cursor += delta;
            transactions.push(trx);
        }
        Ok((
            SignedBlock {
                header,
                transactions,
            },
            cursor,
        ))
    }
}

/// Binary merkle root over transaction ids, pairwise-hashing each level and
/// promoting an odd trailing node. The empty list maps to the zero digest.
pub fn transaction_merkle_root(ids: &[TransactionId]) -> Hash {
    if ids.is_empty() {
        return Hash::zero();
    }
    let mut level: Vec<Hash> = ids.iter().map(|id| id.hash()).collect();
    while level.len() > 1 {
        let mut next = Vec::with_capacity((level.len() + 1) / 2);
        for pair in level.chunks(2) {
            if pair.len() == 2 {
                next.push(Hash::hash_parts(&[&pair[0].to_bytes(), &pair[1].to_bytes()]));
            } else {
                next.push(pair[0]);
            }
        }
        level = next;
    }
    level[0]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::Message;
    use crypto::signature::SignatureEngine;

    fn sample_block() -> SignedBlock {
        let engine = SignatureEngine::new();
        let key = crypto::generate_random_private_key();
        let mut header = BlockHeader {
            parent_id: BlockId::new(Hash::hash(b"parent"), 6),
            timestamp: 1_600_000_030.into(),
            producer: "init3".into(),
            transaction_mroot: Hash::zero(),
            producer_changes: Vec::new(),
            producer_signature: engine.sign(&Hash::hash(b"tmp"), &key).unwrap(),
        };
        header.producer_signature = engine.sign(&header.digest().unwrap(), &key).unwrap();
        SignedBlock {
            header,
            transactions: vec![SignedTransaction {
                ref_block_num: 6,
                ref_block_prefix: 7,
                expiration: 1_600_000_090.into(),
                messages: vec![Message {
                    sender: "alice".into(),
                    recipient: "bob".into(),
                    scope: "bob".into(),
                    type_name: "ping".into(),
                    payload: Vec::new(),
                    authorization: Vec::new(),
                }],
                signatures: Vec::new(),
            }],
        }
    }

    #[test]
    fn test_block_id_embeds_number() {
        let block = sample_block();
        let id = block.id().unwrap();
        assert_eq!(block.block_num(), 7);
        assert_eq!(id.block_num(), 7);
    }

    #[test]
    fn test_block_compact_roundtrip() {
        let block = sample_block();
        let bytes = block.to_bytes_compact().unwrap();
        let (restored, size) = SignedBlock::from_bytes_compact(&bytes).unwrap();
        assert_eq!(restored, block);
        assert_eq!(size, bytes.len());
        assert_eq!(restored.id().unwrap(), block.id().unwrap());
    }

    #[test]
    fn test_merkle_root_shapes() {
        let ids: Vec<TransactionId> = (0u8..5)
            .map(|i| TransactionId::from_bytes(&Hash::hash(&[i]).to_bytes()))
            .collect();
        assert_eq!(transaction_merkle_root(&[]), Hash::zero());
        // single leaf is its own root
        assert_eq!(transaction_merkle_root(&ids[..1]), ids[0].hash());
        // order matters
        let forward = transaction_merkle_root(&ids);
        let mut reversed = ids.clone();
        reversed.reverse();
        assert_ne!(forward, transaction_merkle_root(&reversed));
    }
}
