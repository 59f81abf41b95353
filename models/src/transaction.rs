use crate::authority::PermissionLevel;
use crate::error::ModelsError;
use crate::name::{AccountName, TypeName};
use crate::serialization::{
    array_from_slice, u32_from_slice_le, DeserializeCompact, DeserializeVarInt, SerializeCompact,
    SerializeVarInt,
};
use crypto::hash::{Hash, HASH_SIZE_BYTES};
use crypto::signature::{Signature, SIGNATURE_SIZE_BYTES};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use time::UTime;

pub const TRANSACTION_ID_SIZE_BYTES: usize = HASH_SIZE_BYTES;
pub const MAX_MESSAGES_PER_TRANSACTION: u32 = 1024;
pub const MAX_SIGNATURES_PER_TRANSACTION: u32 = 64;
pub const MAX_PAYLOAD_SIZE: u32 = 1 << 20;

/// Digest of the unsigned transaction body.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct TransactionId(Hash);

impl std::fmt::Display for TransactionId {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.0.to_bs58_check())
    }
}

impl FromStr for TransactionId {
    type Err = ModelsError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(TransactionId(Hash::from_str(s).map_err(|_| ModelsError::HashError)?))
    }
}

impl TransactionId {
    pub fn to_bytes(&self) -> [u8; TRANSACTION_ID_SIZE_BYTES] {
        self.0.to_bytes()
    }

    pub fn from_bytes(data: &[u8; TRANSACTION_ID_SIZE_BYTES]) -> TransactionId {
        TransactionId(Hash::from_bytes(data))
    }

    pub fn hash(&self) -> Hash {
        self.0
    }
}

/// A single contract action carried by a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub sender: AccountName,
    pub recipient: AccountName,
    /// Account whose state the message operates on; part of the handler key.
    pub scope: AccountName,
    pub type_name: TypeName,
    pub payload: Vec<u8>,
    pub authorization: Vec<PermissionLevel>,
}

impl Message {
    /// Accounts this message mentions, for referenced-account validation.
    pub fn referenced_accounts(&self) -> impl Iterator<Item = &AccountName> {
        std::iter::once(&self.sender)
            .chain(std::iter::once(&self.recipient))
            .chain(std::iter::once(&self.scope))
            .chain(self.authorization.iter().map(|level| &level.account))
    }
}

impl SerializeCompact for Message {
    fn to_bytes_compact(&self) -> Result<Vec<u8>, ModelsError> {
        let mut res: Vec<u8> = Vec::new();
        res.extend(self.sender.to_bytes_compact()?);
        res.extend(self.recipient.to_bytes_compact()?);
        res.extend(self.scope.to_bytes_compact()?);
        res.extend(self.type_name.to_bytes_compact()?);
        res.extend((self.payload.len() as u32).to_varint_bytes());
        res.extend(&self.payload);
        res.extend((self.authorization.len() as u32).to_varint_bytes());
        for level in self.authorization.iter() {
            res.extend(level.to_bytes_compact()?);
        }
        Ok(res)
    }
}

impl DeserializeCompact for Message {
    fn from_bytes_compact(buffer: &[u8]) -> Result<(Self, usize), ModelsError> {
        let mut cursor = 0usize;
        let (sender, delta) = AccountName::from_bytes_compact(&buffer[cursor..])?;
        cursor += delta;
        let (recipient, delta) = AccountName::from_bytes_compact(&buffer[cursor..])?;
        cursor += delta;
        let (scope, delta) = AccountName::from_bytes_compact(&buffer[cursor..])?;
        cursor += delta;
        let (type_name, delta) = TypeName::from_bytes_compact(&buffer[cursor..])?;
        cursor += delta;

        let (payload_len, delta) = u32::from_varint_bytes_bounded(&buffer[cursor..], MAX_PAYLOAD_SIZE)?;
        cursor += delta;
        let end = cursor
            .checked_add(payload_len as usize)
            .ok_or_else(|| ModelsError::DeserializeError("payload length overflow".into()))?;
        if buffer.len() < end {
            return Err(ModelsError::DeserializeError(
                "buffer too small to contain payload".into(),
            ));
        }
        let payload = buffer[cursor..end].to_vec();
        cursor = end;

        let (auth_count, delta) =
            u32::from_varint_bytes_bounded(&buffer[cursor..], MAX_MESSAGES_PER_TRANSACTION)?;
        cursor += delta;
        let mut authorization = Vec::with_capacity(auth_count as usize);
        for _ in 0..auth_count {
            let (level, delta) = PermissionLevel::from_bytes_compact(&buffer[cursor..])?;
            cursor += delta;
            authorization.push(level);
        }

        Ok((
            Message {
                sender,
                recipient,
                scope,
                type_name,
                payload,
                authorization,
            },
            cursor,
        ))
    }
}

/// A signed transaction. `ref_block_num`/`ref_block_prefix` point at a block
/// in the recent-summary ring the signer attests having seen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedTransaction {
    pub ref_block_num: u16,
    pub ref_block_prefix: u32,
    pub expiration: UTime,
    pub messages: Vec<Message>,
    pub signatures: Vec<Signature>,
}

impl SignedTransaction {
    /// Compact bytes of the unsigned body; the id and the signing digest are
    /// both computed over these.
    pub fn unsigned_bytes(&self) -> Result<Vec<u8>, ModelsError> {
        let mut res: Vec<u8> = Vec::new();
        res.extend((self.ref_block_num as u32).to_varint_bytes());
        res.extend(&self.ref_block_prefix.to_le_bytes());
        res.extend(self.expiration.to_seconds().to_varint_bytes());
        res.extend((self.messages.len() as u32).to_varint_bytes());
        for message in self.messages.iter() {
            res.extend(message.to_bytes_compact()?);
        }
        Ok(res)
    }

    pub fn id(&self) -> Result<TransactionId, ModelsError> {
        Ok(TransactionId(Hash::hash(&self.unsigned_bytes()?)))
    }

    /// Digest the signatures are made over.
    pub fn digest(&self) -> Result<Hash, ModelsError> {
        Ok(Hash::hash(&self.unsigned_bytes()?))
    }
}

impl SerializeCompact for SignedTransaction {
    fn to_bytes_compact(&self) -> Result<Vec<u8>, ModelsError> {
        let mut res = self.unsigned_bytes()?;
        res.extend((self.signatures.len() as u32).to_varint_bytes());
        for signature in self.signatures.iter() {
            res.extend(&signature.to_bytes());
        }
        Ok(res)
    }
}

impl DeserializeCompact for SignedTransaction {
    fn from_bytes_compact(buffer: &[u8]) -> Result<(Self, usize), ModelsError> {
        let mut cursor = 0usize;
        let (ref_block_num, delta) = u32::from_varint_bytes_bounded(&buffer[cursor..], u16::MAX as u32)?;
        cursor += delta;
        let ref_block_prefix = u32_from_slice_le(&buffer[cursor..])?;
        cursor += 4;
        let (expiration, delta) = u64::from_varint_bytes(&buffer[cursor..])?;
        cursor += delta;

        let (message_count, delta) =
            u32::from_varint_bytes_bounded(&buffer[cursor..], MAX_MESSAGES_PER_TRANSACTION)?;
        cursor += delta;
        let mut messages = Vec::with_capacity(message_count as usize);
        for _ in 0..message_count {
            let (message, delta) = Message::from_bytes_compact(&buffer[cursor..])?;
            cursor += delta;
            messages.push(message);
        }

        let (signature_count, delta) =
            u32::from_varint_bytes_bounded(&buffer[cursor..], MAX_SIGNATURES_PER_TRANSACTION)?;
        cursor += delta;
        let mut signatures = Vec::with_capacity(signature_count as usize);
        for _ in 0..signature_count {
            let signature_bytes = array_from_slice::<SIGNATURE_SIZE_BYTES>(&buffer[cursor..])?;
            signatures.push(Signature::from_bytes(&signature_bytes)?);
            cursor += SIGNATURE_SIZE_BYTES;
        }

        Ok((
            SignedTransaction {
                ref_block_num: ref_block_num as u16,
                ref_block_prefix,
                expiration: expiration.into(),
                messages,
                signatures,
            },
            cursor,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_transaction() -> SignedTransaction {
        SignedTransaction {
            ref_block_num: 42,
            ref_block_prefix: 0xdeadbeef,
            expiration: 1_700_000_000.into(),
            messages: vec![Message {
                sender: "alice".into(),
                recipient: "token".into(),
                scope: "token".into(),
                type_name: "transfer".into(),
                payload: vec![1, 2, 3, 4],
                authorization: vec![PermissionLevel::active("alice".into())],
            }],
            signatures: Vec::new(),
        }
    }

    #[test]
    fn test_transaction_compact_roundtrip() {
        let trx = sample_transaction();
        let bytes = trx.to_bytes_compact().unwrap();
        let (restored, size) = SignedTransaction::from_bytes_compact(&bytes).unwrap();
        assert_eq!(restored, trx);
        assert_eq!(size, bytes.len());
    }

    #[test]
    fn test_id_ignores_signatures() {
        let unsigned = sample_transaction();
        let engine = crypto::signature::SignatureEngine::new();
        let key = crypto::generate_random_private_key();
        let mut signed = unsigned.clone();
        signed
            .signatures
            .push(engine.sign(&signed.digest().unwrap(), &key).unwrap());
        assert_eq!(unsigned.id().unwrap(), signed.id().unwrap());
    }

    #[test]
    fn test_id_depends_on_body() {
        let a = sample_transaction();
        let mut b = sample_transaction();
        b.ref_block_prefix ^= 1;
        assert_ne!(a.id().unwrap(), b.id().unwrap());
    }
}
