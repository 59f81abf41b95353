//! State objects held by the versioned object database.

use crate::authority::Authority;
use crate::config::BlockchainConfiguration;
use crate::error::ModelsError;
use crate::name::{AccountName, FieldName, PermissionName, TypeName};
use crate::serialization::DeserializeVarInt;
use crate::BlockId;
use crypto::signature::PublicKey;
use serde::{Deserialize, Serialize};
use time::UTime;

/// Number of entries in the recent-block summary ring consulted by TAPoS.
pub const BLOCK_SUMMARY_RING_SIZE: usize = 1 << 16;
/// Width of the producer participation window, in slots.
pub const PARTICIPATION_WINDOW: u32 = 128;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountObject {
    pub name: AccountName,
    pub owner_authority: Authority,
    pub active_authority: Authority,
    pub creation_date: UTime,
}

impl AccountObject {
    pub fn authority(&self, permission: &PermissionName) -> Option<&Authority> {
        match permission.as_str() {
            "owner" => Some(&self.owner_authority),
            "active" => Some(&self.active_authority),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProducerObject {
    pub owner: AccountName,
    pub signing_key: PublicKey,
    /// This producer's vote on the votable chain parameters.
    pub configuration: BlockchainConfiguration,
    pub total_votes: u64,
    pub last_produced_block_num: u32,
    pub last_absolute_slot: u64,
    pub total_missed: u32,
}

impl ProducerObject {
    pub fn new(owner: AccountName, signing_key: PublicKey) -> Self {
        ProducerObject {
            owner,
            signing_key,
            configuration: BlockchainConfiguration::default(),
            total_votes: 0,
            last_produced_block_num: 0,
            last_absolute_slot: 0,
            total_missed: 0,
        }
    }
}

/// Static global state: the applied configuration and the active round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalPropertyObject {
    pub configuration: BlockchainConfiguration,
    /// Shuffled producer round, in slot order.
    pub active_producers: Vec<AccountName>,
}

impl Default for GlobalPropertyObject {
    fn default() -> Self {
        GlobalPropertyObject {
            configuration: BlockchainConfiguration::default(),
            active_producers: Vec::new(),
        }
    }
}

/// Per-block mutable global state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DynamicGlobalPropertyObject {
    pub head_block_num: u32,
    pub head_block_id: BlockId,
    pub head_block_time: UTime,
    pub current_producer: AccountName,
    /// Total slots elapsed since genesis, filled or not.
    pub current_absolute_slot: u64,
    /// Rolling window over the last 128 slots; bit 0 is the head slot.
    pub recent_slots_filled: u128,
    pub last_irreversible_block_num: u32,
}

impl Default for DynamicGlobalPropertyObject {
    fn default() -> Self {
        DynamicGlobalPropertyObject {
            head_block_num: 0,
            head_block_id: BlockId::zero(),
            head_block_time: UTime::default(),
            current_producer: AccountName::null(),
            current_absolute_slot: 0,
            recent_slots_filled: u128::MAX,
            last_irreversible_block_num: 0,
        }
    }
}

impl DynamicGlobalPropertyObject {
    /// Share of the last 128 slots that were filled, in hundredths of a
    /// percent.
    pub fn participation_rate(&self) -> u32 {
        (self.recent_slots_filled.count_ones() * 10_000) / PARTICIPATION_WINDOW
    }
}

/// Field layouts a message payload can be structurally checked against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldKind {
    U8,
    U16,
    U32,
    U64,
    Name,
    Time,
    String,
    Bytes,
}

/// Registered message-payload schema. `base` points at a schema whose fields
/// prefix this one's; `base_scope` says where to resolve it (defaults to the
/// registering scope).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeSchema {
    pub name: TypeName,
    pub base: Option<TypeName>,
    pub base_scope: Option<AccountName>,
    pub fields: Vec<(FieldName, FieldKind)>,
}

impl TypeSchema {
    pub fn new(name: TypeName, fields: Vec<(FieldName, FieldKind)>) -> Self {
        TypeSchema {
            name,
            base: None,
            base_scope: None,
            fields,
        }
    }

    /// Walk this schema's own fields over `buffer` starting at `cursor`,
    /// returning the cursor after the last field. Base schemas are resolved
    /// and consumed by the caller.
    pub fn consume_fields(&self, buffer: &[u8], mut cursor: usize) -> Result<usize, ModelsError> {
        for (field, kind) in self.fields.iter() {
            cursor = consume_field(buffer, cursor, *kind).map_err(|err| {
                ModelsError::DeserializeError(format!(
                    "field {} of type {}: {}",
                    field, self.name, err
                ))
            })?;
        }
        Ok(cursor)
    }
}

fn consume_field(buffer: &[u8], cursor: usize, kind: FieldKind) -> Result<usize, ModelsError> {
    let remaining = buffer
        .get(cursor..)
        .ok_or_else(|| ModelsError::DeserializeError("cursor out of bounds".into()))?;
    match kind {
        FieldKind::U8 => {
            if remaining.is_empty() {
                return Err(ModelsError::DeserializeError("missing u8".into()));
            }
            Ok(cursor + 1)
        }
        FieldKind::U16 => {
            let (_, delta) = u32::from_varint_bytes_bounded(remaining, u16::MAX as u32)?;
            Ok(cursor + delta)
        }
        FieldKind::U32 => {
            let (_, delta) = u32::from_varint_bytes(remaining)?;
            Ok(cursor + delta)
        }
        FieldKind::U64 | FieldKind::Time => {
            let (_, delta) = u64::from_varint_bytes(remaining)?;
            Ok(cursor + delta)
        }
        FieldKind::Name | FieldKind::String => {
            let (len, delta) = u32::from_varint_bytes(remaining)?;
            let end = delta + len as usize;
            if remaining.len() < end {
                return Err(ModelsError::DeserializeError("string out of bounds".into()));
            }
            std::str::from_utf8(&remaining[delta..end])
                .map_err(|_| ModelsError::DeserializeError("string is not valid utf8".into()))?;
            Ok(cursor + end)
        }
        FieldKind::Bytes => {
            let (len, delta) = u32::from_varint_bytes(remaining)?;
            let end = delta + len as usize;
            if remaining.len() < end {
                return Err(ModelsError::DeserializeError("bytes out of bounds".into()));
            }
            Ok(cursor + end)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::serialization::SerializeVarInt;

    #[test]
    fn test_consume_fields_accepts_well_formed_payload() {
        let schema = TypeSchema::new(
            "transfer".into(),
            vec![
                ("from".into(), FieldKind::Name),
                ("to".into(), FieldKind::Name),
                ("amount".into(), FieldKind::U64),
            ],
        );
        let mut payload: Vec<u8> = Vec::new();
        for part in ["alice", "bob"] {
            payload.extend((part.len() as u32).to_varint_bytes());
            payload.extend(part.as_bytes());
        }
        payload.extend(1000u64.to_varint_bytes());

        let cursor = schema.consume_fields(&payload, 0).unwrap();
        assert_eq!(cursor, payload.len());
    }

    #[test]
    fn test_consume_fields_rejects_truncated_payload() {
        let schema = TypeSchema::new("ping".into(), vec![("seq".into(), FieldKind::U64)]);
        assert!(schema.consume_fields(&[], 0).is_err());
    }

    #[test]
    fn test_participation_rate() {
        let mut dynamic = DynamicGlobalPropertyObject::default();
        assert_eq!(dynamic.participation_rate(), 10_000);
        dynamic.recent_slots_filled = u128::MAX << 64;
        assert_eq!(dynamic.participation_rate(), 5_000);
    }
}
