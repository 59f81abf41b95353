use crate::error::ModelsError;
use crate::name::{AccountName, PermissionName};
use crate::serialization::{
    DeserializeCompact, DeserializeVarInt, SerializeCompact, SerializeVarInt,
};
use crypto::signature::PublicKey;
use serde::{Deserialize, Serialize};

pub const MAX_AUTHORITY_ENTRIES: u32 = 256;

/// Reference to a named permission of an account, as carried by a message
/// authorization.
#[derive(Debug, Clone, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PermissionLevel {
    pub account: AccountName,
    pub permission: PermissionName,
}

impl PermissionLevel {
    pub fn new(account: AccountName, permission: PermissionName) -> Self {
        PermissionLevel {
            account,
            permission,
        }
    }

    pub fn active(account: AccountName) -> Self {
        PermissionLevel {
            account,
            permission: "active".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyWeight {
    pub key: PublicKey,
    pub weight: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountWeight {
    pub permission: PermissionLevel,
    pub weight: u16,
}

/// Weighted-threshold authority: satisfied when the weights of provided
/// signer keys plus satisfied delegated account permissions reach
/// `threshold`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Authority {
    pub threshold: u32,
    pub keys: Vec<KeyWeight>,
    pub accounts: Vec<AccountWeight>,
}

impl Authority {
    /// Single-key authority with threshold 1.
    pub fn with_key(key: PublicKey) -> Self {
        Authority {
            threshold: 1,
            keys: vec![KeyWeight { key, weight: 1 }],
            accounts: Vec::new(),
        }
    }

    pub fn referenced_accounts(&self) -> impl Iterator<Item = &AccountName> {
        self.accounts.iter().map(|a| &a.permission.account)
    }
}

impl SerializeCompact for PermissionLevel {
    fn to_bytes_compact(&self) -> Result<Vec<u8>, ModelsError> {
        let mut res: Vec<u8> = Vec::new();
        res.extend(self.account.to_bytes_compact()?);
        res.extend(self.permission.to_bytes_compact()?);
        Ok(res)
    }
}

impl DeserializeCompact for PermissionLevel {
    fn from_bytes_compact(buffer: &[u8]) -> Result<(Self, usize), ModelsError> {
        let mut cursor = 0usize;
        let (account, delta) = AccountName::from_bytes_compact(&buffer[cursor..])?;
        cursor += delta;
        let (permission, delta) = PermissionName::from_bytes_compact(&buffer[cursor..])?;
        cursor += delta;
        Ok((
            PermissionLevel {
                account,
                permission,
            },
            cursor,
        ))
    }
}

impl SerializeCompact for Authority {
    fn to_bytes_compact(&self) -> Result<Vec<u8>, ModelsError> {
        let mut res: Vec<u8> = Vec::new();
        res.extend(self.threshold.to_varint_bytes());
        res.extend((self.keys.len() as u32).to_varint_bytes());
        for entry in self.keys.iter() {
            res.extend(&entry.key.to_bytes());
            res.extend((entry.weight as u32).to_varint_bytes());
        }
        res.extend((self.accounts.len() as u32).to_varint_bytes());
        for entry in self.accounts.iter() {
            res.extend(entry.permission.to_bytes_compact()?);
            res.extend((entry.weight as u32).to_varint_bytes());
        }
        Ok(res)
    }
}

impl DeserializeCompact for Authority {
    fn from_bytes_compact(buffer: &[u8]) -> Result<(Self, usize), ModelsError> {
        use crate::serialization::array_from_slice;
        use crypto::signature::PUBLIC_KEY_SIZE_BYTES;

        let mut cursor = 0usize;
        let (threshold, delta) = u32::from_varint_bytes(&buffer[cursor..])?;
        cursor += delta;

        let (key_count, delta) =
            u32::from_varint_bytes_bounded(&buffer[cursor..], MAX_AUTHORITY_ENTRIES)?;
        cursor += delta;
        let mut keys = Vec::with_capacity(key_count as usize);
        for _ in 0..key_count {
            let key_bytes = array_from_slice::<PUBLIC_KEY_SIZE_BYTES>(&buffer[cursor..])?;
            let key = PublicKey::from_bytes(&key_bytes)?;
            cursor += PUBLIC_KEY_SIZE_BYTES;
            let (weight, delta) = u32::from_varint_bytes_bounded(&buffer[cursor..], u16::MAX as u32)?;
            cursor += delta;
            keys.push(KeyWeight {
                key,
                weight: weight as u16,
            });
        }

        let (account_count, delta) =
            u32::from_varint_bytes_bounded(&buffer[cursor..], MAX_AUTHORITY_ENTRIES)?;
        cursor += delta;
        let mut accounts = Vec::with_capacity(account_count as usize);
        for _ in 0..account_count {
            let (permission, delta) = PermissionLevel::from_bytes_compact(&buffer[cursor..])?;
            cursor += delta;
            let (weight, delta) = u32::from_varint_bytes_bounded(&buffer[cursor..], u16::MAX as u32)?;
            cursor += delta;
            accounts.push(AccountWeight {
                permission,
                weight: weight as u16,
            });
        }

        Ok((
            Authority {
                threshold,
                keys,
                accounts,
            },
            cursor,
        ))
    }
}
