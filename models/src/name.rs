use crate::error::ModelsError;
use crate::serialization::{
    DeserializeCompact, DeserializeVarInt, SerializeCompact, SerializeVarInt,
};
use serde::{Deserialize, Serialize};
use std::fmt;

pub const MAX_NAME_LENGTH: u32 = 64;

/// Short identifier for accounts, message types, permissions and fields.
/// The empty name is the null sentinel (null producer, wildcard-free lookups).
#[derive(Debug, Clone, Default, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Name(String);

pub type AccountName = Name;
pub type TypeName = Name;
pub type PermissionName = Name;
pub type FieldName = Name;

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Name {
    fn from(value: &str) -> Self {
        Name(value.to_string())
    }
}

impl From<String> for Name {
    fn from(value: String) -> Self {
        Name(value)
    }
}

impl Name {
    /// The null sentinel, also used as the missed-slot producer.
    pub fn null() -> Self {
        Name(String::new())
    }

    /// Contract name under which fallback handlers are registered.
    pub fn wildcard() -> Self {
        Name("*".to_string())
    }

    pub fn is_null(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl SerializeCompact for Name {
    fn to_bytes_compact(&self) -> Result<Vec<u8>, ModelsError> {
        let bytes = self.0.as_bytes();
        if bytes.len() as u32 > MAX_NAME_LENGTH {
            return Err(ModelsError::SerializeError(format!(
                "name too long: {} bytes",
                bytes.len()
            )));
        }
        let mut res: Vec<u8> = Vec::new();
        res.extend((bytes.len() as u32).to_varint_bytes());
        res.extend(bytes);
        Ok(res)
    }
}

impl DeserializeCompact for Name {
    fn from_bytes_compact(buffer: &[u8]) -> Result<(Self, usize), ModelsError> {
        let mut cursor = 0usize;
        let (len, delta) = u32::from_varint_bytes_bounded(buffer, MAX_NAME_LENGTH)?;
        cursor += delta;
        let end = cursor
            .checked_add(len as usize)
            .ok_or_else(|| ModelsError::DeserializeError("name length overflow".into()))?;
        if buffer.len() < end {
            return Err(ModelsError::DeserializeError(
                "buffer too small to contain name".into(),
            ));
        }
        let name = std::str::from_utf8(&buffer[cursor..end])
            .map_err(|_| ModelsError::DeserializeError("name is not valid utf8".into()))?;
        Ok((Name(name.to_string()), end))
    }
}
