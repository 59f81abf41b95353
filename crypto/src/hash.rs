use crate::error::CryptoError;
use serde::{Deserialize, Serialize};
use std::convert::TryInto;
use std::str::FromStr;

pub const HASH_SIZE_BYTES: usize = 32;

/// Blake3 digest wrapper. All chain identifiers and merkle nodes are built
/// from this type.
#[derive(Copy, Clone, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Hash([u8; HASH_SIZE_BYTES]);

impl std::fmt::Display for Hash {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.to_bs58_check())
    }
}

impl std::fmt::Debug for Hash {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.to_bs58_check())
    }
}

impl FromStr for Hash {
    type Err = CryptoError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Hash::from_bs58_check(s)
    }
}

impl Hash {
    /// Digest a byte slice.
    pub fn hash(data: &[u8]) -> Self {
        Hash(*blake3::hash(data).as_bytes())
    }

    /// Digest the concatenation of several byte slices without an
    /// intermediate allocation.
    pub fn hash_parts(parts: &[&[u8]]) -> Self {
        let mut hasher = blake3::Hasher::new();
        for part in parts {
            hasher.update(part);
        }
        Hash(*hasher.finalize().as_bytes())
    }

    pub fn zero() -> Self {
        Hash([0u8; HASH_SIZE_BYTES])
    }

    pub fn to_bytes(&self) -> [u8; HASH_SIZE_BYTES] {
        self.0
    }

    pub fn into_bytes(self) -> [u8; HASH_SIZE_BYTES] {
        self.0
    }

    pub fn from_bytes(data: &[u8; HASH_SIZE_BYTES]) -> Self {
        Hash(*data)
    }

    pub fn from_slice(data: &[u8]) -> Result<Self, CryptoError> {
        Ok(Hash(data.try_into().map_err(|_| {
            CryptoError::ParsingError("hash has wrong length".to_string())
        })?))
    }

    pub fn to_bs58_check(&self) -> String {
        bs58::encode(self.to_bytes()).with_check().into_string()
    }

    pub fn from_bs58_check(data: &str) -> Result<Hash, CryptoError> {
        let decoded = bs58::decode(data)
            .with_check(None)
            .into_vec()
            .map_err(|err| {
                CryptoError::ParsingError(format!("hash bs58_check parsing error: {:?}", err))
            })?;
        Hash::from_slice(&decoded)
    }
}
