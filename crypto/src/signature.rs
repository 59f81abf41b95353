use crate::error::CryptoError;
use crate::hash::Hash;
use secp256k1::ecdsa::{RecoverableSignature, RecoveryId};
use secp256k1::{All, Message, Secp256k1};
use std::convert::TryInto;
use std::str::FromStr;

pub const PRIVATE_KEY_SIZE_BYTES: usize = 32;
pub const PUBLIC_KEY_SIZE_BYTES: usize = 33;
/// Compact signature plus one recovery-id byte.
pub const SIGNATURE_SIZE_BYTES: usize = 65;

/// Private key used to sign block headers and transactions.
#[derive(Copy, Clone, PartialEq, Eq)]
pub struct PrivateKey(secp256k1::SecretKey);

impl std::fmt::Display for PrivateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.to_bs58_check())
    }
}

impl std::fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.to_bs58_check())
    }
}

impl FromStr for PrivateKey {
    type Err = CryptoError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PrivateKey::from_bs58_check(s)
    }
}

impl PrivateKey {
    pub fn to_bs58_check(&self) -> String {
        bs58::encode(self.to_bytes()).with_check().into_string()
    }

    pub fn to_bytes(&self) -> [u8; PRIVATE_KEY_SIZE_BYTES] {
        self.0.secret_bytes()
    }

    pub fn from_bytes(data: &[u8; PRIVATE_KEY_SIZE_BYTES]) -> Result<PrivateKey, CryptoError> {
        Ok(PrivateKey(secp256k1::SecretKey::from_slice(data).map_err(
            |err| CryptoError::ParsingError(format!("private key parsing error: {:?}", err)),
        )?))
    }

    pub fn from_bs58_check(data: &str) -> Result<PrivateKey, CryptoError> {
        let decoded = bs58::decode(data)
            .with_check(None)
            .into_vec()
            .map_err(|err| {
                CryptoError::ParsingError(format!(
                    "private key bs58_check parsing error: {:?}",
                    err
                ))
            })?;
        PrivateKey::from_bytes(&decoded.try_into().map_err(|_| {
            CryptoError::ParsingError("private key has wrong length".to_string())
        })?)
    }
}

/// Public key identifying a block producer or a transaction signer.
#[derive(Copy, Clone, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct PublicKey(secp256k1::PublicKey);

impl std::fmt::Display for PublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.to_bs58_check())
    }
}

impl std::fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.to_bs58_check())
    }
}

impl FromStr for PublicKey {
    type Err = CryptoError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PublicKey::from_bs58_check(s)
    }
}

impl PublicKey {
    pub fn to_bs58_check(&self) -> String {
        bs58::encode(self.to_bytes()).with_check().into_string()
    }

    pub fn to_bytes(&self) -> [u8; PUBLIC_KEY_SIZE_BYTES] {
        self.0.serialize()
    }

    pub fn from_bytes(data: &[u8; PUBLIC_KEY_SIZE_BYTES]) -> Result<PublicKey, CryptoError> {
        Ok(PublicKey(secp256k1::PublicKey::from_slice(data).map_err(
            |err| CryptoError::ParsingError(format!("public key parsing error: {:?}", err)),
        )?))
    }

    pub fn from_bs58_check(data: &str) -> Result<PublicKey, CryptoError> {
        let decoded = bs58::decode(data)
            .with_check(None)
            .into_vec()
            .map_err(|err| {
                CryptoError::ParsingError(format!("public key bs58_check parsing error: {:?}", err))
            })?;
        PublicKey::from_bytes(
            &decoded
                .try_into()
                .map_err(|_| CryptoError::ParsingError("public key has wrong length".to_string()))?,
        )
    }
}

/// Recoverable ECDSA signature.
#[derive(Copy, Clone, PartialEq, Eq)]
pub struct Signature(RecoverableSignature);

impl std::fmt::Display for Signature {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.to_bs58_check())
    }
}

impl std::fmt::Debug for Signature {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.to_bs58_check())
    }
}

impl FromStr for Signature {
    type Err = CryptoError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Signature::from_bs58_check(s)
    }
}

impl Signature {
    pub fn to_bs58_check(&self) -> String {
        bs58::encode(self.to_bytes()).with_check().into_string()
    }

    pub fn to_bytes(&self) -> [u8; SIGNATURE_SIZE_BYTES] {
        let (recovery_id, compact) = self.0.serialize_compact();
        let mut res = [0u8; SIGNATURE_SIZE_BYTES];
        res[0] = recovery_id.to_i32() as u8;
        res[1..].clone_from_slice(&compact);
        res
    }

    pub fn from_bytes(data: &[u8; SIGNATURE_SIZE_BYTES]) -> Result<Signature, CryptoError> {
        let recovery_id = RecoveryId::from_i32(data[0] as i32).map_err(|err| {
            CryptoError::ParsingError(format!("signature recovery id parsing error: {:?}", err))
        })?;
        Ok(Signature(
            RecoverableSignature::from_compact(&data[1..], recovery_id).map_err(|err| {
                CryptoError::ParsingError(format!("signature parsing error: {:?}", err))
            })?,
        ))
    }

    pub fn from_bs58_check(data: &str) -> Result<Signature, CryptoError> {
        let decoded = bs58::decode(data)
            .with_check(None)
            .into_vec()
            .map_err(|err| {
                CryptoError::ParsingError(format!("signature bs58_check parsing error: {:?}", err))
            })?;
        Signature::from_bytes(
            &decoded
                .try_into()
                .map_err(|_| CryptoError::ParsingError("signature has wrong length".to_string()))?,
        )
    }
}

/// Stateless signing / verification / recovery context.
pub struct SignatureEngine(Secp256k1<All>);

impl Default for SignatureEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl SignatureEngine {
    pub fn new() -> SignatureEngine {
        SignatureEngine(Secp256k1::new())
    }

    pub fn derive_public_key(&self, private_key: &PrivateKey) -> PublicKey {
        PublicKey(secp256k1::PublicKey::from_secret_key(
            &self.0,
            &private_key.0,
        ))
    }

    pub fn sign(&self, digest: &Hash, private_key: &PrivateKey) -> Result<Signature, CryptoError> {
        let message = Message::from_slice(&digest.to_bytes()).map_err(|err| {
            CryptoError::SignatureError(format!("digest is not signable: {:?}", err))
        })?;
        Ok(Signature(
            self.0.sign_ecdsa_recoverable(&message, &private_key.0),
        ))
    }

    /// Recover the public key that produced `signature` over `digest`.
    pub fn recover(&self, digest: &Hash, signature: &Signature) -> Result<PublicKey, CryptoError> {
        let message = Message::from_slice(&digest.to_bytes()).map_err(|err| {
            CryptoError::SignatureError(format!("digest is not recoverable: {:?}", err))
        })?;
        Ok(PublicKey(
            self.0.recover_ecdsa(&message, &signature.0).map_err(|err| {
                CryptoError::SignatureError(format!("signature recovery failed: {:?}", err))
            })?,
        ))
    }

    pub fn verify(
        &self,
        digest: &Hash,
        signature: &Signature,
        public_key: &PublicKey,
    ) -> Result<bool, CryptoError> {
        Ok(self.recover(digest, signature)? == *public_key)
    }
}

/// Generate a random private key, mostly for producers and tests.
pub fn generate_random_private_key() -> PrivateKey {
    PrivateKey(secp256k1::SecretKey::new(&mut rand::thread_rng()))
}

mod serde_impl {
    use super::{PrivateKey, PublicKey, Signature};
    use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
    use std::str::FromStr;

    macro_rules! bs58_serde {
        ($name:ident) => {
            impl Serialize for $name {
                fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
                    s.serialize_str(&self.to_bs58_check())
                }
            }

            impl<'de> Deserialize<'de> for $name {
                fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
                    let repr = String::deserialize(d)?;
                    $name::from_str(&repr).map_err(de::Error::custom)
                }
            }
        };
    }

    bs58_serde!(PrivateKey);
    bs58_serde!(PublicKey);
    bs58_serde!(Signature);
}
