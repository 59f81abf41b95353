use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ModelsError {
    #[error("hash error")]
    HashError,
    #[error("serialization error: {0}")]
    SerializeError(String),
    #[error("deserialization error: {0}")]
    DeserializeError(String),
    #[error("time error: {0}")]
    TimeError(#[from] time::TimeError),
    #[error("crypto error: {0}")]
    CryptoError(#[from] crypto::CryptoError),
}
