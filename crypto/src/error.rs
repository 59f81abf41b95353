use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    #[error("parsing error: {0}")]
    ParsingError(String),
    #[error("signature error: {0}")]
    SignatureError(String),
}
