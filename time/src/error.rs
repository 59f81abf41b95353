use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TimeError {
    #[error("time overflow")]
    TimeOverflowError,
    #[error("checked operation error: {0}")]
    CheckedOperationError(String),
    #[error("time conversion error")]
    ConversionError,
}
