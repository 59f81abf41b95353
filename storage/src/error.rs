use displaydoc::Display;
use models::ModelsError;
use thiserror::Error;

#[derive(Display, Error, Debug)]
pub enum StorageError {
    /// sled error: {0}
    SledError(#[from] sled::Error),
    /// model error: {0}
    ModelError(#[from] ModelsError),
    /// database inconsistency error: {0}
    DatabaseInconsistency(String),
    /// add block error: {0}
    AddBlockError(String),
}
