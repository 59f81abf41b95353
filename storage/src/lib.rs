mod block_log;
mod config;
mod error;

pub use block_log::BlockLog;
pub use config::StorageConfig;
pub use error::StorageError;
