use serde::Deserialize;
use std::path::PathBuf;

/// Block log configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Directory holding the sled database.
    pub path: PathBuf,
    /// Maximum on-heap cache size in bytes.
    pub cache_capacity: u64,
    /// Flush interval; None lets sled decide.
    pub flush_interval_ms: Option<u64>,
}
