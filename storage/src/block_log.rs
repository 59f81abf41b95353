use crate::config::StorageConfig;
use crate::error::StorageError;
use models::{DeserializeCompact, SerializeCompact, SignedBlock};
use std::convert::TryInto;

/// Append-only log of irreversible blocks, keyed by big-endian block number
/// so that sled iterates in chain order.
pub struct BlockLog {
    num_to_block: sled::Tree,
    _db: sled::Db,
}

impl BlockLog {
    pub fn open(cfg: &StorageConfig) -> Result<BlockLog, StorageError> {
        let sled_config = sled::Config::default()
            .path(&cfg.path)
            .cache_capacity(cfg.cache_capacity)
            .flush_every_ms(cfg.flush_interval_ms);
        let db = sled_config.open()?;
        let num_to_block = db.open_tree("num_to_block")?;
        Ok(BlockLog {
            num_to_block,
            _db: db,
        })
    }

    /// Number of the most recently appended block, if any.
    pub fn last_block_num(&self) -> Result<Option<u32>, StorageError> {
        Ok(match self.num_to_block.last()? {
            Some((key, _)) => {
                let key: [u8; 4] = key.as_ref().try_into().map_err(|_| {
                    StorageError::DatabaseInconsistency("malformed block log key".into())
                })?;
                Some(u32::from_be_bytes(key))
            }
            None => None,
        })
    }

    /// Append an irreversible block. Numbers must be contiguous.
    pub fn append(&self, block: &SignedBlock) -> Result<(), StorageError> {
        let block_num = block.block_num();
        let expected = self.last_block_num()?.map_or(1, |last| last + 1);
        if block_num != expected {
            return Err(StorageError::AddBlockError(format!(
                "block {} appended out of order, expected {}",
                block_num, expected
            )));
        }
        self.num_to_block
            .insert(block_num.to_be_bytes(), block.to_bytes_compact()?)?;
        Ok(())
    }

    pub fn read_block(&self, block_num: u32) -> Result<Option<SignedBlock>, StorageError> {
        match self.num_to_block.get(block_num.to_be_bytes())? {
            Some(bytes) => {
                let (block, _) = SignedBlock::from_bytes_compact(&bytes)?;
                Ok(Some(block))
            }
            None => Ok(None),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.num_to_block.is_empty()
    }

    pub fn flush(&self) -> Result<(), StorageError> {
        self.num_to_block.flush()?;
        Ok(())
    }
}
