use std::collections::BTreeMap;
use std::sync::Mutex;

use crate::{Error, Result};

use super::{BlockIterator, BlockKey, BlockStore};

/// In-memory block store backed by an ordered map, so iteration order is
/// deterministic. The workhorse of the test suite and of short-lived
/// pipelines.
pub struct MemStore {
    name: String,
    blocks: Mutex<BTreeMap<BlockKey, Vec<u8>>>,
}

impl MemStore {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            blocks: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn block_count(&self) -> usize {
        self.blocks.lock().unwrap().len()
    }
}

impl BlockStore for MemStore {
    fn name(&self) -> &str {
        &self.name
    }

    fn blocks_exist(&self, keys: &[BlockKey]) -> Result<Vec<bool>> {
        let blocks = self.blocks.lock().unwrap();
        Ok(keys.iter().map(|key| blocks.contains_key(key)).collect())
    }

    fn read_block(&self, key: &BlockKey) -> Result<Vec<u8>> {
        let blocks = self.blocks.lock().unwrap();
        blocks.get(key).cloned().ok_or(Error::BlockUnavailable)
    }

    fn write_block(&self, key: &BlockKey, block: &[u8]) -> Result<()> {
        let mut blocks = self.blocks.lock().unwrap();
        blocks.insert(key.clone(), block.to_vec());
        Ok(())
    }

    fn delete_block(&self, key: &BlockKey) -> Result<()> {
        let mut blocks = self.blocks.lock().unwrap();
        match blocks.remove(key) {
            Some(_) => Ok(()),
            None => Err(Error::BlockUnavailable),
        }
    }

    fn first_block(&self) -> Result<BlockIterator> {
        let keys: Vec<BlockKey> = self.blocks.lock().unwrap().keys().cloned().collect();
        BlockIterator::new(Box::new(keys.into_iter().map(Ok)))
    }

    fn sync(&self) -> Result<()> {
        Ok(())
    }

    fn close(&self) -> Result<()> {
        Ok(())
    }
}
