use log::debug;

use crate::{Error, Result};

use super::{Backend, BlockIterator, BlockKey, BlockStore};

/// Deduplicating proxy: a write is forwarded only when the backend does
/// not already hold the key.
///
/// With content-addressed keys the payload under a key never changes, so
/// skipping the transfer is safe and turns repeated archives into cheap
/// no-ops, which matters most over slow or remote backends. A backend
/// that cannot answer existence queries gets every write.
pub struct SmartStore {
    name: String,
    backend: Backend,
}

impl SmartStore {
    pub fn new(backend: Backend) -> Self {
        let name = format!("smart/{}", backend.store().name());
        Self { name, backend }
    }
}

impl BlockStore for SmartStore {
    fn name(&self) -> &str {
        &self.name
    }

    fn blocks_exist(&self, keys: &[BlockKey]) -> Result<Vec<bool>> {
        self.backend.store().blocks_exist(keys)
    }

    fn read_block(&self, key: &BlockKey) -> Result<Vec<u8>> {
        self.backend.store().read_block(key)
    }

    fn write_block(&self, key: &BlockKey, block: &[u8]) -> Result<()> {
        match self.backend.store().block_exists(key) {
            Ok(true) => {
                debug!("{}: dropping redundant write of {}", self.name, key);
                Ok(())
            }
            Ok(false) | Err(Error::NotImpl) => self.backend.store().write_block(key, block),
            Err(err) => Err(err),
        }
    }

    fn delete_block(&self, key: &BlockKey) -> Result<()> {
        self.backend.store().delete_block(key)
    }

    fn first_block(&self) -> Result<BlockIterator> {
        self.backend.store().first_block()
    }

    fn sync(&self) -> Result<()> {
        self.backend.store().sync()
    }

    fn close(&self) -> Result<()> {
        self.backend.release()
    }
}
