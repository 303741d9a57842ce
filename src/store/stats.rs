use std::collections::HashSet;
use std::fmt;
use std::sync::Mutex;

use serde::Serialize;

use crate::{Error, Result};

use super::{Backend, BlockIterator, BlockKey, BlockStore};

/// Counters describing the write traffic seen by a store.
///
/// A *virgin* write is one whose key had not been written through the
/// observing proxy before; it measures new content as opposed to raw I/O.
#[derive(Clone, Debug, Serialize)]
pub struct BlockStoreStats {
    name: String,
    blocks_written: u64,
    bytes_written: u64,
    virgin_blocks: u64,
    virgin_bytes: u64,
    average_block_size: f64,
    min_block_size: u64,
    max_block_size: u64,
}

impl BlockStoreStats {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            blocks_written: 0,
            bytes_written: 0,
            virgin_blocks: 0,
            virgin_bytes: 0,
            average_block_size: 0.0,
            min_block_size: 0,
            max_block_size: 0,
        }
    }

    pub fn update(&mut self, block_size: usize, virgin: bool) {
        let block_size = block_size as u64;
        self.blocks_written += 1;
        self.bytes_written += block_size;
        if virgin {
            self.virgin_blocks += 1;
            self.virgin_bytes += block_size;
        }
        if self.blocks_written == 1 {
            self.min_block_size = block_size;
            self.max_block_size = block_size;
        } else {
            self.min_block_size = self.min_block_size.min(block_size);
            self.max_block_size = self.max_block_size.max(block_size);
        }
        self.average_block_size = self.bytes_written as f64 / self.blocks_written as f64;
    }

    pub fn clear(&mut self) {
        *self = Self::new(&self.name);
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn blocks_written(&self) -> u64 {
        self.blocks_written
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    pub fn virgin_blocks(&self) -> u64 {
        self.virgin_blocks
    }

    pub fn virgin_bytes(&self) -> u64 {
        self.virgin_bytes
    }

    pub fn average_block_size(&self) -> f64 {
        self.average_block_size
    }

    pub fn min_block_size(&self) -> u64 {
        self.min_block_size
    }

    pub fn max_block_size(&self) -> u64 {
        self.max_block_size
    }
}

impl fmt::Display for BlockStoreStats {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "* store `{}':", self.name)?;
        writeln!(
            f,
            "  blocks written:       {} ({} bytes)",
            self.blocks_written, self.bytes_written
        )?;
        writeln!(
            f,
            "  virgin blocks:        {} ({} bytes)",
            self.virgin_blocks, self.virgin_bytes
        )?;
        write!(
            f,
            "  block size:           min {} / avg {:.1} / max {}",
            self.min_block_size, self.average_block_size, self.max_block_size
        )
    }
}

struct StatInner {
    stats: BlockStoreStats,
    seen: HashSet<BlockKey>,
}

/// Statistics-gathering proxy.
///
/// Counts every successful write and classifies it as virgin or repeat.
/// Without a backend it degrades to a counting sink whose reads return
/// `NotImpl`, which is still useful for dry runs.
pub struct StatStore {
    name: String,
    backend: Option<Backend>,
    inner: Mutex<StatInner>,
}

impl StatStore {
    pub fn new(name: &str, backend: Option<Backend>) -> Self {
        Self {
            name: format!("stat/{}", name),
            backend,
            inner: Mutex::new(StatInner {
                stats: BlockStoreStats::new(name),
                seen: HashSet::new(),
            }),
        }
    }

    /// Snapshot of the counters gathered so far.
    pub fn stats(&self) -> BlockStoreStats {
        self.inner.lock().unwrap().stats.clone()
    }
}

impl BlockStore for StatStore {
    fn name(&self) -> &str {
        &self.name
    }

    fn blocks_exist(&self, keys: &[BlockKey]) -> Result<Vec<bool>> {
        match &self.backend {
            Some(backend) => backend.store().blocks_exist(keys),
            None => Ok(vec![false; keys.len()]),
        }
    }

    fn read_block(&self, key: &BlockKey) -> Result<Vec<u8>> {
        match &self.backend {
            Some(backend) => backend.store().read_block(key),
            None => Err(Error::NotImpl),
        }
    }

    fn write_block(&self, key: &BlockKey, block: &[u8]) -> Result<()> {
        if let Some(backend) = &self.backend {
            backend.store().write_block(key, block)?;
        }
        let mut inner = self.inner.lock().unwrap();
        let virgin = inner.seen.insert(key.clone());
        inner.stats.update(block.len(), virgin);
        Ok(())
    }

    fn delete_block(&self, key: &BlockKey) -> Result<()> {
        match &self.backend {
            Some(backend) => backend.store().delete_block(key),
            None => Err(Error::NotImpl),
        }
    }

    fn first_block(&self) -> Result<BlockIterator> {
        match &self.backend {
            Some(backend) => backend.store().first_block(),
            None => Err(Error::NotImpl),
        }
    }

    fn sync(&self) -> Result<()> {
        match &self.backend {
            Some(backend) => backend.store().sync(),
            None => Ok(()),
        }
    }

    fn close(&self) -> Result<()> {
        match &self.backend {
            Some(backend) => backend.release(),
            None => Ok(()),
        }
    }
}
