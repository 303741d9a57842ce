use log::{info, warn};

use crate::{Error, Result};

use super::{Backend, BlockIterator, BlockKey, BlockStore};

/// Tracing store, for debugging pipelines.
///
/// Every call is logged. Without a backend the store is a sink: writes
/// and deletes are swallowed, existence checks answer `false`, reads and
/// iteration return `NotImpl`. With a backend every call is forwarded and
/// its outcome logged.
pub struct DummyStore {
    name: String,
    backend: Option<Backend>,
}

impl DummyStore {
    pub fn new(name: &str) -> Self {
        Self {
            name: format!("dummy/{}", name),
            backend: None,
        }
    }

    pub fn proxy(name: &str, backend: Backend) -> Self {
        Self {
            name: format!("dummy/{}", name),
            backend: Some(backend),
        }
    }

    fn log_failure(&self, operation: &str, err: &Error) {
        warn!("{}: {}: backend returned \"{}\"", self.name, operation, err);
    }
}

impl BlockStore for DummyStore {
    fn name(&self) -> &str {
        &self.name
    }

    fn blocks_exist(&self, keys: &[BlockKey]) -> Result<Vec<bool>> {
        info!("{}: blocks_exist ({} keys)", self.name, keys.len());
        let backend = match &self.backend {
            Some(backend) => backend,
            None => return Ok(vec![false; keys.len()]),
        };
        let result = backend.store().blocks_exist(keys);
        match &result {
            Ok(answers) => {
                for (key, exists) in keys.iter().zip(answers) {
                    info!(
                        "{}: block {} does {}exist",
                        self.name,
                        key,
                        if *exists { "" } else { "NOT " }
                    );
                }
            }
            Err(err) => self.log_failure("blocks_exist", err),
        }
        result
    }

    fn read_block(&self, key: &BlockKey) -> Result<Vec<u8>> {
        info!("{}: read_block ({})", self.name, key);
        let backend = match &self.backend {
            Some(backend) => backend,
            None => return Err(Error::NotImpl),
        };
        let result = backend.store().read_block(key);
        if let Err(err) = &result {
            self.log_failure("read_block", err);
        }
        result
    }

    fn write_block(&self, key: &BlockKey, block: &[u8]) -> Result<()> {
        info!("{}: write_block ({}, {} bytes)", self.name, key, block.len());
        let backend = match &self.backend {
            Some(backend) => backend,
            None => return Ok(()),
        };
        let result = backend.store().write_block(key, block);
        if let Err(err) = &result {
            self.log_failure("write_block", err);
        }
        result
    }

    fn delete_block(&self, key: &BlockKey) -> Result<()> {
        info!("{}: delete_block ({})", self.name, key);
        let backend = match &self.backend {
            Some(backend) => backend,
            None => return Ok(()),
        };
        let result = backend.store().delete_block(key);
        if let Err(err) = &result {
            self.log_failure("delete_block", err);
        }
        result
    }

    fn first_block(&self) -> Result<BlockIterator> {
        info!("{}: first_block", self.name);
        let backend = match &self.backend {
            Some(backend) => backend,
            None => return Err(Error::NotImpl),
        };
        let result = backend.store().first_block();
        if let Err(err) = &result {
            if !err.is_end() {
                self.log_failure("first_block", err);
            }
        }
        result
    }

    fn sync(&self) -> Result<()> {
        info!("{}: sync", self.name);
        let backend = match &self.backend {
            Some(backend) => backend,
            None => return Ok(()),
        };
        let result = backend.store().sync();
        if let Err(err) = &result {
            self.log_failure("sync", err);
        }
        result
    }

    fn close(&self) -> Result<()> {
        info!("{}: close", self.name);
        match &self.backend {
            Some(backend) => backend.release(),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use crate::store::{MemStore, ProxySemantics};

    use super::*;

    #[test]
    fn backendless_dummy_swallows_writes_and_rejects_reads() {
        let store = DummyStore::new("data");
        let key = BlockKey::from(&b"k"[..]);
        store.write_block(&key, b"ignored").unwrap();
        assert_eq!(store.blocks_exist(&[key.clone()]).unwrap(), vec![false]);
        assert!(matches!(store.read_block(&key), Err(Error::NotImpl)));
        assert!(matches!(store.first_block(), Err(Error::NotImpl)));
        store.close().unwrap();
    }

    #[test]
    fn proxy_dummy_forwards_everything() {
        let backend = Arc::new(MemStore::new("backend"));
        let store = DummyStore::proxy(
            "data",
            Backend::new(backend.clone(), ProxySemantics::LeaveAsIs),
        );
        let key = BlockKey::from(&b"k"[..]);
        store.write_block(&key, b"forwarded").unwrap();
        assert_eq!(store.read_block(&key).unwrap(), b"forwarded");
        assert_eq!(backend.read_block(&key).unwrap(), b"forwarded");
        assert_eq!(store.blocks_exist(&[key]).unwrap(), vec![true]);
    }
}
