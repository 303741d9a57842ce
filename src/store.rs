//! Block stores.
//!
//! A block store is a mapping from opaque [`BlockKey`]s to byte blobs.
//! The base implementations persist blocks in memory ([`MemStore`]) or in
//! a directory tree ([`FsStore`]); the proxy implementations wrap a
//! backend to add dedup ([`SmartStore`]), per-block compression
//! ([`FilteredStore`]), statistics ([`StatStore`]) or call tracing
//! ([`DummyStore`]). Proxies never change keys, so content addressing is
//! preserved through any stack of them.
//!
//! Stores are not required to support concurrent writers; callers
//! serialize access themselves. Iterators enumerate the keys present when
//! iteration started and are invalidated by concurrent mutation.

use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

use crate::{Error, Result};

/// An opaque key naming a block in a store. Equality is byte equality.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BlockKey(Vec<u8>);

impl BlockKey {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn from_hex(hex_str: &str) -> Result<Self> {
        let bytes = hex::decode(hex_str)
            .map_err(|err| Error::InvalidArg(format!("bad hex key - {}", err)))?;
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }
}

impl Deref for BlockKey {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.0
    }
}

impl From<&[u8]> for BlockKey {
    fn from(bytes: &[u8]) -> Self {
        Self(bytes.to_vec())
    }
}

impl From<Vec<u8>> for BlockKey {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl fmt::Display for BlockKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for BlockKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "BlockKey({})", self.to_hex())
    }
}

/// What releasing a proxy does to its backend.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProxySemantics {
    /// The backend belongs to someone else; leave it untouched.
    LeaveAsIs,
    /// Close the backend when the proxy is closed or dropped.
    EventuallyClose,
    /// Close the backend and drop the proxy's reference to it.
    EventuallyDestroy,
}

/// A proxy's handle on its backend store, paired with the ownership
/// semantics chosen at construction. Dropping the proxy drops this handle,
/// which closes the backend for the two owning semantics.
pub struct Backend {
    store: Arc<dyn BlockStore>,
    semantics: ProxySemantics,
}

impl Backend {
    pub fn new(store: Arc<dyn BlockStore>, semantics: ProxySemantics) -> Self {
        Self { store, semantics }
    }

    pub fn store(&self) -> &dyn BlockStore {
        self.store.as_ref()
    }

    pub fn semantics(&self) -> ProxySemantics {
        self.semantics
    }

    /// Apply the proxy semantics; called from the owning proxy's
    /// `close`. Safe to call more than once since `close` is idempotent.
    pub fn release(&self) -> Result<()> {
        match self.semantics {
            ProxySemantics::LeaveAsIs => Ok(()),
            ProxySemantics::EventuallyClose | ProxySemantics::EventuallyDestroy => {
                self.store.close()
            }
        }
    }
}

impl Drop for Backend {
    fn drop(&mut self) {
        let _ = self.release();
    }
}

/// Key cursor over a store's contents.
///
/// A fresh iterator points at the first key. `next` advances; on
/// exhaustion it returns `Err(StoreEnd)` and the iterator becomes nil.
pub struct BlockIterator {
    current: Option<BlockKey>,
    source: Box<dyn Iterator<Item = Result<BlockKey>>>,
}

impl BlockIterator {
    /// Build an iterator from a key source. Returns `Err(StoreEnd)` when
    /// the source is empty, matching `first_block` on an empty store.
    pub fn new(mut source: Box<dyn Iterator<Item = Result<BlockKey>>>) -> Result<Self> {
        match source.next() {
            Some(Ok(key)) => Ok(Self {
                current: Some(key),
                source,
            }),
            Some(Err(err)) => Err(err),
            None => Err(Error::StoreEnd),
        }
    }

    pub fn key(&self) -> Option<&BlockKey> {
        self.current.as_ref()
    }

    pub fn is_nil(&self) -> bool {
        self.current.is_none()
    }

    pub fn next(&mut self) -> Result<()> {
        match self.source.next() {
            Some(Ok(key)) => {
                self.current = Some(key);
                Ok(())
            }
            Some(Err(err)) => {
                self.current = None;
                Err(err)
            }
            None => {
                self.current = None;
                Err(Error::StoreEnd)
            }
        }
    }
}

/// The block store contract.
///
/// After a successful `write_block`, `blocks_exist` reports the key and
/// `read_block` returns exactly the written bytes. Writing the same key
/// twice is idempotent; the stored bytes equal the last successful write.
pub trait BlockStore: Send + Sync {
    fn name(&self) -> &str;

    /// One answer per key. `Err(NotImpl)` where the backend cannot
    /// answer existence queries.
    fn blocks_exist(&self, keys: &[BlockKey]) -> Result<Vec<bool>>;

    /// `Err(BlockUnavailable)` when the key is unknown.
    fn read_block(&self, key: &BlockKey) -> Result<Vec<u8>>;

    fn write_block(&self, key: &BlockKey, block: &[u8]) -> Result<()>;

    /// `Err(BlockUnavailable)` when the key is unknown, `Err(NotImpl)`
    /// where deletion is unsupported.
    fn delete_block(&self, key: &BlockKey) -> Result<()>;

    /// Iterator over every stored key, in unspecified order.
    /// `Err(StoreEnd)` when the store is empty, `Err(NotImpl)` where
    /// enumeration is unsupported.
    fn first_block(&self) -> Result<BlockIterator>;

    /// Flush buffers; prior writes are durable once this returns (for
    /// stores that claim durability).
    fn sync(&self) -> Result<()>;

    /// Idempotent resource release.
    fn close(&self) -> Result<()>;

    /// Convenience single-key existence check.
    fn block_exists(&self, key: &BlockKey) -> Result<bool> {
        Ok(self.blocks_exist(std::slice::from_ref(key))?[0])
    }
}

/// Collect every key of a store. `Ok(empty)` for an empty store.
pub fn collect_keys(store: &dyn BlockStore) -> Result<Vec<BlockKey>> {
    let mut keys = Vec::new();
    let mut iterator = match store.first_block() {
        Ok(iterator) => iterator,
        Err(Error::StoreEnd) => return Ok(keys),
        Err(err) => return Err(err),
    };
    while let Some(key) = iterator.key() {
        keys.push(key.clone());
        match iterator.next() {
            Ok(()) => {}
            Err(Error::StoreEnd) => break,
            Err(err) => return Err(err),
        }
    }
    Ok(keys)
}

mod memory;
pub use memory::*;

mod fs;
pub use fs::*;

mod dummy;
pub use dummy::*;

mod smart;
pub use smart::*;

mod filtered;
pub use filtered::*;

mod stats;
pub use stats::*;

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn key_equality_is_byte_equality() {
        let a = BlockKey::from(&b"abc"[..]);
        let b = BlockKey::new(b"abc".to_vec());
        let c = BlockKey::from(&b"abd"[..]);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn key_hex_round_trip() {
        let key = BlockKey::new(vec![0xde, 0xad, 0xbe, 0xef]);
        assert_eq!(key.to_hex(), "deadbeef");
        assert_eq!(BlockKey::from_hex("deadbeef").unwrap(), key);
        assert!(BlockKey::from_hex("nothex").is_err());
    }
}
