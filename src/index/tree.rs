use std::sync::Arc;

use crate::chopper::Chopper;
use crate::stream::Stream;
use crate::{Error, Result};

use crate::store::BlockStore;

use super::{BlockFetcher, BlockIndexer, HandleClass, IndexHandle};

/// Key-block flag: the packed children are data blocks, not key blocks.
const LEAF_CHILDREN_FLAG: u8 = 0x01;

/// Byte count of the key-block header (flags + child count).
const KEY_BLOCK_HEADER_SIZE: usize = 5;

/// Names an indexed stream: the root handle plus what the decoder needs
/// to interpret it.
///
/// `root_is_leaf` distinguishes the single-data-block stream (the root
/// lives in the data store) from a real tree (the root is a key block in
/// the metadata store). `total_size` is the stream's byte count as read
/// from the chopper, before any padding; the decoder cuts its output
/// there, and length queries need no traversal.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TreeHandle {
    pub root: IndexHandle,
    pub root_is_leaf: bool,
    pub total_size: u64,
}

/// Packs a stream of block handles into a balanced tree of key blocks.
///
/// `indices_per_block` is the fan-out: each key block holds at most that
/// many child handles. Data blocks go to the data store as the chopper
/// yields them; key blocks go to the metadata store, and a key block is
/// only ever written after all of its children, so a handle never
/// references anything that is not already stored.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TreeIndexer {
    indices_per_block: usize,
}

impl TreeIndexer {
    pub fn new(indices_per_block: usize) -> Result<Self> {
        if indices_per_block == 0 {
            return Err(Error::InvalidArg(
                "indices_per_block must be at least 1".to_string(),
            ));
        }
        Ok(Self { indices_per_block })
    }

    pub fn indices_per_block(&self) -> usize {
        self.indices_per_block
    }

    /// The fan-out actually used for packing. One index per block cannot
    /// converge (every key block would need a parent of its own), so the
    /// degenerate K=1 configuration packs pairs.
    fn effective_fanout(&self) -> usize {
        self.indices_per_block.max(2)
    }

    /// Index every block of `chopper` and return the handle naming the
    /// resulting tree. `Err(EmptySource)` when the stream has no blocks.
    pub fn index_blocks(
        &self,
        chopper: &mut dyn Chopper,
        block_indexer: &BlockIndexer,
        data_store: &dyn BlockStore,
        meta_store: &dyn BlockStore,
    ) -> Result<TreeHandle> {
        let mut levels: Vec<Vec<IndexHandle>> = Vec::new();
        let mut block = Vec::with_capacity(chopper.typical_block_size());
        let mut block_count = 0u64;

        loop {
            match chopper.read_block(&mut block) {
                Ok(_) => {}
                Err(Error::StreamEnd) => break,
                Err(err) => return Err(err),
            }
            block_count += 1;
            let handle = block_indexer.index_block(data_store, &block)?;
            self.push_handle(&mut levels, 0, handle, block_indexer, meta_store)?;
        }

        if block_count == 0 {
            return Err(Error::EmptySource);
        }
        let total_size = chopper.bytes_consumed();

        // Close the remaining levels bottom-up. A topmost level holding a
        // single handle is the root; anything else becomes one more key
        // block carried upward.
        let mut level = 0;
        loop {
            debug_assert!(level < levels.len());
            let handles = std::mem::take(&mut levels[level]);
            if handles.is_empty() {
                level += 1;
                continue;
            }
            if level + 1 >= levels.len() && handles.len() == 1 {
                let root = handles.into_iter().next().expect("one handle");
                return Ok(TreeHandle {
                    root,
                    root_is_leaf: level == 0,
                    total_size,
                });
            }
            let bytes = render_key_block(&handles, level == 0);
            let parent = block_indexer.index_block(meta_store, &bytes)?;
            self.push_handle(&mut levels, level + 1, parent, block_indexer, meta_store)?;
            level += 1;
        }
    }

    /// Append `handle` to `level`, first closing the level into a key
    /// block if it is already full.
    fn push_handle(
        &self,
        levels: &mut Vec<Vec<IndexHandle>>,
        level: usize,
        handle: IndexHandle,
        block_indexer: &BlockIndexer,
        meta_store: &dyn BlockStore,
    ) -> Result<()> {
        if levels.len() <= level {
            levels.push(Vec::new());
        }
        if levels[level].len() >= self.effective_fanout() {
            let handles = std::mem::take(&mut levels[level]);
            let bytes = render_key_block(&handles, level == 0);
            let parent = block_indexer.index_block(meta_store, &bytes)?;
            self.push_handle(levels, level + 1, parent, block_indexer, meta_store)?;
        }
        levels[level].push(handle);
        Ok(())
    }

    /// Open a lazy stream over the tree named by `handle`.
    pub fn fetch_stream(
        &self,
        handle: &TreeHandle,
        fetcher: &BlockFetcher,
        data_store: Arc<dyn BlockStore>,
        meta_store: Arc<dyn BlockStore>,
    ) -> Result<TreeStream> {
        if handle.root.class() != fetcher.class().handle_class() {
            return Err(Error::InvalidArg(
                "handle class does not match fetcher class".to_string(),
            ));
        }
        Ok(TreeStream::new(
            handle.clone(),
            fetcher.clone(),
            data_store,
            meta_store,
            self.effective_fanout(),
        ))
    }
}

fn render_key_block(handles: &[IndexHandle], leaf_children: bool) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(KEY_BLOCK_HEADER_SIZE + handles.len() * 40);
    bytes.push(if leaf_children { LEAF_CHILDREN_FLAG } else { 0 });
    bytes.extend_from_slice(&(handles.len() as u32).to_le_bytes());
    for handle in handles {
        handle.write_to(&mut bytes);
    }
    bytes
}

fn parse_key_block(
    bytes: &[u8],
    fanout: usize,
    class: HandleClass,
    key_size: usize,
    cipher_key_size: usize,
) -> Result<(bool, Vec<IndexHandle>)> {
    if bytes.len() < KEY_BLOCK_HEADER_SIZE {
        return Err(Error::Integrity("key block shorter than header".to_string()));
    }
    let flags = bytes[0];
    if flags > LEAF_CHILDREN_FLAG {
        return Err(Error::Integrity(format!(
            "key block has unknown flags {:#04x}",
            flags
        )));
    }
    let count = u32::from_le_bytes(bytes[1..5].try_into().expect("header length checked")) as usize;
    if count == 0 || count > fanout {
        return Err(Error::Integrity(format!(
            "key block child count {} outside 1..={}",
            count, fanout
        )));
    }
    let width = IndexHandle::serialized_size(key_size, cipher_key_size);
    let payload = &bytes[KEY_BLOCK_HEADER_SIZE..];
    if payload.len() != count * width {
        return Err(Error::Integrity(format!(
            "key block payload is {} bytes, expected {} x {}",
            payload.len(),
            count,
            width
        )));
    }
    let mut handles = Vec::with_capacity(count);
    for chunk in payload.chunks(width) {
        handles.push(IndexHandle::read_from(chunk, class, key_size, cipher_key_size)?);
    }
    Ok((flags == LEAF_CHILDREN_FLAG, handles))
}

struct Frame {
    children: Vec<IndexHandle>,
    position: usize,
    leaf_children: bool,
}

/// Lazy stream over an indexed tree.
///
/// Holds a depth-first cursor of key-block frames; data blocks are
/// fetched one at a time as reads drain the serve buffer. Blocks touched
/// before a failure have already been delivered, so partial reads ahead
/// of a bad block remain valid.
pub struct TreeStream {
    name: String,
    handle: TreeHandle,
    fetcher: BlockFetcher,
    data_store: Arc<dyn BlockStore>,
    meta_store: Arc<dyn BlockStore>,
    fanout: usize,
    key_size: usize,
    cipher_key_size: usize,
    frames: Vec<Frame>,
    buffer: Vec<u8>,
    buffer_pos: usize,
    remaining: u64,
    started: bool,
    closed: bool,
}

impl TreeStream {
    fn new(
        handle: TreeHandle,
        fetcher: BlockFetcher,
        data_store: Arc<dyn BlockStore>,
        meta_store: Arc<dyn BlockStore>,
        fanout: usize,
    ) -> Self {
        let name = format!("tree/{}", handle.root.key());
        let key_size = handle.root.key().len();
        let cipher_key_size = handle.root.cipher_key().map_or(0, <[u8]>::len);
        let remaining = handle.total_size;
        Self {
            name,
            handle,
            fetcher,
            data_store,
            meta_store,
            fanout,
            key_size,
            cipher_key_size,
            frames: Vec::new(),
            buffer: Vec::new(),
            buffer_pos: 0,
            remaining,
            started: false,
            closed: false,
        }
    }

    /// Total stream length recorded in the handle.
    pub fn len(&self) -> u64 {
        self.handle.total_size
    }

    pub fn is_empty(&self) -> bool {
        self.handle.total_size == 0
    }

    fn push_key_block(&mut self, handle: &IndexHandle) -> Result<()> {
        let bytes = self.fetcher.fetch(self.meta_store.as_ref(), handle)?;
        let (leaf_children, children) = parse_key_block(
            &bytes,
            self.fanout,
            handle.class(),
            self.key_size,
            self.cipher_key_size,
        )?;
        self.frames.push(Frame {
            children,
            position: 0,
            leaf_children,
        });
        Ok(())
    }

    /// Advance the cursor to the next data-block handle, descending into
    /// key blocks as needed.
    fn next_leaf(&mut self) -> Result<Option<IndexHandle>> {
        while let Some(top) = self.frames.last_mut() {
            if top.position >= top.children.len() {
                self.frames.pop();
                continue;
            }
            let child = top.children[top.position].clone();
            top.position += 1;
            if top.leaf_children {
                return Ok(Some(child));
            }
            self.push_key_block(&child)?;
        }
        Ok(None)
    }
}

impl Stream for TreeStream {
    fn name(&self) -> &str {
        &self.name
    }

    fn preferred_block_size(&self) -> usize {
        self.buffer.len().max(8192)
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        loop {
            if self.closed || self.remaining == 0 {
                return Err(Error::StreamEnd);
            }
            if self.buffer_pos < self.buffer.len() {
                let available = self.buffer.len() - self.buffer_pos;
                let count = buf
                    .len()
                    .min(available)
                    .min(self.remaining.min(usize::MAX as u64) as usize);
                buf[..count]
                    .copy_from_slice(&self.buffer[self.buffer_pos..self.buffer_pos + count]);
                self.buffer_pos += count;
                self.remaining -= count as u64;
                if self.remaining == 0 {
                    // anything left in the buffer is chopper padding
                    self.buffer.clear();
                    self.buffer_pos = 0;
                }
                return Ok(count);
            }

            if !self.started {
                self.started = true;
                if self.handle.root_is_leaf {
                    let root = self.handle.root.clone();
                    self.buffer = self.fetcher.fetch(self.data_store.as_ref(), &root)?;
                    self.buffer_pos = 0;
                    continue;
                }
                let root = self.handle.root.clone();
                self.push_key_block(&root)?;
            }

            match self.next_leaf()? {
                Some(handle) => {
                    self.buffer = self.fetcher.fetch(self.data_store.as_ref(), &handle)?;
                    self.buffer_pos = 0;
                }
                None => return Err(Error::StreamEnd),
            }
        }
    }

    fn close(&mut self) {
        self.closed = true;
        self.frames.clear();
        self.buffer.clear();
    }
}

#[cfg(test)]
mod test {
    use crate::chopper::FixedSizeChopper;
    use crate::index::HashMethod;
    use crate::store::{BlockStore, MemStore};
    use crate::stream::MemStream;

    use super::*;

    fn index(
        data: Vec<u8>,
        block_size: usize,
        fanout: usize,
        data_store: &dyn BlockStore,
        meta_store: &dyn BlockStore,
    ) -> Result<TreeHandle> {
        let stream = MemStream::new(data);
        let mut chopper = FixedSizeChopper::new(Box::new(stream), block_size, false)?;
        TreeIndexer::new(fanout)?.index_blocks(
            &mut chopper,
            &BlockIndexer::Hash(HashMethod::Sha256),
            data_store,
            meta_store,
        )
    }

    fn fetch_all(
        handle: &TreeHandle,
        fanout: usize,
        data_store: Arc<MemStore>,
        meta_store: Arc<MemStore>,
    ) -> Result<Vec<u8>> {
        let indexer = TreeIndexer::new(fanout)?;
        let mut stream =
            indexer.fetch_stream(handle, &BlockFetcher::Hash, data_store, meta_store)?;
        let mut out = Vec::new();
        let mut buf = [0u8; 257];
        loop {
            match stream.read(&mut buf) {
                Ok(count) => out.extend_from_slice(&buf[..count]),
                Err(Error::StreamEnd) => return Ok(out),
                Err(err) => return Err(err),
            }
        }
    }

    #[test]
    fn empty_stream_is_rejected() {
        let data_store = MemStore::new("data");
        let meta_store = MemStore::new("meta");
        let result = index(Vec::new(), 16, 4, &data_store, &meta_store);
        assert!(matches!(result, Err(Error::EmptySource)));
        assert_eq!(data_store.block_count(), 0);
        assert_eq!(meta_store.block_count(), 0);
    }

    #[test]
    fn single_block_root_is_the_leaf() {
        let data_store = Arc::new(MemStore::new("data"));
        let meta_store = Arc::new(MemStore::new("meta"));
        let handle = index(b"hello".to_vec(), 4096, 4, &*data_store, &*meta_store).unwrap();

        assert!(handle.root_is_leaf);
        assert_eq!(handle.total_size, 5);
        assert_eq!(data_store.block_count(), 1);
        assert_eq!(meta_store.block_count(), 0);

        let fetched = fetch_all(&handle, 4, data_store, meta_store).unwrap();
        assert_eq!(fetched, b"hello");
    }

    #[test]
    fn multi_level_round_trip() {
        let data: Vec<u8> = (0..10_000u32).map(|i| (i % 256) as u8).collect();
        let data_store = Arc::new(MemStore::new("data"));
        let meta_store = Arc::new(MemStore::new("meta"));

        let handle = index(data.clone(), 64, 3, &*data_store, &*meta_store).unwrap();
        assert!(!handle.root_is_leaf);
        assert_eq!(handle.total_size, data.len() as u64);

        let fetched = fetch_all(&handle, 3, data_store, meta_store).unwrap();
        assert_eq!(fetched, data);
    }

    #[test]
    fn handle_depends_only_on_content_and_configuration() {
        let data: Vec<u8> = (0..5_000u32).map(|i| (i * 7 % 251) as u8).collect();
        let first = index(
            data.clone(),
            128,
            4,
            &MemStore::new("d1"),
            &MemStore::new("m1"),
        )
        .unwrap();
        let second = index(data, 128, 4, &MemStore::new("d2"), &MemStore::new("m2")).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn corrupt_key_block_flags_are_detected() {
        let data = vec![0xabu8; 1000];
        let data_store = Arc::new(MemStore::new("data"));
        let meta_store = Arc::new(MemStore::new("meta"));
        let handle = index(data, 100, 4, &*data_store, &*meta_store).unwrap();
        assert!(!handle.root_is_leaf);

        // flip the flags byte of the root key block and fix up its key so
        // only the structural check can complain
        let stored = meta_store.read_block(handle.root.key()).unwrap();
        let mut forged = stored;
        forged[0] = 0x7f;
        let forged_key =
            crate::store::BlockKey::new(HashMethod::Sha256.digest(&forged).unwrap());
        meta_store.write_block(&forged_key, &forged).unwrap();

        let forged_handle = TreeHandle {
            root: IndexHandle::Hash {
                key: forged_key,
                size: handle.root.size(),
            },
            root_is_leaf: false,
            total_size: handle.total_size,
        };
        let result = fetch_all(&forged_handle, 4, data_store, meta_store);
        assert!(matches!(result, Err(Error::Integrity(_))));
    }

    #[test]
    fn missing_data_block_surfaces_as_unavailable() {
        let data = vec![0x55u8; 512];
        let data_store = Arc::new(MemStore::new("data"));
        let meta_store = Arc::new(MemStore::new("meta"));
        let handle = index(data, 64, 4, &*data_store, &*meta_store).unwrap();

        // drop one data block
        let victim = crate::store::collect_keys(&*data_store).unwrap()[0].clone();
        data_store.delete_block(&victim).unwrap();

        let result = fetch_all(&handle, 4, data_store, meta_store);
        assert!(matches!(result, Err(Error::BlockUnavailable)));
    }

    #[test]
    fn zero_fanout_is_rejected() {
        assert!(matches!(TreeIndexer::new(0), Err(Error::InvalidArg(_))));
    }

    #[test]
    fn degenerate_fanout_of_one_still_converges() {
        let data: Vec<u8> = (0..2_000u32).map(|i| (i % 97) as u8).collect();
        let data_store = Arc::new(MemStore::new("data"));
        let meta_store = Arc::new(MemStore::new("meta"));
        let handle = index(data.clone(), 50, 1, &*data_store, &*meta_store).unwrap();
        let fetched = fetch_all(&handle, 1, data_store, meta_store).unwrap();
        assert_eq!(fetched, data);
    }
}
