//! End-to-end indexing and fetching: index whole streams through real
//! chopper/indexer/store pipelines, then fetch them back and verify the
//! bytes, the tree shapes, and the failure modes.

use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, RngCore, SeedableRng};

use blockvault::chopper::FixedSizeChopper;
use blockvault::index::{
    parse_index_tuple, serialize_index_tuple, BlockFetcher, BlockIndexer, HashMethod,
    TreeHandle, TreeIndexer,
};
use blockvault::store::{
    Backend, BlockKey, BlockStore, MemStore, ProxySemantics, SmartStore, StatStore,
};
use blockvault::stream::{MemStream, Stream};
use blockvault::Error;

fn index_stream(
    data: &[u8],
    block_size: usize,
    indexer: &TreeIndexer,
    block_indexer: &BlockIndexer,
    data_store: &dyn BlockStore,
    meta_store: &dyn BlockStore,
) -> Result<TreeHandle, Error> {
    let stream = MemStream::new(data.to_vec());
    let mut chopper = FixedSizeChopper::new(Box::new(stream), block_size, false)?;
    indexer.index_blocks(&mut chopper, block_indexer, data_store, meta_store)
}

fn fetch_back(
    handle: &TreeHandle,
    indexer: &TreeIndexer,
    fetcher: &BlockFetcher,
    data_store: Arc<dyn BlockStore>,
    meta_store: Arc<dyn BlockStore>,
) -> Result<Vec<u8>, Error> {
    let mut stream = indexer.fetch_stream(handle, fetcher, data_store, meta_store)?;
    let mut out = Vec::new();
    let mut buf = [0u8; 4001];
    loop {
        match stream.read(&mut buf) {
            Ok(count) => out.extend_from_slice(&buf[..count]),
            Err(Error::StreamEnd) => return Ok(out),
            Err(err) => return Err(err),
        }
    }
}

/// The main exercise: several fan-outs over the same random stream, with
/// a randomized block size, reading the fetched stream back in odd-sized
/// chunks.
#[test]
fn index_then_fetch_at_various_fanouts() {
    let mut rng = StdRng::seed_from_u64(0x1db5_c0de);
    let mut contents = vec![0u8; 1_000_007];
    rng.fill_bytes(&mut contents);

    let block_indexer = BlockIndexer::Hash(HashMethod::Sha1);
    let fetcher = BlockFetcher::Hash;

    for fanout in [6usize, 47, 1023] {
        let indexer = TreeIndexer::new(fanout).unwrap();
        let block_size = rng.gen_range(3500..4500);
        let data_store = Arc::new(MemStore::new("data"));
        let meta_store = Arc::new(MemStore::new("meta"));

        // an empty stream must not produce a handle nor any blocks
        let empty = index_stream(
            &[],
            block_size,
            &indexer,
            &block_indexer,
            &*data_store,
            &*meta_store,
        );
        assert!(matches!(empty, Err(Error::EmptySource)));
        assert_eq!(data_store.block_count(), 0);

        let handle = index_stream(
            &contents,
            block_size,
            &indexer,
            &block_indexer,
            &*data_store,
            &*meta_store,
        )
        .unwrap();
        assert_eq!(handle.total_size, contents.len() as u64);

        let fetched = fetch_back(
            &handle,
            &indexer,
            &fetcher,
            data_store.clone(),
            meta_store.clone(),
        )
        .unwrap();
        assert_eq!(fetched, contents, "fan-out {} mangled the stream", fanout);
    }
}

#[test]
fn single_small_block() {
    let data_store = Arc::new(MemStore::new("data"));
    let meta_store = Arc::new(MemStore::new("meta"));
    let indexer = TreeIndexer::new(100).unwrap();

    let handle = index_stream(
        b"hello",
        4096,
        &indexer,
        &BlockIndexer::Hash(HashMethod::Sha1),
        &*data_store,
        &*meta_store,
    )
    .unwrap();

    // exactly one data block, stored under its SHA-1, and no key blocks
    assert_eq!(data_store.block_count(), 1);
    assert_eq!(meta_store.block_count(), 0);
    assert!(handle.root_is_leaf);
    assert_eq!(
        handle.root.key().to_hex(),
        "aaf4c61ddcc5e8a2dabede0f3b482cd9aea9434d"
    );

    let fetched = fetch_back(
        &handle,
        &indexer,
        &BlockFetcher::Hash,
        data_store,
        meta_store,
    )
    .unwrap();
    assert_eq!(fetched, b"hello");

    // the printed handle deserializes back to the same objects
    let ascii = serialize_index_tuple(&indexer, &handle);
    let (parsed_indexer, parsed_fetcher, parsed_handle) = parse_index_tuple(&ascii).unwrap();
    assert_eq!(parsed_indexer, indexer);
    assert_eq!(parsed_handle, handle);
    assert_eq!(parsed_fetcher.class(), BlockFetcher::Hash.class());
    assert_eq!(serialize_index_tuple(&parsed_indexer, &parsed_handle), ascii);
}

/// Archiving the same stream twice through smart proxies must not write
/// anything new and must produce the same handle.
#[test]
fn second_archive_is_free_under_smart_proxies() {
    let mut rng = StdRng::seed_from_u64(7);
    let mut contents = vec![0u8; 100_000];
    rng.fill_bytes(&mut contents);

    let data_counter = Arc::new(StatStore::new(
        "data",
        Some(Backend::new(
            Arc::new(MemStore::new("data")),
            ProxySemantics::EventuallyDestroy,
        )),
    ));
    let meta_counter = Arc::new(StatStore::new(
        "meta",
        Some(Backend::new(
            Arc::new(MemStore::new("meta")),
            ProxySemantics::EventuallyDestroy,
        )),
    ));
    let data_store = SmartStore::new(Backend::new(
        data_counter.clone(),
        ProxySemantics::LeaveAsIs,
    ));
    let meta_store = SmartStore::new(Backend::new(
        meta_counter.clone(),
        ProxySemantics::LeaveAsIs,
    ));

    let indexer = TreeIndexer::new(16).unwrap();
    let block_indexer = BlockIndexer::Hash(HashMethod::Sha256);

    let first = index_stream(
        &contents,
        2048,
        &indexer,
        &block_indexer,
        &data_store,
        &meta_store,
    )
    .unwrap();
    let data_writes = data_counter.stats().blocks_written();
    let meta_writes = meta_counter.stats().blocks_written();
    assert!(data_writes > 0);
    assert!(meta_writes > 0);

    let second = index_stream(
        &contents,
        2048,
        &indexer,
        &block_indexer,
        &data_store,
        &meta_store,
    )
    .unwrap();

    assert_eq!(first, second);
    assert_eq!(data_counter.stats().blocks_written(), data_writes);
    assert_eq!(meta_counter.stats().blocks_written(), meta_writes);
}

/// 17 blocks at fan-out 4: five level-1 key blocks (4+4+4+4+1), two
/// level-2 key blocks (4+1), one level-3 root key block.
#[test]
fn tree_shape_17_blocks_fanout_4() {
    let block_size = 1024usize;
    let mut rng = StdRng::seed_from_u64(42);
    let mut contents = vec![0u8; 17 * block_size];
    rng.fill_bytes(&mut contents);

    let data_store = Arc::new(MemStore::new("data"));
    let meta_counter = Arc::new(StatStore::new(
        "meta",
        Some(Backend::new(
            Arc::new(MemStore::new("meta")),
            ProxySemantics::EventuallyDestroy,
        )),
    ));

    let indexer = TreeIndexer::new(4).unwrap();
    let handle = index_stream(
        &contents,
        block_size,
        &indexer,
        &BlockIndexer::Hash(HashMethod::Sha256),
        &*data_store,
        &*meta_counter,
    )
    .unwrap();

    assert_eq!(data_store.block_count(), 17);
    assert_eq!(meta_counter.stats().blocks_written(), 5 + 2 + 1);
    assert!(!handle.root_is_leaf);

    let fetched = fetch_back(
        &handle,
        &indexer,
        &BlockFetcher::Hash,
        data_store,
        meta_counter,
    )
    .unwrap();
    assert_eq!(fetched, contents);
}

/// 3 blocks at fan-out 2: two level-1 key blocks (2+1), one level-2 root.
#[test]
fn tree_shape_3_blocks_fanout_2() {
    let block_size = 512usize;
    let mut rng = StdRng::seed_from_u64(43);
    let mut contents = vec![0u8; 3 * block_size];
    rng.fill_bytes(&mut contents);

    let data_store = Arc::new(MemStore::new("data"));
    let meta_store = Arc::new(MemStore::new("meta"));

    let handle = index_stream(
        &contents,
        block_size,
        &TreeIndexer::new(2).unwrap(),
        &BlockIndexer::Hash(HashMethod::Sha256),
        &*data_store,
        &*meta_store,
    )
    .unwrap();

    assert_eq!(data_store.block_count(), 3);
    assert_eq!(meta_store.block_count(), 2 + 1);
    assert!(!handle.root_is_leaf);
}

/// Two streams sharing a long prefix, chopped identically, reference the
/// same leaf keys over that prefix.
#[test]
fn shared_prefixes_share_leaf_keys() {
    let block_size = 1000usize;
    let mut rng = StdRng::seed_from_u64(44);
    let mut prefix = vec![0u8; 10 * block_size];
    rng.fill_bytes(&mut prefix);

    let mut first = prefix.clone();
    first.extend_from_slice(b"first tail");
    let mut second = prefix;
    second.extend_from_slice(b"a different, longer second tail");

    let store_a = Arc::new(MemStore::new("a"));
    let store_b = Arc::new(MemStore::new("b"));
    let indexer = TreeIndexer::new(8).unwrap();
    let block_indexer = BlockIndexer::Hash(HashMethod::Sha256);

    index_stream(&first, block_size, &indexer, &block_indexer, &*store_a, &*store_a).unwrap();
    index_stream(&second, block_size, &indexer, &block_indexer, &*store_b, &*store_b).unwrap();

    let keys_a: std::collections::HashSet<BlockKey> =
        blockvault::store::collect_keys(&*store_a).unwrap().into_iter().collect();
    let keys_b: std::collections::HashSet<BlockKey> =
        blockvault::store::collect_keys(&*store_b).unwrap().into_iter().collect();
    // at least the ten full prefix blocks coincide
    assert!(keys_a.intersection(&keys_b).count() >= 10);
}

/// Overwriting one stored block with same-length garbage must surface as
/// an integrity failure during restore, after the bytes before it came
/// through intact.
#[test]
fn tampering_is_detected_during_restore() {
    let block_size = 512usize;
    let mut rng = StdRng::seed_from_u64(45);
    let mut contents = vec![0u8; 20 * block_size];
    rng.fill_bytes(&mut contents);

    let data_store = Arc::new(MemStore::new("data"));
    let meta_store = Arc::new(MemStore::new("meta"));
    let indexer = TreeIndexer::new(4).unwrap();

    let handle = index_stream(
        &contents,
        block_size,
        &indexer,
        &BlockIndexer::Hash(HashMethod::Sha256),
        &*data_store,
        &*meta_store,
    )
    .unwrap();

    // smash one data block, keeping its length
    let victim = blockvault::store::collect_keys(&*data_store).unwrap()[7].clone();
    let mut garbage = data_store.read_block(&victim).unwrap();
    for byte in garbage.iter_mut() {
        *byte = byte.wrapping_add(1);
    }
    data_store.write_block(&victim, &garbage).unwrap();

    let result = fetch_back(
        &handle,
        &indexer,
        &BlockFetcher::Hash,
        data_store,
        meta_store,
    );
    assert!(matches!(result, Err(Error::Integrity(_))));
}

/// CHK end to end: convergent handles, opaque stores, faithful restore.
#[test]
fn chk_stream_round_trip() {
    let mut rng = StdRng::seed_from_u64(46);
    let mut contents = vec![0u8; 50_000];
    rng.fill_bytes(&mut contents);

    let data_store = Arc::new(MemStore::new("data"));
    let meta_store = Arc::new(MemStore::new("meta"));
    let indexer = TreeIndexer::new(12).unwrap();
    let block_indexer = BlockIndexer::Chk {
        content_hash: HashMethod::Sha256,
        key_hash: HashMethod::Sha256,
    };

    let handle = index_stream(
        &contents,
        1536,
        &indexer,
        &block_indexer,
        &*data_store,
        &*meta_store,
    )
    .unwrap();

    let fetched = fetch_back(
        &handle,
        &indexer,
        &BlockFetcher::Chk,
        data_store.clone(),
        meta_store.clone(),
    )
    .unwrap();
    assert_eq!(fetched, contents);

    // the ascii form carries the cipher key and round-trips
    let ascii = serialize_index_tuple(&indexer, &handle);
    let (_, fetcher, parsed) = parse_index_tuple(&ascii).unwrap();
    assert_eq!(parsed, handle);
    let refetched = fetch_back(&parsed, &indexer, &fetcher, data_store, meta_store).unwrap();
    assert_eq!(refetched, contents);
}

/// Padded last block: the stored block is full-size, the restored stream
/// is not.
#[test]
fn padding_does_not_leak_into_the_restored_stream() {
    let block_size = 256usize;
    let contents: Vec<u8> = (0..1000u32).map(|i| (i % 251) as u8).collect();

    let data_store = Arc::new(MemStore::new("data"));
    let meta_store = Arc::new(MemStore::new("meta"));
    let indexer = TreeIndexer::new(4).unwrap();

    let stream = MemStream::new(contents.clone());
    let mut chopper = FixedSizeChopper::new(Box::new(stream), block_size, true).unwrap();
    let handle = indexer
        .index_blocks(
            &mut chopper,
            &BlockIndexer::Hash(HashMethod::Sha256),
            &*data_store,
            &*meta_store,
        )
        .unwrap();

    // every stored data block is exactly block_size bytes
    for key in blockvault::store::collect_keys(&*data_store).unwrap() {
        assert_eq!(data_store.read_block(&key).unwrap().len(), block_size);
    }

    assert_eq!(handle.total_size, contents.len() as u64);
    let fetched = fetch_back(
        &handle,
        &indexer,
        &BlockFetcher::Hash,
        data_store,
        meta_store,
    )
    .unwrap();
    assert_eq!(fetched, contents);
}
