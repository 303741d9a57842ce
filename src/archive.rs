//! Archive and restore pipelines.
//!
//! Glue between the layers: build a chopper over the (optionally
//! filtered) input stream, run the tree indexer against the data and
//! metadata stores, and print or replay handles. The CLI is a thin
//! wrapper around this module.

use std::io::Write;
use std::sync::Arc;

use crate::chopper::{AnchorChopper, AnchorParams, Chopper, FixedSizeChopper};
use crate::index::{parse_index_tuple, serialize_index_tuple, BlockIndexer, TreeIndexer};
use crate::store::BlockStore;
use crate::stream::{FilteredStream, Stream, ZlibCompressFilter, ZlibDecompressFilter};
use crate::{Error, Result};

/// How the input stream is cut into blocks.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChopperKind {
    Fixed { pad_blocks: bool },
    Anchor,
}

/// Everything the archive pipeline needs besides the stores.
#[derive(Clone, Debug)]
pub struct ArchiveConfig {
    pub chopper: ChopperKind,
    pub block_size: usize,
    pub block_indexer: BlockIndexer,
    pub indices_per_block: usize,
    /// Compress the stream itself before chopping; restores must then
    /// decompress, see [`restore`].
    pub zip_input: bool,
}

fn build_chopper(config: &ArchiveConfig, stream: Box<dyn Stream>) -> Result<Box<dyn Chopper>> {
    match config.chopper {
        ChopperKind::Fixed { pad_blocks } => Ok(Box::new(FixedSizeChopper::new(
            stream,
            config.block_size,
            pad_blocks,
        )?)),
        ChopperKind::Anchor => Ok(Box::new(AnchorChopper::new(
            stream,
            AnchorParams::with_typical_size(config.block_size),
        )?)),
    }
}

/// Run the archive pipeline over `stream` and return the printable
/// handle.
pub fn archive(
    stream: Box<dyn Stream>,
    config: &ArchiveConfig,
    data_store: &dyn BlockStore,
    meta_store: &dyn BlockStore,
) -> Result<String> {
    let stream: Box<dyn Stream> = if config.zip_input {
        Box::new(FilteredStream::new(
            stream,
            Box::new(ZlibCompressFilter::new()),
        ))
    } else {
        stream
    };

    let indexer = TreeIndexer::new(config.indices_per_block)?;
    let mut chopper = build_chopper(config, stream)?;
    let handle = indexer.index_blocks(
        chopper.as_mut(),
        &config.block_indexer,
        data_store,
        meta_store,
    )?;

    data_store.sync()?;
    meta_store.sync()?;

    Ok(serialize_index_tuple(&indexer, &handle))
}

/// Replay the stream behind an ASCII handle into `output`. Returns the
/// number of bytes written. `unzip_output` undoes an archive-time
/// `zip_input`.
pub fn restore(
    ascii_handle: &str,
    data_store: Arc<dyn BlockStore>,
    meta_store: Arc<dyn BlockStore>,
    unzip_output: bool,
    output: &mut dyn Write,
) -> Result<u64> {
    let (indexer, fetcher, handle) = parse_index_tuple(ascii_handle)?;
    let tree_stream = indexer.fetch_stream(&handle, &fetcher, data_store, meta_store)?;

    let mut stream: Box<dyn Stream> = if unzip_output {
        Box::new(FilteredStream::new(
            Box::new(tree_stream),
            Box::new(ZlibDecompressFilter::new()),
        ))
    } else {
        Box::new(tree_stream)
    };

    let mut written = 0u64;
    let mut buf = [0u8; 64 * 1024];
    loop {
        match stream.read(&mut buf) {
            Ok(count) => {
                output.write_all(&buf[..count])?;
                written += count as u64;
            }
            Err(Error::StreamEnd) => break,
            Err(err) => return Err(err),
        }
    }
    output.flush()?;
    Ok(written)
}
