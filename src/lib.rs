//! Content-addressed archiving toolkit.
//!
//! An input stream is chopped into blocks, each block is indexed (hashed
//! and optionally ciphered) into a block store, and the per-block index
//! handles are packed into a hash tree whose root fits into a single
//! printable handle. That handle, together with the data and metadata
//! stores, is sufficient to reconstruct the stream byte for byte.
//!
//! The layers, bottom up:
//!
//! * [`stream`] - lazy finite byte sources, with optional compression
//!   filters.
//! * [`chopper`] - partitions a stream into fixed-size or content-defined
//!   blocks.
//! * [`index`] - block indexers derive a content key per block and write
//!   it to a store; the tree indexer packs the resulting key stream into
//!   key blocks recursively and walks them back lazily on fetch.
//! * [`store`] - the block-store contract and its implementations,
//!   including the proxy stores (dedup, compression, statistics, call
//!   tracing) that can be stacked on top of any backend.
//! * [`archive`] - the archive/restore pipelines used by the CLI.

pub mod error;
pub use error::{Error, Result};

pub mod stream;

pub mod chopper;

pub mod store;

pub mod index;

pub mod archive;
