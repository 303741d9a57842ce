//! Stream chopping.
//!
//! A [`Chopper`] partitions a backing [`Stream`](crate::stream::Stream)
//! into blocks, either at fixed offsets or at content-defined anchor
//! points. The indexing layer consumes blocks one at a time and never
//! looks at the stream itself.

use crate::Result;

/// Partitions a stream into blocks.
pub trait Chopper {
    /// The block size this chopper aims for; anchor-based choppers treat
    /// it as a target, fixed-size choppers as exact.
    fn typical_block_size(&self) -> usize;

    /// Produce the next block into `block` (cleared first). Returns the
    /// block length, or `Err(StreamEnd)` once the stream is exhausted and
    /// the block would be empty.
    fn read_block(&mut self, block: &mut Vec<u8>) -> Result<usize>;

    /// Bytes consumed from the backing stream so far, before any
    /// padding. The tree indexer records this as the stream's total size.
    fn bytes_consumed(&self) -> u64;
}

mod fixed;
pub use fixed::*;

mod anchor;
pub use anchor::*;
