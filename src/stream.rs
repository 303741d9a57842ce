//! Lazy byte sources.
//!
//! A [`Stream`] is a finite, pull-based byte source with an advisory
//! preferred read size. End of stream is signalled by
//! [`Error::StreamEnd`](crate::Error::StreamEnd); a short read is *not* an
//! end marker, and the final partial read returns its bytes normally with
//! the sentinel only surfacing on the next call.

use crate::Result;

/// A finite byte source.
pub trait Stream {
    fn name(&self) -> &str;

    /// Advisory read granularity; callers may ignore it.
    fn preferred_block_size(&self) -> usize;

    /// Read up to `buf.len()` bytes. Returns the number of bytes read
    /// (possibly short), or `Err(StreamEnd)` once the source is
    /// exhausted.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Release resources. Idempotent; reads after close return
    /// `StreamEnd`.
    fn close(&mut self);
}

mod memory;
pub use memory::*;

mod file;
pub use file::*;

mod filter;
pub use filter::*;

mod filtered;
pub use filtered::*;
