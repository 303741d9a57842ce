//! Block and stream indexing.
//!
//! # Formats
//!
//! A *block indexer* turns one raw block into stored bytes plus an
//! [`IndexHandle`] that its dual, the [`BlockFetcher`], can later resolve
//! back into the raw block. The hash indexer stores blocks verbatim under
//! their digest; the CHK indexer ciphers them convergently first, so
//! equal plaintexts still share one key while the store only ever sees
//! ciphertext.
//!
//! The *tree indexer* packs the sequence of per-block handles into key
//! blocks of at most `indices_per_block` children each, indexes those
//! recursively through the same block indexer (against the metadata
//! store), and names the whole stream by the root handle. Key-block
//! bytes:
//!
//! ```text
//! +-------+-------------+------------------------------------+
//! | flags | count (u32) | count x fixed-width child handles  |
//! +-------+-------------+------------------------------------+
//! ```
//!
//! with flags bit 0 set when the children are data blocks. The decoder
//! stops at that flag, so tree height is never stored explicitly.
//!
//! Tree handles serialize to a single ASCII line (see
//! [`serialize_index_tuple`]) which is the only externally stable
//! artifact; it round-trips byte for byte.

mod hash_method;
pub use hash_method::*;

mod handle;
pub use handle::*;

mod block_indexer;
pub use block_indexer::*;

mod tree;
pub use tree::*;

mod ascii;
pub use ascii::*;
