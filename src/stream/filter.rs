use flate2::{Compress, Compression, Decompress, FlushCompress, FlushDecompress, Status};

use crate::{Error, Result};

/// A push/pull byte transformer with two ends: callers push raw bytes in
/// and pull transformed bytes out.
///
/// `process` consumes some prefix of `input`, appends whatever output is
/// ready, and reports the number of input bytes consumed. Once the caller
/// has no more input it keeps calling with `eof = true` until
/// [`finished`](Filter::finished) turns true; only then has the filter
/// flushed completely.
pub trait Filter {
    fn process(&mut self, input: &[u8], output: &mut Vec<u8>, eof: bool) -> Result<usize>;

    fn finished(&self) -> bool;
}

const OUTPUT_CHUNK_SIZE: usize = 16 * 1024;

/// zlib compression end.
pub struct ZlibCompressFilter {
    compress: Compress,
    finished: bool,
}

impl ZlibCompressFilter {
    pub fn new() -> Self {
        Self::with_level(Compression::default())
    }

    pub fn with_level(level: Compression) -> Self {
        Self {
            compress: Compress::new(level, true),
            finished: false,
        }
    }
}

impl Default for ZlibCompressFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl Filter for ZlibCompressFilter {
    fn process(&mut self, input: &[u8], output: &mut Vec<u8>, eof: bool) -> Result<usize> {
        let before = self.compress.total_in();
        output.reserve(OUTPUT_CHUNK_SIZE);
        let flush = if eof {
            FlushCompress::Finish
        } else {
            FlushCompress::None
        };
        let status = self
            .compress
            .compress_vec(input, output, flush)
            .map_err(|err| Error::Store(format!("zlib compression failed - {}", err)))?;
        if status == Status::StreamEnd {
            self.finished = true;
        }
        Ok((self.compress.total_in() - before) as usize)
    }

    fn finished(&self) -> bool {
        self.finished
    }
}

/// zlib decompression end.
pub struct ZlibDecompressFilter {
    decompress: Decompress,
    finished: bool,
}

impl ZlibDecompressFilter {
    pub fn new() -> Self {
        Self {
            decompress: Decompress::new(true),
            finished: false,
        }
    }
}

impl Default for ZlibDecompressFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl Filter for ZlibDecompressFilter {
    fn process(&mut self, input: &[u8], output: &mut Vec<u8>, eof: bool) -> Result<usize> {
        let before = self.decompress.total_in();
        output.reserve(OUTPUT_CHUNK_SIZE);
        let flush = if eof {
            FlushDecompress::Finish
        } else {
            FlushDecompress::None
        };
        let status = self
            .decompress
            .decompress_vec(input, output, flush)
            .map_err(|err| Error::Integrity(format!("zlib decompression failed - {}", err)))?;
        if status == Status::StreamEnd {
            self.finished = true;
        }
        Ok((self.decompress.total_in() - before) as usize)
    }

    fn finished(&self) -> bool {
        self.finished
    }
}
