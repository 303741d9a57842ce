use crate::stream::Stream;
use crate::{Error, Result};

use super::Chopper;

/// Rolling-hash window width, in bytes.
const WINDOW_SIZE: usize = 48;

/// Parameters for content-defined chunking.
///
/// A cut happens at the first position past `min_block_size` where the
/// rolling hash of the trailing window matches the mask, or unconditionally
/// at `max_block_size`.
#[derive(Clone, Debug)]
pub struct AnchorParams {
    pub min_block_size: usize,
    pub max_block_size: usize,
    pub mask_bits: u32,
}

impl AnchorParams {
    /// Derive chunking parameters targeting `typical` bytes per block.
    pub fn with_typical_size(typical: usize) -> Self {
        let typical = typical.max(256);
        Self {
            min_block_size: typical / 4,
            max_block_size: typical * 4,
            mask_bits: (usize::BITS - 1 - typical.leading_zeros()).max(1),
        }
    }

    fn validate(&self) -> Result<()> {
        if self.min_block_size == 0
            || self.max_block_size < self.min_block_size
            || self.mask_bits == 0
            || self.mask_bits > 48
        {
            return Err(Error::InvalidArg(format!(
                "bad anchor parameters: min={} max={} mask_bits={}",
                self.min_block_size, self.max_block_size, self.mask_bits
            )));
        }
        Ok(())
    }
}

/// Content-defined chopper: blocks are cut where a rolling window hash
/// matches a mask, so insertions shift block boundaries only locally and
/// unchanged data keeps producing identical blocks.
pub struct AnchorChopper {
    stream: Box<dyn Stream>,
    params: AnchorParams,
    mask: u64,
    table: [u64; 256],
    typical_block_size: usize,
    inbuf: Vec<u8>,
    in_pos: usize,
    consumed: u64,
    source_done: bool,
}

impl AnchorChopper {
    pub fn new(stream: Box<dyn Stream>, params: AnchorParams) -> Result<Self> {
        params.validate()?;
        let typical_block_size = (params.min_block_size + params.max_block_size) / 2;
        let mask = (1u64 << params.mask_bits) - 1;
        Ok(Self {
            stream,
            params,
            mask,
            table: byte_table(),
            typical_block_size,
            inbuf: Vec::new(),
            in_pos: 0,
            consumed: 0,
            source_done: false,
        })
    }

    fn next_byte(&mut self) -> Result<Option<u8>> {
        if self.in_pos >= self.inbuf.len() {
            if self.source_done {
                return Ok(None);
            }
            let size = self.stream.preferred_block_size().max(4096);
            self.inbuf.resize(size, 0);
            self.in_pos = 0;
            match self.stream.read(&mut self.inbuf) {
                Ok(count) => self.inbuf.truncate(count),
                Err(Error::StreamEnd) => {
                    self.inbuf.clear();
                    self.source_done = true;
                    return Ok(None);
                }
                Err(err) => return Err(err),
            }
            if self.inbuf.is_empty() {
                return self.next_byte();
            }
        }
        let byte = self.inbuf[self.in_pos];
        self.in_pos += 1;
        self.consumed += 1;
        Ok(Some(byte))
    }
}

impl Chopper for AnchorChopper {
    fn typical_block_size(&self) -> usize {
        self.typical_block_size
    }

    fn read_block(&mut self, block: &mut Vec<u8>) -> Result<usize> {
        block.clear();
        let mut hash = 0u64;

        loop {
            let byte = match self.next_byte()? {
                Some(byte) => byte,
                None => break,
            };
            block.push(byte);

            hash = hash.rotate_left(1) ^ self.table[byte as usize];
            if block.len() > WINDOW_SIZE {
                let leaving = block[block.len() - 1 - WINDOW_SIZE];
                hash ^= self.table[leaving as usize].rotate_left(WINDOW_SIZE as u32);
            }

            if block.len() >= self.params.max_block_size {
                return Ok(block.len());
            }
            if block.len() >= self.params.min_block_size && (hash & self.mask) == self.mask {
                return Ok(block.len());
            }
        }

        if block.is_empty() {
            Err(Error::StreamEnd)
        } else {
            Ok(block.len())
        }
    }

    fn bytes_consumed(&self) -> u64 {
        self.consumed
    }
}

/// Per-byte mixing constants for the rolling hash. Fixed seed: identical
/// content must cut at identical anchors across runs and machines.
fn byte_table() -> [u64; 256] {
    let mut table = [0u64; 256];
    let mut state = 0x2545f4914f6cdd1du64;
    for entry in table.iter_mut() {
        // splitmix64
        state = state.wrapping_add(0x9e3779b97f4a7c15);
        let mut z = state;
        z = (z ^ (z >> 30)).wrapping_mul(0xbf58476d1ce4e5b9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94d049bb133111eb);
        *entry = z ^ (z >> 31);
    }
    table
}
