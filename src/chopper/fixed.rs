use crate::stream::Stream;
use crate::{Error, Result};

use super::Chopper;

/// Chops a stream into blocks of exactly `block_size` bytes.
///
/// The last block is shorter unless `pad_blocks` is set, in which case it
/// is padded to `block_size` with the ASCII character `'0'` (0x30). The
/// padding byte is a wire-format constant: archives written by older
/// deployments pad with `'0'`, so changing it would break block-level
/// dedup against existing stores.
pub struct FixedSizeChopper {
    stream: Box<dyn Stream>,
    block_size: usize,
    pad_blocks: bool,
    consumed: u64,
    done: bool,
}

impl FixedSizeChopper {
    pub fn new(stream: Box<dyn Stream>, block_size: usize, pad_blocks: bool) -> Result<Self> {
        if block_size == 0 {
            return Err(Error::InvalidArg(
                "fixed-size chopper requires a non-zero block size".to_string(),
            ));
        }
        Ok(Self {
            stream,
            block_size,
            pad_blocks,
            consumed: 0,
            done: false,
        })
    }
}

impl Chopper for FixedSizeChopper {
    fn typical_block_size(&self) -> usize {
        self.block_size
    }

    fn read_block(&mut self, block: &mut Vec<u8>) -> Result<usize> {
        block.clear();
        if self.done {
            return Err(Error::StreamEnd);
        }

        block.resize(self.block_size, 0);
        let mut filled = 0;
        while filled < self.block_size {
            match self.stream.read(&mut block[filled..]) {
                Ok(count) => filled += count,
                Err(Error::StreamEnd) => {
                    self.done = true;
                    break;
                }
                Err(err) => return Err(err),
            }
        }
        self.consumed += filled as u64;

        if filled == 0 {
            block.clear();
            return Err(Error::StreamEnd);
        }

        if filled < self.block_size {
            if self.pad_blocks {
                block[filled..].fill(b'0');
            } else {
                block.truncate(filled);
            }
        }
        Ok(block.len())
    }

    fn bytes_consumed(&self) -> u64 {
        self.consumed
    }
}

#[cfg(test)]
mod test {
    use crate::stream::MemStream;

    use super::*;

    fn chop_all(chopper: &mut dyn Chopper) -> Vec<Vec<u8>> {
        let mut blocks = Vec::new();
        let mut block = Vec::new();
        loop {
            match chopper.read_block(&mut block) {
                Ok(_) => blocks.push(block.clone()),
                Err(Error::StreamEnd) => return blocks,
                Err(err) => panic!("unexpected error: {}", err),
            }
        }
    }

    #[test]
    fn exact_blocks_with_short_tail() {
        let stream = MemStream::new(vec![7u8; 10]);
        let mut chopper = FixedSizeChopper::new(Box::new(stream), 4, false).unwrap();
        let blocks = chop_all(&mut chopper);
        assert_eq!(
            blocks.iter().map(|b| b.len()).collect::<Vec<_>>(),
            vec![4, 4, 2]
        );
        assert_eq!(chopper.bytes_consumed(), 10);
    }

    #[test]
    fn padding_uses_ascii_zero() {
        let stream = MemStream::new(vec![0xffu8; 6]);
        let mut chopper = FixedSizeChopper::new(Box::new(stream), 4, true).unwrap();
        let blocks = chop_all(&mut chopper);
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0], vec![0xff; 4]);
        assert_eq!(blocks[1], vec![0xff, 0xff, b'0', b'0']);
        // padding never counts as consumed input
        assert_eq!(chopper.bytes_consumed(), 6);
    }

    #[test]
    fn stream_multiple_of_block_size_has_no_empty_tail() {
        let stream = MemStream::new(vec![1u8; 8]);
        let mut chopper = FixedSizeChopper::new(Box::new(stream), 4, true).unwrap();
        assert_eq!(chop_all(&mut chopper).len(), 2);
    }

    #[test]
    fn empty_stream_yields_no_blocks() {
        let stream = MemStream::new(Vec::new());
        let mut chopper = FixedSizeChopper::new(Box::new(stream), 4, true).unwrap();
        assert!(chop_all(&mut chopper).is_empty());
    }

    #[test]
    fn zero_block_size_is_rejected() {
        let stream = MemStream::new(Vec::new());
        assert!(matches!(
            FixedSizeChopper::new(Box::new(stream), 0, false),
            Err(Error::InvalidArg(_))
        ));
    }
}
