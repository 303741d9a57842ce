use crate::{Error, Result};

use super::Stream;

/// Stream over an owned byte buffer.
pub struct MemStream {
    name: String,
    data: Vec<u8>,
    position: usize,
    closed: bool,
}

impl MemStream {
    pub fn new(data: Vec<u8>) -> Self {
        Self {
            name: "memory".to_string(),
            data,
            position: 0,
            closed: false,
        }
    }

    pub fn with_name(name: &str, data: Vec<u8>) -> Self {
        Self {
            name: name.to_string(),
            data,
            position: 0,
            closed: false,
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl Stream for MemStream {
    fn name(&self) -> &str {
        &self.name
    }

    fn preferred_block_size(&self) -> usize {
        8192
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        if self.closed || self.position >= self.data.len() {
            return Err(Error::StreamEnd);
        }
        if buf.is_empty() {
            return Ok(0);
        }
        let remaining = self.data.len() - self.position;
        let count = buf.len().min(remaining);
        buf[..count].copy_from_slice(&self.data[self.position..self.position + count]);
        self.position += count;
        Ok(count)
    }

    fn close(&mut self) {
        self.closed = true;
        self.data = Vec::new();
    }
}
