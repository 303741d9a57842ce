use crate::{Error, Result};

use super::{Filter, Stream};

/// Stream adapter that pushes a backing stream through a [`Filter`].
///
/// Bytes are pulled from the source at its preferred granularity, pushed
/// through the filter, and served from an internal buffer. `StreamEnd` is
/// only reported once the source is exhausted *and* the filter has
/// flushed its tail.
pub struct FilteredStream {
    name: String,
    source: Box<dyn Stream>,
    filter: Box<dyn Filter>,
    inbuf: Vec<u8>,
    in_pos: usize,
    pending: Vec<u8>,
    pending_pos: usize,
    source_done: bool,
    closed: bool,
}

impl FilteredStream {
    pub fn new(source: Box<dyn Stream>, filter: Box<dyn Filter>) -> Self {
        let name = format!("filtered/{}", source.name());
        Self {
            name,
            source,
            filter,
            inbuf: Vec::new(),
            in_pos: 0,
            pending: Vec::new(),
            pending_pos: 0,
            source_done: false,
            closed: false,
        }
    }

    fn refill(&mut self) -> Result<()> {
        let size = self.source.preferred_block_size().max(4096);
        self.inbuf.resize(size, 0);
        self.in_pos = 0;
        match self.source.read(&mut self.inbuf) {
            Ok(count) => {
                self.inbuf.truncate(count);
                Ok(())
            }
            Err(Error::StreamEnd) => {
                self.inbuf.clear();
                self.source_done = true;
                Ok(())
            }
            Err(err) => Err(err),
        }
    }
}

impl Stream for FilteredStream {
    fn name(&self) -> &str {
        &self.name
    }

    fn preferred_block_size(&self) -> usize {
        self.source.preferred_block_size()
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        loop {
            if self.pending_pos < self.pending.len() {
                let available = self.pending.len() - self.pending_pos;
                let count = buf.len().min(available);
                buf[..count]
                    .copy_from_slice(&self.pending[self.pending_pos..self.pending_pos + count]);
                self.pending_pos += count;
                return Ok(count);
            }
            if self.closed || self.filter.finished() {
                return Err(Error::StreamEnd);
            }

            if self.in_pos >= self.inbuf.len() && !self.source_done {
                self.refill()?;
            }
            let eof = self.source_done && self.in_pos >= self.inbuf.len();

            self.pending.clear();
            self.pending_pos = 0;
            let consumed = self
                .filter
                .process(&self.inbuf[self.in_pos..], &mut self.pending, eof)?;
            self.in_pos += consumed;

            if self.pending.is_empty() && eof && !self.filter.finished() {
                return Err(Error::Store(
                    "stream filter stalled while flushing".to_string(),
                ));
            }
        }
    }

    fn close(&mut self) {
        if !self.closed {
            self.source.close();
            self.closed = true;
        }
    }
}
