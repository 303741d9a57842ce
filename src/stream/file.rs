use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::{Error, Result};

use super::Stream;

/// Stream over an open file.
///
/// The file's block size is reported as the preferred read granularity.
/// Also used for reading from inherited file descriptors (see
/// [`FileStream::from_file`]).
pub struct FileStream {
    name: String,
    file: Option<File>,
    preferred_block_size: usize,
}

impl FileStream {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .map_err(|err| Error::Store(format!("unable to open {:?} - {}", path, err)))?;
        let preferred_block_size = Self::block_size(&file);
        Ok(Self {
            name: path.to_string_lossy().into_owned(),
            file: Some(file),
            preferred_block_size,
        })
    }

    /// Wrap an already-open file, e.g. one recovered from a file
    /// descriptor passed by the caller.
    pub fn from_file(file: File, name: &str) -> Self {
        let preferred_block_size = Self::block_size(&file);
        Self {
            name: name.to_string(),
            file: Some(file),
            preferred_block_size,
        }
    }

    #[cfg(unix)]
    fn block_size(file: &File) -> usize {
        use std::os::unix::fs::MetadataExt;
        file.metadata()
            .map(|meta| meta.blksize() as usize)
            .unwrap_or(4096)
            .max(512)
    }

    #[cfg(not(unix))]
    fn block_size(_file: &File) -> usize {
        4096
    }
}

impl Stream for FileStream {
    fn name(&self) -> &str {
        &self.name
    }

    fn preferred_block_size(&self) -> usize {
        self.preferred_block_size
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let file = match self.file.as_mut() {
            Some(file) => file,
            None => return Err(Error::StreamEnd),
        };
        if buf.is_empty() {
            return Ok(0);
        }
        let count = file.read(buf)?;
        if count == 0 {
            return Err(Error::StreamEnd);
        }
        Ok(count)
    }

    fn close(&mut self) {
        self.file = None;
    }
}
