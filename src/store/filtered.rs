use std::io::Read;
use std::str::FromStr;

use crate::{Error, Result};

use super::{Backend, BlockIterator, BlockKey, BlockStore};

/// Whole-block compression codecs for the filtered store.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ZipAlgorithm {
    Zstd,
    Zlib,
}

impl ZipAlgorithm {
    pub fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
        match self {
            ZipAlgorithm::Zstd => zstd::stream::encode_all(data, 0)
                .map_err(|err| Error::Store(format!("zstd compression failed - {}", err))),
            ZipAlgorithm::Zlib => {
                let mut out = Vec::with_capacity(data.len() / 2 + 64);
                let mut encoder =
                    flate2::bufread::ZlibEncoder::new(data, flate2::Compression::default());
                encoder
                    .read_to_end(&mut out)
                    .map_err(|err| Error::Store(format!("zlib compression failed - {}", err)))?;
                Ok(out)
            }
        }
    }

    pub fn decompress(&self, data: &[u8]) -> Result<Vec<u8>> {
        match self {
            ZipAlgorithm::Zstd => zstd::stream::decode_all(data)
                .map_err(|err| Error::Integrity(format!("zstd decompression failed - {}", err))),
            ZipAlgorithm::Zlib => {
                let mut out = Vec::with_capacity(data.len() * 2 + 64);
                let mut decoder = flate2::bufread::ZlibDecoder::new(data);
                decoder.read_to_end(&mut out).map_err(|err| {
                    Error::Integrity(format!("zlib decompression failed - {}", err))
                })?;
                Ok(out)
            }
        }
    }
}

impl FromStr for ZipAlgorithm {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self> {
        match value {
            "zstd" => Ok(ZipAlgorithm::Zstd),
            "zlib" => Ok(ZipAlgorithm::Zlib),
            other => Err(Error::InvalidArg(format!(
                "unknown zip algorithm `{}' (expected zstd or zlib)",
                other
            ))),
        }
    }
}

/// Proxy store that compresses blocks on the way in and decompresses them
/// on the way out. Only the data path is touched; keys pass through, so
/// content addressing is computed on the *uncompressed* payload.
pub struct FilteredStore {
    name: String,
    backend: Backend,
    algorithm: ZipAlgorithm,
}

impl FilteredStore {
    pub fn new(backend: Backend, algorithm: ZipAlgorithm) -> Self {
        let name = format!("filtered/{}", backend.store().name());
        Self {
            name,
            backend,
            algorithm,
        }
    }
}

impl BlockStore for FilteredStore {
    fn name(&self) -> &str {
        &self.name
    }

    fn blocks_exist(&self, keys: &[BlockKey]) -> Result<Vec<bool>> {
        self.backend.store().blocks_exist(keys)
    }

    fn read_block(&self, key: &BlockKey) -> Result<Vec<u8>> {
        let stored = self.backend.store().read_block(key)?;
        self.algorithm.decompress(&stored)
    }

    fn write_block(&self, key: &BlockKey, block: &[u8]) -> Result<()> {
        let compressed = self.algorithm.compress(block)?;
        self.backend.store().write_block(key, &compressed)
    }

    fn delete_block(&self, key: &BlockKey) -> Result<()> {
        self.backend.store().delete_block(key)
    }

    fn first_block(&self) -> Result<BlockIterator> {
        self.backend.store().first_block()
    }

    fn sync(&self) -> Result<()> {
        self.backend.store().sync()
    }

    fn close(&self) -> Result<()> {
        self.backend.release()
    }
}
