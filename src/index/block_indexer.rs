use openssl::symm::{decrypt, encrypt, Cipher};

use crate::store::{BlockKey, BlockStore};
use crate::{Error, Result};

use super::{HandleClass, HashMethod, IndexHandle};

/// Class tag of a block fetcher, as it appears in the ASCII form.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FetcherClass {
    Hash,
    Chk,
}

impl FetcherClass {
    pub fn tag(&self) -> &'static str {
        match self {
            FetcherClass::Hash => "hash_block_fetcher",
            FetcherClass::Chk => "chk_block_fetcher",
        }
    }

    pub fn from_tag(tag: &str) -> Result<Self> {
        match tag {
            "hash_block_fetcher" => Ok(FetcherClass::Hash),
            "chk_block_fetcher" => Ok(FetcherClass::Chk),
            other => Err(Error::Deserialize(format!(
                "unknown fetcher class `{}'",
                other
            ))),
        }
    }

    pub fn handle_class(&self) -> HandleClass {
        match self {
            FetcherClass::Hash => HandleClass::Hash,
            FetcherClass::Chk => HandleClass::Chk,
        }
    }
}

/// Derives an index for a raw block and writes the stored form to a
/// store. The returned handle is what the matching [`BlockFetcher`]
/// resolves later.
#[derive(Clone, Debug)]
pub enum BlockIndexer {
    /// Content-addressed, unencrypted: key = H(block), stored = block.
    Hash(HashMethod),
    /// Convergent encryption: the block is ciphered under its own content
    /// hash and stored under the ciphertext's hash, so identical
    /// plaintexts dedup while only handle holders can decrypt.
    Chk {
        content_hash: HashMethod,
        key_hash: HashMethod,
    },
}

impl BlockIndexer {
    pub fn fetcher_class(&self) -> FetcherClass {
        match self {
            BlockIndexer::Hash(_) => FetcherClass::Hash,
            BlockIndexer::Chk { .. } => FetcherClass::Chk,
        }
    }

    pub fn handle_class(&self) -> HandleClass {
        self.fetcher_class().handle_class()
    }

    /// Key width of the handles this indexer produces.
    pub fn key_size(&self) -> usize {
        match self {
            BlockIndexer::Hash(hash) => hash.digest_size(),
            BlockIndexer::Chk { key_hash, .. } => key_hash.digest_size(),
        }
    }

    /// Cipher-key width of the handles this indexer produces (zero for
    /// the hash indexer).
    pub fn cipher_key_size(&self) -> usize {
        match self {
            BlockIndexer::Hash(_) => 0,
            BlockIndexer::Chk { content_hash, .. } => content_hash.digest_size(),
        }
    }

    /// Index one block: write its stored form to `store` and return the
    /// handle addressing it.
    pub fn index_block(&self, store: &dyn BlockStore, block: &[u8]) -> Result<IndexHandle> {
        if block.len() > u32::MAX as usize {
            return Err(Error::InvalidArg(format!(
                "block too large ({} bytes)",
                block.len()
            )));
        }
        match self {
            BlockIndexer::Hash(hash) => {
                let key = BlockKey::new(hash.digest(block)?);
                store.write_block(&key, block)?;
                Ok(IndexHandle::Hash {
                    key,
                    size: block.len() as u32,
                })
            }
            BlockIndexer::Chk {
                content_hash,
                key_hash,
            } => {
                let cipher_key = content_hash.digest(block)?;
                let ciphertext = chk_encrypt(&cipher_key, block)?;
                let key = BlockKey::new(key_hash.digest(&ciphertext)?);
                store.write_block(&key, &ciphertext)?;
                Ok(IndexHandle::Chk {
                    key,
                    size: block.len() as u32,
                    cipher_key,
                })
            }
        }
    }
}

/// The read-side dual of a [`BlockIndexer`]: resolves handles back into
/// raw blocks, verifying content addresses along the way.
#[derive(Clone, Debug)]
pub enum BlockFetcher {
    Hash,
    Chk,
}

impl BlockFetcher {
    pub fn class(&self) -> FetcherClass {
        match self {
            BlockFetcher::Hash => FetcherClass::Hash,
            BlockFetcher::Chk => FetcherClass::Chk,
        }
    }

    pub fn for_class(class: FetcherClass) -> Self {
        match class {
            FetcherClass::Hash => BlockFetcher::Hash,
            FetcherClass::Chk => BlockFetcher::Chk,
        }
    }

    /// Fetch and decode the block a handle points at.
    pub fn fetch(&self, store: &dyn BlockStore, handle: &IndexHandle) -> Result<Vec<u8>> {
        let stored = store.read_block(handle.key())?;
        let key_hash = HashMethod::from_key_size(handle.key().len())
            .map_err(|_| Error::Integrity("handle key has no matching hash".to_string()))?;
        let digest = key_hash.digest(&stored)?;
        if digest != handle.key().as_bytes() {
            return Err(Error::Integrity(format!(
                "block {} does not match its key",
                handle.key()
            )));
        }

        match (self, handle) {
            (BlockFetcher::Hash, IndexHandle::Hash { size, .. }) => {
                if stored.len() != *size as usize {
                    return Err(Error::Integrity(format!(
                        "block {} has size {} but handle records {}",
                        handle.key(),
                        stored.len(),
                        size
                    )));
                }
                Ok(stored)
            }
            (
                BlockFetcher::Chk,
                IndexHandle::Chk {
                    size, cipher_key, ..
                },
            ) => {
                let plaintext = chk_decrypt(cipher_key, &stored)?;
                if plaintext.len() != *size as usize {
                    return Err(Error::Integrity(format!(
                        "deciphered block {} has size {} but handle records {}",
                        handle.key(),
                        plaintext.len(),
                        size
                    )));
                }
                let content_hash = HashMethod::from_key_size(cipher_key.len())
                    .map_err(|_| Error::Integrity("cipher key has no matching hash".to_string()))?;
                if content_hash.digest(&plaintext)? != *cipher_key {
                    return Err(Error::Integrity(format!(
                        "deciphered block {} does not match its cipher key",
                        handle.key()
                    )));
                }
                Ok(plaintext)
            }
            _ => Err(Error::InvalidArg(
                "handle class does not match fetcher class".to_string(),
            )),
        }
    }
}

/// Expand a content hash into AES-256 key material. A 32-byte hash is
/// used as is; narrower or wider hashes are normalized through SHA-256.
fn chk_aes_key(cipher_key: &[u8]) -> Result<Vec<u8>> {
    if cipher_key.len() == 32 {
        Ok(cipher_key.to_vec())
    } else {
        HashMethod::Sha256.digest(cipher_key)
    }
}

// The IV is fixed: the key is already unique per plaintext, and a random
// IV would break the identical-plaintext/identical-ciphertext property
// the whole scheme exists for.
const CHK_IV: [u8; 16] = [0u8; 16];

fn chk_encrypt(cipher_key: &[u8], plaintext: &[u8]) -> Result<Vec<u8>> {
    let key = chk_aes_key(cipher_key)?;
    Ok(encrypt(
        Cipher::aes_256_cbc(),
        &key,
        Some(&CHK_IV),
        plaintext,
    )?)
}

fn chk_decrypt(cipher_key: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>> {
    let key = chk_aes_key(cipher_key)?;
    decrypt(Cipher::aes_256_cbc(), &key, Some(&CHK_IV), ciphertext)
        .map_err(|_| Error::Integrity("block decryption failed".to_string()))
}
