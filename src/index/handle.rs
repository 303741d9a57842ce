use crate::store::BlockKey;
use crate::{Error, Result};

/// Class tag of an index handle, as it appears in the ASCII form.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HandleClass {
    Hash,
    Chk,
}

impl HandleClass {
    pub fn tag(&self) -> &'static str {
        match self {
            HandleClass::Hash => "hash_index_handle",
            HandleClass::Chk => "chk_index_handle",
        }
    }

    pub fn from_tag(tag: &str) -> Result<Self> {
        match tag {
            "hash_index_handle" => Ok(HandleClass::Hash),
            "chk_index_handle" => Ok(HandleClass::Chk),
            other => Err(Error::Deserialize(format!(
                "unknown handle class `{}'",
                other
            ))),
        }
    }
}

/// Everything needed to address one stored block and decode it.
///
/// `size` is the byte count the fetcher hands back to the caller; for CHK
/// handles `cipher_key` is the content hash of the plaintext, which both
/// decrypts the block and re-verifies it after decryption.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum IndexHandle {
    Hash {
        key: BlockKey,
        size: u32,
    },
    Chk {
        key: BlockKey,
        size: u32,
        cipher_key: Vec<u8>,
    },
}

impl IndexHandle {
    pub fn class(&self) -> HandleClass {
        match self {
            IndexHandle::Hash { .. } => HandleClass::Hash,
            IndexHandle::Chk { .. } => HandleClass::Chk,
        }
    }

    pub fn key(&self) -> &BlockKey {
        match self {
            IndexHandle::Hash { key, .. } => key,
            IndexHandle::Chk { key, .. } => key,
        }
    }

    pub fn size(&self) -> u32 {
        match self {
            IndexHandle::Hash { size, .. } => *size,
            IndexHandle::Chk { size, .. } => *size,
        }
    }

    pub fn cipher_key(&self) -> Option<&[u8]> {
        match self {
            IndexHandle::Hash { .. } => None,
            IndexHandle::Chk { cipher_key, .. } => Some(cipher_key),
        }
    }

    /// Width of the fixed binary form, determined by the handle class and
    /// the configured digest sizes.
    pub fn serialized_size(key_size: usize, cipher_key_size: usize) -> usize {
        key_size + 4 + cipher_key_size
    }

    /// Append the fixed-width binary form used inside key blocks:
    /// `key || size (u32 LE) [|| cipher_key]`.
    pub fn write_to(&self, out: &mut Vec<u8>) {
        match self {
            IndexHandle::Hash { key, size } => {
                out.extend_from_slice(key.as_bytes());
                out.extend_from_slice(&size.to_le_bytes());
            }
            IndexHandle::Chk {
                key,
                size,
                cipher_key,
            } => {
                out.extend_from_slice(key.as_bytes());
                out.extend_from_slice(&size.to_le_bytes());
                out.extend_from_slice(cipher_key);
            }
        }
    }

    /// Parse one fixed-width handle. `cipher_key_size` is zero for hash
    /// handles.
    pub fn read_from(
        bytes: &[u8],
        class: HandleClass,
        key_size: usize,
        cipher_key_size: usize,
    ) -> Result<Self> {
        let expected = Self::serialized_size(key_size, cipher_key_size);
        if bytes.len() != expected {
            return Err(Error::Integrity(format!(
                "truncated index handle: got {} bytes, expected {}",
                bytes.len(),
                expected
            )));
        }
        let key = BlockKey::from(&bytes[..key_size]);
        let size = u32::from_le_bytes(
            bytes[key_size..key_size + 4]
                .try_into()
                .expect("slice length checked above"),
        );
        match class {
            HandleClass::Hash => Ok(IndexHandle::Hash { key, size }),
            HandleClass::Chk => Ok(IndexHandle::Chk {
                key,
                size,
                cipher_key: bytes[key_size + 4..].to_vec(),
            }),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn hash_handle_binary_round_trip() {
        let handle = IndexHandle::Hash {
            key: BlockKey::new(vec![0xaa; 20]),
            size: 4096,
        };
        let mut bytes = Vec::new();
        handle.write_to(&mut bytes);
        assert_eq!(bytes.len(), IndexHandle::serialized_size(20, 0));

        let parsed = IndexHandle::read_from(&bytes, HandleClass::Hash, 20, 0).unwrap();
        assert_eq!(parsed, handle);
    }

    #[test]
    fn chk_handle_binary_round_trip() {
        let handle = IndexHandle::Chk {
            key: BlockKey::new(vec![0xbb; 32]),
            size: 123,
            cipher_key: vec![0xcc; 32],
        };
        let mut bytes = Vec::new();
        handle.write_to(&mut bytes);
        assert_eq!(bytes.len(), IndexHandle::serialized_size(32, 32));

        let parsed = IndexHandle::read_from(&bytes, HandleClass::Chk, 32, 32).unwrap();
        assert_eq!(parsed, handle);
    }

    #[test]
    fn truncated_handle_is_an_integrity_error() {
        let bytes = vec![0u8; 10];
        assert!(matches!(
            IndexHandle::read_from(&bytes, HandleClass::Hash, 20, 0),
            Err(Error::Integrity(_))
        ));
    }
}
