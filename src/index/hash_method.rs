use std::fmt;
use std::str::FromStr;

use openssl::hash::MessageDigest;

use crate::{Error, Result};

/// Digest algorithms usable for block keys and CHK cipher keys.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HashMethod {
    Sha1,
    Sha256,
    Sha512,
}

impl HashMethod {
    pub fn digest_size(&self) -> usize {
        match self {
            HashMethod::Sha1 => 20,
            HashMethod::Sha256 => 32,
            HashMethod::Sha512 => 64,
        }
    }

    fn message_digest(&self) -> MessageDigest {
        match self {
            HashMethod::Sha1 => MessageDigest::sha1(),
            HashMethod::Sha256 => MessageDigest::sha256(),
            HashMethod::Sha512 => MessageDigest::sha512(),
        }
    }

    pub fn digest(&self, data: &[u8]) -> Result<Vec<u8>> {
        let digest = openssl::hash::hash(self.message_digest(), data)?;
        Ok(digest.to_vec())
    }

    /// Infer the method from a key's width. Handles never name their hash
    /// explicitly; the digest size is unambiguous within the supported
    /// set.
    pub fn from_key_size(size: usize) -> Result<Self> {
        match size {
            20 => Ok(HashMethod::Sha1),
            32 => Ok(HashMethod::Sha256),
            64 => Ok(HashMethod::Sha512),
            other => Err(Error::Deserialize(format!(
                "no supported hash produces {}-byte keys",
                other
            ))),
        }
    }
}

impl fmt::Display for HashMethod {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            HashMethod::Sha1 => "SHA1",
            HashMethod::Sha256 => "SHA256",
            HashMethod::Sha512 => "SHA512",
        };
        write!(f, "{}", name)
    }
}

impl FromStr for HashMethod {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.to_ascii_uppercase().as_str() {
            "SHA1" => Ok(HashMethod::Sha1),
            "SHA256" => Ok(HashMethod::Sha256),
            "SHA512" => Ok(HashMethod::Sha512),
            other => Err(Error::InvalidArg(format!(
                "unknown hash method `{}'",
                other
            ))),
        }
    }
}
