use thiserror::Error;

/// The closed set of errors produced by the archiving pipeline.
///
/// `StreamEnd` and `StoreEnd` are flow-control sentinels, not failures:
/// they terminate stream reads and store iteration respectively. Every
/// variant maps to a stable numeric code used as the CLI exit status.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid argument: {0}")]
    InvalidArg(String),

    #[error("operation not implemented by this store")]
    NotImpl,

    #[error("end of stream")]
    StreamEnd,

    #[error("no more blocks in store")]
    StoreEnd,

    #[error("block unavailable")]
    BlockUnavailable,

    #[error("store error: {0}")]
    Store(String),

    #[error("integrity check failed: {0}")]
    Integrity(String),

    #[error("source stream contains no data")]
    EmptySource,

    #[error("malformed handle: {0}")]
    Deserialize(String),
}

impl Error {
    /// Stable numeric mapping, suitable for an exit status.
    pub fn code(&self) -> i32 {
        match self {
            Error::InvalidArg(_) => 1,
            Error::NotImpl => 2,
            Error::StreamEnd => 3,
            Error::StoreEnd => 4,
            Error::BlockUnavailable => 5,
            Error::Store(_) => 6,
            Error::Integrity(_) => 7,
            Error::EmptySource => 8,
            Error::Deserialize(_) => 9,
        }
    }

    /// True for the two flow-control sentinels.
    pub fn is_end(&self) -> bool {
        matches!(self, Error::StreamEnd | Error::StoreEnd)
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Store(err.to_string())
    }
}

impl From<openssl::error::ErrorStack> for Error {
    fn from(err: openssl::error::ErrorStack) -> Self {
        Error::Store(format!("crypto failure - {}", err))
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn codes_are_stable() {
        assert_eq!(Error::InvalidArg(String::new()).code(), 1);
        assert_eq!(Error::NotImpl.code(), 2);
        assert_eq!(Error::StreamEnd.code(), 3);
        assert_eq!(Error::StoreEnd.code(), 4);
        assert_eq!(Error::BlockUnavailable.code(), 5);
        assert_eq!(Error::Store(String::new()).code(), 6);
        assert_eq!(Error::Integrity(String::new()).code(), 7);
        assert_eq!(Error::EmptySource.code(), 8);
        assert_eq!(Error::Deserialize(String::new()).code(), 9);
    }

    #[test]
    fn sentinels() {
        assert!(Error::StreamEnd.is_end());
        assert!(Error::StoreEnd.is_end());
        assert!(!Error::BlockUnavailable.is_end());
    }
}
