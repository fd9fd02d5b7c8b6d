use thiserror::Error;

#[derive(Debug, Error)]
pub enum PackError {
    #[error("invalid archive magic: expected {expected}, got {actual}")]
    InvalidMagic { expected: String, actual: String },

    #[error("unsupported archive version: {0}")]
    UnsupportedVersion(u32),

    #[error("corrupt archive section {index}: {reason}")]
    CorruptSection { index: u64, reason: String },

    #[error("CRC32 mismatch in header of section {index}")]
    CrcMismatch { index: u64 },

    #[error("compression failed: {0}")]
    CompressionFailed(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<bincode::Error> for PackError {
    fn from(err: bincode::Error) -> Self {
        PackError::Serialization(err.to_string())
    }
}

pub type PackResult<T> = Result<T, PackError>;
