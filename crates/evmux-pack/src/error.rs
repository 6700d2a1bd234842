use evmux_core::CoreError;
use evmux_types::TypeError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PackError {
    #[error("invalid pack magic: expected {expected}, got {actual}")]
    InvalidMagic { expected: String, actual: String },

    #[error("unsupported pack version: {0}")]
    UnsupportedVersion(u32),

    #[error("pack checksum mismatch")]
    ChecksumMismatch,

    #[error("corrupt pack record at offset {offset}: {reason}")]
    CorruptRecord { offset: u64, reason: String },

    #[error("CRC32 mismatch for record at offset {offset}")]
    CrcMismatch { offset: u64 },

    #[error("decompression failed: {0}")]
    DecompressionFailed(String),

    #[error("compression failed: {0}")]
    CompressionFailed(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("event {0} is beyond the end of the pack")]
    EventOutOfRange(usize),

    #[error("pack is already finished")]
    Finished,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Type(#[from] TypeError),
}

pub type PackResult<T> = Result<T, PackError>;

impl PackError {
    /// As an error raised by a reader.
    pub fn into_source(self) -> CoreError {
        match self {
            PackError::Io(e) => CoreError::Io(e),
            other => CoreError::Source(other.to_string()),
        }
    }

    /// As an error raised by a writer.
    pub fn into_sink(self) -> CoreError {
        match self {
            PackError::Io(e) => CoreError::Io(e),
            other => CoreError::Sink(other.to_string()),
        }
    }
}
