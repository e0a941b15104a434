use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Invalid magic number in snapshot header")]
    InvalidMagic,

    #[error("Unsupported snapshot version: {major}.{minor}")]
    UnsupportedVersion { major: u16, minor: u16 },

    #[error("Snapshot checksum verification failed (expected {expected:#010x}, found {found:#010x})")]
    ChecksumMismatch { expected: u32, found: u32 },

    #[error("Snapshot truncated: expected {expected} bytes, found {found}")]
    Truncated { expected: u64, found: u64 },

    #[error("Corrupt snapshot: {0}")]
    Corrupt(String),

    #[error("Packed field '{field}' overflow: {value} exceeds {max}")]
    PackedFieldOverflow {
        field: &'static str,
        value: u64,
        max: u64,
    },

    #[error("Unknown reference: {0}")]
    UnknownReference(String),

    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    #[error("Transfer of {url} failed: {message}")]
    Transfer { url: String, message: String },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("Decompression error: {0}")]
    Decompression(#[from] lz4_flex::block::DecompressError),
}

pub type Result<T> = std::result::Result<T, EngineError>;
