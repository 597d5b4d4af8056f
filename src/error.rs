use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("No home directory")]
    NoHomeDir,

    #[error("Invalid checkpoint name: {0:?}")]
    InvalidCheckpointName(String),

    #[error("Checksum mismatch for checkpoint {name}: expected {expected}, found {actual}")]
    ChecksumMismatch {
        name: String,
        expected: String,
        actual: String,
    },

    #[error("Memory limit exceeded: requested {requested} bytes with {allocated} of {max} allocated")]
    MemoryLimitExceeded { requested: u64, allocated: u64, max: u64 },

    #[error("Insufficient allocation: cannot release {requested} bytes, only {allocated} allocated")]
    InsufficientAllocation { requested: u64, allocated: u64 },

    #[error("Invalid wave size: {0} (must be at least 1)")]
    InvalidWaveSize(usize),

    #[error("Duplicate task id: {0}")]
    DuplicateTaskId(String),

    #[error("Retries exhausted after {attempts} attempts: {source}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Operation timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("Resource monitor error: {0}")]
    Monitor(String),

    #[error("Response parse error: {0}")]
    Parse(String),

    #[error("Validation error: {0}")]
    Validation(String),
}

pub type Result<T> = std::result::Result<T, Error>;
