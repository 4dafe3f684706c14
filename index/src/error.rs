use thiserror::Error;

/// Errors that can occur while managing on-disk word indices
#[derive(Debug, Error)]
pub enum IndexError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A flushed record could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Bucket exponents outside the supported range
    #[error("Invalid bucket range: min {min}, max {max}")]
    InvalidBucketRange { min: u32, max: u32 },

    /// The lifecycle manager was used before `init`
    #[error("Index manager is not initialized")]
    NotInitialized,
}

pub type Result<T> = std::result::Result<T, IndexError>;
