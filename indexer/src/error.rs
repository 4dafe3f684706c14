use thiserror::Error;

#[derive(Error, Debug)]
pub enum IndexerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Index error: {0}")]
    Index(#[from] trove_index::IndexError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Unknown source: {0}")]
    UnknownSource(String),

    #[error("Module failed to load: {0}")]
    ModuleLoadFailed(String),

    #[error("No service registered for module: {0}")]
    UnknownService(String),

    #[error("Metadata store error: {0}")]
    Store(String),

    #[error("Extraction error: {0}")]
    Extraction(String),
}

impl From<toml::de::Error> for IndexerError {
    fn from(err: toml::de::Error) -> Self {
        IndexerError::Config(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, IndexerError>;
