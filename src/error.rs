use thiserror::Error;

pub type Result<T> = std::result::Result<T, EngineError>;

/// Failure kinds surfaced by the stores and pipelines.
///
/// Backend internals log and translate low-level faults into these variants;
/// nothing in this crate retries on its own.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("collection not found: {0}")]
    CollectionNotFound(String),

    #[error("unsupported {0}")]
    Unsupported(String),

    #[error("i/o failure: {0}")]
    Io(String),

    #[error("upstream failure: {0}")]
    Upstream(String),

    #[error("vector dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("ingestion stopped after {committed} records: batch {failed_batch} failed: {reason}")]
    PartialBatch {
        committed: usize,
        failed_batch: usize,
        reason: String,
    },
}

impl From<std::io::Error> for EngineError {
    fn from(err: std::io::Error) -> Self {
        EngineError::Io(err.to_string())
    }
}

impl From<faiss::error::Error> for EngineError {
    fn from(err: faiss::error::Error) -> Self {
        EngineError::Io(format!("faiss: {err}"))
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        EngineError::Io(format!("serialization: {err}"))
    }
}
