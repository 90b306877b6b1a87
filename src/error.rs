use flstream_codec::CodecError;
use thiserror::Error;

/// Errors raised by clustering runs and level-file storage.
#[derive(Debug, Error)]
pub enum ClusterError {
    /// Missing or invalid parameter; raised before any computation starts.
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },
    /// More points pushed into a level buffer than it has room for.
    #[error("capacity exceeded: {requested} points pushed, {free} free")]
    CapacityExceeded { requested: usize, free: usize },
    #[error("the input stream has already been finished")]
    StreamFinished,
    /// The hierarchy kept growing without reducing the number of points.
    #[error("hierarchy exceeded {limit} levels")]
    LevelLimit { limit: usize },
    /// Vertex and facility bookkeeping disagree.
    #[error("inconsistent assignment: {0}")]
    Inconsistent(String),
    #[error("corrupt level file: {0}")]
    CorruptLevelFile(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error("metadata error: {0}")]
    Metadata(#[from] serde_json::Error),
}

pub type ClusterResult<T> = Result<T, ClusterError>;
