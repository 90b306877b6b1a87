use thiserror::Error;

/// Errors raised by the coder.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The coded stream ended early or contains a value the binarizer
    /// cannot terminate.
    #[error("corrupt stream: {0}")]
    CorruptStream(String),
    #[error("invalid coder configuration: {0}")]
    InvalidConfig(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type CodecResult<T> = Result<T, CodecError>;
