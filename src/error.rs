use thiserror::Error;

/// Errors produced by parsing, training and model I/O.
#[derive(Debug, Error)]
pub enum Error {
    /// Caller-supplied data is malformed (length mismatch, bad ids, ...).
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A configuration or training parameter is out of range.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// A model file or byte buffer does not match the expected format.
    #[error("invalid model data: {0}")]
    InvalidModel(String),

    /// An internal invariant was violated; indicates a bug, not bad input.
    #[error("internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn invalid_input<S: Into<String>>(msg: S) -> Self {
        Error::InvalidInput(msg.into())
    }

    pub(crate) fn invalid_parameter<S: Into<String>>(msg: S) -> Self {
        Error::InvalidParameter(msg.into())
    }

    pub(crate) fn invalid_model<S: Into<String>>(msg: S) -> Self {
        Error::InvalidModel(msg.into())
    }

    pub(crate) fn internal<S: Into<String>>(msg: S) -> Self {
        Error::Internal(msg.into())
    }
}
