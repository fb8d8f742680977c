use thiserror::Error;

/// Error type shared across the collection, storage, and query subsystems.
#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("unsupported source scheme: {0}")]
    UnsupportedScheme(String),

    #[error("storage is closed")]
    Closed,

    #[error("unsupported analysis type: {0}")]
    Unsupported(String),

    /// Recoverable collector-side failure. Poll loops log these and continue.
    #[error("transient error: {0}")]
    Transient(String),

    #[error("fatal: {0}")]
    Fatal(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("serialization failed: {0}")]
    Serde(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// True for errors a supervisor should not treat as a failure.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Error::Cancelled)
    }
}
