use thiserror::Error;

use crate::driver::protocol::ServerError;

/// Errors produced by the driver.
///
/// Transport, framing and protocol errors leave the connection in an
/// undefined protocol state; see [`DriverError::is_fatal`].
#[derive(Error, Debug)]
pub enum DriverError {
    #[error("Transport error: {0}")]
    Transport(#[from] std::io::Error),

    #[error("Framing error: {0}")]
    Framing(String),

    #[error("Descriptor error: {0}")]
    Descriptor(String),

    #[error("Codec mismatch at {path}: expected {expected}, got {actual}")]
    CodecMismatch {
        path: String,
        expected: String,
        actual: String,
    },

    #[error("Wrong number of elements: expected {expected}, got {actual}")]
    CountMismatch { expected: usize, actual: usize },

    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),

    #[error("Server error: {0}")]
    Server(ServerError),

    #[error("Query returned zero results")]
    ZeroResults,

    #[error("Connection is no longer usable: {0}")]
    ConnectionUnusable(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type DriverResult<T> = Result<T, DriverError>;

/// Fieldless discriminant of [`DriverError`] for programmatic branching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Transport,
    Framing,
    Descriptor,
    CodecMismatch,
    CountMismatch,
    ProtocolViolation,
    Server,
    ZeroResults,
    ConnectionUnusable,
    Config,
}

impl DriverError {
    pub(crate) fn mismatch(
        path: impl ToString,
        expected: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        DriverError::CodecMismatch {
            path: path.to_string(),
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            DriverError::Transport(_) => ErrorKind::Transport,
            DriverError::Framing(_) => ErrorKind::Framing,
            DriverError::Descriptor(_) => ErrorKind::Descriptor,
            DriverError::CodecMismatch { .. } => ErrorKind::CodecMismatch,
            DriverError::CountMismatch { .. } => ErrorKind::CountMismatch,
            DriverError::ProtocolViolation(_) => ErrorKind::ProtocolViolation,
            DriverError::Server(_) => ErrorKind::Server,
            DriverError::ZeroResults => ErrorKind::ZeroResults,
            DriverError::ConnectionUnusable(_) => ErrorKind::ConnectionUnusable,
            DriverError::Config(_) => ErrorKind::Config,
        }
    }

    /// Whether the connection that produced this error must be discarded.
    pub fn is_fatal(&self) -> bool {
        match self {
            DriverError::Transport(_)
            | DriverError::Framing(_)
            | DriverError::ProtocolViolation(_)
            | DriverError::ConnectionUnusable(_) => true,
            DriverError::Server(err) => err.is_fatal(),
            _ => false,
        }
    }

    /// The server error code, if this is a server error.
    pub fn code(&self) -> Option<u32> {
        match self {
            DriverError::Server(err) => Some(err.code),
            _ => None,
        }
    }

    /// The symbolic codec path, if this is a codec mismatch.
    pub fn path(&self) -> Option<&str> {
        match self {
            DriverError::CodecMismatch { path, .. } => Some(path),
            _ => None,
        }
    }
}

impl From<ServerError> for DriverError {
    fn from(err: ServerError) -> Self {
        DriverError::Server(err)
    }
}
