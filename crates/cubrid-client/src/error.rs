//! Client error types.

use cubrid_codec::CodecError;
use cubrid_protocol::ProtocolError;
use thiserror::Error;

/// Errors that can occur during client operations.
///
/// Server errors are always surfaced as [`Error::Server`], even when they
/// were raised inside the protocol or codec layer.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Connection failed.
    #[error("connection failed: {0}")]
    Connection(String),

    /// Connection closed unexpectedly.
    #[error("connection closed")]
    ConnectionClosed,

    /// The broker refused the connection during the handshake.
    #[error("connection rejected by broker (code {code})")]
    Rejected {
        /// Negative code sent by the broker.
        code: i32,
    },

    /// Malformed frame or buffer overrun while decoding a response.
    #[error("protocol error: {0}")]
    Protocol(ProtocolError),

    /// Framing failed on the socket.
    #[error("codec error: {0}")]
    Codec(CodecError),

    /// Type conversion error.
    #[error("type error: {0}")]
    Type(#[from] cubrid_types::TypeError),

    /// Server returned an error.
    #[error("server error {code}: {message}")]
    Server {
        /// Negative response code.
        code: i32,
        /// Error message.
        message: String,
    },

    /// `execute` was called while some parameter slots were empty.
    #[error("not all parameters bound: {bound} of {expected}")]
    UnboundParameters {
        /// Slots filled.
        bound: usize,
        /// Placeholders in the statement.
        expected: usize,
    },

    /// A parameter index past the statement's placeholder count.
    #[error("parameter index {index} out of range (statement has {count})")]
    BindIndexOutOfRange {
        /// Requested index.
        index: usize,
        /// Placeholders in the statement.
        count: usize,
    },

    /// The execute entry point does not match the statement's shape.
    #[error("{statement} statement cannot be run with {entry_point}")]
    WrongStatementShape {
        /// Statement type name.
        statement: String,
        /// Entry point that was used.
        entry_point: &'static str,
    },

    /// Operation on a closed or expired statement handle.
    #[error("statement is closed")]
    StatementClosed,

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Connection timeout occurred.
    #[error("connection timed out")]
    ConnectionTimeout,

    /// Command execution timeout occurred.
    #[error("command timed out")]
    CommandTimeout,

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<ProtocolError> for Error {
    fn from(err: ProtocolError) -> Self {
        match err {
            ProtocolError::Server { code, message } => Self::Server { code, message },
            other => Self::Protocol(other),
        }
    }
}

impl From<CodecError> for Error {
    fn from(err: CodecError) -> Self {
        match err {
            CodecError::Protocol(inner) => inner.into(),
            CodecError::Io(io) => Self::Io(io),
            CodecError::ConnectionClosed => Self::ConnectionClosed,
            other => Self::Codec(other),
        }
    }
}

impl Error {
    /// Check if this error is transient and may succeed on retry.
    ///
    /// The driver itself never retries; the session reconnects lazily before
    /// the next request after any of these.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::ConnectionTimeout
                | Self::CommandTimeout
                | Self::ConnectionClosed
                | Self::Connection(_)
                | Self::Io(_)
        ) || matches!(self, Self::Codec(e) if e.is_transport())
    }

    /// Whether the socket must be considered unusable after this error.
    #[must_use]
    pub(crate) fn breaks_connection(&self) -> bool {
        self.is_transient() || matches!(self, Self::Codec(_))
    }

    /// Check if this error indicates a malformed frame.
    #[must_use]
    pub fn is_protocol_error(&self) -> bool {
        matches!(self, Self::Protocol(_) | Self::Codec(_))
    }

    /// Check if this is a server error with a specific code.
    #[must_use]
    pub fn is_server_error(&self, code: i32) -> bool {
        matches!(self, Self::Server { code: c, .. } if *c == code)
    }

    /// Get the code if this is a server error.
    #[must_use]
    pub fn server_code(&self) -> Option<i32> {
        match self {
            Self::Server { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// Whether this error was detected client-side before any I/O.
    #[must_use]
    pub fn is_usage_error(&self) -> bool {
        matches!(
            self,
            Self::UnboundParameters { .. }
                | Self::BindIndexOutOfRange { .. }
                | Self::WrongStatementShape { .. }
                | Self::StatementClosed
        )
    }
}

/// Result type for client operations.
pub type Result<T> = std::result::Result<T, Error>;
