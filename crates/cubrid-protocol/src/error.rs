//! Protocol error types.

use thiserror::Error;

/// Errors raised while building or parsing CAS frames.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum ProtocolError {
    /// A read went past the end of the current frame.
    #[error("invalid buffer position: need {needed} bytes, have {available}")]
    BufferOverrun {
        /// Bytes the read required.
        needed: usize,
        /// Bytes left in the frame.
        available: usize,
    },

    /// A frame length prefix that cannot describe a valid frame.
    #[error("invalid frame length: {0}")]
    InvalidFrameLength(i32),

    /// Unknown function code byte.
    #[error("unknown function code: {0:#04x}")]
    UnknownFunctionCode(u8),

    /// Text payload that is not valid UTF-8.
    #[error("invalid string data")]
    InvalidString,

    /// A value does not fit its fixed-width slot or its arg size field.
    #[error("{field} is {len} bytes, exceeds the {max}-byte slot")]
    FieldTooLong {
        /// Field name.
        field: &'static str,
        /// Encoded length of the value.
        len: usize,
        /// Slot width.
        max: usize,
    },

    /// Malformed handshake block.
    #[error("invalid handshake: {0}")]
    InvalidHandshake(String),

    /// The server answered with a negative response code.
    #[error("server error {code}: {message}")]
    Server {
        /// Negative response code.
        code: i32,
        /// Message carried in the response body.
        message: String,
    },
}

impl ProtocolError {
    /// Whether this error came from the server rather than from framing.
    #[must_use]
    pub fn is_server_error(&self) -> bool {
        matches!(self, Self::Server { .. })
    }
}
