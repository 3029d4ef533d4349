//! Codec error types.

use cubrid_protocol::ProtocolError;
use thiserror::Error;

/// Errors raised while framing bytes on a connection.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CodecError {
    /// Socket read or write failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A frame was read but its contents are invalid.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// A frame declared a negative length.
    #[error("invalid frame length: {0}")]
    InvalidLength(i32),

    /// A frame exceeds the configured maximum.
    #[error("frame too large: {size} bytes (max {max})")]
    FrameTooLarge {
        /// Declared size.
        size: usize,
        /// Configured maximum.
        max: usize,
    },

    /// The peer closed the stream in the middle of a frame.
    #[error("truncated frame: expected {expected} bytes, got {actual}")]
    Truncated {
        /// Bytes the frame declared.
        expected: usize,
        /// Bytes received before end of stream.
        actual: usize,
    },

    /// The peer closed the stream between frames.
    #[error("connection closed")]
    ConnectionClosed,
}

impl CodecError {
    /// Whether the error came from the transport rather than frame contents.
    #[must_use]
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::Io(_) | Self::Truncated { .. } | Self::ConnectionClosed
        )
    }
}
