//! Request/response connection.
//!
//! The protocol is strictly half-duplex: every request is followed by exactly
//! one response frame before the next request may be sent.

use bytes::Bytes;
use cubrid_protocol::{Request, Response};
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};

use crate::error::CodecError;
use crate::frame_codec::CasCodec;
use crate::framed::FrameStream;

/// A framed connection to a CAS process.
///
/// # Example
///
/// ```rust,ignore
/// use cubrid_codec::Connection;
/// use tokio::net::TcpStream;
///
/// let stream = TcpStream::connect("localhost:33000").await?;
/// let mut conn = Connection::new(stream);
/// let response = conn.round_trip(request).await?;
/// ```
pub struct Connection<T> {
    stream: FrameStream<T>,
    requests: u64,
}

impl<T> Connection<T>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    /// Create a new connection from a transport.
    pub fn new(transport: T) -> Self {
        Self::with_codec(transport, CasCodec::new())
    }

    /// Create a new connection with a custom codec.
    pub fn with_codec(transport: T, codec: CasCodec) -> Self {
        Self {
            stream: FrameStream::with_codec(transport, codec),
            requests: 0,
        }
    }

    /// Write a request and flush it.
    pub async fn send(&mut self, request: Request) -> Result<(), CodecError> {
        self.requests += 1;
        self.stream.send(request).await
    }

    /// Read the next frame payload without interpreting it.
    pub async fn receive_raw(&mut self) -> Result<Bytes, CodecError> {
        match self.stream.next().await {
            Some(result) => result,
            None => Err(CodecError::ConnectionClosed),
        }
    }

    /// Read the next frame and split off its response code.
    ///
    /// A negative code becomes [`ProtocolError::Server`] carrying the message
    /// that follows it.
    ///
    /// [`ProtocolError::Server`]: cubrid_protocol::ProtocolError::Server
    pub async fn receive(&mut self) -> Result<Response, CodecError> {
        let frame = self.receive_raw().await?;
        let response = Response::from_frame(frame)?;
        tracing::trace!(code = response.code(), "received response");
        Ok(response)
    }

    /// Send a request and wait for its response.
    pub async fn round_trip(&mut self, request: Request) -> Result<Response, CodecError> {
        self.send(request).await?;
        self.receive().await
    }

    /// Number of requests sent on this connection.
    #[must_use]
    pub fn requests_sent(&self) -> u64 {
        self.requests
    }

    /// Get a reference to the underlying transport.
    pub fn get_ref(&self) -> &T {
        self.stream.get_ref()
    }

    /// Consume the connection and return the underlying transport.
    pub fn into_inner(self) -> T {
        self.stream.into_inner()
    }
}

impl<T> std::fmt::Debug for Connection<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("requests", &self.requests)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use cubrid_protocol::{FunctionCode, ProtocolError, RequestWriter};

    fn close_statement(handle: i32) -> Request {
        let mut writer = RequestWriter::new();
        writer.begin_request(FunctionCode::CloseStatement);
        writer.write_int_arg(handle);
        writer.finish()
    }

    #[tokio::test]
    async fn test_round_trip() {
        let request = close_statement(5);
        let mock = tokio_test::io::Builder::new()
            .write(&request.to_bytes())
            .read(&[0, 0, 0, 4, 0, 0, 0, 0])
            .build();

        let mut conn = Connection::new(mock);
        let response = conn.round_trip(request).await.unwrap();
        assert_eq!(response.code(), 0);
        assert_eq!(conn.requests_sent(), 1);
    }

    #[tokio::test]
    async fn test_server_error() {
        let mut frame = vec![0, 0, 0, 14];
        frame.extend_from_slice(&(-493i32).to_be_bytes());
        frame.extend_from_slice(b"Syntax\0\0\0\0");
        let mock = tokio_test::io::Builder::new().read(&frame).build();

        let mut conn = Connection::new(mock);
        let err = conn.receive().await.unwrap_err();
        assert!(matches!(
            &err,
            CodecError::Protocol(ProtocolError::Server { code: -493, message })
                if message.starts_with("Syntax")
        ));
    }

    #[tokio::test]
    async fn test_frame_split_across_reads() {
        let mock = tokio_test::io::Builder::new()
            .read(&[0, 0])
            .read(&[0, 6, 0, 0])
            .read(&[0, 2, 0xAB, 0xCD])
            .build();

        let mut conn = Connection::new(mock);
        let mut response = conn.receive().await.unwrap();
        assert_eq!(response.code(), 2);
        assert_eq!(response.body().read_i16().unwrap(), 0xABCDu16 as i16);
    }

    #[tokio::test]
    async fn test_closed_between_frames() {
        let mock = tokio_test::io::Builder::new().build();
        let mut conn = Connection::new(mock);
        assert!(matches!(
            conn.receive_raw().await,
            Err(CodecError::ConnectionClosed)
        ));
    }

    #[tokio::test]
    async fn test_closed_mid_frame() {
        let mock = tokio_test::io::Builder::new().read(&[0, 0, 0, 9, 1]).build();
        let mut conn = Connection::new(mock);
        assert!(matches!(
            conn.receive_raw().await,
            Err(CodecError::Truncated {
                expected: 13,
                actual: 5
            })
        ));
    }
}
