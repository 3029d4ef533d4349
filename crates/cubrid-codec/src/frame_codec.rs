//! Length-prefixed frame codec.

use bytes::{Buf, Bytes, BytesMut};
use cubrid_protocol::{LENGTH_PREFIX_SIZE, Request};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::CodecError;

/// Default upper bound on an incoming frame.
pub const DEFAULT_MAX_FRAME_SIZE: usize = 256 * 1024 * 1024;

/// Frame codec for tokio-util framing.
///
/// Decodes `[i32 length][length bytes]` into the bytes after the prefix, and
/// encodes finished [`Request`]s chunk by chunk.
#[derive(Debug, Clone)]
pub struct CasCodec {
    max_frame_size: usize,
}

impl CasCodec {
    /// Create a codec with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self {
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }

    /// Create a codec with a custom maximum frame size.
    #[must_use]
    pub fn with_max_frame_size(mut self, size: usize) -> Self {
        self.max_frame_size = size;
        self
    }

    /// The configured maximum frame size.
    #[must_use]
    pub fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }
}

impl Default for CasCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for CasCodec {
    type Item = Bytes;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < LENGTH_PREFIX_SIZE {
            return Ok(None);
        }

        let declared = i32::from_be_bytes([src[0], src[1], src[2], src[3]]);
        let length = usize::try_from(declared).map_err(|_| CodecError::InvalidLength(declared))?;
        if length > self.max_frame_size {
            return Err(CodecError::FrameTooLarge {
                size: length,
                max: self.max_frame_size,
            });
        }

        let total = LENGTH_PREFIX_SIZE + length;
        if src.len() < total {
            src.reserve(total - src.len());
            return Ok(None);
        }

        src.advance(LENGTH_PREFIX_SIZE);
        let payload = src.split_to(length).freeze();

        tracing::trace!(length, "decoded frame");

        Ok(Some(payload))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.decode(src)? {
            Some(frame) => Ok(Some(frame)),
            None if src.is_empty() => Ok(None),
            None => {
                let expected = if src.len() < LENGTH_PREFIX_SIZE {
                    LENGTH_PREFIX_SIZE
                } else {
                    LENGTH_PREFIX_SIZE
                        + i32::from_be_bytes([src[0], src[1], src[2], src[3]]).max(0) as usize
                };
                let actual = src.len();
                src.clear();
                Err(CodecError::Truncated { expected, actual })
            }
        }
    }
}

impl Encoder<Request> for CasCodec {
    type Error = CodecError;

    fn encode(&mut self, item: Request, dst: &mut BytesMut) -> Result<(), Self::Error> {
        dst.reserve(item.len());
        for chunk in item.chunks() {
            dst.extend_from_slice(chunk);
        }

        tracing::trace!(code = ?item.code(), length = item.len(), "encoded request");

        Ok(())
    }
}
