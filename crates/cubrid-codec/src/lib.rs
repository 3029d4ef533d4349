//! # cubrid-codec
//!
//! Async framing layer for the CUBRID CAS protocol.
//!
//! This crate turns a raw byte stream into length-prefixed frames and
//! drives one request/response round trip at a time.
//!
//! ## Architecture
//!
//! ```text
//! TCP Stream → CasCodec (frame boundaries) → Connection (round trips) → Client
//! ```
//!
//! Frames may arrive split across any number of TCP segments; the codec
//! buffers until a whole frame is present. End of stream inside a frame is
//! reported as [`CodecError::Truncated`].

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod connection;
pub mod error;
pub mod frame_codec;
pub mod framed;

pub use connection::Connection;
pub use error::CodecError;
pub use frame_codec::{CasCodec, DEFAULT_MAX_FRAME_SIZE};
pub use framed::FrameStream;
