//! # cubrid-protocol
//!
//! Pure implementation of the wire protocol spoken between a client and a
//! CUBRID broker and its CAS (client application server) processes.
//!
//! This crate covers the handshake blocks, request framing with back-patched
//! length prefixes, bounds-checked response reading, the type-tag model, and
//! the layouts of structured replies.
//!
//! ## Design Philosophy
//!
//! This crate is intentionally IO-agnostic. It contains no networking logic
//! and makes no assumptions about the async runtime. Higher-level crates
//! build upon this foundation to provide async I/O.
//!
//! ## Example
//!
//! ```rust
//! use cubrid_protocol::{FunctionCode, RequestWriter};
//!
//! let mut writer = RequestWriter::new();
//! writer.begin_request(FunctionCode::GetDbVersion);
//! writer.write_int_arg(1);
//! let request = writer.finish();
//!
//! // length prefix, code byte, one 4-byte int arg with its 4-byte size
//! assert_eq!(request.len(), 4 + 1 + 8);
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod error;
pub mod function;
pub mod handshake;
pub mod reply;
pub mod request;
pub mod response;
pub mod types;

pub use error::ProtocolError;
pub use function::{
    CursorOrigin, DbParameter, EndTransaction, ExecuteFlags, FunctionCode, ParamMode,
    PrepareFlags, QUERY_INFO_PLAN,
};
pub use handshake::{
    BROKER_INFO_SIZE, BrokerInfo, ClientType, DB_INFO_SIZE, DRIVER_INFO_SIZE, DbInfo, DriverInfo,
    PortReply,
};
pub use reply::{
    BatchResult, ColumnMetadata, ExecuteReply, NextResultReply, Oid, OutResultSetReply,
    PrepareReply, ResultInfo,
};
pub use request::{
    DEFAULT_BLOCK_CAPACITY, DateTimeFields, LENGTH_PREFIX_SIZE, Mark, OID_SIZE, Request,
    RequestWriter,
};
pub use response::{Response, ResponseReader};
pub use types::{CollectionKind, ColumnType, DataType, StatementType};
