//! Structured reply bodies.
//!
//! Each `decode` reads from a [`ResponseReader`] positioned after the
//! response code; each `encode` writes the same layout and is used by test
//! servers.

use bytes::BufMut;

use crate::error::ProtocolError;
use crate::request::OID_SIZE;
use crate::response::ResponseReader;
use crate::types::{ColumnType, DataType, StatementType};

/// Eight-byte object identifier (page id, slot id, volume id).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Oid(pub [u8; OID_SIZE]);

impl Oid {
    /// Build an OID from its parts.
    #[must_use]
    pub fn new(page_id: i32, slot_id: i16, volume_id: i16) -> Self {
        let mut raw = [0u8; OID_SIZE];
        raw[..4].copy_from_slice(&page_id.to_be_bytes());
        raw[4..6].copy_from_slice(&slot_id.to_be_bytes());
        raw[6..].copy_from_slice(&volume_id.to_be_bytes());
        Self(raw)
    }

    /// Page id.
    #[must_use]
    pub fn page_id(&self) -> i32 {
        i32::from_be_bytes([self.0[0], self.0[1], self.0[2], self.0[3]])
    }

    /// Slot id.
    #[must_use]
    pub fn slot_id(&self) -> i16 {
        i16::from_be_bytes([self.0[4], self.0[5]])
    }

    /// Volume id.
    #[must_use]
    pub fn volume_id(&self) -> i16 {
        i16::from_be_bytes([self.0[6], self.0[7]])
    }

    /// Whether every byte is zero.
    #[must_use]
    pub fn is_null(&self) -> bool {
        self.0 == [0; OID_SIZE]
    }

    /// Read an OID.
    pub fn decode(src: &mut ResponseReader) -> Result<Self, ProtocolError> {
        src.read_oid().map(Self)
    }
}

impl std::fmt::Display for Oid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "@{}|{}|{}", self.page_id(), self.slot_id(), self.volume_id())
    }
}

/// Write an `i32` size followed by a NUL-terminated string.
pub fn put_sized_string(dst: &mut impl BufMut, value: &str) {
    dst.put_i32(value.len() as i32 + 1);
    dst.put_slice(value.as_bytes());
    dst.put_u8(0);
}

/// Metadata describing one result column.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[non_exhaustive]
pub struct ColumnMetadata {
    /// Decoded column type.
    pub column_type: ColumnType,
    /// Scale.
    pub scale: i16,
    /// Precision.
    pub precision: i32,
    /// Column label.
    pub name: String,
    /// Underlying attribute name.
    pub real_name: String,
    /// Owning table.
    pub table: String,
    /// Whether the column accepts NULL.
    pub nullable: bool,
}

impl ColumnMetadata {
    /// Create column metadata with a name and type.
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            column_type,
            name: name.into(),
            nullable: true,
            ..Default::default()
        }
    }

    /// Set the precision.
    #[must_use]
    pub fn with_precision(mut self, precision: i32) -> Self {
        self.precision = precision;
        self
    }

    /// Set the scale.
    #[must_use]
    pub fn with_scale(mut self, scale: i16) -> Self {
        self.scale = scale;
        self
    }

    /// Set the owning table and attribute name.
    #[must_use]
    pub fn with_table(mut self, table: impl Into<String>, real_name: impl Into<String>) -> Self {
        self.table = table.into();
        self.real_name = real_name.into();
        self
    }

    /// Set the nullable flag.
    #[must_use]
    pub fn with_nullable(mut self, nullable: bool) -> Self {
        self.nullable = nullable;
        self
    }

    /// Scalar type or collection kind.
    #[must_use]
    pub fn data_type(&self) -> DataType {
        self.column_type.data_type
    }

    /// Element type; meaningful for collections only.
    #[must_use]
    pub fn element_type(&self) -> DataType {
        self.column_type.element_type
    }

    /// Read one column description.
    pub fn decode(src: &mut ResponseReader) -> Result<Self, ProtocolError> {
        let column_type = ColumnType::from_raw(src.read_u8()?);
        let scale = src.read_i16()?;
        let precision = src.read_i32()?;
        let name = src.read_sized_string()?.unwrap_or_default();
        let real_name = src.read_sized_string()?.unwrap_or_default();
        let table = src.read_sized_string()?.unwrap_or_default();
        let nullable = src.read_u8()? == 0;
        Ok(Self {
            column_type,
            scale,
            precision,
            name,
            real_name,
            table,
            nullable,
        })
    }

    /// Write one column description.
    pub fn encode(&self, dst: &mut impl BufMut) {
        dst.put_u8(self.column_type.to_raw());
        dst.put_i16(self.scale);
        dst.put_i32(self.precision);
        put_sized_string(dst, &self.name);
        put_sized_string(dst, &self.real_name);
        put_sized_string(dst, &self.table);
        dst.put_u8(u8::from(!self.nullable));
    }

    /// Read `count` column descriptions.
    pub fn decode_list(src: &mut ResponseReader, count: i32) -> Result<Vec<Self>, ProtocolError> {
        (0..count.max(0)).map(|_| Self::decode(src)).collect()
    }
}

/// Per-result summary returned by execute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResultInfo {
    /// Statement type of this result.
    pub statement_type: StatementType,
    /// Affected or selected row count.
    pub row_count: i32,
    /// OID of the inserted object, when any.
    pub oid: Oid,
    /// Cache timestamp, seconds part.
    pub cache_time_sec: i32,
    /// Cache timestamp, microseconds part.
    pub cache_time_usec: i32,
}

impl ResultInfo {
    /// Create a result summary with a zero OID and cache time.
    #[must_use]
    pub fn new(statement_type: StatementType, row_count: i32) -> Self {
        Self {
            statement_type,
            row_count,
            oid: Oid::default(),
            cache_time_sec: 0,
            cache_time_usec: 0,
        }
    }

    /// Read one result summary.
    pub fn decode(src: &mut ResponseReader) -> Result<Self, ProtocolError> {
        Ok(Self {
            statement_type: StatementType::from_u8(src.read_u8()?),
            row_count: src.read_i32()?,
            oid: Oid::decode(src)?,
            cache_time_sec: src.read_i32()?,
            cache_time_usec: src.read_i32()?,
        })
    }

    /// Write one result summary.
    pub fn encode(&self, dst: &mut impl BufMut) {
        dst.put_u8(self.statement_type.as_u8());
        dst.put_i32(self.row_count);
        dst.put_slice(&self.oid.0);
        dst.put_i32(self.cache_time_sec);
        dst.put_i32(self.cache_time_usec);
    }
}

/// Reply to a prepare request (the response code is the handle).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrepareReply {
    /// Server statement handle.
    pub handle: i32,
    /// Result cache lifetime hint.
    pub cache_lifetime: i32,
    /// Statement type.
    pub statement_type: StatementType,
    /// Number of `?` placeholders.
    pub bind_count: i32,
    /// Whether the result is updatable.
    pub updatable: bool,
    /// Result columns.
    pub columns: Vec<ColumnMetadata>,
}

impl PrepareReply {
    /// Read the reply body for the given handle.
    pub fn decode(handle: i32, src: &mut ResponseReader) -> Result<Self, ProtocolError> {
        let cache_lifetime = src.read_i32()?;
        let statement_type = StatementType::from_u8(src.read_u8()?);
        let bind_count = src.read_i32()?;
        let updatable = src.read_u8()? == 1;
        let column_count = src.read_i32()?;
        let columns = ColumnMetadata::decode_list(src, column_count)?;
        Ok(Self {
            handle,
            cache_lifetime,
            statement_type,
            bind_count,
            updatable,
            columns,
        })
    }

    /// Write the reply body (without the handle, which is the response code).
    pub fn encode(&self, dst: &mut impl BufMut) {
        dst.put_i32(self.cache_lifetime);
        dst.put_u8(self.statement_type.as_u8());
        dst.put_i32(self.bind_count);
        dst.put_u8(u8::from(self.updatable));
        dst.put_i32(self.columns.len() as i32);
        for column in &self.columns {
            column.encode(dst);
        }
    }

    /// Number of values in each result tuple.
    ///
    /// A stored-procedure call returns one slot for the return value plus one
    /// per bound parameter.
    #[must_use]
    pub fn tuple_width(&self) -> usize {
        if self.statement_type == StatementType::CallStoredProcedure {
            self.bind_count.max(0) as usize + 1
        } else {
            self.columns.len()
        }
    }
}

/// Leading part of an execute reply (the response code is the total count).
///
/// For row-producing statements an inline fetch block follows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecuteReply {
    /// Total affected or selected rows.
    pub total: i32,
    /// Whether the server may reuse its cached result.
    pub cache_reusable: bool,
    /// One summary per executed statement.
    pub results: Vec<ResultInfo>,
}

impl ExecuteReply {
    /// Read the reply header.
    pub fn decode(total: i32, src: &mut ResponseReader) -> Result<Self, ProtocolError> {
        let cache_reusable = src.read_u8()? == 1;
        let count = src.read_i32()?;
        let results = (0..count.max(0))
            .map(|_| ResultInfo::decode(src))
            .collect::<Result<_, _>>()?;
        Ok(Self {
            total,
            cache_reusable,
            results,
        })
    }

    /// Write the reply header.
    pub fn encode(&self, dst: &mut impl BufMut) {
        dst.put_u8(u8::from(self.cache_reusable));
        dst.put_i32(self.results.len() as i32);
        for info in &self.results {
            info.encode(dst);
        }
    }
}

/// Reply to a next-result request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NextResultReply {
    /// Row count of the new result.
    pub row_count: i32,
    /// Statement type of the new result.
    pub statement_type: StatementType,
    /// Whether the new result is updatable.
    pub updatable: bool,
    /// Columns of the new result.
    pub columns: Vec<ColumnMetadata>,
}

impl NextResultReply {
    /// Read the reply body.
    pub fn decode(src: &mut ResponseReader) -> Result<Self, ProtocolError> {
        let row_count = src.read_i32()?;
        let statement_type = StatementType::from_u8(src.read_u8()?);
        let updatable = src.read_u8()? == 1;
        let column_count = src.read_i32()?;
        let columns = ColumnMetadata::decode_list(src, column_count)?;
        Ok(Self {
            row_count,
            statement_type,
            updatable,
            columns,
        })
    }

    /// Write the reply body.
    pub fn encode(&self, dst: &mut impl BufMut) {
        dst.put_i32(self.row_count);
        dst.put_u8(self.statement_type.as_u8());
        dst.put_u8(u8::from(self.updatable));
        dst.put_i32(self.columns.len() as i32);
        for column in &self.columns {
            column.encode(dst);
        }
    }
}

/// Reply to a make-out-result-set request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutResultSetReply {
    /// Handle of the materialized result set.
    pub handle: i32,
    /// Statement type of the result.
    pub statement_type: StatementType,
    /// Row count.
    pub row_count: i32,
    /// Whether the result is updatable.
    pub updatable: bool,
    /// Result columns.
    pub columns: Vec<ColumnMetadata>,
}

impl OutResultSetReply {
    /// Read the reply body.
    pub fn decode(src: &mut ResponseReader) -> Result<Self, ProtocolError> {
        let handle = src.read_i32()?;
        let statement_type = StatementType::from_u8(src.read_u8()?);
        let row_count = src.read_i32()?;
        let updatable = src.read_u8()? == 1;
        let column_count = src.read_i32()?;
        let columns = ColumnMetadata::decode_list(src, column_count)?;
        Ok(Self {
            handle,
            statement_type,
            row_count,
            updatable,
            columns,
        })
    }

    /// Write the reply body.
    pub fn encode(&self, dst: &mut impl BufMut) {
        dst.put_i32(self.handle);
        dst.put_u8(self.statement_type.as_u8());
        dst.put_i32(self.row_count);
        dst.put_u8(u8::from(self.updatable));
        dst.put_i32(self.columns.len() as i32);
        for column in &self.columns {
            column.encode(dst);
        }
    }
}

/// Outcome of one entry of a batch execute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchResult {
    /// Statement type of the entry.
    pub statement_type: StatementType,
    /// Affected rows, or the negative error code.
    pub result: i32,
    /// Error message when `result` is negative.
    pub error_message: Option<String>,
}

impl BatchResult {
    /// Whether the entry failed.
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.result < 0
    }

    /// Read one entry.
    pub fn decode(src: &mut ResponseReader) -> Result<Self, ProtocolError> {
        let statement_type = StatementType::from_u8(src.read_u8()?);
        let result = src.read_i32()?;
        let error_message = if result < 0 {
            src.read_sized_string()?
        } else {
            // OID of the last inserted object; unused.
            src.skip(OID_SIZE)?;
            None
        };
        Ok(Self {
            statement_type,
            result,
            error_message,
        })
    }

    /// Read one entry of a prepared-statement batch.
    ///
    /// These entries carry no type byte, and a failure repeats the error
    /// code before its message.
    pub fn decode_prepared(
        statement_type: StatementType,
        src: &mut ResponseReader,
    ) -> Result<Self, ProtocolError> {
        let mut result = src.read_i32()?;
        let error_message = if result < 0 {
            result = src.read_i32()?;
            src.read_sized_string()?
        } else {
            src.skip(OID_SIZE)?;
            None
        };
        Ok(Self {
            statement_type,
            result,
            error_message,
        })
    }

    /// Write one prepared-statement batch entry.
    pub fn encode_prepared(&self, dst: &mut impl BufMut) {
        dst.put_i32(self.result);
        match &self.error_message {
            Some(message) if self.result < 0 => {
                dst.put_i32(self.result);
                put_sized_string(dst, message);
            }
            _ => dst.put_slice(&[0; OID_SIZE]),
        }
    }

    /// Read `count` entries.
    pub fn decode_list(src: &mut ResponseReader, count: i32) -> Result<Vec<Self>, ProtocolError> {
        (0..count.max(0)).map(|_| Self::decode(src)).collect()
    }

    /// Write one entry.
    pub fn encode(&self, dst: &mut impl BufMut) {
        dst.put_u8(self.statement_type.as_u8());
        dst.put_i32(self.result);
        match &self.error_message {
            Some(message) if self.result < 0 => put_sized_string(dst, message),
            _ => dst.put_slice(&[0; OID_SIZE]),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::types::CollectionKind;
    use bytes::BytesMut;

    fn reader(buf: BytesMut) -> ResponseReader {
        ResponseReader::new(buf.freeze())
    }

    #[test]
    fn test_column_metadata_layout() {
        let column = ColumnMetadata::new("tags", ColumnType::collection(CollectionKind::Set, DataType::String))
            .with_precision(10)
            .with_table("t", "tags")
            .with_nullable(false);
        let mut buf = BytesMut::new();
        column.encode(&mut buf);

        assert_eq!(buf[0], 0x22);
        let decoded = ColumnMetadata::decode(&mut reader(buf)).unwrap();
        assert_eq!(decoded, column);
        assert_eq!(decoded.data_type(), DataType::Set);
        assert_eq!(decoded.element_type(), DataType::String);
    }

    #[test]
    fn test_prepare_reply_tuple_width() {
        let reply = PrepareReply {
            handle: 4,
            cache_lifetime: -1,
            statement_type: StatementType::CallStoredProcedure,
            bind_count: 2,
            updatable: false,
            columns: Vec::new(),
        };
        let mut buf = BytesMut::new();
        reply.encode(&mut buf);

        let decoded = PrepareReply::decode(4, &mut reader(buf)).unwrap();
        assert_eq!(decoded, reply);
        assert_eq!(decoded.tuple_width(), 3);
    }

    #[test]
    fn test_execute_reply_results() {
        let reply = ExecuteReply {
            total: 2,
            cache_reusable: false,
            results: vec![
                ResultInfo::new(StatementType::Insert, 1),
                ResultInfo::new(StatementType::Update, 1),
            ],
        };
        let mut buf = BytesMut::new();
        reply.encode(&mut buf);
        buf.put_u8(0xAA);

        let mut src = reader(buf);
        assert_eq!(ExecuteReply::decode(2, &mut src).unwrap(), reply);
        assert_eq!(src.read_u8().unwrap(), 0xAA);
    }

    #[test]
    fn test_batch_result_error_entry() {
        let mut buf = BytesMut::new();
        BatchResult {
            statement_type: StatementType::Insert,
            result: 1,
            error_message: None,
        }
        .encode(&mut buf);
        BatchResult {
            statement_type: StatementType::Other(99),
            result: -494,
            error_message: Some("Semantic error".into()),
        }
        .encode(&mut buf);

        let results = BatchResult::decode_list(&mut reader(buf), 2).unwrap();
        assert!(!results[0].is_error());
        assert!(results[1].is_error());
        assert_eq!(results[1].error_message.as_deref(), Some("Semantic error"));
    }

    #[test]
    fn test_prepared_batch_entries() {
        let mut buf = BytesMut::new();
        buf.put_i32(-1);
        buf.put_i32(-670);
        put_sized_string(&mut buf, "Unique violation");
        buf.put_i32(3);
        buf.put_slice(&[0; OID_SIZE]);

        let mut src = reader(buf);
        let failed = BatchResult::decode_prepared(StatementType::Insert, &mut src).unwrap();
        assert_eq!(failed.result, -670);
        assert_eq!(failed.error_message.as_deref(), Some("Unique violation"));
        let ok = BatchResult::decode_prepared(StatementType::Insert, &mut src).unwrap();
        assert_eq!(ok.result, 3);
        assert!(src.is_empty());
    }

    #[test]
    fn test_oid_parts() {
        let oid = Oid::new(1200, 3, 1);
        assert_eq!(oid.page_id(), 1200);
        assert_eq!(oid.slot_id(), 3);
        assert_eq!(oid.volume_id(), 1);
        assert_eq!(oid.to_string(), "@1200|3|1");
        assert!(Oid::default().is_null());
    }
}
