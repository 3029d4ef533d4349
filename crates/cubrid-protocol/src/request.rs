//! Request frame writer.
//!
//! A request is `[i32 length][u8 function code][args...]`, where every arg is
//! `[i32 size][size bytes]` and a NULL arg is a bare zero size. All numbers
//! are big-endian.
//!
//! The writer buffers into a chain of fixed-capacity blocks, so a large
//! request never moves bytes that were already written. Length prefixes are
//! reserved up front and filled in later with [`RequestWriter::patch_int`].

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::ProtocolError;
use crate::function::FunctionCode;
use crate::types::DataType;

/// Default capacity of one request block.
pub const DEFAULT_BLOCK_CAPACITY: usize = 100 * 1024;

/// Size in bytes of a frame length prefix.
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Size in bytes of an OID on the wire.
pub const OID_SIZE: usize = 8;

/// Size in bytes of an encoded date/time arg (six 16-bit fields).
pub const DATE_TIME_ARG_SIZE: usize = 12;

/// A remembered write position, used to back-patch a length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mark {
    block: usize,
    offset: usize,
    position: usize,
}

impl Mark {
    /// Absolute byte offset from the start of the request.
    #[must_use]
    pub fn position(&self) -> usize {
        self.position
    }
}

/// Six 16-bit date/time fields as sent in a request.
///
/// Date values leave the time fields zeroed and time values leave the date
/// fields zeroed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DateTimeFields {
    /// Year.
    pub year: i16,
    /// Month (1-12).
    pub month: i16,
    /// Day of month.
    pub day: i16,
    /// Hour (0-23).
    pub hour: i16,
    /// Minute.
    pub minute: i16,
    /// Second.
    pub second: i16,
}

/// A finished request, ready to be written to the socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    code: FunctionCode,
    chunks: Vec<Bytes>,
    len: usize,
}

impl Request {
    /// The function code of this request.
    #[must_use]
    pub fn code(&self) -> FunctionCode {
        self.code
    }

    /// Total encoded length including the length prefix.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the request has no bytes (never true for a finished request).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The block chunks, in order.
    #[must_use]
    pub fn chunks(&self) -> &[Bytes] {
        &self.chunks
    }

    /// Concatenate the chunks into one buffer.
    #[must_use]
    pub fn to_bytes(&self) -> Bytes {
        if let [only] = self.chunks.as_slice() {
            return only.clone();
        }
        let mut out = BytesMut::with_capacity(self.len);
        for chunk in &self.chunks {
            out.put_slice(chunk);
        }
        out.freeze()
    }
}

/// Block-chained request builder.
///
/// One writer is reused for every request on a session: [`begin_request`]
/// resets it, the `write_*_arg` family appends args, and [`finish`] patches
/// the frame length and hands the bytes out.
///
/// [`begin_request`]: RequestWriter::begin_request
/// [`finish`]: RequestWriter::finish
#[derive(Debug)]
pub struct RequestWriter {
    blocks: Vec<BytesMut>,
    block_capacity: usize,
    written: usize,
    code: Option<FunctionCode>,
}

impl RequestWriter {
    /// Create a writer with the default block capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_block_capacity(DEFAULT_BLOCK_CAPACITY)
    }

    /// Create a writer with a custom block capacity.
    #[must_use]
    pub fn with_block_capacity(capacity: usize) -> Self {
        let block_capacity = capacity.max(LENGTH_PREFIX_SIZE);
        Self {
            blocks: vec![BytesMut::with_capacity(block_capacity)],
            block_capacity,
            written: 0,
            code: None,
        }
    }

    /// Discard everything written so far.
    pub fn reset(&mut self) {
        self.blocks.truncate(1);
        if let Some(first) = self.blocks.first_mut() {
            first.clear();
        }
        self.written = 0;
        self.code = None;
    }

    /// Reset and start a new request with the given function code.
    pub fn begin_request(&mut self, code: FunctionCode) {
        self.reset();
        self.put_i32(0);
        self.put_u8(code as u8);
        self.code = Some(code);
    }

    /// Number of bytes written, including the length prefix.
    #[must_use]
    pub fn written(&self) -> usize {
        self.written
    }

    /// Number of blocks currently in the chain.
    #[must_use]
    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// Remember the current write position.
    #[must_use]
    pub fn mark(&self) -> Mark {
        let block = self.blocks.len() - 1;
        let offset = self.blocks.last().map_or(0, BytesMut::len);
        Mark {
            block,
            offset,
            position: self.written,
        }
    }

    /// Overwrite four bytes at `mark` with `value`.
    ///
    /// The patched bytes may straddle a block boundary.
    pub fn patch_int(&mut self, mark: Mark, value: i32) {
        let mut block = mark.block;
        let mut offset = mark.offset;
        for byte in value.to_be_bytes() {
            while self.blocks.get(block).is_some_and(|b| offset >= b.len()) {
                block += 1;
                offset = 0;
            }
            if let Some(target) = self.blocks.get_mut(block) {
                target[offset] = byte;
                offset += 1;
            }
        }
    }

    /// Reserve a four-byte size slot and return its mark.
    pub fn begin_size(&mut self) -> Mark {
        let mark = self.mark();
        self.put_i32(0);
        mark
    }

    /// Patch a slot reserved by [`begin_size`](Self::begin_size) with the
    /// number of bytes written after it.
    pub fn end_size(&mut self, mark: Mark) {
        let size = self.written - mark.position - LENGTH_PREFIX_SIZE;
        self.patch_int(mark, size as i32);
    }

    /// Patch the frame length and take the request bytes.
    ///
    /// The length counts every byte after the prefix. The writer is left
    /// reset.
    pub fn finish(&mut self) -> Request {
        let len = self.written;
        if len >= LENGTH_PREFIX_SIZE {
            self.patch_int(
                Mark {
                    block: 0,
                    offset: 0,
                    position: 0,
                },
                (len - LENGTH_PREFIX_SIZE) as i32,
            );
        }

        let chunks = self
            .blocks
            .iter_mut()
            .filter(|b| !b.is_empty())
            .map(|b| b.split().freeze())
            .collect();
        debug_assert!(self.code.is_some(), "finish called before begin_request");
        let code = self.code.unwrap_or(FunctionCode::CheckCas);
        self.reset();

        Request { code, chunks, len }
    }

    // Raw writes. These bypass arg framing and are used for arg bodies.

    /// Append raw bytes, spilling into new blocks as needed.
    pub fn put_slice(&mut self, mut data: &[u8]) {
        while !data.is_empty() {
            let room = self.block_capacity - self.blocks.last().map_or(0, BytesMut::len);
            if room == 0 {
                self.blocks.push(BytesMut::with_capacity(self.block_capacity));
                continue;
            }
            let (head, tail) = data.split_at(room.min(data.len()));
            if let Some(block) = self.blocks.last_mut() {
                block.put_slice(head);
            }
            self.written += head.len();
            data = tail;
        }
    }

    /// Append one byte.
    pub fn put_u8(&mut self, value: u8) {
        self.put_slice(&[value]);
    }

    /// Append a big-endian `i16`.
    pub fn put_i16(&mut self, value: i16) {
        self.put_slice(&value.to_be_bytes());
    }

    /// Append a big-endian `i32`.
    pub fn put_i32(&mut self, value: i32) {
        self.put_slice(&value.to_be_bytes());
    }

    /// Append a big-endian `i64`.
    pub fn put_i64(&mut self, value: i64) {
        self.put_slice(&value.to_be_bytes());
    }

    /// Append an `f32` as its big-endian bit pattern.
    pub fn put_f32(&mut self, value: f32) {
        self.put_i32(value.to_bits() as i32);
    }

    /// Append an `f64` as its big-endian bit pattern.
    pub fn put_f64(&mut self, value: f64) {
        self.put_i64(value.to_bits() as i64);
    }

    /// Append six date/time fields.
    pub fn put_date_time(&mut self, fields: DateTimeFields) {
        for field in [
            fields.year,
            fields.month,
            fields.day,
            fields.hour,
            fields.minute,
            fields.second,
        ] {
            self.put_i16(field);
        }
    }

    // Framed args.

    /// Write a NULL arg.
    pub fn write_null_arg(&mut self) {
        self.put_i32(0);
    }

    /// Write a one-byte arg.
    pub fn write_byte_arg(&mut self, value: u8) {
        self.put_i32(1);
        self.put_u8(value);
    }

    /// Write a byte-array arg.
    pub fn write_bytes_arg(&mut self, value: &[u8]) -> Result<(), ProtocolError> {
        self.put_i32(arg_size(value.len())?);
        self.put_slice(value);
        Ok(())
    }

    /// Write a 16-bit integer arg.
    pub fn write_short_arg(&mut self, value: i16) {
        self.put_i32(2);
        self.put_i16(value);
    }

    /// Write a 32-bit integer arg.
    pub fn write_int_arg(&mut self, value: i32) {
        self.put_i32(4);
        self.put_i32(value);
    }

    /// Write a 64-bit integer arg.
    pub fn write_long_arg(&mut self, value: i64) {
        self.put_i32(8);
        self.put_i64(value);
    }

    /// Write a 32-bit float arg.
    pub fn write_float_arg(&mut self, value: f32) {
        self.put_i32(4);
        self.put_f32(value);
    }

    /// Write a 64-bit float arg.
    pub fn write_double_arg(&mut self, value: f64) {
        self.put_i32(8);
        self.put_f64(value);
    }

    /// Write a NUL-terminated string arg.
    pub fn write_string_arg(&mut self, value: &str) -> Result<(), ProtocolError> {
        self.put_i32(arg_size(value.len() + 1)?);
        self.put_slice(value.as_bytes());
        self.put_u8(0);
        Ok(())
    }

    /// Write a date/time arg as six 16-bit fields.
    pub fn write_date_time_arg(&mut self, fields: DateTimeFields) {
        self.put_i32(DATE_TIME_ARG_SIZE as i32);
        self.put_date_time(fields);
    }

    /// Write an eight-byte OID arg.
    pub fn write_oid_arg(&mut self, oid: &[u8; OID_SIZE]) {
        self.put_i32(OID_SIZE as i32);
        self.put_slice(oid);
    }

    /// Write a data type tag as a one-byte arg.
    pub fn write_type_arg(&mut self, ty: DataType) {
        self.write_byte_arg(ty as u8);
    }

    /// Write the cache-time stamp (two zeroed 32-bit fields).
    pub fn write_cache_time(&mut self) {
        self.put_i32(8);
        self.put_i32(0);
        self.put_i32(0);
    }
}

impl Default for RequestWriter {
    fn default() -> Self {
        Self::new()
    }
}

/// Size field of an arg holding `len` bytes.
fn arg_size(len: usize) -> Result<i32, ProtocolError> {
    i32::try_from(len).map_err(|_| ProtocolError::FieldTooLong {
        field: "argument",
        len,
        max: i32::MAX as usize,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_close_statement_request() {
        let mut writer = RequestWriter::new();
        writer.begin_request(FunctionCode::CloseStatement);
        writer.write_int_arg(7);
        let request = writer.finish();

        assert_eq!(request.code(), FunctionCode::CloseStatement);
        assert_eq!(
            &request.to_bytes()[..],
            &[0, 0, 0, 9, 6, 0, 0, 0, 4, 0, 0, 0, 7][..]
        );
    }

    #[test]
    fn test_string_and_null_args() {
        let mut writer = RequestWriter::new();
        writer.begin_request(FunctionCode::Prepare);
        writer.write_string_arg("ab").unwrap();
        writer.write_null_arg();
        let bytes = writer.finish().to_bytes();

        assert_eq!(&bytes[5..9], &[0, 0, 0, 3]);
        assert_eq!(&bytes[9..12], b"ab\0");
        assert_eq!(&bytes[12..16], &[0, 0, 0, 0]);
    }

    #[test]
    fn test_float_written_as_bits() {
        let mut writer = RequestWriter::new();
        writer.begin_request(FunctionCode::Execute);
        writer.write_float_arg(1.25);
        let bytes = writer.finish().to_bytes();

        assert_eq!(&bytes[9..13], &1.25f32.to_bits().to_be_bytes());
    }

    #[test]
    fn test_date_arg_zeroes_time_fields() {
        let mut writer = RequestWriter::new();
        writer.begin_request(FunctionCode::Execute);
        writer.write_date_time_arg(DateTimeFields {
            year: 2008,
            month: 12,
            day: 24,
            ..Default::default()
        });
        let bytes = writer.finish().to_bytes();

        assert_eq!(&bytes[5..9], &[0, 0, 0, 12]);
        assert_eq!(&bytes[9..15], &[0x07, 0xD8, 0, 12, 0, 24]);
        assert_eq!(&bytes[15..21], &[0; 6]);
    }

    #[test]
    fn test_patch_across_block_boundary() {
        let mut writer = RequestWriter::with_block_capacity(6);
        writer.begin_request(FunctionCode::Execute);
        // 5 bytes used; the size slot straddles the first boundary.
        let mark = writer.begin_size();
        writer.put_slice(&[9; 10]);
        writer.end_size(mark);
        let request = writer.finish();

        assert!(request.chunks().len() > 1);
        let bytes = request.to_bytes();
        assert_eq!(&bytes[5..9], &[0, 0, 0, 10]);
        assert_eq!(&bytes[0..4], &[0, 0, 0, 15]);
    }

    #[test]
    fn test_writer_reuse_after_finish() {
        let mut writer = RequestWriter::with_block_capacity(8);
        writer.begin_request(FunctionCode::ExecuteBatch);
        writer.write_string_arg("a long statement text").unwrap();
        let _ = writer.finish();
        assert_eq!(writer.written(), 0);
        assert_eq!(writer.block_count(), 1);

        writer.begin_request(FunctionCode::CheckCas);
        assert_eq!(writer.finish().to_bytes().as_ref(), &[0, 0, 0, 1, 32]);
    }

    #[test]
    fn test_arg_size_limit() {
        assert_eq!(arg_size(5).unwrap(), 5);
        let too_long = i32::MAX as usize + 1;
        assert!(matches!(
            arg_size(too_long),
            Err(ProtocolError::FieldTooLong { len, .. }) if len == too_long
        ));
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "before begin_request")]
    fn test_finish_requires_begin_request() {
        let mut writer = RequestWriter::new();
        writer.write_int_arg(1);
        let _ = writer.finish();
    }

    #[derive(Debug, Clone)]
    enum Arg {
        Null,
        Byte(u8),
        Short(i16),
        Int(i32),
        Long(i64),
        Double(f64),
        Str(String),
        Bytes(Vec<u8>),
    }

    fn arg() -> impl Strategy<Value = Arg> {
        prop_oneof![
            Just(Arg::Null),
            any::<u8>().prop_map(Arg::Byte),
            any::<i16>().prop_map(Arg::Short),
            any::<i32>().prop_map(Arg::Int),
            any::<i64>().prop_map(Arg::Long),
            any::<f64>().prop_map(Arg::Double),
            "[a-z ]{0,40}".prop_map(Arg::Str),
            proptest::collection::vec(any::<u8>(), 0..64).prop_map(Arg::Bytes),
        ]
    }

    proptest! {
        #[test]
        fn frame_length_matches_bytes_after_prefix(
            capacity in 4usize..64,
            args in proptest::collection::vec(arg(), 0..20),
        ) {
            let mut writer = RequestWriter::with_block_capacity(capacity);
            writer.begin_request(FunctionCode::Execute);
            for arg in &args {
                match arg {
                    Arg::Null => writer.write_null_arg(),
                    Arg::Byte(v) => writer.write_byte_arg(*v),
                    Arg::Short(v) => writer.write_short_arg(*v),
                    Arg::Int(v) => writer.write_int_arg(*v),
                    Arg::Long(v) => writer.write_long_arg(*v),
                    Arg::Double(v) => writer.write_double_arg(*v),
                    Arg::Str(v) => writer.write_string_arg(v).unwrap(),
                    Arg::Bytes(v) => writer.write_bytes_arg(v).unwrap(),
                }
            }
            let request = writer.finish();
            let bytes = request.to_bytes();
            let prefix = i32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);

            prop_assert_eq!(prefix as usize, bytes.len() - LENGTH_PREFIX_SIZE);
            prop_assert_eq!(request.len(), bytes.len());
        }
    }
}
