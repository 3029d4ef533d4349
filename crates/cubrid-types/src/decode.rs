//! Decoding of SQL values out of response frames.
//!
//! A value on the wire is an `i32` size followed by that many bytes; a size
//! of zero or less is NULL. Each value is decoded from a sub-reader holding
//! exactly its bytes, so a short decode never desynchronizes the frame.

use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use cubrid_protocol::{CollectionKind, ColumnType, DataType, Oid, ResponseReader};
use rust_decimal::Decimal;

use crate::error::TypeError;
use crate::value::SqlValue;

/// Most 16-bit fields any date/time value carries.
const MAX_DATE_TIME_FIELDS: usize = 7;

/// Decode a value of type `ty` occupying the next `size` bytes.
pub fn decode_value(
    reader: &mut ResponseReader,
    ty: DataType,
    size: i32,
) -> Result<SqlValue, TypeError> {
    if size <= 0 {
        return Ok(SqlValue::Null);
    }
    let mut body = reader.split_to(size as usize)?;
    decode_body(&mut body, ty)
}

/// Read a size-prefixed value.
///
/// When `runtime_typed` is set, or the declared type is NULL, a type byte
/// follows the size and overrides the declared type.
pub fn read_value(
    reader: &mut ResponseReader,
    declared: DataType,
    runtime_typed: bool,
) -> Result<SqlValue, TypeError> {
    let size = reader.read_i32()?;
    if size <= 0 {
        return Ok(SqlValue::Null);
    }
    if runtime_typed || declared == DataType::Null {
        let ty = ColumnType::from_raw(reader.read_u8()?).data_type;
        return decode_value(reader, ty, size - 1);
    }
    decode_value(reader, declared, size)
}

fn decode_body(body: &mut ResponseReader, ty: DataType) -> Result<SqlValue, TypeError> {
    let size = body.remaining() as i32;
    let value = match ty {
        // Unrecognized type tags decode to NULL.
        DataType::Null => SqlValue::Null,
        DataType::Char | DataType::String | DataType::Nchar | DataType::Varnchar => {
            SqlValue::String(body.read_string(size)?.unwrap_or_default())
        }
        DataType::Short => SqlValue::Short(body.read_i16()?),
        DataType::Int => SqlValue::Int(body.read_i32()?),
        DataType::BigInt => SqlValue::BigInt(body.read_i64()?),
        DataType::Float => SqlValue::Float(body.read_f32()?),
        DataType::Double | DataType::Monetary => SqlValue::Double(body.read_f64()?),
        DataType::Numeric => {
            let text = body.read_string(size)?.unwrap_or_default();
            SqlValue::Numeric(parse_decimal(text.trim())?)
        }
        DataType::Date => {
            let fields = read_fields(body)?;
            SqlValue::Date(date(&fields)?)
        }
        DataType::Time => {
            let fields = read_fields(body)?;
            // A six-field value carries its time in fields 4-6.
            let time_fields = if fields.len() >= 6 {
                &fields[3..6]
            } else {
                &fields[..]
            };
            SqlValue::Time(time(time_fields, 0)?)
        }
        DataType::Timestamp => {
            let fields = read_fields(body)?;
            SqlValue::Timestamp(datetime(&fields)?)
        }
        DataType::DateTime => {
            let fields = read_fields(body)?;
            SqlValue::DateTime(datetime(&fields)?)
        }
        DataType::Bit | DataType::Varbit => SqlValue::Binary(body.read_bytes(body.remaining())?),
        DataType::Object => SqlValue::Object(Oid::decode(body)?),
        DataType::Set | DataType::Multiset | DataType::Sequence => decode_collection(body, ty)?,
        DataType::ResultSet => SqlValue::ResultSet(body.read_i32()?),
    };
    Ok(value)
}

fn decode_collection(body: &mut ResponseReader, ty: DataType) -> Result<SqlValue, TypeError> {
    let kind = CollectionKind::from_data_type(ty).ok_or(TypeError::UnsupportedConversion {
        from: ty.name().to_string(),
        to: "collection",
    })?;
    let element_type = DataType::from_u8(body.read_u8()?).unwrap_or(DataType::Null);
    let count = body.read_i32()?.max(0);

    let mut elements = Vec::with_capacity((count as usize).min(body.remaining()));
    for _ in 0..count {
        let size = body.read_i32()?;
        elements.push(decode_value(body, element_type, size)?);
    }
    Ok(SqlValue::Collection {
        kind,
        element_type,
        elements,
    })
}

fn parse_decimal(text: &str) -> Result<Decimal, TypeError> {
    Decimal::from_str(text)
        .or_else(|_| Decimal::from_scientific(text))
        .map_err(|e| TypeError::InvalidDecimal(format!("{text}: {e}")))
}

fn read_fields(body: &mut ResponseReader) -> Result<Vec<i16>, TypeError> {
    let count = (body.remaining() / 2).min(MAX_DATE_TIME_FIELDS);
    (0..count)
        .map(|_| body.read_i16().map_err(TypeError::from))
        .collect()
}

fn field(fields: &[i16], index: usize) -> i16 {
    fields.get(index).copied().unwrap_or(0)
}

fn date(fields: &[i16]) -> Result<NaiveDate, TypeError> {
    let (year, month, day) = (field(fields, 0), field(fields, 1), field(fields, 2));
    NaiveDate::from_ymd_opt(i32::from(year), month as u32, day as u32).ok_or_else(|| {
        TypeError::InvalidDateTime(format!("{year:04}-{month:02}-{day:02}"))
    })
}

fn time(fields: &[i16], millis: i16) -> Result<NaiveTime, TypeError> {
    let (hour, minute, second) = (field(fields, 0), field(fields, 1), field(fields, 2));
    NaiveTime::from_hms_milli_opt(hour as u32, minute as u32, second as u32, millis as u32)
        .ok_or_else(|| {
            TypeError::InvalidDateTime(format!(
                "{hour:02}:{minute:02}:{second:02}.{millis:03}"
            ))
        })
}

fn datetime(fields: &[i16]) -> Result<NaiveDateTime, TypeError> {
    let date = date(fields)?;
    let time_fields = fields.get(3..6).unwrap_or(&[]);
    let time = time(time_fields, field(fields, 6))?;
    Ok(date.and_time(time))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use bytes::{BufMut, BytesMut};

    fn reader(bytes: &[u8]) -> ResponseReader {
        ResponseReader::new(bytes::Bytes::copy_from_slice(bytes))
    }

    #[test]
    fn test_non_positive_size_is_null() {
        let mut src = reader(&[0xFF; 4]);
        assert_eq!(decode_value(&mut src, DataType::Int, 0).unwrap(), SqlValue::Null);
        assert_eq!(decode_value(&mut src, DataType::Int, -1).unwrap(), SqlValue::Null);
        // nothing consumed
        assert_eq!(src.remaining(), 4);
    }

    #[test]
    fn test_char_keeps_padding() {
        let mut src = reader(b"cubrid    \0");
        assert_eq!(
            decode_value(&mut src, DataType::Char, 11).unwrap(),
            SqlValue::String("cubrid    ".into())
        );
    }

    #[test]
    fn test_three_field_date() {
        let mut src = reader(&[0x07, 0xD8, 0, 12, 0, 24]);
        assert_eq!(
            decode_value(&mut src, DataType::Date, 6).unwrap(),
            SqlValue::Date(NaiveDate::from_ymd_opt(2008, 12, 24).unwrap())
        );
    }

    #[test]
    fn test_six_field_time_uses_trailing_fields() {
        let mut src = reader(&[0, 0, 0, 0, 0, 0, 0, 23, 0, 59, 0, 1]);
        assert_eq!(
            decode_value(&mut src, DataType::Time, 12).unwrap(),
            SqlValue::Time(NaiveTime::from_hms_opt(23, 59, 1).unwrap())
        );
    }

    #[test]
    fn test_datetime_millis() {
        let mut buf = BytesMut::new();
        for field in [2020i16, 2, 29, 12, 30, 45, 250] {
            buf.put_i16(field);
        }
        let mut src = ResponseReader::new(buf.freeze());
        let expected = NaiveDate::from_ymd_opt(2020, 2, 29)
            .unwrap()
            .and_hms_milli_opt(12, 30, 45, 250)
            .unwrap();
        assert_eq!(
            decode_value(&mut src, DataType::DateTime, 14).unwrap(),
            SqlValue::DateTime(expected)
        );
    }

    #[test]
    fn test_invalid_date_reported() {
        let mut src = reader(&[0, 0, 0, 0, 0, 0]);
        assert!(matches!(
            decode_value(&mut src, DataType::Date, 6),
            Err(TypeError::InvalidDateTime(_))
        ));
    }

    #[test]
    fn test_numeric_text() {
        let mut src = reader(b"8373625.383635235373\0");
        let value = decode_value(&mut src, DataType::Numeric, 21).unwrap();
        assert_eq!(
            value,
            SqlValue::Numeric(Decimal::from_str("8373625.383635235373").unwrap())
        );
    }

    #[test]
    fn test_runtime_type_byte() {
        let mut buf = BytesMut::new();
        buf.put_i32(5);
        buf.put_u8(DataType::Int as u8);
        buf.put_i32(77);
        buf.put_i32(-1);
        let mut src = ResponseReader::new(buf.freeze());

        assert_eq!(read_value(&mut src, DataType::Null, false).unwrap(), SqlValue::Int(77));
        // a NULL value carries no type byte
        assert_eq!(read_value(&mut src, DataType::Null, true).unwrap(), SqlValue::Null);
        assert!(src.is_empty());
    }

    #[test]
    fn test_collection_elements() {
        let mut buf = BytesMut::new();
        buf.put_u8(DataType::String as u8);
        buf.put_i32(2);
        buf.put_i32(2);
        buf.put_slice(b"a\0");
        buf.put_i32(0);
        let size = buf.len() as i32;
        let mut src = ResponseReader::new(buf.freeze());

        assert_eq!(
            decode_value(&mut src, DataType::Multiset, size).unwrap(),
            SqlValue::collection(
                CollectionKind::Multiset,
                DataType::String,
                vec![SqlValue::String("a".into()), SqlValue::Null],
            )
        );
    }

    #[test]
    fn test_overrun_is_error() {
        let mut src = reader(&[0, 1]);
        assert!(matches!(
            decode_value(&mut src, DataType::Int, 4),
            Err(TypeError::Protocol(_))
        ));
    }

    #[test]
    fn test_short_body_is_error() {
        let mut src = reader(&[0, 1]);
        assert!(matches!(
            decode_value(&mut src, DataType::Int, 2),
            Err(TypeError::Protocol(_))
        ));
    }
}
