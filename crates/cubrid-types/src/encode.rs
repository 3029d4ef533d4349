//! Encoding of SQL values into request args.
//!
//! Every value is written as one framed arg: a four-byte size followed by the
//! value bytes, or a bare zero size for NULL. The declared [`DataType`] picks
//! the wire form, and the value is coerced to it first.

use bytes::Bytes;
use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use cubrid_protocol::{DataType, DateTimeFields, Oid, RequestWriter};
use rust_decimal::Decimal;

use crate::error::TypeError;
use crate::from_sql::FromSql;
use crate::value::SqlValue;

/// Write `value` as an arg of the declared type.
///
/// A declared type of [`DataType::Null`] means "use the value's own type".
pub fn encode_value(
    writer: &mut RequestWriter,
    ty: DataType,
    value: &SqlValue,
) -> Result<(), TypeError> {
    if value.is_null() {
        writer.write_null_arg();
        return Ok(());
    }
    let ty = if ty == DataType::Null {
        value.data_type()
    } else {
        ty
    };

    match ty {
        DataType::Null => writer.write_null_arg(),
        DataType::Char | DataType::String | DataType::Nchar | DataType::Varnchar => {
            writer.write_string_arg(&to_text(value)?)?;
        }
        DataType::Numeric => writer.write_string_arg(&Decimal::from_sql(value)?.to_string())?,
        DataType::Short => writer.write_short_arg(i16::from_sql(value)?),
        DataType::Int => writer.write_int_arg(i32::from_sql(value)?),
        DataType::BigInt => writer.write_long_arg(i64::from_sql(value)?),
        DataType::Float => writer.write_float_arg(f32::from_sql(value)?),
        DataType::Double | DataType::Monetary => writer.write_double_arg(f64::from_sql(value)?),
        DataType::Date => writer.write_date_time_arg(date_fields(NaiveDate::from_sql(value)?)?),
        DataType::Time => writer.write_date_time_arg(time_fields(NaiveTime::from_sql(value)?)),
        DataType::Timestamp => {
            writer.write_date_time_arg(timestamp_fields(NaiveDateTime::from_sql(value)?)?);
        }
        DataType::DateTime => {
            let datetime = NaiveDateTime::from_sql(value)?;
            let mark = writer.begin_size();
            writer.put_date_time(timestamp_fields(datetime)?);
            writer.put_i16(millis(datetime.time()));
            writer.end_size(mark);
        }
        DataType::Bit | DataType::Varbit => writer.write_bytes_arg(&Bytes::from_sql(value)?)?,
        DataType::Object => writer.write_oid_arg(&Oid::from_sql(value)?.0),
        DataType::Set | DataType::Multiset | DataType::Sequence => {
            encode_collection(writer, value)?;
        }
        DataType::ResultSet => match value {
            SqlValue::ResultSet(handle) => writer.write_int_arg(*handle),
            _ => {
                return Err(TypeError::TypeMismatch {
                    expected: "RESULTSET",
                    actual: value.type_name().to_string(),
                });
            }
        },
    }
    Ok(())
}

/// Element type byte, element count, then one framed arg per element, all
/// inside a single size-prefixed arg.
fn encode_collection(writer: &mut RequestWriter, value: &SqlValue) -> Result<(), TypeError> {
    let SqlValue::Collection {
        element_type,
        elements,
        ..
    } = value
    else {
        return Err(TypeError::TypeMismatch {
            expected: "collection",
            actual: value.type_name().to_string(),
        });
    };
    if element_type.is_collection() {
        return Err(TypeError::UnsupportedConversion {
            from: element_type.name().to_string(),
            to: "collection element",
        });
    }
    let count = i32::try_from(elements.len()).map_err(|_| TypeError::OutOfRange {
        target_type: "collection",
    })?;

    let mark = writer.begin_size();
    writer.put_u8(*element_type as u8);
    writer.put_i32(count);
    for element in elements {
        encode_value(writer, *element_type, element)?;
    }
    writer.end_size(mark);
    Ok(())
}

fn to_text(value: &SqlValue) -> Result<String, TypeError> {
    Ok(match value {
        SqlValue::String(v) => v.clone(),
        SqlValue::Short(v) => v.to_string(),
        SqlValue::Int(v) => v.to_string(),
        SqlValue::BigInt(v) => v.to_string(),
        SqlValue::Float(v) => v.to_string(),
        SqlValue::Double(v) => v.to_string(),
        SqlValue::Numeric(v) => v.to_string(),
        _ => {
            return Err(TypeError::UnsupportedConversion {
                from: value.type_name().to_string(),
                to: "STRING",
            });
        }
    })
}

fn year(date: NaiveDate) -> Result<i16, TypeError> {
    i16::try_from(date.year())
        .map_err(|_| TypeError::InvalidDateTime(format!("year out of range: {date}")))
}

/// Date fields with the time fields zeroed.
pub fn date_fields(date: NaiveDate) -> Result<DateTimeFields, TypeError> {
    Ok(DateTimeFields {
        year: year(date)?,
        month: date.month() as i16,
        day: date.day() as i16,
        ..DateTimeFields::default()
    })
}

/// Time fields with the date fields zeroed.
#[must_use]
pub fn time_fields(time: NaiveTime) -> DateTimeFields {
    DateTimeFields {
        hour: time.hour() as i16,
        minute: time.minute() as i16,
        second: time.second() as i16,
        ..DateTimeFields::default()
    }
}

/// All six date and time fields.
pub fn timestamp_fields(datetime: NaiveDateTime) -> Result<DateTimeFields, TypeError> {
    let date = date_fields(datetime.date())?;
    let time = time_fields(datetime.time());
    Ok(DateTimeFields {
        hour: time.hour,
        minute: time.minute,
        second: time.second,
        ..date
    })
}

fn millis(time: NaiveTime) -> i16 {
    // Leap-second nanos can exceed one second.
    (time.nanosecond() / 1_000_000).min(999) as i16
}
