//! Trait for converting from SQL values to Rust types.

use std::str::FromStr;

use bytes::Bytes;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use cubrid_protocol::Oid;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;

use crate::error::TypeError;
use crate::value::SqlValue;

/// Trait for types that can be converted from SQL values.
///
/// Used both for typed getters on result rows and for coercing a bound
/// value to the type a parameter was declared with.
pub trait FromSql: Sized {
    /// Convert from a SQL value to this type.
    fn from_sql(value: &SqlValue) -> Result<Self, TypeError>;

    /// Convert from an optional SQL value.
    ///
    /// Returns `None` if the value is NULL.
    fn from_sql_nullable(value: &SqlValue) -> Result<Option<Self>, TypeError> {
        if value.is_null() {
            Ok(None)
        } else {
            Self::from_sql(value).map(Some)
        }
    }
}

fn mismatch(expected: &'static str, value: &SqlValue) -> TypeError {
    match value {
        SqlValue::Null => TypeError::UnexpectedNull,
        _ => TypeError::TypeMismatch {
            expected,
            actual: value.type_name().to_string(),
        },
    }
}

fn out_of_range(target_type: &'static str) -> TypeError {
    TypeError::OutOfRange { target_type }
}

impl FromSql for i16 {
    fn from_sql(value: &SqlValue) -> Result<Self, TypeError> {
        match value {
            SqlValue::Short(v) => Ok(*v),
            SqlValue::Int(v) => i16::try_from(*v).map_err(|_| out_of_range("i16")),
            SqlValue::BigInt(v) => i16::try_from(*v).map_err(|_| out_of_range("i16")),
            SqlValue::Numeric(v) if v.fract().is_zero() => {
                v.to_i16().ok_or_else(|| out_of_range("i16"))
            }
            _ => Err(mismatch("i16", value)),
        }
    }
}

impl FromSql for i32 {
    fn from_sql(value: &SqlValue) -> Result<Self, TypeError> {
        match value {
            SqlValue::Int(v) => Ok(*v),
            SqlValue::Short(v) => Ok(i32::from(*v)),
            SqlValue::BigInt(v) => i32::try_from(*v).map_err(|_| out_of_range("i32")),
            SqlValue::Numeric(v) if v.fract().is_zero() => {
                v.to_i32().ok_or_else(|| out_of_range("i32"))
            }
            _ => Err(mismatch("i32", value)),
        }
    }
}

impl FromSql for i64 {
    fn from_sql(value: &SqlValue) -> Result<Self, TypeError> {
        match value {
            SqlValue::BigInt(v) => Ok(*v),
            SqlValue::Int(v) => Ok(i64::from(*v)),
            SqlValue::Short(v) => Ok(i64::from(*v)),
            SqlValue::Numeric(v) if v.fract().is_zero() => {
                v.to_i64().ok_or_else(|| out_of_range("i64"))
            }
            _ => Err(mismatch("i64", value)),
        }
    }
}

impl FromSql for f32 {
    fn from_sql(value: &SqlValue) -> Result<Self, TypeError> {
        match value {
            SqlValue::Float(v) => Ok(*v),
            SqlValue::Short(v) => Ok(f32::from(*v)),
            _ => Err(mismatch("f32", value)),
        }
    }
}

impl FromSql for f64 {
    fn from_sql(value: &SqlValue) -> Result<Self, TypeError> {
        match value {
            SqlValue::Double(v) => Ok(*v),
            SqlValue::Float(v) => Ok(f64::from(*v)),
            SqlValue::Int(v) => Ok(f64::from(*v)),
            SqlValue::Short(v) => Ok(f64::from(*v)),
            SqlValue::Numeric(v) => v.to_f64().ok_or_else(|| out_of_range("f64")),
            _ => Err(mismatch("f64", value)),
        }
    }
}

impl FromSql for String {
    fn from_sql(value: &SqlValue) -> Result<Self, TypeError> {
        match value {
            SqlValue::String(v) => Ok(v.clone()),
            _ => Err(mismatch("String", value)),
        }
    }
}

impl FromSql for Decimal {
    fn from_sql(value: &SqlValue) -> Result<Self, TypeError> {
        match value {
            SqlValue::Numeric(v) => Ok(*v),
            SqlValue::Short(v) => Ok(Decimal::from(*v)),
            SqlValue::Int(v) => Ok(Decimal::from(*v)),
            SqlValue::BigInt(v) => Ok(Decimal::from(*v)),
            SqlValue::Double(v) => {
                Decimal::try_from(*v).map_err(|e| TypeError::InvalidDecimal(e.to_string()))
            }
            SqlValue::String(v) => Decimal::from_str(v.trim())
                .or_else(|_| Decimal::from_scientific(v.trim()))
                .map_err(|e| TypeError::InvalidDecimal(e.to_string())),
            _ => Err(mismatch("Decimal", value)),
        }
    }
}

impl FromSql for NaiveDate {
    fn from_sql(value: &SqlValue) -> Result<Self, TypeError> {
        match value {
            SqlValue::Date(v) => Ok(*v),
            SqlValue::Timestamp(v) | SqlValue::DateTime(v) => Ok(v.date()),
            _ => Err(mismatch("NaiveDate", value)),
        }
    }
}

impl FromSql for NaiveTime {
    fn from_sql(value: &SqlValue) -> Result<Self, TypeError> {
        match value {
            SqlValue::Time(v) => Ok(*v),
            SqlValue::Timestamp(v) | SqlValue::DateTime(v) => Ok(v.time()),
            _ => Err(mismatch("NaiveTime", value)),
        }
    }
}

impl FromSql for NaiveDateTime {
    fn from_sql(value: &SqlValue) -> Result<Self, TypeError> {
        match value {
            SqlValue::Timestamp(v) | SqlValue::DateTime(v) => Ok(*v),
            SqlValue::Date(v) => Ok(v.and_time(NaiveTime::MIN)),
            _ => Err(mismatch("NaiveDateTime", value)),
        }
    }
}

impl FromSql for Bytes {
    fn from_sql(value: &SqlValue) -> Result<Self, TypeError> {
        match value {
            SqlValue::Binary(v) => Ok(v.clone()),
            _ => Err(mismatch("Bytes", value)),
        }
    }
}

impl FromSql for Vec<u8> {
    fn from_sql(value: &SqlValue) -> Result<Self, TypeError> {
        Bytes::from_sql(value).map(|b| b.to_vec())
    }
}

impl FromSql for Oid {
    fn from_sql(value: &SqlValue) -> Result<Self, TypeError> {
        match value {
            SqlValue::Object(v) => Ok(*v),
            _ => Err(mismatch("Oid", value)),
        }
    }
}

impl FromSql for Vec<SqlValue> {
    fn from_sql(value: &SqlValue) -> Result<Self, TypeError> {
        match value {
            SqlValue::Collection { elements, .. } => Ok(elements.clone()),
            _ => Err(mismatch("collection", value)),
        }
    }
}

impl FromSql for SqlValue {
    fn from_sql(value: &SqlValue) -> Result<Self, TypeError> {
        Ok(value.clone())
    }
}

impl<T: FromSql> FromSql for Option<T> {
    fn from_sql(value: &SqlValue) -> Result<Self, TypeError> {
        T::from_sql_nullable(value)
    }
}
