//! Trait for converting Rust types to SQL values.

use bytes::Bytes;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use cubrid_protocol::{DataType, Oid};
use rust_decimal::Decimal;

use crate::error::TypeError;
use crate::value::SqlValue;

/// Trait for types that can be converted to SQL values.
///
/// This trait is implemented for common Rust types to enable type-safe
/// parameter binding.
pub trait ToSql {
    /// Convert this value to a SQL value.
    fn to_sql(&self) -> Result<SqlValue, TypeError>;

    /// The type tag a parameter holding this value is declared with.
    fn sql_type(&self) -> DataType;
}

macro_rules! impl_to_sql {
    ($($ty:ty => $variant:ident, $tag:ident;)*) => {
        $(
            impl ToSql for $ty {
                fn to_sql(&self) -> Result<SqlValue, TypeError> {
                    Ok(SqlValue::$variant(self.clone()))
                }

                fn sql_type(&self) -> DataType {
                    DataType::$tag
                }
            }
        )*
    };
}

impl_to_sql! {
    i16 => Short, Short;
    i32 => Int, Int;
    i64 => BigInt, BigInt;
    f32 => Float, Float;
    f64 => Double, Double;
    String => String, String;
    Decimal => Numeric, Numeric;
    NaiveDate => Date, Date;
    NaiveTime => Time, Time;
    NaiveDateTime => DateTime, DateTime;
    Bytes => Binary, Varbit;
    Oid => Object, Object;
}

impl ToSql for str {
    fn to_sql(&self) -> Result<SqlValue, TypeError> {
        Ok(SqlValue::String(self.to_owned()))
    }

    fn sql_type(&self) -> DataType {
        DataType::String
    }
}

impl ToSql for [u8] {
    fn to_sql(&self) -> Result<SqlValue, TypeError> {
        Ok(SqlValue::Binary(Bytes::copy_from_slice(self)))
    }

    fn sql_type(&self) -> DataType {
        DataType::Varbit
    }
}

impl ToSql for Vec<u8> {
    fn to_sql(&self) -> Result<SqlValue, TypeError> {
        Ok(SqlValue::Binary(Bytes::copy_from_slice(self)))
    }

    fn sql_type(&self) -> DataType {
        DataType::Varbit
    }
}

impl ToSql for SqlValue {
    fn to_sql(&self) -> Result<SqlValue, TypeError> {
        Ok(self.clone())
    }

    fn sql_type(&self) -> DataType {
        self.data_type()
    }
}

impl<T: ToSql> ToSql for Option<T> {
    fn to_sql(&self) -> Result<SqlValue, TypeError> {
        match self {
            Some(v) => v.to_sql(),
            None => Ok(SqlValue::Null),
        }
    }

    fn sql_type(&self) -> DataType {
        match self {
            Some(v) => v.sql_type(),
            None => DataType::Null,
        }
    }
}

impl<T: ToSql + ?Sized> ToSql for &T {
    fn to_sql(&self) -> Result<SqlValue, TypeError> {
        (*self).to_sql()
    }

    fn sql_type(&self) -> DataType {
        (*self).sql_type()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_to_sql_i32() {
        let value: i32 = 42;
        assert_eq!(value.to_sql().unwrap(), SqlValue::Int(42));
        assert_eq!(value.sql_type(), DataType::Int);
    }

    #[test]
    fn test_to_sql_str() {
        let value = "hello";
        assert_eq!(value.to_sql().unwrap(), SqlValue::String("hello".into()));
        assert_eq!(value.sql_type(), DataType::String);
    }

    #[test]
    fn test_to_sql_option() {
        let some: Option<i32> = Some(42);
        assert_eq!(some.to_sql().unwrap(), SqlValue::Int(42));

        let none: Option<i32> = None;
        assert_eq!(none.to_sql().unwrap(), SqlValue::Null);
        assert_eq!(none.sql_type(), DataType::Null);
    }
}
