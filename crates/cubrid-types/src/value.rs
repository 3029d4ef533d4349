//! SQL value representation.

use bytes::Bytes;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use cubrid_protocol::{CollectionKind, DataType, Oid};
use rust_decimal::Decimal;

/// A SQL value that can represent any CUBRID data type.
///
/// `Timestamp` and `DateTime` both carry a `NaiveDateTime`; they differ in
/// the tag they are sent with and in whether milliseconds survive the wire.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum SqlValue {
    /// NULL value.
    #[default]
    Null,
    /// Character data (CHAR, VARCHAR/STRING, NCHAR, NCHAR VARYING).
    String(String),
    /// 16-bit signed integer (SMALLINT).
    Short(i16),
    /// 32-bit signed integer (INTEGER).
    Int(i32),
    /// 64-bit signed integer (BIGINT).
    BigInt(i64),
    /// 32-bit floating point (FLOAT).
    Float(f32),
    /// 64-bit floating point (DOUBLE, MONETARY).
    Double(f64),
    /// Exact numeric (NUMERIC).
    Numeric(Decimal),
    /// Date value (DATE).
    Date(NaiveDate),
    /// Time value (TIME).
    Time(NaiveTime),
    /// Timestamp value, second precision (TIMESTAMP).
    Timestamp(NaiveDateTime),
    /// Datetime value, millisecond precision (DATETIME).
    DateTime(NaiveDateTime),
    /// Bit string (BIT, BIT VARYING).
    Binary(Bytes),
    /// Object reference (OBJECT).
    Object(Oid),
    /// Homogeneous collection (SET, MULTISET, SEQUENCE).
    Collection {
        /// Collection kind.
        kind: CollectionKind,
        /// Type of every element.
        element_type: DataType,
        /// Elements in wire order.
        elements: Vec<SqlValue>,
    },
    /// Server handle of a result set (RESULTSET).
    ResultSet(i32),
}

impl SqlValue {
    /// Build a collection value.
    #[must_use]
    pub fn collection(kind: CollectionKind, element_type: DataType, elements: Vec<SqlValue>) -> Self {
        Self::Collection {
            kind,
            element_type,
            elements,
        }
    }

    /// Check if the value is NULL.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// The tag this value is sent with when no type is declared.
    #[must_use]
    pub fn data_type(&self) -> DataType {
        match self {
            Self::Null => DataType::Null,
            Self::String(_) => DataType::String,
            Self::Short(_) => DataType::Short,
            Self::Int(_) => DataType::Int,
            Self::BigInt(_) => DataType::BigInt,
            Self::Float(_) => DataType::Float,
            Self::Double(_) => DataType::Double,
            Self::Numeric(_) => DataType::Numeric,
            Self::Date(_) => DataType::Date,
            Self::Time(_) => DataType::Time,
            Self::Timestamp(_) => DataType::Timestamp,
            Self::DateTime(_) => DataType::DateTime,
            Self::Binary(_) => DataType::Varbit,
            Self::Object(_) => DataType::Object,
            Self::Collection { kind, .. } => kind.data_type(),
            Self::ResultSet(_) => DataType::ResultSet,
        }
    }

    /// Get the type name as a string.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        self.data_type().name()
    }

    /// Get the value as an i32, if it is one.
    #[must_use]
    pub fn as_i32(&self) -> Option<i32> {
        match self {
            Self::Int(v) => Some(*v),
            Self::Short(v) => Some(i32::from(*v)),
            _ => None,
        }
    }

    /// Get the value as an i64, if it is one.
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::BigInt(v) => Some(*v),
            Self::Int(v) => Some(i64::from(*v)),
            Self::Short(v) => Some(i64::from(*v)),
            _ => None,
        }
    }

    /// Get the value as an f64, if it is one.
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Double(v) => Some(*v),
            Self::Float(v) => Some(f64::from(*v)),
            _ => None,
        }
    }

    /// Get the value as a string slice, if it is one.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(v) => Some(v),
            _ => None,
        }
    }

    /// Get the value as bytes, if it is a bit string.
    #[must_use]
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Binary(v) => Some(v),
            _ => None,
        }
    }

    /// Get the elements, if the value is a collection.
    #[must_use]
    pub fn as_elements(&self) -> Option<&[SqlValue]> {
        match self {
            Self::Collection { elements, .. } => Some(elements),
            _ => None,
        }
    }

    /// Get the result-set handle, if the value is one.
    #[must_use]
    pub fn as_result_set(&self) -> Option<i32> {
        match self {
            Self::ResultSet(handle) => Some(*handle),
            _ => None,
        }
    }
}

impl From<i16> for SqlValue {
    fn from(v: i16) -> Self {
        Self::Short(v)
    }
}

impl From<i32> for SqlValue {
    fn from(v: i32) -> Self {
        Self::Int(v)
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        Self::BigInt(v)
    }
}

impl From<f32> for SqlValue {
    fn from(v: f32) -> Self {
        Self::Float(v)
    }
}

impl From<f64> for SqlValue {
    fn from(v: f64) -> Self {
        Self::Double(v)
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        Self::String(v.to_owned())
    }
}

impl From<Decimal> for SqlValue {
    fn from(v: Decimal) -> Self {
        Self::Numeric(v)
    }
}

impl From<NaiveDate> for SqlValue {
    fn from(v: NaiveDate) -> Self {
        Self::Date(v)
    }
}

impl From<NaiveTime> for SqlValue {
    fn from(v: NaiveTime) -> Self {
        Self::Time(v)
    }
}

impl From<NaiveDateTime> for SqlValue {
    fn from(v: NaiveDateTime) -> Self {
        Self::DateTime(v)
    }
}

impl From<Bytes> for SqlValue {
    fn from(v: Bytes) -> Self {
        Self::Binary(v)
    }
}

impl From<Oid> for SqlValue {
    fn from(v: Oid) -> Self {
        Self::Object(v)
    }
}

impl<T> From<Option<T>> for SqlValue
where
    T: Into<SqlValue>,
{
    fn from(v: Option<T>) -> Self {
        match v {
            Some(v) => v.into(),
            None => Self::Null,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_type_of_collection() {
        let value = SqlValue::collection(
            CollectionKind::Multiset,
            DataType::Int,
            vec![SqlValue::Int(1), SqlValue::Int(1)],
        );
        assert_eq!(value.data_type(), DataType::Multiset);
        assert_eq!(value.type_name(), "MULTISET");
        assert_eq!(value.as_elements().map(<[SqlValue]>::len), Some(2));
    }

    #[test]
    fn test_option_into_value() {
        let none: Option<i32> = None;
        assert!(SqlValue::from(none).is_null());
        assert_eq!(SqlValue::from(Some(7i16)), SqlValue::Short(7));
    }

    #[test]
    fn test_numeric_widening() {
        assert_eq!(SqlValue::Short(-3).as_i64(), Some(-3));
        assert_eq!(SqlValue::Float(1.5).as_f64(), Some(1.5));
        assert_eq!(SqlValue::String("x".into()).as_i32(), None);
    }
}
