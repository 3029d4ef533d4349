//! # cubrid-types
//!
//! CUBRID to Rust type mappings and conversions.
//!
//! This crate provides the [`SqlValue`] model, the encoding of values into
//! request args and the decoding of values out of response frames, including
//! recursively encoded collections and values whose type is only known at
//! run time.
//!
//! ## Type Mappings
//!
//! | CUBRID Type | Rust Type |
//! |-------------|-----------|
//! | `SMALLINT` | `i16` |
//! | `INTEGER` | `i32` |
//! | `BIGINT` | `i64` |
//! | `FLOAT` | `f32` |
//! | `DOUBLE`/`MONETARY` | `f64` |
//! | `NUMERIC` | `rust_decimal::Decimal` |
//! | `CHAR`/`VARCHAR`/`NCHAR` | `String` |
//! | `BIT`/`BIT VARYING` | `bytes::Bytes` |
//! | `DATE` | `chrono::NaiveDate` |
//! | `TIME` | `chrono::NaiveTime` |
//! | `TIMESTAMP`/`DATETIME` | `chrono::NaiveDateTime` |
//! | `OBJECT` | `cubrid_protocol::Oid` |
//! | `SET`/`MULTISET`/`SEQUENCE` | `Vec<SqlValue>` |

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod decode;
pub mod encode;
pub mod error;
pub mod from_sql;
pub mod to_sql;
pub mod value;

pub use decode::{decode_value, read_value};
pub use encode::encode_value;
pub use error::TypeError;
pub use from_sql::FromSql;
pub use to_sql::ToSql;
pub use value::SqlValue;
