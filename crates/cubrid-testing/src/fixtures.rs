//! Test fixture utilities.

use chrono::NaiveDate;
use cubrid_protocol::{ColumnMetadata, ColumnType, DataType};
use cubrid_types::SqlValue;

use crate::mock_broker::MockResponse;

/// A six-column table with one row, one column per common scalar type.
#[derive(Debug, Clone)]
pub struct SampleTable {
    /// Table name.
    pub name: String,
}

impl Default for SampleTable {
    fn default() -> Self {
        Self::new("t1")
    }
}

impl SampleTable {
    /// Create the fixture for a table name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    /// SQL creating the table.
    #[must_use]
    pub fn create_table_sql(&self) -> String {
        format!(
            "CREATE TABLE {} (a INT, b CHAR(10), c STRING, d FLOAT, e DOUBLE, f DATE)",
            self.name
        )
    }

    /// SQL inserting the sample row.
    #[must_use]
    pub fn insert_sql(&self) -> String {
        format!(
            "INSERT INTO {} VALUES (1, 'cubrid', 'ado.net provider', 3.14, \
             8373625.383635235373, DATE '2008-12-24')",
            self.name
        )
    }

    /// SQL selecting every column.
    #[must_use]
    pub fn select_sql(&self) -> String {
        format!("SELECT * FROM {}", self.name)
    }

    /// SQL dropping the table.
    #[must_use]
    pub fn drop_table_sql(&self) -> String {
        format!("DROP TABLE IF EXISTS {}", self.name)
    }

    /// Column metadata as the server reports it.
    #[must_use]
    pub fn columns(&self) -> Vec<ColumnMetadata> {
        let column = |name: &str, ty: DataType| {
            ColumnMetadata::new(name, ColumnType::scalar(ty))
                .with_table(self.name.clone(), name)
                .with_nullable(true)
        };
        vec![
            column("a", DataType::Int).with_precision(10),
            column("b", DataType::Char).with_precision(10),
            column("c", DataType::String).with_precision(1_073_741_823),
            column("d", DataType::Float).with_precision(7),
            column("e", DataType::Double).with_precision(15),
            column("f", DataType::Date).with_precision(10),
        ]
    }

    /// The stored row, with CHAR padding applied.
    #[must_use]
    #[allow(clippy::approx_constant, clippy::excessive_precision)]
    pub fn row(&self) -> Vec<SqlValue> {
        vec![
            SqlValue::Int(1),
            SqlValue::String("cubrid    ".to_string()),
            SqlValue::String("ado.net provider".to_string()),
            SqlValue::Float(3.14),
            SqlValue::Double(8_373_625.383_635_235_373),
            NaiveDate::from_ymd_opt(2008, 12, 24).map_or(SqlValue::Null, SqlValue::Date),
        ]
    }

    /// The mock response for [`select_sql`](Self::select_sql).
    #[must_use]
    pub fn response(&self) -> MockResponse {
        MockResponse::rows(self.columns(), vec![self.row()])
    }
}
