//! Result rows.
//!
//! A [`Row`] is one decoded result tuple. Values are addressed by position or
//! by column name; both views read the same vector, so `row.value(i)` and
//! `row.value_by_name(&columns[i].name)` agree for every column whose name
//! is not reused by a later column.

use std::sync::Arc;

use cubrid_protocol::{ColumnMetadata, DataType, Oid, ResponseReader};
use cubrid_types::{FromSql, SqlValue, TypeError, read_value};

/// One result tuple.
#[derive(Clone)]
pub struct Row {
    index: i32,
    oid: Option<Oid>,
    values: Vec<SqlValue>,
    columns: Arc<[ColumnMetadata]>,
}

impl Row {
    /// Create a row from decoded values.
    pub fn new(
        index: i32,
        oid: Option<Oid>,
        values: Vec<SqlValue>,
        columns: Arc<[ColumnMetadata]>,
    ) -> Self {
        Self {
            index,
            oid,
            values,
            columns,
        }
    }

    /// Server-side tuple index (1-based).
    #[must_use]
    pub fn index(&self) -> i32 {
        self.index
    }

    /// Object identifier of the row, when the server sent one.
    #[must_use]
    pub fn oid(&self) -> Option<Oid> {
        self.oid
    }

    /// Number of values.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the row has no values.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Column metadata for this row.
    #[must_use]
    pub fn columns(&self) -> &[ColumnMetadata] {
        &self.columns
    }

    /// Position of the column called `name`, compared case-insensitively.
    ///
    /// When several columns share the name, as in an unaliased join, the
    /// last one is returned.
    #[must_use]
    pub fn find_column(&self, name: &str) -> Option<usize> {
        self.columns
            .iter()
            .rposition(|c| c.name.eq_ignore_ascii_case(name))
    }

    /// Raw value by position.
    #[must_use]
    pub fn value(&self, index: usize) -> Option<&SqlValue> {
        self.values.get(index)
    }

    /// Raw value by column name.
    #[must_use]
    pub fn value_by_name(&self, name: &str) -> Option<&SqlValue> {
        self.find_column(name).and_then(|i| self.values.get(i))
    }

    /// Get a value by position with type conversion.
    pub fn get<T: FromSql>(&self, index: usize) -> Result<T, TypeError> {
        self.values
            .get(index)
            .ok_or_else(|| TypeError::TypeMismatch {
                expected: "valid column index",
                actual: format!("index {index} out of bounds"),
            })
            .and_then(T::from_sql)
    }

    /// Get a value by column name with type conversion.
    pub fn get_by_name<T: FromSql>(&self, name: &str) -> Result<T, TypeError> {
        let index = self
            .find_column(name)
            .ok_or_else(|| TypeError::TypeMismatch {
                expected: "valid column name",
                actual: format!("column '{name}' not found"),
            })?;
        self.get(index)
    }

    /// Try to get a value, returning `None` if it is NULL, missing or not
    /// convertible.
    pub fn try_get<T: FromSql>(&self, index: usize) -> Option<T> {
        self.values
            .get(index)
            .and_then(|v| T::from_sql_nullable(v).ok().flatten())
    }

    /// Whether the value at `index` is NULL (or missing).
    #[must_use]
    pub fn is_null(&self, index: usize) -> bool {
        self.values.get(index).is_none_or(SqlValue::is_null)
    }

    /// Iterate over the values in column order.
    pub fn iter(&self) -> std::slice::Iter<'_, SqlValue> {
        self.values.iter()
    }

    /// Take the values, dropping the metadata.
    #[must_use]
    pub fn into_values(self) -> Vec<SqlValue> {
        self.values
    }
}

impl std::fmt::Debug for Row {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Row")
            .field("index", &self.index)
            .field("oid", &self.oid)
            .field("values", &self.values)
            .finish()
    }
}

impl<'a> IntoIterator for &'a Row {
    type Item = &'a SqlValue;
    type IntoIter = std::slice::Iter<'a, SqlValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.values.iter()
    }
}

/// Decode one tuple of `width` values.
///
/// Layout: `i32` index, 8-byte OID, then one size-prefixed value per column.
/// Columns past the end of `columns`, or declared NULL, carry a runtime type
/// byte.
pub(crate) fn read_tuple(
    body: &mut ResponseReader,
    columns: &Arc<[ColumnMetadata]>,
    width: usize,
    runtime_typed: bool,
) -> Result<Row, TypeError> {
    let index = body.read_i32()?;
    let oid = Oid::decode(body)?;
    let mut values = Vec::with_capacity(width);
    for i in 0..width {
        let declared = columns.get(i).map_or(DataType::Null, ColumnMetadata::data_type);
        values.push(read_value(body, declared, runtime_typed)?);
    }
    let oid = (!oid.is_null()).then_some(oid);
    Ok(Row::new(index, oid, values, Arc::clone(columns)))
}
