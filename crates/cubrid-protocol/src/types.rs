//! Data type tags, collection masking and statement types.

/// Bits of a raw column type byte that select the collection kind.
pub const COLLECTION_MASK: u8 = 0x60;

/// Bits of a raw column type byte that carry a collection's element type.
pub const ELEMENT_MASK: u8 = 0x1F;

/// CUBRID data type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum DataType {
    /// NULL or unknown.
    #[default]
    Null = 0,
    /// Fixed-length character string.
    Char = 1,
    /// Variable-length character string.
    String = 2,
    /// Fixed-length national character string.
    Nchar = 3,
    /// Variable-length national character string.
    Varnchar = 4,
    /// Fixed-length bit string.
    Bit = 5,
    /// Variable-length bit string.
    Varbit = 6,
    /// Exact numeric, carried as decimal text.
    Numeric = 7,
    /// 32-bit integer.
    Int = 8,
    /// 16-bit integer.
    Short = 9,
    /// Monetary amount, carried as a double.
    Monetary = 10,
    /// 32-bit float.
    Float = 11,
    /// 64-bit float.
    Double = 12,
    /// Calendar date.
    Date = 13,
    /// Time of day.
    Time = 14,
    /// Date and time to the second.
    Timestamp = 15,
    /// Unordered collection without duplicates.
    Set = 16,
    /// Unordered collection with duplicates.
    Multiset = 17,
    /// Ordered collection.
    Sequence = 18,
    /// Object identifier.
    Object = 19,
    /// Nested result set handle.
    ResultSet = 20,
    /// 64-bit integer.
    BigInt = 21,
    /// Date and time to the millisecond.
    DateTime = 22,
}

impl DataType {
    /// Create a data type from its tag, or `None` for an unknown tag.
    #[must_use]
    pub fn from_u8(value: u8) -> Option<Self> {
        let ty = match value {
            0 => Self::Null,
            1 => Self::Char,
            2 => Self::String,
            3 => Self::Nchar,
            4 => Self::Varnchar,
            5 => Self::Bit,
            6 => Self::Varbit,
            7 => Self::Numeric,
            8 => Self::Int,
            9 => Self::Short,
            10 => Self::Monetary,
            11 => Self::Float,
            12 => Self::Double,
            13 => Self::Date,
            14 => Self::Time,
            15 => Self::Timestamp,
            16 => Self::Set,
            17 => Self::Multiset,
            18 => Self::Sequence,
            19 => Self::Object,
            20 => Self::ResultSet,
            21 => Self::BigInt,
            22 => Self::DateTime,
            _ => return None,
        };
        Some(ty)
    }

    /// Whether this tag names a collection.
    #[must_use]
    pub fn is_collection(self) -> bool {
        matches!(self, Self::Set | Self::Multiset | Self::Sequence)
    }

    /// Whether values of this type are character data.
    #[must_use]
    pub fn is_string(self) -> bool {
        matches!(self, Self::Char | Self::String | Self::Nchar | Self::Varnchar)
    }

    /// Get the type name as used in CUBRID DDL.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Null => "NULL",
            Self::Char => "CHAR",
            Self::String => "STRING",
            Self::Nchar => "NCHAR",
            Self::Varnchar => "NCHAR VARYING",
            Self::Bit => "BIT",
            Self::Varbit => "BIT VARYING",
            Self::Numeric => "NUMERIC",
            Self::Int => "INTEGER",
            Self::Short => "SMALLINT",
            Self::Monetary => "MONETARY",
            Self::Float => "FLOAT",
            Self::Double => "DOUBLE",
            Self::Date => "DATE",
            Self::Time => "TIME",
            Self::Timestamp => "TIMESTAMP",
            Self::Set => "SET",
            Self::Multiset => "MULTISET",
            Self::Sequence => "SEQUENCE",
            Self::Object => "OBJECT",
            Self::ResultSet => "RESULTSET",
            Self::BigInt => "BIGINT",
            Self::DateTime => "DATETIME",
        }
    }
}

/// Collection kind encoded in the upper bits of a raw type byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum CollectionKind {
    /// `SET`.
    Set = 0x20,
    /// `MULTISET`.
    Multiset = 0x40,
    /// `SEQUENCE` (`LIST`).
    Sequence = 0x60,
}

impl CollectionKind {
    /// The data type tag naming this collection kind.
    #[must_use]
    pub fn data_type(self) -> DataType {
        match self {
            Self::Set => DataType::Set,
            Self::Multiset => DataType::Multiset,
            Self::Sequence => DataType::Sequence,
        }
    }

    /// The collection kind named by a data type tag, if any.
    #[must_use]
    pub fn from_data_type(ty: DataType) -> Option<Self> {
        match ty {
            DataType::Set => Some(Self::Set),
            DataType::Multiset => Some(Self::Multiset),
            DataType::Sequence => Some(Self::Sequence),
            _ => None,
        }
    }
}

/// A column's declared type after collection decoding.
///
/// `element_type` is meaningful only when `data_type` is a collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ColumnType {
    /// Scalar type or collection kind.
    pub data_type: DataType,
    /// Element type of a collection.
    pub element_type: DataType,
}

impl ColumnType {
    /// The explicit "unrecognized" outcome.
    pub const NULL: Self = Self {
        data_type: DataType::Null,
        element_type: DataType::Null,
    };

    /// A scalar column type.
    #[must_use]
    pub const fn scalar(data_type: DataType) -> Self {
        Self {
            data_type,
            element_type: DataType::Null,
        }
    }

    /// A collection column type.
    #[must_use]
    pub fn collection(kind: CollectionKind, element_type: DataType) -> Self {
        Self {
            data_type: kind.data_type(),
            element_type,
        }
    }

    /// Decode a raw type byte.
    ///
    /// Bits `0x60` select scalar, `SET`, `MULTISET` or `SEQUENCE`; bits `0x1F`
    /// give the element type of a collection. Any unrecognized combination
    /// yields [`ColumnType::NULL`].
    #[must_use]
    pub fn from_raw(raw: u8) -> Self {
        if raw & !(COLLECTION_MASK | ELEMENT_MASK) != 0 {
            return Self::NULL;
        }

        let kind = match raw & COLLECTION_MASK {
            0x20 => CollectionKind::Set,
            0x40 => CollectionKind::Multiset,
            0x60 => CollectionKind::Sequence,
            _ => {
                return DataType::from_u8(raw).map_or(Self::NULL, Self::scalar);
            }
        };

        match DataType::from_u8(raw & ELEMENT_MASK) {
            Some(element) if !element.is_collection() => Self::collection(kind, element),
            _ => Self::NULL,
        }
    }

    /// Encode as a raw type byte.
    #[must_use]
    pub fn to_raw(self) -> u8 {
        match CollectionKind::from_data_type(self.data_type) {
            Some(kind) => kind as u8 | (self.element_type as u8 & ELEMENT_MASK),
            None => self.data_type as u8,
        }
    }

    /// The collection kind, when this is a collection type.
    #[must_use]
    pub fn collection_kind(self) -> Option<CollectionKind> {
        CollectionKind::from_data_type(self.data_type)
    }
}

/// Server-reported statement classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatementType {
    /// `ALTER CLASS`.
    AlterClass,
    /// `CREATE CLASS`.
    CreateClass,
    /// `CREATE INDEX`.
    CreateIndex,
    /// `DROP CLASS`.
    DropClass,
    /// `DROP INDEX`.
    DropIndex,
    /// `EVALUATE`.
    Evaluate,
    /// `GRANT`.
    Grant,
    /// `REVOKE`.
    Revoke,
    /// `INSERT`.
    Insert,
    /// `SELECT`.
    Select,
    /// `UPDATE`.
    Update,
    /// `DELETE`.
    Delete,
    /// Method `CALL`.
    Call,
    /// `GET STATISTICS`.
    GetStats,
    /// Stored-procedure call (`? = CALL proc(?)`).
    CallStoredProcedure,
    /// Server could not classify the statement.
    Unknown,
    /// Any other server statement type.
    Other(u8),
}

impl StatementType {
    /// Create a statement type from its raw byte.
    #[must_use]
    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::AlterClass,
            4 => Self::CreateClass,
            5 => Self::CreateIndex,
            9 => Self::DropClass,
            10 => Self::DropIndex,
            14 => Self::Evaluate,
            17 => Self::Grant,
            18 => Self::Revoke,
            20 => Self::Insert,
            21 => Self::Select,
            22 => Self::Update,
            23 => Self::Delete,
            24 => Self::Call,
            41 => Self::GetStats,
            0x7e => Self::CallStoredProcedure,
            0x7f => Self::Unknown,
            other => Self::Other(other),
        }
    }

    /// Raw byte value.
    #[must_use]
    pub fn as_u8(self) -> u8 {
        match self {
            Self::AlterClass => 0,
            Self::CreateClass => 4,
            Self::CreateIndex => 5,
            Self::DropClass => 9,
            Self::DropIndex => 10,
            Self::Evaluate => 14,
            Self::Grant => 17,
            Self::Revoke => 18,
            Self::Insert => 20,
            Self::Select => 21,
            Self::Update => 22,
            Self::Delete => 23,
            Self::Call => 24,
            Self::GetStats => 41,
            Self::CallStoredProcedure => 0x7e,
            Self::Unknown => 0x7f,
            Self::Other(value) => value,
        }
    }

    /// Whether the statement produces rows.
    ///
    /// Exactly `SELECT`, `CALL`, `EVALUATE` and `GET STATISTICS` do.
    #[must_use]
    pub fn is_query(self) -> bool {
        matches!(self, Self::Select | Self::Call | Self::Evaluate | Self::GetStats)
    }

    /// Whether tuple values carry a per-value runtime type byte.
    #[must_use]
    pub fn has_dynamic_columns(self) -> bool {
        matches!(
            self,
            Self::Call | Self::Evaluate | Self::CallStoredProcedure
        )
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_data_type_from_u8() {
        assert_eq!(DataType::from_u8(8), Some(DataType::Int));
        assert_eq!(DataType::from_u8(22), Some(DataType::DateTime));
        assert_eq!(DataType::from_u8(23), None);
    }

    #[test]
    fn test_column_type_scalar() {
        let ty = ColumnType::from_raw(DataType::Double as u8);
        assert_eq!(ty, ColumnType::scalar(DataType::Double));
        assert_eq!(ty.collection_kind(), None);
    }

    #[test]
    fn test_column_type_collections() {
        assert_eq!(
            ColumnType::from_raw(0x20 | DataType::Int as u8),
            ColumnType::collection(CollectionKind::Set, DataType::Int)
        );
        assert_eq!(
            ColumnType::from_raw(0x40 | DataType::String as u8),
            ColumnType::collection(CollectionKind::Multiset, DataType::String)
        );
        assert_eq!(
            ColumnType::from_raw(0x60 | DataType::Date as u8),
            ColumnType::collection(CollectionKind::Sequence, DataType::Date)
        );
    }

    #[test]
    fn test_column_type_unrecognized_is_null() {
        // element tag 31 does not exist
        assert_eq!(ColumnType::from_raw(0x20 | 0x1F), ColumnType::NULL);
        // high bit is never set by the server
        assert_eq!(ColumnType::from_raw(0x88), ColumnType::NULL);
        // scalar tag out of range
        assert_eq!(ColumnType::from_raw(0x1E), ColumnType::NULL);
        // collection of collections
        assert_eq!(ColumnType::from_raw(0x20 | DataType::Set as u8), ColumnType::NULL);
    }

    #[test]
    fn test_statement_type_shapes() {
        assert!(StatementType::Select.is_query());
        assert!(StatementType::GetStats.is_query());
        assert!(!StatementType::Insert.is_query());
        assert!(!StatementType::CallStoredProcedure.is_query());
        assert!(StatementType::CallStoredProcedure.has_dynamic_columns());
        assert_eq!(StatementType::from_u8(0x7e), StatementType::CallStoredProcedure);
        assert_eq!(StatementType::from_u8(33), StatementType::Other(33));
        assert_eq!(StatementType::Other(33).as_u8(), 33);
    }

    fn scalar_type() -> impl Strategy<Value = DataType> {
        (0u8..=22)
            .prop_filter_map("scalar", DataType::from_u8)
            .prop_filter("not a collection", |t| !t.is_collection())
    }

    fn collection_kind() -> impl Strategy<Value = CollectionKind> {
        prop_oneof![
            Just(CollectionKind::Set),
            Just(CollectionKind::Multiset),
            Just(CollectionKind::Sequence),
        ]
    }

    proptest! {
        #[test]
        fn collection_mask_law(kind in collection_kind(), element in scalar_type()) {
            let encoded = ColumnType::collection(kind, element).to_raw();
            let decoded = ColumnType::from_raw(encoded);
            prop_assert_eq!(decoded.collection_kind(), Some(kind));
            prop_assert_eq!(decoded.element_type, element);
        }
    }
}
