//! Request function codes and per-request flag sets.

use bitflags::bitflags;

use crate::error::ProtocolError;

/// CAS function code, the opcode byte that follows a request's length prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FunctionCode {
    /// Commit or roll back the current transaction.
    EndTransaction = 1,
    /// Prepare a SQL statement and obtain a server handle.
    Prepare = 2,
    /// Execute a prepared statement.
    Execute = 3,
    /// Read a session parameter.
    GetDbParameter = 4,
    /// Set a session parameter (isolation level, lock timeout).
    SetDbParameter = 5,
    /// Release a server statement handle.
    CloseStatement = 6,
    /// Move a server-side cursor.
    Cursor = 7,
    /// Fetch a window of tuples.
    Fetch = 8,
    /// Schema information request.
    GetSchemaInfo = 9,
    /// Server version string.
    GetDbVersion = 15,
    /// Advance to the next result of a multi-statement execute.
    NextResult = 19,
    /// Execute several SQL texts in one request.
    ExecuteBatch = 20,
    /// Execute one prepared statement against several parameter rows.
    ExecuteBatchPrepared = 21,
    /// Query plan text.
    GetQueryInfo = 24,
    /// Savepoint control.
    Savepoint = 26,
    /// Orderly connection shutdown.
    CloseConnection = 31,
    /// Liveness check.
    CheckCas = 32,
    /// Materialize a result-set OUT parameter as a statement handle.
    MakeOutResultSet = 33,
}

impl FunctionCode {
    /// Create a function code from a raw byte value.
    pub fn from_u8(value: u8) -> Result<Self, ProtocolError> {
        match value {
            1 => Ok(Self::EndTransaction),
            2 => Ok(Self::Prepare),
            3 => Ok(Self::Execute),
            4 => Ok(Self::GetDbParameter),
            5 => Ok(Self::SetDbParameter),
            6 => Ok(Self::CloseStatement),
            7 => Ok(Self::Cursor),
            8 => Ok(Self::Fetch),
            9 => Ok(Self::GetSchemaInfo),
            15 => Ok(Self::GetDbVersion),
            19 => Ok(Self::NextResult),
            20 => Ok(Self::ExecuteBatch),
            21 => Ok(Self::ExecuteBatchPrepared),
            24 => Ok(Self::GetQueryInfo),
            26 => Ok(Self::Savepoint),
            31 => Ok(Self::CloseConnection),
            32 => Ok(Self::CheckCas),
            33 => Ok(Self::MakeOutResultSet),
            _ => Err(ProtocolError::UnknownFunctionCode(value)),
        }
    }
}

/// End-transaction tag carried by [`FunctionCode::EndTransaction`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum EndTransaction {
    /// Commit.
    Commit = 1,
    /// Roll back.
    Rollback = 2,
}

/// Origin byte carried by [`FunctionCode::Cursor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum CursorOrigin {
    /// Offset counts from the first row.
    First = 0,
    /// Offset counts from the current row.
    Current = 1,
    /// Offset counts back from the last row.
    Last = 2,
}

/// Session parameter ids used with [`FunctionCode::SetDbParameter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum DbParameter {
    /// Transaction isolation level.
    IsolationLevel = 1,
    /// Lock wait timeout in milliseconds.
    LockTimeout = 2,
}

/// Flag sent with [`FunctionCode::GetQueryInfo`] to request the plan text.
pub const QUERY_INFO_PLAN: u8 = 0x01;

bitflags! {
    /// Prepare option byte.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct PrepareFlags: u8 {
        /// Plain statement.
        const NORMAL = 0x00;
        /// Return OIDs with each tuple.
        const INCLUDE_OID = 0x01;
        /// Request an updatable result.
        const UPDATABLE = 0x02;
        /// Stored-procedure call (`? = CALL proc(?)`).
        const CALL = 0x40;
    }
}

bitflags! {
    /// Execution flag byte.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ExecuteFlags: u8 {
        /// Synchronous execution.
        const NORMAL = 0x00;
        /// Asynchronous execution.
        const ASYNC = 0x01;
        /// Execute every statement of a multi-statement text.
        const QUERY_ALL = 0x02;
        /// Collect query information.
        const QUERY_INFO = 0x04;
    }
}

/// Per-parameter direction byte in the execute request's mode array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum ParamMode {
    /// Input only.
    #[default]
    In = 1,
    /// Output only.
    Out = 2,
    /// Input and output.
    InOut = 3,
}
