//! Prepared statements.
//!
//! A [`Statement`] carries a server-side handle from prepare until close.
//! Every operation borrows the owning [`Session`] for its round trips.
//!
//! ```text
//! prepare -> bind* -> execute -> (next_row* | next_result)* -> close
//! ```
//!
//! Dropping a statement without calling [`Statement::close`] queues its
//! handle; the session releases it before its next request.

use std::sync::Arc;

use cubrid_protocol::{
    BatchResult, ColumnMetadata, CursorOrigin, ExecuteFlags, ExecuteReply, FunctionCode, NextResultReply,
    OutResultSetReply, PrepareFlags, PrepareReply, QUERY_INFO_PLAN, RequestWriter, ResultInfo,
    StatementType,
};
use cubrid_types::{SqlValue, ToSql, TypeError, encode_value};

use crate::cursor::Cursor;
use crate::error::{Error, Result};
use crate::parameter::Parameter;
use crate::row::{Row, read_tuple};
use crate::session::{ReleaseQueue, Session};

/// A prepared statement.
pub struct Statement {
    handle: i32,
    sql: String,
    statement_type: StatementType,
    bind_count: i32,
    tuple_width: usize,
    columns: Arc<[ColumnMetadata]>,
    updatable: bool,
    cache_lifetime: i32,
    cache_reusable: bool,
    parameters: Vec<Option<Parameter>>,
    result_infos: Vec<ResultInfo>,
    result_count: i32,
    results_consumed: usize,
    cursor: Option<Cursor>,
    return_value: Option<SqlValue>,
    out_result_sets: Vec<Option<Statement>>,
    generation: u64,
    released: ReleaseQueue,
    closed: bool,
}

impl Statement {
    /// Prepare `sql`.
    pub async fn prepare(session: &mut Session, sql: &str) -> Result<Self> {
        Self::prepare_with_flags(session, sql, PrepareFlags::NORMAL).await
    }

    /// Prepare a stored-procedure call such as `? = CALL proc(?)`.
    ///
    /// The first placeholder receives the return value; the others are the
    /// procedure's arguments in declaration order.
    pub async fn prepare_call(session: &mut Session, sql: &str) -> Result<Self> {
        Self::prepare_with_flags(session, sql, PrepareFlags::CALL).await
    }

    /// Prepare `sql` with explicit prepare flags.
    pub async fn prepare_with_flags(
        session: &mut Session,
        sql: &str,
        flags: PrepareFlags,
    ) -> Result<Self> {
        session.ready().await?;
        tracing::debug!(sql = sql, flags = ?flags, "preparing statement");

        let auto_commit = u8::from(session.auto_commit());
        let writer = session.begin_request(FunctionCode::Prepare);
        writer.write_string_arg(sql)?;
        writer.write_byte_arg(flags.bits());
        writer.write_byte_arg(auto_commit);

        let mut response = session.send_request().await?;
        let handle = response.code();
        let reply = PrepareReply::decode(handle, response.body())?;
        tracing::debug!(
            handle = handle,
            statement_type = ?reply.statement_type,
            bind_count = reply.bind_count,
            columns = reply.columns.len(),
            "statement prepared"
        );

        let tuple_width = reply.tuple_width();
        let bind_count = reply.bind_count.max(0);
        Ok(Self {
            handle,
            sql: sql.to_string(),
            statement_type: reply.statement_type,
            bind_count,
            tuple_width,
            columns: reply.columns.into(),
            updatable: reply.updatable,
            cache_lifetime: reply.cache_lifetime,
            cache_reusable: false,
            parameters: vec![None; bind_count as usize],
            result_infos: Vec::new(),
            result_count: 0,
            results_consumed: 0,
            cursor: None,
            return_value: None,
            out_result_sets: Vec::new(),
            generation: session.generation(),
            released: session.release_queue(),
            closed: false,
        })
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    /// Server-side handle.
    #[must_use]
    pub fn handle(&self) -> i32 {
        self.handle
    }

    /// SQL text this statement was prepared from.
    #[must_use]
    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// Statement type of the current result.
    #[must_use]
    pub fn statement_type(&self) -> StatementType {
        self.statement_type
    }

    /// Number of `?` placeholders.
    #[must_use]
    pub fn bind_count(&self) -> i32 {
        self.bind_count
    }

    /// Column metadata of the current result.
    #[must_use]
    pub fn columns(&self) -> &[ColumnMetadata] {
        &self.columns
    }

    /// Whether the server allows updates through the result.
    #[must_use]
    pub fn is_updatable(&self) -> bool {
        self.updatable
    }

    /// Cache lifetime hint from prepare.
    #[must_use]
    pub fn cache_lifetime(&self) -> i32 {
        self.cache_lifetime
    }

    /// Cache-reusable flag from the last execute.
    #[must_use]
    pub fn cache_reusable(&self) -> bool {
        self.cache_reusable
    }

    /// Per-result summaries from the last execute.
    #[must_use]
    pub fn result_infos(&self) -> &[ResultInfo] {
        &self.result_infos
    }

    /// Row count of the current result: rows for queries, affected rows
    /// otherwise.
    #[must_use]
    pub fn result_count(&self) -> i32 {
        self.result_count
    }

    /// Parameter bound at `index` (0-based), including output values written
    /// back by a stored-procedure call.
    #[must_use]
    pub fn parameter(&self, index: usize) -> Option<&Parameter> {
        self.parameters.get(index).and_then(Option::as_ref)
    }

    /// Return value of a stored-procedure call.
    #[must_use]
    pub fn return_value(&self) -> Option<&SqlValue> {
        self.return_value.as_ref()
    }

    /// Take the result set opened for the cursor-typed output parameter at
    /// `index`.
    pub fn take_out_result_set(&mut self, index: usize) -> Option<Statement> {
        self.out_result_sets.get_mut(index).and_then(Option::take)
    }

    /// Cursor over the current result, if it is query-shaped.
    #[must_use]
    pub fn cursor(&self) -> Option<&Cursor> {
        self.cursor.as_ref()
    }

    /// Whether [`close`](Self::close) has run.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    // ========================================================================
    // Binding
    // ========================================================================

    /// Bind a parameter to the placeholder at `index` (0-based).
    pub fn bind(&mut self, index: usize, parameter: impl Into<Parameter>) -> Result<()> {
        let count = self.parameters.len();
        let slot = self
            .parameters
            .get_mut(index)
            .ok_or(Error::BindIndexOutOfRange { index, count })?;
        *slot = Some(parameter.into());
        Ok(())
    }

    /// Bind an input value typed after its Rust type.
    pub fn bind_value<T: ToSql + ?Sized>(&mut self, index: usize, value: &T) -> Result<()> {
        let parameter = Parameter::input(value.to_sql()?).with_type(value.sql_type());
        self.bind(index, parameter)
    }

    /// Unbind every placeholder.
    pub fn clear_bindings(&mut self) {
        self.parameters.iter_mut().for_each(|slot| *slot = None);
    }

    // ========================================================================
    // Execution
    // ========================================================================

    /// Execute a query-shaped statement and open its cursor.
    ///
    /// Returns the number of rows in the result.
    pub async fn execute_query(&mut self, session: &mut Session) -> Result<i32> {
        if !self.statement_type.is_query() {
            return Err(self.wrong_shape("execute_query"));
        }
        self.run(session).await
    }

    /// Execute a statement that does not produce rows.
    ///
    /// Returns the affected row count.
    pub async fn execute_non_query(&mut self, session: &mut Session) -> Result<i32> {
        if self.statement_type.is_query() {
            return Err(self.wrong_shape("execute_non_query"));
        }
        self.run(session).await
    }

    /// Execute a statement of any shape.
    pub async fn execute(&mut self, session: &mut Session) -> Result<i32> {
        self.run(session).await
    }

    async fn run(&mut self, session: &mut Session) -> Result<i32> {
        self.check_open()?;
        let parameters = self.bound_parameters()?;
        session.ready().await?;
        self.check_generation(session)?;

        tracing::debug!(
            handle = self.handle,
            statement_type = ?self.statement_type,
            parameters = parameters.len(),
            "executing statement"
        );
        let is_call = self.statement_type == StatementType::CallStoredProcedure;
        let auto_commit = u8::from(session.auto_commit());
        let writer = session.begin_request(FunctionCode::Execute);
        writer.write_int_arg(self.handle);
        writer.write_byte_arg(ExecuteFlags::NORMAL.bits());
        writer.write_int_arg(0);
        writer.write_int_arg(0);
        if is_call {
            let modes: Vec<u8> = parameters.iter().map(|p| p.direction.mode() as u8).collect();
            writer.write_bytes_arg(&modes)?;
        } else {
            writer.write_null_arg();
        }
        writer.write_byte_arg(u8::from(self.statement_type.is_query()));
        writer.write_byte_arg(auto_commit);
        writer.write_byte_arg(1);
        writer.write_cache_time();
        if let Err(e) = write_parameters(writer, &parameters) {
            session.discard_request();
            return Err(e.into());
        }

        let mut response = session.send_request().await?;
        let total = response.code();
        let body = response.body();
        let reply = ExecuteReply::decode(total, body)?;

        self.cache_reusable = reply.cache_reusable;
        self.result_infos = reply.results;
        self.result_count = total;
        self.results_consumed = 1;
        self.cursor = None;
        self.return_value = None;
        self.out_result_sets.clear();

        if self.statement_type.is_query() {
            let _fetch_code = body.read_i32()?;
            let mut cursor = self.new_cursor(session, self.handle, total);
            cursor.fill(1, body)?;
            self.cursor = Some(cursor);
        }

        if is_call {
            self.fetch_out_parameters(session).await?;
        }

        tracing::debug!(handle = self.handle, total = total, "statement executed");
        Ok(total)
    }

    /// Execute this statement once per parameter row in one request.
    pub async fn execute_batch(
        &mut self,
        session: &mut Session,
        rows: &[Vec<Parameter>],
    ) -> Result<Vec<BatchResult>> {
        self.check_open()?;
        let expected = self.bind_count as usize;
        if let Some(row) = rows.iter().find(|row| row.len() != expected) {
            return Err(Error::UnboundParameters {
                bound: row.len(),
                expected,
            });
        }
        session.ready().await?;
        self.check_generation(session)?;

        tracing::debug!(handle = self.handle, rows = rows.len(), "executing prepared batch");
        let auto_commit = u8::from(session.auto_commit());
        let writer = session.begin_request(FunctionCode::ExecuteBatchPrepared);
        writer.write_int_arg(self.handle);
        writer.write_byte_arg(auto_commit);
        for row in rows {
            if let Err(e) = write_parameters(writer, row) {
                session.discard_request();
                return Err(e.into());
            }
        }

        let mut response = session.send_request().await?;
        let body = response.body();
        let count = body.read_i32()?;
        let results = (0..count.max(0))
            .map(|_| BatchResult::decode_prepared(self.statement_type, body))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(results)
    }

    /// Advance to the next result of a multi-result execute.
    ///
    /// Returns `false` without any I/O when no further result exists.
    pub async fn next_result(&mut self, session: &mut Session) -> Result<bool> {
        self.check_open()?;
        if self.results_consumed >= self.result_infos.len() {
            return Ok(false);
        }
        session.ready().await?;
        self.check_generation(session)?;

        tracing::debug!(handle = self.handle, "advancing to next result");
        let writer = session.begin_request(FunctionCode::NextResult);
        writer.write_int_arg(self.handle);
        writer.write_int_arg(0);

        let mut response = session.send_request().await?;
        let reply = NextResultReply::decode(response.body())?;
        self.results_consumed += 1;
        self.statement_type = reply.statement_type;
        self.updatable = reply.updatable;
        self.columns = reply.columns.into();
        self.tuple_width = self.columns.len();
        self.result_count = reply.row_count;
        self.cursor = self
            .statement_type
            .is_query()
            .then(|| self.new_cursor(session, self.handle, reply.row_count));
        Ok(true)
    }

    /// Next row of the current result.
    ///
    /// Returns `None` when the result is exhausted or is not query-shaped.
    pub async fn next_row(&mut self, session: &mut Session) -> Result<Option<Row>> {
        self.check_open()?;
        self.check_generation(session)?;
        match self.cursor.as_mut() {
            Some(cursor) => cursor.next(session).await,
            None => Ok(None),
        }
    }

    /// Collect the remaining rows of the current result.
    pub async fn fetch_all(&mut self, session: &mut Session) -> Result<Vec<Row>> {
        let mut rows = Vec::new();
        while let Some(row) = self.next_row(session).await? {
            rows.push(row);
        }
        Ok(rows)
    }

    /// Move the cursor of the current result; see [`Cursor::seek`].
    ///
    /// Returns `false` when the result is not query-shaped or the target
    /// row lies outside it.
    pub async fn move_cursor(
        &mut self,
        session: &mut Session,
        offset: i32,
        origin: CursorOrigin,
    ) -> Result<bool> {
        self.check_open()?;
        self.check_generation(session)?;
        match self.cursor.as_mut() {
            Some(cursor) => cursor.seek(session, offset, origin).await,
            None => Ok(false),
        }
    }

    /// Query plan text for this statement.
    pub async fn query_plan(&mut self, session: &mut Session) -> Result<String> {
        self.check_open()?;
        session.ready().await?;
        self.check_generation(session)?;

        let writer = session.begin_request(FunctionCode::GetQueryInfo);
        writer.write_int_arg(self.handle);
        writer.write_byte_arg(QUERY_INFO_PLAN);
        let response = session.send_request().await?;
        Ok(response.into_body().read_remaining_string())
    }

    /// Release the server-side handle.
    ///
    /// Safe to call before execute and more than once. If the connection
    /// that owned the handle is gone, nothing is sent.
    pub async fn close(&mut self, session: &mut Session) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.cursor = None;
        self.out_result_sets.clear();

        if self.generation != session.generation() || !session.is_connected() {
            return Ok(());
        }

        tracing::debug!(handle = self.handle, "closing statement");
        let auto_commit = u8::from(session.auto_commit());
        let writer = session.begin_request(FunctionCode::CloseStatement);
        writer.write_int_arg(self.handle);
        writer.write_byte_arg(auto_commit);
        session.send_request().await?;
        Ok(())
    }

    // ========================================================================
    // Stored procedures
    // ========================================================================

    /// Fetch the single `[return value, params...]` tuple of a call and copy
    /// it into the output parameters.
    async fn fetch_out_parameters(&mut self, session: &mut Session) -> Result<()> {
        let writer = session.begin_request(FunctionCode::Fetch);
        writer.write_int_arg(self.handle);
        writer.write_int_arg(1);
        writer.write_int_arg(0);
        writer.write_byte_arg(0);
        writer.write_int_arg(0);

        let mut response = session.send_request().await?;
        let body = response.body();
        if body.read_i32()? < 1 {
            tracing::warn!(handle = self.handle, "call returned no output tuple");
            return Ok(());
        }
        let row = read_tuple(body, &self.columns, self.tuple_width, true)?;

        let mut values = row.into_values().into_iter();
        self.return_value = values.next();
        for (slot, value) in self.parameters.iter_mut().zip(values) {
            if let Some(parameter) = slot.as_mut().filter(|p| p.direction.is_output()) {
                parameter.value = value;
            }
        }

        self.out_result_sets = std::iter::repeat_with(|| None)
            .take(self.parameters.len())
            .collect();
        for index in 0..self.parameters.len() {
            let handle = self
                .parameter(index)
                .filter(|p| p.direction.is_output())
                .and_then(|p| p.value.as_result_set());
            if let Some(handle) = handle {
                let nested = self.make_out_result_set(session, handle).await?;
                self.out_result_sets[index] = Some(nested);
            }
        }
        Ok(())
    }

    /// Turn a cursor-typed output value into a statement with an open cursor.
    async fn make_out_result_set(&self, session: &mut Session, handle: i32) -> Result<Statement> {
        tracing::debug!(handle = handle, "materializing output result set");
        session
            .begin_request(FunctionCode::MakeOutResultSet)
            .write_int_arg(handle);
        let mut response = session.send_request().await?;
        let reply = OutResultSetReply::decode(response.body())?;

        let columns: Arc<[ColumnMetadata]> = reply.columns.into();
        let mut nested = Statement {
            handle: reply.handle,
            sql: String::new(),
            statement_type: reply.statement_type,
            bind_count: 0,
            tuple_width: columns.len(),
            columns,
            updatable: reply.updatable,
            cache_lifetime: 0,
            cache_reusable: false,
            parameters: Vec::new(),
            result_infos: vec![ResultInfo::new(reply.statement_type, reply.row_count)],
            result_count: reply.row_count,
            results_consumed: 1,
            cursor: None,
            return_value: None,
            out_result_sets: Vec::new(),
            generation: session.generation(),
            released: session.release_queue(),
            closed: false,
        };
        nested.cursor = Some(nested.new_cursor(session, reply.handle, reply.row_count));
        Ok(nested)
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    fn new_cursor(&self, session: &Session, handle: i32, result_count: i32) -> Cursor {
        let runtime_typed = self.statement_type.has_dynamic_columns();
        Cursor::new(
            handle,
            result_count,
            Arc::clone(&self.columns),
            runtime_typed,
            session.config().fetch_size,
            self.generation,
        )
    }

    fn check_open(&self) -> Result<()> {
        if self.closed {
            Err(Error::StatementClosed)
        } else {
            Ok(())
        }
    }

    fn check_generation(&self, session: &Session) -> Result<()> {
        if self.generation != session.generation() {
            tracing::debug!(handle = self.handle, "statement belongs to a previous connection");
            return Err(Error::StatementClosed);
        }
        Ok(())
    }

    fn bound_parameters(&self) -> Result<Vec<Parameter>> {
        let bound = self.parameters.iter().filter(|slot| slot.is_some()).count();
        if bound != self.parameters.len() {
            return Err(Error::UnboundParameters {
                bound,
                expected: self.parameters.len(),
            });
        }
        Ok(self.parameters.iter().flatten().cloned().collect())
    }

    fn wrong_shape(&self, entry_point: &'static str) -> Error {
        Error::WrongStatementShape {
            statement: format!("{:?}", self.statement_type),
            entry_point,
        }
    }
}

/// Write `(type, value)` arg pairs for each parameter.
fn write_parameters(
    writer: &mut RequestWriter,
    parameters: &[Parameter],
) -> std::result::Result<(), TypeError> {
    for parameter in parameters {
        writer.write_type_arg(parameter.data_type);
        encode_value(writer, parameter.data_type, &parameter.value)?;
    }
    Ok(())
}

impl Drop for Statement {
    fn drop(&mut self) {
        if !self.closed {
            tracing::debug!(handle = self.handle, "statement dropped without close; queuing release");
            self.released.lock().push((self.generation, self.handle));
        }
    }
}

impl std::fmt::Debug for Statement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Statement")
            .field("handle", &self.handle)
            .field("sql", &self.sql)
            .field("statement_type", &self.statement_type)
            .field("bind_count", &self.bind_count)
            .field("columns", &self.columns.len())
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}
