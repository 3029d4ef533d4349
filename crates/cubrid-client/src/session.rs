//! Session: one authenticated connection to a CAS process.
//!
//! A session owns the socket and the request writer. Statements and cursors
//! borrow it mutably for every round trip, so requests on one session are
//! always serialized.
//!
//! ## Connection lifecycle
//!
//! 1. TCP connect with Nagle disabled.
//! 2. Driver info block out, port reply in. A positive port moves the
//!    connection to that port on the same host.
//! 3. Database info block out, broker info in.
//!
//! When the broker does not keep connections, ending a transaction closes the
//! socket. The session then reconnects lazily before its next request; server
//! handles from the previous connection are no longer valid.

use std::sync::Arc;
use std::time::Duration;

use cubrid_codec::{CasCodec, Connection};
use cubrid_protocol::{
    BROKER_INFO_SIZE, BatchResult, BrokerInfo, DbInfo, DbParameter, DriverInfo, EndTransaction,
    FunctionCode, PortReply, QUERY_INFO_PLAN, Request, RequestWriter, Response,
};
use parking_lot::Mutex;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::statement::Statement;
use crate::transaction::{IsolationLevel, Transaction};

/// Statement handles waiting for a `CloseStatement`, tagged with the
/// connection generation they belong to.
pub(crate) type ReleaseQueue = Arc<Mutex<Vec<(u64, i32)>>>;

/// A connection to a CUBRID broker.
///
/// # Example
///
/// ```rust,ignore
/// use cubrid_client::{Config, Session};
///
/// let config = Config::new().host("localhost").database("demodb");
/// let mut session = Session::open(config).await?;
/// let mut stmt = session.prepare("SELECT code, name FROM nation").await?;
/// stmt.execute_query(&mut session).await?;
/// while let Some(row) = stmt.next_row(&mut session).await? {
///     let code: String = row.get(0)?;
/// }
/// stmt.close(&mut session).await?;
/// session.close().await?;
/// ```
pub struct Session {
    config: Config,
    conn: Option<Connection<TcpStream>>,
    writer: RequestWriter,
    cas_port: u16,
    broker: BrokerInfo,
    auto_commit: bool,
    isolation_level: Option<IsolationLevel>,
    lock_timeout: Option<i32>,
    generation: u64,
    released: ReleaseQueue,
    rollback_pending: bool,
}

impl Session {
    /// Connect and complete the handshake.
    pub async fn open(config: Config) -> Result<Self> {
        let (conn, cas_port, broker) = establish(&config).await?;
        Ok(Self {
            auto_commit: config.auto_commit,
            config,
            conn: Some(conn),
            writer: RequestWriter::new(),
            cas_port,
            broker,
            isolation_level: None,
            lock_timeout: None,
            generation: 1,
            released: Arc::new(Mutex::new(Vec::new())),
            rollback_pending: false,
        })
    }

    /// Connect with explicit parameters and defaults for everything else.
    pub async fn connect(
        host: &str,
        port: u16,
        database: &str,
        user: &str,
        password: &str,
    ) -> Result<Self> {
        let config = Config::new()
            .host(host)
            .port(port)
            .database(database)
            .credentials(user, password);
        Self::open(config).await
    }

    /// The configuration this session was opened with.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Whether a socket is currently open.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.conn.is_some()
    }

    /// Port of the CAS currently serving this session.
    ///
    /// Differs from the configured port after a redirect.
    #[must_use]
    pub fn cas_port(&self) -> u16 {
        self.cas_port
    }

    /// Properties the broker announced during the handshake.
    #[must_use]
    pub fn broker_info(&self) -> BrokerInfo {
        self.broker
    }

    /// Current auto-commit mode.
    #[must_use]
    pub fn auto_commit(&self) -> bool {
        self.auto_commit
    }

    /// Isolation level last set on this session, if any.
    #[must_use]
    pub fn isolation_level(&self) -> Option<IsolationLevel> {
        self.isolation_level
    }

    /// Connection generation; bumped on every reconnect.
    ///
    /// Statements prepared under an older generation are expired.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Re-establish the socket if a previous operation closed it.
    ///
    /// Session parameters set earlier (isolation level, lock timeout) are
    /// sent again on the new connection. Statement handles queued for
    /// release belonged to the old connection and are discarded.
    pub async fn reconnect_if_needed(&mut self) -> Result<()> {
        if self.conn.is_some() {
            return Ok(());
        }

        tracing::debug!(
            host = %self.config.host,
            port = self.config.port,
            "reconnecting to broker"
        );
        let (conn, cas_port, broker) = establish(&self.config).await?;
        self.conn = Some(conn);
        self.cas_port = cas_port;
        self.broker = broker;
        self.generation += 1;
        self.released.lock().clear();

        if let Some(level) = self.isolation_level {
            self.send_db_parameter(DbParameter::IsolationLevel, level.id())
                .await?;
        }
        if let Some(millis) = self.lock_timeout {
            self.send_db_parameter(DbParameter::LockTimeout, millis)
                .await?;
        }
        Ok(())
    }

    /// Commit the current transaction.
    ///
    /// Without a connection there is nothing to commit and this is a no-op.
    pub async fn commit(&mut self) -> Result<()> {
        if std::mem::take(&mut self.rollback_pending) {
            self.end_transaction(EndTransaction::Rollback).await?;
        }
        self.flush_released().await;
        self.end_transaction(EndTransaction::Commit).await
    }

    /// Roll back the current transaction.
    ///
    /// The rollback request is sent without waiting for a reply.
    pub async fn rollback(&mut self) -> Result<()> {
        self.rollback_pending = false;
        self.flush_released().await;
        self.end_transaction(EndTransaction::Rollback).await
    }

    /// Switch auto-commit mode.
    ///
    /// Turning auto-commit back on commits the open transaction first.
    pub async fn set_auto_commit(&mut self, enabled: bool) -> Result<()> {
        if enabled && !self.auto_commit {
            self.commit().await?;
        }
        self.auto_commit = enabled;
        Ok(())
    }

    /// Set the transaction isolation level for this session.
    pub async fn set_isolation_level(&mut self, level: IsolationLevel) -> Result<()> {
        self.ready().await?;
        self.send_db_parameter(DbParameter::IsolationLevel, level.id())
            .await?;
        self.isolation_level = Some(level);
        Ok(())
    }

    /// Set the lock wait timeout in milliseconds.
    pub async fn set_lock_timeout(&mut self, millis: i32) -> Result<()> {
        self.ready().await?;
        self.send_db_parameter(DbParameter::LockTimeout, millis)
            .await?;
        self.lock_timeout = Some(millis);
        Ok(())
    }

    /// Begin a transaction.
    ///
    /// Auto-commit is switched off until the returned handle commits or
    /// rolls back.
    pub async fn begin_transaction(
        &mut self,
        isolation_level: Option<IsolationLevel>,
    ) -> Result<Transaction<'_>> {
        if let Some(level) = isolation_level {
            self.set_isolation_level(level).await?;
        }
        tracing::debug!(isolation_level = ?isolation_level, "beginning transaction");
        let previous = self.auto_commit;
        self.auto_commit = false;
        Ok(Transaction::new(self, previous, isolation_level))
    }

    /// Prepare a statement.
    pub async fn prepare(&mut self, sql: &str) -> Result<Statement> {
        Statement::prepare(self, sql).await
    }

    /// Prepare a stored-procedure call such as `? = CALL proc(?)`.
    pub async fn prepare_call(&mut self, sql: &str) -> Result<Statement> {
        Statement::prepare_call(self, sql).await
    }

    /// Server version string.
    pub async fn server_version(&mut self) -> Result<String> {
        self.ready().await?;
        let auto_commit = u8::from(self.auto_commit);
        self.begin_request(FunctionCode::GetDbVersion)
            .write_byte_arg(auto_commit);
        let response = self.send_request().await?;
        Ok(response.into_body().read_remaining_string())
    }

    /// Query plan for `sql`, without executing it.
    pub async fn query_plan(&mut self, sql: &str) -> Result<String> {
        self.ready().await?;
        let writer = self.begin_request(FunctionCode::GetQueryInfo);
        writer.write_int_arg(0);
        writer.write_byte_arg(QUERY_INFO_PLAN);
        writer.write_string_arg(sql)?;
        let response = self.send_request().await?;
        Ok(response.into_body().read_remaining_string())
    }

    /// Check whether the CAS is still serving this session.
    ///
    /// Never reconnects. A transport failure reports `false` and leaves the
    /// session to reconnect before its next request.
    pub async fn check_cas(&mut self) -> Result<bool> {
        self.writer.begin_request(FunctionCode::CheckCas);
        let request = self.writer.finish();
        let Some(conn) = self.conn.as_mut() else {
            return Ok(false);
        };

        let exchange = async {
            conn.send(request).await?;
            conn.receive_raw().await
        };
        match timeout(self.config.timeouts.command_timeout, exchange).await {
            Ok(Ok(frame)) => {
                if frame.is_empty() {
                    return Ok(true);
                }
                match <[u8; 4]>::try_from(frame.get(..4).unwrap_or_default()) {
                    Ok(code) => Ok(i32::from_be_bytes(code) >= 0),
                    Err(_) => Ok(false),
                }
            }
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "CAS liveness check failed");
                self.drop_connection();
                Ok(false)
            }
            Err(_) => {
                tracing::warn!("CAS liveness check timed out");
                self.drop_connection();
                Ok(false)
            }
        }
    }

    /// Execute several SQL texts in one request.
    ///
    /// Each entry reports its own outcome; one failing entry does not fail
    /// the call.
    pub async fn execute_batch<S: AsRef<str>>(
        &mut self,
        statements: &[S],
    ) -> Result<Vec<BatchResult>> {
        self.ready().await?;
        let auto_commit = u8::from(self.auto_commit);
        let writer = self.begin_request(FunctionCode::ExecuteBatch);
        writer.write_byte_arg(auto_commit);
        for sql in statements {
            writer.write_string_arg(sql.as_ref())?;
        }
        tracing::debug!(statements = statements.len(), "executing batch");

        let mut response = self.send_request().await?;
        let body = response.body();
        let count = body.read_i32()?;
        Ok(BatchResult::decode_list(body, count)?)
    }

    /// Close the session.
    ///
    /// The close request is best-effort; the socket is shut down either way.
    pub async fn close(mut self) -> Result<()> {
        tracing::info!(host = %self.config.host, port = self.cas_port, "closing session");
        if self.conn.is_some() {
            self.begin_request(FunctionCode::CloseConnection);
            if let Err(e) = self.send_request().await {
                tracing::warn!(error = %e, "close request failed");
            }
        }
        self.drop_connection();
        Ok(())
    }

    // ========================================================================
    // Request plumbing shared with statements and cursors
    // ========================================================================

    /// Settle deferred work and make sure a socket is open.
    ///
    /// Runs a rollback scheduled by a dropped transaction, reconnects if
    /// needed and releases handles of dropped statements.
    pub(crate) async fn ready(&mut self) -> Result<()> {
        if std::mem::take(&mut self.rollback_pending) {
            self.end_transaction(EndTransaction::Rollback).await?;
        }
        self.reconnect_if_needed().await?;
        self.flush_released().await;
        Ok(())
    }

    /// Reset the writer and start a request.
    pub(crate) fn begin_request(&mut self, code: FunctionCode) -> &mut RequestWriter {
        self.writer.begin_request(code);
        &mut self.writer
    }

    /// Drop a partially written request.
    pub(crate) fn discard_request(&mut self) {
        self.writer.reset();
    }

    /// Finish the request in the writer and wait for its response.
    pub(crate) async fn send_request(&mut self) -> Result<Response> {
        let request = self.writer.finish();
        self.exchange(request).await
    }

    pub(crate) fn release_queue(&self) -> ReleaseQueue {
        Arc::clone(&self.released)
    }

    pub(crate) fn schedule_rollback(&mut self) {
        self.rollback_pending = true;
    }

    pub(crate) fn restore_auto_commit(&mut self, auto_commit: bool) {
        self.auto_commit = auto_commit;
    }

    async fn exchange(&mut self, request: Request) -> Result<Response> {
        let command_timeout = self.config.timeouts.command_timeout;
        let conn = self.conn.as_mut().ok_or(Error::ConnectionClosed)?;
        let code = request.code();

        let result = match timeout(command_timeout, conn.round_trip(request)).await {
            Ok(result) => result.map_err(Error::from),
            Err(_) => Err(Error::CommandTimeout),
        };
        if let Err(e) = &result {
            if e.breaks_connection() {
                tracing::debug!(code = ?code, error = %e, "connection lost; will reconnect");
                self.drop_connection();
            }
        }
        result
    }

    async fn send_only(&mut self) -> Result<()> {
        let request = self.writer.finish();
        let command_timeout = self.config.timeouts.command_timeout;
        let conn = self.conn.as_mut().ok_or(Error::ConnectionClosed)?;

        let result = match timeout(command_timeout, conn.send(request)).await {
            Ok(result) => result.map_err(Error::from),
            Err(_) => Err(Error::CommandTimeout),
        };
        if result.is_err() {
            self.drop_connection();
        }
        result
    }

    async fn send_db_parameter(&mut self, parameter: DbParameter, value: i32) -> Result<()> {
        tracing::debug!(parameter = ?parameter, value = value, "setting session parameter");
        let writer = self.begin_request(FunctionCode::SetDbParameter);
        writer.write_int_arg(parameter as i32);
        writer.write_int_arg(value);
        self.send_request().await?;
        Ok(())
    }

    async fn end_transaction(&mut self, kind: EndTransaction) -> Result<()> {
        if self.conn.is_none() {
            return Ok(());
        }

        tracing::debug!(kind = ?kind, "ending transaction");
        self.begin_request(FunctionCode::EndTransaction)
            .write_byte_arg(kind as u8);
        match kind {
            EndTransaction::Commit => {
                self.send_request().await?;
            }
            EndTransaction::Rollback => self.send_only().await?,
        }

        if !self.broker.keep_connection {
            tracing::debug!("broker does not keep connections; closing socket");
            self.drop_connection();
            self.auto_commit = true;
        }
        Ok(())
    }

    async fn flush_released(&mut self) {
        let pending = std::mem::take(&mut *self.released.lock());
        let auto_commit = u8::from(self.auto_commit);
        for (generation, handle) in pending {
            if generation != self.generation || self.conn.is_none() {
                continue;
            }
            let writer = self.begin_request(FunctionCode::CloseStatement);
            writer.write_int_arg(handle);
            writer.write_byte_arg(auto_commit);
            if let Err(e) = self.send_request().await {
                tracing::warn!(handle = handle, error = %e, "failed to release statement handle");
            }
        }
    }

    fn drop_connection(&mut self) {
        if let Some(conn) = self.conn.take() {
            abort(conn.into_inner());
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.drop_connection();
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("host", &self.config.host)
            .field("cas_port", &self.cas_port)
            .field("database", &self.config.database)
            .field("connected", &self.conn.is_some())
            .field("auto_commit", &self.auto_commit)
            .field("generation", &self.generation)
            .finish_non_exhaustive()
    }
}

/// Shut a socket down without waiting for the FIN handshake.
fn abort(stream: TcpStream) {
    #[allow(deprecated)]
    if let Err(e) = stream.set_linger(Some(Duration::ZERO)) {
        tracing::warn!(error = %e, "failed to disable linger");
    }
    drop(stream);
}

async fn open_socket(host: &str, port: u16) -> Result<TcpStream> {
    tracing::debug!("establishing TCP connection to {}:{}", host, port);
    let stream = TcpStream::connect((host, port))
        .await
        .map_err(|e| Error::Connection(format!("{host}:{port}: {e}")))?;
    stream.set_nodelay(true)?;
    Ok(stream)
}

async fn establish(config: &Config) -> Result<(Connection<TcpStream>, u16, BrokerInfo)> {
    let (stream, port, broker) = timeout(config.timeouts.connect_timeout, handshake(config))
        .await
        .map_err(|_| Error::ConnectionTimeout)??;
    let codec = CasCodec::new().with_max_frame_size(config.max_frame_size);
    Ok((Connection::with_codec(stream, codec), port, broker))
}

async fn handshake(config: &Config) -> Result<(TcpStream, u16, BrokerInfo)> {
    tracing::info!(
        host = %config.host,
        port = config.port,
        database = %config.database,
        "connecting to CUBRID broker"
    );

    let mut port = config.port;
    let mut stream = open_socket(&config.host, port).await?;
    stream.write_all(&DriverInfo::default().encode()).await?;
    stream.flush().await?;

    match PortReply::from_i32(stream.read_i32().await?)? {
        PortReply::Stay => {}
        PortReply::Rejected(code) => {
            abort(stream);
            return Err(Error::Rejected { code });
        }
        PortReply::Redirect(new_port) => {
            abort(stream);
            if !config.redirect.follow_redirects {
                return Err(Error::Connection(format!(
                    "broker redirected to port {new_port} and redirects are disabled"
                )));
            }
            tracing::info!(host = %config.host, port = new_port, "following broker redirect");
            port = new_port;
            stream = open_socket(&config.host, port).await?;
        }
    }

    let db_info = DbInfo::new(&config.database, &config.user, &config.password).encode()?;
    stream.write_all(&db_info).await?;
    stream.flush().await?;

    let mut block = [0u8; BROKER_INFO_SIZE];
    stream.read_exact(&mut block).await?;
    let broker = BrokerInfo::decode(block);
    tracing::debug!(
        keep_connection = broker.keep_connection,
        statement_pooling = broker.statement_pooling,
        "handshake complete"
    );
    Ok((stream, port, broker))
}
