//! Mock CUBRID broker for unit testing.
//!
//! This module provides an in-process broker/CAS pair that speaks the CAS
//! wire format, so the client can be tested without a database.
//!
//! ## Features
//!
//! - Driver info / port reply / database info / broker info handshake
//! - Optional redirect to a second listener acting as the CAS
//! - Canned responses per SQL text: rows, affected counts, stored-procedure
//!   output tuples, multi-result batches and server errors
//! - Every request is recorded for later inspection
//!
//! ## Example
//!
//! ```rust,ignore
//! use cubrid_testing::mock_broker::{MockBroker, MockResponse};
//!
//! #[tokio::test]
//! async fn test_query() {
//!     let broker = MockBroker::builder()
//!         .with_response("DELETE FROM t", MockResponse::affected(3))
//!         .build()
//!         .await
//!         .unwrap();
//!
//!     let port = broker.port();
//!     // Connect your client to 127.0.0.1:port...
//! }
//! ```

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use cubrid_protocol::{
    BatchResult, BrokerInfo, ColumnMetadata, ColumnType, DB_INFO_SIZE, DRIVER_INFO_SIZE,
    DataType, DbInfo, DriverInfo, EndTransaction, ExecuteReply, FunctionCode, NextResultReply,
    OutResultSetReply, PortReply, PrepareFlags, PrepareReply, RequestWriter, ResponseReader,
    ResultInfo, StatementType,
};
use cubrid_types::{SqlValue, decode_value, encode_value};
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Mutex, broadcast};

/// Index of the first bound parameter arg in an execute request.
const EXECUTE_PARAMS_START: usize = 9;

/// Error type for mock broker operations.
#[derive(Debug, Error)]
pub enum MockServerError {
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Protocol error.
    #[error("Protocol error: {0}")]
    Protocol(String),
}

/// Result type for mock broker operations.
pub type Result<T> = std::result::Result<T, MockServerError>;

fn protocol_error(e: impl std::fmt::Display) -> MockServerError {
    MockServerError::Protocol(e.to_string())
}

/// Canned response for one SQL text.
#[derive(Debug, Clone)]
pub enum MockResponse {
    /// A row-producing result.
    Rows {
        /// Statement type reported at prepare.
        statement_type: StatementType,
        /// Result columns.
        columns: Vec<ColumnMetadata>,
        /// Row values in column order.
        rows: Vec<Vec<SqlValue>>,
    },

    /// A statement that reports an affected-row count.
    Affected {
        /// Statement type reported at prepare.
        statement_type: StatementType,
        /// Affected rows.
        count: i32,
    },

    /// A stored-procedure call.
    Call {
        /// Return value slot.
        return_value: SqlValue,
        /// One value per placeholder, in declaration order.
        outputs: Vec<SqlValue>,
    },

    /// Several results from one execute, consumed with next-result.
    Results(Vec<MockResponse>),

    /// Prepare succeeds, execute fails with a server error.
    Error {
        /// Negative error code.
        code: i32,
        /// Error message.
        message: String,
    },

    /// Prepare fails with a server error.
    PrepareError {
        /// Negative error code.
        code: i32,
        /// Error message.
        message: String,
    },
}

impl MockResponse {
    /// A `SELECT` result.
    pub fn rows(columns: Vec<ColumnMetadata>, rows: Vec<Vec<SqlValue>>) -> Self {
        Self::Rows {
            statement_type: StatementType::Select,
            columns,
            rows,
        }
    }

    /// An `UPDATE`-style affected count.
    pub fn affected(count: i32) -> Self {
        Self::Affected {
            statement_type: StatementType::Update,
            count,
        }
    }

    /// A stored-procedure call result.
    pub fn call(return_value: impl Into<SqlValue>, outputs: Vec<SqlValue>) -> Self {
        Self::Call {
            return_value: return_value.into(),
            outputs,
        }
    }

    /// A multi-result response.
    pub fn results(results: Vec<MockResponse>) -> Self {
        Self::Results(results)
    }

    /// An execute-time server error.
    pub fn error(code: i32, message: impl Into<String>) -> Self {
        Self::Error {
            code,
            message: message.into(),
        }
    }

    /// A prepare-time server error.
    pub fn prepare_error(code: i32, message: impl Into<String>) -> Self {
        Self::PrepareError {
            code,
            message: message.into(),
        }
    }

    /// Override the reported statement type of a rows or affected response.
    #[must_use]
    pub fn with_statement_type(mut self, ty: StatementType) -> Self {
        match &mut self {
            Self::Rows { statement_type, .. } | Self::Affected { statement_type, .. } => {
                *statement_type = ty;
            }
            _ => {}
        }
        self
    }

    fn statement_type(&self) -> StatementType {
        match self {
            Self::Rows { statement_type, .. } | Self::Affected { statement_type, .. } => {
                *statement_type
            }
            Self::Call { .. } => StatementType::CallStoredProcedure,
            Self::Results(results) => results
                .first()
                .map_or(StatementType::Unknown, Self::statement_type),
            Self::Error { .. } | Self::PrepareError { .. } => StatementType::Update,
        }
    }

    fn columns(&self) -> Vec<ColumnMetadata> {
        match self {
            Self::Rows { columns, .. } => columns.clone(),
            Self::Results(results) => results.first().map(Self::columns).unwrap_or_default(),
            _ => Vec::new(),
        }
    }

    fn count(&self) -> i32 {
        match self {
            Self::Rows { rows, .. } => rows.len() as i32,
            Self::Affected { count, .. } => *count,
            Self::Call { .. } => 1,
            Self::Results(results) => results.first().map_or(0, Self::count),
            Self::Error { .. } | Self::PrepareError { .. } => 0,
        }
    }

    fn result_list(&self) -> Vec<MockResponse> {
        match self {
            Self::Results(results) => results.clone(),
            other => vec![other.clone()],
        }
    }
}

/// One request received by the mock, split into its args.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    /// Function code.
    pub code: FunctionCode,
    /// Arg bodies without their size prefixes; NULL args are empty.
    pub args: Vec<Bytes>,
}

impl RecordedRequest {
    /// Arg `index` as a 32-bit integer.
    pub fn int_arg(&self, index: usize) -> Option<i32> {
        let arg = self.args.get(index)?;
        <[u8; 4]>::try_from(arg.as_ref()).ok().map(i32::from_be_bytes)
    }

    /// Arg `index` as a single byte.
    pub fn byte_arg(&self, index: usize) -> Option<u8> {
        match self.args.get(index)?.as_ref() {
            [byte] => Some(*byte),
            _ => None,
        }
    }

    /// Arg `index` as a NUL-terminated string.
    pub fn string_arg(&self, index: usize) -> Option<String> {
        let arg = self.args.get(index)?;
        let mut reader = ResponseReader::new(arg.clone());
        reader.read_string(arg.len() as i32).ok().flatten()
    }

    /// Decode `(type, value)` arg pairs starting at `start`.
    pub fn parameters_from(&self, start: usize) -> Result<Vec<SqlValue>> {
        let pairs = self.args.get(start..).unwrap_or_default();
        pairs
            .chunks_exact(2)
            .map(|pair| {
                let ty = match pair[0].as_ref() {
                    [byte] => ColumnType::from_raw(*byte).data_type,
                    _ => DataType::Null,
                };
                let mut reader = ResponseReader::new(pair[1].clone());
                decode_value(&mut reader, ty, pair[1].len() as i32).map_err(protocol_error)
            })
            .collect()
    }
}

/// Configuration for the mock broker.
#[derive(Debug, Clone)]
pub struct MockBrokerConfig {
    responses: HashMap<String, MockResponse>,
    default_response: MockResponse,
    out_result_sets: HashMap<i32, MockResponse>,
    broker_info: BrokerInfo,
    redirect: bool,
    reject: Option<i32>,
    commit_error: Option<(i32, String)>,
    version: String,
    query_plan: String,
    fetch_batch: usize,
}

impl Default for MockBrokerConfig {
    fn default() -> Self {
        Self {
            responses: HashMap::new(),
            default_response: MockResponse::affected(0),
            out_result_sets: HashMap::new(),
            broker_info: BrokerInfo {
                dbms_type: 1,
                keep_connection: true,
                statement_pooling: true,
                reserved: 0,
            },
            redirect: false,
            reject: None,
            commit_error: None,
            version: "11.2.0.0001".to_string(),
            query_plan: "Join graph segments (f indicates final):".to_string(),
            fetch_batch: 100,
        }
    }
}

/// Builder for [`MockBroker`].
#[derive(Debug, Default)]
pub struct MockBrokerBuilder {
    config: MockBrokerConfig,
}

impl MockBrokerBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a response for a specific SQL text.
    pub fn with_response(mut self, sql: impl Into<String>, response: MockResponse) -> Self {
        self.config.responses.insert(sql.into(), response);
        self
    }

    /// Set the response for SQL texts without a specific one.
    pub fn with_default_response(mut self, response: MockResponse) -> Self {
        self.config.default_response = response;
        self
    }

    /// Register the rows behind a cursor-typed output value.
    pub fn with_out_result_set(mut self, handle: i32, response: MockResponse) -> Self {
        self.config.out_result_sets.insert(handle, response);
        self
    }

    /// Whether the broker keeps the socket open across transactions.
    pub fn keep_connection(mut self, keep: bool) -> Self {
        self.config.broker_info.keep_connection = keep;
        self
    }

    /// Redirect every connection to a second listener.
    pub fn with_redirect(mut self) -> Self {
        self.config.redirect = true;
        self
    }

    /// Reject every connection with a negative code.
    pub fn reject_with(mut self, code: i32) -> Self {
        self.config.reject = Some(code);
        self
    }

    /// Answer every commit with a server error.
    pub fn fail_commit_with(mut self, code: i32, message: impl Into<String>) -> Self {
        self.config.commit_error = Some((code, message.into()));
        self
    }

    /// Set the version string returned by the server.
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.config.version = version.into();
        self
    }

    /// Set the plan text returned by query-info requests.
    pub fn with_query_plan(mut self, plan: impl Into<String>) -> Self {
        self.config.query_plan = plan.into();
        self
    }

    /// Rows sent inline with execute and per fetch when the client does not
    /// ask for a size.
    pub fn with_fetch_batch(mut self, rows: usize) -> Self {
        self.config.fetch_batch = rows.max(1);
        self
    }

    /// Build and start the mock broker.
    pub async fn build(self) -> Result<MockBroker> {
        MockBroker::start(self.config).await
    }
}

#[derive(Debug, Default)]
struct MockState {
    broker_connections: Mutex<usize>,
    cas_connections: Mutex<usize>,
    requests: Mutex<Vec<RecordedRequest>>,
    logins: Mutex<Vec<DbInfo>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
    Broker,
    Cas,
}

/// A mock broker for testing.
///
/// The broker listens on an ephemeral port of 127.0.0.1. With a redirect
/// configured, a second listener plays the CAS the broker hands clients to.
pub struct MockBroker {
    addr: SocketAddr,
    cas_addr: Option<SocketAddr>,
    shutdown_tx: broadcast::Sender<()>,
    state: Arc<MockState>,
}

impl MockBroker {
    /// Create a new builder for the mock broker.
    pub fn builder() -> MockBrokerBuilder {
        MockBrokerBuilder::new()
    }

    /// Start the mock broker on an available port.
    pub async fn start(config: MockBrokerConfig) -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let (shutdown_tx, _) = broadcast::channel(1);
        let state = Arc::new(MockState::default());
        let config = Arc::new(config);

        let cas_addr = if config.redirect {
            let cas_listener = TcpListener::bind("127.0.0.1:0").await?;
            let cas_addr = cas_listener.local_addr()?;
            tokio::spawn(accept_loop(
                cas_listener,
                Role::Cas,
                None,
                Arc::clone(&config),
                Arc::clone(&state),
                shutdown_tx.subscribe(),
            ));
            Some(cas_addr)
        } else {
            None
        };

        tokio::spawn(accept_loop(
            listener,
            Role::Broker,
            cas_addr.map(|a| a.port()),
            config,
            Arc::clone(&state),
            shutdown_tx.subscribe(),
        ));

        Ok(Self {
            addr,
            cas_addr,
            shutdown_tx,
            state,
        })
    }

    /// Get the broker's listening address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Get the host string for connection configuration.
    pub fn host(&self) -> String {
        self.addr.ip().to_string()
    }

    /// Get the broker port.
    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Port clients are redirected to, if redirect is enabled.
    pub fn cas_port(&self) -> Option<u16> {
        self.cas_addr.map(|a| a.port())
    }

    /// Connections accepted on the broker port so far.
    pub async fn broker_connections(&self) -> usize {
        *self.state.broker_connections.lock().await
    }

    /// Connections accepted on the redirect port so far.
    pub async fn cas_connections(&self) -> usize {
        *self.state.cas_connections.lock().await
    }

    /// Every request received so far, in order.
    pub async fn requests(&self) -> Vec<RecordedRequest> {
        self.state.requests.lock().await.clone()
    }

    /// Requests with the given function code.
    pub async fn requests_with(&self, code: FunctionCode) -> Vec<RecordedRequest> {
        self.state
            .requests
            .lock()
            .await
            .iter()
            .filter(|r| r.code == code)
            .cloned()
            .collect()
    }

    /// Database info blocks received, one per completed handshake.
    pub async fn logins(&self) -> Vec<DbInfo> {
        self.state.logins.lock().await.clone()
    }

    /// Decoded parameters of every execute request.
    pub async fn bound_parameters(&self) -> Result<Vec<Vec<SqlValue>>> {
        self.requests_with(FunctionCode::Execute)
            .await
            .iter()
            .map(|r| r.parameters_from(EXECUTE_PARAMS_START))
            .collect()
    }

    /// Stop the broker.
    pub fn stop(&self) {
        let _ = self.shutdown_tx.send(());
    }
}

impl Drop for MockBroker {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn accept_loop(
    listener: TcpListener,
    role: Role,
    redirect_port: Option<u16>,
    config: Arc<MockBrokerConfig>,
    state: Arc<MockState>,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, _peer_addr)) => {
                        {
                            let counter = match role {
                                Role::Broker => &state.broker_connections,
                                Role::Cas => &state.cas_connections,
                            };
                            *counter.lock().await += 1;
                        }
                        let config = Arc::clone(&config);
                        let state = Arc::clone(&state);
                        tokio::spawn(async move {
                            if let Err(e) =
                                handle_connection(stream, role, redirect_port, config, state).await
                            {
                                tracing::debug!("Connection error: {}", e);
                            }
                        });
                    }
                    Err(e) => {
                        tracing::error!("Accept error: {}", e);
                        break;
                    }
                }
            }
            _ = shutdown_rx.recv() => {
                break;
            }
        }
    }
}

/// Handle a single client connection.
async fn handle_connection(
    mut stream: TcpStream,
    role: Role,
    redirect_port: Option<u16>,
    config: Arc<MockBrokerConfig>,
    state: Arc<MockState>,
) -> Result<()> {
    // Step 1: driver info and port reply. A redirected client goes straight
    // to the database info block on the CAS port.
    if role == Role::Broker {
        let mut block = [0u8; DRIVER_INFO_SIZE];
        stream.read_exact(&mut block).await?;
        DriverInfo::decode(&block).map_err(protocol_error)?;

        let reply = match (config.reject, redirect_port) {
            (Some(code), _) => PortReply::Rejected(code),
            (None, Some(port)) => PortReply::Redirect(port),
            (None, None) => PortReply::Stay,
        };
        stream.write_i32(reply.to_i32()).await?;
        stream.flush().await?;
        if reply != PortReply::Stay {
            return Ok(());
        }
    }

    // Step 2: database info and broker info.
    let mut block = [0u8; DB_INFO_SIZE];
    stream.read_exact(&mut block).await?;
    let login = DbInfo::decode(&block).map_err(protocol_error)?;
    state.logins.lock().await.push(login);
    stream.write_all(&config.broker_info.encode()).await?;
    stream.flush().await?;

    // Step 3: requests until the client goes away.
    let mut cas = MockCas::new(&config);
    loop {
        let request = match read_request(&mut stream).await {
            Ok(r) => r,
            Err(MockServerError::Io(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break;
            }
            Err(e) => return Err(e),
        };
        state.requests.lock().await.push(request.clone());

        match cas.handle(&request)? {
            Reply::Frame(frame) => {
                stream.write_all(&frame).await?;
                stream.flush().await?;
            }
            Reply::Silent => {}
            Reply::Close(frame) => {
                stream.write_all(&frame).await?;
                stream.flush().await?;
                break;
            }
        }
    }

    Ok(())
}

/// Read one length-prefixed request and split its args.
async fn read_request(stream: &mut TcpStream) -> Result<RecordedRequest> {
    let len = stream.read_i32().await?;
    if len < 1 {
        return Err(MockServerError::Protocol(format!(
            "invalid request length {len}"
        )));
    }
    let mut payload = vec![0u8; len as usize];
    stream.read_exact(&mut payload).await?;

    let mut payload = Bytes::from(payload);
    let code = FunctionCode::from_u8(payload.get_u8()).map_err(protocol_error)?;
    let mut args = Vec::new();
    while payload.remaining() >= 4 {
        let size = payload.get_i32().max(0) as usize;
        if size > payload.remaining() {
            return Err(MockServerError::Protocol(format!(
                "arg of {size} bytes overruns request"
            )));
        }
        args.push(payload.split_to(size));
    }
    Ok(RecordedRequest { code, args })
}

enum Reply {
    Frame(Bytes),
    Silent,
    Close(Bytes),
}

fn encode_frame(code: i32, body: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(8 + body.len());
    buf.put_i32(4 + body.len() as i32);
    buf.put_i32(code);
    buf.put_slice(body);
    buf.freeze()
}

fn frame(code: i32, body: &[u8]) -> Reply {
    Reply::Frame(encode_frame(code, body))
}

fn ok(body: &[u8]) -> Reply {
    frame(0, body)
}

fn error_frame(code: i32, message: &str) -> Reply {
    let mut body = BytesMut::new();
    body.put_slice(message.as_bytes());
    body.put_u8(0);
    frame(code, &body)
}

fn text_frame(text: &str) -> Reply {
    let mut body = BytesMut::new();
    body.put_slice(text.as_bytes());
    body.put_u8(0);
    ok(&body)
}

struct ServerStatement {
    statement_type: StatementType,
    bind_count: usize,
    response: MockResponse,
    current: usize,
}

/// Per-connection CAS state.
struct MockCas<'a> {
    config: &'a MockBrokerConfig,
    statements: HashMap<i32, ServerStatement>,
    next_handle: i32,
}

impl<'a> MockCas<'a> {
    fn new(config: &'a MockBrokerConfig) -> Self {
        Self {
            config,
            statements: HashMap::new(),
            next_handle: 1,
        }
    }

    fn response_for(&self, sql: &str) -> MockResponse {
        self.config
            .responses
            .get(sql)
            .cloned()
            .unwrap_or_else(|| self.config.default_response.clone())
    }

    fn register(&mut self, statement: ServerStatement) -> i32 {
        let handle = self.next_handle;
        self.next_handle += 1;
        self.statements.insert(handle, statement);
        handle
    }

    fn handle(&mut self, request: &RecordedRequest) -> Result<Reply> {
        let reply = match request.code {
            FunctionCode::Prepare => self.prepare(request),
            FunctionCode::Execute => self.execute(request)?,
            FunctionCode::Fetch => self.fetch(request)?,
            FunctionCode::Cursor => self.move_cursor(request),
            FunctionCode::NextResult => self.next_result(request),
            FunctionCode::CloseStatement => {
                if let Some(handle) = request.int_arg(0) {
                    self.statements.remove(&handle);
                }
                ok(&[])
            }
            FunctionCode::EndTransaction => {
                if request.byte_arg(0) == Some(EndTransaction::Rollback as u8) {
                    Reply::Silent
                } else if let Some((code, message)) = &self.config.commit_error {
                    error_frame(*code, message)
                } else {
                    ok(&[])
                }
            }
            FunctionCode::SetDbParameter => ok(&[]),
            FunctionCode::GetDbVersion => text_frame(&self.config.version),
            FunctionCode::GetQueryInfo => text_frame(&self.config.query_plan),
            FunctionCode::CheckCas => Reply::Frame(Bytes::from_static(&[0, 0, 0, 0])),
            FunctionCode::ExecuteBatch => self.execute_batch(request),
            FunctionCode::ExecuteBatchPrepared => self.execute_batch_prepared(request),
            FunctionCode::MakeOutResultSet => self.make_out_result_set(request),
            FunctionCode::CloseConnection => Reply::Close(encode_frame(0, &[])),
            other => error_frame(-1, &format!("unsupported function {other:?}")),
        };
        Ok(reply)
    }

    fn prepare(&mut self, request: &RecordedRequest) -> Reply {
        let sql = request.string_arg(0).unwrap_or_default();
        let flags = PrepareFlags::from_bits_truncate(request.byte_arg(1).unwrap_or(0));
        let response = self.response_for(&sql);
        if let MockResponse::PrepareError { code, message } = &response {
            return error_frame(*code, message);
        }

        let statement_type = if flags.contains(PrepareFlags::CALL) {
            StatementType::CallStoredProcedure
        } else {
            response.statement_type()
        };
        let bind_count = sql.matches('?').count();
        let reply = PrepareReply {
            handle: 0,
            cache_lifetime: -1,
            statement_type,
            bind_count: bind_count as i32,
            updatable: false,
            columns: response.columns(),
        };
        let handle = self.register(ServerStatement {
            statement_type,
            bind_count,
            response,
            current: 0,
        });

        let mut body = BytesMut::new();
        reply.encode(&mut body);
        frame(handle, &body)
    }

    fn execute(&mut self, request: &RecordedRequest) -> Result<Reply> {
        let handle = request.int_arg(0).unwrap_or(-1);
        let batch = self.config.fetch_batch;
        let Some(statement) = self.statements.get_mut(&handle) else {
            return Ok(error_frame(-1, "invalid statement handle"));
        };
        if let MockResponse::Error { code, message } = &statement.response {
            return Ok(error_frame(*code, message));
        }

        statement.current = 0;
        let results = statement.response.result_list();
        let first = results.first().cloned().unwrap_or(MockResponse::affected(0));
        let total = first.count();
        let reply = ExecuteReply {
            total,
            cache_reusable: false,
            results: results
                .iter()
                .map(|r| ResultInfo::new(r.statement_type(), r.count()))
                .collect(),
        };

        let mut body = BytesMut::new();
        reply.encode(&mut body);
        if statement.statement_type.is_query() {
            let runtime_typed = statement.statement_type.has_dynamic_columns();
            body.put_i32(0);
            put_rows(&mut body, &first, 1, batch, runtime_typed)?;
        }
        Ok(frame(total, &body))
    }

    fn fetch(&mut self, request: &RecordedRequest) -> Result<Reply> {
        let handle = request.int_arg(0).unwrap_or(-1);
        let start = request.int_arg(1).unwrap_or(1).max(1) as usize;
        let size = match request.int_arg(2).unwrap_or(0) {
            n if n > 0 => n as usize,
            _ => self.config.fetch_batch,
        };
        let Some(statement) = self.statements.get(&handle) else {
            return Ok(error_frame(-1, "invalid statement handle"));
        };

        let mut body = BytesMut::new();
        if let MockResponse::Call {
            return_value,
            outputs,
        } = &statement.response
        {
            let mut values = vec![return_value.clone()];
            values.extend(outputs.iter().cloned());
            values.resize(statement.bind_count + 1, SqlValue::Null);
            body.put_i32(1);
            put_tuple(&mut body, 1, &[], &values, true)?;
            return Ok(ok(&body));
        }

        let results = statement.response.result_list();
        let Some(result) = results.get(statement.current) else {
            return Ok(error_frame(-1, "no open result"));
        };
        let runtime_typed = statement.statement_type.has_dynamic_columns();
        put_rows(&mut body, result, start, size, runtime_typed)?;
        Ok(ok(&body))
    }

    fn move_cursor(&self, request: &RecordedRequest) -> Reply {
        let handle = request.int_arg(0).unwrap_or(-1);
        let Some(statement) = self.statements.get(&handle) else {
            return error_frame(-1, "invalid statement handle");
        };
        let results = statement.response.result_list();
        let Some(result) = results.get(statement.current) else {
            return error_frame(-1, "no open result");
        };

        let mut body = BytesMut::new();
        body.put_i32(result.count());
        ok(&body)
    }

    fn next_result(&mut self, request: &RecordedRequest) -> Reply {
        let handle = request.int_arg(0).unwrap_or(-1);
        let Some(statement) = self.statements.get_mut(&handle) else {
            return error_frame(-1, "invalid statement handle");
        };
        let results = statement.response.result_list();
        let Some(result) = results.get(statement.current + 1) else {
            return error_frame(-1, "no more results");
        };
        statement.current += 1;
        statement.statement_type = result.statement_type();

        let reply = NextResultReply {
            row_count: result.count(),
            statement_type: result.statement_type(),
            updatable: false,
            columns: result.columns(),
        };
        let mut body = BytesMut::new();
        reply.encode(&mut body);
        ok(&body)
    }

    fn execute_batch(&mut self, request: &RecordedRequest) -> Reply {
        let entries: Vec<BatchResult> = (1..request.args.len())
            .map(|i| {
                let sql = request.string_arg(i).unwrap_or_default();
                match self.response_for(&sql) {
                    MockResponse::Error { code, message }
                    | MockResponse::PrepareError { code, message } => BatchResult {
                        statement_type: StatementType::Unknown,
                        result: code,
                        error_message: Some(message),
                    },
                    response => BatchResult {
                        statement_type: response.statement_type(),
                        result: response.count(),
                        error_message: None,
                    },
                }
            })
            .collect();

        let mut body = BytesMut::new();
        body.put_i32(entries.len() as i32);
        for entry in &entries {
            entry.encode(&mut body);
        }
        ok(&body)
    }

    fn execute_batch_prepared(&mut self, request: &RecordedRequest) -> Reply {
        let handle = request.int_arg(0).unwrap_or(-1);
        let Some(statement) = self.statements.get(&handle) else {
            return error_frame(-1, "invalid statement handle");
        };
        let values = request.args.len().saturating_sub(2) / 2;
        let rows = values.checked_div(statement.bind_count).unwrap_or(0);

        let mut body = BytesMut::new();
        body.put_i32(rows as i32);
        for _ in 0..rows {
            BatchResult {
                statement_type: statement.statement_type,
                result: 1,
                error_message: None,
            }
            .encode_prepared(&mut body);
        }
        ok(&body)
    }

    fn make_out_result_set(&mut self, request: &RecordedRequest) -> Reply {
        let source = request.int_arg(0).unwrap_or(-1);
        let Some(response) = self.config.out_result_sets.get(&source).cloned() else {
            return error_frame(-1, "unknown result set handle");
        };

        let statement_type = response.statement_type();
        let row_count = response.count();
        let columns = response.columns();
        let handle = self.register(ServerStatement {
            statement_type,
            bind_count: 0,
            response,
            current: 0,
        });

        let reply = OutResultSetReply {
            handle,
            statement_type,
            row_count,
            updatable: false,
            columns,
        };
        let mut body = BytesMut::new();
        reply.encode(&mut body);
        ok(&body)
    }
}

/// Write a tuple batch of up to `limit` rows starting at row `start`
/// (1-based).
fn put_rows(
    dst: &mut BytesMut,
    result: &MockResponse,
    start: usize,
    limit: usize,
    runtime_typed: bool,
) -> Result<()> {
    let (columns, rows) = match result {
        MockResponse::Rows { columns, rows, .. } => (columns.as_slice(), rows.as_slice()),
        _ => (&[][..], &[][..]),
    };
    let batch: Vec<_> = rows.iter().skip(start - 1).take(limit).collect();
    dst.put_i32(batch.len() as i32);
    for (offset, row) in batch.into_iter().enumerate() {
        put_tuple(dst, (start + offset) as i32, columns, row, runtime_typed)?;
    }
    Ok(())
}

fn put_tuple(
    dst: &mut BytesMut,
    index: i32,
    columns: &[ColumnMetadata],
    values: &[SqlValue],
    runtime_typed: bool,
) -> Result<()> {
    dst.put_i32(index);
    dst.put_slice(&[0; 8]);
    for (i, value) in values.iter().enumerate() {
        let declared = columns.get(i).map_or(DataType::Null, ColumnMetadata::data_type);
        put_value(dst, declared, value, runtime_typed || declared == DataType::Null)?;
    }
    Ok(())
}

/// Write a size-prefixed value, with a type byte when the column is
/// runtime-typed.
fn put_value(
    dst: &mut BytesMut,
    declared: DataType,
    value: &SqlValue,
    runtime_typed: bool,
) -> Result<()> {
    let ty = if runtime_typed {
        value.data_type()
    } else {
        declared
    };

    let mut writer = RequestWriter::new();
    writer.begin_request(FunctionCode::Fetch);
    encode_value(&mut writer, ty, value).map_err(protocol_error)?;
    let arg = writer.finish().to_bytes().slice(5..);

    if runtime_typed && !value.is_null() {
        let size = i32::from_be_bytes([arg[0], arg[1], arg[2], arg[3]]);
        dst.put_i32(size + 1);
        dst.put_u8(ty as u8);
        dst.put_slice(&arg[4..]);
    } else {
        dst.put_slice(&arg);
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use cubrid_protocol::Oid;
    use cubrid_types::read_value;

    fn request(code: FunctionCode, write: impl FnOnce(&mut RequestWriter)) -> RecordedRequest {
        let mut writer = RequestWriter::new();
        writer.begin_request(code);
        write(&mut writer);
        let mut payload = writer.finish().to_bytes().slice(5..);
        let mut args = Vec::new();
        while payload.remaining() >= 4 {
            let size = payload.get_i32().max(0) as usize;
            args.push(payload.split_to(size));
        }
        RecordedRequest { code, args }
    }

    #[test]
    fn test_recorded_request_args() {
        let r = request(FunctionCode::Prepare, |w| {
            w.write_string_arg("SELECT 1").unwrap();
            w.write_byte_arg(0x40);
            w.write_null_arg();
            w.write_int_arg(-7);
        });
        assert_eq!(r.string_arg(0).as_deref(), Some("SELECT 1"));
        assert_eq!(r.byte_arg(1), Some(0x40));
        assert!(r.args[2].is_empty());
        assert_eq!(r.int_arg(3), Some(-7));
        assert_eq!(r.int_arg(9), None);
    }

    #[test]
    fn test_parameters_from_pairs() {
        let r = request(FunctionCode::Execute, |w| {
            w.write_type_arg(DataType::Int);
            encode_value(w, DataType::Int, &SqlValue::Int(12345678)).unwrap();
            w.write_type_arg(DataType::String);
            w.write_null_arg();
        });
        let params = r.parameters_from(0).unwrap();
        assert_eq!(params, vec![SqlValue::Int(12345678), SqlValue::Null]);
    }

    #[test]
    fn test_runtime_typed_value_layout() {
        let mut buf = BytesMut::new();
        put_value(&mut buf, DataType::Null, &SqlValue::Int(5), true).unwrap();
        put_value(&mut buf, DataType::Null, &SqlValue::Null, true).unwrap();

        let mut reader = ResponseReader::new(buf.freeze());
        assert_eq!(reader.read_i32().unwrap(), 5);
        assert_eq!(reader.read_u8().unwrap(), DataType::Int as u8);
        assert_eq!(reader.read_i32().unwrap(), 5);
        assert_eq!(read_value(&mut reader, DataType::Null, true).unwrap(), SqlValue::Null);
        assert!(reader.is_empty());
    }

    #[test]
    fn test_tuple_batch_window() {
        let response = MockResponse::rows(
            vec![ColumnMetadata::new("n", ColumnType::scalar(DataType::Int))],
            (1..=5).map(|n| vec![SqlValue::Int(n)]).collect(),
        );
        let mut buf = BytesMut::new();
        put_rows(&mut buf, &response, 4, 10, false).unwrap();

        let mut reader = ResponseReader::new(buf.freeze());
        assert_eq!(reader.read_i32().unwrap(), 2);
        assert_eq!(reader.read_i32().unwrap(), 4);
        assert!(Oid::decode(&mut reader).unwrap().is_null());
        assert_eq!(read_value(&mut reader, DataType::Int, false).unwrap(), SqlValue::Int(4));
    }

    #[test]
    fn test_prepare_reports_call_shape() {
        let config = MockBrokerConfig::default();
        let mut cas = MockCas::new(&config);
        let r = request(FunctionCode::Prepare, |w| {
            w.write_string_arg("? = CALL sp1(?)").unwrap();
            w.write_byte_arg(PrepareFlags::CALL.bits());
            w.write_byte_arg(1);
        });
        let Reply::Frame(frame) = cas.handle(&r).unwrap() else {
            unreachable!("prepare always answers");
        };
        let mut reader = ResponseReader::new(frame.slice(4..));
        let handle = reader.read_i32().unwrap();
        let reply = PrepareReply::decode(handle, &mut reader).unwrap();
        assert_eq!(handle, 1);
        assert_eq!(reply.statement_type, StatementType::CallStoredProcedure);
        assert_eq!(reply.bind_count, 2);
        assert_eq!(reply.tuple_width(), 3);
    }
}
