//! End-to-end tests against the mock broker.
//!
//! These run without a database. The tests at the bottom need a live CUBRID
//! broker and are ignored by default.
//!
//! Run with:
//!   CUBRID_HOST=localhost CUBRID_PORT=33000 CUBRID_DATABASE=demodb \
//!   cargo test -p cubrid-client --test integration -- --ignored

#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::approx_constant,
    clippy::excessive_precision
)]

use chrono::NaiveDate;
use cubrid_client::{
    ColumnMetadata, Config, CursorOrigin, DataType, Parameter, Session, SqlValue, Statement,
    StatementType,
};
use cubrid_protocol::{ColumnType, FunctionCode};
use cubrid_testing::{MockBroker, MockResponse, SampleTable};
use rust_decimal::Decimal;

// =============================================================================
// Helpers
// =============================================================================

fn mock_config(broker: &MockBroker) -> Config {
    Config::new()
        .host(broker.host())
        .port(broker.port())
        .database("demodb")
        .credentials("dba", "")
}

fn int_column(name: &str) -> ColumnMetadata {
    ColumnMetadata::new(name, ColumnType::scalar(DataType::Int))
}

fn numbers(count: i32) -> MockResponse {
    MockResponse::rows(
        vec![int_column("n")],
        (1..=count).map(|n| vec![SqlValue::Int(n)]).collect(),
    )
}

async fn next_value(stmt: &mut Statement, session: &mut Session) -> i32 {
    stmt.next_row(session).await.unwrap().unwrap().get(0).unwrap()
}

// =============================================================================
// Handshake
// =============================================================================

#[tokio::test]
async fn test_connect_without_redirect() {
    let broker = MockBroker::builder().build().await.unwrap();
    let session = Session::open(mock_config(&broker)).await.unwrap();

    assert!(session.is_connected());
    assert_eq!(session.cas_port(), broker.port());
    assert!(session.broker_info().keep_connection);
    assert_eq!(session.generation(), 1);

    let logins = broker.logins().await;
    assert_eq!(logins.len(), 1);
    assert_eq!(logins[0].database, "demodb");
    assert_eq!(logins[0].user, "dba");
}

#[tokio::test]
async fn test_redirect_opens_one_cas_connection() {
    let broker = MockBroker::builder().with_redirect().build().await.unwrap();
    let mut session = Session::open(mock_config(&broker)).await.unwrap();

    assert_eq!(Some(session.cas_port()), broker.cas_port());
    assert_eq!(broker.broker_connections().await, 1);
    assert_eq!(broker.cas_connections().await, 1);

    // Requests go to the CAS, not back to the broker.
    let version = session.server_version().await.unwrap();
    assert!(!version.is_empty());
    assert_eq!(broker.broker_connections().await, 1);
    assert_eq!(broker.cas_connections().await, 1);
}

#[tokio::test]
async fn test_connection_string_session() {
    let broker = MockBroker::builder().build().await.unwrap();
    let conn_str = format!(
        "Server={};Port={};Database=demodb;User=dba;Password=;Fetch Size=50",
        broker.host(),
        broker.port()
    );
    let config = Config::from_connection_string(&conn_str).unwrap();
    let session = Session::open(config).await.unwrap();

    assert_eq!(session.config().fetch_size, 50);
    assert!(session.auto_commit());
}

// =============================================================================
// Queries and cursors
// =============================================================================

#[tokio::test]
async fn test_select_sample_row() {
    let table = SampleTable::default();
    let broker = MockBroker::builder()
        .with_response(table.select_sql(), table.response())
        .build()
        .await
        .unwrap();
    let mut session = Session::open(mock_config(&broker)).await.unwrap();

    let mut stmt = session.prepare(&table.select_sql()).await.unwrap();
    assert_eq!(stmt.statement_type(), StatementType::Select);
    assert_eq!(stmt.columns().len(), 6);
    assert_eq!(stmt.bind_count(), 0);

    let count = stmt.execute_query(&mut session).await.unwrap();
    assert_eq!(count, 1);

    let row = stmt.next_row(&mut session).await.unwrap().expect("one row");
    assert_eq!(row.get::<i32>(0).unwrap(), 1);
    assert_eq!(row.get::<String>(1).unwrap(), "cubrid    ");
    assert_eq!(row.get_by_name::<String>("c").unwrap(), "ado.net provider");
    assert_eq!(row.get::<f32>(3).unwrap(), 3.14);
    assert_eq!(row.get::<f64>(4).unwrap(), 8373625.383635235373);
    assert_eq!(
        row.get::<NaiveDate>(5).unwrap(),
        NaiveDate::from_ymd_opt(2008, 12, 24).unwrap()
    );

    assert!(stmt.next_row(&mut session).await.unwrap().is_none());
    stmt.close(&mut session).await.unwrap();
    assert!(stmt.is_closed());
}

#[tokio::test]
async fn test_select_numeric_column() {
    let amount = Decimal::from_i128_with_scale(8_373_625_383_635_235_373, 12);
    let column = ColumnMetadata::new("amount", ColumnType::scalar(DataType::Numeric))
        .with_precision(38)
        .with_scale(12);
    let broker = MockBroker::builder()
        .with_response(
            "SELECT amount FROM ledger",
            MockResponse::rows(vec![column], vec![vec![SqlValue::Numeric(amount)]]),
        )
        .build()
        .await
        .unwrap();
    let mut session = Session::open(mock_config(&broker)).await.unwrap();

    let mut stmt = session.prepare("SELECT amount FROM ledger").await.unwrap();
    assert_eq!(stmt.columns()[0].scale, 12);
    stmt.execute_query(&mut session).await.unwrap();

    let row = stmt.next_row(&mut session).await.unwrap().expect("one row");
    assert_eq!(
        row.get::<Decimal>(0).unwrap(),
        "8373625.383635235373".parse::<Decimal>().unwrap()
    );
    stmt.close(&mut session).await.unwrap();
}

#[tokio::test]
async fn test_cursor_bounds() {
    let broker = MockBroker::builder()
        .with_response("SELECT none", numbers(0))
        .with_response("SELECT one", numbers(1))
        .with_response("SELECT seven", numbers(7))
        .build()
        .await
        .unwrap();
    let mut session = Session::open(mock_config(&broker)).await.unwrap();

    for (sql, expected) in [("SELECT none", 0), ("SELECT one", 1), ("SELECT seven", 7)] {
        let mut stmt = session.prepare(sql).await.unwrap();
        assert_eq!(stmt.execute_query(&mut session).await.unwrap(), expected);

        let rows = stmt.fetch_all(&mut session).await.unwrap();
        assert_eq!(rows.len(), expected as usize, "{sql}");
        for (i, row) in rows.iter().enumerate() {
            assert_eq!(row.index(), i as i32 + 1);
            assert!(row.oid().is_none());
        }

        // Stays exhausted.
        assert!(stmt.next_row(&mut session).await.unwrap().is_none());
        let cursor = stmt.cursor().unwrap();
        assert_eq!(cursor.position(), expected);
        stmt.close(&mut session).await.unwrap();
    }
}

#[tokio::test]
async fn test_cursor_fetches_past_inline_batch() {
    let broker = MockBroker::builder()
        .with_fetch_batch(2)
        .with_response("SELECT n FROM t", numbers(5))
        .build()
        .await
        .unwrap();
    let mut session = Session::open(mock_config(&broker)).await.unwrap();

    let mut stmt = session.prepare("SELECT n FROM t").await.unwrap();
    stmt.execute_query(&mut session).await.unwrap();
    assert_eq!(stmt.cursor().unwrap().fetched_count(), 2);

    let values: Vec<i32> = stmt
        .fetch_all(&mut session)
        .await
        .unwrap()
        .iter()
        .map(|row| row.get(0).unwrap())
        .collect();
    assert_eq!(values, vec![1, 2, 3, 4, 5]);

    let fetches = broker.requests_with(FunctionCode::Fetch).await;
    let starts: Vec<_> = fetches.iter().map(|r| r.int_arg(1).unwrap()).collect();
    assert_eq!(starts, vec![3, 5]);
}

#[tokio::test]
async fn test_move_cursor() {
    let broker = MockBroker::builder()
        .with_fetch_batch(3)
        .with_response("SELECT n FROM t", numbers(7))
        .build()
        .await
        .unwrap();
    let mut session = Session::open(mock_config(&broker)).await.unwrap();

    let mut stmt = session.prepare("SELECT n FROM t").await.unwrap();
    stmt.execute_query(&mut session).await.unwrap();

    // Past the inline window: rows are fetched from the new position.
    assert!(stmt.move_cursor(&mut session, 5, CursorOrigin::First).await.unwrap());
    assert_eq!(next_value(&mut stmt, &mut session).await, 5);

    // Inside the received window: no fetch needed.
    assert!(stmt.move_cursor(&mut session, 1, CursorOrigin::Last).await.unwrap());
    assert_eq!(next_value(&mut stmt, &mut session).await, 7);

    // Backwards from the current row.
    assert!(stmt.move_cursor(&mut session, -5, CursorOrigin::Current).await.unwrap());
    assert_eq!(stmt.cursor().unwrap().position(), 1);
    assert_eq!(next_value(&mut stmt, &mut session).await, 2);

    // Out of range keeps the position.
    assert!(!stmt.move_cursor(&mut session, 9, CursorOrigin::First).await.unwrap());
    assert_eq!(next_value(&mut stmt, &mut session).await, 3);
    assert_eq!(stmt.cursor().unwrap().result_count(), 7);

    let moves = broker.requests_with(FunctionCode::Cursor).await;
    let sent: Vec<_> = moves
        .iter()
        .map(|r| (r.int_arg(0).unwrap(), r.int_arg(1).unwrap(), r.byte_arg(2).unwrap()))
        .collect();
    let handle = stmt.handle();
    assert_eq!(
        sent,
        vec![(handle, 5, 0), (handle, 1, 2), (handle, 2, 0), (handle, 9, 0)]
    );

    let starts: Vec<_> = broker
        .requests_with(FunctionCode::Fetch)
        .await
        .iter()
        .map(|r| r.int_arg(1).unwrap())
        .collect();
    assert_eq!(starts, vec![5, 2]);
    stmt.close(&mut session).await.unwrap();

    // Results without rows have no cursor to move.
    let mut update = session.prepare("DELETE FROM t").await.unwrap();
    update.execute_non_query(&mut session).await.unwrap();
    assert!(!update.move_cursor(&mut session, 1, CursorOrigin::First).await.unwrap());
    assert_eq!(broker.requests_with(FunctionCode::Cursor).await.len(), 4);
}

#[tokio::test]
async fn test_fetch_size_is_sent() {
    let broker = MockBroker::builder()
        .with_fetch_batch(1)
        .with_response("SELECT n FROM t", numbers(3))
        .build()
        .await
        .unwrap();
    let config = mock_config(&broker).fetch_size(100);
    let mut session = Session::open(config).await.unwrap();

    let mut stmt = session.prepare("SELECT n FROM t").await.unwrap();
    stmt.execute_query(&mut session).await.unwrap();
    assert_eq!(stmt.fetch_all(&mut session).await.unwrap().len(), 3);

    let fetches = broker.requests_with(FunctionCode::Fetch).await;
    assert_eq!(fetches.len(), 1);
    assert_eq!(fetches[0].int_arg(2), Some(100));
}

// =============================================================================
// Parameters
// =============================================================================

#[tokio::test]
async fn test_bound_parameters_reach_server() {
    let broker = MockBroker::builder()
        .with_response(
            "UPDATE t SET name = ? WHERE id = ?",
            MockResponse::affected(1),
        )
        .build()
        .await
        .unwrap();
    let mut session = Session::open(mock_config(&broker)).await.unwrap();

    let mut stmt = session
        .prepare("UPDATE t SET name = ? WHERE id = ?")
        .await
        .unwrap();
    assert_eq!(stmt.bind_count(), 2);
    stmt.bind_value(0, "Seoul").unwrap();
    stmt.bind(1, Parameter::input(42)).unwrap();
    assert_eq!(stmt.execute_non_query(&mut session).await.unwrap(), 1);

    let executes = broker.requests_with(FunctionCode::Execute).await;
    assert_eq!(executes.len(), 1);
    // No direction modes outside stored-procedure calls.
    assert!(executes[0].args[4].is_empty());

    let params = broker.bound_parameters().await.unwrap();
    assert_eq!(
        params,
        vec![vec![SqlValue::String("Seoul".into()), SqlValue::Int(42)]]
    );
}

#[tokio::test]
async fn test_stored_procedure_out_mapping() {
    let broker = MockBroker::builder()
        .with_response(
            "? = CALL sp1(?)",
            MockResponse::call(
                SqlValue::Null,
                vec![SqlValue::String("cubrid".into()), SqlValue::Int(12345678)],
            ),
        )
        .build()
        .await
        .unwrap();
    let mut session = Session::open(mock_config(&broker)).await.unwrap();

    let mut stmt = session.prepare_call("? = CALL sp1(?)").await.unwrap();
    assert_eq!(stmt.statement_type(), StatementType::CallStoredProcedure);
    stmt.bind(0, Parameter::output(DataType::String)).unwrap();
    stmt.bind(1, Parameter::input(12345678)).unwrap();
    stmt.execute(&mut session).await.unwrap();

    assert_eq!(stmt.return_value(), Some(&SqlValue::Null));
    assert_eq!(
        stmt.parameter(0).unwrap().value,
        SqlValue::String("cubrid".into())
    );
    // Input slots keep the bound value.
    assert_eq!(stmt.parameter(1).unwrap().value, SqlValue::Int(12345678));

    let execute = &broker.requests_with(FunctionCode::Execute).await[0];
    assert_eq!(execute.args[4].as_ref(), &[2, 1]);
    assert_eq!(
        broker.bound_parameters().await.unwrap(),
        vec![vec![SqlValue::Null, SqlValue::Int(12345678)]]
    );
}

#[tokio::test]
async fn test_stored_procedure_out_result_set() {
    let broker = MockBroker::builder()
        .with_response(
            "? = CALL open_cursor()",
            MockResponse::call(0, vec![SqlValue::ResultSet(77)]),
        )
        .with_out_result_set(77, numbers(3))
        .build()
        .await
        .unwrap();
    let mut session = Session::open(mock_config(&broker)).await.unwrap();

    let mut stmt = session.prepare_call("? = CALL open_cursor()").await.unwrap();
    stmt.bind(0, Parameter::output(DataType::ResultSet)).unwrap();
    stmt.execute(&mut session).await.unwrap();

    assert_eq!(stmt.return_value(), Some(&SqlValue::Int(0)));
    let mut nested = stmt.take_out_result_set(0).expect("out result set");
    assert_eq!(nested.result_count(), 3);
    assert!(stmt.take_out_result_set(0).is_none());

    let rows = nested.fetch_all(&mut session).await.unwrap();
    let values: Vec<i32> = rows.iter().map(|r| r.get(0).unwrap()).collect();
    assert_eq!(values, vec![1, 2, 3]);

    let made = broker.requests_with(FunctionCode::MakeOutResultSet).await;
    assert_eq!(made.len(), 1);
    assert_eq!(made[0].int_arg(0), Some(77));

    nested.close(&mut session).await.unwrap();
    stmt.close(&mut session).await.unwrap();
}

// =============================================================================
// Multiple results and batches
// =============================================================================

#[tokio::test]
async fn test_next_result() {
    let broker = MockBroker::builder()
        .with_response(
            "SELECT n FROM t; DELETE FROM t",
            MockResponse::results(vec![numbers(2), MockResponse::affected(2)]),
        )
        .build()
        .await
        .unwrap();
    let mut session = Session::open(mock_config(&broker)).await.unwrap();

    let mut stmt = session
        .prepare("SELECT n FROM t; DELETE FROM t")
        .await
        .unwrap();
    stmt.execute(&mut session).await.unwrap();
    assert_eq!(stmt.result_infos().len(), 2);
    assert_eq!(stmt.fetch_all(&mut session).await.unwrap().len(), 2);

    assert!(stmt.next_result(&mut session).await.unwrap());
    assert_eq!(stmt.statement_type(), StatementType::Update);
    assert_eq!(stmt.result_count(), 2);
    assert!(stmt.cursor().is_none());
    assert!(stmt.next_row(&mut session).await.unwrap().is_none());

    let sent = broker.requests().await.len();
    assert!(!stmt.next_result(&mut session).await.unwrap());
    assert_eq!(broker.requests().await.len(), sent, "no I/O past the last result");
}

#[tokio::test]
async fn test_session_batch() {
    let broker = MockBroker::builder()
        .with_response("DELETE FROM a", MockResponse::affected(4))
        .with_response("DROP TABLE missing", MockResponse::error(-494, "Unknown class"))
        .build()
        .await
        .unwrap();
    let mut session = Session::open(mock_config(&broker)).await.unwrap();

    let results = session
        .execute_batch(&["DELETE FROM a", "DROP TABLE missing"])
        .await
        .unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].result, 4);
    assert!(!results[0].is_error());
    assert!(results[1].is_error());
    assert_eq!(results[1].error_message.as_deref(), Some("Unknown class"));
}

#[tokio::test]
async fn test_prepared_batch() {
    let broker = MockBroker::builder()
        .with_response(
            "INSERT INTO t VALUES (?, ?)",
            MockResponse::affected(1).with_statement_type(StatementType::Insert),
        )
        .build()
        .await
        .unwrap();
    let mut session = Session::open(mock_config(&broker)).await.unwrap();

    let mut stmt = session.prepare("INSERT INTO t VALUES (?, ?)").await.unwrap();
    let rows: Vec<Vec<Parameter>> = (1..=3)
        .map(|n| vec![Parameter::input(n), Parameter::input(format!("row {n}"))])
        .collect();
    let results = stmt.execute_batch(&mut session, &rows).await.unwrap();

    assert_eq!(results.len(), 3);
    assert!(results.iter().all(|r| r.result == 1));
    assert!(results.iter().all(|r| r.statement_type == StatementType::Insert));

    let batch = broker
        .requests_with(FunctionCode::ExecuteBatchPrepared)
        .await;
    assert_eq!(batch.len(), 1);
    let values = batch[0].parameters_from(2).unwrap();
    assert_eq!(values.len(), 6);
    assert_eq!(values[4], SqlValue::Int(3));
    assert_eq!(values[5], SqlValue::String("row 3".into()));
}

// =============================================================================
// Session utilities
// =============================================================================

#[tokio::test]
async fn test_server_version_and_plan() {
    let broker = MockBroker::builder()
        .with_version("11.2.1.0034")
        .with_query_plan("Query plan:\n sscan")
        .build()
        .await
        .unwrap();
    let mut session = Session::open(mock_config(&broker)).await.unwrap();

    assert_eq!(session.server_version().await.unwrap(), "11.2.1.0034");
    assert_eq!(
        session.query_plan("SELECT * FROM t").await.unwrap(),
        "Query plan:\n sscan"
    );

    let mut stmt = session.prepare("SELECT * FROM t").await.unwrap();
    assert_eq!(
        stmt.query_plan(&mut session).await.unwrap(),
        "Query plan:\n sscan"
    );

    let info = broker.requests_with(FunctionCode::GetQueryInfo).await;
    assert_eq!(info[0].string_arg(2).as_deref(), Some("SELECT * FROM t"));
    assert_eq!(info[1].int_arg(0), Some(stmt.handle()));
    stmt.close(&mut session).await.unwrap();
}

#[tokio::test]
async fn test_session_close_sends_close_connection() {
    let broker = MockBroker::builder().build().await.unwrap();
    let session = Session::open(mock_config(&broker)).await.unwrap();
    session.close().await.unwrap();

    let closes = broker.requests_with(FunctionCode::CloseConnection).await;
    assert_eq!(closes.len(), 1);
}

// =============================================================================
// Live server (ignored by default)
// =============================================================================

fn live_config() -> Option<Config> {
    let host = std::env::var("CUBRID_HOST").ok()?;
    let port = std::env::var("CUBRID_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(cubrid_client::config::DEFAULT_PORT);
    let database = std::env::var("CUBRID_DATABASE").unwrap_or_else(|_| "demodb".into());
    let user = std::env::var("CUBRID_USER").unwrap_or_else(|_| "dba".into());
    let password = std::env::var("CUBRID_PASSWORD").unwrap_or_default();
    Some(
        Config::new()
            .host(host)
            .port(port)
            .database(database)
            .credentials(user, password),
    )
}

#[tokio::test]
#[ignore = "Requires CUBRID broker"]
async fn test_live_sample_table_round_trip() {
    let config = live_config().expect("CUBRID_HOST not set");
    let mut session = Session::open(config).await.unwrap();
    let table = SampleTable::new("t_cubrid_client_it");

    session
        .execute_batch(&[table.drop_table_sql(), table.create_table_sql(), table.insert_sql()])
        .await
        .unwrap();

    let mut stmt = session.prepare(&table.select_sql()).await.unwrap();
    assert_eq!(stmt.execute_query(&mut session).await.unwrap(), 1);
    let row = stmt.next_row(&mut session).await.unwrap().unwrap();
    assert_eq!(row.into_values(), table.row());
    stmt.close(&mut session).await.unwrap();

    session.execute_batch(&[table.drop_table_sql()]).await.unwrap();
    session.close().await.unwrap();
}
