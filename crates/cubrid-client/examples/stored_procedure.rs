//! Stored-procedure call and transaction example.
//!
//! Calls a procedure with an OUT parameter, then runs two updates in one
//! transaction.
//!
//! # Running
//!
//! ```bash
//! cargo run --example stored_procedure
//! ```

// Allow common patterns in example code
#![allow(clippy::unwrap_used, clippy::expect_used)]

use cubrid_client::{Config, DataType, Error, IsolationLevel, Parameter, Session};

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt::init();

    let host = std::env::var("CUBRID_HOST").unwrap_or_else(|_| "localhost".into());
    let database = std::env::var("CUBRID_DATABASE").unwrap_or_else(|_| "demodb".into());
    let user = std::env::var("CUBRID_USER").unwrap_or_else(|_| "dba".into());
    let password = std::env::var("CUBRID_PASSWORD").unwrap_or_default();

    let config = Config::new()
        .host(host)
        .database(database)
        .credentials(user, password);
    let mut session = Session::open(config).await?;

    // `? = CALL sp1(?)`: slot 0 receives the procedure's output.
    println!("--- Stored procedure ---");
    let mut call = session.prepare_call("? = CALL sp1(?)").await?;
    call.bind(0, Parameter::output(DataType::String))?;
    call.bind(1, Parameter::input(12345678))?;
    call.execute(&mut session).await?;
    println!("return value: {:?}", call.return_value());
    println!("out value:    {:?}", call.parameter(0).map(|p| &p.value));
    call.close(&mut session).await?;

    println!("\n--- Transaction ---");
    let mut tx = session
        .begin_transaction(Some(IsolationLevel::RepeatableRead))
        .await?;
    let mut debit = tx
        .prepare("UPDATE account SET balance = balance - ? WHERE id = ?")
        .await?;
    debit.bind(0, Parameter::input(100))?;
    debit.bind(1, Parameter::input(1))?;
    let affected = debit.execute_non_query(tx.session()).await?;
    println!("debited {} account(s)", affected);
    debit.close(tx.session()).await?;
    tx.commit().await?;

    session.close().await?;
    Ok(())
}
