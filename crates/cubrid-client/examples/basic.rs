//! Basic connection and query example.
//!
//! Connects to a broker, prints the server version and reads a table with
//! a bound parameter.
//!
//! # Running
//!
//! ```bash
//! # Set connection details via environment variables
//! export CUBRID_HOST=localhost
//! export CUBRID_PORT=33000
//! export CUBRID_DATABASE=demodb
//! export CUBRID_USER=public
//!
//! cargo run --example basic
//! ```

// Allow common patterns in example code
#![allow(clippy::unwrap_used, clippy::expect_used)]

use cubrid_client::{Config, Error, Session};

#[tokio::main]
async fn main() -> Result<(), Error> {
    // Initialize tracing for logging
    tracing_subscriber::fmt::init();

    let host = std::env::var("CUBRID_HOST").unwrap_or_else(|_| "localhost".into());
    let port = std::env::var("CUBRID_PORT").unwrap_or_else(|_| "33000".into());
    let database = std::env::var("CUBRID_DATABASE").unwrap_or_else(|_| "demodb".into());
    let user = std::env::var("CUBRID_USER").unwrap_or_else(|_| "public".into());
    let password = std::env::var("CUBRID_PASSWORD").unwrap_or_default();

    let conn_str = format!(
        "Server={};Port={};Database={};User={};Password={}",
        host, port, database, user, password
    );
    let config = Config::from_connection_string(&conn_str)?;

    println!("Connecting to CUBRID at {}:{}...", host, port);
    let mut session = Session::open(config).await?;
    println!("Connected (CAS port {})", session.cas_port());

    let version = session.server_version().await?;
    println!("Server version: {}", version);

    // Parameterized query
    let mut stmt = session
        .prepare("SELECT code, name FROM nation WHERE continent = ? ORDER BY code")
        .await?;
    stmt.bind_value(0, "Asia")?;
    let count = stmt.execute_query(&mut session).await?;
    println!("\n{} nations in Asia", count);

    while let Some(row) = stmt.next_row(&mut session).await? {
        let code: String = row.get(0)?;
        let name: String = row.get_by_name("name")?;
        println!("  {} {}", code, name);
    }
    stmt.close(&mut session).await?;

    session.close().await?;
    println!("\nDone!");
    Ok(())
}
