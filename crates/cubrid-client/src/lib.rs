//! # cubrid-client
//!
//! Async CUBRID client: sessions, prepared statements, cursors and
//! transactions over the CAS wire protocol.
//!
//! ## Features
//!
//! - **Broker handshake**: Port redirection and broker capability discovery
//! - **Prepared statements**: Typed parameter binding, stored-procedure
//!   output parameters and output result sets
//! - **Cursors**: Rows beyond the first inline batch are fetched on demand
//! - **Transactions**: Auto-commit control, isolation levels and scoped
//!   transaction handles
//! - **Lazy reconnect**: Sessions re-establish their socket when the broker
//!   drops it at the end of a transaction
//!
//! ## Statement lifecycle
//!
//! ```text
//! prepare -> bind -> execute -> next_row / next_result -> close
//! ```
//!
//! Every statement operation takes `&mut Session`, so one session is never
//! used by two requests at once.
//!
//! ## Example
//!
//! ```rust,ignore
//! use cubrid_client::{Config, Parameter, Session};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_connection_string(
//!         "server=localhost;port=33000;database=demodb;user=dba;password=;",
//!     )?;
//!     let mut session = Session::open(config).await?;
//!
//!     let mut stmt = session.prepare("SELECT name FROM athlete WHERE code > ?").await?;
//!     stmt.bind(0, Parameter::input(10000))?;
//!     stmt.execute_query(&mut session).await?;
//!     while let Some(row) = stmt.next_row(&mut session).await? {
//!         let name: String = row.get(0)?;
//!         println!("{name}");
//!     }
//!     stmt.close(&mut session).await?;
//!
//!     let mut tx = session.begin_transaction(None).await?;
//!     let mut insert = tx.prepare("INSERT INTO t VALUES (1)").await?;
//!     insert.execute_non_query(tx.session()).await?;
//!     insert.close(tx.session()).await?;
//!     tx.commit().await?;
//!
//!     session.close().await?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod config;
pub mod cursor;
pub mod error;
pub mod parameter;
pub mod row;
pub mod session;
pub mod statement;
pub mod transaction;

pub use config::{Config, RedirectConfig, TimeoutConfig};
pub use cubrid_protocol::{
    BatchResult, BrokerInfo, ColumnMetadata, CursorOrigin, DataType, Oid, PrepareFlags,
    ResultInfo, StatementType,
};
pub use cubrid_types::{FromSql, SqlValue, ToSql};
pub use cursor::Cursor;
pub use error::{Error, Result};
pub use parameter::{Parameter, ParameterDirection};
pub use row::Row;
pub use session::Session;
pub use statement::Statement;
pub use transaction::{IsolationLevel, Transaction};
