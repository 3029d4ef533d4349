//! # cubrid-testing
//!
//! Test infrastructure for CUBRID driver development.
//!
//! This crate provides a mock broker that speaks the CAS protocol, so the
//! client can be exercised end to end without a running database.
//!
//! ## Features
//!
//! - Mock broker with optional redirect to a separate CAS port
//! - Canned rows, affected counts, stored-procedure outputs and errors
//! - Request recording for asserting on the exact wire traffic
//! - A sample table fixture covering the common scalar types
//!
//! ## Mock Broker Example
//!
//! ```rust,ignore
//! use cubrid_testing::fixtures::SampleTable;
//! use cubrid_testing::mock_broker::{MockBroker, MockResponse};
//!
//! #[tokio::test]
//! async fn test_with_mock_broker() {
//!     let table = SampleTable::default();
//!     let broker = MockBroker::builder()
//!         .with_response(table.select_sql(), table.response())
//!         .build()
//!         .await
//!         .unwrap();
//!
//!     // Connect your client to broker.host() / broker.port()
//!     let port = broker.port();
//!     // ...
//! }
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod fixtures;
pub mod mock_broker;

pub use fixtures::SampleTable;
pub use mock_broker::{
    MockBroker, MockBrokerBuilder, MockBrokerConfig, MockResponse, MockServerError,
    RecordedRequest,
};
