//! # Keyrelay Testkit
//!
//! Shared test setup for the keyrelay crates.
//!
//! - **Fixtures**: [`TestBroker`] wires a fresh in-memory database and a
//!   deterministic CDM into the real router and drives it request by request.
//! - **Generators**: proptest strategies for passkeys, privileges, PSSH
//!   blobs and key containers.
//!
//! ```rust,no_run
//! use keyrelay_testkit::TestBroker;
//! use serde_json::json;
//!
//! # async fn example() {
//! let broker = TestBroker::new().await;
//! let response = broker
//!     .post("/v1/token", Some(broker.root()), json!({ "quantity": 2, "sudoer": true }))
//!     .await;
//! assert_eq!(response.status, 201);
//! # }
//! ```

pub mod fixtures;
pub mod generators;

pub use fixtures::{key_request_body, sample_keys, TestBroker, TestResponse, SAMPLE_PSSH, SERVER_NAME};
