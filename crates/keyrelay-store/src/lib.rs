//! # Keyrelay Store
//!
//! Storage abstraction for keyrelay. Three async traits cover everything the
//! broker persists:
//!
//! - [`PermissionStore`] - passkeys and their privilege flags
//! - [`KeyEscrow`] - PSSH to derived-key records, append-only
//! - [`RateCounter`] - per-bucket fixed-window request counters
//!
//! [`SqliteStore`] implements all three durably; [`MemoryStore`] has the same
//! semantics without persistence and is meant for tests.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use keyrelay_core::{Passkey, Privileges};
//! use keyrelay_store::{PermissionStore, SqliteStore};
//!
//! async fn example() {
//!     let store = SqliteStore::open("keyrelay.db").unwrap();
//!
//!     let passkey = Passkey::new("EXAMPLEPASSKEY");
//!     store.issue_token(&passkey, Privileges::sudoer()).await.unwrap();
//!     let privileges = store.check_permission(&passkey).await.unwrap();
//!     assert!(privileges.sudoer);
//!
//!     store.close().unwrap();
//! }
//! ```
//!
//! ## Design Notes
//!
//! - **Bounded operations**: every SQLite call runs under a timeout and fails
//!   with [`StoreError::Timeout`]; nothing is retried at this layer.
//! - **Idempotent revoke**: revoking an unknown passkey succeeds.
//! - **Newest wins**: [`KeyEscrow::fetch_keys`] returns the last record appended.
//! - **Atomic counters**: [`RateCounter::hit`] is a single UPSERT.

pub mod error;
pub mod memory;
pub mod migration;
pub mod sqlite;
pub mod traits;

pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use sqlite::{SqliteStore, StoreOptions, DEFAULT_OP_TIMEOUT};
pub use traits::{KeyEscrow, PermissionStore, RateCounter, WindowState};
