//! # Keyrelay
//!
//! An access-controlled license broker. Clients holding a passkey send a
//! PSSH, receive a license challenge, return the license server's response,
//! and get the decrypted content keys back. Every key set is escrowed so a
//! later lookup by PSSH needs no license round trip.
//!
//! ## Tiers
//!
//! - **Tier A** (`/v1`, `/v1/challenge`, `/v1/key`, `/v1/escrow-key`):
//!   super users and sudoers.
//! - **Tier B** (`/v1/token`, `/v1/revoke`): super users only.
//!
//! Every admitted request counts against a fixed per-passkey rate window.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use keyrelay::cdm::{CommandCdm, DeviceCredentials};
//! use keyrelay::gate::RateLimitConfig;
//! use keyrelay::store::SqliteStore;
//! use keyrelay::{router, AppState};
//!
//! async fn example() -> anyhow::Result<()> {
//!     let credentials = DeviceCredentials::load("client_id.bin", "private_key.pem")?;
//!     let cdm = CommandCdm::new("/usr/local/bin/cdm-helper", credentials);
//!     let store = Arc::new(SqliteStore::open("keyrelay.db")?);
//!
//!     let state = AppState::from_store(store, Arc::new(cdm), RateLimitConfig::default());
//!     let app = router(state, "keyrelay".parse()?);
//!
//!     let listener = tokio::net::TcpListener::bind("127.0.0.1:8080").await?;
//!     axum::serve(listener, app).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Re-exports
//!
//! - `keyrelay::core` - passkeys, privileges, PSSH and key types
//! - `keyrelay::store` - storage traits and SQLite
//! - `keyrelay::gate` - authorization and rate limiting
//! - `keyrelay::cdm` - the CDM contract and the helper-process engine

pub mod admin;
pub mod api;
pub mod broker;
pub mod config;
pub mod error;
pub mod http;
pub mod issuer;
pub mod server;

// Re-export component crates
pub use keyrelay_cdm as cdm;
pub use keyrelay_core as core;
pub use keyrelay_gate as gate;
pub use keyrelay_store as store;

pub use broker::Broker;
pub use config::{Cli, Command};
pub use error::{BrokerError, Result};
pub use http::{router, AppState, Backend};
pub use issuer::PasskeyIssuer;
