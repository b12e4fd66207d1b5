//! # Keyrelay CDM
//!
//! The content decryption module is an external collaborator: it turns a
//! PSSH into a license challenge and a license response into key containers.
//! This crate fixes that contract and nothing more. The license byte format,
//! key derivation and certificate handling belong to the engine.
//!
//! ## Pieces
//!
//! - [`CdmEngine`] opens a [`CdmSession`] for one PSSH. Sessions are never
//!   kept between requests.
//! - [`DeviceCredentials`] are the client identity and private key, loaded
//!   once and shared by every session.
//! - [`CommandCdm`] runs an external helper program per call.
//! - [`memory::StaticCdm`] is a deterministic engine for tests.

pub mod command;
pub mod credentials;
pub mod engine;
pub mod error;
pub mod memory;
pub mod types;

pub use command::CommandCdm;
pub use credentials::DeviceCredentials;
pub use engine::{CdmEngine, CdmSession};
pub use error::{CdmError, Result};
pub use types::{KeyContainer, KeyType};
