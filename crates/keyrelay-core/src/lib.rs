//! # Keyrelay Core
//!
//! Pure primitives for the keyrelay broker: bearer passkeys, PSSH values,
//! privilege flags and escrowed key entries.
//!
//! This crate contains no I/O, no storage, no networking.
//!
//! ## Key Types
//!
//! - [`Passkey`] - Opaque bearer credential carrying a privilege pair
//! - [`Privileges`] - The `super_user` / `sudoer` flag pair
//! - [`AuthorizationPolicy`] - The two privilege tiers a route can require
//! - [`Pssh`] - Base64 Protection-System-Specific-Header supplied by clients
//! - [`KeyEntry`] / [`KeyRecord`] - Content keys derived from a license
//!
//! ## Passkeys
//!
//! Passkeys are 16 random bytes rendered as unpadded RFC 4648 base32, see
//! [`generate_passkey`].

pub mod clock;
pub mod error;
pub mod passkey;
pub mod policy;
pub mod types;
pub mod validation;

pub use clock::now_millis;
pub use error::{CoreError, ValidationError};
pub use passkey::{generate_batch, generate_passkey, PASSKEY_BYTES};
pub use policy::AuthorizationPolicy;
pub use types::{decode_base64, legacy_key_string, KeyEntry, KeyRecord, Passkey, Privileges, Pssh};
pub use validation::{require_field, validate_quantity, DEFAULT_QUANTITY, MAX_QUANTITY};
