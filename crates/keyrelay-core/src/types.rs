//! Strong type definitions for keyrelay.
//!
//! Passkeys and PSSH values are both plain strings on the wire; newtypes keep
//! one from being passed where the other is expected.

use std::fmt;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Number of hex characters in a [`Passkey::fingerprint`].
const FINGERPRINT_LEN: usize = 16;

/// An opaque bearer credential.
///
/// `Debug` never prints the secret, only its fingerprint.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Passkey(String);

impl Passkey {
    /// Wrap a raw token string.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// The raw token. Only hand this to storage or back to the issuing caller.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }

    /// Blake3-derived identifier that is safe to log and to use as a
    /// rate-limit bucket.
    pub fn fingerprint(&self) -> String {
        let hash = blake3::hash(self.0.as_bytes());
        hash.to_hex()[..FINGERPRINT_LEN].to_string()
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Debug for Passkey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Passkey({})", self.fingerprint())
    }
}

impl From<String> for Passkey {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for Passkey {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// A base64-encoded Protection-System-Specific-Header.
///
/// Stored and echoed back verbatim; decoded only when handed to the CDM.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Pssh(String);

impl Pssh {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }

    pub fn into_inner(self) -> String {
        self.0
    }

    /// Decode to the raw init data bytes.
    pub fn decode(&self) -> Result<Vec<u8>, CoreError> {
        decode_base64("pssh", &self.0)
    }
}

impl fmt::Debug for Pssh {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let shown: String = self.0.chars().take(24).collect();
        if shown.len() < self.0.len() {
            write!(f, "Pssh({shown}..)")
        } else {
            write!(f, "Pssh({shown})")
        }
    }
}

impl fmt::Display for Pssh {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Pssh {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for Pssh {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Decode a standard base64 field, tagging failures with the field name.
pub fn decode_base64(field: &'static str, value: &str) -> Result<Vec<u8>, CoreError> {
    STANDARD
        .decode(value.trim())
        .map_err(|e| CoreError::Base64 {
            field,
            reason: e.to_string(),
        })
}

/// The privilege flag pair attached to a passkey.
///
/// `super_user` implies everything `sudoer` grants, plus token administration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Privileges {
    pub super_user: bool,
    pub sudoer: bool,
}

impl Privileges {
    /// Both flags cleared; the state of a revoked passkey.
    pub const NONE: Self = Self {
        super_user: false,
        sudoer: false,
    };

    pub const fn new(super_user: bool, sudoer: bool) -> Self {
        Self { super_user, sudoer }
    }

    pub const fn super_user() -> Self {
        Self::new(true, false)
    }

    pub const fn sudoer() -> Self {
        Self::new(false, true)
    }

    pub const fn is_none(&self) -> bool {
        !self.super_user && !self.sudoer
    }
}

/// One content key: hex key id and hex key value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KeyEntry {
    pub kid: String,
    pub key: String,
}

impl KeyEntry {
    pub fn new(kid: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            kid: kid.into(),
            key: key.into(),
        }
    }

    /// Build from the raw id/value bytes of a key container.
    pub fn from_raw(kid: &[u8], key: &[u8]) -> Self {
        Self {
            kid: hex::encode(kid),
            key: hex::encode(key),
        }
    }
}

impl fmt::Display for KeyEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kid, self.key)
    }
}

/// Concatenate entries as `kid:key` pairs with no separator.
///
/// Kept for clients that still parse the single `key` string; new clients
/// should read the structured list.
pub fn legacy_key_string(keys: &[KeyEntry]) -> String {
    keys.iter().map(KeyEntry::to_string).collect()
}

/// An escrowed key set for one PSSH.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyRecord {
    pub pssh: Pssh,
    pub keys: Vec<KeyEntry>,
    /// Unix milliseconds.
    pub created_at: i64,
}

impl KeyRecord {
    pub fn legacy_key(&self) -> String {
        legacy_key_string(&self.keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_passkey_debug_hides_secret() {
        let passkey = Passkey::new("SUPERSECRETTOKENVALUE");
        let debug = format!("{:?}", passkey);
        assert!(debug.starts_with("Passkey("));
        assert!(!debug.contains("SUPERSECRET"));
    }

    #[test]
    fn test_fingerprint_is_stable() {
        let a = Passkey::new("abc");
        let b = Passkey::new("abc");
        let c = Passkey::new("abd");
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_ne!(a.fingerprint(), c.fingerprint());
        assert_eq!(a.fingerprint().len(), FINGERPRINT_LEN);
    }

    #[test]
    fn test_pssh_decode() {
        let pssh = Pssh::new("AAAAMnBzc2g=");
        assert_eq!(pssh.decode().unwrap(), b"\x00\x00\x002pssh".to_vec());

        let bad = Pssh::new("not base64!!");
        assert!(matches!(bad.decode(), Err(CoreError::Base64 { field: "pssh", .. })));
    }

    #[test]
    fn test_blank_values_are_empty() {
        assert!(Pssh::new("   ").is_empty());
        assert!(Passkey::new("").is_empty());
        assert!(!Passkey::new("x").is_empty());
    }

    #[test]
    fn test_key_entry_display() {
        let entry = KeyEntry::from_raw(&[0x01, 0xab], &[0xff, 0x00]);
        assert_eq!(entry.to_string(), "01ab:ff00");
    }

    #[test]
    fn test_legacy_key_string_concatenates() {
        let keys = vec![KeyEntry::new("aa", "bb"), KeyEntry::new("cc", "dd")];
        assert_eq!(legacy_key_string(&keys), "aa:bbcc:dd");
        assert_eq!(legacy_key_string(&[]), "");
    }

    #[test]
    fn test_key_entry_serde_shape() {
        let entry = KeyEntry::new("aa", "bb");
        let json = serde_json::to_string(&entry).unwrap();
        assert_eq!(json, r#"{"kid":"aa","key":"bb"}"#);
    }

    #[test]
    fn test_privileges_none() {
        assert!(Privileges::NONE.is_none());
        assert!(!Privileges::sudoer().is_none());
        assert_eq!(Privileges::default(), Privileges::NONE);
    }
}
