//! Request and response bodies.
//!
//! Required fields are `Option` so that a missing field is reported as a
//! validation error naming the field rather than a generic parse failure.

use keyrelay_core::{KeyEntry, KeyRecord, Passkey};
use serde::{Deserialize, Deserializer, Serialize};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PsshRequest {
    #[serde(default)]
    pub pssh: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct KeyRequest {
    #[serde(default)]
    pub pssh: Option<String>,
    #[serde(default)]
    pub challenge: Option<String>,
    #[serde(default)]
    pub license: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TokenRequest {
    #[serde(default)]
    pub quantity: Option<i64>,
    #[serde(default, deserialize_with = "flag")]
    pub super_user: bool,
    #[serde(default, deserialize_with = "flag")]
    pub sudoer: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RevokeRequest {
    #[serde(default, alias = "passkey")]
    pub token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChallengeResponse {
    /// Base64 license request.
    pub challenge: String,
    pub pssh: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyResponse {
    pub pssh: String,
    /// Every `kid:key` pair concatenated, for older clients.
    pub key: String,
    pub keys: Vec<KeyEntry>,
}

impl From<KeyRecord> for KeyResponse {
    fn from(record: KeyRecord) -> Self {
        Self {
            key: record.legacy_key(),
            pssh: record.pssh.into_inner(),
            keys: record.keys,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenResponse {
    pub success: bool,
    pub tokens: Vec<String>,
    pub message: String,
}

impl TokenResponse {
    pub fn issued(passkeys: Vec<Passkey>) -> Self {
        let message = match passkeys.len() {
            1 => "1 passkey issued".to_string(),
            n => format!("{} passkeys issued", n),
        };
        Self {
            success: true,
            tokens: passkeys.into_iter().map(Passkey::into_inner).collect(),
            message,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevokeResponse {
    pub success: bool,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

/// Privilege flags arrive as JSON booleans or as the integers 0 and 1.
fn flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Int(i64),
    }

    match Flag::deserialize(deserializer)? {
        Flag::Bool(b) => Ok(b),
        Flag::Int(0) => Ok(false),
        Flag::Int(1) => Ok(true),
        Flag::Int(n) => Err(serde::de::Error::custom(format!(
            "privilege flag must be 0 or 1, got {}",
            n
        ))),
    }
}
