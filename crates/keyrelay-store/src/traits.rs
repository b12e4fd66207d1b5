//! Store traits: the abstract interface for broker persistence.
//!
//! Keeping the three concerns in separate traits lets the rate-limit counters
//! live in a different backend from passkeys and escrowed keys.

use async_trait::async_trait;
use keyrelay_core::{KeyEntry, KeyRecord, Passkey, Privileges, Pssh};

use crate::error::Result;

/// Persistence for passkeys and their privilege flags.
///
/// This is the single source of truth for every authorization decision.
#[async_trait]
pub trait PermissionStore: Send + Sync {
    /// Insert a privilege row for `passkey`.
    ///
    /// Does not check for an existing row with the same value.
    async fn issue_token(&self, passkey: &Passkey, privileges: Privileges) -> Result<()>;

    /// Insert every passkey with the same privileges, all or nothing.
    async fn issue_tokens(&self, passkeys: &[Passkey], privileges: Privileges) -> Result<()>;

    /// Look up the privileges of `passkey`.
    ///
    /// Fails with `StoreError::NotFound` when no row matches. When duplicate
    /// rows exist the newest one is authoritative.
    async fn check_permission(&self, passkey: &Passkey) -> Result<Privileges>;

    /// Clear both flags on every row for `passkey`.
    ///
    /// Succeeds when the passkey is unknown.
    async fn revoke(&self, passkey: &Passkey) -> Result<()>;

    /// All passkeys currently holding the super-user flag, oldest first.
    async fn list_superusers(&self) -> Result<Vec<Passkey>>;
}

/// Append-only escrow of keys derived from licenses.
#[async_trait]
pub trait KeyEscrow: Send + Sync {
    /// Append a record; existing records for the PSSH are kept.
    async fn store_keys(&self, pssh: &Pssh, keys: &[KeyEntry]) -> Result<()>;

    /// The last record appended for `pssh`, or `StoreError::NotFound`.
    ///
    /// Insertion order decides, not `created_at`.
    async fn fetch_keys(&self, pssh: &Pssh) -> Result<KeyRecord>;
}

/// State of a fixed rate window after a hit was counted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowState {
    /// Hits counted in the current window, including this one.
    pub hits: u64,
    /// When the current window ends (Unix ms).
    pub expires_at: i64,
}

/// Durable per-bucket request counters.
#[async_trait]
pub trait RateCounter: Send + Sync {
    /// Count one hit for `bucket` at `now`.
    ///
    /// Starts a fresh window of `window_ms` when none is live. Must be atomic
    /// per bucket: concurrent hits are neither lost nor double counted.
    async fn hit(&self, bucket: &str, window_ms: i64, now: i64) -> Result<WindowState>;

    /// Drop windows that ended at or before `now`. Returns how many were removed.
    async fn purge_expired(&self, now: i64) -> Result<u64>;
}
