//! SQLite implementation of the store traits.
//!
//! This is the durable backend for keyrelay. It uses rusqlite with bundled
//! SQLite, wrapped in async via tokio::spawn_blocking. Every call is bounded by
//! [`StoreOptions::op_timeout`].

use std::fmt;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use keyrelay_core::{now_millis, KeyEntry, KeyRecord, Passkey, Privileges, Pssh};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info, warn};

use crate::error::{Result, StoreError};
use crate::migration;
use crate::traits::{KeyEscrow, PermissionStore, RateCounter, WindowState};

/// Default bound on a single storage operation.
pub const DEFAULT_OP_TIMEOUT: Duration = Duration::from_secs(5);

/// Tunables for [`SqliteStore`].
#[derive(Debug, Clone)]
pub struct StoreOptions {
    /// Bound on each operation, lock wait included. Also used as SQLite's
    /// busy timeout.
    pub op_timeout: Duration,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            op_timeout: DEFAULT_OP_TIMEOUT,
        }
    }
}

/// SQLite-based store implementation.
///
/// Thread-safe via internal Mutex, so writes are serialized. The connection
/// slot is emptied by [`SqliteStore::close`]; later calls fail with
/// [`StoreError::Closed`].
pub struct SqliteStore {
    conn: Arc<Mutex<Option<Connection>>>,
    options: StoreOptions,
}

impl fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqliteStore")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl SqliteStore {
    /// Open a SQLite database at the given path.
    ///
    /// Creates the file and runs migrations if it doesn't exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with(path, StoreOptions::default())
    }

    pub fn open_with(path: impl AsRef<Path>, options: StoreOptions) -> Result<Self> {
        let path = path.as_ref();
        let mut conn = Connection::open(path)?;
        conn.busy_timeout(options.op_timeout)?;
        let journal_mode: String =
            conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
        migration::migrate(&mut conn)?;

        debug!(path = %path.display(), %journal_mode, "opened sqlite store");
        Ok(Self::from_connection(conn, options))
    }

    /// Open an in-memory SQLite database.
    ///
    /// Useful for testing.
    pub fn open_memory() -> Result<Self> {
        Self::open_memory_with(StoreOptions::default())
    }

    pub fn open_memory_with(options: StoreOptions) -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        migration::migrate(&mut conn)?;
        Ok(Self::from_connection(conn, options))
    }

    fn from_connection(conn: Connection, options: StoreOptions) -> Self {
        Self {
            conn: Arc::new(Mutex::new(Some(conn))),
            options,
        }
    }

    pub fn options(&self) -> &StoreOptions {
        &self.options
    }

    /// Release the connection. Idempotent.
    ///
    /// Blocks until any in-flight operation releases the connection lock.
    pub fn close(&self) -> Result<()> {
        let mut slot = self.conn.lock().map_err(poisoned)?;
        match slot.take() {
            Some(conn) => {
                conn.close().map_err(|(_, e)| StoreError::Database(e))?;
                info!("sqlite store closed");
            }
            None => debug!("sqlite store already closed"),
        }
        Ok(())
    }

    /// Run `f` against the connection on the blocking pool, bounded by the
    /// operation timeout.
    ///
    /// On timeout the blocking task is abandoned, not cancelled: a write may
    /// still land after the caller has been told it failed.
    async fn run<F, T>(&self, op: &'static str, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        let task = tokio::task::spawn_blocking(move || {
            let mut slot = conn.lock().map_err(poisoned)?;
            let conn = slot.as_mut().ok_or(StoreError::Closed)?;
            f(conn)
        });

        match tokio::time::timeout(self.options.op_timeout, task).await {
            Ok(joined) => joined
                .map_err(|e| StoreError::TaskFailed(format!("spawn_blocking failed: {}", e)))?,
            Err(_) => {
                let after_ms = self.options.op_timeout.as_millis() as u64;
                warn!(op, after_ms, "storage operation timed out");
                Err(StoreError::Timeout { op, after_ms })
            }
        }
    }
}

fn poisoned<T>(e: PoisonError<T>) -> StoreError {
    StoreError::TaskFailed(format!("connection mutex poisoned: {}", e))
}

#[async_trait]
impl PermissionStore for SqliteStore {
    async fn issue_token(&self, passkey: &Passkey, privileges: Privileges) -> Result<()> {
        let passkey = passkey.clone();

        self.run("issue_token", move |conn| {
            conn.execute(
                "INSERT INTO passkeys (passkey, super_user, sudoer, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    passkey.as_str(),
                    privileges.super_user,
                    privileges.sudoer,
                    now_millis(),
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn issue_tokens(&self, passkeys: &[Passkey], privileges: Privileges) -> Result<()> {
        let passkeys = passkeys.to_vec();

        self.run("issue_tokens", move |conn| {
            let now = now_millis();
            let tx = conn.transaction()?;
            {
                let mut stmt = tx.prepare(
                    "INSERT INTO passkeys (passkey, super_user, sudoer, created_at)
                     VALUES (?1, ?2, ?3, ?4)",
                )?;
                for passkey in &passkeys {
                    stmt.execute(params![
                        passkey.as_str(),
                        privileges.super_user,
                        privileges.sudoer,
                        now,
                    ])?;
                }
            }
            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn check_permission(&self, passkey: &Passkey) -> Result<Privileges> {
        let passkey = passkey.clone();

        self.run("check_permission", move |conn| {
            conn.query_row(
                "SELECT super_user, sudoer FROM passkeys
                 WHERE passkey = ?1
                 ORDER BY id DESC LIMIT 1",
                params![passkey.as_str()],
                |row| Ok(Privileges::new(row.get(0)?, row.get(1)?)),
            )
            .optional()?
            .ok_or_else(|| StoreError::NotFound("passkey is not registered".into()))
        })
        .await
    }

    async fn revoke(&self, passkey: &Passkey) -> Result<()> {
        let passkey = passkey.clone();

        self.run("revoke", move |conn| {
            let updated = conn.execute(
                "UPDATE passkeys SET super_user = 0, sudoer = 0 WHERE passkey = ?1",
                params![passkey.as_str()],
            )?;
            debug!(passkey = %passkey.fingerprint(), rows = updated, "revoked passkey");
            Ok(())
        })
        .await
    }

    async fn list_superusers(&self) -> Result<Vec<Passkey>> {
        self.run("list_superusers", |conn| {
            let mut stmt =
                conn.prepare("SELECT passkey FROM passkeys WHERE super_user = 1 ORDER BY id")?;
            let passkeys = stmt
                .query_map([], |row| row.get::<_, String>(0).map(Passkey::new))?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(passkeys)
        })
        .await
    }
}

#[async_trait]
impl KeyEscrow for SqliteStore {
    async fn store_keys(&self, pssh: &Pssh, keys: &[KeyEntry]) -> Result<()> {
        let pssh = pssh.clone();
        let encoded = serde_json::to_string(keys)
            .map_err(|e| StoreError::InvalidData(format!("encode keys: {}", e)))?;

        self.run("store_keys", move |conn| {
            conn.execute(
                "INSERT INTO escrowed_keys (pssh, keys, created_at) VALUES (?1, ?2, ?3)",
                params![pssh.as_str(), encoded, now_millis()],
            )?;
            Ok(())
        })
        .await
    }

    async fn fetch_keys(&self, pssh: &Pssh) -> Result<KeyRecord> {
        let pssh = pssh.clone();

        self.run("fetch_keys", move |conn| {
            let row: Option<(String, i64)> = conn
                .query_row(
                    "SELECT keys, created_at FROM escrowed_keys
                     WHERE pssh = ?1
                     ORDER BY id DESC LIMIT 1",
                    params![pssh.as_str()],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;

            let Some((encoded, created_at)) = row else {
                return Err(StoreError::NotFound("record not found".into()));
            };

            let keys: Vec<KeyEntry> = serde_json::from_str(&encoded)
                .map_err(|e| StoreError::InvalidData(format!("decode keys: {}", e)))?;

            Ok(KeyRecord {
                pssh,
                keys,
                created_at,
            })
        })
        .await
    }
}

#[async_trait]
impl RateCounter for SqliteStore {
    async fn hit(&self, bucket: &str, window_ms: i64, now: i64) -> Result<WindowState> {
        let bucket = bucket.to_string();

        self.run("rate_hit", move |conn| {
            // Column references on the right of SET read the pre-update row.
            let state = conn.query_row(
                "INSERT INTO rate_windows (bucket, hits, expires_at) VALUES (?1, 1, ?3)
                 ON CONFLICT(bucket) DO UPDATE SET
                    hits = CASE WHEN rate_windows.expires_at <= ?2
                                THEN 1 ELSE rate_windows.hits + 1 END,
                    expires_at = CASE WHEN rate_windows.expires_at <= ?2
                                      THEN ?3 ELSE rate_windows.expires_at END
                 RETURNING hits, expires_at",
                params![bucket, now, now + window_ms],
                |row| {
                    Ok(WindowState {
                        hits: row.get::<_, i64>(0)? as u64,
                        expires_at: row.get(1)?,
                    })
                },
            )?;
            Ok(state)
        })
        .await
    }

    async fn purge_expired(&self, now: i64) -> Result<u64> {
        self.run("rate_purge", move |conn| {
            let removed = conn.execute(
                "DELETE FROM rate_windows WHERE expires_at <= ?1",
                params![now],
            )?;
            Ok(removed as u64)
        })
        .await
    }
}
