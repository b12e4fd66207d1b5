//! In-memory implementation of the store traits.
//!
//! This is primarily for testing. It has the same semantics as SQLite
//! but keeps everything in memory with no persistence.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use keyrelay_core::{now_millis, KeyEntry, KeyRecord, Passkey, Privileges, Pssh};

use crate::error::{Result, StoreError};
use crate::traits::{KeyEscrow, PermissionStore, RateCounter, WindowState};

/// In-memory store implementation.
///
/// All data is lost when the store is dropped. Thread-safe via RwLock.
pub struct MemoryStore {
    inner: RwLock<MemoryStoreInner>,
}

#[derive(Default)]
struct MemoryStoreInner {
    /// Passkey rows in insertion order.
    passkeys: Vec<(Passkey, Privileges)>,

    /// Escrow records in insertion order.
    escrow: Vec<KeyRecord>,

    /// Rate windows by bucket.
    windows: HashMap<String, WindowState>,
}

impl MemoryStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(MemoryStoreInner::default()),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, MemoryStoreInner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, MemoryStoreInner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PermissionStore for MemoryStore {
    async fn issue_token(&self, passkey: &Passkey, privileges: Privileges) -> Result<()> {
        self.write().passkeys.push((passkey.clone(), privileges));
        Ok(())
    }

    async fn issue_tokens(&self, passkeys: &[Passkey], privileges: Privileges) -> Result<()> {
        let mut inner = self.write();
        inner
            .passkeys
            .extend(passkeys.iter().map(|p| (p.clone(), privileges)));
        Ok(())
    }

    async fn check_permission(&self, passkey: &Passkey) -> Result<Privileges> {
        self.read()
            .passkeys
            .iter()
            .rev()
            .find(|(p, _)| p == passkey)
            .map(|(_, privileges)| *privileges)
            .ok_or_else(|| StoreError::NotFound("passkey is not registered".into()))
    }

    async fn revoke(&self, passkey: &Passkey) -> Result<()> {
        for (p, privileges) in self.write().passkeys.iter_mut() {
            if p == passkey {
                *privileges = Privileges::NONE;
            }
        }
        Ok(())
    }

    async fn list_superusers(&self) -> Result<Vec<Passkey>> {
        Ok(self
            .read()
            .passkeys
            .iter()
            .filter(|(_, privileges)| privileges.super_user)
            .map(|(p, _)| p.clone())
            .collect())
    }
}

#[async_trait]
impl KeyEscrow for MemoryStore {
    async fn store_keys(&self, pssh: &Pssh, keys: &[KeyEntry]) -> Result<()> {
        self.write().escrow.push(KeyRecord {
            pssh: pssh.clone(),
            keys: keys.to_vec(),
            created_at: now_millis(),
        });
        Ok(())
    }

    async fn fetch_keys(&self, pssh: &Pssh) -> Result<KeyRecord> {
        self.read()
            .escrow
            .iter()
            .rev()
            .find(|record| &record.pssh == pssh)
            .cloned()
            .ok_or_else(|| StoreError::NotFound("record not found".into()))
    }
}

#[async_trait]
impl RateCounter for MemoryStore {
    async fn hit(&self, bucket: &str, window_ms: i64, now: i64) -> Result<WindowState> {
        let mut inner = self.write();
        let state = inner
            .windows
            .entry(bucket.to_string())
            .and_modify(|w| {
                if w.expires_at <= now {
                    *w = WindowState {
                        hits: 1,
                        expires_at: now + window_ms,
                    };
                } else {
                    w.hits += 1;
                }
            })
            .or_insert(WindowState {
                hits: 1,
                expires_at: now + window_ms,
            });
        Ok(*state)
    }

    async fn purge_expired(&self, now: i64) -> Result<u64> {
        let mut inner = self.write();
        let before = inner.windows.len();
        inner.windows.retain(|_, w| w.expires_at > now);
        Ok((before - inner.windows.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_permissions() {
        let store = MemoryStore::new();
        let passkey = Passkey::new("MEM");

        assert!(store.check_permission(&passkey).await.unwrap_err().is_not_found());

        store.issue_token(&passkey, Privileges::sudoer()).await.unwrap();
        assert_eq!(
            store.check_permission(&passkey).await.unwrap(),
            Privileges::sudoer()
        );

        store.revoke(&passkey).await.unwrap();
        assert_eq!(store.check_permission(&passkey).await.unwrap(), Privileges::NONE);
        store.revoke(&Passkey::new("UNKNOWN")).await.unwrap();
    }

    #[tokio::test]
    async fn test_memory_escrow_newest_wins() {
        let store = MemoryStore::new();
        let pssh = Pssh::new("p");
        store.store_keys(&pssh, &[KeyEntry::new("1", "a")]).await.unwrap();
        store.store_keys(&pssh, &[KeyEntry::new("1", "b")]).await.unwrap();

        let record = store.fetch_keys(&pssh).await.unwrap();
        assert_eq!(record.keys, vec![KeyEntry::new("1", "b")]);
        assert!(store.fetch_keys(&Pssh::new("q")).await.is_err());
    }

    #[tokio::test]
    async fn test_memory_rate_window() {
        let store = MemoryStore::new();
        assert_eq!(store.hit("b", 100, 0).await.unwrap().hits, 1);
        assert_eq!(store.hit("b", 100, 50).await.unwrap().hits, 2);
        assert_eq!(store.hit("b", 100, 100).await.unwrap().hits, 1);
        assert_eq!(store.purge_expired(500).await.unwrap(), 1);
    }
}
