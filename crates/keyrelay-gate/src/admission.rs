//! The admission gate: privilege check followed by a rate check.

use std::sync::Arc;
use std::time::Duration;

use keyrelay_core::{now_millis, AuthorizationPolicy, Passkey, Privileges};
use keyrelay_store::{PermissionStore, RateCounter, StoreError};
use tracing::{debug, warn};

use crate::error::{GateError, Result};
use crate::limits::RateLimitConfig;

/// A request that passed the gate.
#[derive(Debug, Clone)]
pub struct Admission {
    /// The caller's passkey.
    pub passkey: Passkey,
    /// Privileges read from storage for this request.
    pub privileges: Privileges,
    /// Window ceiling.
    pub limit: u64,
    /// Requests left in the current window.
    pub remaining: u64,
    /// When the current window ends (Unix ms).
    pub reset_at: i64,
}

/// Validates passkeys against a privilege tier and enforces the per-passkey
/// request ceiling.
///
/// Permission and counter backends are separate handles so counters can be
/// moved off the application database.
pub struct AdmissionGate<P, C> {
    permissions: Arc<P>,
    counter: Arc<C>,
    limits: RateLimitConfig,
}

impl<P, C> Clone for AdmissionGate<P, C> {
    fn clone(&self) -> Self {
        Self {
            permissions: Arc::clone(&self.permissions),
            counter: Arc::clone(&self.counter),
            limits: self.limits,
        }
    }
}

impl<P: PermissionStore, C: RateCounter> AdmissionGate<P, C> {
    pub fn new(permissions: Arc<P>, counter: Arc<C>, limits: RateLimitConfig) -> Self {
        Self {
            permissions,
            counter,
            limits,
        }
    }

    pub fn limits(&self) -> &RateLimitConfig {
        &self.limits
    }

    /// Check `passkey` against `policy` without counting a hit.
    pub async fn authorize(
        &self,
        passkey: &Passkey,
        policy: AuthorizationPolicy,
    ) -> Result<Privileges> {
        if passkey.is_empty() {
            return Err(GateError::Unauthenticated);
        }

        let privileges = match self.permissions.check_permission(passkey).await {
            Ok(privileges) => privileges,
            Err(StoreError::NotFound(_)) => {
                debug!(passkey = %passkey.fingerprint(), "unknown passkey");
                return Err(GateError::Unauthenticated);
            }
            Err(e) => {
                warn!(passkey = %passkey.fingerprint(), error = %e, "permission lookup failed");
                return Err(GateError::Unauthenticated);
            }
        };

        if !policy.permits(&privileges) {
            debug!(passkey = %passkey.fingerprint(), %policy, "insufficient privileges");
            return Err(GateError::Forbidden { required: policy });
        }

        Ok(privileges)
    }

    /// Authorize and count one request at the current time.
    pub async fn admit(&self, passkey: &Passkey, policy: AuthorizationPolicy) -> Result<Admission> {
        self.admit_at(passkey, policy, now_millis()).await
    }

    /// Authorize and count one request at `now` (Unix ms).
    ///
    /// Only requests that pass authorization are counted. A request over the
    /// ceiling is still counted, so hammering a closed window keeps it closed
    /// until it expires and no longer.
    pub async fn admit_at(
        &self,
        passkey: &Passkey,
        policy: AuthorizationPolicy,
        now: i64,
    ) -> Result<Admission> {
        let privileges = self.authorize(passkey, policy).await?;

        let window = self
            .counter
            .hit(&passkey.fingerprint(), self.limits.window_ms(), now)
            .await?;

        let limit = self.limits.max_requests();
        if window.hits > limit {
            let retry_after = Duration::from_millis((window.expires_at - now).max(0) as u64);
            debug!(
                passkey = %passkey.fingerprint(),
                hits = window.hits,
                limit,
                "rate limit reached"
            );
            return Err(GateError::RateLimited { limit, retry_after });
        }

        Ok(Admission {
            passkey: passkey.clone(),
            privileges,
            limit,
            remaining: limit - window.hits,
            reset_at: window.expires_at,
        })
    }

    /// Drop expired rate windows. Returns how many were removed.
    pub async fn purge_expired(&self) -> Result<u64> {
        Ok(self.counter.purge_expired(now_millis()).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keyrelay_store::{MemoryStore, SqliteStore};

    const ALL_FLAGS: [(bool, bool); 4] = [(false, false), (false, true), (true, false), (true, true)];

    fn gate_with(store: Arc<MemoryStore>, max: u64, window_ms: u64) -> AdmissionGate<MemoryStore, MemoryStore> {
        let limits = RateLimitConfig::new(max, Duration::from_millis(window_ms)).unwrap();
        AdmissionGate::new(Arc::clone(&store), store, limits)
    }

    #[tokio::test]
    async fn test_tiers_for_every_flag_pair() {
        let store = Arc::new(MemoryStore::new());
        let gate = gate_with(Arc::clone(&store), 1_000, 60_000);

        for (i, (super_user, sudoer)) in ALL_FLAGS.into_iter().enumerate() {
            let passkey = Passkey::new(format!("FLAGS{}", i));
            store
                .issue_token(&passkey, Privileges::new(super_user, sudoer))
                .await
                .unwrap();

            let tier_a = gate
                .authorize(&passkey, AuthorizationPolicy::SuperUserOrSudoer)
                .await;
            let tier_b = gate.authorize(&passkey, AuthorizationPolicy::SuperUserOnly).await;

            assert_eq!(tier_a.is_ok(), super_user || sudoer);
            assert_eq!(tier_b.is_ok(), super_user);
            if !super_user {
                assert!(matches!(tier_b, Err(GateError::Forbidden { .. })));
            }
        }
    }

    #[tokio::test]
    async fn test_unknown_and_empty_passkeys_are_unauthenticated() {
        let store = Arc::new(MemoryStore::new());
        let gate = gate_with(store, 10, 60_000);

        for policy in [
            AuthorizationPolicy::SuperUserOrSudoer,
            AuthorizationPolicy::SuperUserOnly,
        ] {
            assert!(matches!(
                gate.authorize(&Passkey::new("UNKNOWN"), policy).await,
                Err(GateError::Unauthenticated)
            ));
            assert!(matches!(
                gate.authorize(&Passkey::new(""), policy).await,
                Err(GateError::Unauthenticated)
            ));
        }
    }

    #[tokio::test]
    async fn test_storage_failure_is_unauthenticated() {
        let store = Arc::new(SqliteStore::open_memory().unwrap());
        store.issue_token(&Passkey::new("ROOT"), Privileges::super_user()).await.unwrap();
        store.close().unwrap();

        let gate = AdmissionGate::new(Arc::clone(&store), store, RateLimitConfig::default());
        assert!(matches!(
            gate.authorize(&Passkey::new("ROOT"), AuthorizationPolicy::SuperUserOnly).await,
            Err(GateError::Unauthenticated)
        ));
    }

    #[tokio::test]
    async fn test_revocation_applies_to_next_request() {
        let store = Arc::new(MemoryStore::new());
        let gate = gate_with(Arc::clone(&store), 10, 60_000);
        let passkey = Passkey::new("SUDO");
        store.issue_token(&passkey, Privileges::sudoer()).await.unwrap();

        gate.admit_at(&passkey, AuthorizationPolicy::SuperUserOrSudoer, 0)
            .await
            .unwrap();
        store.revoke(&passkey).await.unwrap();

        assert!(matches!(
            gate.admit_at(&passkey, AuthorizationPolicy::SuperUserOrSudoer, 1).await,
            Err(GateError::Forbidden { .. })
        ));
    }

    #[tokio::test]
    async fn test_rate_limit_window() {
        let store = Arc::new(MemoryStore::new());
        let gate = gate_with(Arc::clone(&store), 3, 1_000);
        let passkey = Passkey::new("BUSY");
        store.issue_token(&passkey, Privileges::sudoer()).await.unwrap();
        let policy = AuthorizationPolicy::SuperUserOrSudoer;

        for (i, now) in [0, 10, 20].into_iter().enumerate() {
            let admission = gate.admit_at(&passkey, policy, now).await.unwrap();
            assert_eq!(admission.remaining, 2 - i as u64);
            assert_eq!(admission.reset_at, 1_000);
        }

        match gate.admit_at(&passkey, policy, 400).await {
            Err(GateError::RateLimited { limit, retry_after }) => {
                assert_eq!(limit, 3);
                assert_eq!(retry_after, Duration::from_millis(600));
            }
            other => panic!("expected rate limit, got {:?}", other),
        }

        // After the window elapses the passkey is admitted again
        let admission = gate.admit_at(&passkey, policy, 1_000).await.unwrap();
        assert_eq!(admission.remaining, 2);
        assert_eq!(admission.reset_at, 2_000);
    }

    #[tokio::test]
    async fn test_denied_requests_are_not_counted() {
        let store = Arc::new(MemoryStore::new());
        let gate = gate_with(Arc::clone(&store), 2, 60_000);
        let passkey = Passkey::new("SUDO");
        store.issue_token(&passkey, Privileges::sudoer()).await.unwrap();

        for now in 0..5 {
            assert!(gate
                .admit_at(&passkey, AuthorizationPolicy::SuperUserOnly, now)
                .await
                .is_err());
        }

        let policy = AuthorizationPolicy::SuperUserOrSudoer;
        gate.admit_at(&passkey, policy, 10).await.unwrap();
        gate.admit_at(&passkey, policy, 11).await.unwrap();
        assert!(matches!(
            gate.admit_at(&passkey, policy, 12).await,
            Err(GateError::RateLimited { .. })
        ));
    }

    #[tokio::test]
    async fn test_passkeys_have_separate_windows() {
        let store = Arc::new(MemoryStore::new());
        let gate = gate_with(Arc::clone(&store), 1, 60_000);
        let a = Passkey::new("A");
        let b = Passkey::new("B");
        store.issue_tokens(&[a.clone(), b.clone()], Privileges::sudoer()).await.unwrap();
        let policy = AuthorizationPolicy::SuperUserOrSudoer;

        gate.admit_at(&a, policy, 0).await.unwrap();
        assert!(gate.admit_at(&a, policy, 1).await.is_err());
        gate.admit_at(&b, policy, 1).await.unwrap();
    }

    #[tokio::test]
    async fn test_counter_survives_restart() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gate.db");
        let passkey = Passkey::new("PERSIST");
        let policy = AuthorizationPolicy::SuperUserOrSudoer;
        let limits = RateLimitConfig::new(2, Duration::from_secs(60)).unwrap();

        {
            let store = Arc::new(SqliteStore::open(&path).unwrap());
            store.issue_token(&passkey, Privileges::sudoer()).await.unwrap();
            let gate = AdmissionGate::new(Arc::clone(&store), Arc::clone(&store), limits);
            gate.admit_at(&passkey, policy, 1_000).await.unwrap();
            gate.admit_at(&passkey, policy, 1_001).await.unwrap();
            store.close().unwrap();
        }

        let store = Arc::new(SqliteStore::open(&path).unwrap());
        let gate = AdmissionGate::new(Arc::clone(&store), store, limits);
        assert!(matches!(
            gate.admit_at(&passkey, policy, 1_002).await,
            Err(GateError::RateLimited { .. })
        ));
    }
}
