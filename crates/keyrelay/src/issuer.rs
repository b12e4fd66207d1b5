//! Passkey issuance and revocation.

use std::sync::Arc;

use keyrelay_core::{generate_batch, require_field, validate_quantity, Passkey, Privileges};
use keyrelay_store::PermissionStore;
use tracing::info;

use crate::api::{RevokeRequest, TokenRequest};
use crate::error::Result;

/// Generates passkeys and manages their privilege rows.
pub struct PasskeyIssuer<S> {
    store: Arc<S>,
}

impl<S> Clone for PasskeyIssuer<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: PermissionStore> PasskeyIssuer<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Generate and register a batch of passkeys with the same privileges.
    ///
    /// The batch is registered in one transaction: either every passkey is
    /// usable or none is.
    pub async fn issue(&self, request: &TokenRequest) -> Result<Vec<Passkey>> {
        let quantity = validate_quantity(request.quantity)?;
        let privileges = Privileges::new(request.super_user, request.sudoer);

        let passkeys = generate_batch(quantity);
        self.store.issue_tokens(&passkeys, privileges).await?;

        info!(
            count = passkeys.len(),
            super_user = privileges.super_user,
            sudoer = privileges.sudoer,
            "issued passkeys"
        );
        Ok(passkeys)
    }

    /// Clear both privilege flags. Unknown passkeys succeed.
    pub async fn revoke(&self, request: &RevokeRequest) -> Result<Passkey> {
        let passkey = Passkey::new(require_field("token", request.token.as_deref())?);
        self.store.revoke(&passkey).await?;

        info!(passkey = %passkey.fingerprint(), "revoked passkey");
        Ok(passkey)
    }

    /// Every passkey currently holding the super-user flag.
    pub async fn superusers(&self) -> Result<Vec<Passkey>> {
        Ok(self.store.list_superusers().await?)
    }
}
