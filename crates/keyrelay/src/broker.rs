//! The broker: challenge, key-extraction and escrow-lookup flows.
//!
//! No state is carried between calls. The two license flows are correlated
//! only by the PSSH the caller sends; every lookup and write goes straight
//! to the store.

use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use keyrelay_cdm::{CdmEngine, CdmSession, KeyContainer};
use keyrelay_core::{
    decode_base64, now_millis, require_field, KeyEntry, KeyRecord, Pssh,
};
use keyrelay_store::KeyEscrow;
use tracing::{debug, error, info, warn};

use crate::api::{ChallengeResponse, KeyRequest, KeyResponse, PsshRequest};
use crate::error::{BrokerError, Result};

/// Orchestrates the license flows.
///
/// The store is shared with the admission gate and the passkey issuer; the
/// broker only needs its escrow half.
pub struct Broker<S, E> {
    store: Arc<S>,
    cdm: Arc<E>,
}

impl<S, E> Clone for Broker<S, E> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            cdm: Arc::clone(&self.cdm),
        }
    }
}

impl<S: KeyEscrow, E: CdmEngine> Broker<S, E> {
    pub fn new(store: Arc<S>, cdm: Arc<E>) -> Self {
        Self { store, cdm }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Produce a license challenge for a PSSH.
    pub async fn challenge(&self, request: &PsshRequest) -> Result<ChallengeResponse> {
        let pssh = Pssh::new(require_field("pssh", request.pssh.as_deref())?);
        let session = self.open_session(&pssh).await?;

        let challenge = session.license_request().await?;
        debug!(pssh = ?pssh, len = challenge.len(), "issued challenge");

        Ok(ChallengeResponse {
            challenge: STANDARD.encode(&challenge),
            pssh: pssh.into_inner(),
        })
    }

    /// Decrypt a license and escrow its content keys.
    ///
    /// A license without content keys still succeeds and escrows an empty
    /// set. A failed escrow write is logged and does not fail the call: the
    /// caller still gets the keys.
    pub async fn extract_keys(&self, request: &KeyRequest) -> Result<KeyResponse> {
        let pssh = Pssh::new(require_field("pssh", request.pssh.as_deref())?);
        let challenge = require_field("challenge", request.challenge.as_deref())?;
        let license = require_field("license", request.license.as_deref())?;

        let session = self.open_session(&pssh).await?;
        let challenge = decode_base64("challenge", challenge)?;
        let license = decode_base64("license", license)?;

        let containers = session.decrypt_license(&challenge, &license).await?;
        let keys = content_keys(&containers);
        if keys.is_empty() {
            warn!(
                pssh = ?pssh,
                containers = containers.len(),
                "license yielded no content keys"
            );
        }

        if let Err(e) = self.store.store_keys(&pssh, &keys).await {
            error!(pssh = ?pssh, error = %e, "failed to escrow keys");
        } else {
            info!(pssh = ?pssh, count = keys.len(), "escrowed keys");
        }

        Ok(KeyRecord {
            pssh,
            keys,
            created_at: now_millis(),
        }
        .into())
    }

    /// Look up previously escrowed keys. Never touches the CDM.
    pub async fn escrowed_keys(&self, request: &PsshRequest) -> Result<KeyResponse> {
        let pssh = Pssh::new(require_field("pssh", request.pssh.as_deref())?);

        match self.store.fetch_keys(&pssh).await {
            Ok(record) => Ok(record.into()),
            Err(e) if e.is_not_found() => Err(BrokerError::NotFound("record not found".into())),
            Err(e) => Err(e.into()),
        }
    }

    async fn open_session(&self, pssh: &Pssh) -> Result<Box<dyn CdmSession>> {
        let init_data = pssh.decode()?;
        Ok(self.cdm.open(&init_data).await?)
    }
}

/// Keep content keys only, rendered as hex.
fn content_keys(containers: &[KeyContainer]) -> Vec<KeyEntry> {
    containers
        .iter()
        .filter(|c| c.kind.is_content())
        .map(|c| KeyEntry::from_raw(&c.kid, &c.key))
        .collect()
}
