//! Engine and session traits.
//!
//! Implementations may run the CDM in-process, in a helper process or on a
//! remote device. The broker only ever sees these two traits.

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::Result;
use crate::types::KeyContainer;

/// Builds sessions bound to the process-wide device credentials.
///
/// Implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait CdmEngine: Send + Sync {
    /// Open a session for the raw PSSH bytes.
    ///
    /// Cheap for well-behaved engines; sessions are opened per request.
    async fn open(&self, init_data: &[u8]) -> Result<Box<dyn CdmSession>>;
}

/// A session bound to one PSSH.
#[async_trait]
pub trait CdmSession: Send + Sync {
    /// Produce the license request ("challenge") for this PSSH.
    async fn license_request(&self) -> Result<Bytes>;

    /// Decrypt a license server response.
    ///
    /// `challenge` is the request the response answers.
    async fn decrypt_license(&self, challenge: &[u8], license: &[u8]) -> Result<Vec<KeyContainer>>;
}
