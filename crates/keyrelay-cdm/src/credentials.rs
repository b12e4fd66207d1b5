//! Device credentials shared by every CDM session.

use std::fmt;
use std::path::Path;

use bytes::Bytes;
use tracing::info;
use zeroize::Zeroizing;

use crate::error::{CdmError, Result};

/// Client identity blob and device private key.
///
/// Read once at startup. The private key is wiped from memory on drop and
/// never appears in `Debug` output.
#[derive(Clone)]
pub struct DeviceCredentials {
    client_id: Bytes,
    private_key: Zeroizing<Vec<u8>>,
}

impl DeviceCredentials {
    pub fn new(client_id: impl Into<Bytes>, private_key: Vec<u8>) -> Result<Self> {
        let client_id = client_id.into();
        if client_id.is_empty() {
            return Err(CdmError::EmptyCredential("client id"));
        }
        if private_key.is_empty() {
            return Err(CdmError::EmptyCredential("private key"));
        }
        Ok(Self {
            client_id,
            private_key: Zeroizing::new(private_key),
        })
    }

    /// Read both credential files.
    pub fn load(client_id_path: impl AsRef<Path>, private_key_path: impl AsRef<Path>) -> Result<Self> {
        let client_id = read("client id", client_id_path.as_ref())?;
        let private_key = read("private key", private_key_path.as_ref())?;
        let credentials = Self::new(client_id, private_key)?;

        info!(
            client_id_len = credentials.client_id.len(),
            "loaded device credentials"
        );
        Ok(credentials)
    }

    pub fn client_id(&self) -> &[u8] {
        &self.client_id
    }

    pub fn private_key(&self) -> &[u8] {
        &self.private_key
    }
}

fn read(what: &'static str, path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).map_err(|source| CdmError::CredentialIo {
        what,
        path: path.to_path_buf(),
        source,
    })
}

impl fmt::Debug for DeviceCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceCredentials")
            .field("client_id_len", &self.client_id.len())
            .field("private_key", &"<redacted>")
            .finish()
    }
}
