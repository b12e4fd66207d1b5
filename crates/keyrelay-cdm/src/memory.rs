//! A deterministic in-process engine for testing.
//!
//! The challenge for a PSSH is `b"challenge:"` followed by the init data, so
//! tests can compute it up front. Decryption checks that the caller echoes
//! that challenge back and then returns the configured containers.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::{BufMut, Bytes, BytesMut};

use crate::engine::{CdmEngine, CdmSession};
use crate::error::{CdmError, Result};
use crate::types::KeyContainer;

const CHALLENGE_PREFIX: &[u8] = b"challenge:";

/// In-memory engine returning canned key containers.
#[derive(Clone, Default)]
pub struct StaticCdm {
    inner: Arc<StaticInner>,
}

#[derive(Default)]
struct StaticInner {
    keys: Vec<KeyContainer>,
    failure: Option<String>,
    opened: AtomicUsize,
}

impl StaticCdm {
    /// Every license decrypts to `keys`.
    pub fn with_keys(keys: Vec<KeyContainer>) -> Self {
        Self {
            inner: Arc::new(StaticInner {
                keys,
                ..Default::default()
            }),
        }
    }

    /// Every session fails to open with `message`.
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(StaticInner {
                failure: Some(message.into()),
                ..Default::default()
            }),
        }
    }

    /// The challenge this engine produces for `init_data`.
    pub fn challenge_for(init_data: &[u8]) -> Bytes {
        let mut buf = BytesMut::with_capacity(CHALLENGE_PREFIX.len() + init_data.len());
        buf.put_slice(CHALLENGE_PREFIX);
        buf.put_slice(init_data);
        buf.freeze()
    }

    /// Number of sessions opened so far, failed ones included.
    pub fn sessions_opened(&self) -> usize {
        self.inner.opened.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CdmEngine for StaticCdm {
    async fn open(&self, init_data: &[u8]) -> Result<Box<dyn CdmSession>> {
        self.inner.opened.fetch_add(1, Ordering::SeqCst);

        if let Some(message) = &self.inner.failure {
            return Err(CdmError::Session(message.clone()));
        }
        if init_data.is_empty() {
            return Err(CdmError::InvalidInitData("pssh decodes to no bytes".into()));
        }

        Ok(Box::new(StaticSession {
            challenge: Self::challenge_for(init_data),
            keys: self.inner.keys.clone(),
        }))
    }
}

struct StaticSession {
    challenge: Bytes,
    keys: Vec<KeyContainer>,
}

#[async_trait]
impl CdmSession for StaticSession {
    async fn license_request(&self) -> Result<Bytes> {
        Ok(self.challenge.clone())
    }

    async fn decrypt_license(&self, challenge: &[u8], license: &[u8]) -> Result<Vec<KeyContainer>> {
        if challenge != &self.challenge[..] {
            return Err(CdmError::Session("license does not answer this challenge".into()));
        }
        if license.is_empty() {
            return Err(CdmError::Session("empty license".into()));
        }
        Ok(self.keys.clone())
    }
}
