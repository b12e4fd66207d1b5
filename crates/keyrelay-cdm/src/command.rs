//! A CDM engine that runs an external helper program.
//!
//! One process per call. The request goes to the helper's stdin as a single
//! JSON object and the answer is read from its stdout; binary fields are
//! standard base64 in both directions.
//!
//! ```text
//! -> {"op":"challenge","client_id":"..","private_key":"..","init_data":".."}
//! <- {"challenge":".."}
//!
//! -> {"op":"decrypt", ..., "challenge":"..","license":".."}
//! <- {"keys":[{"type":"CONTENT","kid":"..","key":".."}]}
//! ```
//!
//! A helper may answer `{"error":"..."}` to reject a request; that is
//! reported as [`CdmError::Session`].

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, warn};
use zeroize::Zeroizing;

use crate::credentials::DeviceCredentials;
use crate::engine::{CdmEngine, CdmSession};
use crate::error::{CdmError, Result};
use crate::types::{KeyContainer, KeyType};

/// Default bound on one helper invocation.
pub const DEFAULT_HELPER_TIMEOUT: Duration = Duration::from_secs(10);

/// Longest stderr excerpt carried in [`CdmError::Exit`].
const STDERR_EXCERPT: usize = 512;

/// Engine backed by an external helper program.
#[derive(Clone)]
pub struct CommandCdm {
    helper: Arc<Helper>,
}

struct Helper {
    program: PathBuf,
    args: Vec<String>,
    credentials: DeviceCredentials,
    timeout: Duration,
}

impl CommandCdm {
    pub fn new(program: impl Into<PathBuf>, credentials: DeviceCredentials) -> Self {
        Self::with_options(program, Vec::new(), credentials, DEFAULT_HELPER_TIMEOUT)
    }

    /// `args` are passed before anything else on every invocation.
    pub fn with_options(
        program: impl Into<PathBuf>,
        args: Vec<String>,
        credentials: DeviceCredentials,
        timeout: Duration,
    ) -> Self {
        Self {
            helper: Arc::new(Helper {
                program: program.into(),
                args,
                credentials,
                timeout,
            }),
        }
    }

    pub fn program(&self) -> &Path {
        &self.helper.program
    }
}

#[async_trait]
impl CdmEngine for CommandCdm {
    async fn open(&self, init_data: &[u8]) -> Result<Box<dyn CdmSession>> {
        if init_data.is_empty() {
            return Err(CdmError::InvalidInitData("pssh decodes to no bytes".into()));
        }
        Ok(Box::new(CommandSession {
            helper: Arc::clone(&self.helper),
            init_data: Bytes::copy_from_slice(init_data),
        }))
    }
}

struct CommandSession {
    helper: Arc<Helper>,
    init_data: Bytes,
}

#[async_trait]
impl CdmSession for CommandSession {
    async fn license_request(&self) -> Result<Bytes> {
        let response = self
            .helper
            .call("challenge", &self.init_data, None)
            .await?;
        let challenge = response
            .challenge
            .ok_or_else(|| CdmError::Protocol("response has no challenge".into()))?;
        decode("challenge", &challenge)
    }

    async fn decrypt_license(&self, challenge: &[u8], license: &[u8]) -> Result<Vec<KeyContainer>> {
        let response = self
            .helper
            .call("decrypt", &self.init_data, Some((challenge, license)))
            .await?;
        let keys = response
            .keys
            .ok_or_else(|| CdmError::Protocol("response has no keys".into()))?;

        keys.into_iter()
            .map(|k| {
                Ok(KeyContainer::new(
                    k.kind,
                    decode("kid", &k.kid)?,
                    decode("key", &k.key)?,
                ))
            })
            .collect()
    }
}

#[derive(Serialize)]
struct HelperRequest<'a> {
    op: &'static str,
    client_id: &'a str,
    private_key: &'a str,
    init_data: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    challenge: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    license: Option<&'a str>,
}

#[derive(Deserialize)]
struct HelperResponse {
    #[serde(default)]
    challenge: Option<String>,
    #[serde(default)]
    keys: Option<Vec<WireKey>>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Deserialize)]
struct WireKey {
    #[serde(rename = "type")]
    kind: KeyType,
    kid: String,
    key: String,
}

impl Helper {
    async fn call(
        &self,
        op: &'static str,
        init_data: &[u8],
        exchange: Option<(&[u8], &[u8])>,
    ) -> Result<HelperResponse> {
        let client_id = STANDARD.encode(self.credentials.client_id());
        let private_key = Zeroizing::new(STANDARD.encode(self.credentials.private_key()));
        let init_data = STANDARD.encode(init_data);
        let (challenge, license) = match exchange {
            Some((c, l)) => (Some(STANDARD.encode(c)), Some(STANDARD.encode(l))),
            None => (None, None),
        };

        let request = HelperRequest {
            op,
            client_id: &client_id,
            private_key: &private_key,
            init_data: &init_data,
            challenge: challenge.as_deref(),
            license: license.as_deref(),
        };
        let body = Zeroizing::new(
            serde_json::to_vec(&request).map_err(|e| CdmError::Protocol(e.to_string()))?,
        );

        debug!(op, program = %self.program.display(), "invoking cdm helper");

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                CdmError::Process(format!("failed to spawn {}: {}", self.program.display(), e))
            })?;

        let run = async move {
            if let Some(mut stdin) = child.stdin.take() {
                match stdin.write_all(&body).await {
                    Ok(()) => {}
                    // The helper may exit without reading; its status tells the story.
                    Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => {
                        debug!("cdm helper closed stdin early");
                    }
                    Err(e) => return Err(CdmError::Process(format!("failed to write request: {}", e))),
                }
            }
            child
                .wait_with_output()
                .await
                .map_err(|e| CdmError::Process(format!("failed to wait for helper: {}", e)))
        };

        let output = match timeout(self.timeout, run).await {
            Ok(output) => output?,
            Err(_) => {
                let after_ms = self.timeout.as_millis() as u64;
                warn!(op, after_ms, "cdm helper timed out");
                return Err(CdmError::Timeout { after_ms });
            }
        };

        if !output.status.success() {
            let stderr: String = String::from_utf8_lossy(&output.stderr)
                .trim()
                .chars()
                .take(STDERR_EXCERPT)
                .collect();
            return Err(CdmError::Exit {
                code: output.status.code().unwrap_or(-1),
                stderr,
            });
        }

        let response: HelperResponse = serde_json::from_slice(&output.stdout)
            .map_err(|e| CdmError::Protocol(e.to_string()))?;
        if let Some(message) = response.error {
            return Err(CdmError::Session(message));
        }
        Ok(response)
    }
}

fn decode(field: &str, value: &str) -> Result<Bytes> {
    STANDARD
        .decode(value)
        .map(Bytes::from)
        .map_err(|e| CdmError::Protocol(format!("{} is not base64: {}", field, e)))
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn credentials() -> DeviceCredentials {
        DeviceCredentials::new(&b"client"[..], b"secret".to_vec()).unwrap()
    }

    fn shell(script: &str) -> CommandCdm {
        shell_with_timeout(script, Duration::from_secs(5))
    }

    fn shell_with_timeout(script: &str, timeout: Duration) -> CommandCdm {
        CommandCdm::with_options(
            "sh",
            vec!["-c".to_string(), script.to_string()],
            credentials(),
            timeout,
        )
    }

    #[tokio::test]
    async fn test_challenge() {
        let cdm = shell(r#"cat >/dev/null; printf '{"challenge":"AAEC"}'"#);
        let session = cdm.open(b"pssh").await.unwrap();
        assert_eq!(session.license_request().await.unwrap(), Bytes::from_static(&[0, 1, 2]));
    }

    #[tokio::test]
    async fn test_request_reaches_helper() {
        let dir = tempfile::tempdir().unwrap();
        let captured = dir.path().join("request.json");
        let script = format!(
            r#"cat > '{}'; printf '{{"challenge":"AA=="}}'"#,
            captured.display()
        );
        let cdm = shell(&script);
        cdm.open(b"init").await.unwrap().license_request().await.unwrap();

        let request: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&captured).unwrap()).unwrap();
        assert_eq!(request["op"], "challenge");
        assert_eq!(request["init_data"], STANDARD.encode(b"init"));
        assert_eq!(request["client_id"], STANDARD.encode(b"client"));
        assert_eq!(request["private_key"], STANDARD.encode(b"secret"));
        assert!(request.get("license").is_none());
    }

    #[tokio::test]
    async fn test_decrypt_license() {
        let cdm = shell(
            r#"cat >/dev/null; printf '{"keys":[{"type":"SIGNING","kid":"AQ==","key":"Ag=="},{"type":"CONTENT","kid":"qg==","key":"uw=="}]}'"#,
        );
        let session = cdm.open(b"pssh").await.unwrap();
        let keys = session.decrypt_license(b"challenge", b"license").await.unwrap();

        assert_eq!(keys.len(), 2);
        assert_eq!(keys[0].kind, KeyType::Signing);
        assert_eq!(keys[1], KeyContainer::content(vec![0xAA], vec![0xBB]));
    }

    #[tokio::test]
    async fn test_helper_error_field() {
        let cdm = shell(r#"cat >/dev/null; printf '{"error":"license signature mismatch"}'"#);
        let session = cdm.open(b"pssh").await.unwrap();
        match session.decrypt_license(b"c", b"l").await {
            Err(CdmError::Session(message)) => assert_eq!(message, "license signature mismatch"),
            other => panic!("expected session error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_nonzero_exit() {
        let cdm = shell("echo boom >&2; exit 3");
        let session = cdm.open(b"pssh").await.unwrap();
        match session.license_request().await {
            Err(CdmError::Exit { code, stderr }) => {
                assert_eq!(code, 3);
                assert_eq!(stderr, "boom");
            }
            other => panic!("expected exit error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_malformed_output() {
        let cdm = shell("cat >/dev/null; echo not-json");
        let session = cdm.open(b"pssh").await.unwrap();
        assert!(matches!(session.license_request().await, Err(CdmError::Protocol(_))));

        let cdm = shell(r#"cat >/dev/null; printf '{"challenge":"***"}'"#);
        let session = cdm.open(b"pssh").await.unwrap();
        assert!(matches!(session.license_request().await, Err(CdmError::Protocol(_))));
    }

    #[tokio::test]
    async fn test_timeout() {
        let cdm = shell_with_timeout("sleep 5", Duration::from_millis(100));
        let session = cdm.open(b"pssh").await.unwrap();
        assert!(matches!(
            session.license_request().await,
            Err(CdmError::Timeout { after_ms: 100 })
        ));
    }

    #[tokio::test]
    async fn test_missing_program() {
        let cdm = CommandCdm::new("/nonexistent/keyrelay-cdm-helper", credentials());
        let session = cdm.open(b"pssh").await.unwrap();
        assert!(matches!(session.license_request().await, Err(CdmError::Process(_))));
    }

    #[tokio::test]
    async fn test_empty_init_data() {
        let cdm = shell("true");
        assert!(matches!(cdm.open(b"").await, Err(CdmError::InvalidInitData(_))));
    }
}
