//! Test fixtures and helpers.
//!
//! Common setup code for integration tests.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, HeaderMap, Method, Request, StatusCode};
use axum::Router;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use keyrelay::{router, AppState};
use keyrelay_cdm::memory::StaticCdm;
use keyrelay_cdm::{KeyContainer, KeyType};
use keyrelay_core::{generate_passkey, Passkey, Privileges};
use keyrelay_gate::RateLimitConfig;
use keyrelay_store::{PermissionStore, SqliteStore};
use serde_json::{json, Value};
use tower::ServiceExt;

/// A Widevine PSSH box carrying a 16-byte key id.
pub const SAMPLE_PSSH: &str = "AAAAMnBzc2gAAAAA7e+LqXnWSs6jyCfc1R0h7QAAABISEAABAgMEBQYHCAkKCwwNDg8=";

/// The `Server` header the harness router sends.
pub const SERVER_NAME: &str = "keyrelay-test";

/// One signing key and two content keys.
pub fn sample_keys() -> Vec<KeyContainer> {
    vec![
        KeyContainer::new(KeyType::Signing, vec![0x5a; 4], vec![0xa5; 32]),
        KeyContainer::content(
            vec![0x00, 0x01, 0x02, 0x03],
            vec![0xde, 0xad, 0xbe, 0xef],
        ),
        KeyContainer::content(vec![0x0a, 0x0b], vec![0xc0, 0xff, 0xee]),
    ]
}

/// The full router over an in-memory database and a [`StaticCdm`].
///
/// A super-user passkey is registered at construction; everything else is
/// issued through it or through [`TestBroker::grant`].
pub struct TestBroker {
    store: Arc<SqliteStore>,
    cdm: StaticCdm,
    root: Passkey,
    app: Router,
}

impl TestBroker {
    /// Default rate limits and [`sample_keys`].
    pub async fn new() -> Self {
        Self::with_limits(RateLimitConfig::default()).await
    }

    pub async fn with_limits(limits: RateLimitConfig) -> Self {
        Self::with_cdm(StaticCdm::with_keys(sample_keys()), limits).await
    }

    pub async fn with_cdm(cdm: StaticCdm, limits: RateLimitConfig) -> Self {
        let store = Arc::new(SqliteStore::open_memory().expect("open in-memory database"));
        let root = generate_passkey();
        store
            .issue_token(&root, Privileges::super_user())
            .await
            .expect("register root passkey");

        let state = AppState::from_store(Arc::clone(&store), Arc::new(cdm.clone()), limits);
        let app = router(state, SERVER_NAME.parse().expect("valid header value"));

        Self {
            store,
            cdm,
            root,
            app,
        }
    }

    /// The super-user passkey registered at construction.
    pub fn root(&self) -> &Passkey {
        &self.root
    }

    pub fn store(&self) -> &Arc<SqliteStore> {
        &self.store
    }

    pub fn cdm(&self) -> &StaticCdm {
        &self.cdm
    }

    /// Register a fresh passkey directly in the store.
    pub async fn grant(&self, privileges: Privileges) -> Passkey {
        let passkey = generate_passkey();
        self.store
            .issue_token(&passkey, privileges)
            .await
            .expect("register passkey");
        passkey
    }

    pub async fn get(&self, uri: &str, passkey: Option<&Passkey>) -> TestResponse {
        self.send(request(Method::GET, uri, passkey, Body::empty()))
            .await
    }

    pub async fn post(&self, uri: &str, passkey: Option<&Passkey>, body: Value) -> TestResponse {
        self.post_raw(uri, passkey, body.to_string()).await
    }

    /// POST a body verbatim, for malformed-input cases.
    pub async fn post_raw(
        &self,
        uri: &str,
        passkey: Option<&Passkey>,
        body: impl Into<Body>,
    ) -> TestResponse {
        self.send(request(Method::POST, uri, passkey, body.into()))
            .await
    }

    pub async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self
            .app
            .clone()
            .oneshot(request)
            .await
            .expect("router is infallible");

        let status = response.status();
        let headers = response.headers().clone();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("read response body");
        let text = String::from_utf8_lossy(&bytes).into_owned();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);

        TestResponse {
            status,
            headers,
            body,
            text,
        }
    }
}

/// A `/v1/key` body the [`StaticCdm`] accepts for `pssh`.
pub fn key_request_body(pssh: &str) -> Value {
    let init_data = STANDARD.decode(pssh).expect("pssh is base64");
    json!({
        "pssh": pssh,
        "challenge": STANDARD.encode(StaticCdm::challenge_for(&init_data)),
        "license": STANDARD.encode(b"license-response"),
    })
}

fn request(method: Method, uri: &str, passkey: Option<&Passkey>, body: Body) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(passkey) = passkey {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", passkey.as_str()));
    }
    builder.body(body).expect("valid request")
}

/// A fully buffered response.
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    /// Parsed JSON, or `Null` when the body is not JSON.
    pub body: Value,
    pub text: String,
}

impl TestResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// The `error` field of an error body.
    pub fn error(&self) -> &str {
        self.body["error"].as_str().unwrap_or_default()
    }

    /// The `tokens` of a `/v1/token` response as passkeys.
    pub fn tokens(&self) -> Vec<Passkey> {
        self.body["tokens"]
            .as_array()
            .map(|tokens| {
                tokens
                    .iter()
                    .filter_map(Value::as_str)
                    .map(Passkey::new)
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_root_passkey_is_super_user() {
        let broker = TestBroker::new().await;
        assert_eq!(
            broker.store().check_permission(broker.root()).await.unwrap(),
            Privileges::super_user()
        );

        let response = broker.get("/v1/", Some(broker.root())).await;
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.header("server"), Some(SERVER_NAME));
    }

    #[test]
    fn test_key_request_body_matches_cdm() {
        let body = key_request_body(SAMPLE_PSSH);
        assert_eq!(body["pssh"], SAMPLE_PSSH);
        assert!(STANDARD.decode(body["challenge"].as_str().unwrap()).is_ok());
    }
}
