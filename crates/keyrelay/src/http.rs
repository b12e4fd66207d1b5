//! HTTP surface for the broker.
//!
//! Every route under `/v1` passes the admission gate first. The passkey is
//! read from `Authorization: Bearer`, falling back to the `passkey` query
//! parameter.

use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::{FromRequest, Query, Request, State};
use axum::http::{header, HeaderName, HeaderValue, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use bytes::Bytes;
use keyrelay_cdm::CdmEngine;
use keyrelay_core::{AuthorizationPolicy, Passkey, ValidationError};
use keyrelay_gate::{retry_after_secs, Admission, AdmissionGate, RateLimitConfig};
use keyrelay_store::{KeyEscrow, PermissionStore, RateCounter};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info};

use crate::api::{
    ChallengeResponse, ErrorBody, KeyRequest, KeyResponse, PsshRequest, RevokeRequest,
    RevokeResponse, TokenRequest, TokenResponse,
};
use crate::broker::Broker;
use crate::error::BrokerError;
use crate::issuer::PasskeyIssuer;

pub const X_RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
pub const X_RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");

/// A store that backs the whole service: passkeys, escrow and counters.
pub trait Backend: PermissionStore + KeyEscrow + RateCounter + 'static {}

impl<T> Backend for T where T: PermissionStore + KeyEscrow + RateCounter + 'static {}

/// Shared handler state.
pub struct AppState<S, E> {
    broker: Broker<S, E>,
    issuer: PasskeyIssuer<S>,
    gate: AdmissionGate<S, S>,
}

impl<S, E> Clone for AppState<S, E> {
    fn clone(&self) -> Self {
        Self {
            broker: self.broker.clone(),
            issuer: self.issuer.clone(),
            gate: self.gate.clone(),
        }
    }
}

impl<S: Backend, E: CdmEngine + 'static> AppState<S, E> {
    pub fn new(broker: Broker<S, E>, issuer: PasskeyIssuer<S>, gate: AdmissionGate<S, S>) -> Self {
        Self {
            broker,
            issuer,
            gate,
        }
    }

    /// One store behind the gate, the broker and the issuer.
    pub fn from_store(store: Arc<S>, cdm: Arc<E>, limits: RateLimitConfig) -> Self {
        let gate = AdmissionGate::new(Arc::clone(&store), Arc::clone(&store), limits);
        let issuer = PasskeyIssuer::new(Arc::clone(&store));
        Self::new(Broker::new(store, cdm), issuer, gate)
    }

    pub fn broker(&self) -> &Broker<S, E> {
        &self.broker
    }

    pub fn issuer(&self) -> &PasskeyIssuer<S> {
        &self.issuer
    }

    pub fn gate(&self) -> &AdmissionGate<S, S> {
        &self.gate
    }
}

/// Build the router. `server_name` is sent as the `Server` header on every
/// response.
pub fn router<S: Backend, E: CdmEngine + 'static>(
    state: AppState<S, E>,
    server_name: HeaderValue,
) -> Router {
    let tier_a = Router::new()
        .route("/v1", get(hello))
        .route("/v1/", get(hello))
        .route("/v1/challenge", post(challenge::<S, E>))
        .route("/v1/key", post(extract_keys::<S, E>))
        .route("/v1/escrow-key", post(escrowed_keys::<S, E>))
        .route_layer(middleware::from_fn_with_state(
            (state.clone(), AuthorizationPolicy::SuperUserOrSudoer),
            admit::<S, E>,
        ));

    let tier_b = Router::new()
        .route("/v1/token", post(issue_passkeys::<S, E>))
        .route("/v1/revoke", post(revoke::<S, E>))
        .route_layer(middleware::from_fn_with_state(
            (state.clone(), AuthorizationPolicy::SuperUserOnly),
            admit::<S, E>,
        ));

    Router::new()
        .route("/healthz", get(healthz))
        .merge(tier_a)
        .merge(tier_b)
        .layer(TraceLayer::new_for_http())
        .layer(SetResponseHeaderLayer::overriding(header::SERVER, server_name))
        .with_state(state)
}

// ─────────────────────────────────────────────────────────────────────────────
// Admission
// ─────────────────────────────────────────────────────────────────────────────

async fn admit<S: Backend, E: CdmEngine + 'static>(
    State((state, policy)): State<(AppState<S, E>, AuthorizationPolicy)>,
    mut request: Request,
    next: Next,
) -> Response {
    let Some(passkey) = request_passkey(&request) else {
        debug!(path = %request.uri().path(), "request without passkey");
        return BrokerError::Unauthenticated.into_response();
    };

    let admission = match state.gate.admit(&passkey, policy).await {
        Ok(admission) => admission,
        Err(e) => return BrokerError::from(e).into_response(),
    };

    let limit = HeaderValue::from(admission.limit);
    let remaining = HeaderValue::from(admission.remaining);
    request.extensions_mut().insert(admission);

    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert(X_RATELIMIT_LIMIT, limit);
    headers.insert(X_RATELIMIT_REMAINING, remaining);
    response
}

#[derive(Deserialize)]
struct PasskeyQuery {
    passkey: Option<String>,
}

fn request_passkey(request: &Request) -> Option<Passkey> {
    bearer_token(request).or_else(|| {
        let Query(query) = Query::<PasskeyQuery>::try_from_uri(request.uri()).ok()?;
        query
            .passkey
            .filter(|p| !p.trim().is_empty())
            .map(Passkey::new)
    })
}

fn bearer_token(request: &Request) -> Option<Passkey> {
    let raw = request.headers().get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = raw.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    if token.is_empty() {
        return None;
    }
    Some(Passkey::new(token))
}

// ─────────────────────────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────────────────────────

async fn healthz() -> &'static str {
    "ok"
}

async fn hello() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "hello": "world" }))
}

async fn challenge<S: Backend, E: CdmEngine + 'static>(
    State(state): State<AppState<S, E>>,
    JsonBody(request): JsonBody<PsshRequest>,
) -> Result<Json<ChallengeResponse>, BrokerError> {
    Ok(Json(state.broker.challenge(&request).await?))
}

async fn extract_keys<S: Backend, E: CdmEngine + 'static>(
    State(state): State<AppState<S, E>>,
    JsonBody(request): JsonBody<KeyRequest>,
) -> Result<Json<KeyResponse>, BrokerError> {
    Ok(Json(state.broker.extract_keys(&request).await?))
}

async fn escrowed_keys<S: Backend, E: CdmEngine + 'static>(
    State(state): State<AppState<S, E>>,
    JsonBody(request): JsonBody<PsshRequest>,
) -> Result<Json<KeyResponse>, BrokerError> {
    Ok(Json(state.broker.escrowed_keys(&request).await?))
}

async fn issue_passkeys<S: Backend, E: CdmEngine + 'static>(
    State(state): State<AppState<S, E>>,
    Extension(admission): Extension<Admission>,
    JsonBody(request): JsonBody<TokenRequest>,
) -> Result<(StatusCode, Json<TokenResponse>), BrokerError> {
    let passkeys = state.issuer.issue(&request).await?;
    info!(
        issuer = %admission.passkey.fingerprint(),
        count = passkeys.len(),
        "passkeys issued over http"
    );
    Ok((StatusCode::CREATED, Json(TokenResponse::issued(passkeys))))
}

async fn revoke<S: Backend, E: CdmEngine + 'static>(
    State(state): State<AppState<S, E>>,
    Extension(admission): Extension<Admission>,
    JsonBody(request): JsonBody<RevokeRequest>,
) -> Result<Json<RevokeResponse>, BrokerError> {
    let revoked = state.issuer.revoke(&request).await?;
    info!(
        issuer = %admission.passkey.fingerprint(),
        passkey = %revoked.fingerprint(),
        "passkey revoked over http"
    );
    Ok(Json(RevokeResponse {
        success: true,
        message: "passkey revoked".into(),
    }))
}

// ─────────────────────────────────────────────────────────────────────────────
// Bodies and errors
// ─────────────────────────────────────────────────────────────────────────────

/// JSON body extractor whose failures are validation errors.
///
/// An empty body reads as `{}`, and no content type is required.
pub struct JsonBody<T>(pub T);

#[async_trait]
impl<T, St> FromRequest<St> for JsonBody<T>
where
    T: DeserializeOwned,
    St: Send + Sync,
{
    type Rejection = BrokerError;

    async fn from_request(request: Request, state: &St) -> Result<Self, Self::Rejection> {
        let body = Bytes::from_request(request, state)
            .await
            .map_err(|e| ValidationError::MalformedBody(e.body_text()))?;

        let parsed = if body.iter().all(u8::is_ascii_whitespace) {
            serde_json::from_slice(b"{}")
        } else {
            serde_json::from_slice(&body)
        };
        parsed
            .map(JsonBody)
            .map_err(|e| ValidationError::MalformedBody(e.to_string()).into())
    }
}

/// HTTP status for each error class.
pub fn status_code(error: &BrokerError) -> StatusCode {
    match error {
        BrokerError::Validation(_) => StatusCode::BAD_REQUEST,
        BrokerError::Unauthenticated => StatusCode::UNAUTHORIZED,
        BrokerError::Forbidden => StatusCode::FORBIDDEN,
        BrokerError::NotFound(_) => StatusCode::NOT_FOUND,
        BrokerError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
        BrokerError::Upstream(_) => StatusCode::BAD_GATEWAY,
        BrokerError::Storage(_) | BrokerError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for BrokerError {
    fn into_response(self) -> Response {
        let status = status_code(&self);

        let message = match &self {
            BrokerError::Storage(_) | BrokerError::Config(_) => "internal server error".to_string(),
            other => other.to_string(),
        };
        if self.is_server_fault() {
            error!(error = %self, status = status.as_u16(), "request failed");
        } else {
            debug!(error = %self, status = status.as_u16(), "request rejected");
        }

        let mut response = (status, Json(ErrorBody { error: message })).into_response();
        if let BrokerError::RateLimited { retry_after } = self {
            response.headers_mut().insert(
                header::RETRY_AFTER,
                HeaderValue::from(retry_after_secs(&retry_after)),
            );
        }
        response
    }
}
