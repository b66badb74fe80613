use axum::body::{to_bytes, Body};
use axum::extract::{Request, State};
use axum::http::{header, HeaderValue, Method, StatusCode};
use axum::middleware::Next;
use axum::response::Response;

use opsdeck_gate::fingerprint::request_fingerprint;
use opsdeck_gate::idempotency::{AdmitRequest, Decision};
use opsdeck_gate::policy::IdempotencyMode;

use crate::middleware::identity::RequestIdentity;
use crate::middleware::reject;
use crate::rest::AppState;

const KEY_HEADER: &str = "idempotency-key";
const KEY_BODY_FIELD: &str = "idempotency_key";

/// At-most-once protection for unsafe methods, second stage of the
/// pipeline. Safe methods pass straight through; keyed requests are
/// admitted through the coordinator and completed on success.
pub async fn idempotency(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let method = request.method();
    if method == Method::GET || method == Method::HEAD || method == Method::OPTIONS {
        return next.run(request).await;
    }

    let identity = RequestIdentity::resolve(&request);
    let path = request.uri().path().to_string();
    let method = request.method().as_str().to_string();
    let policy = state.policies.resolve(&method, &path);

    let header_key = request
        .headers()
        .get(KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty());

    let (parts, body) = request.into_parts();
    let bytes = match to_bytes(body, state.config.max_body_bytes).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!(route = %path, error = %e, "failed to buffer request body");
            return reject::invalid_body();
        }
    };
    let key = header_key.or_else(|| body_field_key(&bytes));
    let request = Request::from_parts(parts, Body::from(bytes.clone()));

    let Some(key) = key else {
        return match policy.idempotency_mode {
            IdempotencyMode::Required => {
                state.metrics.inc_key_required();
                tracing::warn!(route = %path, "idempotency key missing on protected route");
                reject::key_required()
            }
            IdempotencyMode::Optional => next.run(request).await,
        };
    };

    let admit = AdmitRequest {
        key: key.clone(),
        route: path.clone(),
        method,
        actor_id: identity.actor_id,
        tenant_id: identity.tenant_id,
        fingerprint: request_fingerprint(&bytes),
    };

    match state.coordinator.admit(admit).await {
        Decision::Replay { status, body } => {
            state.metrics.inc_replays();
            tracing::info!(key = %key, route = %path, "serving replayed response");
            replay_response(status, body)
        }
        Decision::Conflict => {
            state.metrics.inc_conflicts();
            tracing::warn!(key = %key, route = %path, "idempotency key reused with different payload");
            reject::key_conflict()
        }
        Decision::Proceed(handle) => {
            let response = next.run(request).await;
            if !response.status().is_success() {
                // Failed attempts stay retryable; the pending record ages out.
                return response;
            }
            let (parts, body) = response.into_parts();
            let bytes = match to_bytes(body, usize::MAX).await {
                Ok(bytes) => bytes,
                Err(e) => {
                    tracing::error!(key = %key, error = %e, "failed to capture response for replay store");
                    return reject::internal();
                }
            };
            let body_text = String::from_utf8_lossy(&bytes).to_string();
            state
                .coordinator
                .complete(handle, parts.status.as_u16(), body_text)
                .await;
            state.metrics.inc_completions();
            Response::from_parts(parts, Body::from(bytes))
        }
    }
}

fn body_field_key(bytes: &[u8]) -> Option<String> {
    let value: serde_json::Value = serde_json::from_slice(bytes).ok()?;
    value
        .get(KEY_BODY_FIELD)?
        .as_str()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn replay_response(status: u16, body: String) -> Response {
    let status = StatusCode::from_u16(status).unwrap_or(StatusCode::OK);
    let mut response = Response::new(Body::from(body));
    *response.status_mut() = status;
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    headers.insert("x-idempotent-replayed", HeaderValue::from_static("true"));
    headers.insert("x-idempotency-cache", HeaderValue::from_static("hit"));
    response
}
