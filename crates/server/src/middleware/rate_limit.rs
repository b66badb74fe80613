use axum::extract::{Request, State};
use axum::http::HeaderValue;
use axum::middleware::Next;
use axum::response::Response;

use opsdeck_gate::limiter::Verdict;

use crate::middleware::identity::RequestIdentity;
use crate::middleware::reject;
use crate::rest::AppState;

/// Admission control, first stage of the pipeline. Denied requests are
/// answered here and never reach the idempotency layer or a handler.
pub async fn rate_limit(State(state): State<AppState>, request: Request, next: Next) -> Response {
    state.metrics.inc_requests();

    let identity = RequestIdentity::resolve(&request);
    let path = request.uri().path().to_string();
    let method = request.method().as_str().to_string();
    let policy = state.policies.resolve(&method, &path);
    let identifier = identity.limiter_identifier(&policy.limit_class);

    let verdict = match state
        .limiter
        .try_check(&identifier, &policy.limit_class, &path)
    {
        Ok(verdict) => verdict,
        Err(e) => {
            // Degraded limiter state: the configured posture decides
            // between availability and strictness.
            if state.config.gate.fail_closed {
                tracing::error!(identifier = %identifier, error = %e, "limiter state unavailable, failing closed");
                state.metrics.inc_rate_limited();
                return reject::limiter_unavailable();
            }
            tracing::warn!(identifier = %identifier, error = %e, "limiter state unavailable, failing open");
            state.limiter.open_verdict(&policy.limit_class)
        }
    };

    if !verdict.allowed {
        if verdict.banned {
            state.metrics.inc_ban_denials();
        } else {
            state.metrics.inc_rate_limited();
        }
        tracing::warn!(
            identifier = %identifier,
            class = %policy.limit_class,
            route = %path,
            banned = verdict.banned,
            "request denied by rate limiter"
        );
        let mut response = reject::rate_limited(&verdict);
        apply_rate_headers(&mut response, &verdict);
        return response;
    }

    state.metrics.inc_admitted();
    if verdict.is_burst {
        state.metrics.inc_burst_admissions();
    }

    let mut response = next.run(request).await;
    apply_rate_headers(&mut response, &verdict);
    response
}

fn apply_rate_headers(response: &mut Response, verdict: &Verdict) {
    let headers = response.headers_mut();
    headers.insert("x-ratelimit-limit", HeaderValue::from(verdict.limit));
    headers.insert("x-ratelimit-remaining", HeaderValue::from(verdict.remaining));
    headers.insert("x-ratelimit-reset", HeaderValue::from(verdict.reset_at));
    headers.insert("x-ratelimit-window", HeaderValue::from(verdict.window_seconds));
    if verdict.is_burst {
        headers.insert("x-ratelimit-burst", HeaderValue::from_static("true"));
    }
}
