use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use opsdeck_gate::limiter::Verdict;

#[derive(Serialize)]
struct ErrorBody<'a> {
    code: &'a str,
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    retry_after_seconds: Option<u64>,
}

pub fn rate_limited(verdict: &Verdict) -> Response {
    let retry_after = verdict.retry_after_seconds.unwrap_or(1);
    let message = if verdict.banned {
        "temporarily banned after sustained overage, try again later"
    } else {
        "rate limit exceeded, try again later"
    };
    let mut response = (
        StatusCode::TOO_MANY_REQUESTS,
        Json(ErrorBody {
            code: "RATE_LIMITED",
            message,
            retry_after_seconds: Some(retry_after),
        }),
    )
        .into_response();
    response
        .headers_mut()
        .insert(header::RETRY_AFTER, HeaderValue::from(retry_after));
    response
}

pub fn key_required() -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorBody {
            code: "IDEMPOTENCY_KEY_REQUIRED",
            message: "this route requires an Idempotency-Key header",
            retry_after_seconds: None,
        }),
    )
        .into_response()
}

pub fn key_conflict() -> Response {
    (
        StatusCode::CONFLICT,
        Json(ErrorBody {
            code: "IDEMPOTENCY_KEY_CONFLICT",
            message: "idempotency key was already used with a different payload",
            retry_after_seconds: None,
        }),
    )
        .into_response()
}

pub fn limiter_unavailable() -> Response {
    (
        StatusCode::TOO_MANY_REQUESTS,
        Json(ErrorBody {
            code: "RATE_LIMITED",
            message: "rate limiting unavailable, request denied by policy",
            retry_after_seconds: Some(1),
        }),
    )
        .into_response()
}

pub fn invalid_body() -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorBody {
            code: "INVALID_BODY",
            message: "request body could not be read",
            retry_after_seconds: None,
        }),
    )
        .into_response()
}

pub fn internal() -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorBody {
            code: "INTERNAL",
            message: "internal error",
            retry_after_seconds: None,
        }),
    )
        .into_response()
}
