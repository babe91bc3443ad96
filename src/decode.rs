use std::error::Error;

use reqwest::{
    header::{HeaderMap, RETRY_AFTER},
    StatusCode,
};
use serde_json::Value;

use crate::{
    wire::{QuotaErrorBody, RetryAfter},
    ApiError,
};

/// Lower-case fragments that mark a transport error as connection-level.
const TRANSIENT_SIGNATURES: &[&str] = &[
    "socketexception",
    "connection refused",
    "connection reset",
    "connection closed",
    "connection aborted",
    "broken pipe",
    "network is unreachable",
    "host is unreachable",
    "no route to host",
    "failed to lookup address",
    "dns error",
    "error trying to connect",
];

pub(crate) fn classify_transport(err: reqwest::Error) -> ApiError {
    if err.is_builder() {
        return ApiError::InvalidRequest(error_chain_text(&err));
    }
    if err.is_timeout() {
        return ApiError::Timeout(err);
    }
    if err.is_connect() || matches_transient_signature(&err) {
        return ApiError::Network(err);
    }
    ApiError::Unknown(error_chain_text(&err))
}

pub(crate) fn matches_transient_signature(err: &(dyn Error + 'static)) -> bool {
    let text = error_chain_text(err).to_ascii_lowercase();
    TRANSIENT_SIGNATURES
        .iter()
        .any(|signature| text.contains(signature))
}

fn error_chain_text(err: &(dyn Error + 'static)) -> String {
    let mut text = err.to_string();
    let mut source = err.source();
    while let Some(inner) = source {
        text.push_str(": ");
        text.push_str(&inner.to_string());
        source = inner.source();
    }
    text
}

/// Maps a non-success response onto the error taxonomy.
pub(crate) fn classify_status(status: StatusCode, headers: &HeaderMap, body: String) -> ApiError {
    match status {
        StatusCode::TOO_MANY_REQUESTS => ApiError::QuotaExceeded {
            retry_after: retry_after_from_body(&body).or_else(|| retry_after_from_headers(headers)),
        },
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ApiError::AuthRequired {
            status: status.as_u16(),
            body,
        },
        _ => ApiError::Http {
            status: status.as_u16(),
            body,
        },
    }
}

pub(crate) fn retry_after_from_body(body: &str) -> Option<u64> {
    serde_json::from_str::<QuotaErrorBody>(body)
        .ok()
        .and_then(|parsed| parsed.retry_after)
        .as_ref()
        .and_then(RetryAfter::as_seconds)
}

fn retry_after_from_headers(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()
}

/// Decodes a 2xx body. An empty body decodes to `null`.
pub(crate) fn decode_success_body(body: &str) -> Result<Value, ApiError> {
    if body.trim().is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(body).map_err(|err| {
        ApiError::Decode(format!("invalid response JSON: {err}; body: {body}"))
    })
}
