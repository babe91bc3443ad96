use std::fmt;

/// Coarse failure category recorded in [`crate::ClientState`].
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum ErrorKind {
    /// No connectivity: refused, reset, unreachable, DNS.
    NetworkError,
    /// The per-attempt timeout elapsed.
    Timeout,
    /// Backend answered 429.
    QuotaExceeded,
    /// Any other non-success status.
    HttpError,
    /// Backend answered 401 or 403.
    AuthRequired,
    Unknown,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::NetworkError => "network_error",
            Self::Timeout => "timeout",
            Self::QuotaExceeded => "quota_exceeded",
            Self::HttpError => "http_error",
            Self::AuthRequired => "auth_required",
            Self::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// Error type returned by this crate.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Connection-level failure that is worth retrying.
    #[error("network error: {0}")]
    Network(#[source] reqwest::Error),
    /// The per-attempt timeout elapsed before a response arrived.
    #[error("request timed out: {0}")]
    Timeout(#[source] reqwest::Error),
    /// HTTP 429. `retry_after` is in seconds when the backend reports it.
    #[error("quota exceeded (retry after {retry_after:?} s)")]
    QuotaExceeded { retry_after: Option<u64> },
    /// HTTP 401/403.
    #[error("authentication required ({status}): {body}")]
    AuthRequired { status: u16, body: String },
    /// Non-success HTTP status code with raw response body.
    #[error("http error {status}: {body}")]
    Http { status: u16, body: String },
    /// Success response whose body is not valid JSON.
    #[error("decode error: {0}")]
    Decode(String),
    /// The request could not be built (bad header name or value, bad URL).
    /// Raised before any network attempt.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("configuration error: {0}")]
    Config(String),
    /// Transport failure matching none of the known signatures.
    #[error("unknown error: {0}")]
    Unknown(String),
}

impl ApiError {
    /// Category recorded in [`crate::ClientState::last_error`].
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Network(_) => ErrorKind::NetworkError,
            Self::Timeout(_) => ErrorKind::Timeout,
            Self::QuotaExceeded { .. } => ErrorKind::QuotaExceeded,
            Self::AuthRequired { .. } => ErrorKind::AuthRequired,
            Self::Http { .. } => ErrorKind::HttpError,
            Self::Decode(_) | Self::InvalidRequest(_) | Self::Config(_) | Self::Unknown(_) => {
                ErrorKind::Unknown
            }
        }
    }

    /// Returns `true` for failures the client retries locally: network
    /// errors and 5xx responses.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Network(_) => true,
            Self::Http { status, .. } => (500..600).contains(status),
            _ => false,
        }
    }

    /// HTTP status attached to the error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::QuotaExceeded { .. } => Some(429),
            Self::AuthRequired { status, .. } | Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Short message suitable for showing to an end user.
    pub fn user_message(&self) -> String {
        match self {
            Self::Network(_) => {
                "Unable to reach the server. Please check your internet connection.".to_owned()
            }
            Self::Timeout(_) => "The server took too long to respond. Please try again.".to_owned(),
            Self::QuotaExceeded {
                retry_after: Some(secs),
            } => format!("Usage limit reached. Please try again in {secs} seconds."),
            Self::QuotaExceeded { retry_after: None } => {
                "Usage limit reached. Please try again later.".to_owned()
            }
            Self::AuthRequired { .. } => "Please sign in again to continue.".to_owned(),
            Self::Http { status, .. } if *status >= 500 => {
                "The server is having trouble right now. Please try again shortly.".to_owned()
            }
            Self::Http { status, .. } => format!("Request failed (HTTP {status})."),
            Self::Decode(_) | Self::InvalidRequest(_) | Self::Config(_) | Self::Unknown(_) => {
                "Something went wrong. Please try again.".to_owned()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{ApiError, ErrorKind};

    #[test]
    fn server_errors_are_transient_client_errors_are_not() {
        let server = ApiError::Http {
            status: 503,
            body: String::new(),
        };
        let client = ApiError::Http {
            status: 404,
            body: String::new(),
        };
        assert!(server.is_transient());
        assert!(!client.is_transient());
        assert_eq!(client.kind(), ErrorKind::HttpError);
    }

    #[test]
    fn quota_and_auth_are_never_transient() {
        let quota = ApiError::QuotaExceeded {
            retry_after: Some(30),
        };
        let auth = ApiError::AuthRequired {
            status: 401,
            body: String::new(),
        };
        assert!(!quota.is_transient());
        assert!(!auth.is_transient());
        assert_eq!(quota.status(), Some(429));
        assert_eq!(auth.kind(), ErrorKind::AuthRequired);
    }

    #[test]
    fn quota_message_mentions_retry_after() {
        let err = ApiError::QuotaExceeded {
            retry_after: Some(42),
        };
        assert!(err.user_message().contains("42 seconds"));
    }

    #[test]
    fn local_failures_map_to_unknown_kind() {
        assert_eq!(
            ApiError::Decode("bad".to_owned()).kind(),
            ErrorKind::Unknown
        );
        assert_eq!(
            ApiError::Config("missing".to_owned()).kind(),
            ErrorKind::Unknown
        );
        assert_eq!(ErrorKind::NetworkError.to_string(), "network_error");
    }
}
