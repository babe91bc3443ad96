//! Bearer token source supplied by the host application.

use std::fmt;

use async_trait::async_trait;

/// Capability the host implements on top of its identity provider SDK.
///
/// Returning `None` sends the request unauthenticated; it is not an error on
/// the client side. The backend decides whether to answer 401/403.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Current ID/access token, refreshed by the provider if needed.
    async fn token(&self) -> Option<String>;
}

/// Provider for signed-out sessions.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoToken;

#[async_trait]
impl TokenProvider for NoToken {
    async fn token(&self) -> Option<String> {
        None
    }
}

/// Provider returning a fixed token.
#[derive(Clone)]
pub struct StaticToken(Option<String>);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(Some(token.into()))
    }
}

impl fmt::Debug for StaticToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let shown = self.0.as_ref().map(|_| "<redacted>");
        f.debug_tuple("StaticToken").field(&shown).finish()
    }
}

#[async_trait]
impl TokenProvider for StaticToken {
    async fn token(&self) -> Option<String> {
        self.0.clone()
    }
}

/// Turns a raw token into an `Authorization` value, keeping an existing
/// `Bearer ` prefix. Blank tokens yield `None`.
pub(crate) fn bearer_authorization(token: &str) -> Option<String> {
    let trimmed = token.trim();
    if trimmed.is_empty() {
        return None;
    }
    let prefix = trimmed.get(..7);
    if prefix.is_some_and(|value| value.eq_ignore_ascii_case("bearer ")) {
        Some(trimmed.to_owned())
    } else {
        Some(format!("Bearer {trimmed}"))
    }
}

#[cfg(test)]
mod tests {
    use super::{bearer_authorization, NoToken, StaticToken, TokenProvider};

    #[test]
    fn bearer_adds_prefix_when_missing() {
        assert_eq!(
            bearer_authorization("abc123"),
            Some("Bearer abc123".to_owned())
        );
    }

    #[test]
    fn bearer_keeps_existing_prefix() {
        assert_eq!(
            bearer_authorization("bEaReR abc123"),
            Some("bEaReR abc123".to_owned())
        );
    }

    #[test]
    fn blank_token_is_treated_as_absent() {
        assert_eq!(bearer_authorization("   "), None);
    }

    #[test]
    fn static_token_debug_is_redacted() {
        let debug = format!("{:?}", StaticToken::new("secret-token"));
        assert!(debug.contains("<redacted>"));
        assert!(!debug.contains("secret-token"));
    }

    #[tokio::test]
    async fn providers_return_expected_tokens() {
        assert_eq!(NoToken.token().await, None);
        assert_eq!(
            StaticToken::new("id-token").token().await,
            Some("id-token".to_owned())
        );
    }
}
