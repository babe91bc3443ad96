use std::time::Duration;

use crate::{ApiError, Result};

/// Retry schedule for transient failures.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts including the first one. `0` behaves like `1`.
    pub max_attempts: u32,
    /// Delay after the first failed attempt, in milliseconds.
    pub base_delay_ms: u64,
    /// Growth exponent: `delay(n) = base_delay_ms * n^backoff_exponent`.
    pub backoff_exponent: u32,
}

impl RetryPolicy {
    /// Backoff inserted after failed attempt number `attempt` (1-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = u64::from(attempt.max(1)).saturating_pow(self.backoff_exponent);
        Duration::from_millis(self.base_delay_ms.saturating_mul(factor))
    }

    pub(crate) fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 500,
            backoff_exponent: 2,
        }
    }
}

/// Configures HTTP timeout, retry and throttle behavior.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ClientOptions {
    /// Per-attempt timeout in milliseconds.
    pub timeout_ms: u64,
    pub retry: RetryPolicy,
    /// Minimum spacing between request starts, in milliseconds.
    pub min_interval_ms: u64,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            timeout_ms: 30_000,
            retry: RetryPolicy::default(),
            min_interval_ms: 500,
        }
    }
}

pub const KEY_BASE_URL: &str = "API_BASE_URL";
pub const KEY_TIMEOUT_MS: &str = "API_TIMEOUT_MS";
pub const KEY_MAX_ATTEMPTS: &str = "API_MAX_ATTEMPTS";
pub const KEY_RETRY_BASE_DELAY_MS: &str = "API_RETRY_BASE_DELAY_MS";
pub const KEY_BACKOFF_EXPONENT: &str = "API_BACKOFF_EXPONENT";
pub const KEY_MIN_REQUEST_INTERVAL_MS: &str = "API_MIN_REQUEST_INTERVAL_MS";

/// Backend origin plus client options, read from env-style key/value pairs.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ClientConfig {
    pub base_url: String,
    pub options: ClientOptions,
}

impl ClientConfig {
    /// Builds a config from `(key, value)` pairs such as a parsed `.env` file.
    ///
    /// `API_BASE_URL` is required. Numeric keys fall back to
    /// [`ClientOptions::default`] when absent. Unrelated keys are ignored.
    pub fn from_pairs<I, K, V>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut base_url = None;
        let mut options = ClientOptions::default();

        for (key, value) in pairs {
            let key = key.as_ref();
            let value = value.as_ref().trim();
            match key {
                KEY_BASE_URL => base_url = Some(value.to_owned()),
                KEY_TIMEOUT_MS => options.timeout_ms = parse_number(key, value)?,
                KEY_MAX_ATTEMPTS => options.retry.max_attempts = parse_number(key, value)?,
                KEY_RETRY_BASE_DELAY_MS => options.retry.base_delay_ms = parse_number(key, value)?,
                KEY_BACKOFF_EXPONENT => options.retry.backoff_exponent = parse_number(key, value)?,
                KEY_MIN_REQUEST_INTERVAL_MS => options.min_interval_ms = parse_number(key, value)?,
                _ => {}
            }
        }

        let base_url = base_url
            .ok_or_else(|| ApiError::Config(format!("missing {KEY_BASE_URL}")))?;
        if base_url.is_empty() {
            return Err(ApiError::Config(format!("{KEY_BASE_URL} is set but empty")));
        }
        validate_base_url(&base_url)?;

        Ok(Self { base_url, options })
    }

    /// Reads the same keys from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_pairs(std::env::vars())
    }
}

/// Accepts only absolute `http`/`https` URLs.
fn validate_base_url(base_url: &str) -> Result<()> {
    let parsed = reqwest::Url::parse(base_url).map_err(|err| {
        ApiError::Config(format!("{KEY_BASE_URL} '{base_url}' is not a URL: {err}"))
    })?;
    match parsed.scheme() {
        "http" | "https" => Ok(()),
        other => Err(ApiError::Config(format!(
            "{KEY_BASE_URL} must use http or https, got '{other}'"
        ))),
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| ApiError::Config(format!("{key} must be a non-negative integer, got '{value}'")))
}
