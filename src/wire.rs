use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Serialize)]
pub struct ChatHistoryPayload<'a> {
    pub chats: &'a [Value],
}

#[derive(Debug, Default, Deserialize)]
pub struct ChatHistoryEnvelope {
    #[serde(default)]
    pub chats: Vec<Value>,
}

/// Error body of a 429 response. Only `retryAfter` is read.
#[derive(Debug, Default, Deserialize)]
pub struct QuotaErrorBody {
    #[serde(default, rename = "retryAfter")]
    pub retry_after: Option<RetryAfter>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum RetryAfter {
    Seconds(u64),
    Fractional(f64),
    Text(String),
}

impl RetryAfter {
    pub fn as_seconds(&self) -> Option<u64> {
        match self {
            Self::Seconds(secs) => Some(*secs),
            Self::Fractional(secs) if secs.is_finite() && *secs >= 0.0 => Some(secs.ceil() as u64),
            Self::Fractional(_) => None,
            Self::Text(text) => text.trim().parse().ok(),
        }
    }
}
