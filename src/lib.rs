//! `resilient-api-client` is an async JSON client for a chat backend API.
//!
//! Every call made through [`ResilientApiClient::request`] is:
//! - throttled so request starts are at least `min_interval_ms` apart,
//! - authenticated with a bearer token from a host-supplied [`TokenProvider`],
//! - retried with backoff on network errors and 5xx responses,
//! - classified into an [`ApiError`] on failure.
//!
//! Higher-level helpers cover the backend's chat, chat history and health
//! endpoints.

mod client;
mod decode;
mod error;
mod options;
mod request;
mod throttle;
mod token;
mod types;
mod wire;

pub use client::{ResilientApiClient, CHAT_ENDPOINT, CHAT_HISTORY_ENDPOINT, HEALTH_ENDPOINT};
pub use error::{ApiError, ErrorKind};
pub use options::{ClientConfig, ClientOptions, RetryPolicy};
pub use request::ApiRequest;
pub use token::{NoToken, StaticToken, TokenProvider};
pub use types::{
    ChatCompletionRequest, ChatCompletionResponse, ChatHistoryResponse, ChatMessage, ClientState,
    HealthStatus,
};

pub type Result<T> = std::result::Result<T, ApiError>;
