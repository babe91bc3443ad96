use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use reqwest::{
    header::{self, HeaderMap, HeaderName, HeaderValue},
    Method,
};
use serde_json::Value;
use tokio::time::sleep;

use crate::{
    decode::{classify_status, classify_transport, decode_success_body},
    throttle::Throttle,
    token::bearer_authorization,
    wire::{ChatHistoryEnvelope, ChatHistoryPayload},
    ApiError, ApiRequest, ChatCompletionRequest, ChatCompletionResponse, ChatHistoryResponse,
    ClientConfig, ClientOptions, ClientState, ErrorKind, HealthStatus, NoToken, Result,
    TokenProvider,
};

pub const CHAT_ENDPOINT: &str = "/api/chat";
pub const CHAT_HISTORY_ENDPOINT: &str = "/api/chat-history";
pub const HEALTH_ENDPOINT: &str = "/api/health";

/// JSON client for the chat backend.
///
/// Build one at application start and share it by reference or by
/// cloning. Clones share the throttle, the [`ClientState`] and the local
/// history cache, so they count as one client instance.
#[derive(Clone)]
pub struct ResilientApiClient {
    http: reqwest::Client,
    base_url: String,
    tokens: Arc<dyn TokenProvider>,
    options: ClientOptions,
    throttle: Arc<Throttle>,
    state: Arc<Mutex<ClientState>>,
    history_cache: Arc<Mutex<Option<Vec<Value>>>>,
}

impl fmt::Debug for ResilientApiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResilientApiClient")
            .field("base_url", &self.base_url)
            .field("tokens", &"<provider>")
            .field("options", &self.options)
            .field("state", &self.state())
            .finish()
    }
}

impl ResilientApiClient {
    /// Creates an unauthenticated client with default options.
    pub fn new(base_url: impl Into<String>) -> Self {
        let options = ClientOptions::default();
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            tokens: Arc::new(NoToken),
            throttle: Arc::new(Throttle::new(Duration::from_millis(options.min_interval_ms))),
            options,
            state: Arc::new(Mutex::new(ClientState::default())),
            history_cache: Arc::new(Mutex::new(None)),
        }
    }

    /// Creates a client from parsed key/value configuration.
    pub fn from_config(config: &ClientConfig) -> Self {
        Self::new(config.base_url.clone()).with_options(config.options.clone())
    }

    /// Creates a client from `API_*` environment variables.
    ///
    /// See [`ClientConfig::from_pairs`] for the keys.
    pub fn from_env() -> Result<Self> {
        ClientConfig::from_env().map(|config| Self::from_config(&config))
    }

    /// Sets the source of bearer tokens.
    pub fn with_token_provider(mut self, tokens: Arc<dyn TokenProvider>) -> Self {
        self.tokens = tokens;
        self
    }

    /// Applies timeout, retry and throttle options.
    ///
    /// Call this before cloning: the throttle is rebuilt for the new interval.
    pub fn with_options(mut self, options: ClientOptions) -> Self {
        self.throttle = Arc::new(Throttle::new(Duration::from_millis(options.min_interval_ms)));
        self.options = options;
        self
    }

    /// Backend origin without a trailing slash.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Options currently in effect.
    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    /// Snapshot of the connection/error bookkeeping.
    pub fn state(&self) -> ClientState {
        lock(&self.state).clone()
    }

    /// Drops cached history and resets [`ClientState`].
    pub fn clear_cache(&self) {
        *lock(&self.history_cache) = None;
        *lock(&self.state) = ClientState::default();

        #[cfg(feature = "tracing")]
        tracing::debug!("client cache cleared");
    }

    /// Sends `request` with throttling, auth and retries, returning the
    /// decoded JSON body.
    pub async fn request(&self, request: ApiRequest) -> Result<Value> {
        self.throttle.acquire().await;

        let headers = self.compose_headers(&request.headers).await?;
        let url = self.endpoint_url(&request.endpoint);
        reqwest::Url::parse(&url)
            .map_err(|err| ApiError::InvalidRequest(format!("url '{url}': {err}")))?;
        let body = request
            .body
            .as_ref()
            .map(serde_json::to_vec)
            .transpose()
            .map_err(|err| ApiError::InvalidRequest(format!("unserializable body: {err}")))?;

        self.send_with_retry(&request.method, &url, &headers, body.as_deref())
            .await
    }

    /// Sends a `GET` to `endpoint` through [`Self::request`].
    pub async fn get(&self, endpoint: &str) -> Result<Value> {
        self.request(ApiRequest::get(endpoint)).await
    }

    /// Sends a JSON `POST` to `endpoint` through [`Self::request`].
    pub async fn post(&self, endpoint: &str, body: Value) -> Result<Value> {
        self.request(ApiRequest::post(endpoint, body)).await
    }

    /// Asks the backend model for a completion.
    pub async fn chat(&self, completion: &ChatCompletionRequest) -> Result<ChatCompletionResponse> {
        let body = to_json_body(completion)?;
        let value = self.post(CHAT_ENDPOINT, body).await?;
        from_json_value(value, "chat completion")
    }

    /// Loads the signed-in user's chat history.
    ///
    /// This read path never fails: any error is logged and yields an empty
    /// list. Successful loads refresh the local cache.
    pub async fn load_chat_history(&self) -> Vec<Value> {
        let loaded = match self.get(CHAT_HISTORY_ENDPOINT).await {
            Ok(value) => from_json_value::<ChatHistoryEnvelope>(value, "chat history"),
            Err(err) => Err(err),
        };

        match loaded {
            Ok(envelope) => {
                *lock(&self.history_cache) = Some(envelope.chats.clone());
                envelope.chats
            }
            Err(_err) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(error = %_err, "chat history load failed; returning empty list");
                Vec::new()
            }
        }
    }

    /// Persists the chat history. Errors propagate to the caller.
    pub async fn save_chat_history(&self, chats: &[Value]) -> Result<ChatHistoryResponse> {
        let body = to_json_body(&ChatHistoryPayload { chats })?;
        let value = self.post(CHAT_HISTORY_ENDPOINT, body).await?;
        let saved: ChatHistoryResponse = from_json_value(value, "chat history save")?;
        if saved.success {
            *lock(&self.history_cache) = Some(chats.to_vec());
        }
        Ok(saved)
    }

    /// Chat list from the last successful load or save.
    pub fn cached_chat_history(&self) -> Option<Vec<Value>> {
        lock(&self.history_cache).clone()
    }

    /// Calls the health endpoint. An empty success body counts as healthy.
    pub async fn health(&self) -> Result<HealthStatus> {
        let value = self.get(HEALTH_ENDPOINT).await?;
        if value.is_null() {
            return Ok(HealthStatus::default());
        }
        from_json_value(value, "health")
    }

    /// Probes the health endpoint and reports whether the backend answered
    /// with a success status.
    pub async fn check_connection(&self) -> bool {
        let reachable = matches!(self.health().await, Ok(_) | Err(ApiError::Decode(_)));
        lock(&self.state).connection_verified = reachable;
        reachable
    }

    async fn send_with_retry(
        &self,
        method: &Method,
        url: &str,
        headers: &HeaderMap,
        body: Option<&[u8]>,
    ) -> Result<Value> {
        let max_attempts = self.options.retry.attempts();
        let mut attempt = 1u32;
        loop {
            let outcome = self.send_once(method, url, headers, body).await;
            self.record_attempt(&outcome);

            match outcome {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() && attempt < max_attempts => {
                    self.wait_before_retry(attempt, &err).await;
                    attempt += 1;
                }
                Err(err) => {
                    #[cfg(feature = "tracing")]
                    tracing::debug!(%url, attempt, kind = %err.kind(), "request failed");
                    return Err(err);
                }
            }
        }
    }

    async fn send_once(
        &self,
        method: &Method,
        url: &str,
        headers: &HeaderMap,
        body: Option<&[u8]>,
    ) -> Result<Value> {
        let mut builder = self
            .http
            .request(method.clone(), url)
            .headers(headers.clone())
            .timeout(Duration::from_millis(self.options.timeout_ms));
        if let Some(body) = body {
            builder = builder.body(body.to_vec());
        }

        let response = builder.send().await.map_err(classify_transport)?;
        let status = response.status();
        let response_headers = response.headers().clone();
        let text = response.text().await.map_err(classify_transport)?;

        if status.is_success() {
            lock(&self.state).connection_verified = true;
            decode_success_body(&text)
        } else {
            Err(classify_status(status, &response_headers, text))
        }
    }

    fn record_attempt(&self, outcome: &Result<Value>) {
        let mut state = lock(&self.state);
        match outcome {
            Ok(_) => {
                state.connection_verified = true;
                state.last_error = None;
            }
            Err(err) => {
                let kind = err.kind();
                if matches!(kind, ErrorKind::NetworkError | ErrorKind::Timeout) {
                    state.connection_verified = false;
                }
                state.last_error = Some(kind);
                state.error_count += 1;
            }
        }
    }

    async fn wait_before_retry(&self, attempt: u32, _err: &ApiError) {
        let delay = self.options.retry.delay(attempt);

        #[cfg(feature = "tracing")]
        tracing::debug!(
            attempt,
            delay_ms = delay.as_millis() as u64,
            error = %_err,
            "retrying request after transient failure"
        );

        sleep(delay).await;
    }

    async fn compose_headers(&self, overrides: &BTreeMap<String, String>) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        headers.insert(header::ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));

        for (name, value) in overrides {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|err| ApiError::InvalidRequest(format!("header name '{name}': {err}")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|err| ApiError::InvalidRequest(format!("header '{name}': {err}")))?;
            headers.insert(name, value);
        }

        if let Some(authorization) = self
            .tokens
            .token()
            .await
            .as_deref()
            .and_then(bearer_authorization)
        {
            let mut value = HeaderValue::from_str(&authorization)
                .map_err(|err| ApiError::InvalidRequest(format!("authorization token: {err}")))?;
            value.set_sensitive(true);
            headers.insert(header::AUTHORIZATION, value);
        }

        Ok(headers)
    }

    fn endpoint_url(&self, endpoint: &str) -> String {
        if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
            return endpoint.to_owned();
        }
        format!("{}/{}", self.base_url, endpoint.trim_start_matches('/'))
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn to_json_body<T: serde::Serialize>(value: &T) -> Result<Value> {
    serde_json::to_value(value)
        .map_err(|err| ApiError::InvalidRequest(format!("unserializable body: {err}")))
}

fn from_json_value<T: serde::de::DeserializeOwned>(value: Value, what: &str) -> Result<T> {
    serde_json::from_value(value)
        .map_err(|err| ApiError::Decode(format!("invalid {what} response: {err}")))
}

#[cfg(test)]
mod tests {
    use std::{collections::BTreeMap, sync::Arc};

    use reqwest::header::{ACCEPT, AUTHORIZATION, CACHE_CONTROL, CONTENT_TYPE};

    use super::ResilientApiClient;
    use crate::{ApiError, StaticToken};

    #[test]
    fn endpoint_url_joins_without_double_slash() {
        let client = ResilientApiClient::new("https://backend.example/");
        assert_eq!(
            client.endpoint_url("/api/health"),
            "https://backend.example/api/health"
        );
        assert_eq!(
            client.endpoint_url("api/chat"),
            "https://backend.example/api/chat"
        );
        assert_eq!(
            client.endpoint_url("https://other.example/x"),
            "https://other.example/x"
        );
    }

    #[tokio::test]
    async fn default_headers_without_token() {
        let client = ResilientApiClient::new("http://localhost");
        let headers = client
            .compose_headers(&BTreeMap::new())
            .await
            .expect("headers must compose");

        assert_eq!(headers[CONTENT_TYPE], "application/json");
        assert_eq!(headers[ACCEPT], "application/json");
        assert_eq!(headers[CACHE_CONTROL], "no-cache");
        assert!(headers.get(AUTHORIZATION).is_none());
    }

    #[tokio::test]
    async fn overrides_apply_and_token_is_attached() {
        let client = ResilientApiClient::new("http://localhost")
            .with_token_provider(Arc::new(StaticToken::new("id-token")));
        let overrides = BTreeMap::from([
            ("Cache-Control".to_owned(), "max-age=0".to_owned()),
            ("X-Client".to_owned(), "mobile".to_owned()),
        ]);
        let headers = client
            .compose_headers(&overrides)
            .await
            .expect("headers must compose");

        assert_eq!(headers[CACHE_CONTROL], "max-age=0");
        assert_eq!(headers["x-client"], "mobile");
        assert_eq!(headers[AUTHORIZATION], "Bearer id-token");
    }

    #[tokio::test]
    async fn invalid_header_name_is_rejected() {
        let client = ResilientApiClient::new("http://localhost");
        let overrides = BTreeMap::from([("bad header".to_owned(), "v".to_owned())]);
        let err = client
            .compose_headers(&overrides)
            .await
            .expect_err("header with space must be rejected");
        assert!(matches!(err, ApiError::InvalidRequest(_)));
    }

    #[test]
    fn debug_does_not_expose_token() {
        let client = ResilientApiClient::new("http://localhost")
            .with_token_provider(Arc::new(StaticToken::new("secret-token")));
        let debug = format!("{client:?}");
        assert!(debug.contains("<provider>"));
        assert!(!debug.contains("secret-token"));
    }
}
