use std::collections::BTreeMap;

use reqwest::Method;
use serde_json::Value;

/// A single logical call against the backend.
///
/// `endpoint` is joined onto the client's base URL. Headers set here
/// override the client defaults; `Authorization` is always set from the
/// token provider when it yields a token.
#[derive(Clone, Debug, PartialEq)]
pub struct ApiRequest {
    pub endpoint: String,
    pub method: Method,
    pub headers: BTreeMap<String, String>,
    pub body: Option<Value>,
}

impl ApiRequest {
    /// Request with no body and no extra headers.
    pub fn new(method: Method, endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            method,
            headers: BTreeMap::new(),
            body: None,
        }
    }

    /// `GET` request without a body.
    pub fn get(endpoint: impl Into<String>) -> Self {
        Self::new(Method::GET, endpoint)
    }

    /// `POST` request carrying `body` as JSON.
    pub fn post(endpoint: impl Into<String>, body: Value) -> Self {
        Self::new(Method::POST, endpoint).with_body(body)
    }

    /// Replaces the JSON body.
    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Adds or replaces a header override.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }
}
