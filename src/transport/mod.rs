//! Network boundary: request model, transport trait and action URL builder.

/// ureq-backed transport.
pub mod http;

use async_trait::async_trait;
use serde_json::Value;

/// HTTP method of an action call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

/// One JSON request against a server action.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub body: Option<Value>,
}

impl HttpRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            url: url.into(),
            body: None,
        }
    }

    pub fn post(url: impl Into<String>, body: Value) -> Self {
        Self {
            method: Method::Post,
            url: url.into(),
            body: Some(body),
        }
    }
}

/// Transport failure; never retried by the engine.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("could not reach server: {0}")]
    Connection(String),
    #[error("server returned status {0}")]
    Status(u16),
    #[error("could not parse response body: {0}")]
    Body(String),
}

/// Issues a request and returns the decoded JSON body.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: HttpRequest) -> Result<Value, TransportError>;
}

/// Builds server action URLs under a fixed root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlBuilder {
    root: String,
}

impl UrlBuilder {
    pub fn new(root: impl Into<String>) -> Self {
        let mut root = root.into();
        while root.ends_with('/') {
            root.pop();
        }
        Self { root }
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    /// `<root>/<path>?k=v&...`; repeated keys are kept in order.
    pub fn create_action_url(&self, path: &str, args: &[(String, String)]) -> String {
        let mut url = format!("{}/{}", self.root, path.trim_start_matches('/'));
        for (i, (k, v)) in args.iter().enumerate() {
            url.push(if i == 0 { '?' } else { '&' });
            url.push_str(&urlencoded(k));
            url.push('=');
            url.push_str(&urlencoded(v));
        }
        url
    }
}

/// Percent-encodes everything outside the RFC 3986 unreserved set.
fn urlencoded(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for b in s.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(b as char)
            }
            _ => out.push_str(&format!("%{b:02X}")),
        }
    }
    out
}
