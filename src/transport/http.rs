use async_trait::async_trait;
use serde_json::Value;

use super::{HttpRequest, Method, Transport, TransportError};

/// Blocking ureq agent driven from async code through `spawn_blocking`.
#[derive(Clone)]
pub struct UreqTransport {
    agent: ureq::Agent,
}

impl UreqTransport {
    pub fn new() -> Self {
        Self {
            agent: ureq::Agent::new_with_defaults(),
        }
    }

    pub fn with_agent(agent: ureq::Agent) -> Self {
        Self { agent }
    }
}

impl Default for UreqTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for UreqTransport {
    async fn send(&self, request: HttpRequest) -> Result<Value, TransportError> {
        let agent = self.agent.clone();
        tokio::task::spawn_blocking(move || {
            let response = match (request.method, request.body) {
                (Method::Get, _) => agent.get(&request.url).call(),
                (Method::Post, Some(body)) => agent.post(&request.url).send_json(body),
                (Method::Post, None) => agent.post(&request.url).send_empty(),
            };
            let response = response.map_err(classify_error)?;
            response
                .into_body()
                .read_json::<Value>()
                .map_err(|e| TransportError::Body(e.to_string()))
        })
        .await
        .map_err(|e| TransportError::Connection(format!("join error: {e}")))?
    }
}

fn classify_error(err: ureq::Error) -> TransportError {
    match err {
        ureq::Error::StatusCode(status) => TransportError::Status(status),
        other => TransportError::Connection(other.to_string()),
    }
}
