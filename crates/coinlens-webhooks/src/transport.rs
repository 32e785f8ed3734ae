//! Outbound HTTP transport.
//!
//! The delivery path talks to receivers through [`HttpTransport`] so tests
//! can stand in a double and the engine never hard-wires an HTTP client.
//! [`ReqwestTransport`] is the production implementation.

use std::time::{Duration, Instant};

use async_trait::async_trait;

/// Outcome of a transport-level POST.
#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: u16,
    pub body: String,
    pub latency: Duration,
}

/// Transport-level failure classification.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("request error: {0}")]
    Other(String),
}

/// One bounded HTTP POST; the only blocking operation in the delivery path.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn post(
        &self,
        url: &str,
        body: Vec<u8>,
        headers: &[(String, String)],
    ) -> Result<TransportResponse, TransportError>;
}

/// Production transport over a shared reqwest client.
///
/// Hard per-request timeout, no redirect following: a redirect to an
/// internal address would sidestep the registry's SSRF checks.
pub struct ReqwestTransport {
    client: reqwest::Client,
    timeout: Duration,
}

impl ReqwestTransport {
    /// Build the shared client.
    pub fn new(timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("coinlens-webhooks/", env!("CARGO_PKG_VERSION")))
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| TransportError::Other(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { client, timeout })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn post(
        &self,
        url: &str,
        body: Vec<u8>,
        headers: &[(String, String)],
    ) -> Result<TransportResponse, TransportError> {
        let mut request = self.client.post(url).body(body);
        for (name, value) in headers {
            request = request.header(name, value);
        }

        let start = Instant::now();
        let result = request.send().await;
        let latency = start.elapsed();

        match result {
            Ok(response) => {
                let status = response.status().as_u16();
                let body = response.text().await.unwrap_or_default();
                Ok(TransportResponse {
                    status,
                    body,
                    latency,
                })
            }
            Err(e) if e.is_timeout() => Err(TransportError::Timeout(self.timeout)),
            Err(e) if e.is_connect() => Err(TransportError::Connect(e.to_string())),
            Err(e) => Err(TransportError::Other(e.to_string())),
        }
    }
}
