use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

use trustpin::config::PinningConfig;
use trustpin::error::TrustError;
use trustpin::tls::pinned_client_config;
use trustpin::trust::TrustStore;

use super::client;
use super::endpoint::ApiEndpoint;

/// Failures of one request, from descriptor resolution through decoding.
/// Every stage surfaces its own kind so callers can tell a potential MITM
/// (`ConnectionRejected`) from a malformed payload (`DecodingError`).
#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("unable to perform request")]
    BadRequest,

    #[error("{0}")]
    ServerError(String),

    #[error("unable to decode response: {0}")]
    DecodingError(String),

    #[error("invalid URL")]
    InvalidUrl,

    #[error("unauthorized")]
    Unauthorized,

    #[error("request body encoding failed: {0}")]
    EncodingFailure(String),

    #[error("connection rejected during handshake: {0}")]
    ConnectionRejected(String),
}

/// Executes endpoint descriptors over the pinned transport and decodes the
/// typed result. The TLS config (carrying the pinning verifier) is built
/// once; every call still gets its own isolated client, so nothing is
/// reused between requests.
#[derive(Debug, Clone)]
pub struct RequestExecutor {
    base_url: String,
    tls: Arc<rustls::ClientConfig>,
    bearer_token: Option<String>,
}

impl RequestExecutor {
    /// Fails with the underlying `TrustError` when the pinning material is
    /// unusable; there is no unpinned fallback.
    pub fn new(
        base_url: impl Into<String>,
        store: Arc<TrustStore>,
        pinning: PinningConfig,
    ) -> Result<Self, TrustError> {
        let tls = pinned_client_config(store, pinning)?;
        Ok(RequestExecutor {
            base_url: base_url.into(),
            tls,
            bearer_token: None,
        })
    }

    /// Attach a session token sent as `Authorization: Bearer` on every call.
    #[allow(dead_code)]
    pub fn with_bearer_token(mut self, token: impl Into<String>) -> Self {
        self.bearer_token = Some(token.into());
        self
    }

    /// Run one descriptor against the network and decode the body into `T`.
    ///
    /// A handshake rejected by the pinning validator aborts the exchange
    /// before any response bytes exist, so a rejection can never produce a
    /// decoded value.
    pub async fn execute<T: DeserializeOwned>(&self, endpoint: &ApiEndpoint) -> Result<T, NetworkError> {
        let resolved = endpoint.resolve(&self.base_url)?;
        tracing::debug!("{} {}", resolved.method.as_str(), resolved.url);

        let body = match &resolved.body {
            Some(value) => Some(encode_body(value)?),
            None => None,
        };

        let client = client::pinned_client(self.tls.clone()).map_err(|e| {
            tracing::error!("failed to build pinned client: {e}");
            NetworkError::BadRequest
        })?;

        let mut request = client.request(resolved.method.into(), resolved.url.clone());
        for (name, value) in &resolved.headers {
            request = request.header(name, value);
        }
        if let Some(token) = &self.bearer_token {
            request = request.header("Authorization", format!("Bearer {token}"));
        }
        if let Some(bytes) = body {
            request = request.body(bytes);
        }

        let response = request.send().await.map_err(classify_send_error)?;
        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .map_err(|e| NetworkError::ServerError(error_chain(&e)))?;

        interpret_response(status, &text)
    }
}

/// Serialize a request body to JSON.
pub fn encode_body<B: Serialize>(body: &B) -> Result<Vec<u8>, NetworkError> {
    serde_json::to_vec(body).map_err(|e| NetworkError::EncodingFailure(e.to_string()))
}

/// Map a received status and body to the typed result. 401 always wins over
/// the body; everything else goes through JSON decoding.
pub fn interpret_response<T: DeserializeOwned>(status: u16, body: &str) -> Result<T, NetworkError> {
    if status == 401 {
        return Err(NetworkError::Unauthorized);
    }
    serde_json::from_str(body).map_err(|e| NetworkError::DecodingError(e.to_string()))
}

/// Failures while connecting (TCP or TLS handshake, where the pinning
/// verifier runs) surface as `ConnectionRejected`; failures after an
/// established exchange as `ServerError`.
fn classify_send_error(e: reqwest::Error) -> NetworkError {
    let detail = error_chain(&e);
    if e.is_connect() {
        tracing::error!("❌ connection rejected: {detail}");
        NetworkError::ConnectionRejected(detail)
    } else {
        tracing::error!("request failed: {detail}");
        NetworkError::ServerError(detail)
    }
}

/// Flatten an error and its sources into one line; the rustls reject reason
/// lives a few levels down the chain.
fn error_chain(e: &(dyn std::error::Error + 'static)) -> String {
    let mut message = e.to_string();
    let mut source = e.source();
    while let Some(inner) = source {
        message.push_str(": ");
        message.push_str(&inner.to_string());
        source = inner.source();
    }
    message
}
