//! HTTP fallback transport.
//!
//! POSTs the outbound frame to the chat endpoint with an
//! `Authorization: Bearer` header and decodes `{reply, suggestions?,
//! conversation_id?}`.

use async_trait::async_trait;
use reqwest::{header, Client, StatusCode};
use std::time::Duration;
use tracing::debug;

use super::{FallbackError, FallbackTransport};
use crate::config::ClientConfig;
use crate::protocol::{ChatReply, ErrorBody, HealthStatus, OutboundFrame};

/// HTTP client for the fallback chat endpoint.
pub struct HttpFallback {
    client: Client,
    exchange_url: String,
    health_url: String,
}

impl HttpFallback {
    /// Create a new fallback client.
    pub fn new(
        exchange_url: impl Into<String>,
        health_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, FallbackError> {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static("application/json"),
        );

        let client = Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|e| FallbackError::Network(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            exchange_url: exchange_url.into(),
            health_url: health_url.into(),
        })
    }

    /// Create a fallback client from the client configuration.
    pub fn from_config(config: &ClientConfig) -> Result<Self, FallbackError> {
        Self::new(
            config.exchange_url.clone(),
            config.health_url.clone(),
            config.request_timeout(),
        )
    }

    pub fn exchange_url(&self) -> &str {
        &self.exchange_url
    }

    /// Probe the backend's health endpoint.
    pub async fn health(&self) -> Result<HealthStatus, FallbackError> {
        let response = self
            .client
            .get(&self.health_url)
            .send()
            .await
            .map_err(|e| FallbackError::Network(e.to_string()))?;

        let response = check_status(response).await?;
        response
            .json()
            .await
            .map_err(|e| FallbackError::InvalidResponse(e.to_string()))
    }
}

#[async_trait]
impl FallbackTransport for HttpFallback {
    async fn exchange(
        &self,
        frame: &OutboundFrame,
        credential: &str,
    ) -> Result<ChatReply, FallbackError> {
        debug!(
            url = %self.exchange_url,
            has_conversation = frame.conversation_id.is_some(),
            "Sending fallback exchange"
        );

        let response = self
            .client
            .post(&self.exchange_url)
            .header(header::AUTHORIZATION, format!("Bearer {}", credential))
            .json(frame)
            .send()
            .await
            .map_err(|e| FallbackError::Network(e.to_string()))?;

        let response = check_status(response).await?;
        response
            .json::<ChatReply>()
            .await
            .map_err(|e| FallbackError::InvalidResponse(e.to_string()))
    }
}

/// Map non-success statuses to errors, extracting `detail`/`error` from the body.
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, FallbackError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let detail = ErrorBody::reason_from(&body);
    let code = status.as_u16();

    Err(match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => FallbackError::Unauthorized {
            status: code,
            detail,
        },
        s if s.is_server_error() => FallbackError::Server {
            status: code,
            detail,
        },
        _ => FallbackError::Rejected {
            status: code,
            detail,
        },
    })
}
