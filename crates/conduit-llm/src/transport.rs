//! One HTTP exchange with an upstream provider

use std::time::Duration;

use bytes::Bytes;
use futures_util::StreamExt;
use http::{HeaderMap, Method, StatusCode};
use reqwest::Client;
use url::Url;

use crate::error::RelayError;
use crate::types::ByteStream;

/// A fully built upstream request
#[derive(Debug, Clone)]
pub struct UpstreamRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl UpstreamRequest {
    pub fn post(url: Url, headers: HeaderMap, body: impl Into<Bytes>) -> Self {
        Self {
            method: Method::POST,
            url,
            headers,
            body: body.into(),
        }
    }
}

/// Buffered upstream answer
///
/// The status is not checked here. Passthrough adaptors relay it as is.
#[derive(Debug)]
pub struct UpstreamResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl UpstreamResponse {
    /// Turn a non-success status into an error carrying the body
    pub fn error_for_status(self) -> Result<Self, RelayError> {
        if self.status.is_success() {
            return Ok(self);
        }

        Err(RelayError::UpstreamStatus {
            status: self.status,
            body: String::from_utf8_lossy(&self.body).into_owned(),
        })
    }
}

/// Live upstream answer with an unread body
///
/// Dropping `body` closes the connection.
pub struct UpstreamStream {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: ByteStream,
}

impl std::fmt::Debug for UpstreamStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpstreamStream")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

/// HTTP client shared by every request to one provider
#[derive(Debug, Clone)]
pub struct Transport {
    client: Client,
}

impl Transport {
    pub fn new(connect_timeout: Option<Duration>) -> Result<Self, RelayError> {
        let mut builder = Client::builder();

        if let Some(timeout) = connect_timeout {
            builder = builder.connect_timeout(timeout);
        }

        let client = builder
            .build()
            .map_err(|e| RelayError::Internal(anyhow::anyhow!("failed to build HTTP client: {e}")))?;

        Ok(Self { client })
    }

    /// Send the request and buffer the whole body
    pub async fn execute(&self, request: UpstreamRequest) -> Result<UpstreamResponse, RelayError> {
        let response = self.send(request).await?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await.map_err(|e| {
            tracing::warn!(error = %e, "failed reading upstream body");
            RelayError::UpstreamTransport(e.to_string())
        })?;

        Ok(UpstreamResponse { status, headers, body })
    }

    /// Send the request and hand back the unread body
    ///
    /// Non-success statuses are read in full and returned as
    /// [`RelayError::UpstreamStatus`].
    pub async fn open_stream(&self, request: UpstreamRequest) -> Result<UpstreamStream, RelayError> {
        let response = self.send(request).await?;

        let status = response.status();

        if !status.is_success() {
            let body = match response.text().await {
                Ok(body) => body,
                Err(e) => {
                    tracing::warn!(status = %status, error = %e, "failed reading upstream error body");
                    String::new()
                }
            };
            tracing::warn!(status = %status, "upstream rejected stream request");
            return Err(RelayError::UpstreamStatus { status, body });
        }

        let headers = response.headers().clone();
        let body = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| RelayError::UpstreamTransport(e.to_string())));

        Ok(UpstreamStream {
            status,
            headers,
            body: Box::pin(body),
        })
    }

    async fn send(&self, request: UpstreamRequest) -> Result<reqwest::Response, RelayError> {
        let UpstreamRequest {
            method,
            url,
            headers,
            body,
        } = request;

        tracing::debug!(%method, %url, "sending upstream request");

        self.client
            .request(method, url)
            .headers(headers)
            .body(body)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "upstream request failed");
                RelayError::UpstreamTransport(e.to_string())
            })
    }
}
