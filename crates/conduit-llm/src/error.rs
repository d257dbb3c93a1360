use conduit_core::HttpError;
use http::StatusCode;
use thiserror::Error;

/// Upper bound on how much of an upstream error body reaches the client
const CLIENT_BODY_LIMIT: usize = 512;

/// Errors scoped to a single relayed request
#[derive(Debug, Error)]
pub enum RelayError {
    /// Malformed or incomplete inbound payload
    #[error("invalid request: {0}")]
    RequestInvalid(String),

    /// No provider matched and no default is configured
    #[error("no provider serves model `{model}`")]
    AdaptorNotFound { model: String },

    /// Network or connection failure talking to the provider
    #[error("upstream transport error: {0}")]
    UpstreamTransport(String),

    /// Provider answered with a non-success status
    #[error("upstream returned {status}")]
    UpstreamStatus { status: StatusCode, body: String },

    /// Provider stream or body could not be decoded
    #[error("upstream decode error: {0}")]
    UpstreamDecode(String),

    /// Client went away; a notice, not a failure
    #[error("client disconnected")]
    ClientDisconnected,

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl RelayError {
    /// Whether this is a cooperative stop rather than a failure
    pub const fn is_disconnect(&self) -> bool {
        matches!(self, Self::ClientDisconnected)
    }

    /// Payload for an in-band SSE error frame
    pub fn to_sse_payload(&self) -> String {
        serde_json::json!({
            "error": {
                "message": self.client_message(),
                "type": self.error_type(),
            }
        })
        .to_string()
    }

    /// Body for a pre-commit JSON error response
    pub fn to_json_body(&self) -> serde_json::Value {
        serde_json::json!({
            "error": {
                "message": self.client_message(),
                "type": self.error_type(),
                "code": serde_json::Value::Null,
            }
        })
    }
}

impl HttpError for RelayError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::RequestInvalid(_) => StatusCode::BAD_REQUEST,
            Self::AdaptorNotFound { .. } => StatusCode::NOT_FOUND,
            Self::UpstreamTransport(_) | Self::UpstreamDecode(_) => StatusCode::BAD_GATEWAY,
            Self::UpstreamStatus { status, .. } if status.is_client_error() || status.is_server_error() => *status,
            Self::UpstreamStatus { .. } => StatusCode::BAD_GATEWAY,
            // nginx convention; the client is gone, nobody reads it
            Self::ClientDisconnected => StatusCode::from_u16(499).unwrap_or(StatusCode::BAD_REQUEST),
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_type(&self) -> &str {
        match self {
            Self::RequestInvalid(_) => "invalid_request_error",
            Self::AdaptorNotFound { .. } => "not_found_error",
            Self::UpstreamTransport(_) => "upstream_transport_error",
            Self::UpstreamStatus { .. } => "upstream_status_error",
            Self::UpstreamDecode(_) => "upstream_decode_error",
            Self::ClientDisconnected => "client_disconnected",
            Self::Internal(_) => "internal_error",
        }
    }

    fn client_message(&self) -> String {
        match self {
            Self::UpstreamStatus { status, body } if body.is_empty() => format!("upstream returned {status}"),
            Self::UpstreamStatus { status, body } => {
                format!("upstream returned {status}: {}", truncate(body, CLIENT_BODY_LIMIT))
            }
            Self::Internal(_) => "an internal error occurred".to_owned(),
            other => other.to_string(),
        }
    }
}

/// Cut `text` to at most `limit` bytes on a char boundary
fn truncate(text: &str, limit: usize) -> &str {
    if text.len() <= limit {
        return text;
    }

    let mut end = limit;
    while !text.is_char_boundary(end) {
        end -= 1;
    }

    &text[..end]
}
