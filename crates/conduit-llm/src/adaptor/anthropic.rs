use bytes::Bytes;
use conduit_config::LlmProviderType;
use http::{HeaderMap, HeaderValue};
use secrecy::{ExposeSecret, SecretString};
use url::Url;

use super::{Adaptor, SyncOutcome, join_path, secret_header};
use crate::convert::anthropic::{from_anthropic_response, to_anthropic_request};
use crate::decode::{AnthropicDecoder, drive, sse_data};
use crate::error::RelayError;
use crate::protocol::anthropic::{API_VERSION, AnthropicResponse};
use crate::session::RelaySession;
use crate::transport::UpstreamResponse;
use crate::types::{ByteStream, ChatRequest, EventStream};

const API_KEY: &str = "x-api-key";
const VERSION: &str = "anthropic-version";

/// Anthropic Messages API
#[derive(Debug, Clone, Copy, Default)]
pub struct AnthropicAdaptor;

impl Adaptor for AnthropicAdaptor {
    fn kind(&self) -> LlmProviderType {
        LlmProviderType::Anthropic
    }

    fn default_base_url(&self) -> &'static str {
        "https://api.anthropic.com/v1"
    }

    fn request_url(&self, base: &Url, _session: &RelaySession) -> Result<Url, RelayError> {
        join_path(base, "messages")
    }

    fn setup_headers(&self, headers: &mut HeaderMap, credential: Option<&SecretString>) -> Result<(), RelayError> {
        if let Some(credential) = credential {
            headers.insert(API_KEY, secret_header(credential.expose_secret())?);
        }
        headers.insert(VERSION, HeaderValue::from_static(API_VERSION));

        Ok(())
    }

    fn convert_request(&self, request: &ChatRequest, session: &RelaySession) -> Result<Bytes, RelayError> {
        let upstream = to_anthropic_request(request, session)?;
        let body = serde_json::to_vec(&upstream).map_err(|e| RelayError::Internal(e.into()))?;
        Ok(Bytes::from(body))
    }

    fn decode_stream(&self, body: ByteStream, session: &RelaySession) -> EventStream {
        drive(sse_data(body), AnthropicDecoder::new(session.stamp()))
    }

    fn decode_response(&self, response: UpstreamResponse, session: &RelaySession) -> Result<SyncOutcome, RelayError> {
        let response = response.error_for_status()?;
        let parsed: AnthropicResponse = serde_json::from_slice(&response.body)
            .map_err(|e| RelayError::UpstreamDecode(format!("invalid Anthropic response: {e}")))?;

        Ok(SyncOutcome::Unified(from_anthropic_response(parsed, session.created())))
    }
}
