use bytes::Bytes;
use conduit_config::LlmProviderType;
use http::HeaderMap;
use http::header::AUTHORIZATION;
use secrecy::SecretString;
use url::Url;

use super::{Adaptor, SyncOutcome, bearer_header, join_path};
use crate::convert::openai::to_openai_request;
use crate::decode::{PassthroughDecoder, drive, lines};
use crate::error::RelayError;
use crate::session::RelaySession;
use crate::transport::UpstreamResponse;
use crate::types::{ByteStream, ChatRequest, EventStream};

/// OpenAI-compatible chat completions
///
/// Streams are relayed frame by frame and buffered answers are passed
/// through with the upstream status.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenAiAdaptor;

impl Adaptor for OpenAiAdaptor {
    fn kind(&self) -> LlmProviderType {
        LlmProviderType::Openai
    }

    fn default_base_url(&self) -> &'static str {
        "https://api.openai.com/v1"
    }

    fn request_url(&self, base: &Url, _session: &RelaySession) -> Result<Url, RelayError> {
        join_path(base, "chat/completions")
    }

    fn setup_headers(&self, headers: &mut HeaderMap, credential: Option<&SecretString>) -> Result<(), RelayError> {
        if let Some(credential) = credential {
            headers.insert(AUTHORIZATION, bearer_header(credential)?);
        }

        Ok(())
    }

    fn convert_request(&self, request: &ChatRequest, session: &RelaySession) -> Result<Bytes, RelayError> {
        let upstream = to_openai_request(request, session)?;
        let body = serde_json::to_vec(&upstream).map_err(|e| RelayError::Internal(e.into()))?;
        Ok(Bytes::from(body))
    }

    fn decode_stream(&self, body: ByteStream, _session: &RelaySession) -> EventStream {
        drive(lines(body), PassthroughDecoder::new())
    }

    fn decode_response(&self, response: UpstreamResponse, _session: &RelaySession) -> Result<SyncOutcome, RelayError> {
        Ok(SyncOutcome::Passthrough(response))
    }
}
