use bytes::Bytes;
use conduit_config::LlmProviderType;
use http::{HeaderMap, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use url::Url;

use super::{Adaptor, SyncOutcome, secret_header};
use crate::convert::google::{from_google_response, to_google_request};
use crate::decode::{GoogleDecoder, drive, sse_data};
use crate::error::RelayError;
use crate::protocol::google::GoogleResponse;
use crate::session::RelaySession;
use crate::transport::UpstreamResponse;
use crate::types::{ByteStream, ChatRequest, EventStream};

const API_KEY: &str = "x-goog-api-key";

/// Google Generative Language API (Gemini)
///
/// The model is part of the path and the operation differs between
/// buffered and streamed calls.
#[derive(Debug, Clone, Copy, Default)]
pub struct GoogleAdaptor;

impl Adaptor for GoogleAdaptor {
    fn kind(&self) -> LlmProviderType {
        LlmProviderType::Google
    }

    fn default_base_url(&self) -> &'static str {
        "https://generativelanguage.googleapis.com/v1beta"
    }

    fn request_url(&self, base: &Url, session: &RelaySession) -> Result<Url, RelayError> {
        let model = session.model().trim_start_matches("models/");

        if session.is_stream() {
            let mut url = model_url(base, model, "streamGenerateContent")?;
            url.query_pairs_mut().append_pair("alt", "sse");
            Ok(url)
        } else {
            model_url(base, model, "generateContent")
        }
    }

    fn setup_headers(&self, headers: &mut HeaderMap, credential: Option<&SecretString>) -> Result<(), RelayError> {
        if let Some(credential) = credential {
            headers.insert(API_KEY, secret_header(credential.expose_secret())?);
        }

        Ok(())
    }

    fn convert_request(&self, request: &ChatRequest, session: &RelaySession) -> Result<Bytes, RelayError> {
        let upstream = to_google_request(request, session)?;
        let body = serde_json::to_vec(&upstream).map_err(|e| RelayError::Internal(e.into()))?;
        Ok(Bytes::from(body))
    }

    fn decode_stream(&self, body: ByteStream, session: &RelaySession) -> EventStream {
        drive(sse_data(body), GoogleDecoder::new(session.stamp()))
    }

    fn decode_response(&self, response: UpstreamResponse, session: &RelaySession) -> Result<SyncOutcome, RelayError> {
        let response = response.error_for_status()?;
        let parsed: GoogleResponse = serde_json::from_slice(&response.body)
            .map_err(|e| RelayError::UpstreamDecode(format!("invalid Gemini response: {e}")))?;

        if let Some(error) = &parsed.error {
            return Err(RelayError::UpstreamStatus {
                status: StatusCode::from_u16(error.code).unwrap_or(StatusCode::BAD_GATEWAY),
                body: format!("{}: {}", error.status, error.message),
            });
        }

        Ok(SyncOutcome::Unified(from_google_response(&parsed, session)))
    }
}

/// `{base}/models/{model}:{operation}`
///
/// The model goes in as a single escaped segment, so whatever the client
/// named cannot leave the `models` collection or add a query.
fn model_url(base: &Url, model: &str, operation: &str) -> Result<Url, RelayError> {
    let mut url = base.clone();
    url.set_query(None);
    url.set_fragment(None);

    url.path_segments_mut()
        .map_err(|()| RelayError::Internal(anyhow::anyhow!("base URL {base} cannot carry a path")))?
        .pop_if_empty()
        .push("models")
        .push(&format!("{model}:{operation}"));

    Ok(url)
}
