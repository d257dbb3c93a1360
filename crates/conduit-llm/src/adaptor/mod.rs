//! Provider adaptors
//!
//! An adaptor bundles one provider family's endpoint policy, header
//! setup, request conversion and decoding. Adaptors are stateless; a
//! [`Provider`] pairs one with its configuration and HTTP client and is
//! built once at startup.

pub mod anthropic;
pub mod google;
pub mod openai;

use std::time::Duration;

use bytes::Bytes;
use conduit_config::{LlmProviderConfig, LlmProviderType};
use conduit_core::RequestContext;
use http::header::{ACCEPT, CONTENT_TYPE};
use http::{HeaderMap, HeaderValue};
use secrecy::{ExposeSecret, SecretString};
use url::Url;

use crate::error::RelayError;
use crate::session::RelaySession;
use crate::transport::{Transport, UpstreamRequest, UpstreamResponse};
use crate::types::{ByteStream, ChatRequest, ChatResponse, EventStream};

pub use anthropic::AnthropicAdaptor;
pub use google::GoogleAdaptor;
pub use openai::OpenAiAdaptor;

/// Result of a non-streaming call
#[derive(Debug)]
pub enum SyncOutcome {
    /// Upstream status, headers and body relayed untouched
    Passthrough(UpstreamResponse),
    /// Provider answer mapped to the unified schema
    Unified(ChatResponse),
}

/// Per-family strategy
pub trait Adaptor: Send + Sync {
    fn kind(&self) -> LlmProviderType;

    /// Base URL used when the configuration sets none
    fn default_base_url(&self) -> &'static str;

    /// Endpoint for this session
    fn request_url(&self, base: &Url, session: &RelaySession) -> Result<Url, RelayError>;

    /// Add authentication and protocol headers
    fn setup_headers(&self, headers: &mut HeaderMap, credential: Option<&SecretString>) -> Result<(), RelayError>;

    /// Serialized provider payload
    fn convert_request(&self, request: &ChatRequest, session: &RelaySession) -> Result<Bytes, RelayError>;

    /// Lazy event sequence over a live body
    fn decode_stream(&self, body: ByteStream, session: &RelaySession) -> EventStream;

    /// Map a buffered answer
    fn decode_response(&self, response: UpstreamResponse, session: &RelaySession) -> Result<SyncOutcome, RelayError>;
}

/// Adaptor for a provider family
pub fn adaptor_for(kind: LlmProviderType) -> Box<dyn Adaptor> {
    match kind {
        LlmProviderType::Openai => Box::new(OpenAiAdaptor),
        LlmProviderType::Anthropic => Box::new(AnthropicAdaptor),
        LlmProviderType::Google => Box::new(GoogleAdaptor),
    }
}

/// A configured upstream provider
pub struct Provider {
    name: String,
    base_url: Url,
    api_key: Option<SecretString>,
    forward_authorization: bool,
    adaptor: Box<dyn Adaptor>,
    transport: Transport,
}

impl std::fmt::Debug for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Provider")
            .field("name", &self.name)
            .field("kind", &self.adaptor.kind())
            .field("base_url", &self.base_url.as_str())
            .finish_non_exhaustive()
    }
}

impl Provider {
    pub fn from_config(name: &str, config: &LlmProviderConfig) -> Result<Self, RelayError> {
        let adaptor = adaptor_for(config.provider_type);

        let base_url = match &config.base_url {
            Some(url) => url.clone(),
            None => Url::parse(adaptor.default_base_url())
                .map_err(|e| RelayError::Internal(anyhow::anyhow!("invalid default base URL: {e}")))?,
        };

        let transport = Transport::new(config.timeout.map(Duration::from_secs))?;

        Ok(Self {
            name: name.to_owned(),
            base_url,
            api_key: config.api_key.clone(),
            forward_authorization: config.forward_authorization,
            adaptor,
            transport,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> LlmProviderType {
        self.adaptor.kind()
    }

    /// Credential to send upstream: the client's bearer token when
    /// forwarding is enabled, else the configured key
    pub fn credential(&self, context: &RequestContext) -> Option<SecretString> {
        if self.forward_authorization
            && let Some(key) = &context.api_key
        {
            return Some(key.clone());
        }

        self.api_key.clone()
    }

    /// Build the complete upstream request for a session
    pub fn build_request(&self, request: &ChatRequest, session: &RelaySession) -> Result<UpstreamRequest, RelayError> {
        let url = self.adaptor.request_url(&self.base_url, session)?;
        let body = self.adaptor.convert_request(request, session)?;

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if session.is_stream() {
            headers.insert(ACCEPT, HeaderValue::from_static("text/event-stream"));
        }
        self.adaptor.setup_headers(&mut headers, session.credential())?;

        Ok(UpstreamRequest::post(url, headers, body))
    }

    /// Non-streaming call
    pub async fn execute(&self, request: &ChatRequest, session: &RelaySession) -> Result<SyncOutcome, RelayError> {
        let upstream = self.build_request(request, session)?;
        let response = self.transport.execute(upstream).await?;
        self.adaptor.decode_response(response, session)
    }

    /// Streaming call; fails before any event if the provider rejects it
    pub async fn open_stream(&self, request: &ChatRequest, session: &RelaySession) -> Result<EventStream, RelayError> {
        let upstream = self.build_request(request, session)?;
        let stream = self.transport.open_stream(upstream).await?;
        Ok(self.adaptor.decode_stream(stream.body, session))
    }
}

/// Header value for a secret, hidden from debug output
pub(crate) fn secret_header(value: &str) -> Result<HeaderValue, RelayError> {
    let mut header = HeaderValue::from_str(value)
        .map_err(|_| RelayError::RequestInvalid("credential contains invalid header characters".to_owned()))?;
    header.set_sensitive(true);
    Ok(header)
}

pub(crate) fn bearer_header(credential: &SecretString) -> Result<HeaderValue, RelayError> {
    secret_header(&format!("Bearer {}", credential.expose_secret()))
}

/// Join a relative path onto a base URL, keeping the base's path
pub(crate) fn join_path(base: &Url, path: &str) -> Result<Url, RelayError> {
    let joined = format!("{}/{}", base.as_str().trim_end_matches('/'), path.trim_start_matches('/'));
    Url::parse(&joined).map_err(|e| RelayError::Internal(anyhow::anyhow!("invalid upstream URL {joined}: {e}")))
}
