//! Request-scoped orchestration over the shared provider registry

use std::sync::Arc;

use conduit_config::LlmConfig;
use conduit_core::RequestContext;
use conduit_telemetry::{Outcome, RelayMetrics};
use serde::Deserialize;

use crate::adaptor::{Provider, SyncOutcome};
use crate::bridge::{PrimedRelay, RelayBridge, RelayEnd, RelayOutcome};
use crate::dispatch::AdaptorRegistry;
use crate::error::RelayError;
use crate::session::RelaySession;
use crate::sse::SseEncoder;
use crate::types::{ChatRequest, Usage};

/// Shared state for relay handlers
#[derive(Clone)]
pub struct LlmState {
    inner: Arc<LlmStateInner>,
}

struct LlmStateInner {
    registry: AdaptorRegistry,
    metrics: RelayMetrics,
    stream_buffer: usize,
}

impl LlmState {
    /// Build every configured provider
    ///
    /// # Errors
    ///
    /// Returns an error if a provider's HTTP client cannot be built
    pub fn from_config(config: &LlmConfig) -> Result<Self, RelayError> {
        let registry = AdaptorRegistry::from_config(config)?;

        Ok(Self {
            inner: Arc::new(LlmStateInner {
                registry,
                metrics: RelayMetrics::new(),
                stream_buffer: config.stream_buffer.max(1),
            }),
        })
    }

    pub fn registry(&self) -> &AdaptorRegistry {
        &self.inner.registry
    }

    /// Capacity of each client's outbound frame queue
    pub fn stream_buffer(&self) -> usize {
        self.inner.stream_buffer
    }

    fn open_session<'a>(
        &'a self,
        request: &ChatRequest,
        context: &RequestContext,
        stream: bool,
    ) -> Result<(&'a Provider, RelaySession), RelayError> {
        request.validate()?;

        let resolved = self.inner.registry.resolve(&request.model)?;
        let session = RelaySession::new(
            resolved.provider.name(),
            &request.model,
            &resolved.model,
            stream,
            resolved.provider.credential(context),
        );

        tracing::debug!(
            session = session.id(),
            provider = session.provider(),
            model = session.model(),
            explicit = resolved.explicit,
            stream,
            "request routed"
        );

        Ok((resolved.provider, session))
    }

    /// Buffered completion
    ///
    /// # Errors
    ///
    /// Returns an error if the request is invalid, no provider matches, or
    /// the upstream call fails
    pub async fn complete(&self, request: &ChatRequest, context: &RequestContext) -> Result<SyncOutcome, RelayError> {
        let (provider, session) = self.open_session(request, context, false)?;

        match provider.execute(request, &session).await {
            Ok(outcome) => {
                let (result, usage) = sync_report(&outcome);
                self.report(&session, result, usage);
                Ok(outcome)
            }
            Err(e) => {
                self.report_error(&session, &e);
                Err(e)
            }
        }
    }

    /// Open an upstream stream and wait for its first event
    ///
    /// Anything that fails before the first event comes back as `Err`, so
    /// the caller can still answer with a plain error status.
    ///
    /// # Errors
    ///
    /// Returns an error if the request is invalid, no provider matches, the
    /// upstream rejects the call, or the stream fails before its first event
    pub async fn complete_stream(
        &self,
        request: &ChatRequest,
        context: &RequestContext,
    ) -> Result<StreamingRelay, RelayError> {
        let (provider, session) = self.open_session(request, context, true)?;

        let primed = match provider.open_stream(request, &session).await {
            Ok(events) => RelayBridge::start(&session, events).prime().await,
            Err(e) => Err(e),
        };

        match primed {
            Ok(relay) => {
                self.inner
                    .metrics
                    .record_first_event(session.provider(), session.elapsed());
                Ok(StreamingRelay {
                    state: self.clone(),
                    session,
                    relay,
                })
            }
            Err(e) => {
                self.report_error(&session, &e);
                Err(e)
            }
        }
    }

    fn report_error(&self, session: &RelaySession, error: &RelayError) {
        tracing::warn!(
            session = session.id(),
            provider = session.provider(),
            model = session.model(),
            stream = session.is_stream(),
            elapsed_ms = elapsed_ms(session),
            error = %error,
            "relay failed"
        );

        self.inner
            .metrics
            .record_request(session.provider(), session.is_stream(), Outcome::Error, session.elapsed());
    }

    /// Final log line and metrics for a session
    fn report(&self, session: &RelaySession, outcome: Outcome, usage: Option<Usage>) {
        let usage = usage.unwrap_or_default();

        tracing::info!(
            session = session.id(),
            provider = session.provider(),
            model = session.model(),
            stream = session.is_stream(),
            elapsed_ms = elapsed_ms(session),
            prompt_tokens = usage.prompt_tokens,
            completion_tokens = usage.completion_tokens,
            total_tokens = usage.total_tokens,
            outcome = outcome.as_str(),
            "relay finished"
        );

        let metrics = &self.inner.metrics;
        metrics.record_request(session.provider(), session.is_stream(), outcome, session.elapsed());
        metrics.record_usage(
            session.provider(),
            session.model(),
            u64::from(usage.prompt_tokens),
            u64::from(usage.completion_tokens),
        );
    }
}

/// A primed stream waiting for its response body
pub struct StreamingRelay {
    state: LlmState,
    session: RelaySession,
    relay: PrimedRelay,
}

impl StreamingRelay {
    pub const fn session(&self) -> &RelaySession {
        &self.session
    }

    /// Relay every event into `encoder`, then log and record the session
    pub async fn run(self, encoder: SseEncoder) -> RelayOutcome {
        let Self { state, session, relay } = self;
        let outcome = relay.run(encoder).await;

        match &outcome.end {
            RelayEnd::Completed => state.report(&session, Outcome::Success, outcome.usage),
            RelayEnd::Failed(e) => {
                tracing::warn!(session = session.id(), error = %e, "upstream failed mid-stream");
                state.report(&session, Outcome::Error, outcome.usage);
            }
            RelayEnd::Disconnected => {
                tracing::info!(
                    session = session.id(),
                    frames = outcome.frames_written,
                    "client disconnected"
                );
                state.report(&session, Outcome::Disconnected, outcome.usage);
            }
        }

        outcome
    }
}

/// Outcome and usage of a buffered answer
///
/// A relayed upstream error status still counts as a failed session.
fn sync_report(outcome: &SyncOutcome) -> (Outcome, Option<Usage>) {
    match outcome {
        SyncOutcome::Unified(response) => (Outcome::Success, response.usage),
        SyncOutcome::Passthrough(response) if response.status.is_success() => {
            (Outcome::Success, passthrough_usage(&response.body))
        }
        SyncOutcome::Passthrough(_) => (Outcome::Error, None),
    }
}

#[derive(Deserialize)]
struct UsageOnly {
    #[serde(default)]
    usage: Option<Usage>,
}

/// Usage from a relayed OpenAI body, if it parses
fn passthrough_usage(body: &[u8]) -> Option<Usage> {
    serde_json::from_slice::<UsageOnly>(body).ok()?.usage
}

fn elapsed_ms(session: &RelaySession) -> u64 {
    u64::try_from(session.elapsed().as_millis()).unwrap_or(u64::MAX)
}
