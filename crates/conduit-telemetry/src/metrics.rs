//! Relay metric instruments
//!
//! Instruments come from the global meter provider. Without an exporter
//! that provider is a no-op, so recording is always safe.

use std::time::Duration;

use opentelemetry::KeyValue;
use opentelemetry::global;
use opentelemetry::metrics::{Counter, Histogram};

pub const RELAY_REQUEST_DURATION: &str = "relay.request.duration";
pub const RELAY_TIME_TO_FIRST_EVENT: &str = "relay.time_to_first_event";
pub const RELAY_TOKEN_USAGE: &str = "relay.token.usage";

/// How a relay session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Error,
    Disconnected,
}

impl Outcome {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Error => "error",
            Self::Disconnected => "disconnected",
        }
    }
}

/// Instruments shared by every relay session
#[derive(Debug, Clone)]
pub struct RelayMetrics {
    duration: Histogram<f64>,
    first_event: Histogram<f64>,
    tokens: Counter<u64>,
}

impl Default for RelayMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl RelayMetrics {
    pub fn new() -> Self {
        let meter = global::meter("conduit");

        Self {
            duration: meter
                .f64_histogram(RELAY_REQUEST_DURATION)
                .with_unit("s")
                .with_description("Wall time of a relay session")
                .build(),
            first_event: meter
                .f64_histogram(RELAY_TIME_TO_FIRST_EVENT)
                .with_unit("s")
                .with_description("Time until the first upstream stream event")
                .build(),
            tokens: meter
                .u64_counter(RELAY_TOKEN_USAGE)
                .with_description("Tokens reported by upstream providers")
                .build(),
        }
    }

    pub fn record_request(&self, provider: &str, stream: bool, outcome: Outcome, elapsed: Duration) {
        self.duration.record(
            elapsed.as_secs_f64(),
            &[
                KeyValue::new("provider", provider.to_owned()),
                KeyValue::new("stream", stream),
                KeyValue::new("outcome", outcome.as_str()),
            ],
        );
    }

    pub fn record_first_event(&self, provider: &str, elapsed: Duration) {
        self.first_event
            .record(elapsed.as_secs_f64(), &[KeyValue::new("provider", provider.to_owned())]);
    }

    pub fn record_usage(&self, provider: &str, model: &str, prompt_tokens: u64, completion_tokens: u64) {
        for (kind, count) in [("prompt", prompt_tokens), ("completion", completion_tokens)] {
            self.tokens.add(
                count,
                &[
                    KeyValue::new("provider", provider.to_owned()),
                    KeyValue::new("model", model.to_owned()),
                    KeyValue::new("token.type", kind),
                ],
            );
        }
    }
}
