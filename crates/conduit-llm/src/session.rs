use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use secrecy::SecretString;
use tokio_util::sync::CancellationToken;

use crate::types::ChunkStamp;

/// Per-request relay state
///
/// Owned by the task handling the request and dropped when the response
/// terminates. The cancellation token fires when the client goes away.
#[derive(Debug)]
pub struct RelaySession {
    id: String,
    provider: String,
    requested_model: String,
    model: String,
    stream: bool,
    credential: Option<SecretString>,
    started_at: Instant,
    created: u64,
    cancellation: CancellationToken,
}

impl RelaySession {
    /// `model` is the identifier sent upstream, which may differ from
    /// the one the client asked for after routing.
    pub fn new(
        provider: impl Into<String>,
        requested_model: impl Into<String>,
        model: impl Into<String>,
        stream: bool,
        credential: Option<SecretString>,
    ) -> Self {
        let created = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);

        Self {
            id: format!("chatcmpl-{}", uuid::Uuid::new_v4().simple()),
            provider: provider.into(),
            requested_model: requested_model.into(),
            model: model.into(),
            stream,
            credential,
            started_at: Instant::now(),
            created,
            cancellation: CancellationToken::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn provider(&self) -> &str {
        &self.provider
    }

    pub fn requested_model(&self) -> &str {
        &self.requested_model
    }

    /// Model identifier sent upstream
    pub fn model(&self) -> &str {
        &self.model
    }

    pub const fn is_stream(&self) -> bool {
        self.stream
    }

    pub const fn credential(&self) -> Option<&SecretString> {
        self.credential.as_ref()
    }

    pub const fn created(&self) -> u64 {
        self.created
    }

    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Token cancelled when the client disconnects
    pub const fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    /// Identity stamped on synthesised chunks
    pub fn stamp(&self) -> ChunkStamp {
        ChunkStamp {
            id: self.id.clone(),
            model: self.model.clone(),
            created: self.created,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stamp_is_stable_for_the_session() {
        let session = RelaySession::new("anthropic", "anthropic/claude-3-5-haiku", "claude-3-5-haiku", true, None);

        assert!(session.id().starts_with("chatcmpl-"));
        assert_eq!(session.stamp(), session.stamp());
        assert_eq!(session.stamp().model, "claude-3-5-haiku");
        assert_eq!(session.requested_model(), "anthropic/claude-3-5-haiku");
    }

    #[test]
    fn sessions_get_distinct_ids() {
        let a = RelaySession::new("openai", "m", "m", false, None);
        let b = RelaySession::new("openai", "m", "m", false, None);
        assert_ne!(a.id(), b.id());
    }
}
