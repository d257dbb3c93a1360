//! OpenAI-compatible payloads
//!
//! The unified schema already is the OpenAI wire format, so conversion is
//! a normalisation pass rather than a translation.

use crate::error::RelayError;
use crate::session::RelaySession;
use crate::types::{ChatRequest, StreamOptions};

/// Build the upstream payload for an OpenAI-compatible provider
///
/// The model is replaced with the routed upstream id. Streaming requests
/// without explicit stream options get `include_usage` switched on so the
/// final chunk reports token counts.
pub fn to_openai_request(request: &ChatRequest, session: &RelaySession) -> Result<ChatRequest, RelayError> {
    request.validate()?;

    let mut upstream = request.clone();
    upstream.model = session.model().to_owned();
    upstream.stream = session.is_stream();

    if upstream.stream {
        if upstream.stream_options.is_none() {
            upstream.stream_options = Some(StreamOptions { include_usage: true });
        }
    } else {
        upstream.stream_options = None;
    }

    Ok(upstream)
}
