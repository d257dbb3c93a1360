//! Decoder for providers already speaking the unified chunk format

use super::{Frame, FrameDecoder};
use crate::error::RelayError;
use crate::types::{StreamChunk, StreamEvent};

const DATA_PREFIX: &str = "data: ";
const DONE: &str = "[DONE]";

/// Relays each `data:` line as is
///
/// Works on raw lines rather than parsed SSE events. Lines that are too
/// short or carry neither the data prefix nor the sentinel are keep-alives
/// or comments and are skipped. A payload that is not valid JSON is still
/// forwarded.
#[derive(Debug, Default)]
pub struct PassthroughDecoder {
    done_seen: bool,
    relayed: usize,
}

impl PassthroughDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub const fn done_seen(&self) -> bool {
        self.done_seen
    }
}

impl FrameDecoder for PassthroughDecoder {
    fn decode(&mut self, line: &str) -> Result<Frame, RelayError> {
        if line.len() < DATA_PREFIX.len() {
            return Ok(Frame::skip());
        }

        if !line.starts_with(DATA_PREFIX) && !line.starts_with(DONE) {
            return Ok(Frame::skip());
        }

        let payload = line.strip_prefix(DATA_PREFIX).unwrap_or(line);

        if payload.starts_with(DONE) {
            self.done_seen = true;
            return Ok(Frame::End);
        }

        let chunk = match serde_json::from_str::<StreamChunk>(payload) {
            Ok(chunk) => Some(chunk),
            Err(e) => {
                tracing::debug!(error = %e, "relaying unparseable upstream line verbatim");
                None
            }
        };

        self.relayed += 1;

        Ok(Frame::Continue(vec![StreamEvent::Verbatim {
            data: payload.to_owned(),
            chunk,
        }]))
    }

    fn finish(&mut self) -> Vec<StreamEvent> {
        if !self.done_seen {
            tracing::debug!(relayed = self.relayed, "upstream closed without [DONE]");
        }
        Vec::new()
    }
}
