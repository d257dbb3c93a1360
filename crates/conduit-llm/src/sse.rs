//! Server-sent event framing for the client connection

use bytes::Bytes;
use http::header::{CACHE_CONTROL, CONNECTION, CONTENT_TYPE, TRANSFER_ENCODING};
use http::{HeaderMap, HeaderName, HeaderValue};
use tokio::sync::mpsc;

use crate::error::RelayError;
use crate::types::StreamEvent;

/// Terminal sentinel frame
pub const DONE_FRAME: &[u8] = b"data: [DONE]\n\n";

const DATA_PREFIX: &str = "data: ";

/// Frame a payload as one SSE event
///
/// A leading `data: ` is not doubled. Embedded newlines are split into
/// several `data:` lines so no blank line can end the event early.
pub fn frame(payload: &str) -> Bytes {
    let payload = payload.strip_prefix(DATA_PREFIX).unwrap_or(payload);
    let mut out = String::with_capacity(payload.len() + DATA_PREFIX.len() + 2);

    for line in payload.split('\n') {
        let line = line.strip_suffix('\r').unwrap_or(line);
        out.push_str(DATA_PREFIX);
        out.push_str(line);
        out.push('\n');
    }
    out.push('\n');

    Bytes::from(out)
}

/// Response headers for an event stream
pub fn event_stream_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/event-stream"));
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert(CONNECTION, HeaderValue::from_static("keep-alive"));
    headers.insert(TRANSFER_ENCODING, HeaderValue::from_static("chunked"));
    headers.insert(HeaderName::from_static("x-accel-buffering"), HeaderValue::from_static("no"));
    headers
}

/// Writes frames to the client's response body
///
/// Every frame is sent as its own body chunk, so the server writes it out
/// without waiting for more. Once the sentinel is written the encoder
/// refuses further frames.
#[derive(Debug)]
pub struct SseEncoder {
    sink: mpsc::Sender<Bytes>,
    done: bool,
    frames_written: usize,
}

impl SseEncoder {
    /// Encoder plus the receiving end that feeds the response body
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Bytes>) {
        let (sink, body) = mpsc::channel(capacity.max(1));

        let encoder = Self {
            sink,
            done: false,
            frames_written: 0,
        };

        (encoder, body)
    }

    pub async fn send_event(&mut self, event: &StreamEvent) -> Result<(), RelayError> {
        let payload = event.payload()?;
        self.write(frame(&payload)).await
    }

    /// Send a pre-formatted payload
    pub async fn send_raw(&mut self, payload: &str) -> Result<(), RelayError> {
        self.write(frame(payload)).await
    }

    /// In-band error frame for failures after the stream started
    pub async fn send_error(&mut self, error: &RelayError) -> Result<(), RelayError> {
        self.send_raw(&error.to_sse_payload()).await
    }

    /// Write the sentinel; later calls are no-ops
    pub async fn send_done(&mut self) -> Result<(), RelayError> {
        if self.done {
            tracing::debug!("sentinel already written");
            return Ok(());
        }

        self.write(Bytes::from_static(DONE_FRAME)).await?;
        self.done = true;
        Ok(())
    }

    /// Resolves once the client side of the body is gone
    pub async fn closed(&self) {
        self.sink.closed().await;
    }

    pub fn is_closed(&self) -> bool {
        self.sink.is_closed()
    }

    pub const fn is_done(&self) -> bool {
        self.done
    }

    pub const fn frames_written(&self) -> usize {
        self.frames_written
    }

    async fn write(&mut self, frame: Bytes) -> Result<(), RelayError> {
        if self.done {
            tracing::warn!("dropping frame written after the sentinel");
            return Ok(());
        }

        self.sink
            .send(frame)
            .await
            .map_err(|_| RelayError::ClientDisconnected)?;
        self.frames_written += 1;

        Ok(())
    }
}
