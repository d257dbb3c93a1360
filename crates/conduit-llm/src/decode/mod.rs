//! Stream decoders
//!
//! A decoder turns the frames of one upstream body into unified stream
//! events. [`drive`] owns the upstream body and the decoder, and yields
//! events lazily until the provider signals the end, the body closes, or
//! a frame fails to decode. After an error nothing more is yielded.

pub mod anthropic;
pub mod google;
pub mod passthrough;

use std::collections::VecDeque;
use std::io;
use std::pin::Pin;

use eventsource_stream::{EventStreamError, Eventsource};
use futures_util::{Stream, StreamExt, TryStreamExt, stream};
use tokio_util::codec::{FramedRead, LinesCodec, LinesCodecError};
use tokio_util::io::StreamReader;

use crate::error::RelayError;
use crate::types::{ByteStream, EventStream, StreamEvent};

pub use anthropic::AnthropicDecoder;
pub use google::GoogleDecoder;
pub use passthrough::PassthroughDecoder;

/// Text frames cut from an upstream body
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<String, RelayError>> + Send>>;

/// Outcome of decoding one frame
#[derive(Debug)]
pub enum Frame {
    /// Zero or more events; keep reading
    Continue(Vec<StreamEvent>),
    /// Provider signalled completion; stop reading
    End,
}

impl Frame {
    pub const fn skip() -> Self {
        Self::Continue(Vec::new())
    }
}

/// Per-provider frame decoder
pub trait FrameDecoder: Send + 'static {
    /// Decode one frame
    ///
    /// An error halts the session's event sequence.
    fn decode(&mut self, frame: &str) -> Result<Frame, RelayError>;

    /// Called once when the body closes without an end signal
    fn finish(&mut self) -> Vec<StreamEvent> {
        Vec::new()
    }
}

struct Pump<D> {
    frames: Option<FrameStream>,
    decoder: D,
    pending: VecDeque<StreamEvent>,
}

/// Drive `decoder` over `frames` as a lazy event sequence
///
/// The frame source, and with it the upstream body, is dropped as soon as
/// the sequence ends, whichever way it ends.
pub fn drive<D: FrameDecoder>(frames: FrameStream, decoder: D) -> EventStream {
    let pump = Pump {
        frames: Some(frames),
        decoder,
        pending: VecDeque::new(),
    };

    Box::pin(stream::unfold(pump, |mut pump| async move {
        loop {
            if let Some(event) = pump.pending.pop_front() {
                return Some((Ok(event), pump));
            }

            let frames = pump.frames.as_mut()?;
            let next = frames.next().await;

            match next {
                Some(Ok(frame)) => match pump.decoder.decode(&frame) {
                    Ok(Frame::Continue(events)) => pump.pending.extend(events),
                    Ok(Frame::End) => pump.frames = None,
                    Err(e) => {
                        pump.frames = None;
                        return Some((Err(e), pump));
                    }
                },
                Some(Err(e)) => {
                    pump.frames = None;
                    return Some((Err(e), pump));
                }
                None => {
                    pump.frames = None;
                    let tail = pump.decoder.finish();
                    pump.pending.extend(tail);
                }
            }
        }
    }))
}

/// Longest upstream line accepted before the stream is failed
pub const MAX_LINE_BYTES: usize = 4 * 1024 * 1024;

/// Split a body into lines, without their `\n` or `\r\n` terminator
///
/// A trailing line without a terminator is still yielded. A line longer
/// than [`MAX_LINE_BYTES`] fails with [`RelayError::UpstreamDecode`].
pub fn lines(body: ByteStream) -> FrameStream {
    lines_with_limit(body, MAX_LINE_BYTES)
}

fn lines_with_limit(body: ByteStream, max_length: usize) -> FrameStream {
    let reader = StreamReader::new(body.map_err(io::Error::other));
    let framed = FramedRead::new(reader, LinesCodec::new_with_max_length(max_length));

    Box::pin(framed.map(|line| line.map_err(line_error)))
}

fn line_error(error: LinesCodecError) -> RelayError {
    match error {
        LinesCodecError::MaxLineLengthExceeded => {
            RelayError::UpstreamDecode("upstream line exceeds the maximum length".to_owned())
        }
        LinesCodecError::Io(e) => {
            let message = e.to_string();
            // transport failures travel through the reader wrapped in io::Error
            match e.into_inner().map(|inner| inner.downcast::<RelayError>()) {
                Some(Ok(relay)) => *relay,
                Some(Err(_)) | None => RelayError::UpstreamDecode(format!("invalid upstream line: {message}")),
            }
        }
    }
}

/// The `data` of every server-sent event in a body
pub fn sse_data(body: ByteStream) -> FrameStream {
    Box::pin(body.eventsource().map(|event| match event {
        Ok(event) => Ok(event.data),
        Err(EventStreamError::Transport(e)) => Err(e),
        Err(e) => Err(RelayError::UpstreamDecode(e.to_string())),
    }))
}
