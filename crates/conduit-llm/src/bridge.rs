//! Producer/consumer bridge between a decoded upstream stream and the
//! client's SSE body
//!
//! The producer task drives the decoder and owns the upstream body. It
//! hands events over an unbounded data channel and at most one error over
//! a oneshot channel, then exits, dropping the body on every path. The
//! consumer (the response writer) selects between cancellation, client
//! liveness, new data, and the error, and guarantees the sentinel is
//! written exactly once unless the client is already gone.

use futures_util::StreamExt;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::{CancellationToken, DropGuard};

use crate::error::RelayError;
use crate::session::RelaySession;
use crate::sse::SseEncoder;
use crate::types::{EventStream, StreamEvent, Usage};
use crate::usage::UsageAggregator;

/// How a relayed stream ended
#[derive(Debug)]
pub enum RelayEnd {
    /// Upstream finished; sentinel written
    Completed,
    /// Upstream failed after the stream started; error frame and sentinel written
    Failed(RelayError),
    /// Client went away; nothing more written
    Disconnected,
}

#[derive(Debug)]
pub struct RelayOutcome {
    pub end: RelayEnd,
    pub frames_written: usize,
    /// Aggregated usage over every event relayed
    pub usage: Option<Usage>,
}

/// Channels shared by the started and primed stages
struct Channels {
    data: mpsc::UnboundedReceiver<StreamEvent>,
    error: oneshot::Receiver<RelayError>,
    error_closed: bool,
    cancel: CancellationToken,
    producer: JoinHandle<()>,
    /// Cancels the producer if the relay is dropped at any stage
    _guard: DropGuard,
}

pub struct RelayBridge;

impl RelayBridge {
    /// Spawn the producer for `events`
    ///
    /// The producer stops on the session's cancellation token.
    pub fn start(session: &RelaySession, events: EventStream) -> StartedRelay {
        let cancel = session.cancellation().clone();
        let (data_tx, data_rx) = mpsc::unbounded_channel();
        let (error_tx, error_rx) = oneshot::channel();

        let producer = tokio::spawn(produce(events, data_tx, error_tx, cancel.clone()));

        StartedRelay {
            channels: Channels {
                data: data_rx,
                error: error_rx,
                error_closed: false,
                _guard: cancel.clone().drop_guard(),
                cancel,
                producer,
            },
        }
    }
}

async fn produce(
    mut events: EventStream,
    data: mpsc::UnboundedSender<StreamEvent>,
    error: oneshot::Sender<RelayError>,
    cancel: CancellationToken,
) {
    loop {
        let next = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                tracing::debug!("relay cancelled, releasing upstream");
                break;
            }
            next = events.next() => next,
        };

        match next {
            Some(Ok(event)) => {
                if data.send(event).is_err() {
                    break;
                }
            }
            Some(Err(e)) => {
                // error goes out before the data channel closes
                if let Err(e) = error.send(e) {
                    tracing::debug!(error = %e, "upstream error after the consumer left");
                }
                break;
            }
            None => break,
        }
    }

    drop(events);
}

/// A relay whose producer is running but nothing has been sent to the
/// client yet
pub struct StartedRelay {
    channels: Channels,
}

impl StartedRelay {
    /// Wait for the first event
    ///
    /// An upstream failure before any event is returned as an error, while
    /// the response status can still change. An upstream that closes with
    /// no events at all primes successfully and relays only the sentinel.
    pub async fn prime(mut self) -> Result<PrimedRelay, RelayError> {
        let channels = &mut self.channels;

        let first = loop {
            tokio::select! {
                biased;
                event = channels.data.recv() => {
                    if event.is_none() && let Some(e) = channels.take_error() {
                        return Err(e);
                    }
                    break event;
                }
                result = &mut channels.error, if !channels.error_closed => match result {
                    Ok(e) => return Err(e),
                    Err(_) => channels.error_closed = true,
                },
            }
        };

        Ok(PrimedRelay {
            first,
            channels: self.channels,
        })
    }
}

impl Channels {
    /// A pending error, if the producer sent one
    fn take_error(&mut self) -> Option<RelayError> {
        if self.error_closed {
            return None;
        }

        self.error_closed = true;
        self.error.try_recv().ok()
    }
}

/// A relay ready to stream to the client
pub struct PrimedRelay {
    first: Option<StreamEvent>,
    channels: Channels,
}

impl PrimedRelay {
    /// The first event, already taken off the data channel
    pub const fn first(&self) -> Option<&StreamEvent> {
        self.first.as_ref()
    }

    /// Drain events into `encoder` until the stream ends
    pub async fn run(self, mut encoder: SseEncoder) -> RelayOutcome {
        let Self { first, mut channels } = self;
        let mut usage = UsageAggregator::new();

        let mut end = None;

        if channels.cancel.is_cancelled() {
            end = Some(RelayEnd::Disconnected);
        } else if let Some(event) = first {
            end = relay_event(&mut encoder, &mut usage, &event).await;
        }

        let end = match end {
            Some(end) => end,
            None => consume(&mut channels, &mut encoder, &mut usage).await,
        };

        // producer exits promptly once cancelled or finished
        channels.cancel.cancel();
        if let Err(e) = (&mut channels.producer).await {
            tracing::error!(error = %e, "relay producer panicked");
        }

        RelayOutcome {
            end,
            frames_written: encoder.frames_written(),
            usage: usage.finish(),
        }
    }
}

async fn consume(channels: &mut Channels, encoder: &mut SseEncoder, usage: &mut UsageAggregator) -> RelayEnd {
    loop {
        if channels.cancel.is_cancelled() {
            return RelayEnd::Disconnected;
        }

        tokio::select! {
            biased;
            () = channels.cancel.cancelled() => return RelayEnd::Disconnected,
            () = encoder.closed() => return RelayEnd::Disconnected,
            event = channels.data.recv() => match event {
                Some(event) => {
                    if let Some(end) = relay_event(encoder, usage, &event).await {
                        return end;
                    }
                }
                None => {
                    return match channels.take_error() {
                        Some(e) => fail(encoder, e).await,
                        None => complete(encoder).await,
                    };
                }
            },
            result = &mut channels.error, if !channels.error_closed => match result {
                Ok(e) => return fail(encoder, e).await,
                Err(_) => channels.error_closed = true,
            },
        }
    }
}

/// Write one event; `Some` when the stream must stop
async fn relay_event(encoder: &mut SseEncoder, usage: &mut UsageAggregator, event: &StreamEvent) -> Option<RelayEnd> {
    if let Some(reported) = event.usage() {
        usage.observe(reported);
    }

    match encoder.send_event(event).await {
        Ok(()) => None,
        Err(RelayError::ClientDisconnected) => Some(RelayEnd::Disconnected),
        Err(e) => Some(fail(encoder, e).await),
    }
}

async fn complete(encoder: &mut SseEncoder) -> RelayEnd {
    match encoder.send_done().await {
        Ok(()) => RelayEnd::Completed,
        Err(_) => RelayEnd::Disconnected,
    }
}

async fn fail(encoder: &mut SseEncoder, error: RelayError) -> RelayEnd {
    if encoder.send_error(&error).await.is_err() || encoder.send_done().await.is_err() {
        return RelayEnd::Disconnected;
    }

    RelayEnd::Failed(error)
}
