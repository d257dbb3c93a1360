//! Streaming relay between OpenAI-compatible clients and upstream LLM
//! providers
//!
//! Requests arrive in the unified (OpenAI chat completions) schema, are
//! routed to a configured provider, converted to its wire format, and the
//! answer is relayed back either as one JSON body or as an SSE stream.

#![allow(clippy::must_use_candidate, clippy::missing_errors_doc)]

pub mod adaptor;
pub mod bridge;
pub mod convert;
pub mod decode;
pub mod dispatch;
pub mod error;
#[cfg(feature = "http")]
mod handler;
pub mod protocol;
pub mod session;
pub mod sse;
pub mod state;
pub mod transport;
pub mod types;
pub mod usage;

pub use adaptor::{Adaptor, Provider, SyncOutcome};
pub use bridge::{RelayBridge, RelayEnd, RelayOutcome};
pub use dispatch::{AdaptorRegistry, Resolved};
pub use error::RelayError;
#[cfg(feature = "http")]
pub use handler::llm_router;
pub use session::RelaySession;
pub use state::{LlmState, StreamingRelay};
pub use types::{ChatRequest, ChatResponse, StreamChunk, StreamEvent, Usage};
