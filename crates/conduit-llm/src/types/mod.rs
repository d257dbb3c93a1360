//! Unified request, response and stream types
//!
//! The unified schema is the OpenAI chat completions shape. Every
//! provider converts to and from it.

pub mod message;
pub mod request;
pub mod response;
pub mod stream;
pub mod tool;

pub use message::{Content, ContentPart, FunctionCall, ImageUrl, Message, Role, ToolCall};
pub use request::{ChatRequest, Stop, StreamOptions};
pub use response::{AssistantMessage, ChatResponse, Choice, CompletionTokensDetails, FinishReason, Usage};
pub use stream::{
    ByteStream, ChunkChoice, ChunkStamp, Delta, EventStream, FunctionCallDelta, StreamChunk, StreamEvent,
    ToolCallDelta,
};
pub use tool::{FunctionDefinition, NamedFunction, NamedToolChoice, ToolChoice, ToolChoiceMode, ToolDefinition};
