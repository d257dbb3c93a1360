//! Accumulating decoder for the Anthropic Messages stream
//!
//! Anthropic sends many small typed events instead of one delta per
//! frame. The accumulator carries identity and usage across them and the
//! decoder emits a unified chunk only for text, tool input, and the final
//! usage update.

use std::collections::HashMap;

use http::StatusCode;

use super::{Frame, FrameDecoder};
use crate::convert::anthropic::{finish_reason, to_usage};
use crate::error::RelayError;
use crate::protocol::anthropic::{AnthropicBlockDelta, AnthropicStreamBlock, AnthropicStreamEvent};
use crate::types::message::function_kind;
use crate::types::{ChunkChoice, ChunkStamp, Delta, FunctionCallDelta, Role, StreamChunk, StreamEvent, ToolCallDelta, Usage};

/// Where the stream is in the message lifecycle
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum AccumulatorState {
    /// Waiting for `message_start`
    #[default]
    Idle,
    Accumulating(Accumulator),
    /// `message_stop` seen
    Finished,
}

/// Running record of one streamed message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Accumulator {
    /// Upstream message id
    pub id: String,
    /// Upstream model, as reported by the provider
    pub model: String,
    pub role: Role,
    pub usage: Usage,
    /// Newest text fragment; cleared once emitted
    pub fragment: String,
    role_sent: bool,
    /// Content block index to tool call index
    tool_blocks: HashMap<u32, u32>,
}

impl Accumulator {
    fn chunk(&mut self, stamp: &ChunkStamp, delta: Delta) -> StreamChunk {
        let role = (!self.role_sent).then_some(self.role);
        self.role_sent = true;

        let mut chunk = StreamChunk::new(stamp).with_choice(ChunkChoice {
            index: 0,
            delta: Delta { role, ..delta },
            finish_reason: None,
        });
        chunk.model.clone_from(&self.model);
        chunk
    }

    fn tool_delta(&mut self, stamp: &ChunkStamp, call: ToolCallDelta) -> StreamChunk {
        self.chunk(
            stamp,
            Delta {
                tool_calls: Some(vec![call]),
                ..Delta::default()
            },
        )
    }
}

/// Apply one provider event
///
/// Returns the next state and the chunks to emit. Pure, so the state
/// machine is testable without a stream.
pub fn transition(
    state: AccumulatorState,
    event: AnthropicStreamEvent,
    stamp: &ChunkStamp,
) -> (AccumulatorState, Vec<StreamChunk>) {
    let (mut acc, event) = match (state, event) {
        (AccumulatorState::Idle, AnthropicStreamEvent::MessageStart { message }) => {
            let usage = message.usage.as_ref().map(to_usage).unwrap_or_default();
            let acc = Accumulator {
                id: message.id,
                model: message.model,
                role: Role::Assistant,
                usage: Usage::new(usage.prompt_tokens, 0),
                fragment: String::new(),
                role_sent: false,
                tool_blocks: HashMap::new(),
            };
            return (AccumulatorState::Accumulating(acc), Vec::new());
        }
        (AccumulatorState::Accumulating(acc), event) => (acc, event),
        (state, _) => return (state, Vec::new()),
    };

    let chunks = match event {
        AnthropicStreamEvent::ContentBlockStart {
            content_block: AnthropicStreamBlock::Text { text },
            ..
        } if !text.is_empty() => {
            acc.fragment.push_str(&text);
            vec![emit_fragment(&mut acc, stamp)]
        }
        AnthropicStreamEvent::ContentBlockStart {
            index,
            content_block: AnthropicStreamBlock::ToolUse { id, name },
        } => {
            let tool_index = u32::try_from(acc.tool_blocks.len()).unwrap_or(u32::MAX);
            acc.tool_blocks.insert(index, tool_index);
            vec![acc.tool_delta(
                stamp,
                ToolCallDelta {
                    index: tool_index,
                    id: Some(id),
                    kind: Some(function_kind()),
                    function: Some(FunctionCallDelta {
                        name: Some(name),
                        arguments: Some(String::new()),
                    }),
                },
            )]
        }
        AnthropicStreamEvent::ContentBlockDelta {
            delta: AnthropicBlockDelta::TextDelta { text },
            ..
        } => {
            acc.fragment.push_str(&text);
            vec![emit_fragment(&mut acc, stamp)]
        }
        AnthropicStreamEvent::ContentBlockDelta {
            index,
            delta: AnthropicBlockDelta::InputJsonDelta { partial_json },
        } => match acc.tool_blocks.get(&index).copied() {
            Some(tool_index) => vec![acc.tool_delta(
                stamp,
                ToolCallDelta {
                    index: tool_index,
                    id: None,
                    kind: None,
                    function: Some(FunctionCallDelta {
                        name: None,
                        arguments: Some(partial_json),
                    }),
                },
            )],
            None => Vec::new(),
        },
        AnthropicStreamEvent::MessageDelta { delta, usage } => {
            if let Some(usage) = usage {
                let prompt = usage.prompt_tokens();
                let prompt = if prompt > 0 { prompt } else { acc.usage.prompt_tokens };
                acc.usage = Usage::new(prompt, usage.output_tokens);
            }

            let mut chunk = StreamChunk::new(stamp).with_usage(acc.usage);
            chunk.model.clone_from(&acc.model);
            chunk.choices.push(ChunkChoice {
                index: 0,
                delta: Delta::default(),
                finish_reason: delta.stop_reason.as_deref().map(finish_reason),
            });
            vec![chunk]
        }
        AnthropicStreamEvent::MessageStop => {
            tracing::debug!(upstream_id = %acc.id, "anthropic message complete");
            return (AccumulatorState::Finished, Vec::new());
        }
        _ => Vec::new(),
    };

    (AccumulatorState::Accumulating(acc), chunks)
}

fn emit_fragment(acc: &mut Accumulator, stamp: &ChunkStamp) -> StreamChunk {
    let text = std::mem::take(&mut acc.fragment);
    acc.chunk(
        stamp,
        Delta {
            content: Some(text),
            ..Delta::default()
        },
    )
}

/// Frame decoder wrapping [`transition`]
#[derive(Debug)]
pub struct AnthropicDecoder {
    state: AccumulatorState,
    stamp: ChunkStamp,
}

impl AnthropicDecoder {
    pub fn new(stamp: ChunkStamp) -> Self {
        Self {
            state: AccumulatorState::Idle,
            stamp,
        }
    }
}

impl FrameDecoder for AnthropicDecoder {
    fn decode(&mut self, frame: &str) -> Result<Frame, RelayError> {
        let event: AnthropicStreamEvent = serde_json::from_str(frame).map_err(|e| {
            tracing::warn!(error = %e, "malformed anthropic stream event");
            RelayError::UpstreamDecode(format!("malformed anthropic event: {e}"))
        })?;

        if let AnthropicStreamEvent::Error { error } = event {
            return Err(RelayError::UpstreamStatus {
                status: StatusCode::BAD_GATEWAY,
                body: format!("{}: {}", error.error_type, error.message),
            });
        }

        let state = std::mem::take(&mut self.state);
        let (state, chunks) = transition(state, event, &self.stamp);
        self.state = state;

        if self.state == AccumulatorState::Finished {
            return Ok(Frame::End);
        }

        Ok(Frame::Continue(chunks.into_iter().map(StreamEvent::Chunk).collect()))
    }
}
