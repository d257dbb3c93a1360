use std::pin::Pin;

use bytes::Bytes;
use futures_util::Stream;
use serde::{Deserialize, Serialize};

use super::message::Role;
use super::response::{FinishReason, Usage};
use crate::error::RelayError;

/// Decoded events for one streaming session
pub type EventStream = Pin<Box<dyn Stream<Item = Result<StreamEvent, RelayError>> + Send>>;

/// Raw upstream body
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, RelayError>> + Send>>;

/// One unified stream event, as relayed to the client
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// A chunk synthesised by a decoder
    Chunk(StreamChunk),
    /// An upstream data payload relayed byte-for-byte
    ///
    /// `chunk` holds the parsed form when the payload was valid JSON, so
    /// usage can still be observed. Unparseable payloads are forwarded
    /// anyway.
    Verbatim { data: String, chunk: Option<StreamChunk> },
}

impl StreamEvent {
    /// Usage carried by this event, if any
    pub fn usage(&self) -> Option<&Usage> {
        match self {
            Self::Chunk(chunk) => chunk.usage.as_ref(),
            Self::Verbatim { chunk, .. } => chunk.as_ref().and_then(|chunk| chunk.usage.as_ref()),
        }
    }

    /// The structured chunk behind this event, if known
    pub const fn chunk(&self) -> Option<&StreamChunk> {
        match self {
            Self::Chunk(chunk) => Some(chunk),
            Self::Verbatim { chunk, .. } => chunk.as_ref(),
        }
    }

    /// Text fragment for the given choice index
    pub fn fragment(&self, index: u32) -> Option<&str> {
        self.chunk()?
            .choices
            .iter()
            .find(|choice| choice.index == index)
            .and_then(|choice| choice.delta.content.as_deref())
    }

    /// The `data:` payload for this event
    pub fn payload(&self) -> Result<String, RelayError> {
        match self {
            Self::Chunk(chunk) => serde_json::to_string(chunk).map_err(|e| RelayError::Internal(e.into())),
            Self::Verbatim { data, .. } => Ok(data.clone()),
        }
    }
}

/// `chat.completion.chunk` object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamChunk {
    #[serde(default)]
    pub id: String,
    #[serde(default = "chunk_object")]
    pub object: String,
    #[serde(default)]
    pub created: u64,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub choices: Vec<ChunkChoice>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

impl StreamChunk {
    /// A chunk with no choices yet
    pub fn new(stamp: &ChunkStamp) -> Self {
        Self {
            id: stamp.id.clone(),
            object: chunk_object(),
            created: stamp.created,
            model: stamp.model.clone(),
            choices: Vec::new(),
            usage: None,
        }
    }

    #[must_use]
    pub fn with_choice(mut self, choice: ChunkChoice) -> Self {
        self.choices.push(choice);
        self
    }

    #[must_use]
    pub fn with_usage(mut self, usage: Usage) -> Self {
        self.usage = Some(usage);
        self
    }
}

/// Identity shared by every chunk of one session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkStamp {
    pub id: String,
    pub model: String,
    pub created: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChunkChoice {
    #[serde(default)]
    pub index: u32,
    #[serde(default)]
    pub delta: Delta,
    /// Serialized as `null` while generation is in progress
    #[serde(default)]
    pub finish_reason: Option<FinishReason>,
}

impl ChunkChoice {
    pub fn content(index: u32, text: impl Into<String>) -> Self {
        Self {
            index,
            delta: Delta {
                content: Some(text.into()),
                ..Delta::default()
            },
            finish_reason: None,
        }
    }
}

/// Incremental message fields
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Delta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCallDelta>>,
}

/// Partial tool call within a delta
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallDelta {
    /// Position in the message's `tool_calls` array
    pub index: u32,
    /// Present on the first fragment only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function: Option<FunctionCallDelta>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FunctionCallDelta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Fragment of the arguments JSON
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<String>,
}

fn chunk_object() -> String {
    "chat.completion.chunk".to_owned()
}
