//! Conversion to and from the Anthropic Messages API

use crate::error::RelayError;
use crate::protocol::anthropic::{
    AnthropicContentBlock, AnthropicImageSource, AnthropicMessage, AnthropicMetadata, AnthropicRequest,
    AnthropicResponse, AnthropicResponseBlock, AnthropicTool, AnthropicToolChoice, AnthropicUsage,
};
use crate::session::RelaySession;
use crate::types::{
    AssistantMessage, ChatRequest, ChatResponse, Choice, Content, ContentPart, FinishReason, FunctionCall, ImageUrl,
    Message, Role, ToolCall, ToolChoice, ToolChoiceMode, Usage,
};

/// Anthropic requires `max_tokens`; used when the client sends none
const DEFAULT_MAX_TOKENS: u32 = 4096;

/// Build a Messages API request
///
/// System messages are lifted into the top-level `system` field.
/// Consecutive turns with the same role are merged, since the API
/// expects user and assistant turns to alternate.
pub fn to_anthropic_request(request: &ChatRequest, session: &RelaySession) -> Result<AnthropicRequest, RelayError> {
    request.validate()?;

    let mut system: Vec<String> = Vec::new();
    let mut messages: Vec<AnthropicMessage> = Vec::new();

    for message in &request.messages {
        if message.role == Role::System {
            system.push(message.text());
            continue;
        }

        let converted = to_anthropic_message(message);

        match messages.last_mut() {
            Some(previous) if previous.role == converted.role => previous.content.extend(converted.content),
            _ => messages.push(converted),
        }
    }

    if messages.is_empty() {
        return Err(RelayError::RequestInvalid(
            "at least one non-system message is required".to_owned(),
        ));
    }

    let tools = request.tools.as_ref().map(|tools| {
        tools
            .iter()
            .map(|tool| AnthropicTool {
                name: tool.function.name.clone(),
                description: tool.function.description.clone(),
                input_schema: tool
                    .function
                    .parameters
                    .clone()
                    .unwrap_or_else(|| serde_json::json!({"type": "object"})),
            })
            .collect()
    });

    Ok(AnthropicRequest {
        model: session.model().to_owned(),
        max_tokens: request.output_limit().unwrap_or(DEFAULT_MAX_TOKENS),
        system: (!system.is_empty()).then(|| system.join("\n")),
        messages,
        temperature: request.temperature,
        top_p: request.top_p,
        stop_sequences: request.stop_sequences(),
        stream: session.is_stream(),
        tools,
        tool_choice: request.tool_choice.as_ref().map(to_anthropic_tool_choice),
        metadata: request.user.clone().map(|user_id| AnthropicMetadata { user_id }),
    })
}

fn to_anthropic_message(message: &Message) -> AnthropicMessage {
    if message.role == Role::Tool {
        return AnthropicMessage {
            role: "user",
            content: vec![AnthropicContentBlock::ToolResult {
                tool_use_id: message.tool_call_id.clone().unwrap_or_default(),
                content: message.text(),
            }],
        };
    }

    let role = match message.role {
        Role::Assistant => "assistant",
        Role::User | Role::System | Role::Tool => "user",
    };

    let mut content = match &message.content {
        Some(Content::Text(text)) if !text.is_empty() => vec![AnthropicContentBlock::Text { text: text.clone() }],
        Some(Content::Parts(parts)) => parts.iter().map(to_anthropic_block).collect(),
        Some(Content::Text(_)) | None => Vec::new(),
    };

    for call in message.tool_calls.iter().flatten() {
        let input = serde_json::from_str(&call.function.arguments).unwrap_or_else(|_| serde_json::json!({}));
        content.push(AnthropicContentBlock::ToolUse {
            id: call.id.clone(),
            name: call.function.name.clone(),
            input,
        });
    }

    AnthropicMessage { role, content }
}

fn to_anthropic_block(part: &ContentPart) -> AnthropicContentBlock {
    match part {
        ContentPart::Text { text } => AnthropicContentBlock::Text { text: text.clone() },
        ContentPart::ImageUrl { image_url } => AnthropicContentBlock::Image {
            source: to_image_source(image_url),
        },
    }
}

fn to_image_source(image: &ImageUrl) -> AnthropicImageSource {
    match image.as_inline_data() {
        Some((media_type, data)) => AnthropicImageSource::Base64 {
            media_type: media_type.to_owned(),
            data: data.to_owned(),
        },
        None => AnthropicImageSource::Url { url: image.url.clone() },
    }
}

fn to_anthropic_tool_choice(choice: &ToolChoice) -> AnthropicToolChoice {
    match choice {
        ToolChoice::Mode(ToolChoiceMode::None) => AnthropicToolChoice {
            choice_type: "none",
            name: None,
        },
        ToolChoice::Mode(ToolChoiceMode::Auto) => AnthropicToolChoice {
            choice_type: "auto",
            name: None,
        },
        ToolChoice::Mode(ToolChoiceMode::Required) => AnthropicToolChoice {
            choice_type: "any",
            name: None,
        },
        ToolChoice::Named(named) => AnthropicToolChoice {
            choice_type: "tool",
            name: Some(named.function.name.clone()),
        },
    }
}

/// Map an Anthropic `stop_reason` to a unified finish reason
pub fn finish_reason(stop_reason: &str) -> FinishReason {
    match stop_reason {
        "end_turn" | "stop_sequence" | "pause_turn" => FinishReason::Stop,
        "max_tokens" => FinishReason::Length,
        "tool_use" => FinishReason::ToolCalls,
        "refusal" => FinishReason::ContentFilter,
        _ => FinishReason::Other,
    }
}

pub(crate) const fn to_usage(usage: &AnthropicUsage) -> Usage {
    Usage::new(usage.prompt_tokens(), usage.output_tokens)
}

/// Map a complete Messages API response
pub fn from_anthropic_response(response: AnthropicResponse, created: u64) -> ChatResponse {
    let mut text = String::new();
    let mut tool_calls = Vec::new();

    for block in response.content {
        match block {
            AnthropicResponseBlock::Text { text: fragment } => text.push_str(&fragment),
            AnthropicResponseBlock::ToolUse { id, name, input } => tool_calls.push(ToolCall {
                id,
                kind: crate::types::message::function_kind(),
                function: FunctionCall {
                    name,
                    arguments: input.to_string(),
                },
            }),
            AnthropicResponseBlock::Unknown => {}
        }
    }

    let content = if text.is_empty() && !tool_calls.is_empty() {
        None
    } else {
        Some(text)
    };

    ChatResponse {
        id: response.id,
        object: "chat.completion".to_owned(),
        created,
        model: response.model,
        choices: vec![Choice {
            index: 0,
            message: AssistantMessage::new(content, (!tool_calls.is_empty()).then_some(tool_calls)),
            finish_reason: response.stop_reason.as_deref().map(finish_reason),
        }],
        usage: Some(to_usage(&response.usage)),
    }
}
