//! Conversion to and from the Google Generative Language API

use std::collections::HashMap;

use crate::error::RelayError;
use crate::protocol::google::{
    GoogleCandidate, GoogleContent, GoogleFileData, GoogleFunctionCall, GoogleFunctionCallingConfig,
    GoogleFunctionDeclaration, GoogleFunctionResponse, GoogleGenerationConfig, GoogleInlineData, GooglePart,
    GoogleRequest, GoogleResponse, GoogleTool, GoogleToolConfig, GoogleUsageMetadata,
};
use crate::session::RelaySession;
use crate::types::message::function_kind;
use crate::types::{
    AssistantMessage, ChatRequest, ChatResponse, Choice, ChunkChoice, ChunkStamp, ContentPart, Delta, FinishReason,
    FunctionCall, FunctionCallDelta, Message, Role, StreamChunk, ToolCall, ToolCallDelta, ToolChoice, ToolChoiceMode,
    Usage,
};

/// Build a `generateContent` request
///
/// The model travels in the URL, not the body. Tool results are matched
/// back to the function name of the assistant call they answer.
pub fn to_google_request(request: &ChatRequest, _session: &RelaySession) -> Result<GoogleRequest, RelayError> {
    request.validate()?;

    let mut system_parts = Vec::new();
    let mut contents: Vec<GoogleContent> = Vec::new();
    let mut call_names: HashMap<&str, &str> = HashMap::new();

    for message in &request.messages {
        let content = match message.role {
            Role::System => {
                system_parts.push(GooglePart::text(message.text()));
                continue;
            }
            Role::User => to_google_content(message, "user"),
            Role::Assistant => {
                for call in message.tool_calls.iter().flatten() {
                    call_names.insert(&call.id, &call.function.name);
                }
                to_google_content(message, "model")
            }
            Role::Tool => {
                let id = message.tool_call_id.as_deref().unwrap_or_default();
                let name = call_names.get(id).copied().unwrap_or(id);
                let text = message.text();
                let response = serde_json::from_str(&text).unwrap_or_else(|_| serde_json::json!({ "result": text }));

                GoogleContent {
                    role: Some("user".to_owned()),
                    parts: vec![GooglePart {
                        function_response: Some(GoogleFunctionResponse {
                            name: name.to_owned(),
                            response,
                        }),
                        ..GooglePart::default()
                    }],
                }
            }
        };

        match contents.last_mut() {
            Some(previous) if previous.role == content.role => previous.parts.extend(content.parts),
            _ => contents.push(content),
        }
    }

    if contents.is_empty() {
        return Err(RelayError::RequestInvalid(
            "at least one non-system message is required".to_owned(),
        ));
    }

    let tools = request.tools.as_ref().map(|tools| {
        vec![GoogleTool {
            function_declarations: tools
                .iter()
                .map(|tool| GoogleFunctionDeclaration {
                    name: tool.function.name.clone(),
                    description: tool.function.description.clone(),
                    parameters: tool.function.parameters.clone(),
                })
                .collect(),
        }]
    });

    let response_mime_type = request
        .response_format
        .as_ref()
        .and_then(|format| format.get("type"))
        .and_then(serde_json::Value::as_str)
        .filter(|kind| matches!(*kind, "json_object" | "json_schema"))
        .map(|_| "application/json".to_owned());

    Ok(GoogleRequest {
        contents,
        system_instruction: (!system_parts.is_empty()).then(|| GoogleContent {
            role: None,
            parts: system_parts,
        }),
        generation_config: Some(GoogleGenerationConfig {
            temperature: request.temperature,
            top_p: request.top_p,
            max_output_tokens: request.output_limit(),
            stop_sequences: request.stop_sequences(),
            candidate_count: request.n,
            presence_penalty: request.presence_penalty,
            frequency_penalty: request.frequency_penalty,
            seed: request.seed,
            response_mime_type,
        }),
        tools,
        tool_config: request.tool_choice.as_ref().map(to_tool_config),
    })
}

fn to_google_content(message: &Message, role: &str) -> GoogleContent {
    let mut parts = Vec::new();

    if let Some(content) = &message.content {
        if let Some(text) = content.as_text()
            && !text.is_empty()
        {
            parts.push(GooglePart::text(text));
        }

        for part in content.as_parts().unwrap_or_default() {
            parts.push(match part {
                ContentPart::Text { text } => GooglePart::text(text.clone()),
                ContentPart::ImageUrl { image_url } => match image_url.as_inline_data() {
                    Some((mime_type, data)) => GooglePart {
                        inline_data: Some(GoogleInlineData {
                            mime_type: mime_type.to_owned(),
                            data: data.to_owned(),
                        }),
                        ..GooglePart::default()
                    },
                    None => GooglePart {
                        file_data: Some(GoogleFileData {
                            mime_type: None,
                            file_uri: image_url.url.clone(),
                        }),
                        ..GooglePart::default()
                    },
                },
            });
        }
    }

    for call in message.tool_calls.iter().flatten() {
        let args = serde_json::from_str(&call.function.arguments).unwrap_or_else(|_| serde_json::json!({}));
        parts.push(GooglePart {
            function_call: Some(GoogleFunctionCall {
                name: call.function.name.clone(),
                args,
            }),
            ..GooglePart::default()
        });
    }

    GoogleContent {
        role: Some(role.to_owned()),
        parts,
    }
}

fn to_tool_config(choice: &ToolChoice) -> GoogleToolConfig {
    let (mode, allowed_function_names) = match choice {
        ToolChoice::Mode(ToolChoiceMode::None) => ("NONE", None),
        ToolChoice::Mode(ToolChoiceMode::Auto) => ("AUTO", None),
        ToolChoice::Mode(ToolChoiceMode::Required) => ("ANY", None),
        ToolChoice::Named(named) => ("ANY", Some(vec![named.function.name.clone()])),
    };

    GoogleToolConfig {
        function_calling_config: GoogleFunctionCallingConfig {
            mode,
            allowed_function_names,
        },
    }
}

/// Map a Google `finishReason`
pub fn finish_reason(reason: &str) -> FinishReason {
    match reason {
        "STOP" => FinishReason::Stop,
        "MAX_TOKENS" => FinishReason::Length,
        "SAFETY" | "RECITATION" | "BLOCKLIST" | "PROHIBITED_CONTENT" | "SPII" | "IMAGE_SAFETY" => {
            FinishReason::ContentFilter
        }
        _ => FinishReason::Other,
    }
}

/// Thinking tokens count as completion and are broken out as reasoning
pub fn to_usage(metadata: &GoogleUsageMetadata) -> Usage {
    let completion = metadata
        .candidates_token_count
        .saturating_add(metadata.thoughts_token_count);
    let usage = Usage::new(metadata.prompt_token_count, completion);

    if metadata.thoughts_token_count > 0 {
        usage.with_reasoning_tokens(metadata.thoughts_token_count)
    } else {
        usage
    }
}

/// Visible text and function calls of one candidate
struct CandidateParts {
    text: String,
    calls: Vec<(String, String)>,
}

fn split_candidate(candidate: &GoogleCandidate) -> CandidateParts {
    let mut text = String::new();
    let mut calls = Vec::new();

    for part in &candidate.content.parts {
        if let Some(fragment) = part.text.as_deref().filter(|_| !part.thought) {
            text.push_str(fragment);
        }

        if let Some(call) = &part.function_call {
            calls.push((call.name.clone(), call.args.to_string()));
        }
    }

    CandidateParts { text, calls }
}

fn candidate_finish_reason(candidate: &GoogleCandidate, has_calls: bool) -> Option<FinishReason> {
    candidate.finish_reason.as_deref().map(|reason| match finish_reason(reason) {
        FinishReason::Stop if has_calls => FinishReason::ToolCalls,
        other => other,
    })
}

fn new_call_id() -> String {
    format!("call_{}", uuid::Uuid::new_v4().simple())
}

/// Map one streamed response object to a chunk
///
/// `next_tool_index` numbers function calls across the whole stream.
pub fn to_stream_chunk(response: &GoogleResponse, stamp: &ChunkStamp, next_tool_index: &mut u32) -> StreamChunk {
    let mut chunk = StreamChunk::new(stamp);

    for (position, candidate) in (0_u32..).zip(&response.candidates) {
        let parts = split_candidate(candidate);
        let finish_reason = candidate_finish_reason(candidate, !parts.calls.is_empty());

        let tool_calls: Vec<ToolCallDelta> = parts
            .calls
            .into_iter()
            .map(|(name, arguments)| {
                let index = *next_tool_index;
                *next_tool_index += 1;

                ToolCallDelta {
                    index,
                    id: Some(new_call_id()),
                    kind: Some(function_kind()),
                    function: Some(FunctionCallDelta {
                        name: Some(name),
                        arguments: Some(arguments),
                    }),
                }
            })
            .collect();

        chunk.choices.push(ChunkChoice {
            index: candidate.index.unwrap_or(position),
            delta: Delta {
                role: None,
                content: (!parts.text.is_empty()).then_some(parts.text),
                tool_calls: (!tool_calls.is_empty()).then_some(tool_calls),
            },
            finish_reason,
        });
    }

    if let Some(metadata) = &response.usage_metadata {
        chunk.usage = Some(to_usage(metadata));
    }

    chunk
}

/// Map a complete `generateContent` response
pub fn from_google_response(response: &GoogleResponse, session: &RelaySession) -> ChatResponse {
    let choices = (0_u32..)
        .zip(&response.candidates)
        .map(|(position, candidate)| {
            let parts = split_candidate(candidate);
            let finish_reason = candidate_finish_reason(candidate, !parts.calls.is_empty());

            let tool_calls: Vec<ToolCall> = parts
                .calls
                .into_iter()
                .map(|(name, arguments)| ToolCall {
                    id: new_call_id(),
                    kind: function_kind(),
                    function: FunctionCall { name, arguments },
                })
                .collect();

            let content = if parts.text.is_empty() && !tool_calls.is_empty() {
                None
            } else {
                Some(parts.text)
            };

            Choice {
                index: candidate.index.unwrap_or(position),
                message: AssistantMessage::new(content, (!tool_calls.is_empty()).then_some(tool_calls)),
                finish_reason,
            }
        })
        .collect();

    ChatResponse {
        id: session.id().to_owned(),
        object: "chat.completion".to_owned(),
        created: session.created(),
        model: response
            .model_version
            .clone()
            .unwrap_or_else(|| session.model().to_owned()),
        choices,
        usage: response.usage_metadata.as_ref().map(to_usage),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> RelaySession {
        RelaySession::new("google", "gemini-2.0-flash", "gemini-2.0-flash", false, None)
    }

    fn response(value: serde_json::Value) -> GoogleResponse {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn request_maps_roles_and_config() {
        let inbound: ChatRequest = serde_json::from_value(serde_json::json!({
            "model": "gemini-2.0-flash",
            "messages": [
                {"role": "system", "content": "be brief"},
                {"role": "user", "content": "hi"},
                {"role": "assistant", "content": "hello"},
                {"role": "user", "content": "bye"}
            ],
            "max_tokens": 64,
            "stop": "END"
        }))
        .unwrap();

        let upstream = to_google_request(&inbound, &session()).unwrap();

        insta::assert_json_snapshot!(upstream, @r#"
        {
          "contents": [
            {
              "role": "user",
              "parts": [
                {
                  "text": "hi"
                }
              ]
            },
            {
              "role": "model",
              "parts": [
                {
                  "text": "hello"
                }
              ]
            },
            {
              "role": "user",
              "parts": [
                {
                  "text": "bye"
                }
              ]
            }
          ],
          "systemInstruction": {
            "parts": [
              {
                "text": "be brief"
              }
            ]
          },
          "generationConfig": {
            "maxOutputTokens": 64,
            "stopSequences": [
              "END"
            ]
          }
        }
        "#);
    }

    #[test]
    fn tool_results_use_the_function_name() {
        let inbound: ChatRequest = serde_json::from_value(serde_json::json!({
            "model": "gemini",
            "messages": [
                {"role": "user", "content": "weather?"},
                {"role": "assistant", "tool_calls": [
                    {"id": "call_a", "type": "function", "function": {"name": "weather", "arguments": "{\"city\":\"Oslo\"}"}}
                ]},
                {"role": "tool", "tool_call_id": "call_a", "content": "{\"temp\":3}"}
            ]
        }))
        .unwrap();

        let upstream = to_google_request(&inbound, &session()).unwrap();
        let result = upstream.contents[2].parts[0].function_response.as_ref().unwrap();

        assert_eq!(result.name, "weather");
        assert_eq!(result.response, serde_json::json!({"temp": 3}));
    }

    #[test]
    fn usage_counts_thoughts_as_completion() {
        let usage = to_usage(&GoogleUsageMetadata {
            prompt_token_count: 8,
            candidates_token_count: 5,
            thoughts_token_count: 20,
            total_token_count: 33,
        });

        assert_eq!(usage.prompt_tokens, 8);
        assert_eq!(usage.completion_tokens, 25);
        assert_eq!(usage.total_tokens, 33);
        assert_eq!(usage.reasoning_tokens(), Some(20));
    }

    #[test]
    fn chunk_skips_thought_text() {
        let frame = response(serde_json::json!({
            "candidates": [{
                "content": {"role": "model", "parts": [
                    {"text": "planning...", "thought": true},
                    {"text": "Hello"}
                ]},
                "index": 0
            }]
        }));
        let stamp = session().stamp();

        let chunk = to_stream_chunk(&frame, &stamp, &mut 0);

        assert_eq!(chunk.choices[0].delta.content.as_deref(), Some("Hello"));
        assert_eq!(chunk.id, stamp.id);
        assert!(chunk.usage.is_none());
    }

    #[test]
    fn function_calls_finish_with_tool_calls() {
        let frame = response(serde_json::json!({
            "candidates": [{
                "content": {"role": "model", "parts": [
                    {"functionCall": {"name": "weather", "args": {"city": "Oslo"}}}
                ]},
                "finishReason": "STOP"
            }]
        }));
        let mut next = 2;

        let chunk = to_stream_chunk(&frame, &session().stamp(), &mut next);
        let choice = &chunk.choices[0];
        let call = &choice.delta.tool_calls.as_ref().unwrap()[0];

        assert_eq!(choice.finish_reason, Some(FinishReason::ToolCalls));
        assert_eq!(call.index, 2);
        assert_eq!(next, 3);
        assert!(call.id.as_deref().unwrap().starts_with("call_"));
    }

    #[test]
    fn sync_response_is_unified() {
        let body = response(serde_json::json!({
            "candidates": [{
                "content": {"role": "model", "parts": [{"text": "Hi"}, {"text": " there"}]},
                "finishReason": "MAX_TOKENS"
            }],
            "usageMetadata": {"promptTokenCount": 4, "candidatesTokenCount": 2, "totalTokenCount": 6},
            "modelVersion": "gemini-2.0-flash-001"
        }));

        let unified = from_google_response(&body, &session());

        assert_eq!(unified.text(), Some("Hi there"));
        assert_eq!(unified.model, "gemini-2.0-flash-001");
        assert_eq!(unified.choices[0].finish_reason, Some(FinishReason::Length));
        assert_eq!(unified.usage, Some(Usage::new(4, 2)));
    }
}
