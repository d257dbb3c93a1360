#![allow(dead_code)]

pub mod config;
pub mod mock_llm;
pub mod server;

/// `data:` payloads of an SSE body, in order
pub fn sse_data(text: &str) -> Vec<String> {
    text.lines()
        .filter_map(|line| line.strip_prefix("data: "))
        .map(str::to_owned)
        .collect()
}

/// Parsed JSON payloads, skipping the `[DONE]` sentinel and raw lines
pub fn sse_json(text: &str) -> Vec<serde_json::Value> {
    sse_data(text)
        .iter()
        .filter(|data| data.as_str() != "[DONE]")
        .filter_map(|data| serde_json::from_str(data).ok())
        .collect()
}

/// Concatenated `delta.content` of every chunk
pub fn streamed_text(text: &str) -> String {
    sse_json(text)
        .iter()
        .filter_map(|chunk| chunk["choices"][0]["delta"]["content"].as_str().map(str::to_owned))
        .collect()
}

pub fn chat_body(model: &str, stream: bool) -> serde_json::Value {
    serde_json::json!({
        "model": model,
        "messages": [{"role": "user", "content": "Hello"}],
        "stream": stream
    })
}
