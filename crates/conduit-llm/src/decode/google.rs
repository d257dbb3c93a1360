//! Whole-object decoder for the Gemini stream
//!
//! With `alt=sse` every frame is a complete `GenerateContentResponse`.
//! Each maps to exactly one chunk; the stream ends when the body closes.

use http::StatusCode;

use super::{Frame, FrameDecoder};
use crate::convert::google::to_stream_chunk;
use crate::error::RelayError;
use crate::protocol::google::GoogleResponse;
use crate::types::{ChunkStamp, StreamEvent};

#[derive(Debug)]
pub struct GoogleDecoder {
    stamp: ChunkStamp,
    next_tool_index: u32,
}

impl GoogleDecoder {
    pub const fn new(stamp: ChunkStamp) -> Self {
        Self {
            stamp,
            next_tool_index: 0,
        }
    }
}

impl FrameDecoder for GoogleDecoder {
    fn decode(&mut self, frame: &str) -> Result<Frame, RelayError> {
        let response: GoogleResponse = serde_json::from_str(frame).map_err(|e| {
            tracing::warn!(error = %e, "malformed gemini stream frame");
            RelayError::UpstreamDecode(format!("malformed gemini frame: {e}"))
        })?;

        if let Some(error) = response.error {
            let status = StatusCode::from_u16(error.code).unwrap_or(StatusCode::BAD_GATEWAY);
            return Err(RelayError::UpstreamStatus {
                status,
                body: format!("{}: {}", error.status, error.message),
            });
        }

        let chunk = to_stream_chunk(&response, &self.stamp, &mut self.next_tool_index);

        Ok(Frame::Continue(vec![StreamEvent::Chunk(chunk)]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::test_support::{body, collect};
    use crate::decode::{drive, sse_data};

    fn stamp() -> ChunkStamp {
        ChunkStamp {
            id: "chatcmpl-g".to_owned(),
            model: "gemini-2.0-flash".to_owned(),
            created: 1,
        }
    }

    fn frame(value: &serde_json::Value) -> String {
        format!("data: {value}\r\n\r\n")
    }

    #[tokio::test]
    async fn each_frame_is_one_chunk_until_close() {
        let upstream = body(&[
            &frame(&serde_json::json!({"candidates": [{"content": {"role": "model", "parts": [{"text": "Hel"}]}}]})),
            &frame(&serde_json::json!({
                "candidates": [{"content": {"role": "model", "parts": [{"text": "lo"}]}, "finishReason": "STOP"}],
                "usageMetadata": {"promptTokenCount": 3, "candidatesTokenCount": 2, "totalTokenCount": 5}
            })),
        ]);

        let (events, error) = collect(drive(sse_data(upstream), GoogleDecoder::new(stamp()))).await;

        assert!(error.is_none());
        assert_eq!(events.len(), 2);

        let text: String = events.iter().filter_map(|event| event.fragment(0)).collect();
        assert_eq!(text, "Hello");
        assert_eq!(events[1].usage().map(|usage| usage.total_tokens), Some(5));
        assert!(events.iter().all(|event| event.chunk().unwrap().id == "chatcmpl-g"));
    }

    #[tokio::test]
    async fn in_stream_error_object_stops_the_stream() {
        let upstream = body(&[&frame(&serde_json::json!({
            "error": {"code": 429, "message": "Resource exhausted", "status": "RESOURCE_EXHAUSTED"}
        }))]);

        let (events, error) = collect(drive(sse_data(upstream), GoogleDecoder::new(stamp()))).await;

        assert!(events.is_empty());
        assert!(matches!(
            error,
            Some(RelayError::UpstreamStatus { status, .. }) if status == StatusCode::TOO_MANY_REQUESTS
        ));
    }

    #[tokio::test]
    async fn malformed_frame_is_a_decode_error() {
        let upstream = body(&["data: {\"candidates\": [\n\n"]);

        let (_, error) = collect(drive(sse_data(upstream), GoogleDecoder::new(stamp()))).await;

        assert!(matches!(error, Some(RelayError::UpstreamDecode(_))));
    }
}
