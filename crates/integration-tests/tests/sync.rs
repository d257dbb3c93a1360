mod harness;

use conduit_config::LlmProviderType;
use harness::chat_body;
use harness::config::ConfigBuilder;
use harness::mock_llm::{Behavior, MockLlm};
use harness::server::TestServer;
use serde_json::json;

async fn server_for(mock: &MockLlm, kind: LlmProviderType) -> TestServer {
    let base_url = match kind {
        LlmProviderType::Google => mock.gemini_base_url(),
        _ => mock.base_url(),
    };
    let config = ConfigBuilder::new().with_provider("upstream", kind, &base_url).build();
    TestServer::start(config).await.unwrap()
}

#[tokio::test]
async fn openai_answer_is_passed_through() {
    let mock = MockLlm::start().await.unwrap();
    let server = server_for(&mock, LlmProviderType::Openai).await;

    let resp = server.chat(&chat_body("gpt-4o", false)).await;

    assert_eq!(resp.status(), 200);
    assert_eq!(resp.headers()["x-request-id"], "mock-req-1");

    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["id"], "chatcmpl-mock");
    assert_eq!(body["model"], "gpt-4o");
    assert_eq!(body["choices"][0]["message"]["content"], "Hello world");
    assert_eq!(body["usage"]["total_tokens"], 13);

    let request = mock.last_request();
    assert!(request.body.get("stream").is_none() || request.body["stream"] == false);
    assert!(request.body.get("stream_options").is_none());
}

#[tokio::test]
async fn openai_error_status_is_passed_through() {
    let mock = MockLlm::start_with(Behavior::Status(429)).await.unwrap();
    let server = server_for(&mock, LlmProviderType::Openai).await;

    let resp = server.chat(&chat_body("gpt-4o", false)).await;

    assert_eq!(resp.status(), 429);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body, json!({"error": {"message": "mock failure", "type": "mock_error"}}));
}

#[tokio::test]
async fn configured_key_is_used_without_client_credential() {
    let mock = MockLlm::start().await.unwrap();
    let server = server_for(&mock, LlmProviderType::Openai).await;

    server.chat(&chat_body("gpt-4o", false)).await;

    assert_eq!(mock.last_request().headers["authorization"], "Bearer test-key");
}

#[tokio::test]
async fn client_credential_is_forwarded() {
    let mock = MockLlm::start().await.unwrap();
    let server = server_for(&mock, LlmProviderType::Openai).await;

    server
        .client()
        .post(server.url("/v1/chat/completions"))
        .bearer_auth("sk-client")
        .json(&chat_body("gpt-4o", false))
        .send()
        .await
        .unwrap();

    assert_eq!(mock.last_request().headers["authorization"], "Bearer sk-client");
}

#[tokio::test]
async fn forwarding_disabled_keeps_configured_key() {
    let mock = MockLlm::start().await.unwrap();
    let config = ConfigBuilder::new()
        .with_provider("upstream", LlmProviderType::Openai, &mock.base_url())
        .without_forwarding("upstream")
        .build();
    let server = TestServer::start(config).await.unwrap();

    server
        .client()
        .post(server.url("/v1/chat/completions"))
        .bearer_auth("sk-client")
        .json(&chat_body("gpt-4o", false))
        .send()
        .await
        .unwrap();

    assert_eq!(mock.last_request().headers["authorization"], "Bearer test-key");
}

#[tokio::test]
async fn anthropic_answer_is_unified() {
    let mock = MockLlm::start().await.unwrap();
    let server = server_for(&mock, LlmProviderType::Anthropic).await;

    let resp = server.chat(&chat_body("claude-3-5-haiku-20241022", false)).await;

    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["object"], "chat.completion");
    assert_eq!(body["choices"][0]["message"]["role"], "assistant");
    assert_eq!(body["choices"][0]["message"]["content"], "Hello world");
    assert_eq!(body["choices"][0]["finish_reason"], "stop");
    assert_eq!(body["usage"], json!({"prompt_tokens": 10, "completion_tokens": 3, "total_tokens": 13}));

    let request = mock.last_request();
    assert_eq!(request.path, "/v1/messages");
    assert!(request.body.get("stream").is_none());
}

#[tokio::test]
async fn anthropic_rejection_maps_to_unified_error() {
    let mock = MockLlm::start_with(Behavior::Status(401)).await.unwrap();
    let server = server_for(&mock, LlmProviderType::Anthropic).await;

    let resp = server.chat(&chat_body("claude-3-5-haiku-20241022", false)).await;

    assert_eq!(resp.status(), 401);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["type"], "upstream_status_error");
    assert!(body["error"]["code"].is_null());
}

#[tokio::test]
async fn gemini_answer_is_unified() {
    let mock = MockLlm::start().await.unwrap();
    let server = server_for(&mock, LlmProviderType::Google).await;

    let resp = server.chat(&chat_body("gemini-2.0-flash", false)).await;

    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["model"], "gemini-2.0-flash");
    assert_eq!(body["choices"][0]["message"]["content"], "Hello world");
    assert_eq!(body["choices"][0]["finish_reason"], "stop");
    assert_eq!(body["usage"]["total_tokens"], 13);

    assert_eq!(mock.last_request().path, "/v1beta/models/gemini-2.0-flash:generateContent");
}

#[tokio::test]
async fn unreachable_upstream_is_a_transport_error() {
    let config = ConfigBuilder::new()
        .with_provider("upstream", LlmProviderType::Openai, "http://127.0.0.1:1/v1")
        .build();
    let server = TestServer::start(config).await.unwrap();

    for stream in [false, true] {
        let resp = server.chat(&chat_body("gpt-4o", stream)).await;
        assert_eq!(resp.status(), 502);
        let body: serde_json::Value = resp.json().await.unwrap();
        assert_eq!(body["error"]["type"], "upstream_transport_error");
    }
}

#[tokio::test]
async fn invalid_requests_never_reach_upstream() {
    let mock = MockLlm::start().await.unwrap();
    let server = server_for(&mock, LlmProviderType::Openai).await;

    let malformed = server
        .client()
        .post(server.url("/v1/chat/completions"))
        .header("content-type", "application/json")
        .body("{\"model\":")
        .send()
        .await
        .unwrap();
    assert_eq!(malformed.status(), 400);
    let body: serde_json::Value = malformed.json().await.unwrap();
    assert_eq!(body["error"]["type"], "invalid_request_error");

    for invalid in [
        json!({"messages": [{"role": "user", "content": "hi"}]}),
        json!({"model": "", "messages": [{"role": "user", "content": "hi"}]}),
        json!({"model": "gpt-4o", "messages": []}),
    ] {
        let resp = server.chat(&invalid).await;
        assert_eq!(resp.status(), 400, "{invalid}");
    }

    assert!(mock.requests().is_empty());
}
