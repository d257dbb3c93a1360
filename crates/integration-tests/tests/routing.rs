mod harness;

use conduit_config::LlmProviderType;
use harness::chat_body;
use harness::config::ConfigBuilder;
use harness::mock_llm::MockLlm;
use harness::server::TestServer;

/// OpenAI for `gpt-` and as default, Anthropic for `claude-`
async fn mixed(mock: &MockLlm) -> TestServer {
    let config = ConfigBuilder::new()
        .with_provider("openai", LlmProviderType::Openai, &mock.base_url())
        .with_models("openai", &["gpt-4o"], &["gpt-"])
        .with_provider("claude", LlmProviderType::Anthropic, &mock.base_url())
        .with_models("claude", &["claude-3-5-haiku-20241022"], &["claude-"])
        .with_default_provider("openai")
        .build();
    TestServer::start(config).await.unwrap()
}

#[tokio::test]
async fn prefix_selects_the_provider() {
    let mock = MockLlm::start().await.unwrap();
    let server = mixed(&mock).await;

    assert_eq!(server.chat(&chat_body("claude-3-opus", false)).await.status(), 200);
    let request = mock.last_request();
    assert_eq!(request.path, "/v1/messages");
    assert_eq!(request.body["model"], "claude-3-opus");

    assert_eq!(server.chat(&chat_body("gpt-4o-mini", false)).await.status(), 200);
    assert_eq!(mock.last_request().path, "/v1/chat/completions");
}

#[tokio::test]
async fn explicit_provider_prefix_is_stripped() {
    let mock = MockLlm::start().await.unwrap();
    let server = mixed(&mock).await;

    assert_eq!(server.chat(&chat_body("claude/my-fine-tune", false)).await.status(), 200);
    let request = mock.last_request();
    assert_eq!(request.path, "/v1/messages");
    assert_eq!(request.body["model"], "my-fine-tune");

    assert_eq!(server.chat(&chat_body("openai/claude-lookalike", false)).await.status(), 200);
    let request = mock.last_request();
    assert_eq!(request.path, "/v1/chat/completions");
    assert_eq!(request.body["model"], "claude-lookalike");
}

#[tokio::test]
async fn unknown_model_goes_to_the_default_provider() {
    let mock = MockLlm::start().await.unwrap();
    let server = mixed(&mock).await;

    for _ in 0..2 {
        let resp = server.chat(&chat_body("experimental-model-x", false)).await;
        assert_eq!(resp.status(), 200);
        let request = mock.last_request();
        assert_eq!(request.path, "/v1/chat/completions");
        assert_eq!(request.body["model"], "experimental-model-x");
    }
}

#[tokio::test]
async fn unknown_model_without_default_is_not_found() {
    let mock = MockLlm::start().await.unwrap();
    let config = ConfigBuilder::new()
        .with_provider("openai", LlmProviderType::Openai, &mock.base_url())
        .with_models("openai", &[], &["gpt-"])
        .with_provider("claude", LlmProviderType::Anthropic, &mock.base_url())
        .with_models("claude", &[], &["claude-"])
        .build();
    let server = TestServer::start(config).await.unwrap();

    let resp = server.chat(&chat_body("mistral-large", true)).await;

    assert_eq!(resp.status(), 404);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["type"], "not_found_error");
    assert!(mock.requests().is_empty());
}

#[tokio::test]
async fn models_endpoint_lists_static_names() {
    let mock = MockLlm::start().await.unwrap();
    let server = mixed(&mock).await;

    let resp = server.client().get(server.url("/v1/models")).send().await.unwrap();
    assert_eq!(resp.status(), 200);

    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["object"], "list");

    let owners: Vec<(String, String)> = body["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|m| {
            (
                m["id"].as_str().unwrap().to_owned(),
                m["owned_by"].as_str().unwrap().to_owned(),
            )
        })
        .collect();
    assert_eq!(
        owners,
        [
            ("claude-3-5-haiku-20241022".to_owned(), "claude".to_owned()),
            ("gpt-4o".to_owned(), "openai".to_owned()),
        ]
    );
}
