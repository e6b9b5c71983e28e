use chatmate::completion::{
    ChatTurn, CompletionClient, CompletionRequest, HttpCompletionClient, Provider, Role,
    FALLBACK_REPLY,
};
use chatmate::{AppError, Settings, Tone};
use serde_json::json;
use tokio_test::{assert_err, assert_ok};
use wiremock::{
    matchers::{body_partial_json, header, method, path},
    Mock, MockServer, ResponseTemplate,
};

const COMPLETIONS_PATH: &str = "/v1/chat/completions";

fn client_for(server: &MockServer, api_key: &str) -> HttpCompletionClient {
    let mut settings = Settings::new_for_test().unwrap();
    let url = format!("{}{}", server.uri(), COMPLETIONS_PATH);
    settings.completion.api_key = api_key.to_string();
    settings.completion.openai_url = url.clone();
    settings.completion.openrouter_url = url;
    HttpCompletionClient::new(settings.completion).unwrap()
}

fn reply(content: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "choices": [{ "message": { "role": "assistant", "content": content } }]
    }))
}

fn hello() -> CompletionRequest {
    CompletionRequest::for_conversation(Tone::Friendly, &[], "Hello")
}

#[test_log::test(tokio::test)]
async fn test_openai_request_shape() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(COMPLETIONS_PATH))
        .and(header("Authorization", "Bearer sk-test-key"))
        .and(body_partial_json(json!({
            "model": "gpt-3.5-turbo",
            "max_tokens": 1000,
            "messages": [
                { "role": "system", "content": Tone::Friendly.system_prompt() },
                { "role": "user", "content": "Hello" }
            ]
        })))
        .respond_with(reply("Hi there!"))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server, "sk-test-key");
    assert_eq!(client.provider(), Provider::OpenAi);

    let text = assert_ok!(client.complete(hello()).await);
    assert_eq!(text, "Hi there!");
}

#[test_log::test(tokio::test)]
async fn test_openrouter_key_switches_provider() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(COMPLETIONS_PATH))
        .and(header("X-Title", "ChatMate"))
        .and(header("HTTP-Referer", "https://chatmate.app"))
        .and(body_partial_json(json!({ "model": "openai/gpt-3.5-turbo" })))
        .respond_with(reply("Routed"))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server, "sk-or-v1-abc");
    assert_eq!(client.provider(), Provider::OpenRouter);
    assert_eq!(client.model(), "openai/gpt-3.5-turbo");

    let text = assert_ok!(client.complete(hello()).await);
    assert_eq!(text, "Routed");
}

#[tokio::test]
async fn test_error_status_carries_message() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(429).set_body_json(json!({
            "error": { "message": "Rate limit exceeded" }
        })))
        .mount(&server)
        .await;

    let err = assert_err!(client_for(&server, "sk-test-key").complete(hello()).await);
    assert!(matches!(err, AppError::CompletionError(_)));
    assert_eq!(err.to_string(), "API error: 429 - Rate limit exceeded");
}

#[tokio::test]
async fn test_error_without_body_is_unknown() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let err = assert_err!(client_for(&server, "sk-test-key").complete(hello()).await);
    assert_eq!(err.to_string(), "API error: 500 - Unknown error");
}

#[tokio::test]
async fn test_empty_choices_fall_back() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "choices": [] })))
        .mount(&server)
        .await;

    let text = assert_ok!(client_for(&server, "sk-test-key").complete(hello()).await);
    assert_eq!(text, FALLBACK_REPLY);
}

#[tokio::test]
async fn test_history_is_forwarded_in_order() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({
            "messages": [
                { "role": "system" },
                { "role": "user", "content": "Hi" },
                { "role": "assistant", "content": "Hello!" },
                { "role": "user", "content": "How are you?" }
            ]
        })))
        .respond_with(reply("Great"))
        .expect(1)
        .mount(&server)
        .await;

    let request = CompletionRequest {
        messages: vec![
            ChatTurn::new(Role::System, Tone::Tutor.system_prompt()),
            ChatTurn::new(Role::User, "Hi"),
            ChatTurn::new(Role::Assistant, "Hello!"),
            ChatTurn::new(Role::User, "How are you?"),
        ],
    };
    let text = assert_ok!(client_for(&server, "sk-test-key").complete(request).await);
    assert_eq!(text, "Great");
}
