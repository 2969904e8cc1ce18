use std::time::Duration;

use medibot_server::config::LlmConfig;
use medibot_server::services::{InferenceError, InferenceRequest, LlmProvider, LlmService};
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn service(server: &MockServer, token: &str) -> LlmService {
    LlmService::new(LlmConfig {
        endpoint: format!("{}/inference/chat/completions", server.uri()),
        api_token: token.to_string(),
        ..LlmConfig::default()
    })
}

fn request() -> InferenceRequest {
    InferenceRequest {
        system_prompt: "You are a medical assistant.".to_string(),
        user_prompt: "what is typhoid".to_string(),
        model: "gpt-4o-mini".to_string(),
        temperature: 0.7,
        max_tokens: 1000,
        timeout: Duration::from_secs(5),
    }
}

#[tokio::test]
async fn sends_chat_completion_with_bearer_token() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/inference/chat/completions"))
        .and(header("authorization", "Bearer test-token"))
        .and(body_partial_json(json!({
            "model": "gpt-4o-mini",
            "max_tokens": 1000,
            "messages": [
                {"role": "system", "content": "You are a medical assistant."},
                {"role": "user", "content": "what is typhoid"}
            ]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {"role": "assistant", "content": "Typhoid is a bacterial infection."}}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let answer = service(&server, "test-token").complete(&request()).await.unwrap();
    assert_eq!(answer, "Typhoid is a bacterial infection.");
}

#[tokio::test]
async fn rate_limit_status_is_reported() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(429).set_body_string("Too many requests"))
        .mount(&server)
        .await;

    let err = service(&server, "t").complete(&request()).await.unwrap_err();
    match &err {
        InferenceError::Status { status, body } => {
            assert_eq!(*status, 429);
            assert_eq!(body, "Too many requests");
        }
        other => panic!("unexpected error {:?}", other),
    }
    assert!(err.is_rate_limited());
    assert_eq!(err.to_string(), "Inference API error: 429 - Too many requests");
}

#[tokio::test]
async fn server_error_is_not_rate_limited() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;

    let err = service(&server, "t").complete(&request()).await.unwrap_err();
    assert!(!err.is_rate_limited());
}

#[tokio::test]
async fn plain_text_body_is_returned_raw() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_string("just text"))
        .mount(&server)
        .await;

    let answer = service(&server, "t").complete(&request()).await.unwrap();
    assert_eq!(answer, "just text");
}

#[tokio::test]
async fn missing_token_never_calls_endpoint() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let err = service(&server, "").complete(&request()).await.unwrap_err();
    assert!(matches!(err, InferenceError::NotConfigured(_)));
}

#[tokio::test]
async fn slow_endpoint_times_out_as_transport_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
        .mount(&server)
        .await;

    let mut req = request();
    req.timeout = Duration::from_millis(100);
    let err = service(&server, "t").complete(&req).await.unwrap_err();
    assert!(matches!(err, InferenceError::Transport(_)));
}
