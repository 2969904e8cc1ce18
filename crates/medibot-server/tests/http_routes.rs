use axum::{
    body::{to_bytes, Body},
    http::{header, Request, StatusCode},
    Router,
};
use serde_json::Value;
use tower::ServiceExt;

use medibot_server::config::Settings;
use medibot_server::server::{build_router, build_state};

const GREETING: &str = "👋 Hello! How can I assist you today?";

async fn app() -> (tempfile::TempDir, Router) {
    let dir = tempfile::tempdir().unwrap();
    let mut settings = Settings::default();
    settings.storage.upload_dir = dir.path().join("uploads");
    settings.storage.chats_file = dir.path().join("chats.json");
    settings.whatsapp.webhook_workers = 1;

    let state = build_state(settings).await.unwrap();
    (dir, build_router(state))
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, String) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, String::from_utf8_lossy(&body).into_owned())
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_form(uri: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn post_json(uri: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn index_favicon_and_health() {
    let (_dir, app) = app().await;

    assert_eq!(send(&app, get("/")).await, (StatusCode::OK, "Medical chatbot is running.".to_string()));
    assert_eq!(send(&app, get("/favicon.ico")).await.0, StatusCode::NO_CONTENT);

    let (status, body) = send(&app, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("healthy"));
}

#[tokio::test]
async fn readiness_reports_uninitialized_retrieval() {
    let (_dir, app) = app().await;

    let (status, body) = send(&app, get("/health/ready")).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    let json: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["retrieval"], "uninitialized");
}

#[tokio::test]
async fn get_reply_handles_empty_and_greeting() {
    let (_dir, app) = app().await;

    let (status, body) = send(&app, post_form("/get", "msg=")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "⚠ Please send a message or upload an image.");

    let (_, body) = send(&app, post_form("/get", "msg=hello")).await;
    assert_eq!(body, GREETING);
}

#[tokio::test]
async fn get_reply_without_content_type_is_empty_input() {
    let (_dir, app) = app().await;

    let request = Request::builder()
        .method("POST")
        .uri("/get")
        .body(Body::empty())
        .unwrap();
    assert_eq!(
        send(&app, request).await,
        (StatusCode::OK, "⚠ Please send a message or upload an image.".to_string())
    );
}

#[tokio::test]
async fn get_reply_accepts_multipart() {
    let (_dir, app) = app().await;

    let body = "--XBOUNDARY\r\n\
                Content-Disposition: form-data; name=\"msg\"\r\n\r\n\
                hi there\r\n\
                --XBOUNDARY--\r\n";
    let request = Request::builder()
        .method("POST")
        .uri("/get")
        .header(header::CONTENT_TYPE, "multipart/form-data; boundary=XBOUNDARY")
        .body(Body::from(body))
        .unwrap();

    assert_eq!(send(&app, request).await, (StatusCode::OK, GREETING.to_string()));
}

#[tokio::test]
async fn medical_question_while_retrieval_loads() {
    let (_dir, app) = app().await;

    let (_, body) = send(&app, post_form("/get", "msg=what+is+malaria")).await;
    assert_eq!(body, "⚠ RAG is loading. Try again.");
}

#[tokio::test]
async fn web_sessions_keep_separate_topics() {
    let (_dir, app) = app().await;
    let ask = |session: &str, msg: &str| {
        Request::builder()
            .method("POST")
            .uri("/get")
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .header("x-session-id", session)
            .body(Body::from(format!("msg={}", msg)))
            .unwrap()
    };

    // topic is remembered for session a even though retrieval is still loading
    let (_, body) = send(&app, ask("a", "what+is+malaria")).await;
    assert_eq!(body, "⚠ RAG is loading. Try again.");

    let (_, body) = send(&app, ask("b", "what+is+the+dose")).await;
    assert_eq!(body, "Please ask a medical question first.");

    let (_, body) = send(&app, ask("a", "what+is+the+dose")).await;
    assert_eq!(body, "⚠ RAG is loading. Try again.");
}

#[tokio::test]
async fn chat_lifecycle() {
    let (_dir, app) = app().await;

    let (status, body) = send(&app, post_json("/api/chats", r#"{"title":"Headache"}"#)).await;
    assert_eq!(status, StatusCode::OK);
    let chat: Value = serde_json::from_str(&body).unwrap();
    let id = chat["id"].as_str().unwrap().to_string();
    assert_eq!(chat["title"], "Headache");

    // no body at all gets the default title
    let (_, body) = send(
        &app,
        Request::builder().method("POST").uri("/api/chats").body(Body::empty()).unwrap(),
    )
    .await;
    let untitled: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(untitled["title"], "New chat");

    let (_, body) = send(&app, get("/api/chats")).await;
    let list: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(list.as_array().unwrap().len(), 2);
    assert_eq!(list[1]["id"], id.as_str());
    assert!(list[0].get("messages").is_none());

    let (status, _) = send(&app, get(&format!("/api/chats/{}", id))).await;
    assert_eq!(status, StatusCode::OK);

    let delete = Request::builder()
        .method("DELETE")
        .uri(format!("/api/chats/{}", id))
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&app, delete).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, r#"{"ok":true}"#);

    let (status, body) = send(&app, get(&format!("/api/chats/{}", id))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body.contains("NotFound"));
}

#[tokio::test]
async fn add_message_stores_both_sides() {
    let (_dir, app) = app().await;
    let (_, body) = send(&app, post_json("/api/chats", "{}")).await;
    let id = serde_json::from_str::<Value>(&body).unwrap()["id"].as_str().unwrap().to_string();

    let (status, body) = send(&app, post_form(&format!("/api/chats/{}/messages", id), "msg=hey")).await;
    assert_eq!(status, StatusCode::OK);

    let json: Value = serde_json::from_str(&body).unwrap();
    let messages = json["chat"]["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0]["type"], "user");
    assert_eq!(messages[0]["text"], "hey");
    assert_eq!(messages[1]["type"], "bot");
    assert_eq!(messages[1]["text"], GREETING);
    assert_eq!(json["chat"]["title"], "hey");
}

#[tokio::test]
async fn stream_emits_lines_then_done() {
    let (_dir, app) = app().await;
    let (_, body) = send(&app, post_json("/api/chats", "{}")).await;
    let id = serde_json::from_str::<Value>(&body).unwrap()["id"].as_str().unwrap().to_string();

    let (status, body) = send(
        &app,
        post_json(&format!("/api/chats/{}/stream", id), r#"{"message":"hello"}"#),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains(&format!("data: {}\n\n", GREETING)));
    assert!(body.trim_end().ends_with("data: [DONE]"));

    let (_, body) = send(&app, get(&format!("/api/chats/{}", id))).await;
    let chat: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(chat["messages"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn stream_rejects_empty_input_and_unknown_chat() {
    let (_dir, app) = app().await;
    let (_, body) = send(&app, post_json("/api/chats", "{}")).await;
    let id = serde_json::from_str::<Value>(&body).unwrap()["id"].as_str().unwrap().to_string();

    let (status, _) = send(&app, post_json(&format!("/api/chats/{}/stream", id), r#"{"msg":"  "}"#)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&app, post_json("/api/chats/missing/stream", r#"{"msg":"hi"}"#)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn whatsapp_welcome_then_ack() {
    let (_dir, app) = app().await;
    let form = "From=whatsapp%3A%2B911234&Body=Hi&NumMedia=0";

    let response = app.clone().oneshot(post_form("/whatsapp", form)).await.unwrap();
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "application/xml; charset=utf-8"
    );
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = String::from_utf8_lossy(&body);
    assert!(body.contains("Welcome to Medical Chatbot!"));

    // already connected: plain acknowledgement, reply goes out-of-band
    let (status, body) = send(&app, post_form("/whatsapp", form)).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.ends_with("<Response/>"));
}

#[tokio::test]
async fn tts_requires_text() {
    let (_dir, app) = app().await;

    let (status, body) = send(&app, post_json("/tts", "{}")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, r#"{"error":"Text required"}"#);
}

#[tokio::test]
async fn email_without_credentials_is_not_sent() {
    let (_dir, app) = app().await;

    let (status, body) = send(
        &app,
        post_json("/api/email", r#"{"to":"a@example.com","subject":"s","message":"m"}"#),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, r#"{"sent":false}"#);
}

#[tokio::test]
async fn uploads_are_served() {
    let (dir, app) = app().await;
    std::fs::write(dir.path().join("uploads/scan.txt"), "hello").unwrap();

    let (status, body) = send(&app, get("/uploads/scan.txt")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "hello");
}
