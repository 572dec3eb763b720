use actix_web::{web, HttpRequest, HttpResponse};
use claims::assert_ok;
use futures::StreamExt;
use professor_chat_service::{
    configuration::CompletionSettings,
    domain::entities::message::Message,
    ports::completion_client::{CompletionClient, CompletionClientError, FragmentStream},
    repositories::completion_groq_repository::CompletionGroqRepository,
};
use secrecy::Secret;
use serde_json::{json, Value};

use crate::helpers::spawn_mock_server;

const API_KEY: &str = "gsk_test_key";

fn repository(base_url: String) -> CompletionGroqRepository {
    let settings = CompletionSettings {
        base_url,
        api_key: Secret::new(API_KEY.into()),
        model: "llama3-8b-8192".into(),
        temperature: None,
    };
    CompletionGroqRepository::new(reqwest::Client::new(), &settings)
}

fn event(content: Option<&str>, finish_reason: Option<&str>) -> String {
    let delta = match content {
        Some(content) => json!({ "content": content }),
        None => json!({ "role": "assistant" }),
    };
    let chunk = json!({
        "id": "chatcmpl-1",
        "object": "chat.completion.chunk",
        "model": "llama3-8b-8192",
        "choices": [{ "index": 0, "delta": delta, "finish_reason": finish_reason }]
    });
    format!("data: {}\n\n", chunk)
}

fn is_expected_request(request: &HttpRequest, body: &Value) -> bool {
    let authorization = request
        .headers()
        .get("Authorization")
        .and_then(|v| v.to_str().ok());

    authorization == Some(format!("Bearer {}", API_KEY).as_str())
        && body["model"] == "llama3-8b-8192"
        && body["stream"] == true
        && body["messages"]
            == json!([
                { "role": "system", "content": "Be helpful" },
                { "role": "user", "content": "Who teaches algorithms well?" }
            ])
}

async fn stream_completion(request: HttpRequest, body: web::Json<Value>) -> HttpResponse {
    if !is_expected_request(&request, &body) {
        return HttpResponse::Unauthorized().json(json!({
            "error": { "message": "Invalid API Key", "type": "invalid_request_error" }
        }));
    }

    let sse = [
        event(None, None),
        event(Some("Professor Smith"), None),
        ": keep-alive\n\n".to_string(),
        event(Some(" is great."), None),
        event(None, Some("stop")),
        "data: [DONE]\n\n".to_string(),
    ]
    .concat();

    HttpResponse::Ok()
        .content_type("text/event-stream")
        .body(sse)
}

async fn cut_completion() -> HttpResponse {
    HttpResponse::Ok()
        .content_type("text/event-stream")
        .body(event(Some("Professor Smith"), None))
}

async fn rate_limited_completion() -> HttpResponse {
    HttpResponse::TooManyRequests().body("Rate limit reached")
}

fn groq_api(cfg: &mut web::ServiceConfig) {
    cfg.route("/chat/completions", web::post().to(stream_completion));
}

fn cut_groq_api(cfg: &mut web::ServiceConfig) {
    cfg.route("/chat/completions", web::post().to(cut_completion));
}

fn rate_limited_groq_api(cfg: &mut web::ServiceConfig) {
    cfg.route("/chat/completions", web::post().to(rate_limited_completion));
}

fn messages() -> Vec<Message> {
    vec![
        Message::system("Be helpful"),
        Message::user("Who teaches algorithms well?"),
    ]
}

async fn collect_text(mut fragments: FragmentStream) -> (String, Option<CompletionClientError>) {
    let mut text = String::new();
    while let Some(fragment) = fragments.next().await {
        match fragment {
            Ok(fragment) => text.push_str(fragment.content.as_deref().unwrap_or_default()),
            Err(e) => return (text, Some(e)),
        }
    }
    (text, None)
}

#[tokio::test]
async fn complete_streams_the_fragments_in_order() {
    let url = spawn_mock_server(groq_api);

    let fragments = assert_ok!(repository(url).complete(messages()).await);
    let (text, error) = collect_text(fragments).await;

    assert_eq!(text, "Professor Smith is great.");
    assert!(error.is_none());
}

#[tokio::test]
async fn complete_with_a_rejected_api_key_is_unauthorized() {
    let url = spawn_mock_server(groq_api);
    let settings = CompletionSettings {
        base_url: url,
        api_key: Secret::new("gsk_revoked".into()),
        model: "llama3-8b-8192".into(),
        temperature: None,
    };

    let result = CompletionGroqRepository::new(reqwest::Client::new(), &settings)
        .complete(messages())
        .await;

    assert!(matches!(result, Err(CompletionClientError::Unauthorized(_))));
}

#[tokio::test]
async fn complete_fails_as_unavailable_when_rate_limited() {
    let url = spawn_mock_server(rate_limited_groq_api);

    let result = repository(url).complete(messages()).await;

    assert!(matches!(result, Err(CompletionClientError::Unavailable(_))));
}

#[tokio::test]
async fn a_stream_cut_before_its_end_is_interrupted() {
    let url = spawn_mock_server(cut_groq_api);

    let fragments = assert_ok!(repository(url).complete(messages()).await);
    let (text, error) = collect_text(fragments).await;

    assert_eq!(text, "Professor Smith");
    assert!(matches!(error, Some(CompletionClientError::Interrupted(_))));
}
