use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Method, Request, StatusCode, header},
    response::Response,
};
use docqa::{
    api::{ApiOptions, create_router},
    config::{AuthConfig, ChatProvider, Config, EmbeddingProvider},
    processing::DocumentQaService,
};
use httpmock::{Method::POST, Mock, MockServer};
use serde_json::{Value, json};
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

const BOUNDARY: &str = "docqa-integration-boundary";

fn test_config(chat_base_url: String, upload_dir: PathBuf) -> Config {
    Config {
        openai_api_key: Some("test-key".into()),
        openai_base_url: chat_base_url,
        ollama_url: "http://127.0.0.1:11434".into(),
        embedding_provider: EmbeddingProvider::Hash,
        embedding_model: "hash".into(),
        embedding_dimension: 256,
        embedding_batch_size: 16,
        chat_provider: ChatProvider::OpenAI,
        chat_model: "gpt-3.5-turbo".into(),
        provider_timeout_secs: Some(5),
        chunk_size: 1000,
        chunk_overlap: 200,
        retrieval_top_k: 4,
        chat_history_enabled: true,
        auth: None,
        upload_dir,
        max_upload_bytes: 1024 * 1024,
        cors_allowed_origins: None,
        server_port: None,
    }
}

struct Harness {
    app: Router,
    server: MockServer,
    uploads: TempDir,
}

impl Harness {
    async fn start() -> Self {
        Self::start_with(|_| {}).await
    }

    async fn start_with(adjust: impl FnOnce(&mut Config)) -> Self {
        let server = MockServer::start_async().await;
        let uploads = TempDir::new().expect("tempdir");
        let mut config = test_config(server.base_url(), uploads.path().join("staging"));
        adjust(&mut config);

        let service = DocumentQaService::new(&config).expect("service");
        let app = create_router(Arc::new(service), ApiOptions::from_config(&config));
        Self {
            app,
            server,
            uploads,
        }
    }

    async fn reply_when(&self, needle: &str, reply: &str) -> Mock<'_> {
        let needle = needle.to_string();
        let reply = reply.to_string();
        self.server
            .mock_async(move |when, then| {
                when.method(POST)
                    .path("/chat/completions")
                    .header("authorization", "Bearer test-key")
                    .body_contains(needle.as_str());
                then.status(200).json_body(json!({
                    "choices": [{ "message": { "role": "assistant", "content": reply } }]
                }));
            })
            .await
    }

    async fn send(&self, request: Request<Body>) -> Response {
        self.app
            .clone()
            .oneshot(request)
            .await
            .expect("router response")
    }

    async fn upload(&self, filename: &str, contents: &[u8]) -> Response {
        self.send(upload_request(filename, contents, None)).await
    }

    async fn ask(&self, payload: Value) -> Response {
        self.send(ask_request(payload, None)).await
    }

    fn staged_files(&self) -> usize {
        std::fs::read_dir(self.uploads.path().join("staging"))
            .expect("staging dir")
            .count()
    }
}

fn upload_request(filename: &str, contents: &[u8], token: Option<&str>) -> Request<Body> {
    let mut body = format!(
        "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
    )
    .into_bytes();
    body.extend_from_slice(contents);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

    let mut builder = Request::builder()
        .method(Method::POST)
        .uri("/upload")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        );
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::from(body)).expect("request")
}

fn ask_request(payload: Value, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method(Method::POST)
        .uri("/ask")
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder
        .body(Body::from(payload.to_string()))
        .expect("request")
}

fn health_request() -> Request<Body> {
    Request::builder()
        .uri("/health")
        .body(Body::empty())
        .expect("request")
}

async fn json_body(response: Response) -> Value {
    let body = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body bytes");
    serde_json::from_slice(&body).expect("json body")
}

#[tokio::test]
async fn upload_then_ask_answers_from_the_document() {
    let harness = Harness::start().await;
    let chat = harness
        .reply_when("The sky is blue. Grass is green.", "The sky is blue.")
        .await;

    let response = harness
        .upload("colors.txt", b"The sky is blue. Grass is green.")
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        json_body(response).await["message"],
        "File processed successfully"
    );

    let response = harness
        .ask(json!({ "question": "What color is the sky?" }))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert!(body["answer"].as_str().expect("answer").contains("blue"));
    assert_eq!(body["context"], json!(["The sky is blue. Grass is green."]));
    chat.assert_hits_async(1).await;

    assert_eq!(harness.staged_files(), 0);
}

#[tokio::test]
async fn ask_before_any_upload_is_rejected() {
    let harness = Harness::start().await;
    for question in ["What is this?", ""] {
        let response = harness.ask(json!({ "question": question })).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            json_body(response).await["detail"],
            "No document has been uploaded yet"
        );
    }
}

#[tokio::test]
async fn blank_question_is_unprocessable() {
    let harness = Harness::start().await;
    let chat = harness.reply_when("", "unused").await;
    harness.upload("notes.txt", b"Some notes.").await;

    let response = harness.ask(json!({ "question": "   " })).await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(
        json_body(response).await["detail"],
        "Question cannot be empty"
    );
    chat.assert_hits_async(0).await;
}

#[tokio::test]
async fn new_upload_replaces_previous_document() {
    let harness = Harness::start().await;
    harness.reply_when("", "Answer.").await;

    assert_eq!(
        harness
            .upload("a.txt", b"Apples grow in the orchard.")
            .await
            .status(),
        StatusCode::OK
    );
    assert_eq!(
        harness
            .upload("b.txt", b"Boats are moored in the harbour.")
            .await
            .status(),
        StatusCode::OK
    );

    let body = json_body(
        harness
            .ask(json!({ "question": "Where do apples grow?" }))
            .await,
    )
    .await;
    assert_eq!(body["context"], json!(["Boats are moored in the harbour."]));

    let health = json_body(harness.send(health_request()).await).await;
    assert_eq!(health["document"], "b.txt");
    assert_eq!(health["index_version"], 2);
}

#[tokio::test]
async fn unsupported_format_is_rejected_without_staging() {
    let harness = Harness::start().await;
    let response = harness.upload("diagram.xyz", b"\x89PNG").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        json_body(response).await["detail"],
        "Unsupported file format: xyz"
    );
    assert_eq!(harness.staged_files(), 0);

    let health = json_body(harness.send(health_request()).await).await;
    assert_eq!(health["document_loaded"], false);
}

#[tokio::test]
async fn failed_extraction_is_internal_and_cleans_up() {
    let harness = Harness::start().await;
    harness.upload("good.txt", b"Good document.").await;

    let response = harness.upload("broken.pdf", b"definitely not a pdf").await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let detail = json_body(response).await["detail"]
        .as_str()
        .expect("detail")
        .to_string();
    assert!(detail.starts_with("Internal Server Error: "), "{detail}");
    assert_eq!(harness.staged_files(), 0);

    let health = json_body(harness.send(health_request()).await).await;
    assert_eq!(health["document"], "good.txt");
}

#[tokio::test]
async fn chat_provider_failure_is_internal() {
    let harness = Harness::start().await;
    harness
        .server
        .mock_async(|when, then| {
            when.method(POST).path("/chat/completions");
            then.status(503).body("overloaded");
        })
        .await;
    harness.upload("notes.txt", b"Some notes.").await;

    let response = harness.ask(json!({ "question": "Anything?" })).await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let detail = json_body(response).await["detail"]
        .as_str()
        .expect("detail")
        .to_string();
    assert!(detail.starts_with("Internal Server Error: "), "{detail}");
    assert!(detail.contains("503"), "{detail}");
}

#[tokio::test]
async fn csv_rows_are_retrieved_individually() {
    let harness = Harness::start_with(|config| config.retrieval_top_k = 1).await;
    harness.reply_when("", "Green.").await;

    harness
        .upload(
            "colors.csv",
            b"thing,color\nsky,blue\ngrass,green\nbanana,yellow\n",
        )
        .await;

    let body = json_body(
        harness
            .ask(json!({ "question": "thing: grass color?" }))
            .await,
    )
    .await;
    assert_eq!(body["context"], json!(["thing: grass\ncolor: green"]));
}

#[tokio::test]
async fn follow_up_questions_are_condensed_with_history() {
    let harness = Harness::start().await;
    let condense = harness
        .reply_when("Follow Up Input: And the grass?", "What color is the grass?")
        .await;
    let answer = harness
        .reply_when("Use the following pieces of context", "Green.")
        .await;
    harness
        .upload("colors.txt", b"The sky is blue. Grass is green.")
        .await;

    let response = harness
        .ask(json!({
            "question": "And the grass?",
            "chat_history": [{ "question": "What color is the sky?", "answer": "Blue." }]
        }))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["answer"], "Green.");
    condense.assert_hits_async(1).await;
    answer.assert_hits_async(1).await;
}

#[tokio::test]
async fn auth_rejects_anonymous_uploads_and_keeps_state() {
    let harness = Harness::start_with(|config| {
        config.auth = Some(AuthConfig {
            secret: "integration-secret".into(),
            users: vec![("alice".into(), "wonderland".into())],
            token_ttl_minutes: 30,
        });
    })
    .await;
    harness.reply_when("", "Answer.").await;

    let response = harness
        .send(
            Request::builder()
                .method(Method::POST)
                .uri("/token")
                .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(Body::from("username=alice&password=wonderland"))
                .expect("request"),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let token = json_body(response).await["access_token"]
        .as_str()
        .expect("token")
        .to_string();

    let response = harness
        .send(upload_request("plans.txt", b"The plans are in the vault.", Some(&token)))
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = harness.upload("other.txt", b"Replacement text.").await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let response = harness.ask(json!({ "question": "Where are the plans?" })).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(harness.staged_files(), 0);

    let response = harness
        .send(ask_request(
            json!({ "question": "Where are the plans?" }),
            Some(&token),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        json_body(response).await["context"],
        json!(["The plans are in the vault."])
    );
}
