use std::{env, sync::Once};

use docqa::{
    config, embedding,
    generation::{self, ChatMessage},
    processing::{DocumentQaApi, DocumentQaService},
};

static INIT: Once = Once::new();

fn set_default_env(key: &str, value: &str) {
    let needs_value = env::var(key).map(|v| v.trim().is_empty()).unwrap_or(true);
    if needs_value {
        // SAFETY: Tests run serially via Once and we intentionally mutate process env.
        unsafe {
            env::set_var(key, value);
        }
    }
}

fn init_config_once() -> &'static config::Config {
    INIT.call_once(|| {
        set_default_env("EMBEDDING_PROVIDER", "openai");
        set_default_env("CHAT_PROVIDER", "openai");
        set_default_env("UPLOAD_DIR", "target/live-uploads");
        config::init_config().expect("live configuration (OPENAI_API_KEY must be set)");
    });
    config::get_config()
}

#[tokio::test]
#[ignore = "Requires live OpenAI embeddings"]
async fn live_openai_embedding_roundtrip() {
    let config = init_config_once();
    let client = embedding::get_embedding_client(config).expect("embedding client");
    let vectors = client
        .generate_embeddings(vec!["docqa live embedding".to_string()])
        .await
        .expect("failed to request embeddings from provider");
    assert_eq!(vectors.len(), 1, "expected embedding per input chunk");
    assert!(!vectors[0].is_empty(), "embedding must not be empty");
}

#[tokio::test]
#[ignore = "Requires live OpenAI chat completions"]
async fn live_openai_chat_completion() {
    let config = init_config_once();
    let client = generation::get_chat_client(config).expect("chat client");
    let reply = client
        .complete(vec![ChatMessage::user("Reply with the single word: ready")])
        .await
        .expect("failed to request completion from provider");
    assert!(!reply.is_empty());
}

#[tokio::test]
#[ignore = "Requires live OpenAI embeddings and chat completions"]
async fn live_upload_and_ask() {
    let config = init_config_once();
    let service = DocumentQaService::new(config).expect("service");
    service
        .upload(
            "colors.txt",
            b"The sky is blue. Grass is green. Bananas are yellow.".to_vec(),
        )
        .await
        .expect("upload");
    let answer = service
        .ask("What color is the sky?", Vec::new())
        .await
        .expect("answer");
    assert!(
        answer.answer.to_lowercase().contains("blue"),
        "unexpected answer: {answer:?}"
    );
}
