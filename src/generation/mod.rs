//! Chat-completion clients used to condense follow-up questions and generate answers.
//!
//! The OpenAI adapter speaks the `chat/completions` protocol and therefore also works against
//! compatible gateways; the Ollama adapter uses the runtime's non-streaming `/api/chat` call.

use crate::config::{ChatProvider, Config};
use crate::embedding::build_http_client;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;

/// Errors surfaced while generating text.
#[derive(Debug, Error)]
pub enum ChatClientError {
    /// Provider could not be reached or is misconfigured.
    #[error("Chat provider unavailable: {0}")]
    ProviderUnavailable(String),
    /// Provider returned an error response.
    #[error("Failed to generate completion: {0}")]
    GenerationFailed(String),
    /// Provider response could not be parsed.
    #[error("Malformed provider response: {0}")]
    InvalidResponse(String),
}

/// Author of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Instructions framing the conversation.
    System,
    /// End-user input.
    User,
}

/// Single message sent to the provider.
#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    /// Author of the message.
    pub role: Role,
    /// Message body.
    pub content: String,
}

impl ChatMessage {
    /// Build a system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    /// Build a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// Interface implemented by chat-completion providers.
#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Generate a completion for the supplied messages at temperature zero.
    async fn complete(&self, messages: Vec<ChatMessage>) -> Result<String, ChatClientError>;
}

/// Build a chat client based on configuration.
pub fn get_chat_client(config: &Config) -> Result<Arc<dyn ChatClient>, ChatClientError> {
    let http = build_http_client("docqa/chat", config.provider_timeout_secs).map_err(|error| {
        ChatClientError::ProviderUnavailable(format!("failed to construct HTTP client: {error}"))
    })?;

    let client: Arc<dyn ChatClient> = match config.chat_provider {
        ChatProvider::OpenAI => {
            let api_key = config.openai_api_key.clone().ok_or_else(|| {
                ChatClientError::ProviderUnavailable("OPENAI_API_KEY is not set".into())
            })?;
            Arc::new(OpenAiChatClient {
                http,
                base_url: config.openai_base_url.clone(),
                api_key,
                model: config.chat_model.clone(),
            })
        }
        ChatProvider::Ollama => Arc::new(OllamaChatClient {
            http,
            base_url: config.ollama_url.clone(),
            model: config.chat_model.clone(),
        }),
    };

    tracing::debug!(
        provider = ?config.chat_provider,
        model = %config.chat_model,
        "Chat client initialized"
    );
    Ok(client)
}

/// OpenAI-compatible `chat/completions` client.
pub struct OpenAiChatClient {
    http: Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl OpenAiChatClient {
    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

#[derive(Debug, Deserialize)]
struct OpenAiChatResponse {
    choices: Vec<OpenAiChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: OpenAiMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAiMessage {
    content: Option<String>,
}

#[async_trait]
impl ChatClient for OpenAiChatClient {
    async fn complete(&self, messages: Vec<ChatMessage>) -> Result<String, ChatClientError> {
        let payload = json!({
            "model": self.model,
            "messages": messages,
            "temperature": 0,
        });

        let response = self
            .http
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|error| {
                ChatClientError::ProviderUnavailable(format!(
                    "failed to reach {}: {error}",
                    self.endpoint()
                ))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ChatClientError::GenerationFailed(format!(
                "OpenAI returned {status}: {body}"
            )));
        }

        let body: OpenAiChatResponse = response.json().await.map_err(|error| {
            ChatClientError::InvalidResponse(format!("failed to decode OpenAI response: {error}"))
        })?;

        let text = body
            .choices
            .into_iter()
            .filter_map(|choice| choice.message.content)
            .collect::<Vec<_>>()
            .join("");
        let text = text.trim();
        if text.is_empty() {
            return Err(ChatClientError::InvalidResponse(
                "completion contained no text".into(),
            ));
        }
        Ok(text.to_string())
    }
}

/// Ollama `/api/chat` client.
pub struct OllamaChatClient {
    http: Client,
    base_url: String,
    model: String,
}

impl OllamaChatClient {
    fn endpoint(&self) -> String {
        format!("{}/api/chat", self.base_url.trim_end_matches('/'))
    }
}

#[derive(Debug, Deserialize)]
struct OllamaChatResponse {
    message: OllamaMessage,
    done: bool,
}

#[derive(Debug, Deserialize)]
struct OllamaMessage {
    content: String,
}

#[async_trait]
impl ChatClient for OllamaChatClient {
    async fn complete(&self, messages: Vec<ChatMessage>) -> Result<String, ChatClientError> {
        let payload = json!({
            "model": self.model,
            "messages": messages,
            "stream": false,
            "options": { "temperature": 0 }
        });

        let response = self
            .http
            .post(self.endpoint())
            .json(&payload)
            .send()
            .await
            .map_err(|error| {
                ChatClientError::ProviderUnavailable(format!(
                    "failed to reach Ollama at {}: {error}",
                    self.base_url
                ))
            })?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(ChatClientError::ProviderUnavailable(format!(
                "Ollama endpoint {} returned 404",
                self.endpoint()
            )));
        }

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ChatClientError::GenerationFailed(format!(
                "Ollama returned {status}: {body}"
            )));
        }

        let body: OllamaChatResponse = response.json().await.map_err(|error| {
            ChatClientError::InvalidResponse(format!("failed to decode Ollama response: {error}"))
        })?;

        if !body.done {
            return Err(ChatClientError::InvalidResponse(
                "Ollama response incomplete (streaming not supported)".into(),
            ));
        }

        Ok(body.message.content.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::{Method::POST, MockServer};

    fn http() -> Client {
        build_http_client("docqa-test", None).expect("client")
    }

    #[tokio::test]
    async fn openai_client_returns_first_choice_text() {
        let server = MockServer::start_async().await;
        let client = OpenAiChatClient {
            http: http(),
            base_url: server.base_url(),
            api_key: "sk-test".into(),
            model: "gpt-3.5-turbo".into(),
        };

        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/chat/completions")
                    .json_body_partial(r#"{"model":"gpt-3.5-turbo","temperature":0}"#);
                then.status(200).json_body(json!({
                    "choices": [{ "message": { "role": "assistant", "content": " Blue. " } }]
                }));
            })
            .await;

        let answer = client
            .complete(vec![
                ChatMessage::system("Answer briefly."),
                ChatMessage::user("What color is the sky?"),
            ])
            .await
            .expect("completion");

        mock.assert();
        assert_eq!(answer, "Blue.");
    }

    #[tokio::test]
    async fn openai_client_rejects_empty_completion() {
        let server = MockServer::start_async().await;
        let client = OpenAiChatClient {
            http: http(),
            base_url: server.base_url(),
            api_key: "sk-test".into(),
            model: "gpt-3.5-turbo".into(),
        };

        server
            .mock_async(|when, then| {
                when.method(POST).path("/chat/completions");
                then.status(200).json_body(json!({
                    "choices": [{ "message": { "role": "assistant", "content": null } }]
                }));
            })
            .await;

        let error = client
            .complete(vec![ChatMessage::user("hi")])
            .await
            .expect_err("empty completion");
        assert!(matches!(error, ChatClientError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn ollama_client_handles_successful_response() {
        let server = MockServer::start_async().await;
        let client = OllamaChatClient {
            http: http(),
            base_url: server.base_url(),
            model: "llama3".into(),
        };

        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/api/chat");
                then.status(200).json_body(json!({
                    "message": { "role": "assistant", "content": "Answer text" },
                    "done": true
                }));
            })
            .await;

        let answer = client
            .complete(vec![ChatMessage::user("Question")])
            .await
            .expect("answer");

        mock.assert();
        assert_eq!(answer, "Answer text");
    }

    #[tokio::test]
    async fn ollama_client_handles_error_status() {
        let server = MockServer::start_async().await;
        let client = OllamaChatClient {
            http: http(),
            base_url: server.base_url(),
            model: "llama3".into(),
        };

        server
            .mock_async(|when, then| {
                when.method(POST).path("/api/chat");
                then.status(500).body("boom");
            })
            .await;

        let error = client
            .complete(vec![ChatMessage::user("Question")])
            .await
            .expect_err("error response");

        assert!(
            matches!(error, ChatClientError::GenerationFailed(message) if message.contains("500"))
        );
    }
}
