//! Retrieval-augmented answering bound to one vector index.
//!
//! With conversation history, the follow-up question is first rewritten into a standalone
//! question by the chat model. The standalone question is embedded, the nearest chunks are
//! retrieved, and the chat model answers from those chunks alone.

use super::index::VectorIndex;
use super::types::{Answer, ConversationTurn, InternalError};
use crate::embedding::{EmbeddingClient, EmbeddingClientError};
use crate::generation::{ChatClient, ChatMessage};
use std::sync::Arc;

const CONDENSE_INSTRUCTIONS: &str = "Given the following conversation and a follow up question, \
rephrase the follow up question to be a standalone question, in its original language.";

const ANSWER_INSTRUCTIONS: &str = "Use the following pieces of context to answer the user's \
question. If you don't know the answer, just say that you don't know, don't try to make up an \
answer.";

/// Question-answering chain over a fixed index.
pub struct AnswerPipeline {
    index: Arc<VectorIndex>,
    embedder: Arc<dyn EmbeddingClient>,
    chat: Arc<dyn ChatClient>,
    top_k: usize,
}

impl AnswerPipeline {
    /// Bind the providers to `index`, retrieving `top_k` chunks per question.
    pub fn new(
        index: Arc<VectorIndex>,
        embedder: Arc<dyn EmbeddingClient>,
        chat: Arc<dyn ChatClient>,
        top_k: usize,
    ) -> Self {
        Self {
            index,
            embedder,
            chat,
            top_k: top_k.max(1),
        }
    }

    /// Answer `question`, using `history` to resolve references to earlier turns.
    ///
    /// The caller validates that `question` is non-blank.
    pub async fn run(
        &self,
        question: &str,
        history: &[ConversationTurn],
    ) -> Result<Answer, InternalError> {
        let standalone = if history.is_empty() {
            question.to_string()
        } else {
            let condensed = self
                .chat
                .complete(condense_messages(question, history))
                .await?;
            tracing::debug!(%condensed, turns = history.len(), "Condensed follow-up question");
            condensed
        };

        let query = self
            .embedder
            .generate_embeddings(vec![standalone.clone()])
            .await?
            .pop()
            .ok_or_else(|| {
                EmbeddingClientError::InvalidResponse("no vector returned for question".into())
            })?;

        let context: Vec<String> = self
            .index
            .search(&query, self.top_k)?
            .into_iter()
            .map(|hit| hit.chunk.text.clone())
            .collect();
        tracing::debug!(retrieved = context.len(), "Retrieved context");

        let answer = self
            .chat
            .complete(answer_messages(&standalone, &context))
            .await?;

        Ok(Answer { answer, context })
    }
}

fn format_history(history: &[ConversationTurn]) -> String {
    history
        .iter()
        .map(|turn| format!("Human: {}\nAssistant: {}", turn.question, turn.answer))
        .collect::<Vec<_>>()
        .join("\n")
}

fn condense_messages(question: &str, history: &[ConversationTurn]) -> Vec<ChatMessage> {
    vec![ChatMessage::user(format!(
        "{CONDENSE_INSTRUCTIONS}\n\nChat History:\n{}\nFollow Up Input: {question}\nStandalone question:",
        format_history(history)
    ))]
}

fn answer_messages(question: &str, context: &[String]) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(format!(
            "{ANSWER_INSTRUCTIONS}\n----------------\n{}",
            context.join("\n\n")
        )),
        ChatMessage::user(question),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashEmbeddingClient;
    use crate::generation::{ChatClientError, Role};
    use crate::processing::types::{SourceMetadata, TextChunk};
    use async_trait::async_trait;
    use tokio::sync::Mutex;

    /// Returns scripted replies in order and records every request.
    struct ScriptedChat {
        replies: Mutex<Vec<String>>,
        requests: Mutex<Vec<Vec<ChatMessage>>>,
    }

    impl ScriptedChat {
        fn new(replies: &[&str]) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.iter().rev().map(|r| r.to_string()).collect()),
                requests: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl ChatClient for ScriptedChat {
        async fn complete(&self, messages: Vec<ChatMessage>) -> Result<String, ChatClientError> {
            self.requests.lock().await.push(messages);
            self.replies
                .lock()
                .await
                .pop()
                .ok_or_else(|| ChatClientError::GenerationFailed("no scripted reply".into()))
        }
    }

    async fn pipeline(texts: &[&str], chat: Arc<ScriptedChat>, top_k: usize) -> AnswerPipeline {
        let embedder = Arc::new(HashEmbeddingClient::new(256));
        let chunks: Vec<TextChunk> = texts
            .iter()
            .map(|text| TextChunk {
                text: text.to_string(),
                metadata: SourceMetadata {
                    source: "facts.txt".into(),
                    row: None,
                    page: None,
                },
                start_index: 0,
            })
            .collect();
        let vectors = embedder
            .generate_embeddings(texts.iter().map(|t| t.to_string()).collect())
            .await
            .expect("vectors");
        let index = Arc::new(VectorIndex::build(chunks, vectors).expect("index"));
        AnswerPipeline::new(index, embedder, chat, top_k)
    }

    #[tokio::test]
    async fn answers_from_the_most_similar_chunk() {
        let chat = ScriptedChat::new(&["Blue."]);
        let pipeline = pipeline(
            &[
                "Grass is green in spring.",
                "The sky is blue on a clear day.",
                "Bananas are yellow.",
            ],
            chat.clone(),
            1,
        )
        .await;

        let answer = pipeline
            .run("What color is the sky on a clear day?", &[])
            .await
            .expect("answer");

        assert_eq!(answer.answer, "Blue.");
        assert_eq!(answer.context, vec!["The sky is blue on a clear day."]);

        let requests = chat.requests.lock().await;
        assert_eq!(requests.len(), 1, "no condense call without history");
        assert_eq!(requests[0][0].role, Role::System);
        assert!(requests[0][0].content.contains("The sky is blue on a clear day."));
        assert_eq!(requests[0][1].content, "What color is the sky on a clear day?");
    }

    #[tokio::test]
    async fn history_triggers_condensed_question() {
        let chat = ScriptedChat::new(&["What color is the grass?", "Green."]);
        let pipeline = pipeline(
            &["Grass is green in spring.", "Clouds look white."],
            chat.clone(),
            4,
        )
        .await;

        let history = vec![ConversationTurn {
            question: "What color is the sky?".into(),
            answer: "Blue.".into(),
        }];
        let answer = pipeline
            .run("And the grass?", &history)
            .await
            .expect("answer");

        assert_eq!(answer.answer, "Green.");
        assert_eq!(answer.context[0], "Grass is green in spring.");

        let requests = chat.requests.lock().await;
        assert_eq!(requests.len(), 2);
        let condense = &requests[0][0].content;
        assert!(condense.contains("Human: What color is the sky?\nAssistant: Blue."));
        assert!(condense.contains("Follow Up Input: And the grass?"));
        assert_eq!(requests[1][1].content, "What color is the grass?");
    }

    #[tokio::test]
    async fn generation_failure_is_internal() {
        let chat = ScriptedChat::new(&[]);
        let pipeline = pipeline(&["Only chunk."], chat, 4).await;
        let error = pipeline.run("Anything?", &[]).await.unwrap_err();
        assert!(matches!(error, InternalError::Generation(_)));
        assert!(error.to_string().contains("no scripted reply"));
    }
}
