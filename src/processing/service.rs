//! Document Q&A service coordinating extraction, chunking, embedding, and answering.

use crate::{
    config::Config,
    embedding::{EmbeddingClient, get_embedding_client},
    generation::{ChatClient, get_chat_client},
    metrics::{MetricsSnapshot, QaMetrics},
    processing::{
        chunking::TextSplitter,
        index::VectorIndex,
        loader::DocumentFormat,
        pipeline::AnswerPipeline,
        sanitize::document_name,
        session::{SessionSnapshot, SessionState},
        types::{
            Answer, ConversationTurn, InternalError, ServiceError, SessionStatus, SourceUnit,
            StartupError, TextChunk, UploadOutcome,
        },
    },
};
use async_trait::async_trait;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

/// Tunables the service reads once at construction.
#[derive(Debug, Clone)]
pub struct ServiceSettings {
    /// Maximum chunk length in characters.
    pub chunk_size: usize,
    /// Characters shared by consecutive chunks.
    pub chunk_overlap: usize,
    /// Chunks retrieved per question.
    pub retrieval_top_k: usize,
    /// Chunk texts sent per embedding request.
    pub embedding_batch_size: usize,
    /// Whether caller-supplied history is used to condense follow-ups.
    pub chat_history_enabled: bool,
    /// Directory where uploads are staged while they are extracted.
    pub upload_dir: PathBuf,
}

impl ServiceSettings {
    /// Copy the relevant fields out of the process configuration.
    pub fn from_config(config: &Config) -> Self {
        Self {
            chunk_size: config.chunk_size,
            chunk_overlap: config.chunk_overlap,
            retrieval_top_k: config.retrieval_top_k,
            embedding_batch_size: config.embedding_batch_size,
            chat_history_enabled: config.chat_history_enabled,
            upload_dir: config.upload_dir.clone(),
        }
    }
}

/// Owns the provider clients and the live session.
///
/// Construct once near process start and share through an `Arc`; the HTTP surface only sees
/// it through [`DocumentQaApi`].
pub struct DocumentQaService {
    embedding_client: Arc<dyn EmbeddingClient>,
    chat_client: Arc<dyn ChatClient>,
    splitter: TextSplitter,
    settings: ServiceSettings,
    session: SessionState,
    metrics: Arc<QaMetrics>,
}

/// Abstraction over the document Q&A service used by the HTTP surface.
#[async_trait]
pub trait DocumentQaApi: Send + Sync {
    /// Extract, chunk, and embed an uploaded document, replacing the live index.
    async fn upload(&self, filename: &str, bytes: Vec<u8>) -> Result<UploadOutcome, ServiceError>;

    /// Answer a question against the live index.
    async fn ask(
        &self,
        question: &str,
        history: Vec<ConversationTurn>,
    ) -> Result<Answer, ServiceError>;

    /// Describe the live session, if a document has been indexed.
    async fn status(&self) -> Option<SessionStatus>;

    /// Retrieve the current metrics snapshot for diagnostics.
    fn metrics_snapshot(&self) -> MetricsSnapshot;
}

impl DocumentQaService {
    /// Build the service from configuration, constructing the configured providers.
    pub fn new(config: &Config) -> Result<Self, StartupError> {
        tracing::info!(provider = ?config.embedding_provider, model = %config.embedding_model, "Initializing embedding client");
        let embedding_client = get_embedding_client(config)?;
        tracing::info!(provider = ?config.chat_provider, model = %config.chat_model, "Initializing chat client");
        let chat_client = get_chat_client(config)?;
        Self::with_clients(
            ServiceSettings::from_config(config),
            embedding_client,
            chat_client,
        )
    }

    /// Build the service around explicit provider clients.
    ///
    /// Creates the staging directory if it does not exist.
    pub fn with_clients(
        settings: ServiceSettings,
        embedding_client: Arc<dyn EmbeddingClient>,
        chat_client: Arc<dyn ChatClient>,
    ) -> Result<Self, StartupError> {
        let splitter = TextSplitter::new(settings.chunk_size, settings.chunk_overlap)?;
        std::fs::create_dir_all(&settings.upload_dir).map_err(|source| {
            StartupError::UploadDir {
                path: settings.upload_dir.clone(),
                source,
            }
        })?;
        tracing::debug!(
            upload_dir = %settings.upload_dir.display(),
            chunk_size = settings.chunk_size,
            chunk_overlap = settings.chunk_overlap,
            top_k = settings.retrieval_top_k,
            history = settings.chat_history_enabled,
            "Document Q&A service ready"
        );

        Ok(Self {
            embedding_client,
            chat_client,
            splitter,
            settings,
            session: SessionState::new(),
            metrics: Arc::new(QaMetrics::new()),
        })
    }

    /// Process an upload and record its outcome.
    pub async fn upload(
        &self,
        filename: &str,
        bytes: Vec<u8>,
    ) -> Result<UploadOutcome, ServiceError> {
        let document = document_name(filename);
        let result = self.index_document(document.clone(), bytes).await;
        match &result {
            Ok(outcome) if outcome.installed => {
                self.metrics.record_document(outcome.chunk_count as u64);
                tracing::info!(
                    document = %outcome.document,
                    units = outcome.unit_count,
                    chunks = outcome.chunk_count,
                    version = outcome.version,
                    "Document indexed"
                );
            }
            Ok(outcome) => {
                self.metrics.record_superseded();
                tracing::warn!(
                    document = %outcome.document,
                    version = outcome.version,
                    "Document indexed but superseded by a newer upload"
                );
            }
            Err(error) => {
                self.metrics.record_upload_failure();
                tracing::warn!(%document, error = %error, "Upload failed");
            }
        }
        result
    }

    async fn index_document(
        &self,
        document: String,
        bytes: Vec<u8>,
    ) -> Result<UploadOutcome, ServiceError> {
        // Rejected formats never touch the disk.
        let format = DocumentFormat::from_filename(&document)?;
        let version = self.session.begin_upload();
        tracing::info!(%document, ?format, bytes = bytes.len(), version, "Processing upload");

        let units = self.extract(format, document.clone(), bytes).await?;
        let chunks = self.splitter.split_units(&units);
        if chunks.is_empty() {
            return Err(InternalError::EmptyDocument.into());
        }
        let chunk_count = chunks.len();
        tracing::debug!(%document, units = units.len(), chunks = chunk_count, "Document chunked");

        let vectors = self.embed_chunks(&chunks).await?;
        let index = Arc::new(VectorIndex::build(chunks, vectors).map_err(InternalError::from)?);
        let pipeline = AnswerPipeline::new(
            index.clone(),
            self.embedding_client.clone(),
            self.chat_client.clone(),
            self.settings.retrieval_top_k,
        );

        let installed = self
            .session
            .install(SessionSnapshot {
                version,
                document: document.clone(),
                index,
                pipeline,
            })
            .await;

        Ok(UploadOutcome {
            document,
            unit_count: units.len(),
            chunk_count,
            version,
            installed,
        })
    }

    /// Stage the bytes under a server-generated name and run the extractor on a blocking thread.
    ///
    /// The staged file is removed when the blocking task finishes, whatever the outcome.
    async fn extract(
        &self,
        format: DocumentFormat,
        document: String,
        bytes: Vec<u8>,
    ) -> Result<Vec<SourceUnit>, InternalError> {
        let upload_dir = self.settings.upload_dir.clone();
        tokio::task::spawn_blocking(move || -> Result<Vec<SourceUnit>, InternalError> {
            let mut staged = tempfile::Builder::new()
                .prefix("upload-")
                .suffix(&format!(".{}", format.extension()))
                .tempfile_in(&upload_dir)?;
            staged.write_all(&bytes)?;
            staged.flush()?;
            tracing::debug!(staged = %staged.path().display(), "Upload staged");
            Ok(format.load(staged.path(), &document)?)
        })
        .await
        .map_err(|error| InternalError::Task(error.to_string()))?
    }

    async fn embed_chunks(&self, chunks: &[TextChunk]) -> Result<Vec<Vec<f32>>, InternalError> {
        let batch_size = self.settings.embedding_batch_size.max(1);
        let mut vectors = Vec::with_capacity(chunks.len());
        for (batch_idx, batch) in chunks.chunks(batch_size).enumerate() {
            let texts: Vec<String> = batch.iter().map(|chunk| chunk.text.clone()).collect();
            tracing::debug!(batch = batch_idx, size = texts.len(), "Embedding chunk batch");
            vectors.extend(self.embedding_client.generate_embeddings(texts).await?);
        }
        Ok(vectors)
    }

    /// Answer a question and record its outcome.
    pub async fn ask(
        &self,
        question: &str,
        history: Vec<ConversationTurn>,
    ) -> Result<Answer, ServiceError> {
        let result = self.answer(question, &history).await;
        self.metrics.record_question(result.is_ok());
        match &result {
            Ok(answer) => tracing::info!(
                turns = history.len(),
                context = answer.context.len(),
                "Question answered"
            ),
            Err(error) => tracing::warn!(error = %error, "Question failed"),
        }
        result
    }

    async fn answer(
        &self,
        question: &str,
        history: &[ConversationTurn],
    ) -> Result<Answer, ServiceError> {
        // Held for the whole request so a concurrent upload cannot swap the index mid-answer.
        let snapshot = self.session.current().await.ok_or(ServiceError::NotReady)?;
        let question = question.trim();
        if question.is_empty() {
            return Err(ServiceError::EmptyQuestion);
        }

        let history: &[ConversationTurn] = if self.settings.chat_history_enabled {
            history
        } else {
            if !history.is_empty() {
                tracing::debug!(turns = history.len(), "Chat history disabled; ignoring turns");
            }
            &[]
        };
        tracing::debug!(version = snapshot.version, document = %snapshot.document, "Answering question");

        Ok(snapshot.pipeline.run(question, history).await?)
    }

    /// Describe the live session.
    pub async fn status(&self) -> Option<SessionStatus> {
        self.session.status().await
    }

    /// Return the current upload and question counters.
    pub fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }
}

#[async_trait]
impl DocumentQaApi for DocumentQaService {
    async fn upload(&self, filename: &str, bytes: Vec<u8>) -> Result<UploadOutcome, ServiceError> {
        DocumentQaService::upload(self, filename, bytes).await
    }

    async fn ask(
        &self,
        question: &str,
        history: Vec<ConversationTurn>,
    ) -> Result<Answer, ServiceError> {
        DocumentQaService::ask(self, question, history).await
    }

    async fn status(&self) -> Option<SessionStatus> {
        DocumentQaService::status(self).await
    }

    fn metrics_snapshot(&self) -> MetricsSnapshot {
        DocumentQaService::metrics_snapshot(self)
    }
}
