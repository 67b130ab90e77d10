use serde::Deserialize;
use std::env;
use std::path::PathBuf;
use std::sync::OnceLock;
use thiserror::Error;

const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_OLLAMA_URL: &str = "http://127.0.0.1:11434";
const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-ada-002";
const DEFAULT_EMBEDDING_DIMENSION: usize = 1536;
const DEFAULT_EMBEDDING_BATCH_SIZE: usize = 64;
const DEFAULT_CHAT_MODEL: &str = "gpt-3.5-turbo";
const DEFAULT_CHUNK_SIZE: usize = 1000;
const DEFAULT_CHUNK_OVERLAP: usize = 200;
const DEFAULT_RETRIEVAL_TOP_K: usize = 4;
const DEFAULT_TOKEN_TTL_MINUTES: i64 = 30;
const DEFAULT_UPLOAD_DIR: &str = "uploads";
const DEFAULT_MAX_UPLOAD_BYTES: usize = 25 * 1024 * 1024;

/// Errors encountered while loading configuration from environment variables.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Required environment variable was not provided.
    #[error("Missing environment variable: {0}")]
    MissingVariable(String),
    /// Environment variable contained a value that could not be parsed.
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
}

/// Runtime configuration for the document Q&A server.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Credential for the OpenAI-compatible API; required when any provider is `openai`.
    pub openai_api_key: Option<String>,
    /// Base URL of the OpenAI-compatible API (no trailing `/embeddings`).
    pub openai_base_url: String,
    /// Base URL of the Ollama runtime.
    pub ollama_url: String,
    /// Embedding provider used to vectorize chunks and questions.
    pub embedding_provider: EmbeddingProvider,
    /// Embedding model identifier passed to the provider.
    pub embedding_model: String,
    /// Dimensionality of vectors produced by the local hashing provider.
    pub embedding_dimension: usize,
    /// Maximum number of chunks sent to the provider in a single request.
    pub embedding_batch_size: usize,
    /// Chat provider used for question condensing and answer generation.
    pub chat_provider: ChatProvider,
    /// Chat model identifier passed to the provider.
    pub chat_model: String,
    /// Optional per-request timeout applied to provider calls.
    pub provider_timeout_secs: Option<u64>,
    /// Target chunk length in characters.
    pub chunk_size: usize,
    /// Characters shared between consecutive chunks.
    pub chunk_overlap: usize,
    /// Number of chunks retrieved per question.
    pub retrieval_top_k: usize,
    /// Whether caller-supplied `chat_history` is honoured.
    pub chat_history_enabled: bool,
    /// Bearer-token gate for `/upload` and `/ask`; `None` disables authentication.
    pub auth: Option<AuthConfig>,
    /// Directory where uploads are staged while being processed.
    pub upload_dir: PathBuf,
    /// Upper bound on the request body accepted by `/upload`.
    pub max_upload_bytes: usize,
    /// Allowed CORS origins; `None` permits any origin.
    pub cors_allowed_origins: Option<Vec<String>>,
    /// Optional override for the HTTP server port.
    pub server_port: Option<u16>,
}

/// Settings for the bearer-token gate.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// HMAC secret used to sign access tokens.
    pub secret: String,
    /// Accounts allowed to log in, as `(username, password)` pairs.
    pub users: Vec<(String, String)>,
    /// Lifetime of issued access tokens in minutes.
    pub token_ttl_minutes: i64,
}

/// Supported embedding backends.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    /// Hosted OpenAI-compatible embeddings API.
    OpenAI,
    /// Local Ollama runtime.
    Ollama,
    /// Deterministic in-process word hashing; no network access.
    Hash,
}

/// Supported chat-completion backends.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatProvider {
    /// Hosted OpenAI-compatible chat completions API.
    OpenAI,
    /// Local Ollama runtime.
    Ollama,
}

impl Config {
    /// Load configuration from environment variables, performing validation along the way.
    pub fn from_env() -> Result<Self, ConfigError> {
        let embedding_provider: EmbeddingProvider = load_env_optional("EMBEDDING_PROVIDER")
            .map(|value| {
                value
                    .parse()
                    .map_err(|()| ConfigError::InvalidValue("EMBEDDING_PROVIDER".into()))
            })
            .transpose()?
            .unwrap_or(EmbeddingProvider::OpenAI);
        let chat_provider: ChatProvider = load_env_optional("CHAT_PROVIDER")
            .map(|value| {
                value
                    .parse()
                    .map_err(|()| ConfigError::InvalidValue("CHAT_PROVIDER".into()))
            })
            .transpose()?
            .unwrap_or(ChatProvider::OpenAI);

        let needs_openai = embedding_provider == EmbeddingProvider::OpenAI
            || chat_provider == ChatProvider::OpenAI;
        let openai_api_key = load_env_optional("OPENAI_API_KEY");
        if needs_openai && openai_api_key.is_none() {
            return Err(ConfigError::MissingVariable("OPENAI_API_KEY".into()));
        }

        let chunk_size = parse_or("CHUNK_SIZE", DEFAULT_CHUNK_SIZE)?;
        let chunk_overlap = parse_or("CHUNK_OVERLAP", DEFAULT_CHUNK_OVERLAP)?;
        if chunk_size == 0 {
            return Err(ConfigError::InvalidValue("CHUNK_SIZE".into()));
        }
        if chunk_overlap >= chunk_size {
            return Err(ConfigError::InvalidValue("CHUNK_OVERLAP".into()));
        }

        let retrieval_top_k = parse_or("RETRIEVAL_TOP_K", DEFAULT_RETRIEVAL_TOP_K)?;
        if retrieval_top_k == 0 {
            return Err(ConfigError::InvalidValue("RETRIEVAL_TOP_K".into()));
        }

        let embedding_batch_size = parse_or("EMBEDDING_BATCH_SIZE", DEFAULT_EMBEDDING_BATCH_SIZE)?;
        if embedding_batch_size == 0 {
            return Err(ConfigError::InvalidValue("EMBEDDING_BATCH_SIZE".into()));
        }

        Ok(Self {
            openai_api_key,
            openai_base_url: load_env_optional("OPENAI_BASE_URL")
                .unwrap_or_else(|| DEFAULT_OPENAI_BASE_URL.to_string()),
            ollama_url: load_env_optional("OLLAMA_URL")
                .unwrap_or_else(|| DEFAULT_OLLAMA_URL.to_string()),
            embedding_provider,
            embedding_model: load_env_optional("EMBEDDING_MODEL")
                .unwrap_or_else(|| DEFAULT_EMBEDDING_MODEL.to_string()),
            embedding_dimension: parse_or("EMBEDDING_DIMENSION", DEFAULT_EMBEDDING_DIMENSION)?,
            embedding_batch_size,
            chat_provider,
            chat_model: load_env_optional("CHAT_MODEL")
                .unwrap_or_else(|| DEFAULT_CHAT_MODEL.to_string()),
            provider_timeout_secs: parse_optional("PROVIDER_TIMEOUT_SECS")?,
            chunk_size,
            chunk_overlap,
            retrieval_top_k,
            chat_history_enabled: parse_bool_or("CHAT_HISTORY_ENABLED", true)?,
            auth: load_auth_config()?,
            upload_dir: load_env_optional("UPLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_UPLOAD_DIR)),
            max_upload_bytes: parse_or("MAX_UPLOAD_BYTES", DEFAULT_MAX_UPLOAD_BYTES)?,
            cors_allowed_origins: load_env_optional("CORS_ALLOWED_ORIGINS").map(|value| {
                value
                    .split(',')
                    .map(|origin| origin.trim().to_string())
                    .filter(|origin| !origin.is_empty())
                    .collect()
            }),
            server_port: parse_optional("SERVER_PORT")?,
        })
    }
}

fn load_auth_config() -> Result<Option<AuthConfig>, ConfigError> {
    if !parse_bool_or("AUTH_ENABLED", false)? {
        return Ok(None);
    }

    let secret = load_env("AUTH_SECRET")?;
    let users = parse_users(&load_env("AUTH_USERS")?)
        .ok_or_else(|| ConfigError::InvalidValue("AUTH_USERS".into()))?;
    let token_ttl_minutes = parse_or("AUTH_TOKEN_TTL_MINUTES", DEFAULT_TOKEN_TTL_MINUTES)?;
    if token_ttl_minutes <= 0 {
        return Err(ConfigError::InvalidValue("AUTH_TOKEN_TTL_MINUTES".into()));
    }

    Ok(Some(AuthConfig {
        secret,
        users,
        token_ttl_minutes,
    }))
}

/// Parse `user:password` pairs separated by commas. Returns `None` on a malformed entry.
fn parse_users(raw: &str) -> Option<Vec<(String, String)>> {
    let mut users = Vec::new();
    for entry in raw.split(',').map(str::trim).filter(|entry| !entry.is_empty()) {
        let (name, password) = entry.split_once(':')?;
        let name = name.trim();
        if name.is_empty() || password.is_empty() {
            return None;
        }
        users.push((name.to_string(), password.to_string()));
    }
    if users.is_empty() { None } else { Some(users) }
}

fn load_env(key: &str) -> Result<String, ConfigError> {
    load_env_optional(key).ok_or_else(|| ConfigError::MissingVariable(key.to_string()))
}

fn load_env_optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_optional<T: std::str::FromStr>(key: &str) -> Result<Option<T>, ConfigError> {
    load_env_optional(key)
        .map(|value| {
            value
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidValue(key.to_string()))
        })
        .transpose()
}

fn parse_or<T: std::str::FromStr>(key: &str, default: T) -> Result<T, ConfigError> {
    Ok(parse_optional(key)?.unwrap_or(default))
}

fn parse_bool_or(key: &str, default: bool) -> Result<bool, ConfigError> {
    match load_env_optional(key) {
        None => Ok(default),
        Some(value) => match value.trim().to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::InvalidValue(key.to_string())),
        },
    }
}

impl std::str::FromStr for EmbeddingProvider {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "openai" => Ok(Self::OpenAI),
            "ollama" => Ok(Self::Ollama),
            "hash" => Ok(Self::Hash),
            _ => Err(()),
        }
    }
}

impl std::str::FromStr for ChatProvider {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "openai" => Ok(Self::OpenAI),
            "ollama" => Ok(Self::Ollama),
            _ => Err(()),
        }
    }
}

/// Global configuration cache populated during process start.
pub static CONFIG: OnceLock<Config> = OnceLock::new();

/// Retrieve the loaded configuration, panicking if initialization has not occurred.
pub fn get_config() -> &'static Config {
    CONFIG.get().expect("Config not initialized")
}

/// Load configuration from the environment and install it in the global cache.
pub fn init_config() -> Result<&'static Config, ConfigError> {
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;
    tracing::debug!(
        embedding_provider = ?config.embedding_provider,
        embedding_model = %config.embedding_model,
        chat_provider = ?config.chat_provider,
        chat_model = %config.chat_model,
        auth_enabled = config.auth.is_some(),
        upload_dir = %config.upload_dir.display(),
        server_port = ?config.server_port,
        "Loaded configuration"
    );
    Ok(CONFIG.get_or_init(|| config))
}
