//! HTTP surface for the document Q&A server.
//!
//! This module exposes a compact Axum router:
//!
//! - `POST /token` – Exchange form credentials for a bearer token (only when auth is enabled).
//! - `POST /upload` – Multipart upload (field `file`); replaces the active document.
//! - `POST /ask` – Answer `{question, chat_history?}` from the active document.
//! - `GET /health` – Liveness plus a summary of the active document.
//! - `GET /metrics` – Upload and question counters.
//! - `GET /commands` – Machine-readable command catalog for quick discovery by tools/hosts.
//!
//! Errors are returned as `{"detail": "..."}`.

use crate::auth::{AuthError, AuthGate, IssuedToken};
use crate::config::Config;
use crate::metrics::MetricsSnapshot;
use crate::processing::{Answer, ConversationTurn, DocumentQaApi, ServiceError};
use axum::{
    Extension, Form, Json, Router,
    extract::{
        DefaultBodyLimit, Multipart, Request, State,
        multipart::{MultipartError, MultipartRejection},
        rejection::{FormRejection, JsonRejection},
    },
    http::{HeaderValue, StatusCode, header},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

/// Router-level settings that do not belong to the service itself.
#[derive(Clone, Default)]
pub struct ApiOptions {
    /// Enables `/token` and bearer checks on `/upload` and `/ask`.
    pub auth: Option<Arc<AuthGate>>,
    /// Allowed CORS origins; `None` allows any origin.
    pub cors_allowed_origins: Option<Vec<String>>,
    /// Request body limit for `/upload`.
    pub max_upload_bytes: usize,
}

impl ApiOptions {
    /// Derive options from configuration, building the auth gate when enabled.
    pub fn from_config(config: &Config) -> Self {
        Self {
            auth: config.auth.as_ref().map(|auth| Arc::new(AuthGate::new(auth))),
            cors_allowed_origins: config.cors_allowed_origins.clone(),
            max_upload_bytes: config.max_upload_bytes,
        }
    }
}

/// Build the HTTP router exposing the Q&A API surface.
pub fn create_router<S>(service: Arc<S>, options: ApiOptions) -> Router
where
    S: DocumentQaApi + 'static,
{
    let mut protected = Router::new()
        .route(
            "/upload",
            post(upload_document::<S>).layer(DefaultBodyLimit::max(options.max_upload_bytes)),
        )
        .route("/ask", post(ask_question::<S>));
    if let Some(gate) = &options.auth {
        protected =
            protected.route_layer(middleware::from_fn_with_state(gate.clone(), require_bearer));
    }

    let mut router = protected
        .route("/health", get(health::<S>))
        .route("/metrics", get(get_metrics::<S>))
        .route("/commands", get(get_commands))
        .with_state(service);

    if let Some(gate) = options.auth {
        router = router.merge(
            Router::new()
                .route("/token", post(issue_token))
                .with_state(gate),
        );
    }

    router.layer(cors_layer(options.cors_allowed_origins.as_deref()))
}

fn cors_layer(origins: Option<&[String]>) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    match origins {
        Some(origins) => {
            let allowed: Vec<HeaderValue> = origins
                .iter()
                .filter_map(|origin| match HeaderValue::from_str(origin) {
                    Ok(value) => Some(value),
                    Err(_) => {
                        tracing::warn!(%origin, "Ignoring invalid CORS origin");
                        None
                    }
                })
                .collect();
            layer.allow_origin(allowed)
        }
        None => layer.allow_origin(Any),
    }
}

/// Username attached to requests that passed the bearer check.
#[derive(Clone, Debug)]
pub struct AuthenticatedUser(String);

/// Reject requests without a valid `Authorization: Bearer` token.
async fn require_bearer(
    State(gate): State<Arc<AuthGate>>,
    mut request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let token = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| {
            value
                .strip_prefix("Bearer ")
                .or_else(|| value.strip_prefix("bearer "))
        })
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or(AuthError::MissingToken)
        .inspect_err(|_| tracing::warn!(path = %request.uri().path(), "Missing bearer token"))?;

    let user = gate.validate(token).inspect_err(|error| {
        tracing::warn!(path = %request.uri().path(), error = %error, "Bearer token rejected");
    })?;
    request.extensions_mut().insert(AuthenticatedUser(user));
    Ok(next.run(request).await)
}

/// Form body for `POST /token`.
#[derive(Deserialize)]
struct LoginForm {
    username: String,
    password: String,
}

/// Exchange username and password for a bearer token.
async fn issue_token(
    State(gate): State<Arc<AuthGate>>,
    form: Result<Form<LoginForm>, FormRejection>,
) -> Result<Json<IssuedToken>, AppError> {
    let Form(form) = form?;
    Ok(Json(gate.login(&form.username, &form.password)?))
}

/// Success response for `POST /upload`.
///
/// `installed` is `false` when a newer upload became active while this one was processing;
/// the document was indexed but will not be used to answer questions.
#[derive(Serialize)]
struct UploadResponse {
    message: &'static str,
    document: String,
    chunks: usize,
    version: u64,
    installed: bool,
}

/// Accept a multipart upload and index it as the active document.
///
/// The first part named `file` is used; other parts are ignored.
async fn upload_document<S>(
    State(service): State<Arc<S>>,
    user: Option<Extension<AuthenticatedUser>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<UploadResponse>, AppError>
where
    S: DocumentQaApi,
{
    let mut multipart = multipart?;
    let mut upload = None;
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some("file") {
            continue;
        }
        let filename = field.file_name().unwrap_or_default().to_string();
        let bytes = field.bytes().await?;
        upload = Some((filename, bytes));
        break;
    }
    let (filename, bytes) = upload.ok_or(ServiceError::MissingFile)?;
    tracing::info!(
        %filename,
        bytes = bytes.len(),
        user = user.as_ref().map(|Extension(user)| user.0.as_str()),
        "Upload received"
    );

    let outcome = service.upload(&filename, bytes.to_vec()).await?;
    let message = if outcome.installed {
        "File processed successfully"
    } else {
        tracing::warn!(
            document = %outcome.document,
            version = outcome.version,
            "Upload superseded before it became active"
        );
        "File processed but superseded by a newer upload"
    };
    Ok(Json(UploadResponse {
        message,
        document: outcome.document,
        chunks: outcome.chunk_count,
        version: outcome.version,
        installed: outcome.installed,
    }))
}

/// Request body for `POST /ask`.
#[derive(Deserialize)]
struct AskRequest {
    question: String,
    #[serde(default)]
    chat_history: Vec<ConversationTurn>,
}

/// Answer a question from the active document.
async fn ask_question<S>(
    State(service): State<Arc<S>>,
    request: Result<Json<AskRequest>, JsonRejection>,
) -> Result<Json<Answer>, AppError>
where
    S: DocumentQaApi,
{
    let Json(request) = request?;
    let answer = service
        .ask(&request.question, request.chat_history)
        .await?;
    Ok(Json(answer))
}

/// Report liveness and the active document, if any.
async fn health<S>(State(service): State<Arc<S>>) -> Json<serde_json::Value>
where
    S: DocumentQaApi,
{
    let body = match service.status().await {
        Some(status) => json!({
            "status": "ok",
            "document_loaded": true,
            "document": status.document,
            "chunk_count": status.chunk_count,
            "index_version": status.version,
        }),
        None => json!({ "status": "ok", "document_loaded": false }),
    };
    Json(body)
}

/// Return upload and question counters.
async fn get_metrics<S>(State(service): State<Arc<S>>) -> Json<MetricsSnapshot>
where
    S: DocumentQaApi,
{
    Json(service.metrics_snapshot())
}

/// Descriptor for a single command in the discovery catalog.
#[derive(Serialize)]
struct CommandDescriptor {
    name: &'static str,
    method: &'static str,
    path: &'static str,
    description: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    request_example: Option<serde_json::Value>,
}

/// Response body for `GET /commands`.
#[derive(Serialize)]
struct CommandsResponse {
    commands: Vec<CommandDescriptor>,
}

/// Enumerate supported HTTP commands for discovery/UX in hosts and tools.
async fn get_commands() -> Json<CommandsResponse> {
    Json(CommandsResponse {
        commands: vec![
            CommandDescriptor {
                name: "token",
                method: "POST",
                path: "/token",
                description: "Exchange form fields username/password for { \"access_token\", \"token_type\": \"bearer\" }. Only mounted when AUTH_ENABLED=true.",
                request_example: Some(json!("username=alice&password=secret")),
            },
            CommandDescriptor {
                name: "upload",
                method: "POST",
                path: "/upload",
                description: "Upload a PDF, DOCX/DOC, TXT, or CSV file as multipart field `file`. Replaces the active document.",
                request_example: None,
            },
            CommandDescriptor {
                name: "ask",
                method: "POST",
                path: "/ask",
                description: "Answer a question from the active document. Response returns { \"answer\": string, \"context\": [string] }.",
                request_example: Some(json!({
                    "question": "What color is the sky?",
                    "chat_history": [
                        { "question": "What is this document about?", "answer": "Colors." }
                    ]
                })),
            },
            CommandDescriptor {
                name: "health",
                method: "GET",
                path: "/health",
                description: "Report liveness and whether a document is loaded.",
                request_example: None,
            },
            CommandDescriptor {
                name: "metrics",
                method: "GET",
                path: "/metrics",
                description: "Return upload and question counters useful for observability dashboards.",
                request_example: None,
            },
        ],
    })
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = match &self {
            AuthError::MissingToken | AuthError::InvalidToken | AuthError::UnknownUser => {
                StatusCode::UNAUTHORIZED
            }
            AuthError::BadCredentials => StatusCode::BAD_REQUEST,
            AuthError::Signing(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let mut response = detail(status, self.to_string());
        if status == StatusCode::UNAUTHORIZED {
            response
                .headers_mut()
                .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
        }
        response
    }
}

fn detail(status: StatusCode, message: String) -> Response {
    (status, Json(json!({ "detail": message }))).into_response()
}

enum AppError {
    Service(ServiceError),
    Auth(AuthError),
    Rejected(StatusCode, String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::Service(error) => {
                let status = match &error {
                    ServiceError::UnsupportedFormat(_)
                    | ServiceError::MissingFile
                    | ServiceError::NotReady => StatusCode::BAD_REQUEST,
                    ServiceError::EmptyQuestion => StatusCode::UNPROCESSABLE_ENTITY,
                    ServiceError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
                };
                if status.is_server_error() {
                    tracing::error!(error = %error, "Request failed");
                }
                detail(status, error.to_string())
            }
            AppError::Auth(error) => error.into_response(),
            AppError::Rejected(status, message) => detail(status, message),
        }
    }
}

impl From<ServiceError> for AppError {
    fn from(inner: ServiceError) -> Self {
        Self::Service(inner)
    }
}

impl From<AuthError> for AppError {
    fn from(inner: AuthError) -> Self {
        Self::Auth(inner)
    }
}

impl From<MultipartError> for AppError {
    fn from(inner: MultipartError) -> Self {
        Self::Rejected(inner.status(), inner.body_text())
    }
}

impl From<MultipartRejection> for AppError {
    fn from(inner: MultipartRejection) -> Self {
        Self::Rejected(inner.status(), inner.body_text())
    }
}

// Malformed bodies are validation failures.
impl From<JsonRejection> for AppError {
    fn from(inner: JsonRejection) -> Self {
        Self::Rejected(StatusCode::UNPROCESSABLE_ENTITY, inner.body_text())
    }
}

impl From<FormRejection> for AppError {
    fn from(inner: FormRejection) -> Self {
        Self::Rejected(StatusCode::UNPROCESSABLE_ENTITY, inner.body_text())
    }
}
