//! HTTP API for the PDF assistant.
//!
//! Every route except `/health` and `/login` requires the signed session
//! cookie issued by `/login`. Page routes additionally require the user's
//! roles to grant the page (see [`crate::access`]).
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Health check (returns version) |
//! | `POST` | `/login` | Verify credentials, set the session cookie |
//! | `POST` | `/logout` | Clear the cookie and the session's state |
//! | `GET`  | `/me` | Welcome line and navigation |
//! | `GET`  | `/pages/{slug}` | Page readiness, current file, chat history |
//! | `POST` | `/pages/{slug}/upload` | Multipart `file` field → indexed document |
//! | `POST` | `/pages/{slug}/ask` | `{question}` → `{answer, sources}` |
//! | `GET`  | `/pages/{slug}/messages` | Chat history |
//! | `DELETE` | `/pages/{slug}/messages` | Clear chat history and document |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "forbidden", "message": "You do not have access to this page" } }
//! ```
//!
//! Error codes: `bad_request` (400), `unauthorized` (401), `forbidden` (403),
//! `not_found` (404), `payload_too_large` (413), `upstream` (502),
//! `missing_api_key` (503), `internal` (500).
//!
//! Request bodies are parsed only after the session has been checked, and
//! malformed bodies are reported as `bad_request` in the same envelope.
//!
//! # Provider keys
//!
//! Upload and ask resolve the page's providers and their API keys before
//! reading the request body or building a client, so a missing key stops
//! the request before any external call.

use axum::{
    extract::{
        multipart::{MultipartError, MultipartRejection},
        rejection::JsonRejection,
        DefaultBodyLimit, Multipart, Path, State,
    },
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::access::{can_access, navigation, NavEntry};
use crate::config::{AppPage, Config, EmbeddingConfig, LlmConfig, Provider};
use crate::credentials::{Credentials, UserRecord};
use crate::embedding::{create_embedder, Embedder};
use crate::error::PipelineError;
use crate::keys::ApiKeys;
use crate::llm::{create_chat_model, ChatModel};
use crate::models::{Answer, ChatMessage};
use crate::pipeline;
use crate::session::{
    clear_cookie, cookie_value, session_cookie, sign_token, verify_token, SessionStore, TokenClaims,
};
use crate::upload::{check_pdf, TempUpload};

/// Room for multipart boundaries and headers on top of the file itself.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

const LOGIN_PROMPT: &str = "Please enter your username and password";
const BAD_LOGIN: &str = "Username/password is incorrect";

/// Builds provider clients once a key has been found.
///
/// The server goes through this seam so tests can substitute in-process
/// fakes for the hosted APIs.
pub trait ProviderFactory: Send + Sync {
    fn embedder(
        &self,
        config: &EmbeddingConfig,
        provider: Provider,
        api_key: &str,
    ) -> anyhow::Result<Arc<dyn Embedder>>;

    fn chat_model(
        &self,
        config: &LlmConfig,
        provider: Provider,
        api_key: &str,
    ) -> anyhow::Result<Arc<dyn ChatModel>>;
}

/// The hosted OpenAI and Gemini clients.
pub struct HostedProviders;

impl ProviderFactory for HostedProviders {
    fn embedder(
        &self,
        config: &EmbeddingConfig,
        provider: Provider,
        api_key: &str,
    ) -> anyhow::Result<Arc<dyn Embedder>> {
        create_embedder(config, provider, api_key)
    }

    fn chat_model(
        &self,
        config: &LlmConfig,
        provider: Provider,
        api_key: &str,
    ) -> anyhow::Result<Arc<dyn ChatModel>> {
        create_chat_model(config, provider, api_key)
    }
}

/// Shared application state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    config: Arc<Config>,
    credentials: Arc<Credentials>,
    keys: Arc<ApiKeys>,
    sessions: Arc<SessionStore>,
    providers: Arc<dyn ProviderFactory>,
}

impl AppState {
    pub fn new(
        config: Config,
        credentials: Credentials,
        keys: ApiKeys,
        providers: Arc<dyn ProviderFactory>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            credentials: Arc::new(credentials),
            keys: Arc::new(keys),
            sessions: Arc::new(SessionStore::new()),
            providers,
        }
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }
}

/// Build the router with all routes and layers attached.
pub fn router(state: AppState) -> Router {
    let body_limit = state
        .config
        .upload
        .max_bytes
        .saturating_add(MULTIPART_OVERHEAD);

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/login", post(handle_login))
        .route("/logout", post(handle_logout))
        .route("/me", get(handle_me))
        .route("/pages/{slug}", get(handle_page))
        .route("/pages/{slug}/upload", post(handle_upload))
        .route("/pages/{slug}/ask", post(handle_ask))
        .route(
            "/pages/{slug}/messages",
            get(handle_messages).delete(handle_clear_messages),
        )
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Starts the HTTP server on `[server].bind`.
///
/// Loads the credentials file and provider keys, then serves until the
/// process is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let credentials = Credentials::load(&config.auth.credentials_path)?;
    let keys = ApiKeys::from_env();
    for (page, reason) in unready_pages(config, &keys) {
        tracing::warn!(page = %page, reason = %reason, "page is not ready");
    }

    let bind_addr = config.server.bind.clone();
    let state = AppState::new(config.clone(), credentials, keys, Arc::new(HostedProviders));
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!(addr = %bind_addr, pages = config.apps.len(), "server listening");
    println!("PDF assistant listening on http://{}", bind_addr);
    axum::serve(listener, app).await?;

    Ok(())
}

/// Pages that cannot upload or answer with the current keys and embedding
/// settings, with the reason shown to their users.
fn unready_pages(config: &Config, keys: &ApiKeys) -> Vec<(String, String)> {
    config
        .apps
        .iter()
        .filter_map(|page| {
            keys.for_page(config, page)
                .err()
                .map(|e| (page.page.clone(), e.to_string()))
        })
        .collect()
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

/// Error type that converts into an Axum HTTP response.
#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl AppError {
    fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError::new(StatusCode::BAD_REQUEST, "bad_request", message)
}

fn unauthorized(message: impl Into<String>) -> AppError {
    AppError::new(StatusCode::UNAUTHORIZED, "unauthorized", message)
}

fn forbidden(message: impl Into<String>) -> AppError {
    AppError::new(StatusCode::FORBIDDEN, "forbidden", message)
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError::new(StatusCode::NOT_FOUND, "not_found", message)
}

fn internal(message: impl Into<String>) -> AppError {
    AppError::new(StatusCode::INTERNAL_SERVER_ERROR, "internal", message)
}

impl From<PipelineError> for AppError {
    fn from(err: PipelineError) -> Self {
        let message = err.to_string();
        match err {
            PipelineError::MissingApiKey { .. } => {
                AppError::new(StatusCode::SERVICE_UNAVAILABLE, "missing_api_key", message)
            }
            PipelineError::TooLarge { .. } => {
                AppError::new(StatusCode::PAYLOAD_TOO_LARGE, "payload_too_large", message)
            }
            PipelineError::Upstream { .. } => {
                AppError::new(StatusCode::BAD_GATEWAY, "upstream", message)
            }
            PipelineError::EmptyQuestion
            | PipelineError::NoDocument
            | PipelineError::NotPdf(_)
            | PipelineError::Pdf(_)
            | PipelineError::EmptyDocument
            | PipelineError::EmbeddingsDisabled => bad_request(message),
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        match err.downcast::<PipelineError>() {
            Ok(pipeline) => pipeline.into(),
            Err(other) => {
                tracing::error!(error = %format!("{:#}", other), "request failed");
                internal(format!("{:#}", other))
            }
        }
    }
}

/// Failures while indexing or answering are reported as provider errors;
/// user-facing pipeline errors keep their own status.
fn processing_error(what: &str, err: anyhow::Error) -> AppError {
    let message = format!("Error processing {}: {:#}", what, err);
    match err.downcast::<PipelineError>() {
        Ok(PipelineError::Upstream { .. }) | Err(_) => {
            AppError::new(StatusCode::BAD_GATEWAY, "upstream", message)
        }
        Ok(other) => other.into(),
    }
}

fn json_rejection(rejection: JsonRejection) -> AppError {
    bad_request(rejection.body_text())
}

fn multipart_rejection(rejection: MultipartRejection) -> AppError {
    bad_request(rejection.body_text())
}

fn multipart_error(err: MultipartError) -> AppError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::new(StatusCode::PAYLOAD_TOO_LARGE, "payload_too_large", err.body_text())
    } else {
        bad_request(err.body_text())
    }
}

// ============ Authentication ============

/// The logged-in user behind a request.
struct CurrentUser {
    sid: String,
    /// Cookie expiry, unix seconds.
    exp: i64,
    username: String,
    name: String,
    roles: Option<Vec<String>>,
}

fn now_secs() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Resolve the session cookie to a live session, re-admitting a session
/// whose in-memory state was lost.
fn authenticate(state: &AppState, headers: &HeaderMap) -> Result<CurrentUser, AppError> {
    let cookie = &state.credentials.cookie;
    let token = headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find_map(|h| cookie_value(h, &cookie.name))
        .ok_or_else(|| unauthorized(LOGIN_PROMPT))?;

    let now = now_secs();
    let claims = verify_token(&cookie.key, token, now).ok_or_else(|| unauthorized(LOGIN_PROMPT))?;
    let user = state
        .credentials
        .user(&claims.username)
        .ok_or_else(|| unauthorized(LOGIN_PROMPT))?;
    if !state.sessions.restore(&claims.sid, user, claims.exp, now) {
        return Err(unauthorized(LOGIN_PROMPT));
    }

    state
        .sessions
        .with(&claims.sid, |s| CurrentUser {
            sid: s.sid.clone(),
            exp: claims.exp,
            username: s.username.clone(),
            name: s.name.clone(),
            roles: s.roles.clone(),
        })
        .ok_or_else(|| unauthorized(LOGIN_PROMPT))
}

/// Look up a page the user is allowed to open.
fn open_page<'a>(state: &'a AppState, user: &CurrentUser, slug: &str) -> Result<&'a AppPage, AppError> {
    let page = state
        .config
        .find_page(slug)
        .ok_or_else(|| not_found(format!("no page named '{}'", slug)))?;
    if !can_access(user.roles.as_deref(), page) {
        tracing::info!(user = %user.username, page = slug, "page access denied");
        return Err(forbidden("You do not have access to this page"));
    }
    Ok(page)
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ POST /login, POST /logout, GET /me ============

#[derive(Deserialize)]
struct LoginRequest {
    #[serde(default)]
    username: String,
    #[serde(default)]
    password: String,
}

#[derive(Serialize)]
struct UserResponse {
    username: String,
    name: String,
    roles: Vec<String>,
    welcome: String,
    pages: Vec<NavEntry>,
}

fn user_response(config: &Config, username: &str, name: &str, roles: Option<&[String]>) -> UserResponse {
    let role_list = roles.map(<[String]>::to_vec).unwrap_or_default();
    UserResponse {
        username: username.to_string(),
        name: name.to_string(),
        welcome: format!("Welcome, {} ({})", name, role_list.join(",")),
        roles: role_list,
        pages: navigation(roles, &config.apps),
    }
}

async fn handle_login(
    State(state): State<AppState>,
    body: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Json(req) = body.map_err(json_rejection)?;
    if req.username.trim().is_empty() || req.password.is_empty() {
        return Err(unauthorized(LOGIN_PROMPT));
    }

    // bcrypt verification is CPU-bound.
    let credentials = state.credentials.clone();
    let username = req.username.clone();
    let user: Option<UserRecord> = tokio::task::spawn_blocking(move || {
        credentials.verify(&username, &req.password).cloned()
    })
    .await
    .map_err(|e| internal(format!("login task failed: {}", e)))?;

    let Some(user) = user else {
        tracing::info!(user = %req.username.trim(), "login rejected");
        return Err(unauthorized(BAD_LOGIN));
    };

    let cookie = &state.credentials.cookie;
    let now = now_secs();
    let exp = now.saturating_add(cookie.max_age_secs());
    let sid = state.sessions.create(&user, exp, now);
    let token = sign_token(
        &cookie.key,
        &TokenClaims {
            sid,
            username: user.username.clone(),
            exp,
        },
    );
    tracing::info!(user = %user.username, "login succeeded");

    let body = user_response(&state.config, &user.username, &user.name, user.roles.as_deref());
    Ok((
        [(header::SET_COOKIE, session_cookie(cookie, &token))],
        Json(body),
    ))
}

async fn handle_logout(State(state): State<AppState>, headers: HeaderMap) -> impl IntoResponse {
    if let Ok(user) = authenticate(&state, &headers) {
        state.sessions.remove(&user.sid, user.exp);
        tracing::info!(user = %user.username, "logged out");
    }
    (
        [(header::SET_COOKIE, clear_cookie(&state.credentials.cookie))],
        Json(serde_json::json!({ "status": "logged_out" })),
    )
}

async fn handle_me(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<UserResponse>, AppError> {
    let user = authenticate(&state, &headers)?;
    Ok(Json(user_response(
        &state.config,
        &user.username,
        &user.name,
        user.roles.as_deref(),
    )))
}

// ============ GET /pages/{slug} ============

#[derive(Serialize)]
struct PageResponse {
    name: String,
    description: String,
    page: String,
    icon: String,
    /// Whether upload and ask can run (provider keys present).
    ready: bool,
    /// Guidance for the user: a missing key, or a prompt to upload.
    message: Option<String>,
    file_name: Option<String>,
    messages: Vec<ChatMessage>,
}

async fn handle_page(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    headers: HeaderMap,
) -> Result<Json<PageResponse>, AppError> {
    let user = authenticate(&state, &headers)?;
    let page = open_page(&state, &user, &slug)?;

    let (file_name, messages) = state
        .sessions
        .with(&user.sid, |s| {
            s.pages
                .get(&slug)
                .map(|p| {
                    (
                        p.document.as_ref().map(|d| d.file_name.clone()),
                        p.messages.clone(),
                    )
                })
                .unwrap_or_default()
        })
        .unwrap_or_default();

    let (ready, message) = match state.keys.for_page(&state.config, page) {
        Err(e) => (false, Some(e.to_string())),
        Ok(_) if file_name.is_none() => (true, Some(PipelineError::NoDocument.to_string())),
        Ok(_) => (true, None),
    };

    Ok(Json(PageResponse {
        name: page.name.clone(),
        description: page.description.clone(),
        page: page.page.clone(),
        icon: page.icon.clone(),
        ready,
        message,
        file_name,
        messages,
    }))
}

// ============ POST /pages/{slug}/upload ============

#[derive(Serialize)]
struct UploadResponse {
    file_name: String,
    pages: usize,
    chunks: usize,
}

struct UploadedFile {
    file_name: String,
    bytes: Vec<u8>,
}

/// Read the `file` field, enforcing the type check and size limit while streaming.
async fn read_file_field(multipart: &mut Multipart, limit: usize) -> Result<UploadedFile, AppError> {
    while let Some(mut field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some("file") {
            continue;
        }
        let file_name = field.file_name().unwrap_or("upload.pdf").to_string();
        let content_type = field.content_type().map(str::to_string);
        check_pdf(&file_name, content_type.as_deref())?;

        let mut bytes = Vec::new();
        while let Some(chunk) = field.chunk().await.map_err(multipart_error)? {
            bytes.extend_from_slice(&chunk);
            if bytes.len() > limit {
                return Err(PipelineError::TooLarge { limit }.into());
            }
        }
        if bytes.is_empty() {
            return Err(bad_request("uploaded file is empty"));
        }
        tracing::debug!(file = %file_name, size_bytes = bytes.len(), "received upload");
        return Ok(UploadedFile { file_name, bytes });
    }
    Err(bad_request("multipart field 'file' is required"))
}

async fn handle_upload(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    headers: HeaderMap,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<UploadResponse>, AppError> {
    let user = authenticate(&state, &headers)?;
    let page = open_page(&state, &user, &slug)?;
    let providers = state.keys.for_page(&state.config, page)?;

    let mut multipart = multipart.map_err(multipart_rejection)?;
    let file = read_file_field(&mut multipart, state.config.upload.max_bytes).await?;
    let upload = TempUpload::write(&state.config.upload.dir(), &file.file_name, &file.bytes)?;

    let (provider, key) = providers.embedding;
    let embedder = state
        .providers
        .embedder(&state.config.embedding, provider, key)?;
    let doc = pipeline::ingest(&state.config, &upload, embedder.as_ref())
        .await
        .map_err(|e| {
            tracing::warn!(page = %slug, error = %format!("{:#}", e), "upload failed");
            processing_error("document", e)
        })?;
    drop(upload);

    let response = UploadResponse {
        file_name: doc.file_name.clone(),
        pages: doc.pages,
        chunks: doc.index.len(),
    };
    let doc = Arc::new(doc);
    state.sessions.with_mut(&user.sid, |s| {
        let page_session = s.page_mut(&slug);
        page_session.document = Some(doc);
        page_session.messages.clear();
    });

    Ok(Json(response))
}

// ============ POST /pages/{slug}/ask ============

#[derive(Deserialize)]
struct AskRequest {
    #[serde(default)]
    question: String,
}

async fn handle_ask(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    headers: HeaderMap,
    body: Result<Json<AskRequest>, JsonRejection>,
) -> Result<Json<Answer>, AppError> {
    let user = authenticate(&state, &headers)?;
    let page = open_page(&state, &user, &slug)?;
    let providers = state.keys.for_page(&state.config, page)?;
    let Json(req) = body.map_err(json_rejection)?;

    let question = req.question.trim().to_string();
    if question.is_empty() {
        return Err(PipelineError::EmptyQuestion.into());
    }
    let doc = state
        .sessions
        .with(&user.sid, |s| s.pages.get(&slug).and_then(|p| p.document.clone()))
        .flatten()
        .ok_or(PipelineError::NoDocument)?;

    state.sessions.with_mut(&user.sid, |s| {
        s.page_mut(&slug).messages.push(ChatMessage::user(question.clone()))
    });

    let (embedding, embedding_key) = providers.embedding;
    let (llm, llm_key) = providers.llm;
    let embedder = state
        .providers
        .embedder(&state.config.embedding, embedding, embedding_key)?;
    let chat = state.providers.chat_model(&state.config.llm, llm, llm_key)?;

    let answer = pipeline::ask(
        &state.config,
        page,
        &doc,
        &question,
        embedder.as_ref(),
        chat.as_ref(),
    )
    .await
    .map_err(|e| {
        tracing::warn!(page = %slug, error = %format!("{:#}", e), "question failed");
        processing_error("question", e)
    })?;

    // The page may have been cleared or re-uploaded while the crew ran.
    state.sessions.with_mut(&user.sid, |s| {
        let page_session = s.page_mut(&slug);
        if page_session
            .document
            .as_ref()
            .is_some_and(|current| Arc::ptr_eq(current, &doc))
        {
            page_session
                .messages
                .push(ChatMessage::assistant(answer.answer.clone()));
        } else {
            tracing::debug!(page = %slug, "document changed while answering; answer not recorded");
        }
    });

    Ok(Json(answer))
}

// ============ GET / DELETE /pages/{slug}/messages ============

#[derive(Serialize)]
struct MessagesResponse {
    messages: Vec<ChatMessage>,
}

async fn handle_messages(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    headers: HeaderMap,
) -> Result<Json<MessagesResponse>, AppError> {
    let user = authenticate(&state, &headers)?;
    open_page(&state, &user, &slug)?;
    let messages = state
        .sessions
        .with(&user.sid, |s| {
            s.pages
                .get(&slug)
                .map(|p| p.messages.clone())
                .unwrap_or_default()
        })
        .unwrap_or_default();
    Ok(Json(MessagesResponse { messages }))
}

async fn handle_clear_messages(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, AppError> {
    let user = authenticate(&state, &headers)?;
    open_page(&state, &user, &slug)?;
    state.sessions.with_mut(&user.sid, |s| {
        s.pages.remove(&slug);
    });
    Ok(Json(serde_json::json!({ "status": "cleared" })))
}
