use crate::sessions::{session_id_from_headers, CookieSettings, SessionRegistry, SharedSession};
use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, Query, State};
use axum::http::header::SET_COOKIE;
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use docchat_core::{
    AuthError, Authenticator, DocumentSummary, IngestError, Registration, Reply, ReplyStatus,
    SessionController, SessionError, SessionState, TranscriptEntry,
};
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

const INDEX_HTML: &str = include_str!("../static/index.html");

#[derive(Clone)]
pub struct AppState {
    pub controller: SessionController,
    pub sessions: SessionRegistry,
    /// `None` when the app runs without login.
    pub auth: Option<Authenticator>,
    pub cookie: CookieSettings,
}

pub fn router(state: AppState, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/healthz", get(healthz))
        .route("/api/session", get(session_status))
        .route("/api/documents", post(upload_document))
        .route("/api/chat", post(ask).delete(clear_chat))
        .route("/api/register", post(register))
        .route("/api/login", post(login))
        .route("/api/logout", post(logout))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    message: String,
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    fn unauthenticated() -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "Please login to continue.")
    }

    fn auth_disabled() -> Self {
        Self::new(StatusCode::NOT_FOUND, "Authentication is disabled.")
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorBody {
                message: self.message,
            }),
        )
            .into_response()
    }
}

impl From<SessionError> for ApiError {
    fn from(error: SessionError) -> Self {
        let status = match &error {
            SessionError::Ingest(IngestError::InvalidArgument(_))
            | SessionError::Ingest(IngestError::DocumentParse(_)) => StatusCode::BAD_REQUEST,
            SessionError::Ingest(_) => StatusCode::INTERNAL_SERVER_ERROR,
            SessionError::NotReady => StatusCode::CONFLICT,
            SessionError::Embedding(_) | SessionError::Completion(_) => StatusCode::BAD_GATEWAY,
        };
        Self::new(status, error.user_message())
    }
}

impl From<AuthError> for ApiError {
    fn from(error: AuthError) -> Self {
        let status = match &error {
            AuthError::DuplicateUser(_) => StatusCode::CONFLICT,
            AuthError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            AuthError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            AuthError::Configuration(_) => StatusCode::SERVICE_UNAVAILABLE,
            AuthError::Store(_) | AuthError::PasswordHash(_) => StatusCode::BAD_GATEWAY,
        };
        Self::new(status, error.user_message())
    }
}

/// Session resolved from the request cookie, plus the `Set-Cookie` value to
/// attach when the browser had no live session yet or its id changed.
struct Visit {
    id: Uuid,
    session: SharedSession,
    set_cookie: Option<HeaderValue>,
}

impl Visit {
    async fn begin(state: &AppState, headers: &HeaderMap) -> Self {
        let requested = session_id_from_headers(headers, &state.cookie.name);
        let (id, session, created) = state.sessions.resolve(requested).await;
        let set_cookie = if created {
            state.cookie.header_value(id)
        } else {
            None
        };
        Self {
            id,
            session,
            set_cookie,
        }
    }

    /// Re-registers the session under `renewed` and reissues the cookie.
    async fn rotate(&mut self, state: &AppState, renewed: Uuid) {
        state.sessions.rekey(self.id, renewed).await;
        self.id = renewed;
        self.set_cookie = state.cookie.header_value(renewed);
    }

    fn respond(self, response: impl IntoResponse) -> Response {
        let mut response = response.into_response();
        if let Some(cookie) = self.set_cookie {
            response.headers_mut().append(SET_COOKIE, cookie);
        }
        response
    }
}

fn require_user(state: &AppState, user: Option<&str>) -> Result<(), ApiError> {
    match (&state.auth, user) {
        (Some(_), None) => Err(ApiError::unauthenticated()),
        _ => Ok(()),
    }
}

async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}

#[derive(Debug, Serialize)]
struct SessionView {
    state: SessionState,
    auth_enabled: bool,
    user: Option<String>,
    document: Option<DocumentSummary>,
    transcript: Vec<TranscriptEntry>,
}

async fn session_status(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let visit = Visit::begin(&state, &headers).await;
    let view = {
        let session = visit.session.lock().await;
        SessionView {
            state: session.state(),
            auth_enabled: state.auth.is_some(),
            user: session.user().map(str::to_string),
            document: session.document().cloned(),
            transcript: session.transcript().to_vec(),
        }
    };
    visit.respond(Json(view))
}

#[derive(Debug, Deserialize)]
struct UploadParams {
    name: Option<String>,
}

async fn upload_document(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<UploadParams>,
    body: Bytes,
) -> Response {
    let visit = Visit::begin(&state, &headers).await;
    let result = async {
        let mut session = visit.session.lock().await;
        require_user(&state, session.user())?;
        let file_name = params
            .name
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| "document.pdf".to_string());
        let summary = state
            .controller
            .process_document(&mut session, &file_name, body.to_vec())
            .await?;
        Ok::<_, ApiError>(Json(summary))
    }
    .await;
    visit.respond(result)
}

#[derive(Debug, Deserialize)]
struct ChatRequest {
    question: String,
}

fn reply_status(reply: &Reply) -> StatusCode {
    match reply.status {
        ReplyStatus::Answered => StatusCode::OK,
        ReplyStatus::NotReady => StatusCode::CONFLICT,
        ReplyStatus::Rejected => StatusCode::BAD_REQUEST,
        ReplyStatus::Failed => StatusCode::BAD_GATEWAY,
    }
}

async fn ask(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<ChatRequest>,
) -> Response {
    let visit = Visit::begin(&state, &headers).await;
    let result = async {
        let mut session = visit.session.lock().await;
        require_user(&state, session.user())?;
        let reply = state.controller.ask(&mut session, &request.question).await;
        Ok::<_, ApiError>((reply_status(&reply), Json(reply)))
    }
    .await;
    visit.respond(result)
}

async fn clear_chat(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let visit = Visit::begin(&state, &headers).await;
    let result = async {
        let mut session = visit.session.lock().await;
        require_user(&state, session.user())?;
        state.controller.clear_history(&mut session);
        Ok::<_, ApiError>(StatusCode::NO_CONTENT)
    }
    .await;
    visit.respond(result)
}

#[derive(Debug, Serialize)]
struct AccountView {
    username: String,
    name: String,
}

async fn register(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(registration): Json<Registration>,
) -> Response {
    let visit = Visit::begin(&state, &headers).await;
    let result = async {
        let auth = state.auth.as_ref().ok_or_else(ApiError::auth_disabled)?;
        let user = auth.register(&registration).await?;
        Ok::<_, ApiError>((
            StatusCode::CREATED,
            Json(AccountView {
                username: user.username,
                name: user.name,
            }),
        ))
    }
    .await;
    visit.respond(result)
}

#[derive(Debug, Deserialize)]
struct LoginRequest {
    username: String,
    password: String,
}

async fn login(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<LoginRequest>,
) -> Response {
    let mut visit = Visit::begin(&state, &headers).await;
    let result = async {
        let auth = state.auth.as_ref().ok_or_else(ApiError::auth_disabled)?;
        let user = auth.login(&request.username, &request.password).await?;
        let renewed = {
            let mut session = visit.session.lock().await;
            session.sign_in(user.username.clone());
            session.renew_id()
        };
        visit.rotate(&state, renewed).await;
        Ok::<_, ApiError>(Json(AccountView {
            username: user.username,
            name: user.name,
        }))
    }
    .await;
    visit.respond(result)
}

async fn logout(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let visit = Visit::begin(&state, &headers).await;
    let result = async {
        if state.auth.is_none() {
            return Err(ApiError::auth_disabled());
        }
        visit.session.lock().await.sign_out();
        Ok::<_, ApiError>(StatusCode::NO_CONTENT)
    }
    .await;
    visit.respond(result)
}
