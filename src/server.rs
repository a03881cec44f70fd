//! HTTP API for sessions and execution streaming.
//!
//! Exposes the session lifecycle (create → sources → plan → confirm) and
//! a Server-Sent Events stream of execution log lines.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/sessions` | Create a session |
//! | `GET`  | `/sessions` | List sessions |
//! | `GET`  | `/sessions/{id}` | Fetch one session |
//! | `POST` | `/sessions/{id}/sources` | Replace the source list |
//! | `POST` | `/sessions/{id}/upload` | Upload a document as a source |
//! | `GET`  | `/sessions/{id}/plan` | Generate the ingestion plan |
//! | `PATCH`| `/sessions/{id}/plan` | Edit the plan text |
//! | `POST` | `/sessions/{id}/plan/confirm` | Confirm and start execution |
//! | `GET`  | `/sessions/{id}/stream` | SSE stream of execution log lines |
//! | `GET`  | `/sessions/{id}/output` | List written chunk files |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "no plan to confirm" } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404), `internal` (500).
//!
//! # Streaming
//!
//! A subscriber arriving while execution is in flight attaches to the
//! session's live log channel; one arriving after completion gets the
//! persisted log replayed, terminated by a `[<STAGE>]` line. A subscriber
//! arriving before the executor has opened its channel waits briefly
//! (up to five seconds) for it to appear.

use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use futures::stream::{self, BoxStream, StreamExt};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::convert::Infallible;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};

use crate::adapters::{digest_path, AdapterRegistry};
use crate::config::Config;
use crate::executor::{confirm_plan, Executor};
use crate::models::{Session, SessionStage, Source, SourceType};
use crate::planner::{OutlinePlanner, Planner};
use crate::session::SessionStore;
use crate::streams::StreamRegistry;

/// How long a stream subscriber waits for the executor to open its
/// channel: 50 polls at 100ms.
const STREAM_POLLS: u32 = 50;
const STREAM_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Shared application state passed to all route handlers.
#[derive(Clone)]
struct AppState {
    config: Arc<Config>,
    store: SessionStore,
    streams: Arc<StreamRegistry>,
    executor: Arc<Executor>,
    planner: Arc<dyn Planner>,
}

/// Starts the HTTP server with the built-in adapters and planner.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let adapters = Arc::new(AdapterRegistry::with_builtins(config.uploads_dir()));
    run_server_with(config, adapters, Arc::new(OutlinePlanner)).await
}

/// Starts the HTTP server with custom adapters and planner. Integrations
/// register their web/youtube/rss/epub adapters here.
pub async fn run_server_with(
    config: &Config,
    adapters: Arc<AdapterRegistry>,
    planner: Arc<dyn Planner>,
) -> anyhow::Result<()> {
    std::fs::create_dir_all(&config.storage.data_dir)?;
    std::fs::create_dir_all(&config.storage.output_dir)?;

    let store = SessionStore::open(&config.storage.data_dir)?;
    let streams = Arc::new(StreamRegistry::new());
    let executor = Arc::new(Executor::new(
        store.clone(),
        streams.clone(),
        adapters,
        &config.storage.output_dir,
        config.pipeline.max_words,
        config.sink_mode()?,
    ));

    let state = AppState {
        config: Arc::new(config.clone()),
        store,
        streams,
        executor,
        planner,
    };

    let app = router(state);

    let bind_addr = &config.server.bind;
    println!("canonry listening on http://{}", bind_addr);

    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/sessions", post(handle_create_session).get(handle_list_sessions))
        .route("/sessions/{id}", get(handle_get_session))
        .route("/sessions/{id}/sources", post(handle_update_sources))
        .route("/sessions/{id}/upload", post(handle_upload))
        .route(
            "/sessions/{id}/plan",
            get(handle_generate_plan).patch(handle_edit_plan),
        )
        .route("/sessions/{id}/plan/confirm", post(handle_confirm_plan))
        .route("/sessions/{id}/stream", get(handle_execution_stream))
        .route("/sessions/{id}/output", get(handle_list_output))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(state)
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

struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found".to_string(),
        message: message.into(),
    }
}

fn internal(err: anyhow::Error) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal".to_string(),
        message: format!("{:#}", err),
    }
}

fn fetch_session(state: &AppState, session_id: &str) -> Result<Session, AppError> {
    state
        .store
        .get(session_id)
        .map_err(internal)?
        .ok_or_else(|| not_found(format!("session {} not found", session_id)))
}

// ============ Session CRUD ============

#[derive(Deserialize)]
struct CreateSessionRequest {
    name: String,
    #[serde(default)]
    canon_path: Option<PathBuf>,
}

async fn handle_create_session(
    State(state): State<AppState>,
    Json(body): Json<CreateSessionRequest>,
) -> Result<(StatusCode, Json<Session>), AppError> {
    let session = state
        .store
        .create(Session::new(body.name, body.canon_path))
        .map_err(internal)?;
    Ok((StatusCode::CREATED, Json(session)))
}

async fn handle_list_sessions(
    State(state): State<AppState>,
) -> Result<Json<Vec<Session>>, AppError> {
    Ok(Json(state.store.list().map_err(internal)?))
}

async fn handle_get_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<Session>, AppError> {
    Ok(Json(fetch_session(&state, &session_id)?))
}

// ============ Sources ============

#[derive(Deserialize)]
struct UpdateSourcesRequest {
    sources: Vec<Source>,
}

async fn handle_update_sources(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(body): Json<UpdateSourcesRequest>,
) -> Result<Json<Session>, AppError> {
    let mut session = fetch_session(&state, &session_id)?;
    if session.stage.is_terminal() {
        return Err(bad_request(format!(
            "session already finished: {}",
            session.stage
        )));
    }
    session.sources = body.sources;
    session.stage = SessionStage::Sources;
    state.store.update(&mut session).map_err(internal)?;
    Ok(Json(session))
}

// ============ File upload ============

/// Accept an uploaded document, store it content-addressed, and register
/// it as a source. The source URL uses the `digest:sha256:<hex>`
/// indirection so re-uploads of identical bytes resolve to one file.
async fn handle_upload(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    mut multipart: Multipart,
) -> Result<Json<Source>, AppError> {
    let mut session = fetch_session(&state, &session_id)?;

    let field = multipart
        .next_field()
        .await
        .map_err(|e| bad_request(format!("invalid multipart body: {}", e)))?
        .ok_or_else(|| bad_request("no file in upload"))?;
    let filename = field.file_name().unwrap_or("upload").to_string();
    let bytes = field
        .bytes()
        .await
        .map_err(|e| bad_request(format!("failed to read upload: {}", e)))?;

    let hex = format!("{:x}", Sha256::digest(&bytes));
    let dest = digest_path(&state.config.uploads_dir(), &hex);
    if let Some(parent) = dest.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| internal(e.into()))?;
    }
    tokio::fs::write(&dest, &bytes)
        .await
        .map_err(|e| internal(e.into()))?;

    let kind = match PathBuf::from(&filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("epub") => SourceType::Epub,
        _ => SourceType::Text,
    };

    let source = Source::new(kind, format!("digest:sha256:{}", hex), filename);
    session.sources.push(source.clone());
    if session.stage == SessionStage::Init {
        session.stage = SessionStage::Sources;
    }
    state.store.update(&mut session).map_err(internal)?;
    Ok(Json(source))
}

// ============ Plan ============

#[derive(Serialize)]
struct PlanResponse {
    plan: String,
}

async fn handle_generate_plan(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<PlanResponse>, AppError> {
    let mut session = fetch_session(&state, &session_id)?;
    if session.sources.is_empty() {
        return Err(bad_request("no sources confirmed yet"));
    }
    let plan = state.planner.plan(&session).await.map_err(internal)?;
    session.plan = plan.clone();
    session.stage = SessionStage::Plan;
    state.store.update(&mut session).map_err(internal)?;
    Ok(Json(PlanResponse { plan }))
}

#[derive(Deserialize)]
struct UpdatePlanRequest {
    plan: String,
}

async fn handle_edit_plan(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(body): Json<UpdatePlanRequest>,
) -> Result<Json<Session>, AppError> {
    let mut session = fetch_session(&state, &session_id)?;
    session.plan = body.plan;
    state.store.update(&mut session).map_err(internal)?;
    Ok(Json(session))
}

#[derive(Serialize)]
struct ConfirmResponse {
    status: String,
    session_id: String,
}

/// Confirm the plan and start execution detached. The request returns
/// immediately; progress is observed via the stream endpoint.
async fn handle_confirm_plan(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<ConfirmResponse>, AppError> {
    let mut session = fetch_session(&state, &session_id)?;
    confirm_plan(&state.store, &mut session).map_err(|e| bad_request(format!("{:#}", e)))?;

    tokio::spawn(state.executor.clone().execute(session.id.clone()));

    Ok(Json(ConfirmResponse {
        status: "executing".to_string(),
        session_id: session.id,
    }))
}

// ============ Execution stream ============

type EventStream = BoxStream<'static, Result<Event, Infallible>>;

fn replay_stream(session: &Session) -> EventStream {
    let mut lines = session.log.clone();
    lines.push(format!("[{}]", session.stage));
    stream::iter(lines.into_iter().map(|line| Ok(Event::default().data(line)))).boxed()
}

async fn handle_execution_stream(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Response, AppError> {
    let session = fetch_session(&state, &session_id)?;

    // Execution already finished: replay the persisted log.
    if session.stage.is_terminal() {
        return Ok(Sse::new(replay_stream(&session)).into_response());
    }

    // Wait briefly for the executor to open the channel.
    let mut rx = None;
    for _ in 0..STREAM_POLLS {
        if let Some(r) = state.streams.take(&session_id) {
            rx = Some(r);
            break;
        }
        tokio::time::sleep(STREAM_POLL_INTERVAL).await;
    }

    let Some(rx) = rx else {
        // The run may have finished while we were polling.
        let session = fetch_session(&state, &session_id)?;
        if session.stage.is_terminal() {
            return Ok(Sse::new(replay_stream(&session)).into_response());
        }
        let events: EventStream = stream::once(async {
            Ok(Event::default().data("[ERROR] No active execution stream"))
        })
        .boxed();
        return Ok(Sse::new(events).into_response());
    };

    // Forward lines until the executor drops the sender.
    let events: EventStream = stream::unfold(rx, |mut rx| async move {
        rx.recv()
            .await
            .map(|line| (Ok(Event::default().data(line)), rx))
    })
    .boxed();

    Ok(Sse::new(events)
        .keep_alive(KeepAlive::default())
        .into_response())
}

// ============ Output ============

#[derive(Serialize)]
struct OutputFile {
    filename: String,
    size: u64,
}

#[derive(Serialize)]
struct OutputResponse {
    files: Vec<OutputFile>,
}

async fn handle_list_output(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<OutputResponse>, AppError> {
    fetch_session(&state, &session_id)?;
    let dir = state.executor.session_output_dir(&session_id);
    if !dir.exists() {
        return Ok(Json(OutputResponse { files: vec![] }));
    }

    let mut files = Vec::new();
    let entries = std::fs::read_dir(&dir).map_err(|e| internal(e.into()))?;
    for entry in entries.flatten() {
        let meta = entry.metadata().map_err(|e| internal(e.into()))?;
        if meta.is_file() {
            files.push(OutputFile {
                filename: entry.file_name().to_string_lossy().into_owned(),
                size: meta.len(),
            });
        }
    }
    files.sort_by(|a, b| a.filename.cmp(&b.filename));
    Ok(Json(OutputResponse { files }))
}

// ============ Health ============

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
