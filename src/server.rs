//! HTTP API for chat and ingestion.
//!
//! Exposes the retrieval pipeline over JSON HTTP: a chat endpoint backed by
//! the vector index, job-tracked background ingestion, and job status
//! queries.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Health check (returns version) |
//! | `POST` | `/chat` | Answer a question with citations |
//! | `GET`  | `/jobs` | Newest-first job list (`?limit=N`) |
//! | `GET`  | `/jobs/{id}` | One job's status |
//! | `POST` | `/jobs/{id}/retry` | Re-run a failed job as a new job |
//! | `POST` | `/ingest/pdf` | Convert a PDF in the background |
//! | `POST` | `/ingest/urls` | Crawl a URL list in the background |
//!
//! # Error Contract
//!
//! Error responses carry a stable machine-readable code:
//!
//! ```json
//! { "error": { "code": "not_found", "message": "no job with id: ..." } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404), `internal` (500).
//! `POST /chat` is the exception: it answers 200 with a degraded textual
//! reply rather than an error body, whatever happens behind it.
//!
//! # Ingestion jobs
//!
//! Ingestion requests return immediately with a job id; a detached task
//! claims the job, bumps progress at stage checkpoints, and finishes in
//! completed or failed. Successful ingestion rebuilds the index artifacts
//! and swaps the shared retrieval snapshot atomically, so in-flight chat
//! queries keep reading the old snapshot until the swap.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted to support browser-based
//! clients.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tower_http::cors::{Any, CorsLayer};
use uuid::Uuid;

use crate::answer::{self, ChatAnswer};
use crate::config::Config;
use crate::corpus;
use crate::db;
use crate::embedding::{self, Embedder};
use crate::fetch;
use crate::index::{self, RagState};
use crate::jobs;
use crate::migrate;
use crate::models::{Category, JobType, ProcessingJob};
use crate::pdf::{self, PdfOptions};
use crate::progress::NoProgress;

/// Shared application state passed to all route handlers via Axum's `State`
/// extractor.
#[derive(Clone)]
struct AppState {
    config: Arc<Config>,
    pool: SqlitePool,
    /// Query embedder, created once and shared; local models memoize their
    /// load internally.
    embedder: Arc<dyn Embedder>,
    /// Retrieval snapshot. `None` until the first successful index build;
    /// replaced wholesale on rebuild, never mutated in place.
    rag: Arc<RwLock<Option<Arc<RagState>>>>,
    /// Serializes index rebuilds across concurrent ingestion jobs.
    rebuild_lock: Arc<Mutex<()>>,
}

/// Starts the HTTP server.
///
/// Binds to `[server].bind`, opens the jobs database, and loads the index
/// artifacts when they exist. Without artifacts the server still comes up;
/// chat serves the degraded "index not found" reply until an ingestion job
/// or `raia index build` produces them.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();
    let config = Arc::new(config.clone());

    let pool = db::connect(&config).await?;
    migrate::apply_schema(&pool).await?;

    let embedder: Arc<dyn Embedder> = Arc::from(embedding::create_embedder(&config.embedding)?);

    let rag_state = if index::artifacts_present(&config) {
        match index::load_state(&config) {
            Ok(state) => Some(Arc::new(state)),
            Err(e) => {
                eprintln!("Warning: could not load index artifacts: {:#}", e);
                None
            }
        }
    } else {
        eprintln!("No index artifacts yet; run `raia index build` or submit an ingestion job.");
        None
    };
    if let Some(ref state) = rag_state {
        println!(
            "Loaded {} index ({} documents)",
            state.searcher.backend(),
            state.doc_map.len()
        );
    }

    let state = AppState {
        config,
        pool,
        embedder,
        rag: Arc::new(RwLock::new(rag_state)),
        rebuild_lock: Arc::new(Mutex::new(())),
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/health", get(handle_health))
        .route("/chat", post(handle_chat))
        .route("/jobs", get(handle_jobs_list))
        .route("/jobs/{id}", get(handle_job_show))
        .route("/jobs/{id}/retry", post(handle_job_retry))
        .route("/ingest/pdf", post(handle_ingest_pdf))
        .route("/ingest/urls", post(handle_ingest_urls))
        .layer(cors)
        .with_state(state);

    println!("Raia Assist API listening on http://{}", bind_addr);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ============ Error response ============

/// JSON error response body.
#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

/// Internal error type that converts into an Axum HTTP response.
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

fn internal_error(err: anyhow::Error) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal".to_string(),
        message: format!("{:#}", err),
    }
}

/// Map job-store errors onto HTTP statuses: unknown ids are 404, retry
/// preconditions 400, everything else 500.
fn classify_job_error(err: anyhow::Error) -> AppError {
    let msg = err.to_string();
    if msg.contains("not found") {
        not_found(msg)
    } else if msg.contains("only failed jobs") {
        bad_request(msg)
    } else {
        internal_error(err)
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    /// Always `"ok"` when the server is running.
    status: String,
    /// The crate version from `Cargo.toml`.
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ POST /chat ============

#[derive(Debug, Deserialize)]
struct ChatRequest {
    message: String,
    /// Accepted on the wire; answers are single-turn, so it is not used.
    #[serde(default)]
    #[allow(dead_code)]
    conversation_id: Option<String>,
    #[serde(default = "default_language")]
    language: String,
    #[serde(default)]
    debug: bool,
}

fn default_language() -> String {
    "sw".to_string()
}

/// Handler for `POST /chat`.
///
/// Always answers 200: retrieval or generation failures resolve to a
/// degraded textual reply with empty citations, never an error response.
async fn handle_chat(State(state): State<AppState>, Json(req): Json<ChatRequest>) -> Json<ChatAnswer> {
    let snapshot = state.rag.read().await.clone();
    let chat_answer = match snapshot {
        Some(rag_state) => {
            answer::answer_message(
                &state.config,
                &rag_state,
                state.embedder.as_ref(),
                &req.message,
                Some(&req.language),
                req.debug,
            )
            .await
        }
        None => ChatAnswer::index_missing(),
    };
    Json(chat_answer)
}

// ============ Job endpoints ============

#[derive(Debug, Deserialize)]
struct JobsListParams {
    #[serde(default = "default_jobs_limit")]
    limit: i64,
}

fn default_jobs_limit() -> i64 {
    20
}

#[derive(Serialize)]
struct JobsListResponse {
    jobs: Vec<ProcessingJob>,
}

async fn handle_jobs_list(
    State(state): State<AppState>,
    Query(params): Query<JobsListParams>,
) -> Result<Json<JobsListResponse>, AppError> {
    let limit = params.limit.clamp(1, 200);
    let jobs = jobs::list_jobs(&state.pool, limit)
        .await
        .map_err(internal_error)?;
    Ok(Json(JobsListResponse { jobs }))
}

async fn handle_job_show(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ProcessingJob>, AppError> {
    let job = jobs::get_job(&state.pool, &id)
        .await
        .map_err(internal_error)?;
    match job {
        Some(job) => Ok(Json(job)),
        None => Err(not_found(format!("no job with id: {}", id))),
    }
}

/// Handler for `POST /jobs/{id}/retry`.
///
/// Creates a fresh pending job for the failed job's source and starts it;
/// the failed row stays in place. The retry runs with default options, as
/// per-request flags are not persisted on the job row.
async fn handle_job_retry(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ProcessingJob>, AppError> {
    let new_job = jobs::retry_job(&state.pool, &id)
        .await
        .map_err(classify_job_error)?;
    if let Some(work) = work_from_job(&new_job) {
        spawn_job(&state, &new_job.id, work);
    }
    Ok(Json(new_job))
}

// ============ Ingestion endpoints ============

#[derive(Debug, Deserialize)]
struct IngestPdfRequest {
    path: String,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    source: Option<String>,
}

#[derive(Debug, Deserialize)]
struct IngestUrlsRequest {
    urls: Vec<String>,
    #[serde(default)]
    force: bool,
    #[serde(default)]
    skip_disallowed: bool,
}

#[derive(Serialize)]
struct IngestResponse {
    job_id: String,
}

async fn handle_ingest_pdf(
    State(state): State<AppState>,
    Json(req): Json<IngestPdfRequest>,
) -> Result<Json<IngestResponse>, AppError> {
    let path = PathBuf::from(&req.path);
    if !path.is_file() {
        return Err(bad_request(format!("PDF file not found: {}", req.path)));
    }
    let category = match req.category.as_deref() {
        Some(raw) => Some(
            Category::parse(raw).ok_or_else(|| bad_request(format!("unknown category: {}", raw)))?,
        ),
        None => None,
    };
    let opts = PdfOptions {
        title: req.title,
        category,
        source: req.source,
        tags: None,
    };

    let job = jobs::create_job(&state.pool, JobType::PdfUpload, &req.path)
        .await
        .map_err(internal_error)?;
    spawn_job(&state, &job.id, JobWork::Pdf { path, opts });
    Ok(Json(IngestResponse { job_id: job.id }))
}

async fn handle_ingest_urls(
    State(state): State<AppState>,
    Json(req): Json<IngestUrlsRequest>,
) -> Result<Json<IngestResponse>, AppError> {
    if req.urls.is_empty() {
        return Err(bad_request("urls must not be empty"));
    }

    // Persist the submitted list under the workspace so the job row's
    // source alone is enough to re-run it later.
    let urls_dir = state.config.workspace.dir.join("urls");
    std::fs::create_dir_all(&urls_dir).map_err(|e| internal_error(e.into()))?;
    let urls_file = urls_dir.join(format!("urlset_{}.txt", Uuid::new_v4()));
    std::fs::write(&urls_file, req.urls.join("\n")).map_err(|e| internal_error(e.into()))?;

    let source = urls_file.display().to_string();
    let job = jobs::create_job(&state.pool, JobType::UrlScrape, &source)
        .await
        .map_err(internal_error)?;
    spawn_job(
        &state,
        &job.id,
        JobWork::Urls {
            urls_file,
            force: req.force,
            skip_disallowed: req.skip_disallowed,
        },
    );
    Ok(Json(IngestResponse { job_id: job.id }))
}

// ============ Background job runner ============

/// Work order handed to the background runner.
enum JobWork {
    Pdf { path: PathBuf, opts: PdfOptions },
    Urls {
        urls_file: PathBuf,
        force: bool,
        skip_disallowed: bool,
    },
}

/// Reconstruct a work order from a stored job row. Retried jobs run with
/// default options; only the source survives on the row.
fn work_from_job(job: &ProcessingJob) -> Option<JobWork> {
    match JobType::parse(&job.job_type)? {
        JobType::PdfUpload => Some(JobWork::Pdf {
            path: PathBuf::from(&job.source),
            opts: PdfOptions::default(),
        }),
        JobType::UrlScrape => Some(JobWork::Urls {
            urls_file: PathBuf::from(&job.source),
            force: false,
            skip_disallowed: false,
        }),
    }
}

/// Hand a pending job to a detached runner task. The task owns the job's
/// lifecycle: claim, progress checkpoints, terminal state.
fn spawn_job(state: &AppState, job_id: &str, work: JobWork) {
    let state = state.clone();
    let job_id = job_id.to_string();
    tokio::spawn(async move {
        if !jobs::claim_job(&state.pool, &job_id).await.unwrap_or(false) {
            return;
        }
        match execute_job(&state, &job_id, &work).await {
            Ok((documents, result)) => {
                if let Err(e) = jobs::complete_job(&state.pool, &job_id, documents, &result).await {
                    eprintln!(
                        "Warning: could not record completion of job {}: {:#}",
                        job_id, e
                    );
                }
            }
            Err(e) => {
                eprintln!("Job {} failed: {:#}", job_id, e);
                if let Err(db_err) = jobs::fail_job(&state.pool, &job_id, &format!("{:#}", e)).await
                {
                    eprintln!(
                        "Warning: could not record failure of job {}: {:#}",
                        job_id, db_err
                    );
                }
            }
        }
    });
}

async fn execute_job(
    state: &AppState,
    job_id: &str,
    work: &JobWork,
) -> anyhow::Result<(i64, serde_json::Value)> {
    match work {
        JobWork::Pdf { path, opts } => execute_pdf_job(state, job_id, path, opts).await,
        JobWork::Urls {
            urls_file,
            force,
            skip_disallowed,
        } => execute_url_job(state, job_id, urls_file, *force, *skip_disallowed).await,
    }
}

async fn execute_pdf_job(
    state: &AppState,
    job_id: &str,
    path: &std::path::Path,
    opts: &PdfOptions,
) -> anyhow::Result<(i64, serde_json::Value)> {
    jobs::set_progress(&state.pool, job_id, 10, 0).await?;

    // PDF extraction is CPU-bound; keep it off the async workers.
    let config = state.config.clone();
    let path = path.to_path_buf();
    let opts = opts.clone();
    let outcome =
        tokio::task::spawn_blocking(move || pdf::convert_pdf(&config, &path, &opts, false))
            .await??;

    let documents = outcome.written.len() as i64;
    jobs::set_progress(&state.pool, job_id, 60, documents).await?;

    rebuild_index(state).await?;

    Ok((
        documents,
        serde_json::json!({
            "written": outcome.written,
            "skipped": outcome.skipped,
        }),
    ))
}

async fn execute_url_job(
    state: &AppState,
    job_id: &str,
    urls_file: &std::path::Path,
    force: bool,
    skip_disallowed: bool,
) -> anyhow::Result<(i64, serde_json::Value)> {
    jobs::set_progress(&state.pool, job_id, 5, 0).await?;

    fetch::run_fetch(
        &state.config,
        urls_file,
        None,
        force,
        skip_disallowed,
        &NoProgress,
    )
    .await?;
    jobs::set_progress(&state.pool, job_id, 40, 0).await?;

    let written = corpus::run_chunk(&state.config, force, &NoProgress).await?;
    jobs::set_progress(&state.pool, job_id, 70, written as i64).await?;

    rebuild_index(state).await?;

    Ok((
        written as i64,
        serde_json::json!({
            "urls_file": urls_file.display().to_string(),
            "documents_written": written,
        }),
    ))
}

/// Rebuild the index artifacts and swap the shared retrieval snapshot.
/// Rebuilds are serialized; concurrent queries keep the old snapshot until
/// the swap.
async fn rebuild_index(state: &AppState) -> anyhow::Result<()> {
    let _guard = state.rebuild_lock.lock().await;
    index::run_index_build(&state.config, &NoProgress).await?;
    let fresh = index::load_state(&state.config)?;
    let mut slot = state.rag.write().await;
    *slot = Some(Arc::new(fresh));
    Ok(())
}
