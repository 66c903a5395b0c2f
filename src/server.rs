//! Web interface: start a run in the background, poll its progress and
//! download the results as a gzipped tarball.

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{Html, IntoResponse},
    routing::{get, post},
    Json, Router,
};
use chrono::Local;
use flate2::{write::GzEncoder, Compression};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info};

use crate::backend::{GeminiBackend, InferenceBackend};
use crate::config::RunConfig;
use crate::error::{RecastError, Result};
use crate::languages::supported_extensions;
use crate::pipeline::Orchestrator;
use crate::progress::{JobStatus, ProgressSnapshot, ProgressTracker};
use crate::refactorer::REFACTORED_DIR;
use crate::report::ReportKind;
use crate::ui::UIManager;

pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:5000";

/// Offered in the model picker; any model name is accepted by `/api/start`.
const SUGGESTED_MODELS: &[&str] = &["gemini-2.5-flash-lite", "gemini-2.5-flash", "gemini-2.5-pro"];

/// Builds the backend for a run from its final configuration.
pub type BackendFactory =
    Arc<dyn Fn(&RunConfig) -> Result<Box<dyn InferenceBackend>> + Send + Sync>;

/// Shared server state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<RunConfig>,
    pub progress: Arc<ProgressTracker>,
    backend_factory: BackendFactory,
}

impl AppState {
    pub fn new(config: RunConfig) -> Self {
        Self::with_backend_factory(
            config,
            Arc::new(|config: &RunConfig| {
                let backend = GeminiBackend::new(config)?;
                Ok(Box::new(backend) as Box<dyn InferenceBackend>)
            }),
        )
    }

    pub fn with_backend_factory(config: RunConfig, backend_factory: BackendFactory) -> Self {
        Self {
            config: Arc::new(config),
            progress: Arc::new(ProgressTracker::new()),
            backend_factory,
        }
    }

    /// Base configuration with the per-run choices from `request` applied.
    fn run_config(&self, request: &StartRequest) -> RunConfig {
        let mut config = (*self.config).clone();
        if let Some(model) = request.model.as_deref().map(str::trim).filter(|m| !m.is_empty()) {
            config.model = model.to_string();
        }
        if let Some(delay) = request.delay {
            config.call_delay = Duration::from_secs(delay);
        }
        if let Some(dir) = &request.output_dir {
            config.output_dir = dir.clone();
        }
        config.skip_analysis = request.skip_analysis;
        config.skip_refactoring = request.skip_refactoring;
        config
    }
}

/// API error response
#[derive(Serialize)]
pub struct ApiError {
    pub error: String,
}

impl ApiError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self { error: msg.into() }
    }
}

type ApiResult<T> = std::result::Result<Json<T>, (StatusCode, Json<ApiError>)>;

fn err(status: StatusCode, msg: impl Into<String>) -> (StatusCode, Json<ApiError>) {
    (status, Json(ApiError::new(msg)))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartRequest {
    #[serde(default)]
    pub source_path: String,
    pub output_dir: Option<PathBuf>,
    pub model: Option<String>,
    #[serde(default)]
    pub skip_analysis: bool,
    #[serde(default)]
    pub skip_refactoring: bool,
    /// Seconds between requests
    pub delay: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct StartResponse {
    pub message: String,
    pub status: String,
}

#[derive(Debug, Serialize)]
pub struct ConfigView {
    pub api_key_configured: bool,
    pub model: String,
    pub output_dir: String,
    pub request_delay_secs: u64,
    pub supported_extensions: Vec<String>,
    pub models: Vec<String>,
}

pub fn create_app(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/api/start", post(start_run))
        .route("/api/status", get(status))
        .route("/api/download", get(download))
        .route("/api/config", get(config_view))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn serve(config: RunConfig, addr: SocketAddr) -> Result<()> {
    let server_error = |e: std::io::Error| RecastError::Server {
        addr: addr.to_string(),
        reason: e.to_string(),
    };

    let app = create_app(AppState::new(config));
    let listener = tokio::net::TcpListener::bind(addr).await.map_err(server_error)?;
    info!("Web interface listening on http://{}", addr);
    axum::serve(listener, app).await.map_err(server_error)?;
    Ok(())
}

async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

async fn start_run(
    State(state): State<AppState>,
    Json(request): Json<StartRequest>,
) -> ApiResult<StartResponse> {
    let source = request.source_path.trim().to_string();
    if source.is_empty() {
        return Err(err(StatusCode::BAD_REQUEST, "Source path is required"));
    }

    let config = state.run_config(&request);
    config
        .validate()
        .map_err(|e| err(StatusCode::BAD_REQUEST, e.to_string()))?;
    let output_dir = config.output_dir.display().to_string();
    let backend = (state.backend_factory)(&config)
        .map_err(|e| err(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    let orchestrator = Orchestrator::with_backend(config, source.clone(), backend, UIManager::quiet())
        .map_err(|e| err(StatusCode::BAD_REQUEST, e.to_string()))?
        .with_progress(Arc::clone(&state.progress));

    if !state.progress.try_begin(&source, &output_dir).await {
        return Err(err(StatusCode::CONFLICT, "A run is already in progress"));
    }

    info!(source = %source, "Starting background run");
    let progress = Arc::clone(&state.progress);
    tokio::spawn(async move {
        let job = tokio::spawn(run_job(orchestrator, Arc::clone(&progress)));
        if let Err(e) = job.await {
            error!("Background run aborted: {}", e);
            progress.fail(format!("Run aborted: {}", e)).await;
        }
    });

    Ok(Json(StartResponse {
        message: "Processing started".to_string(),
        status: "started".to_string(),
    }))
}

async fn run_job(mut orchestrator: Orchestrator, progress: Arc<ProgressTracker>) {
    match orchestrator.run().await {
        Ok(summary) => {
            let report = |kind: ReportKind| {
                orchestrator
                    .reports()
                    .iter()
                    .find(|document| document.kind == kind)
                    .map(|document| document.content.clone())
            };
            progress
                .finish(
                    &summary,
                    report(ReportKind::Recommendations),
                    report(ReportKind::InterviewQuestions),
                )
                .await;
        }
        Err(e) => {
            error!("Run failed: {}", e);
            progress.fail(e.to_string()).await;
        }
    }
}

async fn status(State(state): State<AppState>) -> Json<ProgressSnapshot> {
    Json(state.progress.snapshot().await)
}

async fn download(
    State(state): State<AppState>,
) -> std::result::Result<impl IntoResponse, (StatusCode, Json<ApiError>)> {
    let snapshot = state.progress.snapshot().await;
    let output_dir = match (snapshot.status, snapshot.output_dir) {
        (JobStatus::Completed, Some(dir)) if Path::new(&dir).is_dir() => PathBuf::from(dir),
        _ => {
            return Err(err(
                StatusCode::NOT_FOUND,
                "No refactored code available for download",
            ))
        }
    };

    let archive = tokio::task::spawn_blocking(move || build_archive(&output_dir))
        .await
        .map_err(|e| err(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?
        .map_err(|e| {
            err(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to create download: {}", e),
            )
        })?;

    let filename = format!(
        "refactored_codebase_{}.tar.gz",
        Local::now().format("%Y%m%d_%H%M%S")
    );
    Ok((
        [
            (header::CONTENT_TYPE, "application/gzip".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", filename),
            ),
        ],
        archive,
    ))
}

async fn config_view(State(state): State<AppState>) -> Json<ConfigView> {
    let config = &state.config;
    Json(ConfigView {
        api_key_configured: !config.api_key.is_empty(),
        model: config.model.clone(),
        output_dir: config.output_dir.display().to_string(),
        request_delay_secs: config.call_delay.as_secs(),
        supported_extensions: supported_extensions(),
        models: SUGGESTED_MODELS.iter().map(|m| m.to_string()).collect(),
    })
}

/// Pack the outputs of a run (the refactored tree and both reports) into a
/// gzipped tarball. Other files in `output_dir` are left out.
pub fn build_archive(output_dir: &Path) -> std::io::Result<Vec<u8>> {
    let encoder = GzEncoder::new(Vec::new(), Compression::default());
    let mut archive = tar::Builder::new(encoder);

    let refactored = output_dir.join(REFACTORED_DIR);
    if refactored.is_dir() {
        archive.append_dir_all(REFACTORED_DIR, &refactored)?;
    }
    for kind in [ReportKind::Recommendations, ReportKind::InterviewQuestions] {
        let report = output_dir.join(kind.file_name());
        if report.is_file() {
            archive.append_path_with_name(&report, kind.file_name())?;
        }
    }

    archive.into_inner()?.finish()
}

const INDEX_HTML: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>recast</title>
<style>
  body { font-family: system-ui, sans-serif; max-width: 860px; margin: 2rem auto; padding: 0 1rem; }
  label { display: block; margin-top: .75rem; }
  input[type=text], input[type=number], select { width: 100%; padding: .4rem; }
  #bar { height: 12px; background: #e5e7eb; border-radius: 6px; margin: 1rem 0; }
  #fill { height: 100%; width: 0; background: #2563eb; border-radius: 6px; }
  #logs { background: #111827; color: #e5e7eb; font-family: monospace; font-size: 13px;
          height: 220px; overflow-y: auto; padding: .5rem; }
  .warning { color: #fbbf24; } .error { color: #f87171; } .success { color: #34d399; }
  pre { white-space: pre-wrap; background: #f3f4f6; padding: .75rem; }
</style>
</head>
<body>
<h1>recast</h1>
<form id="start">
  <label>Source path or repository URL <input type="text" id="sourcePath" required></label>
  <label>Output directory <input type="text" id="outputDir" placeholder="refactored_codebase"></label>
  <label>Model <select id="model"></select></label>
  <label>Delay between requests (seconds) <input type="number" id="delay" min="0" value="2"></label>
  <label><input type="checkbox" id="skipAnalysis"> Skip analysis</label>
  <label><input type="checkbox" id="skipRefactoring"> Skip refactoring</label>
  <p><button type="submit">Start</button> <a id="download" href="/api/download" hidden>Download results</a></p>
</form>
<div id="bar"><div id="fill"></div></div>
<p id="state">Idle</p>
<div id="logs"></div>
<h2>Recommendations</h2><pre id="recommendations"></pre>
<h2>Interview questions</h2><pre id="questions"></pre>
<script>
const $ = (id) => document.getElementById(id);
let timer = null;

fetch('/api/config').then(r => r.json()).then(cfg => {
  for (const name of cfg.models) {
    const option = new Option(name, name, false, name === cfg.model);
    $('model').add(option);
  }
  if (!cfg.api_key_configured) $('state').textContent = 'GEMINI_API_KEY is not configured';
});

$('start').addEventListener('submit', async (event) => {
  event.preventDefault();
  const body = {
    sourcePath: $('sourcePath').value,
    outputDir: $('outputDir').value || undefined,
    model: $('model').value,
    delay: Number($('delay').value),
    skipAnalysis: $('skipAnalysis').checked,
    skipRefactoring: $('skipRefactoring').checked,
  };
  const response = await fetch('/api/start', {
    method: 'POST', headers: { 'Content-Type': 'application/json' }, body: JSON.stringify(body),
  });
  const reply = await response.json();
  if (!response.ok) { $('state').textContent = reply.error; return; }
  $('download').hidden = true;
  clearInterval(timer);
  timer = setInterval(poll, 1000);
});

async function poll() {
  const s = await (await fetch('/api/status')).json();
  $('fill').style.width = s.progress + '%';
  $('state').textContent = `${s.status} ${s.phase} ${s.current_file}`.trim();
  $('logs').innerHTML = s.logs
    .map(l => `<div class="${l.level}">[${l.timestamp}] ${l.message.replace(/</g, '&lt;')}</div>`)
    .join('');
  $('logs').scrollTop = $('logs').scrollHeight;
  if (!s.active) {
    clearInterval(timer);
    $('recommendations').textContent = s.recommendations || '';
    $('questions').textContent = s.interview_questions || '';
    $('download').hidden = s.status !== 'completed';
    if (s.error) $('state').textContent = 'Error: ' + s.error;
  }
}
</script>
</body>
</html>
"#;
