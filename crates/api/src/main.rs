use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use advice_core::advice::pipeline::AdvicePipeline;
use advice_core::config::Settings;
use advice_core::scheduler::{ScheduleOptions, Scheduler, SchedulerStatus};
use advice_core::storage::files::FsDocumentStore;
use advice_core::storage::{DocumentKey, DocumentStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer())
        .init();

    // This process owns the files; it never talks to ADVICE_STORE_URL itself.
    let store: Arc<dyn DocumentStore> = Arc::new(FsDocumentStore::new(&settings.data_dir));
    let pipeline = AdvicePipeline::from_settings(&settings, store.clone())?;
    let scheduler = Scheduler::new(Arc::new(pipeline), ScheduleOptions::from_settings(&settings));

    let state = AppState {
        store,
        scheduler: scheduler.clone(),
    };

    let app = Router::new()
        .route("/healthz", get(healthz))
        .route("/api/:doc", get(read_document))
        .route("/api/:doc/update", post(update_document))
        .route("/api/:doc/backups", get(list_backups))
        .route("/scheduler/status", get(scheduler_status))
        .route("/scheduler/start", post(scheduler_start))
        .route("/scheduler/stop", post(scheduler_stop))
        .route("/scheduler/run", post(scheduler_run))
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(3001);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));

    tracing::info!(%addr, data_dir = %settings.data_dir.display(), "api listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    scheduler.stop();
    Ok(())
}

async fn healthz() -> &'static str {
    "ok"
}

#[derive(Clone)]
struct AppState {
    store: Arc<dyn DocumentStore>,
    scheduler: Scheduler,
}

type ApiResult = Result<Json<Value>, (StatusCode, Json<Value>)>;

fn api_error(status: StatusCode, message: impl Into<String>) -> (StatusCode, Json<Value>) {
    (
        status,
        Json(json!({ "success": false, "error": message.into() })),
    )
}

fn internal(err: anyhow::Error) -> (StatusCode, Json<Value>) {
    sentry_anyhow::capture_anyhow(&err);
    tracing::error!(error = %format!("{err:#}"), "request failed");
    api_error(StatusCode::INTERNAL_SERVER_ERROR, format!("{err:#}"))
}

fn document_key(doc: &str) -> Result<DocumentKey, (StatusCode, Json<Value>)> {
    DocumentKey::from_stem(doc)
        .ok_or_else(|| api_error(StatusCode::NOT_FOUND, format!("unknown document: {doc}")))
}

async fn read_document(State(state): State<AppState>, Path(doc): Path<String>) -> ApiResult {
    let key = document_key(&doc)?;
    let content = state.store.read(key).await.map_err(internal)?;
    Ok(Json(json!({ "success": true, "content": content })))
}

#[derive(Debug, Deserialize)]
struct UpdateBody {
    content: Option<String>,
}

async fn update_document(
    State(state): State<AppState>,
    Path(doc): Path<String>,
    Json(body): Json<UpdateBody>,
) -> ApiResult {
    let key = document_key(&doc)?;
    let Some(content) = body.content else {
        return Err(api_error(StatusCode::BAD_REQUEST, "content is required"));
    };
    state.store.write(key, &content).await.map_err(internal)?;
    tracing::info!(document = %key, bytes = content.len(), "document updated");
    Ok(Json(json!({
        "success": true,
        "message": format!("{} updated", key.file_name()),
    })))
}

async fn list_backups(State(state): State<AppState>, Path(doc): Path<String>) -> ApiResult {
    let key = document_key(&doc)?;
    let backups = state.store.list_backups(key).await.map_err(internal)?;
    Ok(Json(json!({ "success": true, "backups": backups })))
}

async fn scheduler_status(State(state): State<AppState>) -> Json<SchedulerStatus> {
    Json(state.scheduler.status())
}

#[derive(Debug, Deserialize)]
struct StartParams {
    /// Accelerated cadence instead of the daily trigger.
    interval_minutes: Option<u64>,
}

async fn scheduler_start(
    State(state): State<AppState>,
    Query(params): Query<StartParams>,
) -> Result<Json<SchedulerStatus>, (StatusCode, Json<Value>)> {
    let started = match params.interval_minutes {
        Some(minutes) => state
            .scheduler
            .start_with_interval(Duration::from_secs(minutes.saturating_mul(60))),
        None => state.scheduler.start(),
    };
    started.map_err(|e| api_error(StatusCode::BAD_REQUEST, format!("{e:#}")))?;
    Ok(Json(state.scheduler.status()))
}

async fn scheduler_stop(State(state): State<AppState>) -> Json<SchedulerStatus> {
    state.scheduler.stop();
    Json(state.scheduler.status())
}

#[derive(Debug, Serialize)]
struct RunResponse {
    success: bool,
    run_id: uuid::Uuid,
    started_at: chrono::DateTime<chrono::Local>,
    finished_at: chrono::DateTime<chrono::Local>,
    results: Vec<advice_core::advice::ProviderOutcome>,
}

async fn scheduler_run(
    State(state): State<AppState>,
) -> Result<Json<RunResponse>, (StatusCode, Json<Value>)> {
    let report = state
        .scheduler
        .execute_now()
        .await
        .map_err(internal)?
        .ok_or_else(|| api_error(StatusCode::CONFLICT, "an advice run is already in progress"))?;

    Ok(Json(RunResponse {
        success: report.succeeded(),
        run_id: report.run_id,
        started_at: report.started_at,
        finished_at: report.finished_at,
        results: report.outcomes(),
    }))
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

fn init_sentry(settings: &Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}
