mod airkorea;
mod config;
mod datasource;
mod display;
mod error;
mod image_processing;
mod kma;
mod palette;
mod photo;
mod pisugar;
mod power;
mod scheduler;
mod text;
mod widget;

use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use utoipa::{IntoParams, OpenApi, ToSchema};
use utoipa_scalar::{Scalar, Servable};

use crate::config::{Config, ConfigStore, FramePaths, PowerMode};
use crate::datasource::{local_now, DataFetcher, PublicDataSource};
use crate::display::DisplayKind;
use crate::error::AppError;
use crate::image_processing::Assets;
use crate::palette::Palette;
use crate::pisugar::Rtc;
use crate::power::{CycleOutcome, PowerCycleManager, SystemPower};
use crate::scheduler::{RefreshOutcome, RefreshScheduler};

/// Application state shared across handlers
#[derive(Clone)]
struct AppState {
    store: Arc<ConfigStore>,
    scheduler: Arc<RefreshScheduler>,
    rtc: Arc<dyn Rtc>,
    preview_path: PathBuf,
}

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    info(
        title = "E-Ink Frame Controller API",
        description = "Admin triggers for the e-ink photo frame: settings, refresh, power mode",
        version = "0.1.0"
    ),
    tags(
        (name = "Frame", description = "Frame control endpoints")
    ),
    paths(health, get_config, save_config, trigger_refresh, toggle_mode, battery, preview),
    components(schemas(PowerMode, RefreshOutcome, RefreshAccepted, ModeResponse, BatteryStatus))
)]
struct ApiDoc;

#[tokio::main]
async fn main() -> std::io::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

    let paths = FramePaths::from_env();
    tracing::info!("Frame home: {}", paths.home().display());

    let store = Arc::new(ConfigStore::new(paths.config_file()).with_template(paths.config_template()));

    let client = Client::new();
    let fetcher: Arc<dyn DataFetcher> = Arc::new(PublicDataSource::new(client));

    let display = display::open(DisplayKind::from_env(), &paths);
    let assets = Arc::new(Assets::load(&paths));

    let scheduler = Arc::new(RefreshScheduler::new(
        store.clone(),
        fetcher,
        display,
        assets,
        Palette::acep7(),
        paths.uploads_dir(),
        paths.preview_file(),
        local_now,
    ));

    let rtc: Arc<dyn Rtc> = Arc::from(pisugar::from_env());
    let power: Arc<dyn SystemPower> = Arc::from(power::from_env());

    let state = AppState {
        store: store.clone(),
        scheduler: scheduler.clone(),
        rtc: rtc.clone(),
        preview_path: paths.preview_file(),
    };

    // Get port from environment or use default
    let port = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(8080);

    let addr = format!("0.0.0.0:{}", port);

    // A missing control surface must not keep the frame from cycling
    let server = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => {
            tracing::info!("Starting server on {}", addr);
            let app = router(state);
            Some(tokio::spawn(async move { axum::serve(listener, app).await }))
        }
        Err(e) => {
            tracing::error!("Failed to bind {}: {}", addr, e);
            None
        }
    };

    let manager = PowerCycleManager::new(store, scheduler, rtc, power, local_now);
    match manager.run_cycle(true).await {
        CycleOutcome::ShuttingDown { wake_at, .. } => {
            tracing::info!("Cycle complete, next wake at {}", wake_at);
            return Ok(());
        }
        outcome => tracing::info!("Staying awake ({:?})", outcome),
    }

    match server {
        Some(handle) => handle.await.map_err(std::io::Error::other)?,
        None => Err(std::io::Error::other("control server is not running")),
    }
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/config", get(get_config).post(save_config))
        .route("/api/refresh", post(trigger_refresh))
        .route("/api/mode", post(toggle_mode))
        .route("/api/battery", get(battery))
        .route("/preview", get(preview))
        .merge(Scalar::with_url("/docs", ApiDoc::openapi()))
        .route("/openapi.json", get(openapi_json))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Run a refresh in the background; contention is resolved by the scheduler
fn spawn_refresh(scheduler: Arc<RefreshScheduler>) {
    tokio::spawn(async move {
        let outcome = scheduler.refresh_display().await;
        tracing::info!("Background refresh finished: {:?}", outcome);
    });
}

/// Health check endpoint
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is healthy", body = String)
    )
)]
async fn health() -> &'static str {
    "ok"
}

/// Get OpenAPI JSON specification
async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

/// Get the current configuration document
#[utoipa::path(
    get,
    path = "/api/config",
    tag = "Frame",
    responses(
        (status = 200, description = "Current configuration", body = serde_json::Value)
    )
)]
async fn get_config(State(state): State<AppState>) -> Json<Config> {
    Json(state.store.load().await)
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
struct SaveQuery {
    /// Apply the new settings to the panel right away
    #[serde(default)]
    refresh: bool,
}

/// Replace the configuration document
///
/// Unknown keys are preserved. With `refresh=true` a background refresh is
/// started once the document is on disk.
#[utoipa::path(
    post,
    path = "/api/config",
    tag = "Frame",
    params(SaveQuery),
    request_body = serde_json::Value,
    responses(
        (status = 200, description = "Saved configuration", body = serde_json::Value),
        (status = 500, description = "Configuration could not be written")
    )
)]
async fn save_config(
    State(state): State<AppState>,
    Query(query): Query<SaveQuery>,
    Json(config): Json<Config>,
) -> Result<Json<Config>, AppError> {
    state.store.save(&config).await?;
    tracing::info!("Configuration saved (refresh: {})", query.refresh);

    if query.refresh {
        spawn_refresh(state.scheduler.clone());
    }
    Ok(Json(config))
}

#[derive(Debug, Serialize, ToSchema)]
struct RefreshAccepted {
    /// False when a refresh was already running and this request will be skipped
    started: bool,
}

/// Start a background refresh
#[utoipa::path(
    post,
    path = "/api/refresh",
    tag = "Frame",
    responses(
        (status = 202, description = "Refresh scheduled", body = RefreshAccepted)
    )
)]
async fn trigger_refresh(State(state): State<AppState>) -> impl IntoResponse {
    let started = !state.scheduler.is_refreshing();
    spawn_refresh(state.scheduler.clone());
    (StatusCode::ACCEPTED, Json(RefreshAccepted { started }))
}

#[derive(Debug, Serialize, ToSchema)]
struct ModeResponse {
    mode: PowerMode,
}

/// Toggle between settings and operation mode
#[utoipa::path(
    post,
    path = "/api/mode",
    tag = "Frame",
    responses(
        (status = 200, description = "New power mode", body = ModeResponse),
        (status = 500, description = "Configuration could not be written")
    )
)]
async fn toggle_mode(State(state): State<AppState>) -> Result<Json<ModeResponse>, AppError> {
    let mode = state.store.toggle_mode().await?;
    tracing::info!("Power mode switched to {}", mode);
    Ok(Json(ModeResponse { mode }))
}

#[derive(Debug, Serialize, ToSchema)]
struct BatteryStatus {
    level: Option<f32>,
    charging: bool,
}

/// Battery level and charging state
#[utoipa::path(
    get,
    path = "/api/battery",
    tag = "Frame",
    responses(
        (status = 200, description = "Battery status", body = BatteryStatus)
    )
)]
async fn battery(State(state): State<AppState>) -> Json<BatteryStatus> {
    let (level, charging) = tokio::join!(state.rtc.battery_level(), state.rtc.is_charging());
    Json(BatteryStatus { level, charging })
}

/// Last composed frame
#[utoipa::path(
    get,
    path = "/preview",
    tag = "Frame",
    responses(
        (status = 200, description = "Preview image", content_type = "image/jpeg"),
        (status = 404, description = "Nothing rendered yet")
    )
)]
async fn preview(State(state): State<AppState>) -> Result<Response, AppError> {
    let bytes = match tokio::fs::read(&state.preview_path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(AppError::NotFound("preview".to_string()))
        }
        Err(e) => return Err(e.into()),
    };

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "image/jpeg"),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        bytes,
    )
        .into_response())
}
