use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, State, rejection::JsonRejection},
    http::StatusCode,
    routing::{get, post},
};
use rectpack::api::{self, ApiError, OptimizeRequest, OptimizeResponse};
use rectpack::config::{SERVICE_NAME, SERVICE_VERSION, Settings};
use serde_json::{Value, json};
use tokio::sync::Semaphore;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;
use tracing_subscriber::EnvFilter;

#[derive(Clone)]
struct AppState {
    settings: Arc<Settings>,
    jobs: Arc<Semaphore>,
}

async fn status_ok() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn version() -> Json<Value> {
    Json(json!({
        "service": { "name": SERVICE_NAME, "version": SERVICE_VERSION },
        "engine": {
            "modes": ["guillotine", "nested"],
            "packers": ["guillotine", "maxrects", "skyline"],
            "bin_select": ["best_fit", "first_fit"],
            "sort": ["area_desc", "maxside_desc", "none"],
            "objectives": ["min_waste", "min_sheets"],
        },
    }))
}

fn rejection_error(rejection: JsonRejection) -> ApiError {
    if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
        return ApiError::Constraint {
            message: "Request body too large".to_string(),
            details: None,
        };
    }
    ApiError::Validation {
        message: "Request validation failed".to_string(),
        details: Some(json!({ "errors": [{ "field": "body", "message": rejection.body_text() }] })),
    }
}

async fn optimize(
    State(state): State<AppState>,
    payload: Result<Json<OptimizeRequest>, JsonRejection>,
) -> Result<Json<OptimizeResponse>, ApiError> {
    let Json(req) = payload.map_err(rejection_error)?;

    let _permit = state
        .jobs
        .clone()
        .acquire_owned()
        .await
        .map_err(|e| ApiError::Internal(format!("job queue closed: {e}")))?;

    let settings = state.settings.clone();
    let result = tokio::task::spawn_blocking(move || api::run(&req, &settings))
        .await
        .map_err(|e| ApiError::Internal(format!("optimization task failed: {e}")))?;

    match result {
        Ok(response) => {
            tracing::info!(
                sheets = response.summary.used_stock_count,
                waste_percent = response.summary.waste_percent,
                time_ms = response.summary.time_ms,
                "POST /v1/optimize"
            );
            Ok(Json(response))
        }
        Err(err) => {
            if matches!(err, ApiError::Internal(_)) {
                sentry::capture_error(&err);
            } else {
                tracing::info!(code = err.code(), message = %err, "optimize rejected");
            }
            Err(err)
        }
    }
}

fn init_logging(settings: &Settings) {
    let filter = EnvFilter::new(&settings.log_level);
    match &settings.log_file {
        Some(path) => {
            let log_file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .unwrap_or_else(|e| {
                    eprintln!("failed to open {path}: {e}");
                    std::process::exit(1);
                });
            tracing_subscriber::fmt()
                .with_writer(log_file)
                .with_target(false)
                .with_ansi(false)
                .with_env_filter(filter)
                .init();
        }
        None => {
            tracing_subscriber::fmt()
                .with_target(false)
                .with_env_filter(filter)
                .init();
        }
    }
}

async fn serve(settings: Settings) -> std::io::Result<()> {
    let addr = format!("0.0.0.0:{}", settings.port);
    let state = AppState {
        jobs: Arc::new(Semaphore::new(settings.max_concurrent_jobs)),
        settings: Arc::new(settings),
    };
    let body_limit = state.settings.max_body_bytes;

    let app = Router::new()
        .route("/health/live", get(status_ok))
        .route("/health/ready", get(status_ok))
        .route("/version", get(version))
        .route("/v1/optimize", post(optimize))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, version = SERVICE_VERSION, "listening");
    axum::serve(listener, app).await
}

fn main() {
    let settings = Settings::from_env();

    // Sentry must be up before the runtime starts so its hub is inherited.
    let _sentry = std::env::var("SENTRY_DSN").ok().map(|dsn| {
        sentry::init((
            dsn,
            sentry::ClientOptions {
                release: sentry::release_name!(),
                ..Default::default()
            },
        ))
    });

    init_logging(&settings);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .unwrap_or_else(|e| {
            eprintln!("failed to start runtime: {e}");
            std::process::exit(1);
        });

    if let Err(e) = runtime.block_on(serve(settings)) {
        tracing::error!(error = %e, "server stopped");
        std::process::exit(1);
    }
}
