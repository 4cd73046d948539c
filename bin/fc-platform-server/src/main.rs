//! FlowCatalyst Platform Server
//!
//! Serves the dispatch processing endpoint the message router calls for
//! every queued dispatch job:
//! - `POST /api/dispatch/process` on the API port
//! - `/metrics`, `/health`, `/health/live`, `/health/ready` on the metrics port
//! - Swagger UI at `/swagger-ui`
//!
//! Configuration comes from `config.toml` (or `FLOWCATALYST_CONFIG`) with
//! `FLOWCATALYST_*` environment overrides. Set `dev_mode = true` to run
//! against an in-memory job store without MongoDB.

use std::sync::Arc;

use anyhow::Result;
use axum::{extract::State, http::StatusCode, response::Json, routing::get, Router};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use mongodb::{bson::doc, Database};
use tokio::{net::TcpListener, signal};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use fc_config::{AppConfig, ConfigLoader, LoggingConfig};
use fc_platform::api::{dispatch_processing_router, DispatchProcessingState, PlatformApiDoc};
use fc_platform::repository::{DispatchJobRepository, DispatchJobStore, InMemoryDispatchJobStore};
use fc_platform::service::{AuthValidator, DispatchAuthService, DispatchExecutor};

#[derive(Clone)]
struct OpsState {
    prometheus: PrometheusHandle,
    db: Option<Database>,
}

fn init_logging(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.level));

    if config.json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let loader = ConfigLoader::new();
    let config: AppConfig = loader.load()?;
    init_logging(&config.logging);

    info!("Starting FlowCatalyst Platform Server");
    match loader.resolve_config_file() {
        Some(path) => info!(?path, dev_mode = config.dev_mode, "Configuration loaded from file"),
        None => info!(dev_mode = config.dev_mode, "No config file found, using defaults and environment"),
    }

    let prometheus = PrometheusBuilder::new().install_recorder()?;

    // Job store
    let (store, db): (Arc<dyn DispatchJobStore>, Option<Database>) = if config.dev_mode {
        warn!("Dev mode: using in-memory dispatch job store");
        (Arc::new(InMemoryDispatchJobStore::new()), None)
    } else {
        info!("Connecting to MongoDB: {}", config.mongodb.database);
        let client = mongodb::Client::with_uri_str(&config.mongodb.uri).await?;
        let db = client.database(&config.mongodb.database);
        let repo = DispatchJobRepository::new(&db);
        if let Err(e) = repo.ensure_indexes().await {
            warn!("Index creation failed: {}", e);
        }
        (Arc::new(repo), Some(db))
    };

    // Dispatch auth
    let auth: Arc<dyn AuthValidator> = if config.auth.app_key.is_empty() {
        warn!("No app key configured, dispatch tokens are only valid for this process");
        Arc::new(DispatchAuthService::with_random_key())
    } else {
        Arc::new(DispatchAuthService::new(config.auth.app_key.clone()))
    };

    let executor = Arc::new(DispatchExecutor::new(store, auth, config.dispatch.clone())?);
    info!(
        default_timeout_seconds = config.dispatch.default_timeout_seconds,
        default_max_retries = config.dispatch.default_max_retries,
        max_delay_seconds = config.dispatch.max_delay_seconds,
        "Dispatch executor initialized"
    );

    let app = Router::new()
        .nest("/api/dispatch", dispatch_processing_router(DispatchProcessingState { executor }))
        .merge(SwaggerUi::new("/swagger-ui").url("/q/openapi", PlatformApiDoc::openapi()))
        .layer(TraceLayer::new_for_http());

    let api_addr = format!("{}:{}", config.http.host, config.http.port);
    let api_listener = TcpListener::bind(&api_addr).await?;
    info!("API server listening on http://{}", api_addr);

    // Metrics and health server
    let ops_app = Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/health", get(health_handler))
        .route("/health/live", get(live_handler))
        .route("/health/ready", get(ready_handler))
        .with_state(OpsState { prometheus, db });

    let metrics_addr = format!("{}:{}", config.http.host, config.http.metrics_port);
    let metrics_listener = TcpListener::bind(&metrics_addr).await?;
    info!("Metrics server listening on http://{}/metrics", metrics_addr);

    let metrics_task = tokio::spawn(async move {
        if let Err(e) = axum::serve(metrics_listener, ops_app).await {
            error!("Metrics server failed: {}", e);
        }
    });

    info!("FlowCatalyst Platform Server started");

    axum::serve(api_listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    metrics_task.abort();
    info!("FlowCatalyst Platform Server shutdown complete");
    Ok(())
}

async fn metrics_handler(State(state): State<OpsState>) -> String {
    state.prometheus.render()
}

async fn health_handler() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "UP",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

async fn live_handler() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "UP" }))
}

async fn ready_handler(State(state): State<OpsState>) -> (StatusCode, Json<serde_json::Value>) {
    let Some(db) = state.db else {
        return (StatusCode::OK, Json(serde_json::json!({ "status": "READY" })));
    };

    match db.run_command(doc! { "ping": 1 }).await {
        Ok(_) => (StatusCode::OK, Json(serde_json::json!({ "status": "READY" }))),
        Err(e) => {
            warn!("Readiness check failed: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(serde_json::json!({ "status": "NOT_READY", "reason": "mongodb unreachable" })),
            )
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received...");
}
