//! Router assembly and the serve loop

use crate::api;
use crate::auth::require_bearer;
use crate::state::AppState;
use anyhow::Context;
use axum::http::HeaderValue;
use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use pilot_agent::AgentWorkerFactory;
use pilot_foundation::{PilotConfig, ServerConfig};
use pilot_task::{Provisioner, TaskManager};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// Every route the service exposes. Only `/health` skips authentication.
pub fn router(state: AppState, server: &ServerConfig) -> Router {
    let protected = Router::new()
        .route("/api/v1/run-task", post(api::run_task))
        .route(
            "/api/v1/stop-task/{id}",
            post(api::stop_task).put(api::stop_task),
        )
        .route(
            "/api/v1/pause-task/{id}",
            post(api::pause_task).put(api::pause_task),
        )
        .route(
            "/api/v1/resume-task/{id}",
            post(api::resume_task).put(api::resume_task),
        )
        .route("/api/v1/task/{id}", get(api::task_details))
        .route("/api/v1/task/{id}/status", get(api::task_status))
        .route("/api/v1/task/{id}/human-feedback", post(api::human_feedback))
        .route("/api/v1/task/{id}/pending-request", get(api::pending_request))
        .route("/api/v1/tasks", get(api::list_tasks))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_bearer));

    Router::new()
        .route("/health", get(api::health))
        .merge(protected)
        .layer(cors_layer(&server.cors_origins))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);

    let parsed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin: {}", origin);
                None
            }
        })
        .collect();

    if parsed.is_empty() {
        layer.allow_origin(Any)
    } else {
        layer.allow_origin(parsed)
    }
}

/// Task manager backed by the browser agent
pub fn build_manager(config: &PilotConfig) -> TaskManager {
    let factory = Arc::new(AgentWorkerFactory::from_config(config));
    let provisioner = Provisioner::from_config(config, factory);
    TaskManager::new(config.lifecycle.clone(), provisioner)
}

/// Bind, serve until Ctrl+C, then stop whatever is still running
pub async fn serve(config: PilotConfig) -> anyhow::Result<()> {
    if config.uses_default_api_key() {
        warn!("Using the default API key; set API_KEY before exposing this service");
    }
    info!("API key: {}", config.server.masked_api_key());

    let manager = build_manager(&config);
    let cleanup = manager.start_periodic_cleanup(
        config.lifecycle.cleanup_interval(),
        config.lifecycle.retention(),
    );

    let state = AppState::new(manager.clone(), config.server.api_key.as_str());
    let app = router(state, &config.server);

    let address = config.server.bind_address();
    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .with_context(|| format!("failed to bind {}", address))?;
    info!("Pilot listening on http://{}", address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    cleanup.abort();
    let stopped = manager.shutdown().await;
    info!("Shutdown complete ({} tasks stopped)", stopped);
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
