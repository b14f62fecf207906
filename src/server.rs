//! HTTP surface for the browser frontend.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/api/ollama/chat` | Forward a chat request to the model backend |
//! | `GET`  | `/api/ollama/models` | Refresh and list available model names |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! When a frontend directory is configured, every other path is served from
//! it, with `index.html` for `/`.
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "chat_error", "message": "backend request failed: ..." } }
//! ```
//!
//! Request-phase failures always map to `500`, including chat bodies that do
//! not parse; they never take the server down.

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::{ServeDir, ServeFile};
use tracing::{error, info};

use crate::models::ChatRequest;
use crate::services::Services;

#[derive(Debug, Clone)]
pub struct ServerOptions {
    pub bind: String,
    pub frontend: Option<PathBuf>,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:5000".to_string(),
            frontend: None,
        }
    }
}

/// Build the router over already-started services.
pub fn router(services: Arc<Services>, frontend: Option<PathBuf>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let mut app = Router::new()
        .route("/api/ollama/chat", post(handle_chat))
        .route("/api/ollama/models", get(handle_models))
        .route("/health", get(handle_health))
        .with_state(services);

    if let Some(dir) = frontend {
        let index = dir.join("index.html");
        app = app.fallback_service(ServeDir::new(dir).not_found_service(ServeFile::new(index)));
    }

    app.layer(cors)
}

/// Serve until Ctrl-C, then shut the services down.
pub async fn run_server(services: Arc<Services>, options: ServerOptions) -> anyhow::Result<()> {
    let app = router(services.clone(), options.frontend.clone());

    let listener = tokio::net::TcpListener::bind(&options.bind).await?;
    info!(bind = %options.bind, "API server listening");
    println!("Studio gateway listening on http://{}", options.bind);

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    services.shutdown().await;
    served?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
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
    code: &'static str,
    message: String,
}

impl AppError {
    fn server(code: &'static str, err: impl std::fmt::Display) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            code,
            message: err.to_string(),
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

// ============ POST /api/ollama/chat ============

async fn handle_chat(
    State(services): State<Arc<Services>>,
    body: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<serde_json::Value>, AppError> {
    let Json(request) = body.map_err(|rejection| {
        error!(error = %rejection.body_text(), "malformed chat request");
        AppError::server("chat_error", rejection.body_text())
    })?;

    services
        .gateway
        .chat(request)
        .await
        .map(Json)
        .map_err(|e| {
            error!(error = %e, "error in chat endpoint");
            AppError::server("chat_error", e)
        })
}

// ============ GET /api/ollama/models ============

async fn handle_models(
    State(services): State<Arc<Services>>,
) -> Result<Json<Vec<String>>, AppError> {
    services.gateway.list_models().await.map(Json).map_err(|e| {
        error!(error = %e, "error listing models");
        AppError::server("models_error", e)
    })
}
