//! HTTP query server.
//!
//! Exposes the question-answering read path over JSON HTTP so chat bots and
//! internal dashboards can query the index without shelling out to the CLI.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/query` | Answer a question from the indexed documents |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! # Error Contract
//!
//! Error responses are a flat JSON object:
//!
//! ```json
//! { "error": "question must not be empty" }
//! ```
//!
//! Invalid input maps to 400; everything else that escapes the pipeline maps
//! to 500. Generation failures never appear here at all — the answer
//! composer recovers them internally.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted so browser-based internal
//! tools can call the API directly.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::ask;
use crate::config::Config;
use crate::db;
use crate::errors::PipelineError;

/// Shared application state passed to all route handlers via Axum's `State`
/// extractor.
#[derive(Clone)]
struct AppState {
    config: Arc<Config>,
    pool: SqlitePool,
}

/// Starts the query server.
///
/// Binds to the address configured in `[server].bind` and runs until the
/// process is terminated. The connection pool is opened once and shared
/// across requests.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();
    let pool = db::open_pool(&config.db.path).await?;

    let state = AppState {
        config: Arc::new(config.clone()),
        pool,
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/query", post(handle_query))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(state);

    println!("query server listening on http://{}", bind_addr);
    info!(bind = %bind_addr, "server started");

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ============ Error response ============

/// Flat JSON error body: `{ "error": "<message>" }`.
#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

struct AppError {
    status: StatusCode,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.message,
        };
        (self.status, Json(body)).into_response()
    }
}

/// Map a pipeline failure to an HTTP status: invalid input is the caller's
/// fault (400), everything else is ours (500).
fn classify_error(err: anyhow::Error) -> AppError {
    let status = match err.downcast_ref::<PipelineError>() {
        Some(PipelineError::Input(_)) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    AppError {
        status,
        message: err.to_string(),
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

// ============ POST /query ============

#[derive(Deserialize)]
struct QueryRequest {
    question: String,
}

/// Handler for `POST /query`.
///
/// Runs the full read path and returns
/// `{ "answer": ..., "citations": [...], "confidence": ... }`.
async fn handle_query(
    State(state): State<AppState>,
    Json(request): Json<QueryRequest>,
) -> Result<Json<ask::AskOutcome>, AppError> {
    let outcome = ask::answer_question(&state.pool, &state.config, &request.question)
        .await
        .map_err(classify_error)?;

    Ok(Json(outcome))
}
