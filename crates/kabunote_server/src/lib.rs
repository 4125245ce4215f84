//! JSON HTTP API over `kabunote_core`.
//!
//! # Responsibility
//! - Own the shared SQLite connection and hand it to handlers one request
//!   at a time.
//! - Authenticate bearer sessions and map service errors onto the JSON
//!   failure envelope.
//!
//! # Invariants
//! - The connection lock is never held across an `.await`.
//! - Every response body carries a boolean `success` field.

pub mod auth;
pub mod error;
pub mod extract;
pub mod routes;

use axum::body::Body;
use axum::extract::Request;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::get;
use axum::{Json, Router};
use kabunote_core::logging::sanitize_message;
use kabunote_core::{Environment, Settings};
use rusqlite::Connection;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tower_http::cors::CorsLayer;

const MAX_LOGGED_PATH: usize = 200;

pub use error::{ApiError, ApiResult};

/// State shared by every handler.
#[derive(Clone)]
pub struct AppState {
    db: Arc<Mutex<Connection>>,
    settings: Arc<Settings>,
}

impl AppState {
    pub fn new(conn: Connection, settings: Settings) -> Self {
        Self {
            db: Arc::new(Mutex::new(conn)),
            settings: Arc::new(settings),
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Runs `work` with exclusive access to the connection.
    pub fn with_conn<T>(&self, work: impl FnOnce(&Connection) -> ApiResult<T>) -> ApiResult<T> {
        let conn = self
            .db
            .lock()
            .map_err(|_| ApiError::Internal("database lock poisoned".to_string()))?;
        work(&conn)
    }
}

/// Builds the application router.
pub fn app(state: AppState) -> Router {
    let protected = routes::protected_routes().route_layer(middleware::from_fn_with_state(
        state.clone(),
        auth::require_session,
    ));

    let router = Router::new()
        .route("/health", get(health))
        .merge(routes::public_routes())
        .merge(protected)
        .layer(middleware::from_fn(log_requests));

    let router = if state.settings().environment == Environment::Development {
        router.layer(CorsLayer::permissive())
    } else {
        router
    };
    router.with_state(state)
}

async fn health() -> Json<Value> {
    Json(json!({
        "success": true,
        "status": "ok",
        "version": kabunote_core::core_version(),
    }))
}

async fn log_requests(request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let path = sanitize_message(request.uri().path(), MAX_LOGGED_PATH);
    let started = Instant::now();
    let response = next.run(request).await;
    let status = response.status();
    let outcome = if status.is_server_error() { "error" } else { "ok" };
    log::info!(
        "event=http_request module=server status={outcome} method={method} path={path} code={} elapsed_ms={}",
        status.as_u16(),
        started.elapsed().as_millis()
    );
    response
}
