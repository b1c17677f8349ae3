//! HTTP API
//!
//! Routes:
//!   GET    /healthcheck
//!   GET    /debug/loglevel          POST /debug/loglevel {"level": ".."}
//!   POST   /api/user/register       POST /api/user/login?userkey=true|false
//!   POST   /api/user/logout
//!   POST   /api/record              GET  /api/records
//!   GET    /api/records/{id}        DELETE /api/records/{id}
//!   PATCH  /api/records/{id}
//!
//! Record routes authenticate through the `auth_token` cookie.

pub mod admin;
pub mod auth;
pub mod error;
pub mod records;
pub mod users;

use axum::extract::{Request, State};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

use crate::logging::LogControl;
use crate::metrics::Metrics;
use crate::service::VaultService;

pub use error::{ApiError, ApiResult};

/// Shared handler state. Everything here is either immutable or internally synchronized.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<VaultService>,
    pub metrics: Metrics,
    pub log: LogControl,
    pub cookie_secure: bool,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthcheck", get(admin::healthcheck))
        .route("/debug/loglevel", get(admin::get_level).post(admin::set_level))
        .route("/api/user/register", post(users::register))
        .route("/api/user/login", post(users::login))
        .route("/api/user/logout", post(users::logout))
        .route("/api/record", post(records::create))
        .route("/api/records", get(records::list))
        .route(
            "/api/records/{id}",
            get(records::get)
                .delete(records::delete)
                .patch(records::update),
        )
        .layer(middleware::from_fn_with_state(state.clone(), track_request))
        .with_state(state)
}

/// Per-request log line and status-class counter.
async fn track_request(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let started = Instant::now();

    let response = next.run(request).await;

    let status = response.status().as_u16();
    state.metrics.response(status);
    info!(
        %method,
        %path,
        status,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "request"
    );
    response
}
