//! Prometheus counters plus the health/metrics listener
//!
//! Endpoints:
//!   GET /metrics  Prometheus text format
//!   GET /healthz  Liveness probe (always 200 if process is running)
//!   GET /readyz   Readiness probe (200 if the repository answers a ping)

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Router};
use prometheus_client::{
    encoding::text::encode,
    metrics::{counter::Counter, family::Family},
    registry::Registry,
};
use std::sync::Arc;

use crate::service::VaultService;

type Labels = Vec<(String, String)>;

fn labels(key: &str, value: &str) -> Labels {
    vec![(key.to_string(), value.to_string())]
}

/// Server counters. Cheap to clone; all clones feed the same registry.
#[derive(Clone)]
pub struct Metrics {
    registrations: Counter,
    logins: Family<Labels, Counter>,
    record_ops: Family<Labels, Counter>,
    responses: Family<Labels, Counter>,
    registry: Arc<Registry>,
}

impl Metrics {
    pub fn new() -> Self {
        let mut registry = Registry::default();
        let registrations = Counter::default();
        let logins = Family::default();
        let record_ops = Family::default();
        let responses = Family::default();

        registry.register(
            "sbx_registrations",
            "Accounts created",
            registrations.clone(),
        );
        registry.register(
            "sbx_logins",
            "Login attempts by outcome",
            logins.clone(),
        );
        registry.register(
            "sbx_record_operations",
            "Successful record operations by kind",
            record_ops.clone(),
        );
        registry.register(
            "sbx_http_responses",
            "API responses by status class",
            responses.clone(),
        );

        Self {
            registrations,
            logins,
            record_ops,
            responses,
            registry: Arc::new(registry),
        }
    }

    pub fn registration(&self) {
        self.registrations.inc();
    }

    pub fn login(&self, outcome: &str) {
        self.logins.get_or_create(&labels("outcome", outcome)).inc();
    }

    pub fn record_op(&self, op: &str) {
        self.record_ops.get_or_create(&labels("op", op)).inc();
    }

    pub fn response(&self, status: u16) {
        let class = format!("{}xx", status / 100);
        self.responses.get_or_create(&labels("class", &class)).inc();
    }

    pub fn encode(&self) -> Result<String, std::fmt::Error> {
        let mut body = String::new();
        encode(&mut body, &self.registry)?;
        Ok(body)
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// State for the health listener
#[derive(Clone)]
pub struct HealthState {
    pub service: Arc<VaultService>,
    pub metrics: Metrics,
}

pub fn router(state: HealthState) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/healthz", get(healthz_handler))
        .route("/readyz", get(readyz_handler))
        .with_state(state)
}

async fn metrics_handler(State(state): State<HealthState>) -> impl IntoResponse {
    match state.metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4")],
            body,
        ),
        Err(e) => {
            tracing::error!("metrics encode failed: {e}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [("content-type", "text/plain")],
                e.to_string(),
            )
        }
    }
}

/// Liveness probe: returns 200 if the process is running.
async fn healthz_handler() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

/// Readiness probe: returns 200 if storage is reachable, 503 otherwise.
async fn readyz_handler(State(state): State<HealthState>) -> impl IntoResponse {
    match state.service.ping().await {
        Ok(()) => (StatusCode::OK, "ready"),
        Err(e) => {
            tracing::warn!("readiness check failed: {e}");
            (StatusCode::SERVICE_UNAVAILABLE, "storage unreachable")
        }
    }
}
