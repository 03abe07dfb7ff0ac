//! Readiness endpoint: database reachability and configured channels.

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use std::sync::Arc;
use tracing::warn;
use utoipa::{OpenApi, ToSchema};

use crate::state::AppState;

#[derive(OpenApi)]
#[openapi(paths(get_health), components(schemas(HealthReport, ChannelStatus)))]
pub struct HealthApi;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/health", get(get_health))
}

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthReport {
    /// `ok`, or `degraded` when the database cannot be reached.
    pub status: String,
    pub version: String,
    /// `up` or `down`.
    pub database: String,
    pub channels: ChannelStatus,
}

/// Which webhooks accept deliveries.
#[derive(Debug, Serialize, ToSchema)]
pub struct ChannelStatus {
    pub line: bool,
    pub messenger: bool,
}

/// Report whether the relay can persist turns and which platforms it serves.
///
/// Answers 503 while the database is unreachable so load balancers stop
/// routing webhook deliveries that could not be stored.
#[utoipa::path(
    get,
    path = "/health",
    tag = "health",
    responses(
        (status = 200, description = "Database reachable", body = HealthReport),
        (status = 503, description = "Database unreachable", body = HealthReport)
    )
)]
pub async fn get_health(State(state): State<Arc<AppState>>) -> (StatusCode, Json<HealthReport>) {
    let database_up = match state.store.ping().await {
        Ok(()) => true,
        Err(e) => {
            warn!(error = %e, "health check: database unreachable");
            false
        }
    };
    let report = HealthReport {
        status: if database_up { "ok" } else { "degraded" }.to_owned(),
        version: env!("CARGO_PKG_VERSION").to_owned(),
        database: if database_up { "up" } else { "down" }.to_owned(),
        channels: ChannelStatus {
            line: state.line.is_some(),
            messenger: state.messenger.is_some(),
        },
    };
    let code = if database_up {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (code, Json(report))
}
