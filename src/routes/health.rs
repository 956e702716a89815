//! Liveness endpoint.

use axum::{Json, extract::State};
use serde::Serialize;

use crate::{AppState, authz::catalog::CATALOG_VERSION};

#[derive(Debug, Serialize)]
pub struct HealthStatus {
    pub status: &'static str,
    pub version: &'static str,
    pub catalog_version: u32,
    pub roles: usize,
}

#[tracing::instrument(name = "health.check", skip(state))]
pub async fn health_check(State(state): State<AppState>) -> Json<HealthStatus> {
    Json(HealthStatus {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        catalog_version: CATALOG_VERSION,
        roles: state.engine.registry().role_ids().len(),
    })
}
