//! Manual access check for the calling session.

use axum::{Extension, Json, extract::State};
use serde::{Deserialize, Serialize};

use super::error::ApiError;
use crate::{AppState, session::Session};

#[derive(Debug, Deserialize)]
pub struct CheckRequest {
    pub action: String,
    pub resource: String,
}

#[derive(Debug, Serialize)]
pub struct CheckResponse {
    pub allowed: bool,
    pub allow_pattern: Option<String>,
    pub deny_pattern: Option<String>,
    pub roles: Vec<String>,
}

/// Report whether the caller may perform `action` on `resource`.
///
/// Sessions without RBAC are reported as allowed, mirroring the enforcement
/// layer.
#[tracing::instrument(name = "rbac.check", skip_all)]
pub async fn check_access(
    State(state): State<AppState>,
    session: Option<Extension<Session>>,
    Json(request): Json<CheckRequest>,
) -> Result<Json<CheckResponse>, ApiError> {
    let Some(Extension(session)) = session else {
        return Err(ApiError::Forbidden("Not authenticated".to_string()));
    };

    let roles = state
        .engine
        .registry()
        .effective_roles(&session.roles, session.principal.as_deref());

    if !session.has_rbac {
        return Ok(Json(CheckResponse {
            allowed: true,
            allow_pattern: None,
            deny_pattern: None,
            roles,
        }));
    }

    let decision = state
        .engine
        .authorize(&roles, &request.action, &request.resource)?;

    Ok(Json(CheckResponse {
        allowed: decision.allowed,
        allow_pattern: decision.allow_pattern,
        deny_pattern: decision.deny_pattern,
        roles,
    }))
}
