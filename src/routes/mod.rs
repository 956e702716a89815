//! HTTP routes.
//!
//! Every `/api/v1` route except the manual check is wrapped by a catalog
//! policy; the session middleware runs first for all of them.

pub mod apps;
pub mod error;
pub mod health;
pub mod rbac;

use axum::{
    Router,
    middleware::from_fn_with_state,
    routing::{get, post, put},
};
use tower_http::trace::TraceLayer;

use crate::{
    AppState,
    authz::{TemplateError, catalog},
    middleware::protect,
    session::session_middleware,
};

fn api_routes(state: &AppState) -> Result<Router<AppState>, TemplateError> {
    Ok(Router::new()
        .route(
            "/apps",
            protect(get(apps::list_apps), state, &catalog::APP_LIST)?,
        )
        .route(
            "/app/{appSlug}",
            protect(get(apps::get_app), state, &catalog::APP_READ)?
                .merge(protect(put(apps::authorized), state, &catalog::APP_UPDATE)?),
        )
        .route(
            "/app-by-id/{appId}/status",
            protect(get(apps::app_status), state, &catalog::APP_STATUS_READ)?,
        )
        .route(
            "/app/{appSlug}/backups",
            protect(get(apps::authorized), state, &catalog::APP_BACKUP_READ)?,
        )
        .route(
            "/app/{appSlug}/backup",
            protect(post(apps::authorized), state, &catalog::APP_BACKUP_WRITE)?,
        )
        .route(
            "/app/{appSlug}/restore/{restoreName}",
            protect(get(apps::authorized), state, &catalog::APP_RESTORE_READ)?
                .merge(protect(post(apps::authorized), state, &catalog::APP_RESTORE_WRITE)?),
        )
        .route(
            "/app/{appSlug}/downstream/logs",
            protect(get(apps::authorized), state, &catalog::APP_DOWNSTREAM_LOGS_READ)?,
        )
        .route(
            "/app/{appSlug}/downstream/filetree",
            protect(
                get(apps::authorized),
                state,
                &catalog::APP_DOWNSTREAM_FILETREE_READ,
            )?,
        )
        .route(
            "/troubleshoot/supportbundle/{bundleId}",
            protect(get(apps::authorized), state, &catalog::APP_SUPPORTBUNDLE_READ)?,
        )
        .route(
            "/redact/spec",
            protect(get(apps::authorized), state, &catalog::REDACTOR_READ)?
                .merge(protect(put(apps::authorized), state, &catalog::REDACTOR_WRITE)?),
        )
        .route("/rbac/check", post(rbac::check_access)))
}

/// Build the application router.
pub fn router(state: AppState) -> Result<Router, TemplateError> {
    let api = api_routes(&state)?;

    Ok(Router::new()
        .route("/healthz", get(health::health_check))
        .nest("/api/v1", api)
        .layer(from_fn_with_state(state.clone(), session_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state))
}
