//! App endpoints guarded by route policies.
//!
//! Handlers run only after the enforcement layer has allowed the request, so
//! they read the authorized resource from the request extensions rather than
//! re-deriving it.

use axum::{
    Extension, Json,
    extract::{Path, State},
};
use serde::Serialize;

use super::error::ApiError;
use crate::{
    AppState,
    authz::catalog::{self, READ},
    authz::template::Vars,
    middleware::AuthorizedResource,
    session::Session,
    store::App,
};

#[derive(Debug, Serialize)]
pub struct AppList {
    pub apps: Vec<App>,
}

/// List apps the caller may read.
///
/// Access to the list itself is governed by `AppList`; each entry is then
/// filtered through `AppRead` for the caller's roles.
#[tracing::instrument(name = "apps.list", skip_all)]
pub async fn list_apps(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
) -> Result<Json<AppList>, ApiError> {
    let apps = state.store.list_apps().await?;
    if !session.has_rbac {
        return Ok(Json(AppList { apps }));
    }

    let roles = state
        .engine
        .registry()
        .effective_roles(&session.roles, session.principal.as_deref());
    let template = catalog::APP_READ
        .template()?
        .with_delimiter(state.engine.registry().matcher().delimiter());

    let mut visible = Vec::with_capacity(apps.len());
    for app in apps {
        let vars = Vars::from([("appSlug".to_string(), app.slug.clone())]);
        let resource = match template.render(&vars) {
            Ok(resource) => resource,
            Err(e) if e.is_unresolved() => {
                tracing::warn!(app = %app.id, error = %e, "Hiding app with unusable slug");
                continue;
            }
            Err(e) => return Err(e.into()),
        };
        if state.engine.authorize(&roles, READ, &resource)?.allowed {
            visible.push(app);
        }
    }

    Ok(Json(AppList { apps: visible }))
}

#[tracing::instrument(name = "apps.get", skip(state))]
pub async fn get_app(
    State(state): State<AppState>,
    Path(app_slug): Path<String>,
) -> Result<Json<App>, ApiError> {
    state
        .store
        .get_app_by_slug(&app_slug)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("App '{app_slug}' not found")))
}

#[derive(Debug, Serialize)]
pub struct AppStatus {
    pub id: String,
    pub slug: String,
    pub resource: String,
}

#[tracing::instrument(name = "apps.status", skip(state, authorized))]
pub async fn app_status(
    State(state): State<AppState>,
    Path(app_id): Path<String>,
    authorized: Option<Extension<AuthorizedResource>>,
) -> Result<Json<AppStatus>, ApiError> {
    let app = state
        .store
        .get_app(&app_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("App '{app_id}' not found")))?;

    Ok(Json(AppStatus {
        id: app.id,
        slug: app.slug,
        resource: authorized.map(|a| a.0.resource).unwrap_or_default(),
    }))
}

#[derive(Debug, Serialize)]
pub struct Authorized {
    pub success: bool,
    pub policy: Option<&'static str>,
    pub resource: Option<String>,
}

/// Acknowledge an operation that passed enforcement.
///
/// Sessions issued before RBAC carry no authorized resource.
pub async fn authorized(authorized: Option<Extension<AuthorizedResource>>) -> Json<Authorized> {
    let authorized = authorized.map(|Extension(a)| a);
    Json(Authorized {
        success: true,
        policy: authorized.as_ref().map(|a| a.policy),
        resource: authorized.map(|a| a.resource),
    })
}
