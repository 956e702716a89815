//! Authorization middleware enforcing route policies.
//!
//! Each protected route carries a [`PolicyGuard`] built from a catalog entry.
//! Per request the guard:
//!
//! 1. Requires a [`Session`] in the request extensions (403 otherwise)
//! 2. Skips enforcement for sessions issued before RBAC existed
//! 3. Resolves the resource template from path variables and getters; the
//!    query string only supplies getter lookup keys
//! 4. Asks the [`AccessEngine`] with the session's effective roles
//!
//! Nothing is cached between requests.

use std::sync::Arc;

use axum::{
    Json, RequestExt,
    extract::{Path, Query, Request, State},
    http::StatusCode,
    middleware::{Next, from_fn_with_state},
    response::{IntoResponse, Response},
    routing::MethodRouter,
};
use serde::Serialize;

use crate::{
    AppState,
    authz::{
        AccessEngine, Getter, ResourceTemplate, TemplateError,
        catalog::RoutePolicy,
        template::Vars,
    },
    session::Session,
};

/// The resource a request was authorized against, for handlers that need it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizedResource {
    pub policy: &'static str,
    pub action: &'static str,
    pub resource: String,
}

/// Per-route enforcement state.
#[derive(Clone)]
pub struct PolicyGuard {
    engine: Arc<AccessEngine>,
    policy: &'static RoutePolicy,
    template: Arc<ResourceTemplate>,
    getters: Arc<[Arc<dyn Getter>]>,
}

impl PolicyGuard {
    pub fn new(state: &AppState, policy: &'static RoutePolicy) -> Result<Self, TemplateError> {
        Ok(Self {
            engine: state.engine.clone(),
            policy,
            template: Arc::new(
                policy
                    .template()?
                    .with_delimiter(state.engine.registry().matcher().delimiter()),
            ),
            getters: policy.build_getters(&state.store).into(),
        })
    }

    pub fn policy(&self) -> &'static RoutePolicy {
        self.policy
    }
}

/// Wrap `route` so it only runs when `policy` allows the caller.
pub fn protect<S>(
    route: MethodRouter<S>,
    state: &AppState,
    policy: &'static RoutePolicy,
) -> Result<MethodRouter<S>, TemplateError>
where
    S: Clone + Send + Sync + 'static,
{
    let guard = PolicyGuard::new(state, policy)?;
    Ok(route.route_layer(from_fn_with_state(guard, enforce_policy)))
}

/// Path variables and query variables, kept apart.
async fn request_vars(req: &mut Request) -> (Vars, Vars) {
    let path = match req.extract_parts::<Path<Vars>>().await {
        Ok(Path(path)) => path,
        Err(_) => Vars::new(),
    };
    let query = match req.extract_parts::<Query<Vars>>().await {
        Ok(Query(query)) => query,
        Err(_) => Vars::new(),
    };
    (path, query)
}

pub async fn enforce_policy(
    State(guard): State<PolicyGuard>,
    mut req: Request,
    next: Next,
) -> Result<Response, AuthzResponse> {
    let policy = guard.policy;

    let Some(session) = req.extensions().get::<Session>().cloned() else {
        tracing::debug!(policy = policy.name, "Rejecting request without a session");
        return Err(AuthzResponse::Forbidden("Not authenticated".to_string()));
    };

    if !session.has_rbac {
        return Ok(next.run(req).await);
    }

    let (path_vars, query_vars) = request_vars(&mut req).await;
    let resource = match guard
        .template
        .resolve(&path_vars, &query_vars, &guard.getters)
        .await
    {
        Ok(resource) => resource,
        Err(e) if e.is_unresolved() => {
            tracing::warn!(
                policy = policy.name,
                session_id = %session.id,
                error = %e,
                "Could not resolve resource for request"
            );
            return Err(AuthzResponse::Forbidden(format!(
                "Access denied to {}",
                guard.template.as_str()
            )));
        }
        Err(e) => {
            tracing::error!(policy = policy.name, error = %e, "Failed to resolve resource");
            return Err(AuthzResponse::InternalError(
                "Failed to evaluate authorization".to_string(),
            ));
        }
    };

    let roles = guard
        .engine
        .registry()
        .effective_roles(&session.roles, session.principal.as_deref());

    let decision = match guard.engine.authorize(&roles, policy.action, &resource) {
        Ok(decision) => decision,
        Err(e) => {
            tracing::error!(policy = policy.name, error = %e, "Authorization failed");
            return Err(AuthzResponse::InternalError(
                "Failed to evaluate authorization".to_string(),
            ));
        }
    };

    if !decision.allowed {
        tracing::warn!(
            policy = policy.name,
            session_id = %session.id,
            action = policy.action,
            resource = %resource,
            deny_pattern = ?decision.deny_pattern,
            "Access denied"
        );
        return Err(AuthzResponse::Forbidden(format!("Access denied to {resource}")));
    }

    req.extensions_mut().insert(AuthorizedResource {
        policy: policy.name,
        action: policy.action,
        resource,
    });

    Ok(next.run(req).await)
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    success: bool,
}

/// Short-circuit responses from the authorization layer.
#[derive(Debug)]
pub enum AuthzResponse {
    Forbidden(String),
    InternalError(String),
}

impl IntoResponse for AuthzResponse {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
            Self::InternalError(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = ErrorBody {
            error: message,
            success: false,
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use axum::{
        Extension, Router,
        body::Body,
        http::{Request as HttpRequest, StatusCode},
        routing::get,
    };
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    use super::*;
    use crate::{
        authz::{
            EvaluationMode, PatternMatcher, Policy, RbacRegistry, RoleDefinition, catalog,
            pattern::DOTTED_DELIMITER,
        },
        session::TokenSessionStore,
        store::{App, AppStore, MemoryStore, StoreError, StoreResult, SupportBundle},
    };

    fn registry() -> RbacRegistry {
        RbacRegistry::builder(PatternMatcher::new(DOTTED_DELIMITER))
            .role(
                RoleDefinition::new("backup-reader", "Backup Reader")
                    .with_policy(Policy::allow("read", "app.*.backup.")),
            )
            .role(
                RoleDefinition::new("no-filetree", "App Viewer")
                    .with_policy(Policy::pattern_list(
                        ["app.my-app.**"],
                        ["app.*.downstream.filetree."],
                    )),
            )
            .build()
            .unwrap()
    }

    fn state_with_store(store: Arc<dyn AppStore>) -> AppState {
        AppState {
            engine: Arc::new(
                AccessEngine::new(Arc::new(registry())).with_mode(EvaluationMode::Specificity),
            ),
            store,
            sessions: TokenSessionStore::new().into_shared(),
        }
    }

    fn state() -> AppState {
        let store = MemoryStore::seeded(
            vec![App {
                id: "2a1b".to_string(),
                slug: "my-app".to_string(),
                name: "My App".to_string(),
            }],
            vec![SupportBundle {
                id: "sb-1".to_string(),
                slug: "bundle".to_string(),
                app_id: "2a1b".to_string(),
            }],
        );
        state_with_store(store.into_shared())
    }

    async fn ok_handler(resource: Option<Extension<AuthorizedResource>>) -> String {
        resource.map(|r| r.0.resource).unwrap_or_default()
    }

    fn app(state: &AppState, path: &str, policy: &'static RoutePolicy, session: Option<Session>) -> Router {
        let router = Router::new()
            .route(path, protect(get(ok_handler), state, policy).unwrap())
            .with_state(state.clone());
        match session {
            Some(session) => router.layer(Extension(session)),
            None => router,
        }
    }

    async fn send(router: Router, uri: &str) -> (StatusCode, String) {
        let response = router
            .oneshot(HttpRequest::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    fn session(roles: &[&str]) -> Session {
        Session::new("s1", roles.iter().map(|r| r.to_string()).collect())
    }

    #[tokio::test]
    async fn test_missing_session_is_forbidden() {
        let state = state();
        let router = app(&state, "/app/{appSlug}/backups", &catalog::APP_BACKUP_READ, None);
        let (status, body) = send(router, "/app/my-app/backups").await;

        assert_eq!(status, StatusCode::FORBIDDEN);
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["error"], "Not authenticated");
    }

    #[tokio::test]
    async fn test_session_without_rbac_bypasses_enforcement() {
        let state = state();
        let router = app(
            &state,
            "/app/{appSlug}/backups",
            &catalog::APP_BACKUP_READ,
            Some(session(&[]).without_rbac()),
        );
        let (status, body) = send(router, "/app/my-app/backups").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "");
    }

    #[tokio::test]
    async fn test_allowed_request_reaches_handler() {
        let state = state();
        let router = app(
            &state,
            "/app/{appSlug}/backups",
            &catalog::APP_BACKUP_READ,
            Some(session(&["backup-reader"])),
        );
        let (status, body) = send(router, "/app/my-app/backups").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "app.my-app.backup.");
    }

    #[tokio::test]
    async fn test_denied_request_names_resource() {
        let state = state();
        let router = app(
            &state,
            "/app/{appSlug}/backup",
            &catalog::APP_BACKUP_WRITE,
            Some(session(&["backup-reader"])),
        );
        let (status, body) = send(router, "/app/my-app/backup").await;

        assert_eq!(status, StatusCode::FORBIDDEN);
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["error"], "Access denied to app.my-app.backup.");
        assert_eq!(json["success"], false);
    }

    #[tokio::test]
    async fn test_more_specific_deny_blocks_filetree() {
        let state = state();
        let viewer = Some(session(&["no-filetree"]));

        let router = app(
            &state,
            "/app/{appSlug}/downstream/logs",
            &catalog::APP_DOWNSTREAM_LOGS_READ,
            viewer.clone(),
        );
        assert_eq!(send(router, "/app/my-app/downstream/logs").await.0, StatusCode::OK);

        let router = app(
            &state,
            "/app/{appSlug}/downstream/filetree",
            &catalog::APP_DOWNSTREAM_FILETREE_READ,
            viewer,
        );
        assert_eq!(
            send(router, "/app/my-app/downstream/filetree").await.0,
            StatusCode::FORBIDDEN
        );
    }

    #[tokio::test]
    async fn test_getter_resolves_app_id() {
        let state = state();
        let router = app(
            &state,
            "/app-by-id/{appId}/status",
            &catalog::APP_STATUS_READ,
            Some(session(&["cluster-admin"])),
        );
        let (status, body) = send(router, "/app-by-id/2a1b/status").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "app.my-app.status.");
    }

    #[tokio::test]
    async fn test_query_variables_feed_getters() {
        let state = state();
        let router = app(
            &state,
            "/supportbundle",
            &catalog::APP_SUPPORTBUNDLE_READ,
            Some(session(&["cluster-admin"])),
        );
        let (status, body) = send(router, "/supportbundle?bundleSlug=bundle").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "app.my-app.supportbundle.");
    }

    #[tokio::test]
    async fn test_query_cannot_override_derived_placeholder() {
        let state = state();
        let router = || {
            app(
                &state,
                "/app-by-id/{appId}/status",
                &catalog::APP_STATUS_READ,
                Some(session(&["no-filetree"])),
            )
        };

        let (status, _) = send(router(), "/app-by-id/unknown/status?appSlug=my-app").await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, body) = send(router(), "/app-by-id/2a1b/status?appSlug=other").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "app.my-app.status.");
    }

    #[tokio::test]
    async fn test_query_cannot_fill_placeholder_without_getter() {
        let state = state();
        let router = app(
            &state,
            "/backups",
            &catalog::APP_BACKUP_READ,
            Some(session(&["backup-reader"])),
        );
        let (status, body) = send(router, "/backups?appSlug=my-app").await;

        assert_eq!(status, StatusCode::FORBIDDEN);
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["error"], "Access denied to app.{{.appSlug}}.backup.");
    }

    #[tokio::test]
    async fn test_path_value_spanning_segments_is_forbidden() {
        let state = state();
        let viewer = Some(session(&["no-filetree"]));

        for uri in [
            "/app/my-app.x/downstream/filetree",
            "/app/%2A/downstream/filetree",
        ] {
            let router = app(
                &state,
                "/app/{appSlug}/downstream/filetree",
                &catalog::APP_DOWNSTREAM_FILETREE_READ,
                viewer.clone(),
            );
            let (status, _) = send(router, uri).await;
            assert_eq!(status, StatusCode::FORBIDDEN, "{uri}");
        }
    }

    #[tokio::test]
    async fn test_unresolvable_resource_is_forbidden() {
        let state = state();
        let router = app(
            &state,
            "/app-by-id/{appId}/status",
            &catalog::APP_STATUS_READ,
            Some(session(&["cluster-admin"])),
        );
        let (status, _) = send(router, "/app-by-id/unknown/status").await;

        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    struct OfflineStore;

    #[async_trait]
    impl AppStore for OfflineStore {
        async fn get_app(&self, _id: &str) -> StoreResult<Option<App>> {
            Err(StoreError::Unavailable("connection refused".to_string()))
        }

        async fn get_app_by_slug(&self, _slug: &str) -> StoreResult<Option<App>> {
            Err(StoreError::Unavailable("connection refused".to_string()))
        }

        async fn list_apps(&self) -> StoreResult<Vec<App>> {
            Err(StoreError::Unavailable("connection refused".to_string()))
        }

        async fn get_support_bundle(&self, _id: &str) -> StoreResult<Option<SupportBundle>> {
            Err(StoreError::Unavailable("connection refused".to_string()))
        }
    }

    #[tokio::test]
    async fn test_store_failure_is_internal_error() {
        let state = state_with_store(Arc::new(OfflineStore));
        let router = app(
            &state,
            "/app-by-id/{appId}/status",
            &catalog::APP_STATUS_READ,
            Some(session(&["cluster-admin"])),
        );
        let (status, body) = send(router, "/app-by-id/2a1b/status").await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["success"], false);
        assert!(!json["error"].as_str().unwrap().contains("connection refused"));
    }
}
