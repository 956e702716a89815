//! Session resolution.
//!
//! Authentication happens upstream of this crate. By the time a request
//! reaches a protected route its bearer token has been exchanged for a
//! [`Session`] carrying the caller's role ids, which the session middleware
//! places in the request extensions.

use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    extract::{Request, State},
    http::{HeaderMap, header::AUTHORIZATION},
    middleware::Next,
    response::Response,
};
use dashmap::DashMap;
use serde::Serialize;

use crate::{AppState, config::SessionConfig};

/// An authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Session {
    pub id: String,
    /// Principal name used to select groups.
    pub principal: Option<String>,
    pub roles: Vec<String>,
    /// Sessions without RBAC predate role assignment and bypass enforcement.
    pub has_rbac: bool,
}

impl Session {
    pub fn new(id: impl Into<String>, roles: Vec<String>) -> Self {
        Self {
            id: id.into(),
            principal: None,
            roles,
            has_rbac: true,
        }
    }

    pub fn with_principal(mut self, principal: impl Into<String>) -> Self {
        self.principal = Some(principal.into());
        self
    }

    pub fn without_rbac(mut self) -> Self {
        self.has_rbac = false;
        self
    }
}

#[async_trait]
pub trait SessionResolver: Send + Sync {
    /// Resolve the caller's session, or `None` when unauthenticated.
    async fn resolve(&self, headers: &HeaderMap) -> Option<Session>;
}

/// Bearer token → session map.
#[derive(Debug, Default)]
pub struct TokenSessionStore {
    sessions: DashMap<String, Session>,
}

impl TokenSessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(sessions: &[SessionConfig]) -> Self {
        let store = Self::new();
        for config in sessions {
            let session = Session {
                id: config.id.clone().unwrap_or_else(|| config.token.clone()),
                principal: config.principal.clone(),
                roles: config.roles.clone(),
                has_rbac: config.has_rbac,
            };
            store.insert(config.token.clone(), session);
        }
        store
    }

    pub fn insert(&self, token: impl Into<String>, session: Session) {
        self.sessions.insert(token.into(), session);
    }

    pub fn revoke(&self, token: &str) -> Option<Session> {
        self.sessions.remove(token).map(|(_, session)| session)
    }

    pub fn into_shared(self) -> Arc<dyn SessionResolver> {
        Arc::new(self)
    }
}

/// Accepts `Authorization: Bearer <token>` or a bare token value.
fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?.trim();
    let token = value
        .strip_prefix("Bearer ")
        .or_else(|| value.strip_prefix("bearer "))
        .unwrap_or(value)
        .trim();
    (!token.is_empty()).then_some(token)
}

#[async_trait]
impl SessionResolver for TokenSessionStore {
    async fn resolve(&self, headers: &HeaderMap) -> Option<Session> {
        let token = bearer_token(headers)?;
        self.sessions.get(token).map(|entry| entry.value().clone())
    }
}

/// Attach the caller's [`Session`] to the request, if any.
///
/// Never rejects; protected routes deny requests that arrive without one.
pub async fn session_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Response {
    if let Some(session) = state.sessions.resolve(req.headers()).await {
        tracing::debug!(session_id = %session.id, roles = ?session.roles, "Resolved session");
        req.extensions_mut().insert(session);
    }
    next.run(req).await
}
