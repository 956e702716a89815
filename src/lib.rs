//! Resource-pattern RBAC for the KOTS admin console.
//!
//! The crate is split into a pure authorization core ([`authz`]) and the HTTP
//! plumbing that enforces it on axum routes ([`middleware`], [`routes`]).

use std::sync::Arc;

pub mod authz;
pub mod config;
pub mod middleware;
#[cfg(feature = "server")]
pub mod observability;
pub mod routes;
pub mod session;
pub mod store;

use authz::{AccessEngine, AuthzError, RbacRegistry, catalog};
use config::ConsoleConfig;
use session::{SessionResolver, TokenSessionStore};
use store::{AppStore, MemoryStore};

/// Shared application state.
///
/// Everything here is built once at startup and read-only afterwards.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<AccessEngine>,
    pub store: Arc<dyn AppStore>,
    pub sessions: Arc<dyn SessionResolver>,
}

/// Build the registry from configuration, validating the route catalog and
/// every configured pattern.
pub fn build_engine(config: &ConsoleConfig) -> Result<AccessEngine, AuthzError> {
    catalog::validate()?;
    let registry = RbacRegistry::from_config(&config.rbac)?;
    Ok(AccessEngine::new(Arc::new(registry)).with_mode(config.rbac.evaluation))
}

pub fn build_state(config: &ConsoleConfig) -> Result<AppState, AuthzError> {
    let engine = build_engine(config)?;
    let store = MemoryStore::seeded(
        config.store.apps.clone(),
        config.store.support_bundles.clone(),
    );

    Ok(AppState {
        engine: Arc::new(engine),
        store: store.into_shared(),
        sessions: TokenSessionStore::from_config(&config.sessions).into_shared(),
    })
}
