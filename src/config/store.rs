use serde::Deserialize;

use crate::store::{App, SupportBundle};

/// Seed data for the in-memory store.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StoreConfig {
    #[serde(default)]
    pub apps: Vec<App>,

    #[serde(default)]
    pub support_bundles: Vec<SupportBundle>,
}

/// A bearer token and the session it resolves to.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SessionConfig {
    pub token: String,

    /// Session id reported in logs. Defaults to the token.
    #[serde(default)]
    pub id: Option<String>,

    /// Principal name used to select groups.
    #[serde(default)]
    pub principal: Option<String>,

    #[serde(default)]
    pub roles: Vec<String>,

    /// `false` for sessions issued before RBAC, which bypass enforcement.
    #[serde(default = "default_has_rbac")]
    pub has_rbac: bool,
}

fn default_has_rbac() -> bool {
    true
}
