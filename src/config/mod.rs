//! Configuration for the admin console authorization service.
//!
//! The service is configured via a TOML file, with support for environment
//! variable interpolation using `${VAR_NAME}` syntax.
//!
//! # Example
//!
//! ```toml
//! [server]
//! host = "0.0.0.0"
//! port = 8800
//!
//! [rbac]
//! evaluation = "specificity"
//!
//! [[rbac.roles]]
//! id = "support"
//! name = "Support"
//! policies = [{ type = "rule", action = "read", resource = "app.*.supportbundle." }]
//!
//! [[sessions]]
//! token = "${SUPPORT_TOKEN}"
//! roles = ["support"]
//! ```

mod observability;
mod rbac;
mod server;
mod store;

use std::{collections::HashSet, path::Path};

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;

pub use observability::*;
pub use rbac::*;
pub use server::*;
pub use store::*;

/// Root configuration.
///
/// Every section is optional; an empty file yields a server with only the
/// built-in `cluster-admin` role and no sessions.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConsoleConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub observability: ObservabilityConfig,

    #[serde(default)]
    pub rbac: RbacConfig,

    /// Seed data for the in-memory app store.
    #[serde(default)]
    pub store: StoreConfig,

    /// Bearer tokens accepted by the session resolver.
    #[serde(default)]
    pub sessions: Vec<SessionConfig>,
}

impl ConsoleConfig {
    /// Load configuration from a TOML file.
    ///
    /// Environment variables in the format `${VAR_NAME}` are expanded.
    /// Missing variables cause an error.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::Io(e, path.as_ref().to_path_buf()))?;

        Self::from_str(&contents)
    }

    /// Parse configuration from a TOML string.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(contents: &str) -> Result<Self, ConfigError> {
        let expanded = expand_env_vars(contents)?;
        let config: ConsoleConfig = toml::from_str(&expanded).map_err(ConfigError::Parse)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        self.rbac.validate()?;

        let mut tokens = HashSet::new();
        for session in &self.sessions {
            if session.token.trim().is_empty() {
                return Err(ConfigError::Validation(
                    "sessions: token must not be empty".into(),
                ));
            }
            if !tokens.insert(session.token.as_str()) {
                return Err(ConfigError::Validation(
                    "sessions: duplicate token".into(),
                ));
            }
        }

        let app_ids: HashSet<&str> = self.store.apps.iter().map(|a| a.id.as_str()).collect();
        for bundle in &self.store.support_bundles {
            if !app_ids.contains(bundle.app_id.as_str()) {
                tracing::warn!(
                    bundle = %bundle.id,
                    app_id = %bundle.app_id,
                    "Support bundle references an app that is not in the store"
                );
            }
        }

        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {1}: {0}")]
    Io(std::io::Error, std::path::PathBuf),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Environment variable not found: {0}")]
    EnvVarNotFound(String),

    #[error("Configuration validation error: {0}")]
    Validation(String),
}

static ENV_VAR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$\{([^}]+)\}").expect("Invalid regex"));

/// Expand `${VAR}` references, leaving anything after a `#` untouched.
fn expand_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut result = String::with_capacity(input.len());

    for line in input.lines() {
        let comment_pos = line.find('#');
        let mut last_end = 0;

        for cap in ENV_VAR.captures_iter(line) {
            let Some(whole) = cap.get(0) else {
                continue;
            };
            if comment_pos.is_some_and(|pos| whole.start() >= pos) {
                continue;
            }

            result.push_str(&line[last_end..whole.start()]);
            let var_name = &cap[1];
            let value = std::env::var(var_name)
                .map_err(|_| ConfigError::EnvVarNotFound(var_name.to_string()))?;
            result.push_str(&value);
            last_end = whole.end();
        }

        result.push_str(&line[last_end..]);
        result.push('\n');
    }

    if !input.ends_with('\n') && result.ends_with('\n') {
        result.pop();
    }

    Ok(result)
}
