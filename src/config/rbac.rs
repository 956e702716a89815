use serde::Deserialize;

use super::ConfigError;
use crate::authz::{
    EvaluationMode, Group, MatchStrategy, NamedPolicy, PatternMatcher, RoleDefinition,
    pattern::{DEEP_WILDCARD, DOTTED_DELIMITER},
};

/// Role-based access control configuration.
///
/// Roles listed here are added to the built-in `cluster-admin` role. Patterns
/// are checked when the registry is built, not while parsing.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RbacConfig {
    /// How conflicting allow/deny matches are settled.
    #[serde(default)]
    pub evaluation: EvaluationMode,

    /// Matching algorithm for `**` segments.
    #[serde(default)]
    pub matcher: MatchStrategy,

    /// Segment delimiter for resource paths.
    #[serde(default = "default_delimiter")]
    pub delimiter: char,

    /// Named policies that roles may reference through `refs`.
    #[serde(default)]
    pub policies: Vec<NamedPolicy>,

    #[serde(default)]
    pub roles: Vec<RoleDefinition>,

    #[serde(default)]
    pub groups: Vec<Group>,
}

impl Default for RbacConfig {
    fn default() -> Self {
        Self {
            evaluation: EvaluationMode::default(),
            matcher: MatchStrategy::default(),
            delimiter: default_delimiter(),
            policies: Vec::new(),
            roles: Vec::new(),
            groups: Vec::new(),
        }
    }
}

fn default_delimiter() -> char {
    DOTTED_DELIMITER
}

impl RbacConfig {
    pub fn matcher(&self) -> PatternMatcher {
        PatternMatcher::new(self.delimiter).with_strategy(self.matcher)
    }

    pub(super) fn validate(&self) -> Result<(), ConfigError> {
        let d = self.delimiter;
        if d.is_whitespace() || DEEP_WILDCARD.contains(d) || d == '{' || d == '}' {
            return Err(ConfigError::Validation(format!(
                "rbac.delimiter: '{d}' cannot be used as a segment delimiter"
            )));
        }
        for group in &self.groups {
            if group.selector.trim().is_empty() {
                return Err(ConfigError::Validation(
                    "rbac.groups: selector must not be empty".into(),
                ));
            }
        }
        Ok(())
    }
}
