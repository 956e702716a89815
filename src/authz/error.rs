//! Authorization errors.

use thiserror::Error;

use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum AuthzError {
    #[error("Invalid pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("Role '{role}' references unknown policy '{policy}'")]
    UnknownPolicy { role: String, policy: String },

    #[error("Group '{group}' references unknown role '{role}'")]
    UnknownRole { group: String, role: String },

    #[error("Duplicate {kind} id '{id}'")]
    Duplicate { kind: &'static str, id: String },

    #[error("Resource '{0}' still contains a template placeholder")]
    UnrenderedResource(String),

    #[error("Template error: {0}")]
    Template(#[from] TemplateError),
}

impl AuthzError {
    pub fn invalid_pattern(pattern: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidPattern {
            pattern: pattern.into(),
            reason: reason.into(),
        }
    }
}

/// Errors raised while parsing or resolving a resource template.
#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("Malformed template '{template}': {reason}")]
    Malformed { template: String, reason: String },

    #[error("Could not resolve '{placeholder}' for template '{template}'")]
    Unresolved {
        template: String,
        placeholder: String,
    },

    #[error("Value '{value}' for '{placeholder}' does not fit one segment of '{template}'")]
    InvalidValue {
        template: String,
        placeholder: String,
        value: String,
    },

    #[error("Lookup failed in getter '{getter}': {source}")]
    Lookup {
        getter: &'static str,
        #[source]
        source: StoreError,
    },
}

impl TemplateError {
    /// Whether this error should be reported as a denial rather than a
    /// server failure.
    pub fn is_unresolved(&self) -> bool {
        matches!(self, Self::Unresolved { .. } | Self::InvalidValue { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_variants() {
        let errors = vec![
            AuthzError::invalid_pattern("a//b", "empty segment"),
            AuthzError::UnknownPolicy {
                role: "viewer".to_string(),
                policy: "missing".to_string(),
            },
            AuthzError::UnknownRole {
                group: "*".to_string(),
                role: "ghost".to_string(),
            },
            AuthzError::Duplicate {
                kind: "role",
                id: "cluster-admin".to_string(),
            },
            AuthzError::UnrenderedResource("app.{{.appSlug}}.".to_string()),
        ];

        for error in errors {
            assert!(!error.to_string().is_empty());
        }
    }

    #[test]
    fn test_template_error_classification() {
        let unresolved = TemplateError::Unresolved {
            template: "app.{{.appSlug}}.".to_string(),
            placeholder: "appSlug".to_string(),
        };
        assert!(unresolved.is_unresolved());

        let invalid = TemplateError::InvalidValue {
            template: "app.{{.appSlug}}.".to_string(),
            placeholder: "appSlug".to_string(),
            value: "*".to_string(),
        };
        assert!(invalid.is_unresolved());

        let lookup = TemplateError::Lookup {
            getter: "app_id",
            source: StoreError::Unavailable("connection refused".to_string()),
        };
        assert!(!lookup.is_unresolved());
        assert!(lookup.to_string().contains("app_id"));
    }
}
