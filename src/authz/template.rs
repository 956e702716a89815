//! Resource templates.
//!
//! Route policies name their resource with a template such as
//! `app.{{.appSlug}}.backup.`. Before a decision is made every placeholder is
//! filled from the request's path variables, falling back to an ordered list
//! of [`Getter`]s that derive missing values from the store. Other request
//! input (the query string) may key a getter lookup but never fills a
//! placeholder directly.

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;

use super::{
    TemplateError,
    pattern::{DOTTED_DELIMITER, WILDCARD},
};
use crate::store::AppStore;

pub const PLACEHOLDER_OPEN: &str = "{{";
pub const PLACEHOLDER_CLOSE: &str = "}}";

static PLACEHOLDER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\{\{\s*\.([A-Za-z_][A-Za-z0-9_]*)\s*\}\}").expect("placeholder regex is valid")
});

/// Variables available while rendering a template.
pub type Vars = HashMap<String, String>;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Part {
    Literal(String),
    Placeholder(String),
}

/// A parsed resource template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceTemplate {
    source: String,
    parts: Vec<Part>,
    delimiter: char,
}

impl ResourceTemplate {
    pub fn parse(source: &str) -> Result<Self, TemplateError> {
        let mut parts = Vec::new();
        let mut cursor = 0;

        for caps in PLACEHOLDER.captures_iter(source) {
            let Some(whole) = caps.get(0) else {
                continue;
            };
            push_literal(source, &source[cursor..whole.start()], &mut parts)?;
            parts.push(Part::Placeholder(caps[1].to_string()));
            cursor = whole.end();
        }
        push_literal(source, &source[cursor..], &mut parts)?;

        Ok(Self {
            source: source.to_string(),
            parts,
            delimiter: DOTTED_DELIMITER,
        })
    }

    /// Segment delimiter that substituted values may not contain.
    pub fn with_delimiter(mut self, delimiter: char) -> Self {
        self.delimiter = delimiter;
        self
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Placeholder names in order of appearance.
    pub fn placeholders(&self) -> impl Iterator<Item = &str> {
        self.parts.iter().filter_map(|part| match part {
            Part::Placeholder(name) => Some(name.as_str()),
            Part::Literal(_) => None,
        })
    }

    pub fn is_static(&self) -> bool {
        self.placeholders().next().is_none()
    }

    /// Substitute every placeholder from `vars`.
    ///
    /// Each value must fill exactly one segment: empty values and values
    /// containing the delimiter, a wildcard or placeholder braces are
    /// rejected.
    pub fn render(&self, vars: &Vars) -> Result<String, TemplateError> {
        let mut out = String::with_capacity(self.source.len());
        for part in &self.parts {
            match part {
                Part::Literal(text) => out.push_str(text),
                Part::Placeholder(name) => match vars.get(name) {
                    Some(value) if !value.is_empty() => {
                        self.check_value(name, value)?;
                        out.push_str(value);
                    }
                    _ => {
                        return Err(TemplateError::Unresolved {
                            template: self.source.clone(),
                            placeholder: name.clone(),
                        });
                    }
                },
            }
        }
        Ok(out)
    }

    fn check_value(&self, name: &str, value: &str) -> Result<(), TemplateError> {
        if value.contains(self.delimiter)
            || value.contains(WILDCARD)
            || value.contains(PLACEHOLDER_OPEN)
            || value.contains(PLACEHOLDER_CLOSE)
        {
            return Err(TemplateError::InvalidValue {
                template: self.source.clone(),
                placeholder: name.to_string(),
                value: value.to_string(),
            });
        }
        Ok(())
    }

    /// Render from `path_vars`, then from each getter in order.
    ///
    /// Placeholders are only ever filled from path variables or getter
    /// output. `lookup_vars` (typically the query string) is visible to
    /// getters as lookup keys, with path variables taking precedence.
    /// Getters only run when some placeholder is still missing, and the
    /// first non-empty value derived for a name is kept.
    pub async fn resolve(
        &self,
        path_vars: &Vars,
        lookup_vars: &Vars,
        getters: &[Arc<dyn Getter>],
    ) -> Result<String, TemplateError> {
        let mut resolved = path_vars.clone();
        let mut inputs = lookup_vars.clone();
        inputs.extend(path_vars.iter().map(|(k, v)| (k.clone(), v.clone())));

        for getter in getters {
            if self.missing(&resolved).is_none() {
                break;
            }
            let derived = getter.get(&inputs).await?;
            for (name, value) in derived {
                if value.is_empty() || resolved.contains_key(&name) {
                    continue;
                }
                inputs.insert(name.clone(), value.clone());
                resolved.insert(name, value);
            }
        }

        self.render(&resolved)
    }

    fn missing(&self, vars: &Vars) -> Option<&str> {
        self.placeholders()
            .find(|name| vars.get(*name).is_none_or(String::is_empty))
    }
}

fn push_literal(source: &str, text: &str, parts: &mut Vec<Part>) -> Result<(), TemplateError> {
    if text.contains(PLACEHOLDER_OPEN) || text.contains(PLACEHOLDER_CLOSE) {
        return Err(TemplateError::Malformed {
            template: source.to_string(),
            reason: format!("unrecognized placeholder near '{text}'"),
        });
    }
    if !text.is_empty() {
        parts.push(Part::Literal(text.to_string()));
    }
    Ok(())
}

/// Derives template variables from ones already known.
///
/// Returning an empty map means the getter had nothing to contribute; a
/// missing record is not an error.
#[async_trait]
pub trait Getter: Send + Sync {
    fn name(&self) -> &'static str;

    async fn get(&self, vars: &Vars) -> Result<Vars, TemplateError>;
}

/// `appId` → `appSlug`.
pub struct AppIdGetter {
    store: Arc<dyn AppStore>,
}

impl AppIdGetter {
    pub fn new(store: Arc<dyn AppStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Getter for AppIdGetter {
    fn name(&self) -> &'static str {
        "app_id"
    }

    async fn get(&self, vars: &Vars) -> Result<Vars, TemplateError> {
        let Some(app_id) = vars.get("appId") else {
            return Ok(Vars::new());
        };
        let app = self
            .store
            .get_app(app_id)
            .await
            .map_err(|source| TemplateError::Lookup {
                getter: self.name(),
                source,
            })?;
        Ok(app
            .map(|app| Vars::from([("appSlug".to_string(), app.slug)]))
            .unwrap_or_default())
    }
}

/// Which request variable a [`SupportBundleGetter`] keys on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BundleKey {
    Id,
    Slug,
}

impl BundleKey {
    fn var(self) -> &'static str {
        match self {
            Self::Id => "bundleId",
            Self::Slug => "bundleSlug",
        }
    }
}

/// Support bundle id or slug → owning app's `appSlug`.
pub struct SupportBundleGetter {
    store: Arc<dyn AppStore>,
    key: BundleKey,
}

impl SupportBundleGetter {
    pub fn new(store: Arc<dyn AppStore>, key: BundleKey) -> Self {
        Self { store, key }
    }
}

#[async_trait]
impl Getter for SupportBundleGetter {
    fn name(&self) -> &'static str {
        match self.key {
            BundleKey::Id => "support_bundle_id",
            BundleKey::Slug => "support_bundle_slug",
        }
    }

    async fn get(&self, vars: &Vars) -> Result<Vars, TemplateError> {
        let Some(bundle_ref) = vars.get(self.key.var()) else {
            return Ok(Vars::new());
        };
        let lookup = |source| TemplateError::Lookup {
            getter: self.name(),
            source,
        };

        let Some(bundle) = self
            .store
            .get_support_bundle(bundle_ref)
            .await
            .map_err(lookup)?
        else {
            return Ok(Vars::new());
        };
        let Some(app) = self.store.get_app(&bundle.app_id).await.map_err(lookup)? else {
            tracing::warn!(
                bundle = %bundle.id,
                app_id = %bundle.app_id,
                "Support bundle references missing app"
            );
            return Ok(Vars::new());
        };

        Ok(Vars::from([("appSlug".to_string(), app.slug)]))
    }
}
