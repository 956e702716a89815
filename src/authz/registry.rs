//! Role registry.
//!
//! The registry is built once at startup and never mutated afterwards. It
//! holds:
//!
//! - reusable named policies that roles may reference by id
//! - roles, including the built-in `cluster-admin` role
//! - groups that hand roles to principals
//!
//! Every pattern is validated while building, so a registry that exists only
//! holds patterns the matcher can evaluate.
//!
//! # Usage
//!
//! ```rust
//! use kotsadm_rbac::authz::{Policy, RbacRegistry, RoleDefinition, PatternMatcher};
//!
//! let registry = RbacRegistry::builder(PatternMatcher::new('.'))
//!     .role(
//!         RoleDefinition::new("support", "Support")
//!             .with_policy(Policy::allow("read", "app.*.supportbundle.")),
//!     )
//!     .build()
//!     .unwrap();
//!
//! assert!(registry.role("support").is_some());
//! assert!(registry.role("cluster-admin").is_some());
//! ```

use std::collections::{HashMap, HashSet};

use serde::Deserialize;

use super::{
    AuthzError, Group, NamedPolicy, Policy, Role,
    catalog::{CLUSTER_ADMIN_ROLE_ID, cluster_admin_role},
    pattern::PatternMatcher,
    template::{PLACEHOLDER_CLOSE, PLACEHOLDER_OPEN},
};
use crate::config::RbacConfig;

/// A role as written in configuration: inline policies plus references to
/// named policies.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RoleDefinition {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub policies: Vec<Policy>,
    /// Ids of [`NamedPolicy`] entries appended after the inline policies.
    #[serde(default)]
    pub refs: Vec<String>,
}

impl RoleDefinition {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: None,
            policies: Vec::new(),
            refs: Vec::new(),
        }
    }

    pub fn with_policy(mut self, policy: Policy) -> Self {
        self.policies.push(policy);
        self
    }

    pub fn with_ref(mut self, policy_id: impl Into<String>) -> Self {
        self.refs.push(policy_id.into());
        self
    }
}

/// Immutable set of roles and groups.
#[derive(Debug, Clone)]
pub struct RbacRegistry {
    matcher: PatternMatcher,
    roles: HashMap<String, Role>,
    groups: Vec<Group>,
}

impl RbacRegistry {
    pub fn builder(matcher: PatternMatcher) -> RbacRegistryBuilder {
        RbacRegistryBuilder {
            matcher,
            policies: Vec::new(),
            roles: Vec::new(),
            groups: Vec::new(),
        }
    }

    /// Registry holding only the built-in roles.
    pub fn builtin(matcher: PatternMatcher) -> Self {
        let admin = cluster_admin_role();
        Self {
            matcher,
            roles: HashMap::from([(admin.id.clone(), admin)]),
            groups: Vec::new(),
        }
    }

    pub fn from_config(config: &RbacConfig) -> Result<Self, AuthzError> {
        let mut builder = Self::builder(config.matcher());
        for policy in &config.policies {
            builder = builder.named_policy(policy.clone());
        }
        for role in &config.roles {
            builder = builder.role(role.clone());
        }
        for group in &config.groups {
            builder = builder.group(group.clone());
        }
        builder.build()
    }

    pub fn matcher(&self) -> &PatternMatcher {
        &self.matcher
    }

    pub fn role(&self, id: &str) -> Option<&Role> {
        self.roles.get(id)
    }

    /// Role ids in sorted order.
    pub fn role_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.roles.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    pub fn groups(&self) -> &[Group] {
        &self.groups
    }

    /// Every policy held by the given roles, in role order.
    ///
    /// Unknown role ids contribute nothing.
    pub fn policies_for_roles(&self, role_ids: &[String]) -> Vec<&Policy> {
        let mut policies = Vec::new();
        for id in role_ids {
            match self.roles.get(id) {
                Some(role) => policies.extend(role.policies.iter()),
                None => tracing::warn!(role = %id, "Session references unknown role"),
            }
        }
        policies
    }

    /// Session roles followed by roles from every group matching `principal`,
    /// without duplicates.
    pub fn effective_roles(&self, session_roles: &[String], principal: Option<&str>) -> Vec<String> {
        let group_roles = self
            .groups
            .iter()
            .filter(|group| group.applies_to(principal))
            .flat_map(|group| group.roles.iter());

        let mut seen = HashSet::new();
        session_roles
            .iter()
            .chain(group_roles)
            .filter(|id| seen.insert(*id))
            .cloned()
            .collect()
    }
}

pub struct RbacRegistryBuilder {
    matcher: PatternMatcher,
    policies: Vec<NamedPolicy>,
    roles: Vec<RoleDefinition>,
    groups: Vec<Group>,
}

impl RbacRegistryBuilder {
    pub fn named_policy(mut self, policy: NamedPolicy) -> Self {
        self.policies.push(policy);
        self
    }

    pub fn role(mut self, role: RoleDefinition) -> Self {
        self.roles.push(role);
        self
    }

    pub fn group(mut self, group: Group) -> Self {
        self.groups.push(group);
        self
    }

    pub fn build(self) -> Result<RbacRegistry, AuthzError> {
        let delimiter = self.matcher.delimiter();

        let mut named: HashMap<String, Policy> = HashMap::with_capacity(self.policies.len());
        for entry in self.policies {
            validate_policy(&entry.policy, delimiter)?;
            if named.insert(entry.id.clone(), entry.policy).is_some() {
                return Err(AuthzError::Duplicate {
                    kind: "policy",
                    id: entry.id,
                });
            }
        }

        let mut registry = RbacRegistry::builtin(self.matcher);

        for definition in self.roles {
            if registry.roles.contains_key(&definition.id) {
                return Err(AuthzError::Duplicate {
                    kind: "role",
                    id: definition.id,
                });
            }

            let mut policies = definition.policies;
            for policy in &policies {
                validate_policy(policy, delimiter)?;
            }
            for policy_id in &definition.refs {
                let policy = named
                    .get(policy_id)
                    .ok_or_else(|| AuthzError::UnknownPolicy {
                        role: definition.id.clone(),
                        policy: policy_id.clone(),
                    })?;
                policies.push(policy.clone());
            }

            let role = Role {
                id: definition.id,
                name: definition.name,
                description: definition.description,
                policies,
            };
            registry.roles.insert(role.id.clone(), role);
        }

        for group in &self.groups {
            if let Some(role) = group
                .roles
                .iter()
                .find(|role| !registry.roles.contains_key(*role))
            {
                return Err(AuthzError::UnknownRole {
                    group: group.selector.clone(),
                    role: role.clone(),
                });
            }
        }
        registry.groups = self.groups;

        tracing::debug!(
            roles = registry.roles.len(),
            groups = registry.groups.len(),
            builtin = CLUSTER_ADMIN_ROLE_ID,
            "Built RBAC registry"
        );

        Ok(registry)
    }
}

fn validate_policy(policy: &Policy, delimiter: char) -> Result<(), AuthzError> {
    policy
        .patterns()
        .into_iter()
        .try_for_each(|pattern| validate_pattern(pattern, delimiter))
}

/// Reject patterns the matcher cannot evaluate meaningfully.
///
/// A trailing empty segment is allowed since dotted resources end with the
/// delimiter.
pub fn validate_pattern(pattern: &str, delimiter: char) -> Result<(), AuthzError> {
    if pattern.is_empty() {
        return Err(AuthzError::invalid_pattern(pattern, "pattern is empty"));
    }
    if pattern.chars().any(char::is_whitespace) {
        return Err(AuthzError::invalid_pattern(pattern, "pattern contains whitespace"));
    }
    if pattern.contains(PLACEHOLDER_OPEN) || pattern.contains(PLACEHOLDER_CLOSE) {
        return Err(AuthzError::invalid_pattern(
            pattern,
            "pattern contains a template placeholder",
        ));
    }

    let segments: Vec<&str> = pattern.split(delimiter).collect();
    let last = segments.len() - 1;
    if segments
        .iter()
        .enumerate()
        .any(|(i, segment)| segment.is_empty() && i != last)
    {
        return Err(AuthzError::invalid_pattern(pattern, "pattern has an empty segment"));
    }

    Ok(())
}
