//! Policy, role and group data.
//!
//! Policies come in two shapes that the decision engine evaluates uniformly:
//! a pair of allow/deny pattern lists scoped to a resource family, and a flat
//! `(action, resource, effect)` rule. Roles bundle policies; groups hand a set
//! of roles to every principal a selector matches.

use serde::{Deserialize, Serialize};

use super::pattern::WILDCARD;

/// Whether a rule grants or withholds access.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Effect {
    #[default]
    Allow,
    Deny,
}

/// A single authorization policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Policy {
    /// Resource patterns granted and withheld, independent of the action.
    PatternList {
        #[serde(default)]
        allowed: Vec<String>,
        #[serde(default)]
        denied: Vec<String>,
    },
    /// One action pattern paired with one resource pattern.
    Rule {
        action: String,
        resource: String,
        #[serde(default)]
        effect: Effect,
    },
}

impl Policy {
    pub fn allow(action: impl Into<String>, resource: impl Into<String>) -> Self {
        Self::Rule {
            action: action.into(),
            resource: resource.into(),
            effect: Effect::Allow,
        }
    }

    pub fn deny(action: impl Into<String>, resource: impl Into<String>) -> Self {
        Self::Rule {
            action: action.into(),
            resource: resource.into(),
            effect: Effect::Deny,
        }
    }

    pub fn pattern_list<A, D>(allowed: A, denied: D) -> Self
    where
        A: IntoIterator,
        A::Item: Into<String>,
        D: IntoIterator,
        D::Item: Into<String>,
    {
        Self::PatternList {
            allowed: allowed.into_iter().map(Into::into).collect(),
            denied: denied.into_iter().map(Into::into).collect(),
        }
    }

    /// Every pattern carried by this policy, action patterns included.
    pub fn patterns(&self) -> Vec<&str> {
        match self {
            Self::PatternList { allowed, denied } => allowed
                .iter()
                .chain(denied.iter())
                .map(String::as_str)
                .collect(),
            Self::Rule {
                action, resource, ..
            } => vec![action.as_str(), resource.as_str()],
        }
    }
}

/// A reusable policy with an identifier that roles can reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedPolicy {
    pub id: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(flatten)]
    pub policy: Policy,
}

/// A named set of policies assignable to a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Role {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub policies: Vec<Policy>,
}

impl Role {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: None,
            policies: Vec::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_policy(mut self, policy: Policy) -> Self {
        self.policies.push(policy);
        self
    }
}

/// Maps a principal selector to role ids.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Group {
    /// `*` for every principal, otherwise an exact principal name.
    pub selector: String,
    pub roles: Vec<String>,
}

impl Group {
    pub fn applies_to(&self, principal: Option<&str>) -> bool {
        self.selector == WILDCARD || principal.is_some_and(|p| p == self.selector)
    }
}

/// Outcome of an access decision.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Decision {
    pub allowed: bool,
    /// The allow pattern that governed the decision, if any matched.
    pub allow_pattern: Option<String>,
    /// The deny pattern that governed the decision, if any matched.
    pub deny_pattern: Option<String>,
}

impl Decision {
    pub fn deny_default() -> Self {
        Self::default()
    }

    pub fn is_allowed(&self) -> bool {
        self.allowed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_deserialize_rule_defaults_to_allow() {
        let policy: Policy =
            toml::from_str("type = \"rule\"\naction = \"read\"\nresource = \"app.*.**\"").unwrap();
        assert_eq!(policy, Policy::allow("read", "app.*.**"));
    }

    #[test]
    fn test_policy_deserialize_pattern_list() {
        let policy: Policy = toml::from_str(
            "type = \"pattern_list\"\nallowed = [\"app.my-app.**\"]\ndenied = [\"app.*.downstream.filetree.\"]",
        )
        .unwrap();
        assert_eq!(
            policy,
            Policy::pattern_list(["app.my-app.**"], ["app.*.downstream.filetree."])
        );
    }

    #[test]
    fn test_named_policy_flattens_shape() {
        let named: NamedPolicy = toml::from_str(
            "id = \"no-logs\"\ntype = \"rule\"\naction = \"**\"\nresource = \"app.*.downstream.logs.\"\neffect = \"deny\"",
        )
        .unwrap();
        assert_eq!(named.id, "no-logs");
        assert_eq!(named.policy, Policy::deny("**", "app.*.downstream.logs."));
    }

    #[test]
    fn test_policy_patterns() {
        let list = Policy::pattern_list(["a.**"], ["a.b."]);
        assert_eq!(list.patterns(), vec!["a.**", "a.b."]);
        let rule = Policy::allow("read", "a.*.");
        assert_eq!(rule.patterns(), vec!["read", "a.*."]);
    }

    #[test]
    fn test_group_applies_to() {
        let everyone = Group {
            selector: "*".to_string(),
            roles: vec!["cluster-admin".to_string()],
        };
        assert!(everyone.applies_to(None));
        assert!(everyone.applies_to(Some("alice")));

        let alice = Group {
            selector: "alice".to_string(),
            roles: vec![],
        };
        assert!(alice.applies_to(Some("alice")));
        assert!(!alice.applies_to(Some("bob")));
        assert!(!alice.applies_to(None));
    }
}
