//! Access decision engine.
//!
//! For one `(action, resource)` pair the engine gathers every allow and deny
//! pattern that matches across the supplied policies, canonicalizes them, and
//! settles the outcome:
//!
//! - [`EvaluationMode::Specificity`]: the most specific allow is weighed
//!   against the most specific deny. No match, or the identical pattern on both
//!   sides, denies.
//! - [`EvaluationMode::DenyOverrides`]: any matching deny vetoes, otherwise any
//!   matching allow grants, otherwise deny.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::{
    AuthzError, Decision, Policy, RbacRegistry,
    pattern::PatternMatcher,
    policy::Effect,
    template::PLACEHOLDER_OPEN,
};

/// How conflicting allow/deny matches are settled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvaluationMode {
    /// Most specific pattern wins; ties and no match deny.
    #[default]
    Specificity,
    /// Any matching deny wins regardless of specificity.
    DenyOverrides,
}

/// Canonical patterns that matched the request, split by effect.
#[derive(Debug, Default)]
struct Matched {
    allow: Vec<String>,
    deny: Vec<String>,
}

/// Evaluate `policies` for a request.
///
/// Pattern-list policies are matched against `resource` alone. Rule policies
/// additionally require their action pattern to match `action`, and are
/// skipped when no action is given.
pub fn evaluate<'a>(
    matcher: &PatternMatcher,
    mode: EvaluationMode,
    policies: impl IntoIterator<Item = &'a Policy>,
    action: Option<&str>,
    resource: &str,
) -> Decision {
    let matched = collect_matches(matcher, policies, action, resource);
    match mode {
        EvaluationMode::Specificity => decide_by_specificity(matcher, matched),
        EvaluationMode::DenyOverrides => decide_deny_overrides(matcher, matched),
    }
}

/// Specificity-aware decision over pattern-list policies for a bare resource.
pub fn authorize_patterns(matcher: &PatternMatcher, policies: &[Policy], resource: &str) -> bool {
    evaluate(
        matcher,
        EvaluationMode::Specificity,
        policies,
        None,
        resource,
    )
    .allowed
}

fn collect_matches<'a>(
    matcher: &PatternMatcher,
    policies: impl IntoIterator<Item = &'a Policy>,
    action: Option<&str>,
    resource: &str,
) -> Matched {
    let mut matched = Matched::default();
    for policy in policies {
        match policy {
            Policy::PatternList { allowed, denied } => {
                push_matching(matcher, allowed, resource, &mut matched.allow);
                push_matching(matcher, denied, resource, &mut matched.deny);
            }
            Policy::Rule {
                action: action_pattern,
                resource: resource_pattern,
                effect,
            } => {
                let Some(action) = action else {
                    continue;
                };
                if !matcher.matches(&matcher.simplify(action_pattern), action) {
                    continue;
                }
                let pattern = matcher.simplify(resource_pattern);
                if matcher.matches(&pattern, resource) {
                    match effect {
                        Effect::Allow => matched.allow.push(pattern),
                        Effect::Deny => matched.deny.push(pattern),
                    }
                }
            }
        }
    }
    matched
}

fn push_matching(
    matcher: &PatternMatcher,
    patterns: &[String],
    resource: &str,
    out: &mut Vec<String>,
) {
    for pattern in patterns {
        let pattern = matcher.simplify(pattern);
        if matcher.matches(&pattern, resource) {
            out.push(pattern);
        }
    }
}

/// Running most-specific pattern; empty when nothing matched.
fn most_specific(matcher: &PatternMatcher, patterns: &[String]) -> String {
    let mut best = String::new();
    for pattern in patterns {
        if matcher.more_specific(&best, pattern) {
            best.clone_from(pattern);
        }
    }
    best
}

fn decide_by_specificity(matcher: &PatternMatcher, matched: Matched) -> Decision {
    let best_allow = most_specific(matcher, &matched.allow);
    let best_deny = most_specific(matcher, &matched.deny);

    let allowed = if best_deny.is_empty() && !best_allow.is_empty() {
        true
    } else if best_allow == best_deny {
        false
    } else {
        !matcher.more_specific(&best_allow, &best_deny)
    };

    Decision {
        allowed,
        allow_pattern: non_empty(best_allow),
        deny_pattern: non_empty(best_deny),
    }
}

fn decide_deny_overrides(matcher: &PatternMatcher, matched: Matched) -> Decision {
    let best_allow = most_specific(matcher, &matched.allow);
    let best_deny = most_specific(matcher, &matched.deny);
    Decision {
        allowed: best_deny.is_empty() && !best_allow.is_empty(),
        allow_pattern: non_empty(best_allow),
        deny_pattern: non_empty(best_deny),
    }
}

fn non_empty(pattern: String) -> Option<String> {
    (!pattern.is_empty()).then_some(pattern)
}

/// Decision engine bound to an immutable registry.
#[derive(Debug, Clone)]
pub struct AccessEngine {
    registry: Arc<RbacRegistry>,
    mode: EvaluationMode,
}

impl AccessEngine {
    pub fn new(registry: Arc<RbacRegistry>) -> Self {
        Self {
            registry,
            mode: EvaluationMode::default(),
        }
    }

    pub fn with_mode(mut self, mode: EvaluationMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn mode(&self) -> EvaluationMode {
        self.mode
    }

    pub fn registry(&self) -> &RbacRegistry {
        &self.registry
    }

    /// Decide whether a holder of `roles` may perform `action` on `resource`.
    ///
    /// Role ids unknown to the registry grant nothing. A resource that still
    /// carries a template placeholder is rejected as an error rather than
    /// evaluated.
    pub fn authorize(
        &self,
        roles: &[String],
        action: &str,
        resource: &str,
    ) -> Result<Decision, AuthzError> {
        if resource.contains(PLACEHOLDER_OPEN) {
            return Err(AuthzError::UnrenderedResource(resource.to_string()));
        }
        if action.is_empty() || resource.is_empty() {
            return Ok(Decision::deny_default());
        }

        let policies = self.registry.policies_for_roles(roles);
        let decision = evaluate(
            self.registry.matcher(),
            self.mode,
            policies,
            Some(action),
            resource,
        );

        tracing::debug!(
            roles = ?roles,
            action,
            resource,
            allowed = decision.allowed,
            allow_pattern = ?decision.allow_pattern,
            deny_pattern = ?decision.deny_pattern,
            "Authorization decision"
        );

        Ok(decision)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authz::{
        Policy, RoleDefinition,
        pattern::{DOTTED_DELIMITER, MatchStrategy},
    };

    fn dotted() -> PatternMatcher {
        PatternMatcher::new(DOTTED_DELIMITER)
    }

    fn engine_with(roles: Vec<RoleDefinition>, mode: EvaluationMode) -> AccessEngine {
        let mut builder = RbacRegistry::builder(dotted());
        for role in roles {
            builder = builder.role(role);
        }
        AccessEngine::new(Arc::new(builder.build().expect("valid registry"))).with_mode(mode)
    }

    fn strings(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_pattern_list_allow_and_more_specific_deny() {
        let policies = vec![Policy::pattern_list(
            ["app.my-app.**"],
            ["app.*.downstream.filetree."],
        )];
        let matcher = dotted();

        assert!(authorize_patterns(&matcher, &policies, "app.my-app."));
        assert!(!authorize_patterns(
            &matcher,
            &policies,
            "app.my-app.downstream.filetree."
        ));
    }

    #[test]
    fn test_no_matching_pattern_denies() {
        let policies = vec![Policy::pattern_list(["redactor."], Vec::<String>::new())];
        assert!(!authorize_patterns(&dotted(), &policies, "app.my-app."));
        assert!(!authorize_patterns(&dotted(), &[], "app.my-app."));
    }

    #[test]
    fn test_identical_allow_and_deny_denies() {
        let policies = vec![
            Policy::pattern_list(["app.*.downstream.logs."], Vec::<String>::new()),
            Policy::pattern_list(Vec::<String>::new(), ["app.*.downstream.logs."]),
        ];
        let decision = evaluate(
            &dotted(),
            EvaluationMode::Specificity,
            &policies,
            None,
            "app.my-app.downstream.logs.",
        );
        assert!(!decision.allowed);
        assert_eq!(decision.allow_pattern, decision.deny_pattern);
    }

    #[test]
    fn test_more_specific_allow_beats_broad_deny() {
        let policies = vec![Policy::pattern_list(
            ["app.my-app.downstream.logs."],
            ["app.**"],
        )];
        let decision = evaluate(
            &dotted(),
            EvaluationMode::Specificity,
            &policies,
            None,
            "app.my-app.downstream.logs.",
        );
        assert!(decision.allowed);
        assert_eq!(
            decision.allow_pattern.as_deref(),
            Some("app.my-app.downstream.logs.")
        );
        assert_eq!(decision.deny_pattern.as_deref(), Some("app.**"));
    }

    #[test]
    fn test_deny_overrides_vetoes_specific_allow() {
        let policies = vec![Policy::pattern_list(
            ["app.my-app.downstream.logs."],
            ["app.**"],
        )];
        let decision = evaluate(
            &dotted(),
            EvaluationMode::DenyOverrides,
            &policies,
            None,
            "app.my-app.downstream.logs.",
        );
        assert!(!decision.allowed);
    }

    #[test]
    fn test_canonicalization_applies_before_comparison() {
        // `app.**.*` collapses to `app.**`, making it identical to the deny.
        let policies = vec![Policy::pattern_list(["app.**.*"], ["app.**"])];
        assert!(!authorize_patterns(&dotted(), &policies, "app.my-app.backup."));
    }

    #[test]
    fn test_rule_policies_require_action_match() {
        let policies = vec![Policy::allow("read", "app.*.backup.")];
        let matcher = dotted();
        let read = evaluate(
            &matcher,
            EvaluationMode::Specificity,
            &policies,
            Some("read"),
            "app.foo.backup.",
        );
        let write = evaluate(
            &matcher,
            EvaluationMode::Specificity,
            &policies,
            Some("write"),
            "app.foo.backup.",
        );
        let bare = evaluate(
            &matcher,
            EvaluationMode::Specificity,
            &policies,
            None,
            "app.foo.backup.",
        );
        assert!(read.allowed);
        assert!(!write.allowed);
        assert!(!bare.allowed);
    }

    #[test]
    fn test_engine_cluster_admin_allows_everything() {
        let engine = engine_with(vec![], EvaluationMode::Specificity);
        let decision = engine
            .authorize(&strings(&["cluster-admin"]), "write", "app.foo.restore.")
            .unwrap();
        assert!(decision.allowed);
        assert_eq!(decision.allow_pattern.as_deref(), Some("**"));
    }

    #[test]
    fn test_engine_roles_across_sessions() {
        let logs_reader = RoleDefinition::new("logs-reader", "Logs Reader").with_policy(
            Policy::pattern_list(["app.*.downstream.logs."], Vec::<String>::new()),
        );
        let logs_blocked = RoleDefinition::new("logs-blocked", "Logs Blocked").with_policy(
            Policy::pattern_list(Vec::<String>::new(), ["app.*.downstream.logs."]),
        );
        let engine = engine_with(vec![logs_reader, logs_blocked], EvaluationMode::Specificity);
        let resource = "app.my-app.downstream.logs.";

        let only_reader = engine
            .authorize(&strings(&["logs-reader"]), "read", resource)
            .unwrap();
        assert!(only_reader.allowed);

        let both = engine
            .authorize(&strings(&["logs-reader", "logs-blocked"]), "read", resource)
            .unwrap();
        assert!(!both.allowed);
    }

    #[test]
    fn test_engine_unknown_roles_grant_nothing() {
        let engine = engine_with(vec![], EvaluationMode::Specificity);
        let decision = engine
            .authorize(&strings(&["nobody"]), "read", "app.foo.")
            .unwrap();
        assert!(!decision.allowed);
        let decision = engine.authorize(&[], "read", "app.foo.").unwrap();
        assert!(!decision.allowed);
    }

    #[test]
    fn test_engine_rejects_unrendered_resource() {
        let engine = engine_with(vec![], EvaluationMode::Specificity);
        let err = engine
            .authorize(&strings(&["cluster-admin"]), "read", "app.{{.appSlug}}.")
            .unwrap_err();
        assert!(matches!(err, AuthzError::UnrenderedResource(_)));
    }

    #[test]
    fn test_engine_empty_inputs_deny() {
        let engine = engine_with(vec![], EvaluationMode::Specificity);
        let roles = strings(&["cluster-admin"]);
        assert!(!engine.authorize(&roles, "", "app.foo.").unwrap().allowed);
        assert!(!engine.authorize(&roles, "read", "").unwrap().allowed);
    }

    #[test]
    fn test_engine_deny_rule_in_deny_overrides_mode() {
        let auditor = RoleDefinition::new("auditor", "Auditor")
            .with_policy(Policy::allow("read", "app.my-app.downstream.logs."))
            .with_policy(Policy::deny("**", "app.**"));
        let specificity = engine_with(vec![auditor.clone()], EvaluationMode::Specificity);
        let overrides = engine_with(vec![auditor], EvaluationMode::DenyOverrides);
        let roles = strings(&["auditor"]);

        assert!(
            specificity
                .authorize(&roles, "read", "app.my-app.downstream.logs.")
                .unwrap()
                .allowed
        );
        assert!(
            !overrides
                .authorize(&roles, "read", "app.my-app.downstream.logs.")
                .unwrap()
                .allowed
        );
        assert_eq!(overrides.mode(), EvaluationMode::DenyOverrides);
    }

    #[test]
    fn test_engine_backtracking_matcher() {
        let role = RoleDefinition::new("nested", "Nested")
            .with_policy(Policy::allow("read", "app.**.downstream.logs."));
        let registry = RbacRegistry::builder(
            PatternMatcher::new(DOTTED_DELIMITER).with_strategy(MatchStrategy::Backtracking),
        )
        .role(role)
        .build()
        .unwrap();
        let engine = AccessEngine::new(Arc::new(registry));
        let resource = "app.downstream.mirror.downstream.logs.";

        assert!(
            engine
                .authorize(&strings(&["nested"]), "read", resource)
                .unwrap()
                .allowed
        );
    }
}
