//! Resource-pattern authorization.
//!
//! Resources are delimiter-separated paths such as `app.my-app.backup.`.
//! Roles carry policies of allow and deny patterns over those paths, and a
//! request is authorized when the most specific matching allow outranks the
//! most specific matching deny.
//!
//! The authorization flow:
//! 1. Resolve the route's resource template from path variables and getters
//! 2. Expand the session's roles with any matching groups
//! 3. Collect matching allow/deny patterns from every held policy
//! 4. Compare the best allow and best deny by specificity
//!
//! ```
//! use kotsadm_rbac::authz::{matches, simplify};
//!
//! assert!(matches("a/*/c", "a/b/c"));
//! assert!(matches("a/**", "a/b/c/d"));
//! assert!(!matches("a/*", "a/b/c"));
//! assert_eq!(simplify("a/**/*/b"), "a/**/b");
//! ```

pub mod catalog;
mod engine;
mod error;
pub mod pattern;
mod policy;
mod registry;
pub mod template;

pub use engine::{AccessEngine, EvaluationMode, authorize_patterns, evaluate};
pub use error::{AuthzError, TemplateError};
pub use pattern::{
    MatchStrategy, PatternMatcher, matches, matches_backtracking, more_specific, simplify,
};
pub use policy::{Decision, Effect, Group, NamedPolicy, Policy, Role};
pub use registry::{RbacRegistry, RbacRegistryBuilder, RoleDefinition, validate_pattern};
pub use template::{Getter, ResourceTemplate};
