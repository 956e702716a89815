//! Resource pattern language.
//!
//! Patterns are resource paths whose segments may be wildcards:
//! - `*` matches exactly one segment
//! - `**` matches zero or more segments
//!
//! Segments are separated by a single delimiter character. The free functions
//! in this module use `/`; [`PatternMatcher`] carries an explicit delimiter so
//! the dotted policy catalog (`app.{{.appSlug}}.backup.`) can share the same
//! implementation.

use serde::{Deserialize, Serialize};

/// Delimiter used by the free functions in this module.
pub const PATH_DELIMITER: char = '/';

/// Delimiter used by the built-in policy catalog.
pub const DOTTED_DELIMITER: char = '.';

/// Single-segment wildcard.
pub const WILDCARD: &str = "*";

/// Zero-or-more-segment wildcard.
pub const DEEP_WILDCARD: &str = "**";

/// Which matching algorithm to run for `**` segments.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStrategy {
    /// Single-token lookahead. A `**` anchors on the first resource segment
    /// equal to the pattern segment that follows it and never reconsiders.
    #[default]
    Lookahead,
    /// Full backtracking. Accepts every path the glob semantics allow,
    /// including those where the anchor segment recurs later in the path.
    Backtracking,
}

/// Pattern operations bound to a delimiter and match strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PatternMatcher {
    delimiter: char,
    strategy: MatchStrategy,
}

impl Default for PatternMatcher {
    fn default() -> Self {
        Self::new(PATH_DELIMITER)
    }
}

impl PatternMatcher {
    pub fn new(delimiter: char) -> Self {
        Self {
            delimiter,
            strategy: MatchStrategy::Lookahead,
        }
    }

    pub fn with_strategy(mut self, strategy: MatchStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn delimiter(&self) -> char {
        self.delimiter
    }

    pub fn strategy(&self) -> MatchStrategy {
        self.strategy
    }

    /// Test `pattern` against a concrete `resource`.
    pub fn matches(&self, pattern: &str, resource: &str) -> bool {
        match self.strategy {
            MatchStrategy::Lookahead => matches_with(pattern, resource, self.delimiter),
            MatchStrategy::Backtracking => {
                matches_backtracking_with(pattern, resource, self.delimiter)
            }
        }
    }

    pub fn simplify(&self, pattern: &str) -> String {
        simplify_with(pattern, self.delimiter)
    }

    pub fn more_specific(&self, previous: &str, candidate: &str) -> bool {
        more_specific_with(previous, candidate, self.delimiter)
    }
}

/// Match a `/`-delimited pattern against a `/`-delimited resource.
///
/// ```
/// use kotsadm_rbac::authz::matches;
///
/// assert!(matches("a/*/c", "a/x/c"));
/// assert!(matches("a/**/read", "a/b/c/read"));
/// assert!(!matches("a/*/c", "a/x/y/c"));
/// ```
pub fn matches(pattern: &str, resource: &str) -> bool {
    matches_with(pattern, resource, PATH_DELIMITER)
}

/// Lookahead matcher over an arbitrary delimiter.
///
/// A `**` that is not the last pattern segment peeks at the following pattern
/// segment. When that segment equals the current resource segment both are
/// consumed together; otherwise the `**` swallows the resource segment. There
/// is no backtracking, so `a/**/b/c` does not match `a/b/x/b/c`.
pub fn matches_with(pattern: &str, resource: &str, delimiter: char) -> bool {
    if pattern.is_empty() || resource.is_empty() {
        return false;
    }
    if pattern == resource || is_universal(pattern, delimiter) {
        return true;
    }

    let parts: Vec<&str> = pattern.split(delimiter).collect();
    let segments: Vec<&str> = resource.split(delimiter).collect();

    let (mut p, mut r) = (0, 0);
    while p < parts.len() && r < segments.len() {
        let part = parts[p];
        if part == DEEP_WILDCARD {
            if p == parts.len() - 1 {
                return true;
            }
            if parts[p + 1] == segments[r] {
                p += 2;
            }
            r += 1;
        } else if part == WILDCARD || part == segments[r] {
            p += 1;
            r += 1;
        } else {
            return false;
        }
    }

    // A trailing `**` also matches an empty tail.
    if r == segments.len() && p + 1 == parts.len() && parts[p] == DEEP_WILDCARD {
        return true;
    }

    p == parts.len() && r == segments.len()
}

/// Match a `/`-delimited pattern with full backtracking on `**`.
pub fn matches_backtracking(pattern: &str, resource: &str) -> bool {
    matches_backtracking_with(pattern, resource, PATH_DELIMITER)
}

/// Backtracking matcher over an arbitrary delimiter.
///
/// Same segment semantics as [`matches_with`], but a failed anchor after a
/// `**` resumes the search one resource segment later.
pub fn matches_backtracking_with(pattern: &str, resource: &str, delimiter: char) -> bool {
    if pattern.is_empty() || resource.is_empty() {
        return false;
    }
    if pattern == resource || is_universal(pattern, delimiter) {
        return true;
    }

    let parts: Vec<&str> = pattern.split(delimiter).collect();
    let segments: Vec<&str> = resource.split(delimiter).collect();

    let (mut p, mut r) = (0, 0);
    // (index of the last `**` seen, resource index it is currently expanded to)
    let mut resume: Option<(usize, usize)> = None;

    while r < segments.len() {
        if p < parts.len() && parts[p] == DEEP_WILDCARD {
            resume = Some((p, r));
            p += 1;
            continue;
        }
        if p < parts.len() && (parts[p] == WILDCARD || parts[p] == segments[r]) {
            p += 1;
            r += 1;
            continue;
        }
        match resume {
            Some((deep, consumed)) => {
                p = deep + 1;
                r = consumed + 1;
                resume = Some((deep, consumed + 1));
            }
            None => return false,
        }
    }

    while p < parts.len() && parts[p] == DEEP_WILDCARD {
        p += 1;
    }
    p == parts.len()
}

/// Canonicalize a `/`-delimited pattern.
///
/// ```
/// use kotsadm_rbac::authz::simplify;
///
/// assert_eq!(simplify("a/**/*/delete"), "a/**/delete");
/// assert_eq!(simplify("a/*/delete"), "a/*/delete");
/// ```
pub fn simplify(pattern: &str) -> String {
    simplify_with(pattern, PATH_DELIMITER)
}

/// Collapse every `*` segment that directly follows a `**` segment.
///
/// The rewrite is applied until it reaches a fixed point, so `**/*/*`
/// becomes `**`.
pub fn simplify_with(pattern: &str, delimiter: char) -> String {
    let mut kept: Vec<&str> = Vec::new();
    for part in pattern.split(delimiter) {
        if part == WILDCARD && kept.last() == Some(&DEEP_WILDCARD) {
            continue;
        }
        kept.push(part);
    }
    let mut joined = String::with_capacity(pattern.len());
    for (i, part) in kept.iter().enumerate() {
        if i > 0 {
            joined.push(delimiter);
        }
        joined.push_str(part);
    }
    joined
}

/// Is `candidate` strictly narrower than `previous`? Uses `/` as delimiter.
pub fn more_specific(previous: &str, candidate: &str) -> bool {
    more_specific_with(previous, candidate, PATH_DELIMITER)
}

/// Pairwise specificity comparison.
///
/// The rules are applied in order and the first applicable one decides:
/// 1. nothing recorded yet (`previous` empty) loses to anything
/// 2. a bare `**` loses to anything
/// 3. a bare `**` candidate never wins
/// 4. a pattern without a `**` segment beats one with a `**` segment
/// 5. fewer `*` segments wins
/// 6. otherwise the candidate wins only if it has more segments
///
/// This is not a total order and is only meant for tracking a running best
/// match.
pub fn more_specific_with(previous: &str, candidate: &str, delimiter: char) -> bool {
    if previous.is_empty() {
        return true;
    }
    if previous == DEEP_WILDCARD {
        return true;
    }
    if candidate == DEEP_WILDCARD {
        return false;
    }

    let previous_deep = has_segment(previous, DEEP_WILDCARD, delimiter);
    let candidate_deep = has_segment(candidate, DEEP_WILDCARD, delimiter);
    if previous_deep && !candidate_deep {
        return true;
    }

    let previous_stars = count_segments(previous, WILDCARD, delimiter);
    let candidate_stars = count_segments(candidate, WILDCARD, delimiter);
    if previous_stars > candidate_stars {
        return true;
    }

    candidate.split(delimiter).count() > previous.split(delimiter).count()
}

/// `**` and `**<delim>*` match every non-empty resource.
fn is_universal(pattern: &str, delimiter: char) -> bool {
    pattern == DEEP_WILDCARD
        || pattern
            .strip_prefix(DEEP_WILDCARD)
            .and_then(|rest| rest.strip_prefix(delimiter))
            == Some(WILDCARD)
}

fn has_segment(pattern: &str, segment: &str, delimiter: char) -> bool {
    pattern.split(delimiter).any(|part| part == segment)
}

fn count_segments(pattern: &str, segment: &str, delimiter: char) -> usize {
    pattern.split(delimiter).filter(|part| *part == segment).count()
}
