//! Analyzer configuration (A3): the explicit knobs `verify_sql_with_config`
//! accepts. No external config-file format — the crate has no I/O, so a
//! plain struct is the whole surface.

use std::collections::HashSet;

use crate::parser::Dialect;

/// Default recursion depth bound for nested subqueries/CTEs, chosen to be
/// far beyond anything a hand-written query would use while still
/// protecting the scope resolver from pathological input.
pub const DEFAULT_MAX_DEPTH: usize = 64;

/// Configuration for one `verify_sql_with_config` call.
#[derive(Debug, Clone)]
pub struct AnalyzerConfig {
    /// Which SQL dialect to parse the query under.
    pub dialect: Dialect,
    /// Function names (case-insensitive) the anti-pattern detector (C6)
    /// should reject outright, regardless of policy. Empty by default —
    /// this is an explicit extension point, not part of the policy model.
    pub deny_functions: HashSet<String>,
    /// Maximum nesting depth (subqueries, CTEs, set operations) the scope
    /// resolver will walk before giving up with an internal error, rather
    /// than recursing unboundedly on adversarial input.
    pub max_depth: usize,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            dialect: Dialect::Generic,
            deny_functions: HashSet::new(),
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

impl AnalyzerConfig {
    /// Creates a config targeting the given dialect tag (see
    /// [`Dialect::from_tag`]), with every other knob left at its default.
    pub fn with_dialect(tag: &str) -> Self {
        Self {
            dialect: Dialect::from_tag(tag),
            ..Self::default()
        }
    }

    /// Adds a function name to the deny-list, builder-style.
    pub fn deny_function(mut self, name: impl Into<String>) -> Self {
        self.deny_functions.insert(name.into().to_ascii_uppercase());
        self
    }

    /// `true` if `name` (any case) is on the deny-list.
    pub fn denies_function(&self, name: &str) -> bool {
        self.deny_functions.contains(&name.to_ascii_uppercase())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deny_function_is_case_insensitive() {
        let config = AnalyzerConfig::default().deny_function("pg_sleep");
        assert!(config.denies_function("PG_SLEEP"));
        assert!(config.denies_function("pg_sleep"));
        assert!(!config.denies_function("count"));
    }

    #[test]
    fn default_dialect_is_generic() {
        assert_eq!(AnalyzerConfig::default().dialect, Dialect::Generic);
    }
}
