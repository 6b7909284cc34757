//! Scope resolution (C3).
//!
//! A [`ScopeFrame`] maps the table aliases visible at one `SELECT` boundary
//! to what they actually name: a real policy table, a CTE, or a derived
//! table (subquery in `FROM`). Frames nest — a correlated subquery's frame
//! links to its enclosing frame's so a bare column reference can resolve
//! outward when it isn't bound locally — mirroring how SQL itself resolves
//! scope, leaf to root.

use std::collections::HashMap;

use crate::ast::{JoinSource, Source};
use crate::policy::Policy;

/// What a single `FROM`-clause alias is bound to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Binding {
    /// A real table this query reads from; `table` is its name exactly as
    /// written (case preserved; lookups against it are case-insensitive).
    Table { table: String },
    /// A CTE or derived-table (subquery) alias. Its own projection defines
    /// whatever columns it exposes, which this crate does not track —
    /// column legality is checked inside the CTE/subquery's own body, not
    /// at the point it's referenced.
    Virtual,
}

/// The set of aliases visible inside one `SELECT`, plus a link to the
/// enclosing scope for correlated references.
#[derive(Debug)]
pub struct ScopeFrame<'p> {
    bindings: HashMap<String, Binding>,
    parent: Option<&'p ScopeFrame<'p>>,
}

impl<'p> ScopeFrame<'p> {
    /// An empty root frame with no enclosing scope.
    pub fn root() -> Self {
        Self {
            bindings: HashMap::new(),
            parent: None,
        }
    }

    /// An empty frame nested inside `parent`.
    pub fn nested(parent: &'p ScopeFrame<'p>) -> Self {
        Self {
            bindings: HashMap::new(),
            parent: Some(parent),
        }
    }

    /// Binds `alias` to `binding` in this frame.
    ///
    /// Returns an error string (a verdict-plane message, not an
    /// `InputError` — a duplicate alias is a property of the query, not
    /// the policy) if the alias is already bound in this same frame.
    pub fn bind(&mut self, alias: &str, binding: Binding) -> Result<(), String> {
        let key = alias.to_ascii_lowercase();
        if self.bindings.contains_key(&key) {
            return Err(format!(
                "table alias '{alias}' is used more than once in the FROM clause"
            ));
        }
        self.bindings.insert(key, binding);
        Ok(())
    }

    /// Looks up `alias` in this frame only (no parent fallback) — used
    /// when a column reference is explicitly qualified, since a qualified
    /// reference always names a table visible in the query's own scope,
    /// never an outer one (SQL does not let `t.col` cross a subquery
    /// boundary to a differently-aliased outer `t`).
    pub fn lookup_local(&self, alias: &str) -> Option<&Binding> {
        self.bindings.get(&alias.to_ascii_lowercase())
    }

    /// All bindings visible directly in this frame (not the parent chain).
    pub fn local_bindings(&self) -> impl Iterator<Item = (&str, &Binding)> {
        self.bindings.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Resolves an unqualified column by finding the single binding in
    /// this frame that could own it, searching outward through enclosing
    /// scopes if this frame has none. Returns `None` ambiguously — callers
    /// decide what "no unique owner" means for their purpose (for
    /// unqualified references this crate does not attempt cross-table
    /// disambiguation beyond "exactly one table in scope").
    pub fn sole_table(&self) -> Option<&str> {
        if self.bindings.len() == 1 {
            if let Some(Binding::Table { table }) = self.bindings.values().next() {
                return Some(table.as_str());
            }
            return None;
        }
        self.parent.and_then(|p| p.sole_table())
    }

    /// Resolves a (possibly table-qualified) reference to the real table
    /// it names, walking outward through enclosing scopes for an
    /// unqualified or unmatched-locally alias (correlated subquery).
    ///
    /// Returns `None` for a reference into a CTE/derived table (no real
    /// table to check against) or one that names no visible alias at all.
    pub fn resolve_table(&self, qualifier: Option<&str>) -> Option<ResolvedTable> {
        match qualifier {
            Some(alias) => match self.lookup_local(alias) {
                Some(Binding::Table { table }) => Some(ResolvedTable::Real(table.clone())),
                Some(Binding::Virtual) => Some(ResolvedTable::Virtual),
                None => self.parent.and_then(|p| p.resolve_table(qualifier)),
            },
            None => match self.sole_table() {
                Some(table) => Some(ResolvedTable::Real(table.to_string())),
                None => {
                    if self.bindings.len() == 1 {
                        Some(ResolvedTable::Virtual)
                    } else {
                        None
                    }
                }
            },
        }
    }
}

/// The result of resolving a table qualifier/bare reference to what it
/// actually names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedTable {
    /// A real policy table, by name.
    Real(String),
    /// A CTE or derived table; not policy-checked at the reference site.
    Virtual,
}

/// Builds a [`ScopeFrame`] from a `SELECT`'s `FROM` sources.
///
/// `cte_names` is the set of CTE names visible at this nesting level
/// (lowercased) — a table reference matching one of these is bound as
/// [`Binding::Virtual`] rather than looked up against the policy, since it
/// names a CTE, not a real table.
pub fn build_frame<'p>(
    from: &[Source],
    cte_names: &std::collections::HashSet<String>,
    parent: Option<&'p ScopeFrame<'p>>,
) -> Result<ScopeFrame<'p>, String> {
    let mut frame = match parent {
        Some(p) => ScopeFrame::nested(p),
        None => ScopeFrame::root(),
    };
    for source in from {
        bind_source(&mut frame, source, cte_names)?;
    }
    Ok(frame)
}

fn bind_source(
    frame: &mut ScopeFrame<'_>,
    source: &Source,
    cte_names: &std::collections::HashSet<String>,
) -> Result<(), String> {
    match source {
        Source::Table { name, alias } => {
            let key = alias.clone().unwrap_or_else(|| name.clone());
            let binding = if cte_names.contains(&name.to_ascii_lowercase()) {
                Binding::Virtual
            } else {
                Binding::Table {
                    table: name.clone(),
                }
            };
            frame.bind(&key, binding)
        }
        Source::Derived { alias, .. } => frame.bind(alias, Binding::Virtual),
        Source::Join(join) => {
            let JoinSource { left, right, .. } = join.as_ref();
            bind_source(frame, left, cte_names)?;
            bind_source(frame, right, cte_names)
        }
    }
}

/// Checks every table bound directly in `frame` against the policy,
/// producing the wire-contract `Table <name> is not allowed` error for each
/// one the policy doesn't recognize (spec §4.3). Each distinct table name is
/// reported once even if referenced through more than one alias. Virtual
/// (CTE/derived) bindings are never checked — they have no real table to
/// validate against.
pub fn validate_table_bindings(frame: &ScopeFrame<'_>, policy: &Policy) -> Vec<String> {
    let mut errors = Vec::new();
    let mut seen = std::collections::HashSet::new();
    for (_, binding) in frame.local_bindings() {
        if let Binding::Table { table } = binding {
            if policy.table(table).is_none() && seen.insert(table.to_ascii_lowercase()) {
                errors.push(format!("Table {table} is not allowed"));
            }
        }
    }
    errors
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn table(name: &str, alias: Option<&str>) -> Source {
        Source::Table {
            name: name.to_string(),
            alias: alias.map(str::to_string),
        }
    }

    #[test]
    fn binds_single_table() {
        let from = vec![table("orders", None)];
        let frame = build_frame(&from, &HashSet::new(), None).unwrap();
        assert_eq!(
            frame.resolve_table(None),
            Some(ResolvedTable::Real("orders".into()))
        );
    }

    #[test]
    fn binds_aliased_table() {
        let from = vec![table("orders", Some("o"))];
        let frame = build_frame(&from, &HashSet::new(), None).unwrap();
        assert_eq!(
            frame.resolve_table(Some("o")),
            Some(ResolvedTable::Real("orders".into()))
        );
        assert_eq!(frame.resolve_table(Some("orders")), None);
    }

    #[test]
    fn rejects_duplicate_alias() {
        let from = vec![table("orders", Some("t")), table("users", Some("t"))];
        assert!(build_frame(&from, &HashSet::new(), None).is_err());
    }

    #[test]
    fn cte_name_binds_as_virtual() {
        let mut ctes = HashSet::new();
        ctes.insert("recent_orders".to_string());
        let from = vec![table("recent_orders", Some("r"))];
        let frame = build_frame(&from, &ctes, None).unwrap();
        assert_eq!(frame.resolve_table(Some("r")), Some(ResolvedTable::Virtual));
    }

    #[test]
    fn unqualified_reference_resolves_through_parent_scope() {
        let outer_from = vec![table("orders", Some("o"))];
        let outer = build_frame(&outer_from, &HashSet::new(), None).unwrap();

        let inner_from = vec![table("order_items", Some("i"))];
        let inner = build_frame(&inner_from, &HashSet::new(), Some(&outer)).unwrap();

        assert_eq!(
            inner.resolve_table(Some("o")),
            Some(ResolvedTable::Real("orders".into()))
        );
    }

    #[test]
    fn flags_table_not_covered_by_policy() {
        use crate::policy::PolicyBuilder;

        let policy = PolicyBuilder::new()
            .table("orders", &["id"])
            .build()
            .unwrap();
        let from = vec![table("orders", Some("o")), table("products", Some("p"))];
        let frame = build_frame(&from, &HashSet::new(), None).unwrap();
        let errors = validate_table_bindings(&frame, &policy);
        assert_eq!(errors, vec!["Table products is not allowed".to_string()]);
    }
}
