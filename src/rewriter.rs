//! Rewriter (C7).
//!
//! Once a query's AST has been mutated in place by the checker, the
//! anti-pattern detector, and the restriction enforcer, this decides
//! whether the result differs from the original and should be reported as
//! the verdict's `fixed` text. Text production itself is delegated to
//! [`crate::serialize`].

use crate::ast::Stmt;
use crate::serialize;

/// Produces the verdict's `fixed` field.
///
/// Both trees are rendered through the same canonicalizing serializer, so
/// a query already in canonical form (same keyword casing, whitespace,
/// parenthesization) reports no fix even after being re-parsed and walked
/// — this is what gives re-verifying an already-fixed query `fixed: null`
/// (spec §8's idempotence property) without any special-casing here.
/// `unfixable` forces `None` regardless of what changed, per the state
/// machine's `UNFIXABLE` terminal state (spec §5).
pub fn finalize(original: &Stmt, mutated: &Stmt, unfixable: bool) -> Option<String> {
    if unfixable {
        return None;
    }
    let original_text = serialize::serialize_stmt(original);
    let mutated_text = serialize::serialize_stmt(mutated);
    if original_text == mutated_text {
        None
    } else {
        Some(mutated_text)
    }
}
