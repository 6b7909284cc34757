//! Anti-pattern detector (C6).
//!
//! Finds and strips always-true predicates from `WHERE`/`HAVING` — the
//! classic `1=1` or `x OR 1=1` smuggling pattern used to defeat a
//! restriction that's about to be injected by the enforcer (spec §4.6).
//! Detection is purely syntactic constant folding (see
//! [`crate::ast::is_always_true`]); it never attempts to prove a tautology
//! over columns (`x = x` is out of scope).

use crate::ast::{self, BinOp, Expr};

const ALWAYS_TRUE_ERROR: &str = "Always-True expression is not allowed";

/// Strips always-true clauses from a `SELECT`'s `WHERE` and `HAVING` in
/// place, returning one verdict error per clause removed.
pub fn strip_always_true_predicates(
    selection: &mut Option<Expr>,
    having: &mut Option<Expr>,
) -> Vec<String> {
    let mut errors = Vec::new();
    if let Some(expr) = selection.take() {
        *selection = strip(expr, &mut errors);
    }
    if let Some(expr) = having.take() {
        *having = strip(expr, &mut errors);
    }
    errors
}

/// Recursively strips always-true leaves from an `AND`/`OR` tree.
///
/// A disjunct or conjunct that folds to a constant `TRUE` is removed and
/// replaced by whichever sibling remains; if both sides of a combinator
/// are always-true, the combinator itself disappears. This also realizes
/// spec §4.6's disjunction rule in the `a OR 1=1` case: the always-true
/// disjunct is removed, leaving just `a`.
fn strip(expr: Expr, errors: &mut Vec<String>) -> Option<Expr> {
    match expr {
        Expr::BinaryOp { left, op, right } if op == BinOp::Or || op == BinOp::And => {
            let left = strip(*left, errors);
            let right = strip(*right, errors);
            match (left, right) {
                (Some(l), Some(r)) => Some(Expr::BinaryOp {
                    left: Box::new(l),
                    op,
                    right: Box::new(r),
                }),
                (Some(l), None) => Some(l),
                (None, Some(r)) => Some(r),
                (None, None) => None,
            }
        }
        Expr::Nested(inner) => strip(*inner, errors),
        other => {
            if ast::is_always_true(&other) {
                errors.push(ALWAYS_TRUE_ERROR.to_string());
                None
            } else {
                Some(other)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Literal;

    fn eq(name: &str, value: &str) -> Expr {
        Expr::BinaryOp {
            left: Box::new(Expr::Column {
                table: None,
                name: name.to_string(),
            }),
            op: BinOp::Eq,
            right: Box::new(Expr::Literal(Literal::Number(value.to_string()))),
        }
    }

    fn literal_eq(a: &str, b: &str) -> Expr {
        Expr::BinaryOp {
            left: Box::new(Expr::Literal(Literal::Number(a.to_string()))),
            op: BinOp::Eq,
            right: Box::new(Expr::Literal(Literal::Number(b.to_string()))),
        }
    }

    #[test]
    fn strips_bare_always_true_where_clause() {
        let mut selection = Some(literal_eq("1", "1"));
        let mut having = None;
        let errors = strip_always_true_predicates(&mut selection, &mut having);
        assert!(selection.is_none());
        assert_eq!(errors, vec![ALWAYS_TRUE_ERROR.to_string()]);
    }

    #[test]
    fn collapses_or_with_always_true_disjunct_to_remaining_clause() {
        let or_expr = Expr::BinaryOp {
            left: Box::new(eq("account_id", "123")),
            op: BinOp::Or,
            right: Box::new(literal_eq("1", "1")),
        };
        let mut selection = Some(or_expr);
        let mut having = None;
        let errors = strip_always_true_predicates(&mut selection, &mut having);
        assert_eq!(errors, vec![ALWAYS_TRUE_ERROR.to_string()]);
        match selection {
            Some(Expr::BinaryOp {
                op: BinOp::Eq,
                ref left,
                ..
            }) => {
                assert!(matches!(**left, Expr::Column { ref name, .. } if name == "account_id"));
            }
            other => panic!("expected bare comparison to survive, got {other:?}"),
        }
    }

    #[test]
    fn leaves_ordinary_conjunction_untouched() {
        let and_expr = Expr::BinaryOp {
            left: Box::new(eq("account_id", "123")),
            op: BinOp::And,
            right: Box::new(eq("status", "1")),
        };
        let mut selection = Some(and_expr);
        let mut having = None;
        let errors = strip_always_true_predicates(&mut selection, &mut having);
        assert!(errors.is_empty());
        assert!(selection.is_some());
    }
}
