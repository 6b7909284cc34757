//! Restriction enforcer (C5).
//!
//! For every real table reference visible directly in a scope, checks each
//! of the policy's row-level restrictions on that table against the
//! scope's `WHERE` clause; any restriction not already satisfied is both
//! reported (`Missing restriction for table: <t> column: <c> value: <v>`)
//! and injected via [`ast::conjoin`] so the rewritten query enforces it.

use crate::ast::{self, BinOp, Expr};
use crate::error::InputError;
use crate::parser::{self, Dialect};
use crate::policy::{CmpOp, Policy, Restriction, Scalar};
use crate::scope::{Binding, ScopeFrame};

/// Enforces every restriction attached to every real table bound directly
/// in `scope` against `selection`, mutating it in place to add whatever
/// was missing. Returns the verdict errors for restrictions that were not
/// already satisfied.
pub fn enforce_restrictions(
    selection: &mut Option<Expr>,
    policy: &Policy,
    scope: &ScopeFrame<'_>,
    dialect: Dialect,
) -> Result<Vec<String>, InputError> {
    let mut errors = Vec::new();
    for (alias, binding) in scope.local_bindings() {
        let Binding::Table { table } = binding else {
            continue;
        };
        let Some(spec) = policy.table(table) else {
            continue;
        };
        for restriction in &spec.restrictions {
            if is_satisfied(selection.as_ref(), alias, table, restriction) {
                continue;
            }
            errors.push(format!(
                "Missing restriction for table: {} column: {} value: {}",
                spec.name,
                restriction.column(),
                restriction_value_display(restriction)
            ));
            let predicate = parser::parse_expr_standalone(&restriction.to_sql(), dialect)
                .map_err(|e| {
                    InputError::Internal(format!(
                        "restriction predicate failed to re-parse: {e}"
                    ))
                })?;
            *selection = Some(ast::conjoin(selection.take(), predicate));
        }
    }
    Ok(errors)
}

fn restriction_value_display(restriction: &Restriction) -> String {
    match restriction {
        Restriction::Eq { value, .. } | Restriction::Cmp { value, .. } => scalar_display(value),
        Restriction::Between { low, high, .. } => {
            format!("{} AND {}", scalar_display(low), scalar_display(high))
        }
        Restriction::In { values, .. } => values
            .iter()
            .map(scalar_display)
            .collect::<Vec<_>>()
            .join(", "),
    }
}

fn scalar_display(value: &Scalar) -> String {
    match value {
        Scalar::Number(n) => {
            if n.fract() == 0.0 && n.abs() < 1e15 {
                format!("{}", *n as i64)
            } else {
                n.to_string()
            }
        }
        Scalar::Str(s) => s.clone(),
        Scalar::Bool(b) => b.to_string(),
    }
}

/// `true` if at least one top-level conjunct of `selection` satisfies
/// `restriction` against `table` (referenced as `alias`).
fn is_satisfied(
    selection: Option<&Expr>,
    alias: &str,
    table: &str,
    restriction: &Restriction,
) -> bool {
    match selection {
        None => false,
        Some(expr) => ast::split_conjunction(expr)
            .into_iter()
            .any(|clause| conjunct_satisfies(clause, alias, table, restriction)),
    }
}

/// A disjunction at the top level is opaque — per spec §4.6 it only
/// satisfies `restriction` if every one of its disjuncts does
/// independently. Anything else is checked directly as a leaf predicate.
fn conjunct_satisfies(clause: &Expr, alias: &str, table: &str, restriction: &Restriction) -> bool {
    match clause {
        Expr::BinaryOp {
            op: BinOp::Or, ..
        } => ast::split_disjunction(clause)
            .into_iter()
            .all(|d| leaf_matches(d, alias, table, restriction)),
        Expr::Nested(inner) => conjunct_satisfies(inner, alias, table, restriction),
        other => leaf_matches(other, alias, table, restriction),
    }
}

fn leaf_matches(expr: &Expr, alias: &str, table: &str, restriction: &Restriction) -> bool {
    match restriction {
        Restriction::Eq { column, value } => match expr {
            Expr::BinaryOp {
                left,
                op: BinOp::Eq,
                right,
            } => {
                col_value_match(left, right, alias, table, column, value)
                    || col_value_match(right, left, alias, table, column, value)
            }
            _ => false,
        },
        Restriction::Cmp { column, op, value } => match expr {
            Expr::BinaryOp { left, op: bop, right } => {
                let wanted = cmp_to_binop(*op);
                if *bop == wanted {
                    if let (Some(c), Some(lit)) = (as_column(left), as_literal(right)) {
                        return column_matches(&c, alias, table, column)
                            && literal_matches_scalar(lit, value);
                    }
                }
                if *bop == flip(wanted) {
                    if let (Some(lit), Some(c)) = (as_literal(left), as_column(right)) {
                        return column_matches(&c, alias, table, column)
                            && literal_matches_scalar(lit, value);
                    }
                }
                false
            }
            _ => false,
        },
        Restriction::Between { column, low, high } => match expr {
            Expr::Between {
                expr: inner,
                negated: false,
                low: lo,
                high: hi,
            } => {
                column_ref_matches(inner, alias, table, column)
                    && literal_matches_scalar(as_literal(lo).unwrap_or(&ast::Literal::Null), low)
                    && literal_matches_scalar(as_literal(hi).unwrap_or(&ast::Literal::Null), high)
            }
            _ => false,
        },
        Restriction::In { column, values } => match expr {
            Expr::InList {
                expr: inner,
                list,
                negated: false,
            } => column_ref_matches(inner, alias, table, column) && values_match_set(list, values),
            _ => false,
        },
    }
}

fn col_value_match(
    col_side: &Expr,
    val_side: &Expr,
    alias: &str,
    table: &str,
    column: &str,
    value: &Scalar,
) -> bool {
    match (as_column(col_side), as_literal(val_side)) {
        (Some(c), Some(lit)) => {
            column_matches(&c, alias, table, column) && literal_matches_scalar(lit, value)
        }
        _ => false,
    }
}

fn column_ref_matches(expr: &Expr, alias: &str, table: &str, column: &str) -> bool {
    as_column(expr)
        .map(|c| column_matches(&c, alias, table, column))
        .unwrap_or(false)
}

fn as_column(expr: &Expr) -> Option<ast::ColumnRef> {
    match expr {
        Expr::Column { table, name } => Some(ast::ColumnRef {
            table: table.clone(),
            name: name.clone(),
        }),
        _ => None,
    }
}

fn as_literal(expr: &Expr) -> Option<&ast::Literal> {
    match expr {
        Expr::Literal(l) => Some(l),
        _ => None,
    }
}

fn column_matches(col: &ast::ColumnRef, alias: &str, table: &str, wanted: &str) -> bool {
    if !col.name.eq_ignore_ascii_case(wanted) {
        return false;
    }
    match &col.table {
        None => true,
        Some(q) => q.eq_ignore_ascii_case(alias) || q.eq_ignore_ascii_case(table),
    }
}

fn literal_matches_scalar(lit: &ast::Literal, scalar: &Scalar) -> bool {
    match (lit, scalar) {
        (ast::Literal::Number(n), Scalar::Number(v)) => {
            n.parse::<f64>().map(|p| p == *v).unwrap_or(false)
        }
        (ast::Literal::Str(s), Scalar::Str(v)) => s == v,
        (ast::Literal::Boolean(b), Scalar::Bool(v)) => b == v,
        _ => false,
    }
}

fn values_match_set(list: &[Expr], values: &[Scalar]) -> bool {
    if list.len() != values.len() {
        return false;
    }
    values.iter().all(|v| {
        list.iter()
            .any(|e| as_literal(e).map(|l| literal_matches_scalar(l, v)).unwrap_or(false))
    })
}

fn cmp_to_binop(op: CmpOp) -> BinOp {
    match op {
        CmpOp::Lt => BinOp::Lt,
        CmpOp::Gt => BinOp::Gt,
        CmpOp::LtEq => BinOp::LtEq,
        CmpOp::GtEq => BinOp::GtEq,
    }
}

fn flip(op: BinOp) -> BinOp {
    match op {
        BinOp::Lt => BinOp::Gt,
        BinOp::Gt => BinOp::Lt,
        BinOp::LtEq => BinOp::GtEq,
        BinOp::GtEq => BinOp::LtEq,
        other => other,
    }
}
