//! Canonical SQL serializer (part of C7).
//!
//! Renders this crate's own AST back to SQL text. Precedence-aware:
//! parentheses are only emitted where operator precedence actually
//! requires them, so a WHERE clause conjoined via [`ast::conjoin`] doesn't
//! carry the redundant parens that wrapping in [`ast::Expr::Nested`] would
//! otherwise force (spec §4.7). `Expr::Nested` itself is treated as a
//! transparent wrapper for exactly this reason — the parentheses it once
//! represented in the source text are re-derived from precedence, not
//! replayed literally.

use crate::ast::{BinOp, CteBinding, Expr, JoinKind, JoinSource, Literal, OrderByItem, Projection, SelectStmt, SetOpStmt, SetOperator, Source, Stmt, UnOp, WithStmt};

/// Renders `stmt` as canonical SQL text.
pub fn serialize_stmt(stmt: &Stmt) -> String {
    match stmt {
        Stmt::Select(s) => serialize_select(s),
        Stmt::SetOp(s) => serialize_set_op(s),
        Stmt::With(w) => serialize_with(w),
        Stmt::Forbidden { kind, .. } => kind.clone(),
    }
}

fn serialize_select(s: &SelectStmt) -> String {
    let mut out = String::from("SELECT ");
    if s.distinct {
        out.push_str("DISTINCT ");
    }
    out.push_str(
        &s.projection
            .iter()
            .map(serialize_projection)
            .collect::<Vec<_>>()
            .join(", "),
    );
    if !s.from.is_empty() {
        out.push_str(" FROM ");
        out.push_str(
            &s.from
                .iter()
                .map(serialize_source)
                .collect::<Vec<_>>()
                .join(", "),
        );
    }
    if let Some(w) = &s.selection {
        out.push_str(" WHERE ");
        out.push_str(&serialize_expr(w, 0));
    }
    if !s.group_by.is_empty() {
        out.push_str(" GROUP BY ");
        out.push_str(
            &s.group_by
                .iter()
                .map(|e| serialize_expr(e, 0))
                .collect::<Vec<_>>()
                .join(", "),
        );
    }
    if let Some(h) = &s.having {
        out.push_str(" HAVING ");
        out.push_str(&serialize_expr(h, 0));
    }
    if !s.order_by.is_empty() {
        out.push_str(" ORDER BY ");
        out.push_str(
            &s.order_by
                .iter()
                .map(serialize_order_item)
                .collect::<Vec<_>>()
                .join(", "),
        );
    }
    if let Some(l) = &s.limit {
        out.push_str(" LIMIT ");
        out.push_str(&serialize_expr(l, 0));
    }
    if let Some(o) = &s.offset {
        out.push_str(" OFFSET ");
        out.push_str(&serialize_expr(o, 0));
    }
    out
}

fn serialize_set_op(s: &SetOpStmt) -> String {
    let op = match s.op {
        SetOperator::Union => "UNION",
        SetOperator::Intersect => "INTERSECT",
        SetOperator::Except => "EXCEPT",
    };
    let all = if s.all { " ALL" } else { "" };
    format!(
        "{} {op}{all} {}",
        serialize_stmt(&s.left),
        serialize_stmt(&s.right)
    )
}

fn serialize_with(w: &WithStmt) -> String {
    let ctes = w
        .ctes
        .iter()
        .map(serialize_cte)
        .collect::<Vec<_>>()
        .join(", ");
    format!("WITH {ctes} {}", serialize_stmt(&w.body))
}

fn serialize_cte(cte: &CteBinding) -> String {
    format!("{} AS ({})", cte.name, serialize_stmt(&cte.query))
}

fn serialize_projection(p: &Projection) -> String {
    match p {
        Projection::Wildcard => "*".to_string(),
        Projection::QualifiedWildcard(q) => format!("{q}.*"),
        Projection::Expr(e) => serialize_expr(e, 0),
        Projection::ExprWithAlias(e, alias) => format!("{} AS {alias}", serialize_expr(e, 0)),
    }
}

fn serialize_source(s: &Source) -> String {
    match s {
        Source::Table { name, alias } => match alias {
            Some(a) => format!("{name} AS {a}"),
            None => name.clone(),
        },
        Source::Derived { query, alias } => format!("({}) AS {alias}", serialize_stmt(query)),
        Source::Join(join) => serialize_join(join),
    }
}

fn serialize_join(join: &JoinSource) -> String {
    let kind = match join.kind {
        JoinKind::Inner => "JOIN",
        JoinKind::Left => "LEFT JOIN",
        JoinKind::Right => "RIGHT JOIN",
        JoinKind::Full => "FULL JOIN",
        JoinKind::Cross => "CROSS JOIN",
    };
    let mut out = format!(
        "{} {kind} {}",
        serialize_source(&join.left),
        serialize_source(&join.right)
    );
    if let Some(on) = &join.on {
        out.push_str(" ON ");
        out.push_str(&serialize_expr(on, 0));
    }
    out
}

fn serialize_order_item(item: &OrderByItem) -> String {
    if item.asc {
        serialize_expr(&item.expr, 0)
    } else {
        format!("{} DESC", serialize_expr(&item.expr, 0))
    }
}

fn serialize_literal(l: &Literal) -> String {
    match l {
        Literal::Number(n) => n.clone(),
        Literal::Str(s) => format!("'{}'", s.replace('\'', "''")),
        Literal::Boolean(b) => if *b { "TRUE" } else { "FALSE" }.to_string(),
        Literal::Null => "NULL".to_string(),
    }
}

// Precedence levels, low to high. `NOT` sits between `AND` and the
// comparison operators, matching ANSI SQL's `OR < AND < NOT < comparison`.
const PREC_OR: u8 = 10;
const PREC_AND: u8 = 20;
const PREC_NOT: u8 = 25;
const PREC_CMP: u8 = 30;
const PREC_ADD: u8 = 40;
const PREC_MUL: u8 = 50;
const PREC_UNARY_SIGN: u8 = 60;
const PREC_ATOM: u8 = 100;

fn binop_precedence(op: BinOp) -> u8 {
    match op {
        BinOp::Or => PREC_OR,
        BinOp::And => PREC_AND,
        BinOp::Eq
        | BinOp::NotEq
        | BinOp::Lt
        | BinOp::LtEq
        | BinOp::Gt
        | BinOp::GtEq
        | BinOp::Like
        | BinOp::NotLike => PREC_CMP,
        BinOp::Plus | BinOp::Minus => PREC_ADD,
        BinOp::Multiply | BinOp::Divide | BinOp::Modulo => PREC_MUL,
    }
}

/// `true` for operators where `a OP (b OP c) != (a OP b) OP c` in general,
/// so the right operand needs protecting even at the same precedence.
fn is_non_associative(op: BinOp) -> bool {
    matches!(op, BinOp::Minus | BinOp::Divide | BinOp::Modulo)
}

fn wrap(text: String, own_prec: u8, min_prec: u8) -> String {
    if own_prec < min_prec {
        format!("({text})")
    } else {
        text
    }
}

/// Renders `expr`, wrapping it in parentheses only if its precedence is
/// lower than `min_prec` (the precedence the surrounding context demands).
fn serialize_expr(expr: &Expr, min_prec: u8) -> String {
    match expr {
        Expr::Column { table, name } => match table {
            Some(t) => format!("{t}.{name}"),
            None => name.clone(),
        },
        Expr::Literal(l) => serialize_literal(l),
        Expr::Function {
            name,
            args,
            wildcard_arg,
        } => {
            let inner = if *wildcard_arg {
                "*".to_string()
            } else {
                args.iter()
                    .map(|a| serialize_expr(a, 0))
                    .collect::<Vec<_>>()
                    .join(", ")
            };
            format!("{name}({inner})")
        }
        Expr::BinaryOp { left, op, right } => {
            let p = binop_precedence(*op);
            let left_s = serialize_expr(left, p);
            let right_min = if is_non_associative(*op) { p + 1 } else { p };
            let right_s = serialize_expr(right, right_min);
            wrap(format!("{left_s} {} {right_s}", op.as_sql()), p, min_prec)
        }
        Expr::UnaryOp { op, expr } => match op {
            UnOp::Not => wrap(
                format!("NOT {}", serialize_expr(expr, PREC_CMP)),
                PREC_NOT,
                min_prec,
            ),
            UnOp::Minus => wrap(
                format!("-{}", serialize_expr(expr, PREC_UNARY_SIGN)),
                PREC_UNARY_SIGN,
                min_prec,
            ),
            UnOp::Plus => wrap(
                format!("+{}", serialize_expr(expr, PREC_UNARY_SIGN)),
                PREC_UNARY_SIGN,
                min_prec,
            ),
        },
        Expr::Nested(inner) => serialize_expr(inner, min_prec),
        Expr::IsNull(e) => wrap(
            format!("{} IS NULL", serialize_expr(e, PREC_ADD)),
            PREC_CMP,
            min_prec,
        ),
        Expr::IsNotNull(e) => wrap(
            format!("{} IS NOT NULL", serialize_expr(e, PREC_ADD)),
            PREC_CMP,
            min_prec,
        ),
        Expr::Between {
            expr,
            negated,
            low,
            high,
        } => {
            let not = if *negated { "NOT " } else { "" };
            wrap(
                format!(
                    "{} {not}BETWEEN {} AND {}",
                    serialize_expr(expr, PREC_ADD),
                    serialize_expr(low, PREC_ADD),
                    serialize_expr(high, PREC_ADD)
                ),
                PREC_CMP,
                min_prec,
            )
        }
        Expr::InList {
            expr,
            list,
            negated,
        } => {
            let not = if *negated { "NOT " } else { "" };
            let items = list
                .iter()
                .map(|e| serialize_expr(e, 0))
                .collect::<Vec<_>>()
                .join(", ");
            wrap(
                format!("{} {not}IN ({items})", serialize_expr(expr, PREC_ADD)),
                PREC_CMP,
                min_prec,
            )
        }
        Expr::Case {
            operand,
            when_then,
            else_expr,
        } => {
            let mut out = "CASE".to_string();
            if let Some(o) = operand {
                out.push(' ');
                out.push_str(&serialize_expr(o, 0));
            }
            for (cond, result) in when_then {
                out.push_str(&format!(
                    " WHEN {} THEN {}",
                    serialize_expr(cond, 0),
                    serialize_expr(result, 0)
                ));
            }
            if let Some(e) = else_expr {
                out.push_str(&format!(" ELSE {}", serialize_expr(e, 0)));
            }
            out.push_str(" END");
            out
        }
        Expr::Subquery(stmt) => format!("({})", serialize_stmt(stmt)),
        Expr::Raw(text) => text.clone(),
    }
}

// Silence "unused constant" for the atom level, kept for documentation
// symmetry with the rest of the precedence table.
#[allow(dead_code)]
const _: u8 = PREC_ATOM;
