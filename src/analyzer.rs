//! Orchestration: `verify_sql`/`verify_sql_with_config`.
//!
//! Parses the query, then walks its tree once, scope by scope, running the
//! checker (C4), anti-pattern detector (C6), and restriction enforcer (C5)
//! against every `SELECT` — in that order, which is what produces the
//! exact error orderings in spec §8's worked scenarios — before recursing
//! into CTEs, set-operation arms, derived tables, and subqueries. Analysis
//! never aborts on the first violation; every component always runs.

use std::collections::HashSet;

use crate::antipattern;
use crate::ast::{Expr, SelectStmt, Source, Stmt};
use crate::checker;
use crate::config::AnalyzerConfig;
use crate::enforcement;
use crate::error::InputError;
use crate::parser;
use crate::policy::Policy;
use crate::rewriter;
use crate::scope::{self, ScopeFrame};
use crate::verdict::Verdict;

/// Analyzes `sql` against `policy` under the dialect named by `dialect`
/// (see [`crate::parser::Dialect::from_tag`]), with every other knob at
/// its default.
pub fn verify_sql(sql: &str, policy: &Policy, dialect: &str) -> Result<Verdict, InputError> {
    verify_sql_with_config(sql, policy, &AnalyzerConfig::with_dialect(dialect))
}

/// Analyzes `sql` against `policy` with a fully explicit [`AnalyzerConfig`].
pub fn verify_sql_with_config(
    sql: &str,
    policy: &Policy,
    config: &AnalyzerConfig,
) -> Result<Verdict, InputError> {
    let mut stmt = parser::parse_one_statement(sql, config.dialect)?;
    let original = stmt.clone();

    let mut errors = Vec::new();
    let mut unfixable = false;
    walk_stmt(
        &mut stmt,
        policy,
        config,
        &HashSet::new(),
        None,
        0,
        &mut errors,
        &mut unfixable,
    )?;

    let fixed = rewriter::finalize(&original, &stmt, unfixable);
    Ok(Verdict::from_analysis(errors, fixed, unfixable))
}

#[allow(clippy::too_many_arguments)]
fn walk_stmt(
    stmt: &mut Stmt,
    policy: &Policy,
    config: &AnalyzerConfig,
    cte_names: &HashSet<String>,
    parent: Option<&ScopeFrame<'_>>,
    depth: usize,
    errors: &mut Vec<String>,
    unfixable: &mut bool,
) -> Result<(), InputError> {
    if depth > config.max_depth {
        return Err(InputError::Internal(format!(
            "query nesting exceeds max_depth ({})",
            config.max_depth
        )));
    }
    match stmt {
        Stmt::Forbidden { kind, .. } => {
            errors.push(format!(
                "{kind} statements are not permitted; only SELECT is allowed"
            ));
            *unfixable = true;
            Ok(())
        }
        Stmt::Select(select) => {
            walk_select(select, policy, config, cte_names, parent, depth, errors, unfixable)
        }
        Stmt::SetOp(setop) => {
            walk_stmt(
                &mut setop.left,
                policy,
                config,
                cte_names,
                parent,
                depth + 1,
                errors,
                unfixable,
            )?;
            walk_stmt(
                &mut setop.right,
                policy,
                config,
                cte_names,
                parent,
                depth + 1,
                errors,
                unfixable,
            )
        }
        Stmt::With(with) => {
            let mut inner_cte_names = cte_names.clone();
            for cte in &with.ctes {
                inner_cte_names.insert(cte.name.to_ascii_lowercase());
            }
            // CTE bodies are not correlated with whatever encloses this
            // WITH block — standard SQL CTEs can't reference an outer
            // query's tables — so they get a fresh root scope chain.
            for cte in &mut with.ctes {
                walk_stmt(
                    &mut cte.query,
                    policy,
                    config,
                    &inner_cte_names,
                    None,
                    depth + 1,
                    errors,
                    unfixable,
                )?;
            }
            walk_stmt(
                &mut with.body,
                policy,
                config,
                &inner_cte_names,
                parent,
                depth + 1,
                errors,
                unfixable,
            )
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn walk_select(
    select: &mut SelectStmt,
    policy: &Policy,
    config: &AnalyzerConfig,
    cte_names: &HashSet<String>,
    parent: Option<&ScopeFrame<'_>>,
    depth: usize,
    errors: &mut Vec<String>,
    unfixable: &mut bool,
) -> Result<(), InputError> {
    let frame = match scope::build_frame(&select.from, cte_names, parent) {
        Ok(frame) => frame,
        Err(e) => {
            // A malformed FROM clause (duplicate alias) can't be safely
            // resolved any further; report it and stop descending into
            // this scope.
            errors.push(e);
            *unfixable = true;
            return Ok(());
        }
    };

    let table_errors = scope::validate_table_bindings(&frame, policy);
    if !table_errors.is_empty() {
        errors.extend(table_errors);
        *unfixable = true;
    }

    // C4: expand wildcards, strip illegal columns/functions.
    let proj_errors = checker::check_projection(select, policy, &frame, config);
    if select.projection.is_empty() {
        *unfixable = true;
    }
    errors.extend(proj_errors);

    // WHERE/HAVING column references are checked for legality only (spec
    // §4.4): a disallowed column there is reported but not stripped, since
    // removing part of a predicate could silently change the query's
    // meaning rather than just narrow its projection.
    if let Some(expr) = &select.selection {
        checker::check_columns(expr, policy, &frame, errors);
    }
    if let Some(expr) = &select.having {
        checker::check_columns(expr, policy, &frame, errors);
    }

    // C6: strip always-true predicates before C5 checks what's left.
    let anti_errors =
        antipattern::strip_always_true_predicates(&mut select.selection, &mut select.having);
    errors.extend(anti_errors);

    // C5: enforce row-level restrictions against whatever WHERE remains.
    let enforce_errors =
        enforcement::enforce_restrictions(&mut select.selection, policy, &frame, config.dialect)?;
    errors.extend(enforce_errors);

    for source in &mut select.from {
        walk_source(source, policy, config, cte_names, &frame, depth + 1, errors, unfixable)?;
    }

    for item in &mut select.projection {
        if let Some(expr) = projection_expr_mut(item) {
            walk_expr_subqueries(
                expr,
                policy,
                config,
                cte_names,
                Some(&frame),
                depth + 1,
                errors,
                unfixable,
            )?;
        }
    }
    if let Some(e) = &mut select.selection {
        walk_expr_subqueries(e, policy, config, cte_names, Some(&frame), depth + 1, errors, unfixable)?;
    }
    if let Some(e) = &mut select.having {
        walk_expr_subqueries(e, policy, config, cte_names, Some(&frame), depth + 1, errors, unfixable)?;
    }
    for e in &mut select.group_by {
        walk_expr_subqueries(e, policy, config, cte_names, Some(&frame), depth + 1, errors, unfixable)?;
    }
    for item in &mut select.order_by {
        walk_expr_subqueries(
            &mut item.expr,
            policy,
            config,
            cte_names,
            Some(&frame),
            depth + 1,
            errors,
            unfixable,
        )?;
    }
    if let Some(e) = &mut select.limit {
        walk_expr_subqueries(e, policy, config, cte_names, Some(&frame), depth + 1, errors, unfixable)?;
    }
    if let Some(e) = &mut select.offset {
        walk_expr_subqueries(e, policy, config, cte_names, Some(&frame), depth + 1, errors, unfixable)?;
    }

    Ok(())
}

fn projection_expr_mut(item: &mut crate::ast::Projection) -> Option<&mut Expr> {
    use crate::ast::Projection;
    match item {
        Projection::Expr(e) | Projection::ExprWithAlias(e, _) => Some(e),
        Projection::Wildcard | Projection::QualifiedWildcard(_) => None,
    }
}

#[allow(clippy::too_many_arguments)]
fn walk_source(
    source: &mut Source,
    policy: &Policy,
    config: &AnalyzerConfig,
    cte_names: &HashSet<String>,
    parent: &ScopeFrame<'_>,
    depth: usize,
    errors: &mut Vec<String>,
    unfixable: &mut bool,
) -> Result<(), InputError> {
    match source {
        Source::Table { .. } => Ok(()),
        Source::Derived { query, .. } => walk_stmt(
            query,
            policy,
            config,
            cte_names,
            Some(parent),
            depth,
            errors,
            unfixable,
        ),
        Source::Join(join) => {
            walk_source(&mut join.left, policy, config, cte_names, parent, depth, errors, unfixable)?;
            walk_source(&mut join.right, policy, config, cte_names, parent, depth, errors, unfixable)?;
            if let Some(on) = &mut join.on {
                walk_expr_subqueries(on, policy, config, cte_names, Some(parent), depth, errors, unfixable)?;
            }
            Ok(())
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn walk_expr_subqueries(
    expr: &mut Expr,
    policy: &Policy,
    config: &AnalyzerConfig,
    cte_names: &HashSet<String>,
    parent: Option<&ScopeFrame<'_>>,
    depth: usize,
    errors: &mut Vec<String>,
    unfixable: &mut bool,
) -> Result<(), InputError> {
    match expr {
        Expr::Subquery(stmt) => {
            walk_stmt(stmt, policy, config, cte_names, parent, depth, errors, unfixable)
        }
        Expr::BinaryOp { left, right, .. } => {
            walk_expr_subqueries(left, policy, config, cte_names, parent, depth, errors, unfixable)?;
            walk_expr_subqueries(right, policy, config, cte_names, parent, depth, errors, unfixable)
        }
        Expr::UnaryOp { expr, .. }
        | Expr::Nested(expr)
        | Expr::IsNull(expr)
        | Expr::IsNotNull(expr) => {
            walk_expr_subqueries(expr, policy, config, cte_names, parent, depth, errors, unfixable)
        }
        Expr::Between {
            expr, low, high, ..
        } => {
            walk_expr_subqueries(expr, policy, config, cte_names, parent, depth, errors, unfixable)?;
            walk_expr_subqueries(low, policy, config, cte_names, parent, depth, errors, unfixable)?;
            walk_expr_subqueries(high, policy, config, cte_names, parent, depth, errors, unfixable)
        }
        Expr::InList { expr, list, .. } => {
            walk_expr_subqueries(expr, policy, config, cte_names, parent, depth, errors, unfixable)?;
            for item in list {
                walk_expr_subqueries(item, policy, config, cte_names, parent, depth, errors, unfixable)?;
            }
            Ok(())
        }
        Expr::Function { args, .. } => {
            for a in args {
                walk_expr_subqueries(a, policy, config, cte_names, parent, depth, errors, unfixable)?;
            }
            Ok(())
        }
        Expr::Case {
            operand,
            when_then,
            else_expr,
        } => {
            if let Some(o) = operand {
                walk_expr_subqueries(o, policy, config, cte_names, parent, depth, errors, unfixable)?;
            }
            for (c, r) in when_then {
                walk_expr_subqueries(c, policy, config, cte_names, parent, depth, errors, unfixable)?;
                walk_expr_subqueries(r, policy, config, cte_names, parent, depth, errors, unfixable)?;
            }
            if let Some(e) = else_expr {
                walk_expr_subqueries(e, policy, config, cte_names, parent, depth, errors, unfixable)?;
            }
            Ok(())
        }
        Expr::Column { .. } | Expr::Literal(_) | Expr::Raw(_) => Ok(()),
    }
}
