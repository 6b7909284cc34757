//! SQL parser adapter (C2): dialect selection and conversion from
//! `sqlparser`'s parse tree into this crate's own [`ast::Stmt`].
//!
//! Every `sqlparser`-version-sensitive field access lives in this module.
//! Once [`parse_one_statement`] returns, nothing downstream touches
//! `sqlparser` types again.

use log::debug;
use sqlparser::ast as sp;
use sqlparser::dialect::{
    AnsiDialect, Dialect as SqlDialect, GenericDialect, MySqlDialect, PostgreSqlDialect,
    SQLiteDialect,
};
use sqlparser::parser::Parser as SqlParser;

use crate::ast::{
    self, BinOp, CteBinding, Expr, JoinKind, JoinSource, Literal, NodeIdGen, OrderByItem,
    Projection, SelectStmt, SetOpStmt, SetOperator, Source, Stmt, UnOp, WithStmt,
};
use crate::error::ParseError;

/// The SQL dialects this crate can parse under.
///
/// `sqlparser` has no dedicated Trino dialect; Trino's grammar is close
/// enough to ANSI SQL with common extensions that [`GenericDialect`] is
/// the best available stand-in (recorded as an open-question resolution
/// in `DESIGN.md`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Dialect {
    /// Trino/Presto. Maps to `GenericDialect`.
    Trino,
    /// A permissive superset dialect; also the fallback for unrecognized tags.
    #[default]
    Generic,
    /// PostgreSQL.
    Postgres,
    /// MySQL.
    MySql,
    /// SQLite.
    Sqlite,
    /// Strict ANSI SQL.
    Ansi,
}

impl Dialect {
    /// Resolves a free-form dialect tag (as supplied by a collaborator,
    /// e.g. over the wire) into a known [`Dialect`].
    ///
    /// Unrecognized tags fall back to [`Dialect::Generic`] rather than
    /// erroring — dialect selection only affects what extra syntax is
    /// accepted, never the meaning of standard constructs this crate
    /// analyzes.
    pub fn from_tag(tag: &str) -> Self {
        match tag.to_ascii_lowercase().as_str() {
            "trino" | "presto" => Dialect::Trino,
            "postgres" | "postgresql" | "pg" => Dialect::Postgres,
            "mysql" | "mariadb" => Dialect::MySql,
            "sqlite" => Dialect::Sqlite,
            "ansi" => Dialect::Ansi,
            "generic" => Dialect::Generic,
            other => {
                debug!("unrecognized dialect tag '{other}', falling back to generic");
                Dialect::Generic
            }
        }
    }

    fn as_sqlparser_dialect(self) -> Box<dyn SqlDialect> {
        match self {
            Dialect::Trino | Dialect::Generic => Box::new(GenericDialect {}),
            Dialect::Postgres => Box::new(PostgreSqlDialect {}),
            Dialect::MySql => Box::new(MySqlDialect {}),
            Dialect::Sqlite => Box::new(SQLiteDialect {}),
            Dialect::Ansi => Box::new(AnsiDialect {}),
        }
    }
}

/// Parses `sql` under `dialect`, rejecting anything but a single
/// analyzable statement, and converts it into this crate's own AST.
pub fn parse_one_statement(sql: &str, dialect: Dialect) -> Result<Stmt, ParseError> {
    let sp_dialect = dialect.as_sqlparser_dialect();
    let statements = SqlParser::parse_sql(&*sp_dialect, sql)?;

    if statements.is_empty() {
        return Err(ParseError::UnsupportedStatement(
            "no statement found in input".to_string(),
        ));
    }
    if statements.len() > 1 {
        return Err(ParseError::MultipleStatements);
    }

    let mut ids = NodeIdGen::new();
    convert_statement(&statements[0], &mut ids)
}

fn convert_statement(stmt: &sp::Statement, ids: &mut NodeIdGen) -> Result<Stmt, ParseError> {
    match stmt {
        sp::Statement::Query(query) => convert_query(query, ids),
        other => match forbidden_statement_kind(other) {
            Some(kind) => Ok(Stmt::Forbidden {
                id: ids.next(),
                kind: kind.to_string(),
            }),
            None => Err(ParseError::UnsupportedStatement(format!(
                "only SELECT-family statements are supported, found: {}",
                statement_kind(other)
            ))),
        },
    }
}

/// Statement kinds the default policy forbids outright (spec §4.6). These
/// parse successfully — the analyzer reports them as a verdict violation
/// rather than an input-plane parse failure (see [`ast::Stmt::Forbidden`]).
fn forbidden_statement_kind(stmt: &sp::Statement) -> Option<&'static str> {
    match stmt {
        sp::Statement::Insert(_) => Some("INSERT"),
        sp::Statement::Update { .. } => Some("UPDATE"),
        sp::Statement::Delete(_) => Some("DELETE"),
        sp::Statement::Drop { .. } => Some("DROP"),
        sp::Statement::AlterTable { .. } => Some("ALTER"),
        sp::Statement::Truncate { .. } => Some("TRUNCATE"),
        sp::Statement::CreateTable(_) => Some("CREATE"),
        _ => None,
    }
}

fn statement_kind(stmt: &sp::Statement) -> &'static str {
    match stmt {
        sp::Statement::Insert(_) => "INSERT",
        sp::Statement::Update { .. } => "UPDATE",
        sp::Statement::Delete(_) => "DELETE",
        sp::Statement::CreateTable(_) => "CREATE TABLE",
        sp::Statement::Drop { .. } => "DROP",
        sp::Statement::AlterTable { .. } => "ALTER TABLE",
        _ => "non-SELECT statement",
    }
}

fn convert_query(query: &sp::Query, ids: &mut NodeIdGen) -> Result<Stmt, ParseError> {
    let mut stmt = convert_set_expr(&query.body, ids)?;

    // `ORDER BY`/`LIMIT`/`OFFSET` live on the outer `Query`, not on the
    // `SetExpr` body; fold them into the resulting `SELECT` here. A set
    // operation's overall order/limit has no slot in `SetOpStmt` (it
    // orders/limits the combined result, not either arm) and is dropped —
    // it doesn't affect column/restriction legality, which is all this
    // crate analyzes.
    if let Stmt::Select(select) = &mut stmt {
        for ob in query_order_by_exprs(query) {
            select.order_by.push(OrderByItem {
                expr: convert_expr(&ob.expr, ids)?,
                asc: ob.asc.unwrap_or(true),
            });
        }
        if let Some(limit) = &query.limit {
            select.limit = Some(convert_expr(limit, ids)?);
        }
        if let Some(offset) = &query.offset {
            select.offset = Some(convert_expr(&offset.value, ids)?);
        }
    }

    if let Some(with) = &query.with {
        let ctes = with
            .cte_tables
            .iter()
            .map(|cte| {
                Ok(CteBinding {
                    name: ident_to_string(&cte.alias.name),
                    query: convert_query(&cte.query, ids)?,
                })
            })
            .collect::<Result<Vec<_>, ParseError>>()?;
        return Ok(Stmt::With(WithStmt {
            id: ids.next(),
            ctes,
            body: Box::new(stmt),
        }));
    }

    Ok(stmt)
}

fn convert_set_expr(body: &sp::SetExpr, ids: &mut NodeIdGen) -> Result<Stmt, ParseError> {
    match body {
        sp::SetExpr::Select(select) => Ok(Stmt::Select(convert_select(select, ids)?)),
        sp::SetExpr::Query(inner) => convert_query(inner, ids),
        sp::SetExpr::SetOperation {
            op,
            left,
            right,
            set_quantifier,
        } => {
            let operator = match op {
                sp::SetOperator::Union => SetOperator::Union,
                sp::SetOperator::Intersect => SetOperator::Intersect,
                sp::SetOperator::Except => SetOperator::Except,
            };
            let all = matches!(set_quantifier, sp::SetQuantifier::All);
            let left_stmt = convert_set_expr(left, ids)?;
            let right_stmt = convert_set_expr(right, ids)?;
            Ok(Stmt::SetOp(SetOpStmt {
                id: ids.next(),
                op: operator,
                all,
                left: Box::new(left_stmt),
                right: Box::new(right_stmt),
            }))
        }
        sp::SetExpr::Values(_) => Err(ParseError::UnsupportedStatement(
            "VALUES-only queries are not analyzable against a table policy".to_string(),
        )),
        _ => Err(ParseError::UnsupportedStatement(
            "unsupported query body shape".to_string(),
        )),
    }
}

/// `sqlparser` has carried `ORDER BY` both as a bare `Vec<OrderByExpr>` and
/// (in newer releases) as `Option<OrderBy>` wrapping that vector; this
/// helper isolates the difference so the rest of the adapter doesn't care.
fn query_order_by_exprs(query: &sp::Query) -> Vec<sp::OrderByExpr> {
    query.order_by.clone().map(|ob| ob.exprs).unwrap_or_default()
}

fn convert_select(select: &sp::Select, ids: &mut NodeIdGen) -> Result<SelectStmt, ParseError> {
    let projection = select
        .projection
        .iter()
        .map(|item| convert_select_item(item, ids))
        .collect::<Result<Vec<_>, ParseError>>()?;

    let from = select
        .from
        .iter()
        .map(|twj| convert_table_with_joins(twj, ids))
        .collect::<Result<Vec<_>, ParseError>>()?;

    let selection = select
        .selection
        .as_ref()
        .map(|e| convert_expr(e, ids))
        .transpose()?;

    let group_by = match &select.group_by {
        sp::GroupByExpr::Expressions(exprs, _) => exprs
            .iter()
            .map(|e| convert_expr(e, ids))
            .collect::<Result<Vec<_>, ParseError>>()?,
        sp::GroupByExpr::All(_) => Vec::new(),
    };

    let having = select
        .having
        .as_ref()
        .map(|e| convert_expr(e, ids))
        .transpose()?;

    Ok(SelectStmt {
        id: ids.next(),
        distinct: select.distinct.is_some(),
        projection,
        from,
        selection,
        group_by,
        having,
        order_by: Vec::new(),
        limit: None,
        offset: None,
    })
}

fn convert_select_item(item: &sp::SelectItem, ids: &mut NodeIdGen) -> Result<Projection, ParseError> {
    match item {
        sp::SelectItem::Wildcard(_) => Ok(Projection::Wildcard),
        sp::SelectItem::QualifiedWildcard(name, _) => {
            Ok(Projection::QualifiedWildcard(object_name_to_string(name)))
        }
        sp::SelectItem::UnnamedExpr(expr) => Ok(Projection::Expr(convert_expr(expr, ids)?)),
        sp::SelectItem::ExprWithAlias { expr, alias } => Ok(Projection::ExprWithAlias(
            convert_expr(expr, ids)?,
            ident_to_string(alias),
        )),
    }
}

fn convert_table_with_joins(
    twj: &sp::TableWithJoins,
    ids: &mut NodeIdGen,
) -> Result<Source, ParseError> {
    let mut source = convert_table_factor(&twj.relation, ids)?;
    for join in &twj.joins {
        let right = convert_table_factor(&join.relation, ids)?;
        let (kind, on) = convert_join_operator(&join.join_operator, ids)?;
        source = Source::Join(Box::new(JoinSource {
            left: source,
            right,
            kind,
            on,
        }));
    }
    Ok(source)
}

fn convert_table_factor(factor: &sp::TableFactor, ids: &mut NodeIdGen) -> Result<Source, ParseError> {
    match factor {
        sp::TableFactor::Table { name, alias, .. } => Ok(Source::Table {
            name: object_name_to_string(name),
            alias: alias.as_ref().map(|a| ident_to_string(&a.name)),
        }),
        sp::TableFactor::Derived {
            subquery, alias, ..
        } => {
            let query = convert_query(subquery, ids)?;
            let alias = alias
                .as_ref()
                .map(|a| ident_to_string(&a.name))
                .ok_or_else(|| {
                    ParseError::UnsupportedStatement(
                        "subqueries in FROM must be aliased".to_string(),
                    )
                })?;
            Ok(Source::Derived {
                query: Box::new(query),
                alias,
            })
        }
        sp::TableFactor::NestedJoin {
            table_with_joins,
            alias,
        } => {
            let inner = convert_table_with_joins(table_with_joins, ids)?;
            if alias.is_some() {
                // A parenthesized join with its own alias has no direct
                // representation in our `Source` tree; fold it through
                // unaliased, since table-level aliasing of a join result
                // is never the target of a column/restriction check itself.
                debug!("dropping alias on nested join during AST conversion");
            }
            Ok(inner)
        }
        other => Err(ParseError::UnsupportedStatement(format!(
            "unsupported FROM-clause source: {other:?}"
        ))),
    }
}

fn convert_join_operator(
    op: &sp::JoinOperator,
    ids: &mut NodeIdGen,
) -> Result<(JoinKind, Option<Expr>), ParseError> {
    let (kind, constraint) = match op {
        sp::JoinOperator::Inner(c) => (JoinKind::Inner, Some(c)),
        sp::JoinOperator::LeftOuter(c) => (JoinKind::Left, Some(c)),
        sp::JoinOperator::RightOuter(c) => (JoinKind::Right, Some(c)),
        sp::JoinOperator::FullOuter(c) => (JoinKind::Full, Some(c)),
        sp::JoinOperator::CrossJoin => (JoinKind::Cross, None),
        other => {
            return Err(ParseError::UnsupportedStatement(format!(
                "unsupported join operator: {other:?}"
            )))
        }
    };
    let on = match constraint {
        Some(sp::JoinConstraint::On(expr)) => Some(convert_expr(expr, ids)?),
        Some(sp::JoinConstraint::Using(cols)) => {
            // Fold `USING (a, b)` into an equivalent `ON` predicate so the
            // rest of the analyzer only ever needs to reason about `ON`.
            let mut combined: Option<Expr> = None;
            for c in cols {
                let name = join_using_column_name(c);
                let eq = Expr::BinaryOp {
                    left: Box::new(Expr::Column {
                        table: None,
                        name: name.clone(),
                    }),
                    op: BinOp::Eq,
                    right: Box::new(Expr::Column {
                        table: None,
                        name,
                    }),
                };
                combined = Some(match combined {
                    Some(prev) => Expr::BinaryOp {
                        left: Box::new(prev),
                        op: BinOp::And,
                        right: Box::new(eq),
                    },
                    None => eq,
                });
            }
            combined
        }
        _ => None,
    };
    Ok((kind, on))
}

/// `JoinConstraint::Using` carries `Vec<ObjectName>` in `sqlparser` 0.61
/// (each entry a possibly-dotted reference); `USING` only ever names a bare
/// column, so the last part is what we want.
fn join_using_column_name(name: &sp::ObjectName) -> String {
    name.0
        .last()
        .map(ident_to_string)
        .unwrap_or_default()
}

fn convert_expr(expr: &sp::Expr, ids: &mut NodeIdGen) -> Result<Expr, ParseError> {
    match expr {
        sp::Expr::Identifier(ident) => Ok(Expr::Column {
            table: None,
            name: ident_to_string(ident),
        }),
        sp::Expr::CompoundIdentifier(parts) => {
            let mut parts = parts.iter().map(ident_to_string).collect::<Vec<_>>();
            let name = parts.pop().unwrap_or_default();
            let table = if parts.is_empty() {
                None
            } else {
                Some(parts.join("."))
            };
            Ok(Expr::Column { table, name })
        }
        sp::Expr::Value(value) => Ok(Expr::Literal(convert_value(value))),
        sp::Expr::BinaryOp { left, op, right } => Ok(Expr::BinaryOp {
            left: Box::new(convert_expr(left, ids)?),
            op: convert_binop(op)?,
            right: Box::new(convert_expr(right, ids)?),
        }),
        sp::Expr::UnaryOp { op, expr } => Ok(Expr::UnaryOp {
            op: convert_unop(op)?,
            expr: Box::new(convert_expr(expr, ids)?),
        }),
        sp::Expr::Nested(inner) => Ok(Expr::Nested(Box::new(convert_expr(inner, ids)?))),
        sp::Expr::IsNull(inner) => Ok(Expr::IsNull(Box::new(convert_expr(inner, ids)?))),
        sp::Expr::IsNotNull(inner) => Ok(Expr::IsNotNull(Box::new(convert_expr(inner, ids)?))),
        sp::Expr::Between {
            expr,
            negated,
            low,
            high,
        } => Ok(Expr::Between {
            expr: Box::new(convert_expr(expr, ids)?),
            negated: *negated,
            low: Box::new(convert_expr(low, ids)?),
            high: Box::new(convert_expr(high, ids)?),
        }),
        sp::Expr::InList {
            expr,
            list,
            negated,
        } => Ok(Expr::InList {
            expr: Box::new(convert_expr(expr, ids)?),
            list: list
                .iter()
                .map(|e| convert_expr(e, ids))
                .collect::<Result<Vec<_>, ParseError>>()?,
            negated: *negated,
        }),
        sp::Expr::Case {
            operand,
            conditions,
            results,
            else_result,
        } => {
            let operand = operand
                .as_ref()
                .map(|e| convert_expr(e, ids))
                .transpose()?
                .map(Box::new);
            let when_then = conditions
                .iter()
                .zip(results.iter())
                .map(|(c, r)| Ok((convert_expr(c, ids)?, convert_expr(r, ids)?)))
                .collect::<Result<Vec<_>, ParseError>>()?;
            let else_expr = else_result
                .as_ref()
                .map(|e| convert_expr(e, ids))
                .transpose()?
                .map(Box::new);
            Ok(Expr::Case {
                operand,
                when_then,
                else_expr,
            })
        }
        sp::Expr::Subquery(query) => Ok(Expr::Subquery(Box::new(convert_query(query, ids)?))),
        sp::Expr::Function(func) => convert_function(func, ids),
        other => Ok(Expr::Raw(other.to_string())),
    }
}

fn convert_function(func: &sp::Function, ids: &mut NodeIdGen) -> Result<Expr, ParseError> {
    let name = object_name_to_string(&func.name).to_ascii_uppercase();
    let (args, wildcard_arg) = match &func.args {
        sp::FunctionArguments::List(list) => {
            let mut converted = Vec::new();
            let mut wildcard = false;
            for arg in &list.args {
                match arg {
                    sp::FunctionArg::Unnamed(sp::FunctionArgExpr::Expr(e)) => {
                        converted.push(convert_expr(e, ids)?);
                    }
                    sp::FunctionArg::Unnamed(sp::FunctionArgExpr::Wildcard) => {
                        wildcard = true;
                    }
                    sp::FunctionArg::Unnamed(sp::FunctionArgExpr::QualifiedWildcard(_)) => {
                        wildcard = true;
                    }
                    sp::FunctionArg::Named { arg, .. } => {
                        if let sp::FunctionArgExpr::Expr(e) = arg {
                            converted.push(convert_expr(e, ids)?);
                        }
                    }
                }
            }
            (converted, wildcard)
        }
        sp::FunctionArguments::None => (Vec::new(), false),
        sp::FunctionArguments::Subquery(query) => {
            (vec![Expr::Subquery(Box::new(convert_query(query, ids)?))], false)
        }
    };
    Ok(Expr::Function {
        name,
        args,
        wildcard_arg,
    })
}

fn convert_value(value: &sp::Value) -> Literal {
    match value {
        sp::Value::Number(n, _) => Literal::Number(n.clone()),
        sp::Value::SingleQuotedString(s) => Literal::Str(s.clone()),
        sp::Value::DoubleQuotedString(s) => Literal::Str(s.clone()),
        sp::Value::Boolean(b) => Literal::Boolean(*b),
        sp::Value::Null => Literal::Null,
        sp::Value::Placeholder(p) => Literal::Str(p.clone()),
        other => Literal::Str(other.to_string()),
    }
}

fn convert_binop(op: &sp::BinaryOperator) -> Result<BinOp, ParseError> {
    use sp::BinaryOperator as B;
    Ok(match op {
        B::And => BinOp::And,
        B::Or => BinOp::Or,
        B::Eq => BinOp::Eq,
        B::NotEq => BinOp::NotEq,
        B::Lt => BinOp::Lt,
        B::LtEq => BinOp::LtEq,
        B::Gt => BinOp::Gt,
        B::GtEq => BinOp::GtEq,
        B::Plus => BinOp::Plus,
        B::Minus => BinOp::Minus,
        B::Multiply => BinOp::Multiply,
        B::Divide => BinOp::Divide,
        B::Modulo => BinOp::Modulo,
        B::Like => BinOp::Like,
        B::NotLike => BinOp::NotLike,
        other => {
            return Err(ParseError::UnsupportedStatement(format!(
                "unsupported binary operator: {other:?}"
            )))
        }
    })
}

fn convert_unop(op: &sp::UnaryOperator) -> Result<UnOp, ParseError> {
    use sp::UnaryOperator as U;
    Ok(match op {
        U::Not => UnOp::Not,
        U::Minus => UnOp::Minus,
        U::Plus => UnOp::Plus,
        other => {
            return Err(ParseError::UnsupportedStatement(format!(
                "unsupported unary operator: {other:?}"
            )))
        }
    })
}

fn ident_to_string(ident: &sp::Ident) -> String {
    ident.value.clone()
}

fn object_name_to_string(name: &sp::ObjectName) -> String {
    name.0.iter().map(ident_to_string).collect::<Vec<_>>().join(".")
}

/// Re-exported for callers (e.g. `policy::normalize_legacy_json`'s tests)
/// that want to build a minimal AST from raw SQL without going through
/// [`crate::analyzer`].
pub fn parse_expr_standalone(sql: &str, dialect: Dialect) -> Result<ast::Expr, ParseError> {
    let sp_dialect = dialect.as_sqlparser_dialect();
    let mut parser = SqlParser::new(&*sp_dialect).try_with_sql(sql)?;
    let expr = parser.parse_expr()?;
    let mut ids = NodeIdGen::new();
    convert_expr(&expr, &mut ids)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_select() {
        let stmt = parse_one_statement("SELECT id, name FROM users", Dialect::Generic).unwrap();
        match stmt {
            Stmt::Select(s) => {
                assert_eq!(s.projection.len(), 2);
                assert_eq!(s.from.len(), 1);
            }
            _ => panic!("expected a Select"),
        }
    }

    #[test]
    fn rejects_multiple_statements() {
        let err = parse_one_statement("SELECT 1; SELECT 2", Dialect::Generic).unwrap_err();
        assert_eq!(err, ParseError::MultipleStatements);
    }

    #[test]
    fn parses_forbidden_statement_kind_as_ast_node() {
        let stmt =
            parse_one_statement("DELETE FROM users WHERE id = 1", Dialect::Generic).unwrap();
        assert!(matches!(stmt, Stmt::Forbidden { kind, .. } if kind == "DELETE"));
    }

    #[test]
    fn rejects_genuinely_unsupported_statements() {
        let err = parse_one_statement("VALUES (1), (2)", Dialect::Generic).unwrap_err();
        assert!(matches!(err, ParseError::UnsupportedStatement(_)));
    }

    #[test]
    fn dialect_from_tag_falls_back_to_generic() {
        assert_eq!(Dialect::from_tag("trino"), Dialect::Trino);
        assert_eq!(Dialect::from_tag("something-unknown"), Dialect::Generic);
    }

    #[test]
    fn parses_join_with_on_clause() {
        let stmt = parse_one_statement(
            "SELECT a.id FROM a JOIN b ON a.id = b.a_id",
            Dialect::Generic,
        )
        .unwrap();
        match stmt {
            Stmt::Select(s) => match &s.from[0] {
                Source::Join(join) => assert!(join.on.is_some()),
                _ => panic!("expected a join source"),
            },
            _ => panic!("expected a Select"),
        }
    }

    #[test]
    fn parses_where_with_between() {
        let stmt = parse_one_statement(
            "SELECT id FROM orders WHERE amount BETWEEN 1 AND 100",
            Dialect::Generic,
        )
        .unwrap();
        match stmt {
            Stmt::Select(s) => assert!(matches!(s.selection, Some(Expr::Between { .. }))),
            _ => panic!("expected a Select"),
        }
    }
}
