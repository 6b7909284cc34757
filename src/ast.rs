//! The analyzer's own SQL abstract syntax tree.
//!
//! `sqlparser` gives us a parse tree, but its shape is an implementation
//! detail of whatever `sqlparser` version we're linked against. The parser
//! adapter (`parser` module) converts a `sqlparser::ast::Statement` into the
//! tree defined here — a small, stable, discriminated union matching the
//! data model in the specification — and every other component (scope
//! resolution, column checking, restriction enforcement, anti-pattern
//! detection, rewriting, serialization) works exclusively with this tree.
//!
//! Nodes are owned and mutated in place (`&mut SelectStmt`, etc.) rather than
//! rebuilt bottom-up; Rust's ownership model makes that both safe and the
//! natural idiom here, since one `verify_sql` call exclusively owns its tree
//! for the duration of the call.

use std::fmt;

/// A stable identity for AST nodes the rewriter may mutate.
///
/// Assigned monotonically as the tree is built; not otherwise meaningful.
/// Useful for debugging and for the idempotence tests, which want to
/// confirm a second analysis pass touches nothing.
pub type NodeId = u32;

/// Monotonic [`NodeId`] generator, one per parse.
#[derive(Debug, Default)]
pub struct NodeIdGen(u32);

impl NodeIdGen {
    /// Creates a fresh generator starting at zero.
    pub fn new() -> Self {
        Self(0)
    }

    /// Returns the next unused id.
    pub fn next(&mut self) -> NodeId {
        let id = self.0;
        self.0 += 1;
        id
    }
}

/// A top-level (or nested) query statement.
#[derive(Debug, Clone)]
pub enum Stmt {
    /// A single `SELECT`.
    Select(SelectStmt),
    /// `UNION` / `INTERSECT` / `EXCEPT` of two statements.
    SetOp(SetOpStmt),
    /// A `WITH` (CTE) block wrapping a body statement.
    With(WithStmt),
    /// A statement kind the policy forbids outright (`INSERT`, `UPDATE`,
    /// `DELETE`, `DROP`, `ALTER`, `TRUNCATE`, `CREATE`, ...). The parser
    /// adapter recognizes these by shape but does not reject them at parse
    /// time — the default policy only ever permits `SELECT`, and that is a
    /// policy decision the analyzer reports as a verdict violation (spec
    /// §4.6), not an input-plane parse failure.
    Forbidden {
        /// Stable node identity.
        id: NodeId,
        /// The statement kind as it should read in diagnostics, e.g. `"DELETE"`.
        kind: String,
    },
}

impl Stmt {
    /// Returns the node id of this statement's outermost node.
    pub fn id(&self) -> NodeId {
        match self {
            Stmt::Select(s) => s.id,
            Stmt::SetOp(s) => s.id,
            Stmt::With(s) => s.id,
            Stmt::Forbidden { id, .. } => *id,
        }
    }
}

/// A single projection item in a `SELECT` list.
#[derive(Debug, Clone)]
pub enum Projection {
    /// A bare expression, e.g. `id` or `id + 1`.
    Expr(Expr),
    /// An aliased expression, e.g. `id AS identifier`.
    ExprWithAlias(Expr, String),
    /// `*`.
    Wildcard,
    /// `t.*`.
    QualifiedWildcard(String),
}

/// A `SELECT` statement.
#[derive(Debug, Clone)]
pub struct SelectStmt {
    /// Stable node identity.
    pub id: NodeId,
    /// `SELECT DISTINCT ...`.
    pub distinct: bool,
    /// The projection list, e.g. `SELECT a, b`. Mutated in place by the
    /// column checker (C4) when illegal columns are stripped.
    pub projection: Vec<Projection>,
    /// `FROM` sources, one entry per top-level comma-separated source
    /// (each of which may itself be a join tree).
    pub from: Vec<Source>,
    /// `WHERE` clause. Mutated in place by the restriction enforcer (C5)
    /// and the anti-pattern detector (C6).
    pub selection: Option<Expr>,
    /// `GROUP BY` expressions.
    pub group_by: Vec<Expr>,
    /// `HAVING` clause.
    pub having: Option<Expr>,
    /// `ORDER BY` items.
    pub order_by: Vec<OrderByItem>,
    /// `LIMIT` expression.
    pub limit: Option<Expr>,
    /// `OFFSET` expression.
    pub offset: Option<Expr>,
}

/// One `ORDER BY` item.
#[derive(Debug, Clone)]
pub struct OrderByItem {
    /// The expression being ordered on.
    pub expr: Expr,
    /// `true` for ascending (the default), `false` for `DESC`.
    pub asc: bool,
}

/// A set operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetOperator {
    /// `UNION`.
    Union,
    /// `INTERSECT`.
    Intersect,
    /// `EXCEPT`.
    Except,
}

/// A `UNION`/`INTERSECT`/`EXCEPT` of two statements.
#[derive(Debug, Clone)]
pub struct SetOpStmt {
    /// Stable node identity.
    pub id: NodeId,
    /// Which set operator joins the two arms.
    pub op: SetOperator,
    /// `true` for the `ALL` variant (duplicates kept).
    pub all: bool,
    /// Left arm, analyzed independently of the right.
    pub left: Box<Stmt>,
    /// Right arm, analyzed independently of the left.
    pub right: Box<Stmt>,
}

/// One CTE binding inside a `WITH` clause.
#[derive(Debug, Clone)]
pub struct CteBinding {
    /// The name the CTE is bound to; shadows outer tables of the same name.
    pub name: String,
    /// The CTE's own query.
    pub query: Stmt,
}

/// A `WITH` block: CTE bindings plus the body statement that uses them.
#[derive(Debug, Clone)]
pub struct WithStmt {
    /// Stable node identity.
    pub id: NodeId,
    /// The CTE bindings, in declaration order.
    pub ctes: Vec<CteBinding>,
    /// The statement that follows the `WITH` clause.
    pub body: Box<Stmt>,
}

/// A `FROM`-clause source: a table, a derived table (subquery), or a join
/// of two sources.
#[derive(Debug, Clone)]
pub enum Source {
    /// A table reference, optionally aliased.
    Table {
        /// The table name as written (dotted parts joined with `.`).
        name: String,
        /// `AS alias`, if present.
        alias: Option<String>,
    },
    /// A subquery in `FROM`, always aliased (`FROM (SELECT ...) AS t`).
    Derived {
        /// The subquery.
        query: Box<Stmt>,
        /// The mandatory alias.
        alias: String,
    },
    /// A join of two sources.
    Join(Box<JoinSource>),
}

/// The kind of join connecting two sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    /// `[INNER] JOIN`.
    Inner,
    /// `LEFT [OUTER] JOIN`.
    Left,
    /// `RIGHT [OUTER] JOIN`.
    Right,
    /// `FULL [OUTER] JOIN`.
    Full,
    /// `CROSS JOIN`.
    Cross,
}

/// A join of a left and right source.
#[derive(Debug, Clone)]
pub struct JoinSource {
    /// Left side of the join.
    pub left: Source,
    /// Right side of the join.
    pub right: Source,
    /// The join kind.
    pub kind: JoinKind,
    /// The `ON` predicate, if any (`USING` is normalized away during
    /// parsing into an equivalent equality predicate per column).
    pub on: Option<Expr>,
}

/// A literal scalar value.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    /// A numeric literal, kept as its original text to avoid float
    /// precision loss; parsed on demand where a numeric comparison is
    /// needed.
    Number(String),
    /// A single-quoted (or double-quoted) string literal.
    Str(String),
    /// `TRUE` / `FALSE`.
    Boolean(bool),
    /// `NULL`.
    Null,
}

/// A binary operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    /// `AND`.
    And,
    /// `OR`.
    Or,
    /// `=`.
    Eq,
    /// `<>` or `!=`.
    NotEq,
    /// `<`.
    Lt,
    /// `<=`.
    LtEq,
    /// `>`.
    Gt,
    /// `>=`.
    GtEq,
    /// `+`.
    Plus,
    /// `-`.
    Minus,
    /// `*`.
    Multiply,
    /// `/`.
    Divide,
    /// `%`.
    Modulo,
    /// `LIKE`.
    Like,
    /// `NOT LIKE`.
    NotLike,
}

impl BinOp {
    /// Renders the canonical SQL spelling of this operator.
    pub fn as_sql(self) -> &'static str {
        match self {
            BinOp::And => "AND",
            BinOp::Or => "OR",
            BinOp::Eq => "=",
            BinOp::NotEq => "<>",
            BinOp::Lt => "<",
            BinOp::LtEq => "<=",
            BinOp::Gt => ">",
            BinOp::GtEq => ">=",
            BinOp::Plus => "+",
            BinOp::Minus => "-",
            BinOp::Multiply => "*",
            BinOp::Divide => "/",
            BinOp::Modulo => "%",
            BinOp::Like => "LIKE",
            BinOp::NotLike => "NOT LIKE",
        }
    }
}

/// A unary operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnOp {
    /// `NOT`.
    Not,
    /// Unary `-`.
    Minus,
    /// Unary `+`.
    Plus,
}

/// An expression tree node.
#[derive(Debug, Clone)]
pub enum Expr {
    /// A column reference, optionally table-qualified (`t.col` vs `col`).
    Column {
        /// The qualifying table/alias, if the reference was compound.
        table: Option<String>,
        /// The column name.
        name: String,
    },
    /// A literal scalar.
    Literal(Literal),
    /// A function call, e.g. `COUNT(*)`, `UPPER(name)`.
    Function {
        /// Function name, uppercased for comparison purposes by callers.
        name: String,
        /// Argument expressions (empty for a bare wildcard argument).
        args: Vec<Expr>,
        /// Whether the sole argument was `*` (e.g. `COUNT(*)`).
        wildcard_arg: bool,
    },
    /// A binary operation.
    BinaryOp {
        /// Left operand.
        left: Box<Expr>,
        /// The operator.
        op: BinOp,
        /// Right operand.
        right: Box<Expr>,
    },
    /// A unary operation.
    UnaryOp {
        /// The operator.
        op: UnOp,
        /// The operand.
        expr: Box<Expr>,
    },
    /// A parenthesized expression, kept distinct from its inner expression
    /// so the serializer can decide whether the parentheses are still
    /// needed (spec §4.7: "redundant parentheses elided except where
    /// needed by precedence").
    Nested(Box<Expr>),
    /// `expr IS NULL`.
    IsNull(Box<Expr>),
    /// `expr IS NOT NULL`.
    IsNotNull(Box<Expr>),
    /// `expr [NOT] BETWEEN low AND high`.
    Between {
        /// The tested expression.
        expr: Box<Expr>,
        /// `true` for `NOT BETWEEN`.
        negated: bool,
        /// Lower bound.
        low: Box<Expr>,
        /// Upper bound.
        high: Box<Expr>,
    },
    /// `expr [NOT] IN (list)`.
    InList {
        /// The tested expression.
        expr: Box<Expr>,
        /// The candidate list.
        list: Vec<Expr>,
        /// `true` for `NOT IN`.
        negated: bool,
    },
    /// `CASE [operand] WHEN ... THEN ... [ELSE ...] END`.
    Case {
        /// The `CASE operand` form's subject, if present (simple CASE).
        operand: Option<Box<Expr>>,
        /// `(condition, result)` pairs, in order.
        when_then: Vec<(Expr, Expr)>,
        /// The `ELSE` result, if present.
        else_expr: Option<Box<Expr>>,
    },
    /// A scalar/derived-table subquery appearing inside an expression.
    Subquery(Box<Stmt>),
    /// Anything we parsed but chose not to model structurally (rare; kept
    /// as its already-serialized SQL text). Conservatively treated as
    /// containing a column reference so it is never mistaken for a
    /// constant by the always-true detector.
    Raw(String),
}

/// An owned column reference, as collected by [`collect_columns`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnRef {
    /// The qualifying table/alias, if compound.
    pub table: Option<String>,
    /// The column name.
    pub name: String,
}

impl fmt::Display for ColumnRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.table {
            Some(t) => write!(f, "{t}.{}", self.name),
            None => write!(f, "{}", self.name),
        }
    }
}

/// Collects every column reference appearing anywhere in `expr`.
///
/// Walks into function arguments, `CASE` branches, `BETWEEN` bounds and
/// `IN` lists. A `Subquery` is walked independently by the scope resolver,
/// not here, so this function does not descend into one.
pub fn collect_columns(expr: &Expr, out: &mut Vec<ColumnRef>) {
    match expr {
        Expr::Column { table, name } => out.push(ColumnRef {
            table: table.clone(),
            name: name.clone(),
        }),
        Expr::Literal(_) | Expr::Subquery(_) | Expr::Raw(_) => {}
        Expr::Function { args, .. } => {
            for a in args {
                collect_columns(a, out);
            }
        }
        Expr::BinaryOp { left, right, .. } => {
            collect_columns(left, out);
            collect_columns(right, out);
        }
        Expr::UnaryOp { expr, .. } | Expr::Nested(expr) => collect_columns(expr, out),
        Expr::IsNull(e) | Expr::IsNotNull(e) => collect_columns(e, out),
        Expr::Between {
            expr, low, high, ..
        } => {
            collect_columns(expr, out);
            collect_columns(low, out);
            collect_columns(high, out);
        }
        Expr::InList { expr, list, .. } => {
            collect_columns(expr, out);
            for item in list {
                collect_columns(item, out);
            }
        }
        Expr::Case {
            operand,
            when_then,
            else_expr,
        } => {
            if let Some(o) = operand {
                collect_columns(o, out);
            }
            for (cond, res) in when_then {
                collect_columns(cond, out);
                collect_columns(res, out);
            }
            if let Some(e) = else_expr {
                collect_columns(e, out);
            }
        }
    }
}

/// Returns every column reference in `expr` as an owned vector.
pub fn column_refs(expr: &Expr) -> Vec<ColumnRef> {
    let mut out = Vec::new();
    collect_columns(expr, &mut out);
    out
}

/// `true` if `expr` references any column, anywhere (including a nested
/// subquery, conservatively).
pub fn contains_column_ref(expr: &Expr) -> bool {
    if matches!(expr, Expr::Subquery(_) | Expr::Raw(_)) {
        return true;
    }
    !column_refs(expr).is_empty()
}

/// A constant-folded scalar, used only to detect always-true predicates.
#[derive(Debug, Clone, PartialEq)]
enum ConstValue {
    Bool(bool),
    Num(f64),
    Str(String),
    Null,
}

fn fold_const(expr: &Expr) -> Option<ConstValue> {
    match expr {
        Expr::Literal(Literal::Boolean(b)) => Some(ConstValue::Bool(*b)),
        Expr::Literal(Literal::Number(n)) => n.parse::<f64>().ok().map(ConstValue::Num),
        Expr::Literal(Literal::Str(s)) => Some(ConstValue::Str(s.clone())),
        Expr::Literal(Literal::Null) => Some(ConstValue::Null),
        Expr::Nested(inner) => fold_const(inner),
        Expr::UnaryOp {
            op: UnOp::Not,
            expr,
        } => match fold_const(expr)? {
            ConstValue::Bool(b) => Some(ConstValue::Bool(!b)),
            _ => None,
        },
        Expr::IsNull(inner) => Some(ConstValue::Bool(matches!(
            fold_const(inner)?,
            ConstValue::Null
        ))),
        Expr::IsNotNull(inner) => Some(ConstValue::Bool(!matches!(
            fold_const(inner)?,
            ConstValue::Null
        ))),
        Expr::BinaryOp { left, op, right } => {
            let l = fold_const(left)?;
            let r = fold_const(right)?;
            fold_binop(*op, &l, &r)
        }
        _ => None,
    }
}

fn fold_binop(op: BinOp, l: &ConstValue, r: &ConstValue) -> Option<ConstValue> {
    use ConstValue::*;
    match op {
        BinOp::And => match (l, r) {
            (Bool(a), Bool(b)) => Some(Bool(*a && *b)),
            _ => None,
        },
        BinOp::Or => match (l, r) {
            (Bool(a), Bool(b)) => Some(Bool(*a || *b)),
            _ => None,
        },
        BinOp::Eq | BinOp::NotEq | BinOp::Lt | BinOp::LtEq | BinOp::Gt | BinOp::GtEq => {
            // SQL NULL comparisons are unknown, never provably true.
            if matches!(l, Null) || matches!(r, Null) {
                return None;
            }
            let ordering = match (l, r) {
                (Num(a), Num(b)) => a.partial_cmp(b),
                (Str(a), Str(b)) => Some(a.cmp(b)),
                (Bool(a), Bool(b)) => Some(a.cmp(b)),
                _ => None,
            }?;
            use std::cmp::Ordering::*;
            let result = match op {
                BinOp::Eq => ordering == Equal,
                BinOp::NotEq => ordering != Equal,
                BinOp::Lt => ordering == Less,
                BinOp::LtEq => ordering != Greater,
                BinOp::Gt => ordering == Greater,
                BinOp::GtEq => ordering != Less,
                _ => unreachable!(),
            };
            Some(Bool(result))
        }
        _ => None,
    }
}

/// `true` if `expr` is a Boolean expression that provably evaluates to
/// `TRUE` from constants alone, with no column reference anywhere in it.
///
/// Deliberately syntactic: this does not attempt to prove tautologies over
/// columns (e.g. `x = x`) — that is explicitly out of scope (spec §9).
pub fn is_always_true(expr: &Expr) -> bool {
    if contains_column_ref(expr) {
        return false;
    }
    matches!(fold_const(expr), Some(ConstValue::Bool(true)))
}

/// Splits a `WHERE`/`HAVING` expression into its top-level conjunction
/// clauses, per spec §4.5: disjunctions at the top level are treated as a
/// single opaque clause, and parenthesized `AND` chains are flattened
/// transparently.
pub fn split_conjunction(expr: &Expr) -> Vec<&Expr> {
    match expr {
        Expr::BinaryOp {
            left,
            op: BinOp::And,
            right,
        } => {
            let mut clauses = split_conjunction(left);
            clauses.extend(split_conjunction(right));
            clauses
        }
        Expr::Nested(inner) => split_conjunction(inner),
        other => vec![other],
    }
}

/// Splits a Boolean expression into its top-level disjunction arms,
/// analogous to [`split_conjunction`] but for `OR`. Used by the restriction
/// enforcer to apply spec §4.5's rule that a disjunction only satisfies a
/// restriction when every disjunct independently does.
pub fn split_disjunction(expr: &Expr) -> Vec<&Expr> {
    match expr {
        Expr::BinaryOp {
            left,
            op: BinOp::Or,
            right,
        } => {
            let mut arms = split_disjunction(left);
            arms.extend(split_disjunction(right));
            arms
        }
        Expr::Nested(inner) => split_disjunction(inner),
        other => vec![other],
    }
}

/// Conjoins `existing` (if any) with `addition` via `AND`, wrapping the
/// prior expression in parentheses as the specification requires (spec
/// §4.5: "conjoin the restriction predicate to the existing WHERE via
/// `AND` (wrapping the prior WHERE in parentheses)").
pub fn conjoin(existing: Option<Expr>, addition: Expr) -> Expr {
    match existing {
        Some(prior) => Expr::BinaryOp {
            left: Box::new(Expr::Nested(Box::new(prior))),
            op: BinOp::And,
            right: Box::new(addition),
        },
        None => addition,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn col(name: &str) -> Expr {
        Expr::Column {
            table: None,
            name: name.to_string(),
        }
    }

    fn num(n: &str) -> Expr {
        Expr::Literal(Literal::Number(n.to_string()))
    }

    #[test]
    fn always_true_detects_numeric_tautology() {
        let expr = Expr::BinaryOp {
            left: Box::new(num("1")),
            op: BinOp::Eq,
            right: Box::new(num("1")),
        };
        assert!(is_always_true(&expr));
    }

    #[test]
    fn always_true_detects_string_equality() {
        let expr = Expr::BinaryOp {
            left: Box::new(Expr::Literal(Literal::Str("a".into()))),
            op: BinOp::Eq,
            right: Box::new(Expr::Literal(Literal::Str("a".into()))),
        };
        assert!(is_always_true(&expr));
    }

    #[test]
    fn always_true_detects_bool_literal() {
        assert!(is_always_true(&Expr::Literal(Literal::Boolean(true))));
    }

    #[test]
    fn always_true_detects_null_is_null() {
        let expr = Expr::IsNull(Box::new(Expr::Literal(Literal::Null)));
        assert!(is_always_true(&expr));
    }

    #[test]
    fn always_true_rejects_column_reference() {
        let expr = Expr::BinaryOp {
            left: Box::new(col("x")),
            op: BinOp::Eq,
            right: Box::new(col("x")),
        };
        assert!(!is_always_true(&expr));
    }

    #[test]
    fn always_true_rejects_false_literal() {
        assert!(!is_always_true(&Expr::Literal(Literal::Boolean(false))));
    }

    #[test]
    fn split_conjunction_flattens_and_chain() {
        let expr = Expr::BinaryOp {
            left: Box::new(Expr::BinaryOp {
                left: Box::new(col("a")),
                op: BinOp::Eq,
                right: Box::new(num("1")),
            }),
            op: BinOp::And,
            right: Box::new(Expr::BinaryOp {
                left: Box::new(col("b")),
                op: BinOp::Eq,
                right: Box::new(num("2")),
            }),
        };
        assert_eq!(split_conjunction(&expr).len(), 2);
    }

    #[test]
    fn split_conjunction_treats_or_as_opaque() {
        let expr = Expr::BinaryOp {
            left: Box::new(col("a")),
            op: BinOp::Or,
            right: Box::new(col("b")),
        };
        assert_eq!(split_conjunction(&expr).len(), 1);
    }

    #[test]
    fn split_conjunction_unwraps_parenthesized_and() {
        let inner = Expr::BinaryOp {
            left: Box::new(col("a")),
            op: BinOp::And,
            right: Box::new(col("b")),
        };
        let expr = Expr::Nested(Box::new(inner));
        assert_eq!(split_conjunction(&expr).len(), 2);
    }

    #[test]
    fn column_refs_walks_function_args() {
        let expr = Expr::Function {
            name: "UPPER".into(),
            args: vec![col("name")],
            wildcard_arg: false,
        };
        let refs = column_refs(&expr);
        assert_eq!(
            refs,
            vec![ColumnRef {
                table: None,
                name: "name".into()
            }]
        );
    }
}
