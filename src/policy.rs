//! Policy model and validator (C1).
//!
//! A [`Policy`] is the crate's in-memory, validated representation of the
//! declarative allow-list: which tables may be queried, which columns of
//! each are visible, and which row-level restrictions must hold. It is
//! built either by parsing the wire JSON shape ([`Policy::from_json`]) or
//! programmatically ([`PolicyBuilder`]); both paths run the same
//! validation, so a `Policy` value is always internally consistent by
//! construction — nothing downstream re-checks these invariants.

use std::collections::HashSet;

use log::warn;
use serde::Deserialize;
use serde_json::Value as Json;

use crate::error::{InputError, PolicyError, UnsupportedRestrictionError};

/// A scalar value appearing in a restriction.
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    /// A numeric value.
    Number(f64),
    /// A string value.
    Str(String),
    /// A boolean value.
    Bool(bool),
}

impl Scalar {
    fn kind(&self) -> &'static str {
        match self {
            Scalar::Number(_) => "number",
            Scalar::Str(_) => "string",
            Scalar::Bool(_) => "bool",
        }
    }

    fn from_json(v: &Json) -> Option<Scalar> {
        match v {
            Json::Number(n) => n.as_f64().map(Scalar::Number),
            Json::String(s) => Some(Scalar::Str(s.clone())),
            Json::Bool(b) => Some(Scalar::Bool(*b)),
            _ => None,
        }
    }
}

/// A scalar comparison operator (`< > <= >=`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    /// `<`.
    Lt,
    /// `>`.
    Gt,
    /// `<=`.
    LtEq,
    /// `>=`.
    GtEq,
}

impl CmpOp {
    fn as_sql(self) -> &'static str {
        match self {
            CmpOp::Lt => "<",
            CmpOp::Gt => ">",
            CmpOp::LtEq => "<=",
            CmpOp::GtEq => ">=",
        }
    }
}

/// A row-level restriction on one column of one table.
///
/// Modeled as a tagged union rather than a generic `{ operation, values }`
/// pair (spec §9): each variant can only hold data shaped the way that
/// operation actually needs, so a restriction that has already passed
/// validation can never be malformed downstream (no "BETWEEN with three
/// values" state is representable).
#[derive(Debug, Clone, PartialEq)]
pub enum Restriction {
    /// `column = value`.
    Eq { column: String, value: Scalar },
    /// `column OP value` for `< > <= >=`.
    Cmp {
        column: String,
        op: CmpOp,
        value: Scalar,
    },
    /// `column BETWEEN low AND high`.
    Between {
        column: String,
        low: Scalar,
        high: Scalar,
    },
    /// `column IN (values...)`.
    In { column: String, values: Vec<Scalar> },
}

impl Restriction {
    /// The column this restriction constrains.
    pub fn column(&self) -> &str {
        match self {
            Restriction::Eq { column, .. }
            | Restriction::Cmp { column, .. }
            | Restriction::Between { column, .. }
            | Restriction::In { column, .. } => column,
        }
    }

    /// Renders the canonical SQL predicate text this restriction demands,
    /// e.g. `account_id = 123` or `region IN ('us', 'eu')`. Used both by
    /// the enforcer to inject a missing restriction and by its satisfaction
    /// check to compare against what's already present.
    pub fn to_sql(&self) -> String {
        match self {
            Restriction::Eq { column, value } => {
                format!("{column} = {}", scalar_sql(value))
            }
            Restriction::Cmp { column, op, value } => {
                format!("{column} {} {}", op.as_sql(), scalar_sql(value))
            }
            Restriction::Between { column, low, high } => {
                format!(
                    "{column} BETWEEN {} AND {}",
                    scalar_sql(low),
                    scalar_sql(high)
                )
            }
            Restriction::In { column, values } => {
                let rendered = values
                    .iter()
                    .map(scalar_sql)
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("{column} IN ({rendered})")
            }
        }
    }
}

fn scalar_sql(value: &Scalar) -> String {
    match value {
        Scalar::Number(n) => {
            if n.fract() == 0.0 && n.abs() < 1e15 {
                format!("{}", *n as i64)
            } else {
                n.to_string()
            }
        }
        Scalar::Str(s) => format!("'{}'", s.replace('\'', "''")),
        Scalar::Bool(b) => b.to_string().to_uppercase(),
    }
}

/// A validated table entry: the allowed column list and row-level
/// restrictions for one table.
#[derive(Debug, Clone)]
pub struct TableSpec {
    /// Table name as written in the policy.
    pub name: String,
    name_lower: String,
    /// Allowed columns, in declaration order, original case preserved.
    pub columns: Vec<String>,
    columns_lower: HashSet<String>,
    /// Row-level restrictions attached to this table.
    pub restrictions: Vec<Restriction>,
}

impl TableSpec {
    /// `true` if `column` (case-insensitive) is in this table's allow-list.
    pub fn allows_column(&self, column: &str) -> bool {
        self.columns_lower.contains(&column.to_ascii_lowercase())
    }

    /// Restrictions attached to `column` (case-insensitive), usually zero
    /// or one but a policy may layer more than one onto the same column.
    pub fn restrictions_for(&self, column: &str) -> impl Iterator<Item = &Restriction> {
        let wanted = column.to_ascii_lowercase();
        self.restrictions
            .iter()
            .filter(move |r| r.column().to_ascii_lowercase() == wanted)
    }
}

/// A validated policy: the full set of tables a caller may query, what
/// columns of each they may see, and what row-level restrictions apply.
#[derive(Debug, Clone, Default)]
pub struct Policy {
    tables: Vec<TableSpec>,
}

impl Policy {
    /// Looks up a table by name, case-insensitively.
    pub fn table(&self, name: &str) -> Option<&TableSpec> {
        let lower = name.to_ascii_lowercase();
        self.tables.iter().find(|t| t.name_lower == lower)
    }

    /// Iterates every table in the policy.
    pub fn tables(&self) -> impl Iterator<Item = &TableSpec> {
        self.tables.iter()
    }

    /// Parses and validates a policy from its wire JSON representation:
    /// `{"tables": [{"table_name": ..., "columns": [...], "restrictions": [...]}]}`.
    pub fn from_json(json: &str) -> Result<Policy, InputError> {
        let wire: WirePolicy = serde_json::from_str(json)
            .map_err(|e| InputError::Internal(format!("invalid policy JSON: {e}")))?;
        Policy::from_wire(wire)
    }

    fn from_wire(wire: WirePolicy) -> Result<Policy, InputError> {
        let mut tables = Vec::with_capacity(wire.tables.len());
        for (index, table) in wire.tables.into_iter().enumerate() {
            tables.push(validate_table(index, table)?);
        }
        Ok(Policy { tables })
    }
}

#[derive(Debug, Deserialize)]
struct WirePolicy {
    tables: Vec<WireTable>,
}

#[derive(Debug, Deserialize)]
struct WireTable {
    table_name: String,
    columns: Vec<String>,
    #[serde(default)]
    restrictions: Vec<WireRestriction>,
}

#[derive(Debug, Deserialize)]
struct WireRestriction {
    column: String,
    operation: String,
    #[serde(default)]
    value: Option<Json>,
    #[serde(default)]
    values: Option<Vec<Json>>,
}

fn validate_table(index: usize, table: WireTable) -> Result<TableSpec, InputError> {
    if table.table_name.trim().is_empty() {
        return Err(PolicyError::EmptyTableName { index }.into());
    }
    if table.columns.is_empty() {
        return Err(PolicyError::EmptyColumnList {
            table: table.table_name.clone(),
        }
        .into());
    }

    let columns_lower: HashSet<String> = table
        .columns
        .iter()
        .map(|c| c.to_ascii_lowercase())
        .collect();

    let mut restrictions = Vec::with_capacity(table.restrictions.len());
    for wire_restriction in table.restrictions {
        if !columns_lower.contains(&wire_restriction.column.to_ascii_lowercase()) {
            return Err(PolicyError::RestrictionColumnNotAllowed {
                table: table.table_name.clone(),
                column: wire_restriction.column,
            }
            .into());
        }
        restrictions.push(validate_restriction(&table.table_name, wire_restriction)?);
    }

    Ok(TableSpec {
        name_lower: table.table_name.to_ascii_lowercase(),
        name: table.table_name,
        columns: table.columns,
        columns_lower,
        restrictions,
    })
}

fn validate_restriction(
    table: &str,
    wire: WireRestriction,
) -> Result<Restriction, InputError> {
    let WireRestriction {
        column,
        operation,
        value,
        values,
    } = wire;

    match operation.as_str() {
        "=" => {
            let scalar = single_scalar(table, &column, &operation, value)?;
            Ok(Restriction::Eq {
                column,
                value: scalar,
            })
        }
        op @ ("<" | ">" | "<=" | ">=") => {
            let scalar = numeric_scalar(table, &column, &operation, value)?;
            let cmp = match op {
                "<" => CmpOp::Lt,
                ">" => CmpOp::Gt,
                "<=" => CmpOp::LtEq,
                ">=" => CmpOp::GtEq,
                _ => unreachable!(),
            };
            Ok(Restriction::Cmp {
                column,
                op: cmp,
                value: scalar,
            })
        }
        "BETWEEN" => {
            let values = values.ok_or_else(|| {
                InputError::from(PolicyError::InvalidBetween {
                    table: table.to_string(),
                    column: column.clone(),
                })
            })?;
            if values.len() != 2 {
                return Err(PolicyError::InvalidBetween {
                    table: table.to_string(),
                    column,
                }
                .into());
            }
            let low = Scalar::from_json(&values[0]);
            let high = Scalar::from_json(&values[1]);
            let (Some(Scalar::Number(low)), Some(Scalar::Number(high))) = (low, high) else {
                return Err(PolicyError::InvalidBetween {
                    table: table.to_string(),
                    column,
                }
                .into());
            };
            if !(low < high) {
                return Err(PolicyError::InvalidBetween {
                    table: table.to_string(),
                    column,
                }
                .into());
            }
            Ok(Restriction::Between {
                column,
                low: Scalar::Number(low),
                high: Scalar::Number(high),
            })
        }
        "IN" => {
            let values = values.ok_or_else(|| {
                InputError::from(PolicyError::InvalidIn {
                    table: table.to_string(),
                    column: column.clone(),
                })
            })?;
            if values.is_empty() {
                return Err(PolicyError::InvalidIn {
                    table: table.to_string(),
                    column,
                }
                .into());
            }
            let scalars: Option<Vec<Scalar>> =
                values.iter().map(Scalar::from_json).collect();
            let Some(scalars) = scalars else {
                return Err(PolicyError::InvalidIn {
                    table: table.to_string(),
                    column,
                }
                .into());
            };
            let first_kind = scalars[0].kind();
            if !scalars.iter().all(|s| s.kind() == first_kind) {
                return Err(PolicyError::InvalidIn {
                    table: table.to_string(),
                    column,
                }
                .into());
            }
            Ok(Restriction::In {
                column,
                values: scalars,
            })
        }
        other => {
            warn!("policy for table '{table}' column '{column}' uses unsupported operation '{other}'");
            Err(UnsupportedRestrictionError {
                table: table.to_string(),
                column,
                operation: other.to_string(),
            }
            .into())
        }
    }
}

fn single_scalar(
    table: &str,
    column: &str,
    operation: &str,
    value: Option<Json>,
) -> Result<Scalar, InputError> {
    let value = value.ok_or_else(|| {
        InputError::from(PolicyError::InvalidScalarValue {
            table: table.to_string(),
            column: column.to_string(),
            operation: operation.to_string(),
        })
    })?;
    Scalar::from_json(&value).ok_or_else(|| {
        PolicyError::InvalidScalarValue {
            table: table.to_string(),
            column: column.to_string(),
            operation: operation.to_string(),
        }
        .into()
    })
}

/// Like [`single_scalar`], but for `< > <= >=`, which only ever compare
/// numerically: a string or boolean value is rejected the same way a
/// missing value is.
fn numeric_scalar(
    table: &str,
    column: &str,
    operation: &str,
    value: Option<Json>,
) -> Result<Scalar, InputError> {
    let scalar = single_scalar(table, column, operation, value)?;
    match scalar {
        Scalar::Number(_) => Ok(scalar),
        _ => Err(PolicyError::InvalidScalarValue {
            table: table.to_string(),
            column: column.to_string(),
            operation: operation.to_string(),
        }
        .into()),
    }
}

/// Builds a [`Policy`] programmatically, without going through JSON.
///
/// Mirrors the wire validation exactly — `build()` runs the same checks
/// `from_json` does, so there is no way to construct an invalid `Policy`
/// through either path.
#[derive(Debug, Default)]
pub struct PolicyBuilder {
    tables: Vec<WireTable>,
}

impl PolicyBuilder {
    /// Creates an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a table with the given allowed columns. Call
    /// [`PolicyBuilder::restrict`] afterwards to attach row-level
    /// restrictions to it.
    pub fn table(mut self, name: impl Into<String>, columns: &[&str]) -> Self {
        self.tables.push(WireTable {
            table_name: name.into(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
            restrictions: Vec::new(),
        });
        self
    }

    /// Attaches a restriction to the most recently added table.
    ///
    /// `value`/`values` are raw JSON values so the same scalar coercion
    /// used by `from_json` applies uniformly.
    pub fn restrict(
        mut self,
        column: impl Into<String>,
        operation: impl Into<String>,
        value: Option<Json>,
        values: Option<Vec<Json>>,
    ) -> Self {
        if let Some(last) = self.tables.last_mut() {
            last.restrictions.push(WireRestriction {
                column: column.into(),
                operation: operation.into(),
                value,
                values,
            });
        }
        self
    }

    /// Validates the accumulated tables and produces a [`Policy`].
    pub fn build(self) -> Result<Policy, InputError> {
        Policy::from_wire(WirePolicy {
            tables: self.tables,
        })
    }
}

/// Flattens the legacy map-of-tables policy shape
/// (`{"orders": {"columns": [...], "restrictions": [...]}}`) into the
/// canonical list shape `Policy::from_json` accepts.
///
/// This is a pure convenience for collaborators that still emit the legacy
/// shape; it performs no validation of its own and is not on the
/// `verify_sql` call path.
pub fn normalize_legacy_json(value: Json) -> Json {
    let Json::Object(map) = value else {
        return value;
    };
    if map.contains_key("tables") {
        return Json::Object(map);
    }
    let tables: Vec<Json> = map
        .into_iter()
        .map(|(table, mut body)| {
            if let Json::Object(obj) = &mut body {
                obj.insert("table_name".to_string(), Json::String(table));
            }
            body
        })
        .collect();
    serde_json::json!({ "tables": tables })
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn sample_json() -> &'static str {
        r#"{
            "tables": [
                {
                    "table_name": "orders",
                    "columns": ["id", "amount", "account_id"],
                    "restrictions": [
                        {"column": "account_id", "operation": "=", "value": 123}
                    ]
                }
            ]
        }"#
    }

    #[test]
    fn parses_valid_policy() {
        let policy = Policy::from_json(sample_json()).unwrap();
        let table = policy.table("orders").unwrap();
        assert!(table.allows_column("amount"));
        assert!(table.allows_column("ACCOUNT_ID"));
        assert!(!table.allows_column("ssn"));
        assert_eq!(table.restrictions.len(), 1);
    }

    #[test]
    fn table_lookup_is_case_insensitive() {
        let policy = Policy::from_json(sample_json()).unwrap();
        assert!(policy.table("Orders").is_some());
    }

    #[test]
    fn rejects_empty_table_name() {
        let json = r#"{"tables": [{"table_name": "", "columns": ["id"]}]}"#;
        let err = Policy::from_json(json).unwrap_err();
        assert!(matches!(
            err,
            InputError::Policy(PolicyError::EmptyTableName { index: 0 })
        ));
    }

    #[test]
    fn rejects_empty_column_list() {
        let json = r#"{"tables": [{"table_name": "orders", "columns": []}]}"#;
        let err = Policy::from_json(json).unwrap_err();
        assert!(matches!(
            err,
            InputError::Policy(PolicyError::EmptyColumnList { .. })
        ));
    }

    #[test]
    fn rejects_restriction_on_disallowed_column() {
        let json = r#"{
            "tables": [{
                "table_name": "orders",
                "columns": ["id"],
                "restrictions": [{"column": "account_id", "operation": "=", "value": 1}]
            }]
        }"#;
        let err = Policy::from_json(json).unwrap_err();
        assert!(matches!(
            err,
            InputError::Policy(PolicyError::RestrictionColumnNotAllowed { .. })
        ));
    }

    #[test_case(r#"{"column": "amount", "operation": "BETWEEN", "values": [10]}"# ; "too few bounds")]
    #[test_case(r#"{"column": "amount", "operation": "BETWEEN", "values": [10, 5]}"# ; "bounds out of order")]
    #[test_case(r#"{"column": "amount", "operation": "BETWEEN", "values": ["a", "b"]}"# ; "non numeric bounds")]
    fn rejects_invalid_between(restriction_json: &str) {
        let json = format!(
            r#"{{"tables": [{{"table_name": "orders", "columns": ["amount"], "restrictions": [{restriction_json}]}}]}}"#
        );
        let err = Policy::from_json(&json).unwrap_err();
        assert!(matches!(
            err,
            InputError::Policy(PolicyError::InvalidBetween { .. })
        ));
    }

    #[test]
    fn rejects_mixed_type_in_list() {
        let json = r#"{
            "tables": [{
                "table_name": "orders",
                "columns": ["region"],
                "restrictions": [{"column": "region", "operation": "IN", "values": ["us", 1]}]
            }]
        }"#;
        let err = Policy::from_json(json).unwrap_err();
        assert!(matches!(
            err,
            InputError::Policy(PolicyError::InvalidIn { .. })
        ));
    }

    #[test]
    fn rejects_unsupported_operation() {
        let json = r#"{
            "tables": [{
                "table_name": "orders",
                "columns": ["amount"],
                "restrictions": [{"column": "amount", "operation": "LIKE", "value": "x"}]
            }]
        }"#;
        let err = Policy::from_json(json).unwrap_err();
        assert!(matches!(err, InputError::UnsupportedRestriction(_)));
    }

    #[test]
    fn builder_matches_json_validation() {
        let policy = PolicyBuilder::new()
            .table("orders", &["id", "account_id"])
            .restrict("account_id", "=", Some(serde_json::json!(123)), None)
            .build()
            .unwrap();
        assert_eq!(policy.table("orders").unwrap().restrictions.len(), 1);
    }

    #[test]
    fn restriction_to_sql_renders_in_list() {
        let r = Restriction::In {
            column: "region".to_string(),
            values: vec![Scalar::Str("us".into()), Scalar::Str("eu".into())],
        };
        assert_eq!(r.to_sql(), "region IN ('us', 'eu')");
    }

    #[test]
    fn normalize_legacy_json_flattens_map_shape() {
        let legacy = serde_json::json!({
            "orders": { "columns": ["id"], "restrictions": [] }
        });
        let normalized = normalize_legacy_json(legacy);
        let policy = Policy::from_wire(serde_json::from_value(normalized).unwrap()).unwrap();
        assert!(policy.table("orders").is_some());
    }
}
