//! Input-plane errors.
//!
//! These are the errors that keep `verify_sql` from producing a verdict at
//! all: a malformed policy or an unparseable query. Per the two-error-plane
//! design (spec §7), these never end up in `Verdict::errors` — that list is
//! reserved for policy *violations* the analyzer discovered while it ran.

use thiserror::Error;

/// A policy failed validation before analysis could start.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PolicyError {
    /// A table entry has no name.
    #[error("table at index {index} has an empty name")]
    EmptyTableName {
        /// Index of the offending table in the policy's table list.
        index: usize,
    },

    /// A table entry has no allowed columns.
    #[error("table '{table}' has an empty column list")]
    EmptyColumnList {
        /// Table with the empty column list.
        table: String,
    },

    /// A restriction references a column that isn't in the table's allowed list.
    #[error(
        "restriction on table '{table}' references column '{column}', which is not in its allowed column list"
    )]
    RestrictionColumnNotAllowed {
        /// Table the restriction is attached to.
        table: String,
        /// Column the restriction references.
        column: String,
    },

    /// A `BETWEEN` restriction didn't supply exactly two numeric bounds.
    #[error(
        "BETWEEN restriction on table '{table}' column '{column}' must have exactly two numeric values with values[0] < values[1]"
    )]
    InvalidBetween {
        /// Table the restriction is attached to.
        table: String,
        /// Column the restriction references.
        column: String,
    },

    /// An `IN` restriction was empty or mixed scalar types.
    #[error(
        "IN restriction on table '{table}' column '{column}' must have at least one value, all of the same primitive type"
    )]
    InvalidIn {
        /// Table the restriction is attached to.
        table: String,
        /// Column the restriction references.
        column: String,
    },

    /// A scalar-operator restriction (`= < > <= >=`) didn't supply exactly
    /// one value, or supplied a value of the wrong kind for that operator.
    #[error(
        "restriction on table '{table}' column '{column}' with operation '{operation}' requires exactly one value of the right type"
    )]
    InvalidScalarValue {
        /// Table the restriction is attached to.
        table: String,
        /// Column the restriction references.
        column: String,
        /// The restriction's operation, as written in the policy.
        operation: String,
    },
}

/// A restriction named an operation the validator doesn't recognize.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("restriction on table '{table}' column '{column}' uses unsupported operation '{operation}'")]
pub struct UnsupportedRestrictionError {
    /// Table the restriction is attached to.
    pub table: String,
    /// Column the restriction references.
    pub column: String,
    /// The unrecognized operation string.
    pub operation: String,
}

/// The query text could not be parsed, or isn't a statement kind this
/// crate can analyze at all (multi-statement input, for instance).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// The underlying SQL tokenizer/parser rejected the input.
    #[error("SQL parse error: {0}")]
    Sql(String),

    /// More than one statement was supplied; only one is accepted per call.
    #[error("multiple SQL statements are not supported in a single query")]
    MultipleStatements,

    /// The parsed statement isn't one this crate knows how to walk
    /// (e.g. it parsed, but isn't SELECT/WITH/set-operation shaped).
    #[error("unsupported statement: {0}")]
    UnsupportedStatement(String),
}

impl From<sqlparser::parser::ParserError> for ParseError {
    fn from(err: sqlparser::parser::ParserError) -> Self {
        ParseError::Sql(err.to_string())
    }
}

impl From<sqlparser::tokenizer::TokenizerError> for ParseError {
    fn from(err: sqlparser::tokenizer::TokenizerError) -> Self {
        ParseError::Sql(err.to_string())
    }
}

/// Top-level input-plane error: either the policy or the query was invalid.
///
/// Callers receive this as a structured failure distinct from a `Verdict` —
/// it means no analysis ran at all.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InputError {
    /// The policy failed validation.
    #[error(transparent)]
    Policy(#[from] PolicyError),

    /// The policy used an unsupported restriction operation.
    #[error(transparent)]
    UnsupportedRestriction(#[from] UnsupportedRestrictionError),

    /// The query could not be parsed or analyzed at the statement level.
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// An internal invariant was violated (e.g. the scope resolver reached
    /// a node shape it didn't expect). Never a panic; always reported with
    /// enough context to debug.
    #[error("internal analyzer error: {0}")]
    Internal(String),
}
