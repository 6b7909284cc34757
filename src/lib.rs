//! A SQL policy enforcement layer.
//!
//! Given a SQL query string and a declarative, per-table allow-list policy,
//! [`analyzer::verify_sql`] parses the query, checks it against the policy,
//! and returns a [`verdict::Verdict`]: whether the query is allowed as
//! written, every violation found, and — where the violation is
//! mechanically repairable — a rewritten query that would be allowed.
//!
//! This crate has no I/O of its own. It does not open a database connection,
//! execute anything, or expose a CLI; it is a pure function from `(sql,
//! policy, dialect)` to `Verdict`, meant to sit in front of whatever actually
//! runs the query.

pub mod analyzer;
pub mod antipattern;
pub mod ast;
pub mod checker;
pub mod config;
pub mod enforcement;
pub mod error;
pub mod parser;
pub mod policy;
pub mod rewriter;
pub mod scope;
pub mod serialize;
pub mod verdict;

pub mod prelude;

pub use analyzer::{verify_sql, verify_sql_with_config};
pub use config::AnalyzerConfig;
pub use error::{InputError, ParseError, PolicyError, UnsupportedRestrictionError};
pub use parser::Dialect;
pub use policy::{Policy, PolicyBuilder};
pub use verdict::Verdict;
