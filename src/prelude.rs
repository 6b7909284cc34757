//! Convenience re-exports of the crate's public API.

pub use crate::analyzer::{verify_sql, verify_sql_with_config};
pub use crate::config::AnalyzerConfig;
pub use crate::error::{InputError, ParseError, PolicyError, UnsupportedRestrictionError};
pub use crate::parser::Dialect;
pub use crate::policy::{Policy, PolicyBuilder};
pub use crate::verdict::Verdict;
