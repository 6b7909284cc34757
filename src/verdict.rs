//! Verdict aggregator (C8).
//!
//! [`Verdict`] is the crate's sole output for an analyzed query: whether
//! it's allowed as written, every policy violation discovered along the
//! way, the repaired query text (if one could be produced), and a risk
//! score left at its default for a downstream collaborator to fill in.

use serde::{Deserialize, Serialize};

/// The outcome of analyzing one query against one policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    /// `true` only if the query, as written, violated nothing.
    pub allowed: bool,
    /// Every policy violation discovered during analysis, in the order
    /// found. Empty iff `allowed` is `true`.
    pub errors: Vec<String>,
    /// The repaired query text, if a fix could be produced. `None` when
    /// the query was already legal, or when it was unfixable (spec §5).
    pub fixed: Option<String>,
    /// A risk score in `[0.0, 1.0]`; this crate always reports `0.0` —
    /// scoring the residual risk of a repaired query is a collaborator's
    /// concern (spec §9, Non-goals).
    pub risk: f64,
}

impl Verdict {
    /// The verdict for a query that violated nothing.
    pub fn clean() -> Self {
        Verdict {
            allowed: true,
            errors: Vec::new(),
            fixed: None,
            risk: 0.0,
        }
    }

    /// Builds the final verdict from the errors accumulated during
    /// analysis and the repaired text, if any. `unfixable` forces
    /// `fixed` to `None` regardless of whether a rewrite was produced,
    /// per the state machine's `UNFIXABLE` terminal state.
    pub fn from_analysis(errors: Vec<String>, fixed: Option<String>, unfixable: bool) -> Self {
        Verdict {
            allowed: errors.is_empty(),
            errors,
            fixed: if unfixable { None } else { fixed },
            risk: 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_verdict_is_allowed_with_no_fix() {
        let v = Verdict::clean();
        assert!(v.allowed);
        assert!(v.errors.is_empty());
        assert!(v.fixed.is_none());
    }

    #[test]
    fn unfixable_forces_fixed_to_none_even_if_rewrite_produced() {
        let v = Verdict::from_analysis(
            vec!["Table products is not allowed".to_string()],
            Some("SELECT 1".to_string()),
            true,
        );
        assert!(!v.allowed);
        assert!(v.fixed.is_none());
    }

    #[test]
    fn fixable_keeps_the_rewrite() {
        let v = Verdict::from_analysis(
            vec!["SELECT * is not allowed".to_string()],
            Some("SELECT id FROM orders".to_string()),
            false,
        );
        assert!(!v.allowed);
        assert_eq!(v.fixed.as_deref(), Some("SELECT id FROM orders"));
    }

    #[test]
    fn serializes_to_the_wire_shape() {
        let v = Verdict::clean();
        let json = serde_json::to_value(&v).unwrap();
        assert_eq!(json["allowed"], serde_json::json!(true));
        assert_eq!(json["fixed"], serde_json::Value::Null);
    }
}
