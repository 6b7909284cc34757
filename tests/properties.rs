//! Property-style tests for the invariants in spec.md §8: idempotence and
//! case insensitivity. Concrete example cases stand in for the quantified
//! properties (`proptest` generates only the casing permutations, since the
//! SQL surface itself is fixed per case — fuzzing arbitrary SQL text would
//! mostly generate unparseable input).

use proptest::prelude::*;

use sql_policy_guard::policy::PolicyBuilder;
use sql_policy_guard::{verify_sql, Policy};

fn orders_policy() -> Policy {
    PolicyBuilder::new()
        .table("orders", &["id", "product_name", "account_id"])
        .restrict("account_id", "=", Some(serde_json::json!(123)), None)
        .build()
        .unwrap()
}

fn recase_token(token: &str, upper: bool) -> String {
    if upper {
        token.to_ascii_uppercase()
    } else {
        token.to_ascii_lowercase()
    }
}

#[test]
fn idempotence_reverifying_a_fix_reports_no_further_fix() {
    let policy = orders_policy();
    let queries = [
        "SELECT id, name FROM orders WHERE 1 = 1",
        "SELECT * FROM orders",
        "SELECT id FROM orders WHERE account_id = 456",
        "SELECT id FROM orders WHERE account_id = 123 OR 1 = 1",
    ];
    for sql in queries {
        let first = verify_sql(sql, &policy, "trino").unwrap();
        let fixed = first
            .fixed
            .clone()
            .unwrap_or_else(|| panic!("expected {sql} to produce a fix"));
        let second = verify_sql(&fixed, &policy, "trino").unwrap();
        assert!(second.allowed, "re-verifying {fixed:?} should be allowed");
        assert_eq!(second.fixed, None, "re-verifying {fixed:?} should be stable");
    }
}

#[test]
fn unfixable_queries_stay_unfixable_on_reanalysis() {
    let policy = orders_policy();
    let verdict = verify_sql(
        "SELECT o.id, p.name FROM orders o JOIN products p ON o.id = p.id",
        &policy,
        "trino",
    )
    .unwrap();
    assert_eq!(verdict.fixed, None);
}

proptest! {
    #[test]
    fn case_insensitive_keywords_and_identifiers_agree_on_verdict(
        select_upper in any::<bool>(),
        from_upper in any::<bool>(),
        where_upper in any::<bool>(),
        table_upper in any::<bool>(),
    ) {
        let policy = orders_policy();
        let select_kw = recase_token("select", select_upper);
        let from_kw = recase_token("from", from_upper);
        let where_kw = recase_token("where", where_upper);
        let table = recase_token("orders", table_upper);

        let sql = format!("{select_kw} id {from_kw} {table} {where_kw} account_id = 123");
        let baseline = verify_sql(
            "SELECT id FROM orders WHERE account_id = 123",
            &policy,
            "trino",
        )
        .unwrap();
        let recased = verify_sql(&sql, &policy, "trino").unwrap();

        prop_assert_eq!(recased.allowed, baseline.allowed);
        prop_assert_eq!(recased.errors, baseline.errors);
    }

    #[test]
    fn whitespace_and_comment_padding_does_not_change_the_verdict(
        extra_spaces in 0usize..4,
    ) {
        let policy = orders_policy();
        let padding = " ".repeat(extra_spaces);
        let sql = format!(
            "SELECT{padding} id{padding} /* comment */ FROM orders WHERE account_id = 123"
        );
        let baseline = verify_sql(
            "SELECT id FROM orders WHERE account_id = 123",
            &policy,
            "trino",
        )
        .unwrap();
        let padded = verify_sql(&sql, &policy, "trino").unwrap();

        prop_assert_eq!(padded.allowed, baseline.allowed);
        prop_assert_eq!(padded.errors, baseline.errors);
    }
}
