//! The exact end-to-end scenarios from the specification's testable
//! properties section, verbatim: same policy, same input SQL, same
//! expected `errors`/`fixed` text.

use sql_policy_guard::policy::PolicyBuilder;
use sql_policy_guard::{verify_sql, Policy};

fn orders_policy() -> Policy {
    PolicyBuilder::new()
        .table("orders", &["id", "product_name", "account_id"])
        .restrict("account_id", "=", Some(serde_json::json!(123)), None)
        .build()
        .unwrap()
}

#[test]
fn scenario_1_strips_column_strips_tautology_injects_restriction() {
    let policy = orders_policy();
    let verdict = verify_sql(
        "SELECT id, name FROM orders WHERE 1 = 1",
        &policy,
        "trino",
    )
    .unwrap();

    assert!(!verdict.allowed);
    assert_eq!(
        verdict.errors,
        vec![
            "Column name is not allowed. Column removed from SELECT clause".to_string(),
            "Always-True expression is not allowed".to_string(),
            "Missing restriction for table: orders column: account_id value: 123".to_string(),
        ]
    );
    assert_eq!(
        verdict.fixed.as_deref(),
        Some("SELECT id FROM orders WHERE account_id = 123")
    );
}

#[test]
fn scenario_2_already_legal_query_is_untouched() {
    let policy = orders_policy();
    let verdict = verify_sql(
        "SELECT id, product_name FROM orders WHERE account_id = 123",
        &policy,
        "trino",
    )
    .unwrap();

    assert!(verdict.allowed);
    assert!(verdict.errors.is_empty());
    assert_eq!(verdict.fixed, None);
}

#[test]
fn scenario_3_existing_restriction_is_conjoined_not_replaced() {
    let policy = orders_policy();
    let verdict = verify_sql(
        "SELECT id FROM orders WHERE account_id = 456",
        &policy,
        "trino",
    )
    .unwrap();

    assert!(!verdict.allowed);
    assert_eq!(
        verdict.errors,
        vec!["Missing restriction for table: orders column: account_id value: 123".to_string()]
    );
    assert_eq!(
        verdict.fixed.as_deref(),
        Some("SELECT id FROM orders WHERE account_id = 456 AND account_id = 123")
    );
}

#[test]
fn scenario_4_or_always_true_collapses_to_remaining_clause() {
    let policy = orders_policy();
    let verdict = verify_sql(
        "SELECT id FROM orders WHERE account_id = 123 OR 1 = 1",
        &policy,
        "trino",
    )
    .unwrap();

    assert!(!verdict.allowed);
    assert_eq!(
        verdict.errors,
        vec!["Always-True expression is not allowed".to_string()]
    );
    assert_eq!(
        verdict.fixed.as_deref(),
        Some("SELECT id FROM orders WHERE account_id = 123")
    );
}

#[test]
fn scenario_5_wildcard_expands_to_unqualified_allowed_columns() {
    let policy = orders_policy();
    let verdict = verify_sql("SELECT * FROM orders", &policy, "trino").unwrap();

    assert!(!verdict.allowed);
    assert_eq!(verdict.errors[0], "SELECT * is not allowed");
    assert!(verdict
        .errors
        .iter()
        .any(|e| e.starts_with("Missing restriction")));
    assert_eq!(
        verdict.fixed.as_deref(),
        Some("SELECT id, product_name, account_id FROM orders WHERE account_id = 123")
    );
}

#[test]
fn scenario_6_unknown_joined_table_is_unfixable() {
    let policy = orders_policy();
    let verdict = verify_sql(
        "SELECT o.id, p.name FROM orders o JOIN products p ON o.pid = p.id",
        &policy,
        "trino",
    )
    .unwrap();

    assert!(!verdict.allowed);
    assert!(verdict
        .errors
        .iter()
        .any(|e| e == "Table products is not allowed"));
    assert_eq!(verdict.fixed, None);
}

#[test]
fn scenario_7_cte_body_is_fixed_independently_of_the_outer_query() {
    let policy = orders_policy();
    let verdict = verify_sql(
        "WITH c AS (SELECT * FROM orders) SELECT id FROM c",
        &policy,
        "trino",
    )
    .unwrap();

    assert!(!verdict.allowed);
    assert_eq!(
        verdict.errors,
        vec![
            "SELECT * is not allowed".to_string(),
            "Missing restriction for table: orders column: account_id value: 123".to_string(),
        ]
    );
    assert_eq!(
        verdict.fixed.as_deref(),
        Some(
            "WITH c AS (SELECT id, product_name, account_id FROM orders WHERE account_id = 123) SELECT id FROM c"
        )
    );
}
