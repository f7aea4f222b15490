//! Optimized and unoptimized plans return the same multiset of rows

mod common;

use std::sync::Arc;

use common::{exec, run, session_with};
use mydb::{Catalog, ScalarValue, Session};
use proptest::prelude::*;

type Row = (Option<i64>, Option<i64>);

fn value() -> impl Strategy<Value = Option<i64>> {
    prop_oneof![1 => Just(None), 4 => (-5i64..5).prop_map(Some)]
}

fn table() -> impl Strategy<Value = Vec<Row>> {
    prop::collection::vec((value(), value()), 0..12)
}

fn sql_value(v: Option<i64>) -> String {
    v.map_or_else(|| "NULL".to_string(), |v| v.to_string())
}

fn load(session: &Session, name: &str, columns: &str, rows: &[Row]) {
    exec(session, &format!("CREATE TABLE {name} ({columns})"));
    if rows.is_empty() {
        return;
    }
    let values: Vec<String> = rows
        .iter()
        .map(|(x, y)| format!("({}, {})", sql_value(*x), sql_value(*y)))
        .collect();
    exec(
        session,
        &format!("INSERT INTO {name} VALUES {}", values.join(", ")),
    );
}

/// Predicates over `t(a, b)` and `u(c, d)`; no division, values stay small.
fn predicate() -> impl Strategy<Value = String> {
    let column = prop_oneof![Just("a"), Just("b"), Just("c"), Just("d")];
    let op = prop_oneof![Just("="), Just("<>"), Just("<"), Just(">="), Just(">")];
    let leaf = prop_oneof![
        (column.clone(), op.clone(), -5i64..5).prop_map(|(c, op, k)| format!("{c} {op} {k}")),
        (column.clone(), op, column.clone()).prop_map(|(l, op, r)| format!("{l} {op} {r}")),
        column.clone().prop_map(|c| format!("{c} IS NULL")),
        (column.clone(), -5i64..5).prop_map(|(c, k)| format!("{c} + 1 > {k} - 2")),
        column.prop_map(|c| format!("{c} IN (0, 2, NULL)")),
        Just("1 = 1".to_string()),
        Just("2 < 1".to_string()),
    ];
    leaf.prop_recursive(3, 12, 2, |inner| {
        prop_oneof![
            (inner.clone(), inner.clone()).prop_map(|(l, r)| format!("({l} AND {r})")),
            (inner.clone(), inner.clone()).prop_map(|(l, r)| format!("({l} OR {r})")),
            inner.prop_map(|p| format!("NOT ({p})")),
        ]
    })
}

fn query() -> impl Strategy<Value = String> {
    prop_oneof![
        predicate().prop_map(|p| format!("SELECT a, b, c, d FROM t, u WHERE {p}")),
        predicate().prop_map(|p| format!(
            "SELECT t.a, u.d FROM t JOIN u ON t.a = u.c WHERE {p}"
        )),
        (predicate(), -5i64..5).prop_map(|(p, k)| format!(
            "SELECT a, COUNT(*), SUM(d), MIN(c) FROM t, u WHERE {p} GROUP BY a HAVING a > {k}"
        )),
        predicate().prop_map(|p| format!(
            "SELECT c + 1 AS x, d FROM u WHERE {p} AND c IN (SELECT a FROM t WHERE b IS NOT NULL)"
        )),
        predicate().prop_map(|p| format!(
            "SELECT a AS k, b FROM t, u WHERE {p} ORDER BY k, b LIMIT 5"
        )),
    ]
}

fn sorted(mut rows: Vec<Vec<ScalarValue>>) -> Vec<Vec<ScalarValue>> {
    rows.sort_by_key(|row| format!("{row:?}"));
    rows
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn optimizer_preserves_results(t in table(), u in table(), sql in query()) {
        let catalog = Arc::new(Catalog::new());
        let optimized = session_with(catalog.clone(), true);
        let unoptimized = session_with(catalog, false);
        load(&optimized, "t", "a INT, b INT", &t);
        load(&optimized, "u", "c INT, d INT", &u);

        let expected = run(&unoptimized, &sql).map(sorted);
        let actual = run(&optimized, &sql).map(sorted);
        match (expected, actual) {
            (Ok(expected), Ok(actual)) => prop_assert_eq!(expected, actual),
            (Err(e), Err(a)) => prop_assert_eq!(e.to_string(), a.to_string()),
            (e, a) => prop_assert!(false, "{sql}: {e:?} vs {a:?}"),
        }
    }
}
