//! Parsing is a pure function of the query text

use mydb::sql::parse;
use proptest::prelude::*;

fn ident() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("a".to_string()),
        Just("b".to_string()),
        Just("t.a".to_string()),
        "[a-z][a-z0-9_]{0,6}",
    ]
}

fn literal() -> impl Strategy<Value = String> {
    prop_oneof![
        any::<i32>().prop_map(|v| v.to_string()),
        (0u32..1000, 0u32..100).prop_map(|(i, f)| format!("{i}.{f:02}")),
        "[a-z']{0,8}".prop_map(|s| format!("'{}'", s.replace('\'', "''"))),
        Just("NULL".to_string()),
        Just("TRUE".to_string()),
        Just("1e3".to_string()),
    ]
}

fn expr() -> impl Strategy<Value = String> {
    let leaf = prop_oneof![ident(), literal()];
    leaf.prop_recursive(4, 32, 2, |inner| {
        let op = prop_oneof![
            Just("+"),
            Just("-"),
            Just("*"),
            Just("/"),
            Just("%"),
            Just("="),
            Just("<>"),
            Just("<="),
            Just(">"),
            Just("AND"),
            Just("OR"),
            Just("gt"),
        ];
        prop_oneof![
            (inner.clone(), op, inner.clone()).prop_map(|(l, op, r)| format!("{l} {op} {r}")),
            inner.clone().prop_map(|e| format!("({e})")),
            inner.clone().prop_map(|e| format!("NOT {e}")),
            inner.clone().prop_map(|e| format!("-({e})")),
            inner.clone().prop_map(|e| format!("{e} IS NOT NULL")),
            inner.clone().prop_map(|e| format!("SUM({e})")),
            (inner.clone(), inner).prop_map(|(l, r)| format!("{l} IN ({r}, 1)")),
        ]
    })
}

fn query() -> impl Strategy<Value = String> {
    (
        prop::collection::vec(expr(), 1..4),
        ident(),
        prop::option::of(expr()),
        prop::option::of(0u32..100),
    )
        .prop_map(|(items, table, predicate, limit)| {
            let mut sql = format!("SELECT {} FROM {table}", items.join(", "));
            if let Some(p) = predicate {
                sql.push_str(&format!(" WHERE {p}"));
            }
            if let Some(n) = limit {
                sql.push_str(&format!(" LIMIT {n}"));
            }
            sql
        })
}

proptest! {
    #[test]
    fn generated_queries_parse_identically(sql in query()) {
        prop_assert_eq!(parse(&sql), parse(&sql));
    }

    #[test]
    fn arbitrary_text_parses_identically(sql in "\\PC{0,64}") {
        prop_assert_eq!(parse(&sql), parse(&sql));
    }

    #[test]
    fn whitespace_and_comments_are_insignificant(sql in query()) {
        let spaced = format!("  /* lead */ {}\n-- trailing\n", sql.replace(' ', "\n "));
        let plain = parse(&sql);
        prop_assume!(plain.is_ok());
        prop_assert_eq!(plain.ok(), parse(&spaced).ok());
    }
}
