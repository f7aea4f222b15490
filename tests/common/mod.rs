//! Shared helpers for the integration tests

#![allow(dead_code)]

use std::sync::Arc;

use mydb::{Catalog, EngineConfig, RecordBatch, Result, ScalarValue, Session};

pub fn session() -> Session {
    Session::new(Arc::new(Catalog::new()))
}

pub fn session_with(catalog: Arc<Catalog>, enable_optimizer: bool) -> Session {
    let config = EngineConfig {
        enable_optimizer,
        ..EngineConfig::default()
    };
    Session::with_config(catalog, config).unwrap()
}

pub fn run(session: &Session, sql: &str) -> Result<Vec<Vec<ScalarValue>>> {
    let batches = session.execute(sql)?.collect_batches()?;
    rows(&batches)
}

pub fn exec(session: &Session, sql: &str) {
    session
        .execute(sql)
        .and_then(|r| r.collect_batches())
        .unwrap_or_else(|e| panic!("{sql}: {e}"));
}

pub fn rows(batches: &[RecordBatch]) -> Result<Vec<Vec<ScalarValue>>> {
    let mut out = Vec::new();
    for batch in batches {
        out.extend(batch.rows()?);
    }
    Ok(out)
}

pub fn int(v: i64) -> ScalarValue {
    ScalarValue::Int64(v)
}

pub fn text(v: &str) -> ScalarValue {
    ScalarValue::Text(v.to_string())
}

/// `t(a INT, b INT)` holding `(1, 10), (2, NULL), (3, 30)`.
pub fn sample_session() -> Session {
    let session = session();
    exec(&session, "CREATE TABLE t (a INT, b INT)");
    exec(&session, "INSERT INTO t VALUES (1, 10), (2, NULL), (3, 30)");
    session
}
