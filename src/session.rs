// Statement dispatch and the query lifecycle

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use arrow::array::{ArrayRef, Int64Array, StringArray};
use arrow::datatypes::{DataType as ArrowType, Field, Schema as ArrowSchema};
use tracing::debug;

use crate::binder::{Binder, BoundCreateTable, BoundInsert, BoundStatement};
use crate::catalog::Catalog;
use crate::config::EngineConfig;
use crate::error::{DbError, Result};
use crate::execution::batch::{RecordBatch, SchemaRef};
use crate::execution::{evaluate_constant, execute_plan, BoxedOperator};
use crate::planner::{explain_plan, plan_select};
use crate::sql::parse;

/// Stage of a query. Transitions only move forward; `Completed` and
/// `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryState {
    Parsed,
    Bound,
    Planned,
    Executing,
    Completed,
    Failed,
}

impl fmt::Display for QueryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            QueryState::Parsed => "parsed",
            QueryState::Bound => "bound",
            QueryState::Planned => "planned",
            QueryState::Executing => "executing",
            QueryState::Completed => "completed",
            QueryState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Lifecycle tracker for one query.
#[derive(Debug)]
struct Lifecycle {
    state: Option<QueryState>,
}

impl Lifecycle {
    fn new() -> Self {
        Self { state: None }
    }

    fn advance(&mut self, next: QueryState) {
        if matches!(
            self.state,
            Some(QueryState::Completed) | Some(QueryState::Failed)
        ) {
            return;
        }
        debug!(from = ?self.state, to = %next, "query state");
        self.state = Some(next);
    }

    fn fail(&mut self, err: &DbError) {
        debug!(error = %err, "query failed");
        self.advance(QueryState::Failed);
    }

    fn state(&self) -> Option<QueryState> {
        self.state
    }

    /// Hand the tracker over to the result that carries the query on.
    fn take(&mut self) -> Lifecycle {
        Lifecycle {
            state: self.state.take(),
        }
    }
}

enum Source {
    Operator(BoxedOperator),
    Batches(VecDeque<RecordBatch>),
}

/// Lazily produced result of a statement.
///
/// Iterating pulls one batch at a time from the operator tree. The first
/// error ends the iteration; nothing is yielded after it.
pub struct QueryResult {
    schema: SchemaRef,
    source: Source,
    lifecycle: Lifecycle,
}

impl QueryResult {
    fn from_operator(root: BoxedOperator, lifecycle: Lifecycle) -> Self {
        Self {
            schema: root.schema(),
            source: Source::Operator(root),
            lifecycle,
        }
    }

    fn from_batches(schema: SchemaRef, batches: Vec<RecordBatch>, lifecycle: Lifecycle) -> Self {
        Self {
            schema,
            source: Source::Batches(batches.into()),
            lifecycle,
        }
    }

    pub fn schema(&self) -> SchemaRef {
        self.schema.clone()
    }

    pub fn state(&self) -> Option<QueryState> {
        self.lifecycle.state()
    }

    /// Drain every batch, or return the first error and nothing else.
    pub fn collect_batches(self) -> Result<Vec<RecordBatch>> {
        self.collect()
    }

    fn pull(&mut self) -> Result<Option<RecordBatch>> {
        match &mut self.source {
            Source::Operator(root) => root.next_batch(),
            Source::Batches(batches) => Ok(batches.pop_front()),
        }
    }
}

impl fmt::Debug for QueryResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryResult")
            .field("schema", &self.schema)
            .field("state", &self.lifecycle.state())
            .finish()
    }
}

impl Iterator for QueryResult {
    type Item = Result<RecordBatch>;

    fn next(&mut self) -> Option<Self::Item> {
        if matches!(
            self.lifecycle.state(),
            Some(QueryState::Completed) | Some(QueryState::Failed)
        ) {
            return None;
        }
        match self.pull() {
            Ok(Some(batch)) => Some(Ok(batch)),
            Ok(None) => {
                self.lifecycle.advance(QueryState::Completed);
                None
            }
            Err(err) => {
                self.lifecycle.fail(&err);
                Some(Err(err))
            }
        }
    }
}

impl std::iter::FusedIterator for QueryResult {}

/// A catalog plus the configuration queries against it run with.
#[derive(Debug, Clone)]
pub struct Session {
    catalog: Arc<Catalog>,
    config: EngineConfig,
}

impl Session {
    pub fn new(catalog: Arc<Catalog>) -> Self {
        Self {
            catalog,
            config: EngineConfig::default(),
        }
    }

    /// # Errors
    /// `InvalidConfig` if `config` does not validate.
    pub fn with_config(catalog: Arc<Catalog>, config: EngineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { catalog, config })
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Parse, bind, plan and start executing one statement.
    pub fn execute(&self, query: &str) -> Result<QueryResult> {
        run(query, &self.catalog, &self.config)
    }
}

/// Execute `query` against `catalog` with the default configuration.
pub fn execute(query: &str, catalog: &Catalog) -> Result<QueryResult> {
    run(query, catalog, &EngineConfig::default())
}

fn run(query: &str, catalog: &Catalog, config: &EngineConfig) -> Result<QueryResult> {
    let mut lifecycle = Lifecycle::new();
    match dispatch(query, catalog, config, &mut lifecycle) {
        Ok(result) => Ok(result),
        Err(err) => {
            lifecycle.fail(&err);
            Err(err)
        }
    }
}

fn dispatch(
    query: &str,
    catalog: &Catalog,
    config: &EngineConfig,
    lifecycle: &mut Lifecycle,
) -> Result<QueryResult> {
    let statement = parse(query)?;
    lifecycle.advance(QueryState::Parsed);
    let bound = Binder::new(catalog).bind_statement(&statement)?;
    lifecycle.advance(QueryState::Bound);

    match bound {
        BoundStatement::Select(select) => {
            let plan = plan_select(&select, config)?;
            lifecycle.advance(QueryState::Planned);
            let root = execute_plan(&plan, config)?;
            lifecycle.advance(QueryState::Executing);
            Ok(QueryResult::from_operator(root, lifecycle.take()))
        }
        BoundStatement::Insert(insert) => {
            lifecycle.advance(QueryState::Planned);
            lifecycle.advance(QueryState::Executing);
            let inserted = run_insert(&insert, catalog)?;
            let batch = count_batch(inserted)?;
            Ok(QueryResult::from_batches(
                batch.schema().clone(),
                vec![batch],
                lifecycle.take(),
            ))
        }
        BoundStatement::CreateTable(create) => {
            lifecycle.advance(QueryState::Planned);
            lifecycle.advance(QueryState::Executing);
            run_create_table(create, catalog, config)?;
            Ok(QueryResult::from_batches(
                Arc::new(ArrowSchema::empty()),
                Vec::new(),
                lifecycle.take(),
            ))
        }
        BoundStatement::Explain(inner) => {
            let text = explain_statement(&inner, config)?;
            lifecycle.advance(QueryState::Planned);
            lifecycle.advance(QueryState::Executing);
            let batch = plan_batch(&text)?;
            Ok(QueryResult::from_batches(
                batch.schema().clone(),
                vec![batch],
                lifecycle.take(),
            ))
        }
    }
}

fn run_insert(insert: &BoundInsert, catalog: &Catalog) -> Result<usize> {
    let rows = insert
        .rows
        .iter()
        .map(|row| row.iter().map(evaluate_constant).collect::<Result<Vec<_>>>())
        .collect::<Result<Vec<_>>>()?;
    let inserted = catalog.insert_rows(&insert.table, &insert.columns, &rows)?;
    debug!(table = %insert.table, rows = inserted, "inserted rows");
    Ok(inserted)
}

fn run_create_table(
    create: BoundCreateTable,
    catalog: &Catalog,
    config: &EngineConfig,
) -> Result<()> {
    if create.name.chars().count() > config.max_identifier_length {
        return Err(DbError::InvalidName(format!(
            "table name exceeds {} characters",
            config.max_identifier_length
        )));
    }
    if create.if_not_exists && catalog.contains(&create.name) {
        debug!(table = %create.name, "table exists, skipping create");
        return Ok(());
    }
    catalog.define(&create.name, create.schema)
}

fn explain_statement(statement: &BoundStatement, config: &EngineConfig) -> Result<String> {
    match statement {
        BoundStatement::Select(select) => Ok(explain_plan(&plan_select(select, config)?)),
        BoundStatement::Insert(insert) => Ok(format!(
            "Insert: {} rows={}\n",
            insert.table,
            insert.rows.len()
        )),
        BoundStatement::CreateTable(create) => {
            Ok(format!("CreateTable: {} ({})\n", create.name, create.schema))
        }
        BoundStatement::Explain(inner) => explain_statement(inner, config),
    }
}

/// One-row batch reporting how many rows a statement affected.
fn count_batch(count: usize) -> Result<RecordBatch> {
    let count = i64::try_from(count)
        .map_err(|_| DbError::Internal(format!("row count {count} exceeds i64")))?;
    let schema = Arc::new(ArrowSchema::new(vec![Field::new(
        "count",
        ArrowType::Int64,
        false,
    )]));
    RecordBatch::try_new(schema, vec![Arc::new(Int64Array::from(vec![count])) as ArrayRef])
}

/// EXPLAIN output: one text row per plan line.
fn plan_batch(text: &str) -> Result<RecordBatch> {
    let schema = Arc::new(ArrowSchema::new(vec![Field::new(
        "plan",
        ArrowType::Utf8,
        false,
    )]));
    let lines: Vec<&str> = text.lines().collect();
    RecordBatch::try_new(schema, vec![Arc::new(StringArray::from(lines)) as ArrayRef])
}
