//! Table catalog.
//!
//! The catalog maps table names to [`Table`]s. It is explicitly constructed
//! and shared by reference; every table's stored batches live behind a
//! copy-on-write `Arc<Vec<RecordBatch>>`, so a query that took a
//! [`TableSnapshot`] keeps seeing the contents as of that moment while
//! later appends swap in a new vector.

mod schema;

pub use schema::{Column, Schema};

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use arrow::array::ArrayRef;
use arrow::datatypes::SchemaRef;
use parking_lot::RwLock;
use tracing::debug;

use crate::config::EngineConfig;
use crate::error::{DbError, Result};
use crate::execution::batch::RecordBatch;
use crate::types::{decimal_fits, decimal_to_f64, rescale_decimal, DataType, ScalarValue};

/// Stream of batches produced by a [`BatchLoader`].
pub type BatchIter = Box<dyn Iterator<Item = Result<RecordBatch>> + Send>;

/// External source of row batches backing a table.
///
/// Batches are pulled lazily by the scan that reads the table and are
/// validated against the table schema as they arrive. An `Err` item fails
/// the query.
pub trait BatchLoader: Send + Sync + fmt::Debug {
    fn load_batches(&self) -> Result<BatchIter>;

    /// Estimated number of rows, used for join planning.
    fn row_count_hint(&self) -> Option<usize> {
        None
    }
}

#[derive(Debug)]
pub struct Table {
    name: String,
    schema: Arc<Schema>,
    arrow_schema: SchemaRef,
    batches: RwLock<Arc<Vec<RecordBatch>>>,
    loader: Option<Arc<dyn BatchLoader>>,
}

impl Table {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// Rows held in memory plus the loader's hint, if any.
    pub fn row_count(&self) -> usize {
        let stored: usize = self.batches.read().iter().map(|b| b.num_rows()).sum();
        stored
            + self
                .loader
                .as_ref()
                .and_then(|l| l.row_count_hint())
                .unwrap_or(0)
    }

    pub fn snapshot(&self) -> TableSnapshot {
        TableSnapshot {
            name: self.name.clone(),
            schema: self.schema.clone(),
            arrow_schema: self.arrow_schema.clone(),
            batches: self.batches.read().clone(),
            loader: self.loader.clone(),
        }
    }
}

/// Contents of a table frozen at the time the snapshot was taken.
#[derive(Debug, Clone)]
pub struct TableSnapshot {
    pub name: String,
    pub schema: Arc<Schema>,
    pub arrow_schema: SchemaRef,
    pub batches: Arc<Vec<RecordBatch>>,
    pub loader: Option<Arc<dyn BatchLoader>>,
}

impl TableSnapshot {
    pub fn estimated_rows(&self) -> usize {
        let stored: usize = self.batches.iter().map(|b| b.num_rows()).sum();
        stored
            + self
                .loader
                .as_ref()
                .and_then(|l| l.row_count_hint())
                .unwrap_or(0)
    }
}

#[derive(Debug)]
pub struct Catalog {
    tables: RwLock<HashMap<String, Arc<Table>>>,
    max_identifier_length: usize,
}

impl Default for Catalog {
    fn default() -> Self {
        Self::new()
    }
}

impl Catalog {
    pub fn new() -> Self {
        Self::with_config(&EngineConfig::default())
    }

    pub fn with_config(config: &EngineConfig) -> Self {
        Self {
            tables: RwLock::new(HashMap::new()),
            max_identifier_length: config.max_identifier_length,
        }
    }

    fn validate_name(&self, name: &str) -> Result<()> {
        if name.is_empty() {
            return Err(DbError::InvalidName("table name is empty".to_string()));
        }
        if name.chars().count() > self.max_identifier_length {
            return Err(DbError::InvalidName(format!(
                "table name exceeds {} characters",
                self.max_identifier_length
            )));
        }
        Ok(())
    }

    fn insert_table(
        &self,
        name: &str,
        schema: Schema,
        loader: Option<Arc<dyn BatchLoader>>,
    ) -> Result<()> {
        self.validate_name(name)?;
        let mut tables = self.tables.write();
        if tables.contains_key(name) {
            return Err(DbError::DuplicateTable(name.to_string()));
        }
        debug!(table = name, schema = %schema, "defining table");
        let arrow_schema = schema.to_arrow();
        tables.insert(
            name.to_string(),
            Arc::new(Table {
                name: name.to_string(),
                schema: Arc::new(schema),
                arrow_schema,
                batches: RwLock::new(Arc::new(Vec::new())),
                loader,
            }),
        );
        Ok(())
    }

    /// Register an empty in-memory table.
    ///
    /// # Errors
    /// `DuplicateTable` if `name` is taken, `InvalidName` if it is empty or too long.
    pub fn define(&self, name: &str, schema: Schema) -> Result<()> {
        self.insert_table(name, schema, None)
    }

    /// Alias of [`Catalog::define`] for embedding code that loads tables.
    pub fn define_table(&self, name: &str, schema: Schema) -> Result<()> {
        self.define(name, schema)
    }

    /// Register a table whose rows come from an external loader.
    pub fn define_with_loader(
        &self,
        name: &str,
        schema: Schema,
        loader: Arc<dyn BatchLoader>,
    ) -> Result<()> {
        self.insert_table(name, schema, Some(loader))
    }

    pub fn lookup(&self, name: &str) -> Result<Arc<Table>> {
        self.tables
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| DbError::UnknownTable(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tables.read().contains_key(name)
    }

    pub fn snapshot(&self, name: &str) -> Result<TableSnapshot> {
        Ok(self.lookup(name)?.snapshot())
    }

    /// Append a batch. The table is left unchanged if validation fails.
    pub fn append(&self, name: &str, batch: RecordBatch) -> Result<()> {
        let table = self.lookup(name)?;
        table.schema.check_batch(&batch)?;
        // Re-tag with the table's own schema so every stored batch shares it.
        let batch = RecordBatch::try_new_with_row_count(
            table.arrow_schema.clone(),
            batch.columns().to_vec(),
            batch.num_rows(),
        )?;
        let mut guard = table.batches.write();
        let mut next = Vec::with_capacity(guard.len() + 1);
        next.extend(guard.iter().cloned());
        next.push(batch);
        *guard = Arc::new(next);
        debug!(table = name, batches = guard.len(), "appended batch");
        Ok(())
    }

    /// Coerce scalar rows to the table schema and append them as one batch.
    ///
    /// `columns` names the target columns in row order; empty means every
    /// column in schema order. Omitted columns receive NULL. Returns the
    /// number of rows inserted.
    pub fn insert_rows(
        &self,
        name: &str,
        columns: &[String],
        rows: &[Vec<ScalarValue>],
    ) -> Result<usize> {
        let table = self.lookup(name)?;
        let schema = &table.schema;

        let targets: Vec<usize> = if columns.is_empty() {
            (0..schema.len()).collect()
        } else {
            let mut targets = Vec::with_capacity(columns.len());
            for column in columns {
                let idx = schema
                    .index_of(column)
                    .ok_or_else(|| DbError::UnknownColumn(format!("{name}.{column}")))?;
                if targets.contains(&idx) {
                    return Err(DbError::SchemaMismatch(format!(
                        "column '{column}' specified more than once"
                    )));
                }
                targets.push(idx);
            }
            targets
        };

        for (row_idx, row) in rows.iter().enumerate() {
            if row.len() != targets.len() {
                return Err(DbError::SchemaMismatch(format!(
                    "row {} has {} values but {} columns are targeted",
                    row_idx + 1,
                    row.len(),
                    targets.len()
                )));
            }
        }

        let mut arrays: Vec<ArrayRef> = Vec::with_capacity(schema.len());
        for (col_idx, column) in schema.columns().iter().enumerate() {
            let position = targets.iter().position(|&t| t == col_idx);
            let values = rows
                .iter()
                .map(|row| match position {
                    Some(pos) => coerce_value(&row[pos], column),
                    None => coerce_value(&ScalarValue::Null, column),
                })
                .collect::<Result<Vec<_>>>()?;
            arrays.push(ScalarValue::iter_to_array(&values, &column.data_type)?);
        }

        let batch = RecordBatch::try_new_with_row_count(table.arrow_schema.clone(), arrays, rows.len())?;
        self.append(name, batch)?;
        Ok(rows.len())
    }

    pub fn drop(&self, name: &str) -> Result<()> {
        self.tables
            .write()
            .remove(name)
            .map(|_| debug!(table = name, "dropped table"))
            .ok_or_else(|| DbError::UnknownTable(name.to_string()))
    }

    /// Table names in sorted order.
    pub fn table_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tables.read().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn row_count(&self, name: &str) -> Result<usize> {
        Ok(self.lookup(name)?.row_count())
    }
}

/// Assignment coercion of a single value into `column`.
fn coerce_value(value: &ScalarValue, column: &Column) -> Result<ScalarValue> {
    let mismatch = || {
        DbError::SchemaMismatch(format!(
            "cannot store {} in column '{}' of type {}",
            value, column.name, column.data_type
        ))
    };
    let coerced = match (value, column.data_type) {
        (ScalarValue::Null, _) if column.nullable => ScalarValue::Null,
        (ScalarValue::Null, _) => {
            return Err(DbError::SchemaMismatch(format!(
                "column '{}' is NOT NULL",
                column.name
            )))
        }
        (ScalarValue::Int64(v), DataType::Int64) => ScalarValue::Int64(*v),
        (ScalarValue::Int64(v), DataType::Float64) => ScalarValue::Float64(*v as f64),
        (ScalarValue::Int64(v), DataType::Decimal { .. }) => {
            return coerce_value(
                &ScalarValue::Decimal {
                    value: *v as i128,
                    precision: 19,
                    scale: 0,
                },
                column,
            )
        }
        (ScalarValue::Decimal { value, scale, .. }, DataType::Decimal {
            precision: to_precision,
            scale: to_scale,
        }) => {
            let rescaled = rescale_decimal(*value, *scale, to_scale)
                .filter(|v| decimal_fits(*v, to_precision))
                .ok_or_else(|| {
                    DbError::ArithmeticOverflow(format!(
                        "{} does not fit column '{}' of type {}",
                        value, column.name, column.data_type
                    ))
                })?;
            ScalarValue::Decimal {
                value: rescaled,
                precision: to_precision,
                scale: to_scale,
            }
        }
        (ScalarValue::Decimal { value, scale, .. }, DataType::Float64) => {
            ScalarValue::Float64(decimal_to_f64(*value, *scale))
        }
        (ScalarValue::Float64(v), DataType::Float64) => ScalarValue::Float64(*v),
        (ScalarValue::Text(v), DataType::Text) => ScalarValue::Text(v.clone()),
        (ScalarValue::Boolean(v), DataType::Boolean) => ScalarValue::Boolean(*v),
        _ => return Err(mismatch()),
    };
    Ok(coerced)
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::Int64Array;

    fn catalog_with_t() -> Catalog {
        let catalog = Catalog::new();
        catalog
            .define(
                "t",
                Schema::try_new(vec![
                    Column::new("a", DataType::Int64).not_null(),
                    Column::new("b", DataType::Int64),
                ])
                .unwrap(),
            )
            .unwrap();
        catalog
    }

    #[test]
    fn test_define_and_lookup() {
        let catalog = catalog_with_t();
        assert_eq!(catalog.lookup("t").unwrap().schema().len(), 2);
        assert!(matches!(
            catalog.lookup("missing").unwrap_err(),
            DbError::UnknownTable(_)
        ));
        let err = catalog
            .define("t", Schema::try_new(vec![]).unwrap())
            .unwrap_err();
        assert!(matches!(err, DbError::DuplicateTable(_)));
    }

    #[test]
    fn test_table_name_limits() {
        let catalog = Catalog::new();
        let schema = Schema::try_new(vec![Column::new("a", DataType::Int64)]).unwrap();
        assert!(matches!(
            catalog.define("", schema.clone()).unwrap_err(),
            DbError::InvalidName(_)
        ));
        assert!(matches!(
            catalog.define(&"x".repeat(256), schema.clone()).unwrap_err(),
            DbError::InvalidName(_)
        ));
        assert!(catalog.define(&"x".repeat(255), schema).is_ok());
    }

    #[test]
    fn test_insert_rows_with_column_list() {
        let catalog = catalog_with_t();
        let inserted = catalog
            .insert_rows(
                "t",
                &["a".to_string()],
                &[vec![ScalarValue::Int64(1)], vec![ScalarValue::Int64(2)]],
            )
            .unwrap();
        assert_eq!(inserted, 2);
        assert_eq!(catalog.row_count("t").unwrap(), 2);

        let snapshot = catalog.snapshot("t").unwrap();
        let rows = snapshot.batches[0].rows().unwrap();
        assert_eq!(rows[1], vec![ScalarValue::Int64(2), ScalarValue::Null]);
    }

    #[test]
    fn test_failed_insert_leaves_table_unchanged() {
        let catalog = catalog_with_t();
        catalog
            .insert_rows("t", &[], &[vec![ScalarValue::Int64(1), ScalarValue::Null]])
            .unwrap();

        let err = catalog
            .insert_rows(
                "t",
                &[],
                &[
                    vec![ScalarValue::Int64(2), ScalarValue::Int64(3)],
                    vec![ScalarValue::Text("x".into()), ScalarValue::Int64(4)],
                ],
            )
            .unwrap_err();
        assert!(matches!(err, DbError::SchemaMismatch(_)));

        let err = catalog
            .insert_rows("t", &["b".to_string()], &[vec![ScalarValue::Int64(5)]])
            .unwrap_err();
        assert!(matches!(err, DbError::SchemaMismatch(_)));
        assert_eq!(catalog.row_count("t").unwrap(), 1);
    }

    #[test]
    fn test_assignment_coercions() {
        let price = Column::new("price", DataType::decimal(6, 2).unwrap());
        assert_eq!(
            coerce_value(&ScalarValue::Int64(3), &price).unwrap(),
            ScalarValue::Decimal {
                value: 300,
                precision: 6,
                scale: 2
            }
        );
        assert!(matches!(
            coerce_value(&ScalarValue::Int64(1_000_000), &price).unwrap_err(),
            DbError::ArithmeticOverflow(_)
        ));
        let ratio = Column::new("ratio", DataType::Float64);
        assert_eq!(
            coerce_value(&ScalarValue::Int64(2), &ratio).unwrap(),
            ScalarValue::Float64(2.0)
        );
        assert!(coerce_value(&ScalarValue::Float64(2.5), &price).is_err());
    }

    #[test]
    fn test_snapshot_isolated_from_later_appends() {
        let catalog = catalog_with_t();
        catalog
            .insert_rows("t", &[], &[vec![ScalarValue::Int64(1), ScalarValue::Null]])
            .unwrap();
        let before = catalog.snapshot("t").unwrap();
        catalog
            .insert_rows("t", &[], &[vec![ScalarValue::Int64(2), ScalarValue::Null]])
            .unwrap();
        assert_eq!(before.batches.len(), 1);
        assert_eq!(catalog.snapshot("t").unwrap().batches.len(), 2);
    }

    #[test]
    fn test_append_rejects_wrong_shape() {
        let catalog = catalog_with_t();
        let schema = Arc::new(arrow::datatypes::Schema::new(vec![
            arrow::datatypes::Field::new("a", arrow::datatypes::DataType::Int64, true),
        ]));
        let batch =
            RecordBatch::try_new(schema, vec![Arc::new(Int64Array::from(vec![1])) as ArrayRef])
                .unwrap();
        assert!(matches!(
            catalog.append("t", batch).unwrap_err(),
            DbError::SchemaMismatch(_)
        ));
        assert_eq!(catalog.row_count("t").unwrap(), 0);
    }

    #[test]
    fn test_drop_and_names() {
        let catalog = catalog_with_t();
        catalog
            .define(
                "a_first",
                Schema::try_new(vec![Column::new("x", DataType::Text)]).unwrap(),
            )
            .unwrap();
        assert_eq!(catalog.table_names(), vec!["a_first", "t"]);
        catalog.drop("t").unwrap();
        assert!(matches!(catalog.drop("t").unwrap_err(), DbError::UnknownTable(_)));
    }
}
