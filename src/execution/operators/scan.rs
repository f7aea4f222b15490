// Table scans

use tracing::trace;

use crate::catalog::{BatchIter, TableSnapshot};
use crate::error::Result;
use crate::execution::batch::{RecordBatch, SchemaRef};
use crate::execution::operators::Operator;

/// Scan operator that reads a table snapshot
/// Emits the stored batches first, then whatever the table's loader yields,
/// keeping only the projected columns
pub struct ScanOperator {
    table: TableSnapshot,
    projection: Vec<usize>,
    schema: SchemaRef,
    next_stored: usize,
    loaded: Option<BatchIter>,
}

impl ScanOperator {
    /// Create a new Scan operator
    ///
    /// # Arguments
    /// * `table` - Snapshot of the table contents to read
    /// * `projection` - Indices of the table columns to emit, in order
    /// * `schema` - Output schema (one field per projected column)
    pub fn new(table: TableSnapshot, projection: Vec<usize>, schema: SchemaRef) -> Self {
        Self {
            table,
            projection,
            schema,
            next_stored: 0,
            loaded: None,
        }
    }

    fn project(&self, batch: &RecordBatch) -> Result<RecordBatch> {
        let columns = self
            .projection
            .iter()
            .map(|&idx| batch.column(idx).cloned())
            .collect::<Result<Vec<_>>>()?;
        RecordBatch::try_new_with_row_count(self.schema.clone(), columns, batch.num_rows())
    }
}

impl Operator for ScanOperator {
    fn schema(&self) -> SchemaRef {
        self.schema.clone()
    }

    fn next_batch(&mut self) -> Result<Option<RecordBatch>> {
        if let Some(batch) = self.table.batches.get(self.next_stored) {
            self.next_stored += 1;
            trace!(table = %self.table.name, rows = batch.num_rows(), "scan stored batch");
            return self.project(batch).map(Some);
        }

        let Some(loader) = self.table.loader.clone() else {
            return Ok(None);
        };
        if self.loaded.is_none() {
            self.loaded = Some(loader.load_batches()?);
        }
        let Some(batches) = self.loaded.as_mut() else {
            return Ok(None);
        };
        match batches.next() {
            Some(batch) => {
                let batch = batch?;
                self.table.schema.check_batch(&batch)?;
                trace!(table = %self.table.name, rows = batch.num_rows(), "scan loaded batch");
                self.project(&batch).map(Some)
            }
            None => Ok(None),
        }
    }
}
