// Row batches flowing between operators

use arrow::array::{new_empty_array, Array, ArrayRef, BooleanArray, UInt32Array};
use arrow::compute::{concat, filter};
use arrow::record_batch::RecordBatch as ArrowRecordBatch;
use arrow_select::take::take;

pub use arrow::datatypes::{Schema, SchemaRef};

use crate::error::{DbError, Result};
use crate::types::ScalarValue;

/// Equal-length Arrow columns plus an explicit row count.
///
/// The row count is stored separately so that a batch whose columns were all
/// pruned (e.g. the input of `COUNT(*)`) still knows its cardinality.
#[derive(Clone, Debug)]
pub struct RecordBatch {
    schema: SchemaRef,
    columns: Vec<ArrayRef>,
    num_rows: usize,
}

impl RecordBatch {
    /// Row count is taken from the first column (zero if there are none).
    pub fn try_new(schema: SchemaRef, columns: Vec<ArrayRef>) -> Result<Self> {
        let num_rows = columns.first().map_or(0, |c| c.len());
        Self::try_new_with_row_count(schema, columns, num_rows)
    }

    /// # Errors
    /// `Internal` if the column count, a column length or a column type
    /// disagrees with `schema` / `num_rows`.
    pub fn try_new_with_row_count(
        schema: SchemaRef,
        columns: Vec<ArrayRef>,
        num_rows: usize,
    ) -> Result<Self> {
        if schema.fields().len() != columns.len() {
            return Err(DbError::Internal(format!(
                "batch schema has {} fields, got {} columns",
                schema.fields().len(),
                columns.len()
            )));
        }
        for (field, column) in schema.fields().iter().zip(&columns) {
            if column.len() != num_rows {
                return Err(DbError::Internal(format!(
                    "column '{}' has {} rows, batch has {num_rows}",
                    field.name(),
                    column.len()
                )));
            }
            if column.data_type() != field.data_type() {
                return Err(DbError::Internal(format!(
                    "column '{}' holds {:?}, field declares {:?}",
                    field.name(),
                    column.data_type(),
                    field.data_type()
                )));
            }
        }
        Ok(Self {
            schema,
            columns,
            num_rows,
        })
    }

    pub fn from_arrow(batch: ArrowRecordBatch) -> Self {
        Self {
            schema: batch.schema(),
            num_rows: batch.num_rows(),
            columns: batch.columns().to_vec(),
        }
    }

    pub fn schema(&self) -> &SchemaRef {
        &self.schema
    }

    pub fn num_rows(&self) -> usize {
        self.num_rows
    }

    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn columns(&self) -> &[ArrayRef] {
        &self.columns
    }

    pub fn column(&self, index: usize) -> Result<&ArrayRef> {
        self.columns.get(index).ok_or_else(|| {
            DbError::Internal(format!(
                "column {index} requested from a batch of {} columns",
                self.columns.len()
            ))
        })
    }

    pub fn is_empty(&self) -> bool {
        self.num_rows == 0
    }

    /// Zero-copy view of `length` rows starting at `offset`.
    pub fn slice(&self, offset: usize, length: usize) -> Result<Self> {
        if offset.saturating_add(length) > self.num_rows {
            return Err(DbError::Internal(format!(
                "slice {offset}+{length} past the end of a {}-row batch",
                self.num_rows
            )));
        }
        let columns = self.columns.iter().map(|c| c.slice(offset, length)).collect();
        Self::try_new_with_row_count(self.schema.clone(), columns, length)
    }

    /// Rows where `mask` is true; null mask entries drop the row.
    pub fn filter(&self, mask: &BooleanArray) -> Result<Self> {
        let columns = self
            .columns
            .iter()
            .map(|c| filter(c.as_ref(), mask))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Self::try_new_with_row_count(self.schema.clone(), columns, mask.true_count())
    }

    /// Gather rows by index, in index order.
    pub fn take(&self, indices: &UInt32Array) -> Result<Self> {
        let columns = self
            .columns
            .iter()
            .map(|c| take(c.as_ref(), indices, None))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Self::try_new_with_row_count(self.schema.clone(), columns, indices.len())
    }

    /// Stitch `batches` (all of `schema`) into one batch; no batches gives an
    /// empty one.
    pub fn concat(schema: &SchemaRef, batches: &[Self]) -> Result<Self> {
        if let Some(stray) = batches.iter().find(|b| b.schema.fields() != schema.fields()) {
            return Err(DbError::Internal(format!(
                "cannot concatenate batch with fields {:?} into {:?}",
                stray.schema.fields(),
                schema.fields()
            )));
        }
        let columns = (0..schema.fields().len())
            .map(|idx| {
                if batches.is_empty() {
                    return Ok(new_empty_array(schema.field(idx).data_type()));
                }
                let parts: Vec<&dyn Array> =
                    batches.iter().map(|b| b.columns[idx].as_ref()).collect();
                Ok(concat(&parts)?)
            })
            .collect::<Result<Vec<_>>>()?;
        let num_rows = batches.iter().map(|b| b.num_rows).sum();
        Self::try_new_with_row_count(schema.clone(), columns, num_rows)
    }

    /// Materialize the batch row by row.
    pub fn rows(&self) -> Result<Vec<Vec<ScalarValue>>> {
        (0..self.num_rows)
            .map(|row| {
                self.columns
                    .iter()
                    .map(|c| ScalarValue::try_from_array(c.as_ref(), row))
                    .collect()
            })
            .collect()
    }
}
