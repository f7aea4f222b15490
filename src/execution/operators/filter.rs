// Vectorized filtering

use tracing::trace;

use crate::error::Result;
use crate::execution::batch::{RecordBatch, SchemaRef};
use crate::execution::expressions::{evaluate_predicate, PhysicalExpr};
use crate::execution::operators::{BoxedOperator, Operator};

/// Filter operator that keeps rows whose predicate evaluates to true
/// (false and null both drop the row)
pub struct FilterOperator {
    input: BoxedOperator,
    predicate: PhysicalExpr,
}

impl FilterOperator {
    pub fn new(input: BoxedOperator, predicate: PhysicalExpr) -> Self {
        Self { input, predicate }
    }
}

impl Operator for FilterOperator {
    fn schema(&self) -> SchemaRef {
        self.input.schema()
    }

    fn next_batch(&mut self) -> Result<Option<RecordBatch>> {
        // Skip batches the predicate empties entirely.
        while let Some(batch) = self.input.next_batch()? {
            let mask = evaluate_predicate(&self.predicate, &batch)?;
            let filtered = batch.filter(&mask)?;
            trace!(
                input_rows = batch.num_rows(),
                output_rows = filtered.num_rows(),
                "filter batch"
            );
            if !filtered.is_empty() {
                return Ok(Some(filtered));
            }
        }
        Ok(None)
    }
}
