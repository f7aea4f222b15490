pub mod aggregate;
pub mod filter;
pub mod join;
pub mod limit;
pub mod project;
pub mod scan;
pub mod sort;

pub use aggregate::{AggregateExpr, AggregateOperator};
pub use filter::FilterOperator;
pub use join::{HashJoinOperator, NestedLoopJoinOperator};
pub use limit::LimitOperator;
pub use project::ProjectOperator;
pub use scan::ScanOperator;
pub use sort::SortOperator;

use std::collections::VecDeque;
use std::sync::Arc;

use arrow::datatypes::{Field, Schema};

use crate::error::Result;
use crate::execution::batch::{RecordBatch, SchemaRef};
use crate::planner::OutputColumn;

/// A pull-based physical operator.
///
/// Each call to [`Operator::next_batch`] produces the next batch of output,
/// `Ok(None)` once the operator is exhausted. An error ends the stream.
pub trait Operator: Send {
    /// The schema every emitted batch carries
    fn schema(&self) -> SchemaRef;

    fn next_batch(&mut self) -> Result<Option<RecordBatch>>;
}

pub type BoxedOperator = Box<dyn Operator>;

/// Arrow schema for a list of plan output columns.
pub fn output_schema(columns: &[OutputColumn]) -> SchemaRef {
    let fields: Vec<Field> = columns
        .iter()
        .map(|c| Field::new(c.name.as_str(), c.data_type.to_arrow(), true))
        .collect();
    Arc::new(Schema::new(fields))
}

/// Pull every remaining batch out of `input`.
pub fn drain(input: &mut dyn Operator) -> Result<Vec<RecordBatch>> {
    let mut batches = Vec::new();
    while let Some(batch) = input.next_batch()? {
        batches.push(batch);
    }
    Ok(batches)
}

/// Split a materialized result into batches of at most `batch_size` rows.
pub(crate) fn split_batch(batch: RecordBatch, batch_size: usize) -> Result<VecDeque<RecordBatch>> {
    let mut out = VecDeque::new();
    if batch.num_rows() <= batch_size {
        out.push_back(batch);
        return Ok(out);
    }
    let mut offset = 0;
    while offset < batch.num_rows() {
        let length = batch_size.min(batch.num_rows() - offset);
        out.push_back(batch.slice(offset, length)?);
        offset += length;
    }
    Ok(out)
}
