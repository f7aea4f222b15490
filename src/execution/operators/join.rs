// Inner joins (hash and nested loop)

use std::collections::{HashMap, VecDeque};

use arrow::array::{ArrayRef, UInt32Array};
use tracing::{debug, trace};

use crate::error::{DbError, Result};
use crate::execution::batch::{RecordBatch, SchemaRef};
use crate::execution::expressions::{evaluate, PhysicalExpr};
use crate::execution::operators::{drain, BoxedOperator, Operator};
use crate::planner::BuildSide;
use crate::types::ScalarValue;

/// Materialized build input plus a map from key tuple to its row indices.
struct BuildTable {
    batch: RecordBatch,
    rows: HashMap<Vec<ScalarValue>, Vec<u32>>,
}

/// Hash join: build a hash table from one input, stream the other through it.
///
/// Output columns are always the left input's followed by the right input's,
/// whichever side is built. Rows whose key contains a null never match.
pub struct HashJoinOperator {
    left: BoxedOperator,
    right: BoxedOperator,
    left_keys: Vec<PhysicalExpr>,
    right_keys: Vec<PhysicalExpr>,
    build_side: BuildSide,
    schema: SchemaRef,
    table: Option<BuildTable>,
}

impl HashJoinOperator {
    /// `left_keys[i]` is evaluated over the left input and compared with
    /// `right_keys[i]` over the right input.
    pub fn new(
        left: BoxedOperator,
        right: BoxedOperator,
        left_keys: Vec<PhysicalExpr>,
        right_keys: Vec<PhysicalExpr>,
        build_side: BuildSide,
        schema: SchemaRef,
    ) -> Self {
        Self {
            left,
            right,
            left_keys,
            right_keys,
            build_side,
            schema,
            table: None,
        }
    }

    fn build(&mut self) -> Result<BuildTable> {
        let (input, keys) = match self.build_side {
            BuildSide::Left => (&mut self.left, &self.left_keys),
            BuildSide::Right => (&mut self.right, &self.right_keys),
        };
        let schema = input.schema();
        let batches = drain(input.as_mut())?;
        let batch = RecordBatch::concat(&schema, &batches)?;

        let key_arrays = evaluate_keys(keys, &batch)?;
        let mut rows: HashMap<Vec<ScalarValue>, Vec<u32>> = HashMap::new();
        for row in 0..batch.num_rows() {
            if let Some(key) = row_key(&key_arrays, row)? {
                rows.entry(key).or_default().push(row_index(row)?);
            }
        }
        debug!(
            build_rows = batch.num_rows(),
            distinct_keys = rows.len(),
            "built hash table"
        );
        Ok(BuildTable { batch, rows })
    }
}

impl Operator for HashJoinOperator {
    fn schema(&self) -> SchemaRef {
        self.schema.clone()
    }

    fn next_batch(&mut self) -> Result<Option<RecordBatch>> {
        if self.table.is_none() {
            self.table = Some(self.build()?);
        }
        let Some(table) = self.table.as_ref() else {
            return Ok(None);
        };

        // An empty build side still pulls the probe input so its errors surface.
        let (probe, probe_keys) = match self.build_side {
            BuildSide::Left => (&mut self.right, &self.right_keys),
            BuildSide::Right => (&mut self.left, &self.left_keys),
        };
        while let Some(batch) = probe.next_batch()? {
            let key_arrays = evaluate_keys(probe_keys, &batch)?;
            let mut probe_rows = Vec::new();
            let mut build_rows = Vec::new();
            for row in 0..batch.num_rows() {
                let Some(key) = row_key(&key_arrays, row)? else {
                    continue;
                };
                if let Some(matches) = table.rows.get(&key) {
                    for &build_row in matches {
                        probe_rows.push(row_index(row)?);
                        build_rows.push(build_row);
                    }
                }
            }
            trace!(
                probe_rows = batch.num_rows(),
                matches = probe_rows.len(),
                "probed hash table"
            );
            if probe_rows.is_empty() {
                continue;
            }

            let probe_out = batch.take(&UInt32Array::from(probe_rows))?;
            let build_out = table.batch.take(&UInt32Array::from(build_rows))?;
            let (left_out, right_out) = match self.build_side {
                BuildSide::Left => (build_out, probe_out),
                BuildSide::Right => (probe_out, build_out),
            };
            return combine(&self.schema, &left_out, &right_out).map(Some);
        }
        Ok(None)
    }
}

/// Cartesian product: the right input is materialized, the left streamed.
///
/// Each output batch pairs a run of left rows with every right row, sized to
/// stay near `batch_size` rows.
pub struct NestedLoopJoinOperator {
    left: BoxedOperator,
    right: BoxedOperator,
    schema: SchemaRef,
    batch_size: usize,
    right_batch: Option<RecordBatch>,
    pending: VecDeque<RecordBatch>,
}

impl NestedLoopJoinOperator {
    pub fn new(
        left: BoxedOperator,
        right: BoxedOperator,
        schema: SchemaRef,
        batch_size: usize,
    ) -> Self {
        Self {
            left,
            right,
            schema,
            batch_size,
            right_batch: None,
            pending: VecDeque::new(),
        }
    }

    fn cross(&self, left: &RecordBatch, right: &RecordBatch) -> Result<VecDeque<RecordBatch>> {
        let per_chunk = (self.batch_size / right.num_rows()).max(1);
        let mut out = VecDeque::new();
        let mut start = 0;
        while start < left.num_rows() {
            let end = (start + per_chunk).min(left.num_rows());
            let mut left_rows = Vec::with_capacity((end - start) * right.num_rows());
            let mut right_rows = Vec::with_capacity((end - start) * right.num_rows());
            for l in start..end {
                for r in 0..right.num_rows() {
                    left_rows.push(row_index(l)?);
                    right_rows.push(row_index(r)?);
                }
            }
            let left_out = left.take(&UInt32Array::from(left_rows))?;
            let right_out = right.take(&UInt32Array::from(right_rows))?;
            out.push_back(combine(&self.schema, &left_out, &right_out)?);
            start = end;
        }
        Ok(out)
    }
}

impl Operator for NestedLoopJoinOperator {
    fn schema(&self) -> SchemaRef {
        self.schema.clone()
    }

    fn next_batch(&mut self) -> Result<Option<RecordBatch>> {
        if self.right_batch.is_none() {
            let schema = self.right.schema();
            let batches = drain(self.right.as_mut())?;
            self.right_batch = Some(RecordBatch::concat(&schema, &batches)?);
        }
        loop {
            if let Some(batch) = self.pending.pop_front() {
                return Ok(Some(batch));
            }
            let right = match &self.right_batch {
                Some(right) if !right.is_empty() => right.clone(),
                _ => {
                    drain(self.left.as_mut())?;
                    return Ok(None);
                }
            };
            let Some(left) = self.left.next_batch()? else {
                return Ok(None);
            };
            self.pending = self.cross(&left, &right)?;
        }
    }
}

fn evaluate_keys(keys: &[PhysicalExpr], batch: &RecordBatch) -> Result<Vec<ArrayRef>> {
    keys.iter().map(|k| evaluate(k, batch)).collect()
}

/// The key tuple of `row`, or `None` if any component is null.
fn row_key(arrays: &[ArrayRef], row: usize) -> Result<Option<Vec<ScalarValue>>> {
    let mut key = Vec::with_capacity(arrays.len());
    for array in arrays {
        let value = ScalarValue::try_from_array(array.as_ref(), row)?;
        if value.is_null() {
            return Ok(None);
        }
        key.push(value);
    }
    Ok(Some(key))
}

fn row_index(row: usize) -> Result<u32> {
    u32::try_from(row).map_err(|_| DbError::Internal(format!("row index {row} exceeds u32")))
}

fn combine(schema: &SchemaRef, left: &RecordBatch, right: &RecordBatch) -> Result<RecordBatch> {
    let mut columns = left.columns().to_vec();
    columns.extend(right.columns().iter().cloned());
    RecordBatch::try_new_with_row_count(schema.clone(), columns, left.num_rows())
}
