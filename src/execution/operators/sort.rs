// ORDER BY sorting

use std::collections::VecDeque;
use std::sync::Arc;

use arrow::array::UInt32Array;
use arrow_ord::sort::{lexsort_to_indices, SortColumn, SortOptions};
use tracing::trace;

use crate::error::{DbError, Result};
use crate::execution::batch::{RecordBatch, SchemaRef};
use crate::execution::expressions::{evaluate, PhysicalExpr};
use crate::execution::operators::{drain, split_batch, BoxedOperator, Operator};

/// Sort operator for ORDER BY
/// Materializes its input and uses arrow_ord::lexsort for the multi-key sort.
/// Nulls sort first for both directions; ties keep their input order.
pub struct SortOperator {
    input: BoxedOperator,
    keys: Vec<(PhysicalExpr, bool)>,
    batch_size: usize,
    output: Option<VecDeque<RecordBatch>>,
}

impl SortOperator {
    /// `keys` pairs each sort expression with its direction (`true` = ascending).
    pub fn new(input: BoxedOperator, keys: Vec<(PhysicalExpr, bool)>, batch_size: usize) -> Self {
        Self {
            input,
            keys,
            batch_size,
            output: None,
        }
    }

    fn sort_all(&mut self) -> Result<VecDeque<RecordBatch>> {
        let schema = self.input.schema();
        let batches = drain(self.input.as_mut())?;
        let batch = RecordBatch::concat(&schema, &batches)?;
        if batch.num_rows() <= 1 {
            return Ok(VecDeque::from([batch]));
        }

        let mut sort_columns = self
            .keys
            .iter()
            .map(|(expr, ascending)| {
                Ok(SortColumn {
                    values: evaluate(expr, &batch)?,
                    options: Some(SortOptions {
                        descending: !ascending,
                        nulls_first: true,
                    }),
                })
            })
            .collect::<Result<Vec<_>>>()?;
        // Input position as the last key makes the sort stable.
        let rows = u32::try_from(batch.num_rows())
            .map_err(|_| DbError::Internal("too many rows to sort".to_string()))?;
        sort_columns.push(SortColumn {
            values: Arc::new(UInt32Array::from_iter_values(0..rows)),
            options: None,
        });

        let indices = lexsort_to_indices(&sort_columns, None)?;
        trace!(rows = batch.num_rows(), "sorted input");
        split_batch(batch.take(&indices)?, self.batch_size)
    }
}

impl Operator for SortOperator {
    fn schema(&self) -> SchemaRef {
        self.input.schema()
    }

    fn next_batch(&mut self) -> Result<Option<RecordBatch>> {
        if self.output.is_none() {
            self.output = Some(self.sort_all()?);
        }
        Ok(self
            .output
            .as_mut()
            .and_then(|batches| batches.pop_front())
            .filter(|batch| !batch.is_empty()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::operators::test_util::{int_rows, int_source};
    use crate::types::DataType;

    fn column(index: usize) -> PhysicalExpr {
        PhysicalExpr::Column {
            index,
            data_type: DataType::Int64,
        }
    }

    #[test]
    fn test_nulls_first_in_both_directions() {
        for ascending in [true, false] {
            let input = int_source(
                &["a"],
                vec![vec![vec![Some(2), None]], vec![vec![Some(1), None, Some(3)]]],
            );
            let mut sort = SortOperator::new(Box::new(input), vec![(column(0), ascending)], 100);
            let rows = int_rows(&drain(&mut sort).unwrap());
            let expected = if ascending {
                vec![None, None, Some(1), Some(2), Some(3)]
            } else {
                vec![None, None, Some(3), Some(2), Some(1)]
            };
            assert_eq!(rows.into_iter().map(|r| r[0]).collect::<Vec<_>>(), expected);
        }
    }

    #[test]
    fn test_sort_is_stable_and_respects_batch_size() {
        let input = int_source(
            &["k", "pos"],
            vec![vec![
                vec![Some(1), Some(0), Some(1), Some(0)],
                vec![Some(0), Some(1), Some(2), Some(3)],
            ]],
        );
        let mut sort = SortOperator::new(Box::new(input), vec![(column(0), true)], 3);
        let batches = drain(&mut sort).unwrap();
        assert_eq!(batches.len(), 2);
        let positions: Vec<Option<i64>> = int_rows(&batches).into_iter().map(|r| r[1]).collect();
        assert_eq!(positions, vec![Some(1), Some(3), Some(0), Some(2)]);
    }
}
