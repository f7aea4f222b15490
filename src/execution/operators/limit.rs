// LIMIT / OFFSET

use crate::error::Result;
use crate::execution::batch::{RecordBatch, SchemaRef};
use crate::execution::operators::{BoxedOperator, Operator};

/// Skips `offset` rows, then passes through at most `limit` rows.
/// Stops pulling from its input once the limit is reached.
pub struct LimitOperator {
    input: BoxedOperator,
    skip: usize,
    remaining: Option<usize>,
}

impl LimitOperator {
    pub fn new(input: BoxedOperator, limit: Option<u64>, offset: u64) -> Self {
        Self {
            input,
            skip: usize::try_from(offset).unwrap_or(usize::MAX),
            remaining: limit.map(|l| usize::try_from(l).unwrap_or(usize::MAX)),
        }
    }
}

impl Operator for LimitOperator {
    fn schema(&self) -> SchemaRef {
        self.input.schema()
    }

    fn next_batch(&mut self) -> Result<Option<RecordBatch>> {
        loop {
            if self.remaining == Some(0) {
                return Ok(None);
            }
            let Some(mut batch) = self.input.next_batch()? else {
                return Ok(None);
            };
            if self.skip > 0 {
                let skipped = self.skip.min(batch.num_rows());
                self.skip -= skipped;
                batch = batch.slice(skipped, batch.num_rows() - skipped)?;
            }
            if let Some(remaining) = self.remaining.as_mut() {
                let take = (*remaining).min(batch.num_rows());
                *remaining -= take;
                batch = batch.slice(0, take)?;
            }
            if !batch.is_empty() {
                return Ok(Some(batch));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::operators::drain;
    use crate::execution::operators::test_util::{int_rows, int_source};

    fn source() -> BoxedOperator {
        Box::new(int_source(
            &["a"],
            vec![
                vec![vec![Some(1), Some(2)]],
                vec![vec![Some(3), Some(4), Some(5)]],
            ],
        ))
    }

    #[test]
    fn test_offset_spans_batches() {
        let mut limit = LimitOperator::new(source(), Some(2), 3);
        let rows = int_rows(&drain(&mut limit).unwrap());
        assert_eq!(rows, vec![vec![Some(4)], vec![Some(5)]]);
    }

    #[test]
    fn test_limit_zero_and_offset_only() {
        let mut none = LimitOperator::new(source(), Some(0), 0);
        assert!(none.next_batch().unwrap().is_none());

        let mut offset_only = LimitOperator::new(source(), None, 1);
        assert_eq!(int_rows(&drain(&mut offset_only).unwrap()).len(), 4);
    }
}
