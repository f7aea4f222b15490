// Expression projection

use crate::error::Result;
use crate::execution::batch::{RecordBatch, SchemaRef};
use crate::execution::expressions::{evaluate, PhysicalExpr};
use crate::execution::operators::{BoxedOperator, Operator};

/// Project operator that computes one output column per expression,
/// preserving row order and count
pub struct ProjectOperator {
    input: BoxedOperator,
    exprs: Vec<PhysicalExpr>,
    schema: SchemaRef,
}

impl ProjectOperator {
    pub fn new(input: BoxedOperator, exprs: Vec<PhysicalExpr>, schema: SchemaRef) -> Self {
        Self {
            input,
            exprs,
            schema,
        }
    }
}

impl Operator for ProjectOperator {
    fn schema(&self) -> SchemaRef {
        self.schema.clone()
    }

    fn next_batch(&mut self) -> Result<Option<RecordBatch>> {
        let Some(batch) = self.input.next_batch()? else {
            return Ok(None);
        };
        let columns = self
            .exprs
            .iter()
            .map(|expr| evaluate(expr, &batch))
            .collect::<Result<Vec<_>>>()?;
        RecordBatch::try_new_with_row_count(self.schema.clone(), columns, batch.num_rows())
            .map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use arrow::datatypes::{Field, Schema};

    use crate::execution::operators::test_util::{int_rows, int_source};
    use crate::sql::ast::BinaryOperator;
    use crate::types::{DataType, ScalarValue};

    #[test]
    fn test_project_computes_expressions() {
        let input = int_source(&["a", "b"], vec![vec![vec![Some(1), Some(2)], vec![Some(10), None]]]);
        let sum = PhysicalExpr::Binary {
            left: Box::new(PhysicalExpr::Column {
                index: 0,
                data_type: DataType::Int64,
            }),
            op: BinaryOperator::Plus,
            right: Box::new(PhysicalExpr::Column {
                index: 1,
                data_type: DataType::Int64,
            }),
            data_type: DataType::Int64,
        };
        let constant = PhysicalExpr::Literal {
            value: ScalarValue::Int64(5),
            data_type: DataType::Int64,
        };
        let schema = Arc::new(Schema::new(vec![
            Field::new("sum", arrow::datatypes::DataType::Int64, true),
            Field::new("five", arrow::datatypes::DataType::Int64, true),
        ]));
        let mut project = ProjectOperator::new(Box::new(input), vec![sum, constant], schema);
        let batch = project.next_batch().unwrap().unwrap();
        assert_eq!(
            int_rows(&[batch]),
            vec![vec![Some(11), Some(5)], vec![None, Some(5)]]
        );
        assert!(project.next_batch().unwrap().is_none());
    }
}
