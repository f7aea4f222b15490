// Execution engine coordinator

use arrow::array::{new_empty_array, ArrayRef};
use arrow::compute::concat;
use tracing::debug;

use crate::binder::{BoundExpr, BoundSelect};
use crate::config::EngineConfig;
use crate::error::{DbError, Result};
use crate::execution::expressions::{create_physical_expr, PhysicalExpr};
use crate::execution::operators::{
    drain, output_schema, AggregateExpr, AggregateOperator, BoxedOperator, FilterOperator,
    HashJoinOperator, LimitOperator, NestedLoopJoinOperator, ProjectOperator, ScanOperator,
    SortOperator,
};
use crate::planner::{plan_select, JoinStrategy, LogicalPlan, OutputColumn};
use crate::sql::ast::BinaryOperator;
use crate::types::DataType;

/// Executor that turns logical plans into trees of physical operators
pub struct Executor<'a> {
    config: &'a EngineConfig,
}

impl<'a> Executor<'a> {
    pub fn new(config: &'a EngineConfig) -> Self {
        Self { config }
    }

    /// Build the operator tree for `plan`. Nothing is read until the root
    /// operator is pulled, except `IN (subquery)` operands, which are fully
    /// evaluated here.
    pub fn build(&self, plan: &LogicalPlan) -> Result<BoxedOperator> {
        let schema = output_schema(&plan.output_columns());
        Ok(match plan {
            LogicalPlan::Scan {
                table, projection, ..
            } => Box::new(ScanOperator::new(table.clone(), projection.clone(), schema)),
            LogicalPlan::Filter { input, predicate } => {
                let predicate = self.compile(predicate, &input.output_columns())?;
                Box::new(FilterOperator::new(self.build(input)?, predicate))
            }
            LogicalPlan::Project { input, exprs, .. } => {
                let columns = input.output_columns();
                let exprs = exprs
                    .iter()
                    .map(|e| self.compile(e, &columns))
                    .collect::<Result<Vec<_>>>()?;
                Box::new(ProjectOperator::new(self.build(input)?, exprs, schema))
            }
            LogicalPlan::Join {
                left,
                right,
                on,
                strategy,
            } => {
                let left_op = self.build(left)?;
                let right_op = self.build(right)?;
                match strategy {
                    JoinStrategy::Hash { build } => {
                        let left_columns = left.output_columns();
                        let right_columns = right.output_columns();
                        let left_keys = on
                            .iter()
                            .map(|k| self.compile(&k.left, &left_columns))
                            .collect::<Result<Vec<_>>>()?;
                        let right_keys = on
                            .iter()
                            .map(|k| self.compile(&k.right, &right_columns))
                            .collect::<Result<Vec<_>>>()?;
                        Box::new(HashJoinOperator::new(
                            left_op, right_op, left_keys, right_keys, *build, schema,
                        ))
                    }
                    JoinStrategy::NestedLoop => {
                        let join: BoxedOperator = Box::new(NestedLoopJoinOperator::new(
                            left_op,
                            right_op,
                            schema,
                            self.config.batch_size_rows,
                        ));
                        // Keys on a nested-loop join are checked after the product.
                        let keys = on.iter().map(|k| BoundExpr::Binary {
                            left: Box::new(k.left.clone()),
                            op: BinaryOperator::Eq,
                            right: Box::new(k.right.clone()),
                            data_type: DataType::Boolean,
                        });
                        match BoundExpr::conjunction(keys) {
                            Some(predicate) => {
                                let predicate = self.compile(&predicate, &plan.output_columns())?;
                                Box::new(FilterOperator::new(join, predicate))
                            }
                            None => join,
                        }
                    }
                }
            }
            LogicalPlan::Aggregate {
                input,
                group_exprs,
                aggregates,
                ..
            } => {
                let columns = input.output_columns();
                let group_exprs = group_exprs
                    .iter()
                    .map(|e| self.compile(e, &columns))
                    .collect::<Result<Vec<_>>>()?;
                let aggregates = aggregates
                    .iter()
                    .map(|a| {
                        Ok(AggregateExpr {
                            func: a.func,
                            arg: a
                                .arg
                                .as_ref()
                                .map(|e| self.compile(e, &columns))
                                .transpose()?,
                            data_type: a.data_type,
                        })
                    })
                    .collect::<Result<Vec<_>>>()?;
                Box::new(AggregateOperator::new(
                    self.build(input)?,
                    group_exprs,
                    aggregates,
                    schema,
                    self.config.batch_size_rows,
                ))
            }
            LogicalPlan::Sort { input, keys } => {
                let columns = input.output_columns();
                let keys = keys
                    .iter()
                    .map(|k| Ok((self.compile(&k.expr, &columns)?, k.ascending)))
                    .collect::<Result<Vec<_>>>()?;
                Box::new(SortOperator::new(
                    self.build(input)?,
                    keys,
                    self.config.batch_size_rows,
                ))
            }
            LogicalPlan::Limit {
                input,
                limit,
                offset,
            } => Box::new(LimitOperator::new(self.build(input)?, *limit, *offset)),
        })
    }

    fn compile(&self, expr: &BoundExpr, input: &[OutputColumn]) -> Result<PhysicalExpr> {
        let mut run_subquery = |select: &BoundSelect| self.run_subquery(select);
        create_physical_expr(expr, input, &mut run_subquery)
    }

    /// Plan and fully execute an uncorrelated subquery, returning its only column.
    fn run_subquery(&self, select: &BoundSelect) -> Result<ArrayRef> {
        let plan = plan_select(select, self.config)?;
        let mut root = self.build(&plan)?;
        let schema = root.schema();
        let field = schema
            .fields()
            .first()
            .ok_or_else(|| DbError::Internal("subquery produced no columns".to_string()))?;
        let batches = drain(root.as_mut())?;
        debug!(batches = batches.len(), "evaluated subquery");
        let arrays = batches
            .iter()
            .map(|b| b.column(0).map(|c| c.as_ref()))
            .collect::<Result<Vec<_>>>()?;
        if arrays.is_empty() {
            return Ok(new_empty_array(field.data_type()));
        }
        Ok(concat(&arrays)?)
    }
}

/// Build the operator tree for `plan` with `config`.
pub fn execute_plan(plan: &LogicalPlan, config: &EngineConfig) -> Result<BoxedOperator> {
    Executor::new(config).build(plan)
}
