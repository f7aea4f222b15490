// Vectorized expression evaluation

use std::sync::Arc;

use arrow::array::{Array, ArrayRef, BooleanArray, Float64Array};
use arrow::compute::kernels::boolean::{and, and_kleene, is_not_null, is_null, not, or_kleene};
use arrow::compute::kernels::filter::prep_null_mask_filter;
use arrow::compute::kernels::numeric;
use arrow::datatypes::Schema as ArrowSchema;
use arrow_ord::cmp;

use crate::binder::{BoundExpr, BoundSelect};
use crate::error::{DbError, Result};
use crate::execution::batch::RecordBatch;
use crate::planner::OutputColumn;
use crate::sql::ast::BinaryOperator;
use crate::types::{cast_array, decimal_fits, downcast_array, DataType, ScalarValue};

/// An expression compiled against the column positions of one operator's input.
#[derive(Debug, Clone, PartialEq)]
pub enum PhysicalExpr {
    Column {
        index: usize,
        data_type: DataType,
    },
    Literal {
        value: ScalarValue,
        data_type: DataType,
    },
    Cast {
        expr: Box<PhysicalExpr>,
        data_type: DataType,
    },
    Negate(Box<PhysicalExpr>),
    Not(Box<PhysicalExpr>),
    Binary {
        left: Box<PhysicalExpr>,
        op: BinaryOperator,
        right: Box<PhysicalExpr>,
        data_type: DataType,
    },
    IsNull {
        expr: Box<PhysicalExpr>,
        negated: bool,
    },
    InList {
        expr: Box<PhysicalExpr>,
        list: Vec<PhysicalExpr>,
        negated: bool,
    },
}

impl PhysicalExpr {
    pub fn data_type(&self) -> DataType {
        match self {
            PhysicalExpr::Column { data_type, .. }
            | PhysicalExpr::Literal { data_type, .. }
            | PhysicalExpr::Cast { data_type, .. }
            | PhysicalExpr::Binary { data_type, .. } => *data_type,
            PhysicalExpr::Negate(expr) => expr.data_type(),
            PhysicalExpr::Not(_) | PhysicalExpr::IsNull { .. } | PhysicalExpr::InList { .. } => {
                DataType::Boolean
            }
        }
    }
}

/// Runs an uncorrelated subquery and returns its single output column.
pub type SubqueryRunner<'a> = dyn FnMut(&BoundSelect) -> Result<ArrayRef> + 'a;

/// Compile a bound expression against `input`, the columns of the batches it
/// will be evaluated over. `IN (subquery)` is resolved here: the subquery runs
/// once and its values become a literal list.
pub fn create_physical_expr(
    expr: &BoundExpr,
    input: &[OutputColumn],
    subqueries: &mut SubqueryRunner<'_>,
) -> Result<PhysicalExpr> {
    let mut compile = |e: &BoundExpr| create_physical_expr(e, input, subqueries);
    Ok(match expr {
        BoundExpr::Column {
            column,
            data_type,
            name,
        } => {
            let index = input
                .iter()
                .position(|c| c.column == *column)
                .ok_or_else(|| {
                    DbError::Internal(format!("column {name} is not produced by the operator input"))
                })?;
            PhysicalExpr::Column {
                index,
                data_type: *data_type,
            }
        }
        BoundExpr::Literal { value, data_type } => PhysicalExpr::Literal {
            value: value.clone(),
            data_type: *data_type,
        },
        BoundExpr::Cast { expr, data_type } => PhysicalExpr::Cast {
            expr: Box::new(compile(expr)?),
            data_type: *data_type,
        },
        BoundExpr::Negate(expr) => PhysicalExpr::Negate(Box::new(compile(expr)?)),
        BoundExpr::Not(expr) => PhysicalExpr::Not(Box::new(compile(expr)?)),
        BoundExpr::Binary {
            left,
            op,
            right,
            data_type,
        } => PhysicalExpr::Binary {
            left: Box::new(compile(left)?),
            op: *op,
            right: Box::new(compile(right)?),
            data_type: *data_type,
        },
        BoundExpr::IsNull { expr, negated } => PhysicalExpr::IsNull {
            expr: Box::new(compile(expr)?),
            negated: *negated,
        },
        BoundExpr::InList {
            expr,
            list,
            negated,
        } => PhysicalExpr::InList {
            expr: Box::new(compile(expr)?),
            list: list.iter().map(&mut compile).collect::<Result<_>>()?,
            negated: *negated,
        },
        BoundExpr::InSubquery {
            expr,
            subquery,
            negated,
        } => {
            let probe = compile(expr)?;
            let element_type = probe.data_type();
            let values = cast_array(&subqueries(subquery.0.as_ref())?, &element_type)?;
            let list = (0..values.len())
                .map(|row| {
                    Ok(PhysicalExpr::Literal {
                        value: ScalarValue::try_from_array(values.as_ref(), row)?,
                        data_type: element_type,
                    })
                })
                .collect::<Result<_>>()?;
            PhysicalExpr::InList {
                expr: Box::new(probe),
                list,
                negated: *negated,
            }
        }
        BoundExpr::Aggregate(agg) => {
            return Err(DbError::Internal(format!(
                "aggregate {agg} cannot be evaluated outside an aggregation"
            )))
        }
    })
}

/// Evaluate `expr` over every row of `batch`.
pub fn evaluate(expr: &PhysicalExpr, batch: &RecordBatch) -> Result<ArrayRef> {
    match expr {
        PhysicalExpr::Column { index, .. } => Ok(batch.column(*index)?.clone()),
        PhysicalExpr::Literal { value, data_type } => value.to_array(data_type, batch.num_rows()),
        PhysicalExpr::Cast { expr, data_type } => cast_array(&evaluate(expr, batch)?, data_type),
        PhysicalExpr::Negate(expr) => {
            let value = evaluate(expr, batch)?;
            Ok(numeric::neg(value.as_ref())?)
        }
        PhysicalExpr::Not(expr) => {
            let value = evaluate(expr, batch)?;
            Ok(Arc::new(not(as_boolean(&value)?)?))
        }
        PhysicalExpr::Binary {
            left,
            op,
            right,
            data_type,
        } => {
            let l = evaluate(left, batch)?;
            let r = evaluate(right, batch)?;
            evaluate_binary(&l, *op, &r, data_type)
        }
        PhysicalExpr::IsNull { expr, negated } => {
            let value = evaluate(expr, batch)?;
            let mask = if *negated {
                is_not_null(value.as_ref())?
            } else {
                is_null(value.as_ref())?
            };
            Ok(Arc::new(mask))
        }
        PhysicalExpr::InList {
            expr,
            list,
            negated,
        } => {
            let probe = evaluate(expr, batch)?;
            let mut found = BooleanArray::from(vec![false; batch.num_rows()]);
            for item in list {
                let item = evaluate(item, batch)?;
                found = or_kleene(&found, &cmp::eq(&probe, &item)?)?;
            }
            if *negated {
                found = not(&found)?;
            }
            Ok(Arc::new(found))
        }
    }
}

/// Evaluate `expr` as a row filter; nulls count as false.
pub fn evaluate_predicate(expr: &PhysicalExpr, batch: &RecordBatch) -> Result<BooleanArray> {
    let value = evaluate(expr, batch)?;
    let mask = as_boolean(&value)?;
    if mask.null_count() == 0 {
        return Ok(mask.clone());
    }
    Ok(prep_null_mask_filter(mask))
}

/// Evaluate an expression that references no columns, yielding its single value.
pub fn evaluate_constant(expr: &BoundExpr) -> Result<ScalarValue> {
    let mut no_subqueries = |_: &BoundSelect| -> Result<ArrayRef> {
        Err(DbError::Internal(
            "subqueries cannot be evaluated as constants".to_string(),
        ))
    };
    let physical = create_physical_expr(expr, &[], &mut no_subqueries)?;
    let batch =
        RecordBatch::try_new_with_row_count(Arc::new(ArrowSchema::empty()), Vec::new(), 1)?;
    let array = evaluate(&physical, &batch)?;
    ScalarValue::try_from_array(array.as_ref(), 0)
}

fn evaluate_binary(
    left: &ArrayRef,
    op: BinaryOperator,
    right: &ArrayRef,
    data_type: &DataType,
) -> Result<ArrayRef> {
    let result: ArrayRef = match op {
        BinaryOperator::And => Arc::new(and_kleene(as_boolean(left)?, as_boolean(right)?)?),
        BinaryOperator::Or => Arc::new(or_kleene(as_boolean(left)?, as_boolean(right)?)?),
        BinaryOperator::Eq => Arc::new(cmp::eq(left, right)?),
        BinaryOperator::NotEq => Arc::new(cmp::neq(left, right)?),
        BinaryOperator::Lt => Arc::new(cmp::lt(left, right)?),
        BinaryOperator::LtEq => Arc::new(cmp::lt_eq(left, right)?),
        BinaryOperator::Gt => Arc::new(cmp::gt(left, right)?),
        BinaryOperator::GtEq => Arc::new(cmp::gt_eq(left, right)?),
        BinaryOperator::Plus => numeric::add(left, right)?,
        BinaryOperator::Minus => numeric::sub(left, right)?,
        BinaryOperator::Multiply => numeric::mul(left, right)?,
        BinaryOperator::Divide => {
            check_divisor(left, right)?;
            numeric::div(left, right)?
        }
        BinaryOperator::Modulo => {
            check_divisor(left, right)?;
            numeric::rem(left, right)?
        }
    };
    if let DataType::Decimal { precision, .. } = data_type {
        check_decimal_precision(&result, *precision)?;
    }
    cast_array(&result, data_type)
}

/// Any row with a non-null dividend and a zero divisor is an error, for
/// every numeric type including Float64.
fn check_divisor(left: &ArrayRef, right: &ArrayRef) -> Result<()> {
    let Some(divisor_type) = DataType::from_arrow(right.data_type()) else {
        return Err(DbError::Internal(format!(
            "unsupported divisor type {:?}",
            right.data_type()
        )));
    };
    // Arrow orders floats totally, so -0.0 never equals a 0.0 scalar.
    let is_zero = if divisor_type == DataType::Float64 {
        downcast_array::<Float64Array>(right.as_ref())?
            .iter()
            .map(|v| v.map(|v| v == 0.0))
            .collect::<BooleanArray>()
    } else {
        let zero = ScalarValue::Int64(0).to_array(&divisor_type, right.len())?;
        cmp::eq(right, &zero)?
    };
    let zero_divisor = and(&is_zero, &is_not_null(left.as_ref())?)?;
    if zero_divisor.true_count() > 0 {
        return Err(DbError::DivisionByZero);
    }
    Ok(())
}

fn check_decimal_precision(array: &ArrayRef, precision: u8) -> Result<()> {
    let decimals = downcast_array::<arrow::array::Decimal128Array>(array.as_ref())?;
    match decimals.iter().flatten().find(|v| !decimal_fits(*v, precision)) {
        Some(value) => Err(DbError::ArithmeticOverflow(format!(
            "decimal value {value} exceeds precision {precision}"
        ))),
        None => Ok(()),
    }
}

fn as_boolean(array: &ArrayRef) -> Result<&BooleanArray> {
    downcast_array::<BooleanArray>(array.as_ref())
}
