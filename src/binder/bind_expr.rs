// Expression binding and type inference

use std::fmt;
use std::sync::Arc;

use crate::binder::expr::{AggregateFunction, BoundAggregate, BoundExpr, Subquery};
use crate::binder::scope::Scope;
use crate::binder::Binder;
use crate::error::{DbError, Result};
use crate::sql::ast::{BinaryOperator, Expr, UnaryOperator};
use crate::types::{DataType, ScalarValue, MAX_DECIMAL_PRECISION};

/// Integers widen to this decimal type when mixed with decimals.
pub(crate) const INT64_AS_DECIMAL: DataType = DataType::Decimal {
    precision: 19,
    scale: 0,
};

/// Clause an expression is bound in; decides whether aggregates are allowed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ExprContext {
    Where,
    JoinOn,
    GroupBy,
    /// SELECT list, HAVING and ORDER BY.
    Output,
    AggregateArgument,
    Values,
}

impl fmt::Display for ExprContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ExprContext::Where => "WHERE",
            ExprContext::JoinOn => "JOIN ON",
            ExprContext::GroupBy => "GROUP BY",
            ExprContext::Output => "SELECT",
            ExprContext::AggregateArgument => "an aggregate argument",
            ExprContext::Values => "VALUES",
        };
        write!(f, "{s}")
    }
}

impl<'a> Binder<'a> {
    pub(crate) fn bind_expr(
        &mut self,
        expr: &Expr,
        scope: &Scope,
        context: ExprContext,
    ) -> Result<BoundExpr> {
        match expr {
            Expr::Column { table, name } => scope.resolve(table.as_ref(), name),
            Expr::Literal(value) => Ok(bind_literal(value)),
            Expr::Nested(inner) => self.bind_expr(inner, scope, context),
            Expr::UnaryOp { op, expr } => {
                let operand = self.bind_expr(expr, scope, context)?;
                bind_unary(*op, operand)
            }
            Expr::BinaryOp { left, op, right } => {
                let left = self.bind_expr(left, scope, context)?;
                let right = self.bind_expr(right, scope, context)?;
                bind_binary(left, *op, right)
            }
            Expr::IsNull { expr, negated } => Ok(BoundExpr::IsNull {
                expr: Box::new(self.bind_expr(expr, scope, context)?),
                negated: *negated,
            }),
            Expr::InList {
                expr,
                list,
                negated,
            } => {
                let expr = self.bind_expr(expr, scope, context)?;
                let list = list
                    .iter()
                    .map(|item| self.bind_expr(item, scope, context))
                    .collect::<Result<Vec<_>>>()?;
                let mut common: Option<DataType> = None;
                for item in std::iter::once(&expr).chain(list.iter()) {
                    if item.is_null_literal() {
                        continue;
                    }
                    common = Some(match common {
                        None => item.data_type(),
                        Some(t) => comparison_type(t, item.data_type(), BinaryOperator::Eq)
                            .ok_or_else(|| {
                                DbError::TypeMismatch(format!(
                                    "cannot compare {} with {} in IN list",
                                    expr, item
                                ))
                            })?,
                    });
                }
                let common = common.unwrap_or(DataType::Int64);
                Ok(BoundExpr::InList {
                    expr: Box::new(expr.cast_to(common)),
                    list: list.into_iter().map(|item| item.cast_to(common)).collect(),
                    negated: *negated,
                })
            }
            Expr::InSubquery {
                expr,
                subquery,
                negated,
            } => {
                let expr = self.bind_expr(expr, scope, context)?;
                let subquery = self.bind_select(subquery)?;
                if subquery.projection.len() != 1 {
                    return Err(DbError::TypeMismatch(format!(
                        "IN subquery must return exactly one column, got {}",
                        subquery.projection.len()
                    )));
                }
                let element = subquery.projection[0].data_type();
                let common = if expr.is_null_literal() {
                    element
                } else {
                    comparison_type(expr.data_type(), element, BinaryOperator::Eq).ok_or_else(
                        || {
                            DbError::TypeMismatch(format!(
                                "cannot compare {} with subquery column of type {}",
                                expr, element
                            ))
                        },
                    )?
                };
                Ok(BoundExpr::InSubquery {
                    expr: Box::new(expr.cast_to(common)),
                    subquery: Subquery(Arc::new(subquery)),
                    negated: *negated,
                })
            }
            Expr::Function { name, args, star } => {
                let func = AggregateFunction::from_name(name).ok_or_else(|| {
                    DbError::TypeMismatch(format!("unknown function '{name}'"))
                })?;
                if context == ExprContext::AggregateArgument {
                    return Err(DbError::InvalidGroupBy(format!(
                        "aggregate {func} cannot be nested inside another aggregate"
                    )));
                }
                if context != ExprContext::Output {
                    return Err(DbError::InvalidGroupBy(format!(
                        "aggregate {func} is not allowed in {context}"
                    )));
                }
                let arg = match (func, *star, args.as_slice()) {
                    (AggregateFunction::Count, true, _) => None,
                    (_, false, [arg]) => {
                        Some(self.bind_expr(arg, scope, ExprContext::AggregateArgument)?)
                    }
                    _ => {
                        return Err(DbError::TypeMismatch(format!(
                            "{func} expects exactly one argument"
                        )))
                    }
                };
                let data_type = aggregate_type(func, arg.as_ref())?;
                Ok(BoundExpr::Aggregate(Box::new(BoundAggregate {
                    func,
                    arg,
                    data_type,
                })))
            }
        }
    }

    /// Bind an expression that must evaluate to a boolean.
    pub(crate) fn bind_predicate(
        &mut self,
        expr: &Expr,
        scope: &Scope,
        context: ExprContext,
    ) -> Result<BoundExpr> {
        let bound = self.bind_expr(expr, scope, context)?;
        expect_boolean(bound, &context.to_string())
    }
}

/// NULL literals are provisionally typed Int64 and retyped by their context.
fn bind_literal(value: &ScalarValue) -> BoundExpr {
    let data_type = value.data_type().unwrap_or(DataType::Int64);
    BoundExpr::literal(value.clone(), data_type)
}

pub(crate) fn expect_boolean(expr: BoundExpr, clause: &str) -> Result<BoundExpr> {
    if expr.is_null_literal() {
        return Ok(expr.cast_to(DataType::Boolean));
    }
    if expr.data_type() != DataType::Boolean {
        return Err(DbError::TypeMismatch(format!(
            "{clause} expects a boolean, got {} of type {}",
            expr,
            expr.data_type()
        )));
    }
    Ok(expr)
}

fn bind_unary(op: UnaryOperator, operand: BoundExpr) -> Result<BoundExpr> {
    match op {
        UnaryOperator::Not => Ok(BoundExpr::Not(Box::new(expect_boolean(operand, "NOT")?))),
        UnaryOperator::Minus | UnaryOperator::Plus => {
            if !operand.data_type().is_numeric() {
                return Err(DbError::TypeMismatch(format!(
                    "unary minus/plus expects a number, got {} of type {}",
                    operand,
                    operand.data_type()
                )));
            }
            Ok(if op == UnaryOperator::Minus {
                BoundExpr::Negate(Box::new(operand))
            } else {
                operand
            })
        }
    }
}

/// Give a NULL literal operand the type of the other side.
fn retype_nulls(left: BoundExpr, right: BoundExpr) -> (BoundExpr, BoundExpr) {
    match (left.is_null_literal(), right.is_null_literal()) {
        (true, false) => {
            let data_type = right.data_type();
            (left.cast_to(data_type), right)
        }
        (false, true) => {
            let data_type = left.data_type();
            (left, right.cast_to(data_type))
        }
        _ => (left, right),
    }
}

pub(crate) fn bind_binary(
    left: BoundExpr,
    op: BinaryOperator,
    right: BoundExpr,
) -> Result<BoundExpr> {
    let mismatch = |left: &BoundExpr, right: &BoundExpr| {
        DbError::TypeMismatch(format!(
            "cannot apply {op} to {} ({}) and {} ({})",
            left,
            left.data_type(),
            right,
            right.data_type()
        ))
    };

    if op.is_logical() {
        let left = expect_boolean(left, &op.to_string())?;
        let right = expect_boolean(right, &op.to_string())?;
        return Ok(BoundExpr::Binary {
            left: Box::new(left),
            op,
            right: Box::new(right),
            data_type: DataType::Boolean,
        });
    }

    let (left, right) = retype_nulls(left, right);
    let (lt, rt) = (left.data_type(), right.data_type());

    if op.is_comparison() {
        let common = comparison_type(lt, rt, op).ok_or_else(|| mismatch(&left, &right))?;
        return Ok(BoundExpr::Binary {
            left: Box::new(left.cast_to(common)),
            op,
            right: Box::new(right.cast_to(common)),
            data_type: DataType::Boolean,
        });
    }

    let (operand_type, result_type) =
        arithmetic_types(lt, rt, op).ok_or_else(|| mismatch(&left, &right))?;
    let (left, right) = match operand_type {
        Some(t) => (left.cast_to(t), right.cast_to(t)),
        None => (widen_to_decimal(left), widen_to_decimal(right)),
    };
    Ok(BoundExpr::Binary {
        left: Box::new(left),
        op,
        right: Box::new(right),
        data_type: result_type,
    })
}

fn widen_to_decimal(expr: BoundExpr) -> BoundExpr {
    if expr.data_type() == DataType::Int64 {
        expr.cast_to(INT64_AS_DECIMAL)
    } else {
        expr
    }
}

/// Common type two numeric types are compared or combined in, before the
/// decimal arithmetic widening rules are applied.
pub(crate) fn numeric_common_type(left: DataType, right: DataType) -> Option<DataType> {
    use DataType::*;
    match (left, right) {
        (Int64, Int64) => Some(Int64),
        (Float64, l) | (l, Float64) if l.is_numeric() => Some(Float64),
        (Int64, d @ Decimal { .. }) | (d @ Decimal { .. }, Int64) => {
            numeric_common_type(INT64_AS_DECIMAL, d)
        }
        (
            Decimal {
                precision: p1,
                scale: s1,
            },
            Decimal {
                precision: p2,
                scale: s2,
            },
        ) => {
            let scale = s1.max(s2);
            let integral = (p1 - s1).max(p2 - s2);
            Some(Decimal {
                precision: (integral + scale).min(MAX_DECIMAL_PRECISION),
                scale,
            })
        }
        _ => None,
    }
}

/// Type both sides of a comparison are cast to; `None` if they are incomparable.
/// Text and booleans only support equality.
pub(crate) fn comparison_type(
    left: DataType,
    right: DataType,
    op: BinaryOperator,
) -> Option<DataType> {
    if left.is_numeric() && right.is_numeric() {
        return numeric_common_type(left, right);
    }
    let equality = matches!(op, BinaryOperator::Eq | BinaryOperator::NotEq);
    match (left, right) {
        (DataType::Text, DataType::Text) | (DataType::Boolean, DataType::Boolean) if equality => {
            Some(left)
        }
        _ => None,
    }
}

/// Operand and result types for an arithmetic operator.
///
/// An operand type of `None` means the operands keep their decimal types
/// (integers widened) and the kernel applies decimal scale rules.
fn arithmetic_types(
    left: DataType,
    right: DataType,
    op: BinaryOperator,
) -> Option<(Option<DataType>, DataType)> {
    use DataType::*;
    if !left.is_numeric() || !right.is_numeric() {
        return None;
    }
    let common = numeric_common_type(left, right)?;
    let decimal_operands = |t: DataType| match t {
        Int64 => INT64_AS_DECIMAL,
        other => other,
    };
    match common {
        Int64 | Float64 => Some((Some(common), common)),
        Decimal { .. } => match op {
            BinaryOperator::Divide | BinaryOperator::Modulo => Some((Some(Float64), Float64)),
            BinaryOperator::Plus | BinaryOperator::Minus => {
                let (l, r) = (decimal_operands(left), decimal_operands(right));
                let (Decimal { precision: p1, scale: s1 }, Decimal { precision: p2, scale: s2 }) =
                    (l, r)
                else {
                    return None;
                };
                let scale = s1.max(s2);
                let precision = ((p1 - s1).max(p2 - s2) + scale + 1).min(MAX_DECIMAL_PRECISION);
                Some((None, Decimal { precision, scale }))
            }
            BinaryOperator::Multiply => {
                let (l, r) = (decimal_operands(left), decimal_operands(right));
                let (Decimal { precision: p1, scale: s1 }, Decimal { precision: p2, scale: s2 }) =
                    (l, r)
                else {
                    return None;
                };
                let scale = s1 + s2;
                if scale > MAX_DECIMAL_PRECISION {
                    return None;
                }
                let precision = (p1 + p2 + 1).min(MAX_DECIMAL_PRECISION);
                Some((None, Decimal { precision, scale }))
            }
            _ => None,
        },
        Boolean | Text => None,
    }
}

fn aggregate_type(func: AggregateFunction, arg: Option<&BoundExpr>) -> Result<DataType> {
    let Some(arg) = arg else {
        return Ok(DataType::Int64);
    };
    let input = arg.data_type();
    let numeric = || {
        if input.is_numeric() {
            Ok(())
        } else {
            Err(DbError::TypeMismatch(format!(
                "{func} expects a numeric argument, got {arg} of type {input}"
            )))
        }
    };
    Ok(match func {
        AggregateFunction::Count => DataType::Int64,
        AggregateFunction::Sum => {
            numeric()?;
            match input {
                DataType::Decimal { scale, .. } => DataType::Decimal {
                    precision: MAX_DECIMAL_PRECISION,
                    scale,
                },
                other => other,
            }
        }
        AggregateFunction::Avg => {
            numeric()?;
            DataType::Float64
        }
        AggregateFunction::Min | AggregateFunction::Max => input,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binder::expr::{ColumnRef, TableRef};

    fn column(data_type: DataType) -> BoundExpr {
        BoundExpr::Column {
            column: ColumnRef {
                table: TableRef(0),
                column: 0,
            },
            data_type,
            name: "t.c".into(),
        }
    }

    fn dec(precision: u8, scale: u8) -> DataType {
        DataType::decimal(precision, scale).unwrap()
    }

    #[test]
    fn test_integer_promotes_to_float() {
        let expr = bind_binary(
            column(DataType::Int64),
            BinaryOperator::Plus,
            column(DataType::Float64),
        )
        .unwrap();
        assert_eq!(expr.data_type(), DataType::Float64);
    }

    #[test]
    fn test_decimal_arithmetic_types() {
        let add = bind_binary(column(dec(5, 2)), BinaryOperator::Plus, column(dec(10, 4))).unwrap();
        assert_eq!(add.data_type(), dec(11, 4));

        let mul =
            bind_binary(column(dec(5, 2)), BinaryOperator::Multiply, column(dec(4, 1))).unwrap();
        assert_eq!(mul.data_type(), dec(10, 3));

        let with_int =
            bind_binary(column(DataType::Int64), BinaryOperator::Minus, column(dec(5, 2))).unwrap();
        assert_eq!(with_int.data_type(), dec(22, 2));

        let div = bind_binary(column(dec(5, 2)), BinaryOperator::Divide, column(dec(5, 2))).unwrap();
        assert_eq!(div.data_type(), DataType::Float64);

        let with_float =
            bind_binary(column(dec(5, 2)), BinaryOperator::Plus, column(DataType::Float64))
                .unwrap();
        assert_eq!(with_float.data_type(), DataType::Float64);
    }

    #[test]
    fn test_text_only_supports_equality() {
        assert!(bind_binary(column(DataType::Text), BinaryOperator::Eq, column(DataType::Text)).is_ok());
        assert!(matches!(
            bind_binary(column(DataType::Text), BinaryOperator::Lt, column(DataType::Text)),
            Err(DbError::TypeMismatch(_))
        ));
        assert!(matches!(
            bind_binary(column(DataType::Text), BinaryOperator::Eq, column(DataType::Int64)),
            Err(DbError::TypeMismatch(_))
        ));
        assert!(matches!(
            bind_binary(column(DataType::Boolean), BinaryOperator::Gt, column(DataType::Boolean)),
            Err(DbError::TypeMismatch(_))
        ));
    }

    #[test]
    fn test_logical_operators_require_booleans() {
        assert!(matches!(
            bind_binary(column(DataType::Int64), BinaryOperator::And, column(DataType::Boolean)),
            Err(DbError::TypeMismatch(_))
        ));
        let null = BoundExpr::literal(ScalarValue::Null, DataType::Int64);
        let or = bind_binary(null, BinaryOperator::Or, column(DataType::Boolean)).unwrap();
        assert_eq!(or.data_type(), DataType::Boolean);
    }

    #[test]
    fn test_null_literal_takes_other_operand_type() {
        let null = BoundExpr::literal(ScalarValue::Null, DataType::Int64);
        let expr = bind_binary(column(DataType::Text), BinaryOperator::Eq, null).unwrap();
        let BoundExpr::Binary { right, .. } = expr else {
            panic!("expected binary expression");
        };
        assert_eq!(right.data_type(), DataType::Text);
    }

    #[test]
    fn test_aggregate_result_types() {
        let sum = aggregate_type(AggregateFunction::Sum, Some(&column(dec(5, 2)))).unwrap();
        assert_eq!(sum, dec(38, 2));
        let avg = aggregate_type(AggregateFunction::Avg, Some(&column(DataType::Int64))).unwrap();
        assert_eq!(avg, DataType::Float64);
        let max = aggregate_type(AggregateFunction::Max, Some(&column(DataType::Text))).unwrap();
        assert_eq!(max, DataType::Text);
        assert!(aggregate_type(AggregateFunction::Sum, Some(&column(DataType::Text))).is_err());
        assert_eq!(aggregate_type(AggregateFunction::Count, None).unwrap(), DataType::Int64);
    }
}
