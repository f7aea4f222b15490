// Bound (resolved and typed) expressions

use std::fmt;
use std::sync::Arc;

use crate::binder::BoundSelect;
use crate::sql::ast::BinaryOperator;
use crate::types::{DataType, ScalarValue};

/// Identifier of one relation in a query's scope: a FROM binding, the group
/// keys or aggregates of an aggregation, or the output of a projection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TableRef(pub usize);

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ColumnRef {
    pub table: TableRef,
    pub column: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AggregateFunction {
    Count,
    Sum,
    Avg,
    Min,
    Max,
}

impl AggregateFunction {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_uppercase().as_str() {
            "COUNT" => Some(AggregateFunction::Count),
            "SUM" => Some(AggregateFunction::Sum),
            "AVG" => Some(AggregateFunction::Avg),
            "MIN" => Some(AggregateFunction::Min),
            "MAX" => Some(AggregateFunction::Max),
            _ => None,
        }
    }
}

impl fmt::Display for AggregateFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AggregateFunction::Count => "COUNT",
            AggregateFunction::Sum => "SUM",
            AggregateFunction::Avg => "AVG",
            AggregateFunction::Min => "MIN",
            AggregateFunction::Max => "MAX",
        };
        write!(f, "{name}")
    }
}

/// One aggregate computed by an aggregation; `arg` is `None` for `COUNT(*)`.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundAggregate {
    pub func: AggregateFunction,
    pub arg: Option<BoundExpr>,
    pub data_type: DataType,
}

impl fmt::Display for BoundAggregate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.arg {
            Some(arg) => write!(f, "{}({arg})", self.func),
            None => write!(f, "{}(*)", self.func),
        }
    }
}

/// An uncorrelated subquery. Two subqueries are equal only if they are the
/// same bound instance.
#[derive(Debug, Clone)]
pub struct Subquery(pub Arc<BoundSelect>);

impl PartialEq for Subquery {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum BoundExpr {
    Column {
        column: ColumnRef,
        data_type: DataType,
        /// Rendered name, used by EXPLAIN and error messages.
        name: String,
    },
    Literal {
        value: ScalarValue,
        data_type: DataType,
    },
    Cast {
        expr: Box<BoundExpr>,
        data_type: DataType,
    },
    Negate(Box<BoundExpr>),
    Not(Box<BoundExpr>),
    Binary {
        left: Box<BoundExpr>,
        op: BinaryOperator,
        right: Box<BoundExpr>,
        data_type: DataType,
    },
    IsNull {
        expr: Box<BoundExpr>,
        negated: bool,
    },
    InList {
        expr: Box<BoundExpr>,
        list: Vec<BoundExpr>,
        negated: bool,
    },
    InSubquery {
        expr: Box<BoundExpr>,
        subquery: Subquery,
        negated: bool,
    },
    /// Aggregate call; only present until the binder moves it into an aggregation.
    Aggregate(Box<BoundAggregate>),
}

impl BoundExpr {
    pub fn data_type(&self) -> DataType {
        match self {
            BoundExpr::Column { data_type, .. }
            | BoundExpr::Literal { data_type, .. }
            | BoundExpr::Cast { data_type, .. }
            | BoundExpr::Binary { data_type, .. } => *data_type,
            BoundExpr::Negate(expr) => expr.data_type(),
            BoundExpr::Not(_)
            | BoundExpr::IsNull { .. }
            | BoundExpr::InList { .. }
            | BoundExpr::InSubquery { .. } => DataType::Boolean,
            BoundExpr::Aggregate(agg) => agg.data_type,
        }
    }

    pub fn literal(value: ScalarValue, data_type: DataType) -> Self {
        BoundExpr::Literal { value, data_type }
    }

    pub fn is_null_literal(&self) -> bool {
        matches!(self, BoundExpr::Literal { value, .. } if value.is_null())
    }

    /// Wrap in a cast unless the expression already has `data_type`.
    pub fn cast_to(self, data_type: DataType) -> Self {
        if self.data_type() == data_type {
            return self;
        }
        match self {
            BoundExpr::Literal { value, .. } if value.is_null() => BoundExpr::Literal {
                value,
                data_type,
            },
            expr => BoundExpr::Cast {
                expr: Box::new(expr),
                data_type,
            },
        }
    }

    /// Direct children, in evaluation order. Subquery bodies are not included.
    pub fn children(&self) -> Vec<&BoundExpr> {
        match self {
            BoundExpr::Column { .. } | BoundExpr::Literal { .. } => vec![],
            BoundExpr::Cast { expr, .. }
            | BoundExpr::Negate(expr)
            | BoundExpr::Not(expr)
            | BoundExpr::IsNull { expr, .. }
            | BoundExpr::InSubquery { expr, .. } => vec![expr.as_ref()],
            BoundExpr::Binary { left, right, .. } => vec![left.as_ref(), right.as_ref()],
            BoundExpr::InList { expr, list, .. } => {
                let mut children = vec![expr.as_ref()];
                children.extend(list.iter());
                children
            }
            BoundExpr::Aggregate(agg) => agg.arg.iter().collect(),
        }
    }

    /// Rebuild this expression by applying `f` to every direct child.
    pub fn map_children<E>(
        self,
        mut f: impl FnMut(BoundExpr) -> Result<BoundExpr, E>,
    ) -> Result<BoundExpr, E> {
        Ok(match self {
            expr @ (BoundExpr::Column { .. } | BoundExpr::Literal { .. }) => expr,
            BoundExpr::Cast { expr, data_type } => BoundExpr::Cast {
                expr: Box::new(f(*expr)?),
                data_type,
            },
            BoundExpr::Negate(expr) => BoundExpr::Negate(Box::new(f(*expr)?)),
            BoundExpr::Not(expr) => BoundExpr::Not(Box::new(f(*expr)?)),
            BoundExpr::Binary {
                left,
                op,
                right,
                data_type,
            } => BoundExpr::Binary {
                left: Box::new(f(*left)?),
                op,
                right: Box::new(f(*right)?),
                data_type,
            },
            BoundExpr::IsNull { expr, negated } => BoundExpr::IsNull {
                expr: Box::new(f(*expr)?),
                negated,
            },
            BoundExpr::InList {
                expr,
                list,
                negated,
            } => BoundExpr::InList {
                expr: Box::new(f(*expr)?),
                list: list.into_iter().map(&mut f).collect::<Result<_, E>>()?,
                negated,
            },
            BoundExpr::InSubquery {
                expr,
                subquery,
                negated,
            } => BoundExpr::InSubquery {
                expr: Box::new(f(*expr)?),
                subquery,
                negated,
            },
            BoundExpr::Aggregate(agg) => {
                let BoundAggregate {
                    func,
                    arg,
                    data_type,
                } = *agg;
                BoundExpr::Aggregate(Box::new(BoundAggregate {
                    func,
                    arg: arg.map(&mut f).transpose()?,
                    data_type,
                }))
            }
        })
    }

    /// Every column referenced by this expression (outside subquery bodies).
    pub fn columns(&self) -> Vec<ColumnRef> {
        let mut out = Vec::new();
        self.collect_columns(&mut out);
        out
    }

    fn collect_columns(&self, out: &mut Vec<ColumnRef>) {
        if let BoundExpr::Column { column, .. } = self {
            out.push(*column);
        }
        for child in self.children() {
            child.collect_columns(out);
        }
    }

    pub fn contains_aggregate(&self) -> bool {
        matches!(self, BoundExpr::Aggregate(_))
            || self.children().iter().any(|c| c.contains_aggregate())
    }

    pub fn contains_subquery(&self) -> bool {
        matches!(self, BoundExpr::InSubquery { .. })
            || self.children().iter().any(|c| c.contains_subquery())
    }

    /// Split a predicate on top-level `AND`s.
    pub fn split_conjunction(self) -> Vec<BoundExpr> {
        match self {
            BoundExpr::Binary {
                left,
                op: BinaryOperator::And,
                right,
                ..
            } => {
                let mut parts = left.split_conjunction();
                parts.extend(right.split_conjunction());
                parts
            }
            other => vec![other],
        }
    }

    /// Join predicates with `AND`; `None` for an empty list.
    pub fn conjunction(parts: impl IntoIterator<Item = BoundExpr>) -> Option<BoundExpr> {
        parts.into_iter().reduce(|left, right| BoundExpr::Binary {
            left: Box::new(left),
            op: BinaryOperator::And,
            right: Box::new(right),
            data_type: DataType::Boolean,
        })
    }
}

impl fmt::Display for BoundExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BoundExpr::Column { name, .. } => write!(f, "{name}"),
            BoundExpr::Literal { value, .. } => write!(f, "{value}"),
            BoundExpr::Cast { expr, data_type } => write!(f, "CAST({expr} AS {data_type})"),
            BoundExpr::Negate(expr) => write!(f, "-({expr})"),
            BoundExpr::Not(expr) => write!(f, "NOT ({expr})"),
            BoundExpr::Binary {
                left, op, right, ..
            } => write!(f, "({left} {op} {right})"),
            BoundExpr::IsNull { expr, negated } => {
                write!(f, "{expr} IS {}NULL", if *negated { "NOT " } else { "" })
            }
            BoundExpr::InList {
                expr,
                list,
                negated,
            } => {
                let items: Vec<String> = list.iter().map(|e| e.to_string()).collect();
                write!(
                    f,
                    "{expr} {}IN ({})",
                    if *negated { "NOT " } else { "" },
                    items.join(", ")
                )
            }
            BoundExpr::InSubquery { expr, negated, .. } => {
                write!(f, "{expr} {}IN (<subquery>)", if *negated { "NOT " } else { "" })
            }
            BoundExpr::Aggregate(agg) => write!(f, "{agg}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn col(table: usize, column: usize) -> BoundExpr {
        BoundExpr::Column {
            column: ColumnRef {
                table: TableRef(table),
                column,
            },
            data_type: DataType::Int64,
            name: format!("c{column}"),
        }
    }

    fn eq(left: BoundExpr, right: BoundExpr) -> BoundExpr {
        BoundExpr::Binary {
            left: Box::new(left),
            op: BinaryOperator::Eq,
            right: Box::new(right),
            data_type: DataType::Boolean,
        }
    }

    #[test]
    fn test_conjunction_round_trip() {
        let parts = vec![eq(col(0, 0), col(1, 0)), eq(col(0, 1), col(1, 1))];
        let joined = BoundExpr::conjunction(parts.clone()).unwrap();
        assert_eq!(joined.split_conjunction(), parts);
        assert!(BoundExpr::conjunction(Vec::new()).is_none());
    }

    #[test]
    fn test_columns_collected_in_order() {
        let expr = eq(col(1, 2), col(0, 3));
        assert_eq!(
            expr.columns(),
            vec![
                ColumnRef {
                    table: TableRef(1),
                    column: 2
                },
                ColumnRef {
                    table: TableRef(0),
                    column: 3
                }
            ]
        );
    }

    #[test]
    fn test_cast_to_retypes_null_literals() {
        let null = BoundExpr::literal(ScalarValue::Null, DataType::Int64);
        assert_eq!(
            null.cast_to(DataType::Text),
            BoundExpr::literal(ScalarValue::Null, DataType::Text)
        );
        let cast = col(0, 0).cast_to(DataType::Float64);
        assert!(matches!(cast, BoundExpr::Cast { .. }));
        assert_eq!(cast.data_type(), DataType::Float64);
    }

    #[test]
    fn test_aggregate_detection() {
        let agg = BoundExpr::Aggregate(Box::new(BoundAggregate {
            func: AggregateFunction::Sum,
            arg: Some(col(0, 0)),
            data_type: DataType::Int64,
        }));
        assert!(eq(agg.clone(), col(0, 1)).contains_aggregate());
        assert_eq!(agg.to_string(), "SUM(c0)");
        assert_eq!(AggregateFunction::from_name("avg"), Some(AggregateFunction::Avg));
    }
}
