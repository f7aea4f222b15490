// Logical query plan

use crate::binder::{BoundAggregate, BoundExpr, ColumnRef, TableRef};
use crate::catalog::TableSnapshot;
use crate::types::DataType;

/// Which join input the hash table is built on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildSide {
    Left,
    Right,
}

/// Physical strategy of an inner join.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinStrategy {
    /// Hash the build side on the key tuple, probe with the other side.
    Hash { build: BuildSide },
    /// Cartesian product; any condition lives in a filter above the join.
    NestedLoop,
}

/// One equality key of a hash join: `left` is evaluated over the left input,
/// `right` over the right input.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinKey {
    pub left: BoundExpr,
    pub right: BoundExpr,
}

/// Expression for ORDER BY: key and direction. Nulls always sort first.
#[derive(Debug, Clone, PartialEq)]
pub struct SortKey {
    pub expr: BoundExpr,
    pub ascending: bool,
}

/// A column produced by a plan node.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputColumn {
    pub column: ColumnRef,
    pub data_type: DataType,
    pub name: String,
}

/// Logical query plan representing a query as a tree of operations
#[derive(Debug, Clone)]
pub enum LogicalPlan {
    /// Read a table snapshot
    Scan {
        table_ref: TableRef,
        name: String,
        table: TableSnapshot,
        /// Indices of the table columns that are read, ascending
        projection: Vec<usize>,
    },
    /// Keep rows whose predicate is true
    Filter {
        input: Box<LogicalPlan>,
        predicate: BoundExpr,
    },
    /// Compute output expressions
    Project {
        input: Box<LogicalPlan>,
        output_ref: TableRef,
        exprs: Vec<BoundExpr>,
        names: Vec<String>,
    },
    /// Inner join; output is the left columns followed by the right columns
    Join {
        left: Box<LogicalPlan>,
        right: Box<LogicalPlan>,
        on: Vec<JoinKey>,
        strategy: JoinStrategy,
    },
    /// GROUP BY and aggregates; output is the group keys followed by the aggregates
    Aggregate {
        input: Box<LogicalPlan>,
        group_ref: TableRef,
        group_exprs: Vec<BoundExpr>,
        agg_ref: TableRef,
        aggregates: Vec<BoundAggregate>,
    },
    /// ORDER BY
    Sort {
        input: Box<LogicalPlan>,
        keys: Vec<SortKey>,
    },
    /// LIMIT / OFFSET
    Limit {
        input: Box<LogicalPlan>,
        limit: Option<u64>,
        offset: u64,
    },
}

impl LogicalPlan {
    /// Columns this node produces, in order.
    pub fn output_columns(&self) -> Vec<OutputColumn> {
        match self {
            LogicalPlan::Scan {
                table_ref,
                name,
                table,
                projection,
            } => projection
                .iter()
                .filter_map(|&idx| {
                    table.schema.column(idx).map(|c| OutputColumn {
                        column: ColumnRef {
                            table: *table_ref,
                            column: idx,
                        },
                        data_type: c.data_type,
                        name: format!("{name}.{}", c.name),
                    })
                })
                .collect(),
            LogicalPlan::Filter { input, .. }
            | LogicalPlan::Sort { input, .. }
            | LogicalPlan::Limit { input, .. } => input.output_columns(),
            LogicalPlan::Project {
                output_ref,
                exprs,
                names,
                ..
            } => exprs
                .iter()
                .zip(names)
                .enumerate()
                .map(|(idx, (expr, name))| OutputColumn {
                    column: ColumnRef {
                        table: *output_ref,
                        column: idx,
                    },
                    data_type: expr.data_type(),
                    name: name.clone(),
                })
                .collect(),
            LogicalPlan::Join { left, right, .. } => {
                let mut columns = left.output_columns();
                columns.extend(right.output_columns());
                columns
            }
            LogicalPlan::Aggregate {
                group_ref,
                group_exprs,
                agg_ref,
                aggregates,
                ..
            } => {
                let groups = group_exprs.iter().enumerate().map(|(idx, expr)| OutputColumn {
                    column: ColumnRef {
                        table: *group_ref,
                        column: idx,
                    },
                    data_type: expr.data_type(),
                    name: expr.to_string(),
                });
                let aggs = aggregates.iter().enumerate().map(|(idx, agg)| OutputColumn {
                    column: ColumnRef {
                        table: *agg_ref,
                        column: idx,
                    },
                    data_type: agg.data_type,
                    name: agg.to_string(),
                });
                groups.chain(aggs).collect()
            }
        }
    }

    /// Cardinality estimate from catalog row counts: filters keep half their
    /// input, joins produce as many rows as their larger input.
    pub fn estimated_rows(&self) -> usize {
        match self {
            LogicalPlan::Scan { table, .. } => table.estimated_rows(),
            LogicalPlan::Filter { input, .. } => input.estimated_rows() / 2,
            LogicalPlan::Project { input, .. } | LogicalPlan::Sort { input, .. } => {
                input.estimated_rows()
            }
            LogicalPlan::Join { left, right, .. } => {
                left.estimated_rows().max(right.estimated_rows())
            }
            LogicalPlan::Aggregate {
                input, group_exprs, ..
            } => {
                if group_exprs.is_empty() {
                    1
                } else {
                    input.estimated_rows()
                }
            }
            LogicalPlan::Limit { input, limit, .. } => {
                let rows = input.estimated_rows();
                match limit {
                    Some(limit) => rows.min(usize::try_from(*limit).unwrap_or(usize::MAX)),
                    None => rows,
                }
            }
        }
    }

    pub fn children(&self) -> Vec<&LogicalPlan> {
        match self {
            LogicalPlan::Scan { .. } => vec![],
            LogicalPlan::Filter { input, .. }
            | LogicalPlan::Project { input, .. }
            | LogicalPlan::Aggregate { input, .. }
            | LogicalPlan::Sort { input, .. }
            | LogicalPlan::Limit { input, .. } => vec![input.as_ref()],
            LogicalPlan::Join { left, right, .. } => vec![left.as_ref(), right.as_ref()],
        }
    }

    /// Rebuild this node by applying `f` to every child plan.
    pub fn map_children<E>(
        self,
        mut f: impl FnMut(LogicalPlan) -> Result<LogicalPlan, E>,
    ) -> Result<LogicalPlan, E> {
        Ok(match self {
            scan @ LogicalPlan::Scan { .. } => scan,
            LogicalPlan::Filter { input, predicate } => LogicalPlan::Filter {
                input: Box::new(f(*input)?),
                predicate,
            },
            LogicalPlan::Project {
                input,
                output_ref,
                exprs,
                names,
            } => LogicalPlan::Project {
                input: Box::new(f(*input)?),
                output_ref,
                exprs,
                names,
            },
            LogicalPlan::Join {
                left,
                right,
                on,
                strategy,
            } => LogicalPlan::Join {
                left: Box::new(f(*left)?),
                right: Box::new(f(*right)?),
                on,
                strategy,
            },
            LogicalPlan::Aggregate {
                input,
                group_ref,
                group_exprs,
                agg_ref,
                aggregates,
            } => LogicalPlan::Aggregate {
                input: Box::new(f(*input)?),
                group_ref,
                group_exprs,
                agg_ref,
                aggregates,
            },
            LogicalPlan::Sort { input, keys } => LogicalPlan::Sort {
                input: Box::new(f(*input)?),
                keys,
            },
            LogicalPlan::Limit {
                input,
                limit,
                offset,
            } => LogicalPlan::Limit {
                input: Box::new(f(*input)?),
                limit,
                offset,
            },
        })
    }

    /// Every expression held directly by this node.
    pub fn expressions(&self) -> Vec<&BoundExpr> {
        match self {
            LogicalPlan::Scan { .. } | LogicalPlan::Limit { .. } => vec![],
            LogicalPlan::Filter { predicate, .. } => vec![predicate],
            LogicalPlan::Project { exprs, .. } => exprs.iter().collect(),
            LogicalPlan::Join { on, .. } => on.iter().flat_map(|k| [&k.left, &k.right]).collect(),
            LogicalPlan::Aggregate {
                group_exprs,
                aggregates,
                ..
            } => group_exprs
                .iter()
                .chain(aggregates.iter().filter_map(|a| a.arg.as_ref()))
                .collect(),
            LogicalPlan::Sort { keys, .. } => keys.iter().map(|k| &k.expr).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Catalog, Column, Schema};
    use crate::types::ScalarValue;

    fn scan(table_ref: usize, rows: i64) -> LogicalPlan {
        let catalog = Catalog::new();
        catalog
            .define(
                "t",
                Schema::try_new(vec![
                    Column::new("a", DataType::Int64),
                    Column::new("b", DataType::Text),
                ])
                .unwrap(),
            )
            .unwrap();
        let values: Vec<Vec<ScalarValue>> = (0..rows)
            .map(|i| vec![ScalarValue::Int64(i), ScalarValue::Null])
            .collect();
        catalog.insert_rows("t", &[], &values).unwrap();
        LogicalPlan::Scan {
            table_ref: TableRef(table_ref),
            name: "t".into(),
            table: catalog.snapshot("t").unwrap(),
            projection: vec![0, 1],
        }
    }

    #[test]
    fn test_join_output_is_left_then_right() {
        let join = LogicalPlan::Join {
            left: Box::new(scan(0, 1)),
            right: Box::new(scan(1, 1)),
            on: vec![],
            strategy: JoinStrategy::NestedLoop,
        };
        let tables: Vec<usize> = join
            .output_columns()
            .iter()
            .map(|c| c.column.table.0)
            .collect();
        assert_eq!(tables, vec![0, 0, 1, 1]);
    }

    #[test]
    fn test_estimates() {
        let filter = LogicalPlan::Filter {
            input: Box::new(scan(0, 10)),
            predicate: BoundExpr::literal(ScalarValue::Boolean(true), DataType::Boolean),
        };
        assert_eq!(filter.estimated_rows(), 5);
        let join = LogicalPlan::Join {
            left: Box::new(filter),
            right: Box::new(scan(1, 7)),
            on: vec![],
            strategy: JoinStrategy::NestedLoop,
        };
        assert_eq!(join.estimated_rows(), 7);
    }
}
