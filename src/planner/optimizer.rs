use std::collections::HashSet;
use std::convert::Infallible;

use tracing::{debug, warn};

use crate::binder::{BoundExpr, ColumnRef, TableRef};
use crate::config::EngineConfig;
use crate::error::Result;
use crate::execution::expressions::evaluate_constant;
use crate::planner::explain::explain_plan;
use crate::planner::logical_plan::{BuildSide, JoinKey, JoinStrategy, LogicalPlan};
use crate::sql::ast::BinaryOperator;
use crate::types::ScalarValue;

/// Rule-based optimizer over logical plans.
///
/// Each pass runs constant folding, predicate pushdown and projection pruning
/// in that order. Passes repeat until the plan stops changing or the pass
/// limit is reached; join strategies are chosen once at the end.
#[derive(Debug, Clone)]
pub struct Optimizer {
    max_passes: usize,
}

impl Default for Optimizer {
    fn default() -> Self {
        Self::new(&EngineConfig::default())
    }
}

impl Optimizer {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            max_passes: config.max_optimizer_passes,
        }
    }

    pub fn optimize(&self, plan: LogicalPlan) -> Result<LogicalPlan> {
        let mut plan = plan;
        let mut rendered = explain_plan(&plan);
        for pass in 1..=self.max_passes {
            // 1) constant folding
            plan = fold_constants(plan)?;

            // 2) predicate pushdown (incl join keys)
            plan = push_down_predicates(plan);

            // 3) projection pruning
            plan = prune_projections(plan);

            let next = explain_plan(&plan);
            if next == rendered {
                debug!(pass, "optimizer reached a fixpoint");
                break;
            }
            debug!(pass, "optimizer pass rewrote the plan");
            rendered = next;
        }

        // 4) join strategy
        choose_join_strategies(plan)
    }
}

// -----------------------------
// 1) Constant folding
// -----------------------------

fn fold_constants(plan: LogicalPlan) -> Result<LogicalPlan> {
    let plan = plan.map_children(fold_constants)?;
    let plan = rewrite_plan_exprs(plan, &fold_expr)?;
    Ok(match plan {
        LogicalPlan::Filter { input, predicate } if is_true(&predicate) => *input,
        other => other,
    })
}

fn fold_expr(expr: BoundExpr) -> Result<BoundExpr> {
    let expr = expr.map_children(fold_expr)?;

    if let BoundExpr::Binary {
        left,
        op: op @ (BinaryOperator::And | BinaryOperator::Or),
        right,
        data_type,
    } = expr
    {
        // TRUE AND x == x and FALSE OR x == x under three-valued logic.
        let identity = op == BinaryOperator::Or;
        if is_bool(&left, !identity) {
            return Ok(*right);
        }
        if is_bool(&right, !identity) {
            return Ok(*left);
        }
        return fold_leaf(BoundExpr::Binary {
            left,
            op,
            right,
            data_type,
        });
    }
    fold_leaf(expr)
}

fn fold_leaf(expr: BoundExpr) -> Result<BoundExpr> {
    if matches!(expr, BoundExpr::Literal { .. })
        || !expr.columns().is_empty()
        || expr.contains_subquery()
        || expr.contains_aggregate()
    {
        return Ok(expr);
    }
    match evaluate_constant(&expr) {
        Ok(value) => Ok(BoundExpr::literal(value, expr.data_type())),
        Err(err) => {
            warn!(expression = %expr, error = %err, "skipping constant fold");
            Ok(expr)
        }
    }
}

fn is_bool(expr: &BoundExpr, value: bool) -> bool {
    matches!(expr, BoundExpr::Literal { value: ScalarValue::Boolean(b), .. } if *b == value)
}

fn is_true(expr: &BoundExpr) -> bool {
    is_bool(expr, true)
}

// -----------------------------
// 2) Predicate pushdown
// -----------------------------

fn push_down_predicates(plan: LogicalPlan) -> LogicalPlan {
    push_filter(plan, Vec::new())
}

/// Sink `pending` conjuncts (which reference only `plan`'s output columns) as
/// deep into `plan` as they can go.
fn push_filter(plan: LogicalPlan, mut pending: Vec<BoundExpr>) -> LogicalPlan {
    match plan {
        LogicalPlan::Filter { input, predicate } => {
            // Filter(Filter(x)) => one conjunct list
            pending.extend(predicate.split_conjunction());
            push_filter(*input, pending)
        }
        LogicalPlan::Sort { input, keys } => LogicalPlan::Sort {
            input: Box::new(push_filter(*input, pending)),
            keys,
        },
        LogicalPlan::Project {
            input,
            output_ref,
            exprs,
            names,
        } => {
            let pushed = pending
                .into_iter()
                .map(|p| substitute(p, output_ref, &exprs))
                .collect();
            LogicalPlan::Project {
                input: Box::new(push_filter(*input, pushed)),
                output_ref,
                exprs,
                names,
            }
        }
        LogicalPlan::Aggregate {
            input,
            group_ref,
            group_exprs,
            agg_ref,
            aggregates,
        } => {
            let (pushable, kept): (Vec<_>, Vec<_>) = pending.into_iter().partition(|p| {
                let columns = p.columns();
                !columns.is_empty() && columns.iter().all(|c| c.table == group_ref)
            });
            let pushed = pushable
                .into_iter()
                .map(|p| substitute(p, group_ref, &group_exprs))
                .collect();
            let aggregate = LogicalPlan::Aggregate {
                input: Box::new(push_filter(*input, pushed)),
                group_ref,
                group_exprs,
                agg_ref,
                aggregates,
            };
            wrap_filter(aggregate, kept)
        }
        LogicalPlan::Join {
            left,
            right,
            mut on,
            strategy,
        } => {
            let left_columns = column_set(&left);
            let right_columns = column_set(&right);
            let mut left_preds = Vec::new();
            let mut right_preds = Vec::new();
            let mut kept = Vec::new();
            for predicate in pending {
                let columns = predicate.columns();
                if columns.iter().all(|c| left_columns.contains(c)) {
                    left_preds.push(predicate);
                } else if columns.iter().all(|c| right_columns.contains(c)) {
                    right_preds.push(predicate);
                } else if let Some(key) = join_key(&predicate, &left_columns, &right_columns) {
                    on.push(key);
                } else {
                    kept.push(predicate);
                }
            }
            let join = LogicalPlan::Join {
                left: Box::new(push_filter(*left, left_preds)),
                right: Box::new(push_filter(*right, right_preds)),
                on,
                strategy,
            };
            wrap_filter(join, kept)
        }
        LogicalPlan::Limit {
            input,
            limit,
            offset,
        } => {
            let limit = LogicalPlan::Limit {
                input: Box::new(push_filter(*input, Vec::new())),
                limit,
                offset,
            };
            wrap_filter(limit, pending)
        }
        scan @ LogicalPlan::Scan { .. } => wrap_filter(scan, pending),
    }
}

fn wrap_filter(plan: LogicalPlan, predicates: Vec<BoundExpr>) -> LogicalPlan {
    match BoundExpr::conjunction(predicates) {
        Some(predicate) => LogicalPlan::Filter {
            input: Box::new(plan),
            predicate,
        },
        None => plan,
    }
}

/// `l = r` with `l` over the left input and `r` over the right (either way round).
fn join_key(
    predicate: &BoundExpr,
    left_columns: &HashSet<ColumnRef>,
    right_columns: &HashSet<ColumnRef>,
) -> Option<JoinKey> {
    let BoundExpr::Binary {
        left,
        op: BinaryOperator::Eq,
        right,
        ..
    } = predicate
    else {
        return None;
    };
    if predicate.contains_subquery() {
        return None;
    }
    let covered = |expr: &BoundExpr, side: &HashSet<ColumnRef>| {
        let columns = expr.columns();
        !columns.is_empty() && columns.iter().all(|c| side.contains(c))
    };
    if covered(left, left_columns) && covered(right, right_columns) {
        Some(JoinKey {
            left: left.as_ref().clone(),
            right: right.as_ref().clone(),
        })
    } else if covered(left, right_columns) && covered(right, left_columns) {
        Some(JoinKey {
            left: right.as_ref().clone(),
            right: left.as_ref().clone(),
        })
    } else {
        None
    }
}

/// Replace references to `table` with the expressions that produce them.
fn substitute(expr: BoundExpr, table: TableRef, exprs: &[BoundExpr]) -> BoundExpr {
    match expr {
        BoundExpr::Column { column, .. } if column.table == table && column.column < exprs.len() => {
            exprs[column.column].clone()
        }
        other => other
            .map_children(|c| Ok::<_, Infallible>(substitute(c, table, exprs)))
            .unwrap_or_else(|never| match never {}),
    }
}

fn column_set(plan: &LogicalPlan) -> HashSet<ColumnRef> {
    plan.output_columns().into_iter().map(|c| c.column).collect()
}

// -----------------------------
// 3) Projection pruning
// -----------------------------

fn prune_projections(plan: LogicalPlan) -> LogicalPlan {
    let required = column_set(&plan);
    prune(plan, &required)
}

/// Drop scan columns that nothing above them reads. `required` holds every
/// column an ancestor needs from `plan`'s output.
fn prune(plan: LogicalPlan, required: &HashSet<ColumnRef>) -> LogicalPlan {
    match plan {
        LogicalPlan::Scan {
            table_ref,
            name,
            table,
            mut projection,
        } => {
            projection.retain(|&idx| {
                required.contains(&ColumnRef {
                    table: table_ref,
                    column: idx,
                })
            });
            LogicalPlan::Scan {
                table_ref,
                name,
                table,
                projection,
            }
        }
        LogicalPlan::Project { .. } | LogicalPlan::Aggregate { .. } => {
            // Only the node's own expressions reach below it.
            let below = expression_columns(&plan);
            plan.map_children(|child| Ok::<_, Infallible>(prune(child, &below)))
                .unwrap_or_else(|never| match never {})
        }
        other => {
            let mut below = required.clone();
            below.extend(expression_columns(&other));
            other
                .map_children(|child| Ok::<_, Infallible>(prune(child, &below)))
                .unwrap_or_else(|never| match never {})
        }
    }
}

fn expression_columns(plan: &LogicalPlan) -> HashSet<ColumnRef> {
    plan.expressions()
        .into_iter()
        .flat_map(|e| e.columns())
        .collect()
}

// -----------------------------
// 4) Join strategy
// -----------------------------

fn choose_join_strategies(plan: LogicalPlan) -> Result<LogicalPlan> {
    let plan = plan.map_children(choose_join_strategies)?;
    Ok(match plan {
        LogicalPlan::Join {
            left,
            right,
            on,
            strategy: _,
        } => {
            let strategy = if on.is_empty() {
                JoinStrategy::NestedLoop
            } else if right.estimated_rows() <= left.estimated_rows() {
                JoinStrategy::Hash {
                    build: BuildSide::Right,
                }
            } else {
                JoinStrategy::Hash {
                    build: BuildSide::Left,
                }
            };
            debug!(?strategy, keys = on.len(), "chose join strategy");
            LogicalPlan::Join {
                left,
                right,
                on,
                strategy,
            }
        }
        other => other,
    })
}

// -----------------------------
// Helpers
// -----------------------------

/// Apply `rewrite` to every expression held directly by `plan`.
fn rewrite_plan_exprs(
    plan: LogicalPlan,
    rewrite: &dyn Fn(BoundExpr) -> Result<BoundExpr>,
) -> Result<LogicalPlan> {
    Ok(match plan {
        scan @ LogicalPlan::Scan { .. } => scan,
        LogicalPlan::Filter { input, predicate } => LogicalPlan::Filter {
            input,
            predicate: rewrite(predicate)?,
        },
        LogicalPlan::Project {
            input,
            output_ref,
            exprs,
            names,
        } => LogicalPlan::Project {
            input,
            output_ref,
            exprs: exprs.into_iter().map(rewrite).collect::<Result<_>>()?,
            names,
        },
        LogicalPlan::Join {
            left,
            right,
            on,
            strategy,
        } => LogicalPlan::Join {
            left,
            right,
            on: on
                .into_iter()
                .map(|k| {
                    Ok(JoinKey {
                        left: rewrite(k.left)?,
                        right: rewrite(k.right)?,
                    })
                })
                .collect::<Result<_>>()?,
            strategy,
        },
        LogicalPlan::Aggregate {
            input,
            group_ref,
            group_exprs,
            agg_ref,
            aggregates,
        } => LogicalPlan::Aggregate {
            input,
            group_ref,
            group_exprs: group_exprs.into_iter().map(rewrite).collect::<Result<_>>()?,
            agg_ref,
            aggregates: aggregates
                .into_iter()
                .map(|mut a| {
                    a.arg = a.arg.map(rewrite).transpose()?;
                    Ok(a)
                })
                .collect::<Result<_>>()?,
        },
        LogicalPlan::Sort { input, keys } => LogicalPlan::Sort {
            input,
            keys: keys
                .into_iter()
                .map(|mut k| {
                    k.expr = rewrite(k.expr)?;
                    Ok(k)
                })
                .collect::<Result<_>>()?,
        },
        limit @ LogicalPlan::Limit { .. } => limit,
    })
}
