// Bound query -> logical plan

use crate::binder::{BoundExpr, BoundSelect};
use crate::error::{DbError, Result};
use crate::planner::logical_plan::{JoinStrategy, LogicalPlan, SortKey};

/// Translate a bound SELECT into its canonical plan:
/// Scan/Join -> Filter (WHERE and JOIN ON) -> Aggregate -> Filter (HAVING)
/// -> Sort -> Project -> Limit.
///
/// FROM bindings are combined as nested-loop cross joins; the optimizer turns
/// equality conditions into hash-join keys.
pub fn build_select(select: &BoundSelect) -> Result<LogicalPlan> {
    let mut plan: Option<LogicalPlan> = None;
    for table in &select.tables {
        let scan = LogicalPlan::Scan {
            table_ref: table.table_ref,
            name: table.name.clone(),
            table: table.snapshot.clone(),
            projection: (0..table.snapshot.schema.len()).collect(),
        };
        plan = Some(match plan {
            None => scan,
            Some(left) => LogicalPlan::Join {
                left: Box::new(left),
                right: Box::new(scan),
                on: Vec::new(),
                strategy: JoinStrategy::NestedLoop,
            },
        });
    }
    let mut plan =
        plan.ok_or_else(|| DbError::Internal("SELECT requires a FROM clause".to_string()))?;

    let predicates = select
        .join_conditions
        .iter()
        .cloned()
        .chain(select.filter.clone());
    if let Some(predicate) = BoundExpr::conjunction(predicates) {
        plan = LogicalPlan::Filter {
            input: Box::new(plan),
            predicate,
        };
    }

    if let Some(aggregation) = &select.aggregation {
        plan = LogicalPlan::Aggregate {
            input: Box::new(plan),
            group_ref: aggregation.group_ref,
            group_exprs: aggregation.group_exprs.clone(),
            agg_ref: aggregation.agg_ref,
            aggregates: aggregation.aggregates.clone(),
        };
    }

    if let Some(having) = &select.having {
        plan = LogicalPlan::Filter {
            input: Box::new(plan),
            predicate: having.clone(),
        };
    }

    if !select.order_by.is_empty() {
        plan = LogicalPlan::Sort {
            input: Box::new(plan),
            keys: select
                .order_by
                .iter()
                .map(|o| SortKey {
                    expr: o.expr.clone(),
                    ascending: o.ascending,
                })
                .collect(),
        };
    }

    plan = LogicalPlan::Project {
        input: Box::new(plan),
        output_ref: select.output_ref,
        exprs: select.projection.clone(),
        names: select.output_names.clone(),
    };

    if select.limit.is_some() || select.offset.is_some() {
        plan = LogicalPlan::Limit {
            input: Box::new(plan),
            limit: select.limit,
            offset: select.offset.unwrap_or(0),
        };
    }

    Ok(plan)
}
