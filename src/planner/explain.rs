// EXPLAIN rendering

use crate::planner::logical_plan::{BuildSide, JoinStrategy, LogicalPlan};

/// Render a logical plan as indented multiline text, one node per line.
pub fn explain_plan(plan: &LogicalPlan) -> String {
    let mut s = String::new();
    fmt_plan(plan, 0, &mut s);
    s
}

fn fmt_plan(plan: &LogicalPlan, indent: usize, out: &mut String) {
    let pad = "  ".repeat(indent);
    match plan {
        LogicalPlan::Scan {
            name,
            table,
            projection,
            ..
        } => {
            let columns: Vec<&str> = projection
                .iter()
                .filter_map(|&idx| table.schema.column(idx).map(|c| c.name.as_str()))
                .collect();
            let source = if name == &table.name {
                name.clone()
            } else {
                format!("{} AS {name}", table.name)
            };
            out.push_str(&format!(
                "{pad}Scan: {source} projection=[{}]\n",
                columns.join(", ")
            ));
        }
        LogicalPlan::Filter { input, predicate } => {
            out.push_str(&format!("{pad}Filter: {predicate}\n"));
            fmt_plan(input, indent + 1, out);
        }
        LogicalPlan::Project {
            input, exprs, names, ..
        } => {
            let items: Vec<String> = exprs
                .iter()
                .zip(names)
                .map(|(expr, name)| {
                    let rendered = expr.to_string();
                    if &rendered == name {
                        rendered
                    } else {
                        format!("{rendered} AS {name}")
                    }
                })
                .collect();
            out.push_str(&format!("{pad}Project: {}\n", items.join(", ")));
            fmt_plan(input, indent + 1, out);
        }
        LogicalPlan::Join {
            left,
            right,
            on,
            strategy,
        } => {
            match strategy {
                JoinStrategy::Hash { build } => {
                    let keys: Vec<String> = on
                        .iter()
                        .map(|k| format!("{} = {}", k.left, k.right))
                        .collect();
                    let build = match build {
                        BuildSide::Left => "left",
                        BuildSide::Right => "right",
                    };
                    out.push_str(&format!(
                        "{pad}HashJoin: on=[{}] build={build}\n",
                        keys.join(", ")
                    ));
                }
                JoinStrategy::NestedLoop if on.is_empty() => {
                    out.push_str(&format!("{pad}NestedLoopJoin\n"));
                }
                JoinStrategy::NestedLoop => {
                    let keys: Vec<String> = on
                        .iter()
                        .map(|k| format!("{} = {}", k.left, k.right))
                        .collect();
                    out.push_str(&format!("{pad}NestedLoopJoin: on=[{}]\n", keys.join(", ")));
                }
            }
            fmt_plan(left, indent + 1, out);
            fmt_plan(right, indent + 1, out);
        }
        LogicalPlan::Aggregate {
            input,
            group_exprs,
            aggregates,
            ..
        } => {
            let groups: Vec<String> = group_exprs.iter().map(|e| e.to_string()).collect();
            let aggs: Vec<String> = aggregates.iter().map(|a| a.to_string()).collect();
            out.push_str(&format!(
                "{pad}Aggregate: groups=[{}] aggregates=[{}]\n",
                groups.join(", "),
                aggs.join(", ")
            ));
            fmt_plan(input, indent + 1, out);
        }
        LogicalPlan::Sort { input, keys } => {
            let keys: Vec<String> = keys
                .iter()
                .map(|k| format!("{} {}", k.expr, if k.ascending { "ASC" } else { "DESC" }))
                .collect();
            out.push_str(&format!("{pad}Sort: {}\n", keys.join(", ")));
            fmt_plan(input, indent + 1, out);
        }
        LogicalPlan::Limit {
            input,
            limit,
            offset,
        } => {
            match limit {
                Some(n) => out.push_str(&format!("{pad}Limit: limit={n} offset={offset}\n")),
                None => out.push_str(&format!("{pad}Limit: offset={offset}\n")),
            }
            fmt_plan(input, indent + 1, out);
        }
    }
}
