// Logical planning: plan construction, rewrite rules and EXPLAIN rendering

pub mod builder;
pub mod explain;
pub mod logical_plan;
pub mod optimizer;

use tracing::debug;

pub use builder::build_select;
pub use explain::explain_plan;
pub use logical_plan::{BuildSide, JoinKey, JoinStrategy, LogicalPlan, OutputColumn, SortKey};
pub use optimizer::Optimizer;

use crate::binder::BoundSelect;
use crate::config::EngineConfig;
use crate::error::Result;

/// Build the plan for a bound SELECT and, unless disabled, optimize it.
pub fn plan_select(select: &BoundSelect, config: &EngineConfig) -> Result<LogicalPlan> {
    let plan = build_select(select)?;
    if !config.enable_optimizer {
        debug!("optimizer disabled, executing plan as built");
        return Ok(plan);
    }
    Optimizer::new(config).optimize(plan)
}
