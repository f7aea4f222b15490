// Vectorized, pull-based query execution

pub mod batch;
pub mod executor;
pub mod expressions;
pub mod operators;

pub use batch::RecordBatch;
pub use executor::{execute_plan, Executor};
pub use expressions::{evaluate_constant, PhysicalExpr};
pub use operators::{drain, BoxedOperator, Operator};
