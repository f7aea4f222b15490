// Public API for the query engine

pub mod binder;
pub mod catalog;
pub mod config;
pub mod error;
pub mod execution;
pub mod planner;
pub mod session;
pub mod sql;
pub mod storage;
pub mod types;

pub use catalog::{BatchIter, BatchLoader, Catalog, Column, Schema};
pub use config::EngineConfig;
pub use error::{DbError, Result};
pub use execution::RecordBatch;
pub use session::{execute, QueryResult, QueryState, Session};
pub use storage::{ParquetLoader, ParquetReaderConfig};
pub use types::{DataType, ScalarValue};
