// External table sources

pub mod parquet_reader;

pub use parquet_reader::{ParquetLoader, ParquetReaderConfig};
