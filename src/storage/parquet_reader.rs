// Parquet files as table sources

use std::fmt;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parquet::arrow::arrow_reader::{ParquetRecordBatchReader, ParquetRecordBatchReaderBuilder};
use parquet::arrow::ProjectionMask;
use rayon::prelude::*;
use tracing::debug;

use crate::catalog::{BatchIter, BatchLoader, Catalog, Schema};
use crate::error::{DbError, Result};
use crate::execution::batch::RecordBatch;

/// Configuration for reading Parquet files
#[derive(Debug, Clone)]
pub struct ParquetReaderConfig {
    /// Whether to read row groups in parallel (default: true)
    pub parallel: bool,
    /// Optional list of column indices to read (for column pruning)
    /// If None, all columns are read. Columns keep their file order.
    pub column_indices: Option<Vec<usize>>,
    /// Batch size for reading (default: 8192)
    pub batch_size: usize,
}

impl Default for ParquetReaderConfig {
    fn default() -> Self {
        Self {
            parallel: true,
            column_indices: None,
            batch_size: 8192,
        }
    }
}

/// [`BatchLoader`] that reads a Parquet file each time the table is scanned.
///
/// The table schema is derived from the file's Arrow schema (after column
/// pruning) when the loader is created; every column type must map onto a
/// supported [`DataType`](crate::types::DataType).
pub struct ParquetLoader {
    path: PathBuf,
    config: ParquetReaderConfig,
    schema: Schema,
    num_rows: usize,
    num_row_groups: usize,
}

impl ParquetLoader {
    pub fn try_new<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::try_new_with_config(path, ParquetReaderConfig::default())
    }

    pub fn try_new_with_config<P: AsRef<Path>>(
        path: P,
        mut config: ParquetReaderConfig,
    ) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if config.batch_size == 0 {
            return Err(DbError::InvalidConfig(
                "parquet batch size must be positive".to_string(),
            ));
        }
        if let Some(indices) = config.column_indices.as_mut() {
            indices.sort_unstable();
            indices.dedup();
        }

        let builder = open(&path)?;
        let file_schema = builder.schema().clone();
        let arrow_schema = match &config.column_indices {
            Some(indices) => file_schema
                .project(indices)
                .map_err(|e| load_error(&path, e))?,
            None => file_schema.as_ref().clone(),
        };
        let schema = Schema::from_arrow(&arrow_schema)?;
        let metadata = builder.metadata();
        let num_rows = usize::try_from(metadata.file_metadata().num_rows()).unwrap_or(0);
        let num_row_groups = metadata.num_row_groups();
        debug!(
            path = %path.display(),
            rows = num_rows,
            row_groups = num_row_groups,
            schema = %schema,
            "opened parquet file"
        );

        Ok(Self {
            path,
            config,
            schema,
            num_rows,
            num_row_groups,
        })
    }

    /// Schema of the batches this loader produces.
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Register the file as table `name` in `catalog`.
    pub fn register(self, catalog: &Catalog, name: &str) -> Result<()> {
        let schema = self.schema.clone();
        catalog.define_with_loader(name, schema, Arc::new(self))
    }

    fn reader(&self, row_groups: Option<Vec<usize>>) -> Result<ParquetRecordBatchReader> {
        let mut builder = open(&self.path)?.with_batch_size(self.config.batch_size);
        if let Some(indices) = &self.config.column_indices {
            let mask = ProjectionMask::roots(builder.parquet_schema(), indices.iter().copied());
            builder = builder.with_projection(mask);
        }
        if let Some(row_groups) = row_groups {
            builder = builder.with_row_groups(row_groups);
        }
        builder.build().map_err(|e| load_error(&self.path, e))
    }

    /// Read one row group to completion.
    fn read_row_group(&self, row_group: usize) -> Result<Vec<RecordBatch>> {
        self.reader(Some(vec![row_group]))?
            .map(|batch| {
                batch
                    .map(RecordBatch::from_arrow)
                    .map_err(|e| load_error(&self.path, e))
            })
            .collect()
    }

    /// Read every row group in parallel using Rayon, keeping file order.
    fn read_all_parallel(&self) -> Result<Vec<RecordBatch>> {
        let per_group: Vec<Result<Vec<RecordBatch>>> = (0..self.num_row_groups)
            .into_par_iter()
            .map(|row_group| self.read_row_group(row_group))
            .collect();

        let mut batches = Vec::new();
        for result in per_group {
            batches.extend(result?);
        }
        Ok(batches)
    }
}

impl fmt::Debug for ParquetLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParquetLoader")
            .field("path", &self.path)
            .field("config", &self.config)
            .field("rows", &self.num_rows)
            .finish()
    }
}

impl BatchLoader for ParquetLoader {
    fn load_batches(&self) -> Result<BatchIter> {
        if self.config.parallel && self.num_row_groups > 1 {
            let batches = self.read_all_parallel()?;
            debug!(path = %self.path.display(), batches = batches.len(), "read row groups in parallel");
            return Ok(Box::new(batches.into_iter().map(Ok)));
        }

        let path = self.path.clone();
        let reader = self.reader(None)?;
        Ok(Box::new(reader.map(move |batch| {
            batch
                .map(RecordBatch::from_arrow)
                .map_err(|e| load_error(&path, e))
        })))
    }

    fn row_count_hint(&self) -> Option<usize> {
        Some(self.num_rows)
    }
}

fn open(path: &Path) -> Result<ParquetRecordBatchReaderBuilder<File>> {
    let file = File::open(path).map_err(|e| load_error(path, e))?;
    ParquetRecordBatchReaderBuilder::try_new(file).map_err(|e| load_error(path, e))
}

fn load_error(path: &Path, err: impl fmt::Display) -> DbError {
    DbError::Load(format!("{}: {}", path.display(), err))
}

#[cfg(test)]
mod tests {
    use super::*;

    use arrow::array::{ArrayRef, Int64Array, StringArray};
    use arrow::datatypes::{DataType as ArrowType, Field, Schema as ArrowSchema};
    use arrow::record_batch::RecordBatch as ArrowRecordBatch;
    use parquet::arrow::ArrowWriter;
    use parquet::file::properties::WriterProperties;
    use tempfile::TempDir;

    use crate::types::{DataType, ScalarValue};

    /// Five rows `(i, "row i")` split into row groups of two.
    fn write_file(dir: &TempDir) -> PathBuf {
        let path = dir.path().join("numbers.parquet");
        let schema = Arc::new(ArrowSchema::new(vec![
            Field::new("id", ArrowType::Int64, false),
            Field::new("label", ArrowType::Utf8, true),
        ]));
        let batch = ArrowRecordBatch::try_new(
            schema.clone(),
            vec![
                Arc::new(Int64Array::from(vec![1, 2, 3, 4, 5])) as ArrayRef,
                Arc::new(StringArray::from(vec![
                    Some("row 1"),
                    None,
                    Some("row 3"),
                    Some("row 4"),
                    Some("row 5"),
                ])),
            ],
        )
        .unwrap();
        let props = WriterProperties::builder()
            .set_max_row_group_size(2)
            .build();
        let mut writer = ArrowWriter::try_new(File::create(&path).unwrap(), schema, Some(props))
            .unwrap();
        writer.write(&batch).unwrap();
        writer.close().unwrap();
        path
    }

    fn ids(batches: &[RecordBatch]) -> Vec<ScalarValue> {
        batches
            .iter()
            .flat_map(|b| b.rows().unwrap())
            .map(|row| row[0].clone())
            .collect()
    }

    #[test]
    fn test_schema_and_row_hint_from_metadata() {
        let dir = TempDir::new().unwrap();
        let loader = ParquetLoader::try_new(write_file(&dir)).unwrap();
        assert_eq!(loader.schema().len(), 2);
        assert_eq!(loader.schema().columns()[0].data_type, DataType::Int64);
        assert!(!loader.schema().columns()[0].nullable);
        assert_eq!(loader.schema().columns()[1].data_type, DataType::Text);
        assert_eq!(loader.row_count_hint(), Some(5));
        assert_eq!(loader.num_row_groups, 3);
    }

    #[test]
    fn test_parallel_and_sequential_reads_agree() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir);
        let parallel = ParquetLoader::try_new(&path).unwrap();
        let sequential = ParquetLoader::try_new_with_config(
            &path,
            ParquetReaderConfig {
                parallel: false,
                ..Default::default()
            },
        )
        .unwrap();

        let a: Vec<RecordBatch> = parallel
            .load_batches()
            .unwrap()
            .collect::<Result<_>>()
            .unwrap();
        let b: Vec<RecordBatch> = sequential
            .load_batches()
            .unwrap()
            .collect::<Result<_>>()
            .unwrap();
        let expected: Vec<ScalarValue> = (1..=5).map(ScalarValue::Int64).collect();
        assert_eq!(ids(&a), expected);
        assert_eq!(ids(&b), expected);
    }

    #[test]
    fn test_column_projection_and_batch_size() {
        let dir = TempDir::new().unwrap();
        let loader = ParquetLoader::try_new_with_config(
            write_file(&dir),
            ParquetReaderConfig {
                parallel: false,
                column_indices: Some(vec![1]),
                batch_size: 1,
            },
        )
        .unwrap();
        assert_eq!(loader.schema().len(), 1);
        assert_eq!(loader.schema().columns()[0].name, "label");

        let batches: Vec<RecordBatch> = loader
            .load_batches()
            .unwrap()
            .collect::<Result<_>>()
            .unwrap();
        assert!(batches.iter().all(|b| b.num_rows() == 1 && b.num_columns() == 1));
        assert_eq!(batches.len(), 5);
        assert_eq!(ids(&batches)[1], ScalarValue::Null);
    }

    #[test]
    fn test_missing_file_is_a_load_error() {
        let dir = TempDir::new().unwrap();
        let err = ParquetLoader::try_new(dir.path().join("absent.parquet")).unwrap_err();
        assert!(matches!(err, DbError::Load(msg) if msg.contains("absent.parquet")));
    }
}
