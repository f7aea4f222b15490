// Table schemas: ordered, typed, nullable columns

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use arrow::array::Array;
use arrow::datatypes::{Field, Schema as ArrowSchema, SchemaRef};

use crate::error::{DbError, Result};
use crate::execution::batch::RecordBatch;
use crate::types::DataType;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub name: String,
    pub data_type: DataType,
    pub nullable: bool,
}

impl Column {
    /// A nullable column.
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            nullable: true,
        }
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn to_arrow_field(&self) -> Field {
        Field::new(&self.name, self.data_type.to_arrow(), self.nullable)
    }
}

/// Ordered list of uniquely named columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    columns: Vec<Column>,
}

impl Schema {
    /// # Errors
    /// `InvalidName` if a column name is empty or appears twice.
    pub fn try_new(columns: Vec<Column>) -> Result<Self> {
        let mut seen = HashSet::new();
        for column in &columns {
            if column.name.is_empty() {
                return Err(DbError::InvalidName("column name is empty".to_string()));
            }
            if !seen.insert(column.name.as_str()) {
                return Err(DbError::InvalidName(format!(
                    "duplicate column name '{}'",
                    column.name
                )));
            }
        }
        Ok(Self { columns })
    }

    /// Derive a schema from an Arrow schema whose types all belong to [`DataType`].
    pub fn from_arrow(schema: &ArrowSchema) -> Result<Self> {
        let columns = schema
            .fields()
            .iter()
            .map(|field| {
                let data_type = DataType::from_arrow(field.data_type()).ok_or_else(|| {
                    DbError::SchemaMismatch(format!(
                        "column '{}' has unsupported type {:?}",
                        field.name(),
                        field.data_type()
                    ))
                })?;
                Ok(Column {
                    name: field.name().clone(),
                    data_type,
                    nullable: field.is_nullable(),
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Self::try_new(columns)
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column(&self, index: usize) -> Option<&Column> {
        self.columns.get(index)
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn to_arrow(&self) -> SchemaRef {
        Arc::new(ArrowSchema::new(
            self.columns
                .iter()
                .map(Column::to_arrow_field)
                .collect::<Vec<_>>(),
        ))
    }

    /// Check that `batch` matches this schema column by column and that no
    /// NOT NULL column holds a null value.
    pub fn check_batch(&self, batch: &RecordBatch) -> Result<()> {
        if batch.num_columns() != self.columns.len() {
            return Err(DbError::SchemaMismatch(format!(
                "expected {} columns, batch has {}",
                self.columns.len(),
                batch.num_columns()
            )));
        }
        for (idx, (column, field)) in self
            .columns
            .iter()
            .zip(batch.schema().fields().iter())
            .enumerate()
        {
            if field.name() != &column.name {
                return Err(DbError::SchemaMismatch(format!(
                    "column {} is '{}' but batch has '{}'",
                    idx,
                    column.name,
                    field.name()
                )));
            }
            if field.data_type() != &column.data_type.to_arrow() {
                return Err(DbError::SchemaMismatch(format!(
                    "column '{}' is {} but batch has {:?}",
                    column.name,
                    column.data_type,
                    field.data_type()
                )));
            }
            if !column.nullable && batch.column(idx)?.null_count() > 0 {
                return Err(DbError::SchemaMismatch(format!(
                    "column '{}' is NOT NULL but batch contains nulls",
                    column.name
                )));
            }
        }
        Ok(())
    }
}

impl fmt::Display for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let columns: Vec<String> = self
            .columns
            .iter()
            .map(|c| {
                let null = if c.nullable { "" } else { " NOT NULL" };
                format!("{} {}{}", c.name, c.data_type, null)
            })
            .collect();
        write!(f, "({})", columns.join(", "))
    }
}
