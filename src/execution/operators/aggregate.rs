// GROUP BY aggregations

use std::cmp::Ordering;
use std::collections::{HashMap, VecDeque};

use arrow::array::ArrayRef;
use tracing::debug;

use crate::binder::AggregateFunction;
use crate::error::{DbError, Result};
use crate::execution::batch::{RecordBatch, SchemaRef};
use crate::execution::expressions::{evaluate, PhysicalExpr};
use crate::execution::operators::{split_batch, BoxedOperator, Operator};
use crate::types::{decimal_fits, decimal_to_f64, DataType, ScalarValue, MAX_DECIMAL_PRECISION};

/// One aggregate to compute; `arg` is `None` for `COUNT(*)`.
#[derive(Debug, Clone)]
pub struct AggregateExpr {
    pub func: AggregateFunction,
    pub arg: Option<PhysicalExpr>,
    /// Result type
    pub data_type: DataType,
}

/// Per-group running state of one aggregate
#[derive(Clone, Debug)]
enum AggState {
    Count(i64),
    SumInt(Option<i64>),
    SumFloat(Option<f64>),
    SumDecimal { sum: Option<i128>, scale: u8 },
    /// Exact running sum for integer and decimal input
    AvgExact { sum: i128, count: i64, scale: u8 },
    AvgFloat { sum: f64, count: i64 },
    Min(Option<ScalarValue>),
    Max(Option<ScalarValue>),
}

impl AggState {
    fn new(agg: &AggregateExpr) -> Self {
        let input = agg.arg.as_ref().map(|a| a.data_type());
        match (agg.func, input) {
            (AggregateFunction::Count, _) => AggState::Count(0),
            (AggregateFunction::Sum, Some(DataType::Decimal { scale, .. })) => {
                AggState::SumDecimal { sum: None, scale }
            }
            (AggregateFunction::Sum, Some(DataType::Float64)) => AggState::SumFloat(None),
            (AggregateFunction::Sum, _) => AggState::SumInt(None),
            (AggregateFunction::Avg, Some(DataType::Decimal { scale, .. })) => AggState::AvgExact {
                sum: 0,
                count: 0,
                scale,
            },
            (AggregateFunction::Avg, Some(DataType::Int64)) => AggState::AvgExact {
                sum: 0,
                count: 0,
                scale: 0,
            },
            (AggregateFunction::Avg, _) => AggState::AvgFloat { sum: 0.0, count: 0 },
            (AggregateFunction::Min, _) => AggState::Min(None),
            (AggregateFunction::Max, _) => AggState::Max(None),
        }
    }

    /// Fold one input value in. `None` is `COUNT(*)`'s row without an argument.
    fn update(&mut self, value: Option<&ScalarValue>) -> Result<()> {
        let overflow = || DbError::ArithmeticOverflow("aggregate sum out of range".to_string());
        match (self, value) {
            (AggState::Count(count), None) => *count += 1,
            (_, Some(ScalarValue::Null)) => {}
            (AggState::Count(count), Some(_)) => *count += 1,
            (AggState::SumInt(sum), Some(ScalarValue::Int64(v))) => {
                *sum = Some(sum.unwrap_or(0).checked_add(*v).ok_or_else(overflow)?);
            }
            (AggState::SumFloat(sum), Some(ScalarValue::Float64(v))) => {
                *sum = Some(sum.unwrap_or(0.0) + v);
            }
            (AggState::SumDecimal { sum, .. }, Some(ScalarValue::Decimal { value, .. })) => {
                let next = sum.unwrap_or(0).checked_add(*value).ok_or_else(overflow)?;
                if !decimal_fits(next, MAX_DECIMAL_PRECISION) {
                    return Err(overflow());
                }
                *sum = Some(next);
            }
            (AggState::AvgExact { sum, count, .. }, Some(value)) => {
                let v = match value {
                    ScalarValue::Int64(v) => i128::from(*v),
                    ScalarValue::Decimal { value, .. } => *value,
                    other => return Err(unexpected(other)),
                };
                *sum = sum.checked_add(v).ok_or_else(overflow)?;
                *count += 1;
            }
            (AggState::AvgFloat { sum, count }, Some(ScalarValue::Float64(v))) => {
                *sum += v;
                *count += 1;
            }
            (AggState::Min(current), Some(value)) => {
                if current
                    .as_ref()
                    .map_or(true, |c| compare_scalars(value, c) == Ordering::Less)
                {
                    *current = Some(value.clone());
                }
            }
            (AggState::Max(current), Some(value)) => {
                if current
                    .as_ref()
                    .map_or(true, |c| compare_scalars(value, c) == Ordering::Greater)
                {
                    *current = Some(value.clone());
                }
            }
            (_, Some(other)) => return Err(unexpected(other)),
            (_, None) => {
                return Err(DbError::Internal(
                    "aggregate argument missing".to_string(),
                ))
            }
        }
        Ok(())
    }

    fn finish(&self) -> ScalarValue {
        match self {
            AggState::Count(count) => ScalarValue::Int64(*count),
            AggState::SumInt(sum) => sum.map_or(ScalarValue::Null, ScalarValue::Int64),
            AggState::SumFloat(sum) => sum.map_or(ScalarValue::Null, ScalarValue::Float64),
            AggState::SumDecimal { sum, scale } => match sum {
                Some(value) => ScalarValue::Decimal {
                    value: *value,
                    precision: MAX_DECIMAL_PRECISION,
                    scale: *scale,
                },
                None => ScalarValue::Null,
            },
            AggState::AvgExact { sum, count, scale } => {
                if *count == 0 {
                    ScalarValue::Null
                } else {
                    ScalarValue::Float64(decimal_to_f64(*sum, *scale) / *count as f64)
                }
            }
            AggState::AvgFloat { sum, count } => {
                if *count == 0 {
                    ScalarValue::Null
                } else {
                    ScalarValue::Float64(sum / *count as f64)
                }
            }
            AggState::Min(value) | AggState::Max(value) => {
                value.clone().unwrap_or(ScalarValue::Null)
            }
        }
    }
}

fn unexpected(value: &ScalarValue) -> DbError {
    DbError::Internal(format!("unexpected aggregate input {value}"))
}

/// Order two non-null values of the same type. Floats use the IEEE total
/// order, matching the sort kernels.
fn compare_scalars(a: &ScalarValue, b: &ScalarValue) -> Ordering {
    match (a, b) {
        (ScalarValue::Int64(a), ScalarValue::Int64(b)) => a.cmp(b),
        (ScalarValue::Float64(a), ScalarValue::Float64(b)) => a.total_cmp(b),
        (ScalarValue::Boolean(a), ScalarValue::Boolean(b)) => a.cmp(b),
        (ScalarValue::Text(a), ScalarValue::Text(b)) => a.cmp(b),
        (ScalarValue::Decimal { value: a, .. }, ScalarValue::Decimal { value: b, .. }) => a.cmp(b),
        _ => Ordering::Equal,
    }
}

/// Aggregate operator implementing GROUP BY with COUNT, SUM, AVG, MIN, MAX
/// Uses hash aggregation: a map from group key tuple to its group slot.
/// Groups are emitted in the order they were first seen; without GROUP BY the
/// output is always exactly one row.
pub struct AggregateOperator {
    input: BoxedOperator,
    group_exprs: Vec<PhysicalExpr>,
    aggregates: Vec<AggregateExpr>,
    schema: SchemaRef,
    batch_size: usize,
    output: Option<VecDeque<RecordBatch>>,
}

impl AggregateOperator {
    pub fn new(
        input: BoxedOperator,
        group_exprs: Vec<PhysicalExpr>,
        aggregates: Vec<AggregateExpr>,
        schema: SchemaRef,
        batch_size: usize,
    ) -> Self {
        Self {
            input,
            group_exprs,
            aggregates,
            schema,
            batch_size,
            output: None,
        }
    }

    fn hash_aggregate(&mut self) -> Result<VecDeque<RecordBatch>> {
        let mut slots: HashMap<Vec<ScalarValue>, usize> = HashMap::new();
        let mut keys: Vec<Vec<ScalarValue>> = Vec::new();
        let mut states: Vec<Vec<AggState>> = Vec::new();
        let mut input_rows = 0;

        while let Some(batch) = self.input.next_batch()? {
            input_rows += batch.num_rows();
            let group_arrays = self
                .group_exprs
                .iter()
                .map(|e| evaluate(e, &batch))
                .collect::<Result<Vec<ArrayRef>>>()?;
            let arg_arrays = self
                .aggregates
                .iter()
                .map(|a| a.arg.as_ref().map(|e| evaluate(e, &batch)).transpose())
                .collect::<Result<Vec<Option<ArrayRef>>>>()?;

            for row in 0..batch.num_rows() {
                let key = group_arrays
                    .iter()
                    .map(|a| ScalarValue::try_from_array(a.as_ref(), row))
                    .collect::<Result<Vec<_>>>()?;
                let slot = match slots.get(&key) {
                    Some(slot) => *slot,
                    None => {
                        let slot = keys.len();
                        slots.insert(key.clone(), slot);
                        keys.push(key);
                        states.push(self.aggregates.iter().map(AggState::new).collect());
                        slot
                    }
                };
                for (state, arg) in states[slot].iter_mut().zip(&arg_arrays) {
                    match arg {
                        Some(array) => {
                            state.update(Some(&ScalarValue::try_from_array(array.as_ref(), row)?))?
                        }
                        None => state.update(None)?,
                    }
                }
            }
        }

        if keys.is_empty() && self.group_exprs.is_empty() {
            keys.push(Vec::new());
            states.push(self.aggregates.iter().map(AggState::new).collect());
        }
        debug!(input_rows, groups = keys.len(), "aggregated input");

        let mut columns: Vec<ArrayRef> = Vec::with_capacity(self.schema.fields().len());
        for (idx, expr) in self.group_exprs.iter().enumerate() {
            columns.push(ScalarValue::iter_to_array(
                keys.iter().map(|k| &k[idx]),
                &expr.data_type(),
            )?);
        }
        for (idx, agg) in self.aggregates.iter().enumerate() {
            let values: Vec<ScalarValue> = states.iter().map(|s| s[idx].finish()).collect();
            columns.push(ScalarValue::iter_to_array(&values, &agg.data_type)?);
        }
        let batch = RecordBatch::try_new_with_row_count(self.schema.clone(), columns, keys.len())?;
        split_batch(batch, self.batch_size)
    }
}

impl Operator for AggregateOperator {
    fn schema(&self) -> SchemaRef {
        self.schema.clone()
    }

    fn next_batch(&mut self) -> Result<Option<RecordBatch>> {
        if self.output.is_none() {
            self.output = Some(self.hash_aggregate()?);
        }
        Ok(self
            .output
            .as_mut()
            .and_then(|batches| batches.pop_front())
            .filter(|batch| !batch.is_empty()))
    }
}
