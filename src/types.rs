// Column data types and scalar values

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use arrow::array::{
    new_null_array, Array, ArrayRef, BooleanArray, Decimal128Array, Float64Array, Int64Array,
    StringArray,
};
use arrow::compute::{cast_with_options, CastOptions};
use arrow::datatypes::DataType as ArrowType;

use crate::error::{DbError, Result};

/// Largest precision a Decimal128 column can carry.
pub const MAX_DECIMAL_PRECISION: u8 = 38;

/// The closed set of column types.
///
/// Every variant maps 1:1 onto an Arrow type; see [`DataType::to_arrow`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    Int64,
    Float64,
    Boolean,
    Text,
    Decimal { precision: u8, scale: u8 },
}

impl DataType {
    /// Build a decimal type, validating `1 <= precision <= 38` and `scale <= precision`.
    pub fn decimal(precision: u8, scale: u8) -> Result<Self> {
        if precision == 0 || precision > MAX_DECIMAL_PRECISION {
            return Err(DbError::TypeMismatch(format!(
                "decimal precision must be between 1 and {MAX_DECIMAL_PRECISION}, got {precision}"
            )));
        }
        if scale > precision {
            return Err(DbError::TypeMismatch(format!(
                "decimal scale {scale} exceeds precision {precision}"
            )));
        }
        Ok(DataType::Decimal { precision, scale })
    }

    pub fn to_arrow(&self) -> ArrowType {
        match self {
            DataType::Int64 => ArrowType::Int64,
            DataType::Float64 => ArrowType::Float64,
            DataType::Boolean => ArrowType::Boolean,
            DataType::Text => ArrowType::Utf8,
            DataType::Decimal { precision, scale } => {
                ArrowType::Decimal128(*precision, *scale as i8)
            }
        }
    }

    /// Map an Arrow type back onto the closed type set, if it belongs to it.
    pub fn from_arrow(data_type: &ArrowType) -> Option<Self> {
        match data_type {
            ArrowType::Int64 => Some(DataType::Int64),
            ArrowType::Float64 => Some(DataType::Float64),
            ArrowType::Boolean => Some(DataType::Boolean),
            ArrowType::Utf8 => Some(DataType::Text),
            ArrowType::Decimal128(precision, scale) if *scale >= 0 => Some(DataType::Decimal {
                precision: *precision,
                scale: *scale as u8,
            }),
            _ => None,
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            DataType::Int64 | DataType::Float64 | DataType::Decimal { .. }
        )
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataType::Int64 => write!(f, "INTEGER"),
            DataType::Float64 => write!(f, "FLOAT"),
            DataType::Boolean => write!(f, "BOOLEAN"),
            DataType::Text => write!(f, "TEXT"),
            DataType::Decimal { precision, scale } => write!(f, "DECIMAL({precision},{scale})"),
        }
    }
}

/// A single value of one of the column types, or an untyped NULL.
///
/// Equality and hashing compare floats by bit pattern with all NaNs collapsed,
/// matching the total order the comparison kernels use, so values can serve
/// as hash keys for grouping and joins.
#[derive(Debug, Clone)]
pub enum ScalarValue {
    Null,
    Int64(i64),
    Float64(f64),
    Boolean(bool),
    Text(String),
    Decimal { value: i128, precision: u8, scale: u8 },
}

impl ScalarValue {
    pub fn is_null(&self) -> bool {
        matches!(self, ScalarValue::Null)
    }

    /// The value's own type; `None` for NULL.
    pub fn data_type(&self) -> Option<DataType> {
        match self {
            ScalarValue::Null => None,
            ScalarValue::Int64(_) => Some(DataType::Int64),
            ScalarValue::Float64(_) => Some(DataType::Float64),
            ScalarValue::Boolean(_) => Some(DataType::Boolean),
            ScalarValue::Text(_) => Some(DataType::Text),
            ScalarValue::Decimal {
                precision, scale, ..
            } => Some(DataType::Decimal {
                precision: *precision,
                scale: *scale,
            }),
        }
    }

    /// Repeat this value `len` times as an array of `data_type`, casting when
    /// the value's own type differs from the requested one.
    pub fn to_array(&self, data_type: &DataType, len: usize) -> Result<ArrayRef> {
        let array: ArrayRef = match self {
            ScalarValue::Null => return Ok(new_null_array(&data_type.to_arrow(), len)),
            ScalarValue::Int64(v) => Arc::new(Int64Array::from(vec![*v; len])),
            ScalarValue::Float64(v) => Arc::new(Float64Array::from(vec![*v; len])),
            ScalarValue::Boolean(v) => Arc::new(BooleanArray::from(vec![*v; len])),
            ScalarValue::Text(v) => Arc::new(StringArray::from(vec![v.as_str(); len])),
            ScalarValue::Decimal {
                value,
                precision,
                scale,
            } => Arc::new(
                Decimal128Array::from(vec![*value; len])
                    .with_precision_and_scale(*precision, *scale as i8)?,
            ),
        };
        cast_array(&array, data_type)
    }

    /// Read the value at `row` out of an array of one of the supported types.
    pub fn try_from_array(array: &dyn Array, row: usize) -> Result<Self> {
        if array.is_null(row) {
            return Ok(ScalarValue::Null);
        }
        match array.data_type() {
            ArrowType::Int64 => Ok(ScalarValue::Int64(
                downcast_array::<Int64Array>(array)?.value(row),
            )),
            ArrowType::Float64 => Ok(ScalarValue::Float64(
                downcast_array::<Float64Array>(array)?.value(row),
            )),
            ArrowType::Boolean => Ok(ScalarValue::Boolean(
                downcast_array::<BooleanArray>(array)?.value(row),
            )),
            ArrowType::Utf8 => Ok(ScalarValue::Text(
                downcast_array::<StringArray>(array)?.value(row).to_string(),
            )),
            ArrowType::Decimal128(precision, scale) if *scale >= 0 => Ok(ScalarValue::Decimal {
                value: downcast_array::<Decimal128Array>(array)?.value(row),
                precision: *precision,
                scale: *scale as u8,
            }),
            other => Err(DbError::Internal(format!(
                "unsupported array type {other:?}"
            ))),
        }
    }

    /// Build an array of `data_type` from values that already have that type (or are NULL).
    pub fn iter_to_array<'a>(
        values: impl IntoIterator<Item = &'a ScalarValue>,
        data_type: &DataType,
    ) -> Result<ArrayRef> {
        fn mismatch(value: &ScalarValue, data_type: &DataType) -> DbError {
            DbError::Internal(format!("value {value} does not have type {data_type}"))
        }

        let values = values.into_iter();
        let array: ArrayRef = match data_type {
            DataType::Int64 => Arc::new(
                values
                    .map(|v| match v {
                        ScalarValue::Null => Ok(None),
                        ScalarValue::Int64(x) => Ok(Some(*x)),
                        other => Err(mismatch(other, data_type)),
                    })
                    .collect::<Result<Int64Array>>()?,
            ),
            DataType::Float64 => Arc::new(
                values
                    .map(|v| match v {
                        ScalarValue::Null => Ok(None),
                        ScalarValue::Float64(x) => Ok(Some(*x)),
                        other => Err(mismatch(other, data_type)),
                    })
                    .collect::<Result<Float64Array>>()?,
            ),
            DataType::Boolean => Arc::new(
                values
                    .map(|v| match v {
                        ScalarValue::Null => Ok(None),
                        ScalarValue::Boolean(x) => Ok(Some(*x)),
                        other => Err(mismatch(other, data_type)),
                    })
                    .collect::<Result<BooleanArray>>()?,
            ),
            DataType::Text => Arc::new(
                values
                    .map(|v| match v {
                        ScalarValue::Null => Ok(None),
                        ScalarValue::Text(x) => Ok(Some(x.as_str())),
                        other => Err(mismatch(other, data_type)),
                    })
                    .collect::<Result<StringArray>>()?,
            ),
            DataType::Decimal { precision, scale } => Arc::new(
                values
                    .map(|v| match v {
                        ScalarValue::Null => Ok(None),
                        ScalarValue::Decimal { value, scale: s, .. } if s == scale => {
                            Ok(Some(*value))
                        }
                        other => Err(mismatch(other, data_type)),
                    })
                    .collect::<Result<Decimal128Array>>()?
                    .with_precision_and_scale(*precision, *scale as i8)?,
            ),
        };
        Ok(array)
    }

    /// Parse a fixed-point literal such as `12.50` into a decimal value.
    ///
    /// Returns `None` when the literal needs more than 38 digits.
    pub fn parse_decimal(text: &str) -> Option<Self> {
        let (int_part, frac_part) = text.split_once('.').unwrap_or((text, ""));
        let int_digits = int_part.trim_start_matches('0');
        let scale = frac_part.len();
        let precision = (int_digits.len() + scale).max(1);
        if precision > MAX_DECIMAL_PRECISION as usize {
            return None;
        }
        let digits = format!("{int_digits}{frac_part}");
        let value = if digits.is_empty() {
            0
        } else {
            digits.parse::<i128>().ok()?
        };
        Some(ScalarValue::Decimal {
            value,
            precision: precision as u8,
            scale: scale as u8,
        })
    }
}

fn float_key(v: f64) -> u64 {
    if v.is_nan() {
        f64::NAN.to_bits()
    } else {
        v.to_bits()
    }
}

impl PartialEq for ScalarValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (ScalarValue::Null, ScalarValue::Null) => true,
            (ScalarValue::Int64(a), ScalarValue::Int64(b)) => a == b,
            (ScalarValue::Float64(a), ScalarValue::Float64(b)) => float_key(*a) == float_key(*b),
            (ScalarValue::Boolean(a), ScalarValue::Boolean(b)) => a == b,
            (ScalarValue::Text(a), ScalarValue::Text(b)) => a == b,
            (
                ScalarValue::Decimal {
                    value: a,
                    precision: pa,
                    scale: sa,
                },
                ScalarValue::Decimal {
                    value: b,
                    precision: pb,
                    scale: sb,
                },
            ) => a == b && pa == pb && sa == sb,
            _ => false,
        }
    }
}

impl Eq for ScalarValue {}

impl Hash for ScalarValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            ScalarValue::Null => {}
            ScalarValue::Int64(v) => v.hash(state),
            ScalarValue::Float64(v) => float_key(*v).hash(state),
            ScalarValue::Boolean(v) => v.hash(state),
            ScalarValue::Text(v) => v.hash(state),
            ScalarValue::Decimal {
                value,
                precision,
                scale,
            } => {
                value.hash(state);
                precision.hash(state);
                scale.hash(state);
            }
        }
    }
}

impl fmt::Display for ScalarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScalarValue::Null => write!(f, "NULL"),
            ScalarValue::Int64(v) => write!(f, "{v}"),
            ScalarValue::Float64(v) => write!(f, "{v:?}"),
            ScalarValue::Boolean(v) => write!(f, "{}", if *v { "TRUE" } else { "FALSE" }),
            ScalarValue::Text(v) => write!(f, "'{}'", v.replace('\'', "''")),
            ScalarValue::Decimal { value, scale, .. } => {
                write!(f, "{}", format_decimal(*value, *scale))
            }
        }
    }
}

/// Render an unscaled decimal value with `scale` fractional digits.
pub fn format_decimal(value: i128, scale: u8) -> String {
    let sign = if value < 0 { "-" } else { "" };
    let digits = value.unsigned_abs().to_string();
    let scale = scale as usize;
    if scale == 0 {
        return format!("{sign}{digits}");
    }
    let padded = format!("{digits:0>width$}", width = scale + 1);
    let (int_part, frac_part) = padded.split_at(padded.len() - scale);
    format!("{sign}{int_part}.{frac_part}")
}

fn pow10(exp: u8) -> Option<i128> {
    10i128.checked_pow(exp as u32)
}

/// Whether an unscaled decimal value has at most `precision` digits.
pub(crate) fn decimal_fits(value: i128, precision: u8) -> bool {
    pow10(precision).map_or(true, |limit| value.unsigned_abs() < limit.unsigned_abs())
}

/// Change the scale of an unscaled decimal value, rounding half away from zero
/// when digits are dropped. `None` on overflow.
pub(crate) fn rescale_decimal(value: i128, from_scale: u8, to_scale: u8) -> Option<i128> {
    if to_scale >= from_scale {
        value.checked_mul(pow10(to_scale - from_scale)?)
    } else {
        let divisor = pow10(from_scale - to_scale)?;
        let quotient = value / divisor;
        let remainder = value % divisor;
        if remainder.unsigned_abs() * 2 >= divisor.unsigned_abs() {
            Some(quotient + value.signum())
        } else {
            Some(quotient)
        }
    }
}

/// Convert an unscaled decimal to the nearest float.
pub(crate) fn decimal_to_f64(value: i128, scale: u8) -> f64 {
    value as f64 / 10f64.powi(scale as i32)
}

/// Downcast a dynamically typed array to its concrete type.
pub(crate) fn downcast_array<T: 'static>(array: &dyn Array) -> Result<&T> {
    array.as_any().downcast_ref::<T>().ok_or_else(|| {
        DbError::Internal(format!(
            "array of type {:?} could not be downcast to {}",
            array.data_type(),
            std::any::type_name::<T>()
        ))
    })
}

/// Cast an array to `to`, failing instead of producing nulls on overflow.
pub(crate) fn cast_array(array: &ArrayRef, to: &DataType) -> Result<ArrayRef> {
    let target = to.to_arrow();
    if array.data_type() == &target {
        return Ok(array.clone());
    }
    let numeric_source = DataType::from_arrow(array.data_type()).is_some_and(|t| t.is_numeric());
    let options = CastOptions {
        safe: false,
        ..Default::default()
    };
    cast_with_options(array.as_ref(), &target, &options).map_err(|e| {
        if numeric_source && to.is_numeric() {
            DbError::ArithmeticOverflow(e.to_string())
        } else {
            DbError::from(e)
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_decimal_validation() {
        assert!(DataType::decimal(10, 2).is_ok());
        assert!(DataType::decimal(0, 0).is_err());
        assert!(DataType::decimal(39, 0).is_err());
        assert!(DataType::decimal(4, 5).is_err());
    }

    #[test]
    fn test_arrow_mapping() {
        let dec = DataType::decimal(12, 3).unwrap();
        assert_eq!(dec.to_arrow(), ArrowType::Decimal128(12, 3));
        assert_eq!(DataType::from_arrow(&ArrowType::Utf8), Some(DataType::Text));
        assert_eq!(DataType::from_arrow(&ArrowType::Int32), None);
    }

    #[test]
    fn test_parse_decimal_literal() {
        assert_eq!(
            ScalarValue::parse_decimal("12.50"),
            Some(ScalarValue::Decimal {
                value: 1250,
                precision: 4,
                scale: 2
            })
        );
        assert_eq!(
            ScalarValue::parse_decimal("0.5"),
            Some(ScalarValue::Decimal {
                value: 5,
                precision: 1,
                scale: 1
            })
        );
        assert_eq!(ScalarValue::parse_decimal(&format!("1.{}", "0".repeat(40))), None);
    }

    #[test]
    fn test_format_decimal() {
        assert_eq!(format_decimal(1250, 2), "12.50");
        assert_eq!(format_decimal(-5, 2), "-0.05");
        assert_eq!(format_decimal(42, 0), "42");
    }

    #[test]
    fn test_rescale_decimal_rounds_half_away_from_zero() {
        assert_eq!(rescale_decimal(125, 2, 3), Some(1250));
        assert_eq!(rescale_decimal(125, 2, 1), Some(13));
        assert_eq!(rescale_decimal(-125, 2, 1), Some(-13));
        assert_eq!(rescale_decimal(124, 2, 1), Some(12));
        assert_eq!(rescale_decimal(i128::MAX, 0, 2), None);
        assert!(decimal_fits(999, 3));
        assert!(!decimal_fits(1000, 3));
    }

    #[test]
    fn test_iter_to_array() {
        let values = vec![ScalarValue::Int64(1), ScalarValue::Null];
        let array = ScalarValue::iter_to_array(&values, &DataType::Int64).unwrap();
        assert_eq!(array.len(), 2);
        assert_eq!(array.null_count(), 1);
        assert!(ScalarValue::iter_to_array(&values, &DataType::Text).is_err());
    }

    #[test]
    fn test_float_keys_normalized() {
        let mut set = HashSet::new();
        set.insert(ScalarValue::Float64(f64::NAN));
        set.insert(ScalarValue::Float64(-f64::NAN));
        set.insert(ScalarValue::Float64(1.5));
        set.insert(ScalarValue::Null);
        set.insert(ScalarValue::Null);
        assert_eq!(set.len(), 3);
    }

    #[test]
    fn test_to_array_casts_to_requested_type() {
        let array = ScalarValue::Int64(3).to_array(&DataType::Float64, 2).unwrap();
        assert_eq!(array.data_type(), &ArrowType::Float64);
        assert_eq!(
            ScalarValue::try_from_array(array.as_ref(), 1).unwrap(),
            ScalarValue::Float64(3.0)
        );

        let nulls = ScalarValue::Null.to_array(&DataType::Text, 3).unwrap();
        assert_eq!(nulls.null_count(), 3);
    }

    #[test]
    fn test_narrowing_decimal_cast_overflows() {
        let array = ScalarValue::Int64(123_456)
            .to_array(&DataType::Int64, 1)
            .unwrap();
        let err = cast_array(&array, &DataType::decimal(3, 0).unwrap()).unwrap_err();
        assert!(matches!(err, DbError::ArithmeticOverflow(_)));
    }
}
