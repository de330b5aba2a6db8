//! Reduction functions used by grouping and global aggregation.
//!
//! Every [`AggFunc`] is backed by an [`Accumulator`] with the classic
//! combine lifecycle:
//!
//! - `create` a fresh accumulator for a group,
//! - `add_input` one value at a time,
//! - `merge` a partial accumulator computed on another batch,
//! - `finish` into the output value.
//!
//! Partial accumulators built on different batches merge exactly, which lets
//! the runner aggregate batches independently (possibly in parallel) and fold
//! them in batch order afterwards. Float reductions keep their inputs in row
//! order and fold once in `finish`, so the result does not depend on how the
//! rows were split into batches.

use crate::dtype::DataType;
use crate::error::FrameError;
use crate::value::{GroupKey, Value};
use anyhow::{Result, bail};
use std::collections::HashSet;

/// A reduction from many values to one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AggFunc {
    /// Sum of non-null values; `0` for an empty or all-null group.
    Sum,
    Mean,
    /// Number of non-null values.
    Count,
    /// Number of rows, nulls included.
    Len,
    Min,
    Max,
    /// Sample standard deviation (ddof = 1).
    Std,
    /// Sample variance (ddof = 1).
    Var,
    Median,
    /// First value in row order, null or not.
    First,
    /// Last value in row order, null or not.
    Last,
    /// Number of distinct non-null values.
    NUnique,
}

impl AggFunc {
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Sum => "sum",
            Self::Mean => "mean",
            Self::Count => "count",
            Self::Len => "len",
            Self::Min => "min",
            Self::Max => "max",
            Self::Std => "std",
            Self::Var => "var",
            Self::Median => "median",
            Self::First => "first",
            Self::Last => "last",
            Self::NUnique => "n_unique",
        }
    }

    /// The output type for an input of type `input`.
    ///
    /// # Errors
    /// `Type` when the reduction is undefined for `input` (e.g. mean of strings).
    pub fn output_dtype(self, input: DataType) -> Result<DataType> {
        let numeric_like = input.is_numeric() || input == DataType::Boolean;
        Ok(match self {
            Self::Count | Self::Len | Self::NUnique => DataType::Int64,
            Self::First | Self::Last => input,
            Self::Min | Self::Max => {
                if input == DataType::Categorical {
                    DataType::Utf8
                } else {
                    input
                }
            }
            Self::Sum if numeric_like => {
                if input == DataType::Float64 {
                    DataType::Float64
                } else {
                    DataType::Int64
                }
            }
            Self::Mean | Self::Std | Self::Var | Self::Median if numeric_like => DataType::Float64,
            _ => bail!(FrameError::Type(format!("{} is not defined for {input}", self.name()))),
        })
    }

    /// A fresh accumulator for values of type `input`.
    #[must_use]
    pub fn create(self, input: DataType) -> Accumulator {
        match self {
            Self::Sum if input == DataType::Float64 => Accumulator::SumFloat(Vec::new()),
            Self::Sum => Accumulator::SumInt(0),
            Self::Mean => Accumulator::Mean(Vec::new()),
            Self::Count => Accumulator::Count(0),
            Self::Len => Accumulator::Len(0),
            Self::Min => Accumulator::Min(None),
            Self::Max => Accumulator::Max(None),
            Self::Std | Self::Var => Accumulator::Moments {
                values: Vec::new(),
                sqrt: self == Self::Std,
            },
            Self::Median => Accumulator::Median(Vec::new()),
            Self::First => Accumulator::First(None),
            Self::Last => Accumulator::Last(None),
            Self::NUnique => Accumulator::Distinct(HashSet::new()),
        }
    }
}

/// Partial state of one reduction over one group.
#[derive(Debug, Clone)]
pub enum Accumulator {
    SumInt(i64),
    SumFloat(Vec<f64>),
    Mean(Vec<f64>),
    Count(u64),
    Len(u64),
    Min(Option<Value>),
    Max(Option<Value>),
    /// Inputs for a single Welford pass at `finish`.
    Moments { values: Vec<f64>, sqrt: bool },
    Median(Vec<f64>),
    First(Option<Value>),
    Last(Option<Value>),
    Distinct(HashSet<GroupKey>),
}

fn numeric(v: &Value) -> Option<f64> {
    match v {
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        other => other.as_f64(),
    }
}

/// Left-to-right sum starting from `0.0`.
fn fold_sum(values: &[f64]) -> f64 {
    values.iter().fold(0.0, |acc, x| acc + x)
}

/// Welford's single-pass sample variance (ddof = 1); `None` below two values.
#[allow(clippy::cast_precision_loss)]
fn sample_variance(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let (mut mean, mut m2) = (0.0, 0.0);
    for (i, x) in values.iter().enumerate() {
        let delta = x - mean;
        mean += delta / (i + 1) as f64;
        m2 += delta * (x - mean);
    }
    Some(m2 / (values.len() - 1) as f64)
}

impl Accumulator {
    pub fn add_input(&mut self, v: Value) {
        match self {
            Self::Len(n) => *n += 1,
            Self::First(slot) => {
                if slot.is_none() {
                    *slot = Some(v);
                }
            }
            Self::Last(slot) => *slot = Some(v),
            _ if v.is_null() => {}
            Self::SumInt(acc) => match v {
                Value::Int(i) => *acc = acc.wrapping_add(i),
                Value::Bool(b) => *acc += i64::from(b),
                _ => {}
            },
            Self::SumFloat(values) | Self::Mean(values) | Self::Moments { values, .. } => {
                if let Some(x) = numeric(&v) {
                    values.push(x);
                }
            }
            Self::Count(n) => *n += 1,
            Self::Min(slot) => {
                if slot.as_ref().is_none_or(|cur| v.total_cmp(cur).is_lt()) {
                    *slot = Some(v);
                }
            }
            Self::Max(slot) => {
                if slot.as_ref().is_none_or(|cur| v.total_cmp(cur).is_gt()) {
                    *slot = Some(v);
                }
            }
            Self::Median(values) => {
                if let Some(x) = numeric(&v) {
                    values.push(x);
                }
            }
            Self::Distinct(seen) => {
                seen.insert(GroupKey::from(v));
            }
        }
    }

    /// Fold `other`, which saw rows that come *after* this accumulator's rows.
    pub fn merge(&mut self, other: Accumulator) {
        match (self, other) {
            (Self::SumInt(a), Self::SumInt(b)) => *a = a.wrapping_add(b),
            (Self::SumFloat(a), Self::SumFloat(b))
            | (Self::Mean(a), Self::Mean(b))
            | (Self::Moments { values: a, .. }, Self::Moments { values: b, .. })
            | (Self::Median(a), Self::Median(b)) => a.extend(b),
            (Self::Count(a), Self::Count(b)) | (Self::Len(a), Self::Len(b)) => *a += b,
            (Self::Min(a), Self::Min(b)) => {
                if let Some(b) = b
                    && a.as_ref().is_none_or(|cur| b.total_cmp(cur).is_lt())
                {
                    *a = Some(b);
                }
            }
            (Self::Max(a), Self::Max(b)) => {
                if let Some(b) = b
                    && a.as_ref().is_none_or(|cur| b.total_cmp(cur).is_gt())
                {
                    *a = Some(b);
                }
            }
            (Self::First(a), Self::First(b)) => {
                if a.is_none() {
                    *a = b;
                }
            }
            (Self::Last(a), Self::Last(b)) => {
                if b.is_some() {
                    *a = b;
                }
            }
            (Self::Distinct(a), Self::Distinct(b)) => a.extend(b),
            (a, b) => debug_assert!(false, "merging mismatched accumulators {a:?} / {b:?}"),
        }
    }

    #[must_use]
    pub fn finish(self) -> Value {
        match self {
            Self::SumInt(v) => Value::Int(v),
            Self::SumFloat(values) => Value::Float(fold_sum(&values)),
            #[allow(clippy::cast_precision_loss)]
            Self::Mean(values) => {
                if values.is_empty() {
                    Value::Null
                } else {
                    Value::Float(fold_sum(&values) / values.len() as f64)
                }
            }
            Self::Count(n) | Self::Len(n) => Value::Int(i64::try_from(n).unwrap_or(i64::MAX)),
            Self::Min(v) | Self::Max(v) => v.unwrap_or(Value::Null),
            Self::First(v) | Self::Last(v) => v.unwrap_or(Value::Null),
            Self::Moments { values, sqrt } => match sample_variance(&values) {
                Some(var) => Value::Float(if sqrt { var.sqrt() } else { var }),
                None => Value::Null,
            },
            Self::Median(mut values) => {
                if values.is_empty() {
                    return Value::Null;
                }
                values.sort_by(f64::total_cmp);
                let mid = values.len() / 2;
                if values.len() % 2 == 1 {
                    Value::Float(values[mid])
                } else {
                    Value::Float(f64::midpoint(values[mid - 1], values[mid]))
                }
            }
            Self::Distinct(seen) => Value::Int(i64::try_from(seen.len()).unwrap_or(i64::MAX)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(func: AggFunc, input: DataType, values: Vec<Value>) -> Value {
        let mut acc = func.create(input);
        for v in values {
            acc.add_input(v);
        }
        acc.finish()
    }

    #[test]
    fn sum_ignores_nulls_and_defaults_to_zero() {
        assert_eq!(
            run(AggFunc::Sum, DataType::Int64, vec![Value::Int(1), Value::Null, Value::Int(4)]),
            Value::Int(5)
        );
        assert_eq!(run(AggFunc::Sum, DataType::Int64, vec![Value::Null]), Value::Int(0));
        assert_eq!(run(AggFunc::Mean, DataType::Int64, vec![Value::Null]), Value::Null);
    }

    #[test]
    fn split_float_reductions_merge_bit_for_bit() {
        let xs: Vec<f64> = (0..97).map(|i| f64::from(i) * 0.1 + 1e-3 / f64::from(i + 1)).collect();
        for func in [AggFunc::Sum, AggFunc::Mean, AggFunc::Var, AggFunc::Std] {
            let whole = run(func, DataType::Float64, xs.iter().map(|x| Value::Float(*x)).collect());
            for split in [1, 7, 50, 96] {
                let mut a = func.create(DataType::Float64);
                let mut b = func.create(DataType::Float64);
                for x in &xs[..split] {
                    a.add_input(Value::Float(*x));
                }
                for x in &xs[split..] {
                    b.add_input(Value::Float(*x));
                }
                a.merge(b);
                assert_eq!(a.finish(), whole, "{} split at {split}", func.name());
            }
        }
    }

    #[test]
    fn sample_variance_of_a_known_series() {
        let xs = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        let var = sample_variance(&xs).unwrap_or(f64::NAN);
        assert!((var - 32.0 / 7.0).abs() < 1e-12);
        assert_eq!(sample_variance(&[1.0]), None);
    }

    #[test]
    fn first_and_last_are_positional() {
        let mut first = AggFunc::First.create(DataType::Int64);
        first.add_input(Value::Null);
        first.add_input(Value::Int(3));
        assert_eq!(first.finish(), Value::Null);

        let mut left = AggFunc::Last.create(DataType::Int64);
        left.add_input(Value::Int(1));
        let mut right = AggFunc::Last.create(DataType::Int64);
        right.add_input(Value::Int(2));
        left.merge(right);
        assert_eq!(left.finish(), Value::Int(2));
    }

    #[test]
    fn median_even_and_odd() {
        let vals = |xs: &[i64]| xs.iter().map(|x| Value::Int(*x)).collect::<Vec<_>>();
        assert_eq!(run(AggFunc::Median, DataType::Int64, vals(&[3, 1, 2])), Value::Float(2.0));
        assert_eq!(run(AggFunc::Median, DataType::Int64, vals(&[4, 1, 2, 3])), Value::Float(2.5));
    }

    #[test]
    fn mean_of_strings_rejected() {
        assert!(AggFunc::Mean.output_dtype(DataType::Utf8).is_err());
        assert_eq!(AggFunc::Min.output_dtype(DataType::Utf8).ok(), Some(DataType::Utf8));
    }
}
