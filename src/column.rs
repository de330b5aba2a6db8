//! Typed, nullable column buffers and the kernels that reshape them.
//!
//! A [`Column`] owns one [`ColumnData`] variant per semantic type; each stores
//! `Option<T>` cells so null positions survive every kernel untouched.
//! Categorical columns keep `u32` codes into a shared dictionary.

use crate::dtype::DataType;
use crate::error::FrameError;
use crate::value::Value;
use anyhow::Result;
use chrono::NaiveDate;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

/// Day zero for integer <-> date conversions.
pub(crate) fn epoch() -> NaiveDate {
    NaiveDate::from_ymd_opt(1970, 1, 1).unwrap_or_default()
}

pub(crate) fn date_to_days(d: NaiveDate) -> i64 {
    (d - epoch()).num_days()
}

pub(crate) fn days_to_date(days: i64) -> Option<NaiveDate> {
    epoch().checked_add_signed(chrono::Duration::try_days(days)?)
}

/// Physical storage of a column.
#[derive(Debug, Clone)]
pub enum ColumnData {
    Int64(Vec<Option<i64>>),
    Float64(Vec<Option<f64>>),
    Utf8(Vec<Option<String>>),
    Boolean(Vec<Option<bool>>),
    Date(Vec<Option<NaiveDate>>),
    Categorical {
        codes: Vec<Option<u32>>,
        categories: Arc<Vec<String>>,
    },
}

/// A named sequence of values of one [`DataType`].
#[derive(Debug, Clone)]
pub struct Column {
    name: String,
    data: ColumnData,
}

macro_rules! typed_ctor {
    ($fn_name:ident, $t:ty, $variant:ident) => {
        #[doc = concat!("Build a `", stringify!($variant), "` column.")]
        pub fn $fn_name(name: impl Into<String>, values: Vec<Option<$t>>) -> Self {
            Self::new(name, ColumnData::$variant(values))
        }
    };
}

impl Column {
    pub fn new(name: impl Into<String>, data: ColumnData) -> Self {
        Self {
            name: name.into(),
            data,
        }
    }

    typed_ctor!(from_i64, i64, Int64);
    typed_ctor!(from_f64, f64, Float64);
    typed_ctor!(from_bool, bool, Boolean);
    typed_ctor!(from_dates, NaiveDate, Date);
    typed_ctor!(from_strings, String, Utf8);

    /// Build a `Utf8` column from borrowed strings.
    pub fn from_strs(name: impl Into<String>, values: &[Option<&str>]) -> Self {
        Self::from_strings(name, values.iter().map(|v| v.map(str::to_string)).collect())
    }

    /// Build a `Categorical` column, assigning codes in order of first appearance.
    pub fn categorical(name: impl Into<String>, values: &[Option<&str>]) -> Self {
        let mut lookup: HashMap<&str, u32> = HashMap::new();
        let mut categories = Vec::new();
        let codes = values
            .iter()
            .map(|v| {
                v.map(|s| {
                    *lookup.entry(s).or_insert_with(|| {
                        categories.push(s.to_string());
                        u32::try_from(categories.len() - 1).unwrap_or(u32::MAX)
                    })
                })
            })
            .collect();
        Self::new(
            name,
            ColumnData::Categorical {
                codes,
                categories: Arc::new(categories),
            },
        )
    }

    /// A column of `len` nulls.
    pub fn full_null(name: impl Into<String>, dtype: DataType, len: usize) -> Self {
        let data = match dtype {
            DataType::Int64 => ColumnData::Int64(vec![None; len]),
            DataType::Float64 => ColumnData::Float64(vec![None; len]),
            DataType::Utf8 => ColumnData::Utf8(vec![None; len]),
            DataType::Boolean => ColumnData::Boolean(vec![None; len]),
            DataType::Date => ColumnData::Date(vec![None; len]),
            DataType::Categorical => ColumnData::Categorical {
                codes: vec![None; len],
                categories: Arc::new(Vec::new()),
            },
        };
        Self::new(name, data)
    }

    /// Build a column of `dtype` from dynamic values.
    ///
    /// # Errors
    /// `Type` if a non-null value does not fit `dtype` (ints widen to floats).
    pub fn from_values(
        name: impl Into<String>,
        dtype: DataType,
        values: impl IntoIterator<Item = Value>,
    ) -> Result<Self> {
        let iter = values.into_iter();
        let mut b = ColumnBuilder::new(dtype, iter.size_hint().0);
        for v in iter {
            b.push(v)?;
        }
        Ok(b.finish(name))
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn data(&self) -> &ColumnData {
        &self.data
    }

    pub(crate) fn into_data(self) -> ColumnData {
        self.data
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    #[must_use]
    pub fn dtype(&self) -> DataType {
        match &self.data {
            ColumnData::Int64(_) => DataType::Int64,
            ColumnData::Float64(_) => DataType::Float64,
            ColumnData::Utf8(_) => DataType::Utf8,
            ColumnData::Boolean(_) => DataType::Boolean,
            ColumnData::Date(_) => DataType::Date,
            ColumnData::Categorical { .. } => DataType::Categorical,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        match &self.data {
            ColumnData::Int64(v) => v.len(),
            ColumnData::Float64(v) => v.len(),
            ColumnData::Utf8(v) => v.len(),
            ColumnData::Boolean(v) => v.len(),
            ColumnData::Date(v) => v.len(),
            ColumnData::Categorical { codes, .. } => codes.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn is_null(&self, i: usize) -> bool {
        match &self.data {
            ColumnData::Int64(v) => v[i].is_none(),
            ColumnData::Float64(v) => v[i].is_none(),
            ColumnData::Utf8(v) => v[i].is_none(),
            ColumnData::Boolean(v) => v[i].is_none(),
            ColumnData::Date(v) => v[i].is_none(),
            ColumnData::Categorical { codes, .. } => codes[i].is_none(),
        }
    }

    #[must_use]
    pub fn null_count(&self) -> usize {
        (0..self.len()).filter(|&i| self.is_null(i)).count()
    }

    /// The value at row `i`. Categorical cells come back as `Value::Str`.
    ///
    /// # Panics
    /// If `i` is out of bounds.
    #[must_use]
    pub fn get(&self, i: usize) -> Value {
        match &self.data {
            ColumnData::Int64(v) => v[i].into(),
            ColumnData::Float64(v) => v[i].into(),
            ColumnData::Utf8(v) => v[i].clone().into(),
            ColumnData::Boolean(v) => v[i].into(),
            ColumnData::Date(v) => v[i].into(),
            ColumnData::Categorical { codes, categories } => codes[i]
                .and_then(|c| categories.get(c as usize).cloned())
                .into(),
        }
    }

    /// Borrowed string at row `i` for textual columns.
    pub(crate) fn str_at(&self, i: usize) -> Option<&str> {
        match &self.data {
            ColumnData::Utf8(v) => v[i].as_deref(),
            ColumnData::Categorical { codes, categories } => {
                codes[i].and_then(|c| categories.get(c as usize)).map(String::as_str)
            }
            _ => None,
        }
    }

    pub fn values(&self) -> impl Iterator<Item = Value> + '_ {
        (0..self.len()).map(|i| self.get(i))
    }

    /// Gather rows by index; indices may repeat.
    #[must_use]
    pub fn take(&self, idx: &[usize]) -> Self {
        fn pick<T: Clone>(v: &[Option<T>], idx: &[usize]) -> Vec<Option<T>> {
            idx.iter().map(|&i| v[i].clone()).collect()
        }
        let data = match &self.data {
            ColumnData::Int64(v) => ColumnData::Int64(pick(v, idx)),
            ColumnData::Float64(v) => ColumnData::Float64(pick(v, idx)),
            ColumnData::Utf8(v) => ColumnData::Utf8(pick(v, idx)),
            ColumnData::Boolean(v) => ColumnData::Boolean(pick(v, idx)),
            ColumnData::Date(v) => ColumnData::Date(pick(v, idx)),
            ColumnData::Categorical { codes, categories } => ColumnData::Categorical {
                codes: pick(codes, idx),
                categories: Arc::clone(categories),
            },
        };
        Self::new(self.name.clone(), data)
    }

    /// Gather rows where `None` produces a null cell (outer joins).
    #[must_use]
    pub fn take_opt(&self, idx: &[Option<usize>]) -> Self {
        fn pick<T: Clone>(v: &[Option<T>], idx: &[Option<usize>]) -> Vec<Option<T>> {
            idx.iter().map(|i| i.and_then(|i| v[i].clone())).collect()
        }
        let data = match &self.data {
            ColumnData::Int64(v) => ColumnData::Int64(pick(v, idx)),
            ColumnData::Float64(v) => ColumnData::Float64(pick(v, idx)),
            ColumnData::Utf8(v) => ColumnData::Utf8(pick(v, idx)),
            ColumnData::Boolean(v) => ColumnData::Boolean(pick(v, idx)),
            ColumnData::Date(v) => ColumnData::Date(pick(v, idx)),
            ColumnData::Categorical { codes, categories } => ColumnData::Categorical {
                codes: pick(codes, idx),
                categories: Arc::clone(categories),
            },
        };
        Self::new(self.name.clone(), data)
    }

    /// Keep rows whose mask entry is `true`.
    #[must_use]
    pub fn filter(&self, mask: &[bool]) -> Self {
        let idx: Vec<usize> = mask
            .iter()
            .enumerate()
            .filter_map(|(i, keep)| keep.then_some(i))
            .collect();
        self.take(&idx)
    }

    /// Rows `[offset, offset + len)`, clamped to the column length.
    #[must_use]
    pub fn slice(&self, offset: usize, len: usize) -> Self {
        let start = offset.min(self.len());
        let end = start.saturating_add(len).min(self.len());
        let idx: Vec<usize> = (start..end).collect();
        self.take(&idx)
    }

    /// Stack the rows of `parts` in order; the result takes the first part's name.
    ///
    /// # Errors
    /// `SchemaMismatch` if any column has a different type.
    pub fn concat(parts: &[&Column]) -> Result<Self> {
        let Some(first) = parts.first() else {
            return Err(FrameError::SchemaMismatch("cannot concatenate zero columns".into()).into());
        };
        let dtype = first.dtype();
        if let Some(bad) = parts.iter().find(|c| c.dtype() != dtype) {
            return Err(FrameError::SchemaMismatch(format!(
                "column '{}' has type {} but {} was expected",
                bad.name,
                bad.dtype(),
                dtype
            ))
            .into());
        }
        if dtype == DataType::Categorical {
            let strs: Vec<Option<&str>> = parts
                .iter()
                .flat_map(|c| (0..c.len()).map(move |i| c.str_at(i)))
                .collect();
            return Ok(Self::categorical(first.name.clone(), &strs));
        }
        let mut b = ColumnBuilder::new(dtype, parts.iter().map(|c| c.len()).sum());
        for c in parts {
            for v in c.values() {
                b.push(v)?;
            }
        }
        Ok(b.finish(first.name.clone()))
    }

    /// Convert to another type. Non-strict casts turn unconvertible values into
    /// nulls; strict casts fail instead.
    ///
    /// # Errors
    /// `Type` for an unsupported conversion, or for a failed value in strict mode.
    pub fn cast(&self, to: DataType, strict: bool) -> Result<Self> {
        if self.dtype() == to {
            return Ok(self.clone());
        }
        if to == DataType::Categorical {
            let as_text = self.cast(DataType::Utf8, strict)?;
            let strs: Vec<Option<&str>> = (0..as_text.len()).map(|i| as_text.str_at(i)).collect();
            return Ok(Self::categorical(self.name.clone(), &strs));
        }
        let mut b = ColumnBuilder::new(to, self.len());
        let mut lost = 0usize;
        for (row, v) in self.values().enumerate() {
            let exact = !(strict && is_fractional(&v, to));
            let out = match cast_value(&v, to).filter(|_| exact) {
                Some(out) => out,
                None if strict => {
                    return Err(FrameError::Type(format!(
                        "cannot cast value '{v}' in column '{}' (row {row}) to {to}",
                        self.name
                    ))
                    .into());
                }
                None => {
                    lost += 1;
                    Value::Null
                }
            };
            b.push(out)?;
        }
        if lost > 0 {
            warn!(
                column = %self.name,
                from = %self.dtype(),
                to = %to,
                count = lost,
                "values not representable in the target type became null"
            );
        }
        Ok(b.finish(self.name.clone()))
    }

    /// Logical equality of values (categoricals compared as strings, floats
    /// compared by total order so `NaN == NaN`).
    #[must_use]
    pub fn values_equal(&self, other: &Self) -> bool {
        if self.len() != other.len() || self.dtype() != other.dtype() {
            return false;
        }
        match (&self.data, &other.data) {
            (ColumnData::Float64(a), ColumnData::Float64(b)) => {
                a.iter().zip(b).all(|(x, y)| match (x, y) {
                    (Some(x), Some(y)) => x.total_cmp(y).is_eq(),
                    (None, None) => true,
                    _ => false,
                })
            }
            _ => (0..self.len()).all(|i| self.get(i) == other.get(i)),
        }
    }
}

impl PartialEq for Column {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.values_equal(other)
    }
}

/// A float headed for an integer column that would lose its fractional part.
fn is_fractional(v: &Value, to: DataType) -> bool {
    matches!((v, to), (Value::Float(x), DataType::Int64) if x.fract() != 0.0)
}

/// Convert one value to `to`; `None` when it cannot be represented. Floats
/// truncate toward zero on the way to `Int64`.
pub(crate) fn cast_value(v: &Value, to: DataType) -> Option<Value> {
    use DataType as T;
    let out = match (v, to) {
        (Value::Null, _) => Value::Null,
        (Value::Int(i), T::Int64) => Value::Int(*i),
        #[allow(clippy::cast_precision_loss)]
        (Value::Int(i), T::Float64) => Value::Float(*i as f64),
        (Value::Int(i), T::Boolean) => Value::Bool(*i != 0),
        (Value::Int(i), T::Date) => Value::Date(days_to_date(*i)?),
        (Value::Float(x), T::Int64) => {
            #[allow(clippy::cast_precision_loss)]
            let in_range = x.is_finite() && *x >= i64::MIN as f64 && *x <= i64::MAX as f64;
            if !in_range {
                return None;
            }
            #[allow(clippy::cast_possible_truncation)]
            let truncated = x.trunc() as i64;
            Value::Int(truncated)
        }
        (Value::Float(x), T::Float64) => Value::Float(*x),
        (Value::Float(x), T::Boolean) => Value::Bool(*x != 0.0),
        (Value::Bool(b), T::Int64) => Value::Int(i64::from(*b)),
        (Value::Bool(b), T::Float64) => Value::Float(if *b { 1.0 } else { 0.0 }),
        (Value::Bool(b), T::Boolean) => Value::Bool(*b),
        (Value::Date(d), T::Date) => Value::Date(*d),
        (Value::Date(d), T::Int64) => Value::Int(date_to_days(*d)),
        (Value::Str(s), T::Int64) => Value::Int(s.trim().parse().ok()?),
        (Value::Str(s), T::Float64) => Value::Float(s.trim().parse().ok()?),
        (Value::Str(s), T::Boolean) => Value::Bool(parse_bool(s)?),
        (Value::Str(s), T::Date) => Value::Date(parse_date(s)?),
        (other, T::Utf8 | T::Categorical) => Value::Str(other.to_string()),
        _ => return None,
    };
    Some(out)
}

pub(crate) fn parse_bool(s: &str) -> Option<bool> {
    let s = s.trim();
    if s.eq_ignore_ascii_case("true") {
        Some(true)
    } else if s.eq_ignore_ascii_case("false") {
        Some(false)
    } else {
        None
    }
}

pub(crate) fn parse_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").ok()
}

/// Incremental builder for a column of known type.
pub struct ColumnBuilder {
    data: ColumnData,
    lookup: HashMap<String, u32>,
}

impl ColumnBuilder {
    #[must_use]
    pub fn new(dtype: DataType, capacity: usize) -> Self {
        let data = match dtype {
            DataType::Int64 => ColumnData::Int64(Vec::with_capacity(capacity)),
            DataType::Float64 => ColumnData::Float64(Vec::with_capacity(capacity)),
            DataType::Utf8 => ColumnData::Utf8(Vec::with_capacity(capacity)),
            DataType::Boolean => ColumnData::Boolean(Vec::with_capacity(capacity)),
            DataType::Date => ColumnData::Date(Vec::with_capacity(capacity)),
            DataType::Categorical => ColumnData::Categorical {
                codes: Vec::with_capacity(capacity),
                categories: Arc::new(Vec::new()),
            },
        };
        Self {
            data,
            lookup: HashMap::new(),
        }
    }

    /// Append one value.
    ///
    /// # Errors
    /// `Type` if the value does not belong to the builder's type.
    pub fn push(&mut self, v: Value) -> Result<()> {
        match (&mut self.data, v) {
            (ColumnData::Int64(c), Value::Null) => c.push(None),
            (ColumnData::Float64(c), Value::Null) => c.push(None),
            (ColumnData::Utf8(c), Value::Null) => c.push(None),
            (ColumnData::Boolean(c), Value::Null) => c.push(None),
            (ColumnData::Date(c), Value::Null) => c.push(None),
            (ColumnData::Categorical { codes, .. }, Value::Null) => codes.push(None),
            (ColumnData::Int64(c), Value::Int(i)) => c.push(Some(i)),
            (ColumnData::Float64(c), Value::Float(x)) => c.push(Some(x)),
            #[allow(clippy::cast_precision_loss)]
            (ColumnData::Float64(c), Value::Int(i)) => c.push(Some(i as f64)),
            (ColumnData::Utf8(c), Value::Str(s)) => c.push(Some(s)),
            (ColumnData::Boolean(c), Value::Bool(b)) => c.push(Some(b)),
            (ColumnData::Date(c), Value::Date(d)) => c.push(Some(d)),
            (ColumnData::Categorical { codes, categories }, Value::Str(s)) => {
                let next = u32::try_from(self.lookup.len()).unwrap_or(u32::MAX);
                let code = *self.lookup.entry(s.clone()).or_insert_with(|| {
                    Arc::make_mut(categories).push(s);
                    next
                });
                codes.push(Some(code));
            }
            (data, v) => {
                let dtype = Column::new("", data.clone()).dtype();
                return Err(
                    FrameError::Type(format!("value '{v}' does not fit a {dtype} column")).into(),
                );
            }
        }
        Ok(())
    }

    #[must_use]
    pub fn finish(self, name: impl Into<String>) -> Column {
        Column::new(name, self.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn categorical_codes_follow_first_appearance() {
        let c = Column::categorical("t", &[Some("b"), Some("a"), None, Some("b")]);
        let ColumnData::Categorical { codes, categories } = c.data() else {
            panic!("expected categorical");
        };
        assert_eq!(codes, &vec![Some(0), Some(1), None, Some(0)]);
        assert_eq!(categories.as_slice(), ["b".to_string(), "a".to_string()]);
        assert_eq!(c.get(3), Value::Str("b".into()));
    }

    #[test]
    fn non_strict_cast_nulls_garbage() -> Result<()> {
        let c = Column::from_strs("x", &[Some("1"), Some("oops"), None]);
        let out = c.cast(DataType::Int64, false)?;
        assert_eq!(out, Column::from_i64("x", vec![Some(1), None, None]));
        assert!(c.cast(DataType::Int64, true).is_err());
        Ok(())
    }

    #[test]
    fn concat_merges_categories() -> Result<()> {
        let a = Column::categorical("t", &[Some("x")]);
        let b = Column::categorical("t", &[Some("y"), Some("x")]);
        let c = Column::concat(&[&a, &b])?;
        assert_eq!(c.values().collect::<Vec<_>>(), vec!["x".into(), "y".into(), "x".into()]);
        Ok(())
    }

    #[test]
    fn nan_equals_nan_in_value_equality() {
        let a = Column::from_f64("f", vec![Some(f64::NAN), None]);
        assert_eq!(a, a.clone());
    }
}
