//! Scalar values and hashable grouping keys.

use crate::dtype::DataType;
use chrono::NaiveDate;
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// A single cell value. `Null` is a valid value of every [`DataType`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Int(i64),
    Float(f64),
    Str(String),
    Bool(bool),
    Date(NaiveDate),
}

impl Value {
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// The natural type of this value; `None` for `Null`.
    #[must_use]
    pub fn dtype(&self) -> Option<DataType> {
        match self {
            Self::Null => None,
            Self::Int(_) => Some(DataType::Int64),
            Self::Float(_) => Some(DataType::Float64),
            Self::Str(_) => Some(DataType::Utf8),
            Self::Bool(_) => Some(DataType::Boolean),
            Self::Date(_) => Some(DataType::Date),
        }
    }

    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            #[allow(clippy::cast_precision_loss)]
            Self::Int(v) => Some(*v as f64),
            Self::Float(v) => Some(*v),
            _ => None,
        }
    }

    /// Total order used by sorting and `min`/`max`: nulls last, numbers
    /// compared across int/float, `NaN` greater than every other float.
    #[must_use]
    pub fn total_cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Null, Self::Null) => Ordering::Equal,
            (Self::Null, _) => Ordering::Greater,
            (_, Self::Null) => Ordering::Less,
            (Self::Int(a), Self::Int(b)) => a.cmp(b),
            (Self::Str(a), Self::Str(b)) => a.cmp(b),
            (Self::Bool(a), Self::Bool(b)) => a.cmp(b),
            (Self::Date(a), Self::Date(b)) => a.cmp(b),
            (a, b) => match (a.as_f64(), b.as_f64()) {
                (Some(x), Some(y)) => x.total_cmp(&y),
                _ => rank(a).cmp(&rank(b)),
            },
        }
    }
}

fn rank(v: &Value) -> u8 {
    match v {
        Value::Bool(_) => 0,
        Value::Int(_) | Value::Float(_) => 1,
        Value::Date(_) => 2,
        Value::Str(_) => 3,
        Value::Null => 4,
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v:?}"),
            Self::Str(v) => f.write_str(v),
            Self::Bool(v) => write!(f, "{v}"),
            Self::Date(v) => write!(f, "{}", v.format("%Y-%m-%d")),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Str(v)
    }
}

impl From<NaiveDate> for Value {
    fn from(v: NaiveDate) -> Self {
        Self::Date(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

/// Hashable projection of a [`Value`] used to partition rows by key.
///
/// Floats hash by bit pattern through `OrderedFloat`, so every `NaN` lands in
/// the same group; `Null` keys form a group of their own.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum GroupKey {
    Null,
    Int(i64),
    Float(OrderedFloat<f64>),
    Str(String),
    Bool(bool),
    Date(NaiveDate),
}

impl From<Value> for GroupKey {
    fn from(v: Value) -> Self {
        match v {
            Value::Null => Self::Null,
            Value::Int(i) => Self::Int(i),
            Value::Float(x) => Self::Float(OrderedFloat(x)),
            Value::Str(s) => Self::Str(s),
            Value::Bool(b) => Self::Bool(b),
            Value::Date(d) => Self::Date(d),
        }
    }
}

impl From<GroupKey> for Value {
    fn from(k: GroupKey) -> Self {
        match k {
            GroupKey::Null => Self::Null,
            GroupKey::Int(i) => Self::Int(i),
            GroupKey::Float(x) => Self::Float(x.into_inner()),
            GroupKey::Str(s) => Self::Str(s),
            GroupKey::Bool(b) => Self::Bool(b),
            GroupKey::Date(d) => Self::Date(d),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nulls_sort_last() {
        let mut v = vec![Value::Null, Value::Int(3), Value::Float(1.5), Value::Int(-1)];
        v.sort_by(Value::total_cmp);
        assert_eq!(v, vec![Value::Int(-1), Value::Float(1.5), Value::Int(3), Value::Null]);
    }

    #[test]
    fn nan_keys_group_together() {
        let a = GroupKey::from(Value::Float(f64::NAN));
        let b = GroupKey::from(Value::Float(f64::NAN));
        assert_eq!(a, b);
        assert_ne!(GroupKey::from(Value::Null), GroupKey::from(Value::Int(0)));
    }
}
