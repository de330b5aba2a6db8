//! Semantic column types, fields, and schemas.

use crate::error::FrameError;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// The semantic type of every value in a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    Int64,
    Float64,
    Utf8,
    Boolean,
    /// Calendar date without a time zone.
    Date,
    /// Dictionary-encoded strings.
    Categorical,
}

impl DataType {
    #[must_use]
    pub fn is_numeric(self) -> bool {
        matches!(self, Self::Int64 | Self::Float64)
    }

    /// Types whose values are string-like.
    #[must_use]
    pub fn is_textual(self) -> bool {
        matches!(self, Self::Utf8 | Self::Categorical)
    }

    /// The common supertype for arithmetic and comparisons, if one exists.
    #[must_use]
    pub fn supertype(self, other: Self) -> Option<Self> {
        use DataType::{Categorical, Float64, Int64, Utf8};
        match (self, other) {
            (a, b) if a == b => Some(a),
            (Int64, Float64) | (Float64, Int64) => Some(Float64),
            (Utf8, Categorical) | (Categorical, Utf8) => Some(Utf8),
            _ => None,
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Int64 => "i64",
            Self::Float64 => "f64",
            Self::Utf8 => "str",
            Self::Boolean => "bool",
            Self::Date => "date",
            Self::Categorical => "cat",
        };
        f.write_str(s)
    }
}

/// A named, typed column slot in a [`Schema`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub dtype: DataType,
    #[serde(default = "default_nullable")]
    pub nullable: bool,
}

fn default_nullable() -> bool {
    true
}

impl Field {
    pub fn new(name: impl Into<String>, dtype: DataType) -> Self {
        Self {
            name: name.into(),
            dtype,
            nullable: true,
        }
    }

    /// Declare that the column must never contain nulls.
    #[must_use]
    pub fn non_null(mut self) -> Self {
        self.nullable = false;
        self
    }
}

/// Ordered list of uniquely named fields.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Schema {
    fields: Vec<Field>,
}

impl Schema {
    /// Build a schema, rejecting duplicate field names.
    ///
    /// # Errors
    /// `SchemaMismatch` when two fields share a name.
    pub fn new(fields: Vec<Field>) -> Result<Self> {
        let mut seen = HashSet::new();
        for f in &fields {
            if !seen.insert(f.name.as_str()) {
                return Err(FrameError::SchemaMismatch(format!(
                    "duplicate column name '{}'",
                    f.name
                ))
                .into());
            }
        }
        Ok(Self { fields })
    }

    /// Convenience constructor from `(name, dtype)` pairs.
    ///
    /// # Errors
    /// See [`Schema::new`].
    pub fn from_pairs<S: Into<String>>(
        pairs: impl IntoIterator<Item = (S, DataType)>,
    ) -> Result<Self> {
        Self::new(pairs.into_iter().map(|(n, t)| Field::new(n, t)).collect())
    }

    #[must_use]
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    #[must_use]
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    /// Look up a field by name.
    ///
    /// # Errors
    /// `UnknownColumn` listing the available names.
    pub fn field(&self, name: &str) -> Result<&Field> {
        self.fields
            .iter()
            .find(|f| f.name == name)
            .ok_or_else(|| FrameError::unknown_column(name, &self.names()).into())
    }

    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.name.as_str()).collect()
    }

    /// Append a field, or replace the one with the same name in place.
    pub(crate) fn upsert(&mut self, field: Field) {
        match self.index_of(&field.name) {
            Some(i) => self.fields[i] = field,
            None => self.fields.push(field),
        }
    }

    pub(crate) fn remove(&mut self, name: &str) -> Option<Field> {
        self.index_of(name).map(|i| self.fields.remove(i))
    }

    pub(crate) fn rename(&mut self, from: &str, to: &str) -> Result<()> {
        let i = self
            .index_of(from)
            .ok_or_else(|| FrameError::unknown_column(from, &self.names()))?;
        if from != to && self.index_of(to).is_some() {
            return Err(
                FrameError::SchemaMismatch(format!("rename target '{to}' already exists")).into(),
            );
        }
        self.fields[i].name = to.to_string();
        Ok(())
    }
}

impl fmt::Display for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .fields
            .iter()
            .map(|fld| {
                let null = if fld.nullable { "" } else { " not null" };
                format!("{}: {}{null}", fld.name, fld.dtype)
            })
            .collect();
        write!(f, "{{{}}}", parts.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn supertypes() {
        assert_eq!(DataType::Int64.supertype(DataType::Float64), Some(DataType::Float64));
        assert_eq!(DataType::Utf8.supertype(DataType::Categorical), Some(DataType::Utf8));
        assert_eq!(DataType::Date.supertype(DataType::Int64), None);
    }

    #[test]
    fn duplicate_names_rejected() {
        let err = Schema::from_pairs([("a", DataType::Int64), ("a", DataType::Utf8)]).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<FrameError>(),
            Some(FrameError::SchemaMismatch(_))
        ));
    }

    #[test]
    fn rename_collision() {
        let mut s = Schema::from_pairs([("a", DataType::Int64), ("b", DataType::Utf8)]).unwrap();
        assert!(s.rename("a", "b").is_err());
        s.rename("a", "c").unwrap();
        assert_eq!(s.names(), vec!["c", "b"]);
    }
}
