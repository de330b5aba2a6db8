//! The in-memory [`Table`] and its eager API.
//!
//! Every method here executes immediately and returns a new table; the input
//! is never modified. The same stages can be accumulated lazily through
//! [`Table::lazy`].

use crate::column::Column;
use crate::dtype::{Field, Schema};
use crate::error::FrameError;
use crate::expr::Expr;
use crate::lazy::LazyFrame;
use crate::ops;
use crate::ops::join::JoinType;
use crate::value::Value;
use anyhow::Result;
use std::collections::HashSet;
use std::fmt;

/// Rows shown by `Display` before eliding the middle.
const PREVIEW_ROWS: usize = 10;

/// Ordered, uniquely named, equal-length columns.
#[derive(Debug, Clone, Default)]
pub struct Table {
    columns: Vec<Column>,
    height: usize,
}

impl Table {
    /// Assemble a table.
    ///
    /// # Errors
    /// `SchemaMismatch` on duplicate column names or unequal column lengths.
    pub fn new(columns: Vec<Column>) -> Result<Self> {
        let height = columns.first().map_or(0, Column::len);
        let mut seen = HashSet::new();
        for c in &columns {
            if !seen.insert(c.name()) {
                return Err(FrameError::SchemaMismatch(format!(
                    "duplicate column name '{}'",
                    c.name()
                ))
                .into());
            }
            if c.len() != height {
                return Err(FrameError::SchemaMismatch(format!(
                    "column '{}' has {} rows, expected {height}",
                    c.name(),
                    c.len()
                ))
                .into());
            }
        }
        Ok(Self { columns, height })
    }

    /// A zero-row table with the columns of `schema`.
    #[must_use]
    pub fn empty(schema: &Schema) -> Self {
        Self {
            columns: schema
                .fields()
                .iter()
                .map(|f| Column::full_null(f.name.clone(), f.dtype, 0))
                .collect(),
            height: 0,
        }
    }

    /// A table with no columns but `height` rows (e.g. a projection of nothing).
    pub(crate) fn unit(height: usize) -> Self {
        Self {
            columns: Vec::new(),
            height,
        }
    }

    #[must_use]
    pub fn schema(&self) -> Schema {
        let fields = self.columns.iter().map(|c| Field::new(c.name(), c.dtype())).collect();
        // names are unique by construction
        Schema::new(fields).unwrap_or_default()
    }

    /// Number of rows.
    #[must_use]
    pub fn height(&self) -> usize {
        self.height
    }

    /// Alias of [`Table::height`].
    #[must_use]
    pub fn row_count(&self) -> usize {
        self.height
    }

    #[must_use]
    pub fn width(&self) -> usize {
        self.columns.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.height == 0
    }

    #[must_use]
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub(crate) fn into_columns(self) -> Vec<Column> {
        self.columns
    }

    #[must_use]
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(Column::name).collect()
    }

    /// # Errors
    /// `UnknownColumn` listing the available names.
    pub fn column(&self, name: &str) -> Result<&Column> {
        self.columns
            .iter()
            .find(|c| c.name() == name)
            .ok_or_else(|| FrameError::unknown_column(name, &self.column_names()).into())
    }

    /// The values of row `i`, in column order.
    #[must_use]
    pub fn row(&self, i: usize) -> Vec<Value> {
        self.columns.iter().map(|c| c.get(i)).collect()
    }

    /// Append `column`, or replace the column with the same name in place.
    ///
    /// # Errors
    /// `SchemaMismatch` when the length differs from the table height.
    pub fn with_column(&self, column: Column) -> Result<Self> {
        let mut out = self.clone();
        out.upsert(column)?;
        Ok(out)
    }

    pub(crate) fn upsert(&mut self, column: Column) -> Result<()> {
        let sized = !self.columns.is_empty() || self.height > 0;
        if sized && column.len() != self.height {
            return Err(FrameError::SchemaMismatch(format!(
                "column '{}' has {} rows, expected {}",
                column.name(),
                column.len(),
                self.height
            ))
            .into());
        }
        self.height = column.len();
        match self.columns.iter().position(|c| c.name() == column.name()) {
            Some(i) => self.columns[i] = column,
            None => self.columns.push(column),
        }
        Ok(())
    }

    /// Stack tables with identical column names and types.
    ///
    /// # Errors
    /// `SchemaMismatch` if the tables do not line up.
    pub fn vstack(parts: &[Table]) -> Result<Self> {
        let Some(first) = parts.first() else {
            return Ok(Self::default());
        };
        if parts.len() == 1 {
            return Ok(first.clone());
        }
        let names = first.column_names();
        for t in &parts[1..] {
            if t.column_names() != names {
                return Err(FrameError::SchemaMismatch(format!(
                    "cannot stack columns {:?} onto {:?}",
                    t.column_names(),
                    names
                ))
                .into());
            }
        }
        let columns = (0..first.width())
            .map(|i| {
                let col_parts: Vec<&Column> = parts.iter().map(|t| &t.columns[i]).collect();
                Column::concat(&col_parts)
            })
            .collect::<Result<Vec<_>>>()?;
        let height = parts.iter().map(Table::height).sum();
        Ok(Self { columns, height })
    }

    #[must_use]
    pub fn slice(&self, offset: usize, len: usize) -> Self {
        let start = offset.min(self.height);
        let height = len.min(self.height - start);
        Self {
            columns: self.columns.iter().map(|c| c.slice(start, height)).collect(),
            height,
        }
    }

    /// First `n` rows.
    #[must_use]
    pub fn head(&self, n: usize) -> Self {
        self.slice(0, n)
    }

    /// Gather rows by index.
    #[must_use]
    pub fn take(&self, idx: &[usize]) -> Self {
        Self {
            columns: self.columns.iter().map(|c| c.take(idx)).collect(),
            height: idx.len(),
        }
    }

    /// Keep rows whose mask entry is `true`.
    #[must_use]
    pub fn filter_mask(&self, mask: &[bool]) -> Self {
        let idx: Vec<usize> = mask
            .iter()
            .enumerate()
            .filter_map(|(i, keep)| keep.then_some(i))
            .collect();
        self.take(&idx)
    }

    /// Keep rows where `predicate` is true; null counts as false.
    ///
    /// # Errors
    /// `UnknownColumn` or `Type` from the predicate.
    pub fn filter(&self, predicate: &Expr) -> Result<Self> {
        ops::filter::filter(self, predicate)
    }

    /// Append or overwrite columns, all evaluated against this table.
    ///
    /// # Errors
    /// `UnknownColumn` or `Type` from any expression.
    pub fn with_columns(&self, exprs: &[Expr]) -> Result<Self> {
        ops::derive::with_columns(self, exprs)
    }

    /// Project expressions; an all-aggregate list reduces to one row.
    ///
    /// # Errors
    /// `UnknownColumn`, `Type`, or `SchemaMismatch` for duplicate output names.
    pub fn select(&self, exprs: &[Expr]) -> Result<Self> {
        ops::derive::select(self, exprs)
    }

    /// Cast columns to the types declared in `schema` (non-strict).
    ///
    /// # Errors
    /// `UnknownColumn` for a declared column that is absent, `NullHandling`
    /// when a non-nullable field holds a null.
    pub fn normalize(&self, schema: &Schema) -> Result<Self> {
        ops::normalize::normalize(self, schema, false)
    }

    /// As [`Table::normalize`] but any unconvertible value is a `Type` error.
    ///
    /// # Errors
    /// See [`Table::normalize`].
    pub fn normalize_strict(&self, schema: &Schema) -> Result<Self> {
        ops::normalize::normalize(self, schema, true)
    }

    /// # Errors
    /// `UnknownColumn` for a missing source name, `SchemaMismatch` on collision.
    pub fn rename(&self, pairs: &[(&str, &str)]) -> Result<Self> {
        let mut out = self.clone();
        for (from, to) in pairs {
            let mut schema = out.schema();
            schema.rename(from, to)?;
            for c in &mut out.columns {
                if c.name() == *from {
                    *c = c.clone().with_name(*to);
                }
            }
        }
        Ok(out)
    }

    /// # Errors
    /// `UnknownColumn` for a name that is not present.
    pub fn drop(&self, names: &[&str]) -> Result<Self> {
        for n in names {
            self.column(n)?;
        }
        Ok(Self {
            columns: self
                .columns
                .iter()
                .filter(|c| !names.contains(&c.name()))
                .cloned()
                .collect(),
            height: self.height,
        })
    }

    /// Stable sort; nulls sort last in either direction.
    ///
    /// # Errors
    /// `UnknownColumn` or `Type` from the sort keys.
    pub fn sort(&self, by: &[Expr], descending: &[bool]) -> Result<Self> {
        ops::sort::sort(self, by, descending)
    }

    /// Start a grouped aggregation.
    pub fn group_by<S: AsRef<str>>(&self, keys: impl IntoIterator<Item = S>) -> GroupBy<'_> {
        GroupBy {
            table: self,
            keys: keys.into_iter().map(|k| k.as_ref().to_string()).collect(),
        }
    }

    /// Hash join on equally named key columns.
    ///
    /// # Errors
    /// `UnknownColumn` for a missing key, `Type` for incompatible key types.
    pub fn join<S: AsRef<str>>(&self, other: &Table, on: &[S], how: JoinType) -> Result<Self> {
        let on: Vec<String> = on.iter().map(|s| s.as_ref().to_string()).collect();
        ops::join::join(self, other, &on, how)
    }

    /// Begin a lazy plan over a snapshot of this table.
    #[must_use]
    pub fn lazy(&self) -> LazyFrame {
        LazyFrame::from_table(self.clone())
    }
}

/// Eager grouped aggregation builder returned by [`Table::group_by`].
pub struct GroupBy<'a> {
    table: &'a Table,
    keys: Vec<String>,
}

impl GroupBy<'_> {
    /// Reduce every group to one row: key columns, then one column per expression.
    ///
    /// # Errors
    /// `UnknownColumn` for a missing key or input, `Type` for an incompatible
    /// reduction or a bare non-key column.
    pub fn agg(&self, exprs: &[Expr]) -> Result<Table> {
        ops::groupby::group_by(self.table, &self.keys, exprs)
    }
}

impl PartialEq for Table {
    fn eq(&self, other: &Self) -> bool {
        self.height == other.height && self.columns == other.columns
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "shape: ({}, {})", self.height, self.width())?;
        let rows: Vec<Option<usize>> = if self.height > PREVIEW_ROWS {
            let half = PREVIEW_ROWS / 2;
            (0..half)
                .map(Some)
                .chain(std::iter::once(None))
                .chain((self.height - half..self.height).map(Some))
                .collect()
        } else {
            (0..self.height).map(Some).collect()
        };
        let cells: Vec<Vec<String>> = self
            .columns
            .iter()
            .map(|c| {
                rows.iter()
                    .map(|r| r.map_or_else(|| "…".to_string(), |i| cell(&c.get(i))))
                    .collect()
            })
            .collect();
        let widths: Vec<usize> = self
            .columns
            .iter()
            .zip(&cells)
            .map(|(c, vals)| {
                vals.iter()
                    .map(|v| v.chars().count())
                    .chain([c.name().chars().count(), c.dtype().to_string().len(), 3])
                    .max()
                    .unwrap_or(3)
            })
            .collect();

        let rule = |l: &str, m: &str, r: &str, fill: &str| {
            let parts: Vec<String> = widths.iter().map(|w| fill.repeat(w + 2)).collect();
            format!("{l}{}{r}", parts.join(m))
        };
        let line = |vals: Vec<String>| {
            let parts: Vec<String> = vals
                .iter()
                .zip(&widths)
                .map(|(v, w)| format!(" {v}{} ", " ".repeat(w - v.chars().count())))
                .collect();
            format!("│{}│", parts.join("┆"))
        };

        writeln!(f, "{}", rule("┌", "┬", "┐", "─"))?;
        writeln!(f, "{}", line(self.column_names().iter().map(|s| (*s).to_string()).collect()))?;
        writeln!(f, "{}", line(vec!["---".to_string(); self.width()]))?;
        writeln!(f, "{}", line(self.columns.iter().map(|c| c.dtype().to_string()).collect()))?;
        writeln!(f, "{}", rule("╞", "╪", "╡", "═"))?;
        for r in 0..rows.len() {
            writeln!(f, "{}", line(cells.iter().map(|c| c[r].clone()).collect()))?;
        }
        write!(f, "{}", rule("└", "┴", "┘", "─"))
    }
}

fn cell(v: &Value) -> String {
    match v {
        Value::Str(s) => format!("{s:?}"),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unequal_lengths_rejected() {
        let err = Table::new(vec![
            Column::from_i64("a", vec![Some(1), Some(2)]),
            Column::from_i64("b", vec![Some(1)]),
        ])
        .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<FrameError>(),
            Some(FrameError::SchemaMismatch(_))
        ));
    }

    #[test]
    fn display_elides_long_tables() -> Result<()> {
        let t = Table::new(vec![Column::from_i64("n", (0..25).map(Some).collect())])?;
        let shown = t.to_string();
        assert!(shown.starts_with("shape: (25, 1)"));
        assert!(shown.contains('…'));
        assert!(shown.contains(" 24 "));
        assert!(!shown.contains(" 12 "));
        Ok(())
    }

    #[test]
    fn rename_and_drop() -> Result<()> {
        let t = Table::new(vec![
            Column::from_i64("a", vec![Some(1)]),
            Column::from_strs("b", &[Some("x")]),
        ])?;
        let r = t.rename(&[("a", "id")])?.drop(&["b"])?;
        assert_eq!(r.column_names(), vec!["id"]);
        assert!(t.drop(&["zzz"]).is_err());
        Ok(())
    }

    #[test]
    fn vstack_requires_matching_names() -> Result<()> {
        let a = Table::new(vec![Column::from_i64("a", vec![Some(1)])])?;
        let b = Table::new(vec![Column::from_i64("a", vec![None, Some(3)])])?;
        let s = Table::vstack(&[a.clone(), b])?;
        assert_eq!(s.height(), 3);
        let c = Table::new(vec![Column::from_i64("z", vec![Some(1)])])?;
        assert!(Table::vstack(&[a, c]).is_err());
        Ok(())
    }
}
