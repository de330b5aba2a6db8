//! Sort stage: stable multi-key ordering, nulls last.

use crate::dtype::Schema;
use crate::error::FrameError;
use crate::eval::{ensure_row_wise, evaluate_all};
use crate::expr::Expr;
use crate::table::Table;
use crate::value::Value;
use anyhow::{Result, bail};
use std::cmp::Ordering;

/// Validate sort keys against `schema`.
///
/// # Errors
/// `UnknownColumn` / `Type`, or `Type` when `descending` does not line up with `by`.
pub fn check_keys(schema: &Schema, by: &[Expr], descending: &[bool]) -> Result<()> {
    if descending.len() != by.len() && descending.len() > 1 {
        bail!(FrameError::Type(format!(
            "sort got {} keys but {} direction flags",
            by.len(),
            descending.len()
        )));
    }
    for e in by {
        ensure_row_wise(e, "sort")?;
        e.to_field(schema)?;
    }
    Ok(())
}

/// Direction for key `i`; a single flag applies to every key.
fn is_descending(descending: &[bool], i: usize) -> bool {
    match descending {
        [] => false,
        [one] => *one,
        many => many[i],
    }
}

/// The permutation that sorts `table` by `by`.
///
/// # Errors
/// See [`check_keys`].
pub fn sort_indices(table: &Table, by: &[Expr], descending: &[bool]) -> Result<Vec<usize>> {
    check_keys(&table.schema(), by, descending)?;
    let keys: Vec<Vec<Value>> = evaluate_all(by, table)?
        .iter()
        .map(|c| c.values().collect())
        .collect();
    let mut idx: Vec<usize> = (0..table.height()).collect();
    idx.sort_by(|&a, &b| {
        for (k, values) in keys.iter().enumerate() {
            let (x, y) = (&values[a], &values[b]);
            let ord = match (x.is_null(), y.is_null()) {
                (true, true) => Ordering::Equal,
                (true, false) => Ordering::Greater,
                (false, true) => Ordering::Less,
                (false, false) if is_descending(descending, k) => y.total_cmp(x),
                (false, false) => x.total_cmp(y),
            };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    });
    Ok(idx)
}

/// Reorder rows by `by`; ties keep their input order.
///
/// # Errors
/// See [`check_keys`].
pub fn sort(table: &Table, by: &[Expr], descending: &[bool]) -> Result<Table> {
    let idx = sort_indices(table, by, descending)?;
    Ok(table.take(&idx))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column::Column;
    use crate::expr::col;

    #[test]
    fn nulls_last_both_directions_and_stable() -> Result<()> {
        let t = Table::new(vec![
            Column::from_i64("k", vec![Some(2), None, Some(1), Some(2)]),
            Column::from_strs("tag", &[Some("a"), Some("b"), Some("c"), Some("d")]),
        ])?;
        let asc = sort(&t, &[col("k")], &[false])?;
        assert_eq!(
            asc.column("tag")?,
            &Column::from_strs("tag", &[Some("c"), Some("a"), Some("d"), Some("b")])
        );
        let desc = sort(&t, &[col("k")], &[true])?;
        assert_eq!(
            desc.column("tag")?,
            &Column::from_strs("tag", &[Some("a"), Some("d"), Some("c"), Some("b")])
        );
        Ok(())
    }
}
