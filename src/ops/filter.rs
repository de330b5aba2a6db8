//! Filter stage: keep rows whose predicate is true.

use crate::dtype::{DataType, Schema};
use crate::error::FrameError;
use crate::eval::{ensure_row_wise, predicate_mask};
use crate::expr::Expr;
use crate::table::Table;
use anyhow::{Result, bail};

/// Check that `predicate` is a boolean row-wise expression over `schema`.
///
/// # Errors
/// `UnknownColumn` / `Type`.
pub fn check_predicate(schema: &Schema, predicate: &Expr) -> Result<()> {
    ensure_row_wise(predicate, "filter")?;
    let field = predicate.to_field(schema)?;
    if field.dtype != DataType::Boolean {
        bail!(FrameError::Type(format!(
            "filter predicate must be boolean, got {}",
            field.dtype
        )));
    }
    Ok(())
}

/// Keep rows where `predicate` is true. Rows evaluating to false or null are
/// dropped; no other row is.
///
/// # Errors
/// See [`check_predicate`].
pub fn filter(table: &Table, predicate: &Expr) -> Result<Table> {
    check_predicate(&table.schema(), predicate)?;
    let mask = predicate_mask(predicate, table)?;
    Ok(table.filter_mask(&mask))
}
