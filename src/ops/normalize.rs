//! Schema/type normalizer: cast declared columns and enforce nullability.

use crate::dtype::Schema;
use crate::error::FrameError;
use crate::table::Table;
use anyhow::{Context, Result};

/// Output schema after normalizing `input` to `declared`.
///
/// # Errors
/// `UnknownColumn` for a declared column missing from `input`.
pub fn normalize_schema(input: &Schema, declared: &Schema) -> Result<Schema> {
    let mut out = input.clone();
    for f in declared.fields() {
        input.field(&f.name)?;
        out.upsert(f.clone());
    }
    Ok(out)
}

/// Cast every column named in `declared` to its declared type; columns not
/// mentioned pass through unchanged.
///
/// # Errors
/// `UnknownColumn`, `Type` from a strict cast, and `NullHandling` when a
/// non-nullable field contains a null after casting.
pub fn normalize(table: &Table, declared: &Schema, strict: bool) -> Result<Table> {
    normalize_schema(&table.schema(), declared)?;
    let mut out = table.clone();
    for f in declared.fields() {
        let cast = table
            .column(&f.name)?
            .cast(f.dtype, strict)
            .with_context(|| format!("normalizing column '{}'", f.name))?;
        if !f.nullable && cast.null_count() > 0 {
            return Err(FrameError::NullHandling(format!(
                "column '{}' ({} null of {} rows)",
                f.name,
                cast.null_count(),
                cast.len()
            ))
            .into());
        }
        out.upsert(cast)?;
    }
    Ok(out)
}
