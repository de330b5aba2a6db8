//! Derivation (`with_columns`) and projection (`select`) stages.

use crate::dtype::Schema;
use crate::error::FrameError;
use crate::eval::{ensure_row_wise, evaluate_all};
use crate::expr::Expr;
use crate::ops::groupby;
use crate::table::Table;
use anyhow::{Result, bail};

/// Output schema of `with_columns(exprs)`: new names are appended in order,
/// existing names keep their position with the new type.
///
/// # Errors
/// `UnknownColumn` / `Type` from any expression.
pub fn with_columns_schema(input: &Schema, exprs: &[Expr]) -> Result<Schema> {
    let mut out = input.clone();
    for e in exprs {
        ensure_row_wise(e, "with_columns")?;
        out.upsert(e.to_field(input)?);
    }
    Ok(out)
}

/// Evaluate every expression against `table` and append or overwrite by name.
///
/// # Errors
/// See [`with_columns_schema`].
pub fn with_columns(table: &Table, exprs: &[Expr]) -> Result<Table> {
    with_columns_schema(&table.schema(), exprs)?;
    let mut out = table.clone();
    for c in evaluate_all(exprs, table)? {
        out.upsert(c)?;
    }
    Ok(out)
}

/// Whether a projection is a global aggregation.
#[must_use]
pub fn is_aggregation(exprs: &[Expr]) -> bool {
    !exprs.is_empty() && exprs.iter().all(Expr::has_agg)
}

/// Output schema of `select(exprs)`.
///
/// # Errors
/// `SchemaMismatch` for duplicate output names, `Type` when aggregates are
/// mixed with row-wise expressions.
pub fn select_schema(input: &Schema, exprs: &[Expr]) -> Result<Schema> {
    if is_aggregation(exprs) {
        return groupby::AggPlan::new::<&str>(input, &[], exprs)?.output_schema();
    }
    if let Some(e) = exprs.iter().find(|e| e.has_agg()) {
        bail!(FrameError::Type(format!(
            "select mixes aggregate '{}' with row-wise expressions",
            e.output_name()
        )));
    }
    Schema::new(exprs.iter().map(|e| e.to_field(input)).collect::<Result<Vec<_>>>()?)
}

/// Project `exprs`. A list made only of aggregates reduces the whole table to
/// a single row.
///
/// # Errors
/// See [`select_schema`].
pub fn select(table: &Table, exprs: &[Expr]) -> Result<Table> {
    if is_aggregation(exprs) {
        return groupby::group_by::<&str>(table, &[], exprs);
    }
    select_schema(&table.schema(), exprs)?;
    if exprs.is_empty() {
        return Ok(Table::unit(table.height()));
    }
    Table::new(evaluate_all(exprs, table)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column::Column;
    use crate::dtype::DataType;
    use crate::expr::{col, lit};
    use crate::value::Value;

    fn prices() -> Table {
        Table::new(vec![
            Column::from_strs("type", &[Some("A"), Some("A"), Some("B")]),
            Column::from_i64("price", vec![Some(10), Some(20), Some(5)]),
        ])
        .unwrap()
    }

    #[test]
    fn with_columns_overwrites_in_place() -> Result<()> {
        let t = with_columns(
            &prices(),
            &[(col("price") * 2).alias("price"), lit(true).alias("flag")],
        )?;
        assert_eq!(t.column_names(), vec!["type", "price", "flag"]);
        assert_eq!(t.column("price")?.get(1), Value::Int(40));
        Ok(())
    }

    #[test]
    fn derivations_see_the_input_table() -> Result<()> {
        let t = with_columns(
            &prices(),
            &[(col("price") + 1).alias("price"), (col("price") * 10).alias("big")],
        )?;
        assert_eq!(t.column("big")?.get(0), Value::Int(100));
        Ok(())
    }

    #[test]
    fn all_aggregate_select_is_one_row() -> Result<()> {
        let t = select(&prices(), &[col("price").sum(), col("price").mean().alias("avg")])?;
        assert_eq!(t.height(), 1);
        assert_eq!(t.row(0), vec![Value::Int(35), Value::Float(35.0 / 3.0)]);
        Ok(())
    }

    #[test]
    fn mixed_select_rejected() {
        let err = select(&prices(), &[col("type"), col("price").sum()]).unwrap_err();
        assert!(matches!(err.downcast_ref::<FrameError>(), Some(FrameError::Type(_))));
    }

    #[test]
    fn select_schema_resolves_types() -> Result<()> {
        let s = select_schema(&prices().schema(), &[(col("price") / 2).alias("half")])?;
        assert_eq!(s.field("half")?.dtype, DataType::Float64);
        Ok(())
    }
}
