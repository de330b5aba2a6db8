//! Column-wise evaluation of [`Expr`] trees against a [`Table`].
//!
//! Every kernel maps an N-row input to an N-row output and propagates nulls,
//! except the operations that exist to handle them (`is_null`, `coalesce`,
//! `fill_null`) and Kleene `and`/`or`.

use crate::column::{Column, ColumnBuilder, ColumnData};
use crate::dtype::DataType;
use crate::error::FrameError;
use crate::expr::{BinaryOp, Expr, UnaryOp, binary_dtype, is_null_literal};
use crate::table::Table;
use crate::value::Value;
use anyhow::{Context, Result, bail};
use chrono::Datelike;
use regex::Regex;
use std::cmp::Ordering;

/// Evaluate `expr` over `table`; the result is named by [`Expr::output_name`].
///
/// # Errors
/// `UnknownColumn` / `Type` from type resolution, `Type` from a failed strict
/// cast or an invalid regex, and `Type` for an aggregate outside a grouping.
pub fn evaluate(expr: &Expr, table: &Table) -> Result<Column> {
    let field = expr.to_field(&table.schema())?;
    let out = eval_node(expr, table)?;
    debug_assert_eq!(out.len(), table.height());
    let out = if out.dtype() == field.dtype || field.dtype == DataType::Categorical {
        out
    } else {
        out.cast(field.dtype, false)?
    };
    Ok(out.with_name(field.name))
}

/// Evaluate a predicate into a keep-mask; null counts as false.
///
/// # Errors
/// As [`evaluate`], plus `Type` when the predicate is not boolean.
pub fn predicate_mask(predicate: &Expr, table: &Table) -> Result<Vec<bool>> {
    let c = evaluate(predicate, table)?;
    match c.into_data() {
        ColumnData::Boolean(v) => Ok(v.into_iter().map(|b| b == Some(true)).collect()),
        other => bail!(FrameError::Type(format!(
            "filter predicate must be boolean, got {}",
            Column::new("", other).dtype()
        ))),
    }
}

/// Reject aggregates in a stage that evaluates row by row.
///
/// # Errors
/// `Type` naming the offending expression and stage.
pub(crate) fn ensure_row_wise(expr: &Expr, stage: &str) -> Result<()> {
    if expr.has_agg() {
        bail!(FrameError::Type(format!(
            "aggregate '{}' is only allowed in select or group_by().agg(), not in {stage}",
            expr.output_name()
        )));
    }
    Ok(())
}

fn eval_node(expr: &Expr, table: &Table) -> Result<Column> {
    let height = table.height();
    match expr {
        Expr::Column(name) => Ok(table.column(name)?.clone()),
        Expr::Literal(v) => broadcast(v, v.dtype().unwrap_or(DataType::Utf8), height),
        Expr::Alias(e, _) => eval_node(e, table),
        Expr::Unary(op, e) => unary(*op, &eval_node(e, table)?),
        Expr::Binary { op, left, right } => {
            let (l, r) = eval_pair(left, right, table)?;
            binary(*op, &l, &r)
        }
        Expr::Cast { expr, dtype, strict } => eval_node(expr, table)?.cast(*dtype, *strict),
        Expr::Coalesce(es) => {
            let target = expr.to_field(&table.schema())?.dtype;
            let inputs = es
                .iter()
                .filter(|e| !is_null_literal(e))
                .map(|e| eval_node(e, table))
                .collect::<Result<Vec<_>>>()?;
            coalesce_columns(&inputs, target, height)
        }
        Expr::FillNull { expr: e, fill } => {
            let target = expr.to_field(&table.schema())?.dtype;
            let (l, r) = eval_pair(e, fill, table)?;
            coalesce_columns(&[l, r], target, height)
        }
        Expr::Contains { expr, pattern } => {
            let re = Regex::new(pattern)
                .map_err(|e| FrameError::Type(format!("invalid regex '{pattern}': {e}")))?;
            let c = eval_node(expr, table)?;
            let out = (0..c.len()).map(|i| c.str_at(i).map(|s| re.is_match(s))).collect();
            Ok(Column::from_bool("", out))
        }
        Expr::IsIn { expr, values } => {
            let c = eval_node(expr, table)?;
            let out = c
                .values()
                .map(|v| (!v.is_null()).then(|| values.iter().any(|w| v.total_cmp(w).is_eq())))
                .collect();
            Ok(Column::from_bool("", out))
        }
        Expr::Agg(func, _) => bail!(FrameError::Type(format!(
            "aggregate {} is only allowed in select or group_by().agg()",
            func.name()
        ))),
    }
}

/// Evaluate two operands; an untyped null literal is materialized with the
/// other side's type.
fn eval_pair(left: &Expr, right: &Expr, table: &Table) -> Result<(Column, Column)> {
    let h = table.height();
    match (is_null_literal(left), is_null_literal(right)) {
        (true, false) => {
            let r = eval_node(right, table)?;
            Ok((Column::full_null("", r.dtype(), h), r))
        }
        (false, true) => {
            let l = eval_node(left, table)?;
            let t = l.dtype();
            Ok((l, Column::full_null("", t, h)))
        }
        _ => Ok((eval_node(left, table)?, eval_node(right, table)?)),
    }
}

fn broadcast(v: &Value, dtype: DataType, height: usize) -> Result<Column> {
    let mut b = ColumnBuilder::new(dtype, height);
    for _ in 0..height {
        b.push(v.clone())?;
    }
    Ok(b.finish("literal"))
}

fn coalesce_columns(inputs: &[Column], target: DataType, height: usize) -> Result<Column> {
    let cast = inputs
        .iter()
        .map(|c| c.cast(target, false))
        .collect::<Result<Vec<_>>>()?;
    let mut b = ColumnBuilder::new(target, height);
    for row in 0..height {
        let v = cast
            .iter()
            .find(|c| !c.is_null(row))
            .map_or(Value::Null, |c| c.get(row));
        b.push(v)?;
    }
    Ok(b.finish(""))
}

fn unary(op: UnaryOp, c: &Column) -> Result<Column> {
    let n = c.len();
    Ok(match op {
        UnaryOp::IsNull => Column::from_bool("", (0..n).map(|i| Some(c.is_null(i))).collect()),
        UnaryOp::IsNotNull => Column::from_bool("", (0..n).map(|i| Some(!c.is_null(i))).collect()),
        UnaryOp::Not => match c.data() {
            ColumnData::Boolean(v) => {
                Column::from_bool("", v.iter().map(|b| b.map(|b| !b)).collect())
            }
            _ => bail!(type_err(op, c)),
        },
        UnaryOp::Neg | UnaryOp::Abs => {
            let abs = op == UnaryOp::Abs;
            match c.data() {
                ColumnData::Int64(v) => Column::from_i64(
                    "",
                    v.iter()
                        .map(|x| x.map(|x| if abs { x.wrapping_abs() } else { x.wrapping_neg() }))
                        .collect(),
                ),
                ColumnData::Float64(v) => Column::from_f64(
                    "",
                    v.iter()
                        .map(|x| x.map(|x| if abs { x.abs() } else { -x }))
                        .collect(),
                ),
                _ => bail!(type_err(op, c)),
            }
        }
        UnaryOp::Upper | UnaryOp::Lower | UnaryOp::StrLen => {
            if !c.dtype().is_textual() {
                bail!(type_err(op, c));
            }
            if op == UnaryOp::StrLen {
                let out = (0..n)
                    .map(|i| {
                        c.str_at(i)
                            .map(|s| i64::try_from(s.chars().count()).unwrap_or(i64::MAX))
                    })
                    .collect();
                Column::from_i64("", out)
            } else {
                let out = (0..n)
                    .map(|i| {
                        c.str_at(i).map(|s| {
                            if op == UnaryOp::Upper {
                                s.to_uppercase()
                            } else {
                                s.to_lowercase()
                            }
                        })
                    })
                    .collect();
                Column::from_strings("", out)
            }
        }
        UnaryOp::Year | UnaryOp::Month | UnaryOp::Day => match c.data() {
            ColumnData::Date(v) => Column::from_i64(
                "",
                v.iter()
                    .map(|d| {
                        d.map(|d| match op {
                            UnaryOp::Year => i64::from(d.year()),
                            UnaryOp::Month => i64::from(d.month()),
                            _ => i64::from(d.day()),
                        })
                    })
                    .collect(),
            ),
            _ => bail!(type_err(op, c)),
        },
    })
}

fn type_err(op: UnaryOp, c: &Column) -> FrameError {
    FrameError::Type(format!("{op:?} is not defined for {}", c.dtype()))
}

fn binary(op: BinaryOp, l: &Column, r: &Column) -> Result<Column> {
    binary_dtype(op, l.dtype(), r.dtype())?;
    match op {
        BinaryOp::And | BinaryOp::Or => kleene(op, l, r),
        _ if op.is_comparison() => compare(op, l, r),
        BinaryOp::Add if l.dtype().is_textual() => {
            let out = (0..l.len())
                .map(|i| match (l.str_at(i), r.str_at(i)) {
                    (Some(a), Some(b)) => Some(format!("{a}{b}")),
                    _ => None,
                })
                .collect();
            Ok(Column::from_strings("", out))
        }
        _ => arithmetic(op, l, r),
    }
}

fn kleene(op: BinaryOp, l: &Column, r: &Column) -> Result<Column> {
    let (ColumnData::Boolean(a), ColumnData::Boolean(b)) = (l.data(), r.data()) else {
        bail!(FrameError::Type("and/or need boolean operands".into()));
    };
    let out = a
        .iter()
        .zip(b)
        .map(|(x, y)| match op {
            BinaryOp::And => match (x, y) {
                (Some(false), _) | (_, Some(false)) => Some(false),
                (Some(true), Some(true)) => Some(true),
                _ => None,
            },
            _ => match (x, y) {
                (Some(true), _) | (_, Some(true)) => Some(true),
                (Some(false), Some(false)) => Some(false),
                _ => None,
            },
        })
        .collect();
    Ok(Column::from_bool("", out))
}

fn ord_matches(op: BinaryOp, ord: Ordering) -> bool {
    match op {
        BinaryOp::Eq => ord.is_eq(),
        BinaryOp::NotEq => ord.is_ne(),
        BinaryOp::Lt => ord.is_lt(),
        BinaryOp::LtEq => ord.is_le(),
        BinaryOp::Gt => ord.is_gt(),
        _ => ord.is_ge(),
    }
}

/// Numeric view of a cell for mixed int/float kernels.
fn f64_at(c: &Column, i: usize) -> Option<f64> {
    match c.data() {
        ColumnData::Float64(v) => v[i],
        #[allow(clippy::cast_precision_loss)]
        ColumnData::Int64(v) => v[i].map(|x| x as f64),
        _ => None,
    }
}

fn compare(op: BinaryOp, l: &Column, r: &Column) -> Result<Column> {
    let n = l.len();
    let out: Vec<Option<bool>> = match (l.data(), r.data()) {
        (ColumnData::Int64(a), ColumnData::Int64(b)) => a
            .iter()
            .zip(b)
            .map(|(x, y)| Some(ord_matches(op, (*x)?.cmp(&(*y)?))))
            .collect(),
        _ if l.dtype().is_numeric() && r.dtype().is_numeric() => (0..n)
            .map(|i| Some(ord_matches(op, f64_at(l, i)?.total_cmp(&f64_at(r, i)?))))
            .collect(),
        _ if l.dtype().is_textual() && r.dtype().is_textual() => (0..n)
            .map(|i| Some(ord_matches(op, l.str_at(i)?.cmp(r.str_at(i)?))))
            .collect(),
        _ => (0..n)
            .map(|i| {
                let (x, y) = (l.get(i), r.get(i));
                (!x.is_null() && !y.is_null()).then(|| ord_matches(op, x.total_cmp(&y)))
            })
            .collect(),
    };
    Ok(Column::from_bool("", out))
}

fn arithmetic(op: BinaryOp, l: &Column, r: &Column) -> Result<Column> {
    if let (ColumnData::Int64(a), ColumnData::Int64(b), false) =
        (l.data(), r.data(), op == BinaryOp::Div)
    {
        let out = a
            .iter()
            .zip(b)
            .map(|(x, y)| {
                let (x, y) = ((*x)?, (*y)?);
                match op {
                    BinaryOp::Add => Some(x.wrapping_add(y)),
                    BinaryOp::Sub => Some(x.wrapping_sub(y)),
                    BinaryOp::Mul => Some(x.wrapping_mul(y)),
                    _ => (y != 0).then(|| x.wrapping_rem(y)),
                }
            })
            .collect();
        return Ok(Column::from_i64("", out));
    }
    let out = (0..l.len())
        .map(|i| {
            let (x, y) = (f64_at(l, i)?, f64_at(r, i)?);
            Some(match op {
                BinaryOp::Add => x + y,
                BinaryOp::Sub => x - y,
                BinaryOp::Mul => x * y,
                BinaryOp::Div => x / y,
                _ => x % y,
            })
        })
        .collect();
    Ok(Column::from_f64("", out))
}

/// Evaluate each expression, attaching the expression name to failures.
pub(crate) fn evaluate_all(exprs: &[Expr], table: &Table) -> Result<Vec<Column>> {
    exprs
        .iter()
        .map(|e| evaluate(e, table).with_context(|| format!("evaluating '{}'", e.output_name())))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{coalesce, col, lit};

    fn table() -> Table {
        Table::new(vec![
            Column::from_i64("a", vec![Some(1), None, Some(3), Some(4)]),
            Column::from_f64("b", vec![Some(0.5), Some(1.0), None, Some(2.0)]),
            Column::from_bool("t", vec![Some(true), Some(false), None, None]),
            Column::categorical("k", &[Some("x"), Some("y"), None, Some("x")]),
        ])
        .unwrap()
    }

    #[test]
    fn comparisons_propagate_null() -> Result<()> {
        let out = evaluate(&col("a").gt(1), &table())?;
        assert_eq!(out, Column::from_bool("a", vec![Some(false), None, Some(true), Some(true)]));
        Ok(())
    }

    #[test]
    fn kleene_logic() -> Result<()> {
        let t = table();
        let and = evaluate(&col("t").and(lit(false)), &t)?;
        assert_eq!(and, Column::from_bool("t", vec![Some(false); 4]));
        let or = evaluate(&col("t").or(lit(true)), &t)?;
        assert_eq!(or, Column::from_bool("t", vec![Some(true); 4]));
        let and_true = evaluate(&col("t").and(lit(true)), &t)?;
        assert_eq!(and_true, Column::from_bool("t", vec![Some(true), Some(false), None, None]));
        Ok(())
    }

    #[test]
    fn mixed_arithmetic_and_modulo_by_zero() -> Result<()> {
        let t = table();
        let sum = evaluate(&(col("a") + col("b")), &t)?;
        assert_eq!(sum, Column::from_f64("a", vec![Some(1.5), None, None, Some(6.0)]));
        let m = evaluate(&(col("a") % 0), &t)?;
        assert_eq!(m.null_count(), 4);
        let d = evaluate(&(col("a") / 2), &t)?;
        assert_eq!(d.get(2), Value::Float(1.5));
        Ok(())
    }

    #[test]
    fn coalesce_and_fill_null() -> Result<()> {
        let t = table();
        let c = evaluate(&coalesce([col("a"), lit(0)]).alias("a0"), &t)?;
        assert_eq!(c, Column::from_i64("a0", vec![Some(1), Some(0), Some(3), Some(4)]));
        let f = evaluate(&col("b").fill_null(-1), &t)?;
        assert_eq!(f.get(2), Value::Float(-1.0));
        Ok(())
    }

    #[test]
    fn string_ops_on_categoricals() -> Result<()> {
        let t = table();
        let up = evaluate(&col("k").to_uppercase(), &t)?;
        assert_eq!(up.get(1), Value::Str("Y".into()));
        let hit = evaluate(&col("k").str_contains("^x$"), &t)?;
        assert_eq!(hit, Column::from_bool("k", vec![Some(true), Some(false), None, Some(true)]));
        let eq = evaluate(&col("k").eq("x"), &t)?;
        assert_eq!(eq.get(0), Value::Bool(true));
        Ok(())
    }

    #[test]
    fn aggregates_rejected_row_wise() {
        let err = evaluate(&col("a").sum(), &table()).unwrap_err();
        assert!(matches!(err.downcast_ref::<FrameError>(), Some(FrameError::Type(_))));
    }

    #[test]
    fn null_predicate_rows_are_dropped() -> Result<()> {
        let mask = predicate_mask(&col("a").gt(1), &table())?;
        assert_eq!(mask, vec![false, false, true, true]);
        Ok(())
    }
}
