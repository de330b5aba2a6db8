use anyhow::Result;
use ironframe::prelude::*;
use ironframe::testing::*;
use std::collections::{HashMap, HashSet};

#[test]
fn sales_scenario() -> Result<()> {
    let expected = Table::new(vec![
        Column::from_strs("type", &[Some("A"), Some("B")]),
        Column::from_i64("price", vec![Some(30), Some(5)]),
    ])?;

    let eager = sales_fixture().group_by(["type"]).agg(&[col("price").sum()])?;
    assert_tables_equal_unordered(&eager, &expected);

    let lazy = sales_fixture()
        .lazy()
        .group_by(["type"])
        .agg([col("price").sum()])
        .collect()?;
    assert_tables_equal_unordered(&lazy, &expected);
    Ok(())
}

/// Per-region totals computed the slow way, straight from the fixture's rules.
fn expected_totals(n: i64, regions: i64) -> HashMap<Option<String>, (i64, i64)> {
    let mut totals: HashMap<Option<String>, (i64, i64)> = HashMap::new();
    for i in 0..n {
        let region = (i % 11 != 10).then(|| format!("r{}", i % regions));
        let entry = totals.entry(region).or_default();
        entry.1 += 1;
        if i % 13 != 12 {
            entry.0 += 1 + i % 5;
        }
    }
    totals
}

#[test]
fn synthetic_totals_match_exactly() -> Result<()> {
    let orders = orders_fixture(1000, 4);
    let out = orders
        .lazy()
        .group_by(["region"])
        .agg([col("qty").sum(), len()])
        .collect()?;

    let totals = expected_totals(1000, 4);
    // r0..r3 plus one group for the null region
    assert_eq!(out.height(), 5);
    assert_eq!(out.height(), totals.len());

    let mut regions = Vec::new();
    let mut sums = Vec::new();
    let mut counts = Vec::new();
    for (region, (sum, count)) in &totals {
        regions.push(region.clone());
        sums.push(Some(*sum));
        counts.push(Some(*count));
    }
    let expected = Table::new(vec![
        Column::from_strings("region", regions),
        Column::from_i64("qty", sums),
        Column::from_i64("len", counts),
    ])?;
    assert_tables_equal_unordered(&out, &expected);
    Ok(())
}

#[test]
fn group_count_equals_distinct_key_tuples() -> Result<()> {
    let orders = orders_fixture(500, 3);
    let out = orders.group_by(["region", "paid"]).agg(&[col("id").count()])?;

    let region = orders.column("region")?;
    let paid = orders.column("paid")?;
    let distinct: HashSet<(String, String)> = (0..orders.height())
        .map(|i| (region.get(i).to_string(), paid.get(i).to_string()))
        .collect();
    assert_eq!(out.height(), distinct.len());

    let total: i64 = out
        .column("id")?
        .values()
        .map(|v| match v {
            Value::Int(n) => n,
            other => panic!("count should be an integer, got {other:?}"),
        })
        .sum();
    assert_eq!(total, 500);
    Ok(())
}

#[test]
fn groups_come_out_in_first_appearance_order() -> Result<()> {
    let t = Table::new(vec![Column::from_strs(
        "k",
        &[Some("z"), None, Some("a"), Some("z"), None],
    )])?;
    let out = t.group_by(["k"]).agg(&[len()])?;
    let expected = Table::new(vec![
        Column::from_strs("k", &[Some("z"), None, Some("a")]),
        Column::from_i64("len", vec![Some(2), Some(2), Some(1)]),
    ])?;
    assert_tables_equal(&out, &expected);
    Ok(())
}

#[test]
fn reductions_and_null_groups() -> Result<()> {
    let t = Table::new(vec![
        Column::from_strs("k", &[Some("x"), Some("x"), Some("y"), Some("y"), Some("y"), Some("y")]),
        Column::from_i64("v", vec![None, None, Some(1), Some(2), Some(3), Some(4)]),
    ])?;
    let out = t.group_by(["k"]).agg(&[
        col("v").sum().alias("sum"),
        col("v").mean().alias("mean"),
        col("v").count().alias("count"),
        col("v").min().alias("min"),
        col("v").max().alias("max"),
        col("v").median().alias("median"),
        col("v").var().alias("var"),
        col("v").n_unique().alias("distinct"),
        col("v").first().alias("first"),
        col("v").last().alias("last"),
    ])?;
    assert_schema(
        &out,
        &[
            ("k", DataType::Utf8),
            ("sum", DataType::Int64),
            ("mean", DataType::Float64),
            ("count", DataType::Int64),
            ("min", DataType::Int64),
            ("max", DataType::Int64),
            ("median", DataType::Float64),
            ("var", DataType::Float64),
            ("distinct", DataType::Int64),
            ("first", DataType::Int64),
            ("last", DataType::Int64),
        ],
    );

    // "x" has only nulls: the sum is zero, the other statistics are null.
    let x = out.row(0);
    assert_eq!(x[1], Value::Int(0));
    assert_eq!(x[2], Value::Null);
    assert_eq!(x[3], Value::Int(0));
    assert_eq!(x[4], Value::Null);

    let y = out.row(1);
    assert_eq!(y[1], Value::Int(10));
    assert_eq!(y[2], Value::Float(2.5));
    assert_eq!(y[3], Value::Int(4));
    assert_eq!((y[4].clone(), y[5].clone()), (Value::Int(1), Value::Int(4)));
    assert_eq!(y[6], Value::Float(2.5));
    let var = y[7].as_f64().unwrap_or(f64::NAN);
    assert!((var - 5.0 / 3.0).abs() < 1e-12, "{var}");
    assert_eq!(y[8], Value::Int(4));
    assert_eq!((y[9].clone(), y[10].clone()), (Value::Int(1), Value::Int(4)));
    Ok(())
}

#[test]
fn aggregates_combine_arithmetically() -> Result<()> {
    let out = sales_fixture()
        .lazy()
        .group_by(["type"])
        .agg([(col("price").sum() / col("price").count()).alias("avg")])
        .sort(["type"])
        .collect()?;
    let expected = Table::new(vec![
        Column::from_strs("type", &[Some("A"), Some("B")]),
        Column::from_f64("avg", vec![Some(15.0), Some(5.0)]),
    ])?;
    assert_tables_equal(&out, &expected);
    Ok(())
}

#[test]
fn global_aggregation_is_one_row_even_when_empty() -> Result<()> {
    let empty = sales_fixture().filter(&col("price").gt(1000))?;
    let out = empty.select(&[col("price").sum(), col("price").mean().alias("mean"), len()])?;
    assert_eq!(out.height(), 1);
    assert_eq!(out.row(0), vec![Value::Int(0), Value::Null, Value::Int(0)]);
    Ok(())
}

#[test]
fn invalid_aggregations_fail_with_the_stage() {
    let err = sales_fixture()
        .lazy()
        .group_by(["type"])
        .agg([col("type").mean()])
        .collect()
        .unwrap_err();
    assert!(matches!(err.downcast_ref::<FrameError>(), Some(FrameError::Type(_))), "{err:#}");
    assert!(format!("{err:#}").contains("GroupBy"), "{err:#}");

    let err = sales_fixture().group_by(["nope"]).agg(&[len()]).unwrap_err();
    assert!(matches!(err.downcast_ref::<FrameError>(), Some(FrameError::UnknownColumn { .. })));
}

#[test]
fn float_reductions_do_not_depend_on_batch_size() -> Result<()> {
    let n = 1_000usize;
    let keys: Vec<Option<&str>> = (0..n).map(|i| Some(["a", "b", "c"][i % 3])).collect();
    let xs = (0..n)
        .map(|i| {
            let i = u32::try_from(i).map(f64::from).unwrap_or(0.0);
            Some((i * 0.37).sin() * 1e3 + 1.0 / (i + 3.0))
        })
        .collect();
    let t = Table::new(vec![Column::from_strs("k", &keys), Column::from_f64("x", xs)])?;
    let aggs = [
        col("x").sum().alias("total"),
        col("x").mean().alias("avg"),
        col("x").std().alias("spread"),
        col("x").var().alias("var"),
    ];
    let eager = t.group_by(["k"]).agg(&aggs)?;

    for batch_size in [1, 7, n] {
        for opts in [ExecOptions::sequential(), ExecOptions::parallel(Some(3))] {
            let lazy = t
                .lazy()
                .group_by(["k"])
                .agg(aggs.clone())
                .collect_with(opts.with_batch_size(batch_size))?;
            assert_eq!(lazy, eager, "batch size {batch_size}");
        }
    }

    let global = t.lazy().select(aggs.clone());
    let whole = t.select(&aggs)?;
    for batch_size in [1, 7, n] {
        let lazy = global.collect_with(ExecOptions::sequential().with_batch_size(batch_size))?;
        assert_eq!(lazy, whole, "global, batch size {batch_size}");
    }
    Ok(())
}
