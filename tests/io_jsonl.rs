#![cfg(feature = "io-jsonl")]

use anyhow::Result;
use ironframe::prelude::*;
use ironframe::testing::*;
use std::fs;

#[test]
fn round_trip_with_a_schema_restores_every_type() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let orders = orders_fixture(150, 3);
    let path = dir.path().join("orders.jsonl");
    assert_eq!(write_jsonl(&orders, &path)?, 150);

    let typed = read_jsonl(&path, JsonlOptions::default().with_schema(orders.schema()))?;
    assert_tables_equal(&typed, &orders);

    // Without a schema, dates come back as their text.
    let inferred = read_jsonl(&path, JsonlOptions::default())?;
    assert_schema(
        &inferred,
        &[
            ("id", DataType::Int64),
            ("region", DataType::Utf8),
            ("qty", DataType::Int64),
            ("price", DataType::Float64),
            ("day", DataType::Utf8),
            ("paid", DataType::Boolean),
        ],
    );
    assert_eq!(inferred.column("day")?.get(0), Value::Str("2024-01-01".into()));
    Ok(())
}

#[test]
fn one_object_per_line_in_column_order() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let t = Table::new(vec![
        Column::from_strs("name", &[Some("a\"b"), None]),
        Column::from_f64("score", vec![Some(1.5), Some(f64::NAN)]),
    ])?;
    let path = dir.path().join("scores.jsonl");
    write_jsonl(&t, &path)?;
    let text = fs::read_to_string(&path)?;
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines, vec![r#"{"name":"a\"b","score":1.5}"#, r#"{"name":null,"score":null}"#]);
    Ok(())
}

#[test]
fn mixed_numbers_widen_and_mixed_kinds_become_text() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = write_text_fixture(
        dir.path(),
        "mixed.jsonl",
        "{\"n\": 1, \"m\": 1}\n{\"n\": 2.5, \"m\": \"two\"}\n{\"extra\": true}\n",
    )?;
    let t = read_jsonl(&path, JsonlOptions::default())?;
    assert_schema(
        &t,
        &[("n", DataType::Float64), ("m", DataType::Utf8), ("extra", DataType::Boolean)],
    );
    assert_eq!(t.height(), 3);
    assert_eq!(t.column("m")?.get(0), Value::Str("1".into()));
    assert!(t.column("n")?.is_null(2));
    assert!(t.column("extra")?.is_null(0));
    Ok(())
}

#[test]
fn lazy_scan_over_a_glob() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let sales = sales_fixture();
    write_jsonl(&sales, dir.path().join("2024-01.jsonl"))?;
    write_jsonl(&sales, dir.path().join("2024-02.jsonl"))?;

    let out = scan_jsonl(dir.path().join("2024-*.jsonl"), JsonlOptions::default())?
        .group_by(["type"])
        .agg([col("price").sum()])
        .collect()?;
    let expected = Table::new(vec![
        Column::from_strs("type", &[Some("A"), Some("B")]),
        Column::from_i64("price", vec![Some(60), Some(10)]),
    ])?;
    assert_tables_equal_unordered(&out, &expected);
    Ok(())
}

#[test]
fn missing_file_is_source_not_found() {
    let err = read_jsonl("/definitely/not/here.jsonl", JsonlOptions::default()).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<FrameError>(),
        Some(FrameError::SourceNotFound { .. })
    ));
}
