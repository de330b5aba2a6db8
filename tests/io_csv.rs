#![cfg(feature = "io-csv")]

use anyhow::Result;
use ironframe::prelude::*;
use ironframe::testing::*;
use std::fs;

fn kind(err: &anyhow::Error) -> Option<&FrameError> {
    err.downcast_ref::<FrameError>()
}

#[test]
fn reading_n_rows_yields_n_rows() -> Result<()> {
    let dir = tempfile::tempdir()?;
    for n in [0usize, 1, 99, 100, 101, 2_500] {
        let path =
            write_csv_fixture(dir.path(), &format!("orders_{n}.csv"), &orders_fixture(n, 3))?;
        let table = read_csv(&path, CsvOptions::default())?;
        assert_eq!(table.height(), n, "{}", path.display());
        assert_eq!(scan_csv(&path, CsvOptions::default())?.collect()?.height(), n);
    }
    Ok(())
}

#[test]
fn round_trip_preserves_names_types_and_nulls() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let orders = orders_fixture(250, 3);
    let path = dir.path().join("orders.csv");
    assert_eq!(write_csv(&orders, &path)?, 250);

    let back = read_csv(&path, CsvOptions::default())?;
    assert_schema(
        &back,
        &[
            ("id", DataType::Int64),
            ("region", DataType::Utf8),
            ("qty", DataType::Int64),
            ("price", DataType::Float64),
            ("day", DataType::Date),
            ("paid", DataType::Boolean),
        ],
    );
    assert_tables_equal(&back, &orders);
    Ok(())
}

#[test]
fn floats_with_integral_values_stay_floats() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let t = Table::new(vec![Column::from_f64("x", vec![Some(1.0), None, Some(-20.0)])])?;
    let path = dir.path().join("floats.csv");
    write_csv(&t, &path)?;
    let text = fs::read_to_string(&path)?;
    assert!(text.contains("1.0\n") && text.contains("-20.0\n"), "{text}");
    assert_tables_equal(&read_csv(&path, CsvOptions::default())?, &t);
    Ok(())
}

#[test]
fn options_cover_dialects() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = write_text_fixture(dir.path(), "semi.csv", "1;NA;2024-05-01\n2;x;NA\n")?;
    let options = CsvOptions::default()
        .with_delimiter(b';')
        .with_has_header(false)
        .with_null_values(["NA"]);
    let t = read_csv(&path, options)?;
    assert_schema(
        &t,
        &[
            ("column_1", DataType::Int64),
            ("column_2", DataType::Utf8),
            ("column_3", DataType::Date),
        ],
    );
    assert!(t.column("column_2")?.is_null(0));
    assert!(t.column("column_3")?.is_null(1));
    Ok(())
}

#[test]
fn explicit_schema_drives_parsing() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = write_text_fixture(dir.path(), "codes.csv", "code,amount\n007,1\n010,2\n")?;
    let schema = Schema::from_pairs([("code", DataType::Utf8), ("amount", DataType::Float64)])?;
    let t = read_csv(&path, CsvOptions::default().with_schema(schema))?;
    assert_eq!(t.column("code")?.get(0), Value::Str("007".into()));
    assert_eq!(t.column("amount")?.get(1), Value::Float(2.0));

    let wrong = Schema::from_pairs([("code", DataType::Utf8)])?;
    let err = read_csv(&path, CsvOptions::default().with_schema(wrong)).unwrap_err();
    assert!(matches!(kind(&err), Some(FrameError::SchemaMismatch(_))), "{err:#}");
    Ok(())
}

#[test]
fn values_past_the_sample_must_parse() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = write_text_fixture(dir.path(), "late.csv", "a,b\n1,2\n3,oops\n")?;
    let err = read_csv(&path, CsvOptions::default().with_infer_schema_length(Some(1))).unwrap_err();
    match kind(&err) {
        Some(FrameError::Parse { location, .. }) => assert!(location.contains("'b'"), "{location}"),
        other => panic!("expected a parse error, got {other:?}: {err:#}"),
    }

    // Sampling the whole file sees the text and infers a string column instead.
    let t = read_csv(&path, CsvOptions::default().with_infer_schema_length(None))?;
    assert_eq!(t.column("b")?.dtype(), DataType::Utf8);
    Ok(())
}

#[test]
fn missing_files_fail_eagerly() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("nope.csv");
    let err = read_csv(&missing, CsvOptions::default()).unwrap_err();
    assert!(matches!(kind(&err), Some(FrameError::SourceNotFound { .. })), "{err:#}");
    let err = scan_csv(&missing, CsvOptions::default()).unwrap_err();
    assert!(matches!(kind(&err), Some(FrameError::SourceNotFound { .. })), "{err:#}");
}

#[test]
fn lazy_scan_rereads_on_every_collect() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = write_csv_fixture(dir.path(), "sales.csv", &sales_fixture())?;
    let lf = scan_csv(&path, CsvOptions::default())?
        .group_by(["type"])
        .agg([col("price").sum()]);

    let first = lf.collect()?;
    let second = lf.collect()?;
    assert_tables_equal(&first, &second);
    assert_eq!(first.height(), 2);
    Ok(())
}

#[test]
fn sink_writes_the_materialized_result() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let out = dir.path().join("nested").join("cheap.csv");
    let rows = sales_fixture().lazy().filter(col("price").lt(15)).sink_csv(&out)?;
    assert_eq!(rows, 2);
    assert_eq!(fs::read_to_string(&out)?, "type,price\nA,10\nB,5\n");
    Ok(())
}
