use anyhow::Result;
use chrono::NaiveDate;
use ironframe::prelude::*;
use ironframe::testing::*;

fn sample() -> Result<Table> {
    Table::new(vec![
        Column::from_i64("a", vec![Some(7), None, Some(-3), Some(4)]),
        Column::from_i64("b", vec![Some(2), Some(5), Some(0), None]),
        Column::from_f64("f", vec![Some(0.5), Some(1.5), None, Some(2.0)]),
        Column::from_bool("p", vec![Some(true), Some(false), None, Some(true)]),
        Column::from_strs("s", &[Some("Apple"), None, Some("berry"), Some("cherry")]),
        Column::from_dates(
            "d",
            vec![
                NaiveDate::from_ymd_opt(2024, 2, 29),
                None,
                NaiveDate::from_ymd_opt(1999, 12, 31),
                NaiveDate::from_ymd_opt(2000, 1, 1),
            ],
        ),
    ])
}

fn values(t: &Table, name: &str) -> Result<Vec<Value>> {
    Ok(t.column(name)?.values().collect())
}

#[test]
fn arithmetic_types_and_nulls() -> Result<()> {
    let t = sample()?.select(&[
        (col("a") + col("b")).alias("add"),
        (col("a") / col("b")).alias("div"),
        (col("a") % col("b")).alias("rem"),
        (col("a") * col("f")).alias("mixed"),
        (-col("a")).alias("neg"),
        col("a").abs().alias("abs"),
    ])?;
    assert_schema(
        &t,
        &[
            ("add", DataType::Int64),
            ("div", DataType::Float64),
            ("rem", DataType::Int64),
            ("mixed", DataType::Float64),
            ("neg", DataType::Int64),
            ("abs", DataType::Int64),
        ],
    );
    assert_eq!(values(&t, "add")?, vec![Value::Int(9), Value::Null, Value::Int(-3), Value::Null]);
    assert_eq!(values(&t, "div")?[0], Value::Float(3.5));
    assert_eq!(values(&t, "div")?[2], Value::Float(f64::NEG_INFINITY));
    // Integer modulo by zero has no value.
    assert_eq!(values(&t, "rem")?, vec![Value::Int(1), Value::Null, Value::Null, Value::Null]);
    assert_eq!(
        values(&t, "mixed")?,
        vec![Value::Float(3.5), Value::Null, Value::Null, Value::Float(8.0)]
    );
    assert_eq!(values(&t, "abs")?[2], Value::Int(3));
    Ok(())
}

#[test]
fn comparisons_propagate_null() -> Result<()> {
    let t = sample()?.select(&[
        col("a").gt(0).alias("pos"),
        col("a").gt(lit(Value::Null)).alias("vs_null"),
    ])?;
    assert_eq!(
        values(&t, "pos")?,
        vec![Value::Bool(true), Value::Null, Value::Bool(false), Value::Bool(true)]
    );
    assert!(t.column("vs_null")?.values().all(|v| v.is_null()));
    Ok(())
}

#[test]
fn three_valued_logic() -> Result<()> {
    const T: Option<bool> = Some(true);
    const F: Option<bool> = Some(false);
    const N: Option<bool> = None;
    let t = Table::new(vec![
        Column::from_bool("x", [T, T, T, F, F, F, N, N, N].to_vec()),
        Column::from_bool("y", [T, F, N, T, F, N, T, F, N].to_vec()),
    ])?;
    let out = t.select(&[
        col("x").and(col("y")).alias("and"),
        col("x").or(col("y")).alias("or"),
        (!col("x")).alias("not"),
    ])?;
    let (t_, f_, n_) = (Value::Bool(true), Value::Bool(false), Value::Null);
    let bools = |xs: [Option<bool>; 9]| xs.map(|x| x.map_or(n_.clone(), Value::Bool)).to_vec();
    assert_eq!(values(&out, "and")?, bools([T, F, N, F, F, F, N, F, N]));
    assert_eq!(values(&out, "or")?, bools([T, T, T, T, F, N, T, N, N]));
    assert_eq!(values(&out, "not")?[0], f_);
    assert_eq!(values(&out, "not")?[3], t_);
    assert_eq!(values(&out, "not")?[6], n_);
    Ok(())
}

#[test]
fn filter_treats_null_as_false() -> Result<()> {
    let t = sample()?;
    let kept = t.filter(&col("p"))?;
    assert_eq!(kept.height(), 2);
    let kept = t.filter(&col("a").gt(0).and(col("p")))?;
    assert_eq!(values(&kept, "a")?, vec![Value::Int(7), Value::Int(4)]);
    Ok(())
}

#[test]
fn null_defined_operations() -> Result<()> {
    let t = sample()?.select(&[
        col("a").is_null().alias("a_null"),
        col("b").is_not_null().alias("b_set"),
        coalesce([col("a"), col("b"), lit(0)]).alias("first"),
        col("f").fill_null(-1.0).alias("filled"),
    ])?;
    assert_eq!(
        values(&t, "a_null")?,
        vec![Value::Bool(false), Value::Bool(true), Value::Bool(false), Value::Bool(false)]
    );
    assert_eq!(
        values(&t, "b_set")?,
        vec![Value::Bool(true), Value::Bool(true), Value::Bool(true), Value::Bool(false)]
    );
    assert_eq!(
        values(&t, "first")?,
        vec![Value::Int(7), Value::Int(5), Value::Int(-3), Value::Int(4)]
    );
    assert_eq!(values(&t, "filled")?[2], Value::Float(-1.0));
    Ok(())
}

#[test]
fn string_and_date_helpers() -> Result<()> {
    let t = sample()?.select(&[
        col("s").to_uppercase().alias("up"),
        col("s").str_len().alias("len"),
        col("s").str_contains("^[bc]").alias("bc"),
        col("s").is_in(["Apple", "cherry"]).alias("known"),
        col("d").year().alias("y"),
        col("d").month().alias("m"),
        col("d").day().alias("dd"),
    ])?;
    assert_eq!(values(&t, "up")?[0], Value::Str("APPLE".into()));
    assert_eq!(values(&t, "len")?, vec![Value::Int(5), Value::Null, Value::Int(5), Value::Int(6)]);
    assert_eq!(
        values(&t, "bc")?,
        vec![Value::Bool(false), Value::Null, Value::Bool(true), Value::Bool(true)]
    );
    assert_eq!(values(&t, "known")?[3], Value::Bool(true));
    assert_eq!(values(&t, "y")?[0], Value::Int(2024));
    assert_eq!(values(&t, "m")?[0], Value::Int(2));
    assert_eq!(values(&t, "dd")?[0], Value::Int(29));
    Ok(())
}

#[test]
fn casts_are_lenient_unless_strict() -> Result<()> {
    let t = Table::new(vec![Column::from_strs("raw", &[Some("12"), Some("x"), None])])?;
    let out = t.select(&[col("raw").cast(DataType::Int64)])?;
    assert_eq!(values(&out, "raw")?, vec![Value::Int(12), Value::Null, Value::Null]);

    let err = t.select(&[col("raw").strict_cast(DataType::Int64)]).unwrap_err();
    assert!(matches!(err.downcast_ref::<FrameError>(), Some(FrameError::Type(_))), "{err:#}");
    Ok(())
}

#[test]
fn strict_float_to_int_rejects_fractions() -> Result<()> {
    let t = Table::new(vec![Column::from_f64("x", vec![Some(2.0), Some(-1.5), None])])?;
    let loose = t.select(&[col("x").cast(DataType::Int64)])?;
    assert_eq!(values(&loose, "x")?, vec![Value::Int(2), Value::Int(-1), Value::Null]);

    let err = t.select(&[col("x").strict_cast(DataType::Int64)]).unwrap_err();
    assert!(matches!(err.downcast_ref::<FrameError>(), Some(FrameError::Type(_))), "{err:#}");
    assert!(format!("{err:#}").contains("-1.5"), "{err:#}");

    let whole = t.slice(0, 1).select(&[col("x").strict_cast(DataType::Int64)])?;
    assert_eq!(values(&whole, "x")?, vec![Value::Int(2)]);
    Ok(())
}

#[test]
fn type_errors_are_reported() -> Result<()> {
    let t = sample()?;
    for bad in [col("s") * 2, col("a").and(col("p")), col("d").str_len(), col("a").year()] {
        let err = t.select(&[bad.clone()]).unwrap_err();
        assert!(
            matches!(err.downcast_ref::<FrameError>(), Some(FrameError::Type(_))),
            "{bad}: {err:#}"
        );
    }
    Ok(())
}

#[test]
fn output_names_follow_alias_then_leftmost_column() {
    assert_eq!((col("a") + col("b")).output_name(), "a");
    assert_eq!((lit(1) + col("b")).output_name(), "b");
    assert_eq!(lit(1).output_name(), "literal");
    assert_eq!(col("a").alias("z").output_name(), "z");
}

#[test]
fn aggregates_outside_select_are_rejected() {
    let err = sample().and_then(|t| t.with_columns(&[col("a").sum()])).unwrap_err();
    assert!(matches!(err.downcast_ref::<FrameError>(), Some(FrameError::Type(_))), "{err:#}");
}
