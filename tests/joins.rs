use anyhow::Result;
use ironframe::prelude::*;
use ironframe::testing::*;

fn people() -> Result<Table> {
    Table::new(vec![
        Column::from_i64("id", vec![Some(1), Some(2), None, Some(4)]),
        Column::from_strs("name", &[Some("ann"), Some("bob"), Some("cy"), Some("di")]),
    ])
}

fn orders() -> Result<Table> {
    Table::new(vec![
        Column::from_i64("id", vec![Some(2), Some(1), Some(2), None, Some(9)]),
        Column::from_i64("amount", vec![Some(10), Some(20), Some(30), Some(40), Some(50)]),
        Column::from_strs("name", &[Some("o1"), Some("o2"), Some("o3"), Some("o4"), Some("o5")]),
    ])
}

fn expected(
    ids: Vec<Option<i64>>,
    names: &[Option<&str>],
    amounts: Vec<Option<i64>>,
    labels: &[Option<&str>],
) -> Result<Table> {
    Table::new(vec![
        Column::from_i64("id", ids),
        Column::from_strs("name", names),
        Column::from_i64("amount", amounts),
        Column::from_strs("name_right", labels),
    ])
}

#[test]
fn inner_join_skips_null_keys_and_suffixes_collisions() -> Result<()> {
    let out = people()?.join(&orders()?, &["id"], JoinType::Inner)?;
    let want = expected(
        vec![Some(1), Some(2), Some(2)],
        &[Some("ann"), Some("bob"), Some("bob")],
        vec![Some(20), Some(10), Some(30)],
        &[Some("o2"), Some("o1"), Some("o3")],
    )?;
    assert_tables_equal(&out, &want);
    Ok(())
}

#[test]
fn left_join_keeps_every_left_row() -> Result<()> {
    let out = people()?.join(&orders()?, &["id"], JoinType::Left)?;
    let want = expected(
        vec![Some(1), Some(2), Some(2), None, Some(4)],
        &[Some("ann"), Some("bob"), Some("bob"), Some("cy"), Some("di")],
        vec![Some(20), Some(10), Some(30), None, None],
        &[Some("o2"), Some("o1"), Some("o3"), None, None],
    )?;
    assert_tables_equal(&out, &want);
    Ok(())
}

#[test]
fn right_join_appends_unmatched_right_rows() -> Result<()> {
    let out = people()?.join(&orders()?, &["id"], JoinType::Right)?;
    let want = expected(
        vec![Some(1), Some(2), Some(2), None, Some(9)],
        &[Some("ann"), Some("bob"), Some("bob"), None, None],
        vec![Some(20), Some(10), Some(30), Some(40), Some(50)],
        &[Some("o2"), Some("o1"), Some("o3"), Some("o4"), Some("o5")],
    )?;
    assert_tables_equal(&out, &want);
    Ok(())
}

#[test]
fn full_join_is_left_plus_unmatched_right() -> Result<()> {
    let out = people()?.join(&orders()?, &["id"], JoinType::Full)?;
    assert_eq!(out.height(), 7);
    let want = expected(
        vec![Some(1), Some(2), Some(2), None, Some(4), None, Some(9)],
        &[Some("ann"), Some("bob"), Some("bob"), Some("cy"), Some("di"), None, None],
        vec![Some(20), Some(10), Some(30), None, None, Some(40), Some(50)],
        &[Some("o2"), Some("o1"), Some("o3"), None, None, Some("o4"), Some("o5")],
    )?;
    assert_tables_equal(&out, &want);
    Ok(())
}

#[test]
fn lazy_join_matches_eager() -> Result<()> {
    let labels = Table::new(vec![
        Column::from_strs("type", &[Some("A"), Some("B")]),
        Column::from_strs("label", &[Some("alpha"), Some("beta")]),
    ])?;
    let lazy = sales_fixture()
        .lazy()
        .filter(col("price").gt(6))
        .join(&labels.lazy(), ["type"], JoinType::Left)?
        .collect()?;
    let eager = sales_fixture()
        .filter(&col("price").gt(6))?
        .join(&labels, &["type"], JoinType::Left)?;
    assert_tables_equal(&lazy, &eager);
    assert_schema(
        &lazy,
        &[("type", DataType::Utf8), ("price", DataType::Int64), ("label", DataType::Utf8)],
    );
    Ok(())
}

#[test]
fn incompatible_key_types_are_type_errors() -> Result<()> {
    let by_text = Table::new(vec![Column::from_strs("id", &[Some("1")])])?;
    let err = people()?.join(&by_text, &["id"], JoinType::Inner).unwrap_err();
    assert!(matches!(err.downcast_ref::<FrameError>(), Some(FrameError::Type(_))), "{err:#}");

    let err = people()?.join(&orders()?, &["missing"], JoinType::Inner).unwrap_err();
    assert!(matches!(err.downcast_ref::<FrameError>(), Some(FrameError::UnknownColumn { .. })));
    Ok(())
}
