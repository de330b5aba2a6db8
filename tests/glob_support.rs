#![cfg(feature = "io-csv")]

use anyhow::Result;
use ironframe::io::glob::{expand_glob, is_glob};
use ironframe::prelude::*;
use ironframe::testing::*;

#[test]
fn csv_parts_read_in_sorted_order() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let orders = orders_fixture(90, 3);
    // written out of order on purpose
    for i in [2usize, 0, 1] {
        write_csv_fixture(dir.path(), &format!("part-{i}.csv"), &orders.slice(i * 30, 30))?;
    }
    let pattern = dir.path().join("part-*.csv");
    let pattern_text = pattern.to_string_lossy().to_string();
    assert!(is_glob(&pattern_text));
    assert_eq!(expand_glob(&pattern_text)?.len(), 3);

    let all = read_csv(&pattern, CsvOptions::default())?;
    assert_tables_equal(&all, &orders);

    let small_batches = scan_csv(&pattern, CsvOptions::default().with_batch_size(7))?
        .filter(col("id").gt_eq(25).and(col("id").lt(65)))
        .collect_seq()?;
    let middle = col("id").gt_eq(25).and(col("id").lt(65));
    assert_tables_equal(&small_batches, &orders.filter(&middle)?);
    Ok(())
}

#[test]
fn parts_with_different_headers_are_rejected() -> Result<()> {
    let dir = tempfile::tempdir()?;
    write_text_fixture(dir.path(), "a.csv", "x,y\n1,2\n")?;
    write_text_fixture(dir.path(), "b.csv", "x,z\n3,4\n")?;
    let err = read_csv(dir.path().join("*.csv"), CsvOptions::default()).unwrap_err();
    assert!(
        matches!(err.downcast_ref::<FrameError>(), Some(FrameError::SchemaMismatch(_))),
        "{err:#}"
    );
    Ok(())
}

#[test]
fn a_pattern_matching_nothing_is_source_not_found() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let err = scan_csv(dir.path().join("*.csv"), CsvOptions::default()).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<FrameError>(),
        Some(FrameError::SourceNotFound { .. })
    ));
    Ok(())
}
