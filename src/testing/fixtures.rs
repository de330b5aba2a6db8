//! Ready-made tables and files for tests.

use crate::column::Column;
use crate::table::Table;
use anyhow::Result;
use chrono::NaiveDate;
use std::path::{Path, PathBuf};

/// The three-row sales table: `type` = `[A, A, B]`, `price` = `[10, 20, 5]`.
///
/// # Example
///
/// ```
/// use ironframe::testing::sales_fixture;
///
/// assert_eq!(sales_fixture().height(), 3);
/// ```
#[must_use]
pub fn sales_fixture() -> Table {
    Table::new(vec![
        Column::from_strs("type", &[Some("A"), Some("A"), Some("B")]),
        Column::from_i64("price", vec![Some(10), Some(20), Some(5)]),
    ])
    .unwrap_or_default()
}

/// A deterministic table of `n` orders across `regions` regions.
///
/// Columns: `id` (0..n), `region` (`r0`.., null every 11th row), `qty`
/// (`1 + id % 5`, null every 13th row), `price` (`id % 7 + 0.25`), `day`
/// (dates cycling through January 2024) and `paid` (`id % 3 != 0`).
/// The per-region total of `qty` is known in closed form, which makes the
/// table a good input for aggregation checks.
#[must_use]
pub fn orders_fixture(n: usize, regions: usize) -> Table {
    let regions = i64::try_from(regions.max(1)).unwrap_or(1);
    let ids: Vec<i64> = (0..n).map(|i| i64::try_from(i).unwrap_or(i64::MAX)).collect();
    let region = ids
        .iter()
        .map(|&i| (i % 11 != 10).then(|| format!("r{}", i % regions)))
        .collect();
    let qty = ids.iter().map(|&i| (i % 13 != 12).then_some(1 + i % 5)).collect();
    #[allow(clippy::cast_precision_loss)]
    let price = ids.iter().map(|&i| Some((i % 7) as f64 + 0.25)).collect();
    let day = ids
        .iter()
        .map(|&i| NaiveDate::from_ymd_opt(2024, 1, u32::try_from(1 + i % 31).unwrap_or(1)))
        .collect();
    let paid = ids.iter().map(|&i| Some(i % 3 != 0)).collect();
    Table::new(vec![
        Column::from_i64("id", ids.iter().copied().map(Some).collect()),
        Column::from_strings("region", region),
        Column::from_i64("qty", qty),
        Column::from_f64("price", price),
        Column::from_dates("day", day),
        Column::from_bool("paid", paid),
    ])
    .unwrap_or_default()
}

/// Write `table` as `dir/name` in CSV and return the path.
///
/// # Errors
/// I/O failures.
#[cfg(feature = "io-csv")]
pub fn write_csv_fixture(dir: &Path, name: &str, table: &Table) -> Result<PathBuf> {
    let path = dir.join(name);
    crate::io::write_csv(table, &path)?;
    Ok(path)
}

/// Write raw `contents` as `dir/name` and return the path.
///
/// # Errors
/// I/O failures.
pub fn write_text_fixture(dir: &Path, name: &str, contents: &str) -> Result<PathBuf> {
    let path = dir.join(name);
    std::fs::write(&path, contents)?;
    Ok(path)
}
