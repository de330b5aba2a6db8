//! Table assertions with readable failure messages.

use crate::dtype::DataType;
use crate::table::Table;
use crate::value::Value;
use std::cmp::Ordering;

fn same(a: &Value, b: &Value) -> bool {
    a.total_cmp(b) == Ordering::Equal && a.is_null() == b.is_null()
}

/// Assert that two tables have the same column names, types, and values in
/// the same row order. Floats compare by total order, so `NaN == NaN`.
///
/// # Panics
/// On the first difference, naming the column and row.
///
/// # Example
///
/// ```
/// use ironframe::prelude::*;
/// use ironframe::testing::assert_tables_equal;
///
/// let t = Table::new(vec![Column::from_i64("x", vec![Some(1), None])]).unwrap();
/// assert_tables_equal(&t.clone(), &t);
/// ```
pub fn assert_tables_equal(actual: &Table, expected: &Table) {
    assert_eq!(
        actual.column_names(),
        expected.column_names(),
        "Column names differ:\n  Expected: {:?}\n  Actual: {:?}",
        expected.column_names(),
        actual.column_names()
    );
    for (a, e) in actual.columns().iter().zip(expected.columns()) {
        assert_eq!(
            a.dtype(),
            e.dtype(),
            "Column '{}' type differs: expected {}, actual {}",
            e.name(),
            e.dtype(),
            a.dtype()
        );
    }
    assert_eq!(
        actual.height(),
        expected.height(),
        "Row count differs:\n  Expected: {}\n  Actual: {}\n\
         Expected table:\n{expected}\nActual table:\n{actual}",
        expected.height(),
        actual.height()
    );
    for (a, e) in actual.columns().iter().zip(expected.columns()) {
        for i in 0..e.len() {
            let (av, ev) = (a.get(i), e.get(i));
            assert!(
                same(&av, &ev),
                "Mismatch in column '{}' at row {i}:\n  Expected: {ev}\n  Actual: {av}\n\
                 Expected table:\n{expected}\nActual table:\n{actual}",
                e.name()
            );
        }
    }
}

fn sorted_rows(t: &Table) -> Vec<Vec<Value>> {
    let mut rows: Vec<Vec<Value>> = (0..t.height()).map(|i| t.row(i)).collect();
    rows.sort_by(|a, b| {
        a.iter()
            .zip(b)
            .map(|(x, y)| x.total_cmp(y))
            .find(|o| o.is_ne())
            .unwrap_or(Ordering::Equal)
    });
    rows
}

/// Assert that two tables hold the same multiset of rows, ignoring row order.
///
/// Useful after a group-by, whose output order is not part of its contract.
///
/// # Panics
/// If names, types, row counts, or any sorted row differ.
pub fn assert_tables_equal_unordered(actual: &Table, expected: &Table) {
    assert_eq!(
        actual.column_names(),
        expected.column_names(),
        "Column names differ:\n  Expected: {:?}\n  Actual: {:?}",
        expected.column_names(),
        actual.column_names()
    );
    let types = |t: &Table| t.columns().iter().map(|c| c.dtype()).collect::<Vec<DataType>>();
    assert_eq!(types(actual), types(expected), "Column types differ");
    assert_eq!(
        actual.height(),
        expected.height(),
        "Row count differs:\nExpected table:\n{expected}\nActual table:\n{actual}"
    );
    for (i, (a, e)) in sorted_rows(actual).iter().zip(sorted_rows(expected).iter()).enumerate() {
        let equal = a.len() == e.len() && a.iter().zip(e).all(|(x, y)| same(x, y));
        assert!(
            equal,
            "Row content differs (sorted row {i}):\n  Expected: {e:?}\n  Actual: {a:?}\n\
             Expected table:\n{expected}\nActual table:\n{actual}"
        );
    }
}

/// Assert that `table` has exactly the given column names and types.
///
/// # Panics
/// If the schema differs.
pub fn assert_schema(table: &Table, expected: &[(&str, DataType)]) {
    let actual: Vec<(&str, DataType)> =
        table.columns().iter().map(|c| (c.name(), c.dtype())).collect();
    assert_eq!(actual, expected, "Schema mismatch");
}
