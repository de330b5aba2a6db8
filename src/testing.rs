//! Helpers for testing pipelines built on this crate.
//!
//! - **Assertions**: [`assert_tables_equal`] (row order matters),
//!   [`assert_tables_equal_unordered`] (for group-by output), [`assert_schema`]
//! - **Fixtures**: [`sales_fixture`], [`orders_fixture`], [`write_csv_fixture`],
//!   [`write_text_fixture`]
//!
//! ```
//! use ironframe::prelude::*;
//! use ironframe::testing::*;
//!
//! # fn main() -> anyhow::Result<()> {
//! let out = sales_fixture()
//!     .lazy()
//!     .group_by(["type"])
//!     .agg([col("price").sum()])
//!     .collect()?;
//! let expected = Table::new(vec![
//!     Column::from_strs("type", &[Some("B"), Some("A")]),
//!     Column::from_i64("price", vec![Some(5), Some(30)]),
//! ])?;
//! assert_tables_equal_unordered(&out, &expected);
//! # Ok(())
//! # }
//! ```

pub mod assertions;
pub mod fixtures;

pub use assertions::*;
pub use fixtures::*;
