//! # Ironframe
//!
//! A **lazy, expression-based DataFrame engine** for tabular data. Build a
//! pipeline of declarative stages (read, normalize, filter, derive, group and
//! aggregate, sort, join) and either run each stage immediately on a
//! [`Table`] or accumulate them in a [`LazyFrame`] that is optimized and
//! materialized on demand.
//!
//! ## Key Features
//!
//! - **Columnar tables** of six semantic types (`Int64`, `Float64`, `Utf8`,
//!   `Boolean`, `Date`, `Categorical`) with null in every position
//! - **Composable expressions**: arithmetic, comparisons, three-valued logic,
//!   casts, string and date helpers, `coalesce`, aggregations
//! - **Eager and lazy APIs** with the same stage vocabulary
//! - **Planner** with filter fusion, predicate and limit pushdown, and `explain`
//! - **Sequential and parallel execution** that return identical tables
//! - **Guards**: cancellation tokens, deadlines, and source row caps
//! - **I/O**: CSV, JSON Lines, and Parquet, globbing, transparent compression
//!
//! ## Quick Start
//!
//! ```
//! use ironframe::prelude::*;
//! # use anyhow::Result;
//!
//! # fn main() -> Result<()> {
//! let sales = Table::new(vec![
//!     Column::from_strs("type", &[Some("A"), Some("A"), Some("B")]),
//!     Column::from_i64("price", vec![Some(10), Some(20), Some(5)]),
//! ])?;
//!
//! // Eager: each call runs immediately.
//! let expensive = sales.filter(&col("price").gt(8))?;
//! assert_eq!(expensive.height(), 2);
//!
//! // Lazy: stages accumulate until `collect`.
//! let totals = sales
//!     .lazy()
//!     .with_column((col("price") * 2).alias("double"))
//!     .group_by(["type"])
//!     .agg([col("price").sum(), col("double").mean().alias("avg_double")])
//!     .sort(["type"])
//!     .collect()?;
//! assert_eq!(totals.height(), 2);
//! # Ok(())
//! # }
//! ```
//!
//! ## Core Concepts
//!
//! ### Tables and columns
//!
//! A [`Table`] is an ordered list of uniquely named [`Column`]s of equal
//! length. Each column stores `Option<T>` cells of one [`DataType`].
//!
//! ### Expressions
//!
//! An [`Expr`] is a deferred column computation, built with [`col`], [`lit`],
//! operators and methods. Every operator propagates null (`null > 1` is null);
//! `and` / `or` follow three-valued logic; a filter keeps only rows whose
//! predicate is `true`.
//!
//! ### Plans
//!
//! A [`LazyFrame`] is a handle into a [`Pipeline`] arena of stage nodes.
//! [`LazyFrame::collect`] linearizes the stages, checks every column
//! reference and type, applies optimizations that never change the output,
//! and hands the plan to a [`Runner`]. Errors name the failing stage:
//! `stage 2 (WithColumns): unknown column 'x'`.
//!
//! ### Execution
//!
//! Sources are read in batches. Row-wise stages run batch by batch,
//! concurrently in parallel mode; group-by, sort and join gather their input.
//! Partial aggregates merge in batch order, so parallel and sequential runs
//! produce identical tables. See [`ExecOptions`] for cancellation, timeouts
//! and row caps.
//!
//! ## I/O Operations
//!
//! All formats are optional via feature flags and accept glob patterns:
//!
//! - **CSV** (`io-csv`): [`read_csv`], [`scan_csv`], [`write_csv`]
//! - **JSON Lines** (`io-jsonl`): [`read_jsonl`], [`scan_jsonl`], [`write_jsonl`]
//! - **Parquet** (`io-parquet`): [`read_parquet`], [`scan_parquet`], [`write_parquet`]
//!
//! Any other source (a spreadsheet, a database query) plugs in by
//! implementing [`TableSource`](source::TableSource).
//!
//! ## Errors and logging
//!
//! Fallible functions return [`anyhow::Result`]; the typed
//! [`FrameError`] kind sits at the root of every chain and is recovered with
//! `err.downcast_ref::<FrameError>()`. Events are emitted through `tracing`;
//! [`logging::init`] installs a subscriber filtered by `RUST_LOG`.

pub mod column;
pub mod combiners;
pub mod config;
pub mod dtype;
pub mod error;
pub mod eval;
pub mod expr;
pub mod io;
pub mod lazy;
pub mod logging;
pub mod node;
pub mod node_id;
pub mod ops;
pub mod pipeline;
pub mod planner;
pub mod runner;
pub mod source;
pub mod table;
pub mod testing;
pub mod value;

// General re-exports
pub use column::{Column, ColumnData};
pub use combiners::AggFunc;
pub use config::EngineConfig;
pub use dtype::{DataType, Field, Schema};
pub use error::{CancelReason, FrameError};
pub use expr::{Expr, coalesce, col, len, lit};
pub use lazy::{LazyFrame, LazyGroupBy};
pub use node_id::NodeId;
pub use ops::JoinType;
pub use pipeline::Pipeline;
pub use planner::{ExecutionExplanation, Plan};
pub use runner::{CancelToken, ExecMode, ExecOptions, Runner};
pub use source::{MemorySource, TableSource};
pub use table::Table;
pub use value::Value;

// Gated re-exports
#[cfg(feature = "io-csv")]
pub use io::csv::{CsvOptions, read_csv, scan_csv, write_csv};

#[cfg(feature = "io-jsonl")]
pub use io::jsonl::{JsonlOptions, read_jsonl, scan_jsonl, write_jsonl};

#[cfg(feature = "io-parquet")]
pub use io::parquet::{read_parquet, scan_parquet, write_parquet};

/// Everything needed to build and run pipelines.
pub mod prelude {
    pub use crate::column::Column;
    pub use crate::dtype::{DataType, Field, Schema};
    pub use crate::error::FrameError;
    pub use crate::expr::{Expr, coalesce, col, len, lit};
    pub use crate::lazy::LazyFrame;
    pub use crate::ops::JoinType;
    pub use crate::runner::{CancelToken, ExecOptions};
    pub use crate::table::Table;
    pub use crate::value::Value;

    #[cfg(feature = "io-csv")]
    pub use crate::io::csv::{CsvOptions, read_csv, scan_csv, write_csv};
    #[cfg(feature = "io-jsonl")]
    pub use crate::io::jsonl::{JsonlOptions, read_jsonl, scan_jsonl, write_jsonl};
    #[cfg(feature = "io-parquet")]
    pub use crate::io::parquet::{read_parquet, scan_parquet, write_parquet};
}
