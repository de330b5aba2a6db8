//! File formats.
//!
//! Each format offers an eager `read_*` returning a [`Table`](crate::Table),
//! a lazy `scan_*` returning a [`LazyFrame`](crate::LazyFrame) backed by a
//! [`TableSource`](crate::source::TableSource), and a `write_*`. Text formats
//! are transparently (de)compressed; all formats accept glob patterns.

pub mod compression;
pub mod glob;

#[cfg_attr(docsrs, doc(cfg(feature = "io-jsonl")))]
#[cfg(feature = "io-jsonl")]
pub mod jsonl;

#[cfg_attr(docsrs, doc(cfg(feature = "io-csv")))]
#[cfg(feature = "io-csv")]
pub mod csv;

#[cfg_attr(docsrs, doc(cfg(feature = "io-parquet")))]
#[cfg(feature = "io-parquet")]
pub mod parquet;

#[cfg(any(feature = "io-csv", feature = "io-jsonl"))]
use self::compression::FinishWrite;
use crate::source::BatchIter;
use crate::table::Table;
use anyhow::{Context, Result};
use std::fs::{File, create_dir_all};
use std::io::Read;
use std::path::Path;

#[cfg(feature = "io-csv")]
pub use self::csv::{CsvOptions, CsvSource, read_csv, scan_csv, write_csv, write_csv_with};
#[cfg(feature = "io-jsonl")]
pub use self::jsonl::{JsonlOptions, JsonlSource, read_jsonl, scan_jsonl, write_jsonl};
#[cfg(feature = "io-parquet")]
pub use self::parquet::{ParquetSource, read_parquet, scan_parquet, write_parquet};

/// Rows sampled for type inference unless configured otherwise.
pub const DEFAULT_INFER_SCHEMA_LENGTH: usize = 100;

/// Open `path` for reading, decompressing as needed.
#[cfg(any(feature = "io-csv", feature = "io-jsonl"))]
pub(crate) fn open_text(path: &Path) -> Result<Box<dyn Read>> {
    let f = File::open(path).with_context(|| format!("open {}", path.display()))?;
    compression::auto_detect_reader(f, path)
        .with_context(|| format!("setup decompression for {}", path.display()))
}

/// Create `path` (and its parent directories) for writing, compressing by extension.
#[cfg(any(feature = "io-csv", feature = "io-jsonl"))]
pub(crate) fn create_text(path: &Path) -> Result<Box<dyn FinishWrite>> {
    ensure_parent(path)?;
    let f = File::create(path).with_context(|| format!("create {}", path.display()))?;
    compression::auto_detect_writer(f, path)
        .with_context(|| format!("setup compression for {}", path.display()))
}

pub(crate) fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        create_dir_all(parent).with_context(|| format!("mkdir -p {}", parent.display()))?;
    }
    Ok(())
}

/// Drain a source's batches into one table, falling back to `empty` when none arrive.
pub(crate) fn drain(batches: BatchIter, empty: Table) -> Result<Table> {
    let parts = batches.collect::<Result<Vec<Table>>>()?;
    if parts.is_empty() {
        return Ok(empty);
    }
    Table::vstack(&parts)
}
