//! Data sources: anything that can describe its schema and stream batches.
//!
//! File readers in [`crate::io`] implement [`TableSource`]; so can external
//! collaborators (spreadsheets, relational queries) without touching the engine.

use crate::dtype::Schema;
use crate::table::Table;
use anyhow::Result;

/// A finite, non-restartable sequence of row batches.
pub type BatchIter = Box<dyn Iterator<Item = Result<Table>>>;

/// A readable tabular source.
///
/// `batches` is called once per materialization; implementations must reopen
/// their underlying resource each time so repeated runs see the same data.
pub trait TableSource: Send + Sync {
    /// Human-readable identifier shown by `explain` and in logs.
    fn name(&self) -> String;

    /// Schema of every batch this source yields.
    ///
    /// # Errors
    /// I/O or inference failures.
    fn schema(&self) -> Result<Schema>;

    /// Estimated row count, if cheaply known.
    fn size_hint(&self) -> Option<usize> {
        None
    }

    /// Open the source and stream batches of at most `batch_size` rows.
    ///
    /// # Errors
    /// Failures opening the source; per-batch failures are yielded by the iterator.
    fn batches(&self, batch_size: usize) -> Result<BatchIter>;
}

/// An in-memory table exposed as a source.
#[derive(Debug, Clone)]
pub struct MemorySource {
    table: Table,
}

impl MemorySource {
    #[must_use]
    pub fn new(table: Table) -> Self {
        Self { table }
    }
}

impl TableSource for MemorySource {
    fn name(&self) -> String {
        format!("memory ({} rows)", self.table.height())
    }

    fn schema(&self) -> Result<Schema> {
        Ok(self.table.schema())
    }

    fn size_hint(&self) -> Option<usize> {
        Some(self.table.height())
    }

    fn batches(&self, batch_size: usize) -> Result<BatchIter> {
        let table = self.table.clone();
        let step = batch_size.max(1);
        if table.is_empty() {
            return Ok(Box::new(std::iter::once(Ok(table))));
        }
        let offsets = (0..table.height()).step_by(step);
        Ok(Box::new(offsets.map(move |off| Ok(table.slice(off, step)))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column::Column;

    #[test]
    fn memory_source_splits_batches() -> Result<()> {
        let t = Table::new(vec![Column::from_i64("x", (0..10).map(Some).collect())])?;
        let sizes: Vec<usize> = MemorySource::new(t)
            .batches(4)?
            .map(|b| b.map(|b| b.height()))
            .collect::<Result<_>>()?;
        assert_eq!(sizes, vec![4, 4, 2]);
        Ok(())
    }
}
