//! Lazy query handles.
//!
//! A [`LazyFrame`] is a cheap handle onto a node in a shared [`Pipeline`]
//! arena. Every method appends one stage and returns a new handle; nothing
//! runs until [`LazyFrame::collect`]. Errors in a stage surface when the plan
//! is built or materialized, tagged with the stage index and kind.
//!
//! ```
//! use ironframe::prelude::*;
//!
//! let sales = Table::new(vec![
//!     Column::from_strs("type", &[Some("A"), Some("A"), Some("B")]),
//!     Column::from_i64("price", vec![Some(10), Some(20), Some(5)]),
//! ])?;
//! let out = sales
//!     .lazy()
//!     .filter(col("price").gt(1))
//!     .group_by(["type"])
//!     .agg([col("price").sum()])
//!     .sort(["type"])
//!     .collect()?;
//! assert_eq!(out.column("price")?.values().collect::<Vec<_>>(), vec![30.into(), 5.into()]);
//! # Ok::<(), anyhow::Error>(())
//! ```

use crate::dtype::Schema;
use crate::expr::{Expr, col};
use crate::node::Node;
use crate::node_id::NodeId;
use crate::ops::JoinType;
use crate::ops::derive::is_aggregation;
use crate::pipeline::Pipeline;
use crate::planner::{ExecutionExplanation, Plan, build_plan, resolve_schema};
use crate::runner::{ExecOptions, Runner};
use crate::source::{MemorySource, TableSource};
use crate::table::Table;
use anyhow::Result;
use std::sync::Arc;

/// A deferred table: a plan ending at one stage.
#[derive(Clone, Debug)]
pub struct LazyFrame {
    pub(crate) pipeline: Pipeline,
    pub(crate) id: NodeId,
}

impl LazyFrame {
    /// Start a plan at `source` in a fresh pipeline.
    pub fn scan(source: impl TableSource + 'static) -> Self {
        Self::scan_arc(Arc::new(source))
    }

    pub fn scan_arc(source: Arc<dyn TableSource>) -> Self {
        let pipeline = Pipeline::default();
        let id = pipeline.insert_node(Node::Source(source));
        Self { pipeline, id }
    }

    /// Start a plan over an in-memory table.
    #[must_use]
    pub fn from_table(table: Table) -> Self {
        Self::scan(MemorySource::new(table))
    }

    /// Append `node` after this frame's stage.
    fn then(&self, node: Node) -> Self {
        let id = self.pipeline.insert_node(node);
        self.pipeline.connect(self.id, id);
        Self {
            pipeline: self.pipeline.clone(),
            id,
        }
    }

    /// Keep rows where `predicate` is true; null counts as false.
    #[must_use]
    pub fn filter(&self, predicate: Expr) -> Self {
        self.then(Node::Filter(predicate))
    }

    /// Append or overwrite columns, all evaluated against the incoming rows.
    #[must_use]
    pub fn with_columns(&self, exprs: impl IntoIterator<Item = Expr>) -> Self {
        self.then(Node::WithColumns(exprs.into_iter().collect()))
    }

    #[must_use]
    pub fn with_column(&self, expr: Expr) -> Self {
        self.with_columns([expr])
    }

    /// Project expressions. A list made only of aggregates becomes a global
    /// aggregation producing one row.
    #[must_use]
    pub fn select(&self, exprs: impl IntoIterator<Item = Expr>) -> Self {
        let exprs: Vec<Expr> = exprs.into_iter().collect();
        if is_aggregation(&exprs) {
            self.then(Node::GroupBy {
                keys: Vec::new(),
                aggs: exprs,
            })
        } else {
            self.then(Node::Select(exprs))
        }
    }

    /// Cast declared columns to `schema` types; unconvertible values become null.
    #[must_use]
    pub fn normalize(&self, schema: Schema) -> Self {
        self.then(Node::Normalize { schema, strict: false })
    }

    /// As [`LazyFrame::normalize`] but unconvertible values are errors.
    #[must_use]
    pub fn normalize_strict(&self, schema: Schema) -> Self {
        self.then(Node::Normalize { schema, strict: true })
    }

    #[must_use]
    pub fn rename<A: AsRef<str>, B: AsRef<str>>(
        &self,
        pairs: impl IntoIterator<Item = (A, B)>,
    ) -> Self {
        self.then(Node::Rename(
            pairs
                .into_iter()
                .map(|(a, b)| (a.as_ref().to_string(), b.as_ref().to_string()))
                .collect(),
        ))
    }

    #[must_use]
    pub fn drop<S: AsRef<str>>(&self, names: impl IntoIterator<Item = S>) -> Self {
        self.then(Node::Drop(names.into_iter().map(|s| s.as_ref().to_string()).collect()))
    }

    /// Ascending sort by column names.
    #[must_use]
    pub fn sort<S: AsRef<str>>(&self, by: impl IntoIterator<Item = S>) -> Self {
        self.sort_by(by.into_iter().map(|s| col(s.as_ref())), [false])
    }

    /// Sort by expressions; one direction flag per key, or one flag for all.
    #[must_use]
    pub fn sort_by(
        &self,
        by: impl IntoIterator<Item = Expr>,
        descending: impl IntoIterator<Item = bool>,
    ) -> Self {
        self.then(Node::Sort {
            by: by.into_iter().collect(),
            descending: descending.into_iter().collect(),
        })
    }

    #[must_use]
    pub fn limit(&self, n: usize) -> Self {
        self.then(Node::Limit(n))
    }

    /// Alias of [`LazyFrame::limit`].
    #[must_use]
    pub fn head(&self, n: usize) -> Self {
        self.limit(n)
    }

    #[must_use]
    pub fn group_by<S: AsRef<str>>(&self, keys: impl IntoIterator<Item = S>) -> LazyGroupBy {
        LazyGroupBy {
            frame: self.clone(),
            keys: keys.into_iter().map(|k| k.as_ref().to_string()).collect(),
        }
    }

    /// Hash join with `other` on equally named key columns.
    ///
    /// # Errors
    /// If `other`'s plan cannot be linearized.
    pub fn join<S: AsRef<str>>(
        &self,
        other: &LazyFrame,
        on: impl IntoIterator<Item = S>,
        how: JoinType,
    ) -> Result<Self> {
        let right = other.pipeline.chain_to(other.id)?;
        Ok(self.then(Node::Join {
            right: Arc::new(right),
            on: on.into_iter().map(|s| s.as_ref().to_string()).collect(),
            how,
        }))
    }

    /// Validate and optimize the plan without running it.
    ///
    /// # Errors
    /// `UnknownColumn`, `Type` or `SchemaMismatch` from the failing stage.
    pub fn plan(&self) -> Result<Plan> {
        build_plan(&self.pipeline, self.id)
    }

    /// Output schema of the plan.
    ///
    /// # Errors
    /// See [`LazyFrame::plan`].
    pub fn schema(&self) -> Result<Schema> {
        resolve_schema(&self.pipeline.chain_to(self.id)?)
    }

    /// Describe the optimized plan.
    ///
    /// # Errors
    /// See [`LazyFrame::plan`].
    pub fn explain(&self) -> Result<ExecutionExplanation> {
        Ok(self.plan()?.explain())
    }

    /// Materialize with default options (parallel).
    ///
    /// # Errors
    /// Any planning, source, or stage error.
    pub fn collect(&self) -> Result<Table> {
        self.collect_with(ExecOptions::default())
    }

    /// Materialize on the calling thread only.
    ///
    /// # Errors
    /// See [`LazyFrame::collect`].
    pub fn collect_seq(&self) -> Result<Table> {
        self.collect_with(ExecOptions::sequential())
    }

    /// Materialize with `partitions` batches processed concurrently.
    ///
    /// # Errors
    /// See [`LazyFrame::collect`].
    pub fn collect_par(&self, partitions: Option<usize>) -> Result<Table> {
        self.collect_with(ExecOptions::parallel(partitions))
    }

    /// Materialize with explicit options (cancellation, timeout, row cap, ...).
    ///
    /// # Errors
    /// See [`LazyFrame::collect`]; `Cancelled` when a guard trips.
    pub fn collect_with(&self, options: ExecOptions) -> Result<Table> {
        let plan = self.plan()?;
        Runner::new(options).run(&plan)
    }
}

/// Lazy grouped aggregation returned by [`LazyFrame::group_by`].
pub struct LazyGroupBy {
    frame: LazyFrame,
    keys: Vec<String>,
}

impl LazyGroupBy {
    /// One row per distinct key tuple: key columns, then one column per expression.
    #[must_use]
    pub fn agg(self, aggs: impl IntoIterator<Item = Expr>) -> LazyFrame {
        self.frame.then(Node::GroupBy {
            keys: self.keys,
            aggs: aggs.into_iter().collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column::Column;
    use crate::error::FrameError;
    use crate::expr::{len, lit};

    fn sales() -> Table {
        Table::new(vec![
            Column::from_strs("type", &[Some("A"), Some("A"), Some("B")]),
            Column::from_i64("price", vec![Some(10), Some(20), Some(5)]),
        ])
        .unwrap()
    }

    #[test]
    fn branches_share_a_prefix() -> Result<()> {
        let base = sales().lazy().filter(col("price").gt(6));
        let a = base.with_column(lit(1).alias("one")).collect_seq()?;
        let b = base.select([col("price")]).collect_seq()?;
        assert_eq!(a.width(), 3);
        assert_eq!(b.width(), 1);
        assert_eq!(base.pipeline.len(), 4);
        Ok(())
    }

    #[test]
    fn errors_surface_at_materialization() {
        let frame = sales().lazy().with_column((col("nope") + 1).alias("x"));
        let err = frame.collect().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<FrameError>(),
            Some(FrameError::UnknownColumn { .. })
        ));
        assert!(format!("{err:#}").contains("stage 1 (WithColumns)"));
    }

    #[test]
    fn global_select_is_one_row() -> Result<()> {
        let out = sales().lazy().select([col("price").max(), len()]).collect()?;
        assert_eq!(out.height(), 1);
        assert_eq!(out.column_names(), vec!["price", "len"]);
        Ok(())
    }
}
