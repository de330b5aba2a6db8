//! Stage kernels shared by the eager [`Table`](crate::table::Table) API and the
//! lazy runner.
//!
//! Each stage exposes a table-level function that executes it and a
//! schema-level function the planner uses to resolve output types without
//! touching data.

pub mod derive;
pub mod filter;
pub mod groupby;
pub mod join;
pub mod normalize;
pub mod sort;

pub use groupby::{AggPlan, GroupState};
pub use join::JoinType;
