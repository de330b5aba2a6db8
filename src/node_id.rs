//! Opaque handle for a stage inside a [`Pipeline`](crate::pipeline::Pipeline).
//!
//! Ids are assigned sequentially as stages are appended; only the planner
//! follows them. They are `Copy` and hashable so they can key the arena.

/// Identifier of one stage node in a plan graph.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, PartialOrd, Ord)]
pub struct NodeId(u64);

impl NodeId {
    pub(crate) fn new(v: u64) -> Self {
        Self(v)
    }

    /// The underlying sequence number.
    #[must_use]
    pub fn raw(&self) -> u64 {
        self.0
    }
}
