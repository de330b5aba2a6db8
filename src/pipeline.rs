use crate::node::Node;
use crate::node_id::NodeId;
use anyhow::{Result, anyhow};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

/// Arena of stage nodes plus the edges between them.
///
/// Every [`LazyFrame`](crate::lazy::LazyFrame) is a handle `(pipeline, node)`;
/// appending a stage inserts a node and an edge from its input. Frames derived
/// from one another share the arena, so branching plans reuse their prefix.
#[derive(Debug)]
pub struct Pipeline {
    pub(crate) inner: Arc<Mutex<PipelineInner>>,
}

#[derive(Debug)]
pub struct PipelineInner {
    pub next_id: u64,
    pub nodes: HashMap<NodeId, Node>,
    pub edges: Vec<(NodeId, NodeId)>,
}

impl Default for Pipeline {
    fn default() -> Self {
        Self {
            inner: Arc::new(Mutex::new(PipelineInner {
                next_id: 0,
                nodes: HashMap::new(),
                edges: Vec::new(),
            })),
        }
    }
}

/// Clones share the same arena.
impl Clone for Pipeline {
    fn clone(&self) -> Self {
        Pipeline {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl Pipeline {
    fn lock(&self) -> std::sync::MutexGuard<'_, PipelineInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn insert_node(&self, node: Node) -> NodeId {
        let mut g = self.lock();
        let id = NodeId::new(g.next_id);
        g.next_id += 1;
        g.nodes.insert(id, node);
        id
    }

    pub(crate) fn connect(&self, from: NodeId, to: NodeId) {
        self.lock().edges.push((from, to));
    }

    /// Clone of the current nodes and edges, so planning never holds the lock.
    pub(crate) fn snapshot(&self) -> (HashMap<NodeId, Node>, Vec<(NodeId, NodeId)>) {
        let g = self.lock();
        (g.nodes.clone(), g.edges.clone())
    }

    /// The linear chain of stages ending at `terminal`, source first.
    ///
    /// # Errors
    /// If a referenced node is missing from the arena.
    pub(crate) fn chain_to(&self, terminal: NodeId) -> Result<Vec<Node>> {
        let (mut nodes, edges) = self.snapshot();
        let mut chain = Vec::<Node>::new();
        let mut cur = terminal;
        loop {
            let n = nodes
                .remove(&cur)
                .ok_or_else(|| anyhow!("pipeline: missing node {cur:?}"))?;
            chain.push(n);
            if let Some((from, _)) = edges.iter().find(|(_, to)| *to == cur).copied() {
                cur = from;
            } else {
                break;
            }
        }
        chain.reverse();
        Ok(chain)
    }

    /// Number of nodes ever inserted.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
