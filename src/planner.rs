//! Query planner and optimizer passes.
//!
//! The planner converts the pipeline graph into a single **linear execution
//! chain**, resolves the schema after every stage, then applies a few
//! semantics-preserving rewrites:
//!
//! 1. **Fuse filters** -- adjacent `Filter` stages become one conjunction.
//! 2. **Predicate pushdown** -- a filter moves below a `WithColumns` that does
//!    not produce any column it reads, below `Drop`, and below `Sort`.
//! 3. **Limit pushdown** -- a limit moves below row-count-preserving stages
//!    (`WithColumns`, `Select`, `Rename`, `Drop`) so the source stops early.
//! 4. **Stateless runs** -- contiguous row-wise stages are reported as one
//!    fused per-batch step (the runner executes them that way).
//!
//! Rewrites never change output; they may skip work (and hence errors) on
//! rows that a later filter or limit would discard anyway.
//!
//! The planner also provides a heuristic **partition suggestion** that the
//! runner may use to size parallel execution.

use crate::dtype::Schema;
use crate::expr::{Expr, lit};
use crate::node::Node;
use crate::{NodeId, Pipeline};
use anyhow::{Context, Result, bail};
use std::fmt::{Display, Formatter, Result as FormatResult};
use tracing::debug;

/// A finalized execution plan.
pub struct Plan {
    /// Linear list of stages, source first.
    pub chain: Vec<Node>,
    /// Schema of the plan's output.
    pub schema: Schema,
    /// Optional suggested partition count (runner may override).
    pub suggested_partitions: Option<usize>,
    /// Optimization decisions made during planning.
    pub optimizations: Vec<OptimizationDecision>,
}

/// Represents an optimization decision made by the planner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OptimizationDecision {
    /// Adjacent filters were combined with `and`.
    FusedFilters {
        /// Number of filter stages removed.
        removed: usize,
    },
    /// A filter moved closer to the source.
    PushedDownPredicate {
        /// Total stage positions moved across all filters.
        positions: usize,
    },
    /// A limit moved closer to the source.
    PushedDownLimit {
        positions: usize,
    },
    /// Contiguous row-wise stages will run as one step per batch.
    FusedStateless {
        /// Number of fused runs with more than one stage.
        runs: usize,
        /// Total stages inside those runs.
        stages: usize,
    },
    /// Partition count suggestion.
    PartitionSuggestion {
        /// Estimated source rows.
        source_len: Option<usize>,
        /// Suggested partition count.
        partitions: usize,
    },
}

impl Display for OptimizationDecision {
    fn fmt(&self, f: &mut Formatter<'_>) -> FormatResult {
        match self {
            Self::FusedFilters { removed } => {
                write!(f, "fused adjacent filters ({removed} removed)")
            }
            Self::PushedDownPredicate { positions } => {
                write!(f, "predicate pushdown ({positions} position(s))")
            }
            Self::PushedDownLimit { positions } => {
                write!(f, "limit pushdown ({positions} position(s))")
            }
            Self::FusedStateless { runs, stages } => {
                write!(f, "fused {stages} row-wise stages into {runs} per-batch step(s)")
            }
            Self::PartitionSuggestion { source_len, partitions } => match source_len {
                Some(len) => {
                    write!(f, "based on source size {len}, suggest {partitions} partitions")
                }
                None => write!(f, "suggest {partitions} partitions"),
            },
        }
    }
}

/// Detailed explanation of an execution plan.
#[derive(Debug, Clone)]
pub struct ExecutionExplanation {
    /// The linearized execution chain.
    pub steps: Vec<ExplainStep>,
    /// Cost estimates for the entire plan.
    pub cost_estimate: CostEstimate,
    /// List of optimization decisions made by the planner.
    pub optimizations: Vec<OptimizationDecision>,
    /// Suggested partition count.
    pub suggested_partitions: Option<usize>,
    /// Output schema.
    pub schema: Schema,
}

impl Display for ExecutionExplanation {
    fn fmt(&self, f: &mut Formatter<'_>) -> FormatResult {
        writeln!(f, "╔═══════════════════════════════════════════════════════════════╗")?;
        writeln!(f, "║              EXECUTION PLAN EXPLANATION                       ║")?;
        writeln!(f, "╚═══════════════════════════════════════════════════════════════╝")?;
        writeln!(f)?;

        writeln!(f, "┌─ COST ESTIMATES ─────────────────────────────────────────────┐")?;
        writeln!(
            f,
            "│ Source Size:       {:>10}",
            self.cost_estimate
                .source_size
                .map_or_else(|| "Unknown".to_string(), |s| s.to_string())
        )?;
        writeln!(f, "│ Total Stages:      {:>10}", self.cost_estimate.total_ops)?;
        writeln!(f, "│ Row-wise Stages:   {:>10}", self.cost_estimate.stateless_ops)?;
        writeln!(f, "│ Barrier Stages:    {:>10}", self.cost_estimate.barriers)?;
        if let Some(parts) = self.suggested_partitions {
            writeln!(f, "│ Suggested Parts:   {parts:>10}")?;
        }
        writeln!(f, "└──────────────────────────────────────────────────────────────┘")?;
        writeln!(f)?;

        writeln!(f, "┌─ EXECUTION STEPS ────────────────────────────────────────────┐")?;
        for step in &self.steps {
            let barrier_marker = if step.is_barrier { " [BARRIER]" } else { "" };
            writeln!(f, "│")?;
            writeln!(f, "│ Step {}: {}{}", step.step, step.node_type, barrier_marker)?;
            writeln!(f, "│   {}", step.description)?;
        }
        writeln!(f, "│")?;
        writeln!(f, "│ Output: {}", self.schema)?;
        writeln!(f, "└──────────────────────────────────────────────────────────────┘")?;

        if !self.optimizations.is_empty() {
            writeln!(f)?;
            writeln!(f, "┌─ OPTIMIZATIONS APPLIED ──────────────────────────────────────┐")?;
            for opt in &self.optimizations {
                writeln!(f, "│ • {opt}")?;
            }
            writeln!(f, "└──────────────────────────────────────────────────────────────┘")?;
        }
        Ok(())
    }
}

/// A single step in the execution plan.
#[derive(Debug, Clone)]
pub struct ExplainStep {
    /// Step number in the execution sequence, from 1.
    pub step: usize,
    /// Stage kind.
    pub node_type: String,
    /// Human-readable description of the stage.
    pub description: String,
    /// Whether this stage needs every input row before producing output.
    pub is_barrier: bool,
}

/// Cost estimates for the execution plan.
#[derive(Debug, Clone)]
pub struct CostEstimate {
    pub barriers: usize,
    pub total_ops: usize,
    pub stateless_ops: usize,
    pub source_size: Option<usize>,
}

impl Plan {
    /// Describe the optimized chain, its costs, and the rewrites applied.
    #[must_use]
    pub fn explain(&self) -> ExecutionExplanation {
        let mut source_size = None;
        let steps = self
            .chain
            .iter()
            .enumerate()
            .map(|(idx, node)| {
                if let Node::Source(s) = node {
                    source_size = s.size_hint();
                }
                ExplainStep {
                    step: idx + 1,
                    node_type: node.kind().to_string(),
                    description: node.to_string(),
                    is_barrier: node.is_barrier(),
                }
            })
            .collect::<Vec<_>>();
        ExecutionExplanation {
            cost_estimate: CostEstimate {
                barriers: steps.iter().filter(|s| s.is_barrier).count(),
                total_ops: self.chain.len().saturating_sub(1),
                stateless_ops: self.chain.iter().filter(|n| n.is_row_wise()).count(),
                source_size,
            },
            steps,
            optimizations: self.optimizations.clone(),
            suggested_partitions: self.suggested_partitions,
            schema: self.schema.clone(),
        }
    }
}

/// Build a linear plan ending at `terminal`, validate every stage, then apply
/// the optimizer passes.
///
/// # Errors
/// `UnknownColumn`, `Type` or `SchemaMismatch` from schema resolution, with
/// the failing stage index and kind attached as context.
pub fn build_plan(p: &Pipeline, terminal: NodeId) -> Result<Plan> {
    let chain = p.chain_to(terminal)?;
    plan_chain(chain)
}

/// Plan an already linearized chain.
///
/// # Errors
/// See [`build_plan`].
pub fn plan_chain(mut chain: Vec<Node>) -> Result<Plan> {
    let schema = resolve_schema(&chain)?;
    let len_hint = estimate_source_len(&chain);
    let mut optimizations = Vec::new();

    let removed = fuse_filters(&mut chain);
    if removed > 0 {
        optimizations.push(OptimizationDecision::FusedFilters { removed });
    }
    let positions = push_down(&mut chain, can_pass_filter);
    if positions > 0 {
        optimizations.push(OptimizationDecision::PushedDownPredicate { positions });
    }
    let positions = push_down(&mut chain, can_pass_limit);
    if positions > 0 {
        optimizations.push(OptimizationDecision::PushedDownLimit { positions });
    }
    let (runs, stages) = stateless_runs(&chain);
    if runs > 0 {
        optimizations.push(OptimizationDecision::FusedStateless { runs, stages });
    }
    let suggested = suggest_partitions(len_hint);
    if let Some(parts) = suggested {
        optimizations.push(OptimizationDecision::PartitionSuggestion {
            source_len: len_hint,
            partitions: parts,
        });
    }
    debug!(stages = chain.len(), optimizations = optimizations.len(), "plan built");

    Ok(Plan {
        chain,
        schema,
        suggested_partitions: suggested,
        optimizations,
    })
}

/// Resolve the output schema of a source-first chain, checking every stage.
///
/// # Errors
/// See [`build_plan`].
pub fn resolve_schema(chain: &[Node]) -> Result<Schema> {
    let Some(Node::Source(src)) = chain.first() else {
        bail!("plan must start with a source");
    };
    let mut schema = src.schema().with_context(|| format!("stage 0 (Source {})", src.name()))?;
    for (idx, node) in chain.iter().enumerate().skip(1) {
        schema = stage_schema(node, &schema)
            .with_context(|| format!("stage {idx} ({})", node.kind()))?;
    }
    Ok(schema)
}

fn stage_schema(node: &Node, input: &Schema) -> Result<Schema> {
    match node {
        Node::Source(_) => bail!("a plan has exactly one source"),
        Node::Join { right, on, how } => {
            let right_schema = resolve_schema(right).context("right side of join")?;
            crate::ops::join::join_schema(input, &right_schema, on, *how)
        }
        other => other.output_schema(input),
    }
}

/* ---------- Filter fusion ---------- */

/// Merge adjacent filters into one conjunction; returns the number removed.
fn fuse_filters(chain: &mut Vec<Node>) -> usize {
    let mut out: Vec<Node> = Vec::with_capacity(chain.len());
    let mut removed = 0;
    for node in chain.drain(..) {
        if let Node::Filter(next) = &node
            && let Some(Node::Filter(prev)) = out.last_mut()
        {
            let left = std::mem::replace(prev, lit(true));
            *prev = left.and(next.clone());
            removed += 1;
            continue;
        }
        out.push(node);
    }
    *chain = out;
    removed
}

/* ---------- Pushdown ---------- */

/// Whether `filter` may run before `below` with identical output.
fn can_pass_filter(moving: &Node, below: &Node) -> bool {
    let Node::Filter(pred) = moving else {
        return false;
    };
    match below {
        Node::Sort { .. } | Node::Drop(_) => true,
        Node::WithColumns(es) => {
            let produced: Vec<String> = es.iter().map(Expr::output_name).collect();
            pred.referenced_columns().iter().all(|c| !produced.iter().any(|p| p == c))
        }
        _ => false,
    }
}

/// Whether a `limit` may run before `below` with identical output.
fn can_pass_limit(moving: &Node, below: &Node) -> bool {
    matches!(moving, Node::Limit(_))
        && matches!(
            below,
            Node::WithColumns(_) | Node::Select(_) | Node::Rename(_) | Node::Drop(_)
        )
}

/// Bubble matching stages toward the source; returns total positions moved.
fn push_down(chain: &mut [Node], can_pass: fn(&Node, &Node) -> bool) -> usize {
    let mut moved = 0;
    let mut changed = true;
    while changed {
        changed = false;
        // index 0 is the source and never moves
        for i in 2..chain.len() {
            if can_pass(&chain[i], &chain[i - 1]) {
                chain.swap(i, i - 1);
                moved += 1;
                changed = true;
            }
        }
    }
    moved
}

/* ---------- Stateless runs ---------- */

fn stateless_runs(chain: &[Node]) -> (usize, usize) {
    let mut runs = 0;
    let mut stages = 0;
    for run in chain.split(|n| !n.is_row_wise()) {
        if run.len() > 1 {
            runs += 1;
            stages += run.len();
        }
    }
    (runs, stages)
}

/* ---------- Adaptive partitions ---------- */

/// If the first node is a `Source`, ask it for a row-count hint.
fn estimate_source_len(chain: &[Node]) -> Option<usize> {
    if let Some(Node::Source(src)) = chain.first() {
        src.size_hint()
    } else {
        None
    }
}

/// Suggest a parallelism level from an optional input length hint.
/// Heuristic target ≈ 64k rows/partition, then clamped between
/// `[num_cpus, 8*num_cpus]`.
fn suggest_partitions(len_hint: Option<usize>) -> Option<usize> {
    let n = len_hint?;
    let target_rows_per_part = 64_000usize;
    let mut parts = n.div_ceil(target_rows_per_part);
    let hw = num_cpus::get().max(2);
    parts = parts.clamp(hw, hw * 8);
    Some(parts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column::Column;
    use crate::expr::col;
    use crate::source::MemorySource;
    use crate::table::Table;
    use std::sync::Arc;

    fn source() -> Node {
        let t = Table::new(vec![
            Column::from_i64("a", vec![Some(1), Some(2)]),
            Column::from_i64("b", vec![Some(3), Some(4)]),
        ])
        .unwrap();
        Node::Source(Arc::new(MemorySource::new(t)))
    }

    #[test]
    fn filter_moves_below_unrelated_derivation() -> Result<()> {
        let plan = plan_chain(vec![
            source(),
            Node::WithColumns(vec![(col("b") * 2).alias("c")]),
            Node::Filter(col("a").gt(1)),
            Node::Filter(col("b").lt(10)),
        ])?;
        assert!(matches!(plan.chain[1], Node::Filter(_)));
        assert!(plan.optimizations.contains(&OptimizationDecision::FusedFilters { removed: 1 }));
        assert!(
            plan.optimizations
                .contains(&OptimizationDecision::PushedDownPredicate { positions: 1 })
        );
        Ok(())
    }

    #[test]
    fn filter_stays_above_the_column_it_reads() -> Result<()> {
        let plan = plan_chain(vec![
            source(),
            Node::WithColumns(vec![(col("b") * 2).alias("c")]),
            Node::Filter(col("c").gt(1)),
        ])?;
        assert!(matches!(plan.chain[2], Node::Filter(_)));
        Ok(())
    }

    #[test]
    fn limit_moves_to_the_source() -> Result<()> {
        let plan = plan_chain(vec![
            source(),
            Node::WithColumns(vec![(col("b") * 2).alias("c")]),
            Node::Rename(vec![("a".into(), "z".into())]),
            Node::Limit(1),
        ])?;
        assert!(matches!(plan.chain[1], Node::Limit(1)));
        assert_eq!(plan.schema.names(), vec!["z", "b", "c"]);
        Ok(())
    }

    #[test]
    fn failing_stage_is_named() {
        let err = plan_chain(vec![source(), Node::Filter(col("nope").gt(1))])
            .err()
            .map(|e| format!("{e:#}"))
            .unwrap_or_default();
        assert!(err.contains("stage 1 (Filter)"), "{err}");
        assert!(err.contains("unknown column 'nope'"), "{err}");
    }

    #[test]
    fn explain_lists_steps() -> Result<()> {
        let plan = plan_chain(vec![
            source(),
            Node::Sort {
                by: vec![col("a")],
                descending: vec![true],
            },
        ])?;
        let text = plan.explain().to_string();
        assert!(text.contains("Step 2: Sort [BARRIER]"));
        assert!(text.contains("Source Size:"));
        Ok(())
    }
}
