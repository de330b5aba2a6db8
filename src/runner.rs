//! Materializer: executes a [`Plan`] batch by batch.
//!
//! The source is read in batches of `batch_size` rows. Row-wise stages run
//! per batch (in parallel mode, across a window of batches with rayon);
//! `Limit` stops reading once satisfied; barriers gather their input:
//!
//! - `GroupBy` folds every batch into a partial state and merges the partials
//!   in batch order,
//! - `Sort` and `Join` concatenate their input and run once.
//!
//! Sequential and parallel modes split work at the same batch boundaries and
//! merge in the same order, so they produce identical tables. Cancellation,
//! the deadline and the row cap are checked before every batch read.

use crate::error::{CancelReason, FrameError};
use crate::node::Node;
use crate::ops::{self, AggPlan, GroupState};
use crate::planner::{Plan, resolve_schema};
use crate::source::BatchIter;
use crate::table::Table;
use anyhow::{Context, Result, bail};
use rayon::prelude::*;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Default rows per batch.
pub const DEFAULT_BATCH_SIZE: usize = 64 * 1024;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExecMode {
    Sequential,
    /// Process `partitions` batches at a time on the rayon pool; `None` uses
    /// the planner's suggestion or the CPU count.
    Parallel { partitions: Option<usize> },
}

impl Default for ExecMode {
    fn default() -> Self {
        Self::Parallel { partitions: None }
    }
}

/// Cloneable flag for cancelling a running materialization from another thread.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Knobs for one materialization.
#[derive(Clone, Debug)]
pub struct ExecOptions {
    pub mode: ExecMode,
    pub batch_size: usize,
    pub cancel: Option<CancelToken>,
    /// Wall-clock budget, measured from the start of the run.
    pub timeout: Option<Duration>,
    /// Maximum number of source rows to read.
    pub max_rows: Option<usize>,
}

impl Default for ExecOptions {
    fn default() -> Self {
        Self {
            mode: ExecMode::default(),
            batch_size: DEFAULT_BATCH_SIZE,
            cancel: None,
            timeout: None,
            max_rows: None,
        }
    }
}

impl ExecOptions {
    #[must_use]
    pub fn sequential() -> Self {
        Self {
            mode: ExecMode::Sequential,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn parallel(partitions: Option<usize>) -> Self {
        Self {
            mode: ExecMode::Parallel { partitions },
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    #[must_use]
    pub fn with_cancel(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn with_max_rows(mut self, max_rows: usize) -> Self {
        self.max_rows = Some(max_rows);
        self
    }
}

/// Executes plans with a fixed set of options.
#[derive(Clone, Debug, Default)]
pub struct Runner {
    pub options: ExecOptions,
}

struct Ctx<'a> {
    options: &'a ExecOptions,
    deadline: Option<Instant>,
    window: usize,
    parallel: bool,
}

impl Runner {
    #[must_use]
    pub fn new(options: ExecOptions) -> Self {
        Self { options }
    }

    /// Execute `plan` and return the materialized table.
    ///
    /// # Errors
    /// Any stage error (with the stage index and kind attached), source
    /// errors, and `Cancelled` when the token, deadline, or row cap trips.
    pub fn run(&self, plan: &Plan) -> Result<Table> {
        let started = Instant::now();
        let (parallel, window) = match self.options.mode {
            ExecMode::Sequential => (false, 1),
            ExecMode::Parallel { partitions } => {
                let parts = partitions
                    .or(plan.suggested_partitions)
                    .unwrap_or_else(|| num_cpus::get().max(2));
                (true, parts.max(1))
            }
        };
        let ctx = Ctx {
            options: &self.options,
            deadline: self.options.timeout.map(|t| started + t),
            window,
            parallel,
        };
        info!(
            stages = plan.chain.len(),
            mode = ?self.options.mode,
            batch_size = self.options.batch_size,
            "materializing plan"
        );
        let out = exec_chain(&plan.chain, &ctx)?;
        info!(
            rows = out.height(),
            columns = out.width(),
            elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            "materialized"
        );
        Ok(out)
    }
}

/// Checks cancellation, deadline and row cap before handing out each batch.
struct Guarded<'a> {
    inner: BatchIter,
    ctx: &'a Ctx<'a>,
    count_rows: bool,
    seen: usize,
    done: bool,
}

impl Guarded<'_> {
    fn check(&self) -> Option<CancelReason> {
        if self.ctx.options.cancel.as_ref().is_some_and(CancelToken::is_cancelled) {
            return Some(CancelReason::Requested);
        }
        if self.ctx.deadline.is_some_and(|d| Instant::now() >= d) {
            return Some(CancelReason::Deadline);
        }
        None
    }
}

impl Iterator for Guarded<'_> {
    type Item = Result<Table>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        if let Some(reason) = self.check() {
            self.done = true;
            return Some(Err(FrameError::Cancelled(reason).into()));
        }
        let item = self.inner.next();
        if let (Some(Ok(batch)), true) = (&item, self.count_rows) {
            self.seen += batch.height();
            if let Some(cap) = self.ctx.options.max_rows
                && self.seen > cap
            {
                self.done = true;
                return Some(Err(FrameError::Cancelled(CancelReason::RowLimit(cap)).into()));
            }
        }
        if item.is_none() {
            self.done = true;
        }
        item
    }
}

/// A streaming step between barriers.
enum Step<'a> {
    RowWise(Vec<(usize, &'a Node)>),
    Limit(usize),
}

/// Where streamed batches end up.
enum Sink {
    Collect(Vec<Table>),
    Group(Box<AggPlan>, GroupState),
}

fn apply_run(run: &[(usize, &Node)], batch: Table) -> Result<Table> {
    run.iter().try_fold(batch, |acc, (idx, node)| {
        node.apply(&acc).with_context(|| format!("stage {idx} ({})", node.kind()))
    })
}

fn slices(table: Table, batch_size: usize) -> BatchIter {
    let step = batch_size.max(1);
    if table.height() <= step {
        return Box::new(std::iter::once(Ok(table)));
    }
    let offsets = (0..table.height()).step_by(step);
    Box::new(offsets.map(move |off| Ok(table.slice(off, step))))
}

/// Execute a source-first chain.
fn exec_chain(chain: &[Node], ctx: &Ctx<'_>) -> Result<Table> {
    let Some(Node::Source(src)) = chain.first() else {
        bail!("plan must start with a source");
    };
    debug!(source = %src.name(), "opening source");
    let opened = src
        .batches(ctx.options.batch_size)
        .with_context(|| format!("stage 0 (Source {})", src.name()))?;
    let mut input = Guarded {
        inner: opened,
        ctx,
        count_rows: true,
        seen: 0,
        done: false,
    };

    let mut pos = 1;
    loop {
        let end = chain[pos..]
            .iter()
            .position(Node::is_barrier)
            .map_or(chain.len(), |i| pos + i);
        let steps = build_steps(chain, pos, end);

        let mut sink = match chain.get(end) {
            Some(Node::GroupBy { keys, aggs }) => {
                let schema = resolve_schema(&chain[..end])?;
                let plan = AggPlan::new(&schema, keys, aggs)
                    .with_context(|| format!("stage {end} (GroupBy)"))?;
                Sink::Group(Box::new(plan), GroupState::default())
            }
            _ => Sink::Collect(Vec::new()),
        };
        stream(&mut input, &steps, &mut sink, ctx, end)?;

        let gathered = match sink {
            Sink::Group(plan, state) => {
                debug!(stage = end, groups = state.len(), "finishing group_by");
                state.finish(&plan).with_context(|| format!("stage {end} (GroupBy)"))?
            }
            Sink::Collect(batches) if batches.is_empty() => {
                Table::empty(&resolve_schema(&chain[..end])?)
            }
            Sink::Collect(batches) => Table::vstack(&batches)?,
        };
        let out = match chain.get(end) {
            None | Some(Node::GroupBy { .. }) => gathered,
            Some(Node::Sort { by, descending }) => {
                debug!(stage = end, rows = gathered.height(), "sorting");
                ops::sort::sort(&gathered, by, descending)
                    .with_context(|| format!("stage {end} (Sort)"))?
            }
            Some(Node::Join { right, on, how }) => {
                let right_table = exec_chain(right, ctx)
                    .with_context(|| format!("stage {end} (Join right side)"))?;
                debug!(
                    stage = end,
                    left = gathered.height(),
                    right = right_table.height(),
                    "joining"
                );
                ops::join::join(&gathered, &right_table, on, *how)
                    .with_context(|| format!("stage {end} (Join)"))?
            }
            Some(other) => bail!("stage {end} ({}) is not a barrier", other.kind()),
        };
        if end >= chain.len() - 1 {
            return Ok(out);
        }
        input = Guarded {
            inner: slices(out, ctx.options.batch_size),
            ctx,
            count_rows: false,
            seen: 0,
            done: false,
        };
        pos = end + 1;
    }
}

fn build_steps(chain: &[Node], start: usize, end: usize) -> Vec<Step<'_>> {
    let mut steps = Vec::new();
    for (idx, node) in chain.iter().enumerate().take(end).skip(start) {
        match node {
            Node::Limit(n) => steps.push(Step::Limit(*n)),
            _ => match steps.last_mut() {
                Some(Step::RowWise(run)) => run.push((idx, node)),
                _ => steps.push(Step::RowWise(vec![(idx, node)])),
            },
        }
    }
    steps
}

/// Push batches through `steps` into `sink` until the input ends or a limit
/// is exhausted.
fn stream(
    input: &mut Guarded<'_>,
    steps: &[Step<'_>],
    sink: &mut Sink,
    ctx: &Ctx<'_>,
    barrier: usize,
) -> Result<()> {
    let mut remaining: Vec<usize> = steps
        .iter()
        .map(|s| match s {
            Step::Limit(n) => *n,
            Step::RowWise(_) => 0,
        })
        .collect();
    if steps.iter().zip(&remaining).any(|(s, r)| matches!(s, Step::Limit(_)) && *r == 0) {
        return Ok(());
    }

    loop {
        let mut window = Vec::with_capacity(ctx.window);
        for item in input.by_ref().take(ctx.window) {
            window.push(item?);
        }
        if window.is_empty() {
            return Ok(());
        }

        for (i, step) in steps.iter().enumerate() {
            match step {
                Step::RowWise(run) => {
                    let results: Vec<Result<Table>> = if ctx.parallel && window.len() > 1 {
                        window.into_par_iter().map(|b| apply_run(run, b)).collect()
                    } else {
                        window.into_iter().map(|b| apply_run(run, b)).collect()
                    };
                    window = results.into_iter().collect::<Result<Vec<_>>>()?;
                }
                Step::Limit(_) => {
                    let mut kept = Vec::with_capacity(window.len());
                    for b in window {
                        if remaining[i] == 0 {
                            break;
                        }
                        let take = remaining[i].min(b.height());
                        remaining[i] -= take;
                        kept.push(if take == b.height() { b } else { b.head(take) });
                    }
                    window = kept;
                }
            }
        }

        match sink {
            Sink::Collect(out) => out.extend(window),
            Sink::Group(plan, state) => {
                let partials: Vec<Result<GroupState>> = if ctx.parallel && window.len() > 1 {
                    window.par_iter().map(|b| plan.partial(b)).collect()
                } else {
                    window.iter().map(|b| plan.partial(b)).collect()
                };
                for p in partials {
                    state.merge(p.with_context(|| format!("stage {barrier} (GroupBy)"))?);
                }
            }
        }

        let exhausted = steps
            .iter()
            .zip(&remaining)
            .any(|(s, r)| matches!(s, Step::Limit(_)) && *r == 0);
        if exhausted {
            debug!("limit satisfied; stopping source early");
            return Ok(());
        }
    }
}
