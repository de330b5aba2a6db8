use crate::dtype::Schema;
use crate::expr::Expr;
use crate::ops::{self, JoinType};
use crate::source::TableSource;
use crate::table::Table;
use anyhow::{Result, bail};
use std::fmt;
use std::sync::Arc;

/// One stage of a plan.
///
/// Row-wise stages (`Filter`, `WithColumns`, `Select`, `Normalize`, `Rename`,
/// `Drop`) transform each batch independently. `Limit` is row-wise but stops
/// the source early. `GroupBy`, `Sort` and `Join` are barriers: they need
/// every input row before producing output.
#[derive(Clone)]
pub enum Node {
    Source(Arc<dyn TableSource>),
    Filter(Expr),
    WithColumns(Vec<Expr>),
    /// Row-wise projection; global aggregations are planned as a key-less `GroupBy`.
    Select(Vec<Expr>),
    Normalize {
        schema: Schema,
        strict: bool,
    },
    Rename(Vec<(String, String)>),
    Drop(Vec<String>),
    GroupBy {
        keys: Vec<String>,
        aggs: Vec<Expr>,
    },
    Sort {
        by: Vec<Expr>,
        descending: Vec<bool>,
    },
    Limit(usize),
    /// Join with a complete sub-plan (source first) producing the right side.
    Join {
        right: Arc<Vec<Node>>,
        on: Vec<String>,
        how: JoinType,
    },
}

impl Node {
    /// Short stage name used in errors, logs and `explain`.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Node::Source(_) => "Source",
            Node::Filter(_) => "Filter",
            Node::WithColumns(_) => "WithColumns",
            Node::Select(_) => "Select",
            Node::Normalize { .. } => "Normalize",
            Node::Rename(_) => "Rename",
            Node::Drop(_) => "Drop",
            Node::GroupBy { .. } => "GroupBy",
            Node::Sort { .. } => "Sort",
            Node::Limit(_) => "Limit",
            Node::Join { .. } => "Join",
        }
    }

    /// Stages that can run batch by batch with no cross-batch state.
    #[must_use]
    pub fn is_row_wise(&self) -> bool {
        matches!(
            self,
            Node::Filter(_)
                | Node::WithColumns(_)
                | Node::Select(_)
                | Node::Normalize { .. }
                | Node::Rename(_)
                | Node::Drop(_)
        )
    }

    #[must_use]
    pub fn is_barrier(&self) -> bool {
        matches!(self, Node::GroupBy { .. } | Node::Sort { .. } | Node::Join { .. })
    }

    /// Apply a row-wise stage to one batch.
    ///
    /// # Errors
    /// Evaluation errors; calling this on a non-row-wise stage is a bug.
    pub(crate) fn apply(&self, batch: &Table) -> Result<Table> {
        match self {
            Node::Filter(p) => ops::filter::filter(batch, p),
            Node::WithColumns(es) => ops::derive::with_columns(batch, es),
            Node::Select(es) => ops::derive::select(batch, es),
            Node::Normalize { schema, strict } => ops::normalize::normalize(batch, schema, *strict),
            Node::Rename(pairs) => {
                let pairs: Vec<(&str, &str)> =
                    pairs.iter().map(|(a, b)| (a.as_str(), b.as_str())).collect();
                batch.rename(&pairs)
            }
            Node::Drop(names) => {
                let names: Vec<&str> = names.iter().map(String::as_str).collect();
                batch.drop(&names)
            }
            other => bail!("stage {} cannot be applied batch by batch", other.kind()),
        }
    }

    /// Output schema of every stage except `Source` and `Join`, which the
    /// planner resolves from their sources.
    pub(crate) fn output_schema(&self, input: &Schema) -> Result<Schema> {
        match self {
            Node::Filter(p) => {
                ops::filter::check_predicate(input, p)?;
                Ok(input.clone())
            }
            Node::WithColumns(es) => ops::derive::with_columns_schema(input, es),
            Node::Select(es) => ops::derive::select_schema(input, es),
            Node::Normalize { schema, .. } => ops::normalize::normalize_schema(input, schema),
            Node::Rename(pairs) => {
                let mut out = input.clone();
                for (from, to) in pairs {
                    out.rename(from, to)?;
                }
                Ok(out)
            }
            Node::Drop(names) => {
                let mut out = input.clone();
                for n in names {
                    input.field(n)?;
                    out.remove(n);
                }
                Ok(out)
            }
            Node::GroupBy { keys, aggs } => ops::AggPlan::new(input, keys, aggs)?.output_schema(),
            Node::Sort { by, descending } => {
                ops::sort::check_keys(input, by, descending)?;
                Ok(input.clone())
            }
            Node::Limit(_) => Ok(input.clone()),
            Node::Source(_) | Node::Join { .. } => {
                bail!("{} schema depends on its source", self.kind())
            }
        }
    }

    /// Column names this stage reads, for pushdown decisions.
    pub(crate) fn reads(&self) -> Vec<&str> {
        match self {
            Node::Filter(p) => p.referenced_columns(),
            Node::WithColumns(es) | Node::Select(es) => referenced(es),
            Node::Sort { by, .. } => referenced(by),
            Node::GroupBy { keys, aggs } => {
                keys.iter().map(String::as_str).chain(referenced(aggs)).collect()
            }
            Node::Normalize { schema, .. } => schema.names(),
            Node::Rename(pairs) => pairs.iter().map(|(a, _)| a.as_str()).collect(),
            Node::Drop(names) => names.iter().map(String::as_str).collect(),
            Node::Join { on, .. } => on.iter().map(String::as_str).collect(),
            Node::Source(_) | Node::Limit(_) => Vec::new(),
        }
    }
}

fn referenced(es: &[Expr]) -> Vec<&str> {
    es.iter().flat_map(Expr::referenced_columns).collect()
}

fn list(es: &[Expr]) -> String {
    es.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Node::Source(s) => write!(f, "scan {}", s.name()),
            Node::Filter(p) => write!(f, "filter {p}"),
            Node::WithColumns(es) => write!(f, "with_columns [{}]", list(es)),
            Node::Select(es) => write!(f, "select [{}]", list(es)),
            Node::Normalize { schema, strict } => {
                write!(f, "normalize {schema}{}", if *strict { " (strict)" } else { "" })
            }
            Node::Rename(pairs) => {
                let parts: Vec<String> = pairs.iter().map(|(a, b)| format!("{a} -> {b}")).collect();
                write!(f, "rename [{}]", parts.join(", "))
            }
            Node::Drop(names) => write!(f, "drop [{}]", names.join(", ")),
            Node::GroupBy { keys, aggs } => {
                write!(f, "group_by [{}] agg [{}]", keys.join(", "), list(aggs))
            }
            Node::Sort { by, descending } => {
                write!(f, "sort [{}] descending={descending:?}", list(by))
            }
            Node::Limit(n) => write!(f, "limit {n}"),
            Node::Join { right, on, how } => {
                let src = right.first().map_or_else(String::new, ToString::to_string);
                write!(
                    f,
                    "{how:?} join on [{}] with ({src}, {} stages)",
                    on.join(", "),
                    right.len()
                )
            }
        }
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({self})", self.kind())
    }
}
