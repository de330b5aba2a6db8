//! Grouping / aggregation stage.
//!
//! An aggregation list such as `[col("price").sum(), col("a").sum() / col("b").count()]`
//! is compiled into an [`AggPlan`]: every `Agg` node becomes a *slot* (one
//! accumulator per group) and the surrounding expression is rewritten to read
//! the slot's finished value as a hidden column. Execution is then two-phase:
//!
//! - each batch folds into a [`GroupState`] (these can run in parallel),
//! - states merge in batch order and `finish` evaluates the rewritten outputs.
//!
//! Groups are emitted in order of first appearance; null keys form one group.

use crate::column::{Column, ColumnBuilder};
use crate::combiners::{AggFunc, Accumulator};
use crate::dtype::{DataType, Field, Schema};
use crate::error::FrameError;
use crate::eval::{evaluate, evaluate_all};
use crate::expr::Expr;
use crate::table::Table;
use crate::value::{GroupKey, Value};
use anyhow::{Context, Result, bail};
use std::collections::HashMap;
use std::collections::hash_map::Entry;

fn slot_name(i: usize) -> String {
    format!("\u{0}agg{i}")
}

/// One reduction: its function, its row-wise input, and the input's type.
#[derive(Debug, Clone)]
struct Slot {
    func: AggFunc,
    input: Expr,
    input_dtype: DataType,
    output_dtype: DataType,
}

/// A validated aggregation over a known input schema.
#[derive(Debug, Clone)]
pub struct AggPlan {
    keys: Vec<Field>,
    slots: Vec<Slot>,
    outputs: Vec<Expr>,
    output_schema: Schema,
}

impl AggPlan {
    /// Compile `aggs` grouped by `keys` over `input`.
    ///
    /// # Errors
    /// `UnknownColumn` for missing keys or inputs; `Type` for an invalid
    /// reduction, a nested aggregate, or a column that is neither a key nor
    /// inside an aggregate; `SchemaMismatch` for duplicate output names.
    pub fn new<S: AsRef<str>>(input: &Schema, keys: &[S], aggs: &[Expr]) -> Result<Self> {
        let keys = keys
            .iter()
            .map(|k| input.field(k.as_ref()).cloned())
            .collect::<Result<Vec<_>>>()?;
        let mut slots = Vec::new();
        let mut outputs = Vec::with_capacity(aggs.len());
        for e in aggs {
            e.to_field(input)?;
            let name = e.output_name();
            let rewritten = rewrite(e, input, &mut slots)?;
            for c in rewritten.referenced_columns() {
                if !c.starts_with('\u{0}') && !keys.iter().any(|k| k.name == c) {
                    bail!(FrameError::Type(format!(
                        "column '{c}' in '{name}' must be a group key or inside an aggregate"
                    )));
                }
            }
            outputs.push(rewritten.alias(&name));
        }

        let slot_schema = Self::slot_schema(&keys, &slots)?;
        let mut fields = keys.clone();
        for o in &outputs {
            fields.push(o.to_field(&slot_schema)?);
        }
        let output_schema = Schema::new(fields)?;
        Ok(Self {
            keys,
            slots,
            outputs,
            output_schema,
        })
    }

    fn slot_schema(keys: &[Field], slots: &[Slot]) -> Result<Schema> {
        let mut fields = keys.to_vec();
        fields.extend(
            slots
                .iter()
                .enumerate()
                .map(|(i, s)| Field::new(slot_name(i), s.output_dtype)),
        );
        Schema::new(fields)
    }

    /// Key columns followed by one column per aggregation expression.
    ///
    /// # Errors
    /// Never fails once the plan is built; the signature matches the other
    /// schema resolvers.
    pub fn output_schema(&self) -> Result<Schema> {
        Ok(self.output_schema.clone())
    }

    #[must_use]
    pub fn key_names(&self) -> Vec<&str> {
        self.keys.iter().map(|k| k.name.as_str()).collect()
    }

    #[must_use]
    pub fn new_state(&self) -> GroupState {
        GroupState::default()
    }

    /// Fold one batch into a fresh state.
    ///
    /// # Errors
    /// Evaluation errors from the aggregate inputs.
    pub fn partial(&self, batch: &Table) -> Result<GroupState> {
        let mut state = self.new_state();
        state.update(self, batch)?;
        Ok(state)
    }
}

/// Replace every `Agg` in `e` by a reference to a new slot column.
fn rewrite(e: &Expr, input: &Schema, slots: &mut Vec<Slot>) -> Result<Expr> {
    Ok(match e {
        Expr::Agg(func, inner) => {
            let input_dtype = inner.to_field(input)?.dtype;
            let output_dtype = func.output_dtype(input_dtype)?;
            slots.push(Slot {
                func: *func,
                input: (**inner).clone(),
                input_dtype,
                output_dtype,
            });
            Expr::Column(slot_name(slots.len() - 1))
        }
        Expr::Column(_) | Expr::Literal(_) => e.clone(),
        Expr::Alias(inner, name) => {
            Expr::Alias(Box::new(rewrite(inner, input, slots)?), name.clone())
        }
        Expr::Unary(op, inner) => Expr::Unary(*op, Box::new(rewrite(inner, input, slots)?)),
        Expr::Binary { op, left, right } => Expr::Binary {
            op: *op,
            left: Box::new(rewrite(left, input, slots)?),
            right: Box::new(rewrite(right, input, slots)?),
        },
        Expr::Cast { expr, dtype, strict } => Expr::Cast {
            expr: Box::new(rewrite(expr, input, slots)?),
            dtype: *dtype,
            strict: *strict,
        },
        Expr::Coalesce(es) => Expr::Coalesce(
            es.iter()
                .map(|x| rewrite(x, input, slots))
                .collect::<Result<Vec<_>>>()?,
        ),
        Expr::FillNull { expr, fill } => Expr::FillNull {
            expr: Box::new(rewrite(expr, input, slots)?),
            fill: Box::new(rewrite(fill, input, slots)?),
        },
        Expr::Contains { expr, pattern } => Expr::Contains {
            expr: Box::new(rewrite(expr, input, slots)?),
            pattern: pattern.clone(),
        },
        Expr::IsIn { expr, values } => Expr::IsIn {
            expr: Box::new(rewrite(expr, input, slots)?),
            values: values.clone(),
        },
    })
}

/// Partial aggregation state: groups in first-appearance order.
#[derive(Debug, Default)]
pub struct GroupState {
    index: HashMap<Vec<GroupKey>, usize>,
    keys: Vec<Vec<Value>>,
    accs: Vec<Vec<Accumulator>>,
}

impl GroupState {
    /// Number of groups seen so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    fn fresh(plan: &AggPlan) -> Vec<Accumulator> {
        plan.slots.iter().map(|s| s.func.create(s.input_dtype)).collect()
    }

    /// Fold the rows of `batch`.
    ///
    /// # Errors
    /// `UnknownColumn` / `Type` while evaluating keys or aggregate inputs.
    pub fn update(&mut self, plan: &AggPlan, batch: &Table) -> Result<()> {
        let key_cols = plan
            .keys
            .iter()
            .map(|k| batch.column(&k.name))
            .collect::<Result<Vec<_>>>()?;
        let inputs: Vec<Expr> = plan.slots.iter().map(|s| s.input.clone()).collect();
        let input_cols = evaluate_all(&inputs, batch)?;

        for row in 0..batch.height() {
            let values: Vec<Value> = key_cols.iter().map(|c| c.get(row)).collect();
            let key: Vec<GroupKey> = values.iter().cloned().map(GroupKey::from).collect();
            let g = match self.index.entry(key) {
                Entry::Occupied(o) => *o.get(),
                Entry::Vacant(v) => {
                    let g = self.keys.len();
                    v.insert(g);
                    self.keys.push(values);
                    self.accs.push(Self::fresh(plan));
                    g
                }
            };
            for (acc, c) in self.accs[g].iter_mut().zip(&input_cols) {
                acc.add_input(c.get(row));
            }
        }
        Ok(())
    }

    /// Fold `other`, whose rows come after every row already seen.
    pub fn merge(&mut self, other: GroupState) {
        let GroupState { index, keys, accs } = other;
        let mut by_pos: Vec<(usize, Vec<GroupKey>)> =
            index.into_iter().map(|(k, g)| (g, k)).collect();
        by_pos.sort_unstable_by_key(|(g, _)| *g);
        for ((_, key), (values, group_accs)) in by_pos.into_iter().zip(keys.into_iter().zip(accs)) {
            match self.index.entry(key) {
                Entry::Occupied(o) => {
                    for (mine, theirs) in self.accs[*o.get()].iter_mut().zip(group_accs) {
                        mine.merge(theirs);
                    }
                }
                Entry::Vacant(v) => {
                    v.insert(self.keys.len());
                    self.keys.push(values);
                    self.accs.push(group_accs);
                }
            }
        }
    }

    /// Produce the output table.
    ///
    /// # Errors
    /// Evaluation errors from the post-aggregation expressions.
    pub fn finish(mut self, plan: &AggPlan) -> Result<Table> {
        if plan.keys.is_empty() && self.keys.is_empty() {
            self.keys.push(Vec::new());
            self.accs.push(Self::fresh(plan));
        }
        let groups = self.keys.len();
        let mut columns = Vec::with_capacity(plan.keys.len() + plan.slots.len());
        for (k, field) in plan.keys.iter().enumerate() {
            let vals = self.keys.iter_mut().map(|row| std::mem::replace(&mut row[k], Value::Null));
            columns.push(Column::from_values(field.name.clone(), field.dtype, vals)?);
        }
        let mut slot_builders: Vec<ColumnBuilder> = plan
            .slots
            .iter()
            .map(|s| ColumnBuilder::new(s.output_dtype, groups))
            .collect();
        for accs in self.accs {
            for (b, acc) in slot_builders.iter_mut().zip(accs) {
                b.push(acc.finish())?;
            }
        }
        columns.extend(
            slot_builders
                .into_iter()
                .enumerate()
                .map(|(i, b)| b.finish(slot_name(i))),
        );
        let staged = if columns.is_empty() {
            Table::unit(groups)
        } else {
            Table::new(columns)?
        };

        let mut out: Vec<Column> = plan
            .keys
            .iter()
            .map(|k| staged.column(&k.name).cloned())
            .collect::<Result<Vec<_>>>()?;
        for e in &plan.outputs {
            let column = evaluate(e, &staged)
                .with_context(|| format!("finishing aggregate '{}'", e.output_name()))?;
            out.push(column);
        }
        if out.is_empty() {
            return Ok(Table::unit(groups));
        }
        Table::new(out)
    }
}

/// Eager grouped aggregation over a whole table.
///
/// # Errors
/// See [`AggPlan::new`].
pub fn group_by<S: AsRef<str>>(table: &Table, keys: &[S], aggs: &[Expr]) -> Result<Table> {
    let plan = AggPlan::new(&table.schema(), keys, aggs)?;
    plan.partial(table)?.finish(&plan)
}
