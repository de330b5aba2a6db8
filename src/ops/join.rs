//! Hash joins on equally named key columns.
//!
//! The right side is hashed, the left side probes in row order. Output rows
//! are the probe matches in left order; `Right` and `Full` joins then append
//! the right rows that never matched, in right order. Null keys never match.

use crate::column::Column;
use crate::dtype::{DataType, Field, Schema};
use crate::error::FrameError;
use crate::table::Table;
use crate::value::GroupKey;
use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Suffix appended to right-hand columns whose names collide with the left.
pub const RIGHT_SUFFIX: &str = "_right";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JoinType {
    #[default]
    Inner,
    Left,
    Right,
    Full,
}

impl JoinType {
    fn keeps_left(self) -> bool {
        matches!(self, Self::Left | Self::Full)
    }

    fn keeps_right(self) -> bool {
        matches!(self, Self::Right | Self::Full)
    }
}

/// Key types after reconciling both sides.
fn key_types(left: &Schema, right: &Schema, on: &[String]) -> Result<Vec<DataType>> {
    if on.is_empty() {
        bail!(FrameError::Type("join needs at least one key column".into()));
    }
    on.iter()
        .map(|k| -> Result<DataType> {
            let (l, r) = (left.field(k)?.dtype, right.field(k)?.dtype);
            let t = l.supertype(r).ok_or_else(|| {
                FrameError::Type(format!(
                    "join key '{k}' has type {l} on the left but {r} on the right"
                ))
            })?;
            Ok(t)
        })
        .collect()
}

/// Right-hand non-key columns with their output names.
fn right_payload<'a>(left: &Schema, right: &'a Schema, on: &[String]) -> Vec<(&'a Field, String)> {
    right
        .fields()
        .iter()
        .filter(|f| !on.contains(&f.name))
        .map(|f| {
            let name = if left.index_of(&f.name).is_some() {
                format!("{}{RIGHT_SUFFIX}", f.name)
            } else {
                f.name.clone()
            };
            (f, name)
        })
        .collect()
}

/// Output schema of a join: left columns, then right non-key columns.
///
/// # Errors
/// `UnknownColumn` for a key missing on either side, `Type` for key types
/// without a common supertype, `SchemaMismatch` if a suffixed name still collides.
pub fn join_schema(left: &Schema, right: &Schema, on: &[String], how: JoinType) -> Result<Schema> {
    let types = key_types(left, right, on)?;
    let mut fields: Vec<Field> = left
        .fields()
        .iter()
        .map(|f| match on.iter().position(|k| *k == f.name) {
            Some(i) => Field::new(f.name.clone(), types[i]),
            None => Field {
                nullable: f.nullable || how.keeps_right(),
                ..f.clone()
            },
        })
        .collect();
    for (f, name) in right_payload(left, right, on) {
        fields.push(Field {
            name,
            dtype: f.dtype,
            nullable: f.nullable || how.keeps_left(),
        });
    }
    Schema::new(fields)
}

/// Join `left` with `right` on the key columns `on`.
///
/// # Errors
/// See [`join_schema`].
pub fn join(left: &Table, right: &Table, on: &[String], how: JoinType) -> Result<Table> {
    let (ls, rs) = (left.schema(), right.schema());
    join_schema(&ls, &rs, on, how)?;
    let types = key_types(&ls, &rs, on)?;

    let cast_keys = |t: &Table| -> Result<Vec<Column>> {
        on.iter()
            .zip(&types)
            .map(|(k, dt)| t.column(k)?.cast(*dt, false))
            .collect()
    };
    let (lkeys, rkeys) = (cast_keys(left)?, cast_keys(right)?);
    let key_at = |cols: &[Column], row: usize| -> Option<Vec<GroupKey>> {
        cols.iter()
            .map(|c| {
                let v = c.get(row);
                (!v.is_null()).then(|| GroupKey::from(v))
            })
            .collect()
    };

    let mut table: HashMap<Vec<GroupKey>, Vec<usize>> = HashMap::new();
    for r in 0..right.height() {
        if let Some(k) = key_at(&rkeys, r) {
            table.entry(k).or_default().push(r);
        }
    }

    let mut lidx: Vec<Option<usize>> = Vec::new();
    let mut ridx: Vec<Option<usize>> = Vec::new();
    let mut right_hit = vec![false; right.height()];
    for l in 0..left.height() {
        let matches = key_at(&lkeys, l).and_then(|k| table.get(&k));
        match matches {
            Some(rows) => {
                for &r in rows {
                    lidx.push(Some(l));
                    ridx.push(Some(r));
                    right_hit[r] = true;
                }
            }
            None if how.keeps_left() => {
                lidx.push(Some(l));
                ridx.push(None);
            }
            None => {}
        }
    }
    if how.keeps_right() {
        for (r, hit) in right_hit.iter().enumerate() {
            if !hit {
                lidx.push(None);
                ridx.push(Some(r));
            }
        }
    }

    let mut columns = Vec::with_capacity(left.width() + right.width());
    for c in left.columns() {
        match on.iter().position(|k| k == c.name()) {
            Some(i) => {
                let from_left = lkeys[i].take_opt(&lidx);
                let from_right = rkeys[i].take_opt(&ridx);
                let merged = (0..lidx.len()).map(|row| {
                    if lidx[row].is_some() {
                        from_left.get(row)
                    } else {
                        from_right.get(row)
                    }
                });
                columns.push(Column::from_values(c.name(), types[i], merged)?);
            }
            None => columns.push(c.take_opt(&lidx)),
        }
    }
    for (f, name) in right_payload(&ls, &rs, on) {
        columns.push(right.column(&f.name)?.take_opt(&ridx).with_name(name));
    }
    Table::new(columns)
}
