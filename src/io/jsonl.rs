//! JSON Lines: one JSON object per line.
//!
//! Columns are the object keys in order of first appearance within the
//! inference sample; a key missing from a line reads as null. Types are
//! inferred per key: integers give `Int64`, any decimal promotes to
//! `Float64`, booleans give `Boolean`, and strings (or a mix of kinds) give
//! `Utf8`. Dates and categoricals are written as strings and read back as
//! `Utf8` unless an explicit schema says otherwise. Non-finite floats are
//! written as `null`. Blank lines are skipped.

use super::glob::resolve_paths;
use super::compression::FinishWrite;
use super::{create_text, drain, open_text};
use crate::column::{ColumnBuilder, ColumnData, parse_date};
use crate::dtype::{DataType, Field, Schema};
use crate::error::FrameError;
use crate::lazy::LazyFrame;
use crate::source::{BatchIter, TableSource};
use crate::table::Table;
use crate::value::Value;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as Json};
use std::collections::HashMap;
use std::io::{BufRead, BufReader, Lines, Read, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JsonlOptions {
    /// Explicit schema; disables inference.
    pub schema: Option<Schema>,
    /// Lines sampled for inference; `None` samples the whole file.
    pub infer_schema_length: Option<usize>,
    /// Rows per batch; `None` uses the runner's batch size.
    pub batch_size: Option<usize>,
}

impl Default for JsonlOptions {
    fn default() -> Self {
        Self {
            schema: None,
            infer_schema_length: Some(super::DEFAULT_INFER_SCHEMA_LENGTH),
            batch_size: None,
        }
    }
}

impl JsonlOptions {
    #[must_use]
    pub fn with_schema(mut self, schema: Schema) -> Self {
        self.schema = Some(schema);
        self
    }

    #[must_use]
    pub fn with_infer_schema_length(mut self, rows: Option<usize>) -> Self {
        self.infer_schema_length = rows;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Null,
    Bool,
    Int,
    Float,
    Str,
}

impl Kind {
    fn of(v: &Json) -> Self {
        match v {
            Json::Null => Self::Null,
            Json::Bool(_) => Self::Bool,
            Json::Number(n) if n.is_i64() => Self::Int,
            Json::Number(_) => Self::Float,
            Json::String(_) | Json::Array(_) | Json::Object(_) => Self::Str,
        }
    }

    fn join(self, other: Self) -> Self {
        match (self, other) {
            (Self::Null, k) | (k, Self::Null) => k,
            (a, b) if a == b => a,
            (Self::Int, Self::Float) | (Self::Float, Self::Int) => Self::Float,
            _ => Self::Str,
        }
    }

    fn dtype(self) -> DataType {
        match self {
            Self::Bool => DataType::Boolean,
            Self::Int => DataType::Int64,
            Self::Float => DataType::Float64,
            Self::Null | Self::Str => DataType::Utf8,
        }
    }
}

fn parse_line(path: &Path, line_no: usize, line: &str) -> Result<Map<String, Json>> {
    match serde_json::from_str::<Json>(line) {
        Ok(Json::Object(map)) => Ok(map),
        Ok(other) => Err(FrameError::parse(
            format!("{} line {line_no}", path.display()),
            format!("expected a JSON object, found {other}"),
        )
        .into()),
        Err(e) => {
            let location = format!("{} line {line_no}", path.display());
            Err(FrameError::parse(location, e.to_string()).into())
        }
    }
}

/// Non-blank lines of a file with their 1-based line numbers.
struct NumberedLines {
    path: PathBuf,
    lines: Lines<BufReader<Box<dyn Read>>>,
    line_no: usize,
}

impl NumberedLines {
    fn open(path: PathBuf) -> Result<Self> {
        let lines = BufReader::new(open_text(&path)?).lines();
        Ok(Self { path, lines, line_no: 0 })
    }

    fn next_object(&mut self) -> Option<Result<Map<String, Json>>> {
        loop {
            let line = self.lines.next()?;
            self.line_no += 1;
            let read = line
                .with_context(|| format!("read line {} in {}", self.line_no, self.path.display()));
            let line = match read {
                Ok(l) => l,
                Err(e) => return Some(Err(e)),
            };
            if line.trim().is_empty() {
                continue;
            }
            return Some(parse_line(&self.path, self.line_no, &line));
        }
    }
}

/// Infer the schema of one JSON Lines file.
///
/// # Errors
/// `SourceNotFound`, or `Parse` on a malformed line.
pub fn infer_schema(path: impl AsRef<Path>, options: &JsonlOptions) -> Result<Schema> {
    let path = path.as_ref();
    if !path.is_file() {
        return Err(FrameError::SourceNotFound { path: path.to_path_buf() }.into());
    }
    let mut lines = NumberedLines::open(path.to_path_buf())?;
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut kinds: Vec<(String, Kind)> = Vec::new();
    let limit = options.infer_schema_length.unwrap_or(usize::MAX);
    let mut seen = 0;
    while seen < limit {
        let Some(obj) = lines.next_object() else { break };
        for (key, v) in obj? {
            let k = Kind::of(&v);
            match index.get(&key) {
                Some(&i) => kinds[i].1 = kinds[i].1.join(k),
                None => {
                    index.insert(key.clone(), kinds.len());
                    kinds.push((key, k));
                }
            }
        }
        seen += 1;
    }
    let schema = Schema::new(kinds.into_iter().map(|(n, k)| Field::new(n, k.dtype())).collect())?;
    debug!(path = %path.display(), %schema, "inferred jsonl schema");
    Ok(schema)
}

fn json_to_value(v: &Json, dtype: DataType) -> Option<Value> {
    match (v, dtype) {
        (Json::Null, _) => Some(Value::Null),
        (Json::Number(n), DataType::Int64) => n.as_i64().map(Value::Int),
        (Json::Number(n), DataType::Float64) => n.as_f64().map(Value::Float),
        (Json::Bool(b), DataType::Boolean) => Some(Value::Bool(*b)),
        (Json::String(s), DataType::Date) => parse_date(s).map(Value::Date),
        (Json::String(s), DataType::Utf8 | DataType::Categorical) => Some(Value::Str(s.clone())),
        (other, DataType::Utf8 | DataType::Categorical) => Some(Value::Str(other.to_string())),
        _ => None,
    }
}

fn value_to_json(v: Value) -> Json {
    match v {
        Value::Null => Json::Null,
        Value::Int(i) => Json::from(i),
        Value::Float(x) => serde_json::Number::from_f64(x).map_or(Json::Null, Json::Number),
        Value::Str(s) => Json::String(s),
        Value::Bool(b) => Json::Bool(b),
        Value::Date(d) => Json::String(d.format("%Y-%m-%d").to_string()),
    }
}

/// One or more JSON Lines files exposed as a [`TableSource`].
#[derive(Debug, Clone)]
pub struct JsonlSource {
    label: String,
    paths: Vec<PathBuf>,
    schema: Schema,
    batch_size: Option<usize>,
}

impl JsonlSource {
    /// Resolve `path` (file or glob) and infer the schema from the first file.
    ///
    /// # Errors
    /// `SourceNotFound` or `Parse`.
    pub fn new(path: impl AsRef<Path>, options: JsonlOptions) -> Result<Self> {
        let path = path.as_ref();
        let paths = resolve_paths(path)?;
        let schema = match &options.schema {
            Some(s) => s.clone(),
            None => infer_schema(&paths[0], &options)?,
        };
        Ok(Self {
            label: path.display().to_string(),
            paths,
            schema,
            batch_size: options.batch_size,
        })
    }
}

impl TableSource for JsonlSource {
    fn name(&self) -> String {
        format!("jsonl {}", self.label)
    }

    fn schema(&self) -> Result<Schema> {
        Ok(self.schema.clone())
    }

    fn batches(&self, batch_size: usize) -> Result<BatchIter> {
        Ok(Box::new(JsonlBatches {
            files: self.paths.clone().into_iter(),
            current: None,
            schema: self.schema.clone(),
            batch_size: self.batch_size.unwrap_or(batch_size).max(1),
            emitted: false,
            failed: false,
        }))
    }
}

struct JsonlBatches {
    files: std::vec::IntoIter<PathBuf>,
    current: Option<NumberedLines>,
    schema: Schema,
    batch_size: usize,
    emitted: bool,
    failed: bool,
}

impl JsonlBatches {
    fn fill(&mut self) -> Result<Option<Table>> {
        let fields = self.schema.fields();
        let mut builders: Vec<ColumnBuilder> = fields
            .iter()
            .map(|f| ColumnBuilder::new(f.dtype, self.batch_size))
            .collect();
        let mut n = 0;
        while n < self.batch_size {
            let Some(file) = self.current.as_mut() else {
                let Some(path) = self.files.next() else { break };
                debug!(path = %path.display(), "reading jsonl file");
                self.current = Some(NumberedLines::open(path)?);
                continue;
            };
            let Some(obj) = file.next_object() else {
                self.current = None;
                continue;
            };
            let obj = obj?;
            for (b, field) in builders.iter_mut().zip(fields) {
                let raw = obj.get(&field.name).unwrap_or(&Json::Null);
                let value = json_to_value(raw, field.dtype).ok_or_else(|| {
                    FrameError::parse(
                        format!(
                            "{} line {}, key '{}'",
                            file.path.display(),
                            file.line_no,
                            field.name
                        ),
                        format!("cannot read {raw} as {}", field.dtype),
                    )
                })?;
                if value.is_null() && !field.nullable {
                    return Err(FrameError::NullHandling(format!(
                        "key '{}' at {} line {}",
                        field.name,
                        file.path.display(),
                        file.line_no
                    ))
                    .into());
                }
                b.push(value)?;
            }
            n += 1;
        }
        if n == 0 {
            return Ok(None);
        }
        let columns = builders
            .into_iter()
            .zip(fields)
            .map(|(b, f)| b.finish(f.name.clone()))
            .collect();
        Table::new(columns).map(Some)
    }
}

impl Iterator for JsonlBatches {
    type Item = Result<Table>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        match self.fill() {
            Ok(Some(t)) => {
                self.emitted = true;
                Some(Ok(t))
            }
            Ok(None) if !self.emitted => {
                self.emitted = true;
                Some(Ok(Table::empty(&self.schema)))
            }
            Ok(None) => None,
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}

/// Read JSON Lines file(s) into a table.
///
/// # Errors
/// See [`JsonlSource::new`]; plus `Parse`/`NullHandling` while reading lines.
pub fn read_jsonl(path: impl AsRef<Path>, options: JsonlOptions) -> Result<Table> {
    let source = JsonlSource::new(path, options)?;
    let batches = source.batches(crate::runner::DEFAULT_BATCH_SIZE)?;
    let table = drain(batches, Table::empty(&source.schema))?;
    info!(source = %source.label, rows = table.height(), "read jsonl");
    Ok(table)
}

/// Lazily scan JSON Lines file(s).
///
/// # Errors
/// See [`JsonlSource::new`].
pub fn scan_jsonl(path: impl AsRef<Path>, options: JsonlOptions) -> Result<LazyFrame> {
    Ok(LazyFrame::scan(JsonlSource::new(path, options)?))
}

/// Write `table` as JSON Lines, one object per row with keys in column order.
///
/// # Errors
/// I/O failures.
pub fn write_jsonl(table: &Table, path: impl AsRef<Path>) -> Result<usize> {
    let path = path.as_ref();
    for c in table.columns() {
        if let ColumnData::Float64(xs) = c.data() {
            let lost = xs.iter().flatten().filter(|x| !x.is_finite()).count();
            if lost > 0 {
                warn!(
                    path = %path.display(),
                    column = %c.name(),
                    count = lost,
                    "non-finite floats have no JSON form; writing null"
                );
            }
        }
    }
    let mut w = create_text(path)?;
    let names = table.column_names();
    for i in 0..table.height() {
        let obj: Map<String, Json> = names
            .iter()
            .zip(table.row(i))
            .map(|(n, v)| ((*n).to_string(), value_to_json(v)))
            .collect();
        serde_json::to_writer(&mut w, &obj)
            .with_context(|| format!("serialize row #{} to {}", i + 1, path.display()))?;
        w.write_all(b"\n")?;
    }
    w.finish().with_context(|| format!("finish {}", path.display()))?;
    debug!(path = %path.display(), rows = table.height(), "wrote jsonl");
    Ok(table.height())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn keys_in_first_appearance_order() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let p = dir.path().join("t.jsonl");
        fs::write(&p, "{\"b\": 1, \"a\": \"x\"}\n\n{\"a\": null, \"c\": 2.5, \"b\": 2.0}\n")?;
        let t = read_jsonl(&p, JsonlOptions::default())?;
        assert_eq!(t.column_names(), vec!["b", "a", "c"]);
        assert_eq!(t.column("b")?.dtype(), DataType::Float64);
        assert_eq!(t.column("a")?.dtype(), DataType::Utf8);
        assert!(t.column("c")?.is_null(0));
        assert_eq!(t.height(), 2);
        Ok(())
    }

    #[test]
    fn bad_line_reports_its_number() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let p = dir.path().join("t.jsonl");
        fs::write(&p, "{\"x\": 1}\n[1, 2]\n")?;
        let one_line = JsonlOptions::default().with_infer_schema_length(Some(1));
        let err = read_jsonl(&p, one_line).unwrap_err();
        let Some(FrameError::Parse { location, .. }) = err.downcast_ref::<FrameError>() else {
            panic!("expected parse error, got {err:#}");
        };
        assert!(location.ends_with("line 2"), "{location}");
        Ok(())
    }

    #[test]
    fn dates_need_an_explicit_schema() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let p = dir.path().join("t.jsonl");
        let d = chrono::NaiveDate::from_ymd_opt(2024, 3, 1);
        let t = Table::new(vec![crate::column::Column::from_dates("d", vec![d, None])])?;
        write_jsonl(&t, &p)?;
        assert_eq!(read_jsonl(&p, JsonlOptions::default())?.column("d")?.dtype(), DataType::Utf8);
        let typed = read_jsonl(&p, JsonlOptions::default().with_schema(t.schema()))?;
        assert_eq!(typed, t);
        Ok(())
    }
}
