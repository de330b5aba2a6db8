//! Delimited text: reading with schema inference, batched scanning, writing.
//!
//! # Schema inference
//! Without an explicit schema the first file is sampled (first
//! [`CsvOptions::infer_schema_length`] data rows, 100 by default, `None` for
//! the whole file). Each column takes the narrowest type every non-null sample
//! value parses as, tried in this order:
//!
//! | sample values | type |
//! |---|---|
//! | `true` / `false` (any case) | `Boolean` |
//! | integers | `Int64` |
//! | integers and decimals | `Float64` |
//! | `YYYY-MM-DD` | `Date` |
//! | anything else, or only nulls | `Utf8` |
//!
//! Cells matching one of [`CsvOptions::null_values`] (by default the empty
//! string) are null. Headerless files name their columns `column_1..n`.
//! Every file matched by a glob must share the first file's layout.
//!
//! Values after the sample that do not parse as their column type fail with a
//! `Parse` error naming the file, row and column.

use super::glob::resolve_paths;
use super::compression::FinishWrite;
use super::{create_text, drain, open_text};
use crate::column::{ColumnBuilder, parse_bool, parse_date};
use crate::dtype::{DataType, Field, Schema};
use crate::error::FrameError;
use crate::lazy::LazyFrame;
use crate::source::{BatchIter, TableSource};
use crate::table::Table;
use crate::value::Value;
use anyhow::{Context, Result};
use csv::{StringRecord, StringRecordsIntoIter};
use serde::{Deserialize, Serialize};
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub use super::DEFAULT_INFER_SCHEMA_LENGTH;

/// Reader and writer options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CsvOptions {
    pub delimiter: u8,
    pub quote: u8,
    pub has_header: bool,
    /// Cell texts read as null. The first entry is written for nulls.
    pub null_values: Vec<String>,
    /// Explicit schema; disables inference.
    pub schema: Option<Schema>,
    /// Data rows sampled for inference; `None` samples the whole file.
    pub infer_schema_length: Option<usize>,
    /// Rows per batch; `None` uses the runner's batch size.
    pub batch_size: Option<usize>,
}

impl Default for CsvOptions {
    fn default() -> Self {
        Self {
            delimiter: b',',
            quote: b'"',
            has_header: true,
            null_values: vec![String::new()],
            schema: None,
            infer_schema_length: Some(DEFAULT_INFER_SCHEMA_LENGTH),
            batch_size: None,
        }
    }
}

impl CsvOptions {
    #[must_use]
    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    #[must_use]
    pub fn with_has_header(mut self, has_header: bool) -> Self {
        self.has_header = has_header;
        self
    }

    #[must_use]
    pub fn with_schema(mut self, schema: Schema) -> Self {
        self.schema = Some(schema);
        self
    }

    #[must_use]
    pub fn with_null_values<S: Into<String>>(
        mut self,
        values: impl IntoIterator<Item = S>,
    ) -> Self {
        self.null_values = values.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_infer_schema_length(mut self, rows: Option<usize>) -> Self {
        self.infer_schema_length = rows;
        self
    }

    #[must_use]
    pub fn with_batch_size(mut self, rows: usize) -> Self {
        self.batch_size = Some(rows);
        self
    }

    fn reader(&self, input: Box<dyn Read>) -> csv::Reader<Box<dyn Read>> {
        csv::ReaderBuilder::new()
            .delimiter(self.delimiter)
            .quote(self.quote)
            .has_headers(self.has_header)
            .flexible(true)
            .from_reader(input)
    }

    fn is_null(&self, raw: &str) -> bool {
        self.null_values.iter().any(|n| n == raw)
    }
}

fn location(path: &Path, row: usize) -> String {
    format!("{} row {row}", path.display())
}

fn csv_error(path: &Path, row: usize, err: &csv::Error) -> anyhow::Error {
    FrameError::parse(location(path, row), err.to_string()).into()
}

fn width_error(
    path: &Path,
    row: usize,
    expected: usize,
    found: usize,
    headerless: bool,
) -> anyhow::Error {
    let message = format!("expected {expected} fields, found {found}");
    if headerless && row == 1 {
        FrameError::SchemaMismatch(format!("{}: {message}", path.display())).into()
    } else {
        FrameError::parse(location(path, row), message).into()
    }
}

fn header_names(
    path: &Path,
    rdr: &mut csv::Reader<Box<dyn Read>>,
    options: &CsvOptions,
) -> Result<Option<Vec<String>>> {
    if !options.has_header {
        return Ok(None);
    }
    let header = rdr.headers().map_err(|e| csv_error(path, 0, &e))?;
    Ok(Some(header.iter().map(str::to_string).collect()))
}

/// Running per-column type evidence.
#[derive(Clone, Copy)]
struct Sniff {
    seen: bool,
    boolean: bool,
    int: bool,
    float: bool,
    date: bool,
}

impl Sniff {
    fn new() -> Self {
        Self {
            seen: false,
            boolean: true,
            int: true,
            float: true,
            date: true,
        }
    }

    fn observe(&mut self, raw: &str) {
        let t = raw.trim();
        self.seen = true;
        self.boolean &= parse_bool(t).is_some();
        self.int &= t.parse::<i64>().is_ok();
        self.float &= t.parse::<f64>().is_ok();
        self.date &= parse_date(t).is_some();
    }

    fn dtype(self) -> DataType {
        match self {
            Self { seen: false, .. } => DataType::Utf8,
            Self { boolean: true, .. } => DataType::Boolean,
            Self { int: true, .. } => DataType::Int64,
            Self { float: true, .. } => DataType::Float64,
            Self { date: true, .. } => DataType::Date,
            _ => DataType::Utf8,
        }
    }
}

/// Infer the schema of one CSV file.
///
/// # Errors
/// `SourceNotFound`, `Parse` on malformed records or ragged rows, or
/// `SchemaMismatch` on duplicate header names.
pub fn infer_schema(path: impl AsRef<Path>, options: &CsvOptions) -> Result<Schema> {
    let path = path.as_ref();
    if !path.is_file() {
        return Err(FrameError::SourceNotFound { path: path.to_path_buf() }.into());
    }
    let mut rdr = options.reader(open_text(path)?);
    let header = header_names(path, &mut rdr, options)?;
    let mut sniffs = vec![Sniff::new(); header.as_ref().map_or(0, Vec::len)];
    let limit = options.infer_schema_length.unwrap_or(usize::MAX);
    for (i, rec) in rdr.records().take(limit).enumerate() {
        let row = i + 1;
        let rec = rec.map_err(|e| csv_error(path, row, &e))?;
        if header.is_none() && row == 1 {
            sniffs = vec![Sniff::new(); rec.len()];
        }
        if rec.len() != sniffs.len() {
            return Err(width_error(path, row, sniffs.len(), rec.len(), false));
        }
        for (s, raw) in sniffs.iter_mut().zip(rec.iter()) {
            if !options.is_null(raw) {
                s.observe(raw);
            }
        }
    }
    let names =
        header.unwrap_or_else(|| (1..=sniffs.len()).map(|i| format!("column_{i}")).collect());
    let fields = names
        .into_iter()
        .zip(sniffs)
        .map(|(n, s)| Field::new(n, s.dtype()))
        .collect();
    let schema = Schema::new(fields).with_context(|| format!("header of {}", path.display()))?;
    debug!(path = %path.display(), %schema, "inferred csv schema");
    Ok(schema)
}

/// Open one file and check its layout against `schema`.
fn open_checked(
    path: &Path,
    options: &CsvOptions,
    schema: &Schema,
) -> Result<(csv::Reader<Box<dyn Read>>, Option<StringRecord>)> {
    let mut rdr = options.reader(open_text(path)?);
    if let Some(header) = header_names(path, &mut rdr, options)? {
        let names = schema.names();
        if header.len() != names.len() || header.iter().zip(&names).any(|(a, b)| a != b) {
            return Err(FrameError::SchemaMismatch(format!(
                "{}: header {header:?} does not match columns {names:?}",
                path.display()
            ))
            .into());
        }
        return Ok((rdr, None));
    }
    // Headerless: the first record decides whether the layout fits.
    let mut first = StringRecord::new();
    let got = rdr.read_record(&mut first).map_err(|e| csv_error(path, 1, &e))?;
    if !got {
        return Ok((rdr, None));
    }
    if first.len() != schema.len() {
        return Err(width_error(path, 1, schema.len(), first.len(), true));
    }
    Ok((rdr, Some(first)))
}

fn parse_cell(raw: &str, field: &Field, options: &CsvOptions) -> Option<Value> {
    if options.is_null(raw) {
        return Some(Value::Null);
    }
    let t = raw.trim();
    match field.dtype {
        DataType::Int64 => t.parse().ok().map(Value::Int),
        DataType::Float64 => t.parse().ok().map(Value::Float),
        DataType::Boolean => parse_bool(t).map(Value::Bool),
        DataType::Date => parse_date(t).map(Value::Date),
        DataType::Utf8 | DataType::Categorical => Some(Value::Str(raw.to_string())),
    }
}

/// One or more CSV files exposed as a [`TableSource`].
#[derive(Debug, Clone)]
pub struct CsvSource {
    label: String,
    paths: Vec<PathBuf>,
    schema: Schema,
    options: CsvOptions,
}

impl CsvSource {
    /// Resolve `path` (file or glob), then infer or validate the schema.
    ///
    /// # Errors
    /// `SourceNotFound`, `SchemaMismatch`, or `Parse` from inference.
    pub fn new(path: impl AsRef<Path>, options: CsvOptions) -> Result<Self> {
        let path = path.as_ref();
        let paths = resolve_paths(path)?;
        let schema = match &options.schema {
            Some(s) => s.clone(),
            None => infer_schema(&paths[0], &options)?,
        };
        for p in &paths {
            open_checked(p, &options, &schema)?;
        }
        Ok(Self {
            label: path.display().to_string(),
            paths,
            schema,
            options,
        })
    }

    #[must_use]
    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }
}

impl TableSource for CsvSource {
    fn name(&self) -> String {
        format!("csv {}", self.label)
    }

    fn schema(&self) -> Result<Schema> {
        Ok(self.schema.clone())
    }

    fn batches(&self, batch_size: usize) -> Result<BatchIter> {
        Ok(Box::new(CsvBatches {
            files: self.paths.clone().into_iter(),
            current: None,
            schema: self.schema.clone(),
            options: self.options.clone(),
            batch_size: self.options.batch_size.unwrap_or(batch_size).max(1),
            emitted: false,
            failed: false,
        }))
    }
}

struct OpenFile {
    path: PathBuf,
    pending: Option<StringRecord>,
    records: StringRecordsIntoIter<Box<dyn Read>>,
    row: usize,
}

impl OpenFile {
    fn next_record(&mut self) -> Option<Result<StringRecord>> {
        let rec = match self.pending.take() {
            Some(first) => Ok(first),
            None => self.records.next()?.map_err(|e| csv_error(&self.path, self.row + 1, &e)),
        };
        self.row += 1;
        Some(rec)
    }
}

/// Streams files in order, `batch_size` rows at a time, across file boundaries.
struct CsvBatches {
    files: std::vec::IntoIter<PathBuf>,
    current: Option<OpenFile>,
    schema: Schema,
    options: CsvOptions,
    batch_size: usize,
    emitted: bool,
    failed: bool,
}

impl CsvBatches {
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
                let (rdr, pending) = open_checked(&path, &self.options, &self.schema)?;
                debug!(path = %path.display(), "reading csv file");
                self.current = Some(OpenFile {
                    path,
                    pending,
                    records: rdr.into_records(),
                    row: 0,
                });
                continue;
            };
            let Some(rec) = file.next_record() else {
                self.current = None;
                continue;
            };
            let rec = rec?;
            if rec.len() != fields.len() {
                return Err(width_error(&file.path, file.row, fields.len(), rec.len(), false));
            }
            for ((b, field), raw) in builders.iter_mut().zip(fields).zip(rec.iter()) {
                let value = parse_cell(raw, field, &self.options).ok_or_else(|| {
                    FrameError::parse(
                        format!("{}, column '{}'", location(&file.path, file.row), field.name),
                        format!("cannot parse {raw:?} as {}", field.dtype),
                    )
                })?;
                if value.is_null() && !field.nullable {
                    return Err(FrameError::NullHandling(format!(
                        "column '{}' at {}",
                        field.name,
                        location(&file.path, file.row)
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

impl Iterator for CsvBatches {
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
            // Always yield one batch so downstream stages see the schema.
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

/// Read CSV file(s) into a table.
///
/// # Errors
/// See [`CsvSource::new`]; plus `Parse`/`NullHandling` while reading rows.
pub fn read_csv(path: impl AsRef<Path>, options: CsvOptions) -> Result<Table> {
    let source = CsvSource::new(path, options)?;
    let table = drain(
        source.batches(crate::runner::DEFAULT_BATCH_SIZE)?,
        Table::empty(&source.schema),
    )?;
    info!(source = %source.label, rows = table.height(), "read csv");
    Ok(table)
}

/// Lazily scan CSV file(s). The schema is resolved now; rows are read per materialization.
///
/// # Errors
/// See [`CsvSource::new`].
pub fn scan_csv(path: impl AsRef<Path>, options: CsvOptions) -> Result<LazyFrame> {
    Ok(LazyFrame::scan(CsvSource::new(path, options)?))
}

/// Write `table` with default options. Returns the number of rows written.
///
/// # Errors
/// I/O failures.
pub fn write_csv(table: &Table, path: impl AsRef<Path>) -> Result<usize> {
    write_csv_with(table, path, &CsvOptions::default())
}

/// Write `table` using the delimiter, quote, header and null marker of `options`.
///
/// Floats always carry a decimal point or exponent so they read back as `Float64`.
///
/// # Errors
/// I/O failures.
pub fn write_csv_with(
    table: &Table,
    path: impl AsRef<Path>,
    options: &CsvOptions,
) -> Result<usize> {
    let path = path.as_ref();
    let mut wtr = csv::WriterBuilder::new()
        .delimiter(options.delimiter)
        .quote(options.quote)
        .from_writer(create_text(path)?);
    if options.has_header {
        wtr.write_record(table.column_names())
            .with_context(|| format!("write header to {}", path.display()))?;
    }
    let null = options.null_values.first().map_or("", String::as_str);
    for i in 0..table.height() {
        let cells = table.row(i).into_iter().map(|v| match v {
            Value::Null => null.to_string(),
            other => other.to_string(),
        });
        wtr.write_record(cells)
            .with_context(|| format!("write CSV row #{} to {}", i + 1, path.display()))?;
    }
    wtr.into_inner()
        .map_err(|e| e.into_error())
        .and_then(|w| w.finish())
        .with_context(|| format!("finish {}", path.display()))?;
    debug!(path = %path.display(), rows = table.height(), "wrote csv");
    Ok(table.height())
}

impl LazyFrame {
    /// Materialize and write the result as CSV.
    ///
    /// # Errors
    /// Materialization or I/O failures.
    pub fn sink_csv(&self, path: impl AsRef<Path>) -> Result<usize> {
        write_csv(&self.collect()?, path)
    }
}
