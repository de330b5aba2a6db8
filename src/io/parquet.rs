//! Parquet reading and writing through Arrow record batches.
//!
//! Type mapping (lossless in both directions):
//!
//! | column type | Arrow type |
//! |---|---|
//! | `Int64` | `Int64` |
//! | `Float64` | `Float64` |
//! | `Utf8` | `Utf8` |
//! | `Boolean` | `Boolean` |
//! | `Date` | `Date32` |
//! | `Categorical` | `Dictionary<Int32, Utf8>` |
//!
//! Files written elsewhere with narrower integer or float types, large
//! strings, or other dictionary key widths are widened on read.

use super::glob::resolve_paths;
use super::{drain, ensure_parent};
use crate::column::{Column, ColumnBuilder, ColumnData, date_to_days, days_to_date};
use crate::dtype::{DataType, Field, Schema};
use crate::error::FrameError;
use crate::lazy::LazyFrame;
use crate::source::{BatchIter, TableSource};
use crate::table::Table;
use crate::value::Value;
use anyhow::{Context, Result};
use arrow::array::{
    Array, ArrayRef, AsArray, BooleanArray, Date32Array, DictionaryArray, Float64Array, Int32Array,
    Int64Array, StringArray,
};
use arrow::compute::cast;
use arrow::datatypes::{
    DataType as ArrowType, Date32Type, Field as ArrowField, Float64Type, Int32Type, Int64Type,
    Schema as ArrowSchema, SchemaRef,
};
use arrow::record_batch::{RecordBatch, RecordBatchOptions};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::arrow_writer::ArrowWriter;
use parquet::file::properties::WriterProperties;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

fn categorical_type() -> ArrowType {
    ArrowType::Dictionary(Box::new(ArrowType::Int32), Box::new(ArrowType::Utf8))
}

fn to_arrow_type(dtype: DataType) -> ArrowType {
    match dtype {
        DataType::Int64 => ArrowType::Int64,
        DataType::Float64 => ArrowType::Float64,
        DataType::Utf8 => ArrowType::Utf8,
        DataType::Boolean => ArrowType::Boolean,
        DataType::Date => ArrowType::Date32,
        DataType::Categorical => categorical_type(),
    }
}

fn from_arrow_type(name: &str, dtype: &ArrowType) -> Result<DataType> {
    let out = match dtype {
        ArrowType::Int8
        | ArrowType::Int16
        | ArrowType::Int32
        | ArrowType::Int64
        | ArrowType::UInt8
        | ArrowType::UInt16
        | ArrowType::UInt32 => DataType::Int64,
        ArrowType::Float16 | ArrowType::Float32 | ArrowType::Float64 => DataType::Float64,
        ArrowType::Utf8 | ArrowType::LargeUtf8 | ArrowType::Utf8View => DataType::Utf8,
        ArrowType::Boolean => DataType::Boolean,
        ArrowType::Date32 | ArrowType::Date64 => DataType::Date,
        ArrowType::Dictionary(_, values)
            if matches!(**values, ArrowType::Utf8 | ArrowType::LargeUtf8) =>
        {
            DataType::Categorical
        }
        other => {
            return Err(FrameError::SchemaMismatch(format!(
                "column '{name}' has unsupported parquet type {other}"
            ))
            .into());
        }
    };
    Ok(out)
}

fn schema_from_arrow(arrow: &ArrowSchema) -> Result<Schema> {
    let fields = arrow
        .fields()
        .iter()
        .map(|f| {
            let mut field = Field::new(f.name().clone(), from_arrow_type(f.name(), f.data_type())?);
            field.nullable = f.is_nullable();
            Ok(field)
        })
        .collect::<Result<Vec<_>>>()?;
    Schema::new(fields)
}

fn schema_to_arrow(schema: &Schema) -> SchemaRef {
    Arc::new(ArrowSchema::new(
        schema
            .fields()
            .iter()
            .map(|f| ArrowField::new(f.name.clone(), to_arrow_type(f.dtype), f.nullable))
            .collect::<Vec<_>>(),
    ))
}

fn column_to_arrow(column: &Column) -> Result<ArrayRef> {
    let array: ArrayRef = match column.data() {
        ColumnData::Int64(v) => Arc::new(Int64Array::from(v.clone())),
        ColumnData::Float64(v) => Arc::new(Float64Array::from(v.clone())),
        ColumnData::Utf8(v) => Arc::new(StringArray::from(v.clone())),
        ColumnData::Boolean(v) => Arc::new(BooleanArray::from(v.clone())),
        ColumnData::Date(v) => {
            let days = v
                .iter()
                .map(|d| d.map(|d| i32::try_from(date_to_days(d))).transpose())
                .collect::<Result<Vec<Option<i32>>, _>>()
                .with_context(|| {
                    format!("column '{}' has a date outside the Date32 range", column.name())
                })?;
            Arc::new(Date32Array::from(days))
        }
        ColumnData::Categorical { codes, categories } => {
            let keys = codes
                .iter()
                .map(|c| c.map(i32::try_from).transpose())
                .collect::<Result<Vec<Option<i32>>, _>>()
                .with_context(|| format!("column '{}' has too many categories", column.name()))?;
            let values: ArrayRef = Arc::new(StringArray::from_iter_values(categories.iter()));
            Arc::new(DictionaryArray::<Int32Type>::try_new(Int32Array::from(keys), values)?)
        }
    };
    Ok(array)
}

/// Convert a table into one Arrow record batch.
///
/// # Errors
/// Dates outside the `Date32` range or more than `i32::MAX` categories.
pub fn table_to_record_batch(table: &Table) -> Result<RecordBatch> {
    let arrays = table.columns().iter().map(column_to_arrow).collect::<Result<Vec<_>>>()?;
    let options = RecordBatchOptions::new().with_row_count(Some(table.height()));
    Ok(RecordBatch::try_new_with_options(
        schema_to_arrow(&table.schema()),
        arrays,
        &options,
    )?)
}

fn array_to_column(name: &str, dtype: DataType, array: &dyn Array) -> Result<Column> {
    let column = match dtype {
        DataType::Int64 => {
            let a = cast(array, &ArrowType::Int64)?;
            Column::from_i64(name, a.as_primitive::<Int64Type>().iter().collect())
        }
        DataType::Float64 => {
            let a = cast(array, &ArrowType::Float64)?;
            Column::from_f64(name, a.as_primitive::<Float64Type>().iter().collect())
        }
        DataType::Utf8 => {
            let a = cast(array, &ArrowType::Utf8)?;
            let values = a.as_string::<i32>().iter().map(|s| s.map(str::to_string)).collect();
            Column::from_strings(name, values)
        }
        DataType::Boolean => Column::from_bool(name, array.as_boolean().iter().collect()),
        DataType::Date => {
            let a = cast(array, &ArrowType::Date32)?;
            let dates = a
                .as_primitive::<Date32Type>()
                .iter()
                .map(|d| d.and_then(|d| days_to_date(i64::from(d))))
                .collect();
            Column::from_dates(name, dates)
        }
        DataType::Categorical => {
            let a = cast(array, &ArrowType::Utf8)?;
            let strings = a.as_string::<i32>();
            let mut b = ColumnBuilder::new(DataType::Categorical, strings.len());
            for s in strings {
                b.push(s.map_or(Value::Null, Value::from))?;
            }
            b.finish(name)
        }
    };
    Ok(column)
}

/// Convert an Arrow record batch into a table with the given schema.
///
/// # Errors
/// `SchemaMismatch` when the batch does not carry the schema's columns.
pub fn record_batch_to_table(batch: &RecordBatch, schema: &Schema) -> Result<Table> {
    if batch.num_columns() != schema.len() {
        return Err(FrameError::SchemaMismatch(format!(
            "record batch has {} columns, expected {}",
            batch.num_columns(),
            schema.len()
        ))
        .into());
    }
    let columns = schema
        .fields()
        .iter()
        .zip(batch.columns())
        .map(|(f, a)| {
            array_to_column(&f.name, f.dtype, a.as_ref())
                .with_context(|| format!("column '{}'", f.name))
        })
        .collect::<Result<Vec<_>>>()?;
    if columns.is_empty() {
        return Ok(Table::default());
    }
    Table::new(columns)
}

fn open_builder(path: &Path) -> Result<ParquetRecordBatchReaderBuilder<File>> {
    let file = File::open(path).with_context(|| format!("open {}", path.display()))?;
    ParquetRecordBatchReaderBuilder::try_new(file)
        .map_err(|e| FrameError::parse(path.display().to_string(), e.to_string()).into())
}

/// One or more Parquet files exposed as a [`TableSource`].
#[derive(Debug, Clone)]
pub struct ParquetSource {
    label: String,
    paths: Vec<PathBuf>,
    schema: Schema,
    rows: usize,
}

impl ParquetSource {
    /// Resolve `path` (file or glob) and read the footers.
    ///
    /// # Errors
    /// `SourceNotFound`, `Parse` for non-Parquet files, or `SchemaMismatch`
    /// when files disagree or use unsupported types.
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let paths = resolve_paths(path)?;
        let mut schema: Option<Schema> = None;
        let mut rows = 0usize;
        for p in &paths {
            let builder = open_builder(p)?;
            let file_schema =
                schema_from_arrow(builder.schema()).with_context(|| format!("{}", p.display()))?;
            rows += usize::try_from(builder.metadata().file_metadata().num_rows()).unwrap_or(0);
            match &schema {
                None => schema = Some(file_schema),
                Some(s) if s.names() != file_schema.names() => {
                    return Err(FrameError::SchemaMismatch(format!(
                        "{}: columns {:?} differ from {:?}",
                        p.display(),
                        file_schema.names(),
                        s.names()
                    ))
                    .into());
                }
                Some(_) => {}
            }
        }
        Ok(Self {
            label: path.display().to_string(),
            paths,
            schema: schema.unwrap_or_default(),
            rows,
        })
    }
}

impl TableSource for ParquetSource {
    fn name(&self) -> String {
        format!("parquet {}", self.label)
    }

    fn schema(&self) -> Result<Schema> {
        Ok(self.schema.clone())
    }

    fn size_hint(&self) -> Option<usize> {
        Some(self.rows)
    }

    fn batches(&self, batch_size: usize) -> Result<BatchIter> {
        let schema = self.schema.clone();
        let batch_size = batch_size.max(1);
        let per_file = self.paths.clone().into_iter().map(move |path| {
            debug!(path = %path.display(), "reading parquet file");
            let reader = open_builder(&path)?
                .with_batch_size(batch_size)
                .build()
                .with_context(|| format!("build reader for {}", path.display()))?;
            Ok::<_, anyhow::Error>((path, reader))
        });
        let schema_for_batches = schema.clone();
        let batches = per_file.flat_map(move |opened| -> Box<dyn Iterator<Item = Result<Table>>> {
            match opened {
                Err(e) => Box::new(std::iter::once(Err(e))),
                Ok((path, reader)) => {
                    let schema = schema_for_batches.clone();
                    Box::new(reader.map(move |batch| {
                        let batch = batch.map_err(|e| {
                            FrameError::parse(path.display().to_string(), e.to_string())
                        })?;
                        record_batch_to_table(&batch, &schema)
                    }))
                }
            }
        });
        let mut batches = batches.peekable();
        if batches.peek().is_none() {
            return Ok(Box::new(std::iter::once(Ok(Table::empty(&schema)))));
        }
        Ok(Box::new(batches))
    }
}

/// Read Parquet file(s) into a table.
///
/// # Errors
/// See [`ParquetSource::new`]; plus decoding failures.
pub fn read_parquet(path: impl AsRef<Path>) -> Result<Table> {
    let source = ParquetSource::new(path)?;
    let batches = source.batches(crate::runner::DEFAULT_BATCH_SIZE)?;
    let table = drain(batches, Table::empty(&source.schema))?;
    info!(source = %source.label, rows = table.height(), "read parquet");
    Ok(table)
}

/// Lazily scan Parquet file(s).
///
/// # Errors
/// See [`ParquetSource::new`].
pub fn scan_parquet(path: impl AsRef<Path>) -> Result<LazyFrame> {
    Ok(LazyFrame::scan(ParquetSource::new(path)?))
}

/// Write `table` to a Parquet file. Returns the number of rows written.
///
/// # Errors
/// Conversion or I/O failures.
pub fn write_parquet(table: &Table, path: impl AsRef<Path>) -> Result<usize> {
    let path = path.as_ref();
    ensure_parent(path)?;
    let batch = table_to_record_batch(table)?;
    let file = File::create(path).with_context(|| format!("create {}", path.display()))?;
    let props = WriterProperties::builder().build();
    let mut writer =
        ArrowWriter::try_new(file, batch.schema(), Some(props)).context("create ArrowWriter")?;
    writer.write(&batch).context("write batch to parquet")?;
    writer.close().context("close ArrowWriter")?;
    debug!(path = %path.display(), rows = table.height(), "wrote parquet");
    Ok(table.height())
}

impl LazyFrame {
    /// Materialize and write the result as Parquet.
    ///
    /// # Errors
    /// Materialization or I/O failures.
    pub fn sink_parquet(&self, path: impl AsRef<Path>) -> Result<usize> {
        write_parquet(&self.collect()?, path)
    }
}
