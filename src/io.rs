//! Table storage
//!
//! Tables are stored as Arrow IPC files (feather v2), the format the simulation
//! writes its raw batches in. Delimited text batches can be converted in bulk
//! with [`convert_directory`].
//!
//! Columns remember the Arrow type they were read with and are written back as
//! that type. Writes go to a hidden sibling file that is renamed into place, so
//! a failed run never leaves a truncated table behind.

use crate::error::{PipelineError, Result};
use crate::table::{Column, ColumnData, Table};
use arrow_array::cast::AsArray;
use arrow_array::types::{
    Float32Type, Float64Type, Int16Type, Int32Type, Int64Type, Int8Type, UInt16Type, UInt32Type,
    UInt64Type, UInt8Type,
};
use arrow_array::{
    new_empty_array, Array, ArrayRef, BooleanArray, Float32Array, Float64Array, Int16Array,
    Int32Array, Int64Array, Int8Array, LargeStringArray, RecordBatch, StringArray, UInt16Array,
    UInt32Array, UInt64Array, UInt8Array,
};
use arrow_ipc::reader::FileReader;
use arrow_ipc::writer::FileWriter;
use arrow_schema::{DataType, Field, Schema};
use std::fmt::Display;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Extension of delimited text batches picked up by [`convert_directory`]
pub const CSV_EXTENSION: &str = "csv";

/// Extension of converted batches
pub const FEATHER_EXTENSION: &str = "feather";

/// Progress is reported every this many files
const PROGRESS_EVERY: usize = 100;

fn overflow(column: &str, value: impl Display) -> PipelineError {
    PipelineError::IntegerOverflow {
        column: column.to_string(),
        value: value.to_string(),
    }
}

fn to_i64<T>(column: &str, value: T) -> Result<i64>
where
    T: Copy + Display,
    i64: TryFrom<T>,
{
    i64::try_from(value).map_err(|_| overflow(column, value))
}

// Integer arrays become int columns; with nulls they become float columns (NaN)
macro_rules! integer_column {
    ($name:expr, $array:expr, $arrow_type:ty) => {{
        let typed = $array.as_primitive::<$arrow_type>();
        if typed.null_count() > 0 {
            ColumnData::Float(
                typed
                    .iter()
                    .map(|v| match v {
                        Some(x) => to_i64($name, x).map(|x| x as f64),
                        None => Ok(f64::NAN),
                    })
                    .collect::<Result<Vec<_>>>()?,
            )
        } else {
            ColumnData::Int(
                typed
                    .values()
                    .iter()
                    .map(|&x| to_i64($name, x))
                    .collect::<Result<Vec<_>>>()?,
            )
        }
    }};
}

macro_rules! float_column {
    ($array:expr, $arrow_type:ty) => {{
        let typed = $array.as_primitive::<$arrow_type>();
        ColumnData::Float(
            typed
                .iter()
                .map(|v| v.map_or(f64::NAN, |x| x as f64))
                .collect(),
        )
    }};
}

fn column_from_array(field: &Field, array: &ArrayRef) -> Result<Column> {
    let name = field.name().as_str();
    let unsupported = || PipelineError::UnsupportedColumnType {
        column: name.to_string(),
        data_type: array.data_type().to_string(),
    };

    let data = match array.data_type() {
        DataType::Int8 => integer_column!(name, array, Int8Type),
        DataType::Int16 => integer_column!(name, array, Int16Type),
        DataType::Int32 => integer_column!(name, array, Int32Type),
        DataType::Int64 => integer_column!(name, array, Int64Type),
        DataType::UInt8 => integer_column!(name, array, UInt8Type),
        DataType::UInt16 => integer_column!(name, array, UInt16Type),
        DataType::UInt32 => integer_column!(name, array, UInt32Type),
        DataType::UInt64 => integer_column!(name, array, UInt64Type),
        DataType::Float32 => float_column!(array, Float32Type),
        DataType::Float64 => float_column!(array, Float64Type),
        DataType::Boolean => {
            let typed = array.as_boolean();
            if typed.null_count() > 0 {
                return Err(unsupported());
            }
            ColumnData::Bool(typed.values().iter().collect())
        }
        DataType::Utf8 => ColumnData::Str(
            array
                .as_string::<i32>()
                .iter()
                .map(|v| v.unwrap_or_default().to_string())
                .collect(),
        ),
        DataType::LargeUtf8 => ColumnData::Str(
            array
                .as_string::<i64>()
                .iter()
                .map(|v| v.unwrap_or_default().to_string())
                .collect(),
        ),
        _ => return Err(unsupported()),
    };
    Ok(Column::new(name, data).with_storage(array.data_type().clone(), field.is_nullable()))
}

/// Convert one record batch into a table
pub fn table_from_batch(batch: &RecordBatch) -> Result<Table> {
    let schema = batch.schema();
    let columns = schema
        .fields()
        .iter()
        .zip(batch.columns())
        .map(|(field, array)| column_from_array(field, array))
        .collect::<Result<Vec<_>>>()?;
    Table::new(columns)
}

/// Int cells of an int or float column, NaN as null
fn integer_cells(data: &ColumnData) -> Option<Vec<Option<i64>>> {
    match data {
        ColumnData::Int(v) => Some(v.iter().map(|&x| Some(x)).collect()),
        ColumnData::Float(v) => Some(
            v.iter()
                .map(|&x| (!x.is_nan()).then_some(x as i64))
                .collect(),
        ),
        ColumnData::Bool(_) | ColumnData::Str(_) => None,
    }
}

macro_rules! narrow_array {
    ($name:expr, $cells:expr, $array_type:ty, $native:ty) => {{
        let values = $cells
            .iter()
            .map(|&cell| {
                cell.map(|x| <$native>::try_from(x).map_err(|_| overflow($name, x)))
                    .transpose()
            })
            .collect::<Result<Vec<Option<$native>>>>()?;
        Arc::new(<$array_type>::from(values)) as ArrayRef
    }};
}

/// Array of the stored integer type, or None if `data_type` is not an integer type
fn integer_array(name: &str, data_type: &DataType, cells: &[Option<i64>]) -> Result<Option<ArrayRef>> {
    let array = match data_type {
        DataType::Int8 => narrow_array!(name, cells, Int8Array, i8),
        DataType::Int16 => narrow_array!(name, cells, Int16Array, i16),
        DataType::Int32 => narrow_array!(name, cells, Int32Array, i32),
        DataType::Int64 => narrow_array!(name, cells, Int64Array, i64),
        DataType::UInt8 => narrow_array!(name, cells, UInt8Array, u8),
        DataType::UInt16 => narrow_array!(name, cells, UInt16Array, u16),
        DataType::UInt32 => narrow_array!(name, cells, UInt32Array, u32),
        DataType::UInt64 => narrow_array!(name, cells, UInt64Array, u64),
        _ => return Ok(None),
    };
    Ok(Some(array))
}

fn column_to_array(column: &Column) -> Result<(Field, ArrayRef)> {
    let stored = column.storage.as_ref().map(|s| &s.data_type);

    let restored = match (stored, integer_cells(&column.data)) {
        (Some(data_type), Some(cells)) => integer_array(&column.name, data_type, &cells)?,
        _ => None,
    };
    let array: ArrayRef = match restored {
        Some(array) => array,
        None => match (&column.data, stored) {
            (ColumnData::Float(v), Some(DataType::Float32)) => Arc::new(Float32Array::from(
                v.iter().map(|&x| x as f32).collect::<Vec<_>>(),
            )),
            (ColumnData::Float(v), _) => Arc::new(Float64Array::from(v.clone())),
            (ColumnData::Int(v), _) => Arc::new(Int64Array::from(v.clone())),
            (ColumnData::Bool(v), _) => Arc::new(BooleanArray::from(v.clone())),
            (ColumnData::Str(v), Some(DataType::LargeUtf8)) => {
                Arc::new(LargeStringArray::from_iter_values(v.iter()))
            }
            (ColumnData::Str(v), _) => Arc::new(StringArray::from(v.clone())),
        },
    };

    let nullable = column.storage.as_ref().is_some_and(|s| s.nullable) || array.null_count() > 0;
    let field = Field::new(column.name.as_str(), array.data_type().clone(), nullable);
    Ok((field, array))
}

/// Convert a table into one record batch, restoring stored column types
pub fn table_to_batch(table: &Table) -> Result<RecordBatch> {
    if table.column_count() == 0 {
        return Err(PipelineError::SchemaMismatch(
            "cannot store a table without columns".to_string(),
        ));
    }

    let mut fields = Vec::with_capacity(table.column_count());
    let mut arrays = Vec::with_capacity(table.column_count());
    for column in table.columns() {
        let (field, array) = column_to_array(column)?;
        fields.push(field);
        arrays.push(array);
    }
    Ok(RecordBatch::try_new(Arc::new(Schema::new(fields)), arrays)?)
}

/// Read an Arrow IPC (feather v2) file
pub fn read_table(path: &Path) -> Result<Table> {
    debug!(path = %path.display(), "reading table");
    let reader = FileReader::try_new(BufReader::new(File::open(path)?), None)?;
    let schema = reader.schema();

    let mut tables = Vec::new();
    for batch in reader {
        tables.push(table_from_batch(&batch?)?);
    }
    if tables.is_empty() {
        let columns = schema
            .fields()
            .iter()
            .map(|field| column_from_array(field, &new_empty_array(field.data_type())))
            .collect::<Result<Vec<_>>>()?;
        return Table::new(columns);
    }
    Table::concat(tables)
}

/// Read several files and concatenate them in order
pub fn read_tables<P: AsRef<Path>>(paths: &[P]) -> Result<Table> {
    let tables = paths
        .iter()
        .map(|p| read_table(p.as_ref()))
        .collect::<Result<Vec<_>>>()?;
    Table::concat(tables)
}

fn staging_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{}.partial", name))
}

/// A table fully written to a staging file next to its target
///
/// Nothing is visible under the target name until [`StagedTable::commit`].
/// Dropping an uncommitted table removes the staging file.
#[derive(Debug)]
pub struct StagedTable {
    staging: PathBuf,
    target: PathBuf,
    committed: bool,
}

impl StagedTable {
    pub fn target(&self) -> &Path {
        &self.target
    }

    /// Rename the staging file into place
    pub fn commit(mut self) -> Result<PathBuf> {
        fs::rename(&self.staging, &self.target)?;
        self.committed = true;
        Ok(self.target.clone())
    }
}

impl Drop for StagedTable {
    fn drop(&mut self) {
        if !self.committed {
            let _ = fs::remove_file(&self.staging);
        }
    }
}

/// Write `table` to the staging file of `path`
pub fn stage_table(table: &Table, path: &Path) -> Result<StagedTable> {
    let batch = table_to_batch(table)?;
    let staged = StagedTable {
        staging: staging_path(path),
        target: path.to_path_buf(),
        committed: false,
    };

    let mut writer = FileWriter::try_new(
        BufWriter::new(File::create(&staged.staging)?),
        &batch.schema(),
    )?;
    writer.write(&batch)?;
    writer.finish()?;
    drop(writer);

    debug!(path = %path.display(), rows = table.row_count(), "staged table");
    Ok(staged)
}

/// Write a table as an Arrow IPC file, replacing `path` only once complete
pub fn write_table(table: &Table, path: &Path) -> Result<()> {
    stage_table(table, path)?.commit()?;
    Ok(())
}

/// Parse a pandas-style boolean
fn parse_bool(raw: &str) -> Option<bool> {
    match raw {
        "True" | "true" => Some(true),
        "False" | "false" => Some(false),
        _ => None,
    }
}

/// Infer the narrowest column type that holds every raw value
///
/// Booleans and integers must have no empty cells; floats read empty cells as
/// NaN; anything else stays a string.
fn infer_column(name: &str, raw: &[&str]) -> Column {
    if raw.is_empty() {
        return Column::new(name, ColumnData::Str(Vec::new()));
    }
    if let Some(values) = raw.iter().map(|v| parse_bool(v)).collect::<Option<Vec<_>>>() {
        return Column::bool(name, values);
    }
    if let Some(values) = raw
        .iter()
        .map(|v| v.parse::<i64>().ok())
        .collect::<Option<Vec<_>>>()
    {
        return Column::int(name, values);
    }
    if let Some(values) = raw
        .iter()
        .map(|v| {
            if v.is_empty() {
                Some(f64::NAN)
            } else {
                v.parse::<f64>().ok()
            }
        })
        .collect::<Option<Vec<_>>>()
    {
        return Column::float(name, values);
    }
    Column::string(name, raw.to_vec())
}

/// Read a delimited text file with a header row
pub fn read_csv(path: &Path) -> Result<Table> {
    let mut reader = csv::ReaderBuilder::new().has_headers(true).from_path(path)?;
    let headers = reader.headers()?.clone();
    let records = reader
        .records()
        .collect::<std::result::Result<Vec<_>, csv::Error>>()?;

    let columns = headers
        .iter()
        .enumerate()
        .map(|(i, name)| {
            let raw: Vec<&str> = records.iter().map(|r| r.get(i).unwrap_or("")).collect();
            infer_column(name, &raw)
        })
        .collect();
    Table::new(columns)
}

/// Rewrite every `*.csv` file in `dir` as a `*.feather` file next to it
///
/// Non-matching entries are skipped. Every file is read before any is written.
/// Returns the written paths.
pub fn convert_directory(dir: &Path, verbose: bool) -> Result<Vec<PathBuf>> {
    let mut entries = fs::read_dir(dir)?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<std::io::Result<Vec<_>>>()?;
    entries.sort();
    let total = entries.len();
    if verbose {
        info!("Checking {} files", total);
    }

    let mut data_files = Vec::new();
    for (i, path) in entries.into_iter().enumerate() {
        let checked = i + 1;
        if verbose && checked % PROGRESS_EVERY == 0 {
            info!(
                "Checking {}/{} ({:.2}%)",
                checked,
                total,
                checked as f64 / total as f64 * 100.0
            );
        }
        let is_csv = path.extension().is_some_and(|ext| ext == CSV_EXTENSION);
        if is_csv && path.is_file() {
            data_files.push(path);
        }
    }

    let count = data_files.len();
    if verbose {
        info!("Reading {} files", count);
    }
    let mut tables = Vec::with_capacity(count);
    for (i, path) in data_files.into_iter().enumerate() {
        let read = i + 1;
        if verbose && read % PROGRESS_EVERY == 0 {
            info!(
                "Reading {}/{} ({:.2}%)",
                read,
                count,
                read as f64 / count as f64 * 100.0
            );
        }
        let table = read_csv(&path)?;
        tables.push((path, table));
    }

    if verbose {
        info!("Done reading, writing {} feather files", count);
    }
    let mut written = Vec::with_capacity(count);
    for (path, table) in tables {
        let target = path.with_extension(FEATHER_EXTENSION);
        write_table(&table, &target)?;
        written.push(target);
    }
    Ok(written)
}
