//! In-memory columnar table
//!
//! Every stage of the pipeline works on [`Table`]: a list of equally long,
//! uniquely named, typed columns. Cells are read out as [`KeyValue`], which is
//! hashable and totally ordered so rows can be grouped, joined and sorted by
//! any combination of columns.

use crate::error::{PipelineError, Result};
use arrow_schema::DataType;
use serde::{Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Typed storage for one column
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnData {
    Int(Vec<i64>),
    /// Missing values are NaN
    Float(Vec<f64>),
    Bool(Vec<bool>),
    Str(Vec<String>),
}

impl ColumnData {
    pub fn len(&self) -> usize {
        match self {
            ColumnData::Int(v) => v.len(),
            ColumnData::Float(v) => v.len(),
            ColumnData::Bool(v) => v.len(),
            ColumnData::Str(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Short name of the storage type, used in error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            ColumnData::Int(_) => "int",
            ColumnData::Float(_) => "float",
            ColumnData::Bool(_) => "bool",
            ColumnData::Str(_) => "string",
        }
    }

    /// Cell at `row` as an owned key value
    pub fn value(&self, row: usize) -> KeyValue {
        match self {
            ColumnData::Int(v) => KeyValue::Int(v[row]),
            ColumnData::Float(v) => KeyValue::Float(v[row]),
            ColumnData::Bool(v) => KeyValue::Bool(v[row]),
            ColumnData::Str(v) => KeyValue::Str(v[row].clone()),
        }
    }

    /// Gather rows by index (indices may repeat or reorder)
    pub fn take(&self, indices: &[usize]) -> ColumnData {
        match self {
            ColumnData::Int(v) => ColumnData::Int(indices.iter().map(|&i| v[i]).collect()),
            ColumnData::Float(v) => ColumnData::Float(indices.iter().map(|&i| v[i]).collect()),
            ColumnData::Bool(v) => ColumnData::Bool(indices.iter().map(|&i| v[i]).collect()),
            ColumnData::Str(v) => {
                ColumnData::Str(indices.iter().map(|&i| v[i].clone()).collect())
            }
        }
    }

    /// Append `other`; an int column meeting a float column is widened to float
    fn append(&mut self, other: &ColumnData) -> bool {
        if let (ColumnData::Int(a), ColumnData::Float(_)) = (&*self, other) {
            *self = ColumnData::Float(a.iter().map(|&x| x as f64).collect());
        }
        match (self, other) {
            (ColumnData::Int(a), ColumnData::Int(b)) => a.extend_from_slice(b),
            (ColumnData::Float(a), ColumnData::Float(b)) => a.extend_from_slice(b),
            (ColumnData::Float(a), ColumnData::Int(b)) => a.extend(b.iter().map(|&x| x as f64)),
            (ColumnData::Bool(a), ColumnData::Bool(b)) => a.extend_from_slice(b),
            (ColumnData::Str(a), ColumnData::Str(b)) => a.extend_from_slice(b),
            _ => return false,
        }
        true
    }
}

/// Storage type a column was loaded with
///
/// Integer columns with nulls are held as floats; the storage type lets them
/// be written back as the integers they were.
#[derive(Debug, Clone, PartialEq)]
pub struct StorageType {
    pub data_type: DataType,
    pub nullable: bool,
}

/// A named column
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub data: ColumnData,
    /// None for columns built in memory
    pub storage: Option<StorageType>,
}

impl Column {
    pub fn new(name: impl Into<String>, data: ColumnData) -> Self {
        Self {
            name: name.into(),
            data,
            storage: None,
        }
    }

    pub fn with_storage(mut self, data_type: DataType, nullable: bool) -> Self {
        self.storage = Some(StorageType {
            data_type,
            nullable,
        });
        self
    }

    /// Gather rows by index, keeping name and storage type
    pub fn take(&self, indices: &[usize]) -> Column {
        Column {
            name: self.name.clone(),
            data: self.data.take(indices),
            storage: self.storage.clone(),
        }
    }

    pub fn int(name: impl Into<String>, values: Vec<i64>) -> Self {
        Self::new(name, ColumnData::Int(values))
    }

    pub fn float(name: impl Into<String>, values: Vec<f64>) -> Self {
        Self::new(name, ColumnData::Float(values))
    }

    pub fn bool(name: impl Into<String>, values: Vec<bool>) -> Self {
        Self::new(name, ColumnData::Bool(values))
    }

    pub fn string<S: Into<String>>(name: impl Into<String>, values: Vec<S>) -> Self {
        Self::new(
            name,
            ColumnData::Str(values.into_iter().map(Into::into).collect()),
        )
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// A single cell used as (part of) a join, group or sort key
#[derive(Debug, Clone)]
pub enum KeyValue {
    Int(i64),
    Float(f64),
    Bool(bool),
    Str(String),
}

impl KeyValue {
    /// Short name of the value's type, matching [`ColumnData::type_name`]
    pub fn type_name(&self) -> &'static str {
        match self {
            KeyValue::Int(_) => "int",
            KeyValue::Float(_) => "float",
            KeyValue::Bool(_) => "bool",
            KeyValue::Str(_) => "string",
        }
    }

    fn variant_rank(&self) -> u8 {
        match self {
            KeyValue::Bool(_) => 0,
            KeyValue::Int(_) => 1,
            KeyValue::Float(_) => 2,
            KeyValue::Str(_) => 3,
        }
    }
}

impl PartialEq for KeyValue {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for KeyValue {}

impl Hash for KeyValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.variant_rank().hash(state);
        match self {
            KeyValue::Int(v) => v.hash(state),
            KeyValue::Float(v) => v.to_bits().hash(state),
            KeyValue::Bool(v) => v.hash(state),
            KeyValue::Str(v) => v.hash(state),
        }
    }
}

impl Ord for KeyValue {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (KeyValue::Int(a), KeyValue::Int(b)) => a.cmp(b),
            (KeyValue::Float(a), KeyValue::Float(b)) => a.total_cmp(b),
            (KeyValue::Bool(a), KeyValue::Bool(b)) => a.cmp(b),
            (KeyValue::Str(a), KeyValue::Str(b)) => a.cmp(b),
            _ => self.variant_rank().cmp(&other.variant_rank()),
        }
    }
}

impl PartialOrd for KeyValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for KeyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyValue::Int(v) => write!(f, "{}", v),
            KeyValue::Float(v) => write!(f, "{}", v),
            KeyValue::Bool(v) => write!(f, "{}", v),
            KeyValue::Str(v) => f.write_str(v),
        }
    }
}

impl Serialize for KeyValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            KeyValue::Int(v) => serializer.serialize_i64(*v),
            KeyValue::Float(v) => serializer.serialize_f64(*v),
            KeyValue::Bool(v) => serializer.serialize_bool(*v),
            KeyValue::Str(v) => serializer.serialize_str(v),
        }
    }
}

impl From<&str> for KeyValue {
    fn from(value: &str) -> Self {
        KeyValue::Str(value.to_string())
    }
}

impl From<bool> for KeyValue {
    fn from(value: bool) -> Self {
        KeyValue::Bool(value)
    }
}

impl From<i64> for KeyValue {
    fn from(value: i64) -> Self {
        KeyValue::Int(value)
    }
}

/// Render `name=value` pairs for diagnostics
pub fn describe_key(names: &[String], values: &[KeyValue]) -> String {
    names
        .iter()
        .zip(values)
        .map(|(name, value)| format!("{}={}", name, value))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Columnar table with equally long, uniquely named columns
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    columns: Vec<Column>,
}

impl Table {
    /// Build a table, validating column lengths and name uniqueness
    pub fn new(columns: Vec<Column>) -> Result<Self> {
        let mut table = Self::default();
        for column in columns {
            table.push_column(column)?;
        }
        Ok(table)
    }

    pub fn row_count(&self) -> usize {
        self.columns.first().map_or(0, Column::len)
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.row_count() == 0
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c.name == name)
    }

    pub fn column_index(&self, name: &str) -> Result<usize> {
        self.columns
            .iter()
            .position(|c| c.name == name)
            .ok_or_else(|| PipelineError::MissingColumn(name.to_string()))
    }

    pub fn column(&self, name: &str) -> Result<&Column> {
        let index = self.column_index(name)?;
        Ok(&self.columns[index])
    }

    /// Append a column; its length must match the table's row count
    pub fn push_column(&mut self, column: Column) -> Result<()> {
        if self.has_column(&column.name) {
            return Err(PipelineError::DuplicateColumn(column.name));
        }
        let found = column.len();
        if !self.columns.is_empty() && found != self.row_count() {
            return Err(PipelineError::LengthMismatch {
                column: column.name,
                expected: self.row_count(),
                found,
            });
        }
        self.columns.push(column);
        Ok(())
    }

    /// Replace the column with the same name, or append it
    pub fn set_column(&mut self, column: Column) -> Result<()> {
        match self.columns.iter().position(|c| c.name == column.name) {
            Some(index) => {
                let found = column.len();
                if found != self.row_count() {
                    return Err(PipelineError::LengthMismatch {
                        column: column.name,
                        expected: self.row_count(),
                        found,
                    });
                }
                self.columns[index] = column;
                Ok(())
            }
            None => self.push_column(column),
        }
    }

    /// Values of a numeric column as floats (integers are widened)
    pub fn float_values(&self, name: &str) -> Result<Vec<f64>> {
        match &self.column(name)?.data {
            ColumnData::Float(v) => Ok(v.clone()),
            ColumnData::Int(v) => Ok(v.iter().map(|&x| x as f64).collect()),
            other => Err(PipelineError::ColumnType {
                column: name.to_string(),
                expected: "numeric",
                found: other.type_name(),
            }),
        }
    }

    /// Values of an integer column
    pub fn int_values(&self, name: &str) -> Result<&[i64]> {
        match &self.column(name)?.data {
            ColumnData::Int(v) => Ok(v),
            other => Err(PipelineError::ColumnType {
                column: name.to_string(),
                expected: "int",
                found: other.type_name(),
            }),
        }
    }

    /// Resolve a list of column names to indices
    pub fn indices_of<S: AsRef<str>>(&self, names: &[S]) -> Result<Vec<usize>> {
        names.iter().map(|n| self.column_index(n.as_ref())).collect()
    }

    /// Key of `row` over the columns at `indices`
    pub fn row_key(&self, row: usize, indices: &[usize]) -> Vec<KeyValue> {
        indices
            .iter()
            .map(|&i| self.columns[i].data.value(row))
            .collect()
    }

    /// Gather rows by index into a new table
    pub fn take(&self, indices: &[usize]) -> Table {
        Table {
            columns: self.columns.iter().map(|c| c.take(indices)).collect(),
        }
    }

    /// Stable ascending sort by the given columns
    pub fn sort_by<S: AsRef<str>>(&self, names: &[S]) -> Result<Table> {
        let indices = self.indices_of(names)?;
        let mut order: Vec<usize> = (0..self.row_count()).collect();
        order.sort_by_cached_key(|&row| self.row_key(row, &indices));
        Ok(self.take(&order))
    }

    /// Concatenate tables with identical column names and storage types
    pub fn concat(tables: Vec<Table>) -> Result<Table> {
        let mut iter = tables.into_iter();
        let Some(mut out) = iter.next() else {
            return Ok(Table::default());
        };
        for table in iter {
            if table.column_names() != out.column_names() {
                return Err(PipelineError::SchemaMismatch(format!(
                    "expected columns {:?}, found {:?}",
                    out.column_names(),
                    table.column_names()
                )));
            }
            for (target, source) in out.columns.iter_mut().zip(&table.columns) {
                if let Some(stored) = &source.storage {
                    match &mut target.storage {
                        Some(own) if own.data_type != stored.data_type => {
                            return Err(PipelineError::SchemaMismatch(format!(
                                "column {} is stored as {} in one table and {} in another",
                                target.name, own.data_type, stored.data_type
                            )));
                        }
                        Some(own) => own.nullable |= stored.nullable,
                        None => target.storage = Some(stored.clone()),
                    }
                }
                if !target.data.append(&source.data) {
                    return Err(PipelineError::SchemaMismatch(format!(
                        "column {} is {} in one table and {} in another",
                        target.name,
                        target.data.type_name(),
                        source.data.type_name()
                    )));
                }
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Table {
        Table::new(vec![
            Column::string("mechanism", vec!["b", "a", "b", "a"]),
            Column::int("delegators", vec![2, 2, 1, 1]),
            Column::float("estimate", vec![0.1, 0.2, 0.3, 0.4]),
        ])
        .unwrap()
    }

    #[test]
    fn test_new_rejects_length_mismatch() {
        let err = Table::new(vec![
            Column::int("a", vec![1, 2]),
            Column::int("b", vec![1]),
        ])
        .unwrap_err();
        assert!(matches!(err, PipelineError::LengthMismatch { .. }));
    }

    #[test]
    fn test_new_rejects_duplicate_names() {
        let err = Table::new(vec![Column::int("a", vec![1]), Column::int("a", vec![2])])
            .unwrap_err();
        assert!(matches!(err, PipelineError::DuplicateColumn(_)));
    }

    #[test]
    fn test_sort_by_multiple_columns_is_stable() {
        let sorted = sample().sort_by(&["mechanism", "delegators"]).unwrap();
        assert_eq!(
            sorted.float_values("estimate").unwrap(),
            vec![0.4, 0.2, 0.3, 0.1]
        );
    }

    #[test]
    fn test_float_values_widens_ints_and_rejects_strings() {
        let table = sample();
        assert_eq!(
            table.float_values("delegators").unwrap(),
            vec![2.0, 2.0, 1.0, 1.0]
        );
        assert!(matches!(
            table.float_values("mechanism"),
            Err(PipelineError::ColumnType { .. })
        ));
    }

    #[test]
    fn test_concat_checks_schema() {
        let joined = Table::concat(vec![sample(), sample()]).unwrap();
        assert_eq!(joined.row_count(), 8);

        let other = Table::new(vec![Column::int("x", vec![1])]).unwrap();
        assert!(matches!(
            Table::concat(vec![sample(), other]),
            Err(PipelineError::SchemaMismatch(_))
        ));
    }

    #[test]
    fn test_length_mismatch_reports_counts() {
        let mut table = sample();
        match table.push_column(Column::int("short", vec![1])).unwrap_err() {
            PipelineError::LengthMismatch {
                column,
                expected,
                found,
            } => {
                assert_eq!(column, "short");
                assert_eq!(expected, 4);
                assert_eq!(found, 1);
            }
            other => panic!("expected length mismatch, got {other:?}"),
        }
        assert!(matches!(
            table.set_column(Column::float("estimate", vec![1.0])),
            Err(PipelineError::LengthMismatch { found: 1, .. })
        ));
    }

    #[test]
    fn test_concat_widens_int_with_float_and_keeps_storage() {
        let ints = Table::new(vec![
            Column::int("generation_id", vec![1, 2]).with_storage(DataType::Int32, false)
        ])
        .unwrap();
        let floats = Table::new(vec![
            Column::float("generation_id", vec![3.0, f64::NAN]).with_storage(DataType::Int32, true)
        ])
        .unwrap();

        let joined = Table::concat(vec![ints.clone(), floats]).unwrap();
        let column = joined.column("generation_id").unwrap();
        match &column.data {
            ColumnData::Float(v) => {
                assert_eq!(&v[..3], &[1.0, 2.0, 3.0]);
                assert!(v[3].is_nan());
            }
            other => panic!("expected float column, got {other:?}"),
        }
        let storage = column.storage.as_ref().unwrap();
        assert_eq!(storage.data_type, DataType::Int32);
        assert!(storage.nullable);

        let wider = Table::new(vec![
            Column::int("generation_id", vec![4]).with_storage(DataType::Int64, false)
        ])
        .unwrap();
        assert!(matches!(
            Table::concat(vec![ints, wider]),
            Err(PipelineError::SchemaMismatch(_))
        ));
    }

    #[test]
    fn test_take_and_sort_keep_storage() {
        let table = Table::new(vec![
            Column::int("delegators", vec![2, 1]).with_storage(DataType::UInt16, false)
        ])
        .unwrap();
        let sorted = table.sort_by(&["delegators"]).unwrap();
        let column = sorted.column("delegators").unwrap();
        assert_eq!(column.data, ColumnData::Int(vec![1, 2]));
        assert_eq!(column.storage.as_ref().unwrap().data_type, DataType::UInt16);
    }

    #[test]
    fn test_key_value_ordering_and_equality() {
        assert!(KeyValue::Int(1) < KeyValue::Int(2));
        assert!(KeyValue::Bool(false) < KeyValue::Bool(true));
        assert_eq!(KeyValue::Float(f64::NAN), KeyValue::Float(f64::NAN));
        assert_eq!(KeyValue::from("All Agents"), KeyValue::Str("All Agents".into()));
    }

    #[test]
    fn test_set_column_replaces_in_place() {
        let mut table = sample();
        table
            .set_column(Column::float("estimate", vec![1.0, 1.0, 1.0, 1.0]))
            .unwrap();
        assert_eq!(table.column_count(), 3);
        assert_eq!(table.column_names()[2], "estimate");
        assert_eq!(table.float_values("estimate").unwrap(), vec![1.0; 4]);

        table.set_column(Column::int("extra", vec![0; 4])).unwrap();
        assert_eq!(table.column_count(), 4);
    }

    #[test]
    fn test_describe_key() {
        let names = vec!["a".to_string(), "b".to_string()];
        let values = vec![KeyValue::Int(1), KeyValue::from("x")];
        assert_eq!(describe_key(&names, &values), "a=1, b=x");
    }
}
