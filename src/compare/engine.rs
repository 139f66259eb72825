// Group comparison engine
//
// Partitions a table by the distinct combinations of the grouping columns and
// runs three rank-sum tests per comparison: target > others, target != others
// and target < others. The two-sided result is stored as 1 - p, so a value near
// 1 means the distributions differ.

use crate::compare::mann_whitney::{mann_whitney_u, Alternative};
use crate::error::Result;
use crate::table::{describe_key, KeyValue, Table};
use serde::Serialize;
use std::collections::BTreeMap;
use std::io::Write;
use tracing::{info, warn};

pub const STATISTIC: &str = "Statistic";
pub const P_VALUE_GREATER: &str = "PValueGreater";
pub const P_VALUE_EQUAL: &str = "PValueEqual";
pub const P_VALUE_LESSER: &str = "PValueLesser";

/// Suffix of the other group's columns in pairwise comparisons
pub const OTHER_SUFFIX: &str = "Other";

/// Comparison mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComparisonMode {
    /// Each group against all remaining rows
    AgainstRest,
    /// Each group against each other group
    Pairwise,
}

/// One comparison result
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComparisonRow {
    pub group: Vec<KeyValue>,
    /// Values of the other group (pairwise mode only)
    pub other: Option<Vec<KeyValue>>,
    /// U statistic of the target group, from the greater-direction test
    pub statistic: f64,
    pub p_value_greater: f64,
    /// 1 - two-sided p-value
    pub p_value_equal: f64,
    pub p_value_lesser: f64,
}

/// Results of comparing `target` across the groups of `group_by`
#[derive(Debug, Clone, PartialEq)]
pub struct ComparisonTable {
    pub target: String,
    pub group_by: Vec<String>,
    pub mode: ComparisonMode,
    pub rows: Vec<ComparisonRow>,
}

impl ComparisonTable {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Flat column names: group columns, other-group columns, then statistics
    pub fn column_names(&self) -> Vec<String> {
        let mut names = self.group_by.clone();
        if self.mode == ComparisonMode::Pairwise {
            names.extend(self.group_by.iter().map(|c| format!("{}{}", c, OTHER_SUFFIX)));
        }
        names.extend(
            [STATISTIC, P_VALUE_GREATER, P_VALUE_EQUAL, P_VALUE_LESSER]
                .iter()
                .map(|s| s.to_string()),
        );
        names
    }

    fn flat_values(row: &ComparisonRow) -> Vec<serde_json::Value> {
        let mut values: Vec<serde_json::Value> = row
            .group
            .iter()
            .chain(row.other.iter().flatten())
            .map(key_to_json)
            .collect();
        values.extend(
            [
                row.statistic,
                row.p_value_greater,
                row.p_value_equal,
                row.p_value_lesser,
            ]
            .iter()
            .map(|&v| serde_json::json!(v)),
        );
        values
    }

    /// One JSON object per row, keyed by the flat column names
    pub fn to_json(&self) -> serde_json::Value {
        let names = self.column_names();
        let records: Vec<serde_json::Value> = self
            .rows
            .iter()
            .map(|row| {
                let object: serde_json::Map<String, serde_json::Value> = names
                    .iter()
                    .cloned()
                    .zip(Self::flat_values(row))
                    .collect();
                serde_json::Value::Object(object)
            })
            .collect();
        serde_json::Value::Array(records)
    }

    /// Write the table as CSV with a header row
    pub fn write_csv<W: Write>(&self, writer: W) -> Result<()> {
        let mut csv = csv::Writer::from_writer(writer);
        csv.write_record(self.column_names())?;
        for row in &self.rows {
            let mut record: Vec<String> = row
                .group
                .iter()
                .chain(row.other.iter().flatten())
                .map(|v| v.to_string())
                .collect();
            record.extend(
                [
                    row.statistic,
                    row.p_value_greater,
                    row.p_value_equal,
                    row.p_value_lesser,
                ]
                .iter()
                .map(|v| v.to_string()),
            );
            csv.write_record(&record)?;
        }
        csv.flush()?;
        Ok(())
    }
}

fn key_to_json(value: &KeyValue) -> serde_json::Value {
    match value {
        KeyValue::Int(v) => serde_json::json!(v),
        KeyValue::Float(v) => serde_json::json!(v),
        KeyValue::Bool(v) => serde_json::json!(v),
        KeyValue::Str(v) => serde_json::json!(v),
    }
}

/// Target samples per distinct group, in ascending key order
struct Partition {
    keys: Vec<Vec<KeyValue>>,
    samples: Vec<Vec<f64>>,
}

fn partition(table: &Table, target: &str, group_by: &[String]) -> Result<Partition> {
    let indices = table.indices_of(group_by)?;
    let values = table.float_values(target)?;

    let mut groups: BTreeMap<Vec<KeyValue>, Vec<f64>> = BTreeMap::new();
    let mut missing = 0usize;
    for (row, &value) in values.iter().enumerate() {
        let sample = groups.entry(table.row_key(row, &indices)).or_default();
        if value.is_nan() {
            missing += 1;
        } else {
            sample.push(value);
        }
    }
    if missing > 0 {
        warn!(target_column = target, missing, "ignoring NaN target values");
    }

    let (keys, samples) = groups.into_iter().unzip();
    Ok(Partition { keys, samples })
}

/// Greater, two-sided and less tests of `target` against `others`
fn three_way(
    group: Vec<KeyValue>,
    other: Option<Vec<KeyValue>>,
    target: &[f64],
    others: &[f64],
) -> Result<ComparisonRow> {
    let greater = mann_whitney_u(target, others, Alternative::Greater)?;
    let not_equal = mann_whitney_u(target, others, Alternative::TwoSided)?;
    let less = mann_whitney_u(target, others, Alternative::Less)?;
    Ok(ComparisonRow {
        group,
        other,
        statistic: greater.statistic,
        p_value_greater: greater.pvalue,
        p_value_equal: 1.0 - not_equal.pvalue,
        p_value_lesser: less.pvalue,
    })
}

fn sorted(mut rows: Vec<ComparisonRow>) -> Vec<ComparisonRow> {
    rows.sort_by(|a, b| (&a.group, &a.other).cmp(&(&b.group, &b.other)));
    rows
}

/// Compare each group of `group_by` against every row outside it
///
/// Groups whose target sample or complement is empty are skipped with a warning.
pub fn compare_against_rest(
    table: &Table,
    target: &str,
    group_by: &[String],
) -> Result<ComparisonTable> {
    let partition = partition(table, target, group_by)?;
    let mut rows = Vec::with_capacity(partition.keys.len());

    for (i, key) in partition.keys.iter().enumerate() {
        let label = describe_key(group_by, key);
        let sample = &partition.samples[i];
        if sample.is_empty() {
            warn!(group = %label, "group has 0 rows, skipping");
            continue;
        }
        let others: Vec<f64> = partition
            .samples
            .iter()
            .enumerate()
            .filter(|(j, _)| *j != i)
            .flat_map(|(_, s)| s.iter().copied())
            .collect();
        if others.is_empty() {
            warn!(group = %label, "no rows outside group, skipping");
            continue;
        }
        rows.push(three_way(key.clone(), None, sample, &others)?);
    }

    info!(
        target_column = target,
        groups = partition.keys.len(),
        comparisons = rows.len(),
        "compared groups against rest"
    );
    Ok(ComparisonTable {
        target: target.to_string(),
        group_by: group_by.to_vec(),
        mode: ComparisonMode::AgainstRest,
        rows: sorted(rows),
    })
}

/// Compare each group of `group_by` against each other group (ordered pairs,
/// self-pairs excluded)
pub fn compare_pairwise(
    table: &Table,
    target: &str,
    group_by: &[String],
) -> Result<ComparisonTable> {
    let partition = partition(table, target, group_by)?;
    let mut rows = Vec::new();

    for (i, key) in partition.keys.iter().enumerate() {
        let sample = &partition.samples[i];
        if sample.is_empty() {
            warn!(group = %describe_key(group_by, key), "group has 0 rows, skipping");
            continue;
        }
        for (j, other_key) in partition.keys.iter().enumerate() {
            if i == j {
                continue;
            }
            let other = &partition.samples[j];
            if other.is_empty() {
                warn!(group = %describe_key(group_by, other_key), "group has 0 rows, skipping");
                continue;
            }
            rows.push(three_way(
                key.clone(),
                Some(other_key.clone()),
                sample,
                other,
            )?);
        }
    }

    info!(
        target_column = target,
        groups = partition.keys.len(),
        comparisons = rows.len(),
        "compared groups pairwise"
    );
    Ok(ComparisonTable {
        target: target.to_string(),
        group_by: group_by.to_vec(),
        mode: ComparisonMode::Pairwise,
        rows: sorted(rows),
    })
}

/// Dispatch on [`ComparisonMode`]
pub fn compare_groups(
    table: &Table,
    target: &str,
    group_by: &[String],
    mode: ComparisonMode,
) -> Result<ComparisonTable> {
    match mode {
        ComparisonMode::AgainstRest => compare_against_rest(table, target, group_by),
        ComparisonMode::Pairwise => compare_pairwise(table, target, group_by),
    }
}
