//! Aggregation and flattening
//!
//! Groups a processed table by every non-metric, non-administrative column and
//! summarizes each metric per group. Columns are labelled `(metric, statistic)`
//! until [`DescribedTable::flatten`] turns them into `metric/statistic` names.

use crate::error::Result;
use crate::table::{Column, KeyValue, Table};
use crate::taxonomy::{ColumnTaxonomy, MetricColumns, STAT_SEPARATOR};
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Summary statistics computed per metric and group
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Statistic {
    Count,
    Mean,
    Std,
    Min,
    Q25,
    Q50,
    Q75,
    Max,
}

impl Statistic {
    pub const ALL: [Statistic; 8] = [
        Statistic::Count,
        Statistic::Mean,
        Statistic::Std,
        Statistic::Min,
        Statistic::Q25,
        Statistic::Q50,
        Statistic::Q75,
        Statistic::Max,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Statistic::Count => "count",
            Statistic::Mean => "mean",
            Statistic::Std => "std",
            Statistic::Min => "min",
            Statistic::Q25 => "25%",
            Statistic::Q50 => "50%",
            Statistic::Q75 => "75%",
            Statistic::Max => "max",
        }
    }
}

/// Two-level column label of a described table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnLabel {
    pub metric: String,
    /// None for group-key columns
    pub statistic: Option<Statistic>,
}

impl ColumnLabel {
    /// `metric/statistic`, or the bare name for group-key columns
    pub fn flatten(&self) -> String {
        match self.statistic {
            Some(stat) => format!("{}{}{}", self.metric, STAT_SEPARATOR, stat.label()),
            None => self.metric.clone(),
        }
    }
}

/// Linear-interpolation quantile of sorted, NaN-free values
fn quantile(sorted: &[f64], q: f64) -> f64 {
    match sorted.len() {
        0 => f64::NAN,
        1 => sorted[0],
        n => {
            let pos = q * (n - 1) as f64;
            let lower = pos.floor() as usize;
            let upper = pos.ceil() as usize;
            sorted[lower] + (sorted[upper] - sorted[lower]) * (pos - lower as f64)
        }
    }
}

/// Every [`Statistic`] for one sample, in [`Statistic::ALL`] order. NaN values
/// are ignored; std uses one delta degree of freedom.
pub fn summarize(values: &[f64]) -> [f64; 8] {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
    sorted.sort_by(f64::total_cmp);
    let n = sorted.len();

    let mean = if n == 0 {
        f64::NAN
    } else {
        sorted.iter().sum::<f64>() / n as f64
    };
    let std = if n < 2 {
        f64::NAN
    } else {
        let ss: f64 = sorted.iter().map(|v| (v - mean).powi(2)).sum();
        (ss / (n - 1) as f64).sqrt()
    };

    [
        n as f64,
        mean,
        std,
        sorted.first().copied().unwrap_or(f64::NAN),
        quantile(&sorted, 0.25),
        quantile(&sorted, 0.5),
        quantile(&sorted, 0.75),
        sorted.last().copied().unwrap_or(f64::NAN),
    ]
}

/// Grouped summary with hierarchical column labels
#[derive(Debug, Clone)]
pub struct DescribedTable {
    group_columns: Vec<Column>,
    statistics: Vec<(ColumnLabel, Vec<f64>)>,
    rows: usize,
}

impl DescribedTable {
    pub fn row_count(&self) -> usize {
        self.rows
    }

    /// Labels in output order: group columns, then metric statistics
    pub fn labels(&self) -> Vec<ColumnLabel> {
        self.group_columns
            .iter()
            .map(|c| ColumnLabel {
                metric: c.name.clone(),
                statistic: None,
            })
            .chain(self.statistics.iter().map(|(label, _)| label.clone()))
            .collect()
    }

    /// Values of one statistic column
    pub fn statistic(&self, metric: &str, statistic: Statistic) -> Option<&[f64]> {
        self.statistics
            .iter()
            .find(|(label, _)| label.metric == metric && label.statistic == Some(statistic))
            .map(|(_, values)| values.as_slice())
    }

    /// Flatten labels to single names, dropping `count` statistics and
    /// anything derived from administrative columns
    pub fn flatten(self, taxonomy: &ColumnTaxonomy) -> Result<Table> {
        let keep = |name: &str| !taxonomy.mentions_administrative(name);
        let known = taxonomy.described_metric_names();

        let mut columns: Vec<Column> = self
            .group_columns
            .into_iter()
            .filter(|c| keep(&c.name))
            .collect();
        for (label, values) in self.statistics {
            if label.statistic == Some(Statistic::Count) {
                continue;
            }
            let name = label.flatten();
            if keep(&name) {
                if !known.contains(&name) {
                    debug!(column = %name, "described column outside the experiment metrics");
                }
                columns.push(Column::float(name, values));
            }
        }
        Table::new(columns)
    }
}

/// Group `table` by its group key and summarize every metric column
pub fn describe(
    table: &Table,
    metrics: &MetricColumns,
    taxonomy: &ColumnTaxonomy,
) -> Result<DescribedTable> {
    let names = table.column_names();
    let key = taxonomy.group_key(&names, metrics);
    let key_indices = table.indices_of(&key)?;

    let mut groups: BTreeMap<Vec<KeyValue>, Vec<usize>> = BTreeMap::new();
    for row in 0..table.row_count() {
        groups
            .entry(table.row_key(row, &key_indices))
            .or_default()
            .push(row);
    }
    info!(
        rows = table.row_count(),
        groups = groups.len(),
        "describing by {} key columns",
        key.len()
    );

    let first_rows: Vec<usize> = groups.values().map(|rows| rows[0]).collect();
    let group_columns = key_indices
        .iter()
        .map(|&i| table.columns()[i].take(&first_rows))
        .collect();

    let mut statistics = Vec::new();
    for name in names.iter().filter(|n| metrics.contains(n)) {
        let values = table.float_values(name)?;
        let summaries: Vec<[f64; 8]> = groups
            .values()
            .map(|rows| {
                let sample: Vec<f64> = rows.iter().map(|&r| values[r]).collect();
                summarize(&sample)
            })
            .collect();
        for (i, stat) in Statistic::ALL.iter().enumerate() {
            statistics.push((
                ColumnLabel {
                    metric: name.clone(),
                    statistic: Some(*stat),
                },
                summaries.iter().map(|s| s[i]).collect(),
            ));
        }
    }

    Ok(DescribedTable {
        group_columns,
        statistics,
        rows: groups.len(),
    })
}

/// [`describe`] followed by [`DescribedTable::flatten`]
pub fn describe_flat(
    table: &Table,
    metrics: &MetricColumns,
    taxonomy: &ColumnTaxonomy,
) -> Result<Table> {
    describe(table, metrics, taxonomy)?.flatten(taxonomy)
}
