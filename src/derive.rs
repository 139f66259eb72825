//! Metric derivation pipeline
//!
//! Turns a raw simulation table into a processed table by comparing every row
//! against a baseline row that differs from it in exactly one selector column:
//!
//! ```text
//! raw ──► total_agents ──► error (vs "All Agents") ──► improvement (vs "Active Only")
//!                                                        │
//!                                       full variant ───►└─► shifted_diff/* (vs shifted)
//! ```
//!
//! Each stage takes the table and the metric columns known so far and returns
//! both, extended. The join key of a stage is computed from the metrics it was
//! given, so a metric produced by an earlier stage never ends up in a later key.
//!
//! Baselines are found through a [`BaselineIndex`] instead of a relational join.
//! A duplicate baseline key is a [`PipelineError::JoinCardinality`]; a row with
//! no baseline gets NaN. Row count and row order never change here.

use crate::config::{PipelineConfig, PipelineVariant};
use crate::error::{PipelineError, Result};
use crate::table::{describe_key, Column, KeyValue, Table};
use crate::taxonomy::{
    ColumnTaxonomy, MetricColumns, COORDINATION_MECHANISM, NUMBER_OF_DELEGATORS,
    NUMBER_OF_PROXIES, SHIFTED, SHIFTED_DIFF_PREFIX, SORT_BY, TOTAL_AGENTS,
};
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use tracing::{debug, info};

/// Coordination mechanism every estimate is measured against
pub const ALL_AGENTS: &str = "All Agents";

/// Coordination mechanism improvement is measured against
pub const ACTIVE_ONLY: &str = "Active Only";

const ESTIMATE: &str = "estimate";

/// Table plus the metric columns it carries
#[derive(Debug, Clone)]
pub struct Derived {
    pub table: Table,
    pub metrics: MetricColumns,
}

/// Maps a join key to the single baseline row carrying that key
#[derive(Debug)]
pub struct BaselineIndex {
    key_indices: Vec<usize>,
    rows: HashMap<Vec<KeyValue>, usize>,
}

impl BaselineIndex {
    /// Index every row whose `selector` equals `baseline`
    ///
    /// Fails with [`PipelineError::JoinCardinality`] when two baseline rows
    /// share a key, which would make the lookup ambiguous.
    pub fn build(
        table: &Table,
        stage: &'static str,
        key_columns: &[String],
        selector: &str,
        baseline: &KeyValue,
    ) -> Result<Self> {
        let key_indices = table.indices_of(key_columns)?;
        let selector_data = &table.column(selector)?.data;
        if selector_data.type_name() != baseline.type_name() {
            return Err(PipelineError::ColumnType {
                column: selector.to_string(),
                expected: baseline.type_name(),
                found: selector_data.type_name(),
            });
        }

        let mut rows = HashMap::new();
        for row in 0..table.row_count() {
            if selector_data.value(row) != *baseline {
                continue;
            }
            match rows.entry(table.row_key(row, &key_indices)) {
                Entry::Occupied(existing) => {
                    return Err(PipelineError::JoinCardinality {
                        stage,
                        key: describe_key(key_columns, existing.key()),
                    });
                }
                Entry::Vacant(slot) => {
                    slot.insert(row);
                }
            }
        }

        Ok(Self { key_indices, rows })
    }

    /// Number of baseline rows
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Baseline row for `row`, if one exists
    pub fn lookup(&self, table: &Table, row: usize) -> Option<usize> {
        self.rows.get(&table.row_key(row, &self.key_indices)).copied()
    }

    /// Baseline row for every row of `table`
    pub fn match_rows(&self, table: &Table) -> Vec<Option<usize>> {
        (0..table.row_count())
            .map(|row| self.lookup(table, row))
            .collect()
    }
}

/// Build the baseline index for a stage and match every row against it
fn match_baselines(
    table: &Table,
    metrics: &MetricColumns,
    taxonomy: &ColumnTaxonomy,
    stage: &'static str,
    selector: &str,
    baseline: KeyValue,
) -> Result<Vec<Option<usize>>> {
    let key = taxonomy.join_key(&table.column_names(), metrics, selector);
    debug!(stage, key = ?key, "join key");

    let index = BaselineIndex::build(table, stage, &key, selector, &baseline)?;
    let matched = index.match_rows(table);
    let unmatched = matched.iter().filter(|m| m.is_none()).count();
    info!(
        stage,
        baselines = index.len(),
        rows = table.row_count(),
        unmatched,
        "matched rows against baseline {}={}",
        selector,
        baseline
    );
    Ok(matched)
}

/// Combine each row's value with its baseline's value; NaN when unmatched
fn against_baseline(
    values: &[f64],
    baselines: &[Option<usize>],
    f: impl Fn(f64, f64) -> f64,
) -> Vec<f64> {
    values
        .iter()
        .zip(baselines)
        .map(|(&own, baseline)| match baseline {
            Some(b) => f(own, values[*b]),
            None => f64::NAN,
        })
        .collect()
}

fn add_metric(derived: &mut Derived, name: &str, values: Vec<f64>) -> Result<()> {
    derived.table.set_column(Column::float(name, values))?;
    derived.metrics.insert(name);
    Ok(())
}

/// `total_agents = number_of_proxies + number_of_delegators`
pub fn add_total_agents(mut table: Table, metrics: MetricColumns) -> Result<Derived> {
    let column = match (
        table.int_values(NUMBER_OF_PROXIES),
        table.int_values(NUMBER_OF_DELEGATORS),
    ) {
        (Ok(proxies), Ok(delegators)) => Column::int(
            TOTAL_AGENTS,
            proxies.iter().zip(delegators).map(|(p, d)| p + d).collect(),
        ),
        _ => {
            let proxies = table.float_values(NUMBER_OF_PROXIES)?;
            let delegators = table.float_values(NUMBER_OF_DELEGATORS)?;
            Column::float(
                TOTAL_AGENTS,
                proxies.iter().zip(&delegators).map(|(p, d)| p + d).collect(),
            )
        }
    };
    table.set_column(column)?;
    Ok(Derived { table, metrics })
}

/// Error of every estimate against the "All Agents" estimate of the same run
///
/// Adds `error`, `error_as_percent_of_space`, `squared_error`,
/// `error_as_percent_of_space_squared` and `error_as_percent_of_space_abs`.
/// The last one is the square of the normalized error, not its absolute value;
/// downstream analyses were built on that column as it is.
pub fn add_error(
    table: Table,
    metrics: MetricColumns,
    taxonomy: &ColumnTaxonomy,
    config: &PipelineConfig,
) -> Result<Derived> {
    let baselines = match_baselines(
        &table,
        &metrics,
        taxonomy,
        "error",
        COORDINATION_MECHANISM,
        KeyValue::from(ALL_AGENTS),
    )?;
    let estimate = table.float_values(ESTIMATE)?;
    let error = against_baseline(&estimate, &baselines, |own, base| own - base);

    let span = config.preference_span();
    let percent: Vec<f64> = error.iter().map(|e| e / span).collect();
    let squared: Vec<f64> = error.iter().map(|e| e.powi(2)).collect();
    let percent_squared: Vec<f64> = percent.iter().map(|p| p.powi(2)).collect();

    let mut derived = Derived { table, metrics };
    add_metric(&mut derived, "error", error)?;
    add_metric(&mut derived, "error_as_percent_of_space", percent)?;
    add_metric(&mut derived, "squared_error", squared)?;
    add_metric(
        &mut derived,
        "error_as_percent_of_space_squared",
        percent_squared.clone(),
    )?;
    add_metric(&mut derived, "error_as_percent_of_space_abs", percent_squared)?;
    Ok(derived)
}

/// Improvement of every row over the "Active Only" row of the same run
///
/// `improvement = |error_active_only| - |error|`, positive when this row's
/// error is smaller in magnitude.
pub fn add_improvement(
    table: Table,
    metrics: MetricColumns,
    taxonomy: &ColumnTaxonomy,
    config: &PipelineConfig,
) -> Result<Derived> {
    let baselines = match_baselines(
        &table,
        &metrics,
        taxonomy,
        "improvement",
        COORDINATION_MECHANISM,
        KeyValue::from(ACTIVE_ONLY),
    )?;
    let error = table.float_values("error")?;
    let improvement = against_baseline(&error, &baselines, |own, base| base.abs() - own.abs());
    let span = config.preference_span();
    let percent: Vec<f64> = improvement.iter().map(|i| i / span).collect();

    let mut derived = Derived { table, metrics };
    add_metric(&mut derived, "improvement", improvement)?;
    add_metric(&mut derived, "improvement_as_percent_of_space", percent)?;
    Ok(derived)
}

/// Sensitivity of every metric to shifting the input distribution
///
/// For each metric known so far adds `shifted_diff/<metric> = <metric> -
/// <metric of the shifted run>`.
pub fn add_shift_sensitivity(
    table: Table,
    metrics: MetricColumns,
    taxonomy: &ColumnTaxonomy,
) -> Result<Derived> {
    let baselines = match_baselines(
        &table,
        &metrics,
        taxonomy,
        "shift",
        SHIFTED,
        KeyValue::from(true),
    )?;

    let sources: Vec<String> = metrics.iter().map(str::to_string).collect();
    let mut derived = Derived { table, metrics };
    for metric in sources {
        if !derived.table.has_column(&metric) {
            debug!(metric = %metric, "metric not in table, no shift difference");
            continue;
        }
        let values = derived.table.float_values(&metric)?;
        let diff = against_baseline(&values, &baselines, |own, base| own - base);
        add_metric(&mut derived, &format!("{}{}", SHIFTED_DIFF_PREFIX, metric), diff)?;
    }
    Ok(derived)
}

/// Run every derivation stage of the configured variant, in order
pub fn derive_metrics(
    raw: Table,
    taxonomy: &ColumnTaxonomy,
    config: &PipelineConfig,
) -> Result<Derived> {
    let rows = raw.row_count();
    info!(rows, variant = ?config.variant, "deriving metrics");

    let derived = add_total_agents(raw, taxonomy.metrics().clone())?;
    let derived = add_error(derived.table, derived.metrics, taxonomy, config)?;
    let derived = add_improvement(derived.table, derived.metrics, taxonomy, config)?;
    let derived = match config.variant {
        PipelineVariant::Basic => derived,
        PipelineVariant::Full => add_shift_sensitivity(derived.table, derived.metrics, taxonomy)?,
    };

    debug_assert_eq!(derived.table.row_count(), rows);
    Ok(derived)
}

/// Order rows by the fixed sort key
pub fn sort_for_output(table: &Table) -> Result<Table> {
    table.sort_by(&SORT_BY)
}
