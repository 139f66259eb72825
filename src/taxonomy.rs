//! Column roles for the experiment dataset
//!
//! Every column belongs to exactly one role: identity (which generated run a row
//! came from), independent variable, mechanism selector or metric. Join keys and
//! group-by keys are never listed by hand; they are always "every column except
//! some roles", computed by [`ColumnTaxonomy::join_key`] and
//! [`ColumnTaxonomy::group_key`].

use crate::error::{PipelineError, Result};
use std::collections::BTreeSet;

pub const GENERATION_ID: &str = "generation_id";
pub const SHIFTED: &str = "shifted";
pub const DISCRETE_VOTE: &str = "discrete_vote";
pub const TOTAL_AGENTS: &str = "total_agents";
pub const DISTRIBUTION: &str = "distribution";
pub const NUMBER_OF_PROXIES: &str = "number_of_proxies";
pub const NUMBER_OF_DELEGATORS: &str = "number_of_delegators";
pub const COORDINATION_MECHANISM: &str = "coordination_mechanism";
pub const VOTING_MECHANISM: &str = "voting_mechanism";

/// Metrics present in raw simulation output
pub const RAW_METRICS: [&str; 5] = [
    "estimate",
    "min_proxy_weight",
    "max_proxy_weight",
    "average_proxy_weight",
    "median_proxy_weight",
];

/// Metrics added by the derivation stages, in derivation order
pub const DERIVED_METRICS: [&str; 7] = [
    "error",
    "error_as_percent_of_space",
    "squared_error",
    "error_as_percent_of_space_squared",
    "error_as_percent_of_space_abs",
    "improvement",
    "improvement_as_percent_of_space",
];

/// Prefix for shift-sensitivity columns (`shifted_diff/<metric>`)
pub const SHIFTED_DIFF_PREFIX: &str = "shifted_diff/";

/// Separator between metric and statistic in described column names
pub const STAT_SEPARATOR: char = '/';

/// Statistics kept in described tables (count is dropped)
pub const DESCRIBED_STATISTICS: [&str; 7] = ["mean", "std", "min", "25%", "50%", "75%", "max"];

/// Fixed sort order applied to processed and described tables
pub const SORT_BY: [&str; 6] = [
    COORDINATION_MECHANISM,
    VOTING_MECHANISM,
    DISTRIBUTION,
    SHIFTED,
    DISCRETE_VOTE,
    NUMBER_OF_DELEGATORS,
];

/// Role of a column in the experiment dataset
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnRole {
    Identity,
    IndependentVariable,
    Mechanism,
    Metric,
    Unclassified,
}

/// Insertion-ordered set of metric column names
///
/// Derivation stages thread this through: each stage receives the metrics known
/// so far and returns the set extended with the columns it produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricColumns {
    names: Vec<String>,
}

impl MetricColumns {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut set = Self::default();
        for name in names {
            set.insert(name);
        }
        set
    }

    /// The raw simulation metrics
    pub fn raw() -> Self {
        Self::new(RAW_METRICS)
    }

    /// Add a metric; returns false if it was already present
    pub fn insert(&mut self, name: impl Into<String>) -> bool {
        let name = name.into();
        if self.contains(&name) {
            return false;
        }
        self.names.push(name);
        true
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Disjoint column roles plus the administrative columns excluded from grouping
#[derive(Debug, Clone)]
pub struct ColumnTaxonomy {
    identity: BTreeSet<String>,
    independent: BTreeSet<String>,
    mechanism: BTreeSet<String>,
    metrics: MetricColumns,
    administrative: BTreeSet<String>,
}

fn set_of(names: &[&str]) -> BTreeSet<String> {
    names.iter().map(|s| s.to_string()).collect()
}

impl ColumnTaxonomy {
    /// Build a taxonomy and check it against the fixed sort key
    ///
    /// Fails with [`PipelineError::Configuration`] if the role sets overlap or if
    /// a sort column is not an identity, independent or mechanism column.
    pub fn new(
        identity: BTreeSet<String>,
        independent: BTreeSet<String>,
        mechanism: BTreeSet<String>,
        metrics: MetricColumns,
        administrative: BTreeSet<String>,
    ) -> Result<Self> {
        let taxonomy = Self {
            identity,
            independent,
            mechanism,
            metrics,
            administrative,
        };
        taxonomy.check_disjoint()?;
        taxonomy.check_sort_key(&SORT_BY)?;
        Ok(taxonomy)
    }

    /// Taxonomy of the delegation experiment dataset
    pub fn experiment() -> Result<Self> {
        Self::new(
            set_of(&[GENERATION_ID, SHIFTED, DISCRETE_VOTE, TOTAL_AGENTS, DISTRIBUTION]),
            set_of(&[NUMBER_OF_PROXIES, NUMBER_OF_DELEGATORS]),
            set_of(&[COORDINATION_MECHANISM, VOTING_MECHANISM]),
            MetricColumns::raw(),
            set_of(&[GENERATION_ID]),
        )
    }

    fn check_disjoint(&self) -> Result<()> {
        let roles: [(&str, Vec<&str>); 4] = [
            ("identity", self.identity.iter().map(String::as_str).collect()),
            (
                "independent",
                self.independent.iter().map(String::as_str).collect(),
            ),
            ("mechanism", self.mechanism.iter().map(String::as_str).collect()),
            ("metric", self.metrics.iter().collect()),
        ];
        for (i, (left_name, left)) in roles.iter().enumerate() {
            for (right_name, right) in roles.iter().skip(i + 1) {
                let shared: Vec<&str> = left
                    .iter()
                    .filter(|c| right.contains(c))
                    .copied()
                    .collect();
                if !shared.is_empty() {
                    return Err(PipelineError::Configuration(format!(
                        "columns {:?} are both {} and {} columns",
                        shared, left_name, right_name
                    )));
                }
            }
        }
        Ok(())
    }

    /// Every sort column must be a non-metric, classified column
    pub fn check_sort_key(&self, sort_by: &[&str]) -> Result<()> {
        let missing: Vec<&str> = sort_by
            .iter()
            .filter(|c| {
                !self.identity.contains(**c)
                    && !self.independent.contains(**c)
                    && !self.mechanism.contains(**c)
            })
            .copied()
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(PipelineError::Configuration(format!(
                "sort columns must all be identity, independent or mechanism columns; missing {:?}",
                missing
            )))
        }
    }

    /// Initial metric set (raw metrics)
    pub fn metrics(&self) -> &MetricColumns {
        &self.metrics
    }

    pub fn role_of(&self, column: &str, metrics: &MetricColumns) -> ColumnRole {
        if metrics.contains(column) || self.metrics.contains(column) {
            ColumnRole::Metric
        } else if self.identity.contains(column) {
            ColumnRole::Identity
        } else if self.independent.contains(column) {
            ColumnRole::IndependentVariable
        } else if self.mechanism.contains(column) {
            ColumnRole::Mechanism
        } else {
            ColumnRole::Unclassified
        }
    }

    /// Join key for a baseline lookup: all columns, in table order, except
    /// metrics and the one selector column that varies between a row and its
    /// baseline
    pub fn join_key(&self, columns: &[String], metrics: &MetricColumns, varying: &str) -> Vec<String> {
        let key: Vec<String> = columns
            .iter()
            .filter(|c| !metrics.contains(c) && c.as_str() != varying)
            .cloned()
            .collect();
        self.log_unclassified(&key, metrics);
        key
    }

    /// Group-by key for describing: all columns, in table order, except
    /// metrics and administrative columns
    pub fn group_key(&self, columns: &[String], metrics: &MetricColumns) -> Vec<String> {
        let key: Vec<String> = columns
            .iter()
            .filter(|c| !metrics.contains(c) && !self.administrative.contains(c.as_str()))
            .cloned()
            .collect();
        self.log_unclassified(&key, metrics);
        key
    }

    pub fn is_administrative(&self, column: &str) -> bool {
        self.administrative.contains(column)
    }

    /// True if `name` contains any administrative column name
    pub fn mentions_administrative(&self, name: &str) -> bool {
        self.administrative.iter().any(|a| name.contains(a.as_str()))
    }

    fn log_unclassified(&self, key: &[String], metrics: &MetricColumns) {
        for column in key {
            if self.role_of(column, metrics) == ColumnRole::Unclassified {
                tracing::debug!(column = %column, "unclassified column kept in key");
            }
        }
    }

    /// Every flattened described column name a full pipeline can produce
    pub fn described_metric_names(&self) -> BTreeSet<String> {
        let mut metrics: Vec<String> = self.metrics.iter().map(str::to_string).collect();
        metrics.extend(DERIVED_METRICS.iter().map(|m| m.to_string()));
        let shifted: Vec<String> = metrics
            .iter()
            .map(|m| format!("{}{}", SHIFTED_DIFF_PREFIX, m))
            .collect();
        metrics.extend(shifted);

        metrics
            .iter()
            .flat_map(|metric| {
                DESCRIBED_STATISTICS
                    .iter()
                    .map(move |stat| format!("{}{}{}", metric, STAT_SEPARATOR, stat))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn columns(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_experiment_taxonomy_is_valid() {
        let taxonomy = ColumnTaxonomy::experiment().unwrap();
        assert_eq!(taxonomy.metrics().len(), RAW_METRICS.len());
        assert!(taxonomy.is_administrative(GENERATION_ID));
        assert!(taxonomy.mentions_administrative("generation_id/mean"));
        assert!(!taxonomy.mentions_administrative("estimate/mean"));
    }

    #[test]
    fn test_sort_column_outside_roles_is_configuration_error() {
        let err = ColumnTaxonomy::new(
            set_of(&[GENERATION_ID, SHIFTED, DISCRETE_VOTE]),
            set_of(&[NUMBER_OF_DELEGATORS]),
            set_of(&[COORDINATION_MECHANISM, VOTING_MECHANISM]),
            MetricColumns::raw(),
            set_of(&[GENERATION_ID]),
        )
        .unwrap_err();
        match err {
            PipelineError::Configuration(msg) => assert!(msg.contains("distribution")),
            other => panic!("expected configuration error, got {other:?}"),
        }
    }

    #[test]
    fn test_overlapping_roles_is_configuration_error() {
        let err = ColumnTaxonomy::new(
            set_of(&[GENERATION_ID, SHIFTED, DISCRETE_VOTE, DISTRIBUTION, "estimate"]),
            set_of(&[NUMBER_OF_DELEGATORS]),
            set_of(&[COORDINATION_MECHANISM, VOTING_MECHANISM]),
            MetricColumns::raw(),
            set_of(&[GENERATION_ID]),
        )
        .unwrap_err();
        assert!(matches!(err, PipelineError::Configuration(_)));
    }

    #[test]
    fn test_join_key_excludes_metrics_and_varying_selector() {
        let taxonomy = ColumnTaxonomy::experiment().unwrap();
        let cols = columns(&[
            NUMBER_OF_PROXIES,
            COORDINATION_MECHANISM,
            VOTING_MECHANISM,
            GENERATION_ID,
            "estimate",
            "error",
        ]);
        let mut metrics = MetricColumns::raw();
        metrics.insert("error");

        let key = taxonomy.join_key(&cols, &metrics, COORDINATION_MECHANISM);
        assert_eq!(
            key,
            columns(&[NUMBER_OF_PROXIES, VOTING_MECHANISM, GENERATION_ID])
        );
    }

    #[test]
    fn test_group_key_excludes_administrative_columns() {
        let taxonomy = ColumnTaxonomy::experiment().unwrap();
        let cols = columns(&[GENERATION_ID, SHIFTED, COORDINATION_MECHANISM, "estimate"]);
        let key = taxonomy.group_key(&cols, taxonomy.metrics());
        assert_eq!(key, columns(&[SHIFTED, COORDINATION_MECHANISM]));
    }

    #[test]
    fn test_metric_columns_keep_insertion_order() {
        let mut metrics = MetricColumns::new(["b", "a"]);
        assert!(metrics.insert("c"));
        assert!(!metrics.insert("a"));
        assert_eq!(metrics.iter().collect::<Vec<_>>(), vec!["b", "a", "c"]);
    }

    #[test]
    fn test_described_metric_names() {
        let taxonomy = ColumnTaxonomy::experiment().unwrap();
        let names = taxonomy.described_metric_names();
        assert!(names.contains("estimate/mean"));
        assert!(names.contains("shifted_diff/improvement/75%"));
        assert!(!names.iter().any(|n| n.ends_with("/count")));
        assert_eq!(
            names.len(),
            (RAW_METRICS.len() + DERIVED_METRICS.len()) * 2 * DESCRIBED_STATISTICS.len()
        );
    }
}
