// Shared fixtures for integration tests
//
// Builds experiment-shaped raw tables and writes them as Arrow IPC files.

#![allow(dead_code)]

use delegation_metrics::io::write_table;
use delegation_metrics::table::{Column, Table};
use std::path::{Path, PathBuf};

pub const MECHANISMS: [&str; 3] = ["All Agents", "Active Only", "Foo"];
pub const DELEGATORS: [i64; 2] = [10, 20];

/// Estimate of one run; the shifted run sits 0.05 above the unshifted one
pub fn estimate(generation: i64, shifted: bool, mechanism: usize, delegators: i64) -> f64 {
    let base = 0.1 * generation as f64 + 0.01 * delegators as f64;
    let offset = [0.0, 0.2, 0.1][mechanism];
    base + offset + if shifted { 0.05 } else { 0.0 }
}

/// Raw table with one row per generation, shift, mechanism and delegator count
pub fn raw_experiment(generations: i64) -> Table {
    let mut generation_id = Vec::new();
    let mut shifted = Vec::new();
    let mut mechanism = Vec::new();
    let mut delegators = Vec::new();
    let mut estimates = Vec::new();

    for generation in 1..=generations {
        for shift in [false, true] {
            for (m, name) in MECHANISMS.iter().enumerate() {
                for d in DELEGATORS {
                    generation_id.push(generation);
                    shifted.push(shift);
                    mechanism.push(name.to_string());
                    delegators.push(d);
                    estimates.push(estimate(generation, shift, m, d));
                }
            }
        }
    }
    raw_from_columns(generation_id, shifted, mechanism, delegators, estimates)
}

pub fn raw_from_columns(
    generation_id: Vec<i64>,
    shifted: Vec<bool>,
    mechanism: Vec<String>,
    delegators: Vec<i64>,
    estimates: Vec<f64>,
) -> Table {
    let n = generation_id.len();
    Table::new(vec![
        Column::int("generation_id", generation_id),
        Column::bool("shifted", shifted),
        Column::bool("discrete_vote", vec![false; n]),
        Column::string("distribution", vec!["uniform"; n]),
        Column::int("number_of_proxies", vec![4; n]),
        Column::int("number_of_delegators", delegators),
        Column::string("coordination_mechanism", mechanism),
        Column::string("voting_mechanism", vec!["Mean"; n]),
        Column::float("estimate", estimates),
        Column::float("min_proxy_weight", vec![1.0; n]),
        Column::float("max_proxy_weight", vec![3.0; n]),
        Column::float("average_proxy_weight", vec![2.0; n]),
        Column::float("median_proxy_weight", vec![2.0; n]),
    ])
    .unwrap()
}

/// Write `table` to `dir/name` and return the path
pub fn write_fixture(dir: &Path, name: &str, table: &Table) -> PathBuf {
    let path = dir.join(name);
    write_table(table, &path).unwrap();
    path
}

/// Names of every file in `dir`, sorted
pub fn file_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}
