// Tests for group comparisons on small experiment-shaped tables

use super::*;
use crate::error::PipelineError;
use crate::table::{Column, KeyValue, Table};

fn group_by(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

/// Three mechanisms with clearly ordered errors, four runs each
fn mechanisms() -> Table {
    Table::new(vec![
        Column::string(
            "coordination_mechanism",
            vec![
                "Active Only", "Active Only", "Active Only", "Active Only",
                "All Agents", "All Agents", "All Agents", "All Agents",
                "Foo", "Foo", "Foo", "Foo",
            ],
        ),
        Column::bool(
            "shifted",
            vec![
                false, true, false, true, false, true, false, true, false, true, false, true,
            ],
        ),
        Column::float(
            "error",
            vec![
                0.50, 0.60, 0.55, 0.65, //
                0.00, 0.01, 0.02, 0.03, //
                0.20, 0.25, 0.30, 0.35,
            ],
        ),
    ])
    .unwrap()
}

#[test]
fn test_against_rest_one_row_per_group() {
    let result =
        compare_against_rest(&mechanisms(), "error", &group_by(&["coordination_mechanism"]))
            .unwrap();
    assert_eq!(result.len(), 3);
    assert_eq!(result.mode, ComparisonMode::AgainstRest);

    let groups: Vec<&KeyValue> = result.rows.iter().map(|r| &r.group[0]).collect();
    assert_eq!(
        groups,
        vec![
            &KeyValue::from("Active Only"),
            &KeyValue::from("All Agents"),
            &KeyValue::from("Foo")
        ]
    );
    assert!(result.rows.iter().all(|r| r.other.is_none()));
}

#[test]
fn test_against_rest_directions() {
    let result =
        compare_against_rest(&mechanisms(), "error", &group_by(&["coordination_mechanism"]))
            .unwrap();

    // Active Only has the largest errors: every pair won, U = 4 * 8
    let active = &result.rows[0];
    assert_eq!(active.statistic, 32.0);
    assert!(active.p_value_greater < 0.01);
    assert!(active.p_value_lesser > 0.99);

    // All Agents has the smallest errors
    let all_agents = &result.rows[1];
    assert_eq!(all_agents.statistic, 0.0);
    assert!(all_agents.p_value_lesser < 0.01);
    assert!(all_agents.p_value_equal > 0.95);
}

#[test]
fn test_p_value_equal_is_complement_of_two_sided() {
    let table = mechanisms();
    let keys = group_by(&["coordination_mechanism"]);
    let result = compare_against_rest(&table, "error", &keys).unwrap();

    let foo = &result.rows[2];
    let target = [0.20, 0.25, 0.30, 0.35];
    let others = [0.50, 0.60, 0.55, 0.65, 0.00, 0.01, 0.02, 0.03];
    let two_sided = mann_whitney_u(&target, &others, Alternative::TwoSided).unwrap();
    assert!((foo.p_value_equal - (1.0 - two_sided.pvalue)).abs() < 1e-12);

    for row in &result.rows {
        assert!((0.0..=1.0).contains(&row.p_value_equal));
    }
}

#[test]
fn test_single_group_is_skipped() {
    let table = mechanisms().take(&[0, 1, 2, 3]);
    let result =
        compare_against_rest(&table, "error", &group_by(&["coordination_mechanism"])).unwrap();
    assert!(result.is_empty());
}

#[test]
fn test_all_nan_group_is_skipped() {
    let mut table = mechanisms();
    let mut error = table.float_values("error").unwrap();
    for value in &mut error[8..] {
        *value = f64::NAN;
    }
    table.set_column(Column::float("error", error)).unwrap();

    let keys = group_by(&["coordination_mechanism"]);
    let rest = compare_against_rest(&table, "error", &keys).unwrap();
    assert_eq!(rest.len(), 2);

    let pairwise = compare_pairwise(&table, "error", &keys).unwrap();
    assert_eq!(pairwise.len(), 2);
}

#[test]
fn test_pairwise_ordered_pairs_without_self() {
    let keys = group_by(&["coordination_mechanism"]);
    let result = compare_pairwise(&mechanisms(), "error", &keys).unwrap();
    assert_eq!(result.len(), 6);
    assert!(result
        .rows
        .iter()
        .all(|r| r.other.as_ref() != Some(&r.group)));

    // sorted by group, then other group
    let first = &result.rows[0];
    assert_eq!(first.group[0], KeyValue::from("Active Only"));
    assert_eq!(
        first.other.as_ref().unwrap()[0],
        KeyValue::from("All Agents")
    );
    assert_eq!(first.statistic, 16.0);

    // Exact test, 4 vs 4, fully separated: P(U >= 16) = 1 / 70
    assert!((first.p_value_greater - 1.0 / 70.0).abs() < 1e-12);
}

#[test]
fn test_pairwise_is_antisymmetric_in_direction() {
    let keys = group_by(&["coordination_mechanism"]);
    let result = compare_pairwise(&mechanisms(), "error", &keys).unwrap();
    let find = |a: &str, b: &str| {
        result
            .rows
            .iter()
            .find(|r| {
                r.group[0] == KeyValue::from(a) && r.other.as_ref().unwrap()[0] == KeyValue::from(b)
            })
            .unwrap()
    };
    let ab = find("Foo", "All Agents");
    let ba = find("All Agents", "Foo");
    assert_eq!(ab.p_value_greater, ba.p_value_lesser);
    assert_eq!(ab.statistic + ba.statistic, 16.0);
}

#[test]
fn test_multiple_grouping_columns_and_column_names() {
    let keys = group_by(&["coordination_mechanism", "shifted"]);
    let rest = compare_against_rest(&mechanisms(), "error", &keys).unwrap();
    assert_eq!(rest.len(), 6);
    assert_eq!(
        rest.column_names(),
        vec![
            "coordination_mechanism",
            "shifted",
            "Statistic",
            "PValueGreater",
            "PValueEqual",
            "PValueLesser"
        ]
    );
    assert_eq!(rest.rows[0].group, vec![KeyValue::from("Active Only"), KeyValue::from(false)]);
    assert_eq!(rest.rows[1].group, vec![KeyValue::from("Active Only"), KeyValue::from(true)]);

    let pairwise = compare_pairwise(&mechanisms(), "error", &keys).unwrap();
    assert_eq!(pairwise.len(), 30);
    assert_eq!(pairwise.column_names()[2], "coordination_mechanismOther");
    assert_eq!(pairwise.column_names()[3], "shiftedOther");
}

#[test]
fn test_csv_and_json_output() {
    let keys = group_by(&["coordination_mechanism"]);
    let result = compare_against_rest(&mechanisms(), "error", &keys).unwrap();

    let mut buffer = Vec::new();
    result.write_csv(&mut buffer).unwrap();
    let text = String::from_utf8(buffer).unwrap();
    let mut lines = text.lines();
    assert_eq!(
        lines.next().unwrap(),
        "coordination_mechanism,Statistic,PValueGreater,PValueEqual,PValueLesser"
    );
    assert!(lines.next().unwrap().starts_with("Active Only,32,"));

    let json = result.to_json();
    let records = json.as_array().unwrap();
    assert_eq!(records.len(), 3);
    assert_eq!(records[2]["coordination_mechanism"], "Foo");
    assert!(records[2]["PValueEqual"].is_number());
}

#[test]
fn test_missing_columns_are_errors() {
    let table = mechanisms();
    assert!(matches!(
        compare_against_rest(&table, "nope", &group_by(&["shifted"])),
        Err(PipelineError::MissingColumn(_))
    ));
    assert!(matches!(
        compare_pairwise(&table, "error", &group_by(&["nope"])),
        Err(PipelineError::MissingColumn(_))
    ));
    assert!(matches!(
        compare_against_rest(&table, "coordination_mechanism", &group_by(&["shifted"])),
        Err(PipelineError::ColumnType { .. })
    ));
}

#[test]
fn test_compare_groups_dispatch() {
    let keys = group_by(&["shifted"]);
    let rest = compare_groups(&mechanisms(), "error", &keys, ComparisonMode::AgainstRest).unwrap();
    let pairwise = compare_groups(&mechanisms(), "error", &keys, ComparisonMode::Pairwise).unwrap();
    // with two groups, "rest" of one group is exactly the other group
    assert_eq!(rest.len(), 2);
    assert_eq!(pairwise.len(), 2);
    for (a, b) in rest.rows.iter().zip(&pairwise.rows) {
        assert_eq!(a.statistic, b.statistic);
        assert_eq!(a.p_value_greater, b.p_value_greater);
    }
}
