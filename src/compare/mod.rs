// Group-wise rank-sum comparisons
//
// Answers "does this metric's distribution differ between configurations?"
// for a table, a numeric target column and an ordered list of grouping columns.
//
// Two designs:
// - against rest: each group vs. every row outside it
// - pairwise: each group vs. each other group, as ordered pairs
//
// Every comparison runs three Mann-Whitney U tests (greater, two-sided, less).
// Calls share no state, so independent comparisons can run on separate threads.

mod engine;
mod mann_whitney;

pub use engine::{
    compare_against_rest, compare_groups, compare_pairwise, ComparisonMode, ComparisonRow,
    ComparisonTable, OTHER_SUFFIX, P_VALUE_EQUAL, P_VALUE_GREATER, P_VALUE_LESSER, STATISTIC,
};
pub use mann_whitney::{mann_whitney_u, midranks, Alternative, Method, RankSumTest};

#[cfg(test)]
mod tests;
