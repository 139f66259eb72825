//! delegation-metrics - research data pipeline for simulated proxy-voting experiments
//!
//! Turns raw experiment batches into processed tables (derived error,
//! improvement and shift-sensitivity metrics), described tables (per-group
//! summary statistics) and rank-sum comparison tables between groups.

pub mod cli;
pub mod compare;
pub mod config;
pub mod derive;
pub mod describe;
pub mod error;
pub mod io;
pub mod pipeline;
pub mod table;
pub mod taxonomy;

pub use error::{PipelineError, Result};
