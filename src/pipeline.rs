//! End-to-end processing of one raw batch
//!
//! read → derive → sort → describe → flatten → write. Both output tables are
//! computed and staged before either is committed, and a failed described
//! commit removes the processed table again.

use crate::config::PipelineConfig;
use crate::derive::{derive_metrics, sort_for_output};
use crate::describe::describe_flat;
use crate::error::{PipelineError, Result};
use crate::io::{read_table, stage_table};
use crate::table::Table;
use crate::taxonomy::ColumnTaxonomy;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub const PROCESSED_PREFIX: &str = "processed_";
pub const DESCRIBED_PREFIX: &str = "described_";

/// Processed and described tables of one batch
#[derive(Debug, Clone)]
pub struct Processed {
    pub processed: Table,
    pub described: Table,
}

/// What a pipeline run wrote
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessReport {
    pub rows: usize,
    pub groups: usize,
    pub processed_path: PathBuf,
    pub described_path: PathBuf,
}

/// Derive, sort and describe a raw table in memory
pub fn process_table(
    raw: Table,
    taxonomy: &ColumnTaxonomy,
    config: &PipelineConfig,
) -> Result<Processed> {
    config.validate()?;
    let derived = derive_metrics(raw, taxonomy, config)?;
    let processed = sort_for_output(&derived.table)?;

    info!(rows = processed.row_count(), "describing");
    let described = describe_flat(&processed, &derived.metrics, taxonomy)?;
    let described = sort_for_output(&described)?;
    Ok(Processed {
        processed,
        described,
    })
}

/// Output paths for `input`: `processed_<name>` and `described_<name>`
pub fn output_paths(input: &Path, output_dir: Option<&Path>) -> Result<(PathBuf, PathBuf)> {
    let name = input
        .file_name()
        .ok_or_else(|| {
            PipelineError::Configuration(format!("input path {} has no file name", input.display()))
        })?
        .to_string_lossy();
    let dir = match output_dir {
        Some(dir) => dir.to_path_buf(),
        None => input.parent().map(Path::to_path_buf).unwrap_or_default(),
    };
    Ok((
        dir.join(format!("{}{}", PROCESSED_PREFIX, name)),
        dir.join(format!("{}{}", DESCRIBED_PREFIX, name)),
    ))
}

/// Process one raw batch file and write its processed and described tables
pub fn process_file(input: &Path, config: &PipelineConfig) -> Result<ProcessReport> {
    let taxonomy = ColumnTaxonomy::experiment()?;
    config.validate()?;
    let (processed_path, described_path) = output_paths(input, config.output_dir.as_deref())?;

    info!(path = %input.display(), "reading raw table");
    let raw = read_table(input)?;
    let output = process_table(raw, &taxonomy, config)?;

    if let Some(dir) = processed_path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)?;
    }
    let staged_processed = stage_table(&output.processed, &processed_path)?;
    let staged_described = stage_table(&output.described, &described_path)?;

    info!(path = %processed_path.display(), "saving processed");
    staged_processed.commit()?;
    info!(path = %described_path.display(), "saving described");
    if let Err(err) = staged_described.commit() {
        warn!(path = %processed_path.display(), "removing processed table after failed save");
        std::fs::remove_file(&processed_path)?;
        return Err(err);
    }

    Ok(ProcessReport {
        rows: output.processed.row_count(),
        groups: output.described.row_count(),
        processed_path,
        described_path,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_paths_default_to_input_dir() {
        let (processed, described) =
            output_paths(Path::new("data/raw/3739165392236705654.arrow"), None).unwrap();
        assert_eq!(
            processed,
            PathBuf::from("data/raw/processed_3739165392236705654.arrow")
        );
        assert_eq!(
            described,
            PathBuf::from("data/raw/described_3739165392236705654.arrow")
        );
    }

    #[test]
    fn test_output_paths_with_output_dir() {
        let (processed, _) =
            output_paths(Path::new("data/raw/batch.arrow"), Some(Path::new("data"))).unwrap();
        assert_eq!(processed, PathBuf::from("data/processed_batch.arrow"));
    }

    #[test]
    fn test_output_paths_rejects_directory_like_input() {
        assert!(output_paths(Path::new(".."), None).is_err());
    }
}
