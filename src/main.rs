use anyhow::{Context, Result};
use clap::Parser;
use delegation_metrics::cli::{Cli, Command, OutputFormat};
use delegation_metrics::compare::{compare_groups, ComparisonMode};
use delegation_metrics::config::{PipelineConfig, PipelineVariant};
use delegation_metrics::{io, pipeline};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Initialize tracing subscriber; info by default, debug with --debug
fn init_tracing(debug: bool) {
    let level = if debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(level.into()))
        .with_writer(std::io::stderr)
        .init();
}

/// Config file values, then command-line overrides
fn load_config(
    config: Option<&Path>,
    output_dir: Option<PathBuf>,
    variant: Option<PipelineVariant>,
    max_preference: Option<f64>,
    min_preference: Option<f64>,
) -> Result<PipelineConfig> {
    let mut loaded = match config {
        Some(path) => PipelineConfig::from_file(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => PipelineConfig::default(),
    };
    if output_dir.is_some() {
        loaded.output_dir = output_dir;
    }
    if let Some(variant) = variant {
        loaded.variant = variant;
    }
    if let Some(max) = max_preference {
        loaded.max_preference = max;
    }
    if let Some(min) = min_preference {
        loaded.min_preference = min;
    }
    loaded.validate()?;
    Ok(loaded)
}

fn run_compare(
    inputs: &[PathBuf],
    target: &str,
    group_by: &[String],
    pairwise: bool,
    format: OutputFormat,
) -> Result<()> {
    let table = io::read_tables(inputs).context("failed to load comparison input")?;
    let mode = if pairwise {
        ComparisonMode::Pairwise
    } else {
        ComparisonMode::AgainstRest
    };
    let result = compare_groups(&table, target, group_by, mode)
        .with_context(|| format!("failed to compare {} by {}", target, group_by.join(",")))?;
    info!(rows = result.len(), mode = ?mode, "comparison finished");

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    match format {
        OutputFormat::Csv => result.write_csv(&mut out)?,
        OutputFormat::Json => {
            serde_json::to_writer_pretty(&mut out, &result.to_json())?;
            writeln!(out)?;
        }
    }
    out.flush()?;
    Ok(())
}

fn main() -> Result<()> {
    let args = Cli::parse();

    init_tracing(args.debug);

    match args.command {
        Command::Process {
            input,
            output_dir,
            variant,
            config,
            max_preference,
            min_preference,
        } => {
            let config = load_config(
                config.as_deref(),
                output_dir,
                variant,
                max_preference,
                min_preference,
            )?;
            let report = pipeline::process_file(&input, &config)
                .with_context(|| format!("failed to process {}", input.display()))?;
            info!(
                rows = report.rows,
                groups = report.groups,
                processed = %report.processed_path.display(),
                described = %report.described_path.display(),
                "done"
            );
        }
        Command::Convert { dir, verbose } => {
            let written = io::convert_directory(&dir, verbose)
                .with_context(|| format!("failed to convert {}", dir.display()))?;
            info!(files = written.len(), "conversion finished");
        }
        Command::Compare {
            inputs,
            target,
            group_by,
            pairwise,
            format,
        } => run_compare(&inputs, &target, &group_by, pairwise, format)?,
    }

    Ok(())
}
