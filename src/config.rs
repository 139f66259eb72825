//! Pipeline configuration
//!
//! Values can come from a TOML file; command-line flags override them.

use crate::error::{PipelineError, Result};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Which derivation stages run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum PipelineVariant {
    /// Total agents, error and improvement
    Basic,
    /// Basic stages plus shift sensitivity
    Full,
}

/// Configuration for the derivation/aggregation pipeline
///
/// # Example
/// ```
/// use delegation_metrics::config::{PipelineConfig, PipelineVariant};
///
/// let config = PipelineConfig::default();
/// assert_eq!(config.max_preference - config.min_preference, 2.0);
/// assert_eq!(config.variant, PipelineVariant::Full);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Upper bound of the preference space; errors are normalized by its width
    pub max_preference: f64,

    /// Lower bound of the preference space
    pub min_preference: f64,

    /// Derivation stages to run
    pub variant: PipelineVariant,

    /// Directory processed/described tables are written to.
    /// Defaults to the input file's directory.
    pub output_dir: Option<PathBuf>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::full()
    }
}

impl PipelineConfig {
    /// Preferences in [-1, 1], shift sensitivity included
    pub fn full() -> Self {
        Self {
            max_preference: 1.0,
            min_preference: -1.0,
            variant: PipelineVariant::Full,
            output_dir: None,
        }
    }

    /// Preferences in [-1, 1], no shift-sensitivity stage
    pub fn basic() -> Self {
        Self {
            variant: PipelineVariant::Basic,
            ..Self::full()
        }
    }

    /// Load and validate a TOML configuration file
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Width of the preference space
    pub fn preference_span(&self) -> f64 {
        self.max_preference - self.min_preference
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if !self.max_preference.is_finite() || !self.min_preference.is_finite() {
            return Err(PipelineError::Configuration(format!(
                "preference bounds must be finite, got [{}, {}]",
                self.min_preference, self.max_preference
            )));
        }

        if self.max_preference <= self.min_preference {
            return Err(PipelineError::Configuration(format!(
                "max_preference must be greater than min_preference, got [{}, {}]",
                self.min_preference, self.max_preference
            )));
        }

        Ok(())
    }
}
