use crate::config::{Config, EmitterConfig};
use color_eyre::eyre::{eyre, WrapErr};
use color_eyre::Result;
use log::info;
use std::fs::File;
use std::path::Path;
use std::time::Duration;

/// Load and parse configuration from a YAML file
pub fn load_config(config_path: &Path) -> Result<Config> {
    info!("Loading configuration from: {:?}", config_path);

    let file = File::open(config_path)
        .with_context(|| format!("Failed to open config file {:?}", config_path))?;

    let config: Config = serde_yaml::from_reader(file)
        .with_context(|| format!("Failed to parse config file {:?}", config_path))?;

    config.validate()?;

    Ok(config)
}

/// Load a configuration that must carry an `emitter` section
pub fn load_emitter_config(config_path: &Path) -> Result<EmitterConfig> {
    load_config(config_path)?
        .emitter
        .ok_or_else(|| eyre!("Config file {:?} has no emitter section", config_path))
}

/// Analyzer command-line values that take precedence over the YAML file
#[derive(Debug, Clone, Default)]
pub struct AnalysisCliOverrides {
    pub weights: Option<Vec<f64>>,
    pub window_size: Option<Duration>,
    pub start_time: Option<f64>,
    pub end_time: Option<f64>,
    pub start_offset: Option<f64>,
    pub latency_ceiling_ms: Option<f64>,
    pub payload_marker: Option<String>,
    pub no_diagnostics: bool,
}

/// Apply CLI overrides to the analysis section
pub fn apply_analysis_overrides(config: &mut Config, overrides: &AnalysisCliOverrides) -> Result<()> {
    let analysis = &mut config.analysis;

    if let Some(weights) = &overrides.weights {
        if config.flows.is_some() {
            info!("--weights ignored: config file lists flows explicitly");
        } else {
            analysis.weights = weights.clone();
        }
    }
    if let Some(size) = overrides.window_size {
        analysis.window_size = size;
    }
    if overrides.start_time.is_some() {
        analysis.start_time = overrides.start_time;
    }
    if overrides.end_time.is_some() {
        analysis.end_time = overrides.end_time;
    }
    if let Some(offset) = overrides.start_offset {
        analysis.start_offset = offset;
    }
    if let Some(ceiling) = overrides.latency_ceiling_ms {
        analysis.latency_ceiling_ms = ceiling;
    }
    if let Some(marker) = &overrides.payload_marker {
        analysis.payload_marker = marker.clone();
    }
    if overrides.no_diagnostics {
        analysis.diagnostics = false;
    }

    // Re-validate after applying overrides
    config.validate()?;

    Ok(())
}
