//! JSON exporter for benchmark results.
//!
//! Exports the base configuration and every trial result, including traces
//! when they were recorded, for offline analysis and plotting.

use crate::config::SimConfig;
use crate::runner::ScenarioResult;
use serde::Serialize;
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// Aggregate over a batch of results.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExportSummary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,

    /// Mean delivery rate over passed trials
    pub mean_delivery_rate: f64,

    /// Mean latency over passed trials (seconds)
    pub mean_latency_secs: f64,
}

impl ExportSummary {
    pub fn from_results(results: &[ScenarioResult]) -> Self {
        let passed: Vec<&ScenarioResult> = results.iter().filter(|r| r.passed()).collect();
        Self {
            total: results.len(),
            passed: passed.len(),
            failed: results.len() - passed.len(),
            mean_delivery_rate: mean_over(&passed, |r| r.metrics.delivery_rate),
            mean_latency_secs: mean_over(&passed, |r| r.metrics.latency.mean),
        }
    }
}

fn mean_over(results: &[&ScenarioResult], value: impl Fn(&ScenarioResult) -> f64) -> f64 {
    if results.is_empty() {
        return 0.0;
    }
    results.iter().map(|&r| value(r)).sum::<f64>() / results.len() as f64
}

/// Complete benchmark export.
#[derive(Debug, Clone, Serialize)]
pub struct SimExport {
    /// Master seed of the batch
    pub seed: u64,

    /// Configuration before scenario presets were applied
    pub base_config: SimConfig,

    pub summary: ExportSummary,

    pub results: Vec<ScenarioResult>,
}

impl SimExport {
    /// Creates a new export container.
    pub fn new(base_config: SimConfig) -> Self {
        Self {
            seed: base_config.seed,
            base_config,
            summary: ExportSummary::default(),
            results: Vec::new(),
        }
    }

    /// Adds results and refreshes the summary.
    pub fn extend(&mut self, results: impl IntoIterator<Item = ScenarioResult>) {
        self.results.extend(results);
        self.summary = ExportSummary::from_results(&self.results);
    }

    /// Writes to a JSON file.
    pub fn write_to_file(&self, path: impl AsRef<Path>) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        let mut file = File::create(path)?;
        file.write_all(json.as_bytes())?;
        Ok(())
    }
}
