//! Benchmark runner - executes named scenarios over repeated seeded trials.

use crate::algorithms;
use crate::config::SimConfig;
use crate::context::SimContext;
use crate::engine::Engine;
use crate::error::SimResult;
use crate::scenarios::ScenarioId;
use crate::trace::TraceEntry;

use dcsim_core::MetricsSnapshot;
use serde::Serialize;
use tracing::{debug, info, warn};

/// Stream id for a built-in algorithm's seed, derived from the trial seed.
const ALGORITHM_STREAM: u64 = 1;

/// Results from one trial of one scenario.
#[derive(Debug, Clone, Serialize)]
pub struct ScenarioResult {
    /// Scenario that was run
    pub scenario: ScenarioId,

    /// Trial index within the batch
    pub trial: u64,

    /// Seed used
    pub seed: u64,

    pub algorithm: String,

    /// Total steps executed
    pub total_steps: u64,

    /// Final simulation time in seconds
    pub final_time_secs: f64,

    /// Metrics at the end of the run
    pub metrics: MetricsSnapshot,

    /// Set when the engine aborted the run
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,

    /// Event trace, when recording was enabled
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub trace: Vec<TraceEntry>,
}

impl ScenarioResult {
    /// True if the run completed its budget.
    pub fn passed(&self) -> bool {
        self.failure_reason.is_none()
    }

    fn failed(scenario: ScenarioId, trial: u64, seed: u64, algorithm: &str, reason: String) -> Self {
        Self {
            scenario,
            trial,
            seed,
            algorithm: algorithm.to_string(),
            total_steps: 0,
            final_time_secs: 0.0,
            metrics: MetricsSnapshot::default(),
            failure_reason: Some(reason),
            trace: Vec::new(),
        }
    }
}

type ConfigOverride = Box<dyn Fn(&mut SimConfig)>;

/// Runs scenarios for a number of trials each.
///
/// Trial `i` runs with seed `base.seed + i`, so every result can be
/// reproduced individually.
pub struct BenchmarkRunner {
    /// Configuration every scenario starts from
    base: SimConfig,

    /// Trials per scenario
    trials: u64,

    /// Steps per trial
    steps: u64,

    /// Overrides the scenario's default algorithm
    algorithm: Option<String>,

    /// Applied after the scenario preset
    overrides: Vec<ConfigOverride>,
}

impl BenchmarkRunner {
    /// Creates a new benchmark runner.
    pub fn new(seed: u64) -> Self {
        Self {
            base: SimConfig::default().with_seed(seed),
            trials: 1,
            steps: 100,
            algorithm: None,
            overrides: Vec::new(),
        }
    }

    /// Replaces the base configuration, keeping the runner's seed.
    pub fn with_config(mut self, config: SimConfig) -> Self {
        let seed = self.base.seed;
        self.base = config.with_seed(seed);
        self
    }

    pub fn with_trials(mut self, trials: u64) -> Self {
        self.trials = trials.max(1);
        self
    }

    pub fn with_steps(mut self, steps: u64) -> Self {
        self.steps = steps;
        self
    }

    /// Sets the tick length in seconds.
    pub fn with_tick(mut self, tick_secs: f64) -> Self {
        self.base.tick_secs = tick_secs;
        self
    }

    pub fn with_algorithm(mut self, name: impl Into<String>) -> Self {
        self.algorithm = Some(name.into());
        self
    }

    pub fn with_trace(mut self, record: bool) -> Self {
        self.base.record_trace = record;
        self
    }

    /// Adds a configuration tweak applied on top of each scenario preset.
    pub fn with_override(mut self, apply: impl Fn(&mut SimConfig) + 'static) -> Self {
        self.overrides.push(Box::new(apply));
        self
    }

    pub fn base_config(&self) -> &SimConfig {
        &self.base
    }

    /// Final configuration for one trial of `scenario`.
    pub fn trial_config(&self, scenario: ScenarioId, trial: u64) -> SimConfig {
        let mut config = self
            .base
            .clone()
            .with_seed(self.base.seed.wrapping_add(trial))
            .with_max_steps(self.steps);
        scenario.configure(&mut config);
        for apply in &self.overrides {
            apply(&mut config);
        }
        config
    }

    fn algorithm_for(&self, scenario: ScenarioId) -> &str {
        self.algorithm
            .as_deref()
            .unwrap_or_else(|| scenario.default_algorithm())
    }

    /// Runs one trial and returns its result.
    pub fn run_trial(&self, scenario: ScenarioId, trial: u64) -> SimResult<ScenarioResult> {
        let config = self.trial_config(scenario, trial);
        let seed = config.seed;
        let algorithm = algorithms::by_name(
            self.algorithm_for(scenario),
            SimContext::new(seed).derive_seed(ALGORITHM_STREAM),
        )?;
        let algorithm_name = algorithm.name().to_string();

        debug!(
            "Trial {} of {} (seed={}, algorithm={})",
            trial, scenario, seed, algorithm_name
        );

        let mut engine = Engine::new(config, algorithm)?;
        let metrics = engine.run()?;

        Ok(ScenarioResult {
            scenario,
            trial,
            seed,
            algorithm: algorithm_name,
            total_steps: engine.step_count(),
            final_time_secs: engine.now().as_secs_f64(),
            metrics,
            failure_reason: None,
            trace: engine.trace().to_vec(),
        })
    }

    /// Runs every trial of every scenario. Failed trials are reported in
    /// their result rather than aborting the batch.
    pub fn run(&self, scenarios: &[ScenarioId]) -> Vec<ScenarioResult> {
        let mut results = Vec::with_capacity(scenarios.len() * self.trials as usize);

        for scenario in scenarios {
            info!("Starting scenario: {} ({} trials)", scenario.name(), self.trials);

            for trial in 0..self.trials {
                let result = self.run_trial(*scenario, trial).unwrap_or_else(|e| {
                    warn!("{} trial {} failed: {}", scenario, trial, e);
                    ScenarioResult::failed(
                        *scenario,
                        trial,
                        self.base.seed.wrapping_add(trial),
                        self.algorithm_for(*scenario),
                        e.to_string(),
                    )
                });
                results.push(result);
            }
        }
        results
    }
}
