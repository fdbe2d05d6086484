//! Run Configuration
//! =================
//!
//! Immutable-per-run parameter bundles for the network and fault models.
//! Both are validated once at engine construction and again on every
//! explicit reconfiguration; nothing mutates them mid-step.

use dcsim_env::{NodeId, SimDuration};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

// =============================================================================
// ERRORS
// =============================================================================

/// Invalid configuration. Fatal at setup.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("{field} must be a probability in [0, 1], got {value}")]
    ProbabilityOutOfRange { field: &'static str, value: f64 },

    #[error("{field} must be finite and non-negative, got {value}")]
    Negative { field: &'static str, value: f64 },

    #[error("{field} must be finite and positive, got {value}")]
    NonPositive { field: &'static str, value: f64 },

    #[error("{field} range is inverted: [{low}, {high}]")]
    InvertedRange { field: &'static str, low: f64, high: f64 },

    #[error("Unknown sync model: {0}")]
    UnknownSyncModel(String),

    #[error("Topology has no nodes")]
    EmptyTopology,

    #[error("Duplicate node id in topology: {0}")]
    DuplicateNode(String),

    #[error("Partition window references unknown node: {0}")]
    UnknownPartitionMember(String),

    #[error("Partition window {index} must have two non-empty groups")]
    EmptyPartitionGroup { index: usize },
}

fn check_probability(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::ProbabilityOutOfRange { field, value })
    }
}

fn check_non_negative(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ConfigError::Negative { field, value })
    }
}

fn check_positive(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::NonPositive { field, value })
    }
}

// =============================================================================
// SYNCHRONIZATION MODEL
// =============================================================================

/// Timing discipline applied to message delivery delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncModel {
    /// Delay is bounded by `sync_bound`; excess is a recorded violation.
    Synchronous,

    /// No bound on delay.
    Asynchronous,

    /// Unbounded until `stabilization_step`, bounded afterwards.
    PartialSynchronous,
}

impl SyncModel {
    /// Whether the delay bound is enforced at `step`.
    pub fn is_bounded_at(self, step: u64, stabilization_step: u64) -> bool {
        match self {
            SyncModel::Synchronous => true,
            SyncModel::Asynchronous => false,
            SyncModel::PartialSynchronous => step >= stabilization_step,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            SyncModel::Synchronous => "synchronous",
            SyncModel::Asynchronous => "asynchronous",
            SyncModel::PartialSynchronous => "partial_synchronous",
        }
    }
}

impl fmt::Display for SyncModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SyncModel {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "synchronous" | "sync" => Ok(SyncModel::Synchronous),
            "asynchronous" | "async" => Ok(SyncModel::Asynchronous),
            "partial_synchronous" | "partial" | "partially_synchronous" => {
                Ok(SyncModel::PartialSynchronous)
            }
            _ => Err(ConfigError::UnknownSyncModel(s.to_string())),
        }
    }
}

/// Who acknowledges blocking sends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AckPolicy {
    /// The receiving node's network stack acks on delivery.
    Automatic,

    /// The receiving plugin must call `Node::acknowledge`.
    Manual,
}

// =============================================================================
// NETWORK CONFIG
// =============================================================================

/// Network model parameters. All durations are in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Synchronization model selector
    pub sync_model: SyncModel,

    /// Upper delay bound under the synchronous disciplines
    pub sync_bound: f64,

    /// First step at which the partially-synchronous bound applies
    pub stabilization_step: u64,

    /// Maximum per-node clock drift factor
    pub max_clock_drift: f64,

    /// Default timeout for blocking sends
    pub sync_timeout: f64,

    /// Probability that a message is lost (0.0 - 1.0)
    pub packet_loss_rate: f64,

    /// Link bandwidth in megabits per second
    pub bandwidth_mbps: f64,

    /// Jitter is drawn uniformly from [-jitter_range, +jitter_range]
    pub jitter_range: f64,

    /// Probability that a message is held back and overtaken
    pub reorder_probability: f64,

    /// Extra hold-back delay range for reordered messages
    pub reorder_delay_range: (f64, f64),

    /// Fixed propagation latency applied to every message
    pub base_latency: f64,

    /// Per-hop delay through a top-of-rack leaf switch
    pub leaf_switch_latency: f64,

    /// Per-hop delay through the spine switch
    pub spine_switch_latency: f64,

    /// Additional cost of leaving the rack
    pub inter_rack_latency: f64,

    /// How long a delivery keeps a node in PROCESSING
    pub processing_delay: f64,

    pub ack_policy: AckPolicy,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            sync_model: SyncModel::Asynchronous,
            sync_bound: 2.0,
            stabilization_step: 10,
            max_clock_drift: 0.01,
            sync_timeout: 5.0,
            packet_loss_rate: 0.0,
            bandwidth_mbps: 1000.0,
            jitter_range: 0.0,
            reorder_probability: 0.0,
            reorder_delay_range: (0.1, 0.5),
            base_latency: 0.5,
            leaf_switch_latency: 0.001,
            spine_switch_latency: 0.002,
            inter_rack_latency: 0.1,
            processing_delay: 0.1,
            ack_policy: AckPolicy::Automatic,
        }
    }
}

impl NetworkConfig {
    /// A network with a fixed latency and no switching cost, loss or jitter.
    pub fn ideal(latency: f64) -> Self {
        Self {
            base_latency: latency,
            leaf_switch_latency: 0.0,
            spine_switch_latency: 0.0,
            inter_rack_latency: 0.0,
            ..Self::default()
        }
    }

    /// Rejects values outside their domain.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_probability("packet_loss_rate", self.packet_loss_rate)?;
        check_probability("reorder_probability", self.reorder_probability)?;
        check_positive("sync_bound", self.sync_bound)?;
        check_positive("bandwidth_mbps", self.bandwidth_mbps)?;
        check_non_negative("max_clock_drift", self.max_clock_drift)?;
        check_non_negative("sync_timeout", self.sync_timeout)?;
        check_non_negative("jitter_range", self.jitter_range)?;
        check_non_negative("base_latency", self.base_latency)?;
        check_non_negative("leaf_switch_latency", self.leaf_switch_latency)?;
        check_non_negative("spine_switch_latency", self.spine_switch_latency)?;
        check_non_negative("inter_rack_latency", self.inter_rack_latency)?;
        check_non_negative("processing_delay", self.processing_delay)?;

        let (low, high) = self.reorder_delay_range;
        check_non_negative("reorder_delay_range", low)?;
        check_non_negative("reorder_delay_range", high)?;
        if low > high {
            return Err(ConfigError::InvertedRange {
                field: "reorder_delay_range",
                low,
                high,
            });
        }
        Ok(())
    }

    pub fn sync_bound(&self) -> SimDuration {
        SimDuration::from_secs_f64(self.sync_bound)
    }

    pub fn sync_timeout(&self) -> SimDuration {
        SimDuration::from_secs_f64(self.sync_timeout)
    }

    pub fn processing_delay(&self) -> SimDuration {
        SimDuration::from_secs_f64(self.processing_delay)
    }
}

// =============================================================================
// FAULT CONFIG
// =============================================================================

/// A scheduled network partition between two node groups.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartitionWindow {
    /// Simulated time (seconds) at which the partition starts
    pub at: f64,

    /// How long the partition lasts (seconds)
    pub duration: f64,

    pub group_a: Vec<NodeId>,
    pub group_b: Vec<NodeId>,
}

/// Hardware and power fault parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FaultConfig {
    /// Per-step probability that a live node suffers a permanent hardware fault
    pub hw_fault_prob: f64,

    /// Per-step probability that a live node loses power
    pub power_failure_prob: f64,

    /// Mean outage length (seconds) for power failures; outages are exponential
    pub mean_time_to_recovery: f64,

    pub partition_schedule: Vec<PartitionWindow>,
}

impl Default for FaultConfig {
    fn default() -> Self {
        Self {
            hw_fault_prob: 0.0,
            power_failure_prob: 0.0,
            mean_time_to_recovery: 30.0,
            partition_schedule: Vec::new(),
        }
    }
}

impl FaultConfig {
    /// Rejects values outside their domain.
    ///
    /// Partition membership is checked against the topology by the engine.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_probability("hw_fault_prob", self.hw_fault_prob)?;
        check_probability("power_failure_prob", self.power_failure_prob)?;
        check_positive("mean_time_to_recovery", self.mean_time_to_recovery)?;

        for (index, window) in self.partition_schedule.iter().enumerate() {
            check_non_negative("partition.at", window.at)?;
            check_non_negative("partition.duration", window.duration)?;
            if window.group_a.is_empty() || window.group_b.is_empty() {
                return Err(ConfigError::EmptyPartitionGroup { index });
            }
        }
        Ok(())
    }

    /// True when no fault of any kind can occur.
    pub fn is_quiet(&self) -> bool {
        self.hw_fault_prob == 0.0
            && self.power_failure_prob == 0.0
            && self.partition_schedule.is_empty()
    }
}
