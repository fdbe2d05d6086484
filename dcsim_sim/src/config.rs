//! Run configuration and datacenter topology.

use dcsim_core::{ConfigError, FaultConfig, NetworkConfig};
use dcsim_env::{NodeId, SimDuration};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// The servers in one rack.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RackSpec {
    pub rack_id: String,
    pub node_ids: Vec<NodeId>,
}

/// Physical layout of the simulated datacenter.
///
/// Node order here is the node order everywhere else: the slice handed to
/// plugins, action flushing and fault sampling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Topology {
    pub racks: Vec<RackSpec>,
}

impl Topology {
    /// Two racks with five and four servers, named `R{rack}-S{slot}`.
    pub fn datacenter() -> Self {
        Self::from_rack_sizes(&[5, 4])
    }

    /// `racks` racks of `per_rack` servers each.
    pub fn uniform(racks: usize, per_rack: usize) -> Self {
        Self::from_rack_sizes(&vec![per_rack; racks])
    }

    fn from_rack_sizes(sizes: &[usize]) -> Self {
        let racks = sizes
            .iter()
            .enumerate()
            .map(|(r, &size)| RackSpec {
                rack_id: format!("Rack{}", r + 1),
                node_ids: (1..=size)
                    .map(|s| NodeId::new(format!("R{}-S{}", r + 1, s)))
                    .collect(),
            })
            .collect();
        Self { racks }
    }

    /// Every node with its rack, in topology order.
    pub fn nodes(&self) -> impl Iterator<Item = (&NodeId, &str)> {
        self.racks
            .iter()
            .flat_map(|rack| rack.node_ids.iter().map(move |id| (id, rack.rack_id.as_str())))
    }

    pub fn node_count(&self) -> usize {
        self.racks.iter().map(|r| r.node_ids.len()).sum()
    }

    pub fn contains(&self, node: &NodeId) -> bool {
        self.nodes().any(|(id, _)| id == node)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.node_count() == 0 {
            return Err(ConfigError::EmptyTopology);
        }
        let mut seen = BTreeSet::new();
        for (id, _) in self.nodes() {
            if !seen.insert(id) {
                return Err(ConfigError::DuplicateNode(id.to_string()));
            }
        }
        Ok(())
    }
}

impl Default for Topology {
    fn default() -> Self {
        Self::datacenter()
    }
}

/// Configuration for a simulation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Master seed for determinism
    pub seed: u64,

    /// Simulated seconds per step
    pub tick_secs: f64,

    /// Stop after this many steps
    pub max_steps: Option<u64>,

    /// Stop once simulated time reaches this many seconds
    pub max_time_secs: Option<f64>,

    pub topology: Topology,
    pub network: NetworkConfig,
    pub faults: FaultConfig,

    /// Keep a full event trace (memory grows with the run)
    pub record_trace: bool,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            tick_secs: 1.0,
            max_steps: None,
            max_time_secs: None,
            topology: Topology::default(),
            network: NetworkConfig::default(),
            faults: FaultConfig::default(),
            record_trace: false,
        }
    }
}

impl SimConfig {
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_tick(mut self, tick_secs: f64) -> Self {
        self.tick_secs = tick_secs;
        self
    }

    pub fn with_max_steps(mut self, steps: u64) -> Self {
        self.max_steps = Some(steps);
        self
    }

    pub fn with_max_time(mut self, secs: f64) -> Self {
        self.max_time_secs = Some(secs);
        self
    }

    pub fn with_topology(mut self, topology: Topology) -> Self {
        self.topology = topology;
        self
    }

    pub fn with_network(mut self, network: NetworkConfig) -> Self {
        self.network = network;
        self
    }

    pub fn with_faults(mut self, faults: FaultConfig) -> Self {
        self.faults = faults;
        self
    }

    pub fn with_trace(mut self, record: bool) -> Self {
        self.record_trace = record;
        self
    }

    pub fn tick(&self) -> SimDuration {
        SimDuration::from_secs_f64(self.tick_secs)
    }

    /// Validates everything, including partition members against the topology.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.tick_secs.is_finite() && self.tick() > SimDuration::ZERO) {
            return Err(ConfigError::NonPositive {
                field: "tick_secs",
                value: self.tick_secs,
            });
        }
        if let Some(limit) = self.max_time_secs {
            if !(limit.is_finite() && limit >= 0.0) {
                return Err(ConfigError::Negative {
                    field: "max_time_secs",
                    value: limit,
                });
            }
        }

        self.topology.validate()?;
        self.network.validate()?;
        self.faults.validate()?;

        for window in &self.faults.partition_schedule {
            for member in window.group_a.iter().chain(&window.group_b) {
                if !self.topology.contains(member) {
                    return Err(ConfigError::UnknownPartitionMember(member.to_string()));
                }
            }
        }
        Ok(())
    }
}
