//! Named benchmark scenarios.
//!
//! A scenario is a preset applied on top of a base [`SimConfig`]: it only
//! touches the network and fault models, never the seed, tick or topology.

use crate::config::SimConfig;
use dcsim_core::{PartitionWindow, SyncModel};
use dcsim_env::NodeId;
use serde::{Serialize, Serializer};

/// Scenario identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScenarioId {
    /// Default network, no faults
    Baseline,

    /// 20% packet loss
    Lossy,

    /// Heavy jitter with reordering
    Jittery,

    /// First rack cut off from the rest for a while
    Partition,

    /// Frequent power failures, rare hardware faults
    PowerChaos,

    /// Synchronous model with a bound below the cross-rack latency
    SyncStrict,

    /// Jittery network that stabilizes after step 20
    PartialSync,
}

impl ScenarioId {
    /// Returns a list of all scenarios.
    pub fn all() -> Vec<ScenarioId> {
        vec![
            ScenarioId::Baseline,
            ScenarioId::Lossy,
            ScenarioId::Jittery,
            ScenarioId::Partition,
            ScenarioId::PowerChaos,
            ScenarioId::SyncStrict,
            ScenarioId::PartialSync,
        ]
    }

    /// Returns the scenario name.
    pub fn name(&self) -> &'static str {
        match self {
            ScenarioId::Baseline => "baseline",
            ScenarioId::Lossy => "lossy",
            ScenarioId::Jittery => "jittery",
            ScenarioId::Partition => "partition",
            ScenarioId::PowerChaos => "power_chaos",
            ScenarioId::SyncStrict => "sync_strict",
            ScenarioId::PartialSync => "partial_sync",
        }
    }

    /// Returns a description of the scenario.
    pub fn description(&self) -> &'static str {
        match self {
            ScenarioId::Baseline => "Asynchronous network, no loss, no faults",
            ScenarioId::Lossy => "20% packet loss on every link",
            ScenarioId::Jittery => "Up to 300ms jitter and 20% reordering",
            ScenarioId::Partition => "Rack 1 partitioned from the rest between t=5s and t=15s",
            ScenarioId::PowerChaos => "2% per-step power failures (MTTR 5s) plus rare hardware faults",
            ScenarioId::SyncStrict => "Synchronous model with a 300ms bound; cross-rack hops violate it",
            ScenarioId::PartialSync => "500ms jitter, 1s bound enforced from step 20 onward",
        }
    }

    /// Algorithm run when none is given explicitly.
    pub fn default_algorithm(&self) -> &'static str {
        match self {
            ScenarioId::Partition | ScenarioId::PowerChaos => "heartbeat",
            _ => "random_traffic",
        }
    }

    /// Applies this scenario's network and fault settings.
    pub fn configure(&self, config: &mut SimConfig) {
        match self {
            ScenarioId::Baseline => {}
            ScenarioId::Lossy => {
                config.network.packet_loss_rate = 0.2;
            }
            ScenarioId::Jittery => {
                config.network.jitter_range = 0.3;
                config.network.reorder_probability = 0.2;
            }
            ScenarioId::Partition => {
                let (group_a, group_b) = split_first_rack(config);
                config.faults.partition_schedule.push(PartitionWindow {
                    at: 5.0,
                    duration: 10.0,
                    group_a,
                    group_b,
                });
            }
            ScenarioId::PowerChaos => {
                let faults = &mut config.faults;
                faults.power_failure_prob = 0.02;
                faults.mean_time_to_recovery = 5.0;
                faults.hw_fault_prob = 0.0005;
            }
            ScenarioId::SyncStrict => {
                config.network.sync_model = SyncModel::Synchronous;
                config.network.sync_bound = 0.3;
            }
            ScenarioId::PartialSync => {
                let network = &mut config.network;
                network.sync_model = SyncModel::PartialSynchronous;
                network.sync_bound = 1.0;
                network.stabilization_step = 20;
                network.jitter_range = 0.5;
            }
        }
    }
}

/// First rack against everyone else. A single-rack topology is split in half.
fn split_first_rack(config: &SimConfig) -> (Vec<NodeId>, Vec<NodeId>) {
    let racks = &config.topology.racks;
    if racks.len() > 1 {
        let first = racks[0].node_ids.clone();
        let rest = racks[1..]
            .iter()
            .flat_map(|r| r.node_ids.iter().cloned())
            .collect();
        (first, rest)
    } else {
        let mut all: Vec<NodeId> = config.topology.nodes().map(|(id, _)| id.clone()).collect();
        let rest = all.split_off(all.len() / 2);
        (all, rest)
    }
}

impl std::fmt::Display for ScenarioId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for ScenarioId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "baseline" => Ok(ScenarioId::Baseline),
            "lossy" => Ok(ScenarioId::Lossy),
            "jittery" => Ok(ScenarioId::Jittery),
            "partition" | "split_brain" => Ok(ScenarioId::Partition),
            "power_chaos" | "powerchaos" => Ok(ScenarioId::PowerChaos),
            "sync_strict" | "syncstrict" => Ok(ScenarioId::SyncStrict),
            "partial_sync" | "partialsync" => Ok(ScenarioId::PartialSync),
            _ => Err(format!("Unknown scenario: {}", s)),
        }
    }
}

impl Serialize for ScenarioId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{RackSpec, Topology};

    #[test]
    fn test_names_parse_back() {
        for scenario in ScenarioId::all() {
            assert_eq!(scenario.name().parse::<ScenarioId>(), Ok(scenario));
        }
        assert!("nope".parse::<ScenarioId>().is_err());
    }

    #[test]
    fn test_every_scenario_yields_valid_config() {
        for scenario in ScenarioId::all() {
            let mut config = SimConfig::default();
            scenario.configure(&mut config);
            assert!(config.validate().is_ok(), "{} is invalid", scenario);
        }
    }

    #[test]
    fn test_partition_splits_racks() {
        let mut config = SimConfig::default();
        ScenarioId::Partition.configure(&mut config);

        let window = &config.faults.partition_schedule[0];
        assert_eq!(window.group_a.len(), 5);
        assert_eq!(window.group_b.len(), 4);
        assert!(window.group_b.iter().all(|id| id.as_str().starts_with("R2")));
    }

    #[test]
    fn test_partition_single_rack_halves() {
        let mut config = SimConfig::default().with_topology(Topology {
            racks: vec![RackSpec {
                rack_id: "only".into(),
                node_ids: vec!["a".into(), "b".into(), "c".into(), "d".into()],
            }],
        });
        ScenarioId::Partition.configure(&mut config);

        let window = &config.faults.partition_schedule[0];
        assert_eq!(window.group_a, vec![NodeId::from("a"), NodeId::from("b")]);
        assert_eq!(window.group_b, vec![NodeId::from("c"), NodeId::from("d")]);
    }

    #[test]
    fn test_baseline_leaves_config_untouched() {
        let mut config = SimConfig::default();
        ScenarioId::Baseline.configure(&mut config);
        assert_eq!(config, SimConfig::default());
    }
}
