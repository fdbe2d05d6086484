//! Hardware and power fault injection.
//!
//! Each step, every live node is sampled independently: first for a
//! permanent hardware fault, then for a power failure. Power failures carry
//! an exponentially distributed outage; the engine schedules the matching
//! recovery event. Only power outages auto-recover, and only if nothing
//! superseded them (a manual shutdown or a later outage).

use crate::context::SimContext;
use dcsim_core::{ConfigError, FaultConfig};
use dcsim_env::{NodeId, SimDuration};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Why a node is currently powered off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShutdownCause {
    /// Explicit shutdown by the node itself or the operator
    Manual,

    /// Permanent until manually restarted
    Hardware,

    /// Temporary; recovers when the outage ends
    Power,
}

/// A fault sampled for one node in one step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultStrike {
    Hardware,
    Power { outage: u64, duration: SimDuration },
}

#[derive(Debug, Clone, Copy)]
struct Downtime {
    cause: ShutdownCause,
    outage: u64,
}

/// Tracks fault parameters and why each dead node is dead.
#[derive(Debug, Clone)]
pub struct FaultInjector {
    config: FaultConfig,
    down: BTreeMap<NodeId, Downtime>,
    next_outage: u64,
}

impl FaultInjector {
    pub fn new(config: FaultConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            down: BTreeMap::new(),
            next_outage: 0,
        })
    }

    pub fn config(&self) -> &FaultConfig {
        &self.config
    }

    /// Swaps in new fault parameters. Existing outages are unaffected.
    pub fn reconfigure(&mut self, config: FaultConfig) -> Result<(), ConfigError> {
        config.validate()?;
        self.config = config;
        Ok(())
    }

    /// Samples faults for the given live nodes, in the given order.
    ///
    /// Struck nodes are recorded as down before returning.
    pub fn sample<'a>(
        &mut self,
        live: impl IntoIterator<Item = &'a NodeId>,
        ctx: &mut SimContext,
    ) -> Vec<(NodeId, FaultStrike)> {
        let mut strikes = Vec::new();
        for node in live {
            if ctx.chance(self.config.hw_fault_prob) {
                self.mark_down(node, ShutdownCause::Hardware);
                strikes.push((node.clone(), FaultStrike::Hardware));
            } else if ctx.chance(self.config.power_failure_prob) {
                let secs = ctx.exponential(self.config.mean_time_to_recovery);
                let outage = self.mark_down(node, ShutdownCause::Power);
                strikes.push((
                    node.clone(),
                    FaultStrike::Power {
                        outage,
                        duration: SimDuration::from_secs_f64(secs),
                    },
                ));
            }
        }
        strikes
    }

    /// Records a node as down and returns the outage id.
    pub fn mark_down(&mut self, node: &NodeId, cause: ShutdownCause) -> u64 {
        let outage = self.next_outage;
        self.next_outage += 1;
        self.down.insert(node.clone(), Downtime { cause, outage });
        outage
    }

    /// True if the recovery for `outage` still applies to `node`.
    pub fn recovery_allowed(&self, node: &NodeId, outage: u64) -> bool {
        matches!(
            self.down.get(node),
            Some(Downtime { cause: ShutdownCause::Power, outage: current }) if *current == outage
        )
    }

    /// Forgets a node's downtime. Called when it comes back up.
    pub fn clear(&mut self, node: &NodeId) -> Option<ShutdownCause> {
        self.down.remove(node).map(|d| d.cause)
    }

    pub fn cause(&self, node: &NodeId) -> Option<ShutdownCause> {
        self.down.get(node).map(|d| d.cause)
    }

    /// Number of nodes currently held down.
    pub fn down_count(&self) -> usize {
        self.down.len()
    }
}
