//! Timer-driven heartbeat failure detector.
//!
//! Each live node arms a one-shot `heartbeat` timer. When it fires the node
//! sends a blocking `HEARTBEAT` to every peer and re-arms. Outcomes land in
//! the store as `alive:<peer>` flags, and the node labels itself `leader`
//! when no peer it believes alive has a smaller id, `follower` otherwise.
//!
//! Received heartbeats are acknowledged explicitly, so the detector works
//! under both ack policies.

use dcsim_env::{Algorithm, AlgorithmError, Node, NodeId, SimDuration, StoreValue, SyncHandle};
use std::collections::{BTreeMap, BTreeSet};

const TIMER_ID: &str = "heartbeat";
const DUE_KEY: &str = "heartbeat_due";

/// Store key holding a node's view of `peer`'s liveness.
pub fn alive_key(peer: &NodeId) -> String {
    format!("alive:{}", peer)
}

#[derive(Debug)]
pub struct Heartbeat {
    interval: SimDuration,
    timeout: SimDuration,

    /// Nodes whose timer is currently armed
    armed: BTreeSet<NodeId>,

    /// Outstanding heartbeats per origin: (peer, handle)
    in_flight: BTreeMap<NodeId, Vec<(NodeId, SyncHandle)>>,
}

impl Default for Heartbeat {
    fn default() -> Self {
        Self::new(SimDuration::from_secs(1), SimDuration::from_secs(2))
    }
}

impl Heartbeat {
    pub fn new(interval: SimDuration, timeout: SimDuration) -> Self {
        Self {
            interval,
            timeout,
            armed: BTreeSet::new(),
            in_flight: BTreeMap::new(),
        }
    }

    fn arm(&mut self, node: &mut Node) {
        node.set_timer(TIMER_ID, self.interval, |n| {
            n.store_mut().insert(DUE_KEY, true);
        });
        self.armed.insert(node.id().clone());
    }

    fn collect_outcomes(&mut self, node: &mut Node) {
        let Some(pending) = self.in_flight.get_mut(node.id()) else {
            return;
        };
        pending.retain(|(peer, handle)| match node.take_sync_result(handle) {
            Some(alive) => {
                node.store_mut().insert(alive_key(peer), alive);
                false
            }
            None => true,
        });
    }

    fn update_role(node: &mut Node, peers: &[NodeId]) {
        let smallest_alive_peer = peers
            .iter()
            .filter(|p| *p != node.id())
            .filter(|p| {
                node.store()
                    .get(&alive_key(p))
                    .and_then(StoreValue::as_bool)
                    .unwrap_or(false)
            })
            .min();
        let leads = smallest_alive_peer.map_or(true, |p| node.id() < p);
        node.store_mut()
            .set_role(if leads { "leader" } else { "follower" });
    }
}

impl Algorithm for Heartbeat {
    fn name(&self) -> &str {
        "heartbeat"
    }

    fn run(&mut self, nodes: &mut [Node], _step_count: u64) -> Result<(), AlgorithmError> {
        let ids: Vec<NodeId> = nodes.iter().map(|n| n.id().clone()).collect();

        for node in nodes.iter_mut() {
            // A dead node's timer is discarded; re-arm once it comes back.
            if node.is_shutdown() {
                self.armed.remove(node.id());
                continue;
            }
            if !self.armed.contains(node.id()) {
                self.arm(node);
            }

            self.collect_outcomes(node);

            for msg in node.drain_inbox() {
                node.acknowledge(&msg);
                node.store_mut().increment("heartbeats_received", 1);
            }

            let due = node
                .store_mut()
                .remove(DUE_KEY)
                .and_then(|v| v.as_bool())
                .unwrap_or(false);
            if due {
                let me = node.id().clone();
                for peer in ids.iter().filter(|p| **p != me) {
                    let handle = node.sync_send("HEARTBEAT", peer, Some(self.timeout));
                    self.in_flight
                        .entry(me.clone())
                        .or_default()
                        .push((peer.clone(), handle));
                }
                self.arm(node);
            }

            Self::update_role(node, &ids);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimConfig;
    use crate::engine::Engine;
    use dcsim_core::{AckPolicy, NetworkConfig};

    fn engine(network: NetworkConfig) -> Engine {
        let config = SimConfig::default().with_tick(0.25).with_network(network);
        let mut engine = Engine::new(config, Box::new(Heartbeat::default())).unwrap();
        engine.start().unwrap();
        engine
    }

    fn leaders(engine: &Engine) -> Vec<String> {
        engine
            .nodes()
            .iter()
            .filter(|n| !n.is_shutdown() && n.store().role() == Some("leader"))
            .map(|n| n.id().to_string())
            .collect()
    }

    #[test]
    fn test_all_peers_seen_alive() {
        let mut engine = engine(NetworkConfig::default());
        engine.run_steps(24).unwrap();

        for node in engine.nodes() {
            for peer in engine.nodes().iter().filter(|p| p.id() != node.id()) {
                let alive = node.store().get(&alive_key(peer.id())).and_then(StoreValue::as_bool);
                assert_eq!(alive, Some(true), "{} -> {}", node.id(), peer.id());
            }
        }
        assert_eq!(leaders(&engine), vec!["R1-S1".to_string()]);
    }

    #[test]
    fn test_manual_acks_still_detect_liveness() {
        let mut engine = engine(NetworkConfig {
            ack_policy: AckPolicy::Manual,
            ..Default::default()
        });
        engine.run_steps(24).unwrap();
        assert_eq!(engine.metrics().counters().sync_timeouts, 0);
        assert!(engine.metrics().counters().sync_acks > 0);
    }

    #[test]
    fn test_leader_moves_when_smallest_node_dies() {
        let mut engine = engine(NetworkConfig::default());
        engine.run_steps(12).unwrap();
        engine.shutdown_node(&NodeId::from("R1-S1")).unwrap();
        engine.run_steps(40).unwrap();

        let r1s2 = engine.node(&NodeId::from("R1-S2")).unwrap();
        assert_eq!(
            r1s2.store().get(&alive_key(&NodeId::from("R1-S1"))).and_then(StoreValue::as_bool),
            Some(false)
        );
        assert_eq!(leaders(&engine), vec!["R1-S2".to_string()]);
    }

    #[test]
    fn test_rearms_after_restart() {
        let mut engine = engine(NetworkConfig::default());
        let id = NodeId::from("R2-S1");
        engine.run_steps(4).unwrap();
        engine.shutdown_node(&id).unwrap();
        engine.run_steps(12).unwrap();
        engine.restart_node(&id).unwrap();
        engine.run_steps(24).unwrap();

        let node = engine.node(&id).unwrap();
        let peer = NodeId::from("R1-S1");
        assert_eq!(
            node.store().get(&alive_key(&peer)).and_then(StoreValue::as_bool),
            Some(true)
        );
    }
}
