//! Random PING/PONG traffic generator.

use dcsim_env::{Algorithm, AlgorithmError, Node};
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Per step, with probability `send_probability`, a random node pings a
/// random peer. Every node answers each PING it receives with a PONG to the
/// sender.
#[derive(Debug, Clone)]
pub struct RandomTraffic {
    rng: ChaCha8Rng,
    send_probability: f64,
}

impl RandomTraffic {
    pub const DEFAULT_SEND_PROBABILITY: f64 = 0.3;

    pub fn new(seed: u64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
            send_probability: Self::DEFAULT_SEND_PROBABILITY,
        }
    }

    pub fn with_send_probability(mut self, probability: f64) -> Self {
        self.send_probability = probability.clamp(0.0, 1.0);
        self
    }
}

impl Algorithm for RandomTraffic {
    fn name(&self) -> &str {
        "random_traffic"
    }

    fn run(&mut self, nodes: &mut [Node], step_count: u64) -> Result<(), AlgorithmError> {
        if nodes.len() > 1 && self.rng.gen::<f64>() < self.send_probability {
            let sender = self.rng.gen_range(0..nodes.len());
            let peers: Vec<usize> = (0..nodes.len()).filter(|&i| i != sender).collect();
            if let Some(&target) = peers.choose(&mut self.rng) {
                let target = nodes[target].id().clone();
                nodes[sender].send(format!("PING-{}", step_count), target);
            }
        }

        for node in nodes.iter_mut() {
            for msg in node.drain_inbox() {
                node.store_mut().increment("received", 1);
                let is_ping = msg
                    .payload()
                    .as_text()
                    .map_or(false, |text| text.starts_with("PING"));
                if is_ping {
                    node.send(format!("PONG-{}", step_count), msg.sender().clone());
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dcsim_env::{Message, NodeAction, SimTime};

    fn ring() -> Vec<Node> {
        vec![Node::new("a", "r"), Node::new("b", "r"), Node::new("c", "r")]
    }

    #[test]
    fn test_pings_go_to_a_peer() {
        let mut algo = RandomTraffic::new(7).with_send_probability(1.0);
        let mut nodes = ring();
        algo.run(&mut nodes, 3).unwrap();

        let actions: Vec<(usize, NodeAction)> = nodes
            .iter_mut()
            .enumerate()
            .flat_map(|(i, n)| n.take_actions().into_iter().map(move |a| (i, a)))
            .collect();
        assert_eq!(actions.len(), 1);

        let (sender, action) = &actions[0];
        match action {
            NodeAction::Send { target, payload } => {
                assert_ne!(target, nodes[*sender].id());
                assert_eq!(payload.as_text(), Some("PING-3"));
            }
            other => panic!("unexpected action {:?}", other),
        }
    }

    #[test]
    fn test_silent_when_probability_zero() {
        let mut algo = RandomTraffic::new(7).with_send_probability(0.0);
        let mut nodes = ring();
        for step in 0..50 {
            algo.run(&mut nodes, step).unwrap();
        }
        assert!(nodes.iter().all(|n| n.pending_actions() == 0));
    }

    #[test]
    fn test_pong_replies_to_sender() {
        let mut algo = RandomTraffic::new(1).with_send_probability(0.0);
        let mut nodes = ring();
        let ping = Message::data(0, "c".into(), "a".into(), "PING-0".into(), SimTime::ZERO, None);
        let pong = Message::data(1, "b".into(), "a".into(), "PONG-0".into(), SimTime::ZERO, None);
        nodes[0].deliver(ping);
        nodes[0].deliver(pong);

        algo.run(&mut nodes, 5).unwrap();

        let actions = nodes[0].take_actions();
        assert_eq!(actions.len(), 1);
        assert!(matches!(
            &actions[0],
            NodeAction::Send { target, payload }
                if target.as_str() == "c" && payload.as_text() == Some("PONG-5")
        ));
        assert_eq!(nodes[0].store().get("received").and_then(|v| v.as_int()), Some(2));
        assert!(!nodes[0].has_messages());
    }

    #[test]
    fn test_same_seed_same_choices() {
        let mut a = RandomTraffic::new(99);
        let mut b = RandomTraffic::new(99);
        let mut nodes_a = ring();
        let mut nodes_b = ring();
        for step in 0..20 {
            a.run(&mut nodes_a, step).unwrap();
            b.run(&mut nodes_b, step).unwrap();
        }
        let sent = |nodes: &mut Vec<Node>| -> Vec<String> {
            nodes
                .iter_mut()
                .flat_map(|n| n.take_actions())
                .map(|a| format!("{:?}", a))
                .collect()
        };
        assert_eq!(sent(&mut nodes_a), sent(&mut nodes_b));
    }
}
