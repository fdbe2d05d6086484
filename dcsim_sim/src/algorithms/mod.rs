//! Built-in algorithm plugins, selectable by name.

mod heartbeat;
mod random_traffic;

pub use heartbeat::{alive_key, Heartbeat};
pub use random_traffic::RandomTraffic;

use crate::error::{SimError, SimResult};
use dcsim_env::{Algorithm, AlgorithmError, Node};

/// Does nothing. Useful for observing pure fault and timer behavior.
#[derive(Debug, Clone, Copy, Default)]
pub struct Idle;

impl Algorithm for Idle {
    fn name(&self) -> &str {
        "idle"
    }

    fn run(&mut self, _nodes: &mut [Node], _step_count: u64) -> Result<(), AlgorithmError> {
        Ok(())
    }
}

/// Names accepted by [`by_name`].
pub fn names() -> &'static [&'static str] {
    &["random_traffic", "heartbeat", "idle"]
}

/// Instantiates a built-in algorithm. `seed` feeds algorithms that draw
/// random numbers.
pub fn by_name(name: &str, seed: u64) -> SimResult<Box<dyn Algorithm>> {
    match name.to_lowercase().as_str() {
        "random_traffic" | "random" => Ok(Box::new(RandomTraffic::new(seed))),
        "heartbeat" => Ok(Box::new(Heartbeat::default())),
        "idle" | "none" => Ok(Box::new(Idle)),
        _ => Err(SimError::UnknownAlgorithm(name.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_listed_name_resolves() {
        for name in names() {
            let algo = by_name(name, 1).unwrap();
            assert_eq!(algo.name(), *name);
        }
    }

    #[test]
    fn test_unknown_name() {
        assert!(matches!(
            by_name("paxos", 1),
            Err(SimError::UnknownAlgorithm(name)) if name == "paxos"
        ));
    }
}
