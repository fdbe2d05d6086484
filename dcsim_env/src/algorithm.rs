//! Algorithm plugin contract.

use crate::error::AlgorithmError;
use crate::node::Node;

/// A distributed algorithm driven by the simulator.
///
/// The engine calls `run` exactly once per step, after all events due in
/// that step have been applied. Implementations drain inboxes, update
/// stores and issue node actions; the engine applies those actions once
/// `run` returns.
///
/// # Failure isolation
///
/// An `Err` (or a panic) is logged at the step boundary and the run
/// continues with whatever the plugin already did to the nodes.
///
/// # Determinism
///
/// Plugins that need randomness should own a generator seeded at
/// construction so that a fixed seed reproduces the run.
pub trait Algorithm: Send {
    /// Name used in logs and benchmark results.
    fn name(&self) -> &str;

    /// Advances the algorithm by one simulation step.
    fn run(&mut self, nodes: &mut [Node], step_count: u64) -> Result<(), AlgorithmError>;
}

/// Closures work as ad-hoc plugins.
impl<F> Algorithm for F
where
    F: FnMut(&mut [Node], u64) -> Result<(), AlgorithmError> + Send,
{
    fn name(&self) -> &str {
        "closure"
    }

    fn run(&mut self, nodes: &mut [Node], step_count: u64) -> Result<(), AlgorithmError> {
        self(nodes, step_count)
    }
}
