//! Error types for the node model and plugin contract.

use thiserror::Error;

/// Errors raised when addressing nodes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EnvError {
    /// No node with this id exists in the simulation
    #[error("Unknown node: {0}")]
    UnknownNode(String),

    /// Two nodes were declared with the same id
    #[error("Duplicate node id: {0}")]
    DuplicateNode(String),
}

impl EnvError {
    /// Creates an unknown-node error.
    pub fn unknown(node: impl std::fmt::Display) -> Self {
        Self::UnknownNode(node.to_string())
    }

    /// Creates a duplicate-node error.
    pub fn duplicate(node: impl std::fmt::Display) -> Self {
        Self::DuplicateNode(node.to_string())
    }
}

/// Failure reported by an algorithm plugin from `run`.
///
/// The engine logs it and keeps going; it never aborts a run.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Algorithm error: {message}")]
pub struct AlgorithmError {
    pub message: String,
}

impl AlgorithmError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<String> for AlgorithmError {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

impl From<&str> for AlgorithmError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}
