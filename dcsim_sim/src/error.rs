//! Engine error type.

use dcsim_core::ConfigError;
use dcsim_env::{EnvError, SimTime};
use thiserror::Error;

/// Errors surfaced by the engine and harness.
///
/// Delivery outcomes (loss, fault drops, timeouts) are never errors; they
/// are counted in the metrics.
#[derive(Debug, Error)]
pub enum SimError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Env(#[from] EnvError),

    /// An event was scheduled before the current simulated time
    #[error("Cannot schedule event at {requested}: clock is already at {now}")]
    NonCausalSchedule { requested: SimTime, now: SimTime },

    /// A lifecycle operation was called in a state that does not allow it
    #[error("Cannot {operation} while engine is {state}")]
    InvalidState {
        operation: &'static str,
        state: String,
    },

    #[error("Unknown algorithm: {0}")]
    UnknownAlgorithm(String),

    #[error("Export failed: {0}")]
    Export(#[from] std::io::Error),
}

impl SimError {
    pub(crate) fn invalid_state(operation: &'static str, state: impl std::fmt::Display) -> Self {
        Self::InvalidState {
            operation,
            state: state.to_string(),
        }
    }
}

pub type SimResult<T> = Result<T, SimError>;
