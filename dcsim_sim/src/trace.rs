//! Optional event trace, used to compare runs for determinism.

use dcsim_env::{NodeId, SimTime, SyncStatus};
use serde::{Deserialize, Serialize};

/// Something the engine did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TraceEvent {
    Sent {
        message_id: u64,
        from: NodeId,
        to: NodeId,
        outcome: String,
    },
    Delivered {
        message_id: u64,
        to: NodeId,
    },
    DroppedOnArrival {
        message_id: u64,
        to: NodeId,
    },
    SyncResolved {
        origin: NodeId,
        seq: u64,
        status: SyncStatus,
    },
    TimerFired {
        node: NodeId,
        timer_id: String,
    },
    TimerDiscarded {
        node: NodeId,
        timer_id: String,
    },
    NodeDown {
        node: NodeId,
        cause: String,
    },
    NodeUp {
        node: NodeId,
    },
    PartitionStarted {
        id: u64,
    },
    PartitionHealed {
        id: u64,
    },
    AlgorithmError {
        message: String,
    },
}

/// A trace record stamped with step and simulated time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceEntry {
    pub step: u64,
    pub time: SimTime,
    pub event: TraceEvent,
}
