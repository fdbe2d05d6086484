//! Datacenter Network Simulator - Deterministic Discrete-Event Engine
//!
//! This crate is the controlled environment in which distributed-algorithm
//! plugins run against a simulated datacenter network.
//!
//! # Core Principle: Every Source of Non-Determinism Is Owned by the Engine
//!
//! - **Time**: a virtual clock that only moves when the engine steps
//! - **Network**: one transport decides loss, delay, jitter, reordering and
//!   partition drops for every message
//! - **Randomness**: all entropy is drawn from a single seeded ChaCha8 stream
//!
//! Same seed, same configuration, same plugin: same trace and same metrics.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                            Engine                            │
//! │  ┌──────────────────────────────────────────────────────┐    │
//! │  │ Clock (min-heap of events keyed by fire_time, seq)   │    │
//! │  └──────────────────────────────────────────────────────┘    │
//! │      ▲ delivery        ▲ timer         ▲ fault/recovery      │
//! │  ┌───┴───────┐   ┌─────┴──────┐   ┌────┴──────────┐          │
//! │  │ Transport │   │ TimerTable │   │ FaultInjector │          │
//! │  └───┬───────┘   └────────────┘   └───────────────┘          │
//! │      │ acks                                                  │
//! │  ┌───▼─────────────┐     ┌─────────────────────────────┐     │
//! │  │ SyncCoordinator │────►│ Nodes ◄── Algorithm plugin  │     │
//! │  └─────────────────┘     └─────────────────────────────┘     │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use dcsim_sim::{algorithms::RandomTraffic, Engine, SimConfig};
//!
//! let config = SimConfig::default().with_seed(7).with_max_steps(100);
//! let mut engine = Engine::new(config, Box::new(RandomTraffic::new(7)))?;
//! let metrics = engine.run()?;
//! println!("delivery rate {:.2}", metrics.delivery_rate);
//! ```

pub mod algorithms;
mod clock;
mod config;
mod context;
mod coordinator;
mod engine;
mod error;
mod exporter;
mod faults;
mod runner;
pub mod scenarios;
mod timers;
mod trace;
mod transport;

pub use clock::{Clock, Event, EventKind, FaultDirective};
pub use config::{RackSpec, SimConfig, Topology};
pub use context::SimContext;
pub use coordinator::{PendingSyncRequest, Resolution, SyncCoordinator};
pub use engine::{Engine, EngineState};
pub use error::{SimError, SimResult};
pub use exporter::{ExportSummary, SimExport};
pub use faults::{FaultInjector, FaultStrike, ShutdownCause};
pub use runner::{BenchmarkRunner, ScenarioResult};
pub use timers::TimerTable;
pub use trace::{TraceEntry, TraceEvent};
pub use transport::{LinkEnds, PartitionTable, Transport, TransportDecision};
