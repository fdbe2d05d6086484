//! Datacenter Simulator Node Model
//!
//! This crate holds everything algorithm plugins see:
//! - [`Node`]: identity, rack, lifecycle state, FIFO inbox, private store
//! - [`Message`] and [`Payload`]: immutable transport units
//! - [`Algorithm`]: the single-operation plugin contract
//!
//! Node actions (`send`, `sync_send`, `set_timer`, ...) are buffered on
//! the node and applied by the engine at the step boundary. Plugins never
//! hold a reference to the event queue, the transport or fault state.
//!
//! # Example
//!
//! ```ignore
//! use dcsim_env::{Algorithm, AlgorithmError, Node};
//!
//! struct Echo;
//!
//! impl Algorithm for Echo {
//!     fn name(&self) -> &str { "echo" }
//!
//!     fn run(&mut self, nodes: &mut [Node], _step: u64) -> Result<(), AlgorithmError> {
//!         for node in nodes.iter_mut() {
//!             for msg in node.drain_inbox() {
//!                 node.send(msg.payload().clone(), msg.sender().clone());
//!             }
//!         }
//!         Ok(())
//!     }
//! }
//! ```

mod algorithm;
mod error;
mod node;
mod store;
mod types;

pub use algorithm::Algorithm;
pub use error::{AlgorithmError, EnvError};
pub use node::{Node, NodeAction, SyncHandle, TimerCallback};
pub use store::{Store, StoreValue, ROLE_KEY};
pub use types::{
    DeliveryTag, Message, MessageKind, NodeId, NodeState, Payload, SimDuration, SimTime, SyncStatus,
};
