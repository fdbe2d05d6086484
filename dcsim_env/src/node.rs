//! Simulated server node.
//!
//! A `Node` is the actor algorithm plugins work with. Plugins drain its
//! inbox, read and write its store, and issue actions (`send`,
//! `sync_send`, `set_timer`, ...). Actions are buffered on the node and
//! applied by the engine at the end of the step, so plugin code never
//! touches the event queue, the transport or fault state directly.
//!
//! # Write paths
//!
//! Each field has exactly one writer:
//! - `inbox`: appended by the engine on delivery, drained by the plugin
//! - `store`: plugin only
//! - `state` / `is_shutdown`: engine fault handling and explicit shutdown
//! - sync outcomes: written by the engine's coordinator, taken by the plugin

use crate::store::Store;
use crate::types::{DeliveryTag, Message, NodeId, NodeState, Payload, SimDuration, SimTime, SyncStatus};
use std::collections::{BTreeMap, VecDeque};
use std::fmt;

/// Callback run when a timer fires, with the owning node as context.
pub type TimerCallback = Box<dyn FnOnce(&mut Node) + Send + 'static>;

/// Handle returned by [`Node::sync_send`].
///
/// Resolution happens across later steps; poll it with
/// [`Node::sync_status`] or [`Node::take_sync_result`].
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SyncHandle {
    tag: DeliveryTag,
}

impl SyncHandle {
    pub fn tag(&self) -> &DeliveryTag {
        &self.tag
    }
}

/// An action issued by plugin code, applied by the engine after `run`.
pub enum NodeAction {
    /// Fire-and-forget send
    Send { target: NodeId, payload: Payload },

    /// Blocking send awaiting an acknowledgment
    SyncSend {
        target: NodeId,
        payload: Payload,
        tag: DeliveryTag,
        timeout: Option<SimDuration>,
    },

    /// Explicit acknowledgment of a tagged message (manual ack policy)
    Ack { tag: DeliveryTag },

    /// One-shot timer; replaces any pending timer with the same id
    SetTimer {
        timer_id: String,
        delay: SimDuration,
        callback: TimerCallback,
    },

    CancelTimer { timer_id: String },

    /// The node powers itself off. Never auto-recovered.
    Shutdown,
}

impl fmt::Debug for NodeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeAction::Send { target, payload } => f
                .debug_struct("Send")
                .field("target", target)
                .field("payload", payload)
                .finish(),
            NodeAction::SyncSend { target, payload, tag, timeout } => f
                .debug_struct("SyncSend")
                .field("target", target)
                .field("payload", payload)
                .field("tag", tag)
                .field("timeout", timeout)
                .finish(),
            NodeAction::Ack { tag } => f.debug_struct("Ack").field("tag", tag).finish(),
            NodeAction::SetTimer { timer_id, delay, .. } => f
                .debug_struct("SetTimer")
                .field("timer_id", timer_id)
                .field("delay", delay)
                .finish_non_exhaustive(),
            NodeAction::CancelTimer { timer_id } => {
                f.debug_struct("CancelTimer").field("timer_id", timer_id).finish()
            }
            NodeAction::Shutdown => f.write_str("Shutdown"),
        }
    }
}

/// A simulated server.
pub struct Node {
    /// Unique identity
    id: NodeId,

    /// Physical location; many nodes share a rack
    rack_id: String,

    state: NodeState,
    is_shutdown: bool,

    /// Delivered messages in transport order
    inbox: VecDeque<Message>,

    /// Algorithm-owned state
    store: Store,

    /// Global simulated time as of the current step or event
    now: SimTime,

    /// Node-local clock reading including drift
    local_time: f64,

    /// Deliveries still being processed
    processing_tasks: u32,

    messages_received: u64,

    next_sync_seq: u64,
    sync_outcomes: BTreeMap<DeliveryTag, SyncStatus>,

    actions: Vec<NodeAction>,
}

impl Node {
    /// Creates an idle node. Nodes are only created by the engine at setup.
    pub fn new(id: impl Into<NodeId>, rack_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            rack_id: rack_id.into(),
            state: NodeState::Idle,
            is_shutdown: false,
            inbox: VecDeque::new(),
            store: Store::new(),
            now: SimTime::ZERO,
            local_time: 0.0,
            processing_tasks: 0,
            messages_received: 0,
            next_sync_seq: 0,
            sync_outcomes: BTreeMap::new(),
            actions: Vec::new(),
        }
    }

    pub fn id(&self) -> &NodeId {
        &self.id
    }

    pub fn rack_id(&self) -> &str {
        &self.rack_id
    }

    pub fn state(&self) -> NodeState {
        self.state
    }

    pub fn is_shutdown(&self) -> bool {
        self.is_shutdown
    }

    /// Global simulated time. The only clock consulted for timeouts.
    pub fn now(&self) -> SimTime {
        self.now
    }

    /// This node's drifted view of the clock, in seconds.
    pub fn local_time(&self) -> f64 {
        self.local_time
    }

    pub fn messages_received(&self) -> u64 {
        self.messages_received
    }

    // ── Inbox ─────────────────────────────────────────────────────

    pub fn inbox(&self) -> &VecDeque<Message> {
        &self.inbox
    }

    pub fn has_messages(&self) -> bool {
        !self.inbox.is_empty()
    }

    /// Removes the oldest delivered message.
    pub fn pop_message(&mut self) -> Option<Message> {
        self.inbox.pop_front()
    }

    /// Removes every delivered message, oldest first.
    pub fn drain_inbox(&mut self) -> Vec<Message> {
        self.inbox.drain(..).collect()
    }

    // ── Store ─────────────────────────────────────────────────────

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut Store {
        &mut self.store
    }

    // ── Actions ───────────────────────────────────────────────────

    /// Fire-and-forget send. Always accepted; the transport may still drop it.
    pub fn send(&mut self, payload: impl Into<Payload>, target: impl Into<NodeId>) {
        self.actions.push(NodeAction::Send {
            target: target.into(),
            payload: payload.into(),
        });
    }

    /// Blocking send with acknowledgment.
    ///
    /// Unlike a literal blocking call this returns immediately with a
    /// handle. The outcome becomes visible in a later step: `true` once the
    /// acknowledgment's delivery fires at or before `now + timeout`, `false`
    /// once the deadline passes without one. `None` uses the configured
    /// default sync timeout.
    pub fn sync_send(
        &mut self,
        payload: impl Into<Payload>,
        target: impl Into<NodeId>,
        timeout: Option<SimDuration>,
    ) -> SyncHandle {
        let tag = DeliveryTag {
            origin: self.id.clone(),
            seq: self.next_sync_seq,
        };
        self.next_sync_seq += 1;
        self.sync_outcomes.insert(tag.clone(), SyncStatus::Waiting);
        self.actions.push(NodeAction::SyncSend {
            target: target.into(),
            payload: payload.into(),
            tag: tag.clone(),
            timeout,
        });
        SyncHandle { tag }
    }

    /// Current resolution state of a blocking send.
    ///
    /// Handles already consumed by `take_sync_result` report `TimedOut`.
    pub fn sync_status(&self, handle: &SyncHandle) -> SyncStatus {
        self.sync_outcomes
            .get(&handle.tag)
            .copied()
            .unwrap_or(SyncStatus::TimedOut)
    }

    /// Takes the outcome of a resolved blocking send, freeing its slot.
    ///
    /// Returns `None` while the request is still waiting.
    pub fn take_sync_result(&mut self, handle: &SyncHandle) -> Option<bool> {
        let outcome = self.sync_outcomes.get(&handle.tag)?.outcome()?;
        self.sync_outcomes.remove(&handle.tag);
        Some(outcome)
    }

    /// Acknowledges a tagged message. Only needed under the manual ack policy.
    pub fn acknowledge(&mut self, message: &Message) {
        if let Some(tag) = message.tag().filter(|_| message.requires_ack()) {
            self.actions.push(NodeAction::Ack { tag: tag.clone() });
        }
    }

    /// Schedules `callback` to run on this node after `delay`.
    ///
    /// Re-registering an id that has not fired yet replaces the earlier timer.
    pub fn set_timer<F>(&mut self, timer_id: impl Into<String>, delay: SimDuration, callback: F)
    where
        F: FnOnce(&mut Node) + Send + 'static,
    {
        self.actions.push(NodeAction::SetTimer {
            timer_id: timer_id.into(),
            delay,
            callback: Box::new(callback),
        });
    }

    pub fn cancel_timer(&mut self, timer_id: impl Into<String>) {
        self.actions.push(NodeAction::CancelTimer {
            timer_id: timer_id.into(),
        });
    }

    /// Powers this node off. An explicit shutdown is never auto-recovered.
    pub fn shutdown(&mut self) {
        self.actions.push(NodeAction::Shutdown);
    }

    /// Number of actions waiting for the engine.
    pub fn pending_actions(&self) -> usize {
        self.actions.len()
    }

    // ── Engine-side hooks ─────────────────────────────────────────

    #[doc(hidden)]
    pub fn set_clock(&mut self, now: SimTime, local_time: f64) {
        self.now = now;
        self.local_time = local_time;
    }

    #[doc(hidden)]
    pub fn take_actions(&mut self) -> Vec<NodeAction> {
        std::mem::take(&mut self.actions)
    }

    /// Appends a delivered message and marks the node busy.
    #[doc(hidden)]
    pub fn deliver(&mut self, message: Message) {
        self.messages_received += 1;
        self.processing_tasks += 1;
        self.state = NodeState::Processing;
        self.inbox.push_back(message);
    }

    /// Completes one delivery's processing; the node idles when none remain.
    #[doc(hidden)]
    pub fn finish_processing(&mut self) {
        self.processing_tasks = self.processing_tasks.saturating_sub(1);
        if self.processing_tasks == 0 && !self.is_shutdown {
            self.state = NodeState::Idle;
        }
    }

    #[doc(hidden)]
    pub fn power_off(&mut self) {
        self.is_shutdown = true;
        self.state = NodeState::Shutdown;
        self.processing_tasks = 0;
    }

    #[doc(hidden)]
    pub fn power_on(&mut self) {
        self.is_shutdown = false;
        self.state = NodeState::Idle;
    }

    #[doc(hidden)]
    pub fn resolve_sync(&mut self, tag: &DeliveryTag, status: SyncStatus) {
        if let Some(slot) = self.sync_outcomes.get_mut(tag) {
            *slot = status;
        }
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.id)
            .field("rack_id", &self.rack_id)
            .field("state", &self.state)
            .field("inbox", &self.inbox.len())
            .field("store", &self.store)
            .field("pending_actions", &self.actions.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(id: u64, from: &str, to: &str, text: &str) -> Message {
        Message::data(id, from.into(), to.into(), text.into(), SimTime::ZERO, None)
    }

    #[test]
    fn test_new_node_is_idle() {
        let node = Node::new("R1-S1", "Rack1");
        assert_eq!(node.id().as_str(), "R1-S1");
        assert_eq!(node.rack_id(), "Rack1");
        assert_eq!(node.state(), NodeState::Idle);
        assert!(!node.is_shutdown());
        assert!(!node.has_messages());
    }

    #[test]
    fn test_inbox_is_fifo() {
        let mut node = Node::new("b", "r");
        node.deliver(message(1, "a", "b", "first"));
        node.deliver(message(2, "a", "b", "second"));

        assert_eq!(node.state(), NodeState::Processing);
        assert_eq!(node.pop_message().map(|m| m.id()), Some(1));
        assert_eq!(node.drain_inbox().iter().map(Message::id).collect::<Vec<_>>(), vec![2]);
        assert_eq!(node.messages_received(), 2);
    }

    #[test]
    fn test_processing_returns_to_idle() {
        let mut node = Node::new("b", "r");
        node.deliver(message(1, "a", "b", "x"));
        node.deliver(message(2, "a", "b", "y"));

        node.finish_processing();
        assert_eq!(node.state(), NodeState::Processing);
        node.finish_processing();
        assert_eq!(node.state(), NodeState::Idle);
    }

    #[test]
    fn test_power_cycle() {
        let mut node = Node::new("b", "r");
        node.deliver(message(1, "a", "b", "x"));
        node.power_off();
        assert!(node.is_shutdown());
        assert_eq!(node.state(), NodeState::Shutdown);

        // Pending processing completion must not wake a dead node.
        node.finish_processing();
        assert_eq!(node.state(), NodeState::Shutdown);

        node.power_on();
        assert_eq!(node.state(), NodeState::Idle);
        assert!(!node.is_shutdown());
    }

    #[test]
    fn test_actions_are_buffered() {
        let mut node = Node::new("a", "r");
        node.send("hello", "b");
        node.set_timer("t", SimDuration::from_secs(1), |n| n.send("tick", "b"));
        node.cancel_timer("t");
        node.shutdown();

        assert_eq!(node.pending_actions(), 4);
        let actions = node.take_actions();
        assert!(matches!(actions[0], NodeAction::Send { .. }));
        assert!(matches!(actions[1], NodeAction::SetTimer { .. }));
        assert!(matches!(actions[2], NodeAction::CancelTimer { .. }));
        assert!(matches!(actions[3], NodeAction::Shutdown));
        assert_eq!(node.pending_actions(), 0);
    }

    #[test]
    fn test_sync_send_mints_unique_tags() {
        let mut node = Node::new("a", "r");
        let h1 = node.sync_send("x", "b", None);
        let h2 = node.sync_send("y", "b", None);

        assert_ne!(h1.tag(), h2.tag());
        assert_eq!(h1.tag().origin, NodeId::from("a"));
        assert_eq!(node.sync_status(&h1), SyncStatus::Waiting);
        assert_eq!(node.take_sync_result(&h1), None);
    }

    #[test]
    fn test_sync_resolution_is_taken_once() {
        let mut node = Node::new("a", "r");
        let handle = node.sync_send("x", "b", Some(SimDuration::from_secs(1)));

        node.resolve_sync(handle.tag(), SyncStatus::Acked);
        assert_eq!(node.sync_status(&handle), SyncStatus::Acked);
        assert_eq!(node.take_sync_result(&handle), Some(true));
        assert_eq!(node.take_sync_result(&handle), None);
    }

    #[test]
    fn test_acknowledge_only_tagged_data() {
        let mut node = Node::new("b", "r");
        let tag = DeliveryTag { origin: "a".into(), seq: 0 };
        let tagged = Message::data(1, "a".into(), "b".into(), "x".into(), SimTime::ZERO, Some(tag.clone()));
        let plain = message(2, "a", "b", "y");
        let ack = Message::ack(3, "a".into(), tag, SimTime::ZERO);

        node.acknowledge(&plain);
        node.acknowledge(&ack);
        assert_eq!(node.pending_actions(), 0);

        node.acknowledge(&tagged);
        assert!(matches!(node.take_actions()[0], NodeAction::Ack { .. }));
    }
}
