//! Common types for the simulator's node model.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Add;

const MICROS_PER_SEC: f64 = 1_000_000.0;

fn secs_to_micros(secs: f64) -> u64 {
    if !secs.is_finite() || secs <= 0.0 {
        return 0;
    }
    (secs * MICROS_PER_SEC).round() as u64
}

/// A point in simulated time, in microseconds since simulation start.
///
/// Simulated time has no relation to the wall clock. It only moves when
/// the engine advances it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SimTime(u64);

impl SimTime {
    /// Simulation start.
    pub const ZERO: SimTime = SimTime(0);

    /// Creates a time from raw microseconds.
    pub fn from_micros(micros: u64) -> Self {
        Self(micros)
    }

    /// Creates a time from seconds, rounding to the nearest microsecond.
    ///
    /// Negative and non-finite inputs map to `ZERO`.
    pub fn from_secs_f64(secs: f64) -> Self {
        Self(secs_to_micros(secs))
    }

    /// Returns the raw microsecond value.
    pub fn as_micros(self) -> u64 {
        self.0
    }

    /// Returns the time in seconds.
    pub fn as_secs_f64(self) -> f64 {
        self.0 as f64 / MICROS_PER_SEC
    }

    /// Adds a duration, saturating at the far end of time.
    pub fn saturating_add(self, delay: SimDuration) -> SimTime {
        SimTime(self.0.saturating_add(delay.0))
    }

    /// Returns the duration elapsed since `earlier`, or `None` if `earlier` is later.
    pub fn duration_since(self, earlier: SimTime) -> Option<SimDuration> {
        self.0.checked_sub(earlier.0).map(SimDuration)
    }
}

impl Add<SimDuration> for SimTime {
    type Output = SimTime;

    fn add(self, rhs: SimDuration) -> SimTime {
        self.saturating_add(rhs)
    }
}

impl fmt::Display for SimTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.6}s", self.as_secs_f64())
    }
}

/// A span of simulated time, in microseconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SimDuration(u64);

impl SimDuration {
    pub const ZERO: SimDuration = SimDuration(0);

    pub fn from_micros(micros: u64) -> Self {
        Self(micros)
    }

    pub fn from_millis(millis: u64) -> Self {
        Self(millis.saturating_mul(1_000))
    }

    pub fn from_secs(secs: u64) -> Self {
        Self(secs.saturating_mul(1_000_000))
    }

    /// Creates a duration from seconds, rounding to the nearest microsecond.
    ///
    /// Negative and non-finite inputs map to `ZERO`.
    pub fn from_secs_f64(secs: f64) -> Self {
        Self(secs_to_micros(secs))
    }

    pub fn as_micros(self) -> u64 {
        self.0
    }

    pub fn as_secs_f64(self) -> f64 {
        self.0 as f64 / MICROS_PER_SEC
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for SimDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.6}s", self.as_secs_f64())
    }
}

/// Unique identifier for a simulated server node.
///
/// Datacenter nodes are named by location, e.g. `R1-S3` for the third
/// server in rack one.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    /// Creates a NodeId from any string-like value.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for NodeId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&NodeId> for NodeId {
    fn from(id: &NodeId) -> Self {
        id.clone()
    }
}

/// Lifecycle state of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NodeState {
    /// Powered on with no outstanding deliveries.
    Idle,

    /// Handling at least one recently delivered message.
    Processing,

    /// Powered off by a fault or an explicit shutdown.
    Shutdown,
}

impl fmt::Display for NodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            NodeState::Idle => "IDLE",
            NodeState::Processing => "PROCESSING",
            NodeState::Shutdown => "SHUTDOWN",
        };
        f.write_str(label)
    }
}

/// Message body. Opaque to the engine except for its size.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Payload {
    Text(String),
    Bytes(Vec<u8>),
    Json(serde_json::Value),
}

impl Payload {
    /// Size on the wire, used for serialization delay and throughput.
    pub fn size_bytes(&self) -> usize {
        match self {
            Payload::Text(text) => text.len(),
            Payload::Bytes(bytes) => bytes.len(),
            Payload::Json(value) => serde_json::to_vec(value).map(|b| b.len()).unwrap_or(0),
        }
    }

    /// Returns the text if this is a text payload.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Payload::Text(text) => Some(text),
            _ => None,
        }
    }
}

impl fmt::Display for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Payload::Text(text) => f.write_str(text),
            Payload::Bytes(bytes) => write!(f, "<{} bytes>", bytes.len()),
            Payload::Json(value) => write!(f, "{}", value),
        }
    }
}

impl From<&str> for Payload {
    fn from(text: &str) -> Self {
        Payload::Text(text.to_string())
    }
}

impl From<String> for Payload {
    fn from(text: String) -> Self {
        Payload::Text(text)
    }
}

impl From<Vec<u8>> for Payload {
    fn from(bytes: Vec<u8>) -> Self {
        Payload::Bytes(bytes)
    }
}

impl From<serde_json::Value> for Payload {
    fn from(value: serde_json::Value) -> Self {
        Payload::Json(value)
    }
}

/// Correlates a blocking send with its acknowledgment.
///
/// Tags are minted by the originating node from a private counter, so
/// `(origin, seq)` is unique for the whole run.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DeliveryTag {
    pub origin: NodeId,
    pub seq: u64,
}

impl fmt::Display for DeliveryTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.origin, self.seq)
    }
}

/// Resolution state of a blocking send.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SyncStatus {
    Waiting,
    Acked,
    TimedOut,
}

impl SyncStatus {
    /// Returns the boolean outcome once resolved.
    pub fn outcome(self) -> Option<bool> {
        match self {
            SyncStatus::Waiting => None,
            SyncStatus::Acked => Some(true),
            SyncStatus::TimedOut => Some(false),
        }
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SyncStatus::Waiting => "WAITING",
            SyncStatus::Acked => "ACKED",
            SyncStatus::TimedOut => "TIMED_OUT",
        };
        f.write_str(label)
    }
}

/// What a message carries at the transport level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    /// Algorithm traffic. Delivered to the target's inbox.
    Data,

    /// Acknowledgment for a tagged message. Consumed by the engine.
    Ack,
}

/// A message in flight or sitting in an inbox.
///
/// Messages are created by the engine when it flushes a node's sends and
/// are immutable afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    id: u64,
    sender: NodeId,
    target: NodeId,
    payload: Payload,
    created_at: SimTime,
    tag: Option<DeliveryTag>,
    kind: MessageKind,
}

impl Message {
    /// Creates a data message. A tag marks it as a blocking send that wants an ack.
    pub fn data(
        id: u64,
        sender: NodeId,
        target: NodeId,
        payload: Payload,
        created_at: SimTime,
        tag: Option<DeliveryTag>,
    ) -> Self {
        Self {
            id,
            sender,
            target,
            payload,
            created_at,
            tag,
            kind: MessageKind::Data,
        }
    }

    /// Creates an acknowledgment for `tag`, sent from `sender` back to the tag's origin.
    pub fn ack(id: u64, sender: NodeId, tag: DeliveryTag, created_at: SimTime) -> Self {
        Self {
            id,
            sender,
            target: tag.origin.clone(),
            payload: Payload::Text(format!("ACK {}", tag)),
            created_at,
            tag: Some(tag),
            kind: MessageKind::Ack,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn sender(&self) -> &NodeId {
        &self.sender
    }

    pub fn target(&self) -> &NodeId {
        &self.target
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    /// Simulated time at which the message was handed to the transport.
    pub fn created_at(&self) -> SimTime {
        self.created_at
    }

    pub fn tag(&self) -> Option<&DeliveryTag> {
        self.tag.as_ref()
    }

    pub fn kind(&self) -> MessageKind {
        self.kind
    }

    /// True for data messages issued by a blocking send.
    pub fn requires_ack(&self) -> bool {
        self.kind == MessageKind::Data && self.tag.is_some()
    }

    pub fn size_bytes(&self) -> usize {
        self.payload.size_bytes()
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}: {}", self.sender, self.target, self.payload)
    }
}
