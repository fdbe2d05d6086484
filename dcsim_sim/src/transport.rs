//! Network transport: turns a send into one delivery event or a counted drop.
//!
//! Per message, in order:
//! 1. partition check (dropped_partition)
//! 2. sender/target shutdown check (dropped_fault)
//! 3. packet loss (dropped_loss)
//! 4. latency: base + rack switching + serialization, plus jitter, clamped at zero
//! 5. sync model bound: excess is clamped and counted as a violation
//! 6. reordering: extra hold-back delay
//! 7. per-target FIFO: a message that was not reordered never fires before
//!    the previous in-order message to the same target
//! 8. schedule the delivery at `now + delay`
//!
//! Ack messages take the same path but are counted under `acks_*`.

use crate::clock::{Clock, EventKind};
use crate::context::SimContext;
use dcsim_core::{ConfigError, DropReason, MetricsCollector, NetworkConfig};
use dcsim_env::{Message, MessageKind, NodeId, SimDuration, SimTime};
use std::collections::BTreeMap;
use tracing::{debug, trace};

/// Endpoint facts the engine resolves before handing a message over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LinkEnds {
    pub sender_down: bool,

    /// Target shut down, or not part of the topology
    pub target_down: bool,

    pub same_rack: bool,
}

/// Outcome of a single send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportDecision {
    Scheduled {
        delay: SimDuration,
        fire_time: SimTime,
        violation: bool,
        reordered: bool,
    },
    DroppedPartition,
    DroppedFault,
    DroppedLoss,
}

impl TransportDecision {
    pub fn label(&self) -> &'static str {
        match self {
            TransportDecision::Scheduled { .. } => "scheduled",
            TransportDecision::DroppedPartition => "dropped_partition",
            TransportDecision::DroppedFault => "dropped_fault",
            TransportDecision::DroppedLoss => "dropped_loss",
        }
    }

    pub fn drop_reason(&self) -> Option<DropReason> {
        match self {
            TransportDecision::Scheduled { .. } => None,
            TransportDecision::DroppedPartition => Some(DropReason::Partition),
            TransportDecision::DroppedFault => Some(DropReason::Fault),
            TransportDecision::DroppedLoss => Some(DropReason::Loss),
        }
    }
}

/// Active partitions between node groups.
#[derive(Debug, Clone, Default)]
pub struct PartitionTable {
    active: BTreeMap<u64, (Vec<NodeId>, Vec<NodeId>)>,
    next_id: u64,
}

impl PartitionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cuts `group_a` off from `group_b` and returns the partition id.
    pub fn create(&mut self, group_a: Vec<NodeId>, group_b: Vec<NodeId>) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.active.insert(id, (group_a, group_b));
        id
    }

    /// Removes one partition. Returns false if it was already healed.
    pub fn heal(&mut self, id: u64) -> bool {
        self.active.remove(&id).is_some()
    }

    /// Heals every partition, returning how many were active.
    pub fn heal_all(&mut self) -> usize {
        let healed = self.active.len();
        self.active.clear();
        healed
    }

    /// True if some active partition puts `from` and `to` on opposite sides.
    pub fn separates(&self, from: &NodeId, to: &NodeId) -> bool {
        self.active.values().any(|(a, b)| {
            (a.contains(from) && b.contains(to)) || (b.contains(from) && a.contains(to))
        })
    }

    pub fn len(&self) -> usize {
        self.active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }
}

/// Delay and drop model for every message in the run.
#[derive(Debug, Clone)]
pub struct Transport {
    config: NetworkConfig,
    partitions: PartitionTable,

    /// Latest in-order fire time per target
    last_fire: BTreeMap<NodeId, SimTime>,
}

impl Transport {
    /// Creates a transport after validating `config`.
    pub fn new(config: NetworkConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            partitions: PartitionTable::new(),
            last_fire: BTreeMap::new(),
        })
    }

    pub fn config(&self) -> &NetworkConfig {
        &self.config
    }

    /// Swaps in a new configuration. The old one stays if validation fails.
    pub fn reconfigure(&mut self, config: NetworkConfig) -> Result<(), ConfigError> {
        config.validate()?;
        self.config = config;
        Ok(())
    }

    pub fn partitions(&self) -> &PartitionTable {
        &self.partitions
    }

    pub fn partitions_mut(&mut self) -> &mut PartitionTable {
        &mut self.partitions
    }

    /// Deterministic part of the delay, in seconds.
    pub fn base_delay(&self, size_bytes: usize, same_rack: bool) -> f64 {
        let cfg = &self.config;
        let switching = if same_rack {
            2.0 * cfg.leaf_switch_latency
        } else {
            2.0 * cfg.leaf_switch_latency + cfg.spine_switch_latency + cfg.inter_rack_latency
        };
        let serialization = (size_bytes as f64 * 8.0) / (cfg.bandwidth_mbps * 1_000_000.0);
        cfg.base_latency + switching + serialization
    }

    /// Routes one message.
    ///
    /// Every attempt counts as sent. Drops and violations are recorded in
    /// `metrics`; the delivery itself is recorded by whoever handles the
    /// delivery event.
    pub fn send(
        &mut self,
        message: Message,
        ends: LinkEnds,
        step: u64,
        clock: &mut Clock,
        ctx: &mut SimContext,
        metrics: &mut MetricsCollector,
    ) -> TransportDecision {
        let is_ack = message.kind() == MessageKind::Ack;
        if is_ack {
            metrics.record_ack_send();
        } else {
            metrics.record_send(message.sender());
        }

        let decision = self.decide(&message, ends, step, clock.now(), ctx, metrics);
        match decision {
            TransportDecision::Scheduled { delay, .. } => {
                debug!("{} scheduled in {} (msg #{})", message, delay, message.id());
                clock.schedule_after(delay, EventKind::Delivery(message));
            }
            dropped => {
                if is_ack {
                    metrics.record_ack_drop();
                } else if let Some(reason) = dropped.drop_reason() {
                    metrics.record_drop(reason);
                }
                debug!("{} dropped: {:?}", message, dropped);
            }
        }
        decision
    }

    fn decide(
        &mut self,
        message: &Message,
        ends: LinkEnds,
        step: u64,
        now: SimTime,
        ctx: &mut SimContext,
        metrics: &mut MetricsCollector,
    ) -> TransportDecision {
        let cfg = &self.config;

        if self.partitions.separates(message.sender(), message.target()) {
            return TransportDecision::DroppedPartition;
        }
        if ends.sender_down || ends.target_down {
            return TransportDecision::DroppedFault;
        }
        if ctx.chance(cfg.packet_loss_rate) {
            return TransportDecision::DroppedLoss;
        }

        let mut delay = self.base_delay(message.size_bytes(), ends.same_rack);
        delay = (delay + ctx.jitter(cfg.jitter_range)).max(0.0);

        let mut violation = false;
        if cfg.sync_model.is_bounded_at(step, cfg.stabilization_step) && delay > cfg.sync_bound {
            trace!(
                "Sync violation: {:.6}s exceeds bound {:.6}s",
                delay,
                cfg.sync_bound
            );
            metrics.record_sync_violation();
            violation = true;
            delay = cfg.sync_bound;
        }

        let mut reordered = false;
        if ctx.chance(cfg.reorder_probability) {
            let (low, high) = cfg.reorder_delay_range;
            delay += ctx.uniform(low, high);
            metrics.record_reorder();
            reordered = true;
        }

        let mut fire_time = now + SimDuration::from_secs_f64(delay);
        if !reordered {
            let last = self.last_fire.entry(message.target().clone()).or_default();
            if *last > fire_time {
                trace!("{} held behind earlier delivery at {}", message, *last);
                fire_time = *last;
            }
            *last = fire_time;
        }

        TransportDecision::Scheduled {
            delay: fire_time.duration_since(now).unwrap_or_default(),
            fire_time,
            violation,
            reordered,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dcsim_core::SyncModel;
    use dcsim_env::{DeliveryTag, Payload};

    fn msg(from: &str, to: &str) -> Message {
        Message::data(0, from.into(), to.into(), Payload::from("x"), SimTime::ZERO, None)
    }

    fn route(transport: &mut Transport, ends: LinkEnds) -> (TransportDecision, MetricsCollector, Clock) {
        let mut clock = Clock::new();
        let mut ctx = SimContext::new(1);
        let mut metrics = MetricsCollector::new();
        let decision = transport.send(msg("a", "b"), ends, 0, &mut clock, &mut ctx, &mut metrics);
        (decision, metrics, clock)
    }

    #[test]
    fn test_ideal_network_schedules_fixed_delay() {
        let mut transport = Transport::new(NetworkConfig::ideal(0.5)).unwrap();
        let (decision, metrics, clock) = route(&mut transport, LinkEnds::default());

        match decision {
            TransportDecision::Scheduled { delay, fire_time, violation, .. } => {
                // 1 byte at 1000 Mbps rounds away at microsecond resolution.
                assert_eq!(delay, SimDuration::from_millis(500));
                assert_eq!(fire_time, SimTime::from_secs_f64(0.5));
                assert!(!violation);
            }
            other => panic!("expected delivery, got {:?}", other),
        }
        assert_eq!(clock.pending(), 1);
        assert_eq!(metrics.counters().sent, 1);
    }

    #[test]
    fn test_rack_aware_latency() {
        let transport = Transport::new(NetworkConfig::default()).unwrap();
        let same = transport.base_delay(0, true);
        let cross = transport.base_delay(0, false);

        assert!((same - 0.502).abs() < 1e-12);
        assert!((cross - 0.604).abs() < 1e-12);

        // 125_000 bytes at 1000 Mbps is one millisecond on the wire.
        let big = transport.base_delay(125_000, true);
        assert!((big - same - 0.001).abs() < 1e-12);
    }

    #[test]
    fn test_shutdown_endpoint_is_fault_drop() {
        let mut transport = Transport::new(NetworkConfig::ideal(0.1)).unwrap();
        let ends = LinkEnds {
            target_down: true,
            ..Default::default()
        };
        let (decision, metrics, clock) = route(&mut transport, ends);

        assert_eq!(decision, TransportDecision::DroppedFault);
        assert_eq!(metrics.counters().dropped_fault, 1);
        assert_eq!(metrics.counters().dropped_loss, 0);
        assert_eq!(clock.pending(), 0);
    }

    #[test]
    fn test_total_loss() {
        let config = NetworkConfig {
            packet_loss_rate: 1.0,
            ..NetworkConfig::ideal(0.1)
        };
        let mut transport = Transport::new(config).unwrap();
        let (decision, metrics, _) = route(&mut transport, LinkEnds::default());

        assert_eq!(decision, TransportDecision::DroppedLoss);
        assert_eq!(metrics.counters().dropped_loss, 1);
    }

    #[test]
    fn test_partition_checked_first() {
        let mut transport = Transport::new(NetworkConfig::ideal(0.1)).unwrap();
        transport
            .partitions_mut()
            .create(vec![NodeId::from("a")], vec![NodeId::from("b")]);

        let ends = LinkEnds {
            sender_down: true,
            ..Default::default()
        };
        let (decision, metrics, _) = route(&mut transport, ends);
        assert_eq!(decision, TransportDecision::DroppedPartition);
        assert_eq!(metrics.counters().dropped_partition, 1);
    }

    #[test]
    fn test_synchronous_bound_clamps_and_counts() {
        let config = NetworkConfig {
            sync_model: SyncModel::Synchronous,
            sync_bound: 1.0,
            ..NetworkConfig::ideal(3.0)
        };
        let mut transport = Transport::new(config).unwrap();
        let (decision, metrics, _) = route(&mut transport, LinkEnds::default());

        match decision {
            TransportDecision::Scheduled { delay, violation, .. } => {
                assert_eq!(delay, SimDuration::from_secs(1));
                assert!(violation);
            }
            other => panic!("expected delivery, got {:?}", other),
        }
        assert_eq!(metrics.counters().sync_violations, 1);
    }

    #[test]
    fn test_partial_sync_unbounded_before_stabilization() {
        let config = NetworkConfig {
            sync_model: SyncModel::PartialSynchronous,
            sync_bound: 1.0,
            stabilization_step: 5,
            ..NetworkConfig::ideal(3.0)
        };
        let mut transport = Transport::new(config).unwrap();
        let mut clock = Clock::new();
        let mut ctx = SimContext::new(1);
        let mut metrics = MetricsCollector::new();

        let early = transport.send(msg("a", "b"), LinkEnds::default(), 4, &mut clock, &mut ctx, &mut metrics);
        let late = transport.send(msg("a", "b"), LinkEnds::default(), 5, &mut clock, &mut ctx, &mut metrics);

        assert!(matches!(early, TransportDecision::Scheduled { violation: false, .. }));
        assert!(matches!(late, TransportDecision::Scheduled { violation: true, .. }));
        assert_eq!(metrics.counters().sync_violations, 1);
    }

    #[test]
    fn test_reorder_adds_delay() {
        let config = NetworkConfig {
            reorder_probability: 1.0,
            reorder_delay_range: (0.2, 0.2),
            ..NetworkConfig::ideal(0.1)
        };
        let mut transport = Transport::new(config).unwrap();
        let (decision, metrics, _) = route(&mut transport, LinkEnds::default());

        match decision {
            TransportDecision::Scheduled { delay, reordered, .. } => {
                assert_eq!(delay, SimDuration::from_millis(300));
                assert!(reordered);
            }
            other => panic!("expected delivery, got {:?}", other),
        }
        assert_eq!(metrics.counters().reordered, 1);
    }

    fn sized(from: &str, to: &str, bytes: usize) -> Message {
        let body = "x".repeat(bytes);
        Message::data(0, from.into(), to.into(), Payload::from(body.as_str()), SimTime::ZERO, None)
    }

    fn fire_times(decisions: &[TransportDecision]) -> Vec<SimTime> {
        decisions
            .iter()
            .map(|d| match d {
                TransportDecision::Scheduled { fire_time, .. } => *fire_time,
                other => panic!("expected delivery, got {:?}", other),
            })
            .collect()
    }

    #[test]
    fn test_jitter_keeps_send_order_per_target() {
        let config = NetworkConfig {
            jitter_range: 0.1,
            ..NetworkConfig::ideal(0.5)
        };
        let mut transport = Transport::new(config).unwrap();
        let mut clock = Clock::new();
        let mut ctx = SimContext::new(3);
        let mut metrics = MetricsCollector::new();

        let decisions: Vec<TransportDecision> = (0..50)
            .map(|_| {
                transport.send(msg("a", "b"), LinkEnds::default(), 0, &mut clock, &mut ctx, &mut metrics)
            })
            .collect();

        let times = fire_times(&decisions);
        assert!(times.windows(2).all(|w| w[0] <= w[1]), "{:?}", times);
        assert_eq!(clock.pending(), 50);
    }

    #[test]
    fn test_small_message_waits_behind_large_one() {
        let mut transport = Transport::new(NetworkConfig::ideal(0.1)).unwrap();
        let mut clock = Clock::new();
        let mut ctx = SimContext::new(1);
        let mut metrics = MetricsCollector::new();

        // 200 KB at 1000 Mbps is 1.6 ms on the wire.
        let big = transport.send(sized("a", "b", 200_000), LinkEnds::default(), 0, &mut clock, &mut ctx, &mut metrics);
        let small = transport.send(sized("a", "b", 1), LinkEnds::default(), 0, &mut clock, &mut ctx, &mut metrics);
        let other = transport.send(sized("a", "c", 1), LinkEnds::default(), 0, &mut clock, &mut ctx, &mut metrics);

        let times = fire_times(&[big, small, other]);
        assert_eq!(times[0], SimTime::from_micros(101_600));
        assert_eq!(times[1], times[0]);
        // Other targets are unaffected.
        assert_eq!(times[2], SimTime::from_micros(100_000));
    }

    #[test]
    fn test_reordered_message_skips_fifo() {
        let config = NetworkConfig {
            reorder_probability: 1.0,
            reorder_delay_range: (0.5, 0.5),
            ..NetworkConfig::ideal(0.1)
        };
        let mut transport = Transport::new(config).unwrap();
        let mut clock = Clock::new();
        let mut ctx = SimContext::new(1);
        let mut metrics = MetricsCollector::new();

        let held = transport.send(msg("a", "b"), LinkEnds::default(), 0, &mut clock, &mut ctx, &mut metrics);
        transport.reconfigure(NetworkConfig::ideal(0.1)).unwrap();
        let next = transport.send(msg("a", "b"), LinkEnds::default(), 0, &mut clock, &mut ctx, &mut metrics);

        let times = fire_times(&[held, next]);
        assert_eq!(times[0], SimTime::from_micros(600_000));
        assert_eq!(times[1], SimTime::from_micros(100_000));
    }

    #[test]
    fn test_acks_counted_separately() {
        let mut transport = Transport::new(NetworkConfig::ideal(0.1)).unwrap();
        let mut clock = Clock::new();
        let mut ctx = SimContext::new(1);
        let mut metrics = MetricsCollector::new();

        let tag = DeliveryTag {
            origin: NodeId::from("a"),
            seq: 0,
        };
        let ack = Message::ack(1, NodeId::from("b"), tag.clone(), SimTime::ZERO);
        transport.send(ack, LinkEnds::default(), 0, &mut clock, &mut ctx, &mut metrics);
        let lost = Message::ack(2, NodeId::from("b"), tag, SimTime::ZERO);
        let ends = LinkEnds {
            target_down: true,
            ..Default::default()
        };
        transport.send(lost, ends, 0, &mut clock, &mut ctx, &mut metrics);

        let counters = metrics.counters();
        assert_eq!(counters.sent, 0);
        assert_eq!(counters.dropped_fault, 0);
        assert_eq!(counters.acks_sent, 2);
        assert_eq!(counters.acks_dropped, 1);
    }

    #[test]
    fn test_reconfigure_rejects_invalid() {
        let mut transport = Transport::new(NetworkConfig::default()).unwrap();
        let bad = NetworkConfig {
            packet_loss_rate: 2.0,
            ..Default::default()
        };
        assert!(transport.reconfigure(bad).is_err());
        assert_eq!(transport.config().packet_loss_rate, 0.0);
    }

    #[test]
    fn test_partition_table() {
        let mut table = PartitionTable::new();
        let a = NodeId::from("a");
        let b = NodeId::from("b");
        let c = NodeId::from("c");

        let id = table.create(vec![a.clone()], vec![b.clone(), c.clone()]);
        assert!(table.separates(&a, &b));
        assert!(table.separates(&c, &a));
        assert!(!table.separates(&b, &c));

        assert!(table.heal(id));
        assert!(!table.heal(id));
        assert!(!table.separates(&a, &b));
    }
}
