//! Simulation Metrics
//! ==================
//!
//! Accumulates per-message and per-step statistics for one run:
//! - **Latency samples**: one per delivered message, in simulated seconds
//! - **Counters**: sends, deliveries, drops by cause, sync outcomes, faults
//! - **Throughput**: delivered messages and bytes over elapsed simulated time
//!
//! Summaries are derived on demand from the raw samples, so the same
//! sample set always yields the same statistics regardless of the order in
//! which samples were recorded.

use dcsim_env::{NodeId, SimTime};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// =============================================================================
// SUMMARY TYPES
// =============================================================================

/// Statistical summary of latency samples (seconds).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LatencyStats {
    pub count: usize,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub median: f64,
    pub p95: f64,
    pub p99: f64,
}

/// Delivery throughput over the whole run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ThroughputStats {
    pub delivered_messages: u64,
    pub delivered_bytes: u64,
    pub elapsed_secs: f64,
    pub messages_per_second: f64,
    pub bytes_per_second: f64,
}

/// Categorical counters for one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkCounters {
    /// Every data send attempt, including ones dropped before scheduling.
    /// Acks are counted separately under `acks_*`.
    pub sent: u64,
    pub delivered: u64,

    /// Lost to random packet loss
    pub dropped_loss: u64,

    /// Sender or target shut down (or target unknown)
    pub dropped_fault: u64,

    /// Endpoints on opposite sides of a partition
    pub dropped_partition: u64,

    /// Deliveries whose computed delay exceeded the synchronous bound
    pub sync_violations: u64,

    pub sync_acks: u64,
    pub sync_timeouts: u64,

    /// Ack messages on the wire. Excluded from `sent`, `delivered`, the drop
    /// counters, latency samples and throughput.
    pub acks_sent: u64,
    pub acks_delivered: u64,
    pub acks_dropped: u64,

    /// Messages held back by the reordering model
    pub reordered: u64,

    pub node_failures: u64,
    pub node_recoveries: u64,
    pub partition_events: u64,

    pub timers_fired: u64,

    /// Timers whose owner was shut down when they fired
    pub timers_discarded: u64,

    /// Plugin errors and panics caught at the step boundary
    pub algorithm_errors: u64,
}

impl NetworkCounters {
    /// Total drops of any cause.
    pub fn dropped(&self) -> u64 {
        self.dropped_loss + self.dropped_fault + self.dropped_partition
    }
}

/// Per-node message counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeStats {
    pub sent: u64,
    pub received: u64,
}

/// Why a message never reached its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DropReason {
    Loss,
    Fault,
    Partition,
}

/// Point-in-time view of all metrics, for export layers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub elapsed_secs: f64,
    pub latency: LatencyStats,
    pub throughput: ThroughputStats,
    pub counters: NetworkCounters,

    /// Delivered over sent (0 when nothing was sent)
    pub delivery_rate: f64,

    pub node_stats: BTreeMap<NodeId, NodeStats>,
}

// =============================================================================
// STATISTICS
// =============================================================================

/// Nearest-rank percentile over an ascending sample slice.
///
/// Rank is `ceil(pct / 100 * n)`, clamped to `[1, n]`. Returns 0 for an
/// empty slice.
pub fn nearest_rank(sorted: &[f64], pct: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let n = sorted.len();
    let rank = ((pct / 100.0) * n as f64).ceil() as usize;
    sorted[rank.clamp(1, n) - 1]
}

/// Computes min/max/mean/median/P95/P99 over unordered samples.
pub fn latency_stats(samples: &[f64]) -> LatencyStats {
    if samples.is_empty() {
        return LatencyStats::default();
    }

    let mut sorted = samples.to_vec();
    sorted.sort_by(f64::total_cmp);

    let n = sorted.len();
    // Summing the sorted copy keeps the mean independent of insertion order.
    let mean = sorted.iter().sum::<f64>() / n as f64;
    let median = if n % 2 == 1 {
        sorted[n / 2]
    } else {
        (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
    };

    LatencyStats {
        count: n,
        min: sorted[0],
        max: sorted[n - 1],
        mean,
        median,
        p95: nearest_rank(&sorted, 95.0),
        p99: nearest_rank(&sorted, 99.0),
    }
}

// =============================================================================
// COLLECTOR
// =============================================================================

/// Running metrics for a single simulation run.
#[derive(Debug, Clone, Default)]
pub struct MetricsCollector {
    counters: NetworkCounters,
    latency_samples: Vec<f64>,
    delivered_bytes: u64,
    node_stats: BTreeMap<NodeId, NodeStats>,
    start: SimTime,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clears everything. Called at run start.
    pub fn reset(&mut self, start: SimTime) {
        *self = Self {
            start,
            ..Self::default()
        };
    }

    pub fn counters(&self) -> &NetworkCounters {
        &self.counters
    }

    pub fn latency_samples(&self) -> &[f64] {
        &self.latency_samples
    }

    pub fn node_stats(&self, node: &NodeId) -> NodeStats {
        self.node_stats.get(node).copied().unwrap_or_default()
    }

    pub fn record_send(&mut self, from: &NodeId) {
        self.counters.sent += 1;
        self.node_stats.entry(from.clone()).or_default().sent += 1;
    }

    pub fn record_delivery(&mut self, to: &NodeId, latency_secs: f64, size_bytes: usize) {
        self.counters.delivered += 1;
        self.latency_samples.push(latency_secs);
        self.delivered_bytes += size_bytes as u64;
        self.node_stats.entry(to.clone()).or_default().received += 1;
    }

    pub fn record_ack_send(&mut self) {
        self.counters.acks_sent += 1;
    }

    pub fn record_ack_delivery(&mut self) {
        self.counters.acks_delivered += 1;
    }

    pub fn record_ack_drop(&mut self) {
        self.counters.acks_dropped += 1;
    }

    pub fn record_drop(&mut self, reason: DropReason) {
        match reason {
            DropReason::Loss => self.counters.dropped_loss += 1,
            DropReason::Fault => self.counters.dropped_fault += 1,
            DropReason::Partition => self.counters.dropped_partition += 1,
        }
    }

    pub fn record_sync_violation(&mut self) {
        self.counters.sync_violations += 1;
    }

    /// Records a resolved blocking send.
    pub fn record_sync_resolution(&mut self, acked: bool) {
        if acked {
            self.counters.sync_acks += 1;
        } else {
            self.counters.sync_timeouts += 1;
        }
    }

    pub fn record_reorder(&mut self) {
        self.counters.reordered += 1;
    }

    pub fn record_node_failure(&mut self) {
        self.counters.node_failures += 1;
    }

    pub fn record_node_recovery(&mut self) {
        self.counters.node_recoveries += 1;
    }

    pub fn record_partition_event(&mut self) {
        self.counters.partition_events += 1;
    }

    pub fn record_timer(&mut self, fired: bool) {
        if fired {
            self.counters.timers_fired += 1;
        } else {
            self.counters.timers_discarded += 1;
        }
    }

    pub fn record_algorithm_error(&mut self) {
        self.counters.algorithm_errors += 1;
    }

    pub fn latency(&self) -> LatencyStats {
        latency_stats(&self.latency_samples)
    }

    /// Throughput over simulated time elapsed since the run started.
    pub fn throughput(&self, now: SimTime) -> ThroughputStats {
        let elapsed_secs = now
            .duration_since(self.start)
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0);
        let (messages_per_second, bytes_per_second) = if elapsed_secs > 0.0 {
            (
                self.counters.delivered as f64 / elapsed_secs,
                self.delivered_bytes as f64 / elapsed_secs,
            )
        } else {
            (0.0, 0.0)
        };

        ThroughputStats {
            delivered_messages: self.counters.delivered,
            delivered_bytes: self.delivered_bytes,
            elapsed_secs,
            messages_per_second,
            bytes_per_second,
        }
    }

    pub fn snapshot(&self, now: SimTime) -> MetricsSnapshot {
        let throughput = self.throughput(now);
        let delivery_rate = if self.counters.sent > 0 {
            self.counters.delivered as f64 / self.counters.sent as f64
        } else {
            0.0
        };

        MetricsSnapshot {
            elapsed_secs: throughput.elapsed_secs,
            latency: self.latency(),
            throughput,
            counters: self.counters,
            delivery_rate,
            node_stats: self.node_stats.clone(),
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use dcsim_env::SimDuration;
    use proptest::prelude::*;

    #[test]
    fn test_empty_stats() {
        let stats = latency_stats(&[]);
        assert_eq!(stats.count, 0);
        assert_eq!(stats.p99, 0.0);
    }

    #[test]
    fn test_nearest_rank_percentiles() {
        let samples: Vec<f64> = (1..=100).map(|i| i as f64).collect();
        let stats = latency_stats(&samples);

        assert_eq!(stats.min, 1.0);
        assert_eq!(stats.max, 100.0);
        assert_eq!(stats.mean, 50.5);
        assert_eq!(stats.median, 50.5);
        assert_eq!(stats.p95, 95.0);
        assert_eq!(stats.p99, 99.0);
    }

    #[test]
    fn test_small_sample_percentiles() {
        let stats = latency_stats(&[0.3, 0.1, 0.2]);
        assert_eq!(stats.median, 0.2);
        // ceil(0.95 * 3) = 3 -> largest sample
        assert_eq!(stats.p95, 0.3);
        assert_eq!(stats.p99, 0.3);
        assert_eq!(nearest_rank(&[0.1, 0.2, 0.3], 0.0), 0.1);
    }

    #[test]
    fn test_collector_counts() {
        let mut metrics = MetricsCollector::new();
        let a = NodeId::from("a");
        let b = NodeId::from("b");

        metrics.record_send(&a);
        metrics.record_send(&a);
        metrics.record_send(&a);
        metrics.record_delivery(&b, 0.5, 10);
        metrics.record_drop(DropReason::Loss);
        metrics.record_drop(DropReason::Fault);
        metrics.record_sync_resolution(false);

        let counters = metrics.counters();
        assert_eq!(counters.sent, 3);
        assert_eq!(counters.delivered, 1);
        assert_eq!(counters.dropped(), 2);
        assert_eq!(counters.sync_timeouts, 1);
        assert_eq!(metrics.node_stats(&a).sent, 3);
        assert_eq!(metrics.node_stats(&b).received, 1);
    }

    #[test]
    fn test_acks_kept_out_of_data_counters() {
        let mut metrics = MetricsCollector::new();
        metrics.record_send(&NodeId::from("a"));
        metrics.record_delivery(&NodeId::from("b"), 0.5, 10);
        metrics.record_ack_send();
        metrics.record_ack_send();
        metrics.record_ack_delivery();
        metrics.record_ack_drop();

        let snapshot = metrics.snapshot(SimTime::from_secs_f64(1.0));
        assert_eq!(snapshot.counters.sent, 1);
        assert_eq!(snapshot.counters.delivered, 1);
        assert_eq!(snapshot.counters.dropped(), 0);
        assert_eq!(snapshot.counters.acks_sent, 2);
        assert_eq!(snapshot.counters.acks_delivered, 1);
        assert_eq!(snapshot.counters.acks_dropped, 1);
        assert_eq!(snapshot.latency.count, 1);
        assert_eq!(snapshot.delivery_rate, 1.0);
    }

    #[test]
    fn test_throughput_uses_simulated_time() {
        let mut metrics = MetricsCollector::new();
        metrics.reset(SimTime::ZERO);
        let b = NodeId::from("b");
        for _ in 0..10 {
            metrics.record_delivery(&b, 0.1, 100);
        }

        let now = SimTime::ZERO + SimDuration::from_secs(5);
        let throughput = metrics.throughput(now);
        assert_eq!(throughput.messages_per_second, 2.0);
        assert_eq!(throughput.bytes_per_second, 200.0);

        assert_eq!(metrics.throughput(SimTime::ZERO).messages_per_second, 0.0);
    }

    #[test]
    fn test_snapshot_delivery_rate() {
        let mut metrics = MetricsCollector::new();
        let a = NodeId::from("a");
        metrics.record_send(&a);
        metrics.record_send(&a);
        metrics.record_delivery(&a, 0.2, 4);

        let snapshot = metrics.snapshot(SimTime::from_secs_f64(1.0));
        assert_eq!(snapshot.delivery_rate, 0.5);
        assert_eq!(snapshot.latency.count, 1);
        assert!(serde_json::to_string(&snapshot).is_ok());
    }

    #[test]
    fn test_reset_clears_everything() {
        let mut metrics = MetricsCollector::new();
        metrics.record_send(&NodeId::from("a"));
        metrics.record_delivery(&NodeId::from("b"), 1.0, 1);

        metrics.reset(SimTime::from_micros(10));
        assert_eq!(*metrics.counters(), NetworkCounters::default());
        assert!(metrics.latency_samples().is_empty());
    }

    fn original_and_shuffled() -> impl Strategy<Value = (Vec<f64>, Vec<f64>)> {
        proptest::collection::vec(0.0f64..10.0, 1..200)
            .prop_flat_map(|samples| (Just(samples.clone()), Just(samples).prop_shuffle()))
    }

    proptest! {
        #[test]
        fn prop_percentiles_are_order_independent((samples, shuffled) in original_and_shuffled()) {
            prop_assert_eq!(latency_stats(&samples), latency_stats(&shuffled));
        }
    }
}
