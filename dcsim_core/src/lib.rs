//! Datacenter Simulator Core - Run Configuration and Metrics
//!
//! Everything that is fixed for a run or accumulated over it:
//! 1. **Network model**: synchronization discipline, loss, jitter, reordering, rack-aware latency
//! 2. **Fault model**: hardware and power failure rates, scheduled partitions
//! 3. **Metrics**: latency samples, drop counters, throughput and percentile summaries

pub mod config;
pub mod metrics;

// Re-export key types for convenience
pub use config::{AckPolicy, ConfigError, FaultConfig, NetworkConfig, PartitionWindow, SyncModel};
pub use metrics::{
    latency_stats, DropReason, LatencyStats, MetricsCollector, MetricsSnapshot, NetworkCounters,
    NodeStats, ThroughputStats,
};
