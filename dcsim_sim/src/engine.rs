//! Simulation engine: the single logical ordering point of a run.
//!
//! # Lifecycle
//!
//! ```text
//! SETUP ──start──► RUNNING ◄──resume── PAUSED
//!                    │  └──────pause─────►│
//!                    └─stop / budget──► STOPPED ◄─stop─┘
//! ```
//!
//! # Step order
//!
//! 1. Pop every event due by `now + tick`, in `(fire_time, seq)` order, with
//!    the clock set to each event's fire time while it is applied
//! 2. Set the clock to the step target
//! 3. Sample hardware and power faults
//! 4. Time out blocking sends whose deadline has passed
//! 5. Invoke the algorithm plugin once
//! 6. Apply buffered node actions, in node order
//!
//! Plugin failures are isolated at the step boundary. Engine invariant
//! violations (a non-causal schedule, a duplicate delivery tag) abort the
//! run and leave the engine stopped.

use crate::clock::{Clock, Event, EventKind, FaultDirective};
use crate::config::SimConfig;
use crate::context::SimContext;
use crate::coordinator::{Resolution, SyncCoordinator};
use crate::error::{SimError, SimResult};
use crate::faults::{FaultInjector, FaultStrike, ShutdownCause};
use crate::timers::TimerTable;
use crate::trace::{TraceEntry, TraceEvent};
use crate::transport::{LinkEnds, Transport};

use dcsim_core::{AckPolicy, DropReason, FaultConfig, MetricsCollector, MetricsSnapshot, NetworkConfig};
use dcsim_env::{
    Algorithm, DeliveryTag, EnvError, Message, MessageKind, Node, NodeAction, NodeId, NodeState,
    Payload, SimDuration, SimTime, SyncStatus,
};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use tracing::{debug, error, info, trace, warn};

/// Run-level state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EngineState {
    Setup,
    Running,
    Paused,
    Stopped,
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            EngineState::Setup => "SETUP",
            EngineState::Running => "RUNNING",
            EngineState::Paused => "PAUSED",
            EngineState::Stopped => "STOPPED",
        };
        f.write_str(label)
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "plugin panicked".to_string()
    }
}

/// Drives one simulation run.
pub struct Engine {
    config: SimConfig,
    state: EngineState,
    tick: SimDuration,

    /// Nodes in topology order
    nodes: Vec<Node>,
    index: BTreeMap<NodeId, usize>,

    /// Per-node clock drift factor, same order as `nodes`
    drift: Vec<f64>,

    algorithm: Box<dyn Algorithm>,

    clock: Clock,
    transport: Transport,
    faults: FaultInjector,
    timers: TimerTable,
    coordinator: SyncCoordinator,
    ctx: SimContext,
    metrics: MetricsCollector,

    /// Scheduled partition window -> active partition id
    scheduled_partitions: BTreeMap<usize, u64>,

    step_count: u64,
    next_message_id: u64,
    trace: Vec<TraceEntry>,
}

impl Engine {
    /// Builds nodes from the topology and loads the algorithm.
    ///
    /// Rejects invalid configuration. The engine starts in `SETUP`.
    pub fn new(config: SimConfig, algorithm: Box<dyn Algorithm>) -> SimResult<Self> {
        config.validate()?;

        let transport = Transport::new(config.network.clone())?;
        let faults = FaultInjector::new(config.faults.clone())?;
        let mut ctx = SimContext::new(config.seed);

        let mut nodes = Vec::with_capacity(config.topology.node_count());
        let mut index = BTreeMap::new();
        for (id, rack) in config.topology.nodes() {
            if index.insert(id.clone(), nodes.len()).is_some() {
                return Err(EnvError::duplicate(id).into());
            }
            nodes.push(Node::new(id.clone(), rack));
        }

        let max_drift = config.network.max_clock_drift;
        let drift = nodes
            .iter()
            .map(|_| ctx.uniform(-max_drift, max_drift))
            .collect();

        let mut clock = Clock::new();
        for (window, spec) in config.faults.partition_schedule.iter().enumerate() {
            clock.schedule(
                SimTime::from_secs_f64(spec.at),
                EventKind::Fault(FaultDirective::PartitionStart {
                    window,
                    group_a: spec.group_a.clone(),
                    group_b: spec.group_b.clone(),
                }),
            )?;
            clock.schedule(
                SimTime::from_secs_f64(spec.at + spec.duration),
                EventKind::Fault(FaultDirective::PartitionHeal { window }),
            )?;
        }

        let mut metrics = MetricsCollector::new();
        metrics.reset(SimTime::ZERO);

        info!(
            "Engine ready: {} nodes, algorithm '{}', seed {}, {} model",
            nodes.len(),
            algorithm.name(),
            config.seed,
            config.network.sync_model
        );

        Ok(Self {
            tick: config.tick(),
            config,
            state: EngineState::Setup,
            nodes,
            index,
            drift,
            algorithm,
            clock,
            transport,
            faults,
            timers: TimerTable::new(),
            coordinator: SyncCoordinator::new(),
            ctx,
            metrics,
            scheduled_partitions: BTreeMap::new(),
            step_count: 0,
            next_message_id: 0,
            trace: Vec::new(),
        })
    }

    // ── Lifecycle ─────────────────────────────────────────────────

    pub fn start(&mut self) -> SimResult<()> {
        if self.state != EngineState::Setup {
            return Err(SimError::invalid_state("start", self.state));
        }
        self.state = EngineState::Running;
        info!("Simulation started");
        Ok(())
    }

    pub fn pause(&mut self) -> SimResult<()> {
        if self.state != EngineState::Running {
            return Err(SimError::invalid_state("pause", self.state));
        }
        self.state = EngineState::Paused;
        info!("Simulation paused at {}", self.clock.now());
        Ok(())
    }

    pub fn resume(&mut self) -> SimResult<()> {
        if self.state != EngineState::Paused {
            return Err(SimError::invalid_state("resume", self.state));
        }
        self.state = EngineState::Running;
        info!("Simulation resumed at {}", self.clock.now());
        Ok(())
    }

    /// Stops the run. Stopping twice is a no-op.
    ///
    /// No event is ever half-applied, so every node, the queue and the
    /// metrics stay inspectable afterwards.
    pub fn stop(&mut self) {
        if self.state == EngineState::Stopped {
            return;
        }
        self.state = EngineState::Stopped;
        info!(
            "Simulation stopped at {} after {} steps",
            self.clock.now(),
            self.step_count
        );
    }

    /// Advances the simulation by one tick.
    pub fn step(&mut self) -> SimResult<()> {
        if self.state != EngineState::Running {
            return Err(SimError::invalid_state("step", self.state));
        }

        if let Err(err) = self.advance() {
            error!("Aborting run at step {}: {}", self.step_count, err);
            self.stop();
            return Err(err);
        }

        if self.budget_exhausted() {
            self.stop();
        }
        Ok(())
    }

    /// Runs until the configured step or time budget is reached.
    pub fn run(&mut self) -> SimResult<MetricsSnapshot> {
        if self.config.max_steps.is_none() && self.config.max_time_secs.is_none() {
            return Err(SimError::invalid_state(
                "run without a step or time budget",
                self.state,
            ));
        }
        match self.state {
            EngineState::Setup => self.start()?,
            EngineState::Paused => self.resume()?,
            _ => {}
        }

        while self.state == EngineState::Running {
            if self.budget_exhausted() {
                self.stop();
                break;
            }
            self.step()?;
        }
        Ok(self.snapshot())
    }

    /// Runs `steps` steps, starting the engine if needed. Stops early if
    /// the budget runs out.
    pub fn run_steps(&mut self, steps: u64) -> SimResult<()> {
        if self.state == EngineState::Setup {
            self.start()?;
        }
        for _ in 0..steps {
            if self.state != EngineState::Running {
                break;
            }
            self.step()?;
        }
        Ok(())
    }

    fn budget_exhausted(&self) -> bool {
        let steps_done = self
            .config
            .max_steps
            .map_or(false, |limit| self.step_count >= limit);
        let time_done = self
            .config
            .max_time_secs
            .map_or(false, |limit| self.clock.now() >= SimTime::from_secs_f64(limit));
        steps_done || time_done
    }

    fn advance(&mut self) -> SimResult<()> {
        let target = self.clock.now() + self.tick;
        while let Some(event) = self.clock.pop_due(target) {
            self.apply_event(event)?;
        }
        self.clock.finish_advance(target);

        self.inject_faults();
        self.expire_sync_requests();

        self.sync_node_clocks();
        self.run_algorithm();
        self.flush_actions()?;

        self.step_count += 1;
        Ok(())
    }

    // ── Inspection ────────────────────────────────────────────────

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn now(&self) -> SimTime {
        self.clock.now()
    }

    pub fn step_count(&self) -> u64 {
        self.step_count
    }

    pub fn algorithm_name(&self) -> &str {
        self.algorithm.name()
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn node(&self, id: &NodeId) -> Option<&Node> {
        self.index.get(id).map(|&i| &self.nodes[i])
    }

    /// Mutable access for external drivers. Actions issued here are applied
    /// at the end of the next step, like plugin actions.
    pub fn node_mut(&mut self, id: &NodeId) -> Option<&mut Node> {
        let i = *self.index.get(id)?;
        Some(&mut self.nodes[i])
    }

    pub fn metrics(&self) -> &MetricsCollector {
        &self.metrics
    }

    /// Metrics as of the current simulated time.
    pub fn snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot(self.clock.now())
    }

    /// Recorded trace. Empty unless `record_trace` is set.
    pub fn trace(&self) -> &[TraceEntry] {
        &self.trace
    }

    pub fn pending_events(&self) -> usize {
        self.clock.pending()
    }

    pub fn pending_sync_requests(&self) -> usize {
        self.coordinator.pending_count()
    }

    pub fn active_partitions(&self) -> usize {
        self.transport.partitions().len()
    }

    /// Why a node is down, if it is.
    pub fn shutdown_cause(&self, id: &NodeId) -> Option<ShutdownCause> {
        self.faults.cause(id)
    }

    // ── Control ───────────────────────────────────────────────────

    /// Replaces the network model between steps.
    ///
    /// Messages already in flight keep the delay they were scheduled with.
    pub fn reconfigure_network(&mut self, network: NetworkConfig) -> SimResult<()> {
        self.transport.reconfigure(network.clone())?;
        info!(
            "Network reconfigured: {} model, loss {:.3}, jitter {:.3}s",
            network.sync_model, network.packet_loss_rate, network.jitter_range
        );
        self.config.network = network;
        Ok(())
    }

    /// Replaces fault rates between steps.
    ///
    /// Partition windows are scheduled once at construction; a changed
    /// `partition_schedule` here has no effect on the queue.
    pub fn reconfigure_faults(&mut self, faults: FaultConfig) -> SimResult<()> {
        self.faults.reconfigure(faults.clone())?;
        info!(
            "Faults reconfigured: hw {:.4}, power {:.4}, mttr {:.1}s",
            faults.hw_fault_prob, faults.power_failure_prob, faults.mean_time_to_recovery
        );
        self.config.faults = faults;
        Ok(())
    }

    /// Powers a node off. A manual shutdown is never auto-recovered.
    pub fn shutdown_node(&mut self, id: &NodeId) -> SimResult<()> {
        let idx = self.lookup(id)?;
        self.power_down_manual(idx);
        Ok(())
    }

    /// Powers a node back on, clearing any fault that held it down.
    pub fn restart_node(&mut self, id: &NodeId) -> SimResult<()> {
        let idx = self.lookup(id)?;
        self.faults.clear(id);
        if self.nodes[idx].is_shutdown() {
            self.nodes[idx].power_on();
            info!("Server {} restarted", id);
            self.record(TraceEvent::NodeUp { node: id.clone() });
        }
        Ok(())
    }

    /// Flips a node's power and returns its new state.
    pub fn toggle_node_power(&mut self, id: &NodeId) -> SimResult<NodeState> {
        let idx = self.lookup(id)?;
        if self.nodes[idx].is_shutdown() {
            self.restart_node(id)?;
        } else {
            self.power_down_manual(idx);
        }
        Ok(self.nodes[idx].state())
    }

    /// Cuts `group_a` off from `group_b` until healed.
    pub fn partition(&mut self, group_a: Vec<NodeId>, group_b: Vec<NodeId>) -> SimResult<u64> {
        for id in group_a.iter().chain(&group_b) {
            self.lookup(id)?;
        }
        let id = self.transport.partitions_mut().create(group_a, group_b);
        self.metrics.record_partition_event();
        info!("Network partition {} created", id);
        self.record(TraceEvent::PartitionStarted { id });
        Ok(id)
    }

    /// Heals every active partition, manual or scheduled.
    pub fn heal_partitions(&mut self) -> usize {
        self.scheduled_partitions.clear();
        let healed = self.transport.partitions_mut().heal_all();
        if healed > 0 {
            info!("Healed {} network partition(s)", healed);
        }
        healed
    }

    // ── Internals ─────────────────────────────────────────────────

    fn lookup(&self, id: &NodeId) -> Result<usize, EnvError> {
        self.index.get(id).copied().ok_or_else(|| EnvError::unknown(id))
    }

    fn record(&mut self, event: TraceEvent) {
        if self.config.record_trace {
            self.trace.push(TraceEntry {
                step: self.step_count,
                time: self.clock.now(),
                event,
            });
        }
    }

    fn mint_message_id(&mut self) -> u64 {
        let id = self.next_message_id;
        self.next_message_id += 1;
        id
    }

    fn local_time(now: SimTime, drift: f64) -> f64 {
        let global = now.as_secs_f64();
        global + global * drift
    }

    fn sync_node_clock(&mut self, idx: usize) {
        let now = self.clock.now();
        let local = Self::local_time(now, self.drift[idx]);
        self.nodes[idx].set_clock(now, local);
    }

    fn sync_node_clocks(&mut self) {
        for idx in 0..self.nodes.len() {
            self.sync_node_clock(idx);
        }
    }

    fn apply_event(&mut self, event: Event) -> SimResult<()> {
        trace!("Event #{} ({}) at {}", event.seq, event.kind.label(), event.fire_time);
        match event.kind {
            EventKind::Delivery(message) => self.deliver(message, event.fire_time),
            EventKind::TimerFire {
                node,
                timer_id,
                generation,
            } => self.fire_timer(node, timer_id, generation)?,
            EventKind::ProcessingComplete(node) => {
                if let Some(&idx) = self.index.get(&node) {
                    self.nodes[idx].finish_processing();
                }
            }
            EventKind::Fault(directive) => self.apply_fault(directive),
        }
        Ok(())
    }

    fn deliver(&mut self, message: Message, fire_time: SimTime) {
        let live = self
            .index
            .get(message.target())
            .copied()
            .filter(|&idx| !self.nodes[idx].is_shutdown());
        let idx = match live {
            Some(idx) => idx,
            None => {
                if message.kind() == MessageKind::Ack {
                    self.metrics.record_ack_drop();
                } else {
                    self.metrics.record_drop(DropReason::Fault);
                }
                debug!("{} dropped on arrival: target is down", message);
                self.record(TraceEvent::DroppedOnArrival {
                    message_id: message.id(),
                    to: message.target().clone(),
                });
                return;
            }
        };

        if message.kind() == MessageKind::Ack {
            self.metrics.record_ack_delivery();
        } else {
            let latency = fire_time
                .duration_since(message.created_at())
                .map(|d| d.as_secs_f64())
                .unwrap_or(0.0);
            self.metrics
                .record_delivery(message.target(), latency, message.size_bytes());
        }
        self.record(TraceEvent::Delivered {
            message_id: message.id(),
            to: message.target().clone(),
        });

        match message.kind() {
            MessageKind::Ack => {
                let resolution = message
                    .tag()
                    .and_then(|tag| self.coordinator.acknowledge(tag, fire_time));
                if let Some(resolution) = resolution {
                    self.resolve(resolution);
                }
            }
            MessageKind::Data => {
                let auto_ack = message.requires_ack()
                    && self.transport.config().ack_policy == AckPolicy::Automatic;
                let tag = message.tag().cloned();

                let node_id = self.nodes[idx].id().clone();
                self.nodes[idx].deliver(message);
                self.clock.schedule_after(
                    self.transport.config().processing_delay(),
                    EventKind::ProcessingComplete(node_id),
                );

                if let Some(tag) = tag.filter(|_| auto_ack) {
                    self.send_ack(idx, tag);
                }
            }
        }
    }

    fn fire_timer(&mut self, node: NodeId, timer_id: String, generation: u64) -> SimResult<()> {
        // Cancelled or superseded registrations fall through here.
        let Some(callback) = self.timers.take_if_current(&node, &timer_id, generation) else {
            return Ok(());
        };
        let Some(&idx) = self.index.get(&node) else {
            return Ok(());
        };

        if self.nodes[idx].is_shutdown() {
            self.metrics.record_timer(false);
            debug!("Timer '{}' on {} discarded: node is down", timer_id, node);
            self.record(TraceEvent::TimerDiscarded { node, timer_id });
            return Ok(());
        }

        self.sync_node_clock(idx);
        let target = &mut self.nodes[idx];
        let outcome = panic::catch_unwind(AssertUnwindSafe(move || callback(target)));
        self.metrics.record_timer(true);
        trace!("Timer '{}' fired on {}", timer_id, node);
        self.record(TraceEvent::TimerFired { node, timer_id });

        if let Err(payload) = outcome {
            self.plugin_failed(panic_message(payload.as_ref()));
        }
        self.flush_node(idx)
    }

    fn apply_fault(&mut self, directive: FaultDirective) {
        match directive {
            FaultDirective::Recover { node, outage } => {
                if !self.faults.recovery_allowed(&node, outage) {
                    return;
                }
                self.faults.clear(&node);
                if let Some(&idx) = self.index.get(&node) {
                    self.nodes[idx].power_on();
                    self.metrics.record_node_recovery();
                    info!("Server {} recovered from power failure", node);
                    self.record(TraceEvent::NodeUp { node });
                }
            }
            FaultDirective::PartitionStart {
                window,
                group_a,
                group_b,
            } => {
                let id = self.transport.partitions_mut().create(group_a, group_b);
                self.scheduled_partitions.insert(window, id);
                self.metrics.record_partition_event();
                info!("Scheduled partition {} started", window);
                self.record(TraceEvent::PartitionStarted { id });
            }
            FaultDirective::PartitionHeal { window } => {
                if let Some(id) = self.scheduled_partitions.remove(&window) {
                    self.transport.partitions_mut().heal(id);
                    info!("Scheduled partition {} healed", window);
                    self.record(TraceEvent::PartitionHealed { id });
                }
            }
        }
    }

    fn inject_faults(&mut self) {
        let live: Vec<NodeId> = self
            .nodes
            .iter()
            .filter(|n| !n.is_shutdown())
            .map(|n| n.id().clone())
            .collect();

        for (node, strike) in self.faults.sample(&live, &mut self.ctx) {
            let Some(&idx) = self.index.get(&node) else {
                continue;
            };
            self.nodes[idx].power_off();
            self.metrics.record_node_failure();

            let cause = match strike {
                FaultStrike::Hardware => {
                    warn!("Hardware fault on {}", node);
                    "hardware"
                }
                FaultStrike::Power { outage, duration } => {
                    warn!("Power failure on {} for {}", node, duration);
                    self.clock.schedule_after(
                        duration,
                        EventKind::Fault(FaultDirective::Recover {
                            node: node.clone(),
                            outage,
                        }),
                    );
                    "power"
                }
            };
            self.record(TraceEvent::NodeDown {
                node,
                cause: cause.to_string(),
            });
        }
    }

    fn power_down_manual(&mut self, idx: usize) {
        let id = self.nodes[idx].id().clone();
        // Re-marking a dead node supersedes any pending power recovery.
        self.faults.mark_down(&id, ShutdownCause::Manual);
        if !self.nodes[idx].is_shutdown() {
            self.nodes[idx].power_off();
            info!("Server {} shut down", id);
            self.record(TraceEvent::NodeDown {
                node: id,
                cause: "manual".to_string(),
            });
        }
    }

    fn expire_sync_requests(&mut self) {
        for resolution in self.coordinator.expire(self.clock.now()) {
            self.resolve(resolution);
        }
    }

    fn resolve(&mut self, resolution: Resolution) {
        let acked = resolution.status == SyncStatus::Acked;
        self.metrics.record_sync_resolution(acked);
        debug!("Blocking send {} resolved {}", resolution.tag, resolution.status);

        if let Some(&idx) = self.index.get(&resolution.tag.origin) {
            self.nodes[idx].resolve_sync(&resolution.tag, resolution.status);
        }
        self.record(TraceEvent::SyncResolved {
            origin: resolution.tag.origin,
            seq: resolution.tag.seq,
            status: resolution.status,
        });
    }

    fn run_algorithm(&mut self) {
        let step = self.step_count;
        let algorithm = &mut self.algorithm;
        let nodes = &mut self.nodes;
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| algorithm.run(&mut nodes[..], step)));

        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(err)) => self.plugin_failed(err.to_string()),
            Err(payload) => self.plugin_failed(panic_message(payload.as_ref())),
        }
    }

    fn plugin_failed(&mut self, message: String) {
        warn!(
            "Algorithm '{}' failed at step {}: {}",
            self.algorithm.name(),
            self.step_count,
            message
        );
        self.metrics.record_algorithm_error();
        self.record(TraceEvent::AlgorithmError { message });
    }

    fn flush_actions(&mut self) -> SimResult<()> {
        for idx in 0..self.nodes.len() {
            self.flush_node(idx)?;
        }
        Ok(())
    }

    fn flush_node(&mut self, idx: usize) -> SimResult<()> {
        for action in self.nodes[idx].take_actions() {
            self.apply_action(idx, action)?;
        }
        Ok(())
    }

    fn apply_action(&mut self, idx: usize, action: NodeAction) -> SimResult<()> {
        match action {
            NodeAction::Send { target, payload } => {
                self.send_data(idx, target, payload, None);
            }
            NodeAction::SyncSend {
                target,
                payload,
                tag,
                timeout,
            } => {
                let now = self.clock.now();
                let timeout = timeout.unwrap_or_else(|| self.transport.config().sync_timeout());
                self.coordinator
                    .register(tag.clone(), target.clone(), now, now + timeout)?;
                self.send_data(idx, target, payload, Some(tag));
            }
            NodeAction::Ack { tag } => {
                if self.transport.config().ack_policy == AckPolicy::Manual {
                    self.send_ack(idx, tag);
                } else {
                    trace!("Ignoring explicit ack for {}: acks are automatic", tag);
                }
            }
            NodeAction::SetTimer {
                timer_id,
                delay,
                callback,
            } => {
                let node = self.nodes[idx].id().clone();
                let generation = self.timers.set(&node, &timer_id, callback);
                self.clock.schedule_after(
                    delay,
                    EventKind::TimerFire {
                        node,
                        timer_id,
                        generation,
                    },
                );
            }
            NodeAction::CancelTimer { timer_id } => {
                let node = self.nodes[idx].id().clone();
                self.timers.cancel(&node, &timer_id);
            }
            NodeAction::Shutdown => self.power_down_manual(idx),
        }
        Ok(())
    }

    fn send_data(&mut self, idx: usize, target: NodeId, payload: Payload, tag: Option<DeliveryTag>) {
        let id = self.mint_message_id();
        let sender = self.nodes[idx].id().clone();
        let message = Message::data(id, sender, target, payload, self.clock.now(), tag);
        self.route(idx, message);
    }

    fn send_ack(&mut self, idx: usize, tag: DeliveryTag) {
        let id = self.mint_message_id();
        let sender = self.nodes[idx].id().clone();
        let message = Message::ack(id, sender, tag, self.clock.now());
        self.route(idx, message);
    }

    fn route(&mut self, idx: usize, message: Message) {
        let sender = &self.nodes[idx];
        let ends = match self.index.get(message.target()) {
            Some(&t) => LinkEnds {
                sender_down: sender.is_shutdown(),
                target_down: self.nodes[t].is_shutdown(),
                same_rack: self.nodes[t].rack_id() == sender.rack_id(),
            },
            None => {
                warn!("{} sent to unknown node {}", sender.id(), message.target());
                LinkEnds {
                    sender_down: sender.is_shutdown(),
                    target_down: true,
                    same_rack: false,
                }
            }
        };

        let message_id = message.id();
        let from = message.sender().clone();
        let to = message.target().clone();
        let decision = self.transport.send(
            message,
            ends,
            self.step_count,
            &mut self.clock,
            &mut self.ctx,
            &mut self.metrics,
        );
        self.record(TraceEvent::Sent {
            message_id,
            from,
            to,
            outcome: decision.label().to_string(),
        });
    }
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("state", &self.state)
            .field("now", &self.clock.now())
            .field("step_count", &self.step_count)
            .field("nodes", &self.nodes.len())
            .field("algorithm", &self.algorithm.name())
            .field("pending_events", &self.clock.pending())
            .finish()
    }
}
