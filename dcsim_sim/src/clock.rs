//! Simulated clock and deterministic event queue.
//!
//! A `BinaryHeap` with reversed `Ord` on [`Event`] acts as a min-heap keyed
//! by `(fire_time, seq)`. Sequence numbers increase strictly with every
//! schedule call, so events sharing a fire time pop in insertion order.

use crate::error::{SimError, SimResult};
use dcsim_env::{Message, NodeId, SimDuration, SimTime};
use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// A fault-model directive carried by a fault event.
#[derive(Debug, Clone, PartialEq)]
pub enum FaultDirective {
    /// End of a power outage. Ignored if the outage was superseded.
    Recover { node: NodeId, outage: u64 },

    /// Start of a scheduled partition window
    PartitionStart {
        window: usize,
        group_a: Vec<NodeId>,
        group_b: Vec<NodeId>,
    },

    PartitionHeal { window: usize },
}

/// What happens when an event fires.
#[derive(Debug, Clone, PartialEq)]
pub enum EventKind {
    /// A message reaches its target
    Delivery(Message),

    /// A one-shot timer fires; stale generations are ignored
    TimerFire {
        node: NodeId,
        timer_id: String,
        generation: u64,
    },

    /// A node finishes handling one delivery
    ProcessingComplete(NodeId),

    Fault(FaultDirective),
}

impl EventKind {
    pub fn label(&self) -> &'static str {
        match self {
            EventKind::Delivery(_) => "delivery",
            EventKind::TimerFire { .. } => "timer",
            EventKind::ProcessingComplete(_) => "processing_complete",
            EventKind::Fault(_) => "fault",
        }
    }
}

/// A scheduled occurrence, owned by the queue until it fires.
#[derive(Debug, Clone)]
pub struct Event {
    /// Insertion order; breaks ties between equal fire times
    pub seq: u64,

    pub fire_time: SimTime,

    pub kind: EventKind,
}

impl PartialEq for Event {
    fn eq(&self, other: &Self) -> bool {
        self.fire_time == other.fire_time && self.seq == other.seq
    }
}

impl Eq for Event {}

impl Ord for Event {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed: BinaryHeap is a max-heap, we want the earliest event on top.
        other
            .fire_time
            .cmp(&self.fire_time)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for Event {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Monotonic simulated clock plus the queue of future events.
#[derive(Debug, Clone, Default)]
pub struct Clock {
    now: SimTime,
    queue: BinaryHeap<Event>,
    next_seq: u64,
}

impl Clock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current simulated time.
    pub fn now(&self) -> SimTime {
        self.now
    }

    /// Schedules an event at an absolute time.
    ///
    /// Fails if `fire_time` lies before the current time. Returns the
    /// event's sequence number.
    pub fn schedule(&mut self, fire_time: SimTime, kind: EventKind) -> SimResult<u64> {
        if fire_time < self.now {
            return Err(SimError::NonCausalSchedule {
                requested: fire_time,
                now: self.now,
            });
        }
        let seq = self.next_seq;
        self.next_seq += 1;
        self.queue.push(Event { seq, fire_time, kind });
        Ok(seq)
    }

    /// Schedules an event `delay` after now. Never fails.
    pub fn schedule_after(&mut self, delay: SimDuration, kind: EventKind) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.queue.push(Event {
            seq,
            fire_time: self.now + delay,
            kind,
        });
        seq
    }

    /// Pops the next event due at or before `target`, moving the clock to
    /// its fire time.
    ///
    /// Events scheduled while handling a popped event are visible to the
    /// next call, so cascades inside one step stay in time order.
    pub fn pop_due(&mut self, target: SimTime) -> Option<Event> {
        if self.queue.peek()?.fire_time > target {
            return None;
        }
        let event = self.queue.pop()?;
        self.now = self.now.max(event.fire_time);
        Some(event)
    }

    /// Moves the clock forward to `target` without popping anything.
    pub fn finish_advance(&mut self, target: SimTime) {
        self.now = self.now.max(target);
    }

    /// Pops every event with `fire_time <= target` in `(fire_time, seq)`
    /// order and leaves the clock at `target`.
    pub fn advance_to(&mut self, target: SimTime) -> Vec<Event> {
        let mut due = Vec::new();
        while let Some(event) = self.pop_due(target) {
            due.push(event);
        }
        self.finish_advance(target);
        due
    }

    /// Number of events still queued.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Fire time of the next event, if any.
    pub fn peek_time(&self) -> Option<SimTime> {
        self.queue.peek().map(|e| e.fire_time)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(s: f64) -> SimTime {
        SimTime::from_secs_f64(s)
    }

    fn done(node: &str) -> EventKind {
        EventKind::ProcessingComplete(NodeId::from(node))
    }

    #[test]
    fn test_fifo_at_same_time() {
        let mut clock = Clock::new();
        clock.schedule(secs(1.0), done("first")).unwrap();
        clock.schedule(secs(1.0), done("second")).unwrap();
        clock.schedule(secs(1.0), done("third")).unwrap();

        let fired = clock.advance_to(secs(1.0));
        let order: Vec<_> = fired.iter().map(|e| e.kind.clone()).collect();
        assert_eq!(order, vec![done("first"), done("second"), done("third")]);
    }

    #[test]
    fn test_time_ordering() {
        let mut clock = Clock::new();
        clock.schedule(secs(3.0), done("late")).unwrap();
        clock.schedule(secs(1.0), done("early")).unwrap();
        clock.schedule(secs(2.0), done("mid")).unwrap();

        let fired = clock.advance_to(secs(10.0));
        let times: Vec<_> = fired.iter().map(|e| e.fire_time).collect();
        assert_eq!(times, vec![secs(1.0), secs(2.0), secs(3.0)]);
        assert_eq!(clock.now(), secs(10.0));
    }

    #[test]
    fn test_advance_only_pops_due_events() {
        let mut clock = Clock::new();
        clock.schedule(secs(0.5), done("a")).unwrap();
        clock.schedule(secs(1.5), done("b")).unwrap();

        assert_eq!(clock.advance_to(secs(1.0)).len(), 1);
        assert_eq!(clock.pending(), 1);
        assert_eq!(clock.peek_time(), Some(secs(1.5)));
    }

    #[test]
    fn test_schedule_in_past_fails() {
        let mut clock = Clock::new();
        clock.advance_to(secs(2.0));

        let err = clock.schedule(secs(1.0), done("a")).unwrap_err();
        assert!(matches!(err, SimError::NonCausalSchedule { .. }));

        // Scheduling exactly at now is allowed.
        assert!(clock.schedule(secs(2.0), done("a")).is_ok());
    }

    #[test]
    fn test_pop_due_moves_clock_to_event() {
        let mut clock = Clock::new();
        clock.schedule(secs(0.25), done("a")).unwrap();

        let event = clock.pop_due(secs(1.0)).unwrap();
        assert_eq!(event.fire_time, secs(0.25));
        assert_eq!(clock.now(), secs(0.25));

        // An event scheduled mid-advance is still picked up in order.
        clock.schedule_after(SimDuration::from_millis(250), done("b"));
        assert_eq!(clock.pop_due(secs(1.0)).map(|e| e.fire_time), Some(secs(0.5)));
        assert!(clock.pop_due(secs(1.0)).is_none());
    }

    #[test]
    fn test_clock_is_monotonic() {
        let mut clock = Clock::new();
        clock.advance_to(secs(5.0));
        clock.finish_advance(secs(1.0));
        assert_eq!(clock.now(), secs(5.0));
    }
}
