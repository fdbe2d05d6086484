//! One-shot timer registrations.
//!
//! The event queue only carries `(node, timer_id, generation)`. The
//! callback lives here, keyed by owner and id. Re-registering an id bumps
//! the generation, so the earlier queue entry finds a mismatch when it
//! fires and is ignored (last write wins).

use dcsim_env::{NodeId, TimerCallback};
use std::collections::BTreeMap;

struct TimerEntry {
    generation: u64,
    callback: TimerCallback,
}

/// Live timers for every node.
#[derive(Default)]
pub struct TimerTable {
    entries: BTreeMap<(NodeId, String), TimerEntry>,
    next_generation: u64,
}

impl TimerTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a timer, replacing any live one with the same id.
    ///
    /// Returns the generation to put on the fire event.
    pub fn set(&mut self, node: &NodeId, timer_id: &str, callback: TimerCallback) -> u64 {
        let generation = self.next_generation;
        self.next_generation += 1;
        self.entries.insert(
            (node.clone(), timer_id.to_string()),
            TimerEntry {
                generation,
                callback,
            },
        );
        generation
    }

    /// Cancels a live timer. Returns false if none was registered.
    pub fn cancel(&mut self, node: &NodeId, timer_id: &str) -> bool {
        self.entries
            .remove(&(node.clone(), timer_id.to_string()))
            .is_some()
    }

    /// Removes and returns the callback if `generation` is still current.
    pub fn take_if_current(
        &mut self,
        node: &NodeId,
        timer_id: &str,
        generation: u64,
    ) -> Option<TimerCallback> {
        let key = (node.clone(), timer_id.to_string());
        match self.entries.get(&key) {
            Some(entry) if entry.generation == generation => {
                self.entries.remove(&key).map(|e| e.callback)
            }
            _ => None,
        }
    }

    pub fn is_set(&self, node: &NodeId, timer_id: &str) -> bool {
        self.entries
            .contains_key(&(node.clone(), timer_id.to_string()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl std::fmt::Debug for TimerTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimerTable")
            .field("live", &self.entries.len())
            .field("next_generation", &self.next_generation)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dcsim_env::Node;

    fn noop() -> TimerCallback {
        Box::new(|_: &mut Node| {})
    }

    #[test]
    fn test_take_current_timer() {
        let mut timers = TimerTable::new();
        let node = NodeId::from("a");

        let generation = timers.set(&node, "t", noop());
        assert!(timers.is_set(&node, "t"));
        assert!(timers.take_if_current(&node, "t", generation).is_some());

        // One-shot: the id is freed after firing.
        assert!(timers.is_empty());
        assert!(timers.take_if_current(&node, "t", generation).is_none());
    }

    #[test]
    fn test_last_write_wins() {
        let mut timers = TimerTable::new();
        let node = NodeId::from("a");

        let first = timers.set(&node, "t", noop());
        let second = timers.set(&node, "t", noop());

        assert!(timers.take_if_current(&node, "t", first).is_none());
        assert!(timers.take_if_current(&node, "t", second).is_some());
    }

    #[test]
    fn test_cancel() {
        let mut timers = TimerTable::new();
        let node = NodeId::from("a");
        let generation = timers.set(&node, "t", noop());

        assert!(timers.cancel(&node, "t"));
        assert!(!timers.cancel(&node, "t"));
        assert!(timers.take_if_current(&node, "t", generation).is_none());
    }

    #[test]
    fn test_ids_are_scoped_per_node() {
        let mut timers = TimerTable::new();
        let a = NodeId::from("a");
        let b = NodeId::from("b");

        let ga = timers.set(&a, "t", noop());
        timers.set(&b, "t", noop());
        assert_eq!(timers.len(), 2);
        assert!(timers.take_if_current(&a, "t", ga).is_some());
        assert!(timers.is_set(&b, "t"));
    }
}
