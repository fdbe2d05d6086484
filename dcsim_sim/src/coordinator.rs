//! Pending-request coordinator for blocking sends.
//!
//! A blocking send cannot suspend plugin code mid-step. Instead it registers
//! a request here with a deadline of `issued_at + timeout`, and the request
//! is resolved in a later step:
//! - `ACKED` when the matching acknowledgment's delivery fires at or before
//!   the deadline
//! - `TIMED_OUT` once simulated time passes the deadline without one
//!
//! The outcome is therefore visible to the plugin one step after the call at
//! the earliest. That is the one semantic difference from a literal
//! blocking call.

use crate::error::{SimError, SimResult};
use dcsim_env::{DeliveryTag, EnvError, NodeId, SimTime, SyncStatus};
use std::collections::BTreeMap;

/// An outstanding blocking send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingSyncRequest {
    pub tag: DeliveryTag,
    pub target: NodeId,
    pub issued_at: SimTime,
    pub deadline: SimTime,
    pub status: SyncStatus,
}

impl PendingSyncRequest {
    /// Node that issued the send.
    pub fn origin(&self) -> &NodeId {
        &self.tag.origin
    }
}

/// A request that just left the `WAITING` state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub tag: DeliveryTag,
    pub status: SyncStatus,
}

/// Tracks blocking sends until they resolve.
///
/// At most one live request exists per delivery tag. Resolved requests are
/// removed immediately; their outcome lives on the originating node.
#[derive(Debug, Clone, Default)]
pub struct SyncCoordinator {
    pending: BTreeMap<DeliveryTag, PendingSyncRequest>,
}

impl SyncCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new request. Fails if the tag is already live.
    pub fn register(
        &mut self,
        tag: DeliveryTag,
        target: NodeId,
        issued_at: SimTime,
        deadline: SimTime,
    ) -> SimResult<()> {
        if self.pending.contains_key(&tag) {
            return Err(SimError::Env(EnvError::duplicate(&tag)));
        }
        self.pending.insert(
            tag.clone(),
            PendingSyncRequest {
                tag,
                target,
                issued_at,
                deadline,
                status: SyncStatus::Waiting,
            },
        );
        Ok(())
    }

    /// Applies an acknowledgment delivered at `at`.
    ///
    /// Returns `None` for unknown or already-resolved tags (late or
    /// duplicate acks).
    pub fn acknowledge(&mut self, tag: &DeliveryTag, at: SimTime) -> Option<Resolution> {
        let request = self.pending.remove(tag)?;
        let status = if at <= request.deadline {
            SyncStatus::Acked
        } else {
            SyncStatus::TimedOut
        };
        Some(Resolution {
            tag: request.tag,
            status,
        })
    }

    /// Times out every request whose deadline lies strictly before `now`.
    ///
    /// An ack firing exactly at the deadline still wins, so the sweep runs
    /// after the step's events have been applied.
    pub fn expire(&mut self, now: SimTime) -> Vec<Resolution> {
        let expired: Vec<DeliveryTag> = self
            .pending
            .values()
            .filter(|r| r.deadline < now)
            .map(|r| r.tag.clone())
            .collect();

        expired
            .into_iter()
            .filter_map(|tag| self.pending.remove(&tag))
            .map(|r| Resolution {
                tag: r.tag,
                status: SyncStatus::TimedOut,
            })
            .collect()
    }

    pub fn status(&self, tag: &DeliveryTag) -> Option<SyncStatus> {
        self.pending.get(tag).map(|r| r.status)
    }

    pub fn get(&self, tag: &DeliveryTag) -> Option<&PendingSyncRequest> {
        self.pending.get(tag)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tag(seq: u64) -> DeliveryTag {
        DeliveryTag {
            origin: NodeId::from("a"),
            seq,
        }
    }

    fn secs(s: f64) -> SimTime {
        SimTime::from_secs_f64(s)
    }

    #[test]
    fn test_ack_before_deadline() {
        let mut coord = SyncCoordinator::new();
        coord.register(tag(0), "b".into(), secs(0.0), secs(1.0)).unwrap();
        assert_eq!(coord.status(&tag(0)), Some(SyncStatus::Waiting));

        let res = coord.acknowledge(&tag(0), secs(1.0)).unwrap();
        assert_eq!(res.status, SyncStatus::Acked);
        assert_eq!(coord.pending_count(), 0);

        // Duplicate ack is ignored.
        assert!(coord.acknowledge(&tag(0), secs(1.0)).is_none());
    }

    #[test]
    fn test_late_ack_times_out() {
        let mut coord = SyncCoordinator::new();
        coord.register(tag(0), "b".into(), secs(0.0), secs(1.0)).unwrap();

        let res = coord.acknowledge(&tag(0), secs(1.5)).unwrap();
        assert_eq!(res.status, SyncStatus::TimedOut);
    }

    #[test]
    fn test_expire_is_strict() {
        let mut coord = SyncCoordinator::new();
        coord.register(tag(0), "b".into(), secs(0.0), secs(1.0)).unwrap();
        coord.register(tag(1), "b".into(), secs(0.0), secs(3.0)).unwrap();

        assert!(coord.expire(secs(1.0)).is_empty());

        let expired = coord.expire(secs(1.25));
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].tag, tag(0));
        assert_eq!(expired[0].status, SyncStatus::TimedOut);
        assert_eq!(coord.pending_count(), 1);
    }

    #[test]
    fn test_duplicate_tag_rejected() {
        let mut coord = SyncCoordinator::new();
        coord.register(tag(0), "b".into(), secs(0.0), secs(1.0)).unwrap();
        assert!(coord.register(tag(0), "c".into(), secs(0.0), secs(1.0)).is_err());
        assert_eq!(coord.get(&tag(0)).map(|r| r.target.as_str()), Some("b"));
    }
}
