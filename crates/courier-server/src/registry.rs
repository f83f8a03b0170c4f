//! Process-wide broadcast group registry.
//!
//! Maps a [`GroupKey`] to the set of live sessions subscribed to it.  This
//! is the only mutable state shared across connection tasks; everything
//! else flows through it via `join` / `leave` / `broadcast`.  Membership is
//! runtime-only and rebuilt from scratch as clients reconnect after a
//! restart.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, RwLock};
use tracing::{debug, warn};
use uuid::Uuid;

use courier_shared::protocol::ServerEvent;
use courier_shared::types::GroupKey;

/// Identifier of one live connection.
pub type SessionId = Uuid;

/// Sender half of a session's outbound event queue.  Events pushed here are
/// serialized to the client in FIFO order by the session's socket task.
pub type EventSender = mpsc::UnboundedSender<ServerEvent>;

type GroupMap = HashMap<GroupKey, HashMap<SessionId, EventSender>>;

#[derive(Clone)]
pub struct GroupRegistry {
    groups: Arc<RwLock<GroupMap>>,
}

impl GroupRegistry {
    pub fn new() -> Self {
        Self {
            groups: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Subscribe a session to a group.  Joining a group the session is
    /// already in is a no-op; the original sender stays registered.
    pub async fn join(&self, key: GroupKey, session: SessionId, tx: EventSender) {
        let mut groups = self.groups.write().await;
        let members = groups.entry(key).or_default();
        members.entry(session).or_insert(tx);

        debug!(group = %key, session = %session, members = members.len(), "session joined group");
    }

    /// Unsubscribe a session from a group.  Leaving a group the session is
    /// not in is a no-op.  Empty groups are removed.
    pub async fn leave(&self, key: &GroupKey, session: SessionId) {
        let mut groups = self.groups.write().await;
        if let Some(members) = groups.get_mut(key) {
            if members.remove(&session).is_some() {
                debug!(group = %key, session = %session, members = members.len(), "session left group");
            }
            if members.is_empty() {
                groups.remove(key);
            }
        }
    }

    /// Unsubscribe a session from every group it joined.  Used on session
    /// teardown and when a broadcast discovers a dead member.
    pub async fn leave_all(&self, session: SessionId) {
        let mut groups = self.groups.write().await;
        groups.retain(|key, members| {
            if members.remove(&session).is_some() {
                debug!(group = %key, session = %session, "session deregistered");
            }
            !members.is_empty()
        });
    }

    /// Deliver an event to every session currently in the group.
    ///
    /// Membership is snapshotted first, so concurrent joins and leaves
    /// cannot stall or corrupt the iteration; a session joining mid-call
    /// either receives this event or the next one.  A failed delivery
    /// (receiver dropped without deregistering) is logged, never aborts the
    /// remaining deliveries, and the dead session is then cleaned out of
    /// every group as if it had disconnected.
    ///
    /// Returns the number of sessions the event was handed to.
    pub async fn broadcast(&self, key: &GroupKey, event: ServerEvent) -> usize {
        let snapshot: Vec<(SessionId, EventSender)> = {
            let groups = self.groups.read().await;
            match groups.get(key) {
                Some(members) => members.iter().map(|(id, tx)| (*id, tx.clone())).collect(),
                None => return 0,
            }
        };

        let mut delivered = 0;
        let mut dead = Vec::new();
        for (session, tx) in snapshot {
            if tx.send(event.clone()).is_ok() {
                delivered += 1;
            } else {
                warn!(group = %key, session = %session, "dropping dead session from group");
                dead.push(session);
            }
        }

        for session in dead {
            self.leave_all(session).await;
        }

        delivered
    }

    /// Number of sessions currently in a group.
    #[allow(dead_code)]
    pub async fn member_count(&self, key: &GroupKey) -> usize {
        self.groups
            .read()
            .await
            .get(key)
            .map(|members| members.len())
            .unwrap_or(0)
    }
}

impl Default for GroupRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_shared::types::UserId;

    fn typing_event() -> ServerEvent {
        ServerEvent::Typing {
            user_id: UserId::new(),
            is_typing: true,
        }
    }

    #[tokio::test]
    async fn test_join_broadcast_leave() {
        let registry = GroupRegistry::new();
        let key = GroupKey::User(UserId::new());
        let session = Uuid::new_v4();
        let (tx, mut rx) = mpsc::unbounded_channel();

        registry.join(key, session, tx).await;
        assert_eq!(registry.member_count(&key).await, 1);

        let delivered = registry.broadcast(&key, typing_event()).await;
        assert_eq!(delivered, 1);
        assert!(rx.try_recv().is_ok());

        registry.leave(&key, session).await;
        assert_eq!(registry.member_count(&key).await, 0);
        assert_eq!(registry.broadcast(&key, typing_event()).await, 0);
    }

    #[tokio::test]
    async fn test_join_is_idempotent() {
        let registry = GroupRegistry::new();
        let key = GroupKey::User(UserId::new());
        let session = Uuid::new_v4();
        let (tx, mut rx) = mpsc::unbounded_channel();

        registry.join(key, session, tx.clone()).await;
        registry.join(key, session, tx).await;
        assert_eq!(registry.member_count(&key).await, 1);

        // One member, one delivery.
        registry.broadcast(&key, typing_event()).await;
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_leave_non_member_is_noop() {
        let registry = GroupRegistry::new();
        let key = GroupKey::User(UserId::new());

        registry.leave(&key, Uuid::new_v4()).await;
        assert_eq!(registry.member_count(&key).await, 0);
    }

    #[tokio::test]
    async fn test_groups_are_isolated() {
        let registry = GroupRegistry::new();
        let key_a = GroupKey::User(UserId::new());
        let key_b = GroupKey::User(UserId::new());

        let (tx_a, mut rx_a) = mpsc::unbounded_channel();
        let (tx_b, mut rx_b) = mpsc::unbounded_channel();
        registry.join(key_a, Uuid::new_v4(), tx_a).await;
        registry.join(key_b, Uuid::new_v4(), tx_b).await;

        registry.broadcast(&key_a, typing_event()).await;

        assert!(rx_a.try_recv().is_ok());
        assert!(rx_b.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_dead_session_is_evicted_everywhere() {
        let registry = GroupRegistry::new();
        let key_a = GroupKey::User(UserId::new());
        let key_b = GroupKey::Conversation(courier_shared::types::ContactId::new());

        let alive = Uuid::new_v4();
        let (alive_tx, mut alive_rx) = mpsc::unbounded_channel();
        registry.join(key_a, alive, alive_tx).await;

        // A session whose receiver is gone, registered in both groups.
        let dead = Uuid::new_v4();
        let (dead_tx, dead_rx) = mpsc::unbounded_channel();
        drop(dead_rx);
        registry.join(key_a, dead, dead_tx.clone()).await;
        registry.join(key_b, dead, dead_tx).await;

        // Delivery to the live member is unaffected by the dead one.
        let delivered = registry.broadcast(&key_a, typing_event()).await;
        assert_eq!(delivered, 1);
        assert!(alive_rx.try_recv().is_ok());

        // The dead session was cleaned out of every group it had joined.
        assert_eq!(registry.member_count(&key_a).await, 1);
        assert_eq!(registry.member_count(&key_b).await, 0);
    }
}
