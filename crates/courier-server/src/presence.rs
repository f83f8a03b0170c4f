//! Presence tracking: persistence of online/offline flips plus fan-out to
//! the users who care.

use tracing::{debug, warn};

use courier_shared::protocol::ServerEvent;
use courier_shared::types::{GroupKey, UserId};
use courier_store::{StoreError, UserStatus};

use crate::registry::GroupRegistry;
use crate::store::ConversationStore;

/// Maintains per-user online state and announces changes to contacts.
///
/// Sessions call [`set_online`] and [`notify_contacts`] together on join and
/// on close.  The two are deliberately not atomic: a status flip visible in
/// storage a beat before the broadcast lands is fine.
///
/// [`set_online`]: PresenceTracker::set_online
/// [`notify_contacts`]: PresenceTracker::notify_contacts
#[derive(Clone)]
pub struct PresenceTracker {
    store: ConversationStore,
    registry: GroupRegistry,
}

impl PresenceTracker {
    pub fn new(store: ConversationStore, registry: GroupRegistry) -> Self {
        Self { store, registry }
    }

    /// Persist the flip, creating the status row on first write.
    pub fn set_online(&self, user: UserId, is_online: bool) -> Result<UserStatus, StoreError> {
        let status = self.store.set_user_status(user, is_online)?;
        debug!(user = %user, is_online, "presence updated");
        Ok(status)
    }

    /// Broadcast a `user_status` event to every user who has `user` as a
    /// contact.  Lookup failures are logged and swallowed; presence fan-out
    /// must never take a session down.
    pub async fn notify_contacts(&self, user: UserId, is_online: bool) {
        let watchers = match self.store.watchers_of(user) {
            Ok(watchers) => watchers,
            Err(e) => {
                warn!(user = %user, error = %e, "could not resolve presence audience");
                return;
            }
        };

        let event = ServerEvent::UserStatus { user_id: user, is_online };
        for watcher in watchers {
            self.registry
                .broadcast(&GroupKey::User(watcher), event.clone())
                .await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_store::Database;
    use tokio::sync::mpsc;
    use uuid::Uuid;

    fn open_store(dir: &tempfile::TempDir) -> ConversationStore {
        let db = Database::open_at(&dir.path().join("test.db")).unwrap();
        ConversationStore::new(db)
    }

    #[tokio::test]
    async fn test_status_change_reaches_watchers_only() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir);
        let registry = GroupRegistry::new();
        let tracker = PresenceTracker::new(store.clone(), registry.clone());

        let (alice, bob, carol) = (UserId::new(), UserId::new(), UserId::new());
        // Alice and Bob are contacts; Carol is unrelated.
        store.create_contact_pair(alice, bob).unwrap();

        let (bob_tx, mut bob_rx) = mpsc::unbounded_channel();
        let (carol_tx, mut carol_rx) = mpsc::unbounded_channel();
        registry.join(GroupKey::User(bob), Uuid::new_v4(), bob_tx).await;
        registry.join(GroupKey::User(carol), Uuid::new_v4(), carol_tx).await;

        let status = tracker.set_online(alice, true).unwrap();
        assert!(status.is_online);
        tracker.notify_contacts(alice, true).await;

        assert_eq!(
            bob_rx.try_recv().unwrap(),
            ServerEvent::UserStatus { user_id: alice, is_online: true }
        );
        assert!(carol_rx.try_recv().is_err());

        // Going offline re-broadcasts with the flag flipped.
        tracker.set_online(alice, false).unwrap();
        tracker.notify_contacts(alice, false).await;
        assert_eq!(
            bob_rx.try_recv().unwrap(),
            ServerEvent::UserStatus { user_id: alice, is_online: false }
        );
        assert!(!store.user_status(alice).unwrap().is_online);
    }

    #[tokio::test]
    async fn test_notify_with_no_contacts_is_quiet() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir);
        let registry = GroupRegistry::new();
        let tracker = PresenceTracker::new(store, registry);

        // No contacts, no panic, nothing delivered.
        tracker.notify_contacts(UserId::new(), true).await;
    }
}
