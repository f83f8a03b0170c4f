//! Session-facing facade over the persistence layer.
//!
//! Wraps the synchronous [`Database`] handle in a shared mutex so every
//! connection task can reach storage.  Calls complete before the caller
//! proceeds, which is what keeps broadcasts behind their persistence
//! writes.

use std::sync::{Arc, Mutex, MutexGuard};

use courier_shared::types::{ContactId, MessageId, UserId};
use courier_store::{Contact, Database, Message, StoreError, UserStatus};

type Result<T> = std::result::Result<T, StoreError>;

#[derive(Clone)]
pub struct ConversationStore {
    db: Arc<Mutex<Database>>,
}

impl ConversationStore {
    pub fn new(db: Database) -> Self {
        Self { db: Arc::new(Mutex::new(db)) }
    }

    /// Lock the database handle, recovering from a poisoned mutex: the store
    /// holds no in-memory invariants a panicked writer could have broken.
    fn db(&self) -> MutexGuard<'_, Database> {
        match self.db.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Persist a new message and repoint both contact edges at it.
    pub fn create_message(&self, message: &Message) -> Result<()> {
        let db = self.db();
        db.insert_message(message)?;
        db.update_last_message(message.sender_id, message.receiver_id, message.id)?;
        Ok(())
    }

    /// Edit a message, enforcing sender ownership and the first-edit
    /// snapshot rule.  `NotFound` covers both a missing row and a row owned
    /// by someone else.
    pub fn edit_message(&self, id: MessageId, sender: UserId, content: &str) -> Result<Message> {
        self.db().edit_message(id, sender, content)
    }

    /// Flip every unread message from `sender` to `reader`.  Returns the
    /// number of messages affected.
    pub fn mark_read(&self, sender: UserId, reader: UserId) -> Result<usize> {
        self.db().mark_messages_read(sender, reader)
    }

    /// Create both directions of a contact relationship.  Invoked by the
    /// contact-management surface, which lives outside this binary.
    #[allow(dead_code)]
    pub fn create_contact_pair(&self, owner: UserId, peer: UserId) -> Result<(Contact, Contact)> {
        self.db().create_contact_pair(owner, peer)
    }

    /// Fetch one contact edge.
    #[allow(dead_code)]
    pub fn get_contact(&self, id: ContactId) -> Result<Contact> {
        self.db().get_contact(id)
    }

    /// Users who hold `user` in their contact list (presence audience).
    pub fn watchers_of(&self, user: UserId) -> Result<Vec<UserId>> {
        self.db().watchers_of(user)
    }

    /// Unread messages from `sender` sitting in `receiver`'s conversation.
    #[allow(dead_code)]
    pub fn unread_count(&self, sender: UserId, receiver: UserId) -> Result<u32> {
        self.db().unread_count(sender, receiver)
    }

    /// Conversation history between two users, oldest first.
    #[allow(dead_code)]
    pub fn conversation_between(
        &self,
        a: UserId,
        b: UserId,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<Message>> {
        self.db().conversation_between(a, b, limit, offset)
    }

    /// Persist an online/offline flip, creating the row on first write.
    pub fn set_user_status(&self, user: UserId, is_online: bool) -> Result<UserStatus> {
        self.db().upsert_user_status(user, is_online)
    }

    /// Fetch a user's presence row.
    #[allow(dead_code)]
    pub fn user_status(&self, user: UserId) -> Result<UserStatus> {
        self.db().get_user_status(user)
    }
}
