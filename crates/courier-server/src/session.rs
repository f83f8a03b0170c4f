//! One live client connection.
//!
//! A session is born from a WebSocket upgrade, joins its groups, then runs a
//! single `select!` loop that interleaves outbound events (FIFO from the
//! registry) with inbound frames until the transport goes away.  Frame
//! handlers are free functions over [`AppState`] so they can be exercised
//! without a socket.

use axum::extract::ws::{close_code, CloseFrame, Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::response::Response;
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use courier_shared::protocol::{ChatMessage, ClientFrame, EditedMessage, ServerEvent};
use courier_shared::types::{ContactId, GroupKey, MessageId, UserId};
use courier_store::{Message, StoreError};

use crate::api::AppState;
use crate::auth::{extract_token, AuthUser};
use crate::error::ServerError;
use crate::registry::{EventSender, SessionId};

// ---------------------------------------------------------------------------
// Session state machine
// ---------------------------------------------------------------------------

/// Lifecycle of a connection.  Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Authenticated,
    Joined,
    Active,
    Closing,
    Closed,
}

/// Server-side representation of one client connection.
pub struct Session {
    pub id: SessionId,
    /// Identity resolved by the auth gate; read-only for the connection's
    /// lifetime.
    pub user: AuthUser,
    /// Avatar reference already resolved to a URL.
    pub avatar_url: Option<String>,
    state: SessionState,
    tx: EventSender,
}

impl Session {
    fn new(user: AuthUser, avatar_url: Option<String>, tx: EventSender) -> Self {
        Self {
            id: SessionId::new_v4(),
            user,
            avatar_url,
            state: SessionState::Connecting,
            tx,
        }
    }

    fn advance(&mut self, next: SessionState) {
        debug!(session = %self.id, from = ?self.state, to = ?next, "session state change");
        self.state = next;
    }

    /// Queue an event for this session only (e.g. an error frame).  A full
    /// or closed queue means the connection is already going away.
    fn send_self(&self, event: ServerEvent) {
        if self.tx.send(event).is_err() {
            debug!(session = %self.id, "outbound queue closed, event dropped");
        }
    }
}

// ---------------------------------------------------------------------------
// Handshake
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct ConnectParams {
    /// Bearer credential; an `Authorization: Bearer` header also works.
    token: Option<String>,
    /// Conversation the client is opening.
    contact_id: Option<String>,
}

/// `GET /ws` -- authenticate, then upgrade.
///
/// A missing or invalid credential refuses the connection with 401 before
/// the upgrade completes.  A missing `contact_id` is only detected after the
/// transport-level accept, so the socket opens and is closed immediately.
pub async fn ws_connect(
    State(state): State<AppState>,
    Query(params): Query<ConnectParams>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Result<Response, ServerError> {
    let token =
        extract_token(params.token.as_deref(), &headers).ok_or(ServerError::Unauthenticated)?;
    let user = state.auth.validate(&token)?;

    let contact_id = params
        .contact_id
        .as_deref()
        .and_then(|raw| raw.parse::<ContactId>().ok());

    Ok(ws.on_upgrade(move |socket| handle_socket(state, user, contact_id, socket)))
}

async fn handle_socket(
    state: AppState,
    user: AuthUser,
    contact_id: Option<ContactId>,
    mut socket: WebSocket,
) {
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerEvent>();
    let avatar_url = state.media.resolve_opt(user.avatar.as_deref());
    let mut session = Session::new(user, avatar_url, tx);
    session.advance(SessionState::Authenticated);

    // The handshake must name a conversation; without one there is nothing
    // to join and the session ends before any state is created.
    let Some(contact_id) = contact_id else {
        warn!(user = %session.user.id, "missing contact_id in handshake, closing");
        session.advance(SessionState::Closed);
        let _ = socket
            .send(WsMessage::Close(Some(CloseFrame {
                code: close_code::POLICY,
                reason: "missing contact_id".into(),
            })))
            .await;
        return;
    };

    state
        .registry
        .join(GroupKey::User(session.user.id), session.id, session.tx.clone())
        .await;
    state
        .registry
        .join(GroupKey::Conversation(contact_id), session.id, session.tx.clone())
        .await;
    session.advance(SessionState::Joined);

    if let Err(e) = state.presence.set_online(session.user.id, true) {
        warn!(user = %session.user.id, error = %e, "could not persist online status");
    }
    state.presence.notify_contacts(session.user.id, true).await;

    session.advance(SessionState::Active);
    info!(
        session = %session.id,
        user = %session.user.id,
        contact = %contact_id,
        "session active"
    );

    loop {
        tokio::select! {
            maybe_event = rx.recv() => {
                // Registry events, serialized in the order they arrived.
                let Some(event) = maybe_event else { break };
                match event.to_json() {
                    Ok(text) => {
                        if socket.send(WsMessage::Text(text)).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        error!(session = %session.id, error = %e, "could not encode event");
                    }
                }
            }
            maybe_message = socket.recv() => {
                let Some(message) = maybe_message else { break };
                match message {
                    Ok(WsMessage::Text(raw)) => {
                        match ClientFrame::from_json(&raw) {
                            Ok(frame) => dispatch_frame(&state, &session, frame).await,
                            Err(e) => {
                                // Malformed or incomplete frame: drop it, keep
                                // the session alive, tell nobody.
                                warn!(
                                    session = %session.id,
                                    user = %session.user.id,
                                    error = %e,
                                    "dropping malformed frame"
                                );
                            }
                        }
                    }
                    Ok(WsMessage::Close(_)) => break,
                    Ok(_) => {} // binary / ping / pong: nothing to do
                    Err(e) => {
                        debug!(session = %session.id, error = %e, "socket error");
                        break;
                    }
                }
            }
        }
    }

    // Teardown is best-effort: deregistration and the offline flip both run
    // even when one of them fails.
    session.advance(SessionState::Closing);
    state.registry.leave_all(session.id).await;
    if let Err(e) = state.presence.set_online(session.user.id, false) {
        warn!(user = %session.user.id, error = %e, "could not persist offline status");
    }
    state.presence.notify_contacts(session.user.id, false).await;
    session.advance(SessionState::Closed);

    info!(session = %session.id, user = %session.user.id, "session closed");
}

// ---------------------------------------------------------------------------
// Inbound frame handlers
// ---------------------------------------------------------------------------

/// Route one decoded frame to its handler.
pub(crate) async fn dispatch_frame(state: &AppState, session: &Session, frame: ClientFrame) {
    match frame {
        ClientFrame::Message { receiver, content, is_image, image_url } => {
            handle_message(state, session, receiver, content, is_image, image_url).await;
        }
        ClientFrame::Edit { message_id, content } => {
            handle_edit(state, session, message_id, content).await;
        }
        ClientFrame::Typing { receiver, is_typing } => {
            handle_typing(state, session, receiver, is_typing).await;
        }
        ClientFrame::Read { sender } => {
            handle_read(state, session, sender).await;
        }
        ClientFrame::Unknown => {
            debug!(session = %session.id, "ignoring unknown frame type");
        }
    }
}

/// Persist a new message, then fan it out to the receiver's sessions and
/// echo it back to the sender's own sessions.
pub(crate) async fn handle_message(
    state: &AppState,
    session: &Session,
    receiver: UserId,
    content: String,
    is_image: bool,
    image_url: Option<String>,
) {
    let content = content.trim();
    if content.is_empty() {
        warn!(session = %session.id, "dropping message with empty content");
        return;
    }

    let message = Message::new(
        session.user.id,
        receiver,
        content.to_string(),
        is_image,
        image_url,
    );

    // The write (message + both last-message pointers) must land before any
    // broadcast goes out.
    if let Err(e) = state.store.create_message(&message) {
        error!(
            session = %session.id,
            user = %session.user.id,
            error = %e,
            "failed to persist message"
        );
        session.send_self(ServerEvent::Error {
            message: "Failed to send message".to_string(),
        });
        return;
    }

    let event = ServerEvent::ChatMessage {
        message: ChatMessage {
            id: message.id,
            content: message.content,
            sender_id: session.user.id,
            sender_name: session.user.username.clone(),
            sender_avatar: session.avatar_url.clone(),
            is_image: message.is_image,
            image_url: message.image_url,
            timestamp: message.created_at,
            is_read: false,
        },
    };

    state.registry.broadcast(&GroupKey::User(receiver), event.clone()).await;
    state.registry.broadcast(&GroupKey::User(session.user.id), event).await;
}

/// Apply an edit and notify both parties.  A message that does not exist or
/// is not owned by this sender is a silent no-op.
pub(crate) async fn handle_edit(
    state: &AppState,
    session: &Session,
    message_id: MessageId,
    content: String,
) {
    let content = content.trim();
    if content.is_empty() {
        warn!(session = %session.id, "dropping edit with empty content");
        return;
    }

    let message = match state.store.edit_message(message_id, session.user.id, content) {
        Ok(message) => message,
        Err(StoreError::NotFound) => {
            debug!(
                session = %session.id,
                message = %message_id,
                "ignoring edit of unknown or foreign message"
            );
            return;
        }
        Err(e) => {
            warn!(session = %session.id, error = %e, "edit failed");
            return;
        }
    };

    let event = ServerEvent::MessageEdited {
        message: EditedMessage {
            id: message.id,
            content: message.content.clone(),
            edited_at: message.edited_at.unwrap_or(message.updated_at),
        },
    };

    state.registry.broadcast(&GroupKey::User(session.user.id), event.clone()).await;
    state.registry.broadcast(&GroupKey::User(message.receiver_id), event).await;
}

/// Forward a typing indicator to the receiver's sessions.  Nothing is
/// persisted and the sender gets no echo.
pub(crate) async fn handle_typing(
    state: &AppState,
    session: &Session,
    receiver: UserId,
    is_typing: bool,
) {
    state
        .registry
        .broadcast(
            &GroupKey::User(receiver),
            ServerEvent::Typing { user_id: session.user.id, is_typing },
        )
        .await;
}

/// Acknowledge every unread message from `sender`, then tell `sender`'s
/// sessions the conversation was read.
pub(crate) async fn handle_read(state: &AppState, session: &Session, sender: UserId) {
    match state.store.mark_read(sender, session.user.id) {
        Ok(count) => {
            debug!(
                session = %session.id,
                reader = %session.user.id,
                sender = %sender,
                count,
                "messages marked read"
            );
            state
                .registry
                .broadcast(
                    &GroupKey::User(sender),
                    ServerEvent::ReadStatus { reader_id: session.user.id },
                )
                .await;
        }
        Err(e) => {
            warn!(session = %session.id, error = %e, "mark-read failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use courier_store::Database;

    use crate::api::AppState;
    use crate::auth::AuthGate;
    use crate::config::ServerConfig;
    use crate::media::MediaService;
    use crate::presence::PresenceTracker;
    use crate::registry::GroupRegistry;
    use crate::store::ConversationStore;

    fn test_app(db: Database) -> AppState {
        let store = ConversationStore::new(db);
        let registry = GroupRegistry::new();
        let presence = PresenceTracker::new(store.clone(), registry.clone());
        AppState {
            store,
            registry,
            presence,
            auth: Arc::new(AuthGate::empty()),
            media: Arc::new(MediaService::new("http://localhost:8080/media")),
            config: Arc::new(ServerConfig::default()),
        }
    }

    fn open_app(dir: &tempfile::TempDir) -> AppState {
        test_app(Database::open_at(&dir.path().join("test.db")).unwrap())
    }

    /// Build a joined session for `username`, returning its event receiver.
    async fn spawn_session(
        state: &AppState,
        username: &str,
    ) -> (Session, mpsc::UnboundedReceiver<ServerEvent>) {
        let user = AuthUser {
            id: UserId::new(),
            username: username.to_string(),
            avatar: None,
        };
        let (tx, rx) = mpsc::unbounded_channel();
        let session = Session::new(user, None, tx);
        state
            .registry
            .join(GroupKey::User(session.user.id), session.id, session.tx.clone())
            .await;
        (session, rx)
    }

    #[tokio::test]
    async fn test_message_persists_updates_contacts_and_fans_out() {
        let dir = tempfile::tempdir().unwrap();
        let state = open_app(&dir);
        let (alice, mut alice_rx) = spawn_session(&state, "alice").await;
        let (bob, mut bob_rx) = spawn_session(&state, "bob").await;

        let (edge_ab, edge_ba) = state
            .store
            .create_contact_pair(alice.user.id, bob.user.id)
            .unwrap();

        handle_message(&state, &alice, bob.user.id, "hi".to_string(), false, None).await;

        // Receiver gets the message, sender gets the echo; identical payloads.
        let to_bob = bob_rx.try_recv().unwrap();
        let to_alice = alice_rx.try_recv().unwrap();
        assert_eq!(to_bob, to_alice);
        let ServerEvent::ChatMessage { message } = to_bob else {
            panic!("expected chat_message");
        };
        assert_eq!(message.content, "hi");
        assert_eq!(message.sender_id, alice.user.id);
        assert_eq!(message.sender_name, "alice");
        assert!(!message.is_read);

        // Exactly one persisted message; both contact edges repointed.
        let history = state
            .store
            .conversation_between(alice.user.id, bob.user.id, 50, 0)
            .unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(
            state.store.get_contact(edge_ab.id).unwrap().last_message_id,
            Some(message.id)
        );
        assert_eq!(
            state.store.get_contact(edge_ba.id).unwrap().last_message_id,
            Some(message.id)
        );

        // No further deliveries.
        assert!(bob_rx.try_recv().is_err());
        assert!(alice_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_blank_content_is_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let state = open_app(&dir);
        let (alice, mut alice_rx) = spawn_session(&state, "alice").await;
        let (bob, mut bob_rx) = spawn_session(&state, "bob").await;

        handle_message(&state, &alice, bob.user.id, "   ".to_string(), false, None).await;

        assert!(bob_rx.try_recv().is_err());
        assert!(alice_rx.try_recv().is_err());
        assert!(state
            .store
            .conversation_between(alice.user.id, bob.user.id, 50, 0)
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_persistence_failure_errors_the_sender_only() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open_at(&dir.path().join("test.db")).unwrap();
        // Sabotage the schema so the insert fails.
        db.conn().execute_batch("DROP TABLE messages").unwrap();
        let state = test_app(db);

        let (alice, mut alice_rx) = spawn_session(&state, "alice").await;
        let (bob, mut bob_rx) = spawn_session(&state, "bob").await;

        handle_message(&state, &alice, bob.user.id, "hi".to_string(), false, None).await;

        assert!(matches!(
            alice_rx.try_recv().unwrap(),
            ServerEvent::Error { .. }
        ));
        assert!(bob_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_typing_reaches_only_the_receiver() {
        let dir = tempfile::tempdir().unwrap();
        let state = open_app(&dir);
        let (alice, mut alice_rx) = spawn_session(&state, "alice").await;
        let (bob, mut bob_rx) = spawn_session(&state, "bob").await;
        let (_carol, mut carol_rx) = spawn_session(&state, "carol").await;

        handle_typing(&state, &alice, bob.user.id, true).await;

        assert_eq!(
            bob_rx.try_recv().unwrap(),
            ServerEvent::Typing { user_id: alice.user.id, is_typing: true }
        );
        assert!(alice_rx.try_recv().is_err());
        assert!(carol_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_read_flips_rows_and_notifies_the_sender() {
        let dir = tempfile::tempdir().unwrap();
        let state = open_app(&dir);
        let (alice, mut alice_rx) = spawn_session(&state, "alice").await;
        let (bob, mut bob_rx) = spawn_session(&state, "bob").await;
        state
            .store
            .create_contact_pair(alice.user.id, bob.user.id)
            .unwrap();

        handle_message(&state, &alice, bob.user.id, "one".to_string(), false, None).await;
        handle_message(&state, &alice, bob.user.id, "two".to_string(), false, None).await;
        while bob_rx.try_recv().is_ok() {}
        while alice_rx.try_recv().is_ok() {}

        handle_read(&state, &bob, alice.user.id).await;

        assert_eq!(
            alice_rx.try_recv().unwrap(),
            ServerEvent::ReadStatus { reader_id: bob.user.id }
        );
        let history = state
            .store
            .conversation_between(alice.user.id, bob.user.id, 50, 0)
            .unwrap();
        assert!(history.iter().all(|m| m.is_read));
    }

    #[tokio::test]
    async fn test_edit_notifies_both_sides() {
        let dir = tempfile::tempdir().unwrap();
        let state = open_app(&dir);
        let (alice, mut alice_rx) = spawn_session(&state, "alice").await;
        let (bob, mut bob_rx) = spawn_session(&state, "bob").await;

        handle_message(&state, &alice, bob.user.id, "typo".to_string(), false, None).await;
        let ServerEvent::ChatMessage { message } = bob_rx.try_recv().unwrap() else {
            panic!("expected chat_message");
        };
        while alice_rx.try_recv().is_ok() {}

        handle_edit(&state, &alice, message.id, "fixed".to_string()).await;

        for rx in [&mut alice_rx, &mut bob_rx] {
            let ServerEvent::MessageEdited { message: edited } = rx.try_recv().unwrap() else {
                panic!("expected message_edited");
            };
            assert_eq!(edited.id, message.id);
            assert_eq!(edited.content, "fixed");
        }
    }

    #[tokio::test]
    async fn test_edit_by_non_owner_is_silent() {
        let dir = tempfile::tempdir().unwrap();
        let state = open_app(&dir);
        let (alice, mut alice_rx) = spawn_session(&state, "alice").await;
        let (bob, mut bob_rx) = spawn_session(&state, "bob").await;

        handle_message(&state, &alice, bob.user.id, "mine".to_string(), false, None).await;
        let ServerEvent::ChatMessage { message } = bob_rx.try_recv().unwrap() else {
            panic!("expected chat_message");
        };
        while alice_rx.try_recv().is_ok() {}

        // Bob tries to edit Alice's message: no change, no broadcast.
        handle_edit(&state, &bob, message.id, "hijacked".to_string()).await;

        assert!(alice_rx.try_recv().is_err());
        assert!(bob_rx.try_recv().is_err());
        let history = state
            .store
            .conversation_between(alice.user.id, bob.user.id, 50, 0)
            .unwrap();
        assert_eq!(history[0].content, "mine");
    }

    #[tokio::test]
    async fn test_unknown_frames_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let state = open_app(&dir);
        let (alice, mut alice_rx) = spawn_session(&state, "alice").await;

        dispatch_frame(&state, &alice, ClientFrame::Unknown).await;

        assert!(alice_rx.try_recv().is_err());
    }
}
