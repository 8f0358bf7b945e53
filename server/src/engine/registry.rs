use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use rand::Rng;
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use super::connection::{ConnectionHandle, MAX_OUTBOUND_QUEUE};
use super::error::SessionError;
use super::events::{
    ConnectionId, PublicSessionInfo, ServerEvent, SessionListEntry, SessionSnapshot,
};
use super::session::{ChatMessage, MessageSender, TargetBoard, TutorSession, WhiteboardAction};
use super::validation;

/// Length of generated session codes (uppercase alphanumeric).
pub const SESSION_ID_LENGTH: usize = 8;

/// The single source of truth for all session state. Transport-agnostic —
/// both the REST control plane and the WebSocket handler call into this.
/// Constructed explicitly and shared via `Arc`; there is no ambient global.
pub struct SessionRegistry {
    /// All live sessions, keyed by session code.
    sessions: DashMap<String, TutorSession>,
    /// Live connections per session, in registration order.
    session_connections: DashMap<String, Vec<ConnectionId>>,
    /// All connected handles, keyed by connection ID.
    connections: DashMap<ConnectionId, Arc<ConnectionHandle>>,
    /// Sessions idle longer than this are evicted by the housekeeping sweep.
    retention: Duration,
}

impl SessionRegistry {
    pub fn new(retention: Duration) -> Self {
        Self {
            sessions: DashMap::new(),
            session_connections: DashMap::new(),
            connections: DashMap::new(),
            retention,
        }
    }

    // ── Control plane ───────────────────────────────────────────────

    /// Create a session with the host as sole initial participant.
    /// Returns the initial snapshot (which carries the generated session code).
    pub fn create_session(
        &self,
        host_name: &str,
        avatar: Option<String>,
        color: Option<String>,
        is_public: bool,
        session_title: Option<String>,
    ) -> Result<SessionSnapshot, SessionError> {
        let host_name = validation::require_name(host_name, "Host name")?;
        let session_title = validation::validate_title(session_title)?;

        let mut session_id = generate_session_id();
        while self.sessions.contains_key(&session_id) {
            session_id = generate_session_id();
        }

        let session = TutorSession::new(
            session_id.clone(),
            host_name.clone(),
            avatar,
            color,
            is_public,
            session_title,
        );
        let snapshot = snapshot_of(&session);
        self.sessions.insert(session_id.clone(), session);
        self.session_connections.insert(session_id.clone(), Vec::new());

        info!(%session_id, %host_name, "session created");
        Ok(snapshot)
    }

    /// Add a participant via the control plane. Rejects duplicate names;
    /// returns the full current state for client-side history replay.
    pub fn join_session(
        &self,
        session_id: &str,
        user_name: &str,
        avatar: Option<String>,
        color: Option<String>,
    ) -> Result<SessionSnapshot, SessionError> {
        let user_name = validation::require_name(user_name, "User name")?;

        let mut session = self
            .sessions
            .get_mut(session_id)
            .ok_or(SessionError::NotFound)?;

        if session.participants.contains_key(&user_name) {
            return Err(SessionError::NameConflict);
        }
        session.add_participant(user_name.clone(), avatar, color);

        info!(%session_id, %user_name, "participant joined");
        Ok(snapshot_of(&session))
    }

    /// Full session state, or NotFound.
    pub fn snapshot(&self, session_id: &str) -> Result<SessionSnapshot, SessionError> {
        self.sessions
            .get(session_id)
            .map(|s| snapshot_of(&s))
            .ok_or(SessionError::NotFound)
    }

    pub fn contains(&self, session_id: &str) -> bool {
        self.sessions.contains_key(session_id)
    }

    /// Sessions created with `isPublic`, in no particular order.
    pub fn list_public_sessions(&self) -> Vec<PublicSessionInfo> {
        self.sessions
            .iter()
            .filter(|s| s.is_public)
            .map(|s| PublicSessionInfo {
                session_id: s.session_id.clone(),
                session_title: s.session_title.clone(),
                host_name: s.host_name.clone(),
                participant_count: s.participant_count(),
                created_at: s.created_at,
                last_activity: s.last_activity,
            })
            .collect()
    }

    /// Every live session, public or not.
    pub fn list_sessions(&self) -> Vec<SessionListEntry> {
        self.sessions
            .iter()
            .map(|s| SessionListEntry {
                session_id: s.session_id.clone(),
                host_name: s.host_name.clone(),
                participant_count: s.participant_count(),
                created_at: s.created_at,
                last_activity: s.last_activity,
            })
            .collect()
    }

    /// Delete a session and its connection list. Idempotent. Dropping the
    /// connection handles closes their outbound queues, which ends the
    /// write loop of any socket still attached.
    pub fn remove_session(&self, session_id: &str) {
        self.sessions.remove(session_id);
        if let Some((_, connection_ids)) = self.session_connections.remove(session_id) {
            for connection_id in connection_ids {
                self.connections.remove(&connection_id);
            }
        }
    }

    // ── Real-time channel ───────────────────────────────────────────

    /// Bind a connection to a session under the given identity.
    ///
    /// A name already on the roster (joined via the control plane, or a
    /// reconnect) is rebound: display attributes and last-seen refresh, no
    /// error. An unknown name is accepted and added as a non-host
    /// participant. Registers the connection, notifies the rest of the
    /// session, and sends the joiner a private `session_info` plus the
    /// current roster.
    pub fn bind(
        &self,
        session_id: &str,
        user_name: &str,
        avatar: Option<String>,
        color: Option<String>,
    ) -> Result<(ConnectionId, mpsc::Receiver<ServerEvent>), SessionError> {
        let user_name = validation::require_name(user_name, "User name")?;
        let (session_title, is_public, participants) = {
            let mut session = self
                .sessions
                .get_mut(session_id)
                .ok_or(SessionError::NotFound)?;

            if session.participants.contains_key(&user_name) {
                session.update_profile(&user_name, avatar, color);
            } else {
                session.add_participant(user_name.clone(), avatar, color);
            }
            (
                session.session_title.clone(),
                session.is_public,
                session.participant_list(),
            )
        };

        let connection_id = Uuid::new_v4();
        let (tx, rx) = mpsc::channel(MAX_OUTBOUND_QUEUE);
        let handle = Arc::new(ConnectionHandle::new(
            connection_id,
            session_id.to_string(),
            user_name.clone(),
            tx,
        ));
        self.connections.insert(connection_id, handle.clone());
        self.session_connections
            .entry(session_id.to_string())
            .or_default()
            .push(connection_id);

        self.broadcast(
            session_id,
            &ServerEvent::ParticipantJoined {
                user_name: user_name.clone(),
                timestamp: Utc::now(),
            },
            Some(connection_id),
        );

        let _ = handle.send(ServerEvent::SessionInfo {
            session_title,
            is_public,
            participants: participants.clone(),
        });
        let _ = handle.send(ServerEvent::ParticipantsUpdate { participants });

        info!(%session_id, %user_name, %connection_id, "connection bound");
        Ok((connection_id, rx))
    }

    /// Append a chat message and echo it to every connection in the session,
    /// sender included (clients rely on the echo rather than local echo).
    pub fn post_message(
        &self,
        session_id: &str,
        user_name: &str,
        message: String,
        sender: MessageSender,
    ) -> Option<ChatMessage> {
        if let Err(err) = validation::validate_message(&message) {
            warn!(%session_id, %user_name, %err, "dropping invalid chat message");
            return None;
        }
        let record = {
            let mut session = self.sessions.get_mut(session_id)?;
            session.add_message(message, sender, user_name.to_string())
        };

        self.broadcast(
            session_id,
            &ServerEvent::Message {
                id: record.id,
                message: record.message.clone(),
                sender: record.sender,
                user_name: record.user_name.clone(),
                timestamp: record.timestamp,
            },
            None,
        );

        info!(
            %session_id,
            %user_name,
            preview = %record.message.chars().take(50).collect::<String>(),
            "chat message"
        );
        Some(record)
    }

    /// Append a whiteboard action and relay it to every connection except
    /// the sender, which has already applied it locally.
    pub fn post_whiteboard_action(
        &self,
        session_id: &str,
        user_name: &str,
        action: String,
        target_board: TargetBoard,
        sender_connection: ConnectionId,
    ) -> Option<WhiteboardAction> {
        let record = {
            let mut session = self.sessions.get_mut(session_id)?;
            session.add_whiteboard_action(action, target_board, user_name.to_string())
        };

        self.broadcast(
            session_id,
            &ServerEvent::WhiteboardAction {
                id: record.id,
                action: record.action.clone(),
                target_board: record.target_board,
                user_name: record.user_name.clone(),
                timestamp: record.timestamp,
            },
            Some(sender_connection),
        );

        info!(%session_id, %user_name, action = %record.action, "whiteboard action");
        Some(record)
    }

    /// Update a participant's display attributes and push the refreshed
    /// roster to every connection, sender included (confirmation).
    pub fn update_profile(
        &self,
        session_id: &str,
        user_name: &str,
        avatar: Option<String>,
        color: Option<String>,
    ) {
        let participants = {
            let Some(mut session) = self.sessions.get_mut(session_id) else {
                return;
            };
            if !session.update_profile(user_name, avatar, color) {
                return;
            }
            session.participant_list()
        };

        self.broadcast(
            session_id,
            &ServerEvent::ParticipantsUpdate { participants },
            None,
        );
    }

    /// Detach a connection: remove its participant from the roster, notify
    /// the rest of the session, and delete the session when the roster is
    /// empty. Serves both the explicit `leave` frame and transport close,
    /// so it is a no-op for a connection already gone.
    pub fn leave(&self, connection_id: ConnectionId) {
        let Some((_, handle)) = self.connections.remove(&connection_id) else {
            return;
        };

        if let Some(mut connection_ids) = self.session_connections.get_mut(&handle.session_id)
            && let Some(pos) = connection_ids.iter().position(|id| *id == connection_id)
        {
            connection_ids.remove(pos);
        }

        let roster_empty = {
            match self.sessions.get_mut(&handle.session_id) {
                Some(mut session) => {
                    session.remove_participant(&handle.user_name);
                    session.participants.is_empty()
                }
                None => false,
            }
        };

        self.broadcast(
            &handle.session_id,
            &ServerEvent::ParticipantLeft {
                user_name: handle.user_name.clone(),
                timestamp: Utc::now(),
            },
            Some(connection_id),
        );

        info!(
            session_id = %handle.session_id,
            user_name = %handle.user_name,
            %connection_id,
            "connection left"
        );

        if roster_empty {
            self.remove_session(&handle.session_id);
            info!(session_id = %handle.session_id, "session removed (empty)");
        }
    }

    /// Broadcast an event to every connection in a session, optionally
    /// excluding one. Best-effort: a full or closed queue is logged and
    /// never aborts the remaining fan-out.
    pub fn broadcast(&self, session_id: &str, event: &ServerEvent, exclude: Option<ConnectionId>) {
        let Some(connection_ids) = self.session_connections.get(session_id) else {
            return;
        };

        for connection_id in connection_ids.iter() {
            if Some(*connection_id) == exclude {
                continue;
            }
            if let Some(handle) = self.connections.get(connection_id)
                && !handle.send(event.clone())
            {
                warn!(%connection_id, user_name = %handle.user_name, "failed to deliver event (queue full or closed)");
            }
        }
    }

    // ── Housekeeping ────────────────────────────────────────────────

    /// Remove every session whose last activity is older than the retention
    /// threshold. `now` is a parameter so tests sweep deterministically.
    /// Returns the number of sessions evicted.
    pub fn evict_stale(&self, now: DateTime<Utc>) -> usize {
        let stale: Vec<String> = self
            .sessions
            .iter()
            .filter(|s| now - s.last_activity > self.retention)
            .map(|s| s.session_id.clone())
            .collect();

        for session_id in &stale {
            self.remove_session(session_id);
            info!(%session_id, "session removed (inactive)");
        }
        stale.len()
    }
}

/// Generate an 8-character uppercase alphanumeric session code.
fn generate_session_id() -> String {
    const CHARS: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
    let mut rng = rand::thread_rng();
    (0..SESSION_ID_LENGTH)
        .map(|_| CHARS[rng.gen_range(0..CHARS.len())] as char)
        .collect()
}

fn snapshot_of(session: &TutorSession) -> SessionSnapshot {
    SessionSnapshot {
        session_id: session.session_id.clone(),
        host_name: session.host_name.clone(),
        is_public: session.is_public,
        session_title: session.session_title.clone(),
        participants: session.participant_list(),
        messages: session.messages.clone(),
        whiteboard_actions: session.whiteboard_actions.clone(),
        created_at: session.created_at,
        last_activity: session.last_activity,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup_registry() -> SessionRegistry {
        SessionRegistry::new(Duration::hours(24))
    }

    /// Create a session hosted by the given name and return its code.
    fn create(registry: &SessionRegistry, host: &str) -> String {
        registry
            .create_session(host, None, None, true, None)
            .unwrap()
            .session_id
    }

    fn drain(rx: &mut mpsc::Receiver<ServerEvent>) {
        while rx.try_recv().is_ok() {}
    }

    #[test]
    fn test_session_id_format() {
        let id = generate_session_id();
        assert_eq!(id.len(), SESSION_ID_LENGTH);
        assert!(id.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));
    }

    #[test]
    fn test_create_requires_host_name() {
        let registry = setup_registry();
        let err = registry
            .create_session("   ", None, None, true, None)
            .unwrap_err();
        assert_eq!(err, SessionError::InvalidArgument("Host name is required".into()));
    }

    #[test]
    fn test_create_and_lookup() {
        let registry = setup_registry();
        let session_id = create(&registry, "Alice");

        let snapshot = registry.snapshot(&session_id).unwrap();
        assert_eq!(snapshot.host_name, "Alice");
        assert_eq!(snapshot.participants.len(), 1);
        assert!(snapshot.participants[0].is_host);
    }

    #[test]
    fn test_join_unknown_session() {
        let registry = setup_registry();
        let err = registry
            .join_session("NOSUCHID", "Bob", None, None)
            .unwrap_err();
        assert_eq!(err, SessionError::NotFound);
    }

    #[test]
    fn test_join_name_conflict() {
        let registry = setup_registry();
        let session_id = create(&registry, "Alice");

        registry.join_session(&session_id, "Bob", None, None).unwrap();
        let err = registry
            .join_session(&session_id, "Bob", None, None)
            .unwrap_err();
        assert_eq!(err, SessionError::NameConflict);
    }

    #[test]
    fn test_exactly_one_host_per_session() {
        let registry = setup_registry();
        let session_id = create(&registry, "Alice");
        registry.join_session(&session_id, "Bob", None, None).unwrap();
        registry.join_session(&session_id, "Carol", None, None).unwrap();

        let snapshot = registry.snapshot(&session_id).unwrap();
        assert_eq!(snapshot.participants.len(), 3);
        let hosts: Vec<_> = snapshot.participants.iter().filter(|p| p.is_host).collect();
        assert_eq!(hosts.len(), 1);
        assert_eq!(hosts[0].user_name, "Alice");
    }

    #[tokio::test]
    async fn test_bind_known_name_rebinds() {
        let registry = setup_registry();
        let session_id = create(&registry, "Alice");
        registry.join_session(&session_id, "Bob", None, None).unwrap();

        // Joining over WebSocket with a name already on the roster succeeds
        // and refreshes display attributes instead of erroring.
        let (_, _rx) = registry
            .bind(&session_id, "Bob", Some("🦊".into()), None)
            .unwrap();

        let snapshot = registry.snapshot(&session_id).unwrap();
        assert_eq!(snapshot.participants.len(), 2);
        let bob = snapshot.participants.iter().find(|p| p.user_name == "Bob").unwrap();
        assert_eq!(bob.avatar, "🦊");
        assert!(!bob.is_host);
    }

    #[tokio::test]
    async fn test_bind_unknown_name_is_accepted() {
        let registry = setup_registry();
        let session_id = create(&registry, "Alice");

        // Identity never registered via the control plane — permissive join.
        let (_, _rx) = registry.bind(&session_id, "Mallory", None, None).unwrap();
        let snapshot = registry.snapshot(&session_id).unwrap();
        assert!(snapshot.participants.iter().any(|p| p.user_name == "Mallory"));
    }

    #[tokio::test]
    async fn test_bind_unknown_session() {
        let registry = setup_registry();
        let err = registry.bind("NOSUCHID", "Bob", None, None).unwrap_err();
        assert_eq!(err, SessionError::NotFound);
    }

    #[tokio::test]
    async fn test_joiner_gets_session_info_then_roster() {
        let registry = setup_registry();
        let session_id = registry
            .create_session("Alice", None, None, false, Some("Bayes 101".into()))
            .unwrap()
            .session_id;

        let (_, mut rx) = registry.bind(&session_id, "Alice", None, None).unwrap();

        match rx.try_recv().unwrap() {
            ServerEvent::SessionInfo { session_title, is_public, participants } => {
                assert_eq!(session_title, "Bayes 101");
                assert!(!is_public);
                assert_eq!(participants.len(), 1);
            }
            other => panic!("expected SessionInfo, got {:?}", other),
        }
        assert!(matches!(
            rx.try_recv().unwrap(),
            ServerEvent::ParticipantsUpdate { .. }
        ));
    }

    #[tokio::test]
    async fn test_message_echoes_to_sender() {
        let registry = setup_registry();
        let session_id = create(&registry, "Alice");
        let (_, mut rx) = registry.bind(&session_id, "Alice", None, None).unwrap();
        drain(&mut rx);

        registry.post_message(&session_id, "Alice", "hello".into(), MessageSender::User);

        match rx.try_recv().unwrap() {
            ServerEvent::Message { message, user_name, .. } => {
                assert_eq!(message, "hello");
                assert_eq!(user_name, "Alice");
            }
            other => panic!("expected Message, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_whiteboard_action_skips_sender() {
        let registry = setup_registry();
        let session_id = create(&registry, "Alice");
        registry.join_session(&session_id, "Bob", None, None).unwrap();

        let (alice_conn, mut alice_rx) = registry.bind(&session_id, "Alice", None, None).unwrap();
        let (_, mut bob_rx) = registry.bind(&session_id, "Bob", None, None).unwrap();
        drain(&mut alice_rx);
        drain(&mut bob_rx);

        registry.post_whiteboard_action(
            &session_id,
            "Alice",
            "normal_curve".into(),
            TargetBoard::Teacher,
            alice_conn,
        );

        assert!(alice_rx.try_recv().is_err());
        match bob_rx.try_recv().unwrap() {
            ServerEvent::WhiteboardAction { action, target_board, .. } => {
                assert_eq!(action, "normal_curve");
                assert_eq!(target_board, TargetBoard::Teacher);
            }
            other => panic!("expected WhiteboardAction, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_profile_update_broadcasts_roster_to_all() {
        let registry = setup_registry();
        let session_id = create(&registry, "Alice");
        let (_, mut rx) = registry.bind(&session_id, "Alice", None, None).unwrap();
        drain(&mut rx);

        registry.update_profile(&session_id, "Alice", None, Some("#ff0000".into()));

        match rx.try_recv().unwrap() {
            ServerEvent::ParticipantsUpdate { participants } => {
                assert_eq!(participants[0].color, "#ff0000");
            }
            other => panic!("expected ParticipantsUpdate, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_last_leave_removes_session() {
        let registry = setup_registry();
        let session_id = create(&registry, "Alice");
        let (connection_id, _rx) = registry.bind(&session_id, "Alice", None, None).unwrap();

        registry.leave(connection_id);
        assert!(matches!(
            registry.snapshot(&session_id),
            Err(SessionError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_leave_keeps_session_while_others_remain() {
        let registry = setup_registry();
        let session_id = create(&registry, "Alice");
        registry.join_session(&session_id, "Bob", None, None).unwrap();

        let (_, mut alice_rx) = registry.bind(&session_id, "Alice", None, None).unwrap();
        let (bob_conn, _bob_rx) = registry.bind(&session_id, "Bob", None, None).unwrap();
        drain(&mut alice_rx);

        registry.leave(bob_conn);

        match alice_rx.try_recv().unwrap() {
            ServerEvent::ParticipantLeft { user_name, .. } => assert_eq!(user_name, "Bob"),
            other => panic!("expected ParticipantLeft, got {:?}", other),
        }
        let snapshot = registry.snapshot(&session_id).unwrap();
        assert_eq!(snapshot.participants.len(), 1);
    }

    #[tokio::test]
    async fn test_leave_is_idempotent() {
        let registry = setup_registry();
        let session_id = create(&registry, "Alice");
        registry.join_session(&session_id, "Bob", None, None).unwrap();
        let (bob_conn, _rx) = registry.bind(&session_id, "Bob", None, None).unwrap();

        registry.leave(bob_conn);
        registry.leave(bob_conn);
        assert!(registry.contains(&session_id));
    }

    #[test]
    fn test_remove_session_is_idempotent() {
        let registry = setup_registry();
        let session_id = create(&registry, "Alice");

        registry.remove_session(&session_id);
        registry.remove_session(&session_id);
        assert!(!registry.contains(&session_id));
    }

    #[test]
    fn test_public_listing_filters_private_sessions() {
        let registry = setup_registry();
        registry
            .create_session("Alice", None, None, true, Some("open".into()))
            .unwrap();
        let private = registry
            .create_session("Bob", None, None, false, Some("closed".into()))
            .unwrap();

        let listing = registry.list_public_sessions();
        assert_eq!(listing.len(), 1);
        assert_eq!(listing[0].host_name, "Alice");
        assert!(!listing.iter().any(|s| s.session_id == private.session_id));

        // The all-sessions listing still includes both.
        assert_eq!(registry.list_sessions().len(), 2);
    }

    #[test]
    fn test_over_long_inputs_rejected() {
        let registry = setup_registry();
        let long_name = "x".repeat(validation::MAX_NAME_LENGTH + 1);

        assert!(matches!(
            registry.create_session(&long_name, None, None, true, None),
            Err(SessionError::InvalidArgument(_))
        ));
        assert!(matches!(
            registry.create_session("Alice", None, None, true, Some("t".repeat(101))),
            Err(SessionError::InvalidArgument(_))
        ));

        let session_id = create(&registry, "Alice");
        assert!(matches!(
            registry.join_session(&session_id, &long_name, None, None),
            Err(SessionError::InvalidArgument(_))
        ));
        assert!(matches!(
            registry.bind(&session_id, &long_name, None, None),
            Err(SessionError::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn test_over_long_message_dropped() {
        let registry = setup_registry();
        let session_id = create(&registry, "Alice");
        let (_, mut rx) = registry.bind(&session_id, "Alice", None, None).unwrap();
        drain(&mut rx);

        let oversized = "m".repeat(validation::MAX_MESSAGE_LENGTH + 1);
        assert!(registry
            .post_message(&session_id, "Alice", oversized, MessageSender::User)
            .is_none());

        // Nothing appended, nothing broadcast.
        assert!(registry.snapshot(&session_id).unwrap().messages.is_empty());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_evict_stale_sessions() {
        let registry = setup_registry();
        let session_id = create(&registry, "Alice");

        // A sweep at the current time keeps the fresh session.
        assert_eq!(registry.evict_stale(Utc::now()), 0);
        assert!(registry.contains(&session_id));

        // A sweep past the retention threshold removes it, connections or not.
        let evicted = registry.evict_stale(Utc::now() + Duration::hours(25));
        assert_eq!(evicted, 1);
        assert!(!registry.contains(&session_id));
    }
}
