use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Display defaults applied when a create/join request omits them.
pub const HOST_AVATAR: &str = "👨‍🏫";
pub const HOST_COLOR: &str = "#007bff";
pub const GUEST_AVATAR: &str = "👤";
pub const GUEST_COLOR: &str = "#6c757d";

/// Who authored a chat message: a human participant or the AI tutor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageSender {
    User,
    Bot,
}

/// Which of the two whiteboards an action targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetBoard {
    Teacher,
    Student,
}

/// One named user bound to a session.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub user_name: String,
    pub avatar: String,
    pub color: String,
    /// True only for the participant who created the session; never reassigned.
    pub is_host: bool,
    pub joined_at: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

/// A chat message. Immutable once appended to a session's transcript.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: Uuid,
    pub message: String,
    pub sender: MessageSender,
    pub user_name: String,
    pub timestamp: DateTime<Utc>,
}

/// A whiteboard action. The action name is an open set (probability_scale,
/// distribution, normal_curve, tree_diagram, clear_board, ...) so new drawing
/// tools don't require a server change. Immutable once appended.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WhiteboardAction {
    pub id: Uuid,
    pub action: String,
    pub target_board: TargetBoard,
    pub user_name: String,
    pub timestamp: DateTime<Utc>,
}

/// In-memory state for a single tutoring session: metadata, roster,
/// chat transcript, and whiteboard action log.
#[derive(Debug)]
pub struct TutorSession {
    pub session_id: String,
    pub host_name: String,
    pub is_public: bool,
    pub session_title: String,
    /// Participants keyed by display name (unique within the session).
    pub participants: HashMap<String, Participant>,
    /// Append-only, in server processing order.
    pub messages: Vec<ChatMessage>,
    /// Append-only, in server processing order.
    pub whiteboard_actions: Vec<WhiteboardAction>,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

impl TutorSession {
    pub fn new(
        session_id: String,
        host_name: String,
        avatar: Option<String>,
        color: Option<String>,
        is_public: bool,
        session_title: String,
    ) -> Self {
        let now = Utc::now();
        let mut participants = HashMap::new();
        participants.insert(
            host_name.clone(),
            Participant {
                user_name: host_name.clone(),
                avatar: avatar.unwrap_or_else(|| HOST_AVATAR.to_string()),
                color: color.unwrap_or_else(|| HOST_COLOR.to_string()),
                is_host: true,
                joined_at: now,
                last_seen: now,
            },
        );

        Self {
            session_id,
            host_name,
            is_public,
            session_title,
            participants,
            messages: Vec::new(),
            whiteboard_actions: Vec::new(),
            created_at: now,
            last_activity: now,
        }
    }

    /// Add a non-host participant. Overwrites nothing — callers check for
    /// name conflicts first.
    pub fn add_participant(&mut self, user_name: String, avatar: Option<String>, color: Option<String>) {
        let now = Utc::now();
        self.participants.insert(
            user_name.clone(),
            Participant {
                user_name,
                avatar: avatar.unwrap_or_else(|| GUEST_AVATAR.to_string()),
                color: color.unwrap_or_else(|| GUEST_COLOR.to_string()),
                is_host: false,
                joined_at: now,
                last_seen: now,
            },
        );
        self.last_activity = now;
    }

    /// Remove a participant by name. Returns true if one was present.
    pub fn remove_participant(&mut self, user_name: &str) -> bool {
        let removed = self.participants.remove(user_name).is_some();
        if removed {
            self.last_activity = Utc::now();
        }
        removed
    }

    /// Refresh a participant's display attributes. Fields left as `None`
    /// keep their current value. Returns false if the name is unknown.
    /// Does not count as session activity — only `last_seen` moves.
    pub fn update_profile(&mut self, user_name: &str, avatar: Option<String>, color: Option<String>) -> bool {
        let Some(participant) = self.participants.get_mut(user_name) else {
            return false;
        };
        if let Some(avatar) = avatar {
            participant.avatar = avatar;
        }
        if let Some(color) = color {
            participant.color = color;
        }
        participant.last_seen = Utc::now();
        true
    }

    /// Append a chat message with a server-assigned id and timestamp.
    /// Returns a copy of the stored record.
    pub fn add_message(&mut self, message: String, sender: MessageSender, user_name: String) -> ChatMessage {
        let record = ChatMessage {
            id: Uuid::new_v4(),
            message,
            sender,
            user_name,
            timestamp: Utc::now(),
        };
        self.messages.push(record.clone());
        self.last_activity = record.timestamp;
        record
    }

    /// Append a whiteboard action with a server-assigned id and timestamp.
    /// Returns a copy of the stored record.
    pub fn add_whiteboard_action(
        &mut self,
        action: String,
        target_board: TargetBoard,
        user_name: String,
    ) -> WhiteboardAction {
        let record = WhiteboardAction {
            id: Uuid::new_v4(),
            action,
            target_board,
            user_name,
            timestamp: Utc::now(),
        };
        self.whiteboard_actions.push(record.clone());
        self.last_activity = record.timestamp;
        record
    }

    pub fn participant_list(&self) -> Vec<Participant> {
        self.participants.values().cloned().collect()
    }

    pub fn participant_count(&self) -> usize {
        self.participants.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> TutorSession {
        TutorSession::new(
            "ABCD1234".into(),
            "Alice".into(),
            None,
            None,
            true,
            "Probability basics".into(),
        )
    }

    #[test]
    fn test_host_is_sole_initial_participant() {
        let s = session();
        assert_eq!(s.participant_count(), 1);
        let host = &s.participants["Alice"];
        assert!(host.is_host);
        assert_eq!(host.avatar, HOST_AVATAR);
        assert_eq!(host.color, HOST_COLOR);
    }

    #[test]
    fn test_guests_are_never_hosts() {
        let mut s = session();
        s.add_participant("Bob".into(), None, None);
        assert!(!s.participants["Bob"].is_host);
        assert_eq!(s.participants["Bob"].avatar, GUEST_AVATAR);
    }

    #[test]
    fn test_profile_update_keeps_unset_fields() {
        let mut s = session();
        s.add_participant("Bob".into(), Some("🦊".into()), Some("#112233".into()));
        assert!(s.update_profile("Bob", Some("🐙".into()), None));
        assert_eq!(s.participants["Bob"].avatar, "🐙");
        assert_eq!(s.participants["Bob"].color, "#112233");
    }

    #[test]
    fn test_profile_update_unknown_name() {
        let mut s = session();
        assert!(!s.update_profile("Nobody", None, None));
    }

    #[test]
    fn test_messages_append_in_order() {
        let mut s = session();
        s.add_message("one".into(), MessageSender::User, "Alice".into());
        s.add_message("two".into(), MessageSender::Bot, "Alice".into());
        assert_eq!(s.messages.len(), 2);
        assert_eq!(s.messages[0].message, "one");
        assert_eq!(s.messages[1].message, "two");
        assert_ne!(s.messages[0].id, s.messages[1].id);
    }

    #[test]
    fn test_activity_moves_on_message_but_not_profile_update() {
        let mut s = session();
        let before = s.last_activity;
        s.add_message("hi".into(), MessageSender::User, "Alice".into());
        assert!(s.last_activity >= before);

        let after_message = s.last_activity;
        s.update_profile("Alice", Some("🐙".into()), None);
        assert_eq!(s.last_activity, after_message);
    }
}
