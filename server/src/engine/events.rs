use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::session::{ChatMessage, MessageSender, Participant, TargetBoard, WhiteboardAction};

/// Unique identifier for a live connection (one per WebSocket, not per user).
pub type ConnectionId = Uuid;

/// Frames a client can send over the real-time channel. Wire format is a
/// tagged JSON object: `{"type": "join", "userName": "Bob", ...}`.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ClientFrame {
    /// Bind this connection to a participant identity. Must precede any
    /// other frame; repeated joins rebind without erroring.
    Join {
        user_name: String,
        #[serde(default)]
        avatar: Option<String>,
        #[serde(default)]
        color: Option<String>,
    },

    /// A chat message. The server assigns id and timestamp and echoes the
    /// message back to every connection, sender included.
    Message { message: String, sender: MessageSender },

    /// A whiteboard action, relayed to every other connection (the sender
    /// has already applied it locally).
    WhiteboardAction { action: String, target_board: TargetBoard },

    /// Update this participant's display attributes.
    ProfileUpdate {
        #[serde(default)]
        avatar: Option<String>,
        #[serde(default)]
        color: Option<String>,
    },

    /// Leave the session and close the connection.
    Leave,

    /// Any frame type this server doesn't know. Ignored, so older servers
    /// tolerate newer clients.
    #[serde(other)]
    Unknown,
}

/// Events the server pushes to connections.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ServerEvent {
    /// Another participant's connection bound to the session.
    ParticipantJoined { user_name: String, timestamp: DateTime<Utc> },

    /// A participant left or disconnected.
    ParticipantLeft { user_name: String, timestamp: DateTime<Utc> },

    /// Full roster, sent after any roster or profile change.
    ParticipantsUpdate { participants: Vec<Participant> },

    /// Session metadata, sent privately to a connection right after it joins.
    SessionInfo {
        session_title: String,
        is_public: bool,
        participants: Vec<Participant>,
    },

    /// A chat message was appended to the transcript.
    Message {
        id: Uuid,
        message: String,
        sender: MessageSender,
        user_name: String,
        timestamp: DateTime<Utc>,
    },

    /// A whiteboard action was appended to the action log.
    WhiteboardAction {
        id: Uuid,
        action: String,
        target_board: TargetBoard,
        user_name: String,
        timestamp: DateTime<Utc>,
    },
}

/// Full session state returned by the control plane (and to joiners for
/// history replay). A plain copy — no live references leak out of the
/// registry.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub session_id: String,
    pub host_name: String,
    pub is_public: bool,
    pub session_title: String,
    pub participants: Vec<Participant>,
    pub messages: Vec<ChatMessage>,
    pub whiteboard_actions: Vec<WhiteboardAction>,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

/// One row of the public session listing.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicSessionInfo {
    pub session_id: String,
    pub session_title: String,
    pub host_name: String,
    pub participant_count: usize,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

/// One row of the all-sessions listing.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionListEntry {
    pub session_id: String,
    pub host_name: String,
    pub participant_count: usize,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_join_frame() {
        let frame: ClientFrame =
            serde_json::from_str(r#"{"type":"join","userName":"Bob","avatar":"🦊"}"#).unwrap();
        match frame {
            ClientFrame::Join { user_name, avatar, color } => {
                assert_eq!(user_name, "Bob");
                assert_eq!(avatar.as_deref(), Some("🦊"));
                assert!(color.is_none());
            }
            other => panic!("expected Join, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_whiteboard_action_frame() {
        let frame: ClientFrame = serde_json::from_str(
            r#"{"type":"whiteboard_action","action":"tree_diagram","targetBoard":"student"}"#,
        )
        .unwrap();
        match frame {
            ClientFrame::WhiteboardAction { action, target_board } => {
                assert_eq!(action, "tree_diagram");
                assert_eq!(target_board, TargetBoard::Student);
            }
            other => panic!("expected WhiteboardAction, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_frame_type_is_tolerated() {
        let frame: ClientFrame =
            serde_json::from_str(r#"{"type":"cursor_move","x":10,"y":20}"#).unwrap();
        assert!(matches!(frame, ClientFrame::Unknown));
    }

    #[test]
    fn test_malformed_frame_is_an_error() {
        assert!(serde_json::from_str::<ClientFrame>("not json").is_err());
        assert!(serde_json::from_str::<ClientFrame>(r#"{"userName":"Bob"}"#).is_err());
    }

    #[test]
    fn test_server_event_wire_shape() {
        let event = ServerEvent::ParticipantJoined {
            user_name: "Bob".into(),
            timestamp: Utc::now(),
        };
        let value: serde_json::Value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "participant_joined");
        assert_eq!(value["userName"], "Bob");
        assert!(value["timestamp"].is_string());
    }

    #[test]
    fn test_message_event_serializes_sender_lowercase() {
        let event = ServerEvent::Message {
            id: Uuid::new_v4(),
            message: "hello".into(),
            sender: MessageSender::Bot,
            user_name: "tutor".into(),
            timestamp: Utc::now(),
        };
        let value: serde_json::Value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "message");
        assert_eq!(value["sender"], "bot");
    }
}
