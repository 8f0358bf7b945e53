use chrono::{DateTime, Utc};
use tokio::sync::mpsc;

use super::events::{ConnectionId, ServerEvent};

/// Maximum queued outbound events per connection (prevents memory exhaustion from slow clients).
pub const MAX_OUTBOUND_QUEUE: usize = 1024;

/// A live WebSocket connection bound to one (session, participant) pair.
/// Holds only back-references — all session mutation goes through the registry.
#[derive(Debug)]
pub struct ConnectionHandle {
    pub id: ConnectionId,
    pub session_id: String,
    pub user_name: String,
    /// Send outbound events to this connection's write loop (bounded to prevent memory exhaustion).
    pub outbound: mpsc::Sender<ServerEvent>,
    pub connected_at: DateTime<Utc>,
}

impl ConnectionHandle {
    pub fn new(
        id: ConnectionId,
        session_id: String,
        user_name: String,
        outbound: mpsc::Sender<ServerEvent>,
    ) -> Self {
        Self {
            id,
            session_id,
            user_name,
            outbound,
            connected_at: Utc::now(),
        }
    }

    /// Send an event to this connection. Returns false if the channel is closed
    /// or the outbound queue is full (slow client protection — drops event rather than blocking).
    pub fn send(&self, event: ServerEvent) -> bool {
        self.outbound.try_send(event).is_ok()
    }
}
