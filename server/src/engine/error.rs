use thiserror::Error;

/// Errors surfaced by registry operations. The web layer maps these to
/// HTTP statuses; the WebSocket handler closes the connection on the
/// ones that can occur at connect time.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// A create/join request is missing a required field.
    #[error("{0}")]
    InvalidArgument(String),

    /// No session exists with the given ID.
    #[error("Session not found")]
    NotFound,

    /// The requested display name is already taken within the session.
    #[error("User name already taken in this session")]
    NameConflict,
}
