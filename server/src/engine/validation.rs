use super::error::SessionError;

/// Maximum display name length.
pub const MAX_NAME_LENGTH: usize = 32;

/// Maximum session title length.
pub const MAX_TITLE_LENGTH: usize = 100;

/// Maximum chat message length (bytes).
pub const MAX_MESSAGE_LENGTH: usize = 4000;

/// Validate and normalize a display name from a create/join request.
/// The label names the field in the error ("Host name", "User name").
pub fn require_name(raw: &str, label: &str) -> Result<String, SessionError> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(SessionError::InvalidArgument(format!("{label} is required")));
    }
    if name.len() > MAX_NAME_LENGTH {
        return Err(SessionError::InvalidArgument(format!(
            "{label} too long (max {MAX_NAME_LENGTH} characters)"
        )));
    }
    Ok(name.to_string())
}

/// Validate and normalize an optional session title: trimmed, empty when
/// absent, bounded.
pub fn validate_title(raw: Option<String>) -> Result<String, SessionError> {
    let title = raw.map(|t| t.trim().to_string()).unwrap_or_default();
    if title.len() > MAX_TITLE_LENGTH {
        return Err(SessionError::InvalidArgument(format!(
            "Session title too long (max {MAX_TITLE_LENGTH} characters)"
        )));
    }
    Ok(title)
}

/// Validate chat message content. Must be non-empty and under the length limit.
pub fn validate_message(content: &str) -> Result<(), SessionError> {
    if content.trim().is_empty() {
        return Err(SessionError::InvalidArgument("Message cannot be empty".into()));
    }
    if content.len() > MAX_MESSAGE_LENGTH {
        return Err(SessionError::InvalidArgument(format!(
            "Message too long (max {MAX_MESSAGE_LENGTH} characters)"
        )));
    }
    Ok(())
}
