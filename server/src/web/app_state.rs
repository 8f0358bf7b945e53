use std::sync::Arc;

use crate::engine::registry::SessionRegistry;

/// Shared state handed to every axum handler.
pub struct AppState {
    pub registry: Arc<SessionRegistry>,
    /// Origin allowed to call the API (CORS). Localhost values allow any origin.
    pub public_url: String,
}
