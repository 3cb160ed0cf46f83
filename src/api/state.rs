//! Application state for the API server

use crate::{AttachmentVault, Config};
use std::sync::Arc;

/// Shared application state accessible to all route handlers
///
/// Cloned for each request (cheap Arc clone).
#[derive(Clone)]
pub struct AppState {
    /// The vault serving every request
    pub vault: Arc<AttachmentVault>,

    /// Configuration (read-only)
    pub config: Arc<Config>,
}

impl AppState {
    /// Create a new AppState
    pub fn new(vault: Arc<AttachmentVault>, config: Arc<Config>) -> Self {
        Self { vault, config }
    }
}
