//! Route handlers for the REST API
//!
//! Handlers are organized by domain:
//! - [`files`] - Upload, download, listing, deletion and link refresh
//! - [`system`] - Health, events, OpenAPI

use serde::{Deserialize, Serialize};

mod files;
mod system;

pub use files::*;
pub use system::*;

/// Response body of POST /files/:name/refresh
#[derive(Debug, Deserialize, Serialize, utoipa::ToSchema)]
pub struct RefreshResponse {
    /// File name
    pub name: String,
    /// Number of links refreshed and persisted
    pub refreshed: usize,
}
