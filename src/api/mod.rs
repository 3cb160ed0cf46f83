//! REST API server module
//!
//! Exposes the vault over HTTP: multipart uploads streamed into the chunker,
//! streamed downloads, listing, deletion, link refresh and an SSE event feed.

use crate::{AttachmentVault, Config, Result};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::HeaderValue,
    middleware,
    routing::{get, post},
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

pub mod auth;
pub mod error_response;
pub mod openapi;
pub mod routes;
pub mod state;

pub use openapi::ApiDoc;
pub use state::AppState;

/// Create the API router with all route definitions
///
/// # Routes
///
/// ## Files
/// - `GET /files` - List stored files
/// - `POST /files` - Upload a file (multipart field `file`, optional `name`)
/// - `GET /files/:name` - Stream a file back
/// - `GET /files/:name/info` - File metadata
/// - `DELETE /files/:name` - Remove a file from the registry
/// - `POST /files/:name/refresh` - Refresh and persist chunk links
///
/// ## System
/// - `GET /health` - Health check
/// - `GET /openapi.json` - OpenAPI specification
/// - `GET /swagger-ui` - Interactive Swagger UI documentation (if enabled),
///   reading its document from `/api-docs/openapi.json`
/// - `GET /events` - Server-sent events stream
pub fn create_router(vault: Arc<AttachmentVault>, config: Arc<Config>) -> Router {
    let state = AppState::new(vault, config.clone());

    let router = Router::new()
        // Files
        .route("/files", get(routes::list_files).post(routes::upload_file))
        .route(
            "/files/:name",
            get(routes::download_file).delete(routes::delete_file),
        )
        .route("/files/:name/info", get(routes::get_file_info))
        .route("/files/:name/refresh", post(routes::refresh_file_links))
        // System
        .route("/health", get(routes::health_check))
        .route("/openapi.json", get(routes::openapi_spec))
        .route("/events", get(routes::event_stream));

    // SwaggerUi serves its own copy of the document; /openapi.json is taken above
    let router = if config.api.swagger_ui {
        router.merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
    } else {
        router
    };

    let router = router.with_state(state);

    // Last layer applied runs first: Trace -> CORS -> Auth -> Body limit -> Handler
    let router = match config.api.max_upload_bytes {
        Some(limit) => router.layer(DefaultBodyLimit::max(limit)),
        None => router.layer(DefaultBodyLimit::disable()),
    };

    let router = if config.api.api_key.is_some() {
        router.layer(middleware::from_fn_with_state(
            config.api.api_key.clone(),
            auth::require_api_key,
        ))
    } else {
        router
    };

    let router = if config.api.cors_enabled {
        router.layer(build_cors_layer(&config.api.cors_origins))
    } else {
        router
    };

    router.layer(TraceLayer::new_for_http())
}

/// Build a CORS layer based on configured origins
///
/// `"*"` or an empty list allows any origin.
fn build_cors_layer(origins: &[String]) -> CorsLayer {
    let allow_any = origins.iter().any(|o| o == "*");

    if allow_any || origins.is_empty() {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let allowed: Vec<HeaderValue> = origins.iter().filter_map(|o| o.parse().ok()).collect();

        CorsLayer::new()
            .allow_origin(AllowOrigin::list(allowed))
            .allow_methods(Any)
            .allow_headers(Any)
    }
}

/// Start the API server on the configured bind address.
///
/// Runs until the vault shuts down or the listener fails.
///
/// # Example
///
/// ```no_run
/// use attachvault::{AttachmentVault, Config};
/// use std::sync::Arc;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = Arc::new(Config::from_env()?);
/// let vault = Arc::new(AttachmentVault::new((*config).clone()).await?);
///
/// attachvault::api::start_api_server(vault, config).await?;
/// # Ok(())
/// # }
/// ```
pub async fn start_api_server(vault: Arc<AttachmentVault>, config: Arc<Config>) -> Result<()> {
    let bind_address = config.api.bind_address;

    tracing::info!(
        address = %bind_address,
        host = vault.host_name(),
        "Starting API server"
    );

    let shutdown = vault.shutdown_token();
    let app = create_router(vault, config);

    let listener = TcpListener::bind(bind_address)
        .await
        .map_err(crate::error::Error::Io)?;

    tracing::info!(
        address = %bind_address,
        "API server listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await
        .map_err(|e| crate::error::Error::ApiServerError(e.to_string()))?;

    tracing::info!("API server stopped");
    Ok(())
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;
