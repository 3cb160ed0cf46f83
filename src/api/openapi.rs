//! OpenAPI documentation and schema generation
//!
//! The specification is generated at compile time by utoipa.

use utoipa::OpenApi;

/// OpenAPI documentation for the attachvault REST API
///
/// Served as JSON at `/openapi.json` and through Swagger UI at `/swagger-ui`.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "attachvault REST API",
        version = "0.1.0",
        description = "Store files of any size as chunked attachments and stream them back",
        license(
            name = "MIT OR Apache-2.0"
        )
    ),
    servers(
        (url = "http://localhost:6790", description = "Local development server")
    ),
    paths(
        // Files
        crate::api::routes::list_files,
        crate::api::routes::upload_file,
        crate::api::routes::download_file,
        crate::api::routes::get_file_info,
        crate::api::routes::delete_file,
        crate::api::routes::refresh_file_links,

        // System
        crate::api::routes::health_check,
        crate::api::routes::openapi_spec,
        crate::api::routes::event_stream,
    ),
    components(schemas(
        crate::types::FileRecord,
        crate::types::FileInfo,
        crate::types::Event,

        crate::config::Config,
        crate::config::HostConfig,
        crate::config::TransferConfig,
        crate::config::RefreshPolicy,
        crate::config::PersistenceConfig,
        crate::config::RetryConfig,
        crate::config::ApiConfig,

        crate::api::routes::RefreshResponse,

        crate::error::ApiError,
        crate::error::ErrorDetail,
    )),
    tags(
        (name = "files", description = "Files - Upload, stream, list, delete and refresh stored files"),
        (name = "system", description = "System endpoints - Health checks, OpenAPI spec, events"),
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

/// Registers the `X-Api-Key` and bearer authentication schemes
struct SecurityAddon;

impl utoipa::Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = &mut openapi.components {
            components.add_security_scheme(
                "api_key",
                utoipa::openapi::security::SecurityScheme::ApiKey(
                    utoipa::openapi::security::ApiKey::Header(
                        utoipa::openapi::security::ApiKeyValue::new("X-Api-Key"),
                    ),
                ),
            );
            components.add_security_scheme(
                "bearer",
                utoipa::openapi::security::SecurityScheme::Http(
                    utoipa::openapi::security::Http::new(
                        utoipa::openapi::security::HttpAuthScheme::Bearer,
                    ),
                ),
            );
        }
    }
}
