use super::*;
use crate::Config;
use crate::error::ApiError;
use crate::host::MemoryHost;
use crate::vault::test_helpers::create_test_vault_with;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use std::time::Duration;
use tempfile::TempDir;
use tower::ServiceExt;


/// Router over a MemoryHost vault with `configure` applied to its config
async fn test_app(
    configure: impl FnOnce(&mut Config),
) -> (Router, Arc<AttachmentVault>, Arc<MemoryHost>, TempDir) {
    let (vault, host, dir) = create_test_vault_with(MemoryHost::new(), configure).await;
    let vault = Arc::new(vault);
    let app = create_router(vault.clone(), vault.get_config());
    (app, vault, host, dir)
}

const BOUNDARY: &str = "attachvault-test-boundary";

/// multipart/form-data request builder for POST /files
#[derive(Default)]
struct Form {
    body: Vec<u8>,
}

impl Form {
    fn text(mut self, field: &str, value: &str) -> Self {
        self.body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{field}\"\r\n\r\n{value}\r\n"
            )
            .as_bytes(),
        );
        self
    }

    fn file(mut self, field: &str, file_name: &str, content: impl AsRef<[u8]>) -> Self {
        self.body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"{file_name}\"\r\n\
                 Content-Type: application/octet-stream\r\n\r\n"
            )
            .as_bytes(),
        );
        self.body.extend_from_slice(content.as_ref());
        self.body.extend_from_slice(b"\r\n");
        self
    }

    fn request(mut self) -> Request<Body> {
        self.body
            .extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        Request::builder()
            .method("POST")
            .uri("/files")
            .header(
                "content-type",
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(self.body))
            .unwrap()
    }
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn body_bytes(response: axum::response::Response) -> Vec<u8> {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec()
}

async fn api_error(response: axum::response::Response) -> ApiError {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

#[tokio::test]
async fn test_api_server_stops_on_vault_shutdown() {
    let (vault, _host, _dir) = create_test_vault_with(MemoryHost::new(), |config| {
        config.api.bind_address = "127.0.0.1:0".parse().unwrap();
    })
    .await;
    let vault = Arc::new(vault);

    let server = tokio::spawn({
        let vault = vault.clone();
        let config = vault.get_config();
        async move { start_api_server(vault, config).await }
    });
    tokio::time::sleep(Duration::from_millis(100)).await;

    vault.shutdown().await.unwrap();

    let result = tokio::time::timeout(Duration::from_secs(5), server)
        .await
        .expect("server should stop after shutdown")
        .unwrap();
    assert!(result.is_ok());
}

#[tokio::test]
async fn test_cors_enabled() {
    let (app, _vault, _host, _dir) = test_app(|config| {
        config.api.cors_enabled = true;
        config.api.cors_origins = vec!["*".to_string()];
    })
    .await;

    let request = Request::builder()
        .uri("/health")
        .header("Origin", "http://localhost:3000")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert!(
        response
            .headers()
            .contains_key("access-control-allow-origin")
    );
}

#[tokio::test]
async fn test_cors_disabled() {
    let (app, _vault, _host, _dir) = test_app(|config| config.api.cors_enabled = false).await;

    let request = Request::builder()
        .uri("/health")
        .header("Origin", "http://localhost:3000")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert!(
        !response
            .headers()
            .contains_key("access-control-allow-origin")
    );
}

#[tokio::test]
async fn test_authentication_with_api_key() {
    let (app, _vault, _host, _dir) =
        test_app(|config| config.api.api_key = Some("sekrit".to_string())).await;

    let response = app.clone().oneshot(get("/files")).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let with_header = Request::builder()
        .uri("/files")
        .header("X-Api-Key", "sekrit")
        .body(Body::empty())
        .unwrap();
    assert_eq!(app.clone().oneshot(with_header).await.unwrap().status(), StatusCode::OK);

    let with_bearer = Request::builder()
        .uri("/files")
        .header("Authorization", "Bearer sekrit")
        .body(Body::empty())
        .unwrap();
    assert_eq!(app.oneshot(with_bearer).await.unwrap().status(), StatusCode::OK);
}

#[tokio::test]
async fn test_authentication_disabled_by_default() {
    let (app, _vault, _host, _dir) = test_app(|_| {}).await;

    let response = app.oneshot(get("/files")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_swagger_ui_enabled() {
    let (app, _vault, _host, _dir) = test_app(|config| config.api.swagger_ui = true).await;

    let response = app.oneshot(get("/swagger-ui/")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = String::from_utf8(body_bytes(response).await).unwrap();
    assert!(body.contains("swagger") || body.contains("Swagger"));
}

#[tokio::test]
async fn test_default_config_serves_both_openapi_documents() {
    let config = Config::default();
    assert!(config.api.swagger_ui);
    let (app, _vault, _host, _dir) = test_app(|_| {}).await;

    for uri in ["/openapi.json", "/api-docs/openapi.json"] {
        let response = app.clone().oneshot(get(uri)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK, "{uri}");
        let doc: serde_json::Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
        assert_eq!(doc["info"]["title"], "attachvault REST API", "{uri}");
    }
}

#[tokio::test]
async fn test_swagger_ui_disabled() {
    let (app, _vault, _host, _dir) = test_app(|config| config.api.swagger_ui = false).await;

    let response = app.oneshot(get("/swagger-ui/")).await.unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
