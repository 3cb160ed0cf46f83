//! File handlers: list, upload, download, info, delete, refresh.

use super::RefreshResponse;
use crate::api::AppState;
use crate::error::{ApiError, Error};
use crate::types::FileInfo;
use crate::utils::content_disposition;
use axum::{
    Json,
    body::Body,
    extract::{Multipart, Path, State},
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use futures::StreamExt;

/// GET /files - List stored files
#[utoipa::path(
    get,
    path = "/files",
    tag = "files",
    responses(
        (status = 200, description = "Stored files sorted by name", body = Vec<FileInfo>)
    )
)]
pub async fn list_files(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.vault.list_files().await)
}

/// POST /files - Upload a file
///
/// Expects `multipart/form-data` with a `file` field. An optional text field
/// `name`, sent before `file`, overrides the uploaded filename. The file field
/// is streamed straight into the chunker without buffering the whole body.
#[utoipa::path(
    post,
    path = "/files",
    tag = "files",
    request_body(content = Vec<u8>, description = "File upload (multipart/form-data)", content_type = "multipart/form-data"),
    responses(
        (status = 201, description = "File stored", body = FileInfo),
        (status = 400, description = "Missing file field, empty file or invalid name", body = ApiError),
        (status = 413, description = "Request body exceeds api.max_upload_bytes", body = ApiError),
        (status = 502, description = "Attachment host rejected a chunk", body = ApiError),
        (status = 503, description = "Vault is shutting down", body = ApiError)
    )
)]
pub async fn upload_file(State(state): State<AppState>, mut multipart: Multipart) -> Response {
    let mut name_override: Option<String> = None;

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => return multipart_rejection(e.status(), e.body_text()),
        };

        let field_name = field.name().unwrap_or("").to_string();
        match field_name.as_str() {
            "name" => match field.text().await {
                Ok(text) if !text.trim().is_empty() => name_override = Some(text.trim().to_string()),
                Ok(_) => {}
                Err(e) => return multipart_rejection(e.status(), e.body_text()),
            },
            "file" => {
                let Some(name) = name_override
                    .take()
                    .or_else(|| field.file_name().map(str::to_string))
                else {
                    return (
                        StatusCode::BAD_REQUEST,
                        Json(ApiError::validation(
                            "No file name given in 'name' field or file part",
                        )),
                    )
                        .into_response();
                };

                let mut body_error: Option<(StatusCode, String)> = None;
                let data = Box::pin(field.map(|piece| {
                    piece.map_err(|e| {
                        let message = e.body_text();
                        body_error = Some((e.status(), message.clone()));
                        Error::Other(format!("failed to read upload body: {message}"))
                    })
                }));

                let result = state.vault.upload(&name, data, None).await;

                return match (result, body_error) {
                    (Ok(record), _) => {
                        (StatusCode::CREATED, Json(FileInfo::from(&record))).into_response()
                    }
                    (Err(_), Some((status, message))) => multipart_rejection(status, message),
                    (Err(e), None) => e.into_response(),
                };
            }
            _ => {}
        }
    }

    (
        StatusCode::BAD_REQUEST,
        Json(ApiError::new(
            "missing_file",
            "No file provided in 'file' field",
        )),
    )
        .into_response()
}

/// GET /files/{name} - Stream a stored file
#[utoipa::path(
    get,
    path = "/files/{name}",
    tag = "files",
    params(
        ("name" = String, Path, description = "File name")
    ),
    responses(
        (status = 200, description = "File content", content_type = "application/octet-stream"),
        (status = 404, description = "File not found", body = ApiError),
        (status = 502, description = "Link refresh failed", body = ApiError),
        (status = 503, description = "Vault is shutting down", body = ApiError)
    )
)]
pub async fn download_file(State(state): State<AppState>, Path(name): Path<String>) -> Response {
    let stream = match state.vault.download(&name).await {
        Ok(stream) => stream,
        Err(e) => return e.into_response(),
    };
    let size = stream.size_bytes();

    let mut response = Body::from_stream(stream).into_response();
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/octet-stream"),
    );
    if let Ok(value) = HeaderValue::from_str(&content_disposition(&name)) {
        headers.insert(header::CONTENT_DISPOSITION, value);
    }
    if let Some(size) = size {
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from(size));
    }
    response
}

/// GET /files/{name}/info - File metadata
#[utoipa::path(
    get,
    path = "/files/{name}/info",
    tag = "files",
    params(
        ("name" = String, Path, description = "File name")
    ),
    responses(
        (status = 200, description = "File metadata", body = FileInfo),
        (status = 404, description = "File not found", body = ApiError)
    )
)]
pub async fn get_file_info(State(state): State<AppState>, Path(name): Path<String>) -> Response {
    match state.vault.get_file(&name).await {
        Ok(record) => Json(FileInfo::from(&record)).into_response(),
        Err(e) => e.into_response(),
    }
}

/// DELETE /files/{name} - Remove a file from the registry
///
/// Chunks already on the attachment host are left in place.
#[utoipa::path(
    delete,
    path = "/files/{name}",
    tag = "files",
    params(
        ("name" = String, Path, description = "File name")
    ),
    responses(
        (status = 204, description = "File removed"),
        (status = 404, description = "File not found", body = ApiError)
    )
)]
pub async fn delete_file(State(state): State<AppState>, Path(name): Path<String>) -> Response {
    match state.vault.delete(&name).await {
        Ok(_) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => e.into_response(),
    }
}

/// POST /files/{name}/refresh - Refresh and persist chunk links
#[utoipa::path(
    post,
    path = "/files/{name}/refresh",
    tag = "files",
    params(
        ("name" = String, Path, description = "File name")
    ),
    responses(
        (status = 200, description = "Links refreshed", body = RefreshResponse),
        (status = 404, description = "File not found", body = ApiError),
        (status = 409, description = "File was replaced while its links were refreshed", body = ApiError),
        (status = 502, description = "Attachment host refused the refresh", body = ApiError)
    )
)]
pub async fn refresh_file_links(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Response {
    match state.vault.refresh_links(&name).await {
        Ok(record) => Json(RefreshResponse {
            name: record.name,
            refreshed: record.total_chunks,
        })
        .into_response(),
        Err(e) => e.into_response(),
    }
}

fn multipart_rejection(status: StatusCode, message: String) -> Response {
    tracing::warn!(status = %status, message = %message, "rejected multipart upload");
    (status, Json(ApiError::new("invalid_body", message))).into_response()
}
