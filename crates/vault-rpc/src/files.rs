//! File endpoints: multipart uploads and archive-scoped downloads.
//!
//! These sit outside JSON-RPC because their bodies are raw bytes. Errors are
//! returned as `{success: false, error}` with a matching HTTP status.

use crate::server::AppState;
use crate::wrapper::wrap_response;
use axum::{
    extract::{Multipart, Path, Request, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use model_vault::{naming, UploadRequest, VaultError};
use serde_json::{json, Value};
use std::fmt;
use std::sync::Arc;
use tower::ServiceExt;
use tower_http::services::ServeFile;
use tracing::debug;

/// Error returned by the file endpoints.
#[derive(Debug)]
pub struct HttpError {
    status: StatusCode,
    message: String,
}

impl HttpError {
    fn unauthorized(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::UNAUTHORIZED,
            message: message.into(),
        }
    }

    fn bad_request(err: impl fmt::Display) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: err.to_string(),
        }
    }
}

impl From<VaultError> for HttpError {
    fn from(err: VaultError) -> Self {
        let status = match &err {
            VaultError::Validation { .. } => StatusCode::BAD_REQUEST,
            e if e.is_not_found() => StatusCode::NOT_FOUND,
            VaultError::Forbidden { .. } => StatusCode::FORBIDDEN,
            VaultError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            VaultError::Conflict { .. } => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            message: err.to_string(),
        }
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let body = json!({
            "success": false,
            "error": self.message,
        });
        (self.status, Json(body)).into_response()
    }
}

/// Fields collected from an upload form.
#[derive(Default)]
struct UploadForm {
    name: String,
    description: String,
    archive_id: Option<u64>,
    file_name: Option<String>,
    content: Option<Vec<u8>>,
}

impl UploadForm {
    async fn read(multipart: &mut Multipart) -> Result<Self, HttpError> {
        let mut form = Self::default();

        while let Some(field) = multipart.next_field().await.map_err(HttpError::bad_request)? {
            let field_name = field.name().unwrap_or_default().to_string();
            match field_name.as_str() {
                "file" => {
                    form.file_name = field.file_name().map(String::from);
                    let bytes = field.bytes().await.map_err(HttpError::bad_request)?;
                    form.content = Some(bytes.to_vec());
                }
                "name" => form.name = field.text().await.map_err(HttpError::bad_request)?,
                "description" => {
                    form.description = field.text().await.map_err(HttpError::bad_request)?
                }
                "archive_id" => {
                    let raw = field.text().await.map_err(HttpError::bad_request)?;
                    if !raw.trim().is_empty() {
                        form.archive_id = Some(naming::parse_id("archive_id", &raw)?);
                    }
                }
                other => debug!("Ignoring upload field {:?}", other),
            }
        }

        Ok(form)
    }
}

/// `POST /api/models/upload`
pub async fn handle_upload(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<Value>), HttpError> {
    let principal = state
        .principal(&headers)
        .await
        .ok_or_else(|| HttpError::unauthorized("Authorization required"))?;

    // Refuse before reading a potentially large body
    principal.require_admin("upload models")?;

    let form = UploadForm::read(&mut multipart).await?;
    let (Some(file_name), Some(content)) = (form.file_name, form.content) else {
        return Err(VaultError::validation("file", "No file uploaded").into());
    };

    let view = state
        .registry
        .upload_model(
            &principal,
            UploadRequest {
                name: form.name,
                description: form.description,
                original_file_name: file_name,
                archive_id: form.archive_id,
                content,
            },
        )
        .await?;

    let data = serde_json::to_value(view).map_err(VaultError::from)?;
    Ok((StatusCode::CREATED, Json(wrap_response("upload_model", data))))
}

/// `GET /api/archives/:archive_name/files/:file_name`
///
/// Requires a session issued by `archive_login` for the same archive.
pub async fn handle_archive_file(
    State(state): State<Arc<AppState>>,
    Path((archive_name, file_name)): Path<(String, String)>,
    headers: HeaderMap,
    request: Request,
) -> Result<Response, HttpError> {
    let principal = state
        .principal(&headers)
        .await
        .ok_or_else(|| HttpError::unauthorized("Authorization required"))?;

    let path = state
        .registry
        .archive_file(&principal, &archive_name, &file_name)
        .await?;

    match ServeFile::new(path).oneshot(request).await {
        Ok(response) => Ok(response.into_response()),
        Err(never) => match never {},
    }
}
