//! Instance-scoped file operations: `/{id}/files/...` and `/{id}/download/...`.

use crate::{
    errors::AppError,
    handlers::{AppState, parse_id},
    services::transfer::{UploadOptions, UploadResult},
};
use axum::{
    Json,
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    response::Response,
};
use serde::Deserialize;
use serde_json::Value;

/// Query string for `GET /{id}/files/{file}`.
#[derive(Debug, Default, Deserialize)]
pub struct FileQuery {
    /// Also return the metadata exactly as the provider reported it.
    #[serde(default)]
    pub raw: bool,
}

/// `GET /{id}/files/{file}`: metadata of one file.
pub async fn get_file(
    State(state): State<AppState>,
    Path((id, file)): Path<(String, String)>,
    Query(q): Query<FileQuery>,
) -> Result<Json<Value>, AppError> {
    let stored = state.connector.file(&parse_id(&id), &file).await?;
    let mut body = serde_json::to_value(&stored)
        .map_err(|err| AppError::internal(format!("serializing file metadata: {}", err)))?;
    if q.raw {
        if let Value::Object(map) = &mut body {
            map.insert("raw".into(), Value::Object(stored.raw_metadata().clone()));
        }
    }
    Ok(Json(body))
}

/// `DELETE /{id}/files/{file}`
pub async fn remove_file(
    State(state): State<AppState>,
    Path((id, file)): Path<(String, String)>,
) -> Result<StatusCode, AppError> {
    state.connector.remove_file(&parse_id(&id), &file).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `POST /{id}/files/upload`: multipart upload into the record's folder.
pub async fn upload(
    State(state): State<AppState>,
    Path(id): Path<String>,
    multipart: Multipart,
) -> Result<Json<UploadResult>, AppError> {
    let result = state
        .connector
        .upload(&parse_id(&id), multipart, UploadOptions::default())
        .await?;
    Ok(Json(result))
}

/// `GET /{id}/download/{file}`: streams the file body.
pub async fn download(
    State(state): State<AppState>,
    Path((id, file)): Path<(String, String)>,
) -> Result<Response, AppError> {
    Ok(state.connector.download(&parse_id(&id), &file).await?)
}
