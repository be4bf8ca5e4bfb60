//! Model-level endpoints: listing, lookup by id, existence, and the
//! standard mutation verbs, which this connector refuses.

use crate::{
    connector::{Connector, Filter, Where},
    errors::AppError,
    handlers::{AppState, parse_id},
    models::record::FileCollection,
    routes::remote_methods::{REMOTE_METHODS, RemoteMethod},
};
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use serde::Deserialize;
use serde_json::{Value, json};

/// Query string for `GET /{model}`: `?filter={"where":{"id":42}}`.
#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub filter: Option<String>,
}

fn parse_filter(raw: Option<&str>) -> Result<Filter, AppError> {
    match raw {
        None => Ok(Filter::default()),
        Some(raw) if raw.trim().is_empty() => Ok(Filter::default()),
        Some(raw) => serde_json::from_str(raw)
            .map_err(|err| AppError::bad_request(format!("invalid filter: {}", err))),
    }
}

/// `GET /{model}`: the container (or one record) as a single pseudo-record.
pub async fn list_all(
    State(state): State<AppState>,
    Query(q): Query<ListQuery>,
) -> Result<Json<Vec<FileCollection>>, AppError> {
    let filter = parse_filter(q.filter.as_deref())?;
    let records = state.connector.all(&state.model, &filter).await?;
    Ok(Json(records))
}

/// `GET /{model}/{id}`
pub async fn find_by_id(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<FileCollection>, AppError> {
    let record = state
        .connector
        .find_by_id(&state.model, &parse_id(&id), &Filter::default())
        .await?;
    Ok(Json(record))
}

/// `GET /{model}/{id}/exists`
pub async fn exists(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let exists = state.connector.exists(&state.model, &parse_id(&id)).await?;
    Ok(Json(json!({ "exists": exists })))
}

/// `POST /{model}`
pub async fn create(State(state): State<AppState>) -> Result<Json<Value>, AppError> {
    Ok(Json(state.connector.create(&state.model, Value::Null).await?))
}

/// `GET /{model}/count`
pub async fn count(State(state): State<AppState>) -> Result<Json<Value>, AppError> {
    let count = state.connector.count(&state.model, &Where::new()).await?;
    Ok(Json(json!({ "count": count })))
}

/// `PUT /{model}/{id}`
pub async fn replace_by_id(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let replaced = state
        .connector
        .replace_by_id(&state.model, &parse_id(&id), Value::Null)
        .await?;
    Ok(Json(replaced))
}

/// `PATCH /{model}/{id}`
pub async fn update_attributes(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let updated = state
        .connector
        .update_attributes(&state.model, &parse_id(&id), Value::Null)
        .await?;
    Ok(Json(updated))
}

/// `DELETE /{model}/{id}`
pub async fn destroy(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    state.connector.destroy(&state.model, &parse_id(&id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `GET /methods`: the remote method table routes are built from.
pub async fn list_methods() -> Json<&'static [RemoteMethod]> {
    Json(REMOTE_METHODS)
}
