use crate::{
    connector::ConnectorError,
    services::{storage_client::StorageError, transfer::TransferError},
};
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::fmt;

/// A lightweight wrapper for general errors that keeps the message local.
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
}

impl AppError {
    /// Create a new AppError with a specific status and message.
    pub fn new(status: StatusCode, msg: impl Into<String>) -> Self {
        Self {
            status,
            message: msg.into(),
        }
    }

    /// Shortcut for a 500 Internal Server Error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, msg)
    }

    /// Shortcut for 400 Bad Request
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, msg)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!(status = self.status.as_u16(), "{}", self.message);
        }
        let body = Json(json!({
            "error": self.message,
            "status": self.status.as_u16()
        }));

        (self.status, body).into_response()
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::internal(err.to_string())
    }
}

fn storage_status(err: &StorageError) -> StatusCode {
    match err {
        StorageError::NotFound { .. } => StatusCode::NOT_FOUND,
        StorageError::Provider(inner) if inner.kind() == opendal::ErrorKind::NotFound => {
            StatusCode::NOT_FOUND
        }
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn transfer_status(err: &TransferError) -> StatusCode {
    match err {
        TransferError::MissingContainer => StatusCode::INTERNAL_SERVER_ERROR,
        TransferError::InvalidFileName(_)
        | TransferError::InvalidFieldEncoding(_)
        | TransferError::ContentTypeNotAllowed { .. } => StatusCode::BAD_REQUEST,
        TransferError::FileTooLarge { .. } | TransferError::FieldsTooLarge { .. } => {
            StatusCode::PAYLOAD_TOO_LARGE
        }
        TransferError::Multipart(inner) => inner.status(),
        TransferError::Storage(inner) => storage_status(inner),
    }
}

impl From<ConnectorError> for AppError {
    fn from(err: ConnectorError) -> Self {
        let status = match &err {
            ConnectorError::OperationNotPermitted => StatusCode::FORBIDDEN,
            ConnectorError::Storage(inner) => storage_status(inner),
            ConnectorError::Transfer(inner) => transfer_status(inner),
        };
        AppError::new(status, err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_connector_errors_to_statuses() {
        let denied = AppError::from(ConnectorError::OperationNotPermitted);
        assert_eq!(denied.status, StatusCode::FORBIDDEN);
        assert_eq!(denied.message, "Operation not permitted");

        let missing = AppError::from(ConnectorError::Storage(StorageError::NotFound {
            container: "c".into(),
            path: "1/a".into(),
        }));
        assert_eq!(missing.status, StatusCode::NOT_FOUND);

        let too_big = AppError::from(ConnectorError::Transfer(TransferError::FileTooLarge {
            limit: 1,
        }));
        assert_eq!(too_big.status, StatusCode::PAYLOAD_TOO_LARGE);

        let rejected = AppError::from(ConnectorError::Transfer(
            TransferError::ContentTypeNotAllowed {
                content_type: "text/html".into(),
                allowed: vec!["image/png".into()],
            },
        ));
        assert_eq!(rejected.status, StatusCode::BAD_REQUEST);
    }
}
