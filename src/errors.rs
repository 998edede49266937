use crate::{
    bus::BridgeError,
    services::{blob_store::StorageError, catalog_store::CatalogError, ingestion::IngestionError},
};
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// Caller-facing error taxonomy shared by every service operation.
///
/// Nothing here is retried automatically; retry policy belongs to callers.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Malformed id or missing field.
    #[error("{0}")]
    Validation(String),
    /// No such record, user or blob.
    #[error("{0}")]
    NotFound(String),
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),
    #[error("{0}")]
    TransportTimeout(String),
    /// Both blobs were written but the catalog was never told about them.
    #[error(
        "blobs {audio_content_id} and {cover_content_id} were stored but the catalog notification failed: {cause}"
    )]
    PartialIngestion {
        audio_content_id: Uuid,
        cover_content_id: Uuid,
        cause: String,
    },
    #[error("decode error: {0}")]
    Decode(String),
}

impl From<BridgeError> for ServiceError {
    fn from(err: BridgeError) -> Self {
        match err {
            BridgeError::Timeout { .. } => ServiceError::TransportTimeout(err.to_string()),
            BridgeError::Codec { .. } => ServiceError::Decode(err.to_string()),
            BridgeError::Remote { message, .. } => ServiceError::StoreUnavailable(message),
            BridgeError::Transport(_) | BridgeError::NoReply(_) => {
                ServiceError::StoreUnavailable(err.to_string())
            }
        }
    }
}

impl From<StorageError> for ServiceError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::BlobNotFound(_) => ServiceError::NotFound(err.to_string()),
            StorageError::InvalidContentId(_) => ServiceError::Validation(err.to_string()),
            StorageError::Decode(_) => ServiceError::Decode(err.to_string()),
            StorageError::MissingChunk { .. }
            | StorageError::Corrupt { .. }
            | StorageError::Timeout(_)
            | StorageError::Sqlx(_)
            | StorageError::Io(_) => ServiceError::StoreUnavailable(err.to_string()),
        }
    }
}

impl From<CatalogError> for ServiceError {
    fn from(err: CatalogError) -> Self {
        match err {
            CatalogError::InvalidId(_) => ServiceError::Validation(err.to_string()),
            CatalogError::Decode(_) => ServiceError::Decode(err.to_string()),
            CatalogError::Timeout(_) | CatalogError::Sqlx(_) => {
                ServiceError::StoreUnavailable(err.to_string())
            }
        }
    }
}

impl From<IngestionError> for ServiceError {
    fn from(err: IngestionError) -> Self {
        match err {
            IngestionError::Invalid(message) => ServiceError::Validation(message),
            IngestionError::Audio(source) | IngestionError::Cover(source) => source.into(),
            IngestionError::Notify {
                audio_content_id,
                cover_content_id,
                source,
            } => ServiceError::PartialIngestion {
                audio_content_id,
                cover_content_id,
                cause: source.to_string(),
            },
        }
    }
}

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
        let body = Json(json!({
            "error": self.message,
            "status": self.status.as_u16()
        }));

        (self.status, body).into_response()
    }
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        let status = match &err {
            ServiceError::Validation(_) => StatusCode::BAD_REQUEST,
            ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
            ServiceError::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ServiceError::TransportTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            ServiceError::PartialIngestion { .. } => StatusCode::BAD_GATEWAY,
            ServiceError::Decode(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        AppError::new(status, err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn timeout_and_remote_errors_map_differently() {
        let timeout: ServiceError = BridgeError::Timeout {
            subject: "songs.all".into(),
            timeout: Duration::from_secs(10),
        }
        .into();
        let remote: ServiceError = BridgeError::Remote {
            subject: "songs.all".into(),
            message: "database is locked".into(),
        }
        .into();

        assert_eq!(AppError::from(timeout).status, StatusCode::GATEWAY_TIMEOUT);
        let remote = AppError::from(remote);
        assert_eq!(remote.status, StatusCode::SERVICE_UNAVAILABLE);
        assert!(remote.message.contains("database is locked"));
    }

    #[test]
    fn storage_errors_keep_their_category() {
        let id = Uuid::new_v4();
        assert!(matches!(
            ServiceError::from(StorageError::BlobNotFound(id)),
            ServiceError::NotFound(_)
        ));
        assert!(matches!(
            ServiceError::from(StorageError::InvalidContentId("x".into())),
            ServiceError::Validation(_)
        ));
    }
}
