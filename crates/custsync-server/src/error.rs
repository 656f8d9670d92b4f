//! Server-specific error types

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::db::DbError;
use crate::sync::{GateRejection, SyncError};

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error("Google Sheets authorization required")]
    ConsentRequired { auth_url: String },

    #[error("Database error: {0}")]
    Database(#[from] DbError),

    #[error("Not found: {0}")]
    NotFound(String),
}

impl From<GateRejection> for AppError {
    fn from(rejection: GateRejection) -> Self {
        AppError::Sync(rejection.into())
    }
}

fn retry_after_secs(rejection: &GateRejection) -> Option<u64> {
    match rejection {
        GateRejection::RateLimited { retry_after, .. } => {
            let secs = retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0);
            Some(secs.max(1))
        }
        GateRejection::Busy { .. } => None,
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let mut retry_after = None;
        let mut auth_url = None;

        let (status, error_message) = match self {
            AppError::Sync(SyncError::Rejected(ref rejection)) => {
                tracing::debug!(reason = %rejection, "sync request rejected");
                retry_after = retry_after_secs(rejection);
                (StatusCode::TOO_MANY_REQUESTS, rejection.to_string())
            }
            AppError::Sync(ref e @ SyncError::Adapter(_)) => {
                tracing::error!(error = %e, "Sheets request failed during sync");
                (StatusCode::BAD_GATEWAY, e.to_string())
            }
            AppError::Sync(ref e @ SyncError::Store(_)) => {
                tracing::error!(error = %e, "database failure during sync");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "A database error occurred during sync".to_string(),
                )
            }
            AppError::ConsentRequired { auth_url: url } => {
                let message = "Google Sheets authorization required".to_string();
                auth_url = Some(url);
                (StatusCode::UNAUTHORIZED, message)
            }
            AppError::Database(ref e) => {
                tracing::error!("Database error: {:?}", e);
                (StatusCode::SERVICE_UNAVAILABLE, "Database unavailable".to_string())
            }
            AppError::NotFound(ref message) => (StatusCode::NOT_FOUND, message.clone()),
        };

        let mut error = json!({
            "message": error_message,
            "status": status.as_u16(),
        });
        if let Some(url) = auth_url {
            error["auth_url"] = json!(url);
        }
        if let Some(secs) = retry_after {
            error["retry_after_secs"] = json!(secs);
        }

        let mut response = (status, Json(json!({ "error": error }))).into_response();
        if let Some(secs) = retry_after {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(secs));
        }
        response
    }
}

pub type AppResult<T> = std::result::Result<T, AppError>;
