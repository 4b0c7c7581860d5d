use std::io;

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use crate::pages::{NO_INDEX, X_ROBOTS_TAG};

/// Reasons a download ends without a body.
#[derive(Debug, Error)]
pub enum TransferError {
    /// The requested name is absent, undecodable, or not a regular file.
    #[error("file not found")]
    NotFound,

    /// Reading or compressing the file failed before any header was written.
    #[error("source read failed: {0}")]
    Source(#[from] io::Error),
}

impl IntoResponse for TransferError {
    fn into_response(self) -> Response {
        let policy = [
            (header::CACHE_CONTROL, HeaderValue::from_static("no-cache")),
            (X_ROBOTS_TAG, HeaderValue::from_static(NO_INDEX)),
        ];
        match self {
            TransferError::NotFound => (StatusCode::NOT_FOUND, policy).into_response(),
            TransferError::Source(e) => {
                tracing::error!("download aborted before headers: {e}");
                let close = [(header::CONNECTION, HeaderValue::from_static("close"))];
                (StatusCode::INTERNAL_SERVER_ERROR, policy, close).into_response()
            }
        }
    }
}

/// Failures while receiving an upload.
#[derive(Debug, Error)]
pub enum UploadError {
    #[error("malformed multipart body: {0}")]
    Multipart(#[from] multer::Error),

    #[error("failed to store upload: {0}")]
    Io(#[from] io::Error),
}

impl IntoResponse for UploadError {
    fn into_response(self) -> Response {
        tracing::error!("{self}");
        let status = match self {
            UploadError::Multipart(_) => StatusCode::BAD_REQUEST,
            UploadError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, "Error").into_response()
    }
}
