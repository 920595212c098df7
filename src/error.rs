use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

/// Terminal outcomes of a transcription request, none of them are retried.
#[derive(Debug, Error)]
pub enum TranscribeError {
    #[error("{0}")]
    InvalidInput(String),
    #[error("Unsupported file format .{extension}. Allowed formats: {allowed}")]
    UnsupportedFormat { extension: String, allowed: String },
    #[error("Transcription error: {0}")]
    TranscriptionFailed(String),
}

impl TranscribeError {
    pub fn status(&self) -> StatusCode {
        match self {
            TranscribeError::InvalidInput(_) | TranscribeError::UnsupportedFormat { .. } => {
                StatusCode::BAD_REQUEST
            }
            TranscribeError::TranscriptionFailed(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

// Taken from https://github.com/tokio-rs/axum/blob/main/examples/anyhow-error-response/src/main.rs
#[derive(Debug)]
pub struct ServerError {
    pub status: StatusCode,
    pub message: HttpErrorResponse,
}

#[derive(Debug, Serialize)]
pub struct HttpErrorResponse {
    pub(crate) detail: String,
}

impl From<String> for HttpErrorResponse {
    fn from(message: String) -> Self {
        HttpErrorResponse { detail: message }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let mut res = Json(self.message).into_response();
        *res.status_mut() = self.status;
        res
    }
}

impl<E> From<E> for ServerError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        let err = err.into();
        let status = err
            .downcast_ref::<TranscribeError>()
            .map_or(StatusCode::INTERNAL_SERVER_ERROR, TranscribeError::status);
        ServerError {
            status,
            message: HttpErrorResponse::from(err.to_string()),
        }
    }
}

pub type ServerResult<T, E = ServerError> = Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn taxonomy_keeps_its_status_through_conversion() {
        let err: ServerError = TranscribeError::UnsupportedFormat {
            extension: "ogg".into(),
            allowed: ".mp3".into(),
        }
        .into();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert_eq!(
            err.message.detail,
            "Unsupported file format .ogg. Allowed formats: .mp3"
        );

        let err: ServerError = TranscribeError::TranscriptionFailed("corrupt".into()).into();
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.message.detail, "Transcription error: corrupt");
    }

    #[test]
    fn foreign_errors_are_server_errors() {
        let err: ServerError = anyhow::anyhow!("disk full").into();
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.message.detail, "disk full");
    }
}
