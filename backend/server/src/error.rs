use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use store::StoreError;
use thiserror::Error;
use tracing::error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Malformed payload")]
    MalformedPayload,

    #[error("Payload too large")]
    PayloadTooLarge,

    #[error("{0}")]
    Validation(String),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("Join the event first")]
    NotJoined,

    #[error("Already voted")]
    AlreadyVoted,

    #[error("Voting is not open yet")]
    VotingClosed,

    #[error("Unsupported photo: {0}")]
    UnsupportedPhoto(String),

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    InternalError(#[from] Box<dyn std::error::Error + Send + Sync>),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match self {
            AppError::MalformedPayload | AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::NotJoined => StatusCode::FORBIDDEN,
            AppError::AlreadyVoted | AppError::VotingClosed => StatusCode::CONFLICT,
            AppError::UnsupportedPhoto(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            AppError::Store(_) | AppError::Io(_) | AppError::InternalError(_) => {
                error!("{self}");
                return (StatusCode::INTERNAL_SERVER_ERROR, "Internal error").into_response();
            }
        };

        (status, self.to_string()).into_response()
    }
}
