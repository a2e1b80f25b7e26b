use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    /// Missing, malformed or mismatched `x-hub-signature-256`.
    #[error("invalid webhook signature")]
    InvalidSignature,

    /// Neither the tenant row nor the process defaults provide usable credentials.
    #[error("no WhatsApp credentials available for tenant {tenant_id}")]
    MissingCredentials { tenant_id: String },

    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("whatsapp send failed with status {status}: {body}")]
    Delivery { status: u16, body: String },

    #[error("http client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid decision tree: {0}")]
    InvalidTree(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::InvalidSignature => StatusCode::UNAUTHORIZED,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = match self {
            AppError::InvalidSignature => "Invalid signature",
            _ => "Server error",
        };
        (self.status_code(), body).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;
