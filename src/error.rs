use opentelemetry_semantic_conventions::{attribute::OTEL_STATUS_CODE, trace::ERROR_TYPE};
use rocket::http::Status;
use rocket::response::status::Custom;
use rocket::serde::json::Json;
use thiserror::Error;
use tracing::{Span, error, warn};

use crate::auth::AuthError;
use crate::validation::ErrorResponse;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Authentication error: {0}")]
    Authentication(#[from] AuthError),

    #[error("Authorization error: {0}")]
    Authorization(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Validation error: {0}")]
    InvalidFields(#[from] validator::ValidationErrors),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Maps a unique-constraint violation to `Conflict`, anything else to `Database`.
    pub fn from_write(err: sqlx::Error, conflict: &str) -> Self {
        match &err {
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                AppError::Conflict(conflict.to_string())
            }
            _ => AppError::Database(err),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            AppError::Database(_) => "storage_error",
            AppError::Authentication(AuthError::Unexpected) => "internal_error",
            AppError::Authentication(_) => "unauthorized",
            AppError::Authorization(_) => "forbidden",
            AppError::Conflict(_) => "conflict",
            AppError::NotFound(_) => "not_found",
            AppError::Validation(_) | AppError::InvalidFields(_) => "bad_request",
            AppError::Internal(_) => "internal_error",
        }
    }

    pub fn log_and_record(&self, ctx: &str) {
        let current_span = Span::current();
        let is_valid_span = !current_span.is_none();

        let message = self.to_string();
        match self {
            AppError::Database(err) => {
                error!(error = %message, context = %ctx, db_error = %err, "Database error");
            }
            AppError::Authentication(AuthError::Unexpected) => {
                error!(context = %ctx, "Credential verification failed unexpectedly");
            }
            AppError::Authentication(err) => {
                warn!(reason = %err, context = %ctx, "Authentication error");
            }
            AppError::Authorization(msg) => {
                warn!(message = %msg, context = %ctx, "Authorization error");
            }
            AppError::Conflict(msg) => {
                warn!(message = %msg, context = %ctx, "Conflict error");
            }
            AppError::NotFound(msg) => {
                warn!(message = %msg, context = %ctx, "Not found error");
            }
            AppError::Validation(msg) => {
                warn!(message = %msg, context = %ctx, "Validation error");
            }
            AppError::InvalidFields(errors) => {
                warn!(errors = %errors, context = %ctx, "Validation error");
            }
            AppError::Internal(msg) => {
                error!(message = %msg, context = %ctx, "Internal server error");
            }
        };

        if is_valid_span {
            current_span.record("error", tracing::field::display(true));
            current_span.record(ERROR_TYPE, tracing::field::display(self.kind()));
            current_span.record("error.message", tracing::field::display(&message));

            if self.status_code().code >= 500 {
                current_span.record(OTEL_STATUS_CODE, tracing::field::display("ERROR"));
            }
        }
    }

    pub fn status_code(&self) -> Status {
        match self {
            AppError::Database(_) => Status::InternalServerError,
            AppError::Authentication(err) => err.status(),
            AppError::Authorization(_) => Status::Forbidden,
            AppError::Conflict(_) => Status::Conflict,
            AppError::NotFound(_) => Status::NotFound,
            AppError::Validation(_) | AppError::InvalidFields(_) => Status::BadRequest,
            AppError::Internal(_) => Status::InternalServerError,
        }
    }

    /// Body shown to the caller. Storage and internal failures never carry detail.
    pub fn to_response(&self) -> ErrorResponse {
        match self {
            AppError::Database(_) | AppError::Internal(_) => {
                ErrorResponse::new(self.kind(), "Internal server error")
            }
            AppError::Authentication(AuthError::Unexpected) => {
                ErrorResponse::new(self.kind(), "Internal server error")
            }
            AppError::Authentication(err) => ErrorResponse::new(self.kind(), &err.to_string()),
            AppError::Authorization(msg) => {
                ErrorResponse::new(self.kind(), &format!("Permission denied: {}", msg))
            }
            AppError::Conflict(msg) | AppError::NotFound(msg) | AppError::Validation(msg) => {
                ErrorResponse::new(self.kind(), msg)
            }
            AppError::InvalidFields(errors) => ErrorResponse::from_validation(errors),
        }
    }
}

impl<'r> rocket::response::Responder<'r, 'static> for AppError {
    fn respond_to(self, req: &'r rocket::Request<'_>) -> rocket::response::Result<'static> {
        self.log_and_record(&format!("Request to {} {}", req.method(), req.uri()));
        Custom(self.status_code(), Json(self.to_response())).respond_to(req)
    }
}

impl From<bcrypt::BcryptError> for AppError {
    fn from(error: bcrypt::BcryptError) -> Self {
        AppError::Internal(format!("Cryptography error: {}", error))
    }
}

impl From<sqlx::migrate::MigrateError> for AppError {
    fn from(error: sqlx::migrate::MigrateError) -> Self {
        AppError::Internal(format!("Migration error: {}", error))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(error: serde_json::Error) -> Self {
        AppError::Internal(format!("Serialization error: {}", error))
    }
}
