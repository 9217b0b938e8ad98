use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{error, warn};

use crate::auth::SessionError;
use crate::services::{AccountError, WorkflowError};
use crate::store::StoreError;
use crate::utils::response::error as error_response;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Authentication error: {0}")]
    AuthError(String),

    #[error("Not logged in")]
    Unauthenticated { login_path: &'static str },

    #[error("Email already registered: {0}")]
    DuplicateEmail(String),

    #[error("Resource not found: {message}")]
    NotFound {
        message: String,
        redirect_to: Option<String>,
    },

    #[error("Application {application_id} is still open")]
    PendingApplication { application_id: i64 },

    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    #[error("Pass generation failed: {0}")]
    GenerationError(String),

    #[error("Connection failure: {0}")]
    ConnectionFailure(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Internal server error: {0}")]
    InternalServerError(String),
}

impl AppError {
    pub fn not_found(message: impl Into<String>) -> Self {
        AppError::NotFound {
            message: message.into(),
            redirect_to: None,
        }
    }

    /// Points a not-found error at the page the client should fall back to.
    pub fn with_redirect(self, path: impl Into<String>) -> Self {
        match self {
            AppError::NotFound { message, .. } => AppError::NotFound {
                message,
                redirect_to: Some(path.into()),
            },
            other => other,
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::ValidationError(_) => StatusCode::BAD_REQUEST,
            AppError::AuthError(_) | AppError::Unauthenticated { .. } => StatusCode::UNAUTHORIZED,
            AppError::NotFound { .. } => StatusCode::NOT_FOUND,
            AppError::DuplicateEmail(_)
            | AppError::PendingApplication { .. }
            | AppError::InvalidTransition(_) => StatusCode::CONFLICT,
            AppError::ConnectionFailure(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::GenerationError(_)
            | AppError::DatabaseError(_)
            | AppError::InternalServerError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            AppError::ValidationError(_) => "VALIDATION_ERROR",
            AppError::AuthError(_) => "AUTH_ERROR",
            AppError::Unauthenticated { .. } => "UNAUTHENTICATED",
            AppError::DuplicateEmail(_) => "DUPLICATE_EMAIL",
            AppError::NotFound { .. } => "NOT_FOUND",
            AppError::PendingApplication { .. } => "PENDING_APPLICATION",
            AppError::InvalidTransition(_) => "INVALID_TRANSITION",
            AppError::GenerationError(_) => "GENERATION_ERROR",
            AppError::ConnectionFailure(_) => "CONNECTION_FAILURE",
            AppError::DatabaseError(_) => "DATABASE_ERROR",
            AppError::InternalServerError(_) => "INTERNAL_SERVER_ERROR",
        }
    }

    fn public_message(&self) -> String {
        match self {
            AppError::ValidationError(msg)
            | AppError::AuthError(msg)
            | AppError::InvalidTransition(msg) => msg.clone(),
            AppError::NotFound { message, .. } => message.clone(),
            AppError::Unauthenticated { .. } => "Please log in to continue.".to_string(),
            AppError::DuplicateEmail(_) => "Email already registered.".to_string(),
            AppError::PendingApplication { .. } => {
                "You already have an application in progress.".to_string()
            }
            AppError::GenerationError(_) => "Failed to generate the pass QR code.".to_string(),
            AppError::ConnectionFailure(_) => {
                "Service temporarily unavailable. Please try again later.".to_string()
            }
            AppError::DatabaseError(_) => "A database error occurred".to_string(),
            AppError::InternalServerError(_) => "An internal error occurred".to_string(),
        }
    }

    fn details(&self) -> Option<Value> {
        match self {
            AppError::Unauthenticated { login_path } => Some(json!({ "redirect_to": login_path })),
            AppError::NotFound {
                redirect_to: Some(path),
                ..
            } => Some(json!({ "redirect_to": path })),
            AppError::PendingApplication { application_id } => Some(json!({
                "application_id": application_id,
                "redirect_to": format!("/payment/{}", application_id),
            })),
            _ => None,
        }
    }

    fn log(&self) {
        match self {
            AppError::GenerationError(_)
            | AppError::ConnectionFailure(_)
            | AppError::DatabaseError(_)
            | AppError::InternalServerError(_) => {
                error!(error = %self, code = self.code(), "Request failed");
            }
            AppError::Unauthenticated { .. } => {}
            _ => warn!(error = %self, code = self.code(), "Request rejected"),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        self.log();
        error_response(
            self.code(),
            self.public_message(),
            self.details(),
            self.status_code(),
        )
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Connection(msg) => AppError::ConnectionFailure(msg),
            StoreError::UniqueViolation(constraint) => {
                AppError::DatabaseError(format!("unique constraint {} violated", constraint))
            }
            StoreError::Query(msg) => AppError::DatabaseError(msg),
        }
    }
}

impl From<AccountError> for AppError {
    fn from(err: AccountError) -> Self {
        match err {
            AccountError::Validation(msg) => AppError::ValidationError(msg),
            AccountError::DuplicateEmail(email) => AppError::DuplicateEmail(email),
            AccountError::DuplicateUsername(username) => {
                AppError::ValidationError(format!("Admin username '{}' is already taken.", username))
            }
            AccountError::InvalidCredentials => {
                AppError::AuthError("Invalid email or password.".to_string())
            }
            AccountError::Credential(e) => AppError::InternalServerError(e.to_string()),
            AccountError::Media(e) => AppError::InternalServerError(e.to_string()),
            AccountError::Store(e) => e.into(),
        }
    }
}

impl From<WorkflowError> for AppError {
    fn from(err: WorkflowError) -> Self {
        match err {
            WorkflowError::Validation(msg) => AppError::ValidationError(msg),
            WorkflowError::NotFound(id) => {
                AppError::not_found(format!("Application {} was not found.", id))
            }
            WorkflowError::PendingApplication(application_id) => {
                AppError::PendingApplication { application_id }
            }
            WorkflowError::InvalidTransition { id, action, stage } => AppError::InvalidTransition(
                format!("Application {} cannot be {} while {}.", id, action, stage),
            ),
            WorkflowError::Generation(e) => AppError::GenerationError(e.to_string()),
            WorkflowError::Store(e) => e.into(),
        }
    }
}

impl From<SessionError> for AppError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::Signing(msg) => AppError::InternalServerError(msg),
            SessionError::Invalid | SessionError::WrongRole => {
                AppError::AuthError("Session is invalid.".to_string())
            }
        }
    }
}
