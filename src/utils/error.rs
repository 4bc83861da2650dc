use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, error};
use uuid::Uuid;

use crate::utils::response::error as error_response;

pub type AppResult<T> = Result<T, AppError>;

/// One field-level problem found during input validation. A request is
/// checked in a single pass and all problems are reported together.
#[derive(Debug, Clone, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Business-rule conflicts. These are expected outcomes returned to the
/// caller, not system failures.
#[derive(Debug, Clone, Error)]
pub enum ConflictError {
    #[error("Tier '{tier}' does not have enough tickets remaining")]
    InsufficientStock { tier: String },

    #[error("Ticket '{ticket}' has already been checked in")]
    AlreadyUsed { ticket: String },

    #[error("Payout {payout} has already been processed")]
    AlreadyProcessed { payout: Uuid },

    #[error("Insufficient balance: {balance} available")]
    InsufficientBalance { balance: Decimal },

    #[error("No bank details on file for this host")]
    MissingBankDetails,

    #[error("Payment reference '{reference}' was already recorded")]
    DuplicatePaymentReference { reference: String },

    #[error("Reservation was already released")]
    ReservationReleased,
}

impl ConflictError {
    pub fn code(&self) -> &'static str {
        match self {
            ConflictError::InsufficientStock { .. } => "INSUFFICIENT_STOCK",
            ConflictError::AlreadyUsed { .. } => "TICKET_ALREADY_USED",
            ConflictError::AlreadyProcessed { .. } => "PAYOUT_ALREADY_PROCESSED",
            ConflictError::InsufficientBalance { .. } => "INSUFFICIENT_BALANCE",
            ConflictError::MissingBankDetails => "MISSING_BANK_DETAILS",
            ConflictError::DuplicatePaymentReference { .. } => "DUPLICATE_PAYMENT_REFERENCE",
            ConflictError::ReservationReleased => "RESERVATION_RELEASED",
        }
    }

    fn details(&self) -> Option<Value> {
        match self {
            ConflictError::InsufficientBalance { balance } => {
                Some(json!({ "balance": balance }))
            }
            ConflictError::InsufficientStock { tier } => Some(json!({ "tier": tier })),
            _ => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation failed")]
    Validation(Vec<FieldError>),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Conflict(#[from] ConflictError),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("External service error: {0}")]
    Dependency(String),

    #[error("Database error")]
    Database(#[from] sqlx::Error),

    #[error("Internal server error")]
    Internal(String),
}

impl AppError {
    /// Single-field validation failure.
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        AppError::Validation(vec![FieldError::new(field, message)])
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        AppError::NotFound(what.into())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Auth(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Dependency(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::Auth(_) => "AUTH_ERROR",
            AppError::Forbidden(_) => "FORBIDDEN",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::Conflict(conflict) => conflict.code(),
            AppError::Dependency(_) => "EXTERNAL_SERVICE_ERROR",
            AppError::Database(_) => "DATABASE_ERROR",
            AppError::Internal(_) => "INTERNAL_SERVER_ERROR",
        }
    }

    fn log(&self) {
        match self {
            // Expected outcomes; the caller corrects and retries.
            AppError::Validation(fields) => {
                debug!(?fields, "Request rejected by validation");
            }
            AppError::NotFound(msg) | AppError::Forbidden(msg) | AppError::Auth(msg) => {
                debug!(code = self.code(), message = %msg, "Request rejected");
            }
            AppError::Conflict(conflict) => {
                debug!(code = conflict.code(), message = %conflict, "Request rejected");
            }
            // System failures.
            AppError::Dependency(msg) | AppError::Internal(msg) => {
                error!(error = ?self, message = %msg, "Application error");
            }
            AppError::Database(e) => {
                error!(error = ?e, "Database error");
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.code();

        self.log();

        // Only expose high-level messages to the client; database and internal
        // details stay in the logs.
        let (public_message, details) = match &self {
            AppError::Validation(fields) => (
                "One or more fields are invalid".to_string(),
                serde_json::to_value(fields).ok(),
            ),
            AppError::NotFound(msg) | AppError::Forbidden(msg) | AppError::Auth(msg) => {
                (msg.clone(), None)
            }
            AppError::Conflict(conflict) => (conflict.to_string(), conflict.details()),
            AppError::Dependency(msg) => (msg.clone(), None),
            AppError::Database(_) => ("A database error occurred".to_string(), None),
            AppError::Internal(_) => ("Internal server error".to_string(), None),
        };

        error_response(code, public_message, details, status)
    }
}
