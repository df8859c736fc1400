/// Unified error types for the appointment service
use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Field name -> messages, reported back to the caller on validation failure
pub type FieldErrors = BTreeMap<String, Vec<String>>;

/// Main error type for the service
#[derive(Error, Debug)]
pub enum AppError {
    /// Database errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Authentication errors (missing, invalid or expired token)
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Role gate failures
    #[error("{0}")]
    Forbidden(String),

    /// Free-form validation errors
    #[error("{0}")]
    Validation(String),

    /// Field-level validation errors
    #[error("Invalid input")]
    InvalidFields(FieldErrors),

    /// Appointment time outside 08:00..20:00
    #[error("Appointments can only be booked between 08:00 and 20:00.")]
    InvalidTimeWindow,

    /// (scheduler, date, time) already taken
    #[error("This time slot has already been booked.")]
    SlotAlreadyBooked,

    /// Booker tried to book or move an appointment into the past
    #[error("You cannot book an appointment in the past or at the current time.")]
    PastDateOrTime,

    /// Booker tried to book with a scheduler outside their roster
    #[error("You can only book appointments with schedulers you have added.")]
    SchedulerNotInRoster,

    /// Booker already holds an upcoming appointment
    #[error("You already have an active appointment and cannot reserve a new one.")]
    ActiveAppointmentExists,

    /// Scheduler payload names neither a booker nor a booker name
    #[error("At least one of 'booker' or 'booker_name' must be provided.")]
    MissingBookerIdentity,

    /// Roster lookup by scheduler code failed
    #[error("Scheduler not found or not publicly visible.")]
    SchedulerNotFound,

    /// No one-time code matches the (phone, code) pair
    #[error("OTP not found")]
    OtpNotFound,

    /// Matching one-time code is older than its lifetime
    #[error("OTP has expired")]
    OtpExpired,

    /// Not found errors
    #[error("{0}")]
    NotFound(String),

    /// Rate limiting errors
    #[error("Rate limit exceeded")]
    RateLimitExceeded { retry_after: std::time::Duration },

    /// JWT errors
    #[error("JWT error: {0}")]
    Jwt(String),

    /// Internal server errors
    #[error("Internal error: {0}")]
    Internal(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Caller-facing error taxonomy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    ValidationError,
    ConflictError,
    NotFoundError,
    ExpiredError,
    ForbiddenError,
    AuthError,
    RateLimitError,
    InternalError,
}

impl AppError {
    /// Specific, stable error code
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Database(_) | AppError::Internal(_) | AppError::Io(_) => "InternalServerError",
            AppError::Authentication(_) | AppError::Jwt(_) => "AuthenticationRequired",
            AppError::Forbidden(_) => "Forbidden",
            AppError::Validation(_) | AppError::InvalidFields(_) => "InvalidRequest",
            AppError::InvalidTimeWindow => "InvalidTimeWindow",
            AppError::SlotAlreadyBooked => "SlotAlreadyBooked",
            AppError::PastDateOrTime => "PastDateOrTime",
            AppError::SchedulerNotInRoster => "SchedulerNotInRoster",
            AppError::ActiveAppointmentExists => "ActiveAppointmentExists",
            AppError::MissingBookerIdentity => "MissingBookerIdentity",
            AppError::SchedulerNotFound => "SchedulerNotFound",
            AppError::OtpNotFound | AppError::NotFound(_) => "NotFound",
            AppError::OtpExpired => "Expired",
            AppError::RateLimitExceeded { .. } => "RateLimitExceeded",
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::Validation(_)
            | AppError::InvalidFields(_)
            | AppError::InvalidTimeWindow
            | AppError::PastDateOrTime
            | AppError::SchedulerNotInRoster
            | AppError::MissingBookerIdentity => ErrorKind::ValidationError,
            AppError::SlotAlreadyBooked | AppError::ActiveAppointmentExists => {
                ErrorKind::ConflictError
            }
            AppError::SchedulerNotFound | AppError::OtpNotFound | AppError::NotFound(_) => {
                ErrorKind::NotFoundError
            }
            AppError::OtpExpired => ErrorKind::ExpiredError,
            AppError::Forbidden(_) => ErrorKind::ForbiddenError,
            AppError::Authentication(_) | AppError::Jwt(_) => ErrorKind::AuthError,
            AppError::RateLimitExceeded { .. } => ErrorKind::RateLimitError,
            AppError::Database(_) | AppError::Internal(_) | AppError::Io(_) => {
                ErrorKind::InternalError
            }
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            // One-time code failures are reported as bad requests
            AppError::OtpNotFound | AppError::OtpExpired => StatusCode::BAD_REQUEST,
            _ => match self.kind() {
                ErrorKind::ValidationError => StatusCode::BAD_REQUEST,
                ErrorKind::ConflictError => StatusCode::CONFLICT,
                ErrorKind::NotFoundError => StatusCode::NOT_FOUND,
                ErrorKind::ExpiredError => StatusCode::BAD_REQUEST,
                ErrorKind::ForbiddenError => StatusCode::FORBIDDEN,
                ErrorKind::AuthError => StatusCode::UNAUTHORIZED,
                ErrorKind::RateLimitError => StatusCode::TOO_MANY_REQUESTS,
                ErrorKind::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }

    /// Field the error is attached to, for field-level detail
    fn field(&self) -> Option<&'static str> {
        match self {
            AppError::InvalidTimeWindow => Some("time"),
            AppError::SchedulerNotInRoster => Some("scheduler"),
            AppError::SchedulerNotFound => Some("scheduler_code"),
            _ => None,
        }
    }

    /// Shorthand for a single-field validation error
    pub fn field_error(field: &str, message: impl Into<String>) -> Self {
        let mut fields = FieldErrors::new();
        fields.insert(field.to_string(), vec![message.into()]);
        AppError::InvalidFields(fields)
    }

    /// True for storage-level unique constraint violations
    pub fn is_unique_violation(&self) -> bool {
        match self {
            AppError::Database(sqlx::Error::Database(db_err)) => db_err.is_unique_violation(),
            _ => false,
        }
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let mut fields = FieldErrors::new();
        for (field, errs) in errors.field_errors() {
            let messages = errs
                .iter()
                .map(|e| {
                    e.message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| format!("Invalid value ({})", e.code))
                })
                .collect();
            fields.insert(field.to_string(), messages);
        }
        AppError::InvalidFields(fields)
    }
}

/// Error response format
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub kind: ErrorKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fields: Option<FieldErrors>,
}

/// Convert AppError to HTTP response
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let kind = self.kind();

        let message = match &self {
            AppError::Database(e) => {
                tracing::error!("database error: {}", e);
                "Internal server error".to_string() // Don't leak details
            }
            AppError::Internal(_) | AppError::Io(_) => {
                tracing::error!("internal error: {}", self);
                "Internal server error".to_string()
            }
            _ => self.to_string(),
        };

        let fields = match &self {
            AppError::InvalidFields(fields) => Some(fields.clone()),
            other => other.field().map(|field| {
                let mut fields = FieldErrors::new();
                fields.insert(field.to_string(), vec![message.clone()]);
                fields
            }),
        };

        let retry_after = match &self {
            AppError::RateLimitExceeded { retry_after } => {
                // Whole seconds, rounded up
                Some(retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0))
            }
            _ => None,
        };

        let body = Json(ErrorResponse {
            error: self.code().to_string(),
            kind,
            message,
            fields,
        });

        let mut response = (status, body).into_response();
        if let Some(secs) = retry_after {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(secs));
        }
        response
    }
}

/// Result type alias for service operations
pub type AppResult<T> = Result<T, AppError>;
