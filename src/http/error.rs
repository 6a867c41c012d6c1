use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use std::collections::BTreeMap;

use crate::app::admin::AdminError;
use crate::app::masterclasses::MasterclassError;
use crate::app::registrations::RegistrationError;
use crate::app::reviews::ReviewError;
use crate::app::users::UserError;
use crate::app::validation::ValidationErrors;

#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    message: String,
    fields: Option<BTreeMap<String, String>>,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    fields: Option<BTreeMap<String, String>>,
}

impl AppError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            fields: None,
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::new(StatusCode::TOO_MANY_REQUESTS, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, message)
    }

    /// 422 with the per-field messages attached.
    pub fn validation(errors: ValidationErrors) -> Self {
        Self {
            status: StatusCode::UNPROCESSABLE_ENTITY,
            message: "validation failed".to_string(),
            fields: Some(errors.into_fields()),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = Json(ErrorResponse {
            error: self.message,
            fields: self.fields,
        });
        (self.status, body).into_response()
    }
}

impl From<ValidationErrors> for AppError {
    fn from(errors: ValidationErrors) -> Self {
        AppError::validation(errors)
    }
}

impl From<RegistrationError> for AppError {
    fn from(err: RegistrationError) -> Self {
        match err {
            RegistrationError::NotFound | RegistrationError::RegistrationNotFound => {
                AppError::not_found(err.to_string())
            }
            RegistrationError::Full { .. }
            | RegistrationError::Closed { .. }
            | RegistrationError::Duplicate { .. }
            | RegistrationError::TooLate { .. } => AppError::conflict(err.to_string()),
            RegistrationError::Invalid(errors) => AppError::validation(errors),
            RegistrationError::Database(err) => {
                tracing::error!(error = ?err, "registration query failed");
                AppError::internal("failed to process registration")
            }
        }
    }
}

impl From<MasterclassError> for AppError {
    fn from(err: MasterclassError) -> Self {
        match err {
            MasterclassError::NotFound => AppError::not_found("masterclass not found"),
            MasterclassError::Invalid(errors) => AppError::validation(errors),
            MasterclassError::Database(err) => {
                tracing::error!(error = ?err, "masterclass query failed");
                AppError::internal("failed to process masterclass")
            }
            MasterclassError::Other(err) => {
                tracing::error!(error = ?err, "masterclass operation failed");
                AppError::internal("failed to process masterclass")
            }
        }
    }
}

impl From<ReviewError> for AppError {
    fn from(err: ReviewError) -> Self {
        match err {
            ReviewError::MasterclassNotFound | ReviewError::NotFound => {
                AppError::not_found(err.to_string())
            }
            ReviewError::NotAttended => AppError::forbidden(err.to_string()),
            ReviewError::NotYetHeld | ReviewError::AlreadyReviewed => {
                AppError::conflict(err.to_string())
            }
            ReviewError::Invalid(errors) => AppError::validation(errors),
            ReviewError::Database(err) => {
                tracing::error!(error = ?err, "review query failed");
                AppError::internal("failed to process review")
            }
        }
    }
}

impl From<UserError> for AppError {
    fn from(err: UserError) -> Self {
        match err {
            UserError::NotFound => AppError::not_found("user not found"),
            UserError::EmailTaken => AppError::conflict(err.to_string()),
            UserError::Invalid(errors) => AppError::validation(errors),
            UserError::Database(err) => {
                tracing::error!(error = ?err, "user query failed");
                AppError::internal("failed to process user")
            }
            UserError::Other(err) => {
                tracing::error!(error = ?err, "user operation failed");
                AppError::internal("failed to process user")
            }
        }
    }
}

impl From<AdminError> for AppError {
    fn from(err: AdminError) -> Self {
        match err {
            AdminError::NotFound => AppError::not_found("user not found"),
            AdminError::SelfAction { .. } => AppError::bad_request(err.to_string()),
            AdminError::LastAdmin => AppError::conflict(err.to_string()),
            AdminError::User(err) => err.into(),
            AdminError::Invalid(errors) => AppError::validation(errors),
            AdminError::Other(err) => {
                tracing::error!(error = ?err, "admin operation failed");
                AppError::internal("failed to process admin request")
            }
        }
    }
}
