//! Typed errors and HTTP mapping.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Startup configuration errors (environment, route table).
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("missing setting: {0}")]
    Missing(&'static str),
    #[error("invalid setting {name}: {value}")]
    Invalid { name: &'static str, value: String },
    #[error("invalid route pattern {name}: {source}")]
    RoutePattern {
        name: &'static str,
        #[source]
        source: regex::Error,
    },
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// A field or field tuple holds an invalid value.
    #[error("{message}")]
    ConstraintViolation { fields: Vec<String>, message: String },
    #[error("{message}")]
    DuplicateKey { fields: Vec<String>, message: String },
    #[error("{message}")]
    OutOfRange { field: String, message: String },
    #[error("{message}")]
    PayloadTooLarge { field: String, message: String },
    /// Delete blocked by records that still reference the target.
    #[error("referential integrity: {0}")]
    ReferentialIntegrity(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("method not allowed: {0}")]
    MethodNotAllowed(String),
    #[error("authentication required")]
    Unauthorized,
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("database: {0}")]
    Db(#[from] sqlx::Error),
    #[error("storage: {0}")]
    Storage(String),
}

impl AppError {
    pub fn constraint(field: impl Into<String>, message: impl Into<String>) -> Self {
        AppError::ConstraintViolation {
            fields: vec![field.into()],
            message: message.into(),
        }
    }

    /// Field names this error is about, if any.
    pub fn fields(&self) -> Option<Vec<String>> {
        match self {
            AppError::ConstraintViolation { fields, .. } | AppError::DuplicateKey { fields, .. } => {
                Some(fields.clone())
            }
            AppError::OutOfRange { field, .. } | AppError::PayloadTooLarge { field, .. } => {
                Some(vec![field.clone()])
            }
            _ => None,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            AppError::Config(_) => "config_error",
            AppError::ConstraintViolation { .. } => "constraint_violation",
            AppError::DuplicateKey { .. } => "duplicate_key",
            AppError::OutOfRange { .. } => "out_of_range",
            AppError::PayloadTooLarge { .. } => "payload_too_large",
            AppError::ReferentialIntegrity(_) => "referential_integrity",
            AppError::NotFound(_) => "not_found",
            AppError::MethodNotAllowed(_) => "method_not_allowed",
            AppError::Unauthorized => "unauthorized",
            AppError::Forbidden(_) => "forbidden",
            AppError::BadRequest(_) => "bad_request",
            AppError::Db(sqlx::Error::RowNotFound) => "not_found",
            AppError::Db(_) => "database_error",
            AppError::Storage(_) => "storage_error",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::ConstraintViolation { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::DuplicateKey { .. } => StatusCode::CONFLICT,
            AppError::OutOfRange { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::ReferentialIntegrity(_) => StatusCode::CONFLICT,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Db(sqlx::Error::RowNotFound) => StatusCode::NOT_FOUND,
            AppError::Db(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Serialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        let details = self.fields().map(|fields| serde_json::json!({ "fields": fields }));
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code().to_string(),
                message: self.to_string(),
                details,
            },
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_errors_carry_field_names() {
        let err = AppError::constraint("title", "Обязательное поле.");
        assert_eq!(err.fields(), Some(vec!["title".to_string()]));
        assert_eq!(err.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(err.to_string(), "Обязательное поле.");
    }

    #[test]
    fn status_mapping() {
        assert_eq!(AppError::NotFound("book 42".into()).status(), StatusCode::NOT_FOUND);
        assert_eq!(AppError::ReferentialIntegrity("x".into()).status(), StatusCode::CONFLICT);
        assert_eq!(
            AppError::PayloadTooLarge { field: "cover".into(), message: String::new() }.status(),
            StatusCode::PAYLOAD_TOO_LARGE
        );
        assert_eq!(AppError::Db(sqlx::Error::RowNotFound).code(), "not_found");
    }
}
