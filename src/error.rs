//! Error handler for gatehouse.

use axum::extract::rejection::JsonRejection;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;
use validator::ValidationErrors;

use crate::crypto::CryptoError;
use crate::database::StoreError;

pub type Result<T> = std::result::Result<T, ServerError>;

/// Enum representing server-side errors.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("validation error occurred")]
    Validation(#[from] ValidationErrors),

    #[error(transparent)]
    Axum(#[from] JsonRejection),

    /// Login failure. Unknown email and wrong password both land here so the
    /// response never reveals whether an account exists.
    #[error("invalid credentials")]
    InvalidCredentials,

    /// Duplicate email on registration.
    #[error("email already registered")]
    EmailTaken,

    /// Reset token missing, mismatched or past its validity window.
    #[error("invalid or expired token")]
    InvalidToken,

    #[error("resource not found")]
    NotFound,

    #[error("invalid 'Authorization' header")]
    Unauthorized,

    /// Notification could not be delivered.
    #[error("mail delivery failed")]
    Delivery(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("internal server error, {details}")]
    Internal {
        details: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl From<StoreError> for ServerError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => ServerError::NotFound,
            StoreError::UniqueViolation { field: "email" } => {
                ServerError::EmailTaken
            },
            err => ServerError::Internal {
                details: "store operation failed".into(),
                source: Some(Box::new(err)),
            },
        }
    }
}

impl From<CryptoError> for ServerError {
    fn from(err: CryptoError) -> Self {
        // Includes malformed stored digests: a programming error, not a
        // recoverable user condition.
        ServerError::Internal {
            details: "cryptographic operation failed".into(),
            source: Some(Box::new(err)),
        }
    }
}

/// Structure for detailed error responses.
#[derive(Debug, Serialize)]
pub struct ResponseError {
    r#type: Option<String>,
    title: String,
    status: u16,
    detail: String,
    instance: Option<String>,
    errors: Option<Vec<FieldError>>,
}

impl ResponseError {
    /// Update error status code.
    pub fn status(mut self, code: StatusCode) -> Self {
        self.status = code.as_u16();
        self
    }

    /// Update `title` field.
    pub fn title(mut self, title: &str) -> Self {
        self.title = title.into();
        self
    }

    /// Add detailed error.
    pub fn details(mut self, description: &str) -> Self {
        self.detail = description.into();
        self
    }

    /// Automatically add errors field.
    pub fn errors(mut self, errors: &ValidationErrors) -> Self {
        self.errors = Some(parse_validation_errors(errors));
        self
    }

    /// Scope the error to a single named field.
    pub fn field(mut self, field: &str, message: &str) -> Self {
        self.errors = Some(vec![FieldError {
            field: field.into(),
            message: message.into(),
        }]);
        self
    }

    /// Transform [`ResponseError`] into axum [`Response`].
    pub fn into_response(
        self,
    ) -> std::result::Result<Response, axum::http::Error> {
        if let Ok(body) = serde_json::to_string(&self) {
            Response::builder()
                .status(self.status)
                .header(header::CONTENT_TYPE, "application/json")
                .body(body.into())
        } else {
            Ok(internal_server_error())
        }
    }
}

impl Default for ResponseError {
    fn default() -> Self {
        Self {
            r#type: None,
            title: "Internal server error.".to_owned(),
            status: StatusCode::INTERNAL_SERVER_ERROR.as_u16(),
            detail: String::default(),
            instance: None,
            errors: None,
        }
    }
}

#[derive(Debug, Serialize)]
struct FieldError {
    field: String,
    message: String,
}

fn parse_validation_errors(errors: &ValidationErrors) -> Vec<FieldError> {
    errors
        .field_errors()
        .iter()
        .flat_map(|(field, issues)| {
            issues.iter().map(move |issue| FieldError {
                field: field.to_string(),
                message: issue.to_string(),
            })
        })
        .collect()
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let response = ResponseError::default()
            .title("There were validation errors with your request.")
            .details(&self.to_string())
            .status(StatusCode::BAD_REQUEST);

        let response = match &self {
            ServerError::Validation(validation_errors) => {
                response.errors(validation_errors)
            },

            ServerError::InvalidCredentials => response
                .title("Invalid credentials.")
                .details("Email or password is incorrect.")
                .status(StatusCode::UNAUTHORIZED),

            ServerError::EmailTaken => response
                .title("There were validation errors with your request.")
                .details("Email is already registered.")
                .field("email", "Email is already registered.")
                .status(StatusCode::CONFLICT),

            ServerError::InvalidToken => response
                .title("Invalid token.")
                .details("Token is invalid or has expired."),

            ServerError::NotFound => response
                .title("Resource not found.")
                .status(StatusCode::NOT_FOUND),

            ServerError::Unauthorized => response
                .title("Missing or invalid 'Authorization' header.")
                .status(StatusCode::UNAUTHORIZED),

            ServerError::Delivery(source) => {
                tracing::error!(err = %source, "mail delivery failed");

                response
                    .title("Notification could not be delivered.")
                    .details("Mail delivery failed, try again later.")
                    .status(StatusCode::BAD_GATEWAY)
            },

            ServerError::Internal { details, source } => {
                tracing::error!(err = ?source, %details, "server returned 500 status");

                ResponseError::default()
            },

            _ => response,
        };

        response
            .into_response()
            .unwrap_or_else(|_| internal_server_error())
    }
}

fn internal_server_error() -> Response {
    Response::builder()
        .status(StatusCode::INTERNAL_SERVER_ERROR)
        .header(header::CONTENT_TYPE, "application/json")
        .body(
            serde_json::json!({
                "type": null,
                "title": "Internal server error.",
                "status": StatusCode::INTERNAL_SERVER_ERROR.as_u16(),
                "detail": null,
                "instance": null,
                "errors": null,
            })
            .to_string()
            .into(),
        )
        .unwrap_or_else(|_| Response::new("Internal server error".into()))
}
