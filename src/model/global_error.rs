use actix_web::{HttpResponse, ResponseError};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    // 400 BAD REQUEST
    ValidationError,
    DuplicateUsername,
    PasswordMismatch,
    WeakPassword,
    WrongPassword,
    MissingAssignee,
    MissingFile,

    // 401 UNAUTHORIZED
    InvalidCredentials,
    ExpiredAuthToken,
    InvalidAuthToken,
    InvalidRefreshToken,

    // 403 FORBIDDEN
    AccountDisabled,
    NotEnoughPermission,

    // 404 NOT FOUND
    UserNotFound,
    ProjectNotFound,
    ProductNotFound,
    ModuleNotFound,
    BugNotFound,
    AttachmentNotFound,

    // 500 SERVER ERRORS
    DatabaseError,
    StorageError,
    InternalError,
    TokenGenerationFailed,
}

impl ErrorCode {
    pub fn message(&self) -> &'static str {
        match self {
            ErrorCode::ValidationError => "validation failed",
            ErrorCode::DuplicateUsername => "username is already taken",
            ErrorCode::PasswordMismatch => "password confirmation does not match",
            ErrorCode::WeakPassword => "password does not meet the strength policy",
            ErrorCode::WrongPassword => "old password is incorrect",
            ErrorCode::MissingAssignee => "an assignee must be selected",
            ErrorCode::MissingFile => "no file was uploaded",

            ErrorCode::InvalidCredentials => "invalid username or password",
            ErrorCode::ExpiredAuthToken => "auth token has expired",
            ErrorCode::InvalidAuthToken => "auth token is invalid",
            ErrorCode::InvalidRefreshToken => "refresh token is invalid",

            ErrorCode::AccountDisabled => "this account has been disabled",
            ErrorCode::NotEnoughPermission => "not enough permission",

            ErrorCode::UserNotFound => "user not found",
            ErrorCode::ProjectNotFound => "project not found",
            ErrorCode::ProductNotFound => "product not found",
            ErrorCode::ModuleNotFound => "module not found",
            ErrorCode::BugNotFound => "bug not found",
            ErrorCode::AttachmentNotFound => "attachment not found",

            ErrorCode::DatabaseError => "a database error occurred",
            ErrorCode::StorageError => "failed to store the uploaded file",
            ErrorCode::InternalError => "an internal server error occurred",
            ErrorCode::TokenGenerationFailed => "failed to generate auth token",
        }
    }

    pub fn status_code(&self) -> actix_web::http::StatusCode {
        use actix_web::http::StatusCode;

        match self {
            ErrorCode::ValidationError
            | ErrorCode::DuplicateUsername
            | ErrorCode::PasswordMismatch
            | ErrorCode::WeakPassword
            | ErrorCode::WrongPassword
            | ErrorCode::MissingAssignee
            | ErrorCode::MissingFile => StatusCode::BAD_REQUEST,

            ErrorCode::InvalidCredentials
            | ErrorCode::ExpiredAuthToken
            | ErrorCode::InvalidAuthToken
            | ErrorCode::InvalidRefreshToken => StatusCode::UNAUTHORIZED,

            ErrorCode::AccountDisabled | ErrorCode::NotEnoughPermission => StatusCode::FORBIDDEN,

            ErrorCode::UserNotFound
            | ErrorCode::ProjectNotFound
            | ErrorCode::ProductNotFound
            | ErrorCode::ModuleNotFound
            | ErrorCode::BugNotFound
            | ErrorCode::AttachmentNotFound => StatusCode::NOT_FOUND,

            ErrorCode::DatabaseError
            | ErrorCode::StorageError
            | ErrorCode::InternalError
            | ErrorCode::TokenGenerationFailed => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message())
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct ValidationFieldError {
    pub field: String,
    pub message: String,
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("{0}")]
    ApiError(ErrorCode, Option<String>),

    #[error("validation failed")]
    ValidationError(Vec<ValidationFieldError>),
}

impl AppError {
    pub fn new(code: ErrorCode) -> Self {
        AppError::ApiError(code, None)
    }

    pub fn with_detail(code: ErrorCode, detail: String) -> Self {
        AppError::ApiError(code, Some(detail))
    }

    pub fn field(field: &str, message: &str) -> Self {
        AppError::ValidationError(vec![ValidationFieldError {
            field: field.to_string(),
            message: message.to_string(),
        }])
    }
}

impl From<sea_orm::DbErr> for AppError {
    fn from(err: sea_orm::DbErr) -> Self {
        tracing::error!("database error: {err}");
        AppError::new(ErrorCode::DatabaseError)
    }
}

impl From<jsonwebtoken::errors::Error> for AppError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        tracing::error!("token generation error: {err}");
        AppError::new(ErrorCode::TokenGenerationFailed)
    }
}

#[derive(serde::Serialize)]
struct ErrorResponse {
    code: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    errors: Option<Vec<ValidationFieldError>>,
}

impl ResponseError for AppError {
    fn error_response(&self) -> HttpResponse {
        match self {
            AppError::ApiError(code, detail) => {
                let response = ErrorResponse {
                    code: format!("{:?}", code),
                    message: code.message().to_string(),
                    detail: detail.clone(),
                    errors: None,
                };

                HttpResponse::build(code.status_code()).json(response)
            }
            AppError::ValidationError(errors) => {
                let response = ErrorResponse {
                    code: format!("{:?}", ErrorCode::ValidationError),
                    message: ErrorCode::ValidationError.message().to_string(),
                    detail: None,
                    errors: Some(errors.clone()),
                };

                HttpResponse::build(ErrorCode::ValidationError.status_code()).json(response)
            }
        }
    }
}
