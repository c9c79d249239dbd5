use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use serde::Serialize;
use std::borrow::Cow;

/// Failures of the persistence layer.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] DieselError),
    #[error("connection pool error: {0}")]
    Pool(String),
}

impl StoreError {
    /// Whether retrying the same call has a chance of succeeding.
    pub fn is_transient(&self) -> bool {
        match self {
            StoreError::Pool(_) => true,
            StoreError::Database(DieselError::DatabaseError(kind, _)) => matches!(
                kind,
                DatabaseErrorKind::SerializationFailure
                    | DatabaseErrorKind::ClosedConnection
                    | DatabaseErrorKind::UnableToSendCommand
            ),
            StoreError::Database(_) => false,
        }
    }
}

/// Every domain operation fails with one of these.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{0}")]
    Validation(Cow<'static, str>),
    #[error("{0}")]
    Conflict(Cow<'static, str>),
    #[error("user is already an active member of this club")]
    AlreadyMember,
    #[error("a pending application for this club already exists")]
    DuplicatePending,
    #[error("application has already been reviewed")]
    AlreadyReviewed,
    #[error("club must keep at least one active admin")]
    LastAdmin,
    #[error("{0}")]
    InvalidState(Cow<'static, str>),
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("{0}")]
    Forbidden(Cow<'static, str>),
    #[error("login required")]
    Unauthorized,
    #[error("payment processing is not configured")]
    ProviderUnavailable,
    #[error("payment provider error: {0}")]
    Provider(String),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl From<DieselError> for Error {
    fn from(e: DieselError) -> Error {
        Error::Store(StoreError::Database(e))
    }
}

impl Error {
    pub fn validation(s: impl Into<Cow<'static, str>>) -> Error {
        Error::Validation(s.into())
    }

    pub fn conflict(s: impl Into<Cow<'static, str>>) -> Error {
        Error::Conflict(s.into())
    }

    pub fn invalid_state(s: impl Into<Cow<'static, str>>) -> Error {
        Error::InvalidState(s.into())
    }

    pub fn forbidden(s: impl Into<Cow<'static, str>>) -> Error {
        Error::Forbidden(s.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Error::Validation(_) => StatusCode::BAD_REQUEST,
            Error::Conflict(_)
            | Error::AlreadyMember
            | Error::DuplicatePending
            | Error::AlreadyReviewed
            | Error::LastAdmin
            | Error::InvalidState(_) => StatusCode::CONFLICT,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::Forbidden(_) => StatusCode::FORBIDDEN,
            Error::Unauthorized => StatusCode::UNAUTHORIZED,
            Error::ProviderUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            Error::Provider(_) => StatusCode::BAD_GATEWAY,
            Error::Store(_) | Error::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable machine-readable code sent to clients.
    pub fn code(&self) -> &'static str {
        match self {
            Error::Validation(_) => "validation",
            Error::Conflict(_) => "conflict",
            Error::AlreadyMember => "already_member",
            Error::DuplicatePending => "duplicate_pending",
            Error::AlreadyReviewed => "already_reviewed",
            Error::LastAdmin => "last_admin",
            Error::InvalidState(_) => "invalid_state",
            Error::NotFound(_) => "not_found",
            Error::Forbidden(_) => "forbidden",
            Error::Unauthorized => "unauthorized",
            Error::ProviderUnavailable => "provider_unavailable",
            Error::Provider(_) => "provider_error",
            Error::Store(_) => "store_error",
            Error::Internal(_) => "internal",
        }
    }
}

pub enum AppError {
    InternalServerError(anyhow::Error),
    ResponseStatusError(StatusCode, Cow<'static, str>),
    Domain(Error),
}

pub type AppResult<T> = Result<T, AppError>;

#[derive(Serialize)]
struct AppErrorResponse {
    status: u16,
    code: &'static str,
    message: Cow<'static, str>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::InternalServerError(err) => {
                tracing::error!(error = ?err, "internal server error");
                AppError::from(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
                    .into_response()
            }
            AppError::ResponseStatusError(code, s) => (
                code,
                Json(AppErrorResponse {
                    status: code.as_u16(),
                    code: "error",
                    message: s,
                }),
            )
                .into_response(),
            AppError::Domain(err) => {
                let code = err.status();
                // 5xx details stay in the logs
                let message = if code.is_server_error() {
                    match &err {
                        Error::ProviderUnavailable | Error::Provider(_) => {
                            tracing::warn!(error = %err, "payment provider failure");
                            Cow::Borrowed("payment provider unavailable")
                        }
                        _ => {
                            tracing::error!(error = %err, "request failed");
                            Cow::Borrowed("Internal Server Error")
                        }
                    }
                } else {
                    Cow::Owned(err.to_string())
                };
                (
                    code,
                    Json(AppErrorResponse {
                        status: code.as_u16(),
                        code: err.code(),
                        message,
                    }),
                )
                    .into_response()
            }
        }
    }
}

impl From<Error> for AppError {
    fn from(e: Error) -> AppError {
        AppError::Domain(e)
    }
}

impl From<anyhow::Error> for AppError {
    fn from(e: anyhow::Error) -> AppError {
        AppError::InternalServerError(e)
    }
}

impl AppError {
    pub fn from(code: StatusCode, s: impl Into<Cow<'static, str>>) -> AppError {
        AppError::ResponseStatusError(code, s.into())
    }
}
