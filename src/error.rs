use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::fmt;

/// Rejections raised by the group lifecycle when a request conflicts with
/// the current state of a group or membership.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictKind {
    AlreadyJoined,
    AlreadyWaitlisted,
    GroupFull,
    NotOpen,
    NotMember,
    CreatorCannotLeave,
}

impl ConflictKind {
    /// Stable machine-readable code returned to callers.
    pub fn code(self) -> &'static str {
        match self {
            ConflictKind::AlreadyJoined => "already_joined",
            ConflictKind::AlreadyWaitlisted => "already_waitlisted",
            ConflictKind::GroupFull => "group_full",
            ConflictKind::NotOpen => "not_open",
            ConflictKind::NotMember => "not_member",
            ConflictKind::CreatorCannotLeave => "creator_cannot_leave",
        }
    }

    pub fn message(self) -> &'static str {
        match self {
            ConflictKind::AlreadyJoined => "You have already joined this group",
            ConflictKind::AlreadyWaitlisted => "You are already on the waitlist for this group",
            ConflictKind::GroupFull => "This group is full",
            ConflictKind::NotOpen => "This group is no longer open",
            ConflictKind::NotMember => "You are not a member of this group",
            ConflictKind::CreatorCannotLeave => "The organizer cannot leave their own group",
        }
    }
}

impl fmt::Display for ConflictKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

#[derive(Debug)]
pub enum AppError {
    Database(anyhow::Error),
    DatabaseError(String),
    NotFound(String),
    Conflict(ConflictKind),
    Validation(String),
    Internal(String),
    ConfigurationError(String),
    Unauthorized(String),
    Forbidden(String),
}

impl AppError {
    /// Stable error code. Conflicts expose their specific sub-kind.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Database(_) | AppError::DatabaseError(_) | AppError::Internal(_) => {
                "internal"
            }
            AppError::NotFound(_) => "not_found",
            AppError::Conflict(kind) => kind.code(),
            AppError::Validation(_) => "validation",
            AppError::ConfigurationError(_) => "configuration",
            AppError::Unauthorized(_) => "unauthorized",
            AppError::Forbidden(_) => "forbidden",
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Database(err) => write!(f, "Database error: {}", err),
            AppError::DatabaseError(msg) => write!(f, "Database error: {}", msg),
            AppError::NotFound(msg) => write!(f, "Not found: {}", msg),
            AppError::Conflict(kind) => write!(f, "Conflict: {}", kind),
            AppError::Validation(msg) => write!(f, "Validation error: {}", msg),
            AppError::Internal(msg) => write!(f, "Internal error: {}", msg),
            AppError::ConfigurationError(msg) => write!(f, "Configuration error: {}", msg),
            AppError::Unauthorized(msg) => write!(f, "Unauthorized: {}", msg),
            AppError::Forbidden(msg) => write!(f, "Forbidden: {}", msg),
        }
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match &self {
            AppError::Database(err) => {
                tracing::error!("Database error: {}", err);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
            AppError::DatabaseError(msg) => {
                tracing::error!("Database error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
            AppError::ConfigurationError(msg) => {
                tracing::error!("Configuration error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            AppError::Conflict(kind) => (StatusCode::CONFLICT, kind.message().to_string()),
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg.clone()),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg.clone()),
        };

        let body = Json(json!({
            "error": error_message,
            "code": self.code(),
            "status": status.as_u16()
        }));

        (status, body).into_response()
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Database(err)
    }
}

impl From<ConflictKind> for AppError {
    fn from(kind: ConflictKind) -> Self {
        AppError::Conflict(kind)
    }
}

pub type AppResult<T> = Result<T, AppError>;
