// Viewer middleware - turns trusted identity headers into a request-scoped viewer
// The identity provider sits in front of this service and forwards the
// verified subject, email and display name as headers.

use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use crate::app_state::AppState;
use crate::core::UserId;
use crate::error::{AppError, AppResult};

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_EMAIL_HEADER: &str = "x-user-email";
pub const USER_NAME_HEADER: &str = "x-user-name";

static EMAIL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9._%+\-]+@[A-Za-z0-9.\-]+\.[A-Za-z]{2,}$").expect("email pattern")
});

/// Who is making the request
#[derive(Debug, Clone)]
pub struct ViewerContext {
    pub request_id: String,
    pub user_id: Option<UserId>,
    pub email: Option<String>,
    pub name: Option<String>,
}

impl ViewerContext {
    pub fn anonymous(request_id: String) -> Self {
        Self {
            request_id,
            user_id: None,
            email: None,
            name: None,
        }
    }

    pub fn authenticated(request_id: String, user_id: UserId, email: String, name: String) -> Self {
        Self {
            request_id,
            user_id: Some(user_id),
            email: Some(email),
            name: Some(name),
        }
    }

    /// The viewer's id, or `Unauthorized` for anonymous requests
    pub fn require_user(&self) -> AppResult<&UserId> {
        self.user_id
            .as_ref()
            .ok_or_else(|| AppError::Unauthorized("Authentication required".to_string()))
    }
}

/// Identity extracted from request headers
#[derive(Debug, Clone, PartialEq)]
pub struct Identity {
    pub user_id: UserId,
    pub email: String,
    pub name: String,
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> AppResult<Option<&'a str>> {
    match headers.get(name) {
        None => Ok(None),
        Some(value) => value
            .to_str()
            .map(|v| Some(v.trim()))
            .map_err(|_| AppError::Validation(format!("Header {} is not valid text", name))),
    }
}

/// `None` for anonymous requests
pub fn extract_identity(headers: &HeaderMap) -> AppResult<Option<Identity>> {
    let user_id = match header(headers, USER_ID_HEADER)? {
        Some(id) => UserId::new(id).map_err(|e| AppError::Unauthorized(e.to_string()))?,
        None => return Ok(None),
    };

    let email = header(headers, USER_EMAIL_HEADER)?
        .ok_or_else(|| AppError::Unauthorized("Missing verified email".to_string()))?;
    if !EMAIL_RE.is_match(email) {
        return Err(AppError::Unauthorized(format!("Invalid email: {}", email)));
    }

    let name = match header(headers, USER_NAME_HEADER)? {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => email.split('@').next().unwrap_or(email).to_string(),
    };

    Ok(Some(Identity {
        user_id,
        email: email.to_string(),
        name,
    }))
}

/// Builds the viewer, records the profile of authenticated users and
/// injects `Arc<ViewerContext>` into the request extensions
pub async fn viewer_context_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let request_id = Uuid::new_v4().to_string();

    let viewer = match extract_identity(request.headers())? {
        Some(identity) => {
            state
                .directory
                .upsert(&identity.user_id, &identity.email, &identity.name, state.clock.now())
                .await?;
            debug!(request_id = %request_id, user_id = %identity.user_id, "Authenticated viewer");
            ViewerContext::authenticated(request_id, identity.user_id, identity.email, identity.name)
        }
        None => ViewerContext::anonymous(request_id),
    };

    request.extensions_mut().insert(Arc::new(viewer));
    Ok(next.run(request).await)
}
