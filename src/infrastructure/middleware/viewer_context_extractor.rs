// Viewer extractor - hands the request-scoped viewer to handlers

use axum::{extract::FromRequestParts, http::request::Parts};
use std::sync::Arc;

use super::viewer_context_middleware::ViewerContext;
use crate::error::AppError;

/// Cheap-to-clone handle on the request's `ViewerContext`.
/// Requires `viewer_context_middleware` on the route.
#[derive(Debug, Clone)]
pub struct Vc(Arc<ViewerContext>);

impl Vc {
    pub fn new(vc: Arc<ViewerContext>) -> Self {
        Self(vc)
    }
}

impl std::ops::Deref for Vc {
    type Target = ViewerContext;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<S> FromRequestParts<S> for Vc
where
    S: Send + Sync,
{
    type Rejection = AppError;

    fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> impl std::future::Future<Output = Result<Self, Self::Rejection>> + Send {
        let vc = parts
            .extensions
            .get::<Arc<ViewerContext>>()
            .map(|vc| Vc(vc.clone()))
            .ok_or_else(|| AppError::Internal("Viewer middleware is not installed".to_string()));

        async move { vc }
    }
}
