//! Extract the request context attached by the request-augmentation middleware.

use crate::context::RequestContext;
use crate::error::AppError;
use async_trait::async_trait;
use axum::{extract::FromRequestParts, http::request::Parts};
use std::sync::Arc;

/// Header selecting a non-default connection name for generated routes.
pub const CONNECTION_HEADER: &str = "X-Connection";

/// The current request's [`RequestContext`]. Rejects with [`AppError::MissingContext`] outside a registered host.
#[derive(Clone)]
pub struct Ctx(pub Arc<RequestContext>);

#[async_trait]
impl<S> FromRequestParts<S> for Ctx
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Arc<RequestContext>>()
            .cloned()
            .map(Ctx)
            .ok_or(AppError::MissingContext)
    }
}

/// Optional connection name from the `X-Connection` header.
#[derive(Clone, Debug)]
pub struct ConnectionName(pub Option<String>);

#[async_trait]
impl<S> FromRequestParts<S> for ConnectionName
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let value = parts
            .headers
            .get(CONNECTION_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
        Ok(ConnectionName(value))
    }
}
