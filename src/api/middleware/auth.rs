use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::{header::AUTHORIZATION, request::Parts},
};
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

use crate::api::errors::ApiError;
use crate::auth::jwt::verify_token;
use crate::config::Settings;

/// Authenticated operator, pulled from `Authorization: Bearer <token>`
///
/// The signing secret comes from the router's `Settings`, so any state that
/// can hand out an `Arc<Settings>` works.
pub struct JwtAuth {
    pub operator_id: Uuid,
    pub email: String,
}

#[async_trait]
impl<S> FromRequestParts<S> for JwtAuth
where
    S: Send + Sync,
    Arc<Settings>: FromRef<S>,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| ApiError::unauthorized("Missing authorization header"))?;

        let token = header
            .strip_prefix("Bearer ")
            .ok_or_else(|| ApiError::unauthorized("Invalid authorization format. Use: Bearer <token>"))?;

        let settings = Arc::<Settings>::from_ref(state);
        let claims = verify_token(token, &settings.jwt_secret).map_err(|e| {
            warn!(error = %e, "Rejected bearer token");
            ApiError::unauthorized(format!("Invalid token: {}", e))
        })?;

        Ok(JwtAuth {
            operator_id: claims.sub,
            email: claims.email,
        })
    }
}
