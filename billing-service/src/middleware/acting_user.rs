use crate::models::{ActingUser, Role};
use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use service_core::error::AppError;
use uuid::Uuid;

/// Extracts the acting user from identity headers sent by the trusted API
/// gateway:
///
///   X-User-Id:    UUID of the authenticated user
///   X-Company-Id: UUID of the user's company (tenant scope)
///   X-User-Role:  "admin" | "freelancer"
///
/// Every handler receives the actor explicitly; nothing in the service reads
/// ambient session state. The gateway validates the session before setting
/// these headers, so a missing or malformed header is an auth failure.
#[async_trait]
impl<S> FromRequestParts<S> for ActingUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = header_uuid(parts, "X-User-Id")?;
        let company_id = header_uuid(parts, "X-Company-Id")?;

        let role = parts
            .headers
            .get("X-User-Role")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| AppError::AuthError(anyhow::anyhow!("Missing X-User-Role header")))?;
        let role = Role::parse(role)
            .map_err(|_| AppError::AuthError(anyhow::anyhow!("Invalid X-User-Role header")))?;

        // Add to tracing span for observability
        tracing::Span::current().record("user_id", user_id.to_string());

        Ok(ActingUser {
            user_id,
            company_id,
            role,
        })
    }
}

fn header_uuid(parts: &Parts, name: &'static str) -> Result<Uuid, AppError> {
    parts
        .headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::AuthError(anyhow::anyhow!("Missing {name} header")))?
        .parse::<Uuid>()
        .map_err(|_| AppError::AuthError(anyhow::anyhow!("Invalid {name} header, expected UUID")))
}
