use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::{request::Parts, StatusCode},
};
use tracing::warn;
use uuid::Uuid;

use super::claims::{Claims, Role, TokenKind};
use super::jwt::JwtKeys;

/// Authenticated platform user (access token required).
pub struct AuthUser(pub Uuid);

/// Authenticated user holding the admin role.
pub struct AdminUser(pub Uuid);

fn access_claims(parts: &Parts, keys: &JwtKeys) -> Result<Claims, (StatusCode, String)> {
    let auth_header = parts
        .headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or((
            StatusCode::UNAUTHORIZED,
            "Missing Authorization header".to_string(),
        ))?;

    let token = auth_header
        .strip_prefix("Bearer ")
        .or_else(|| auth_header.strip_prefix("bearer "))
        .ok_or((
            StatusCode::UNAUTHORIZED,
            "Invalid Authorization header".to_string(),
        ))?;

    let claims = keys.verify(token).map_err(|_| {
        warn!("invalid or expired token");
        (
            StatusCode::UNAUTHORIZED,
            "Invalid or expired token".to_string(),
        )
    })?;

    if claims.kind != TokenKind::Access {
        return Err((
            StatusCode::UNAUTHORIZED,
            "Access token required".to_string(),
        ));
    }
    Ok(claims)
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    JwtKeys: FromRef<S>,
{
    type Rejection = (StatusCode, String);

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let keys = JwtKeys::from_ref(state);
        let claims = access_claims(parts, &keys)?;
        Ok(AuthUser(claims.sub))
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for AdminUser
where
    S: Send + Sync,
    JwtKeys: FromRef<S>,
{
    type Rejection = (StatusCode, String);

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let keys = JwtKeys::from_ref(state);
        let claims = access_claims(parts, &keys)?;
        if claims.role != Role::Admin {
            warn!(user_id = %claims.sub, "admin route denied");
            return Err((StatusCode::FORBIDDEN, "Admin role required".to_string()));
        }
        Ok(AdminUser(claims.sub))
    }
}
