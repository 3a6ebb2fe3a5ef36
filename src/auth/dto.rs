use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use super::claims::Role;
use crate::rewards::Cooldown;
use crate::store::ExternalIdentity;

/// Request body for user registration.
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
}

/// Request body for login.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Request body for token refresh.
#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// Response returned after login, register or refresh.
#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub user: PublicUser,
}

/// Public part of the user returned to the client.
#[derive(Debug, Serialize)]
pub struct PublicUser {
    pub id: Uuid,
    pub email: String,
    pub role: Role,
}

/// `GET /me`: account plus reward state. `identity` is null until the
/// game account is linked.
#[derive(Debug, Serialize)]
pub struct MeResponse {
    pub id: Uuid,
    pub email: String,
    pub role: Role,
    pub identity: Option<ExternalIdentity>,
    pub credits: Decimal,
    pub max_credits: Decimal,
    pub min_withdrawal: Decimal,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_withdrawal_at: Option<OffsetDateTime>,
    pub cooldown: Cooldown,
    /// e.g. "in about 3 days"; absent when no cooldown is active.
    pub cooldown_wait: Option<String>,
}
