use axum::{
    extract::{FromRef, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use time::OffsetDateTime;
use tracing::{error, info, instrument, warn};

use crate::{
    auth::{
        claims::Role,
        dto::{AuthResponse, LoginRequest, MeResponse, PublicUser, RefreshRequest, RegisterRequest},
        extractors::AuthUser,
        jwt::JwtKeys,
        password::{hash_password, is_strong_enough, is_valid_email, normalize_email, verify_password},
        repo_types::User,
    },
    rewards::{humanize_wait, RewardsError},
    state::AppState,
};

type ApiError = (StatusCode, String);

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/refresh", post(refresh))
}

pub fn me_routes() -> Router<AppState> {
    Router::new().route("/me", get(get_me))
}

fn internal(e: impl std::fmt::Display) -> ApiError {
    (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
}

fn issue_tokens(keys: &JwtKeys, user: User) -> Result<AuthResponse, ApiError> {
    let role = Role::from_flag(user.is_admin);
    let access_token = keys.sign_access(user.id, role).map_err(|e| {
        error!(error = %e, "jwt sign access failed");
        internal(e)
    })?;
    let refresh_token = keys.sign_refresh(user.id, role).map_err(|e| {
        error!(error = %e, "jwt sign refresh failed");
        internal(e)
    })?;
    Ok(AuthResponse {
        access_token,
        refresh_token,
        user: PublicUser {
            id: user.id,
            email: user.email,
            role,
        },
    })
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    let email = normalize_email(&payload.email);

    if !is_valid_email(&email) {
        warn!(email = %email, "invalid email");
        return Err((StatusCode::BAD_REQUEST, "Invalid email".into()));
    }

    if !is_strong_enough(&payload.password) {
        warn!("password too short");
        return Err((StatusCode::BAD_REQUEST, "Password too short".into()));
    }

    match User::find_by_email(&state.db, &email).await {
        Ok(Some(_)) => {
            warn!(email = %email, "email already registered");
            return Err((StatusCode::CONFLICT, "Email already registered".into()));
        }
        Ok(None) => {}
        Err(e) => {
            error!(error = %e, "find_by_email failed");
            return Err(internal(e));
        }
    }

    let hash = hash_password(&payload.password).map_err(|e| {
        error!(error = %e, "hash_password failed");
        internal(e)
    })?;

    let is_admin = state.config.is_admin_email(&email);
    let user = User::create(&state.db, &email, &hash, is_admin)
        .await
        .map_err(|e| {
            error!(error = %e, "create user failed");
            internal(e)
        })?;

    info!(user_id = %user.id, email = %user.email, is_admin, "user registered");
    let keys = JwtKeys::from_ref(&state);
    Ok(Json(issue_tokens(&keys, user)?))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    let email = normalize_email(&payload.email);

    if !is_valid_email(&email) {
        warn!(email = %email, "invalid email");
        return Err((StatusCode::BAD_REQUEST, "Invalid email".into()));
    }

    let user = match User::find_by_email(&state.db, &email).await {
        Ok(Some(u)) => u,
        Ok(None) => {
            warn!(email = %email, "login unknown email");
            return Err((StatusCode::UNAUTHORIZED, "Invalid credentials".into()));
        }
        Err(e) => {
            error!(error = %e, "find_by_email failed");
            return Err(internal(e));
        }
    };

    let ok = verify_password(&payload.password, &user.password_hash).map_err(|e| {
        error!(error = %e, "verify_password failed");
        internal(e)
    })?;

    if !ok {
        warn!(email = %email, user_id = %user.id, "login invalid password");
        return Err((StatusCode::UNAUTHORIZED, "Invalid credentials".into()));
    }

    info!(user_id = %user.id, "user logged in");
    let keys = JwtKeys::from_ref(&state);
    Ok(Json(issue_tokens(&keys, user)?))
}

#[instrument(skip(state, payload))]
pub async fn refresh(
    State(state): State<AppState>,
    Json(payload): Json<RefreshRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    let keys = JwtKeys::from_ref(&state);
    let claims = keys
        .verify_refresh(&payload.refresh_token)
        .map_err(|e| (StatusCode::UNAUTHORIZED, e.to_string()))?;

    // role is re-read so promotions and demotions apply on refresh
    let user = User::find_by_id(&state.db, claims.sub)
        .await
        .map_err(internal)?
        .ok_or((StatusCode::UNAUTHORIZED, "User not found".to_string()))?;

    Ok(Json(issue_tokens(&keys, user)?))
}

#[instrument(skip(state))]
pub async fn get_me(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<MeResponse>, ApiError> {
    let user = User::find_by_id(&state.db, user_id)
        .await
        .map_err(|e| {
            error!(error = %e, user_id = %user_id, "load user failed");
            internal(e)
        })?
        .ok_or((StatusCode::UNAUTHORIZED, "User not found".to_string()))?;

    let account = state.engine.account(user_id).await.map_err(|e| match e {
        RewardsError::UnknownUser(_) => (StatusCode::UNAUTHORIZED, "User not found".to_string()),
        other => {
            error!(error = %other, user_id = %user_id, "load reward account failed");
            (StatusCode::SERVICE_UNAVAILABLE, "Service unavailable".to_string())
        }
    })?;

    let cfg = state.engine.config();
    let cooldown = state
        .engine
        .time_until_eligible(&account, OffsetDateTime::now_utc());

    Ok(Json(MeResponse {
        id: user.id,
        email: user.email,
        role: Role::from_flag(user.is_admin),
        identity: account.identity,
        credits: account.credits,
        max_credits: cfg.max_credits,
        min_withdrawal: cfg.min_withdrawal,
        last_withdrawal_at: account.last_withdrawal_at,
        cooldown_wait: cooldown.remaining().map(humanize_wait),
        cooldown,
    }))
}
