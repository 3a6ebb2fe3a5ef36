use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use time::OffsetDateTime;
use tracing::instrument;

use super::dto::{EligibilityResponse, WithdrawalBody, WithdrawalResponse};
use super::engine::AdViewOutcome;
use super::error::RewardsError;
use super::policy::humanize_wait;
use crate::{auth::AuthUser, state::AppState};

pub fn reward_routes() -> Router<AppState> {
    Router::new()
        .route("/rewards/eligibility", get(get_eligibility))
        .route("/rewards/ad-views", post(watch_ad))
        .route("/rewards/withdrawals", post(create_withdrawal))
}

#[instrument(skip(state))]
pub async fn get_eligibility(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<EligibilityResponse>, RewardsError> {
    let account = state.engine.account(user_id).await?;
    let now = OffsetDateTime::now_utc();
    let cooldown = state.engine.time_until_eligible(&account, now);
    Ok(Json(EligibilityResponse {
        eligible: state.engine.is_withdrawal_eligible(&account, now),
        wait: cooldown.remaining().map(humanize_wait),
        cooldown,
    }))
}

/// Resolves once the ad duration has elapsed. A client that disconnects
/// first drops this future and earns nothing.
#[instrument(skip(state))]
pub async fn watch_ad(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<AdViewOutcome>, RewardsError> {
    let outcome = state.engine.record_ad_view(user_id).await?;
    Ok(Json(outcome))
}

#[instrument(skip(state, body))]
pub async fn create_withdrawal(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(body): Json<WithdrawalBody>,
) -> Result<Json<WithdrawalResponse>, RewardsError> {
    let now = OffsetDateTime::now_utc();
    let receipt = state
        .engine
        .request_withdrawal(user_id, &body.amount.as_text(), now)
        .await?;
    Ok(Json(WithdrawalResponse {
        message: format!(
            "Successfully requested withdrawal of {} credits!",
            receipt.withdrawal.amount.normalize()
        ),
        withdrawal: receipt.withdrawal,
        credits: receipt.account.credits,
    }))
}
