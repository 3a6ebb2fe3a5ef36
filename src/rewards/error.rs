use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use rust_decimal::Decimal;
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use super::policy::humanize_wait;
use crate::store::StoreError;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RewardsError {
    #[error("Please enter a valid amount.")]
    InvalidAmount,
    #[error("Minimum withdrawal is {minimum} credits.")]
    BelowMinimum { minimum: Decimal },
    #[error("You do not have enough credits.")]
    InsufficientBalance { requested: Decimal, available: Decimal },
    #[error("You can withdraw again {}.", humanize_wait(*remaining))]
    CooldownActive { remaining: time::Duration },
    #[error("You already have the maximum of {max} credits.")]
    CreditCapReached { max: Decimal },
    #[error("An ad view is already in progress.")]
    AdViewInFlight,
    #[error("Link your game account first.")]
    IdentityNotLinked,
    #[error("user {0} not found")]
    UnknownUser(Uuid),
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),
}

impl From<StoreError> for RewardsError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(id) => RewardsError::UnknownUser(id),
            other => RewardsError::StorageUnavailable(other.to_string()),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: &'static str,
    pub message: String,
}

impl RewardsError {
    pub fn code(&self) -> &'static str {
        match self {
            RewardsError::InvalidAmount => "invalid_amount",
            RewardsError::BelowMinimum { .. } => "below_minimum",
            RewardsError::InsufficientBalance { .. } => "insufficient_balance",
            RewardsError::CooldownActive { .. } => "cooldown_active",
            RewardsError::CreditCapReached { .. } => "credit_cap_reached",
            RewardsError::AdViewInFlight => "ad_view_in_flight",
            RewardsError::IdentityNotLinked => "identity_not_linked",
            RewardsError::UnknownUser(_) => "unknown_user",
            RewardsError::StorageUnavailable(_) => "storage_unavailable",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            RewardsError::InvalidAmount => StatusCode::BAD_REQUEST,
            RewardsError::BelowMinimum { .. } | RewardsError::InsufficientBalance { .. } => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            RewardsError::CooldownActive { .. } => StatusCode::TOO_MANY_REQUESTS,
            RewardsError::CreditCapReached { .. } | RewardsError::AdViewInFlight => {
                StatusCode::CONFLICT
            }
            RewardsError::IdentityNotLinked => StatusCode::FORBIDDEN,
            RewardsError::UnknownUser(_) => StatusCode::NOT_FOUND,
            RewardsError::StorageUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    fn public_message(&self) -> String {
        match self {
            // internal details stay in the logs
            RewardsError::StorageUnavailable(_) => "An error occurred. Please try again.".into(),
            RewardsError::UnknownUser(_) => "User not found".into(),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for RewardsError {
    fn into_response(self) -> Response {
        let body = Json(ErrorBody {
            code: self.code(),
            message: self.public_message(),
        });
        match &self {
            RewardsError::CooldownActive { remaining } => {
                let retry_after = remaining.whole_seconds().max(1).to_string();
                (self.status(), [(header::RETRY_AFTER, retry_after)], body).into_response()
            }
            _ => (self.status(), body).into_response(),
        }
    }
}
