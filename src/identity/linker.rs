use std::sync::Arc;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use rust_decimal::Decimal;
use thiserror::Error;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use super::lookup::{IdentityLookup, LookupError};
use crate::rewards::{error::ErrorBody, UserLocks};
use crate::store::{ExternalIdentity, RewardAccount, RewardStore, StoreError};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LinkError {
    #[error("Please enter a username.")]
    EmptyUsername,
    #[error("Account not found. Please check the username.")]
    IdentityNotFound,
    #[error("The account service is unavailable. Please try again.")]
    LookupUnavailable,
    #[error("Could not fetch the account avatar.")]
    AvatarUnavailable,
    #[error("A different account is already linked.")]
    IdentityAlreadyLinked,
    #[error("user {0} not found")]
    UnknownUser(Uuid),
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),
}

impl From<StoreError> for LinkError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(id) => LinkError::UnknownUser(id),
            other => LinkError::StorageUnavailable(other.to_string()),
        }
    }
}

impl LinkError {
    pub fn code(&self) -> &'static str {
        match self {
            LinkError::EmptyUsername => "empty_username",
            LinkError::IdentityNotFound => "identity_not_found",
            LinkError::LookupUnavailable => "lookup_unavailable",
            LinkError::AvatarUnavailable => "avatar_unavailable",
            LinkError::IdentityAlreadyLinked => "identity_already_linked",
            LinkError::UnknownUser(_) => "unknown_user",
            LinkError::StorageUnavailable(_) => "storage_unavailable",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            LinkError::EmptyUsername => StatusCode::BAD_REQUEST,
            LinkError::IdentityNotFound | LinkError::UnknownUser(_) => StatusCode::NOT_FOUND,
            LinkError::LookupUnavailable | LinkError::StorageUnavailable(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            LinkError::AvatarUnavailable => StatusCode::BAD_GATEWAY,
            LinkError::IdentityAlreadyLinked => StatusCode::CONFLICT,
        }
    }
}

impl IntoResponse for LinkError {
    fn into_response(self) -> Response {
        let message = match &self {
            LinkError::StorageUnavailable(_) => "An error occurred. Please try again.".to_string(),
            LinkError::UnknownUser(_) => "User not found".to_string(),
            other => other.to_string(),
        };
        (
            self.status(),
            Json(ErrorBody {
                code: self.code(),
                message,
            }),
        )
            .into_response()
    }
}

/// Resolves a game-platform username and writes the identity onto the
/// user's reward account.
#[derive(Clone)]
pub struct IdentityLinker {
    lookup: Arc<dyn IdentityLookup>,
    store: Arc<dyn RewardStore>,
    locks: UserLocks,
    relink_resets_credits: bool,
}

impl IdentityLinker {
    pub fn new(
        lookup: Arc<dyn IdentityLookup>,
        store: Arc<dyn RewardStore>,
        locks: UserLocks,
        relink_resets_credits: bool,
    ) -> Self {
        Self {
            lookup,
            store,
            locks,
            relink_resets_credits,
        }
    }

    #[instrument(skip(self))]
    pub async fn link_identity(
        &self,
        user_id: Uuid,
        username_input: &str,
    ) -> Result<RewardAccount, LinkError> {
        let username = username_input.trim();
        if username.is_empty() {
            return Err(LinkError::EmptyUsername);
        }

        let external = match self.lookup.find_by_username(username).await {
            Ok(Some(account)) => account,
            Ok(None) => {
                warn!(%user_id, username, "external account not found");
                return Err(LinkError::IdentityNotFound);
            }
            Err(e) => {
                error!(%user_id, error = %e, "username lookup failed");
                return Err(LinkError::LookupUnavailable);
            }
        };

        // a pending thumbnail has no image yet; only a missing entry fails
        let avatar_url = match self.lookup.avatar(&external.id).await {
            Ok(Some(entry)) => entry.image_url,
            Ok(None) | Err(LookupError::Decode(_)) => {
                warn!(%user_id, external_id = %external.id, "avatar missing");
                return Err(LinkError::AvatarUnavailable);
            }
            Err(e @ LookupError::Unavailable(_)) => {
                error!(%user_id, error = %e, "avatar lookup failed");
                return Err(LinkError::LookupUnavailable);
            }
        };

        let _guard = self.locks.lock(user_id).await;
        let account = self
            .store
            .get_account(user_id)
            .await?
            .ok_or(LinkError::UnknownUser(user_id))?;

        if let Some(current) = &account.identity {
            if current.external_id != external.id {
                warn!(%user_id, current = %current.external_id, requested = %external.id, "relink to a different account rejected");
                return Err(LinkError::IdentityAlreadyLinked);
            }
        }

        let first_link = account.identity.is_none();
        let credits = if first_link || self.relink_resets_credits {
            Decimal::ZERO
        } else {
            account.credits
        };
        let updated = RewardAccount {
            identity: Some(ExternalIdentity {
                username: external.name,
                external_id: external.id,
                avatar_url,
            }),
            credits,
            ..account
        };

        let saved = self.store.put_account(&updated).await.map_err(|e| {
            error!(%user_id, error = %e, "storing linked identity failed");
            LinkError::from(e)
        })?;
        info!(%user_id, first_link, credits = %saved.credits, "identity linked");
        Ok(saved)
    }
}
