use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// Linked third-party game account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExternalIdentity {
    pub username: String,
    pub external_id: String,
    pub avatar_url: Option<String>,
}

/// Reward-bearing part of a user record.
#[derive(Debug, Clone, PartialEq)]
pub struct RewardAccount {
    pub user_id: Uuid,
    pub identity: Option<ExternalIdentity>,
    pub credits: Decimal,
    pub last_withdrawal_at: Option<OffsetDateTime>,
    /// Bumped by the store on every write; used for compare-and-set.
    pub version: i64,
}

impl RewardAccount {
    pub fn new(user_id: Uuid) -> Self {
        Self {
            user_id,
            identity: None,
            credits: Decimal::ZERO,
            last_withdrawal_at: None,
            version: 0,
        }
    }
}

#[derive(Debug, FromRow)]
pub(crate) struct RewardAccountRow {
    pub id: Uuid,
    pub external_username: Option<String>,
    pub external_id: Option<String>,
    pub avatar_url: Option<String>,
    pub credits: Decimal,
    pub last_withdrawal_at: Option<OffsetDateTime>,
    pub version: i64,
}

impl From<RewardAccountRow> for RewardAccount {
    fn from(r: RewardAccountRow) -> Self {
        let identity = match (r.external_username, r.external_id) {
            (Some(username), Some(external_id)) => Some(ExternalIdentity {
                username,
                external_id,
                avatar_url: r.avatar_url,
            }),
            _ => None,
        };
        Self {
            user_id: r.id,
            identity,
            credits: r.credits,
            last_withdrawal_at: r.last_withdrawal_at,
            version: r.version,
        }
    }
}

/// Immutable record of a payout request. Identity fields are a snapshot
/// taken at creation time.
#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct WithdrawalRequest {
    pub id: Uuid,
    pub external_username: String,
    pub external_id: String,
    pub amount: Decimal,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewWithdrawal {
    pub external_username: String,
    pub external_id: String,
    pub amount: Decimal,
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Desc,
    Asc,
}
