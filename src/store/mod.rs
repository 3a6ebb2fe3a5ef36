//! Persistence port for reward accounts and the withdrawal ledger.
//!
//! The store guarantees atomic read-modify-write per record through
//! version checks; range rules on `credits` belong to the engine.

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

pub mod memory;
pub mod postgres;
mod repo_types;

pub use memory::InMemoryRewardStore;
pub use postgres::PgRewardStore;
pub use repo_types::{
    ExternalIdentity, NewWithdrawal, RewardAccount, SortOrder, WithdrawalRequest,
};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("account {0} not found")]
    NotFound(Uuid),
    /// The stored version moved on since the account was read.
    #[error("account {0} was modified concurrently")]
    Conflict(Uuid),
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        StoreError::Unavailable(e.to_string())
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RewardStore: Send + Sync {
    async fn get_account(&self, user_id: Uuid) -> Result<Option<RewardAccount>, StoreError>;

    /// Writes identity, credits and last withdrawal time if the stored
    /// version still equals `account.version`. Returns the account with
    /// its new version.
    async fn put_account(&self, account: &RewardAccount) -> Result<RewardAccount, StoreError>;

    /// Version-checked account write plus ledger append, in one transaction.
    async fn record_withdrawal(
        &self,
        account: &RewardAccount,
        withdrawal: NewWithdrawal,
    ) -> Result<(RewardAccount, WithdrawalRequest), StoreError>;

    async fn list_withdrawals(&self, order: SortOrder)
        -> Result<Vec<WithdrawalRequest>, StoreError>;
}
