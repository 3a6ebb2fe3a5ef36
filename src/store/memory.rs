use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{NewWithdrawal, RewardAccount, RewardStore, SortOrder, StoreError, WithdrawalRequest};

#[derive(Default)]
struct Inner {
    accounts: HashMap<Uuid, RewardAccount>,
    withdrawals: Vec<WithdrawalRequest>,
}

/// Process-local store with the same version semantics as Postgres.
#[derive(Clone, Default)]
pub struct InMemoryRewardStore {
    inner: Arc<RwLock<Inner>>,
}

impl InMemoryRewardStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds an account as-is, replacing any existing one.
    pub async fn insert_account(&self, account: RewardAccount) {
        self.inner
            .write()
            .await
            .accounts
            .insert(account.user_id, account);
    }
}

fn apply(inner: &mut Inner, account: &RewardAccount) -> Result<RewardAccount, StoreError> {
    let stored = inner
        .accounts
        .get_mut(&account.user_id)
        .ok_or(StoreError::NotFound(account.user_id))?;
    if stored.version != account.version {
        return Err(StoreError::Conflict(account.user_id));
    }
    *stored = RewardAccount {
        version: account.version + 1,
        ..account.clone()
    };
    Ok(stored.clone())
}

#[async_trait]
impl RewardStore for InMemoryRewardStore {
    async fn get_account(&self, user_id: Uuid) -> Result<Option<RewardAccount>, StoreError> {
        Ok(self.inner.read().await.accounts.get(&user_id).cloned())
    }

    async fn put_account(&self, account: &RewardAccount) -> Result<RewardAccount, StoreError> {
        apply(&mut *self.inner.write().await, account)
    }

    async fn record_withdrawal(
        &self,
        account: &RewardAccount,
        withdrawal: NewWithdrawal,
    ) -> Result<(RewardAccount, WithdrawalRequest), StoreError> {
        let mut inner = self.inner.write().await;
        let updated = apply(&mut inner, account)?;
        let record = WithdrawalRequest {
            id: Uuid::new_v4(),
            external_username: withdrawal.external_username,
            external_id: withdrawal.external_id,
            amount: withdrawal.amount,
            created_at: withdrawal.created_at,
        };
        inner.withdrawals.push(record.clone());
        Ok((updated, record))
    }

    async fn list_withdrawals(
        &self,
        order: SortOrder,
    ) -> Result<Vec<WithdrawalRequest>, StoreError> {
        let mut rows = self.inner.read().await.withdrawals.clone();
        // ties fall back to insertion order, matching the `seq` column
        rows.sort_by_key(|w| w.created_at);
        if order == SortOrder::Desc {
            rows.reverse();
        }
        Ok(rows)
    }
}
